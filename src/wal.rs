//! Write-ahead log: length-prefixed bincode frames with a CRC32 trailer.
//!
//! Frame layout: `[u32 len][bincode Event][u32 crc32]`, both integers
//! little-endian, CRC computed over the payload bytes. Replay stops at
//! the first torn or corrupt frame, which truncates the log to its last
//! durable transaction.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Write one framed event. Does not flush.
fn frame<W: Write>(writer: &mut W, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read one framed event. `Ok(None)` means clean end of log: true EOF,
/// a torn tail from a crash mid-write, or a frame whose CRC or payload
/// does not check out.
fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    if reader.read_exact(&mut payload).is_err() {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if reader.read_exact(&mut crc_buf).is_err() {
        return Ok(None);
    }
    if crc32fast::hash(&payload) != u32::from_le_bytes(crc_buf) {
        return Ok(None);
    }
    match bincode::deserialize(&payload) {
        Ok(event) => Ok(Some(event)),
        Err(_) => Ok(None),
    }
}

pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log for appending.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { writer: BufWriter::new(file), path, appends_since_compact: 0 })
    }

    /// Buffer one event. Durable only after `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered frames and fsync. One call covers every
    /// `append_buffered` since the last flush — this is the group commit.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    /// Append one event durably.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends since the last compaction (or open). Drives the
    /// compaction threshold.
    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a snapshot to a sibling temp file and fsync it. The live
    /// log is untouched until `swap_compact_file`.
    pub fn write_compact_file(&self, events: &[Event]) -> io::Result<PathBuf> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let tmp = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(tmp);
        for event in events {
            frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(tmp_path)
    }

    /// Atomically replace the live log with the compacted file and
    /// reopen for appending.
    pub fn swap_compact_file(&mut self, tmp_path: &Path) -> io::Result<()> {
        std::fs::rename(tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Snapshot-and-swap in one step.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp = self.write_compact_file(events)?;
        self.swap_compact_file(&tmp)
    }

    /// Read every decodable event from the log. A missing file is an
    /// empty log.
    pub fn replay(path: impl AsRef<Path>) -> io::Result<Vec<Event>> {
        let file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_frame(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Room, RoomStatus};
    use std::io::{Seek, SeekFrom};
    use ulid::Ulid;

    fn test_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_wal");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("{name}_{}.wal", Ulid::new()))
    }

    fn room_added(number: &str) -> Event {
        Event::RoomAdded {
            room: Room {
                id: Ulid::new(),
                number: number.to_string(),
                room_type: Ulid::new(),
                status: RoomStatus::Available,
                updated_at: 1,
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = test_path("append_replay");
        let mut wal = Wal::open(&path).unwrap();
        let first = room_added("101");
        let second = room_added("102");
        wal.append(&first).unwrap();
        wal.append(&second).unwrap();
        drop(wal);

        let events = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![first, second]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn replay_handles_truncation() {
        let path = test_path("truncation");
        let mut wal = Wal::open(&path).unwrap();
        let keep = room_added("201");
        wal.append(&keep).unwrap();
        wal.append(&room_added("202")).unwrap();
        drop(wal);

        // Chop the tail mid-frame to fake a crash during the second write.
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 7).unwrap();
        drop(file);

        let events = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![keep]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = test_path("never_created");
        let events = Wal::replay(&path).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = test_path("corrupt");
        let mut wal = Wal::open(&path).unwrap();
        let keep = room_added("301");
        wal.append(&keep).unwrap();
        wal.append(&room_added("302")).unwrap();
        drop(wal);

        // Flip a byte inside the second frame's payload.
        let len = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(len - 10)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        byte[0] ^= 0xFF;
        file.seek(SeekFrom::Start(len - 10)).unwrap();
        file.write_all(&byte).unwrap();
        drop(file);

        let events = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![keep]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn compact_reduces_wal() {
        let path = test_path("compact");
        let mut wal = Wal::open(&path).unwrap();
        for i in 0..50 {
            wal.append(&room_added(&format!("{i}"))).unwrap();
        }
        let full_len = std::fs::metadata(&path).unwrap().len();

        let snapshot = vec![room_added("snapshot")];
        wal.compact(&snapshot).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        drop(wal);

        let compact_len = std::fs::metadata(&path).unwrap().len();
        assert!(compact_len < full_len);
        assert_eq!(Wal::replay(&path).unwrap(), snapshot);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn compact_then_append() {
        let path = test_path("compact_append");
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&room_added("old")).unwrap();

        let snapshot = vec![room_added("kept")];
        wal.compact(&snapshot).unwrap();
        let after = room_added("new");
        wal.append(&after).unwrap();
        assert_eq!(wal.appends_since_compact(), 1);
        drop(wal);

        let events = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![snapshot[0].clone(), after]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = test_path("buffered");
        let mut wal = Wal::open(&path).unwrap();
        let batch: Vec<Event> = (0..5).map(|i| room_added(&format!("b{i}"))).collect();
        for event in &batch {
            wal.append_buffered(event).unwrap();
        }
        wal.flush_sync().unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), batch);
        std::fs::remove_file(&path).unwrap();
    }
}
