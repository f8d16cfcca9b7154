mod conflict;
mod error;
mod lifecycle;
mod queries;
mod store;
mod transitions;
mod txn;

pub use error::EngineError;
pub use transitions::{allowed_targets, can_transition, is_active_status, is_assignable_status};

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits;
use crate::model::*;
use crate::wal::Wal;

use store::Stores;
use txn::RowSet;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub wal_path: PathBuf,
    /// How long a transaction waits on a contended lock before failing
    /// with `Busy`.
    pub lock_timeout: Duration,
}

impl EngineConfig {
    pub fn new(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            lock_timeout: Duration::from_millis(limits::DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = wal
                .write_compact_file(&events)
                .and_then(|tmp| wal.swap_compact_file(&tmp));
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    stores: Stores,
    wal_tx: mpsc::Sender<WalCommand>,
    lock_timeout: Duration,
    /// Shared by every transaction, exclusive during WAL compaction.
    /// Guarantees the compaction snapshot sits on a transaction
    /// boundary.
    txn_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Replay the WAL at `config.wal_path` (created if missing) and
    /// start the group-commit writer. Must run inside a tokio runtime.
    pub fn open(config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&config.wal_path)?;
        let wal = Wal::open(&config.wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            stores: Stores::default(),
            wal_tx,
            lock_timeout: config.lock_timeout,
            txn_gate: Arc::new(RwLock::new(())),
        };

        // Replay — we're the sole owner of every row Arc here, so
        // try_write always succeeds instantly. Never block on locks in
        // this path; it may run inside an async context.
        for event in &events {
            replay_apply(&engine.stores, event);
        }

        if !events.is_empty() {
            tracing::info!(
                events = events.len(),
                bookings = engine.stores.bookings.len(),
                rooms = engine.stores.rooms.len(),
                "wal replay complete"
            );
        }

        Ok(engine)
    }

    /// Wait for a lock future, giving up after `lock_timeout`. The
    /// canonical acquisition order makes deadlock impossible, so a
    /// timeout means sustained contention, not a stuck system.
    async fn acquire<G>(
        &self,
        lock: impl Future<Output = G>,
        what: &'static str,
    ) -> Result<G, EngineError> {
        match tokio::time::timeout(self.lock_timeout, lock).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(what, "lock wait timed out");
                Err(EngineError::Busy(what))
            }
        }
    }

    /// Write an event through the background group-commit writer.
    async fn wal_append(&self, event: Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    /// Rewrite the WAL as a snapshot of current state. Takes the
    /// transaction gate exclusive so no commit can land between the
    /// snapshot and the file swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self
            .acquire(self.txn_gate.clone().write_owned(), "transaction gate")
            .await?;

        let mut events = Vec::new();
        for id in self.stores.rooms.ids() {
            if let Some(row) = self.stores.rooms.get(&id) {
                let room = row.try_read().expect("compact: gate held, rows unlocked").clone();
                events.push(Event::RoomAdded { room });
            }
        }
        for id in self.stores.bookings.ids() {
            if let Some(row) = self.stores.bookings.get(&id) {
                let booking = row.try_read().expect("compact: gate held, rows unlocked").clone();
                events.push(Event::BookingCreated { booking });
            }
        }
        for assignment in self.stores.assignments.all() {
            events.push(Event::AssignmentRecorded { assignment });
        }
        for record in self.stores.cancellations.all() {
            events.push(Event::CancellationRecorded { record });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    /// Appends since the last compaction, from the writer task.
    pub async fn wal_appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await.map_err(|_| EngineError::Wal("WAL writer dropped response".into()))
    }
}

/// Apply one replayed event, locking the rows it names. Replay is
/// single-threaded over freshly built Arcs, hence the try_writes.
fn replay_apply(stores: &Stores, event: &Event) {
    let mut booking_guard = event_booking_id(event)
        .and_then(|id| stores.bookings.get(&id))
        .map(|row| row.try_write_owned().expect("replay: uncontended write"));

    let mut room_guards: Vec<(Ulid, OwnedRwLockWriteGuard<Room>)> = event_room_ids(event)
        .into_iter()
        .filter_map(|id| stores.rooms.get(&id).map(|row| (id, row)))
        .map(|(id, row)| (id, row.try_write_owned().expect("replay: uncontended write")))
        .collect();

    let mut rows = RowSet {
        booking: booking_guard.as_deref_mut(),
        rooms: room_guards.iter_mut().map(|(id, g)| (*id, &mut **g)).collect(),
    };
    stores.apply(event, &mut rows);
}

/// The booking row an event mutates, if any.
fn event_booking_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomsAssigned { booking_id, .. }
        | Event::StatusChanged { booking_id, .. }
        | Event::CheckedIn { booking_id, .. }
        | Event::CheckedOut { booking_id, .. } => Some(*booking_id),
        Event::BookingCancelled { record, .. } => Some(record.booking_id),
        Event::RoomAdded { .. }
        | Event::RoomStatusSet { .. }
        | Event::BookingCreated { .. }
        | Event::CancellationAmended { .. }
        | Event::AssignmentRecorded { .. }
        | Event::CancellationRecorded { .. } => None,
    }
}

/// The room rows an event mutates.
fn event_room_ids(event: &Event) -> Vec<Ulid> {
    match event {
        Event::RoomStatusSet { room_id, .. } => vec![*room_id],
        Event::RoomsAssigned { assignments, .. } => {
            assignments.iter().map(|a| a.room_id).collect()
        }
        Event::CheckedIn { room_ids, .. } | Event::CheckedOut { room_ids, .. } => room_ids.clone(),
        Event::BookingCancelled { released, .. } => released.iter().map(|r| r.room_id).collect(),
        Event::RoomAdded { .. }
        | Event::BookingCreated { .. }
        | Event::StatusChanged { .. }
        | Event::CancellationAmended { .. }
        | Event::AssignmentRecorded { .. }
        | Event::CancellationRecorded { .. } => Vec::new(),
    }
}
