use std::path::{Path, PathBuf};

use ulid::Ulid;

use innkeep::api;
use innkeep::engine::{Engine, EngineConfig, EngineError};
use innkeep::limits::DEFAULT_STAY_MS;
use innkeep::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("innkeep_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{name}_{}.wal", Ulid::new()))
}

fn open(path: &Path) -> Engine {
    Engine::open(EngineConfig::new(path)).unwrap()
}

fn walk_in_booking(phone: &str) -> CreateBooking {
    CreateBooking {
        channel: BookingChannel::WalkIn,
        guest: GuestIdentity::Phone(phone.to_string()),
        guest_count: 2,
        special_request: None,
        receptionist: Some(Ulid::new()),
        booked_at: Some(1_700_000_000_000),
    }
}

fn online_booking(customer: Ulid) -> CreateBooking {
    CreateBooking {
        channel: BookingChannel::Online,
        guest: GuestIdentity::Customer(customer),
        guest_count: 1,
        special_request: None,
        receptionist: None,
        booked_at: Some(1_700_000_000_000),
    }
}

fn request(room: &Room) -> RoomRequest {
    RoomRequest { room: RoomRef::Id(room.id), stay: None }
}

// ── Flows ────────────────────────────────────────────────────

#[tokio::test]
async fn walk_in_journey_reserve_pay_stay() {
    let path = wal_path("walk_in_journey");
    let engine = open(&path);

    let r1 = engine.add_room("101".into(), Ulid::new()).await.unwrap();
    let r2 = engine.add_room("102".into(), Ulid::new()).await.unwrap();

    let booking = engine
        .create_booking(walk_in_booking("555-2001"))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    // One room on an explicit two-night stay, one on the default.
    let two_nights = Stay::new(booking.booked_at, booking.booked_at + 2 * DEFAULT_STAY_MS);
    let summary = engine
        .assign_rooms(
            booking.id,
            vec![
                RoomRequest { room: RoomRef::Id(r1.id), stay: Some(two_nights) },
                request(&r2),
            ],
        )
        .await
        .unwrap();
    assert_eq!(summary.assigned_count, 2);
    assert_eq!(summary.room_status, RoomStatus::Reserved);
    assert_eq!(engine.status_of(booking.id).unwrap(), BookingStatus::Confirmed);

    engine
        .transition_status(booking.id, BookingStatus::Paid)
        .await
        .unwrap();

    let receipt = engine.check_in(booking.id).await.unwrap();
    assert_eq!(receipt.rooms_updated, 2);
    assert_eq!(engine.get_room(r1.id).await.unwrap().status, RoomStatus::Occupied);

    let receipt = engine.check_out(booking.id).await.unwrap();
    assert_eq!(receipt.rooms_released, 2);
    assert_eq!(engine.status_of(booking.id).unwrap(), BookingStatus::CheckedOut);
    for room in engine.list_rooms().await {
        assert_eq!(room.status, RoomStatus::Available);
    }

    // The folio still shows which rooms the guest had, and on what stay.
    let detail = engine.get_booking(booking.id).await.unwrap();
    assert_eq!(detail.assignments.len(), 2);
    let r1_stay = detail
        .assignments
        .iter()
        .find(|a| a.room_id == r1.id)
        .unwrap()
        .stay;
    assert_eq!(r1_stay, two_nights);
}

#[tokio::test]
async fn online_journey_assignment_checks_in() {
    let path = wal_path("online_journey");
    let engine = open(&path);

    let room = engine.add_room("201".into(), Ulid::new()).await.unwrap();
    let booking = engine
        .create_booking(online_booking(Ulid::new()))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    engine
        .transition_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();

    // Prepaid channel: once confirmed, handing over the key is the
    // check-in.
    let summary = engine
        .assign_rooms(booking.id, vec![request(&room)])
        .await
        .unwrap();
    assert_eq!(summary.room_status, RoomStatus::Occupied);
    assert_eq!(engine.status_of(booking.id).unwrap(), BookingStatus::CheckedIn);

    let assignment = &engine.get_assigned_rooms(booking.id).unwrap()[0];
    assert_eq!(assignment.stay.duration_ms(), DEFAULT_STAY_MS);

    // No payment step on this channel.
    let paid = engine.transition_status(booking.id, BookingStatus::Paid).await;
    assert!(matches!(paid, Err(EngineError::InvalidTransition { .. })));

    engine.check_out(booking.id).await.unwrap();
    assert_eq!(engine.get_room(room.id).await.unwrap().status, RoomStatus::Available);
}

#[tokio::test]
async fn cancellation_frees_rooms_for_the_next_guest() {
    let path = wal_path("cancel_rebook");
    let engine = open(&path);

    let room = engine.add_room("301".into(), Ulid::new()).await.unwrap();

    let first = engine
        .create_booking(walk_in_booking("555-2002"))
        .await
        .unwrap();
    engine.assign_rooms(first.id, vec![request(&room)]).await.unwrap();

    let second = engine
        .create_booking(walk_in_booking("555-2003"))
        .await
        .unwrap();
    let blocked = engine.assign_rooms(second.id, vec![request(&room)]).await;
    assert!(matches!(blocked, Err(EngineError::RoomConflict { .. })));

    let receipt = engine
        .cancel_booking(first.id, CancelType::CustomerRequest, Some("change of plans".into()))
        .await
        .unwrap();
    assert_eq!(receipt.rooms_released, 1);
    assert_eq!(engine.get_room(room.id).await.unwrap().status, RoomStatus::Available);
    assert!(!engine.is_room_assigned(first.id).unwrap().is_assigned);

    engine.assign_rooms(second.id, vec![request(&room)]).await.unwrap();
    assert_eq!(engine.get_room(room.id).await.unwrap().status, RoomStatus::Reserved);

    let detail = engine.get_booking(first.id).await.unwrap();
    let record = detail.cancellation.unwrap();
    assert_eq!(record.cancel_type, CancelType::CustomerRequest);
    assert_eq!(record.reason.as_deref(), Some("change of plans"));
}

#[tokio::test]
async fn amend_cancellation_after_the_fact() {
    let path = wal_path("amend_cancellation");
    let engine = open(&path);

    let booking = engine
        .create_booking(walk_in_booking("555-2004"))
        .await
        .unwrap();
    let receipt = engine
        .cancel_booking(booking.id, CancelType::Other, None)
        .await
        .unwrap();

    let amended = engine
        .amend_cancellation(
            receipt.cancel_id,
            CancelType::PaymentIssue,
            Some("deposit never arrived".into()),
        )
        .await
        .unwrap();
    assert_eq!(amended.cancel_type, CancelType::PaymentIssue);

    let detail = engine.get_booking(booking.id).await.unwrap();
    assert_eq!(detail.cancellation, Some(amended));
}

#[tokio::test]
async fn envelope_reports_success_and_failure() {
    let path = wal_path("envelope");
    let engine = open(&path);

    let room = engine.add_room("401".into(), Ulid::new()).await.unwrap();
    let booking = engine
        .create_booking(walk_in_booking("555-2005"))
        .await
        .unwrap();

    let env = api::respond(
        "rooms assigned",
        engine.assign_rooms(booking.id, vec![request(&room)]).await,
    );
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "rooms assigned");
    assert_eq!(json["data"]["assignedCount"], 1);
    assert_eq!(json["data"]["roomStatus"], "Reserved");
    assert!(json.get("errorKind").is_none());

    // Checking in before payment fails, and the envelope says why.
    let env = api::respond("checked in", engine.check_in(booking.id).await);
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["errorKind"], "InvalidTransition");
    assert!(json["message"].as_str().unwrap().contains("Confirmed"));
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn state_survives_restart_and_compaction() {
    let path = wal_path("restart_compaction");

    let (walk_id, online_id, cancel_id, r1_id, r2_id, r3_id) = {
        let engine = open(&path);
        let r1 = engine.add_room("501".into(), Ulid::new()).await.unwrap();
        let r2 = engine.add_room("502".into(), Ulid::new()).await.unwrap();
        let r3 = engine.add_room("503".into(), Ulid::new()).await.unwrap();

        let walk = engine
            .create_booking(walk_in_booking("555-2006"))
            .await
            .unwrap();
        engine.assign_rooms(walk.id, vec![request(&r1)]).await.unwrap();
        engine.transition_status(walk.id, BookingStatus::Paid).await.unwrap();
        engine.check_in(walk.id).await.unwrap();

        let online = engine
            .create_booking(online_booking(Ulid::new()))
            .await
            .unwrap();
        let receipt = engine
            .cancel_booking(online.id, CancelType::NoShow, Some("never arrived".into()))
            .await
            .unwrap();

        engine
            .set_room_maintenance(RoomRef::Id(r2.id), true)
            .await
            .unwrap();

        engine.compact_wal().await.unwrap();

        // Post-compaction appends land in the rewritten file.
        engine.add_room("504".into(), Ulid::new()).await.unwrap();

        (walk.id, online.id, receipt.cancel_id, r1.id, r2.id, r3.id)
    };

    let engine = open(&path);
    assert_eq!(engine.room_count(), 4);
    assert_eq!(engine.booking_count(), 2);
    assert_eq!(engine.status_of(walk_id).unwrap(), BookingStatus::CheckedIn);
    assert_eq!(engine.status_of(online_id).unwrap(), BookingStatus::Cancelled);
    assert_eq!(engine.get_room(r1_id).await.unwrap().status, RoomStatus::Occupied);
    assert_eq!(engine.get_room(r2_id).await.unwrap().status, RoomStatus::Maintenance);
    assert_eq!(engine.get_room(r3_id).await.unwrap().status, RoomStatus::Available);
    assert_eq!(engine.get_assigned_rooms(walk_id).unwrap().len(), 1);
    assert!(engine.is_room_assigned(walk_id).unwrap().is_assigned);

    let record = engine.get_cancellation(cancel_id).unwrap();
    assert_eq!(record.cancel_type, CancelType::NoShow);
    assert_eq!(record.reason.as_deref(), Some("never arrived"));

    // The rebuilt desk keeps working: check the guest out.
    let receipt = engine.check_out(walk_id).await.unwrap();
    assert_eq!(receipt.rooms_released, 1);
    assert_eq!(engine.get_room(r1_id).await.unwrap().status, RoomStatus::Available);
}
