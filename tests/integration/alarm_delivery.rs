//! Alarm delivery after an event is added by voice or text.

use std::sync::Arc;

use hyodo::config::AlarmDelivery;
use hyodo::error::CompanionError;
use hyodo::identity::IdentityStore;
use hyodo::TurnRequest;

use crate::helpers::{ELDER, GUARDIAN, Harness, at, jan1};

async fn add_hospital_visit(h: &Harness) {
    h.model.script(r#"{"action":"ADD","title":"병원 예약","startDateTime":"2025-01-02T14:00:00"}"#);
    h.pipeline()
        .handle_at(TurnRequest::text(ELDER, "내일 2시에 병원 예약 잡아줘"), jan1(10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn poll_delivers_a_due_alarm_exactly_once() {
    let h = Harness::new();
    add_hospital_visit(&h).await;
    let dispatcher = h.dispatcher(AlarmDelivery::Poll);

    assert!(dispatcher.poll_for_user(ELDER, at(2, 13, 49)).unwrap().is_empty());

    let due = dispatcher.poll_for_user(ELDER, at(2, 13, 50)).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title, "병원 예약");
    assert!(due[0].alarm_sent);

    assert!(dispatcher.poll_for_user(ELDER, at(2, 13, 51)).unwrap().is_empty());
}

#[tokio::test]
async fn guardian_poll_consumes_the_elder_alarm() {
    let h = Harness::new();
    add_hospital_visit(&h).await;
    let dispatcher = h.dispatcher(AlarmDelivery::Poll);

    assert_eq!(dispatcher.poll_for_user(GUARDIAN, at(2, 13, 55)).unwrap().len(), 1);
    assert!(dispatcher.poll_for_user(ELDER, at(2, 13, 55)).unwrap().is_empty());
}

#[tokio::test]
async fn alarms_off_suppresses_delivery_until_switched_back_on() {
    let h = Harness::new();
    add_hospital_visit(&h).await;
    h.identity.set_alarm_enabled(ELDER, false).unwrap();
    let dispatcher = h.dispatcher(AlarmDelivery::Poll);

    assert!(dispatcher.poll_for_user(ELDER, at(2, 13, 55)).unwrap().is_empty());

    h.identity.set_alarm_enabled(ELDER, true).unwrap();
    assert_eq!(dispatcher.poll_for_user(ELDER, at(2, 13, 56)).unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_polls_deliver_at_most_once() {
    let h = Harness::new();
    add_hospital_visit(&h).await;
    let dispatcher = Arc::new(h.dispatcher(AlarmDelivery::Poll));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let user = if i % 2 == 0 { ELDER } else { GUARDIAN };
            std::thread::spawn(move || dispatcher.poll_for_user(user, at(2, 14, 0)).unwrap().len())
        })
        .collect();
    let delivered: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn sweep_mode_rejects_polling() {
    let h = Harness::new();
    add_hospital_visit(&h).await;
    let dispatcher = h.dispatcher(AlarmDelivery::Sweep);

    assert!(matches!(
        dispatcher.poll_for_user(ELDER, at(2, 14, 0)),
        Err(CompanionError::DeliveryPathInactive("poll"))
    ));
    assert_eq!(dispatcher.sweep(at(2, 14, 0)).unwrap().len(), 1);
    assert!(dispatcher.sweep(at(2, 14, 1)).unwrap().is_empty());
}
