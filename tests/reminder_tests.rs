#![allow(clippy::unwrap_used)]

mod common;

use chrono::{Duration, Utc};
use common::{fast_config, insert_user, setup_test_db, MockTransport, BLOCKED_ERROR};
use std::sync::Arc;
use wedding_rsvp_bot::config::EventConfig;
use wedding_rsvp_bot::database::connection::DatabaseManager;
use wedding_rsvp_bot::database::models::{AttendanceStatus, Reminder};
use wedding_rsvp_bot::services::delivery_tracker::DeliveryTracker;
use wedding_rsvp_bot::services::reminder::ReminderService;

async fn service(
    db: &DatabaseManager,
    transport: Arc<MockTransport>,
    event: EventConfig,
) -> ReminderService {
    service_with_tracker(db, transport, event, DeliveryTracker::new()).await
}

async fn service_with_tracker(
    db: &DatabaseManager,
    transport: Arc<MockTransport>,
    event: EventConfig,
    tracker: DeliveryTracker,
) -> ReminderService {
    ReminderService::new(db.clone(), transport, event, fast_config(), tracker)
        .await
        .unwrap()
}

async fn seed(db: &DatabaseManager) {
    insert_user(db, 1, Some("Ann"), Some(AttendanceStatus::Attending)).await;
    insert_user(db, 2, Some("Bob"), Some(AttendanceStatus::Maybe)).await;
    insert_user(db, 3, Some("Cy"), Some(AttendanceStatus::NotAttending)).await;
    insert_user(db, 4, None, None).await;
}

#[tokio::test]
async fn test_week_reminder_goes_to_guests_who_have_not_declined() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().into_arc();
    let now = Utc::now();
    let event = EventConfig {
        date: Some(now + Duration::days(7) + Duration::hours(3)),
        ..EventConfig::default()
    };
    let reminders = service(&db, transport.clone(), event).await;

    let sent = reminders.check_reminders_at(now).await.unwrap();

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].days_before, 7);
    assert_eq!(sent[0].recipients, 2);
    assert_eq!(sent[0].delivered, 2);
    assert_eq!(transport.sent_to(1).len(), 1);
    assert!(transport.sent_to(1)[0].markdown);
    assert!(transport.sent_to(1)[0].text.contains("One week to go"));
    assert_eq!(transport.sent_to(2).len(), 1);
    assert!(transport.sent_to(3).is_empty());
    assert!(transport.sent_to(4).is_empty());
    assert!(Reminder::exists(&db.pool, 7).await.unwrap());
}

#[tokio::test]
async fn test_reminder_is_sent_only_once() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().into_arc();
    let now = Utc::now();
    let event = EventConfig {
        date: Some(now + Duration::days(1) + Duration::hours(2)),
        ..EventConfig::default()
    };
    let reminders = service(&db, transport.clone(), event).await;

    assert_eq!(reminders.check_reminders_at(now).await.unwrap().len(), 1);
    assert!(reminders
        .check_reminders_at(now + Duration::hours(1))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn test_reminder_in_flight_is_skipped_then_sent_once() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().into_arc();
    let tracker = DeliveryTracker::new();
    let now = Utc::now();
    let event = EventConfig {
        date: Some(now + Duration::days(7) + Duration::hours(3)),
        ..EventConfig::default()
    };
    let reminders = service_with_tracker(&db, transport.clone(), event, tracker.clone()).await;

    let running = tracker.try_begin("reminder:7").unwrap();
    assert!(reminders.check_reminders_at(now).await.unwrap().is_empty());
    assert_eq!(transport.attempts(), 0);
    assert!(!Reminder::exists(&db.pool, 7).await.unwrap());

    drop(running);
    assert_eq!(reminders.check_reminders_at(now).await.unwrap().len(), 1);
    assert!(reminders.check_reminders_at(now).await.unwrap().is_empty());
    assert_eq!(transport.attempts(), 2);
    assert!(!tracker.is_active("reminder:7"));
}

#[tokio::test]
async fn test_no_reminder_outside_reminder_days() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().into_arc();
    let now = Utc::now();
    let event = EventConfig {
        date: Some(now + Duration::days(12)),
        ..EventConfig::default()
    };
    let reminders = service(&db, transport.clone(), event).await;

    assert!(reminders.check_reminders_at(now).await.unwrap().is_empty());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_no_event_date_sends_nothing() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().into_arc();
    let reminders = service(&db, transport.clone(), EventConfig::default()).await;

    assert!(reminders.check_reminders_now().await.unwrap().is_empty());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_failed_deliveries_still_mark_reminder_sent() {
    let (db, _temp_dir) = setup_test_db().await;
    seed(&db).await;
    let transport = MockTransport::new().failing_chat(1, BLOCKED_ERROR).into_arc();
    let now = Utc::now();
    let event = EventConfig {
        date: Some(now + Duration::days(30) + Duration::hours(5)),
        ..EventConfig::default()
    };
    let reminders = service(&db, transport, event).await;

    let sent = reminders.check_reminders_at(now).await.unwrap();

    assert_eq!(sent[0].days_before, 30);
    assert_eq!(sent[0].recipients, 2);
    assert_eq!(sent[0].delivered, 1);
    let stored = Reminder::find_all(&db.pool).await.unwrap();
    assert_eq!(stored[0].recipients, 1);
}
