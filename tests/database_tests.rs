use anyhow::Result;
use wedding_rsvp_bot::database::{connection::DatabaseManager, models::*};
use tempfile::{tempdir, TempDir};

async fn setup_test_db() -> Result<(DatabaseManager, TempDir)> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("test.db");
    let database_url = format!("sqlite:{}", db_path.display());

    let db_manager = DatabaseManager::new(&database_url).await?;
    db_manager.run_migrations().await?;

    Ok((db_manager, temp_dir))
}

#[tokio::test]
async fn test_user_registration_and_retrieval() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    let user = User::register(&db.pool, 12345, Some("jane".to_string()), None).await?;
    assert_eq!(user.chat_id, 12345);
    assert_eq!(user.username.as_deref(), Some("jane"));
    assert!(user.display_name.is_none());
    assert!(user.attendance().is_none());
    assert_eq!(user.interaction_count, 1);

    let found = User::find_by_chat_id(&db.pool, 12345).await?;
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(User::find_by_chat_id(&db.pool, 99999).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_register_again_keeps_display_name() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    User::register(&db.pool, 1, Some("old".to_string()), Some("Jane Doe".to_string())).await?;
    let again = User::register(&db.pool, 1, Some("new".to_string()), Some("Someone Else".to_string())).await?;

    assert_eq!(again.display_name.as_deref(), Some("Jane Doe"));
    assert_eq!(again.username.as_deref(), Some("new"));
    assert_eq!(again.interaction_count, 2);
    assert_eq!(User::find_all(&db.pool).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_profile_updates() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    User::register(&db.pool, 7, None, None).await?;

    assert!(User::set_display_name(&db.pool, 7, "  Jane Doe ").await?);
    assert!(User::set_attendance(&db.pool, 7, AttendanceStatus::Maybe).await?);
    assert!(!User::set_attendance(&db.pool, 8, AttendanceStatus::Maybe).await?);

    let user = User::find_by_chat_id(&db.pool, 7).await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(user.display_name.as_deref(), Some("Jane Doe"));
    assert_eq!(user.attendance(), Some(AttendanceStatus::Maybe));
    assert_eq!(user.interaction_count, 3);
    assert!(user.updated_at_utc().is_some());

    Ok(())
}

#[tokio::test]
async fn test_find_by_attendance() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    for (chat_id, status) in [
        (1, Some(AttendanceStatus::Attending)),
        (2, Some(AttendanceStatus::NotAttending)),
        (3, Some(AttendanceStatus::Maybe)),
        (4, None),
    ] {
        User::register(&db.pool, chat_id, None, None).await?;
        if let Some(status) = status {
            User::set_attendance(&db.pool, chat_id, status).await?;
        }
    }

    let coming = User::find_by_attendance(
        &db.pool,
        &[AttendanceStatus::Attending, AttendanceStatus::Maybe],
    )
    .await?;
    let chats: Vec<i64> = coming.iter().map(|u| u.chat_id).collect();
    assert_eq!(chats, vec![1, 3]);

    assert!(User::find_by_attendance(&db.pool, &[]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_attendance_constraint_rejects_unknown_values() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    User::register(&db.pool, 1, None, None).await?;

    let result = sqlx::query("UPDATE users SET attendance_status = 'perhaps' WHERE chat_id = 1")
        .execute(&db.pool)
        .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_broadcast_log_and_retry() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    let record = NewBroadcastLog {
        broadcast_id: "bcast-0001".to_string(),
        message_text: "Hello".to_string(),
        sent_by: 1,
        total_users: 10,
        delivered_count: 7,
        failed_count: 3,
        blocked_count: 1,
        ..NewBroadcastLog::default()
    };
    BroadcastLog::create(&db.pool, &record).await?;

    // broadcast_id is unique
    assert!(BroadcastLog::create(&db.pool, &record).await.is_err());

    BroadcastLog::apply_retry(&db.pool, "bcast-0001", 2, 0).await?;
    let log = BroadcastLog::find_by_broadcast_id(&db.pool, "bcast-0001")
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing log"))?;
    assert_eq!(log.delivered_count, 9);
    assert_eq!(log.failed_count, 1);
    assert_eq!(log.blocked_count, 1);
    assert!(!log.enhanced_mode);

    // The last failure turned out to be a block
    BroadcastLog::apply_retry(&db.pool, "bcast-0001", 0, 1).await?;
    let log = BroadcastLog::find_by_broadcast_id(&db.pool, "bcast-0001")
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing log"))?;
    assert_eq!(log.delivered_count, 9);
    assert_eq!(log.failed_count, 1);
    assert_eq!(log.blocked_count, 2);

    assert_eq!(BroadcastLog::find_recent(&db.pool, 5).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delivery_rows_are_upserted() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    let first = vec![
        NewDelivery { user_id: 1, chat_id: 11, status: "delivered", error_text: None },
        NewDelivery { user_id: 2, chat_id: 22, status: "failed", error_text: Some("timeout".to_string()) },
    ];
    assert_eq!(BroadcastDelivery::record_all(&db.pool, "b1", &first).await?, 2);

    let retry = vec![NewDelivery { user_id: 2, chat_id: 22, status: "delivered", error_text: None }];
    BroadcastDelivery::record_all(&db.pool, "b1", &retry).await?;

    let rows = BroadcastDelivery::find_by_broadcast(&db.pool, "b1").await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == "delivered"));
    assert!(rows.iter().all(|r| r.error_text.is_none()));
    assert!(BroadcastDelivery::find_by_broadcast(&db.pool, "other").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_sequence_step_logs() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    SequenceStepLog::create(&db.pool, 1, "b1", "useful_info", "delivered", "seq-1", 100.0, None).await?;
    SequenceStepLog::create(&db.pool, 1, "b1", "menu_trigger", "failed", "seq-1", 75.0, Some("boom")).await?;

    let rows = SequenceStepLog::find_by_broadcast(&db.pool, "b1").await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].error_text.as_deref(), Some("boom"));

    let bad = SequenceStepLog::create(&db.pool, 1, "b1", "menu_trigger", "skipped", "seq-1", 0.0, None).await;
    assert!(bad.is_err());
    Ok(())
}

#[tokio::test]
async fn test_reminder_bookkeeping() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    assert!(!Reminder::exists(&db.pool, 7).await?);
    let reminder = Reminder::create(&db.pool, 7, 12).await?;
    assert_eq!(reminder.days_before, 7);
    assert_eq!(reminder.recipients, 12);
    assert!(!reminder.id.is_empty());
    assert!(Reminder::exists(&db.pool, 7).await?);
    assert!(!Reminder::exists(&db.pool, 1).await?);

    Reminder::create(&db.pool, 30, 10).await?;
    let all: Vec<i64> = Reminder::find_all(&db.pool).await?.iter().map(|r| r.days_before).collect();
    assert_eq!(all, vec![30, 7]);

    Ok(())
}
