#![allow(clippy::unwrap_used)]

mod common;

use chrono::{Duration, Utc};
use common::{insert_user, setup_test_db};
use wedding_rsvp_bot::database::models::{AttendanceStatus, User};
use wedding_rsvp_bot::services::eligibility::{
    assess, completeness, eligibility_score, filter_eligible, is_eligible, load_eligible_users,
};

fn user(id: i64, name: Option<&str>, handle: Option<&str>, status: Option<&str>, updated_days_ago: i64) -> User {
    let updated = (Utc::now() - Duration::days(updated_days_ago)).to_rfc3339();
    User {
        id,
        chat_id: 500 + id,
        username: handle.map(str::to_string),
        display_name: name.map(str::to_string),
        attendance_status: status.map(str::to_string),
        interaction_count: 0,
        created_at: updated.clone(),
        updated_at: updated,
    }
}

#[test]
fn test_is_eligible_reasons() {
    assert!(is_eligible(&user(1, Some("Ann"), None, Some("maybe"), 0)).eligible);

    let no_status = is_eligible(&user(2, Some("Ann"), None, None, 0));
    assert!(!no_status.eligible);
    assert_eq!(no_status.reason, "missing attendance status");

    let nothing = is_eligible(&user(3, None, Some("ann"), None, 0));
    assert_eq!(nothing.reason, "missing display name and attendance status");
}

#[test]
fn test_filter_partitions_users() {
    let users = vec![
        user(1, Some("Ann"), None, Some("attending"), 0),
        user(2, Some("Bob"), None, Some("not_attending"), 0),
        user(3, Some("Cy"), None, Some("maybe"), 0),
        user(4, None, Some("dee"), Some("attending"), 0),
    ];

    let result = filter_eligible(&users);

    assert_eq!(result.stats.total, 4);
    assert_eq!(result.stats.eligible, 3);
    assert_eq!(result.stats.ineligible, 1);
    assert_eq!(result.stats.eligibility_rate, 75.0);
    assert_eq!(result.eligible.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(result.ineligible[0].user.id, 4);
    assert_eq!(result.ineligible[0].reason, "missing display name");
}

#[test]
fn test_filter_empty_input() {
    let result = filter_eligible(&[]);
    assert_eq!(result.stats.total, 0);
    assert_eq!(result.stats.eligibility_rate, 0.0);
    assert!(result.eligible.is_empty());
}

#[test]
fn test_score_is_capped() {
    let full = user(1, Some("Ann"), Some("ann"), Some("attending"), 0);
    assert_eq!(eligibility_score(&full, 5, Utc::now()), 100);
}

#[test]
fn test_score_components() {
    let now = Utc::now();
    // Only the reserved points
    let bare = user(1, None, None, None, 60);
    assert_eq!(eligibility_score(&bare, 0, now), 15);

    // Name, status, some activity, updated last week-ish
    let partial = user(2, Some("Bob"), None, Some("maybe"), 10);
    assert_eq!(eligibility_score(&partial, 2, now), 20 + 20 + 15 + 15 + 5);

    // Recently updated with a handle
    let recent = user(3, None, Some("cy"), None, 1);
    assert_eq!(eligibility_score(&recent, 0, now), 15 + 15 + 10);
}

#[test]
fn test_completeness() {
    assert_eq!(completeness(&user(1, Some("Ann"), Some("ann"), Some("maybe"), 0)), 100);
    assert_eq!(completeness(&user(2, Some("Ann"), None, None, 0)), 33);
    assert_eq!(completeness(&user(3, None, None, None, 0)), 0);
}

#[test]
fn test_assess_combines_everything() {
    let mut guest = user(9, Some("Ann"), None, Some("attending"), 0);
    guest.interaction_count = 4;
    let assessment = assess(&guest, Utc::now());

    assert_eq!(assessment.user_id, 9);
    assert!(assessment.eligible);
    assert_eq!(assessment.completeness_score, 67);
    assert_eq!(assessment.eligibility_score, 20 + 20 + 15 + 15 + 15 + 10);
}

#[tokio::test]
async fn test_load_eligible_users_from_database() {
    let (db, _temp_dir) = setup_test_db().await;
    insert_user(&db, 1, Some("Ann"), Some(AttendanceStatus::Attending)).await;
    insert_user(&db, 2, Some("Bob"), None).await;
    insert_user(&db, 3, None, Some(AttendanceStatus::Maybe)).await;

    let loaded = load_eligible_users(&db.pool, 0).await.unwrap();
    assert_eq!(loaded.total_count, 3);
    assert_eq!(loaded.eligible_count, 1);
    assert_eq!(loaded.users[0].chat_id, 1);

    // Ann scores 20 + 20 + 15 + 15 + 15 + 10 = 95 after two interactions
    assert_eq!(load_eligible_users(&db.pool, 95).await.unwrap().eligible_count, 1);
    assert_eq!(load_eligible_users(&db.pool, 96).await.unwrap().eligible_count, 0);
}
