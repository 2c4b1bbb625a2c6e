//! Decides which guests receive the enhanced follow-up sequence.
//!
//! A guest qualifies once onboarding has produced a display name and they have
//! picked an attendance status. The scores computed here are diagnostics for the
//! admin: they never change eligibility unless `min_eligibility_score` is raised.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::database::models::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityCheck {
    pub eligible: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IneligibleUser {
    pub user: User,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EligibilityStats {
    pub total: usize,
    pub eligible: usize,
    pub ineligible: usize,
    /// `eligible / total * 100`, or 0 for an empty input.
    pub eligibility_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EligibilityFilterResult {
    pub eligible: Vec<User>,
    pub ineligible: Vec<IneligibleUser>,
    pub stats: EligibilityStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityAssessment {
    pub user_id: i64,
    pub eligible: bool,
    pub reason: String,
    pub completeness_score: u8,
    pub eligibility_score: u8,
}

/// Result of the repository query behind the enhanced broadcast.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EligibleUsers {
    pub users: Vec<User>,
    pub total_count: usize,
    pub eligible_count: usize,
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

pub fn is_eligible(user: &User) -> EligibilityCheck {
    let has_name = has_text(user.display_name.as_deref());
    let has_status = has_text(user.attendance_status.as_deref());

    let reason = match (has_name, has_status) {
        (true, true) => "has display name and attendance status",
        (false, true) => "missing display name",
        (true, false) => "missing attendance status",
        (false, false) => "missing display name and attendance status",
    };

    EligibilityCheck {
        eligible: has_name && has_status,
        reason: reason.to_string(),
    }
}

pub fn filter_eligible(users: &[User]) -> EligibilityFilterResult {
    let mut result = EligibilityFilterResult::default();

    for user in users {
        let check = is_eligible(user);
        if check.eligible {
            result.eligible.push(user.clone());
        } else {
            result.ineligible.push(IneligibleUser {
                user: user.clone(),
                reason: check.reason,
            });
        }
    }

    let total = users.len();
    result.stats = EligibilityStats {
        total,
        eligible: result.eligible.len(),
        ineligible: result.ineligible.len(),
        eligibility_rate: percentage(result.eligible.len(), total),
    };

    result
}

/// Additive 0..=100 score: profile fields, activity and how recently the profile changed.
pub fn eligibility_score(user: &User, activity_count: u32, now: DateTime<Utc>) -> u8 {
    let mut score: u32 = 0;

    if has_text(user.display_name.as_deref()) {
        score += 20;
    }
    if has_text(user.attendance_status.as_deref()) {
        score += 20;
    }
    if has_text(user.username.as_deref()) {
        score += 15;
    }
    // Reserved for profile fields that do not exist yet (plus-one, dietary needs)
    score += 15;

    if activity_count > 0 {
        score += 15;
    }
    if activity_count > 3 {
        score += 15;
    }

    if let Some(updated) = user.updated_at_utc() {
        let age = now - updated;
        if age <= Duration::days(7) {
            score += 10;
        } else if age <= Duration::days(30) {
            score += 5;
        }
    }

    score.min(100) as u8
}

/// Percentage of {display name, handle, attendance status} that are filled in.
pub fn completeness(user: &User) -> u8 {
    let present = [
        user.display_name.as_deref(),
        user.username.as_deref(),
        user.attendance_status.as_deref(),
    ]
    .into_iter()
    .filter(|field| has_text(*field))
    .count();

    (present as f64 / 3.0 * 100.0).round() as u8
}

pub fn assess(user: &User, now: DateTime<Utc>) -> EligibilityAssessment {
    let check = is_eligible(user);
    let activity = u32::try_from(user.interaction_count.max(0)).unwrap_or(u32::MAX);

    EligibilityAssessment {
        user_id: user.id,
        eligible: check.eligible,
        reason: check.reason,
        completeness_score: completeness(user),
        eligibility_score: eligibility_score(user, activity, now),
    }
}

/// Loads every user and keeps the ones eligible for the enhanced sequence whose
/// score reaches `min_score`.
pub async fn load_eligible_users(
    pool: &sqlx::SqlitePool,
    min_score: u8,
) -> Result<EligibleUsers, sqlx::Error> {
    let users = User::find_all(pool).await?;
    let total_count = users.len();
    let now = Utc::now();

    let filtered = filter_eligible(&users);
    let eligible: Vec<User> = filtered
        .eligible
        .into_iter()
        .filter(|u| min_score == 0 || assess(u, now).eligibility_score >= min_score)
        .collect();

    tracing::debug!(
        "Eligibility: {} of {} users eligible ({:.1}%), {} after score threshold {}",
        filtered.stats.eligible,
        total_count,
        filtered.stats.eligibility_rate,
        eligible.len(),
        min_score
    );

    Ok(EligibleUsers {
        eligible_count: eligible.len(),
        users: eligible,
        total_count,
    })
}

pub(crate) fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Eligibility breakdown shown to admins before they send an enhanced broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudienceReport {
    pub stats: EligibilityStats,
    /// Ineligible guests grouped by reason, most common first.
    pub ineligible_reasons: Vec<(String, usize)>,
    pub average_completeness: f64,
    pub average_score: f64,
}

pub fn audience_report(users: &[User], now: DateTime<Utc>) -> AudienceReport {
    let filtered = filter_eligible(users);

    let mut reasons: Vec<(String, usize)> = Vec::new();
    for entry in &filtered.ineligible {
        match reasons.iter_mut().find(|(reason, _)| *reason == entry.reason) {
            Some((_, count)) => *count += 1,
            None => reasons.push((entry.reason.clone(), 1)),
        }
    }
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let (completeness_sum, score_sum) = users
        .iter()
        .map(|u| assess(u, now))
        .fold((0u64, 0u64), |(c, s), a| {
            (c + u64::from(a.completeness_score), s + u64::from(a.eligibility_score))
        });
    let average = |sum: u64| {
        if users.is_empty() {
            0.0
        } else {
            sum as f64 / users.len() as f64
        }
    };

    AudienceReport {
        stats: filtered.stats,
        ineligible_reasons: reasons,
        average_completeness: average(completeness_sum),
        average_score: average(score_sum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: Option<&str>, status: Option<&str>) -> User {
        User {
            id,
            chat_id: 1000 + id,
            username: None,
            display_name: name.map(str::to_string),
            attendance_status: status.map(str::to_string),
            interaction_count: 0,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_blank_values_do_not_count() {
        let check = is_eligible(&user(1, Some("   "), Some("attending")));
        assert!(!check.eligible);
        assert_eq!(check.reason, "missing display name");
    }

    #[test]
    fn test_percentage_of_empty_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }

    #[test]
    fn test_audience_report_groups_reasons() {
        let users = vec![
            user(1, Some("Ann"), Some("attending")),
            user(2, None, Some("maybe")),
            user(3, None, Some("attending")),
            user(4, Some("Dan"), None),
        ];
        let report = audience_report(&users, Utc::now());

        assert_eq!(report.stats.eligible, 1);
        assert_eq!(report.stats.ineligible, 3);
        assert_eq!(
            report.ineligible_reasons,
            vec![
                ("missing display name".to_string(), 2),
                ("missing attendance status".to_string(), 1)
            ]
        );
        assert!(report.average_completeness > 0.0);
    }

    #[test]
    fn test_audience_report_empty() {
        let report = audience_report(&[], Utc::now());
        assert_eq!(report.stats.total, 0);
        assert_eq!(report.average_score, 0.0);
    }
}
