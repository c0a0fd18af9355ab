//! Demo data: a seeded demo account and the fallback activity list served
//! when a read fails.

use chrono::{NaiveTime, Utc};
use uuid::Uuid;

use trailsync_auth::create_account;
use trailsync_core::activity::Activity;
use trailsync_core::auth::{Role, User};
use trailsync_core::mock_data::generate_demo_activities;
use trailsync_core::storage::{apply_filter, ActivityFilter, ActivityPage};

use crate::state::AppState;

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_PASSWORD: &str = "demo-password";
pub const DEMO_ACTIVITY_COUNT: u32 = 24;

/// Creates the demo account with a few weeks of activities, once.
pub async fn seed_demo_data(state: &AppState) -> anyhow::Result<User> {
    if let Some(user) = state.users.get_user_by_username(DEMO_USERNAME).await? {
        tracing::debug!("demo user already exists");
        return Ok(user);
    }

    let user = create_account(
        state.users.as_ref(),
        DEMO_USERNAME,
        DEMO_PASSWORD,
        Role::User,
        state.auth.config.bcrypt_cost,
    )
    .await?;

    for activity in generate_demo_activities(user.id, Utc::now(), DEMO_ACTIVITY_COUNT) {
        state.activities.upsert_activity(&activity).await?;
    }

    tracing::info!(
        username = DEMO_USERNAME,
        activities = DEMO_ACTIVITY_COUNT,
        "seeded demo data"
    );
    Ok(user)
}

/// Demo activities for `user_id`, used when the real read failed.
///
/// Ids and dates are derived from the user and the current day, so repeated
/// reads return the same activities.
pub fn fallback_activities(user_id: Uuid) -> Vec<Activity> {
    let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    generate_demo_activities(user_id, today, DEMO_ACTIVITY_COUNT)
        .into_iter()
        .map(|mut activity| {
            activity.id = Uuid::new_v5(&user_id, &activity.strava_id.to_be_bytes());
            activity
        })
        .collect()
}

/// A filtered page of fallback activities.
pub fn fallback_page(user_id: Uuid, filter: &ActivityFilter) -> ActivityPage {
    let activities = fallback_activities(user_id);
    apply_filter(&activities, filter)
}
