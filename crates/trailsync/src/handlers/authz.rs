//! Authorization helpers for activity handlers.
//!
//! An activity is visible to its owner and to administrators. Anyone else
//! gets 403 Forbidden.

use uuid::Uuid;

use trailsync_core::activity::Activity;
use trailsync_core::auth::User;

use super::{ApiError, AppError};
use crate::state::AppState;

/// Loads an activity the user may read or delete.
pub async fn require_activity_access(
    state: &AppState,
    user: &User,
    activity_id: Uuid,
) -> Result<Activity, AppError> {
    let activity = state
        .activities
        .get_activity(activity_id)
        .await?
        .ok_or(ApiError::NotFound("Activity"))?;

    if activity.user_id != user.id && !user.is_admin() {
        tracing::warn!(
            activity_id = %activity_id,
            user_id = %user.id,
            "Authorization denied: not the owner"
        );
        return Err(ApiError::Forbidden.into());
    }

    Ok(activity)
}
