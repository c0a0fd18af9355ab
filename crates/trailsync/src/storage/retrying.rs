//! Activity repository decorator applying the retry policy to every call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use trailsync_core::activity::{Activity, ActivityStats};
use trailsync_core::storage::{
    ActivityFilter, ActivityPage, ActivityRepository, Result, UpsertOutcome,
};

use super::retry::{with_retry, RetryPolicy};

/// Retrying activity repository decorator.
///
/// Each call runs under the policy's per-attempt timeout and is retried
/// with a fixed delay.
///
/// # Type Parameters
///
/// * `R` - The underlying repository implementation
pub struct RetryingActivityRepository<R>
where
    R: ActivityRepository + ?Sized,
{
    repository: Arc<R>,
    policy: RetryPolicy,
}

impl<R> RetryingActivityRepository<R>
where
    R: ActivityRepository + ?Sized,
{
    pub fn new(repository: Arc<R>, policy: RetryPolicy) -> Self {
        Self { repository, policy }
    }
}

#[async_trait]
impl<R> ActivityRepository for RetryingActivityRepository<R>
where
    R: ActivityRepository + ?Sized + 'static,
{
    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        with_retry(&self.policy, "get_activity", || {
            self.repository.get_activity(id)
        })
        .await
    }

    async fn list_activities(
        &self,
        user_id: Option<Uuid>,
        filter: &ActivityFilter,
    ) -> Result<ActivityPage> {
        with_retry(&self.policy, "list_activities", || {
            self.repository.list_activities(user_id, filter)
        })
        .await
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<UpsertOutcome> {
        with_retry(&self.policy, "upsert_activity", || {
            self.repository.upsert_activity(activity)
        })
        .await
    }

    async fn delete_activity(&self, id: Uuid) -> Result<bool> {
        with_retry(&self.policy, "delete_activity", || {
            self.repository.delete_activity(id)
        })
        .await
    }

    async fn delete_activities(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        with_retry(&self.policy, "delete_activities", || {
            self.repository.delete_activities(user_id, ids)
        })
        .await
    }

    async fn latest_start_date(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        with_retry(&self.policy, "latest_start_date", || {
            self.repository.latest_start_date(user_id)
        })
        .await
    }

    async fn activity_stats(&self, user_id: Option<Uuid>) -> Result<ActivityStats> {
        with_retry(&self.policy, "activity_stats", || {
            self.repository.activity_stats(user_id)
        })
        .await
    }

    async fn count_activities(&self) -> Result<u64> {
        with_retry(&self.policy, "count_activities", || {
            self.repository.count_activities()
        })
        .await
    }
}
