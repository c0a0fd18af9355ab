use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::activity::{Activity, ActivityStats, ImportLog};
use crate::auth::User;
use crate::connection::{OAuthConnection, OAuthProvider};
use crate::settings::SystemSetting;

use super::{ActivityFilter, ActivityPage, Result, UpsertOutcome};

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Gets a user by their ID.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Gets a user by username (case-sensitive).
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Lists all users ordered by username.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Creates a new user. Fails with `AlreadyExists` on a duplicate username.
    async fn create_user(&self, user: &User) -> Result<()>;

    /// Updates an existing user.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Deletes a user and everything they own.
    async fn delete_user(&self, id: Uuid) -> Result<()>;

    async fn count_users(&self) -> Result<u64>;
}

/// Repository for key/value system settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>>;

    /// Lists all settings ordered by key.
    async fn list_settings(&self) -> Result<Vec<SystemSetting>>;

    /// Inserts or replaces a setting by key.
    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()>;

    /// Deletes a setting. Returns false when it did not exist.
    async fn delete_setting(&self, key: &str) -> Result<bool>;
}

/// Repository for stored OAuth connections.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn get_connection(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthConnection>>;

    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<OAuthConnection>>;

    /// Inserts or replaces the connection for `(user_id, provider)`.
    async fn upsert_connection(&self, connection: &OAuthConnection) -> Result<()>;

    /// Deletes a connection. Returns false when it did not exist.
    async fn delete_connection(&self, user_id: Uuid, provider: OAuthProvider) -> Result<bool>;

    async fn count_connections(&self, provider: OAuthProvider) -> Result<u64>;
}

/// Repository for imported activities.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>>;

    /// Lists activities for one user, or for everyone when `user_id` is `None`.
    async fn list_activities(
        &self,
        user_id: Option<Uuid>,
        filter: &ActivityFilter,
    ) -> Result<ActivityPage>;

    /// Inserts or updates by `(user_id, strava_id)`. An existing row keeps
    /// its `id` and `imported_at`.
    async fn upsert_activity(&self, activity: &Activity) -> Result<UpsertOutcome>;

    /// Deletes an activity. Returns false when it did not exist.
    async fn delete_activity(&self, id: Uuid) -> Result<bool>;

    /// Deletes the given activities owned by `user_id`, returning how many went.
    async fn delete_activities(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64>;

    /// Start date of the user's most recent activity.
    async fn latest_start_date(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    async fn activity_stats(&self, user_id: Option<Uuid>) -> Result<ActivityStats>;

    async fn count_activities(&self) -> Result<u64>;
}

/// Repository for import batch logs.
#[async_trait]
pub trait ImportLogRepository: Send + Sync {
    async fn create_import_log(&self, log: &ImportLog) -> Result<()>;

    async fn update_import_log(&self, log: &ImportLog) -> Result<()>;

    /// Most recent logs first.
    async fn list_import_logs(&self, user_id: Option<Uuid>, limit: u32) -> Result<Vec<ImportLog>>;
}

/// Connectivity probe for the backing store.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
