//! In-memory repository implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use trailsync_core::activity::{compute_stats, Activity, ActivityStats, ImportLog};
use trailsync_core::auth::User;
use trailsync_core::connection::{OAuthConnection, OAuthProvider};
use trailsync_core::settings::SystemSetting;
use trailsync_core::storage::{
    apply_filter, ActivityFilter, ActivityPage, ActivityRepository, ConnectionRepository,
    HealthCheck, ImportLogRepository, RepositoryError, Result, SettingsRepository,
    UpsertOutcome, UserRepository,
};

/// In-memory storage backend for testing and demo mode.
///
/// Uses HashMaps wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and will be lost when the repository is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    settings: Arc<RwLock<HashMap<String, SystemSetting>>>,
    connections: Arc<RwLock<HashMap<(Uuid, OAuthProvider), OAuthConnection>>>,
    activities: Arc<RwLock<HashMap<Uuid, Activity>>>,
    import_logs: Arc<RwLock<HashMap<Uuid, ImportLog>>>,
}

impl InMemoryRepository {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(list)
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) || users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                id: user.username.clone(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found("User", user.id)),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        if self.users.write().await.remove(&id).is_none() {
            return Err(RepositoryError::not_found("User", id));
        }
        // Cascade like the foreign keys do in Postgres.
        self.activities.write().await.retain(|_, a| a.user_id != id);
        self.connections.write().await.retain(|(user, _), _| *user != id);
        self.import_logs.write().await.retain(|_, l| l.user_id != id);
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.read().await.len() as u64)
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>> {
        let settings = self.settings.read().await;
        Ok(settings.get(key).cloned())
    }

    async fn list_settings(&self) -> Result<Vec<SystemSetting>> {
        let settings = self.settings.read().await;
        let mut list: Vec<SystemSetting> = settings.values().cloned().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(list)
    }

    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()> {
        let mut settings = self.settings.write().await;
        settings.insert(setting.key.clone(), setting.clone());
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<bool> {
        let mut settings = self.settings.write().await;
        Ok(settings.remove(key).is_some())
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryRepository {
    async fn get_connection(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthConnection>> {
        let connections = self.connections.read().await;
        Ok(connections.get(&(user_id, provider)).cloned())
    }

    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<OAuthConnection>> {
        let connections = self.connections.read().await;
        let mut list: Vec<OAuthConnection> = connections
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.provider.as_str());
        Ok(list)
    }

    async fn upsert_connection(&self, connection: &OAuthConnection) -> Result<()> {
        let mut connections = self.connections.write().await;
        let key = (connection.user_id, connection.provider);
        let mut stored = connection.clone();
        if let Some(existing) = connections.get(&key) {
            stored.created_at = existing.created_at;
        }
        connections.insert(key, stored);
        Ok(())
    }

    async fn delete_connection(&self, user_id: Uuid, provider: OAuthProvider) -> Result<bool> {
        let mut connections = self.connections.write().await;
        Ok(connections.remove(&(user_id, provider)).is_some())
    }

    async fn count_connections(&self, provider: OAuthProvider) -> Result<u64> {
        let connections = self.connections.read().await;
        Ok(connections.keys().filter(|(_, p)| *p == provider).count() as u64)
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        let activities = self.activities.read().await;
        Ok(activities.get(&id).cloned())
    }

    async fn list_activities(
        &self,
        user_id: Option<Uuid>,
        filter: &ActivityFilter,
    ) -> Result<ActivityPage> {
        let activities = self.activities.read().await;
        Ok(apply_filter(
            activities
                .values()
                .filter(|a| user_id.is_none_or(|u| a.user_id == u)),
            filter,
        ))
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<UpsertOutcome> {
        let mut activities = self.activities.write().await;
        let existing = activities
            .values()
            .find(|a| a.user_id == activity.user_id && a.strava_id == activity.strava_id)
            .map(|a| (a.id, a.imported_at));

        match existing {
            Some((id, imported_at)) => {
                let mut updated = activity.clone();
                updated.id = id;
                updated.imported_at = imported_at;
                activities.insert(id, updated);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                activities.insert(activity.id, activity.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn delete_activity(&self, id: Uuid) -> Result<bool> {
        let mut activities = self.activities.write().await;
        Ok(activities.remove(&id).is_some())
    }

    async fn delete_activities(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let mut activities = self.activities.write().await;
        let before = activities.len();
        activities.retain(|id, a| a.user_id != user_id || !ids.contains(id));
        Ok((before - activities.len()) as u64)
    }

    async fn latest_start_date(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let activities = self.activities.read().await;
        Ok(activities
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.start_date)
            .max())
    }

    async fn activity_stats(&self, user_id: Option<Uuid>) -> Result<ActivityStats> {
        let activities = self.activities.read().await;
        let selected: Vec<Activity> = activities
            .values()
            .filter(|a| user_id.is_none_or(|u| a.user_id == u))
            .cloned()
            .collect();
        Ok(compute_stats(&selected))
    }

    async fn count_activities(&self) -> Result<u64> {
        Ok(self.activities.read().await.len() as u64)
    }
}

#[async_trait]
impl ImportLogRepository for InMemoryRepository {
    async fn create_import_log(&self, log: &ImportLog) -> Result<()> {
        let mut logs = self.import_logs.write().await;
        if logs.contains_key(&log.id) {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "ImportLog",
                id: log.id.to_string(),
            });
        }
        logs.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_import_log(&self, log: &ImportLog) -> Result<()> {
        let mut logs = self.import_logs.write().await;
        match logs.get_mut(&log.id) {
            Some(existing) => {
                *existing = log.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found("ImportLog", log.id)),
        }
    }

    async fn list_import_logs(&self, user_id: Option<Uuid>, limit: u32) -> Result<Vec<ImportLog>> {
        let logs = self.import_logs.read().await;
        let mut list: Vec<ImportLog> = logs
            .values()
            .filter(|l| user_id.is_none_or(|u| l.user_id == u))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        list.truncate(limit as usize);
        Ok(list)
    }
}

#[async_trait]
impl HealthCheck for InMemoryRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use trailsync_core::activity::ImportStatus;

    use super::*;

    fn activity(user_id: Uuid, strava_id: i64, days_ago: i64) -> Activity {
        let start = Utc.with_ymd_and_hms(2024, 6, 30, 8, 0, 0).unwrap() - Duration::days(days_ago);
        Activity::new(user_id, strava_id, format!("Run {strava_id}"), "Run", start)
            .with_effort(5_000.0, 1_500, 1_600)
    }

    #[tokio::test]
    async fn test_user_crud() {
        let repo = InMemoryRepository::new();
        let user = User::new("alice", "hash");

        repo.create_user(&user).await.unwrap();
        assert_eq!(
            repo.get_user_by_username("alice").await.unwrap().unwrap().id,
            user.id
        );

        let duplicate = User::new("alice", "other");
        let err = repo.create_user(&duplicate).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists { .. }));

        let mut updated = user.clone();
        updated.display_name = "Alice A.".to_string();
        repo.update_user(&updated).await.unwrap();
        assert_eq!(
            repo.get_user(user.id).await.unwrap().unwrap().display_name,
            "Alice A."
        );

        repo.delete_user(user.id).await.unwrap();
        assert!(repo.get_user(user.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_user(user.id).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let repo = InMemoryRepository::new();
        let user = User::new("bob", "hash");
        repo.create_user(&user).await.unwrap();
        repo.upsert_activity(&activity(user.id, 1, 0)).await.unwrap();
        repo.upsert_connection(&OAuthConnection::new(user.id, OAuthProvider::Strava, "tok"))
            .await
            .unwrap();
        repo.create_import_log(&ImportLog::start(user.id, Utc::now()))
            .await
            .unwrap();

        repo.delete_user(user.id).await.unwrap();

        assert_eq!(repo.count_activities().await.unwrap(), 0);
        assert_eq!(
            repo.count_connections(OAuthProvider::Strava).await.unwrap(),
            0
        );
        assert!(repo.list_import_logs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_activity_keeps_identity() {
        let repo = InMemoryRepository::new();
        let user = Uuid::new_v4();
        let first = activity(user, 77, 1);
        assert_eq!(
            repo.upsert_activity(&first).await.unwrap(),
            UpsertOutcome::Inserted
        );

        let mut again = activity(user, 77, 1);
        again.name = "Renamed".to_string();
        assert_eq!(
            repo.upsert_activity(&again).await.unwrap(),
            UpsertOutcome::Updated
        );

        let stored = repo.get_activity(first.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.imported_at, first.imported_at);
        assert!(repo.get_activity(again.id).await.unwrap().is_none());
        assert_eq!(repo.count_activities().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_strava_id_for_different_users() {
        let repo = InMemoryRepository::new();
        repo.upsert_activity(&activity(Uuid::new_v4(), 5, 0))
            .await
            .unwrap();
        let outcome = repo
            .upsert_activity(&activity(Uuid::new_v4(), 5, 0))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let repo = InMemoryRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (id, days) in [(1, 3), (2, 1), (3, 2)] {
            repo.upsert_activity(&activity(alice, id, days)).await.unwrap();
        }
        repo.upsert_activity(&activity(bob, 9, 0)).await.unwrap();

        let page = repo
            .list_activities(Some(alice), &ActivityFilter::default())
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|a| a.strava_id).collect();
        assert_eq!(ids, [2, 3, 1]);
        assert_eq!(page.total, 3);

        let everyone = repo
            .list_activities(None, &ActivityFilter::default())
            .await
            .unwrap();
        assert_eq!(everyone.total, 4);
    }

    #[tokio::test]
    async fn test_bulk_delete_only_touches_owner() {
        let repo = InMemoryRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = activity(alice, 1, 0);
        let a2 = activity(alice, 2, 1);
        let b1 = activity(bob, 3, 0);
        for a in [&a1, &a2, &b1] {
            repo.upsert_activity(a).await.unwrap();
        }

        let removed = repo
            .delete_activities(alice, &[a1.id, b1.id])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(repo.get_activity(a1.id).await.unwrap().is_none());
        assert!(repo.get_activity(a2.id).await.unwrap().is_some());
        assert!(repo.get_activity(b1.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_latest_start_and_stats() {
        let repo = InMemoryRepository::new();
        let user = Uuid::new_v4();
        assert_eq!(repo.latest_start_date(user).await.unwrap(), None);

        let newest = activity(user, 1, 0);
        repo.upsert_activity(&newest).await.unwrap();
        repo.upsert_activity(&activity(user, 2, 5)).await.unwrap();

        assert_eq!(
            repo.latest_start_date(user).await.unwrap(),
            Some(newest.start_date)
        );
        let stats = repo.activity_stats(Some(user)).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_distance_m, 10_000.0);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let repo = InMemoryRepository::new();
        repo.upsert_setting(&SystemSetting::new("openai_model", "a"))
            .await
            .unwrap();
        repo.upsert_setting(&SystemSetting::new("openai_model", "b"))
            .await
            .unwrap();

        assert_eq!(
            repo.get_setting("openai_model").await.unwrap().unwrap().value,
            "b"
        );
        assert_eq!(repo.list_settings().await.unwrap().len(), 1);
        assert!(repo.delete_setting("openai_model").await.unwrap());
        assert!(!repo.delete_setting("openai_model").await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_upsert_keeps_created_at() {
        let repo = InMemoryRepository::new();
        let user = Uuid::new_v4();
        let first = OAuthConnection::new(user, OAuthProvider::GooglePhotos, "a");
        repo.upsert_connection(&first).await.unwrap();

        let mut second = OAuthConnection::new(user, OAuthProvider::GooglePhotos, "b");
        second.created_at = first.created_at + Duration::hours(1);
        repo.upsert_connection(&second).await.unwrap();

        let stored = repo
            .get_connection(user, OAuthProvider::GooglePhotos)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "b");
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(repo.list_connections(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_logs_newest_first_with_limit() {
        let repo = InMemoryRepository::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for minutes in [30, 10, 20] {
            repo.create_import_log(&ImportLog::start(user, now - Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let logs = repo.list_import_logs(Some(user), 2).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].started_at > logs[1].started_at);

        let mut log = logs[0].clone();
        log.finish(ImportStatus::Completed, None, now);
        repo.update_import_log(&log).await.unwrap();
        let stored = repo.list_import_logs(Some(user), 1).await.unwrap();
        assert_eq!(stored[0].status, ImportStatus::Completed);
    }
}
