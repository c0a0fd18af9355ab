//! Strava import: paginated fetch, per-activity upsert, and the ImportLog
//! that records the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use trailsync_core::activity::{
    incremental_after, should_fetch_next_page, ImportLog, ImportRequest, ImportStatus,
};
use trailsync_core::connection::OAuthProvider;
use trailsync_core::storage::{ImportLogRepository, UpsertOutcome};

use crate::integrations::strava::activity_from_strava;
use crate::integrations::IntegrationError;
use crate::services::tokens::fresh_connection;
use crate::state::AppState;
use crate::storage::{with_retry, RetryPolicy};

const SHUTDOWN_MESSAGE: &str = "server shutting down";
const ABORTED_MESSAGE: &str = "request aborted";

/// Records the log if the import future is dropped before its outcome was
/// written, which is what happens when the browser aborts its fetch or the
/// final write fails. A log that was never finished is marked cancelled.
struct ImportGuard {
    repo: Arc<dyn ImportLogRepository>,
    policy: RetryPolicy,
    log: ImportLog,
    armed: bool,
}

impl ImportGuard {
    fn new(repo: Arc<dyn ImportLogRepository>, policy: RetryPolicy, log: ImportLog) -> Self {
        Self {
            repo,
            policy,
            log,
            armed: true,
        }
    }

    fn disarm(mut self) -> ImportLog {
        self.armed = false;
        self.log.clone()
    }
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut log = self.log.clone();
        if log.status.is_terminal() {
            tracing::warn!(import_id = %log.id, status = %log.status, "import outcome not recorded yet");
        } else {
            log.finish(
                ImportStatus::Cancelled,
                Some(ABORTED_MESSAGE.to_string()),
                Utc::now(),
            );
            tracing::warn!(import_id = %log.id, user_id = %log.user_id, "import aborted");
        }

        let repo = self.repo.clone();
        let policy = self.policy;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let written =
                        with_retry(&policy, "update_import_log", || repo.update_import_log(&log))
                            .await;
                    if let Err(e) = written {
                        tracing::error!(import_id = %log.id, error = %e, "failed to record import outcome");
                    }
                });
            }
            Err(_) => {
                tracing::error!(import_id = %log.id, "no runtime to record import outcome");
            }
        }
    }
}

enum LoopEnd {
    Finished,
    Shutdown,
}

/// Imports the user's Strava activities and returns the finished log.
///
/// Fails without writing a log when the user has no Strava connection or the
/// starting point cannot be read. Once the log exists, every outcome is
/// recorded on it: `completed`, `failed` with the error, or `cancelled` on
/// server shutdown or when the caller goes away.
pub async fn run_import(
    state: &AppState,
    user_id: Uuid,
    request: ImportRequest,
) -> anyhow::Result<ImportLog> {
    let request = request.normalized();
    let connection = fresh_connection(state, user_id, OAuthProvider::Strava).await?;

    let latest = state.activities.latest_start_date(user_id).await?;
    let after = incremental_after(&request, latest);

    let log = ImportLog::start(user_id, Utc::now());
    state.import_logs.create_import_log(&log).await?;
    let policy = state.config.retry_policy();
    let mut guard = ImportGuard::new(state.import_logs.clone(), policy, log);
    let mut shutdown = state.shutdown_tx.subscribe();

    tracing::info!(
        import_id = %guard.log.id,
        user_id = %user_id,
        after = ?after,
        per_page = request.per_page,
        max_pages = request.max_pages,
        "starting Strava import"
    );

    let outcome = import_pages(
        state,
        &connection.access_token,
        &request,
        after,
        &mut guard,
        &mut shutdown,
    )
    .await;

    let now = Utc::now();
    match outcome {
        Ok(LoopEnd::Finished) => guard.log.finish(ImportStatus::Completed, None, now),
        Ok(LoopEnd::Shutdown) => guard.log.finish(
            ImportStatus::Cancelled,
            Some(SHUTDOWN_MESSAGE.to_string()),
            now,
        ),
        Err(e) => {
            tracing::warn!(import_id = %guard.log.id, error = %e, "import failed");
            guard
                .log
                .finish(ImportStatus::Failed, Some(e.to_string()), now);
        }
    }

    // The guard stays armed until the outcome is stored.
    with_retry(&policy, "update_import_log", || {
        state.import_logs.update_import_log(&guard.log)
    })
    .await?;
    let log = guard.disarm();

    tracing::info!(
        import_id = %log.id,
        status = %log.status,
        pages = log.pages_fetched,
        inserted = log.inserted,
        updated = log.updated,
        failed = log.failed,
        "import finished"
    );
    Ok(log)
}

async fn import_pages(
    state: &AppState,
    access_token: &str,
    request: &ImportRequest,
    after: Option<DateTime<Utc>>,
    guard: &mut ImportGuard,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<LoopEnd, IntegrationError> {
    let user_id = guard.log.user_id;
    let mut page = 1;

    loop {
        let items = tokio::select! {
            result = state.strava.list_activities(
                access_token,
                page,
                request.per_page,
                after,
                request.before,
            ) => result?,
            _ = shutdown.recv() => return Ok(LoopEnd::Shutdown),
        };

        let page_len = items.len();
        guard.log.pages_fetched += 1;
        guard.log.activities_seen += page_len as u32;

        for raw in items {
            let activity = match activity_from_strava(user_id, raw) {
                Ok(activity) => activity,
                Err(e) => {
                    tracing::warn!(page, error = %e, "skipping unreadable activity");
                    guard.log.failed += 1;
                    continue;
                }
            };

            match state.activities.upsert_activity(&activity).await {
                Ok(UpsertOutcome::Inserted) => guard.log.inserted += 1,
                Ok(UpsertOutcome::Updated) => guard.log.updated += 1,
                Err(e) => {
                    tracing::warn!(strava_id = activity.strava_id, error = %e, "failed to store activity");
                    guard.log.failed += 1;
                }
            }
        }

        if let Err(e) = state.import_logs.update_import_log(&guard.log).await {
            tracing::warn!(import_id = %guard.log.id, error = %e, "failed to update import log");
        }
        tracing::debug!(page, page_len, "imported page");

        if !should_fetch_next_page(page_len, request.per_page, page, request.max_pages) {
            return Ok(LoopEnd::Finished);
        }
        page += 1;
    }
}
