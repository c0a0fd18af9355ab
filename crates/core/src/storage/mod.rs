mod error;
mod http_mapping;
mod traits;
mod types;

pub use error::{RepositoryError, Result};
pub use http_mapping::repository_error_to_status_code;
pub use traits::{
    ActivityRepository, ConnectionRepository, HealthCheck, ImportLogRepository,
    SettingsRepository, UserRepository,
};
pub use types::{
    apply_filter, ActivityFilter, ActivityPage, UpsertOutcome, DEFAULT_LIMIT, MAX_LIMIT,
};
