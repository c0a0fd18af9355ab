//! Application services shared by the handlers: settings resolution,
//! token refresh and the Strava import.

pub mod importer;
mod settings;
pub mod tokens;

pub use importer::run_import;
pub use settings::{ResolvedSetting, SettingSource, SettingsService};
pub use tokens::fresh_connection;
