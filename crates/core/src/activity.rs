//! Imported activities, import bookkeeping and display helpers.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PER_PAGE: u32 = 50;
pub const MAX_PER_PAGE: u32 = 200;
pub const DEFAULT_MAX_PAGES: u32 = 20;
pub const MAX_PAGES: u32 = 100;

/// An activity mirrored from Strava.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub strava_id: i64,
    pub name: String,
    pub sport_type: String,
    pub start_date: DateTime<Utc>,
    pub start_date_local: Option<NaiveDateTime>,
    pub timezone: Option<String>,
    pub distance_m: f64,
    pub moving_time_s: i64,
    pub elapsed_time_s: i64,
    pub total_elevation_gain_m: f64,
    pub average_speed_mps: Option<f64>,
    pub max_speed_mps: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub calories: Option<f64>,
    pub start_latlng: Option<[f64; 2]>,
    pub end_latlng: Option<[f64; 2]>,
    pub summary_polyline: Option<String>,
    /// The payload exactly as Strava returned it.
    pub raw: serde_json::Value,
    pub imported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        user_id: Uuid,
        strava_id: i64,
        name: impl Into<String>,
        sport_type: impl Into<String>,
        start_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            strava_id,
            name: name.into(),
            sport_type: sport_type.into(),
            start_date,
            start_date_local: None,
            timezone: None,
            distance_m: 0.0,
            moving_time_s: 0,
            elapsed_time_s: 0,
            total_elevation_gain_m: 0.0,
            average_speed_mps: None,
            max_speed_mps: None,
            average_heartrate: None,
            max_heartrate: None,
            calories: None,
            start_latlng: None,
            end_latlng: None,
            summary_polyline: None,
            raw: serde_json::Value::Null,
            imported_at: now,
            updated_at: now,
        }
    }

    /// Sets distance and times, deriving the average speed.
    pub fn with_effort(mut self, distance_m: f64, moving_time_s: i64, elapsed_time_s: i64) -> Self {
        self.distance_m = distance_m;
        self.moving_time_s = moving_time_s;
        self.elapsed_time_s = elapsed_time_s;
        if moving_time_s > 0 {
            self.average_speed_mps = Some(distance_m / moving_time_s as f64);
        }
        self
    }

    pub fn with_elevation(mut self, gain_m: f64) -> Self {
        self.total_elevation_gain_m = gain_m;
        self
    }

    pub fn with_heartrate(mut self, average: f64, max: f64) -> Self {
        self.average_heartrate = Some(average);
        self.max_heartrate = Some(max);
        self
    }

    pub fn with_polyline(mut self, polyline: impl Into<String>) -> Self {
        self.summary_polyline = Some(polyline.into());
        self
    }

    pub fn has_route(&self) -> bool {
        self.summary_polyline
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    /// End of the activity, using elapsed time.
    pub fn end_date(&self) -> DateTime<Utc> {
        self.start_date + chrono::Duration::seconds(self.elapsed_time_s.max(0))
    }
}

/// Compact list view: no raw payload, no polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: Uuid,
    pub strava_id: i64,
    pub name: String,
    pub sport_type: String,
    pub start_date: DateTime<Utc>,
    pub distance_m: f64,
    pub moving_time_s: i64,
    pub elapsed_time_s: i64,
    pub total_elevation_gain_m: f64,
    pub average_heartrate: Option<f64>,
    pub has_route: bool,
}

impl From<&Activity> for ActivitySummary {
    fn from(a: &Activity) -> Self {
        Self {
            id: a.id,
            strava_id: a.strava_id,
            name: a.name.clone(),
            sport_type: a.sport_type.clone(),
            start_date: a.start_date,
            distance_m: a.distance_m,
            moving_time_s: a.moving_time_s,
            elapsed_time_s: a.elapsed_time_s,
            total_elevation_gain_m: a.total_elevation_gain_m,
            average_heartrate: a.average_heartrate,
            has_route: a.has_route(),
        }
    }
}

/// Totals for one sport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SportStats {
    pub count: u64,
    pub distance_m: f64,
    pub moving_time_s: i64,
    pub elevation_gain_m: f64,
}

impl SportStats {
    fn add(&mut self, a: &Activity) {
        self.count += 1;
        self.distance_m += a.distance_m;
        self.moving_time_s += a.moving_time_s;
        self.elevation_gain_m += a.total_elevation_gain_m;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub count: u64,
    pub total_distance_m: f64,
    pub total_moving_time_s: i64,
    pub total_elevation_gain_m: f64,
    pub first_start: Option<DateTime<Utc>>,
    pub last_start: Option<DateTime<Utc>>,
    pub by_sport: BTreeMap<String, SportStats>,
}

pub fn compute_stats(activities: &[Activity]) -> ActivityStats {
    let mut stats = ActivityStats::default();
    for a in activities {
        stats.count += 1;
        stats.total_distance_m += a.distance_m;
        stats.total_moving_time_s += a.moving_time_s;
        stats.total_elevation_gain_m += a.total_elevation_gain_m;
        stats.first_start = Some(stats.first_start.map_or(a.start_date, |d| d.min(a.start_date)));
        stats.last_start = Some(stats.last_start.map_or(a.start_date, |d| d.max(a.start_date)));
        stats.by_sport.entry(a.sport_type.clone()).or_default().add(a);
    }
    stats
}

/// ```
/// use trailsync_core::activity::format_distance_km;
///
/// assert_eq!(format_distance_km(10_234.0), "10.23 km");
/// ```
pub fn format_distance_km(distance_m: f64) -> String {
    format!("{:.2} km", distance_m / 1000.0)
}

/// `h:mm:ss` above an hour, `m:ss` below.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Sports where pace reads better than speed.
pub fn is_foot_sport(sport_type: &str) -> bool {
    matches!(
        sport_type,
        "Run" | "TrailRun" | "VirtualRun" | "Walk" | "Hike"
    )
}

/// Minutes per kilometre, `None` without distance.
pub fn format_pace(distance_m: f64, moving_time_s: i64) -> Option<String> {
    if distance_m <= 0.0 || moving_time_s <= 0 {
        return None;
    }
    let secs_per_km = (moving_time_s as f64 / (distance_m / 1000.0)).round() as i64;
    Some(format!("{}:{:02} /km", secs_per_km / 60, secs_per_km % 60))
}

pub fn format_speed_kmh(speed_mps: f64) -> String {
    format!("{:.1} km/h", speed_mps * 3.6)
}

/// Pace for foot sports, speed otherwise.
pub fn format_intensity(activity: &Activity) -> Option<String> {
    if is_foot_sport(&activity.sport_type) {
        format_pace(activity.distance_m, activity.moving_time_s)
    } else {
        activity
            .average_speed_mps
            .filter(|s| *s > 0.0)
            .map(format_speed_kmh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown import status: {other}")),
        }
    }
}

/// Status record of one import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ImportStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_fetched: u32,
    pub activities_seen: u32,
    pub inserted: u32,
    pub updated: u32,
    pub failed: u32,
    pub error: Option<String>,
}

impl ImportLog {
    pub fn start(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: ImportStatus::Running,
            started_at: now,
            finished_at: None,
            pages_fetched: 0,
            activities_seen: 0,
            inserted: 0,
            updated: 0,
            failed: 0,
            error: None,
        }
    }

    /// Stamps a terminal status. Already finished logs are left untouched.
    pub fn finish(&mut self, status: ImportStatus, error: Option<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(now);
    }
}

/// Parameters of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportRequest {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub per_page: u32,
    pub max_pages: u32,
    /// Re-import everything instead of continuing from the latest activity.
    pub full: bool,
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            full: false,
        }
    }
}

impl ImportRequest {
    /// Clamps page size and page budget into their allowed ranges.
    pub fn normalized(mut self) -> Self {
        self.per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        self.max_pages = self.max_pages.clamp(1, MAX_PAGES);
        self
    }
}

/// Stop on a short page or once `page` (1-based, just fetched) spends the budget.
pub fn should_fetch_next_page(page_len: usize, per_page: u32, page: u32, max_pages: u32) -> bool {
    page_len >= per_page as usize && page < max_pages
}

/// Lower time bound for the Strava query.
///
/// An explicit `after` always wins. Otherwise a non-full import continues
/// from the most recent activity already stored.
pub fn incremental_after(
    request: &ImportRequest,
    latest_start: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (request.after, request.full) {
        (Some(after), _) => Some(after),
        (None, true) => None,
        (None, false) => latest_start,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn run(km: f64, minutes: i64) -> Activity {
        Activity::new(
            Uuid::new_v4(),
            1,
            "Morning Run",
            "Run",
            Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap(),
        )
        .with_effort(km * 1000.0, minutes * 60, minutes * 60)
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(754), "12:34");
        assert_eq!(format_duration(3723), "1:02:03");
        assert_eq!(format_duration(-5), "0:00");
    }

    #[test]
    fn pace_for_runs_speed_for_rides() {
        let r = run(10.0, 50);
        assert_eq!(format_intensity(&r).as_deref(), Some("5:00 /km"));

        let mut ride = run(30.0, 60);
        ride.sport_type = "Ride".to_string();
        assert_eq!(format_intensity(&ride).as_deref(), Some("30.0 km/h"));
    }

    #[test]
    fn pace_needs_distance() {
        assert_eq!(format_pace(0.0, 600), None);
        assert_eq!(format_pace(1000.0, 0), None);
    }

    #[test]
    fn stats_group_by_sport() {
        let mut ride = run(40.0, 90).with_elevation(500.0);
        ride.sport_type = "Ride".to_string();
        let activities = vec![run(10.0, 50), run(5.0, 25), ride];

        let stats = compute_stats(&activities);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_distance_m, 55_000.0);
        assert_eq!(stats.total_moving_time_s, 165 * 60);
        assert_eq!(stats.by_sport["Run"].count, 2);
        assert_eq!(stats.by_sport["Ride"].elevation_gain_m, 500.0);
    }

    #[test]
    fn empty_stats() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.first_start.is_none());
        assert!(stats.by_sport.is_empty());
    }

    #[test]
    fn summary_drops_payload() {
        let a = run(1.0, 5).with_polyline("_p~iF~ps|U");
        let summary = ActivitySummary::from(&a);
        assert!(summary.has_route);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("raw").is_none());
        assert!(json.get("summary_polyline").is_none());
    }

    #[test]
    fn request_clamps() {
        let req = ImportRequest {
            per_page: 0,
            max_pages: 1000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(req.per_page, 1);
        assert_eq!(req.max_pages, MAX_PAGES);

        let req = ImportRequest {
            per_page: 500,
            ..Default::default()
        }
        .normalized();
        assert_eq!(req.per_page, MAX_PER_PAGE);
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: ImportRequest = serde_json::from_str(r#"{"full": true}"#).unwrap();
        assert!(req.full);
        assert_eq!(req.per_page, DEFAULT_PER_PAGE);
        assert_eq!(req.max_pages, DEFAULT_MAX_PAGES);
    }

    #[test]
    fn paging_stops_on_short_page_or_budget() {
        assert!(should_fetch_next_page(50, 50, 1, 20));
        assert!(!should_fetch_next_page(49, 50, 1, 20));
        assert!(!should_fetch_next_page(0, 50, 1, 20));
        assert!(!should_fetch_next_page(50, 50, 20, 20));
    }

    #[test]
    fn incremental_after_rules() {
        let latest = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let explicit = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

        let default = ImportRequest::default();
        assert_eq!(incremental_after(&default, Some(latest)), Some(latest));
        assert_eq!(incremental_after(&default, None), None);

        let full = ImportRequest {
            full: true,
            ..Default::default()
        };
        assert_eq!(incremental_after(&full, Some(latest)), None);

        let with_after = ImportRequest {
            after: Some(explicit),
            full: true,
            ..Default::default()
        };
        assert_eq!(incremental_after(&with_after, Some(latest)), Some(explicit));
    }

    #[test]
    fn finish_is_idempotent() {
        let now = Utc::now();
        let mut log = ImportLog::start(Uuid::new_v4(), now);
        log.finish(ImportStatus::Completed, None, now);
        log.finish(ImportStatus::Cancelled, Some("late".to_string()), now);

        assert_eq!(log.status, ImportStatus::Completed);
        assert!(log.error.is_none());
    }
}
