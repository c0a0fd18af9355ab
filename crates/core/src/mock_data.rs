//! Deterministic demo activities.
//!
//! Used to seed the in-memory backend and as the fallback body for listing
//! and statistics reads when the database is unavailable. Pure functions,
//! no randomness: the same inputs always produce the same activities.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::activity::Activity;
use crate::polyline::{encode, Coordinate, DEFAULT_PRECISION};

struct Template {
    name: &'static str,
    sport_type: &'static str,
    /// metres per second
    speed: f64,
    distance_m: f64,
    climb_m: f64,
    avg_hr: f64,
    origin: (f64, f64),
}

const TEMPLATES: [Template; 5] = [
    Template {
        name: "Morning Run",
        sport_type: "Run",
        speed: 3.2,
        distance_m: 10_000.0,
        climb_m: 85.0,
        avg_hr: 152.0,
        origin: (45.5231, -122.6765),
    },
    Template {
        name: "Evening Ride",
        sport_type: "Ride",
        speed: 8.1,
        distance_m: 42_000.0,
        climb_m: 410.0,
        avg_hr: 138.0,
        origin: (45.5122, -122.6587),
    },
    Template {
        name: "Forest Park Hike",
        sport_type: "Hike",
        speed: 1.3,
        distance_m: 12_500.0,
        climb_m: 620.0,
        avg_hr: 118.0,
        origin: (45.5446, -122.7251),
    },
    Template {
        name: "Recovery Jog",
        sport_type: "Run",
        speed: 2.8,
        distance_m: 5_000.0,
        climb_m: 20.0,
        avg_hr: 135.0,
        origin: (45.5289, -122.6625),
    },
    Template {
        name: "Lunch Walk",
        sport_type: "Walk",
        speed: 1.4,
        distance_m: 3_200.0,
        climb_m: 12.0,
        avg_hr: 98.0,
        origin: (45.5175, -122.6801),
    },
];

/// Strava ids of demo activities start here so they never collide with real ones.
pub const DEMO_STRAVA_ID_BASE: i64 = 9_000_000_000;

/// Generate `count` demo activities, one every 36 hours going back from `until`.
///
/// ```
/// use chrono::Utc;
/// use trailsync_core::mock_data::generate_demo_activities;
/// use uuid::Uuid;
///
/// let activities = generate_demo_activities(Uuid::new_v4(), Utc::now(), 12);
/// assert_eq!(activities.len(), 12);
/// assert!(activities.iter().all(|a| a.summary_polyline.is_some()));
/// ```
pub fn generate_demo_activities(
    user_id: Uuid,
    until: DateTime<Utc>,
    count: u32,
) -> Vec<Activity> {
    (0..count)
        .map(|i| {
            let t = &TEMPLATES[i as usize % TEMPLATES.len()];
            // Vary the effort a little per repetition.
            let factor = 1.0 + ((i % 4) as f64 - 1.5) * 0.05;
            let distance_m = (t.distance_m * factor).round();
            let moving_time_s = (distance_m / t.speed).round() as i64;
            let elapsed_time_s = moving_time_s + 60 * (i as i64 % 5);
            let start = until - Duration::hours(36 * (i as i64 + 1));

            let route = demo_route(t.origin, distance_m, i);
            let polyline = encode(&route, DEFAULT_PRECISION);

            let mut activity = Activity::new(
                user_id,
                DEMO_STRAVA_ID_BASE + i as i64,
                t.name,
                t.sport_type,
                start,
            )
            .with_effort(distance_m, moving_time_s, elapsed_time_s)
            .with_elevation(t.climb_m * factor)
            .with_heartrate(t.avg_hr, t.avg_hr + 22.0)
            .with_polyline(polyline);

            activity.start_latlng = route.first().map(|c| [c.lat, c.lng]);
            activity.end_latlng = route.last().map(|c| [c.lat, c.lng]);
            activity.timezone = Some("(GMT-08:00) America/Los_Angeles".to_string());
            activity.start_date_local = Some((start - Duration::hours(8)).naive_utc());
            activity.raw = serde_json::json!({
                "id": activity.strava_id,
                "name": activity.name,
                "sport_type": activity.sport_type,
                "distance": activity.distance_m,
                "moving_time": activity.moving_time_s,
                "elapsed_time": activity.elapsed_time_s,
                "demo": true,
            });
            activity
        })
        .collect()
}

/// A closed loop roughly `distance_m` long around `origin`.
fn demo_route(origin: (f64, f64), distance_m: f64, seed: u32) -> Vec<Coordinate> {
    const POINTS: usize = 24;
    // Circumference = distance; one degree of latitude is ~111 km.
    let radius_deg = distance_m / (2.0 * std::f64::consts::PI) / 111_000.0;
    let phase = seed as f64 * 0.7;

    (0..=POINTS)
        .map(|k| {
            let angle = phase + (k as f64 / POINTS as f64) * 2.0 * std::f64::consts::PI;
            let wobble = 1.0 + 0.08 * (3.0 * angle).sin();
            let lat = origin.0 + radius_deg * wobble * angle.sin();
            let lng = origin.1 + radius_deg * wobble * angle.cos() / origin.0.to_radians().cos();
            Coordinate::new(round5(lat), round5(lng))
        })
        .collect()
}

fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::polyline::decode;

    fn until() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn generation_is_deterministic_apart_from_ids() {
        let user = Uuid::new_v4();
        let a = generate_demo_activities(user, until(), 8);
        let b = generate_demo_activities(user, until(), 8);

        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.strava_id, y.strava_id);
            assert_eq!(x.summary_polyline, y.summary_polyline);
            assert_eq!(x.distance_m, y.distance_m);
        }
    }

    #[test]
    fn activities_go_back_in_time() {
        let activities = generate_demo_activities(Uuid::new_v4(), until(), 5);
        assert!(activities
            .windows(2)
            .all(|w| w[0].start_date > w[1].start_date));
        assert!(activities.iter().all(|a| a.start_date < until()));
    }

    #[test]
    fn polylines_decode_to_the_stored_endpoints() {
        for a in generate_demo_activities(Uuid::new_v4(), until(), 5) {
            let coords = decode(a.summary_polyline.as_deref().unwrap(), DEFAULT_PRECISION).unwrap();
            assert_eq!(coords.len(), 25);
            let first = coords.first().unwrap();
            assert_eq!(a.start_latlng, Some([first.lat, first.lng]));
        }
    }

    #[test]
    fn covers_several_sports() {
        let activities = generate_demo_activities(Uuid::new_v4(), until(), 10);
        let sports: std::collections::BTreeSet<_> =
            activities.iter().map(|a| a.sport_type.as_str()).collect();
        assert!(sports.contains("Run"));
        assert!(sports.contains("Ride"));
        assert!(sports.contains("Hike"));
    }

    #[test]
    fn zero_count_is_empty() {
        assert!(generate_demo_activities(Uuid::new_v4(), until(), 0).is_empty());
    }
}
