//! Google encoded polyline codec.
//!
//! Strava returns activity routes as `summary_polyline` strings in this
//! format: each coordinate is stored as a zig-zag encoded delta from the
//! previous one, split into 5-bit chunks offset by 63 into printable ASCII.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Precision used by Strava and the Google Maps APIs (1e-5 degrees).
pub const DEFAULT_PRECISION: u32 = 5;

/// Errors produced while decoding an encoded polyline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolylineError {
    #[error("invalid polyline character {byte:#04x} at position {position}")]
    InvalidCharacter { byte: u8, position: usize },

    #[error("polyline ends in the middle of a value")]
    Truncated,

    #[error("polyline has a latitude without a matching longitude")]
    DanglingLatitude,

    #[error("polyline value at position {position} is too long")]
    ValueTooLong { position: usize },

    #[error("polyline coordinate at position {position} is out of range")]
    Overflow { position: usize },
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Bounding box of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

/// Decodes an encoded polyline into coordinates.
///
/// An empty string decodes to an empty list.
pub fn decode(encoded: &str, precision: u32) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let factor = 10f64.powi(precision as i32);

    let mut coordinates = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let start = index;
        let (delta_lat, next) = decode_value(bytes, index)?;
        if next >= bytes.len() {
            return Err(PolylineError::DanglingLatitude);
        }
        let (delta_lng, next) = decode_value(bytes, next)?;
        index = next;

        lat = lat
            .checked_add(delta_lat)
            .ok_or(PolylineError::Overflow { position: start })?;
        lng = lng
            .checked_add(delta_lng)
            .ok_or(PolylineError::Overflow { position: start })?;
        coordinates.push(Coordinate::new(lat as f64 / factor, lng as f64 / factor));
    }

    Ok(coordinates)
}

/// Decodes one zig-zag varint starting at `start`, returning the value and
/// the index of the next unread byte.
fn decode_value(bytes: &[u8], start: usize) -> Result<(i64, usize), PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut index = start;

    loop {
        let byte = *bytes.get(index).ok_or(PolylineError::Truncated)?;
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidCharacter {
                byte,
                position: index,
            });
        }
        if shift > 60 {
            return Err(PolylineError::ValueTooLong { position: start });
        }

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        index += 1;

        if chunk < 0x20 {
            break;
        }
    }

    let value = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };

    Ok((value, index))
}

/// Encodes coordinates into a polyline string.
pub fn encode(coordinates: &[Coordinate], precision: u32) -> String {
    let factor = 10f64.powi(precision as i32);
    let mut out = String::with_capacity(coordinates.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for coord in coordinates {
        let lat = (coord.lat * factor).round() as i64;
        let lng = (coord.lng * factor).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 {
        !(value << 1)
    } else {
        value << 1
    };

    while v >= 0x20 {
        out.push(char::from((0x20 | (v & 0x1f)) as u8 + 63));
        v >>= 5;
    }
    out.push(char::from(v as u8 + 63));
}

/// Returns the bounding box of the coordinates, or `None` when empty.
pub fn bounds(coordinates: &[Coordinate]) -> Option<Bounds> {
    let first = coordinates.first()?;
    let mut south_west = *first;
    let mut north_east = *first;

    for c in &coordinates[1..] {
        south_west.lat = south_west.lat.min(c.lat);
        south_west.lng = south_west.lng.min(c.lng);
        north_east.lat = north_east.lat.max(c.lat);
        north_east.lng = north_east.lng.max(c.lng);
    }

    Some(Bounds {
        south_west,
        north_east,
    })
}

/// Builds a GeoJSON `LineString` geometry (GeoJSON orders `[lng, lat]`).
pub fn to_geojson_line(coordinates: &[Coordinate]) -> Value {
    let points: Vec<[f64; 2]> = coordinates.iter().map(|c| [c.lng, c.lat]).collect();
    json!({
        "type": "LineString",
        "coordinates": points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOGLE_EXAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn assert_close(actual: &[Coordinate], expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len());
        for (a, (lat, lng)) in actual.iter().zip(expected) {
            assert!((a.lat - lat).abs() < 1e-9, "lat {} != {}", a.lat, lat);
            assert!((a.lng - lng).abs() < 1e-9, "lng {} != {}", a.lng, lng);
        }
    }

    #[test]
    fn decodes_documented_example() {
        let coords = decode(GOOGLE_EXAMPLE, DEFAULT_PRECISION).unwrap();
        assert_close(
            &coords,
            &[(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)],
        );
    }

    #[test]
    fn encodes_documented_example() {
        let coords = vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode(&coords, DEFAULT_PRECISION), GOOGLE_EXAMPLE);
    }

    #[test]
    fn decode_inverts_encode_for_rounded_coordinates() {
        let coords = vec![
            Coordinate::new(-34.90328, -56.18816),
            Coordinate::new(-34.90412, -56.18702),
            Coordinate::new(-34.9, -56.2),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(89.99999, 179.99999),
        ];
        let decoded = decode(&encode(&coords, DEFAULT_PRECISION), DEFAULT_PRECISION).unwrap();
        assert_eq!(decoded, coords);
    }

    #[test]
    fn decodes_with_precision_six() {
        let coords = vec![Coordinate::new(51.123456, -0.654321)];
        let encoded = encode(&coords, 6);
        assert_eq!(decode(&encoded, 6).unwrap(), coords);
    }

    #[test]
    fn empty_string_decodes_to_empty_list() {
        assert!(decode("", DEFAULT_PRECISION).unwrap().is_empty());
    }

    #[test]
    fn truncated_value_is_an_error() {
        // "_p~i" stops before the terminating chunk of the first latitude
        assert_eq!(
            decode("_p~i", DEFAULT_PRECISION),
            Err(PolylineError::Truncated)
        );
    }

    #[test]
    fn latitude_without_longitude_is_an_error() {
        assert_eq!(
            decode("_p~iF", DEFAULT_PRECISION),
            Err(PolylineError::DanglingLatitude)
        );
    }

    #[test]
    fn invalid_character_is_reported_with_position() {
        assert_eq!(
            decode("_p~iF ps|U", DEFAULT_PRECISION),
            Err(PolylineError::InvalidCharacter {
                byte: b' ',
                position: 5
            })
        );
    }

    #[test]
    fn accumulated_overflow_is_an_error() {
        let huge = encode(&[Coordinate::new(4.0e13, 0.0)], DEFAULT_PRECISION);
        let len = huge.len();
        assert_eq!(
            decode(&huge.repeat(3), DEFAULT_PRECISION),
            Err(PolylineError::Overflow { position: 2 * len })
        );
    }

    #[test]
    fn bounds_of_empty_is_none() {
        assert!(bounds(&[]).is_none());
    }

    #[test]
    fn bounds_cover_all_points() {
        let coords = decode(GOOGLE_EXAMPLE, DEFAULT_PRECISION).unwrap();
        let b = bounds(&coords).unwrap();
        assert!((b.south_west.lat - 38.5).abs() < 1e-9);
        assert!((b.south_west.lng - -126.453).abs() < 1e-9);
        assert!((b.north_east.lat - 43.252).abs() < 1e-9);
        assert!((b.north_east.lng - -120.2).abs() < 1e-9);
    }

    #[test]
    fn geojson_uses_lng_lat_order() {
        let line = to_geojson_line(&[Coordinate::new(1.5, 2.5)]);
        assert_eq!(line["type"], "LineString");
        assert_eq!(line["coordinates"][0][0], 2.5);
        assert_eq!(line["coordinates"][0][1], 1.5);
    }
}
