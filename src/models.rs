// Typed views of the upstream transit API payloads used by the line reconciler
//
// The proxy endpoints relay upstream JSON untouched; only the route station
// sequence and the live vehicle feed are narrowed into these types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransitError};

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// 1-based position along the route, unique per route direction
    pub sequence: i32,
    pub station_id: i64,
    pub station_name: String,
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveVehicle {
    /// Station id the vehicle last reported at
    pub stop_id: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub plate: Option<String>,
}

pub const UNKNOWN_SEQUENCE: i32 = -1;
pub const UNKNOWN_STATION_NAME: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    #[serde(flatten)]
    pub vehicle: LiveVehicle,
    /// Sequence of the matched station, `UNKNOWN_SEQUENCE` when off-route
    pub sequence: i32,
    pub station_name: String,
}

impl VehiclePosition {
    pub fn is_placed(&self) -> bool {
        self.sequence > 0
    }
}

// ============================================================================
// Route direction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Go,
    Return,
}

impl Direction {
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Go => "G",
            Direction::Return => "D",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Direction::Go => Direction::Return,
            Direction::Return => Direction::Go,
        }
    }

    /// Upstream route code for a line travelled in this direction.
    pub fn route_code(self, line_code: &str) -> String {
        format!("{}_{}", line_code.trim().to_uppercase(), self.suffix())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Go => write!(f, "go"),
            Direction::Return => write!(f, "return"),
        }
    }
}

impl FromStr for Direction {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "go" | "g" => Ok(Direction::Go),
            "return" | "d" => Ok(Direction::Return),
            other => Err(TransitError::InvalidParameter {
                name: "direction",
                reason: format!("expected 'go' or 'return', got '{}'", other),
            }),
        }
    }
}

// ============================================================================
// Upstream payload narrowing
// ============================================================================

/// The upstream API answers either with a bare array or wraps it in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "data", alias = "result", alias = "items")]
        value: Vec<T>,
    },
}

impl<T> ListPayload<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListPayload::Bare(items) => items,
            ListPayload::Wrapped { value } => value,
        }
    }
}

fn parse_list<T: for<'de> Deserialize<'de>>(body: &[u8], what: &str) -> Result<Vec<T>> {
    serde_json::from_slice::<ListPayload<T>>(body)
        .map(ListPayload::into_vec)
        .map_err(|e| TransitError::ParseError(format!("Unexpected {} payload: {}", what, e)))
}

/// Narrows a route station sequence payload, sorted by ascending sequence.
pub fn parse_stations(body: &[u8]) -> Result<Vec<Station>> {
    let mut stations: Vec<Station> = parse_list(body, "route station")?;
    stations.sort_by_key(|s| s.sequence);
    Ok(stations)
}

/// Narrows a live vehicle payload, keeping feed order.
pub fn parse_vehicles(body: &[u8]) -> Result<Vec<LiveVehicle>> {
    parse_list(body, "live vehicle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_code_carries_direction_suffix() {
        assert_eq!(Direction::Go.route_code("190a"), "190A_G");
        assert_eq!(Direction::Return.route_code(" 23 "), "23_D");
        assert_eq!(Direction::Go.toggled(), Direction::Return);
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("RETURN".parse::<Direction>(), Ok(Direction::Return));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn stations_parse_from_bare_or_wrapped_arrays_and_are_sorted() {
        let bare = br#"[
            {"sequence": 2, "stationId": 20, "stationName": "B", "latitude": "37.7", "longitude": "29.0"},
            {"sequence": 1, "stationId": 10, "stationName": "A", "latitude": "37.8", "longitude": "29.1"}
        ]"#;
        let stations = parse_stations(bare).unwrap();
        assert_eq!(stations[0].station_id, 10);
        assert_eq!(stations[1].sequence, 2);

        let wrapped = br#"{"data": [
            {"sequence": 1, "stationId": 10, "stationName": "A", "latitude": "37.8", "longitude": "29.1"}
        ]}"#;
        assert_eq!(parse_stations(wrapped).unwrap().len(), 1);
    }

    #[test]
    fn vehicles_tolerate_missing_optional_fields() {
        let body = br#"[{"stopId": 20}, {"stopId": 30, "plate": "20 ABC 123", "speed": 31.5}]"#;
        let vehicles = parse_vehicles(body).unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].latitude, None);
        assert_eq!(vehicles[1].plate.as_deref(), Some("20 ABC 123"));
    }

    #[test]
    fn unexpected_shape_is_a_parse_error() {
        let err = parse_vehicles(br#"{"message": "maintenance"}"#).unwrap_err();
        assert!(matches!(err, TransitError::ParseError(_)));
    }
}
