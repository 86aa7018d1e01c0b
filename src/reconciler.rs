// Placement of live vehicles on a route's station timeline

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::models::{
    LiveVehicle, Station, UNKNOWN_SEQUENCE, UNKNOWN_STATION_NAME, VehiclePosition,
};

/// Joins every vehicle to the station it last reported at.
///
/// Vehicles whose `stop_id` is not on the route keep `UNKNOWN_SEQUENCE` and
/// are left out of the timeline, but they are still returned.
pub fn reconcile(stations: &[Station], vehicles: &[LiveVehicle]) -> Vec<VehiclePosition> {
    let by_id: HashMap<i64, &Station> = stations.iter().map(|s| (s.station_id, s)).collect();

    vehicles
        .iter()
        .map(|vehicle| match by_id.get(&vehicle.stop_id) {
            Some(station) => VehiclePosition {
                vehicle: vehicle.clone(),
                sequence: station.sequence,
                station_name: station.station_name.clone(),
            },
            None => VehiclePosition {
                vehicle: vehicle.clone(),
                sequence: UNKNOWN_SEQUENCE,
                station_name: UNKNOWN_STATION_NAME.to_string(),
            },
        })
        .collect()
}

/// Lowest placed sequence, i.e. the vehicle closest to the start of the route.
pub fn pick_focus_sequence(positions: &[VehiclePosition]) -> Option<i32> {
    positions
        .iter()
        .filter(|p| p.is_placed())
        .map(|p| p.sequence)
        .min()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimelineRow {
    Station(Station),
    Vehicle(VehiclePosition),
}

/// Flattens stations and vehicle markers into rendering order.
///
/// Stations come in ascending sequence; each marker follows the station it
/// was matched to. Markers sharing a station keep feed order.
pub fn build_timeline(stations: &[Station], positions: &[VehiclePosition]) -> Vec<TimelineRow> {
    let mut ordered: Vec<&Station> = stations.iter().collect();
    ordered.sort_by_key(|s| s.sequence);

    let mut at_sequence: HashMap<i32, Vec<&VehiclePosition>> = HashMap::new();
    for position in positions.iter().filter(|p| p.is_placed()) {
        at_sequence.entry(position.sequence).or_default().push(position);
    }

    let mut rows = Vec::with_capacity(stations.len() + positions.len());
    for station in ordered {
        rows.push(TimelineRow::Station(station.clone()));
        if let Some(markers) = at_sequence.get(&station.sequence) {
            rows.extend(markers.iter().map(|p| TimelineRow::Vehicle((*p).clone())));
        }
    }
    rows
}

impl fmt::Display for TimelineRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineRow::Station(station) => {
                write!(f, "{:>3}. {}", station.sequence, station.station_name)
            }
            TimelineRow::Vehicle(position) => {
                let plate = position.vehicle.plate.as_deref().unwrap_or("bus");
                match position.vehicle.speed {
                    Some(speed) => write!(f, "     🚌 {} ({:.0} km/h)", plate, speed),
                    None => write!(f, "     🚌 {}", plate),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(sequence: i32, station_id: i64, name: &str) -> Station {
        Station {
            sequence,
            station_id,
            station_name: name.to_string(),
            latitude: "37.7765".to_string(),
            longitude: "29.0864".to_string(),
        }
    }

    fn vehicle(stop_id: i64, plate: &str) -> LiveVehicle {
        LiveVehicle {
            stop_id,
            latitude: None,
            longitude: None,
            speed: None,
            plate: Some(plate.to_string()),
        }
    }

    fn route() -> Vec<Station> {
        vec![
            station(1, 100, "A"),
            station(2, 200, "B"),
            station(3, 300, "C"),
            station(4, 400, "D"),
            station(5, 500, "E"),
        ]
    }

    #[test]
    fn unmatched_vehicles_get_unknown_sequence() {
        let positions = reconcile(&route(), &[vehicle(300, "x"), vehicle(999, "y")]);

        assert_eq!(positions[0].sequence, 3);
        assert_eq!(positions[0].station_name, "C");
        assert_eq!(positions[1].sequence, UNKNOWN_SEQUENCE);
        assert_eq!(positions[1].station_name, UNKNOWN_STATION_NAME);
    }

    #[test]
    fn empty_station_list_leaves_every_vehicle_unplaced() {
        let positions = reconcile(&[], &[vehicle(100, "x"), vehicle(200, "y")]);
        assert!(positions.iter().all(|p| p.sequence == UNKNOWN_SEQUENCE));
        assert_eq!(pick_focus_sequence(&positions), None);
    }

    #[test]
    fn focus_is_the_lowest_placed_sequence() {
        let positions = reconcile(
            &route(),
            &[vehicle(400, "a"), vehicle(999, "b"), vehicle(200, "c")],
        );
        assert_eq!(pick_focus_sequence(&positions), Some(2));
        assert_eq!(pick_focus_sequence(&[]), None);
    }

    #[test]
    fn marker_is_placed_between_its_station_and_the_next() {
        let stations = route();
        let positions = reconcile(&stations, &[vehicle(200, "20 DZ 01")]);
        let rows = build_timeline(&stations, &positions);

        let labels: Vec<String> = rows
            .iter()
            .map(|row| match row {
                TimelineRow::Station(s) => s.station_name.clone(),
                TimelineRow::Vehicle(p) => p.vehicle.plate.clone().unwrap_or_default(),
            })
            .collect();
        assert_eq!(labels, vec!["A", "B", "20 DZ 01", "C", "D", "E"]);
        assert_eq!(pick_focus_sequence(&positions), Some(2));
    }

    #[test]
    fn vehicles_sharing_a_station_keep_feed_order() {
        let mut stations = route();
        stations.reverse();
        let positions = reconcile(
            &stations,
            &[vehicle(300, "first"), vehicle(999, "lost"), vehicle(300, "second")],
        );
        let rows = build_timeline(&stations, &positions);

        assert_eq!(rows.len(), 7);
        assert!(matches!(&rows[0], TimelineRow::Station(s) if s.sequence == 1));
        match (&rows[3], &rows[4]) {
            (TimelineRow::Vehicle(a), TimelineRow::Vehicle(b)) => {
                assert_eq!(a.vehicle.plate.as_deref(), Some("first"));
                assert_eq!(b.vehicle.plate.as_deref(), Some("second"));
            }
            other => panic!("expected two markers after C, got {:?}", other),
        }
    }
}
