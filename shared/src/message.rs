use chrono::{DateTime, Utc};
use std::fmt;

use crate::model::{Coordinate, UnixTimeMs};

pub const SOS_HEADER: &str = "SOS EMERGENCY ALERT";
pub const SOS_FOOTER: &str = "Please respond immediately!";
pub const LOCATION_SHARE_HEADER: &str = "Emergency Location Alert";

/// Composed alert text. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyMessage(String);

impl EmergencyMessage {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmergencyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the SOS text from a body, an optional coordinate and the send
/// time. Pure: identical inputs give identical output. The location block
/// is left out entirely when the coordinate is unknown.
#[must_use]
pub fn compose_emergency_message(
    body: &str,
    coordinate: Option<&Coordinate>,
    sent_at: UnixTimeMs,
) -> EmergencyMessage {
    let mut text = format!(
        "{SOS_HEADER}\n\n{}\n\nTime: {}",
        body.trim(),
        format_time(sent_at)
    );

    if let Some(c) = coordinate {
        text.push_str("\n\n");
        text.push_str(&location_block(c));
    }

    text.push_str("\n\n");
    text.push_str(SOS_FOOTER);
    EmergencyMessage(text)
}

/// Location-only message for the manual "share my location" action.
#[must_use]
pub fn compose_location_share(coordinate: &Coordinate) -> EmergencyMessage {
    EmergencyMessage(format!(
        "{LOCATION_SHARE_HEADER}\n\nMy current location: {}\n\nLatitude: {}\nLongitude: {}\n\nPlease help me!",
        coordinate.maps_link(),
        coordinate.latitude(),
        coordinate.longitude()
    ))
}

// Shortest round-trip float formatting keeps the precision of the input.
fn location_block(c: &Coordinate) -> String {
    format!(
        "Location: {}\nLatitude: {}\nLongitude: {}",
        c.maps_link(),
        c.latitude(),
        c.longitude()
    )
}

fn format_time(at: UnixTimeMs) -> String {
    i64::try_from(at.0)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || format!("{} ms since epoch", at.0),
            |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng, Some(10.0), UnixTimeMs(0)).unwrap()
    }

    #[test]
    fn test_location_block_present_once() {
        let c = coord(12.34, 56.78);
        let msg = compose_emergency_message("test", Some(&c), UnixTimeMs(1_700_000_000_000));
        let text = msg.as_str();

        assert_eq!(text.matches("Location:").count(), 1);
        assert!(text.contains("Latitude: 12.34\n"));
        assert!(text.contains("Longitude: 56.78"));
        assert!(text.contains("query=12.34,56.78"));
        assert!(text.contains("\n\ntest\n\n"));
        assert!(text.contains("Time: 2023-11-14 22:13:20 UTC"));
    }

    #[test]
    fn test_location_block_absent_without_coordinate() {
        let msg = compose_emergency_message("test", None, UnixTimeMs(0));
        assert_eq!(msg.as_str().matches("Location:").count(), 0);
        assert!(!msg.as_str().contains("Latitude"));
        assert!(msg.as_str().starts_with(SOS_HEADER));
        assert!(msg.as_str().ends_with(SOS_FOOTER));
    }

    #[test]
    fn test_composition_is_deterministic() {
        let c = coord(-33.8688, 151.2093);
        let a = compose_emergency_message("help", Some(&c), UnixTimeMs(42));
        let b = compose_emergency_message("help", Some(&c), UnixTimeMs(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_location_share_text() {
        let msg = compose_location_share(&coord(18.5204, 73.8567));
        assert!(msg.as_str().starts_with(LOCATION_SHARE_HEADER));
        assert!(msg.as_str().contains("Latitude: 18.5204\nLongitude: 73.8567"));
        assert!(msg.as_str().ends_with("Please help me!"));
    }

    proptest! {
        #[test]
        fn prop_coordinates_keep_input_precision(
            lat in -90.0f64..=90.0,
            lng in -180.0f64..=180.0,
            body in "[a-zA-Z0-9 !?.,]{0,80}",
            at in 0u64..4_000_000_000_000,
        ) {
            let c = coord(lat, lng);
            let text = compose_emergency_message(&body, Some(&c), UnixTimeMs(at)).to_string();
            prop_assert_eq!(text.matches("Location:").count(), 1);
            let lat_line = format!("Latitude: {lat}\n");
            let lng_line = format!("Longitude: {lng}\n");
            prop_assert!(text.contains(&lat_line));
            prop_assert!(text.contains(&lng_line));

            let without = compose_emergency_message(&body, None, UnixTimeMs(at)).to_string();
            prop_assert_eq!(without.matches("Location:").count(), 0);
        }
    }
}
