//! AIS frame formatting: hex dump plus human-readable field interpretation.

use crate::logging::{AisDecoded, AisFrameEvent, AisHexDump};
use chrono::Utc;
use iqrange_core::ais::{AisReport, VesselType};

/// AIS message type codes this range accepts, and their descriptions.
pub struct MessageType;

impl MessageType {
    pub fn describe(message_type: u8) -> (&'static str, &'static str) {
        match message_type {
            1 => ("POS_REPORT_CLASS_A", "Scheduled Class A position report"),
            2 => ("POS_REPORT_CLASS_A_ASSIGNED", "Assigned-schedule Class A position report"),
            3 => ("POS_REPORT_CLASS_A_SPECIAL", "Special-maneuver Class A position report"),
            _ => ("UNKNOWN", "Unrecognized message type"),
        }
    }
}

/// Vessel type labels.
pub struct VesselTypeLabel;

impl VesselTypeLabel {
    pub fn describe(vessel_type: VesselType) -> &'static str {
        match vessel_type {
            VesselType::Cargo => "Cargo vessel",
            VesselType::Tanker => "Tanker",
            VesselType::Passenger => "Passenger vessel",
        }
    }
}

/// Formats a decoded [`AisReport`] into a structured log event with a hex
/// dump of its key fields alongside the human-readable interpretation.
pub struct AisFrameFormatter;

impl AisFrameFormatter {
    pub fn format(report: &AisReport) -> AisFrameEvent {
        let (type_name, type_desc) = MessageType::describe(report.message_type);

        AisFrameEvent {
            timestamp: Utc::now(),
            message_id: report.message_id,
            hex_dump: AisHexDump {
                mmsi: format_hex_field(&format!("{:08X}", report.mmsi)),
                message_type: format!("{:02X}", report.message_type),
            },
            decoded: AisDecoded {
                mmsi: report.mmsi,
                message_type: format!("0x{:02X} ({})", report.message_type, type_name),
                message_description: type_desc.to_string(),
                vessel_name: report.ship_name.clone(),
                vessel_type: VesselTypeLabel::describe(report.vessel_type).to_string(),
                position: format!("{:.4}, {:.4}", report.latitude, report.longitude),
                speed_knots: report.speed_knots,
                heading_degrees: report.heading_degrees as f64,
            },
        }
    }
}

/// Format hex with a space every 4 characters for readability.
fn format_hex_field(hex: &str) -> String {
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_hex_field_groups_by_four() {
        assert_eq!(format_hex_field("DEADBEEF"), "DEAD BEEF");
        assert_eq!(format_hex_field("0A1B2C"), "0A1B 2C");
    }

    #[test]
    fn message_type_describes_known_codes() {
        assert_eq!(MessageType::describe(1).0, "POS_REPORT_CLASS_A");
        assert_eq!(MessageType::describe(99).0, "UNKNOWN");
    }
}
