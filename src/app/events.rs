//! Outbound application events and the report payload.
//!
//! The [`DeviceService`](super::service::DeviceService) emits [`AppEvent`]s
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log to serial, publish as
//! a cloud event, record in a test harness.

use serde::Serialize;

use crate::error::RecoveryAction;
use crate::fsm::StateId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service has started (carries initial state).
    Started(StateId),

    /// The state machine transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// An alert was raised on the current-cycle record.
    AlertRaised(u8),

    /// The error state executed a recovery action for an alert.
    RecoveryExecuted { alert: u8, action: RecoveryAction },

    /// A measurement cycle completed.
    MeasurementTaken { percent_full: f32, emptied: bool },

    /// The hourly report was handed to the network layer.
    ReportQueued(ReportPayload),
}

/// Hourly webhook payload.  Field names are the wire contract with the
/// fleet backend; do not rename.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub timestamp: u64,
    #[serde(rename = "percentFull")]
    pub percent_full: f32,
    #[serde(rename = "trashHeight")]
    pub trash_height_in: f32,
    pub emptied: bool,
    #[serde(rename = "lidPosition")]
    pub lid_position: u8,
    #[serde(rename = "internalTempC")]
    pub internal_temp_c: f32,
    pub battery: f32,
    #[serde(rename = "batterySoc", skip_serializing_if = "Option::is_none")]
    pub battery_soc: Option<u8>,
    #[serde(rename = "alertCode")]
    pub alert_code: u8,
    #[serde(rename = "resetCount")]
    pub reset_count: u8,
    #[serde(rename = "connectDuration")]
    pub connect_duration_secs: u16,
    #[serde(rename = "signalStrength")]
    pub signal_strength: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_payload_uses_wire_field_names() {
        let p = ReportPayload {
            timestamp: 1_700_000_000,
            percent_full: 62.5,
            trash_height_in: 18.0,
            emptied: false,
            lid_position: 5,
            internal_temp_c: 21.0,
            battery: 3.9,
            battery_soc: None,
            alert_code: 0,
            reset_count: 1,
            connect_duration_secs: 42,
            signal_strength: 61,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["percentFull"], 62.5);
        assert_eq!(json["lidPosition"], 5);
        assert_eq!(json["resetCount"], 1);
        assert_eq!(json["connectDuration"], 42);
        assert_eq!(json["signalStrength"], 61);
        // Boards without a fuel gauge omit the SoC field entirely.
        assert!(json.get("batterySoc").is_none());
    }
}
