//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production).  A future cloud telemetry
//! adapter would implement the same trait.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::AlertRaised(code) => {
                info!("ALERT | code={}", code);
            }
            AppEvent::RecoveryExecuted { alert, action } => {
                info!("RECOVER | alert={} action={}", alert, action);
            }
            AppEvent::MeasurementTaken {
                percent_full,
                emptied,
            } => {
                info!(
                    "MEASURE | {:.1}% full{}",
                    percent_full,
                    if *emptied { " (emptied)" } else { "" }
                );
            }
            AppEvent::ReportQueued(p) => {
                info!(
                    "REPORT | {:.1}% full | {:.1}in | lid={} | {:.1}C | {:.2}V | alert={} | resets={}",
                    p.percent_full,
                    p.trash_height_in,
                    p.lid_position,
                    p.internal_temp_c,
                    p.battery,
                    p.alert_code,
                    p.reset_count,
                );
            }
        }
    }
}
