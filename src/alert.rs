//! Alert resolution policy.
//!
//! Maps the single alert channel on the current-cycle record to an
//! escalating [`RecoveryAction`].  The policy is pure: it looks only at the
//! alert code and connection history handed to it, so the escalation rules
//! are testable without hardware.
//!
//! Destructive actions (reset, power-cycle) carry a hold-off so the device
//! can push the alert out to the cloud before executing them; the error
//! state owns that timer and queries [`AlertPolicy::needs_holdoff`].

use log::info;

use crate::config::SystemConfig;
use crate::error::{AlertCode, RecoveryAction};
use crate::schedule::SECS_PER_HOUR;

/// Connection history consulted when deciding how hard to escalate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertInputs {
    pub now_epoch: u64,
    /// Last successful cloud connection (epoch seconds, 0 = never).
    pub last_connection_epoch: u64,
    /// Last valid webhook acknowledgement (epoch seconds, 0 = never).
    pub last_hook_response_epoch: u64,
}

impl AlertInputs {
    fn hours_since_connection(&self) -> u64 {
        self.now_epoch
            .saturating_sub(self.last_connection_epoch)
            / u64::from(SECS_PER_HOUR)
    }

    fn hours_since_hook_response(&self) -> u64 {
        self.now_epoch
            .saturating_sub(self.last_hook_response_epoch)
            / u64::from(SECS_PER_HOUR)
    }
}

pub struct AlertPolicy {
    /// Hold-off before a destructive recovery action executes, ms.
    holdoff_ms: u32,
    connect_escalation_hours: u64,
    ack_escalation_hours: u64,
}

impl AlertPolicy {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            holdoff_ms: config.error_cooldown_ms,
            connect_escalation_hours: u64::from(config.connect_escalation_hours),
            ack_escalation_hours: u64::from(config.ack_escalation_hours),
        }
    }

    /// Resolve a raw alert code to a recovery action.
    ///
    /// Codes this firmware does not recognise resolve to a reset: an
    /// unknown alert means the persisted state or a newer firmware left
    /// something behind, and a reboot is the safe generic recovery.
    pub fn resolve(&self, raw_code: u8, inputs: &AlertInputs) -> RecoveryAction {
        let Some(alert) = AlertCode::from_code(raw_code) else {
            info!("unknown alert code {raw_code}, failing safe to reset");
            return RecoveryAction::Reset;
        };

        let action = match alert {
            AlertCode::None => RecoveryAction::NoAction,

            // Charging is disabled by the power supervisor; the alert just
            // needs to reach the dashboard.
            AlertCode::ChargeTempUnsafe => RecoveryAction::Reconnect,
            AlertCode::PmicResetRequired => RecoveryAction::PowerCycle,
            AlertCode::InitFailure => RecoveryAction::PowerCycle,
            AlertCode::ExcessiveResets => RecoveryAction::PowerCycle,
            AlertCode::OutOfMemory => RecoveryAction::Reset,
            AlertCode::ModemPowerDownFailed => RecoveryAction::Reset,

            // Update lifecycle alerts are informational except for hard
            // failures, which reboot into the known-good image.
            AlertCode::UpdateCompleted => RecoveryAction::Reconnect,
            AlertCode::UpdateTimedOut => RecoveryAction::Reset,
            AlertCode::UpdateFailed => RecoveryAction::Reset,
            AlertCode::UpdateAttemptLimit => RecoveryAction::Reconnect,

            // The cloud layer failed but cellular came up: retrying the
            // session is cheap and usually works.
            AlertCode::CloudUnreachable => RecoveryAction::Reconnect,

            // No network at all.  Back off while the outage is fresh (the
            // tower may simply be congested); after the escalation window
            // without any successful connection, power-cycle the modem.
            AlertCode::NetworkUnreachable => {
                if inputs.hours_since_connection() < self.connect_escalation_hours {
                    RecoveryAction::NoAction
                } else {
                    RecoveryAction::PowerCycle
                }
            }

            // Connected but the webhook backend never answered.  If acks
            // were flowing recently the backend is likely mid-hiccup, so
            // just reconnect and retry; a long ack drought gets a reset.
            AlertCode::HookResponseTimeout => {
                if inputs.hours_since_hook_response() < self.ack_escalation_hours {
                    RecoveryAction::Reconnect
                } else {
                    RecoveryAction::Reset
                }
            }
        };

        info!("alert {alert} resolves to {action}");
        action
    }

    /// Whether the action must wait out the hold-off before executing.
    /// Non-destructive actions run immediately.
    pub fn needs_holdoff(&self, action: RecoveryAction) -> bool {
        action >= RecoveryAction::Reset
    }

    pub fn holdoff_ms(&self) -> u32 {
        self.holdoff_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AlertPolicy {
        AlertPolicy::new(&SystemConfig::default())
    }

    fn inputs_at(now: u64, last_conn: u64, last_ack: u64) -> AlertInputs {
        AlertInputs {
            now_epoch: now,
            last_connection_epoch: last_conn,
            last_hook_response_epoch: last_ack,
        }
    }

    #[test]
    fn hard_faults_power_cycle() {
        let p = policy();
        let i = AlertInputs::default();
        assert_eq!(p.resolve(11, &i), RecoveryAction::PowerCycle);
        assert_eq!(p.resolve(12, &i), RecoveryAction::PowerCycle);
        assert_eq!(p.resolve(13, &i), RecoveryAction::PowerCycle);
    }

    #[test]
    fn cloud_unreachable_just_reconnects() {
        let p = policy();
        assert_eq!(
            p.resolve(30, &inputs_at(100_000, 99_000, 99_000)),
            RecoveryAction::Reconnect
        );
    }

    #[test]
    fn fresh_network_outage_backs_off() {
        let p = policy();
        // Connected less than two hours ago: no action, try again later.
        let now = 10 * 3600;
        assert_eq!(
            p.resolve(31, &inputs_at(now, now - 3600, 0)),
            RecoveryAction::NoAction
        );
    }

    #[test]
    fn stale_network_outage_power_cycles() {
        let p = policy();
        let now = 10 * 3600;
        assert_eq!(
            p.resolve(31, &inputs_at(now, now - 3 * 3600, 0)),
            RecoveryAction::PowerCycle
        );
        // Never connected at all counts as stale.
        assert_eq!(p.resolve(31, &inputs_at(now, 0, 0)), RecoveryAction::PowerCycle);
    }

    #[test]
    fn hook_timeout_downgrades_when_acks_are_recent() {
        let p = policy();
        let now = 20 * 3600;
        assert_eq!(
            p.resolve(40, &inputs_at(now, now, now - 3600)),
            RecoveryAction::Reconnect
        );
        assert_eq!(
            p.resolve(40, &inputs_at(now, now, now - 5 * 3600)),
            RecoveryAction::Reset
        );
    }

    #[test]
    fn unknown_code_fails_safe_to_reset() {
        let p = policy();
        assert_eq!(p.resolve(99, &AlertInputs::default()), RecoveryAction::Reset);
        assert_eq!(p.resolve(1, &AlertInputs::default()), RecoveryAction::Reset);
    }

    #[test]
    fn only_destructive_actions_wait_out_the_holdoff() {
        let p = policy();
        assert!(!p.needs_holdoff(RecoveryAction::NoAction));
        assert!(!p.needs_holdoff(RecoveryAction::Reconnect));
        assert!(p.needs_holdoff(RecoveryAction::Reset));
        assert!(p.needs_holdoff(RecoveryAction::PowerCycle));
        assert_eq!(p.holdoff_ms(), 30_000);
    }
}
