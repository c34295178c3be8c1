//! Connect-attempt bookkeeping.
//!
//! The modem and cloud session are driven through ports; this module owns
//! the policy around an attempt: how long it has run, where the state
//! machine resumes once the session is up, and how a timeout classifies
//! into the two connectivity alerts (cloud-layer failure with cellular up,
//! versus no network at all).

use log::{info, warn};

use crate::error::AlertCode;

/// Where the state machine goes once the session is up.  An attempt made to
/// deliver a report resumes in response-wait; any other attempt (clock
/// sync, user button, alert push) resumes in idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTarget {
    Idle,
    RespWait,
}

/// Result of polling an in-flight attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPoll {
    InProgress,
    Connected {
        duration_secs: u16,
        target: ResumeTarget,
    },
    /// The attempt ran out its budget.  `alert` distinguishes a cloud-layer
    /// failure (cellular registered) from a dead network.
    TimedOut { alert: AlertCode },
}

struct Attempt {
    started_ms: u64,
    target: ResumeTarget,
}

pub struct ConnectionManager {
    timeout_secs: u16,
    attempt: Option<Attempt>,
}

impl ConnectionManager {
    pub fn new(timeout_secs: u16) -> Self {
        Self {
            timeout_secs,
            attempt: None,
        }
    }

    /// Record the start of an attempt.  The caller is responsible for
    /// actually kicking the modem via its port.
    pub fn begin(&mut self, now_ms: u64, target: ResumeTarget) {
        info!("connect attempt started (budget {} s)", self.timeout_secs);
        self.attempt = Some(Attempt {
            started_ms: now_ms,
            target,
        });
    }

    pub fn in_progress(&self) -> bool {
        self.attempt.is_some()
    }

    /// Seconds the current attempt has been running, capped at 900 so it
    /// always fits the persisted duration field.
    pub fn elapsed_secs(&self, now_ms: u64) -> u16 {
        match &self.attempt {
            Some(a) => (now_ms.saturating_sub(a.started_ms) / 1000).min(900) as u16,
            None => 0,
        }
    }

    /// Advance the attempt against the current link state.
    pub fn poll(&mut self, now_ms: u64, cloud_up: bool, cellular_registered: bool) -> ConnectPoll {
        let Some(attempt) = &self.attempt else {
            return ConnectPoll::InProgress;
        };

        if cloud_up {
            let duration_secs = self.elapsed_secs(now_ms);
            let target = attempt.target;
            self.attempt = None;
            info!("connected in {duration_secs} s");
            return ConnectPoll::Connected {
                duration_secs,
                target,
            };
        }

        if self.elapsed_secs(now_ms) >= self.timeout_secs {
            self.attempt = None;
            let alert = if cellular_registered {
                AlertCode::CloudUnreachable
            } else {
                AlertCode::NetworkUnreachable
            };
            warn!(
                "failed to connect within {} s ({alert})",
                self.timeout_secs
            );
            return ConnectPoll::TimedOut { alert };
        }

        ConnectPoll::InProgress
    }

    /// Abandon the attempt without classifying it (sleep, reset paths).
    pub fn cancel(&mut self) {
        self.attempt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_within_budget_reports_duration_and_target() {
        let mut cm = ConnectionManager::new(600);
        cm.begin(1_000, ResumeTarget::RespWait);
        assert_eq!(cm.poll(5_000, false, false), ConnectPoll::InProgress);
        assert_eq!(
            cm.poll(43_000, true, true),
            ConnectPoll::Connected {
                duration_secs: 42,
                target: ResumeTarget::RespWait
            }
        );
        assert!(!cm.in_progress());
    }

    #[test]
    fn timeout_with_cellular_up_is_cloud_unreachable() {
        let mut cm = ConnectionManager::new(600);
        cm.begin(0, ResumeTarget::Idle);
        assert_eq!(
            cm.poll(600_000, false, true),
            ConnectPoll::TimedOut {
                alert: AlertCode::CloudUnreachable
            }
        );
    }

    #[test]
    fn timeout_with_no_cellular_is_network_unreachable() {
        let mut cm = ConnectionManager::new(600);
        cm.begin(0, ResumeTarget::Idle);
        assert_eq!(
            cm.poll(600_000, false, false),
            ConnectPoll::TimedOut {
                alert: AlertCode::NetworkUnreachable
            }
        );
    }

    #[test]
    fn elapsed_caps_at_persisted_field_limit() {
        let mut cm = ConnectionManager::new(600);
        cm.begin(0, ResumeTarget::Idle);
        assert_eq!(cm.elapsed_secs(2_000_000), 900);
    }

    #[test]
    fn idle_manager_polls_as_in_progress_without_panicking() {
        let mut cm = ConnectionManager::new(600);
        assert_eq!(cm.poll(1_000, true, true), ConnectPoll::InProgress);
        assert_eq!(cm.elapsed_secs(1_000), 0);
    }

    #[test]
    fn cancel_discards_the_attempt() {
        let mut cm = ConnectionManager::new(600);
        cm.begin(0, ResumeTarget::RespWait);
        cm.cancel();
        assert!(!cm.in_progress());
        assert_eq!(cm.poll(700_000, false, false), ConnectPoll::InProgress);
    }
}
