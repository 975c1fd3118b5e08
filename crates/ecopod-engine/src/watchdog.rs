//! Watchdog / escalation handler
//!
//! The single terminal handler for failures nothing else contained:
//! boot-fatal errors, errors escaping a supervisor's cycle, worker panics.
//! It makes the failure visible - all record and data LED channels
//! alternate between on and off at one-second granularity - and then
//! decides between the two escalation tiers:
//!
//! - a recovery duration is configured: blink for that long, then reboot.
//!   Bounded failures self-heal.
//! - no duration: blink until a human arrives. Unknown failures must not
//!   reboot-loop the device into flash wear and dead batteries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::system::ISystemControl;

/// Distress blink cadence
const BLINK_PERIOD: Duration = Duration::from_secs(1);

/// Terminal failure handler
pub struct Watchdog {
    indicator: Arc<dyn IIndicator>,
    system: Arc<dyn ISystemControl>,
    /// Distress duration before the reboot tier; `None` disables reboot
    recovery: Option<Duration>,
}

impl Watchdog {
    pub fn new(
        indicator: Arc<dyn IIndicator>,
        system: Arc<dyn ISystemControl>,
        recovery: Option<Duration>,
    ) -> Self {
        Self {
            indicator,
            system,
            recovery,
        }
    }

    /// Enters the distress state for `error`.
    ///
    /// Returns only after the bounded tier has invoked the reboot (the
    /// return exists for the window between invocation and the OS taking
    /// the process down, and for tests). With no recovery duration
    /// configured this never returns.
    pub async fn engage(&self, error: anyhow::Error) {
        error!(
            error = format!("{error:#}"),
            recovery_secs = self.recovery.map(|d| d.as_secs()),
            "Unrecoverable failure; entering distress state"
        );

        let mut lit = true;
        let mut elapsed = Duration::ZERO;

        loop {
            let state = if lit { LedState::ON } else { LedState::OFF };
            self.indicator.set_state(StatusGroup::Record, state);
            self.indicator.set_state(StatusGroup::Data, state);

            tokio::time::sleep(BLINK_PERIOD).await;
            lit = !lit;
            elapsed += BLINK_PERIOD;

            if let Some(limit) = self.recovery {
                if elapsed >= limit {
                    break;
                }
            }
        }

        info!("Rebooting device to attempt recovery");
        if let Err(e) = self.system.reboot().await {
            error!(error = format!("{e:#}"), "Reboot invocation failed");
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::testing::{MockSystem, RecordingIndicator};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_tier_blinks_then_reboots() {
        let indicator = Arc::new(RecordingIndicator::default());
        let system = Arc::new(MockSystem::default());
        let watchdog = Watchdog::new(
            Arc::clone(&indicator) as _,
            Arc::clone(&system) as _,
            Some(Duration::from_secs(5)),
        );

        watchdog.engage(anyhow::anyhow!("sensor gone")).await;

        assert_eq!(system.reboots.load(Ordering::SeqCst), 1);

        // Both groups alternated between all-on and all-off.
        for group in [StatusGroup::Record, StatusGroup::Data] {
            let history = indicator.history(group);
            assert!(history.len() >= 5);
            assert_eq!(history[0], LedState::ON);
            assert_eq!(history[1], LedState::OFF);
            assert_eq!(history[2], LedState::ON);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_tier_never_reboots() {
        let indicator = Arc::new(RecordingIndicator::default());
        let system = Arc::new(MockSystem::default());
        let watchdog = Watchdog::new(
            Arc::clone(&indicator) as _,
            Arc::clone(&system) as _,
            None,
        );

        let engage = tokio::spawn(async move {
            watchdog.engage(anyhow::anyhow!("unknown failure")).await;
        });

        // Well past any plausible recovery bound.
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(system.reboots.load(Ordering::SeqCst), 0);
        assert!(indicator.history(StatusGroup::Record).len() > 1000);
        engage.abort();
    }
}
