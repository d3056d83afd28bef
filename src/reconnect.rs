//! Reconnection scheduling with exponential backoff.
//!
//! After the channel closes the session asks the [`ReconnectController`] to
//! schedule an attempt. Scheduling is two-phase: the first deadline is
//! immediate, so the `reconnectionPending` announcement is published on a
//! later turn of the session loop than the `state:offline` that caused it.
//! The second deadline is the backoff delay itself, after which the session
//! announces `reconnecting` and connects.

use std::time::Duration;

use tokio::time::Instant;

/// Exponential backoff delay, doubled after every attempt and capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    /// Start at `min`. `max` is raised to `min` if it is smaller.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
        }
    }

    /// Delay the next attempt will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Back to the minimum delay.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Return the current delay and double it (capped at the maximum) for
    /// the following attempt.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Where the controller is in a reconnection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    /// Nothing scheduled.
    Idle,
    /// Waiting for the zero-delay tick that announces the attempt.
    Pending,
    /// Announced; waiting out the backoff delay.
    Attempting,
}

/// What the session should do when the controller's deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconnectStep {
    /// Publish `reconnectionPending` with this delay.
    Announce(Duration),
    /// Publish `reconnecting` and connect.
    Attempt,
}

#[derive(Debug)]
pub(crate) struct ReconnectController {
    phase: ReconnectPhase,
    deadline: Option<Instant>,
    backoff: Backoff,
    enabled: bool,
}

impl ReconnectController {
    pub(crate) fn new(backoff: Backoff) -> Self {
        Self {
            phase: ReconnectPhase::Idle,
            deadline: None,
            backoff,
            enabled: true,
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// React to the session going offline. Returns `false` when automatic
    /// reconnection is disabled or a cycle is already under way.
    pub(crate) fn schedule(&mut self) -> bool {
        if !self.enabled || self.phase != ReconnectPhase::Idle {
            return false;
        }
        self.phase = ReconnectPhase::Pending;
        self.deadline = Some(Instant::now());
        true
    }

    /// Advance the cycle once the deadline has passed.
    pub(crate) fn fire(&mut self) -> Option<ReconnectStep> {
        match self.phase {
            ReconnectPhase::Idle => {
                self.deadline = None;
                None
            }
            ReconnectPhase::Pending => {
                let delay = self.backoff.advance();
                self.phase = ReconnectPhase::Attempting;
                self.deadline = Some(Instant::now() + delay);
                Some(ReconnectStep::Announce(delay))
            }
            ReconnectPhase::Attempting => {
                self.cancel();
                Some(ReconnectStep::Attempt)
            }
        }
    }

    /// A connection opened: drop any scheduled attempt and reset the delay.
    pub(crate) fn on_open(&mut self) {
        self.cancel();
        self.backoff.reset();
    }

    /// Stop reconnecting for the rest of the session's life.
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
        self.cancel();
    }

    fn cancel(&mut self) {
        self.phase = ReconnectPhase::Idle;
        self.deadline = None;
    }
}

/// Resolve at `deadline`, or never when there is none.
pub(crate) async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(ms(1000), ms(64000));
        let delays: Vec<u64> = (0..9)
            .map(|_| u64::try_from(backoff.advance().as_millis()).unwrap())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 32000, 64000, 64000, 64000]
        );
    }

    #[test]
    fn backoff_cap_need_not_be_a_power_of_two() {
        let mut backoff = Backoff::new(ms(1000), ms(5000));
        backoff.advance();
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.current(), ms(5000));
    }

    #[test]
    fn backoff_reset_returns_to_min() {
        let mut backoff = Backoff::new(ms(250), ms(1000));
        backoff.advance();
        backoff.advance();
        backoff.reset();
        assert_eq!(backoff.current(), ms(250));
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_announces_then_attempts() {
        let mut controller = ReconnectController::new(Backoff::new(ms(1000), ms(64000)));
        assert!(controller.schedule());
        assert_eq!(controller.phase(), ReconnectPhase::Pending);
        assert!(controller.deadline().unwrap() <= Instant::now());

        let announced_at = Instant::now();
        assert_eq!(controller.fire(), Some(ReconnectStep::Announce(ms(1000))));
        assert_eq!(controller.phase(), ReconnectPhase::Attempting);
        assert_eq!(controller.deadline(), Some(announced_at + ms(1000)));
        assert_eq!(controller.backoff().current(), ms(2000));

        assert_eq!(controller.fire(), Some(ReconnectStep::Attempt));
        assert_eq!(controller.phase(), ReconnectPhase::Idle);
        assert!(controller.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_ignored_mid_cycle() {
        let mut controller = ReconnectController::new(Backoff::new(ms(1000), ms(64000)));
        assert!(controller.schedule());
        assert!(!controller.schedule());
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_and_blocks_future_cycles() {
        let mut controller = ReconnectController::new(Backoff::new(ms(1000), ms(64000)));
        controller.schedule();
        controller.fire();
        controller.disable();

        assert_eq!(controller.phase(), ReconnectPhase::Idle);
        assert_eq!(controller.fire(), None);
        assert!(!controller.schedule());
    }

    #[tokio::test(start_paused = true)]
    async fn open_resets_backoff_and_cancels() {
        let mut controller = ReconnectController::new(Backoff::new(ms(1000), ms(64000)));
        controller.schedule();
        controller.fire();
        controller.on_open();

        assert_eq!(controller.phase(), ReconnectPhase::Idle);
        assert_eq!(controller.backoff().current(), ms(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sleeps_until_deadline() {
        let start = Instant::now();
        wait_for(Some(start + ms(1500))).await;
        assert_eq!(Instant::now() - start, ms(1500));
    }
}
