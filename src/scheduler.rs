//! Tick sources for the frame-sampling loop.
//!
//! Production uses a fixed-rate interval that skips missed ticks, so a slow
//! decode never builds a backlog. Tests and hosts with their own frame pacing
//! drive the loop by hand through [`ManualClock`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Interval, MissedTickBehavior};

/// Fastest and slowest sampling periods (15 and 5 samples per second).
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(66);
pub const MAX_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub enum SamplingClock {
    Interval(Duration),
    Manual(ManualClock),
}

impl SamplingClock {
    /// A fixed-rate clock with the period clamped into the 5-15 Hz band.
    pub fn interval(period: Duration) -> Self {
        SamplingClock::Interval(period.clamp(MIN_SAMPLE_INTERVAL, MAX_SAMPLE_INTERVAL))
    }

    /// Start a tick stream for one session.
    pub(crate) fn start(&self) -> Ticks {
        match self {
            SamplingClock::Interval(period) => {
                let mut interval = time::interval(*period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticks::Interval(interval)
            }
            SamplingClock::Manual(clock) => Ticks::Manual(Arc::clone(&clock.rx)),
        }
    }
}

pub(crate) enum Ticks {
    Interval(Interval),
    Manual(Arc<Mutex<mpsc::UnboundedReceiver<()>>>),
}

impl Ticks {
    /// Wait for the next tick. `false` means the clock is gone for good.
    pub(crate) async fn next(&mut self) -> bool {
        match self {
            Ticks::Interval(interval) => {
                interval.tick().await;
                true
            }
            Ticks::Manual(rx) => rx.lock().await.recv().await.is_some(),
        }
    }
}

/// Clock whose ticks are triggered by a [`ManualTrigger`].
#[derive(Clone)]
pub struct ManualClock {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<()>>>,
}

#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualClock {
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
            ManualTrigger { tx },
        )
    }
}

impl ManualTrigger {
    /// Request one sample.
    pub fn tick(&self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped_to_sampling_band() {
        match SamplingClock::interval(Duration::from_millis(5)) {
            SamplingClock::Interval(period) => assert_eq!(period, MIN_SAMPLE_INTERVAL),
            SamplingClock::Manual(_) => unreachable!(),
        }
        match SamplingClock::interval(Duration::from_secs(2)) {
            SamplingClock::Interval(period) => assert_eq!(period, MAX_SAMPLE_INTERVAL),
            SamplingClock::Manual(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn manual_ticks_follow_triggers() {
        let (clock, trigger) = ManualClock::new();
        let mut ticks = SamplingClock::Manual(clock).start();

        trigger.tick();
        trigger.tick();
        assert!(ticks.next().await);
        assert!(ticks.next().await);

        drop(trigger);
        assert!(!ticks.next().await);
    }

    #[tokio::test]
    async fn interval_ticks_advance_with_time() {
        let mut ticks = SamplingClock::interval(Duration::from_millis(100)).start();
        let started = time::Instant::now();
        assert!(ticks.next().await);
        assert!(ticks.next().await);
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
