//! Suspension effects used by the harvest loop: the clock, sleeping, and the
//! randomized politeness delay between pages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default lower bound of the politeness delay.
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_secs(5);
/// Default upper bound of the politeness delay.
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_secs(10);

/// Uniformly distributed wait applied before every page after the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
}

impl DelayPolicy {
    /// Creates a policy over `[min, max]`; an inverted range is swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A policy that never waits.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Lower bound of the delay.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound of the delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws one delay from the range.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let low = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let high = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_MIN, DEFAULT_DELAY_MAX)
    }
}

/// Wall clock plus the ability to suspend the harvest task.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Current wall-clock time, used to turn rate-limit reset times into waits.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<P: Pacer + ?Sized> Pacer for Arc<P> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Production pacer backed by the system clock and `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Pacer that advances a virtual clock instead of sleeping.
///
/// Every requested sleep is recorded, which makes harvest runs deterministic
/// and lets callers inspect exactly how long the loop would have waited.
#[derive(Debug)]
pub struct VirtualPacer {
    state: Mutex<VirtualClock>,
}

#[derive(Debug)]
struct VirtualClock {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl VirtualPacer {
    /// Starts the virtual clock at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(VirtualClock {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Sum of all requested sleeps.
    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualClock> {
        // The clock holds plain data, so a poisoned guard is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Pacer for VirtualPacer {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut clock = self.lock();
        clock.sleeps.push(duration);
        if let Some(next) = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|step| clock.now.checked_add_signed(step))
        {
            clock.now = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn samples_stay_within_bounds() {
        let policy = DelayPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..256 {
            let delay = policy.sample(&mut rng);
            assert!(delay >= Duration::from_secs(5), "{delay:?} below range");
            assert!(delay <= Duration::from_secs(10), "{delay:?} above range");
        }
    }

    #[test]
    fn inverted_range_is_normalized() {
        let policy = DelayPolicy::new(Duration::from_secs(9), Duration::from_secs(3));
        assert_eq!(policy.min(), Duration::from_secs(3));
        assert_eq!(policy.max(), Duration::from_secs(9));
    }

    #[test]
    fn degenerate_range_is_constant() {
        let policy = DelayPolicy::new(Duration::from_secs(2), Duration::from_secs(2));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.sample(&mut rng), Duration::from_secs(2));
        assert_eq!(DelayPolicy::none().sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn huge_bounds_do_not_wrap() {
        let policy = DelayPolicy::new(Duration::from_secs(u64::MAX - 1), Duration::MAX);
        let mut rng = StdRng::seed_from_u64(3);
        let delay = policy.sample(&mut rng);
        assert!(delay >= Duration::from_millis(u64::MAX - 1), "{delay:?} wrapped");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn virtual_pacer_advances_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let pacer = VirtualPacer::starting_at(start);
        pacer.sleep(Duration::from_secs(3)).await;
        pacer.sleep(Duration::from_millis(500)).await;
        assert_eq!(pacer.now(), start + chrono::Duration::milliseconds(3500));
        assert_eq!(
            pacer.sleeps(),
            vec![Duration::from_secs(3), Duration::from_millis(500)]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn tokio_pacer_sleeps_on_the_runtime_clock() {
        let before = tokio::time::Instant::now();
        TokioPacer.sleep(Duration::from_secs(2)).await;
        assert!(before.elapsed() >= Duration::from_secs(2));
    }
}
