//! Single-handle periodic task used to re-assert the desired call state.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Owns at most one running periodic task.
///
/// Arming an armed timer and cancelling an idle one are both no-ops.
#[derive(Debug, Default)]
pub struct KeepaliveTimer {
    handle: Option<JoinHandle<()>>,
}

impl KeepaliveTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Run `tick` every `period`, first after one full period.
    ///
    /// Returns `false` without spawning when a timer is already running.
    pub fn arm<F, Fut>(&mut self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_armed() {
            return false;
        }

        debug!("Arming keepalive every {period:?}");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.handle = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                tick().await;
            }
        }));
        true
    }

    /// Stop the timer. Returns whether a timer was running.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                debug!("Keepalive cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for KeepaliveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = KeepaliveTimer::new();
        assert!(timer.arm(Duration::from_secs(10), counting(&ticks)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_arm_is_a_no_op() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = KeepaliveTimer::new();
        assert!(timer.arm(Duration::from_secs(10), counting(&ticks)));
        assert!(!timer.arm(Duration::from_secs(10), counting(&ticks)));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticking_and_is_idempotent() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = KeepaliveTimer::new();
        assert!(!timer.cancel());

        timer.arm(Duration::from_secs(10), counting(&ticks));
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
