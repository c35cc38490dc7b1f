//! tokio-backed one-shot timers.

use fpunlock_core::{Event, TimerScheduler, TimerToken};
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

/// One sleep task per token; expiry is delivered as `Event::TimerFired`.
pub struct TokioTimers {
    events: UnboundedSender<Event>,
    next: u64,
    pending: HashMap<TimerToken, AbortHandle>,
}

impl TokioTimers {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            next: 0,
            pending: HashMap::new(),
        }
    }

    /// Timers scheduled and neither fired nor cancelled.
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.pending
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl TimerScheduler for TokioTimers {
    fn schedule(&mut self, delay: Duration) -> TimerToken {
        self.pending.retain(|_, handle| !handle.is_finished());

        self.next += 1;
        let token = TimerToken(self.next);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::TimerFired(token));
        });
        debug!("{token} armed for {delay:?}");
        self.pending.insert(token, task.abort_handle());
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.pending.remove(&token) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_the_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);

        let started = tokio::time::Instant::now();
        let token = timers.schedule(Duration::from_millis(750));
        assert_eq!(rx.recv().await, Some(Event::TimerFired(token)));
        assert_eq!(started.elapsed(), Duration::from_millis(750));

        tokio::task::yield_now().await;
        assert_eq!(timers.pending(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);

        let first = timers.schedule(Duration::from_millis(250));
        let second = timers.schedule(Duration::from_millis(500));
        assert_ne!(first, second);
        timers.cancel(first);

        assert_eq!(rx.recv().await, Some(Event::TimerFired(second)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_aborts_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.schedule(Duration::from_millis(250));
        timers.schedule(Duration::from_millis(750));
        drop(timers);

        // every sender went away with the aborted tasks
        assert_eq!(rx.recv().await, None);
    }
}
