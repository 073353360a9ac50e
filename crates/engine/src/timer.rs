//! Timer tasks that feed a single ordered inbox.
//!
//! Every periodic or one-shot timer is a spawned task that posts an event
//! into an unbounded `mpsc` channel; the owner drains the channel one event
//! at a time, so timer interleaving never races on shared state. Timers stop
//! when their [`CancellationToken`] is cancelled or the inbox is dropped.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Post `make()` into `inbox` every `period` until cancelled.
///
/// The first event fires immediately. Missed ticks are skipped rather than
/// bursted, so a stalled owner never receives a backlog of polls.
pub fn spawn_ticker<E, F>(
    period: Duration,
    inbox: UnboundedSender<E>,
    make: F,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    E: Send + 'static,
    F: Fn() -> E + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if inbox.send(make()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Post `event` into `inbox` once after `delay`, unless cancelled first.
pub fn spawn_once<E>(
    delay: Duration,
    inbox: UnboundedSender<E>,
    event: E,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    E: Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                let _ = inbox.send(event);
            }
        }
    })
}

/// A re-armable one-shot timer: arming cancels whatever was pending.
#[derive(Debug, Default)]
pub struct OneShot {
    pending: Option<CancellationToken>,
}

impl OneShot {
    /// Cancel any pending fire and schedule `event` after `delay`.
    pub fn arm<E: Send + 'static>(
        &mut self,
        delay: Duration,
        inbox: UnboundedSender<E>,
        event: E,
        parent: &CancellationToken,
    ) {
        self.cancel();
        let token = parent.child_token();
        spawn_once(delay, inbox, event, token.clone());
        self.pending = Some(token);
    }

    /// Cancel the pending fire, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_on_period_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn_ticker(Duration::from_millis(100), tx, || 1u8, cancel.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        // t = 0, 100, 200, 300
        assert_eq!(count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_once(Duration::from_secs(3), tx, "due", CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().unwrap(), "due");
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_previous_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut timer = OneShot::default();

        timer.arm(Duration::from_millis(500), tx.clone(), 1, &parent);
        tokio::time::sleep(Duration::from_millis(300)).await;
        timer.arm(Duration::from_millis(500), tx, 2, &parent);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_parent_cancels_armed_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut timer = OneShot::default();

        timer.arm(Duration::from_millis(500), tx, 1, &parent);
        assert!(timer.is_armed());
        parent.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
