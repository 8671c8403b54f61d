use super::{CallEvent, SessionCommand, TimerKind};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct PendingTimer {
    timer: TimerKind,
    generation: u64,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

/// Fire-once delayed events for the session queue.
///
/// Each timer is a Tokio task that sleeps and then enqueues
/// [`CallEvent::TimerFired`] carrying the generation it was scheduled with.
/// Timers hold no business logic; a fire that arrives after its generation
/// went stale is rejected by the state machine.
pub struct Scheduler {
    fired_tx: mpsc::UnboundedSender<SessionCommand>,
    pending: HashMap<TimerHandle, PendingTimer>,
    next_id: u64,
}

impl Scheduler {
    pub fn new(fired_tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            fired_tx,
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    /// Schedule `timer` to fire after its fixed delay.
    pub fn schedule(&mut self, timer: TimerKind, generation: u64) -> TimerHandle {
        self.schedule_once(timer, timer.delay(), generation)
    }

    /// Must be called from within a Tokio runtime.
    pub fn schedule_once(
        &mut self,
        timer: TimerKind,
        delay: Duration,
        generation: u64,
    ) -> TimerHandle {
        self.prune();
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(SessionCommand::Event(CallEvent::TimerFired { timer, generation }));
                }
            }
        });
        debug!(%timer, generation, delay_ms = delay.as_millis() as u64, "timer scheduled");
        self.pending.insert(
            handle,
            PendingTimer {
                timer,
                generation,
                cancel_token,
                task,
            },
        );
        handle
    }

    /// Cancel one timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.pending.remove(&handle) {
            Some(pending) if !pending.task.is_finished() => {
                pending.cancel_token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every pending timer whose captured generation is not `current`.
    /// Returns how many were cancelled.
    pub fn cancel_stale(&mut self, current: u64) -> usize {
        self.prune();
        let stale: Vec<TimerHandle> = self
            .pending
            .iter()
            .filter(|(_, p)| p.generation != current)
            .map(|(h, _)| *h)
            .collect();
        for handle in &stale {
            if let Some(pending) = self.pending.remove(handle) {
                debug!(timer = %pending.timer, generation = pending.generation, "timer cancelled");
                pending.cancel_token.cancel();
            }
        }
        stale.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.cancel_token.cancel();
        }
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.pending
            .values()
            .filter(|p| !p.task.is_finished())
            .count()
    }

    fn prune(&mut self) {
        self.pending.retain(|_, p| !p.task.is_finished());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fired(cmd: Option<SessionCommand>) -> Option<(TimerKind, u64)> {
        match cmd {
            Some(SessionCommand::Event(CallEvent::TimerFired { timer, generation })) => {
                Some((timer, generation))
            }
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(tx);
        let start = tokio::time::Instant::now();
        scheduler.schedule(TimerKind::Ring, 3);

        let got = fired(rx.recv().await);
        assert_eq!(got, Some((TimerKind::Ring, 3)));
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(tx);
        let menu = scheduler.schedule(TimerKind::Menu, 0);
        scheduler.schedule(TimerKind::ForwardEnd, 0);

        assert!(scheduler.cancel(menu));
        assert!(!scheduler.cancel(menu));

        let got = fired(rx.recv().await);
        assert_eq!(got, Some((TimerKind::ForwardEnd, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stale_keeps_current_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(tx);
        scheduler.schedule(TimerKind::AudioStart, 1);
        scheduler.schedule(TimerKind::ForceEnd, 1);
        scheduler.schedule(TimerKind::IdleReset, 2);
        assert_eq!(scheduler.pending(), 3);

        assert_eq!(scheduler.cancel_stale(2), 2);
        assert_eq!(scheduler.pending(), 1);

        let got = fired(rx.recv().await);
        assert_eq!(got, Some((TimerKind::IdleReset, 2)));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err(), "cancelled timers must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_timers_fire_in_deadline_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = Scheduler::new(tx);
        scheduler.schedule(TimerKind::ForceEnd, 5);
        scheduler.schedule(TimerKind::AudioStart, 5);

        assert_eq!(fired(rx.recv().await), Some((TimerKind::AudioStart, 5)));
        assert_eq!(fired(rx.recv().await), Some((TimerKind::ForceEnd, 5)));
    }
}
