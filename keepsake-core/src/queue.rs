/*!
Per-slot FIFO sequencing and the busy counter.

Each slot has a lane. Submitting an operation takes a [`SlotTicket`] from the lane
synchronously, chaining it behind the previous ticket with a one-shot completion
signal. A ticket's operation may only start once its predecessor has finished, so
operations on one slot run one at a time, in submission order, regardless of how the
worker pool schedules the tasks. Different slots never wait on each other.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Observable state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Never used by this engine
    Idle,
    /// An operation is waiting for an earlier one on the same slot
    Queued,
    /// An operation is executing
    Running,
    /// The most recent operation succeeded
    Completed,
    /// The most recent operation failed
    Failed,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True while work for the slot is outstanding
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct SlotLane {
    /// Completion signal of the most recently submitted ticket
    tail: Option<oneshot::Receiver<()>>,
    /// Tickets submitted and not yet finished
    pending: usize,
    running: bool,
    last_succeeded: Option<bool>,
}

impl SlotLane {
    fn state(&self) -> SlotState {
        if self.running {
            SlotState::Running
        } else if self.pending > 0 {
            SlotState::Queued
        } else {
            match self.last_succeeded {
                Some(true) => SlotState::Completed,
                Some(false) => SlotState::Failed,
                None => SlotState::Idle,
            }
        }
    }
}

/// Lanes for every slot touched so far plus the global in-flight count
///
/// A lane outlives its last ticket so `state` can report the slot's final outcome;
/// once idle it only keeps that outcome, its completion channel is released.
#[derive(Default)]
pub(crate) struct SlotQueue {
    lanes: Mutex<HashMap<String, SlotLane>>,
    in_flight: AtomicUsize,
}

impl SlotQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<String, SlotLane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next position on `slot`'s lane
    pub(crate) fn enqueue(self: &Arc<Self>, slot: &str) -> SlotTicket {
        let (done_tx, done_rx) = oneshot::channel();
        let predecessor = {
            let mut lanes = self.lanes();
            let lane = lanes.entry(slot.to_string()).or_default();
            lane.pending += 1;
            lane.tail.replace(done_rx)
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        SlotTicket {
            slot: slot.to_string(),
            predecessor,
            done: Some(done_tx),
            started: false,
            succeeded: false,
            queue: Arc::clone(self),
        }
    }

    /// Number of slot operations queued or running
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self, slot: &str) -> SlotState {
        self.lanes()
            .get(slot)
            .map(SlotLane::state)
            .unwrap_or(SlotState::Idle)
    }

    fn mark_running(&self, slot: &str) {
        if let Some(lane) = self.lanes().get_mut(slot) {
            lane.running = true;
        }
    }

    fn release(&self, slot: &str, outcome: Option<bool>) {
        {
            let mut lanes = self.lanes();
            if let Some(lane) = lanes.get_mut(slot) {
                lane.pending = lane.pending.saturating_sub(1);
                if let Some(succeeded) = outcome {
                    lane.running = false;
                    lane.last_succeeded = Some(succeeded);
                }
                if lane.pending == 0 {
                    lane.tail = None;
                }
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Right to run one operation on one slot, once its turn comes
///
/// Dropping the ticket (normally or because the task was torn down) releases the slot
/// and lets the next ticket proceed.
pub(crate) struct SlotTicket {
    slot: String,
    predecessor: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
    started: bool,
    succeeded: bool,
    queue: Arc<SlotQueue>,
}

impl SlotTicket {
    /// Wait until every earlier operation on this slot has finished
    pub(crate) async fn wait_turn(&mut self) {
        if let Some(predecessor) = self.predecessor.as_mut() {
            // an Err means the predecessor was dropped, which also ends its turn
            let _ = predecessor.await;
            self.predecessor = None;
        }
        self.started = true;
        self.queue.mark_running(&self.slot);
    }

    /// Finish the operation, recording whether it succeeded
    ///
    /// A ticket dropped without ever starting leaves the slot's last outcome as it was.
    pub(crate) fn complete(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for SlotTicket {
    fn drop(&mut self) {
        let outcome = self.started.then_some(self.succeeded);
        self.queue.release(&self.slot, outcome);
        let Some(done) = self.done.take() else {
            return;
        };
        // an unstarted ticket hands its predecessor's signal on to its successor
        match (self.predecessor.take(), tokio::runtime::Handle::try_current()) {
            (Some(predecessor), Ok(handle)) => {
                handle.spawn(async move {
                    let _ = predecessor.await;
                    let _ = done.send(());
                });
            }
            _ => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_ticket_lifecycle() {
        let queue = Arc::new(SlotQueue::new());
        assert_eq!(queue.state("a.dat"), SlotState::Idle);

        let mut ticket = queue.enqueue("a.dat");
        assert_eq!(queue.in_flight(), 1);
        assert_eq!(queue.state("a.dat"), SlotState::Queued);

        ticket.wait_turn().await;
        assert_eq!(queue.state("a.dat"), SlotState::Running);

        ticket.complete(true);
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.state("a.dat"), SlotState::Completed);
    }

    #[tokio::test]
    async fn test_failed_and_dropped_tickets() {
        let queue = Arc::new(SlotQueue::new());
        let mut ticket = queue.enqueue("a.dat");
        ticket.wait_turn().await;
        ticket.complete(false);
        assert_eq!(queue.state("a.dat"), SlotState::Failed);

        let mut started = queue.enqueue("a.dat");
        started.wait_turn().await;
        drop(started);
        assert_eq!(queue.state("a.dat"), SlotState::Failed);

        drop(queue.enqueue("b.dat"));
        assert_eq!(queue.state("b.dat"), SlotState::Idle);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_idle_lane_keeps_only_its_outcome() {
        let queue = Arc::new(SlotQueue::new());
        for _ in 0..3 {
            let mut ticket = queue.enqueue("once.dat");
            ticket.wait_turn().await;
            ticket.complete(true);
        }

        let lanes = queue.lanes();
        let lane = lanes.get("once.dat").unwrap();
        assert!(lane.tail.is_none());
        assert_eq!(lane.pending, 0);
        assert!(!lane.running);
        assert_eq!(lane.state(), SlotState::Completed);
        assert_eq!(lanes.len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_wait_keeps_its_place() {
        let queue = Arc::new(SlotQueue::new());
        let mut first = queue.enqueue("a.dat");
        let mut second = queue.enqueue("a.dat");
        first.wait_turn().await;

        for _ in 0..2 {
            let waiting =
                tokio::time::timeout(Duration::from_millis(20), second.wait_turn()).await;
            assert!(waiting.is_err());
        }
        first.complete(true);
        second.wait_turn().await;
        second.complete(true);
        assert_eq!(queue.state("a.dat"), SlotState::Completed);
    }

    #[tokio::test]
    async fn test_second_ticket_waits_for_first() {
        let queue = Arc::new(SlotQueue::new());
        let mut first = queue.enqueue("a.dat");
        let mut second = queue.enqueue("a.dat");
        assert_eq!(queue.in_flight(), 2);

        first.wait_turn().await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), second.wait_turn()).await;
        assert!(waiting.is_err(), "second ticket ran while first was active");

        first.complete(true);
        assert_eq!(queue.state("a.dat"), SlotState::Queued);
        second.wait_turn().await;
        assert_eq!(queue.state("a.dat"), SlotState::Running);
        second.complete(true);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_disjoint_slots_do_not_wait() {
        let queue = Arc::new(SlotQueue::new());
        let mut a = queue.enqueue("a.dat");
        let mut b = queue.enqueue("b.dat");
        a.wait_turn().await;
        tokio::time::timeout(Duration::from_millis(50), b.wait_turn())
            .await
            .expect("independent slot was blocked");
        assert_eq!(queue.in_flight(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tickets_run_in_submission_order() {
        let queue = Arc::new(SlotQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let mut ticket = queue.enqueue("shared.dat");
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    ticket.wait_turn().await;
                    order.lock().unwrap().push(i);
                    tokio::task::yield_now().await;
                    ticket.complete(true);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(queue.in_flight(), 0);
    }
}
