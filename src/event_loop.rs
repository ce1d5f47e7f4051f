//! Cooperative single-threaded scheduler: a micro-task queue, a macro-task
//! queue, and a min-heap of timers.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use crate::value::Value;

pub type TimerId = u64;

/// `{id, due-at, interval-or-none, callback, cancelled}`.
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: TimerId,
    pub due_at: u64,
    pub interval: Option<u64>,
    pub callback: Value,
    pub cancelled: bool,
    /// Insertion sequence, used to break due-time ties so timers with
    /// identical due times fire in registration order.
    sequence: u64,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.sequence == other.sequence
    }
}
impl Eq for Timer {}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest due time (and,
        // on ties, the earliest registration) sorts first.
        other.due_at.cmp(&self.due_at).then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A unit of work queued for the macro-task queue: a callback plus its
/// already-bound arguments.
#[derive(Debug, Clone)]
pub struct MacroTask {
    pub callback: Value,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct MicroTask {
    pub callback: Value,
    pub args: Vec<Value>,
}

/// Micro-task queue, macro-task queue, and timer heap, plus a monotonic
/// virtual clock. There being no real host
/// clock in a deterministic test harness, `now` only advances by jumping to
/// the next due timer — it does not track wall time.
pub struct EventLoop {
    micro_tasks: VecDeque<MicroTask>,
    macro_tasks: VecDeque<MacroTask>,
    timers: BinaryHeap<Timer>,
    now: u64,
    next_timer_id: TimerId,
    next_sequence: u64,
    /// Host resources that keep the loop alive even with empty queues,
    /// e.g. an open server.
    pub keepalive_count: u64,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            micro_tasks: VecDeque::new(),
            macro_tasks: VecDeque::new(),
            timers: BinaryHeap::new(),
            now: 0,
            next_timer_id: 1,
            next_sequence: 0,
            keepalive_count: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn queue_micro_task(&mut self, callback: Value, args: Vec<Value>) {
        self.micro_tasks.push_back(MicroTask { callback, args });
    }

    pub fn queue_macro_task(&mut self, callback: Value, args: Vec<Value>) {
        self.macro_tasks.push_back(MacroTask { callback, args });
    }

    /// `setTimeout`/`setInterval`. `delay_ms` of 0 is a
    /// timer due immediately at (or before) the loop's next tick.
    pub fn schedule_timer(&mut self, callback: Value, delay_ms: u64, interval: Option<u64>) -> TimerId {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.timers.push(Timer {
            id,
            due_at: self.now + delay_ms,
            interval,
            callback,
            cancelled: false,
            sequence,
        });
        id
    }

    /// `clearTimeout`/`clearInterval`: marks the timer cancelled;
    /// observed at fire time, not removed from the heap immediately.
    pub fn cancel_timer(&mut self, id: TimerId) {
        // `BinaryHeap` has no in-place mutation by key; rebuild the heap
        // with the match flagged. Timer counts are small in practice
        // (single-process scripts), so this is not a hot path.
        let timers: Vec<Timer> = self
            .timers
            .drain()
            .map(|mut t| {
                if t.id == id {
                    t.cancelled = true;
                }
                t
            })
            .collect();
        self.timers = timers.into_iter().collect();
    }

    /// Pull-based drain primitives used by the evaluator, which must
    /// interleave its own call stack between tasks rather than hand a
    /// closure down into the loop (the loop and the evaluator are separate
    /// values that both need mutable access as dispatch proceeds).
    pub fn pop_micro_task(&mut self) -> Option<MicroTask> {
        self.micro_tasks.pop_front()
    }

    pub fn pop_ready_macro_task(&mut self) -> Option<MacroTask> {
        self.promote_due_timers();
        self.macro_tasks.pop_front()
    }

    /// Fast-forwards the virtual clock to the next pending timer, if any,
    /// promoting it (and any other timer now due) onto the macro queue.
    /// Returns whether there was a timer to advance to.
    pub fn advance_to_next_timer(&mut self) -> bool {
        if let Some(next_due) = self.timers.peek().map(|t| t.due_at) {
            self.now = self.now.max(next_due);
            self.promote_due_timers();
            true
        } else {
            false
        }
    }

    fn is_empty(&self) -> bool {
        self.micro_tasks.is_empty() && self.macro_tasks.is_empty() && self.timers.is_empty()
    }

    /// Whether the loop has any more work to do, including host keep-alive
    /// resources.
    pub fn is_idle(&self) -> bool {
        self.is_empty() && self.keepalive_count == 0
    }

    /// Drains the micro-task queue to completion, invoking `run` for each
    /// task; callbacks enqueued during drain are appended to the same
    /// cycle.
    pub fn drain_micro_tasks(&mut self, mut run: impl FnMut(&mut Self, Value, Vec<Value>)) {
        while let Some(task) = self.micro_tasks.pop_front() {
            run(self, task.callback, task.args);
        }
    }

    /// Moves any timer whose due time has elapsed onto the macro queue,
    /// re-arming interval timers for their next due time. Cancelled timers
    /// are dropped rather than requeued.
    fn promote_due_timers(&mut self) {
        while let Some(top) = self.timers.peek() {
            if top.due_at > self.now {
                break;
            }
            let timer = self.timers.pop().unwrap();
            if timer.cancelled {
                continue;
            }
            self.macro_tasks.push_back(MacroTask { callback: timer.callback.clone(), args: Vec::new() });
            if let Some(interval) = timer.interval {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.timers.push(Timer {
                    id: timer.id,
                    due_at: self.now + interval,
                    interval: Some(interval),
                    callback: timer.callback,
                    cancelled: false,
                    sequence,
                });
            }
        }
    }

    /// Runs one full iteration: promote due timers, drain one macro-task
    /// (draining micro-tasks before and after it), or fast-forward the
    /// virtual clock to the next timer if nothing is otherwise ready.
    /// Returns `false` once the loop has no more work (idle-exit).
    pub fn tick(&mut self, mut run: impl FnMut(&mut Self, Value, Vec<Value>)) -> bool {
        self.drain_micro_tasks(&mut run);
        self.promote_due_timers();

        if let Some(task) = self.macro_tasks.pop_front() {
            run(self, task.callback, task.args);
            self.drain_micro_tasks(&mut run);
            return true;
        }

        if let Some(next_due) = self.timers.peek().map(|t| t.due_at) {
            self.now = self.now.max(next_due);
            self.promote_due_timers();
            return true;
        }

        !self.is_idle()
    }

    /// Runs the loop to idle-exit, invoking `run`
    /// for each dispatched callback.
    pub fn run_to_completion(&mut self, mut run: impl FnMut(&mut Self, Value, Vec<Value>)) {
        loop {
            if self.is_idle() {
                self.drain_micro_tasks(&mut run);
                return;
            }
            if !self.tick(&mut run) {
                return;
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn timers_fire_in_due_order() {
        let mut loop_ = EventLoop::new();
        loop_.schedule_timer(marker(2.0), 20, None);
        loop_.schedule_timer(marker(1.0), 10, None);
        let mut order = Vec::new();
        loop_.run_to_completion(|_, cb, _| {
            if let Value::Number(n) = cb {
                order.push(n);
            }
        });
        assert_eq!(order, vec![1.0, 2.0]);
    }

    #[test]
    fn same_due_time_fires_in_registration_order() {
        let mut loop_ = EventLoop::new();
        loop_.schedule_timer(marker(1.0), 10, None);
        loop_.schedule_timer(marker(2.0), 10, None);
        let mut order = Vec::new();
        loop_.run_to_completion(|_, cb, _| {
            if let Value::Number(n) = cb {
                order.push(n);
            }
        });
        assert_eq!(order, vec![1.0, 2.0]);
    }

    #[test]
    fn cancelled_timer_is_skipped_at_dispatch() {
        let mut loop_ = EventLoop::new();
        let id = loop_.schedule_timer(marker(1.0), 10, None);
        loop_.cancel_timer(id);
        let mut fired = false;
        loop_.run_to_completion(|_, _, _| fired = true);
        assert!(!fired);
    }

    #[test]
    fn micro_tasks_drain_before_macro_tasks() {
        let mut loop_ = EventLoop::new();
        loop_.queue_macro_task(marker(2.0), vec![]);
        loop_.queue_micro_task(marker(1.0), vec![]);
        let mut order = Vec::new();
        loop_.run_to_completion(|_, cb, _| {
            if let Value::Number(n) = cb {
                order.push(n);
            }
        });
        assert_eq!(order, vec![1.0, 2.0]);
    }

    #[test]
    fn interval_timer_reschedules_itself() {
        let mut loop_ = EventLoop::new();
        let id = loop_.schedule_timer(marker(1.0), 10, Some(10));
        let mut count = 0;
        let mut cancel_id = None;
        loop_.run_to_completion(|l, _, _| {
            count += 1;
            if count == 3 {
                cancel_id = Some(id);
            }
            if let Some(cid) = cancel_id {
                l.cancel_timer(cid);
            }
        });
        assert_eq!(count, 3);
    }

    #[test]
    fn idle_exit_when_queues_and_heap_empty() {
        let loop_ = EventLoop::new();
        assert!(loop_.is_idle());
    }

    #[test]
    fn keepalive_resource_prevents_idle_exit() {
        let mut loop_ = EventLoop::new();
        loop_.keepalive_count += 1;
        assert!(!loop_.is_idle());
    }
}
