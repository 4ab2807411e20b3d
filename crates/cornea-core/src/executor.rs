// ── UI scheduler ──
//
// The single-threaded task queue everything in the core runs on.
// Ready tasks run FIFO; delayed tasks become ready in (deadline, post
// order). Time comes from an injectable `Clock` so tests and replays
// can step it by hand.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

// ── Clock ────────────────────────────────────────────────────────────

/// Source of "now" for the scheduler.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

type Task = Box<dyn FnOnce()>;

struct Delayed {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    // Reversed: `BinaryHeap` is a max-heap, we want the earliest first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SchedulerInner {
    clock: Rc<dyn Clock>,
    ready: RefCell<VecDeque<Task>>,
    delayed: RefCell<BinaryHeap<Delayed>>,
    seq: Cell<u64>,
}

/// Handle to the UI-thread task queue. Cheap to clone.
///
/// Nothing here runs on its own: the owner drives it with
/// [`run_pending`](Self::run_pending), either by hand (tests, replays) or
/// from [`Cornea::run`](crate::Cornea::run).
#[derive(Clone)]
pub struct UiScheduler {
    inner: Rc<SchedulerInner>,
}

impl UiScheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                ready: RefCell::new(VecDeque::new()),
                delayed: RefCell::new(BinaryHeap::new()),
                seq: Cell::new(0),
            }),
        }
    }

    /// Scheduler driven by the wall clock.
    pub fn system() -> Self {
        Self::new(Rc::new(SystemClock))
    }

    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Queue `task` behind everything already ready.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        self.inner.ready.borrow_mut().push_back(Box::new(task));
    }

    /// Queue `task` to become ready once `delay` has elapsed.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + 'static) {
        if delay.is_zero() {
            self.post(task);
            return;
        }
        let seq = self.inner.seq.get();
        self.inner.seq.set(seq + 1);
        self.inner.delayed.borrow_mut().push(Delayed {
            deadline: self.now() + delay,
            seq,
            task: Box::new(task),
        });
    }

    /// Run every task that is ready now, including tasks they post.
    /// Returns the number of tasks executed.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            self.promote_due();
            // Pop with the borrow released before running the task.
            let next = self.inner.ready.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Deadline of the earliest delayed task, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.delayed.borrow().peek().map(|d| d.deadline)
    }

    /// True when nothing is ready or delayed.
    pub fn is_idle(&self) -> bool {
        self.inner.ready.borrow().is_empty() && self.inner.delayed.borrow().is_empty()
    }

    fn promote_due(&self) {
        let now = self.now();
        let mut delayed = self.inner.delayed.borrow_mut();
        let mut ready = self.inner.ready.borrow_mut();
        while delayed.peek().is_some_and(|d| d.deadline <= now) {
            if let Some(d) = delayed.pop() {
                ready.push_back(d.task);
            }
        }
    }
}

impl std::fmt::Debug for UiScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiScheduler")
            .field("ready", &self.inner.ready.borrow().len())
            .field("delayed", &self.inner.delayed.borrow().len())
            .finish_non_exhaustive()
    }
}
