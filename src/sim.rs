//! Single-threaded, event-driven simulation kernel.
//!
//! A [`Sim`] owns simulated time, the signals, a min-heap of timed wakeups
//! keyed by `(time, registration order)`, per-signal edge waiter lists and the
//! cooperative task executor. Tasks only suspend at trigger awaits; everything
//! between two awaits runs atomically with respect to other tasks.
//!
//! Ordering within one instant is fixed: timers fire in registration order,
//! woken tasks run in wake order (FIFO), edge waiters on one signal are
//! released in registration order. Repeated runs of the same testbench are
//! therefore identical.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use intmap::IntMap;

use crate::error::HarnessError;
use crate::executor::{self, Executor, JoinHandle, ReadyQueue};
use crate::signal::{Scope, Signal, SignalId};
use crate::time::{Precision, SimTime, TimeUnit};
use crate::trigger::{EdgeEvent, EdgeKind, EdgeWaiter, Phase, Trigger, Waiter};
use crate::value::{Logic, Value};
use crate::waveform::VcdRecorder;
use crate::TbResult;

struct TimerEntry {
    time: SimTime,
    seq: u64,
    waiter: Waiter<SimTime>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then(self.seq.cmp(&other.seq))
    }
}

/// Task polls allowed within one instant before it counts as a zero-delay loop.
const MAX_POLLS_PER_INSTANT: u64 = 100_000;

/// Progress guard for a single instant.
struct InstantBudget {
    polls: u64,
    wall: Option<(Instant, Duration)>,
}

impl InstantBudget {
    fn tick(&mut self) -> Result<(), String> {
        self.polls += 1;
        if self.polls > MAX_POLLS_PER_INSTANT {
            return Err(format!(
                "{} task polls without advancing time, zero-delay loop",
                MAX_POLLS_PER_INSTANT
            ));
        }
        match self.wall {
            Some((started, max)) if started.elapsed() > max => Err(wall_exhausted(max)),
            _ => Ok(()),
        }
    }
}

fn wall_exhausted(max: Duration) -> String {
    format!("real time budget of {:.3}s exhausted", max.as_secs_f64())
}

struct SignalState {
    name: String,
    value: Value,
}

pub(crate) struct Kernel {
    now: SimTime,
    precision: Precision,
    seq: u64,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    signals: Vec<SignalState>,
    names: HashMap<String, SignalId>,
    // key is the signal id
    edge_map: IntMap<VecDeque<EdgeWaiter>>,
    read_write: VecDeque<Waiter<SimTime>>,
    read_only: VecDeque<Waiter<SimTime>>,
    clocked: HashSet<SignalId>,
    tracer: Option<VcdRecorder<BufWriter<File>>>,
    pub(crate) executor: Executor,
}

impl Kernel {
    fn write(&mut self, id: SignalId, value: Value) -> TbResult<()> {
        let state = self
            .signals
            .get_mut(id.0)
            .ok_or_else(|| HarnessError::UnknownSignal {
                name: format!("#{}", id.0),
            })?;
        if value.width() != state.value.width() {
            return Err(HarnessError::WidthMismatch {
                name: state.name.clone(),
                expected: state.value.width(),
                actual: value.width(),
            });
        }
        if state.value == value {
            return Ok(());
        }
        let edge = match (state.value.lsb(), value.lsb()) {
            (Logic::Zero, Logic::One) => Some(EdgeKind::Rising),
            (Logic::One, Logic::Zero) => Some(EdgeKind::Falling),
            _ => None,
        };
        log::trace!("{} <= {}", state.name, value);
        if let Some(tracer) = self.tracer.as_mut() {
            if let Err(e) = tracer.record(self.now.0, id.0, &value) {
                log::warn!("Waveform trace disabled: {}", e);
                self.tracer = None;
            }
        }
        state.value = value;

        if let Some(edge) = edge {
            self.release_edge_waiters(id, edge);
        }
        Ok(())
    }

    fn release_edge_waiters(&mut self, id: SignalId, edge: EdgeKind) {
        let Some(waiters) = self.edge_map.remove(id.key()) else {
            return;
        };
        let event = EdgeEvent {
            signal: id,
            edge,
            time: self.now,
        };
        // waiters for the other direction stay registered, in order
        let remaining: VecDeque<EdgeWaiter> = waiters
            .into_iter()
            .filter(|w| w.waiter.is_live())
            .filter_map(|w| w.offer(event))
            .collect();
        if !remaining.is_empty() {
            self.edge_map.insert(id.key(), remaining);
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn next_event_time(&self) -> Option<SimTime> {
        self.timers.peek().map(|Reverse(entry)| entry.time)
    }

    /// Moves time to the earliest scheduled timestamp and fires every timer due then.
    fn advance(&mut self) {
        let Some(next) = self.next_event_time() else {
            return;
        };
        self.now = next;
        while let Some(Reverse(entry)) = self.timers.peek() {
            if entry.time != next {
                break;
            }
            if let Some(Reverse(entry)) = self.timers.pop() {
                entry.waiter.fire(next);
            }
        }
    }

    fn pending_waiters(&self) -> usize {
        let edges: usize = self.edge_map.iter().map(|(_, w)| w.len()).sum();
        edges + self.timers.len() + self.read_write.len() + self.read_only.len()
    }
}

/// Handle to one simulation. Clones share the same kernel.
#[derive(Clone)]
pub struct Sim {
    kernel: Rc<RefCell<Kernel>>,
    ready: ReadyQueue,
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl Sim {
    pub fn new() -> Self {
        Self::with_precision(Precision::default())
    }

    pub fn with_precision(precision: Precision) -> Self {
        let ready = ReadyQueue::default();
        let kernel = Kernel {
            now: SimTime::ZERO,
            precision,
            seq: 0,
            timers: BinaryHeap::new(),
            signals: Vec::new(),
            names: HashMap::new(),
            edge_map: IntMap::new(),
            read_write: VecDeque::new(),
            read_only: VecDeque::new(),
            clocked: HashSet::new(),
            tracer: None,
            executor: Executor::new(ready.clone()),
        };
        Self {
            kernel: Rc::new(RefCell::new(kernel)),
            ready,
        }
    }

    pub fn now(&self) -> SimTime {
        self.kernel.borrow().now
    }

    pub fn precision(&self) -> Precision {
        self.kernel.borrow().precision
    }

    /// Current time in `unit`. Does not preserve precision, so don't use carelessly.
    pub fn time_in(&self, unit: TimeUnit) -> f64 {
        self.precision().to_unit(self.now(), unit)
    }

    pub fn steps(&self, time: u64, unit: TimeUnit) -> TbResult<u64> {
        self.precision().to_steps(time, unit)
    }

    /*
     * SIGNALS
     */
    pub fn add_signal(&self, name: &str, width: usize, init: Option<Value>) -> TbResult<Signal> {
        if width == 0 || width > Value::MAX_WIDTH {
            return Err(HarnessError::InvalidValue {
                value: format!("{} bits wide signal '{}'", width, name),
            });
        }
        let value = init.unwrap_or_else(|| Value::unknown(width));
        if value.width() != width {
            return Err(HarnessError::WidthMismatch {
                name: name.to_string(),
                expected: width,
                actual: value.width(),
            });
        }
        let mut k = self.kernel.borrow_mut();
        if k.names.contains_key(name) {
            return Err(HarnessError::DuplicateSignal {
                name: name.to_string(),
            });
        }
        let id = SignalId(k.signals.len());
        k.signals.push(SignalState {
            name: name.to_string(),
            value,
        });
        k.names.insert(name.to_string(), id);
        drop(k);
        Ok(Signal::new(id, self.clone()))
    }

    pub fn signal(&self, name: &str) -> TbResult<Signal> {
        let id = self.kernel.borrow().names.get(name).copied();
        match id {
            Some(id) => Ok(Signal::new(id, self.clone())),
            None => Err(HarnessError::UnknownSignal {
                name: name.to_string(),
            }),
        }
    }

    pub fn root(&self, name: &str) -> Scope {
        Scope::new(name, self.clone())
    }

    pub(crate) fn signal_name(&self, id: SignalId) -> String {
        self.kernel
            .borrow()
            .signals
            .get(id.0)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    pub(crate) fn signal_width(&self, id: SignalId) -> usize {
        self.kernel
            .borrow()
            .signals
            .get(id.0)
            .map(|s| s.value.width())
            .unwrap_or(0)
    }

    pub(crate) fn read(&self, id: SignalId) -> Value {
        self.kernel
            .borrow()
            .signals
            .get(id.0)
            .map(|s| s.value.clone())
            .unwrap_or_else(|| Value::unknown(1))
    }

    pub(crate) fn write(&self, id: SignalId, value: Value) -> TbResult<()> {
        self.kernel.borrow_mut().write(id, value)
    }

    /// Registers `id` as driven by a clock generator. One clock per signal.
    pub(crate) fn claim_clock(&self, id: SignalId) -> TbResult<()> {
        if self.kernel.borrow_mut().clocked.insert(id) {
            Ok(())
        } else {
            Err(HarnessError::MultipleDrivers {
                name: self.signal_name(id),
            })
        }
    }

    /*
     * TRIGGERS
     */
    pub fn timer(&self, time: u64, unit: TimeUnit) -> TbResult<Trigger> {
        Ok(Trigger::timer_steps(self.clone(), self.steps(time, unit)?))
    }

    pub fn timer_steps(&self, steps: u64) -> Trigger {
        Trigger::timer_steps(self.clone(), steps)
    }

    pub fn read_write(&self) -> Trigger {
        Trigger::phase(self.clone(), Phase::ReadWrite)
    }

    pub fn read_only(&self) -> Trigger {
        Trigger::phase(self.clone(), Phase::ReadOnly)
    }

    pub(crate) fn schedule_timer(&self, steps: u64, waiter: Waiter<SimTime>) {
        let mut k = self.kernel.borrow_mut();
        let time = k.now.saturating_add(steps);
        let seq = k.next_seq();
        k.timers.push(Reverse(TimerEntry { time, seq, waiter }));
    }

    pub(crate) fn wait_phase(&self, phase: Phase, waiter: Waiter<SimTime>) {
        let mut k = self.kernel.borrow_mut();
        match phase {
            Phase::ReadWrite => k.read_write.push_back(waiter),
            Phase::ReadOnly => k.read_only.push_back(waiter),
        }
    }

    pub(crate) fn wait_edge(&self, id: SignalId, waiter: EdgeWaiter) {
        let mut k = self.kernel.borrow_mut();
        match k.edge_map.get_mut(id.key()) {
            Some(waiters) => waiters.push_back(waiter),
            None => {
                let mut waiters = VecDeque::new();
                waiters.push_back(waiter);
                k.edge_map.insert(id.key(), waiters);
            }
        }
    }

    /*
     * TASKS
     */
    pub fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (wrapped, rx) = executor::wrap(future);
        let id = self.kernel.borrow_mut().executor.insert(name, wrapped);
        JoinHandle::new(id, rx, Rc::downgrade(&self.kernel))
    }

    pub fn task_count(&self) -> usize {
        self.kernel.borrow().executor.len()
    }

    /// Number of registered edge, timer and phase waits.
    pub fn pending_waiters(&self) -> usize {
        self.kernel.borrow().pending_waiters()
    }

    /// Polls ready tasks until none is left.
    fn run_ready(&self, budget: &mut InstantBudget) -> Result<(), String> {
        while let Some(id) = self.ready.pop() {
            budget.tick()?;
            let checked_out = self.kernel.borrow_mut().executor.checkout(id);
            // finished, cancelled, or woken twice
            let Some((mut future, waker)) = checked_out else {
                continue;
            };
            let mut cx = Context::from_waker(&waker);
            match future.as_mut().poll(&mut cx) {
                Poll::Pending => {
                    let orphan = self.kernel.borrow_mut().executor.checkin(id, future);
                    drop(orphan);
                }
                Poll::Ready(()) => {
                    drop(future);
                    let task = self.kernel.borrow_mut().executor.remove(id);
                    drop(task);
                }
            }
        }
        Ok(())
    }

    fn fire_phase(&self, phase: Phase) -> bool {
        let waiters = {
            let mut k = self.kernel.borrow_mut();
            match phase {
                Phase::ReadWrite => std::mem::take(&mut k.read_write),
                Phase::ReadOnly => std::mem::take(&mut k.read_only),
            }
        };
        if waiters.is_empty() {
            return false;
        }
        let now = self.now();
        for w in waiters {
            w.fire(now);
        }
        true
    }

    /// Runs the current instant to completion. The read-only phase fires once
    /// per instant; read-only waits registered during it move to the next one.
    ///
    /// An instant that keeps polling tasks without ever advancing time, or
    /// that outlives the real time budget, is a deadlock.
    fn settle(&self, wall: Option<(Instant, Duration)>) -> TbResult<()> {
        let mut budget = InstantBudget { polls: 0, wall };
        let mut read_only_done = false;
        loop {
            if let Err(reason) = self.run_ready(&mut budget) {
                return Err(self.deadlock(reason));
            }
            if self.fire_phase(Phase::ReadWrite) {
                continue;
            }
            if !read_only_done && self.fire_phase(Phase::ReadOnly) {
                read_only_done = true;
                continue;
            }
            return Ok(());
        }
    }

    fn deadlock(&self, reason: String) -> HarnessError {
        let tasks = self.kernel.borrow().executor.names().join(", ");
        self.error(&format!("Deadlock: {} (live tasks: {})", reason, tasks));
        HarnessError::Deadlock { reason }
    }

    /// Runs the simulation until `done` reports true.
    ///
    /// Fails with [`HarnessError::Deadlock`] if nothing is scheduled anymore,
    /// if the next event lies beyond `limit`, or if `wall` real time elapsed.
    pub fn run_until(
        &self,
        limit: SimTime,
        wall: Option<Duration>,
        mut done: impl FnMut() -> bool,
    ) -> TbResult<()> {
        let wall = wall.map(|max| (Instant::now(), max));
        loop {
            self.settle(wall)?;
            if done() {
                return Ok(());
            }
            let next = self.kernel.borrow().next_event_time();
            let reason = match next {
                None => Some("no pending events, a task waits on an edge that can never occur".to_string()),
                Some(t) if t > limit => Some(format!(
                    "simulated time budget of {} exhausted",
                    self.precision().format_ns(limit)
                )),
                Some(_) => match wall {
                    Some((started, max)) if started.elapsed() > max => Some(wall_exhausted(max)),
                    _ => None,
                },
            };
            if let Some(reason) = reason {
                return Err(self.deadlock(reason));
            }
            self.kernel.borrow_mut().advance();
        }
    }

    /// Runs for `steps` simulation steps or until nothing is scheduled.
    pub fn run_for(&self, steps: u64) -> TbResult<()> {
        let target = self.now().saturating_add(steps);
        loop {
            self.settle(None)?;
            let next = self.kernel.borrow().next_event_time();
            match next {
                Some(t) if t <= target => self.kernel.borrow_mut().advance(),
                _ => {
                    self.kernel.borrow_mut().now = target;
                    return Ok(());
                }
            }
        }
    }

    /// Cancels all tasks and drops every pending wait. Signal values survive.
    pub fn tear_down(&self) {
        let (tasks, timers, edges, rw, ro) = {
            let mut k = self.kernel.borrow_mut();
            k.clocked.clear();
            (
                k.executor.drain(),
                std::mem::take(&mut k.timers),
                std::mem::replace(&mut k.edge_map, IntMap::new()),
                std::mem::take(&mut k.read_write),
                std::mem::take(&mut k.read_only),
            )
        };
        self.ready.clear();
        // dropped without the kernel borrowed, futures may hold handles into it
        drop((tasks, timers, edges, rw, ro));
    }

    /*
     * WAVEFORM
     */
    /// Starts tracing all currently declared signals to a VCD file.
    pub fn trace_to(&self, path: &Path) -> TbResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        let mut k = self.kernel.borrow_mut();
        let signals: Vec<(String, Value)> = k
            .signals
            .iter()
            .map(|s| (s.name.clone(), s.value.clone()))
            .collect();
        let timescale = k.precision.0;
        k.tracer = Some(VcdRecorder::new(writer, timescale, &signals)?);
        Ok(())
    }

    pub fn finish_trace(&self) -> TbResult<()> {
        let tracer = self.kernel.borrow_mut().tracer.take();
        if let Some(tracer) = tracer {
            tracer.finish()?;
        }
        Ok(())
    }

    /*
     * LOGGING
     */
    fn stamp(&self, msg: &str) -> String {
        format!("{} {}", self.precision().format_ns(self.now()), msg)
    }

    pub fn log(&self, msg: &str) {
        log::info!("{}", self.stamp(msg));
    }

    pub fn warn(&self, msg: &str) {
        log::warn!("{}", self.stamp(msg));
    }

    pub fn error(&self, msg: &str) {
        log::error!("{}", self.stamp(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn timers_advance_time() {
        let sim = Sim::with_precision(Precision(TimeUnit::Ns));
        let seen = recorder();
        let s = sim.clone();
        let log = seen.clone();
        sim.spawn("t", async move {
            let t = s.timer(5, TimeUnit::Ns).unwrap().await;
            log.borrow_mut().push(format!("a@{}", t.0));
            let t = s.timer_steps(3).await;
            log.borrow_mut().push(format!("b@{}", t.0));
        });
        sim.run_for(100).unwrap();
        assert_eq!(*seen.borrow(), vec!["a@5", "b@8"]);
        assert_eq!(sim.now(), SimTime(100));
        assert_eq!(sim.task_count(), 0);
    }

    #[test]
    fn simultaneous_timers_fire_in_registration_order() {
        let sim = Sim::new();
        let seen = recorder();
        for name in ["first", "second", "third"] {
            let s = sim.clone();
            let log = seen.clone();
            sim.spawn(name, async move {
                s.timer_steps(10).await;
                log.borrow_mut().push(name.to_string());
            });
        }
        sim.run_for(10).unwrap();
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn edge_waiters_resume_fifo_with_timestamp() {
        let sim = Sim::new();
        let clk = sim.add_signal("clk", 1, Some(Value::bit(Logic::Zero))).unwrap();
        let seen = recorder();
        for name in ["a", "b"] {
            let c = clk.clone();
            let log = seen.clone();
            sim.spawn(name, async move {
                let ev = c.rising_edge().await;
                log.borrow_mut().push(format!("{}@{}", name, ev.time.0));
            });
        }
        let c = clk.clone();
        let s = sim.clone();
        sim.spawn("driver", async move {
            s.timer_steps(7).await;
            c.set_bit(Logic::One).unwrap();
        });
        sim.run_for(20).unwrap();
        assert_eq!(*seen.borrow(), vec!["a@7", "b@7"]);
        assert_eq!(sim.pending_waiters(), 0);
    }

    #[test]
    fn falling_waiter_ignores_rising_edge() {
        let sim = Sim::new();
        let clk = sim.add_signal("clk", 1, Some(Value::bit(Logic::Zero))).unwrap();
        let c = clk.clone();
        let handle = sim.spawn("waiter", async move { c.falling_edge().await });
        clk.set_bit(Logic::One).unwrap();
        sim.run_for(1).unwrap();
        assert_eq!(sim.pending_waiters(), 1);
        clk.set_bit(Logic::Zero).unwrap();
        sim.run_for(1).unwrap();
        let mut handle = handle;
        let ev = handle.try_join().unwrap().unwrap();
        assert_eq!(ev.edge, EdgeKind::Falling);
        assert_eq!(ev.signal, clk.id());
    }

    #[test]
    fn unknown_to_one_is_not_an_edge() {
        let sim = Sim::new();
        let clk = sim.add_signal("clk", 1, None).unwrap();
        let c = clk.clone();
        let mut handle = sim.spawn("waiter", async move { c.edge().await });
        sim.run_for(1).unwrap();
        clk.set_bit(Logic::One).unwrap();
        sim.run_for(1).unwrap();
        assert!(handle.try_join().is_none());
    }

    #[test]
    fn read_only_runs_after_read_write() {
        let sim = Sim::new();
        let seen = recorder();
        let (s, log) = (sim.clone(), seen.clone());
        sim.spawn("ro", async move {
            s.read_only().await;
            log.borrow_mut().push("ro".to_string());
        });
        let (s, log) = (sim.clone(), seen.clone());
        sim.spawn("rw", async move {
            s.read_write().await;
            log.borrow_mut().push("rw".to_string());
        });
        sim.run_for(0).unwrap();
        assert_eq!(*seen.borrow(), vec!["rw", "ro"]);
    }

    #[test]
    fn run_until_detects_empty_queue() {
        let sim = Sim::new();
        let clk = sim.add_signal("clk", 1, None).unwrap();
        let c = clk.clone();
        let mut handle = sim.spawn("stuck", async move { c.rising_edge().await });
        let err = sim
            .run_until(SimTime(1_000), None, || handle.try_join().is_some())
            .unwrap_err();
        assert!(matches!(err, HarnessError::Deadlock { .. }));
    }

    #[test]
    fn run_until_respects_time_budget() {
        let sim = Sim::new();
        let s = sim.clone();
        sim.spawn("ticker", async move {
            loop {
                s.timer_steps(10).await;
            }
        });
        let err = sim.run_until(SimTime(95), None, || false).unwrap_err();
        match err {
            HarnessError::Deadlock { reason } => assert!(reason.contains("simulated time budget")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sim.now(), SimTime(90));
    }

    #[test]
    fn read_write_spin_hits_wall_budget() {
        let sim = Sim::new();
        let s = sim.clone();
        sim.spawn("spin", async move {
            loop {
                // slow enough that the real time budget trips long before the poll cap
                std::thread::sleep(Duration::from_millis(1));
                s.read_write().await;
            }
        });
        let started = Instant::now();
        let err = sim
            .run_until(SimTime(1_000), Some(Duration::from_millis(10)), || false)
            .unwrap_err();
        match err {
            HarnessError::Deadlock { reason } => assert!(reason.contains("real time budget")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sim.now(), SimTime::ZERO);
        sim.tear_down();
    }

    #[test]
    fn ping_pong_in_one_instant_is_deadlock() {
        let sim = Sim::new();
        let a = sim.add_signal("a", 1, Some(Value::from_u64(1, 0))).unwrap();
        let b = sim.add_signal("b", 1, Some(Value::from_u64(1, 0))).unwrap();
        let (a1, b1) = (a.clone(), b.clone());
        sim.spawn("follow_a", async move {
            loop {
                a1.edge().await;
                if b1.set(a1.get()).is_err() {
                    break;
                }
            }
        });
        let (a2, b2) = (a.clone(), b.clone());
        sim.spawn("invert_b", async move {
            loop {
                b2.edge().await;
                let next = if b2.u64() == Some(1) { 0 } else { 1 };
                if a2.set_u64(next).is_err() {
                    break;
                }
            }
        });
        let (kick, s) = (a.clone(), sim.clone());
        sim.spawn("kick", async move {
            s.timer_steps(5).await;
            let _ = kick.set_u64(1);
        });
        let err = sim.run_until(SimTime(1_000), None, || false).unwrap_err();
        match err {
            HarnessError::Deadlock { reason } => assert!(reason.contains("zero-delay loop")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sim.now(), SimTime(5));
        sim.tear_down();
    }

    #[test]
    fn cancelled_task_does_not_run() {
        let sim = Sim::new();
        let seen = recorder();
        let (s, log) = (sim.clone(), seen.clone());
        let handle = sim.spawn("victim", async move {
            s.timer_steps(5).await;
            log.borrow_mut().push("ran".to_string());
        });
        sim.run_for(1).unwrap();
        handle.cancel();
        sim.run_for(10).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn join_handle_resolves_output() {
        let sim = Sim::new();
        let s = sim.clone();
        let result = recorder();
        let log = result.clone();
        sim.spawn("parent", async move {
            let inner = s.clone();
            let child = s.spawn("child", async move {
                inner.timer_steps(2).await;
                42
            });
            let out = child.await.unwrap();
            log.borrow_mut().push(out.to_string());
        });
        sim.run_for(5).unwrap();
        assert_eq!(*result.borrow(), vec!["42"]);
    }

    #[test]
    fn tear_down_releases_everything() {
        let sim = Sim::new();
        let clk = sim.add_signal("clk", 1, None).unwrap();
        let c = clk.clone();
        let mut waiter = sim.spawn("waiter", async move { c.falling_edge().await });
        let s = sim.clone();
        sim.spawn("sleeper", async move { s.timer_steps(1_000).await });
        sim.run_for(1).unwrap();
        assert_eq!(sim.pending_waiters(), 2);
        assert_eq!(sim.task_count(), 2);

        sim.tear_down();
        assert_eq!(sim.pending_waiters(), 0);
        assert_eq!(sim.task_count(), 0);
        assert!(matches!(
            waiter.try_join(),
            Some(Err(HarnessError::TaskCancelled))
        ));
    }

    #[test]
    fn duplicate_signal_rejected() {
        let sim = Sim::new();
        sim.add_signal("a", 1, None).unwrap();
        assert!(matches!(
            sim.add_signal("a", 1, None),
            Err(HarnessError::DuplicateSignal { .. })
        ));
        assert!(sim.add_signal("wide", 65, None).is_err());
    }
}
