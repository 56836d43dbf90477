use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::signal::{Signal, SignalId};
use crate::sim::Sim;
use crate::time::SimTime;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

impl EdgeKind {
    fn matches(self, occurred: EdgeKind) -> bool {
        self == EdgeKind::Any || self == occurred
    }
}

/// A transition observed on a signal. `edge` is never [`EdgeKind::Any`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeEvent {
    pub signal: SignalId,
    pub edge: EdgeKind,
    pub time: SimTime,
}

/// One suspended await. The slot is shared with the awaiting future; once the
/// future is gone the waiter is dead and firing it is a no-op.
pub(crate) struct Waiter<T> {
    waker: Waker,
    slot: Rc<Cell<Option<T>>>,
}

impl<T: Copy> Waiter<T> {
    fn new(waker: &Waker) -> (Self, Rc<Cell<Option<T>>>) {
        let slot = Rc::new(Cell::new(None));
        (
            Self {
                waker: waker.clone(),
                slot: slot.clone(),
            },
            slot,
        )
    }

    pub(crate) fn is_live(&self) -> bool {
        Rc::strong_count(&self.slot) > 1
    }

    pub(crate) fn fire(self, value: T) {
        if self.is_live() {
            self.slot.set(Some(value));
            self.waker.wake();
        }
    }
}

pub(crate) struct EdgeWaiter {
    pub(crate) kind: EdgeKind,
    pub(crate) waiter: Waiter<EdgeEvent>,
}

impl EdgeWaiter {
    /// Fires if the waiter is interested in `event`, otherwise hands itself back.
    pub(crate) fn offer(self, event: EdgeEvent) -> Option<Self> {
        if self.kind.matches(event.edge) {
            self.waiter.fire(event);
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// After all tasks runnable at the current instant have yielded.
    ReadWrite,
    /// Once the current instant has settled, right before time advances.
    ReadOnly,
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Timer(u64),
    Phase(Phase),
}

/// Time based trigger: a delay or an end-of-instant phase.
///
/// Resolves to the simulated time at which it fired.
pub struct Trigger {
    sim: Sim,
    kind: TrigKind,
    slot: Option<Rc<Cell<Option<SimTime>>>>,
}

impl Trigger {
    pub(crate) fn timer_steps(sim: Sim, steps: u64) -> Self {
        Self {
            sim,
            kind: TrigKind::Timer(steps),
            slot: None,
        }
    }

    pub(crate) fn phase(sim: Sim, phase: Phase) -> Self {
        Self {
            sim,
            kind: TrigKind::Phase(phase),
            slot: None,
        }
    }
}

impl Future for Trigger {
    type Output = SimTime;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(slot) = &self.slot {
            return match slot.get() {
                Some(t) => Poll::Ready(t),
                None => Poll::Pending,
            };
        }
        let (waiter, slot) = Waiter::new(cx.waker());
        match self.kind {
            TrigKind::Timer(steps) => self.sim.schedule_timer(steps, waiter),
            TrigKind::Phase(phase) => self.sim.wait_phase(phase, waiter),
        }
        self.slot = Some(slot);
        Poll::Pending
    }
}

/// Suspends until the next matching transition of a signal.
///
/// Every trigger is an independent registration; awaiting the same edge from
/// several tasks resumes them in registration order within one instant.
pub struct EdgeTrigger {
    signal: Signal,
    kind: EdgeKind,
    slot: Option<Rc<Cell<Option<EdgeEvent>>>>,
}

impl EdgeTrigger {
    pub(crate) fn new(signal: Signal, kind: EdgeKind) -> Self {
        Self {
            signal,
            kind,
            slot: None,
        }
    }
}

impl Future for EdgeTrigger {
    type Output = EdgeEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(slot) = &self.slot {
            return match slot.get() {
                Some(ev) => Poll::Ready(ev),
                None => Poll::Pending,
            };
        }
        let (waiter, slot) = Waiter::new(cx.waker());
        self.signal.sim().wait_edge(
            self.signal.id(),
            EdgeWaiter {
                kind: self.kind,
                waiter,
            },
        );
        self.slot = Some(slot);
        Poll::Pending
    }
}

/// Awaits `signal` transitioning in `direction` and returns the observed edge.
pub async fn await_edge(signal: &Signal, direction: EdgeKind) -> EdgeEvent {
    EdgeTrigger::new(signal.clone(), direction).await
}
