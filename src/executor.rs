use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{waker, ArcWake};
use futures_channel::oneshot;
use intmap::IntMap;
use queues::{IsQueue, Queue};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::HarnessError;
use crate::sim::Kernel;
use crate::TbResult;

pub(crate) type TaskId = u64;

/// FIFO of tasks ready to be polled. Shared with every task waker.
#[derive(Clone)]
pub(crate) struct ReadyQueue(Arc<Mutex<Queue<TaskId>>>);

impl Default for ReadyQueue {
    fn default() -> Self {
        ReadyQueue(Arc::new(Mutex::new(Queue::new())))
    }
}

impl ReadyQueue {
    fn lock(&self) -> MutexGuard<'_, Queue<TaskId>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, id: TaskId) {
        // add() only fails for bounded queues
        let _ = self.lock().add(id);
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        self.lock().remove().ok()
    }

    pub(crate) fn clear(&self) {
        *self.lock() = Queue::new();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().size()
    }
}

struct TaskWaker {
    id: TaskId,
    ready: ReadyQueue,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.ready.push(arc_self.id);
    }
}

pub(crate) struct Task {
    name: String,
    // None while the task is being polled
    future: Option<LocalBoxFuture<'static, ()>>,
    waker: Waker,
}

/// Owns all live tasks of one simulator.
pub(crate) struct Executor {
    tasks: IntMap<Task>,
    next_id: TaskId,
    ready: ReadyQueue,
}

impl Executor {
    pub(crate) fn new(ready: ReadyQueue) -> Self {
        Self {
            tasks: IntMap::new(),
            next_id: 0,
            ready,
        }
    }

    pub(crate) fn insert(&mut self, name: &str, future: LocalBoxFuture<'static, ()>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        let task = Task {
            name: name.to_string(),
            future: Some(future),
            waker: waker(Arc::new(TaskWaker {
                id,
                ready: self.ready.clone(),
            })),
        };
        self.tasks.insert(id, task);
        self.ready.push(id);
        id
    }

    /// Takes the future of a task out for polling, together with its waker.
    pub(crate) fn checkout(&mut self, id: TaskId) -> Option<(LocalBoxFuture<'static, ()>, Waker)> {
        let task = self.tasks.get_mut(id)?;
        let future = task.future.take()?;
        Some((future, task.waker.clone()))
    }

    /// Returns a still-pending future to its task. If the task was cancelled
    /// while it ran, the future is handed back so the caller can drop it.
    pub(crate) fn checkin(
        &mut self,
        id: TaskId,
        future: LocalBoxFuture<'static, ()>,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        match self.tasks.get_mut(id) {
            Some(task) => {
                task.future = Some(future);
                None
            }
            None => Some(future),
        }
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(id)
    }

    pub(crate) fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain().map(|(_, task)| task).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Names of all live tasks, ordered by spawn order.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut live: Vec<(TaskId, &str)> = self
            .tasks
            .iter()
            .map(|(id, t)| (*id, t.name.as_str()))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live.into_iter().map(|(_, name)| name.to_string()).collect()
    }
}

pub(crate) fn wrap<F>(future: F) -> (LocalBoxFuture<'static, ()>, oneshot::Receiver<F::Output>)
where
    F: Future + 'static,
    F::Output: 'static,
{
    let (tx, rx) = oneshot::channel();
    let wrapped = async move {
        let out = future.await;
        // receiver may have been dropped, nobody is interested in the result then
        let _ = tx.send(out);
    }
    .boxed_local();
    (wrapped, rx)
}

/// Awaitable handle to a spawned task.
///
/// Resolves to the task's output, or [`HarnessError::TaskCancelled`] if the
/// task was cancelled or torn down before it finished.
pub struct JoinHandle<T> {
    id: TaskId,
    join_rx: oneshot::Receiver<T>,
    kernel: Weak<RefCell<Kernel>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, join_rx: oneshot::Receiver<T>, kernel: Weak<RefCell<Kernel>>) -> Self {
        Self { id, join_rx, kernel }
    }

    /// Non-blocking check for completion.
    pub fn try_join(&mut self) -> Option<TbResult<T>> {
        match self.join_rx.try_recv() {
            Ok(Some(out)) => Some(Ok(out)),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(HarnessError::TaskCancelled)),
        }
    }

    /// Cancels the awaited task. Its future is dropped without running again.
    pub fn cancel(&self) {
        if let Some(kernel) = self.kernel.upgrade() {
            let task = kernel.borrow_mut().executor.remove(self.id);
            // drop outside of the borrow, the future may own handles into the kernel
            drop(task);
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = TbResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(out)) => Poll::Ready(Ok(out)),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(HarnessError::TaskCancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
