//! Async computeds and async effects.
//!
//! The getter runs synchronously inside an effect, so every signal it reads
//! before handing back its future is tracked. The future itself is spawned on
//! a local executor. When a dependency changes, the in-flight future is
//! aborted and a fresh one takes its place.

use crate::effect::Effect;
use crate::signal::{ReadOnlySignal, Signal};
use futures::future::{abortable, AbortHandle, FutureExt, LocalBoxFuture, Shared};
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

type Pending<T> = Shared<LocalBoxFuture<'static, Option<T>>>;

/// The most recently started future of an async computed or effect.
pub(crate) struct LatestRun<T> {
    spawner: Rc<dyn LocalSpawn>,
    generation: Cell<u64>,
    pending: RefCell<Option<Pending<T>>>,
    abort: RefCell<Option<AbortHandle>>,
}

impl<T: Clone + 'static> LatestRun<T> {
    pub(crate) fn new(spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            spawner,
            generation: Cell::new(0),
            pending: RefCell::new(None),
            abort: RefCell::new(None),
        }
    }

    /// Abort the previous run and spawn `future` in its place.
    ///
    /// `on_resolve` runs before any awaiter of [`LatestRun::settled`] sees
    /// the value.
    pub(crate) fn start<F>(&self, future: F, on_resolve: impl FnOnce(T) + 'static)
    where
        F: Future<Output = T> + 'static,
    {
        self.cancel();
        let (future, abort) = abortable(future);
        let pending = future
            .map(move |result| {
                let value = result.ok();
                if let Some(value) = &value {
                    on_resolve(value.clone());
                }
                value
            })
            .boxed_local()
            .shared();
        self.generation.set(self.generation.get() + 1);
        *self.abort.borrow_mut() = Some(abort);
        *self.pending.borrow_mut() = Some(pending.clone());

        if let Err(error) = self.spawner.spawn_local(pending.map(|_| ())) {
            tracing::error!(%error, "failed to spawn async signal run");
        }
    }

    /// Abort the in-flight run, if any.
    pub(crate) fn cancel(&self) {
        let abort = self.abort.borrow_mut().take();
        if let Some(abort) = abort {
            abort.abort();
        }
    }

    /// Wait for the latest run, following any run that supersedes it.
    ///
    /// Resolves to `None` when the latest run was aborted without a successor.
    pub(crate) async fn settled(&self) -> Option<T> {
        loop {
            let generation = self.generation.get();
            let pending = self.pending.borrow().clone();
            let value = pending?.await;
            if self.generation.get() == generation {
                return value;
            }
        }
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(error) = self.spawner.spawn_local(task) {
            tracing::error!(%error, "failed to spawn async signal task");
        }
    }
}

/// A computed whose value is produced by a future.
///
/// [`AsyncComputed::current_value`] is the value of the last run that
/// resolved and can be read synchronously; [`AsyncComputed::get`] waits for
/// the run that is currently in flight.
///
/// # Example
///
/// ```rust,no_run
/// use futures::executor::LocalPool;
/// use gpui_signal_bridge::prelude::*;
/// use gpui_signal_bridge::unstable::unstable_create_async_computed;
///
/// let mut pool = LocalPool::new();
/// let id = create_signal(1);
/// let user = unstable_create_async_computed(pool.spawner(), move || {
///     let id = id.get();
///     async move { format!("user #{id}") }
/// });
/// assert_eq!(pool.run_until(user.get()), Some("user #1".to_string()));
/// ```
pub struct AsyncComputed<T> {
    current: Signal<Option<T>>,
    run: Rc<LatestRun<T>>,
    effect: Effect,
}

impl<T> Clone for AsyncComputed<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current,
            run: self.run.clone(),
            effect: self.effect,
        }
    }
}

impl<T> PartialEq for AsyncComputed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl<T> Eq for AsyncComputed<T> {}

impl<T: Clone + 'static> AsyncComputed<T> {
    pub fn new<F>(spawner: impl LocalSpawn + 'static, getter: impl Fn() -> F + 'static) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        let current = Signal::new(None);
        let run = Rc::new(LatestRun::new(Rc::new(spawner)));
        let effect = Effect::new({
            let run = run.clone();
            move || {
                let future = getter();
                run.start(future, move |value| current.replace(Some(value)));
            }
        });
        Self {
            current,
            run,
            effect,
        }
    }

    /// Wait for the in-flight run and return its value.
    ///
    /// Falls back to the last resolved value if the computed was stopped
    /// before the run finished.
    pub async fn get(&self) -> Option<T> {
        let value = self.run.settled().await;
        value.or_else(|| self.current.get_untracked())
    }

    /// The last resolved value. Tracked inside effects and computeds.
    pub fn current_value(&self) -> Option<T> {
        self.current.get()
    }

    pub fn current_value_untracked(&self) -> Option<T> {
        self.current.get_untracked()
    }

    /// The signal holding the last resolved value.
    pub fn current(&self) -> ReadOnlySignal<Option<T>> {
        self.current.read_only()
    }

    /// Stop reacting to dependencies and abort the in-flight run.
    pub fn stop(&self) {
        self.effect.stop();
        self.run.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.run.spawn(task);
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for AsyncComputed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncComputed")
            .field("current", &self.current.get_untracked())
            .field("active", &self.is_active())
            .finish()
    }
}

/// An effect whose body finishes asynchronously.
///
/// Every dependency change aborts the unfinished body and starts a new one.
pub struct AsyncEffect<T> {
    run: Rc<LatestRun<T>>,
    effect: Effect,
}

impl<T> Clone for AsyncEffect<T> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
            effect: self.effect,
        }
    }
}

impl<T: Clone + 'static> AsyncEffect<T> {
    pub fn new<F>(spawner: impl LocalSpawn + 'static, f: impl Fn() -> F + 'static) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        Self::with_spawner(Rc::new(spawner), f)
    }

    pub(crate) fn with_spawner<F>(spawner: Rc<dyn LocalSpawn>, f: impl Fn() -> F + 'static) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        let run = Rc::new(LatestRun::new(spawner));
        let effect = Effect::new({
            let run = run.clone();
            move || run.start(f(), |_| {})
        });
        Self { run, effect }
    }

    /// Wait for the latest body to finish. `None` if it was aborted by `stop`.
    pub async fn settled(&self) -> Option<T> {
        self.run.settled().await
    }

    pub fn stop(&self) {
        self.effect.stop();
        self.run.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// A teardown closure bound to this effect.
    pub fn teardown(self) -> impl FnOnce() + 'static {
        move || self.stop()
    }
}
