//! Generational arena storage for the reactive graph.
//!
//! Uses slot maps with generational indices to provide memory-safe Copy handles
//! to signal values, observers (effects and computeds) and effect scopes. A
//! removed slot is never confused with a newer value occupying the same index.
//!
//! Everything lives in a thread-local store. User callbacks are never invoked
//! while the store is borrowed: the store hands back the callbacks to run and
//! the caller invokes them after the borrow ends.
//!
//! A write propagates in two phases. Marking flags direct observers dirty,
//! flags everything further downstream as needing a check and queues the
//! effects it reaches. Flushing then runs the queued effects in order; each
//! one first pulls the computeds it depends on, so a computed recomputes at
//! most once per write and an effect never sees a half-updated graph.

use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

new_key_type! {
    /// Unique identifier for a signal in the storage.
    pub struct SignalId;
    /// Unique identifier for an effect or computed observer.
    pub struct ObserverId;
    /// Unique identifier for an effect scope.
    pub struct ScopeId;
}

/// A type-erased value shared between the store and active readers.
pub(crate) type ValueCell = Rc<RefCell<Box<dyn Any>>>;

/// A type-erased signal value and the observers that read it.
pub(crate) struct SignalValue {
    /// The actual value, boxed and type-erased.
    pub value: ValueCell,
    /// Observers that read this signal during their last run, in subscription order.
    pub observers: Vec<ObserverId>,
    /// The computed whose cached value this signal holds.
    pub producer: Option<ObserverId>,
    /// Set once the signal received its hydration value.
    pub hydrated: bool,
}

/// Freshness of an observer, ordered from fresh to stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Status {
    Clean,
    /// An upstream computed may have changed.
    Check,
    /// A source changed.
    Dirty,
}

/// Callback run by an observer whenever one of its sources changes.
pub(crate) type Subscriber = Rc<dyn Fn()>;

/// Who owns newly created observers and scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    Observer(ObserverId),
    Scope(ScopeId),
}

pub(crate) struct ObserverNode {
    run: Subscriber,
    /// Signals read during the last run.
    sources: Vec<SignalId>,
    /// Observers created during the last run; disposed before the next run.
    children: Vec<ObserverId>,
    /// Scopes created during the last run; disposed before the next run.
    scopes: Vec<ScopeId>,
    owner: Option<Owner>,
    running: bool,
    status: Status,
    /// Backing signal of a computed; `None` for effects.
    output: Option<SignalId>,
}

pub(crate) struct ScopeNode {
    observers: Vec<ObserverId>,
    children: Vec<ScopeId>,
    owner: Option<Owner>,
}

/// Thread-local storage for the whole reactive graph.
pub(crate) struct SignalStorage {
    /// Arena of signal values indexed by SignalId.
    values: SlotMap<SignalId, SignalValue>,
    observers: SlotMap<ObserverId, ObserverNode>,
    scopes: SlotMap<ScopeId, ScopeNode>,
    /// The current owner; reads are tracked only when it is an observer.
    owner: Option<Owner>,
    /// Values and callbacks released during the current borrow. Dropping them
    /// may run user `Drop` impls that touch the store, so they are dropped
    /// after the borrow ends.
    graveyard: Vec<Box<dyn Any>>,
    /// Effects marked by a write and waiting for the flush.
    pending: VecDeque<ObserverId>,
    /// Open batches; effects flush when the outermost one closes.
    batch_depth: usize,
}

impl SignalStorage {
    /// Create a new empty signal storage.
    pub fn new() -> Self {
        Self {
            values: SlotMap::with_key(),
            observers: SlotMap::with_key(),
            scopes: SlotMap::with_key(),
            owner: None,
            graveyard: Vec::new(),
            pending: VecDeque::new(),
            batch_depth: 0,
        }
    }

    /// Insert a new signal value and return its ID.
    pub fn insert<T: 'static>(&mut self, value: T) -> SignalId {
        self.values.insert(SignalValue {
            value: Rc::new(RefCell::new(Box::new(value))),
            observers: Vec::new(),
            producer: None,
            hydrated: false,
        })
    }

    /// Remove a signal value. Observers that read it simply stop hearing about it.
    pub fn remove(&mut self, id: SignalId) {
        if let Some(removed) = self.values.remove(id) {
            for observer in &removed.observers {
                if let Some(node) = self.observers.get_mut(*observer) {
                    node.sources.retain(|source| *source != id);
                }
            }
            self.graveyard.push(Box::new(removed.value));
        }
    }

    pub fn contains(&self, id: SignalId) -> bool {
        self.values.contains_key(id)
    }

    /// Get the shared cell holding a signal value.
    ///
    /// Callers borrow the cell after releasing the store, so user closures may
    /// read other signals while inspecting this one.
    pub fn cell(&self, id: SignalId) -> Option<ValueCell> {
        self.values.get(id).map(|signal_value| signal_value.value.clone())
    }

    /// Get a clone of a signal value.
    #[cfg(test)]
    pub fn get<T: Clone + 'static>(&self, id: SignalId) -> Option<T> {
        let cell = self.values.get(id)?.value.borrow();
        let value = cell.downcast_ref::<T>().cloned();
        value
    }

    /// Replace a signal value without marking anything. Returns `false` when
    /// the signal is gone.
    pub fn set<T: 'static>(&mut self, id: SignalId, value: T) -> bool {
        let Some(signal_value) = self.values.get_mut(id) else {
            return false;
        };
        let previous = std::mem::replace(&mut *signal_value.value.borrow_mut(), Box::new(value));
        self.graveyard.push(previous);
        true
    }

    /// Flag the hydration mark, returning whether it was newly set.
    pub fn mark_hydrated(&mut self, id: SignalId) -> bool {
        match self.values.get_mut(id) {
            Some(signal_value) if !signal_value.hydrated => {
                signal_value.hydrated = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_hydrated(&self, id: SignalId) -> bool {
        self.values
            .get(id)
            .is_some_and(|signal_value| signal_value.hydrated)
    }

    /// Mark everything downstream of a changed signal and queue the effects
    /// that have to re-run.
    ///
    /// Direct observers become dirty; observers of a computed in between only
    /// need a check. Running observers are skipped.
    pub fn mark_changed(&mut self, id: SignalId) {
        let mut stack: Vec<(ObserverId, Status)> = match self.values.get(id) {
            Some(signal_value) => signal_value
                .observers
                .iter()
                .rev()
                .map(|observer| (*observer, Status::Dirty))
                .collect(),
            None => return,
        };
        while let Some((observer, status)) = stack.pop() {
            let Some(node) = self.observers.get_mut(observer) else {
                continue;
            };
            if node.running || node.status >= status {
                continue;
            }
            let was_clean = node.status == Status::Clean;
            node.status = status;
            let output = node.output;
            match output {
                Some(output) => {
                    if let Some(signal_value) = self.values.get(output) {
                        stack.extend(
                            signal_value
                                .observers
                                .iter()
                                .rev()
                                .map(|downstream| (*downstream, Status::Check)),
                        );
                    }
                }
                None if was_clean => self.pending.push_back(observer),
                None => {}
            }
        }
    }

    /// Record `signal` as the cached value of the computed `observer`.
    pub fn bind_output(&mut self, observer: ObserverId, signal: SignalId) {
        if let Some(node) = self.observers.get_mut(observer) {
            node.output = Some(signal);
        }
        if let Some(signal_value) = self.values.get_mut(signal) {
            signal_value.producer = Some(observer);
        }
    }

    pub fn producer(&self, id: SignalId) -> Option<ObserverId> {
        self.values.get(id)?.producer
    }

    /// Status of an observer that is alive and not running.
    fn idle_status(&self, id: ObserverId) -> Option<Status> {
        self.observers
            .get(id)
            .filter(|node| !node.running)
            .map(|node| node.status)
    }

    /// The computeds among an observer's sources, in read order.
    fn source_producers(&self, id: ObserverId) -> Vec<ObserverId> {
        let Some(node) = self.observers.get(id) else {
            return Vec::new();
        };
        node.sources
            .iter()
            .filter_map(|source| self.producer(*source))
            .collect()
    }

    fn mark_clean(&mut self, id: ObserverId) {
        if let Some(node) = self.observers.get_mut(id) {
            node.status = Status::Clean;
        }
    }

    /// Track a read for the current observer.
    pub fn track_read(&mut self, id: SignalId) {
        let Some(Owner::Observer(observer_id)) = self.owner else {
            return;
        };
        let (Some(node), Some(signal_value)) =
            (self.observers.get_mut(observer_id), self.values.get_mut(id))
        else {
            return;
        };
        // Only subscribe once per observer/dependency pair.
        if !node.sources.contains(&id) {
            node.sources.push(id);
        }
        if !signal_value.observers.contains(&observer_id) {
            signal_value.observers.push(observer_id);
        }
    }

    /// Swap the current owner, returning the previous one.
    pub fn set_owner(&mut self, owner: Option<Owner>) -> Option<Owner> {
        std::mem::replace(&mut self.owner, owner)
    }

    /// Register a new observer under the current owner. The observer is not run.
    pub fn create_observer(&mut self, run: Subscriber) -> ObserverId {
        let owner = self.live_owner();
        let id = self.observers.insert(ObserverNode {
            run,
            sources: Vec::new(),
            children: Vec::new(),
            scopes: Vec::new(),
            owner,
            running: false,
            status: Status::Clean,
            output: None,
        });
        match owner {
            Some(Owner::Observer(parent)) => {
                if let Some(parent) = self.observers.get_mut(parent) {
                    parent.children.push(id);
                }
            }
            Some(Owner::Scope(scope)) => {
                if let Some(scope) = self.scopes.get_mut(scope) {
                    scope.observers.push(id);
                }
            }
            None => {}
        }
        id
    }

    /// Register a new scope under the current owner.
    pub fn create_scope(&mut self) -> ScopeId {
        let owner = self.live_owner();
        let id = self.scopes.insert(ScopeNode {
            observers: Vec::new(),
            children: Vec::new(),
            owner,
        });
        match owner {
            Some(Owner::Observer(parent)) => {
                if let Some(parent) = self.observers.get_mut(parent) {
                    parent.scopes.push(id);
                }
            }
            Some(Owner::Scope(parent)) => {
                if let Some(parent) = self.scopes.get_mut(parent) {
                    parent.children.push(id);
                }
            }
            None => {}
        }
        id
    }

    fn live_owner(&self) -> Option<Owner> {
        self.owner.filter(|owner| match owner {
            Owner::Observer(id) => self.observers.contains_key(*id),
            Owner::Scope(id) => self.scopes.contains_key(*id),
        })
    }

    pub fn observer_exists(&self, id: ObserverId) -> bool {
        self.observers.contains_key(id)
    }

    pub fn scope_exists(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(id)
    }

    /// Prepare an observer for a run.
    ///
    /// Drops the dependencies and owned children of the previous run and makes
    /// the observer the current owner. Returns `None` when the observer is gone
    /// or already running.
    fn begin_run(&mut self, id: ObserverId) -> Option<(Subscriber, Option<Owner>)> {
        let node = self.observers.get_mut(id)?;
        if node.running {
            return None;
        }
        node.running = true;
        node.status = Status::Clean;
        let run = node.run.clone();
        let sources = std::mem::take(&mut node.sources);
        let children = std::mem::take(&mut node.children);
        let scopes = std::mem::take(&mut node.scopes);

        self.unsubscribe(id, &sources);
        for child in children {
            self.dispose_observer(child);
        }
        for scope in scopes {
            self.dispose_scope(scope);
        }

        let previous = self.set_owner(Some(Owner::Observer(id)));
        Some((run, previous))
    }

    fn end_run(&mut self, id: ObserverId, previous: Option<Owner>) {
        self.owner = previous;
        if let Some(node) = self.observers.get_mut(id) {
            node.running = false;
        }
    }

    fn unsubscribe(&mut self, id: ObserverId, sources: &[SignalId]) {
        for source in sources {
            if let Some(signal_value) = self.values.get_mut(*source) {
                signal_value.observers.retain(|observer| *observer != id);
            }
        }
    }

    /// Permanently remove an observer and everything it owns. Idempotent.
    pub fn dispose_observer(&mut self, id: ObserverId) {
        let Some(node) = self.observers.remove(id) else {
            return;
        };
        self.unsubscribe(id, &node.sources);
        self.detach_from_owner(node.owner, Owner::Observer(id));
        self.graveyard.push(Box::new(node.run));
        if let Some(output) = node.output {
            self.remove(output);
        }
        for child in node.children {
            self.dispose_observer(child);
        }
        for scope in node.scopes {
            self.dispose_scope(scope);
        }
    }

    /// Permanently remove a scope and everything it owns. Idempotent.
    pub fn dispose_scope(&mut self, id: ScopeId) {
        let Some(node) = self.scopes.remove(id) else {
            return;
        };
        self.detach_from_owner(node.owner, Owner::Scope(id));
        for observer in node.observers {
            self.dispose_observer(observer);
        }
        for child in node.children {
            self.dispose_scope(child);
        }
    }

    fn detach_from_owner(&mut self, owner: Option<Owner>, owned: Owner) {
        match (owner, owned) {
            (Some(Owner::Observer(parent)), Owner::Observer(child)) => {
                if let Some(parent) = self.observers.get_mut(parent) {
                    parent.children.retain(|id| *id != child);
                }
            }
            (Some(Owner::Observer(parent)), Owner::Scope(child)) => {
                if let Some(parent) = self.observers.get_mut(parent) {
                    parent.scopes.retain(|id| *id != child);
                }
            }
            (Some(Owner::Scope(parent)), Owner::Observer(child)) => {
                if let Some(parent) = self.scopes.get_mut(parent) {
                    parent.observers.retain(|id| *id != child);
                }
            }
            (Some(Owner::Scope(parent)), Owner::Scope(child)) => {
                if let Some(parent) = self.scopes.get_mut(parent) {
                    parent.children.retain(|id| *id != child);
                }
            }
            (None, _) => {}
        }
    }

    #[cfg(test)]
    pub fn observer_count(&self, id: SignalId) -> usize {
        self.values
            .get(id)
            .map(|signal_value| signal_value.observers.len())
            .unwrap_or_default()
    }
}

thread_local! {
    static STORAGE: RefCell<SignalStorage> = RefCell::new(SignalStorage::new());
}

/// Access the thread-local signal storage.
pub(crate) fn with_signal_storage<R>(f: impl FnOnce(&mut SignalStorage) -> R) -> R {
    let (result, released) = STORAGE.with(|storage| {
        let mut storage = storage.borrow_mut();
        let result = f(&mut storage);
        (result, std::mem::take(&mut storage.graveyard))
    });
    drop(released);
    result
}

/// Remove a signal from a `Drop` impl.
///
/// Unlike [`with_signal_storage`] this tolerates a store that is busy or
/// already torn down at thread exit.
pub(crate) fn release_signal(id: SignalId) {
    let released = STORAGE
        .try_with(|storage| {
            storage.try_borrow_mut().ok().map(|mut storage| {
                storage.remove(id);
                std::mem::take(&mut storage.graveyard)
            })
        })
        .ok()
        .flatten();
    drop(released);
}

/// Run an observer, tracking every signal it reads.
///
/// An observer that is already running ignores re-entrant triggers.
pub(crate) fn run_observer(id: ObserverId) {
    let Some((run, previous)) = with_signal_storage(|storage| storage.begin_run(id)) else {
        return;
    };
    run();
    with_signal_storage(|storage| storage.end_run(id, previous));
}

/// Bring an observer up to date.
///
/// A dirty observer re-runs. One that only needs a check first refreshes the
/// computeds it read, in read order, and re-runs only if one of them changed.
fn refresh(id: ObserverId) {
    let Some(status) = with_signal_storage(|storage| storage.idle_status(id)) else {
        return;
    };
    if status == Status::Check {
        let producers = with_signal_storage(|storage| storage.source_producers(id));
        for producer in producers {
            refresh(producer);
            if with_signal_storage(|storage| storage.idle_status(id)) == Some(Status::Dirty) {
                break;
            }
        }
    }
    match with_signal_storage(|storage| storage.idle_status(id)) {
        Some(Status::Dirty) => run_observer(id),
        Some(Status::Check) => with_signal_storage(|storage| storage.mark_clean(id)),
        _ => {}
    }
}

/// Refresh the computed behind `id`, if any, before its value is read.
pub(crate) fn refresh_signal(id: SignalId) {
    if let Some(producer) = with_signal_storage(|storage| storage.producer(id)) {
        batch(|| refresh(producer));
    }
}

/// Run `f`, deferring queued effects until the outermost batch closes.
pub(crate) fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_signal_storage(|storage| storage.batch_depth += 1);
    let result = f();
    let outermost = with_signal_storage(|storage| {
        storage.batch_depth -= 1;
        storage.batch_depth == 0
    });
    if outermost {
        flush_effects();
    }
    result
}

/// Mark everything that depends on a changed signal and run the effects it
/// reaches once marking is done.
pub(crate) fn signal_changed(id: SignalId) {
    batch(|| with_signal_storage(|storage| storage.mark_changed(id)));
}

fn flush_effects() {
    with_signal_storage(|storage| storage.batch_depth += 1);
    while let Some(effect) = with_signal_storage(|storage| storage.pending.pop_front()) {
        refresh(effect);
    }
    with_signal_storage(|storage| storage.batch_depth -= 1);
}

/// Run `f` with the given owner, restoring the previous owner afterwards.
pub(crate) fn with_owner<R>(owner: Option<Owner>, f: impl FnOnce() -> R) -> R {
    let previous = with_signal_storage(|storage| storage.set_owner(owner));
    let result = f();
    with_signal_storage(|storage| storage.set_owner(previous));
    result
}

/// Run `f` without tracking reads and without an owner.
///
/// Observers created inside `f` are not disposed along with whatever was
/// running when `untracked` was called.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    with_owner(None, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_insert_and_get() {
        with_signal_storage(|storage| {
            let id = storage.insert(42i32);
            assert_eq!(storage.get::<i32>(id), Some(42));
            assert_eq!(storage.get::<String>(id), None);
        });
    }

    #[test]
    fn test_set() {
        with_signal_storage(|storage| {
            let id = storage.insert(10i32);
            assert!(storage.set(id, 15i32));
            assert_eq!(storage.get::<i32>(id), Some(15));
        });
    }

    #[test]
    fn test_removed_slot_is_not_reused_by_stale_handle() {
        let stale = with_signal_storage(|storage| {
            let id = storage.insert(1i32);
            storage.remove(id);
            id
        });
        with_signal_storage(|storage| {
            let fresh = storage.insert(2i32);
            assert_ne!(stale, fresh);
            assert_eq!(storage.get::<i32>(stale), None);
        });
    }

    #[test]
    fn test_observer_tracks_reads_and_reruns() {
        let runs = Rc::new(Cell::new(0));
        let id = with_signal_storage(|storage| storage.insert(0i32));
        let observer = with_signal_storage(|storage| {
            let runs = runs.clone();
            storage.create_observer(Rc::new(move || {
                runs.set(runs.get() + 1);
                with_signal_storage(|storage| storage.track_read(id));
            }))
        });
        run_observer(observer);
        assert_eq!(runs.get(), 1);
        assert_eq!(with_signal_storage(|storage| storage.observer_count(id)), 1);

        with_signal_storage(|storage| storage.set(id, 1i32));
        signal_changed(id);
        assert_eq!(runs.get(), 2);
        // Re-running does not subscribe twice.
        assert_eq!(with_signal_storage(|storage| storage.observer_count(id)), 1);

        with_signal_storage(|storage| storage.dispose_observer(observer));
        assert_eq!(with_signal_storage(|storage| storage.observer_count(id)), 0);
    }

    #[test]
    fn test_marking_queues_each_effect_once() {
        let runs = Rc::new(Cell::new(0));
        let a = with_signal_storage(|storage| storage.insert(0i32));
        let b = with_signal_storage(|storage| storage.insert(0i32));
        let observer = with_signal_storage(|storage| {
            let runs = runs.clone();
            storage.create_observer(Rc::new(move || {
                runs.set(runs.get() + 1);
                with_signal_storage(|storage| {
                    storage.track_read(a);
                    storage.track_read(b);
                });
            }))
        });
        run_observer(observer);

        batch(|| {
            with_signal_storage(|storage| {
                storage.set(a, 1i32);
                storage.mark_changed(a);
                storage.set(b, 1i32);
                storage.mark_changed(b);
                assert_eq!(storage.pending.len(), 1);
            });
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_disposing_scope_disposes_owned_observers() {
        let scope = with_signal_storage(|storage| storage.create_scope());
        let observer = with_owner(Some(Owner::Scope(scope)), || {
            with_signal_storage(|storage| storage.create_observer(Rc::new(|| {})))
        });
        assert!(with_signal_storage(|storage| storage.observer_exists(observer)));

        with_signal_storage(|storage| storage.dispose_scope(scope));
        with_signal_storage(|storage| {
            assert!(!storage.scope_exists(scope));
            assert!(!storage.observer_exists(observer));
        });
    }

    #[test]
    fn test_untracked_reads_are_not_tracked() {
        let id = with_signal_storage(|storage| storage.insert(0i32));
        let observer = with_signal_storage(|storage| {
            storage.create_observer(Rc::new(move || {
                untracked(|| with_signal_storage(|storage| storage.track_read(id)));
            }))
        });
        run_observer(observer);
        assert_eq!(with_signal_storage(|storage| storage.observer_count(id)), 0);
    }
}
