//! Computed signals that derive from other signals.

use crate::signal::{ReadOnlySignal, Signal};
use crate::storage::{run_observer, with_signal_storage, ObserverId, SignalId};
use std::hash::{Hash, Hasher};
use std::{cell::Cell, fmt, rc::Rc};

/// A computed signal that derives its value from other signals.
///
/// Computeds track the signals read by their getter. A change only marks the
/// computed stale; it recomputes the next time it is read, and downstream
/// observers hear about it only when the recomputed value differs. A computed
/// is owned by whatever effect or scope was active when it was created and is
/// released along with that owner.
///
/// # Examples
///
/// ```rust,no_run
/// use gpui_signal_bridge::prelude::*;
///
/// let count = create_signal(5);
/// let doubled = create_computed(move || count.get() * 2);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    signal: Signal<T>,
    observer: ObserverId,
}

impl<T> Copy for Computed<T> {}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.signal == other.signal
    }
}

impl<T> Eq for Computed<T> {}

impl<T> Hash for Computed<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signal.hash(state);
    }
}

impl<T: 'static + Clone + PartialEq> Computed<T> {
    /// Create a new computed from a computation function.
    ///
    /// The function is called immediately to seed the value, then again on
    /// the first read after a dependency changed.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let slot: Rc<Cell<Option<Signal<T>>>> = Rc::new(Cell::new(None));

        let recompute = {
            let slot = slot.clone();
            move || {
                let value = compute();
                match slot.get() {
                    Some(signal) => {
                        signal.set(value);
                    }
                    None => slot.set(Some(Signal::new(value))),
                }
            }
        };

        let observer = with_signal_storage(|storage| storage.create_observer(Rc::new(recompute)));
        // Run once to register dependencies and seed the value.
        run_observer(observer);

        let signal = slot
            .get()
            .expect("computed value is seeded by its first run");
        with_signal_storage(|storage| storage.bind_output(observer, signal.id()));
        Self { signal, observer }
    }
}

impl<T: 'static + Clone> Computed<T> {
    /// Get the current computed value.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without tracking the read.
    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Read the computed value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// A read-only view of the backing signal.
    pub fn read_only(&self) -> ReadOnlySignal<T> {
        self.signal.read_only()
    }

    /// Whether the computed still reacts to its dependencies.
    pub fn is_active(&self) -> bool {
        with_signal_storage(|storage| storage.observer_exists(self.observer))
    }

    /// Stop recomputing and release the cached value.
    pub fn dispose(&self) {
        with_signal_storage(|storage| storage.dispose_observer(self.observer));
    }

    pub fn id(&self) -> SignalId {
        self.signal.id()
    }
}

impl<T: 'static + Clone + fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// Creates a computed signal from a getter.
pub fn create_computed<T: Clone + PartialEq + 'static>(f: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Effect, Signal};
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_computed_basic() {
        let count = Signal::new(5);
        let doubled = create_computed(move || count.get() * 2);

        assert_eq!(doubled.get(), 10);
        count.set(10);
        assert_eq!(doubled.get(), 20);
    }

    #[test]
    fn test_computed_chain() {
        let count = Signal::new(1);
        let doubled = Computed::new(move || count.get() * 2);
        let quadrupled = Computed::new(move || doubled.get() * 2);

        count.set(3);
        assert_eq!(quadrupled.get(), 12);
    }

    #[test]
    fn test_computed_reads_other_signals_inside_closure() {
        let a = Signal::new(2);
        let b = Signal::new(3);
        let product = Computed::new(move || a.with(|a| a * b.get()));

        assert_eq!(product.get(), 6);
        b.set(4);
        assert_eq!(product.get(), 8);
    }

    #[test]
    fn test_unchanged_result_does_not_notify() {
        let count = Signal::new(1);
        let is_even = Computed::new(move || count.get() % 2 == 0);
        let runs = Rc::new(Cell::new(0));

        let _effect = Effect::new({
            let runs = runs.clone();
            move || {
                is_even.get();
                runs.set(runs.get() + 1);
            }
        });

        count.set(3);
        count.set(5);
        assert_eq!(runs.get(), 1);

        count.set(6);
        assert_eq!(runs.get(), 2);
        assert!(is_even.get());
    }

    #[test]
    fn test_diamond_is_seen_once_per_write() {
        let a = Signal::new(1);
        let doubled = Computed::new(move || a.get() * 2);
        let tripled = Computed::new(move || a.get() * 3);
        let sum = Computed::new(move || doubled.get() + tripled.get());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _effect = Effect::new({
            let seen = seen.clone();
            move || seen.borrow_mut().push(sum.get())
        });

        a.set(2);
        a.set(3);
        assert_eq!(*seen.borrow(), vec![5, 10, 15]);
    }

    #[test]
    fn test_computed_recomputes_lazily_once_per_change() {
        let a = Signal::new(1);
        let runs = Rc::new(Cell::new(0));
        let doubled = Computed::new({
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                a.get() * 2
            }
        });
        let left = Computed::new(move || doubled.get() + 1);
        let right = Computed::new(move || doubled.get() - 1);

        a.set(2);
        a.set(3);
        assert_eq!(runs.get(), 1);
        assert_eq!((left.get(), right.get()), (7, 5));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_disposed_computed_stops_tracking() {
        let count = Signal::new(1);
        let runs = Rc::new(Cell::new(0));
        let computed = Computed::new({
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                count.get()
            }
        });

        computed.dispose();
        assert!(!computed.is_active());
        assert!(!with_signal_storage(|storage| storage.contains(computed.id())));
        count.set(2);
        assert_eq!(runs.get(), 1);
    }
}
