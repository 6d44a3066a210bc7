//! Writable signals and their read-only views.

use crate::storage::{refresh_signal, signal_changed, with_signal_storage, SignalId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A mutable reactive cell holding a `T`.
///
/// Signals are Copy-able handles to reactive state. Reading a signal inside an
/// effect or computed registers a dependency; writing a different value re-runs
/// every observer that read it.
///
/// # Examples
///
/// ```rust,no_run
/// use gpui_signal_bridge::prelude::*;
///
/// let count = create_signal(0);
/// count.set(10);
/// assert_eq!(count.get(), 10);
/// ```
pub struct Signal<T> {
    id: SignalId,
    _phantom: PhantomData<T>,
}

impl<T> Copy for Signal<T> {}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Signal<bool> {
    /// Flip the flag and notify observers.
    pub fn toggle(&self) {
        self.update(|v| *v = !*v);
    }
}

impl<T: 'static> Signal<T> {
    /// Allocate a signal holding `value`.
    pub fn new(value: T) -> Self {
        let id = with_signal_storage(|storage| storage.insert(value));
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Clone the value out, subscribing the running effect or computed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Clone the value out without subscribing anything.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Store `value` if it differs from the current one.
    ///
    /// Observers only hear about writes that change the value. Returns
    /// whether it changed.
    pub fn set(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let changed = self.with_untracked(|current| current != &value);
        if changed {
            self.replace(value);
        }
        changed
    }

    /// Replace the value and notify every observer, even if it is unchanged.
    pub fn replace(&self, value: T) {
        if with_signal_storage(|storage| storage.set(self.id, value)) {
            signal_changed(self.id);
        }
    }

    /// Mutate the value in place. Always notifies.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.update_with(f);
    }

    /// Mutate the value in place and hand back what `f` returns.
    ///
    /// `None` once the signal is disposed.
    pub fn update_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = with_signal_storage(|storage| storage.cell(self.id))?;
        let result = {
            let mut value = cell.borrow_mut();
            f(value.downcast_mut::<T>()?)
        };
        signal_changed(self.id);
        Some(result)
    }

    /// Borrow the value, subscribing the running effect or computed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_signal_storage(|storage| storage.track_read(self.id));
        self.with_untracked(f)
    }

    /// Borrow the value without subscribing anything.
    ///
    /// The store is not borrowed while `f` runs, so `f` may read or write
    /// other signals.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        refresh_signal(self.id);
        let cell = with_signal_storage(|storage| storage.cell(self.id))
            .expect("Signal value not found");
        let value = cell.borrow();
        let result = f(value
            .downcast_ref::<T>()
            .expect("Signal value has an unexpected type"));
        result
    }

    /// A handle that can read this signal but not write it.
    pub fn read_only(self) -> ReadOnlySignal<T> {
        ReadOnlySignal { inner: self }
    }

    /// Whether the signal still has a value in the store.
    pub fn is_alive(&self) -> bool {
        with_signal_storage(|storage| storage.contains(self.id))
    }

    /// Remove the signal's value from the store.
    pub(crate) fn dispose(&self) {
        with_signal_storage(|storage| storage.remove(self.id));
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

impl<T: 'static + Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static + fmt::Debug + Clone> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// Creates a writable signal holding `initial`.
pub fn create_signal<T: 'static>(initial: T) -> Signal<T> {
    Signal::new(initial)
}

/// Read access to a [`Signal`], for handing state to code that must not write it.
pub struct ReadOnlySignal<T> {
    inner: Signal<T>,
}

impl<T> Copy for ReadOnlySignal<T> {}

impl<T> Clone for ReadOnlySignal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ReadOnlySignal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for ReadOnlySignal<T> {}

impl<T> Hash for ReadOnlySignal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T: 'static> ReadOnlySignal<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with_untracked(f)
    }

    pub fn id(&self) -> SignalId {
        self.inner.id()
    }
}

impl<T: 'static + fmt::Debug + Clone> fmt::Debug for ReadOnlySignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlySignal")
            .field("value", &self.get_untracked())
            .finish()
    }
}
