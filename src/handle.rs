//! Handle traits shared by every signal shape, and the callable handle.
//!
//! Bridging code is written once against [`SignalRead`] and [`SignalWrite`]
//! and works with object handles ([`Signal`], [`Computed`]) as well as
//! callable get/set handles ([`SignalFn`]).

use crate::computed::Computed;
use crate::signal::{ReadOnlySignal, Signal};
use crate::storage::{release_signal, untracked, with_signal_storage, SignalId};
use std::fmt;
use std::rc::Rc;

/// Read access to a reactive value.
pub trait SignalRead<T> {
    /// Read the value, registering a dependency inside effects and computeds.
    fn read(&self) -> T;

    /// Read the value without registering a dependency.
    fn read_untracked(&self) -> T;

    /// Stable identity of the underlying reactive cell.
    fn signal_id(&self) -> SignalId;
}

/// Write access to a reactive value.
pub trait SignalWrite<T>: SignalRead<T> {
    fn write(&self, value: T);
}

impl<T: Clone + 'static> SignalRead<T> for Signal<T> {
    fn read(&self) -> T {
        self.get()
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }

    fn signal_id(&self) -> SignalId {
        self.id()
    }
}

impl<T: Clone + PartialEq + 'static> SignalWrite<T> for Signal<T> {
    fn write(&self, value: T) {
        self.set(value);
    }
}

impl<T: Clone + 'static> SignalRead<T> for ReadOnlySignal<T> {
    fn read(&self) -> T {
        self.get()
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }

    fn signal_id(&self) -> SignalId {
        self.id()
    }
}

impl<T: Clone + 'static> SignalRead<T> for Computed<T> {
    fn read(&self) -> T {
        self.get()
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }

    fn signal_id(&self) -> SignalId {
        self.id()
    }
}

/// A callable signal handle: call with no argument to read, with one to write.
///
/// A `SignalFn` is either backed by its own [`Signal`] or wraps an arbitrary
/// getter/setter pair. Getters that read other signals are tracked as usual.
pub struct SignalFn<T> {
    inner: Rc<SignalFnInner<T>>,
}

struct SignalFnInner<T> {
    read: Box<dyn Fn() -> T>,
    write: Box<dyn Fn(T)>,
    id: SignalId,
    /// Set when `id` is an identity slot allocated for this handle alone.
    owns_id: bool,
}

impl<T> Drop for SignalFnInner<T> {
    fn drop(&mut self) {
        if self.owns_id {
            release_signal(self.id);
        }
    }
}

impl<T> Clone for SignalFn<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for SignalFn<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for SignalFn<T> {}

impl<T: Clone + PartialEq + 'static> SignalFn<T> {
    /// Create a callable handle backed by a fresh signal.
    pub fn new(initial: T) -> Self {
        let signal = Signal::new(initial);
        Self {
            inner: Rc::new(SignalFnInner {
                read: Box::new(move || signal.get()),
                write: Box::new(move |value| {
                    signal.set(value);
                }),
                id: signal.id(),
                owns_id: false,
            }),
        }
    }
}

impl<T: 'static> SignalFn<T> {
    /// Wrap a getter and setter pair as a callable handle.
    pub fn from_fns(read: impl Fn() -> T + 'static, write: impl Fn(T) + 'static) -> Self {
        let id = with_signal_storage(|storage| storage.insert(()));
        Self {
            inner: Rc::new(SignalFnInner {
                read: Box::new(read),
                write: Box::new(write),
                id,
                owns_id: true,
            }),
        }
    }

    /// Read the current value (the zero-argument call).
    pub fn call(&self) -> T {
        (self.inner.read)()
    }

    /// Write a new value (the one-argument call).
    pub fn call_with(&self, value: T) {
        (self.inner.write)(value)
    }

    /// A plain getter closure sharing this handle.
    pub fn getter(&self) -> impl Fn() -> T + 'static {
        let this = self.clone();
        move || this.call()
    }

    /// A plain setter closure sharing this handle.
    pub fn setter(&self) -> impl Fn(T) + 'static {
        let this = self.clone();
        move |value| this.call_with(value)
    }
}

impl<T: 'static> SignalRead<T> for SignalFn<T> {
    fn read(&self) -> T {
        self.call()
    }

    fn read_untracked(&self) -> T {
        untracked(|| self.call())
    }

    fn signal_id(&self) -> SignalId {
        self.inner.id
    }
}

impl<T: 'static> SignalWrite<T> for SignalFn<T> {
    fn write(&self, value: T) {
        self.call_with(value)
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for SignalFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalFn")
            .field("id", &self.inner.id)
            .field("value", &self.read_untracked())
            .finish()
    }
}

/// Creates a callable signal handle holding `initial`.
pub fn create_signal_fn<T: Clone + PartialEq + 'static>(initial: T) -> SignalFn<T> {
    SignalFn::new(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Effect;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_callable_read_and_write() {
        let count = create_signal_fn(1);
        assert_eq!(count.call(), 1);
        count.call_with(2);
        assert_eq!(count.call(), 2);

        let get = count.getter();
        let set = count.setter();
        set(7);
        assert_eq!(get(), 7);
    }

    #[test]
    fn test_callable_reads_are_tracked() {
        let count = create_signal_fn(0);
        let runs = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.call();
                runs.set(runs.get() + 1);
            }
        });

        count.call_with(1);
        count.call_with(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_from_fns_has_its_own_identity() {
        let backing = Rc::new(RefCell::new(String::from("a")));
        let handle = SignalFn::from_fns(
            {
                let backing = backing.clone();
                move || backing.borrow().clone()
            },
            {
                let backing = backing.clone();
                move |value| *backing.borrow_mut() = value
            },
        );
        let other = handle.clone();

        handle.write("b".to_string());
        assert_eq!(other.read_untracked(), "b");
        assert_eq!(handle, other);

        let id = handle.signal_id();
        assert!(with_signal_storage(|storage| storage.contains(id)));
        drop(handle);
        drop(other);
        assert!(!with_signal_storage(|storage| storage.contains(id)));
    }

    #[test]
    fn test_object_and_callable_share_trait() {
        fn double<S: SignalWrite<i32>>(handle: &S) {
            handle.write(handle.read_untracked() * 2);
        }

        let object = Signal::new(2);
        let callable = create_signal_fn(3);
        double(&object);
        double(&callable);
        assert_eq!(object.get(), 4);
        assert_eq!(callable.call(), 6);
    }
}
