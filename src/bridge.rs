//! External-store bridge.
//!
//! Exposes a pull-based signal through the subscribe/snapshot contract used
//! by tear-free renderers: `subscribe(notify) -> unsubscribe`, a snapshot
//! getter and an optional server snapshot getter.

use crate::effect::Effect;
use crate::handle::{SignalRead, SignalWrite};
use crate::storage::untracked;
use std::fmt;
use std::rc::Rc;

/// Callback a store invokes synchronously whenever its snapshot may have changed.
pub type Notify = Rc<dyn Fn()>;

/// Teardown returned by [`ExternalStore::subscribe`].
pub type Unsubscribe = Box<dyn FnOnce()>;

/// A subscribe/snapshot triple understood by tear-free renderers.
pub struct ExternalStore<T> {
    subscribe: Rc<dyn Fn(Notify) -> Unsubscribe>,
    get_snapshot: Rc<dyn Fn() -> T>,
    get_server_snapshot: Option<Rc<dyn Fn() -> T>>,
}

impl<T> Clone for ExternalStore<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe: self.subscribe.clone(),
            get_snapshot: self.get_snapshot.clone(),
            get_server_snapshot: self.get_server_snapshot.clone(),
        }
    }
}

impl<T: 'static> ExternalStore<T> {
    pub fn new(
        subscribe: impl Fn(Notify) -> Unsubscribe + 'static,
        get_snapshot: impl Fn() -> T + 'static,
    ) -> Self {
        Self {
            subscribe: Rc::new(subscribe),
            get_snapshot: Rc::new(get_snapshot),
            get_server_snapshot: None,
        }
    }

    /// Use a dedicated getter when rendering on the server.
    pub fn with_server_snapshot(mut self, get_server_snapshot: impl Fn() -> T + 'static) -> Self {
        self.get_server_snapshot = Some(Rc::new(get_server_snapshot));
        self
    }

    /// Start listening; `notify` runs synchronously on every change.
    pub fn subscribe(&self, notify: Notify) -> Unsubscribe {
        (self.subscribe)(notify)
    }

    /// Read the current client snapshot.
    pub fn snapshot(&self) -> T {
        (self.get_snapshot)()
    }

    /// Read the server snapshot, falling back to the client getter.
    pub fn server_snapshot(&self) -> T {
        match &self.get_server_snapshot {
            Some(get_server_snapshot) => get_server_snapshot(),
            None => self.snapshot(),
        }
    }

    pub(crate) fn snapshot_fn(&self) -> Rc<dyn Fn() -> T> {
        self.get_snapshot.clone()
    }
}

/// Bridge a signal handle to the external-store contract.
///
/// Subscribing creates an effect that reads the signal and calls `notify`
/// from inside the effect. The effect runs once per write, after every
/// computed it depends on has settled, so the renderer never re-reads a
/// half-updated snapshot. Snapshots always re-read the signal; nothing is
/// cached. The server snapshot reads the same value.
pub fn signal_store<S, T>(handle: S) -> ExternalStore<T>
where
    S: SignalRead<T> + Clone + 'static,
    T: 'static,
{
    let subscribe = {
        let handle = handle.clone();
        move |notify: Notify| -> Unsubscribe {
            let handle = handle.clone();
            // The subscription belongs to the renderer, not to whatever
            // effect or scope happens to be running when it subscribes.
            let effect = untracked(|| {
                Effect::new(move || {
                    handle.read();
                    notify();
                })
            });
            Box::new(effect.teardown())
        }
    };
    let server = handle.clone();
    ExternalStore::new(subscribe, move || handle.read_untracked())
        .with_server_snapshot(move || server.read_untracked())
}

/// Argument accepted by a signal setter: a literal value or an updater.
pub enum SetValue<T> {
    Value(T),
    Updater(Box<dyn FnOnce(T) -> T>),
}

impl<T> SetValue<T> {
    /// Wrap an updater closure that receives the current value.
    pub fn updater(f: impl FnOnce(T) -> T + 'static) -> Self {
        Self::Updater(Box::new(f))
    }
}

impl<T> From<T> for SetValue<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SetValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Updater(_) => f.write_str("Updater"),
        }
    }
}

/// A setter bound to one signal handle.
///
/// Calling it never subscribes the caller to the signal.
pub struct SetSignal<T> {
    write: Rc<dyn Fn(SetValue<T>)>,
}

impl<T> Clone for SetSignal<T> {
    fn clone(&self) -> Self {
        Self {
            write: self.write.clone(),
        }
    }
}

impl<T: 'static> SetSignal<T> {
    pub fn new<S>(handle: S) -> Self
    where
        S: SignalWrite<T> + 'static,
    {
        Self {
            write: Rc::new(move |value| match value {
                SetValue::Value(value) => handle.write(value),
                SetValue::Updater(updater) => handle.write(updater(handle.read_untracked())),
            }),
        }
    }

    /// Write a literal value or apply an updater.
    pub fn call(&self, value: impl Into<SetValue<T>>) {
        (self.write)(value.into())
    }

    pub fn set(&self, value: T) {
        self.call(SetValue::Value(value))
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(T) -> T + 'static) {
        self.call(SetValue::updater(f))
    }
}
