//! Signal hooks for [`Component`](crate::Component) render functions.
//!
//! # Example
//!
//! ```rust,no_run
//! use gpui_signal_bridge::prelude::*;
//!
//! let count = create_signal(0);
//! let counter = Component::new("counter");
//! let (value, set_count) = counter.render(|cx| use_signal(cx, &count));
//! set_count.update(|n| n + 1);
//! assert!(counter.needs_render());
//! ```

use crate::bridge::{signal_store, SetSignal};
use crate::effect::{Effect, EffectScope};
use crate::handle::{SignalRead, SignalWrite};
use crate::host::{Cleanup, Hooks};
use crate::unstable::{AsyncComputed, AsyncEffect};
use futures::future::LocalBoxFuture;
use std::cell::Cell;
use std::rc::Rc;

/// An effect body whose identity decides when [`use_signal_effect`] re-creates it.
pub type EffectFn = Rc<dyn Fn()>;

/// An async effect body for [`unstable_use_async_effect`].
pub type AsyncEffectFn<T> = Rc<dyn Fn() -> LocalBoxFuture<'static, T>>;

/// Identity of a shared closure, ignoring its vtable.
pub(crate) fn fn_identity<F: ?Sized>(f: &Rc<F>) -> usize {
    Rc::as_ptr(f) as *const () as usize
}

/// Subscribe to a signal and return its current value with a setter.
///
/// The value is kept fresh through the component's tear-free store
/// subscription: every distinct write requests exactly one render.
pub fn use_signal<S, T>(cx: &mut Hooks<'_>, signal: &S) -> (T, SetSignal<T>)
where
    S: SignalWrite<T> + Clone + 'static,
    T: Clone + PartialEq + 'static,
{
    let value = use_signal_value(cx, signal);
    (value, use_set_signal(signal))
}

/// Subscribe to a signal or computed and return its current value.
pub fn use_signal_value<S, T>(cx: &mut Hooks<'_>, signal: &S) -> T
where
    S: SignalRead<T> + Clone + 'static,
    T: Clone + PartialEq + 'static,
{
    cx.use_sync_external_store(signal.signal_id(), || signal_store(signal.clone()))
}

/// A setter for a signal that does not subscribe the caller.
pub fn use_set_signal<S, T>(signal: &S) -> SetSignal<T>
where
    S: SignalWrite<T> + Clone + 'static,
    T: 'static,
{
    SetSignal::new(signal.clone())
}

/// Run `f` as an effect bound to the component's lifecycle.
///
/// The effect is created after commit and stopped on unmount, or replaced
/// when a render passes a different `f`.
pub fn use_signal_effect(cx: &mut Hooks<'_>, f: &EffectFn) {
    let f = f.clone();
    cx.use_effect(fn_identity(&f), move || {
        let effect = Effect::new(move || f());
        Box::new(effect.teardown()) as Cleanup
    });
}

/// One effect scope for the component's whole mounted lifetime.
///
/// The same scope is returned on every render and stopped on unmount.
pub fn use_signal_scope(cx: &mut Hooks<'_>) -> EffectScope {
    let scope = cx.use_memo(EffectScope::new);
    cx.use_effect(scope, move || Box::new(scope.teardown()) as Cleanup);
    scope
}

/// Read an async computed from a component.
///
/// Renders again whenever the computed resolves. On mount, and whenever a
/// different computed is passed, the in-flight value is also awaited and
/// stored in component state; a result that arrives after unmount is
/// dropped. The last resolved value wins over the awaited one, since it is
/// never older.
pub fn unstable_use_async_computed_value<T>(cx: &mut Hooks<'_>, computed: &AsyncComputed<T>) -> Option<T>
where
    T: Clone + PartialEq + 'static,
{
    let (fetched, set_fetched) = cx.use_state(|| computed.current_value_untracked());
    let current = cx.use_sync_external_store(computed.current().id(), || {
        signal_store(computed.current())
    });

    let handle = computed.clone();
    cx.use_effect(computed.clone(), move || {
        let active = Rc::new(Cell::new(true));
        let fetch = {
            let active = active.clone();
            let handle = handle.clone();
            async move {
                let value = handle.get().await;
                if active.get() {
                    set_fetched.set(value);
                }
            }
        };
        handle.spawn(fetch);
        Box::new(move || active.set(false)) as Cleanup
    });

    current.or(fetched)
}

/// Run an async effect bound to the component's lifecycle.
///
/// Uses the component's spawner; without one the effect is skipped.
pub fn unstable_use_async_effect<T>(cx: &mut Hooks<'_>, f: &AsyncEffectFn<T>)
where
    T: Clone + 'static,
{
    let f = f.clone();
    let spawner = cx.spawner();
    cx.use_effect(fn_identity(&f), move || {
        let Some(spawner) = spawner else {
            tracing::warn!("async effect skipped: component has no spawner");
            return Box::new(|| {}) as Cleanup;
        };
        let effect = AsyncEffect::with_spawner(spawner, move || f());
        Box::new(effect.teardown()) as Cleanup
    });
}
