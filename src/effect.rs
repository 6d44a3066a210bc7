//! Effects and effect scopes.

use crate::storage::{
    batch, run_observer, with_owner, with_signal_storage, ObserverId, Owner, ScopeId,
};
use std::rc::Rc;

/// A side effect that re-runs whenever a signal it read changes.
///
/// The effect runs once on creation. It keeps running until [`Effect::stop`]
/// is called or its owner (an enclosing effect or [`EffectScope`]) stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: ObserverId,
}

impl Effect {
    /// Create an effect and run it immediately.
    ///
    /// Effects triggered by writes made during this first run wait until it
    /// finishes.
    pub fn new(f: impl Fn() + 'static) -> Self {
        let id = with_signal_storage(|storage| storage.create_observer(Rc::new(f)));
        batch(|| run_observer(id));
        Self { id }
    }

    /// Stop the effect permanently. Calling this more than once is a no-op.
    pub fn stop(&self) {
        with_signal_storage(|storage| storage.dispose_observer(self.id));
    }

    /// Whether the effect is still reacting to its dependencies.
    pub fn is_active(&self) -> bool {
        with_signal_storage(|storage| storage.observer_exists(self.id))
    }

    /// A teardown closure bound to this effect.
    ///
    /// Hand this to lifecycle owners instead of the handle itself.
    pub fn teardown(self) -> impl FnOnce() + 'static {
        move || self.stop()
    }
}

/// Creates an effect that runs `f` now and whenever a signal it read changes.
pub fn create_effect(f: impl Fn() + 'static) -> Effect {
    Effect::new(f)
}

/// A group of effects that can be stopped together.
///
/// Effects, computeds and nested scopes created inside [`EffectScope::run`]
/// belong to the scope and stop when it stops.
///
/// # Example
///
/// ```rust,no_run
/// use gpui_signal_bridge::prelude::*;
///
/// let count = create_signal(0);
/// let scope = create_signal_scope();
/// scope.run(|| {
///     create_effect(move || println!("count is {}", count.get()));
/// });
/// scope.stop();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectScope {
    id: ScopeId,
}

impl EffectScope {
    /// Create an empty scope owned by the current effect or scope, if any.
    pub fn new() -> Self {
        Self {
            id: with_signal_storage(|storage| storage.create_scope()),
        }
    }

    /// Run `f` with this scope as the owner of everything it creates.
    ///
    /// Reads inside `f` are not tracked by an enclosing effect. Returns `None`
    /// without calling `f` once the scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            return None;
        }
        Some(with_owner(Some(Owner::Scope(self.id)), f))
    }

    /// Stop every effect owned by this scope, transitively. Idempotent.
    pub fn stop(&self) {
        with_signal_storage(|storage| storage.dispose_scope(self.id));
    }

    pub fn is_active(&self) -> bool {
        with_signal_storage(|storage| storage.scope_exists(self.id))
    }

    /// A teardown closure bound to this scope.
    pub fn teardown(self) -> impl FnOnce() + 'static {
        move || self.stop()
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates an empty effect scope.
pub fn create_signal_scope() -> EffectScope {
    EffectScope::new()
}
