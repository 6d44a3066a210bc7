//! Integration with GPUI's Context system.
//!
//! Entities read signals through [`SignalContext`]: each signal an entity
//! reads is subscribed once, and every change re-renders the entity with
//! `cx.notify()`. Subscriptions, effects and scopes created through the
//! context are torn down when the entity is released.

use crate::bridge::{signal_store, SetSignal, Unsubscribe};
use crate::effect::{Effect, EffectScope};
use crate::handle::{SignalRead, SignalWrite};
use crate::storage::{untracked, SignalId};
use futures::channel::mpsc;
use futures::StreamExt;
use gpui::{EntityId, WeakEntity};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Extension trait for GPUI Context to work with signals.
///
/// # Example
///
/// ```rust,no_run
/// use gpui::*;
/// use gpui_signal_bridge::prelude::*;
///
/// struct Counter {
///     count: Signal<i32>,
/// }
///
/// impl Render for Counter {
///     fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
///         let (count, set_count) = cx.use_signal(&self.count);
///         div()
///             .child(format!("count is {count}"))
///             .on_mouse_down(MouseButton::Left, move |_, _, _| set_count.update(|n| n + 1))
///     }
/// }
/// ```
pub trait SignalContext {
    /// Read a signal and re-render the entity whenever it changes.
    fn use_signal_value<S, T>(&mut self, signal: &S) -> T
    where
        S: SignalRead<T> + Clone + 'static,
        T: 'static;

    /// Like [`SignalContext::use_signal_value`], also returning a setter.
    fn use_signal<S, T>(&mut self, signal: &S) -> (T, SetSignal<T>)
    where
        S: SignalWrite<T> + Clone + 'static,
        T: 'static;

    /// Run an effect until the entity is released.
    fn use_signal_effect(&mut self, f: impl Fn() + 'static) -> Effect;

    /// An effect scope stopped when the entity is released.
    fn use_signal_scope(&mut self) -> EffectScope;
}

#[derive(Default)]
struct EntityBindings {
    subscribed: HashSet<SignalId>,
    teardowns: Vec<Unsubscribe>,
}

thread_local! {
    static ENTITY_BINDINGS: RefCell<HashMap<EntityId, EntityBindings>> = RefCell::new(HashMap::new());
}

/// Register `teardown` to run when the entity is released.
fn track_teardown<V: 'static>(cx: &mut gpui::Context<V>, teardown: Unsubscribe) {
    let entity_id = cx.entity_id();
    let first = ENTITY_BINDINGS.with(|bindings| {
        let mut bindings = bindings.borrow_mut();
        let first = !bindings.contains_key(&entity_id);
        bindings.entry(entity_id).or_default().teardowns.push(teardown);
        first
    });
    if first {
        cx.on_release(move |_, _| release_entity(entity_id)).detach();
    }
}

fn release_entity(entity_id: EntityId) {
    let released = ENTITY_BINDINGS.with(|bindings| bindings.borrow_mut().remove(&entity_id));
    if let Some(released) = released {
        tracing::trace!(?entity_id, teardowns = released.teardowns.len(), "releasing signal bindings");
        untracked(|| {
            for teardown in released.teardowns {
                teardown();
            }
        });
    }
}

impl<V: 'static> SignalContext for gpui::Context<'_, V> {
    fn use_signal_value<S, T>(&mut self, signal: &S) -> T
    where
        S: SignalRead<T> + Clone + 'static,
        T: 'static,
    {
        let entity_id = self.entity_id();
        let id = signal.signal_id();
        let subscribed = ENTITY_BINDINGS.with(|bindings| {
            bindings
                .borrow()
                .get(&entity_id)
                .is_some_and(|bindings| bindings.subscribed.contains(&id))
        });
        if !subscribed {
            let unsubscribe = auto_notify(signal.clone(), self);
            track_teardown(self, unsubscribe);
            ENTITY_BINDINGS.with(|bindings| {
                bindings
                    .borrow_mut()
                    .entry(entity_id)
                    .or_default()
                    .subscribed
                    .insert(id);
            });
        }
        signal.read_untracked()
    }

    fn use_signal<S, T>(&mut self, signal: &S) -> (T, SetSignal<T>)
    where
        S: SignalWrite<T> + Clone + 'static,
        T: 'static,
    {
        let value = self.use_signal_value(signal);
        (value, SetSignal::new(signal.clone()))
    }

    fn use_signal_effect(&mut self, f: impl Fn() + 'static) -> Effect {
        let effect = untracked(|| Effect::new(f));
        track_teardown(self, Box::new(effect.teardown()));
        effect
    }

    fn use_signal_scope(&mut self) -> EffectScope {
        let scope = untracked(EffectScope::new);
        track_teardown(self, Box::new(scope.teardown()));
        scope
    }
}

/// Notify an entity whenever a signal changes.
///
/// Changes are forwarded over a channel to a foreground task that calls
/// `cx.notify()`, so signal writes never re-enter the entity. The returned
/// teardown stops the subscription; the task ends once the channel closes.
pub(crate) fn auto_notify<S, T, V>(signal: S, cx: &mut gpui::Context<V>) -> Unsubscribe
where
    S: SignalRead<T> + Clone + 'static,
    T: 'static,
    V: 'static,
{
    let (tx, mut rx) = mpsc::unbounded::<()>();

    // The first notification fires on subscribe; the entity is already rendering.
    let skip_first = Rc::new(std::cell::Cell::new(true));
    let unsubscribe = signal_store(signal).subscribe(Rc::new(move || {
        if skip_first.replace(false) {
            return;
        }
        // If the receiver is dropped, the entity is gone.
        let _ = tx.unbounded_send(());
    }));

    cx.spawn(async move |entity: WeakEntity<V>, cx: &mut gpui::AsyncApp| {
        while let Some(()) = rx.next().await {
            let Some(entity) = entity.upgrade() else {
                break;
            };
            entity.update(cx, |_, cx| cx.notify()).ok();
        }
    })
    .detach();

    unsubscribe
}
