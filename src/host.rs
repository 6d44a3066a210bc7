//! A minimal component host.
//!
//! [`Component`] models the lifecycle a rendering framework offers to hooks:
//! render passes with positional hook slots, a commit phase that runs effect
//! setups, tear-free external-store subscriptions and unmount cleanup. The
//! signal hooks in [`crate::hooks`] are written against [`Hooks`], the
//! per-render handle it passes to render functions.

use crate::bridge::{ExternalStore, Unsubscribe};
use crate::storage::untracked;
use futures::task::LocalSpawn;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Teardown registered by an effect hook.
pub type Cleanup = Box<dyn FnOnce()>;

type SharedCleanup = Rc<RefCell<Option<Cleanup>>>;

trait HookSlot: 'static {
    /// Release resources held by the slot on unmount.
    fn teardown(&mut self) {}

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

struct MemoSlot<T>(T);

impl<T: 'static> HookSlot for MemoSlot<T> {
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct StateSlot<T>(Rc<RefCell<T>>);

impl<T: 'static> HookSlot for StateSlot<T> {
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct EffectSlot<D> {
    deps: D,
    cleanup: SharedCleanup,
}

impl<D: 'static> HookSlot for EffectSlot<D> {
    fn teardown(&mut self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct StoreSlot<T, K> {
    key: K,
    store: ExternalStore<T>,
    last: Rc<RefCell<T>>,
    unsubscribe: Rc<RefCell<Option<Unsubscribe>>>,
}

impl<T: 'static, K: 'static> HookSlot for StoreSlot<T, K> {
    fn teardown(&mut self) {
        let unsubscribe = self.unsubscribe.borrow_mut().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct ComponentInner {
    name: String,
    slots: RefCell<Vec<Option<Box<dyn HookSlot>>>>,
    mounted: Cell<bool>,
    server: bool,
    needs_render: Cell<bool>,
    render_requests: Cell<usize>,
    renders: Cell<usize>,
    spawner: Option<Rc<dyn LocalSpawn>>,
}

impl ComponentInner {
    fn request_render(&self) {
        if !self.mounted.get() {
            return;
        }
        self.needs_render.set(true);
        self.render_requests.set(self.render_requests.get() + 1);
        tracing::trace!(component = %self.name, "render requested");
    }
}

/// A mounted component instance.
///
/// Rendering runs a render function, then commits: effect setups registered
/// during the pass run and external stores are subscribed. Notifications only
/// record that another render is needed; the caller decides when to render.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), false, None)
    }

    /// A component whose hooks may spawn local futures.
    pub fn with_spawner(name: impl Into<String>, spawner: impl LocalSpawn + 'static) -> Self {
        Self::build(name.into(), false, Some(Rc::new(spawner)))
    }

    /// A component rendered on the server: stores report their server
    /// snapshot, nothing is subscribed and effects never run.
    pub fn server(name: impl Into<String>) -> Self {
        Self::build(name.into(), true, None)
    }

    fn build(name: String, server: bool, spawner: Option<Rc<dyn LocalSpawn>>) -> Self {
        Self {
            inner: Rc::new(ComponentInner {
                name,
                slots: RefCell::new(Vec::new()),
                mounted: Cell::new(false),
                server,
                needs_render: Cell::new(false),
                render_requests: Cell::new(0),
                renders: Cell::new(0),
                spawner,
            }),
        }
    }

    /// Run one render pass and commit it.
    ///
    /// The render function runs outside any reactive owner, so signal reads
    /// inside it are never tracked by an enclosing effect.
    pub fn render<R>(&self, f: impl FnOnce(&mut Hooks<'_>) -> R) -> R {
        untracked(|| {
            self.inner.needs_render.set(false);
            let mut hooks = Hooks {
                component: &self.inner,
                cursor: 0,
                commit: Vec::new(),
            };
            let output = f(&mut hooks);
            let commit = hooks.commit;

            self.inner.mounted.set(true);
            self.inner.renders.set(self.inner.renders.get() + 1);
            tracing::trace!(component = %self.inner.name, render = self.inner.renders.get(), "committed");

            if !self.inner.server {
                for step in commit {
                    step();
                }
            }
            output
        })
    }

    /// Tear down every hook: effect cleanups run and stores unsubscribe.
    pub fn unmount(&self) {
        if !self.inner.mounted.replace(false) {
            return;
        }
        let slots = std::mem::take(&mut *self.inner.slots.borrow_mut());
        untracked(|| {
            for mut slot in slots.into_iter().flatten() {
                slot.teardown();
            }
        });
        self.inner.needs_render.set(false);
        tracing::debug!(component = %self.inner.name, "unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Whether a subscribed store changed since the last render.
    pub fn needs_render(&self) -> bool {
        self.inner.needs_render.get()
    }

    /// Total number of render requests received while mounted.
    pub fn render_requests(&self) -> usize {
        self.inner.render_requests.get()
    }

    /// Total number of committed renders.
    pub fn renders(&self) -> usize {
        self.inner.renders.get()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.inner.name)
            .field("mounted", &self.inner.mounted.get())
            .field("renders", &self.inner.renders.get())
            .finish()
    }
}

/// Per-render handle passed to render functions.
///
/// Hooks are matched to their slot by call order, so every render must call
/// the same hooks in the same order.
pub struct Hooks<'a> {
    component: &'a Rc<ComponentInner>,
    cursor: usize,
    commit: Vec<Box<dyn FnOnce()>>,
}

impl Hooks<'_> {
    fn take_slot<S: HookSlot>(&mut self) -> (usize, Option<S>) {
        let index = self.cursor;
        self.cursor += 1;
        let mut slots = self.component.slots.borrow_mut();
        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }
        let slot = slots[index].take().map(|slot| {
            *slot
                .into_any()
                .downcast::<S>()
                .unwrap_or_else(|_| panic!("hook order changed between renders of slot {index}"))
        });
        (index, slot)
    }

    fn put_slot<S: HookSlot>(&self, index: usize, slot: S) {
        self.component.slots.borrow_mut()[index] = Some(Box::new(slot));
    }

    pub fn is_server(&self) -> bool {
        self.component.server
    }

    /// The spawner configured on the component, if any.
    pub fn spawner(&self) -> Option<Rc<dyn LocalSpawn>> {
        self.component.spawner.clone()
    }

    /// Compute a value once per mounted lifetime.
    pub fn use_memo<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> T {
        let (index, slot) = self.take_slot::<MemoSlot<T>>();
        let slot = slot.unwrap_or_else(|| MemoSlot(init()));
        let value = slot.0.clone();
        self.put_slot(index, slot);
        value
    }

    /// Local state; writing it requests another render.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>) {
        let (index, slot) = self.take_slot::<StateSlot<T>>();
        let slot = slot.unwrap_or_else(|| StateSlot(Rc::new(RefCell::new(init()))));
        let value = slot.0.borrow().clone();
        let setter = StateSetter {
            value: slot.0.clone(),
            component: Rc::downgrade(self.component),
        };
        self.put_slot(index, slot);
        (value, setter)
    }

    /// Run `setup` after commit whenever `deps` differ from the previous render.
    ///
    /// The cleanup returned by the previous setup runs first, and the last
    /// cleanup runs on unmount.
    pub fn use_effect<D, F>(&mut self, deps: D, setup: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Cleanup + 'static,
    {
        let (index, slot) = self.take_slot::<EffectSlot<D>>();
        let (cleanup, changed) = match slot {
            Some(slot) if slot.deps == deps => (slot.cleanup, false),
            Some(slot) => (slot.cleanup, true),
            None => (Rc::new(RefCell::new(None)), true),
        };
        if changed {
            let cell = cleanup.clone();
            self.commit.push(Box::new(move || {
                let previous = cell.borrow_mut().take();
                if let Some(previous) = previous {
                    previous();
                }
                let next = setup();
                *cell.borrow_mut() = Some(next);
            }));
        }
        self.put_slot(index, EffectSlot { deps, cleanup });
    }

    /// Read an external store without tearing.
    ///
    /// The store is subscribed at commit and re-subscribed when `key`
    /// changes. Each notification re-reads the snapshot synchronously and
    /// requests a render only if it differs from the last one seen.
    pub fn use_sync_external_store<T, K>(
        &mut self,
        key: K,
        store: impl FnOnce() -> ExternalStore<T>,
    ) -> T
    where
        T: Clone + PartialEq + 'static,
        K: PartialEq + 'static,
    {
        let (index, slot) = self.take_slot::<StoreSlot<T, K>>();
        let slot = match slot {
            Some(slot) if slot.key == key => {
                let snapshot = if self.component.server {
                    slot.store.server_snapshot()
                } else {
                    slot.store.snapshot()
                };
                *slot.last.borrow_mut() = snapshot;
                slot
            }
            previous => {
                let store = store();
                let snapshot = if self.component.server {
                    store.server_snapshot()
                } else {
                    store.snapshot()
                };
                let unsubscribe = match previous {
                    Some(previous) => previous.unsubscribe,
                    None => Rc::new(RefCell::new(None)),
                };
                let slot = StoreSlot {
                    key,
                    store,
                    last: Rc::new(RefCell::new(snapshot)),
                    unsubscribe,
                };
                self.commit.push(subscribe_step(self.component, &slot));
                slot
            }
        };
        let value = slot.last.borrow().clone();
        self.put_slot(index, slot);
        value
    }
}

fn subscribe_step<T, K>(component: &Rc<ComponentInner>, slot: &StoreSlot<T, K>) -> Box<dyn FnOnce()>
where
    T: PartialEq + 'static,
{
    let component = Rc::downgrade(component);
    let store = slot.store.clone();
    let last = slot.last.clone();
    let unsubscribe = slot.unsubscribe.clone();
    Box::new(move || {
        let previous = unsubscribe.borrow_mut().take();
        if let Some(previous) = previous {
            previous();
        }
        let get_snapshot = store.snapshot_fn();
        let notify = Rc::new(move || {
            let next = get_snapshot();
            let changed = *last.borrow() != next;
            if changed {
                *last.borrow_mut() = next;
                if let Some(component) = component.upgrade() {
                    component.request_render();
                }
            }
        });
        *unsubscribe.borrow_mut() = Some(store.subscribe(notify));
    })
}

/// Setter returned by [`Hooks::use_state`].
pub struct StateSetter<T> {
    value: Rc<RefCell<T>>,
    component: Weak<ComponentInner>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            component: self.component.clone(),
        }
    }
}

impl<T> StateSetter<T> {
    /// Store a new value and request a render. Ignored after unmount.
    pub fn set(&self, value: T) {
        let Some(component) = self.component.upgrade() else {
            return;
        };
        if !component.mounted.get() {
            return;
        }
        *self.value.borrow_mut() = value;
        component.request_render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_memo_is_stable_across_renders() {
        let component = Component::new("memo");
        let calls = Rc::new(Cell::new(0));
        let render = |hooks: &mut Hooks<'_>| {
            hooks.use_memo(|| {
                calls.set(calls.get() + 1);
                calls.get()
            })
        };

        assert_eq!(component.render(render), 1);
        assert_eq!(component.render(render), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_state_setter_requests_render() {
        let component = Component::new("state");
        let (value, set_value) = component.render(|hooks| hooks.use_state(|| 1));
        assert_eq!(value, 1);

        set_value.set(2);
        assert!(component.needs_render());
        let (value, _) = component.render(|hooks| hooks.use_state(|| 1));
        assert_eq!(value, 2);
        assert!(!component.needs_render());

        component.unmount();
        set_value.set(3);
        assert_eq!(component.render_requests(), 1);
    }

    #[test]
    fn test_effect_runs_on_dep_change_and_cleans_up() {
        let component = Component::new("effect");
        let log = Rc::new(RefCell::new(Vec::new()));
        let render = |dep: u32| {
            let log = log.clone();
            move |hooks: &mut Hooks<'_>| {
                hooks.use_effect(dep, move || {
                    log.borrow_mut().push(format!("setup {dep}"));
                    Box::new(move || log.borrow_mut().push(format!("cleanup {dep}")))
                })
            }
        };

        component.render(render(1));
        component.render(render(1));
        component.render(render(2));
        component.unmount();

        assert_eq!(
            *log.borrow(),
            vec!["setup 1", "cleanup 1", "setup 2", "cleanup 2"]
        );
    }

    #[test]
    fn test_server_render_skips_effects() {
        let component = Component::server("server");
        let ran = Rc::new(Cell::new(false));
        component.render(|hooks| {
            let ran = ran.clone();
            hooks.use_effect((), move || {
                ran.set(true);
                Box::new(|| {})
            })
        });
        assert!(!ran.get());
    }

    #[test]
    fn test_external_store_requests_render_only_on_change() {
        let value = Rc::new(Cell::new(0));
        let notify_slot: Rc<RefCell<Option<crate::Notify>>> = Rc::new(RefCell::new(None));
        let make_store = {
            let value = value.clone();
            let notify_slot = notify_slot.clone();
            move || {
                let notify_slot = notify_slot.clone();
                let value = value.clone();
                ExternalStore::new(
                    move |notify| {
                        *notify_slot.borrow_mut() = Some(notify);
                        let notify_slot = notify_slot.clone();
                        Box::new(move || *notify_slot.borrow_mut() = None) as Unsubscribe
                    },
                    move || value.get(),
                )
            }
        };

        let component = Component::new("store");
        let snapshot = component.render(|hooks| hooks.use_sync_external_store("k", make_store.clone()));
        assert_eq!(snapshot, 0);
        let notify = notify_slot.borrow().clone().unwrap();

        notify();
        assert_eq!(component.render_requests(), 0);
        value.set(1);
        notify();
        notify();
        assert_eq!(component.render_requests(), 1);

        let snapshot = component.render(|hooks| hooks.use_sync_external_store("k", make_store.clone()));
        assert_eq!(snapshot, 1);

        component.unmount();
        assert!(notify_slot.borrow().is_none());
    }
}
