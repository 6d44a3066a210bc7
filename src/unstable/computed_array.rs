//! Per-item derived arrays.

use crate::computed::Computed;
use crate::effect::{Effect, EffectScope};
use crate::handle::SignalRead;
use crate::signal::{ReadOnlySignal, Signal};
use crate::storage::{untracked, SignalId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An array derived item by item from a signal holding a `Vec`.
///
/// Each source element gets its own signal and its own computed. When the
/// source changes, only the items whose element changed are recomputed;
/// items are created and disposed as the source grows and shrinks.
///
/// Item writes made while syncing with the source reach observers together,
/// so an effect reading the array never sees it half updated.
///
/// Like [`Computed`], the array belongs to the effect or scope that was
/// running when it was created and stops along with it.
pub struct ComputedArray<O> {
    inner: Rc<ComputedArrayInner<O>>,
}

struct ComputedArrayInner<O> {
    len: Signal<usize>,
    items: RefCell<Vec<Computed<O>>>,
    scope: EffectScope,
    release: Box<dyn Fn()>,
}

impl<O> Clone for ComputedArray<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O: Clone + PartialEq + 'static> ComputedArray<O> {
    /// Derive an array from `source`.
    ///
    /// `get_getter` is called once per index with that index's item signal
    /// and returns the getter of the index's computed.
    pub fn new<S, I, F, G>(source: S, get_getter: F) -> Self
    where
        S: SignalRead<Vec<I>> + 'static,
        I: Clone + PartialEq + 'static,
        F: Fn(ReadOnlySignal<I>, usize) -> G + 'static,
        G: Fn() -> O + 'static,
    {
        let scope = EffectScope::new();
        let inputs: Rc<RefCell<Vec<Signal<I>>>> = Rc::default();
        let release = {
            let inputs = inputs.clone();
            Box::new(move || {
                for input in inputs.borrow_mut().drain(..) {
                    input.dispose();
                }
            }) as Box<dyn Fn()>
        };
        let inner = Rc::new(ComputedArrayInner {
            len: Signal::new(0),
            items: RefCell::new(Vec::new()),
            scope,
            release,
        });
        scope.run({
            let inner = inner.clone();
            move || {
                Effect::new(move || {
                    let values = source.read();
                    sync_items(&inner, &inputs, &values, &get_getter);
                });
            }
        });
        Self { inner }
    }
}

fn sync_items<I, O, F, G>(
    inner: &ComputedArrayInner<O>,
    inputs: &RefCell<Vec<Signal<I>>>,
    values: &[I],
    get_getter: &F,
) where
    I: Clone + PartialEq + 'static,
    O: Clone + PartialEq + 'static,
    F: Fn(ReadOnlySignal<I>, usize) -> G,
    G: Fn() -> O + 'static,
{
    let existing = inputs.borrow().clone();
    for (input, value) in existing.iter().zip(values) {
        input.set(value.clone());
    }

    for (index, value) in values.iter().enumerate().skip(existing.len()) {
        let input = Signal::new(value.clone());
        let getter = get_getter(input.read_only(), index);
        let Some(item) = inner.scope.run(|| Computed::new(getter)) else {
            input.dispose();
            return;
        };
        inputs.borrow_mut().push(input);
        inner.items.borrow_mut().push(item);
    }

    if values.len() < existing.len() {
        let removed_items = inner.items.borrow_mut().split_off(values.len());
        let removed_inputs = inputs.borrow_mut().split_off(values.len());
        for item in removed_items {
            item.dispose();
        }
        for input in removed_inputs {
            input.dispose();
        }
    }

    inner.len.set(values.len());
}

impl<O: Clone + 'static> ComputedArray<O> {
    /// Number of items. Tracked.
    pub fn len(&self) -> usize {
        self.inner.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The derived value at `index`. Tracks the item and the length.
    pub fn get(&self, index: usize) -> Option<O> {
        if index >= self.len() {
            return None;
        }
        let item = self.inner.items.borrow().get(index).copied();
        item.map(|item| item.get())
    }

    /// Every derived value. Tracks all items and the length.
    pub fn to_vec(&self) -> Vec<O> {
        self.len();
        let items = self.inner.items.borrow().clone();
        items.iter().map(Computed::get).collect()
    }

    /// Stop following the source and release every item.
    pub fn stop(&self) {
        self.inner.scope.stop();
        for item in self.inner.items.borrow_mut().drain(..) {
            item.dispose();
        }
        (self.inner.release)();
        self.inner.len.set(0);
    }

    pub fn is_active(&self) -> bool {
        self.inner.scope.is_active()
    }
}

impl<O: Clone + 'static> SignalRead<Vec<O>> for ComputedArray<O> {
    fn read(&self) -> Vec<O> {
        self.to_vec()
    }

    fn read_untracked(&self) -> Vec<O> {
        untracked(|| self.to_vec())
    }

    fn signal_id(&self) -> SignalId {
        self.inner.len.id()
    }
}

impl<O: Clone + fmt::Debug + 'static> fmt::Debug for ComputedArray<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.read_untracked()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn doubled(source: Signal<Vec<i32>>, calls: Rc<Cell<usize>>) -> ComputedArray<i32> {
        ComputedArray::new(source, move |item: ReadOnlySignal<i32>, _index| {
            let calls = calls.clone();
            move || {
                calls.set(calls.get() + 1);
                item.get() * 2
            }
        })
    }

    #[test]
    fn test_items_follow_source() {
        let source = Signal::new(vec![1, 2, 3]);
        let array = doubled(source, Rc::default());

        assert_eq!(array.to_vec(), vec![2, 4, 6]);
        assert_eq!(array.get(1), Some(4));
        assert_eq!(array.get(3), None);

        source.set(vec![1, 5, 3, 4]);
        assert_eq!(array.to_vec(), vec![2, 10, 6, 8]);

        source.set(vec![7]);
        assert_eq!(array.len(), 1);
        assert_eq!(array.to_vec(), vec![14]);
    }

    #[test]
    fn test_only_changed_items_recompute() {
        let source = Signal::new(vec![1, 2, 3]);
        let calls = Rc::new(Cell::new(0));
        let array = doubled(source, calls.clone());
        assert_eq!(calls.get(), 3);

        source.set(vec![1, 9, 3]);
        assert_eq!(array.to_vec(), vec![2, 18, 6]);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_observer_sees_whole_array_update_at_once() {
        let source = Signal::new(vec![1, 2, 3]);
        let array = doubled(source, Rc::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _effect = Effect::new({
            let array = array.clone();
            let seen = seen.clone();
            move || seen.borrow_mut().push(array.to_vec())
        });

        source.set(vec![4, 5, 6]);
        source.set(vec![4, 5]);
        assert_eq!(
            *seen.borrow(),
            vec![vec![2, 4, 6], vec![8, 10, 12], vec![8, 10]]
        );
    }

    #[test]
    fn test_index_is_passed_to_getter_factory() {
        let source = Signal::new(vec!["a".to_string(), "b".to_string()]);
        let array = ComputedArray::new(source, |item: ReadOnlySignal<String>, index| {
            move || format!("{index}:{}", item.get())
        });
        assert_eq!(array.to_vec(), vec!["0:a", "1:b"]);
    }

    #[test]
    fn test_effect_reading_array_reruns_on_change() {
        let source = Signal::new(vec![1, 2]);
        let array = doubled(source, Rc::default());
        let sums = Rc::new(RefCell::new(Vec::new()));
        let _effect = Effect::new({
            let array = array.clone();
            let sums = sums.clone();
            move || sums.borrow_mut().push(array.to_vec().iter().sum::<i32>())
        });

        source.set(vec![1, 2, 3]);
        source.set(vec![1]);
        assert_eq!(sums.borrow().last().copied(), Some(2));
        assert_eq!(sums.borrow().first().copied(), Some(6));
    }

    #[test]
    fn test_stop_releases_items() {
        let source = Signal::new(vec![1, 2]);
        let array = doubled(source, Rc::default());
        array.stop();

        assert!(!array.is_active());
        source.set(vec![3, 4, 5]);
        assert_eq!(array.len(), 0);
        assert!(array.to_vec().is_empty());
    }
}
