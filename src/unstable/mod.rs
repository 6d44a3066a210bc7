//! Experimental signal shapes.
//!
//! These wrappers may change between minor releases.

mod async_computed;
mod computed_array;

pub use async_computed::{AsyncComputed, AsyncEffect};
pub use computed_array::ComputedArray;

use crate::computed::Computed;
use crate::handle::SignalRead;
use crate::signal::ReadOnlySignal;
use futures::task::LocalSpawn;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

/// Creates an async computed. See [`AsyncComputed`].
pub fn unstable_create_async_computed<T, F>(
    spawner: impl LocalSpawn + 'static,
    getter: impl Fn() -> F + 'static,
) -> AsyncComputed<T>
where
    T: Clone + 'static,
    F: Future<Output = T> + 'static,
{
    AsyncComputed::new(spawner, getter)
}

/// Creates an async effect and returns it; await [`AsyncEffect::settled`]
/// for the value its first body resolves to.
pub fn unstable_create_async_effect<T, F>(
    spawner: impl LocalSpawn + 'static,
    f: impl Fn() -> F + 'static,
) -> AsyncEffect<T>
where
    T: Clone + 'static,
    F: Future<Output = T> + 'static,
{
    AsyncEffect::new(spawner, f)
}

/// Creates an array derived item by item. See [`ComputedArray`].
pub fn unstable_create_computed_array<S, I, O, F, G>(source: S, get_getter: F) -> ComputedArray<O>
where
    S: SignalRead<Vec<I>> + 'static,
    I: Clone + PartialEq + 'static,
    O: Clone + PartialEq + 'static,
    F: Fn(ReadOnlySignal<I>, usize) -> G + 'static,
    G: Fn() -> O + 'static,
{
    ComputedArray::new(source, get_getter)
}

/// Creates a computed following a signal that holds a set.
///
/// Downstream observers are notified only when the membership changes.
pub fn unstable_create_computed_set<S, T>(source: S) -> Computed<HashSet<T>>
where
    S: SignalRead<HashSet<T>> + 'static,
    T: Eq + Hash + Clone + 'static,
{
    Computed::new(move || source.read())
}

/// Creates a computed that notifies downstream observers only when its
/// recomputed value differs structurally from the previous one.
///
/// Every [`Computed`] compares with `PartialEq`, which is already
/// structural, so this is [`Computed::new`] under the name callers of the
/// unstable surface look for.
pub fn unstable_create_equality_computed<T>(getter: impl Fn() -> T + 'static) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    Computed::new(getter)
}
