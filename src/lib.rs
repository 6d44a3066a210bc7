//! # GPUI Signal Bridge
//!
//! Reactive signals bound to component lifecycles.
//!
//! ## Features
//!
//! - **Copy-able handles**: `Signal`, `Computed`, `Effect` and `EffectScope` are `Copy`
//! - **Automatic tracking**: effects and computeds re-run when a signal they read changes
//! - **Tear-free hooks**: components read signals through a subscribe/snapshot bridge
//! - **Lifecycle-bound effects**: effects and scopes stop when their component unmounts
//! - **Persistence and hydration**: signals seeded from a key-value store or from server state
//! - **GPUI integration** (feature `gpui`): entities re-render when the signals they read change
//!
//! ## Example
//!
//! ```rust,no_run
//! use gpui_signal_bridge::prelude::*;
//!
//! let count = create_signal(0);
//! let counter = Component::new("counter");
//!
//! let (value, set_count) = counter.render(|cx| use_signal(cx, &count));
//! assert_eq!(value, 0);
//!
//! set_count.update(|n| n + 1);
//! assert!(counter.needs_render());
//! assert_eq!(counter.render(|cx| use_signal_value(cx, &count)), 1);
//! ```

mod bridge;
mod computed;
#[cfg(feature = "gpui")]
mod context;
pub mod devtools;
mod effect;
mod handle;
mod hooks;
mod host;
mod hydrate;
mod persist;
mod signal;
mod storage;
pub mod unstable;

pub use bridge::{signal_store, ExternalStore, Notify, SetSignal, SetValue, Unsubscribe};
pub use computed::{create_computed, Computed};
#[cfg(feature = "gpui")]
pub use context::SignalContext;
pub use devtools::mount_store_devtool;
pub use effect::{create_effect, create_signal_scope, Effect, EffectScope};
pub use handle::{create_signal_fn, SignalFn, SignalRead, SignalWrite};
pub use hooks::{
    unstable_use_async_computed_value, unstable_use_async_effect, use_set_signal, use_signal,
    use_signal_effect, use_signal_scope, use_signal_value, AsyncEffectFn, EffectFn,
};
pub use host::{Cleanup, Component, Hooks, StateSetter};
pub use hydrate::{is_hydrated, use_hydrate_signal};
pub use persist::{
    create_signal_storage, create_signal_storage_in, default_store, set_default_store, FileStore,
    KeyValueStore, MemoryStore, StoreError,
};
pub use signal::{create_signal, ReadOnlySignal, Signal};
pub use storage::{untracked, SignalId};

// Re-export the prelude
pub mod prelude {
    #[cfg(feature = "gpui")]
    pub use crate::SignalContext;
    pub use crate::{
        create_computed, create_effect, create_signal, create_signal_fn, create_signal_scope,
        create_signal_storage, default_store, untracked, use_hydrate_signal, use_set_signal,
        use_signal, use_signal_effect, use_signal_scope, use_signal_value, Component, Computed,
        Effect, EffectScope, KeyValueStore, ReadOnlySignal, SetSignal, SetValue, Signal, SignalFn,
        SignalRead, SignalWrite,
    };
}
