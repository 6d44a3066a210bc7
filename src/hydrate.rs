//! Hydrate a signal once with server-provided state.

use crate::handle::{SignalRead, SignalWrite};
use crate::storage::with_signal_storage;

/// Write `value` into `signal` the first time it is hydrated.
///
/// Every later call for the same signal is a no-op whatever the value, so a
/// component can pass server data on every render without clobbering client
/// writes made after the first one. The mark lives on the signal's slot and
/// goes away with it.
pub fn use_hydrate_signal<S, T>(signal: &S, value: T)
where
    S: SignalWrite<T>,
{
    let id = signal.signal_id();
    // Marked before writing: a re-entrant call from an effect the write
    // triggers must not hydrate again.
    let first = with_signal_storage(|storage| storage.mark_hydrated(id));
    if first {
        tracing::trace!(?id, "hydrating signal");
        signal.write(value);
    }
}

/// Whether `signal` has been hydrated.
pub fn is_hydrated<S, T>(signal: &S) -> bool
where
    S: SignalRead<T>,
{
    let id = signal.signal_id();
    with_signal_storage(|storage| storage.is_hydrated(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_computed, create_signal, create_signal_fn, Component, Effect, SignalFn};
    use crate::hooks::use_signal;

    #[test]
    fn test_first_hydration_wins() {
        let count = create_signal(0);
        use_hydrate_signal(&count, 1);
        use_hydrate_signal(&count, 2);
        use_hydrate_signal(&count, 3);
        assert_eq!(count.get(), 1);
        assert!(is_hydrated(&count));
    }

    #[test]
    fn test_client_writes_survive_rerenders() {
        let name = create_signal(String::new());
        let component = Component::new("profile");
        let render = |component: &Component| {
            component.render(|cx| {
                use_hydrate_signal(&name, "server".to_string());
                use_signal(cx, &name)
            })
        };

        let (value, set_name) = render(&component);
        assert_eq!(value, "server");
        set_name.set("client".to_string());
        let (value, _) = render(&component);
        assert_eq!(value, "client");
    }

    #[test]
    fn test_each_signal_hydrates_independently() {
        let a = create_signal(0);
        let b = create_signal_fn(0);
        use_hydrate_signal(&a, 1);
        assert!(!is_hydrated(&b));
        use_hydrate_signal(&b, 2);
        assert_eq!((a.get(), b.call()), (1, 2));
    }

    #[test]
    fn test_read_only_handles_report_hydration() {
        let count = create_signal(0);
        let doubled = create_computed(move || count.get() * 2);
        assert!(!is_hydrated(&count.read_only()));
        assert!(!is_hydrated(&doubled));

        use_hydrate_signal(&count, 4);
        assert!(is_hydrated(&count.read_only()));
        assert_eq!(doubled.get(), 8);
    }

    #[test]
    fn test_released_handle_leaves_no_hydration_mark() {
        let wrapped = SignalFn::from_fns(|| 0, |_| {});
        let id = wrapped.signal_id();
        use_hydrate_signal(&wrapped, 1);
        assert!(is_hydrated(&wrapped));

        drop(wrapped);
        with_signal_storage(|storage| {
            assert!(!storage.contains(id));
            assert!(!storage.is_hydrated(id));
        });
    }

    #[test]
    fn test_reentrant_hydration_keeps_first_value() {
        let count = create_signal(0);
        let _effect = Effect::new(move || {
            if count.get() == 1 {
                use_hydrate_signal(&count, 99);
            }
        });
        use_hydrate_signal(&count, 1);
        assert_eq!(count.get(), 1);
    }
}
