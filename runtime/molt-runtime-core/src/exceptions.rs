use molt_obj_model::MoltObject;

use crate::concurrency::PyToken;
use crate::state::PENDING_EXCEPTION;

/// Value a native entry point returns after recording an exception.
pub trait ExceptionSentinel {
    fn exception_sentinel() -> Self;
}

impl ExceptionSentinel for u64 {
    fn exception_sentinel() -> Self {
        MoltObject::none().bits()
    }
}

pub fn raise_exception<T: ExceptionSentinel>(py: &mut PyToken<'_>, kind: &str, message: &str) -> T {
    let message = py.heap().alloc_str(message);
    raise_exception_with_args(py, kind, vec![message])
}

/// Record `kind(*args)` as the pending exception of this thread. The new
/// exception owns `args`; a previously pending exception is released.
pub fn raise_exception_with_args<T: ExceptionSentinel>(
    py: &mut PyToken<'_>,
    kind: &str,
    args: Vec<MoltObject>,
) -> T {
    let mut heap = py.heap();
    let args = heap.alloc_tuple(args);
    let exc = heap.alloc_exception(kind, args);
    let previous = PENDING_EXCEPTION
        .try_with(|slot| slot.replace(Some(exc.bits())))
        .ok()
        .flatten();
    if let Some(bits) = previous {
        heap.dec_ref(MoltObject::from_bits(bits));
    }
    T::exception_sentinel()
}

pub fn exception_pending() -> bool {
    PENDING_EXCEPTION
        .try_with(|slot| slot.get().is_some())
        .unwrap_or(false)
}

/// Detach the pending exception; the caller owns the returned reference.
pub fn take_exception() -> Option<MoltObject> {
    PENDING_EXCEPTION
        .try_with(|slot| slot.take())
        .ok()
        .flatten()
        .map(MoltObject::from_bits)
}

pub fn clear_exception(py: &mut PyToken<'_>) {
    if let Some(exc) = take_exception() {
        py.heap().dec_ref(exc);
    }
}

pub fn exception_kind(py: &mut PyToken<'_>, exc: MoltObject) -> Option<String> {
    py.heap().exception(exc).ok().map(|(kind, _)| kind.to_owned())
}

#[no_mangle]
pub extern "C" fn molt_exception_pending() -> u64 {
    if exception_pending() {
        1
    } else {
        0
    }
}

#[no_mangle]
pub extern "C" fn molt_exception_clear() -> u64 {
    crate::with_gil_entry!(py, {
        clear_exception(py);
    });
    MoltObject::none().bits()
}

#[no_mangle]
pub extern "C" fn molt_exception_take() -> u64 {
    take_exception().unwrap_or_else(MoltObject::none).bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::with_gil;

    #[test]
    fn raise_records_kind_and_message() {
        with_gil(|mut py| {
            let sentinel: u64 = raise_exception(&mut py, "ValueError", "bad offset/length");
            assert_eq!(sentinel, MoltObject::none().bits());
            assert!(exception_pending());
            let exc = take_exception().expect("pending exception");
            assert!(!exception_pending());
            assert_eq!(exception_kind(&mut py, exc).as_deref(), Some("ValueError"));
            let mut heap = py.heap();
            let (_, args) = heap.exception(exc).unwrap();
            let args = heap.tuple(args).unwrap().to_vec();
            assert_eq!(heap.str_value(args[0]).unwrap(), "bad offset/length");
            heap.dec_ref(exc);
        });
    }

    #[test]
    fn second_raise_replaces_and_releases_first() {
        with_gil(|mut py| {
            let _: u64 = raise_exception(&mut py, "TypeError", "first");
            let live = py.heap().live_objects();
            let _: u64 = raise_exception(&mut py, "OSError", "second");
            // first exception, its args tuple and message are gone; three new
            // objects replace them.
            assert_eq!(py.heap().live_objects(), live);
            let exc = take_exception().unwrap();
            assert_eq!(exception_kind(&mut py, exc).as_deref(), Some("OSError"));
            py.heap().dec_ref(exc);
        });
    }

    #[test]
    fn clear_exception_is_idempotent() {
        with_gil(|mut py| {
            let _: u64 = raise_exception(&mut py, "LookupError", "missing");
            clear_exception(&mut py);
            clear_exception(&mut py);
            assert!(!exception_pending());
        });
        assert_eq!(molt_exception_pending(), 0);
    }
}
