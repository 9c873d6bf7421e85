pub mod gil;

pub use gil::{gil_assert, gil_held, with_gil, BlockingSection, GilGuard, HeapGuard, PyToken};

/// Enter the runtime from a C ABI export: take the GIL for the duration of
/// `$body` and bind `$py` to a `&mut PyToken`.
#[macro_export]
macro_rules! with_gil_entry {
    ($py:ident, $body:block) => {{
        let _gil_guard = $crate::concurrency::GilGuard::new();
        let mut $py = _gil_guard.token();
        let $py = &mut $py;
        $body
    }};
}
