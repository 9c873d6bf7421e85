//! Runtime state shared by Molt's native binding crates: the GIL and its
//! blocking sections, the object heap, per-thread pending exceptions and the
//! env-gated profile counters.

pub mod concurrency;
pub mod exceptions;
pub mod metrics;
pub mod state;

pub use concurrency::{
    gil_assert, gil_held, with_gil, BlockingSection, GilGuard, HeapGuard, PyToken,
};
pub use exceptions::{
    clear_exception, exception_kind, exception_pending, raise_exception,
    raise_exception_with_args, take_exception, ExceptionSentinel,
};
pub use metrics::{profile_enabled, profile_snapshot, ProfileCounter, ProfileSnapshot};
pub use molt_obj_model::{Heap, MoltObject};
