use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use molt_obj_model::Heap;

use crate::metrics::{profile_hit, ProfileCounter};
use crate::state::{runtime_state, BLOCKING_DEPTH, GIL_DEPTH};

fn molt_gil() -> &'static Mutex<()> {
    &runtime_state().gil
}

fn lock_gil() -> MutexGuard<'static, ()> {
    // A panic while holding the GIL poisons it; the lock guards no data.
    molt_gil().lock().unwrap_or_else(PoisonError::into_inner)
}

fn trace_gil_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| matches!(std::env::var("MOLT_TRACE_GIL").ok().as_deref(), Some("1")))
}

pub struct GilGuard {
    _marker: (),
}

/// Proof that the current thread holds the GIL.
///
/// Heap access goes through `&mut PyToken`, as does opening a
/// [`BlockingSection`], so no heap borrow can be alive while the GIL is
/// released.
pub struct PyToken<'gil> {
    _guard: &'gil GilGuard,
}

impl GilGuard {
    pub fn new() -> Self {
        let needs_lock = match GIL_DEPTH.try_with(|depth| {
            let current = depth.get();
            depth.set(current + 1);
            current == 0
        }) {
            Ok(needs_lock) => needs_lock,
            Err(_) => return Self { _marker: () },
        };
        if needs_lock {
            let guard = lock_gil();
            let stored = GIL_GUARD
                .try_with(|slot| {
                    *slot.borrow_mut() = Some(guard);
                })
                .is_ok();
            if !stored {
                let _ = GIL_DEPTH.try_with(|depth| {
                    let current = depth.get();
                    depth.set(current.saturating_sub(1));
                });
            }
        }
        Self { _marker: () }
    }

    pub fn token(&self) -> PyToken<'_> {
        PyToken { _guard: self }
    }
}

impl Default for GilGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GilGuard {
    fn drop(&mut self) {
        let should_release = match GIL_DEPTH.try_with(|depth| {
            let current = depth.get();
            let next = current.saturating_sub(1);
            depth.set(next);
            next == 0
        }) {
            Ok(should_release) => should_release,
            Err(_) => return,
        };
        if should_release {
            let _ = GIL_GUARD.try_with(|slot| {
                let _ = slot.borrow_mut().take();
            });
        }
    }
}

impl<'gil> PyToken<'gil> {
    /// Lock the object heap. The guard borrows the token mutably, so a second
    /// guard on the same thread is rejected at compile time.
    pub fn heap(&mut self) -> HeapGuard<'_> {
        gil_assert();
        HeapGuard {
            guard: runtime_state()
                .heap
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            _token: PhantomData,
        }
    }

    /// Run `f` with the GIL released.
    pub fn allow_threads<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _section = BlockingSection::enter(self);
        f()
    }
}

pub struct HeapGuard<'a> {
    guard: MutexGuard<'static, Heap>,
    _token: PhantomData<&'a mut ()>,
}

impl Deref for HeapGuard<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        &self.guard
    }
}

impl DerefMut for HeapGuard<'_> {
    fn deref_mut(&mut self) -> &mut Heap {
        &mut self.guard
    }
}

struct GilReleaseGuard {
    depth: usize,
}

impl GilReleaseGuard {
    fn new() -> Self {
        let depth = match GIL_DEPTH.try_with(|d| d.get()) {
            Ok(depth) => depth,
            Err(_) => return Self { depth: 0 },
        };
        if depth == 0 {
            return Self { depth: 0 };
        }
        if GIL_DEPTH.try_with(|d| d.set(0)).is_err() {
            return Self { depth: 0 };
        }
        let _ = GIL_GUARD.try_with(|slot| {
            let _ = slot.borrow_mut().take();
        });
        Self { depth }
    }
}

impl Drop for GilReleaseGuard {
    fn drop(&mut self) {
        if self.depth == 0 {
            return;
        }
        let guard = lock_gil();
        let stored = GIL_GUARD
            .try_with(|slot| {
                *slot.borrow_mut() = Some(guard);
            })
            .is_ok();
        if stored {
            let _ = GIL_DEPTH.try_with(|d| d.set(self.depth));
        }
    }
}

/// The window in which the GIL is released around a native call.
///
/// Entering saves the thread's GIL depth and unlocks; dropping relocks and
/// restores the depth, including during unwinding. Entering without the GIL
/// is a no-op.
pub struct BlockingSection<'a> {
    release: GilReleaseGuard,
    _token: PhantomData<&'a mut ()>,
}

impl<'a> BlockingSection<'a> {
    pub fn enter<'gil>(py: &'a mut PyToken<'gil>) -> Self {
        let _ = py;
        let nested = BLOCKING_DEPTH.try_with(|d| d.get() > 0).unwrap_or(false);
        debug_assert!(!nested, "blocking sections must not nest");
        let release = GilReleaseGuard::new();
        if release.depth > 0 {
            let _ = BLOCKING_DEPTH.try_with(|d| d.set(d.get() + 1));
            profile_hit(ProfileCounter::BlockingSections);
            if trace_gil_enabled() {
                eprintln!("molt gil: enter blocking section depth={}", release.depth);
            }
        }
        Self {
            release,
            _token: PhantomData,
        }
    }

    pub fn released(&self) -> bool {
        self.release.depth > 0
    }
}

impl Drop for BlockingSection<'_> {
    fn drop(&mut self) {
        if self.release.depth == 0 {
            return;
        }
        let _ = BLOCKING_DEPTH.try_with(|d| d.set(d.get().saturating_sub(1)));
        if trace_gil_enabled() {
            eprintln!("molt gil: leave blocking section depth={}", self.release.depth);
        }
        // `release` reacquires the GIL when it is dropped after this.
    }
}

pub fn gil_held() -> bool {
    GIL_DEPTH.try_with(|depth| depth.get() > 0).unwrap_or(false)
}

thread_local! {
    static GIL_GUARD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

#[cfg(feature = "molt_debug_gil")]
pub fn gil_assert() {
    assert!(gil_held(), "GIL required for runtime mutation");
}

#[cfg(not(feature = "molt_debug_gil"))]
pub fn gil_assert() {
    debug_assert!(gil_held(), "GIL required for runtime mutation");
}

pub fn with_gil<F, R>(f: F) -> R
where
    F: for<'gil> FnOnce(PyToken<'gil>) -> R,
{
    let guard = GilGuard::new();
    let token = guard.token();
    f(token)
}

#[cfg(test)]
mod tests {
    use super::{gil_held, with_gil, BlockingSection, GilGuard};
    use crate::state::GIL_DEPTH;

    fn depth() -> usize {
        GIL_DEPTH.with(|depth| depth.get())
    }

    #[test]
    fn gil_depth_tracks_nesting() {
        let start = depth();
        assert_eq!(gil_held(), start > 0);

        {
            let _g1 = GilGuard::new();
            assert_eq!(depth(), start + 1);
            assert!(gil_held());
            {
                let _g2 = GilGuard::new();
                assert_eq!(depth(), start + 2);
                assert!(gil_held());
            }
            assert_eq!(depth(), start + 1);
        }

        assert_eq!(depth(), start);
        assert_eq!(gil_held(), start > 0);
    }

    #[test]
    fn blocking_section_restores_depth() {
        let outer = GilGuard::new();
        let inner = GilGuard::new();
        let mut py = inner.token();
        {
            let section = BlockingSection::enter(&mut py);
            assert!(section.released());
            assert!(!gil_held());
            assert_eq!(depth(), 0);
        }
        assert_eq!(depth(), 2);
        drop(py);
        drop(inner);
        drop(outer);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn allow_threads_releases_for_the_closure() {
        with_gil(|mut py| {
            let held_inside = py.allow_threads(gil_held);
            assert!(!held_inside);
            assert!(gil_held());
        });
    }

    #[test]
    fn blocking_section_restores_depth_on_panic() {
        with_gil(|mut py| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                py.allow_threads(|| panic!("native call failed"));
            }));
            assert!(result.is_err());
            assert!(gil_held());
            assert_eq!(depth(), 1);
        });
    }

    #[test]
    fn heap_is_reachable_through_token() {
        with_gil(|mut py| {
            let obj = py.heap().alloc_bytes(b"abc");
            let mut heap = py.heap();
            assert_eq!(heap.bytes(obj).unwrap(), b"abc");
            heap.dec_ref(obj);
        });
    }
}
