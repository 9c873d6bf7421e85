use std::cell::Cell;
use std::sync::{Mutex, OnceLock};

use molt_obj_model::Heap;

pub struct RuntimeState {
    pub(crate) gil: Mutex<()>,
    pub(crate) heap: Mutex<Heap>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            gil: Mutex::new(()),
            heap: Mutex::new(Heap::new()),
        }
    }
}

static RUNTIME_STATE: OnceLock<RuntimeState> = OnceLock::new();

pub fn runtime_state() -> &'static RuntimeState {
    RUNTIME_STATE.get_or_init(RuntimeState::new)
}

thread_local! {
    pub(crate) static GIL_DEPTH: Cell<usize> = const { Cell::new(0) };
    pub(crate) static BLOCKING_DEPTH: Cell<usize> = const { Cell::new(0) };
    pub(crate) static PENDING_EXCEPTION: Cell<Option<u64>> = const { Cell::new(None) };
}

#[no_mangle]
pub extern "C" fn molt_runtime_init() -> u64 {
    let _ = runtime_state();
    1
}
