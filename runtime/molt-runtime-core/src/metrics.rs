use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::OnceLock;

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();

static BLOCKING_SECTION_COUNT: AtomicU64 = AtomicU64::new(0);
static NATIVE_WRITE_COUNT: AtomicU64 = AtomicU64::new(0);
static ABSORBED_WOULD_BLOCK_COUNT: AtomicU64 = AtomicU64::new(0);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProfileCounter {
    BlockingSections,
    NativeWrites,
    AbsorbedWouldBlock,
}

impl ProfileCounter {
    fn cell(self) -> &'static AtomicU64 {
        match self {
            ProfileCounter::BlockingSections => &BLOCKING_SECTION_COUNT,
            ProfileCounter::NativeWrites => &NATIVE_WRITE_COUNT,
            ProfileCounter::AbsorbedWouldBlock => &ABSORBED_WOULD_BLOCK_COUNT,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub blocking_sections: u64,
    pub native_writes: u64,
    pub absorbed_would_block: u64,
}

/// `MOLT_PROFILE` is read once; counters only move when it is set.
pub fn profile_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| {
        std::env::var("MOLT_PROFILE")
            .map(|val| !val.is_empty() && val != "0")
            .unwrap_or(false)
    })
}

// Counters are bumped from inside blocking sections too, so none of this
// needs the GIL.
pub fn profile_hit(counter: ProfileCounter) {
    if profile_enabled() {
        bump(counter);
    }
}

fn bump(counter: ProfileCounter) {
    counter.cell().fetch_add(1, AtomicOrdering::Relaxed);
}

pub fn profile_snapshot() -> ProfileSnapshot {
    ProfileSnapshot {
        blocking_sections: BLOCKING_SECTION_COUNT.load(AtomicOrdering::Relaxed),
        native_writes: NATIVE_WRITE_COUNT.load(AtomicOrdering::Relaxed),
        absorbed_would_block: ABSORBED_WOULD_BLOCK_COUNT.load(AtomicOrdering::Relaxed),
    }
}

#[no_mangle]
pub extern "C" fn molt_profile_enabled() -> u64 {
    u64::from(profile_enabled())
}
