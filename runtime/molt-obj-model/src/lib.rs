//! Core object representation for Molt.
//! Uses NaN-boxing to represent primitives and heap handles in 64 bits.
//!
//! Heap values never carry a raw address: the payload of a `MoltObject` with
//! the handle tag is a generational handle into a [`Heap`], so the heap is
//! free to move object storage between uses.

mod heap;

pub use heap::{Heap, HeapError, HeapObject, TypeTag};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MoltObject(u64);

const QNAN: u64 = 0x7ff8_0000_0000_0000;
const TAG_INT: u64 = 0x0001_0000_0000_0000;
const TAG_BOOL: u64 = 0x0002_0000_0000_0000;
const TAG_NONE: u64 = 0x0003_0000_0000_0000;
const TAG_HANDLE: u64 = 0x0004_0000_0000_0000;
const TAG_MASK: u64 = 0x0007_0000_0000_0000;
pub(crate) const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const INT_SIGN_BIT: u64 = 1 << 46;
const INT_WIDTH: u64 = 47;
const INT_MASK: u64 = (1u64 << INT_WIDTH) - 1;

pub const INT_MIN: i64 = -(1i64 << (INT_WIDTH - 1));
pub const INT_MAX: i64 = (1i64 << (INT_WIDTH - 1)) - 1;

impl MoltObject {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn from_float(f: f64) -> Self {
        // Canonicalize NaN so a float never aliases a tagged payload.
        if f.is_nan() {
            return Self(f64::NAN.to_bits() & !TAG_MASK);
        }
        Self(f.to_bits())
    }

    /// Box an int, truncating to the 47-bit payload. Use [`MoltObject::try_from_int`]
    /// when the value comes from native code.
    pub fn from_int(i: i64) -> Self {
        let val = (i as u64) & INT_MASK;
        Self(QNAN | TAG_INT | val)
    }

    pub fn try_from_int(i: i64) -> Option<Self> {
        if (INT_MIN..=INT_MAX).contains(&i) {
            Some(Self::from_int(i))
        } else {
            None
        }
    }

    pub fn from_bool(b: bool) -> Self {
        Self(QNAN | TAG_BOOL | u64::from(b))
    }

    pub fn none() -> Self {
        Self(QNAN | TAG_NONE)
    }

    pub(crate) fn from_handle(handle: u64) -> Self {
        debug_assert!(handle != 0 && handle <= PAYLOAD_MASK);
        Self(QNAN | TAG_HANDLE | (handle & PAYLOAD_MASK))
    }

    pub fn is_float(&self) -> bool {
        (self.0 & QNAN) != QNAN || (self.0 & TAG_MASK) == 0
    }

    pub fn as_float(&self) -> Option<f64> {
        if self.is_float() {
            Some(f64::from_bits(self.0))
        } else {
            None
        }
    }

    pub fn is_int(&self) -> bool {
        (self.0 & (QNAN | TAG_MASK)) == (QNAN | TAG_INT)
    }

    pub fn as_int(&self) -> Option<i64> {
        if !self.is_int() {
            return None;
        }
        let val = self.0 & INT_MASK;
        if (val & INT_SIGN_BIT) != 0 {
            Some((val as i64) - ((1u64 << INT_WIDTH) as i64))
        } else {
            Some(val as i64)
        }
    }

    pub fn is_bool(&self) -> bool {
        (self.0 & (QNAN | TAG_MASK)) == (QNAN | TAG_BOOL)
    }

    pub fn as_bool(&self) -> Option<bool> {
        if self.is_bool() {
            Some((self.0 & 0x1) == 1)
        } else {
            None
        }
    }

    pub fn is_none(&self) -> bool {
        (self.0 & (QNAN | TAG_MASK)) == (QNAN | TAG_NONE)
    }

    pub fn is_handle(&self) -> bool {
        (self.0 & (QNAN | TAG_MASK)) == (QNAN | TAG_HANDLE)
    }

    pub fn as_handle(&self) -> Option<u64> {
        if self.is_handle() {
            Some(self.0 & PAYLOAD_MASK)
        } else {
            None
        }
    }

    /// Short type label used in runtime error messages for immediates.
    pub fn immediate_type_name(&self) -> Option<&'static str> {
        if self.is_int() {
            Some("int")
        } else if self.is_bool() {
            Some("bool")
        } else if self.is_none() {
            Some("NoneType")
        } else if self.is_float() {
            Some("float")
        } else {
            None
        }
    }
}
