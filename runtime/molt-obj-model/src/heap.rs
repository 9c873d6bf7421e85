use std::ffi::CStr;
use std::fmt;

use crate::{MoltObject, PAYLOAD_MASK};

const HANDLE_GEN_BITS: u64 = 16;
const HANDLE_INDEX_BITS: u64 = 48 - HANDLE_GEN_BITS;
const HANDLE_INDEX_MASK: u64 = (1u64 << HANDLE_INDEX_BITS) - 1;
const HANDLE_GEN_MASK: u64 = (1u64 << HANDLE_GEN_BITS) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Str,
    Bytes,
    Tuple,
    Exception,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Str => "str",
            TypeTag::Bytes => "bytes",
            TypeTag::Tuple => "tuple",
            TypeTag::Exception => "BaseException",
        }
    }
}

/// Heap payloads. Strings are stored with a trailing NUL so native code can
/// borrow them in place.
#[derive(Debug)]
pub enum HeapObject {
    Str(Box<[u8]>),
    Bytes(Vec<u8>),
    Tuple(Vec<MoltObject>),
    Exception { kind: String, args: MoltObject },
}

impl HeapObject {
    pub fn tag(&self) -> TypeTag {
        match self {
            HeapObject::Str(_) => TypeTag::Str,
            HeapObject::Bytes(_) => TypeTag::Bytes,
            HeapObject::Tuple(_) => TypeTag::Tuple,
            HeapObject::Exception { .. } => TypeTag::Exception,
        }
    }

    fn relocate(&mut self) {
        // The new allocation exists before the old one is dropped, so the
        // payload address always changes.
        match self {
            HeapObject::Str(data) => *data = data.to_vec().into_boxed_slice(),
            HeapObject::Bytes(data) => *data = data.as_slice().to_vec(),
            HeapObject::Tuple(items) => *items = items.as_slice().to_vec(),
            HeapObject::Exception { kind, .. } => *kind = kind.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// The value is an immediate, not a heap handle.
    NotAHandle(&'static str),
    /// The handle was released (or never issued by this heap).
    StaleHandle,
    TypeMismatch { expected: TypeTag, got: &'static str },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::NotAHandle(got) => write!(f, "expected a heap object, got {got}"),
            HeapError::StaleHandle => write!(f, "stale object handle"),
            HeapError::TypeMismatch { expected, got } => {
                write!(f, "expected {}, got {}", expected.name(), got)
            }
        }
    }
}

impl std::error::Error for HeapError {}

struct HeapSlot {
    object: Option<HeapObject>,
    refcount: u32,
    generation: u16,
}

/// Handle-addressed object store.
///
/// Callers hold `MoltObject`s, never payload addresses. Any borrow handed out
/// by the accessors below is invalidated by [`Heap::relocate`], which the
/// borrow checker enforces through `&mut self`.
pub struct Heap {
    slots: Vec<HeapSlot>,
    free: Vec<u32>,
    live: usize,
    relocations: u64,
}

fn encode_handle(index: u32, generation: u16) -> u64 {
    ((generation as u64) << HANDLE_INDEX_BITS) | (index as u64)
}

fn decode_handle(handle: u64) -> Option<(u32, u16)> {
    if handle == 0 || handle > PAYLOAD_MASK {
        return None;
    }
    let index = (handle & HANDLE_INDEX_MASK) as u32;
    let generation = ((handle >> HANDLE_INDEX_BITS) & HANDLE_GEN_MASK) as u16;
    if generation == 0 {
        return None;
    }
    Some((index, generation))
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            relocations: 0,
        }
    }

    /// Store `object` with a refcount of one. Handles inside tuples and
    /// exceptions are owned by the new object from here on.
    pub fn alloc(&mut self, object: HeapObject) -> MoltObject {
        let (index, generation) = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.refcount = 1;
            (index, slot.generation)
        } else {
            let index = self.slots.len();
            // Running out of handles is fatal, like running out of memory.
            assert!(index as u64 <= HANDLE_INDEX_MASK, "heap handle space exhausted");
            let index = index as u32;
            self.slots.push(HeapSlot {
                object: Some(object),
                refcount: 1,
                generation: 1,
            });
            (index, 1)
        };
        self.live += 1;
        MoltObject::from_handle(encode_handle(index, generation))
    }

    pub fn alloc_str(&mut self, text: &str) -> MoltObject {
        self.alloc_str_bytes(text.as_bytes())
    }

    /// Strings coming from native code are not guaranteed to be UTF-8.
    pub fn alloc_str_lossy(&mut self, raw: &[u8]) -> MoltObject {
        let text = String::from_utf8_lossy(raw);
        self.alloc_str_bytes(text.as_bytes())
    }

    fn alloc_str_bytes(&mut self, raw: &[u8]) -> MoltObject {
        let mut data = Vec::with_capacity(raw.len() + 1);
        data.extend_from_slice(raw);
        data.push(0);
        self.alloc(HeapObject::Str(data.into_boxed_slice()))
    }

    pub fn alloc_bytes(&mut self, data: &[u8]) -> MoltObject {
        self.alloc(HeapObject::Bytes(data.to_vec()))
    }

    pub fn alloc_tuple(&mut self, items: Vec<MoltObject>) -> MoltObject {
        self.alloc(HeapObject::Tuple(items))
    }

    pub fn alloc_exception(&mut self, kind: &str, args: MoltObject) -> MoltObject {
        self.alloc(HeapObject::Exception {
            kind: kind.to_owned(),
            args,
        })
    }

    fn slot(&self, obj: MoltObject) -> Result<&HeapSlot, HeapError> {
        let handle = obj.as_handle().ok_or_else(|| {
            HeapError::NotAHandle(obj.immediate_type_name().unwrap_or("object"))
        })?;
        let (index, generation) = decode_handle(handle).ok_or(HeapError::StaleHandle)?;
        let slot = self.slots.get(index as usize).ok_or(HeapError::StaleHandle)?;
        if slot.generation != generation || slot.object.is_none() {
            return Err(HeapError::StaleHandle);
        }
        Ok(slot)
    }

    fn slot_mut(&mut self, obj: MoltObject) -> Result<&mut HeapSlot, HeapError> {
        self.slot(obj)?;
        let (index, _) = obj
            .as_handle()
            .and_then(decode_handle)
            .ok_or(HeapError::StaleHandle)?;
        Ok(&mut self.slots[index as usize])
    }

    pub fn get(&self, obj: MoltObject) -> Result<&HeapObject, HeapError> {
        self.slot(obj)?.object.as_ref().ok_or(HeapError::StaleHandle)
    }

    pub fn contains(&self, obj: MoltObject) -> bool {
        self.slot(obj).is_ok()
    }

    pub fn type_name(&self, obj: MoltObject) -> &'static str {
        if let Some(name) = obj.immediate_type_name() {
            return name;
        }
        match self.get(obj) {
            Ok(object) => object.tag().name(),
            Err(_) => "object",
        }
    }

    fn mismatch(&self, obj: MoltObject, expected: TypeTag) -> HeapError {
        match self.get(obj) {
            Err(HeapError::StaleHandle) => HeapError::StaleHandle,
            _ => HeapError::TypeMismatch {
                expected,
                got: self.type_name(obj),
            },
        }
    }

    /// String contents, without the trailing NUL.
    pub fn str_bytes(&self, obj: MoltObject) -> Result<&[u8], HeapError> {
        match self.get(obj) {
            Ok(HeapObject::Str(data)) => Ok(&data[..data.len() - 1]),
            _ => Err(self.mismatch(obj, TypeTag::Str)),
        }
    }

    pub fn str_value(&self, obj: MoltObject) -> Result<&str, HeapError> {
        let raw = self.str_bytes(obj)?;
        // Only valid UTF-8 is ever stored as Str.
        Ok(std::str::from_utf8(raw).unwrap_or_default())
    }

    /// The string as a C string, or `None` when it embeds a NUL byte.
    pub fn str_c(&self, obj: MoltObject) -> Result<Option<&CStr>, HeapError> {
        match self.get(obj) {
            Ok(HeapObject::Str(data)) => Ok(CStr::from_bytes_with_nul(data).ok()),
            _ => Err(self.mismatch(obj, TypeTag::Str)),
        }
    }

    pub fn bytes(&self, obj: MoltObject) -> Result<&[u8], HeapError> {
        match self.get(obj) {
            Ok(HeapObject::Bytes(data)) => Ok(data),
            _ => Err(self.mismatch(obj, TypeTag::Bytes)),
        }
    }

    pub fn tuple(&self, obj: MoltObject) -> Result<&[MoltObject], HeapError> {
        match self.get(obj) {
            Ok(HeapObject::Tuple(items)) => Ok(items),
            _ => Err(self.mismatch(obj, TypeTag::Tuple)),
        }
    }

    pub fn exception(&self, obj: MoltObject) -> Result<(&str, MoltObject), HeapError> {
        match self.get(obj) {
            Ok(HeapObject::Exception { kind, args }) => Ok((kind.as_str(), *args)),
            _ => Err(self.mismatch(obj, TypeTag::Exception)),
        }
    }

    pub fn inc_ref(&mut self, obj: MoltObject) {
        if let Ok(slot) = self.slot_mut(obj) {
            slot.refcount = slot.refcount.saturating_add(1);
        }
    }

    /// Drop one reference; the slot is freed (and its generation bumped) when
    /// the count reaches zero, releasing any children in turn. A released
    /// handle never resolves again.
    pub fn dec_ref(&mut self, obj: MoltObject) {
        let mut pending = vec![obj];
        while let Some(obj) = pending.pop() {
            let Ok(slot) = self.slot_mut(obj) else {
                continue;
            };
            slot.refcount = slot.refcount.saturating_sub(1);
            if slot.refcount > 0 {
                continue;
            }
            let object = slot.object.take();
            // A slot whose generation is used up is retired, never reused, so
            // old handles to it cannot resolve again.
            if slot.generation < u16::MAX {
                slot.generation += 1;
                if let Some((index, _)) = obj.as_handle().and_then(decode_handle) {
                    self.free.push(index);
                }
            }
            self.live -= 1;
            match object {
                Some(HeapObject::Tuple(items)) => pending.extend(items),
                Some(HeapObject::Exception { args, .. }) => pending.push(args),
                _ => {}
            }
        }
    }

    pub fn refcount(&self, obj: MoltObject) -> u32 {
        self.slot(obj).map(|slot| slot.refcount).unwrap_or(0)
    }

    /// Move every live payload to fresh storage. Handles stay valid; any
    /// address previously derived from a payload does not.
    pub fn relocate(&mut self) -> usize {
        let mut moved = 0;
        for slot in &mut self.slots {
            if let Some(object) = slot.object.as_mut() {
                object.relocate();
                moved += 1;
            }
        }
        self.relocations += 1;
        moved
    }

    pub fn live_objects(&self) -> usize {
        self.live
    }

    pub fn relocations(&self) -> u64 {
        self.relocations
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
