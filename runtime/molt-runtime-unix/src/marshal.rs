//! Conversions between runtime values and native data.

use std::ffi::{c_char, CStr};
use std::marker::PhantomData;

use molt_obj_model::{Heap, HeapError, MoltObject};

use crate::error::{UnixError, UnixErrorKind};

/// A NULL-terminated `char *` vector whose strings live in the heap.
///
/// Only the pointer array is owned. The strings are borrowed from the heap
/// for `'h`, so the vector cannot outlive the heap guard it was built from
/// and in particular cannot be held across a blocking section.
pub struct CStringVect<'h> {
    ptrs: Vec<*const c_char>,
    _heap: PhantomData<&'h Heap>,
}

impl<'h> CStringVect<'h> {
    /// Pointer suitable for `execv`-style calls.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// All entries, including the trailing null.
    pub fn as_slice(&self) -> &[*const c_char] {
        &self.ptrs
    }

    /// Number of strings, not counting the terminator.
    pub fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&'h CStr> {
        if index >= self.len() {
            return None;
        }
        // Entries below len() all point into live heap strings for 'h.
        Some(unsafe { CStr::from_ptr(self.ptrs[index]) })
    }
}

pub(crate) fn heap_type_error(err: HeapError) -> UnixError {
    match err {
        HeapError::TypeMismatch { expected, got } => {
            UnixError::type_error(format!("expected {}, got {got}", expected.name()))
        }
        HeapError::NotAHandle(got) => UnixError::type_error(format!("unexpected {got} argument")),
        HeapError::StaleHandle => UnixError::value_error("object was released"),
    }
}

/// Build the argument vector for a tuple of strings. Entries alias the heap's
/// NUL-terminated string storage; nothing is copied.
pub fn cstringvect<'h>(heap: &'h Heap, array: MoltObject) -> Result<CStringVect<'h>, UnixError> {
    let items = heap.tuple(array).map_err(heap_type_error)?;
    let mut ptrs = Vec::with_capacity(items.len() + 1);
    for &item in items {
        match heap.str_c(item).map_err(heap_type_error)? {
            Some(text) => ptrs.push(text.as_ptr()),
            None => return Err(UnixError::value_error("embedded null byte")),
        }
    }
    ptrs.push(std::ptr::null());
    Ok(CStringVect {
        ptrs,
        _heap: PhantomData,
    })
}

pub fn copy_string(heap: &mut Heap, text: &CStr) -> MoltObject {
    heap.alloc_str_lossy(text.to_bytes())
}

/// Copy a NULL-terminated `char **` into a tuple of strings.
///
/// # Safety
/// `array` must be null or point to a NULL-terminated array of valid C
/// strings.
pub unsafe fn copy_string_array(heap: &mut Heap, array: *const *const c_char) -> MoltObject {
    let mut items = Vec::new();
    if !array.is_null() {
        let mut cursor = array;
        while !(*cursor).is_null() {
            items.push(copy_string(heap, CStr::from_ptr(*cursor)));
            cursor = cursor.add(1);
        }
    }
    heap.alloc_tuple(items)
}

pub fn alloc_int_tuple<I>(heap: &mut Heap, values: I) -> Result<MoltObject, UnixError>
where
    I: IntoIterator<Item = i64>,
{
    let mut items = Vec::new();
    for value in values {
        match MoltObject::try_from_int(value) {
            Some(obj) => items.push(obj),
            None => return Err(UnixError::overflow_error("integer out of range")),
        }
    }
    Ok(heap.alloc_tuple(items))
}

/// Integer argument; bools count as ints.
pub fn long_from_bits(heap: &Heap, bits: u64) -> Result<i64, UnixError> {
    let obj = MoltObject::from_bits(bits);
    if let Some(value) = obj.as_int() {
        return Ok(value);
    }
    if let Some(flag) = obj.as_bool() {
        return Ok(i64::from(flag));
    }
    Err(UnixError::type_error(format!(
        "an integer is required (got {})",
        heap.type_name(obj)
    )))
}

/// File descriptor argument. Negative descriptors fail as `EBADF` against
/// `call` without reaching the kernel.
pub fn fd_from_bits(heap: &Heap, bits: u64, call: &'static str) -> Result<i32, UnixError> {
    let fd = long_from_bits(heap, bits)?;
    if fd < 0 {
        return Err(UnixError::os(call, UnixErrorKind::BadDescriptor));
    }
    i32::try_from(fd).map_err(|_| UnixError::overflow_error("fd is greater than maximum"))
}
