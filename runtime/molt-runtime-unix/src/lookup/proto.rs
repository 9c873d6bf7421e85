use molt_obj_model::MoltObject;
use molt_runtime_core::PyToken;

use crate::error::UnixError;

/// Convert a protocol database entry to `(name, aliases, number)`. A null
/// entry is the database's "no such protocol" answer.
///
/// # Safety
/// `entry` must be null or point to a valid `protoent` whose strings stay
/// alive for the duration of the call.
#[cfg(unix)]
pub unsafe fn proto_entry(
    heap: &mut molt_obj_model::Heap,
    call: &'static str,
    entry: *const libc::protoent,
) -> Result<MoltObject, UnixError> {
    use std::ffi::{c_char, CStr};

    use crate::marshal::{copy_string, copy_string_array};

    if entry.is_null() {
        return Err(UnixError::NotFound { call });
    }
    let entry = &*entry;
    let name = copy_string(heap, CStr::from_ptr(entry.p_name));
    let aliases = copy_string_array(heap, entry.p_aliases as *const *const c_char);
    let number = MoltObject::from_int(i64::from(entry.p_proto));
    Ok(heap.alloc_tuple(vec![name, aliases, number]))
}

#[cfg(unix)]
pub fn getprotobyname(py: &mut PyToken<'_>, name: MoltObject) -> Result<MoltObject, UnixError> {
    let mut heap = py.heap();
    let entry = {
        let name = heap
            .str_c(name)
            .map_err(crate::marshal::heap_type_error)?
            .ok_or_else(|| UnixError::value_error("embedded null byte"))?;
        unsafe { libc::getprotobyname(name.as_ptr()) }
    };
    unsafe { proto_entry(&mut heap, "getprotobyname", entry) }
}

#[cfg(unix)]
pub fn getprotobynumber(py: &mut PyToken<'_>, number: i64) -> Result<MoltObject, UnixError> {
    let number = libc::c_int::try_from(number)
        .map_err(|_| UnixError::overflow_error("protocol number out of range"))?;
    let entry = unsafe { libc::getprotobynumber(number) };
    unsafe { proto_entry(&mut py.heap(), "getprotobynumber", entry) }
}

#[cfg(not(unix))]
pub fn getprotobyname(_py: &mut PyToken<'_>, _name: MoltObject) -> Result<MoltObject, UnixError> {
    Err(UnixError::Unsupported {
        call: "getprotobyname",
    })
}

#[cfg(not(unix))]
pub fn getprotobynumber(_py: &mut PyToken<'_>, _number: i64) -> Result<MoltObject, UnixError> {
    Err(UnixError::Unsupported {
        call: "getprotobynumber",
    })
}
