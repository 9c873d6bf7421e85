use std::ffi::CStr;

use molt_obj_model::MoltObject;
use molt_runtime_core::PyToken;

use crate::error::{UnixError, UnixErrorKind};
use crate::marshal::copy_string;

/// Login name of the controlling terminal's user. A missing name is reported
/// as `ENOENT` whatever errno `getlogin` left behind.
#[cfg(unix)]
pub fn getlogin(py: &mut PyToken<'_>) -> Result<MoltObject, UnixError> {
    let name = unsafe { libc::getlogin() };
    if name.is_null() {
        return Err(UnixError::os("getlogin", UnixErrorKind::NotFound));
    }
    let name = unsafe { CStr::from_ptr(name) };
    Ok(copy_string(&mut py.heap(), name))
}

#[cfg(not(unix))]
pub fn getlogin(_py: &mut PyToken<'_>) -> Result<MoltObject, UnixError> {
    Err(UnixError::Unsupported { call: "getlogin" })
}
