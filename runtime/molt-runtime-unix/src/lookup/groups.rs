use molt_obj_model::MoltObject;
use molt_runtime_core::PyToken;

use crate::error::UnixError;

#[cfg(unix)]
fn ngroups_max() -> usize {
    let max = unsafe { libc::sysconf(libc::_SC_NGROUPS_MAX) };
    if max > 0 {
        max as usize
    } else {
        65536
    }
}

/// Supplementary group ids of the calling process, as a tuple of ints.
#[cfg(unix)]
pub fn getgroups(py: &mut PyToken<'_>) -> Result<MoltObject, UnixError> {
    let mut gids: Vec<libc::gid_t> = vec![0; ngroups_max()];
    let capacity = libc::c_int::try_from(gids.len()).unwrap_or(libc::c_int::MAX);
    let n = unsafe { libc::getgroups(capacity, gids.as_mut_ptr()) };
    if n < 0 {
        return Err(UnixError::last_os("getgroups"));
    }
    gids.truncate(n as usize);
    let mut heap = py.heap();
    crate::marshal::alloc_int_tuple(&mut heap, gids.into_iter().map(i64::from))
}

#[cfg(not(unix))]
pub fn getgroups(_py: &mut PyToken<'_>) -> Result<MoltObject, UnixError> {
    Err(UnixError::Unsupported { call: "getgroups" })
}
