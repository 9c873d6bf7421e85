//! C ABI entry points. Arguments and results are `MoltObject` bits; on
//! failure the exception is left pending on the calling thread and the none
//! sentinel is returned.

use molt_obj_model::MoltObject;
use molt_runtime_core::{with_gil_entry, PyToken};

use crate::error::{raise_unix_error, UnixError};
use crate::marshal::{fd_from_bits, long_from_bits};
use crate::write::{transfer, SysWrite, TransferPolicy};

fn finish(py: &mut PyToken<'_>, result: Result<MoltObject, UnixError>) -> u64 {
    match result {
        Ok(obj) => obj.bits(),
        Err(err) => raise_unix_error(py, &err),
    }
}

fn write_entry(
    py: &mut PyToken<'_>,
    fd_bits: u64,
    buf_bits: u64,
    ofs_bits: u64,
    len_bits: u64,
    policy: TransferPolicy,
) -> Result<MoltObject, UnixError> {
    let (fd, offset, length) = {
        let heap = py.heap();
        (
            fd_from_bits(&heap, fd_bits, policy.call_name())?,
            long_from_bits(&heap, ofs_bits)?,
            long_from_bits(&heap, len_bits)?,
        )
    };
    let buffer = MoltObject::from_bits(buf_bits);
    let written = transfer(py, &mut SysWrite, fd, buffer, offset, length, policy)?;
    // A transfer never exceeds the buffer, whose length fits an int.
    Ok(MoltObject::from_int(written as i64))
}

#[no_mangle]
pub extern "C" fn molt_unix_write(fd_bits: u64, buf_bits: u64, ofs_bits: u64, len_bits: u64) -> u64 {
    with_gil_entry!(py, {
        let result = write_entry(py, fd_bits, buf_bits, ofs_bits, len_bits, TransferPolicy::Buffered);
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_single_write(
    fd_bits: u64,
    buf_bits: u64,
    ofs_bits: u64,
    len_bits: u64,
) -> u64 {
    with_gil_entry!(py, {
        let result = write_entry(
            py,
            fd_bits,
            buf_bits,
            ofs_bits,
            len_bits,
            TransferPolicy::SingleAttempt,
        );
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_getgroups() -> u64 {
    with_gil_entry!(py, {
        let result = crate::lookup::getgroups(py);
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_getlogin() -> u64 {
    with_gil_entry!(py, {
        let result = crate::lookup::getlogin(py);
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_getprotobyname(name_bits: u64) -> u64 {
    with_gil_entry!(py, {
        let result = crate::lookup::getprotobyname(py, MoltObject::from_bits(name_bits));
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_getprotobynumber(number_bits: u64) -> u64 {
    with_gil_entry!(py, {
        let result = {
            let number = long_from_bits(&py.heap(), number_bits);
            number.and_then(|number| crate::lookup::getprotobynumber(py, number))
        };
        finish(py, result)
    })
}

#[no_mangle]
pub extern "C" fn molt_unix_time() -> u64 {
    crate::lookup::time().bits()
}
