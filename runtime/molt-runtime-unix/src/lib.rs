//! POSIX bindings for the Molt runtime: argument-vector marshalling, buffered
//! writes to file descriptors and a handful of one-shot system lookups.
//!
//! Every call validates and copies its arguments while holding the GIL,
//! releases the GIL only around calls that may block, and reports failures as
//! [`UnixError`], which the C ABI in [`ffi`] turns into a pending exception.

pub mod error;
pub mod ffi;
pub mod lookup;
pub mod marshal;
pub mod write;

pub use error::{raise_unix_error, UnixError, UnixErrorKind};
pub use lookup::{getgroups, getlogin, getprotobyname, getprotobynumber, time};
pub use marshal::{cstringvect, CStringVect};
pub use write::{
    buffered_write, buffered_write_with, single_write, single_write_with, FdWrite, SysWrite,
    TransferPolicy,
};

/// Upper bound on the bytes handed to one native write.
pub const UNIX_BUFFER_SIZE: usize = 65536;
