//! Buffered writes from runtime byte buffers to file descriptors.
//!
//! Bytes are copied from the heap into a stack staging buffer while the GIL
//! is held; only the staging buffer is visible to the native write, which
//! runs with the GIL released. The heap may be relocated by another thread at
//! that point, so the source buffer is looked up again for every chunk. The
//! transfer holds its own reference to the buffer until it returns.

use std::sync::OnceLock;

use molt_obj_model::MoltObject;
use molt_runtime_core::metrics::{profile_hit, ProfileCounter};
use molt_runtime_core::{with_gil, PyToken};

use crate::error::{UnixError, UnixErrorKind};
use crate::marshal::heap_type_error;
use crate::UNIX_BUFFER_SIZE;

fn trace_unix_write_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| {
        matches!(
            std::env::var("MOLT_TRACE_UNIX_WRITE").ok().as_deref(),
            Some("1")
        )
    })
}

/// One native write attempt.
pub trait FdWrite {
    fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, UnixErrorKind>;
}

/// `write(2)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SysWrite;

impl FdWrite for SysWrite {
    #[cfg(unix)]
    fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, UnixErrorKind> {
        let rc = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
        if rc < 0 {
            return Err(UnixErrorKind::last_os_error());
        }
        Ok(rc as usize)
    }

    #[cfg(not(unix))]
    fn write(&mut self, _fd: i32, _data: &[u8]) -> Result<usize, UnixErrorKind> {
        Err(UnixErrorKind::NotImplemented)
    }
}

/// How a transfer treats the descriptor after the first attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferPolicy {
    /// Keep writing until everything is out. A would-block after some bytes
    /// went out ends the transfer with the partial count instead of failing.
    Buffered,
    /// At most one native write; every failure is reported.
    SingleAttempt,
}

impl TransferPolicy {
    pub fn call_name(self) -> &'static str {
        match self {
            TransferPolicy::Buffered => "write",
            TransferPolicy::SingleAttempt => "single_write",
        }
    }

    fn repeats(self) -> bool {
        self == TransferPolicy::Buffered
    }
}

/// Write `buffer[offset..offset + length]` to `fd`, chunked by
/// [`UNIX_BUFFER_SIZE`].
pub fn buffered_write(
    py: &mut PyToken<'_>,
    fd: i32,
    buffer: MoltObject,
    offset: i64,
    length: i64,
) -> Result<usize, UnixError> {
    transfer(py, &mut SysWrite, fd, buffer, offset, length, TransferPolicy::Buffered)
}

pub fn buffered_write_with<W: FdWrite>(
    py: &mut PyToken<'_>,
    writer: &mut W,
    fd: i32,
    buffer: MoltObject,
    offset: i64,
    length: i64,
) -> Result<usize, UnixError> {
    transfer(py, writer, fd, buffer, offset, length, TransferPolicy::Buffered)
}

/// Like [`buffered_write`] but makes at most one native write of at most
/// [`UNIX_BUFFER_SIZE`] bytes.
pub fn single_write(
    py: &mut PyToken<'_>,
    fd: i32,
    buffer: MoltObject,
    offset: i64,
    length: i64,
) -> Result<usize, UnixError> {
    transfer(py, &mut SysWrite, fd, buffer, offset, length, TransferPolicy::SingleAttempt)
}

pub fn single_write_with<W: FdWrite>(
    py: &mut PyToken<'_>,
    writer: &mut W,
    fd: i32,
    buffer: MoltObject,
    offset: i64,
    length: i64,
) -> Result<usize, UnixError> {
    transfer(py, writer, fd, buffer, offset, length, TransferPolicy::SingleAttempt)
}

fn checked_range(offset: i64, length: i64, len: usize) -> Result<(usize, usize), UnixError> {
    let bad = || UnixError::value_error("bad offset/length");
    let offset = usize::try_from(offset).map_err(|_| bad())?;
    let length = usize::try_from(length).map_err(|_| bad())?;
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok((offset, length)),
        _ => Err(bad()),
    }
}

/// Reference to the source buffer owned by one transfer.
struct BufferRoot(MoltObject);

impl BufferRoot {
    fn new(py: &mut PyToken<'_>, buffer: MoltObject) -> Self {
        py.heap().inc_ref(buffer);
        Self(buffer)
    }
}

impl Drop for BufferRoot {
    fn drop(&mut self) {
        // Any blocking section has closed by now, so this only nests the GIL.
        let buffer = self.0;
        with_gil(|mut py| py.heap().dec_ref(buffer));
    }
}

/// The descriptor is checked first, then the buffer, then the range, all
/// before anything is written.
pub fn transfer<W: FdWrite>(
    py: &mut PyToken<'_>,
    writer: &mut W,
    fd: i32,
    buffer: MoltObject,
    offset: i64,
    length: i64,
    policy: TransferPolicy,
) -> Result<usize, UnixError> {
    let call = policy.call_name();
    if fd < 0 {
        return Err(UnixError::os(call, UnixErrorKind::BadDescriptor));
    }
    let buffer_len = py.heap().bytes(buffer).map_err(heap_type_error)?.len();
    let (mut offset, mut remaining) = checked_range(offset, length, buffer_len)?;
    let _root = BufferRoot::new(py, buffer);
    let mut staging = [0u8; UNIX_BUFFER_SIZE];
    let mut written = 0usize;
    while remaining > 0 {
        let chunk = remaining.min(UNIX_BUFFER_SIZE);
        {
            let heap = py.heap();
            let data = heap.bytes(buffer).map_err(heap_type_error)?;
            let source = data
                .get(offset..offset + chunk)
                .ok_or_else(|| UnixError::value_error("bad offset/length"))?;
            staging[..chunk].copy_from_slice(source);
        }
        let result = py.allow_threads(|| writer.write(fd, &staging[..chunk]));
        profile_hit(ProfileCounter::NativeWrites);
        if trace_unix_write_enabled() {
            eprintln!(
                "molt unix {call}: fd={fd} offset={offset} chunk={chunk} result={result:?}"
            );
        }
        match result {
            Ok(n) => {
                let n = n.min(chunk);
                written += n;
                offset += n;
                remaining -= n;
                if !policy.repeats() {
                    break;
                }
            }
            Err(kind) if kind.is_would_block() && written > 0 && policy.repeats() => {
                profile_hit(ProfileCounter::AbsorbedWouldBlock);
                if trace_unix_write_enabled() {
                    eprintln!("molt unix {call}: fd={fd} would block after {written} bytes");
                }
                break;
            }
            Err(kind) => return Err(UnixError::os(call, kind)),
        }
    }
    Ok(written)
}
