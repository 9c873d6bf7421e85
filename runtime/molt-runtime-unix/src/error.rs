use std::fmt;

use molt_obj_model::MoltObject;
use molt_runtime_core::{raise_exception, raise_exception_with_args, ExceptionSentinel, PyToken};

macro_rules! errno_kinds {
    ($($variant:ident => $errno:ident,)*) => {
        /// Native error codes, normalized. `EAGAIN` and `EWOULDBLOCK` are the
        /// same condition here whatever the platform defines them as.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum UnixErrorKind {
            WouldBlock,
            $($variant,)*
            Unknown(i32),
        }

        impl UnixErrorKind {
            #[cfg(unix)]
            pub fn from_errno(code: i32) -> Self {
                if code == libc::EAGAIN || code == libc::EWOULDBLOCK {
                    return UnixErrorKind::WouldBlock;
                }
                $(
                    if code == libc::$errno {
                        return UnixErrorKind::$variant;
                    }
                )*
                UnixErrorKind::Unknown(code)
            }

            #[cfg(not(unix))]
            pub fn from_errno(code: i32) -> Self {
                UnixErrorKind::Unknown(code)
            }

            #[cfg(unix)]
            pub fn errno(self) -> i32 {
                match self {
                    UnixErrorKind::WouldBlock => libc::EAGAIN,
                    $(UnixErrorKind::$variant => libc::$errno,)*
                    UnixErrorKind::Unknown(code) => code,
                }
            }

            #[cfg(not(unix))]
            pub fn errno(self) -> i32 {
                match self {
                    UnixErrorKind::Unknown(code) => code,
                    _ => 0,
                }
            }
        }
    };
}

errno_kinds! {
    ArgumentListTooLong => E2BIG,
    PermissionDenied => EACCES,
    BadDescriptor => EBADF,
    Busy => EBUSY,
    NoChild => ECHILD,
    Deadlock => EDEADLK,
    Domain => EDOM,
    Exists => EEXIST,
    BadAddress => EFAULT,
    FileTooLarge => EFBIG,
    Interrupted => EINTR,
    InvalidArgument => EINVAL,
    Io => EIO,
    IsADirectory => EISDIR,
    TooManyOpenFiles => EMFILE,
    TooManyLinks => EMLINK,
    NameTooLong => ENAMETOOLONG,
    FileTableOverflow => ENFILE,
    NoDevice => ENODEV,
    NotFound => ENOENT,
    ExecFormat => ENOEXEC,
    NoLocks => ENOLCK,
    OutOfMemory => ENOMEM,
    NoSpace => ENOSPC,
    NotImplemented => ENOSYS,
    NotADirectory => ENOTDIR,
    DirectoryNotEmpty => ENOTEMPTY,
    NotATerminal => ENOTTY,
    NoSuchDeviceOrAddress => ENXIO,
    NotPermitted => EPERM,
    BrokenPipe => EPIPE,
    Range => ERANGE,
    ReadOnlyFilesystem => EROFS,
    IllegalSeek => ESPIPE,
    NoSuchProcess => ESRCH,
    CrossDeviceLink => EXDEV,
    InProgress => EINPROGRESS,
    Already => EALREADY,
    ConnectionAborted => ECONNABORTED,
    ConnectionRefused => ECONNREFUSED,
    ConnectionReset => ECONNRESET,
    Shutdown => ESHUTDOWN,
    TimedOut => ETIMEDOUT,
}

impl UnixErrorKind {
    /// Read `errno` for the call that just failed.
    pub fn last_os_error() -> Self {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::from_errno(code)
    }

    pub fn is_would_block(self) -> bool {
        self == UnixErrorKind::WouldBlock
    }

    pub fn strerror(self) -> String {
        let code = self.errno();
        let text = std::io::Error::from_raw_os_error(code).to_string();
        match text.strip_suffix(&format!(" (os error {code})")) {
            Some(stripped) => stripped.to_owned(),
            None => text,
        }
    }

    /// Managed exception class for this error, following the `OSError`
    /// subclass hierarchy.
    pub fn exception_kind(self) -> &'static str {
        match self {
            UnixErrorKind::WouldBlock | UnixErrorKind::Already | UnixErrorKind::InProgress => {
                "BlockingIOError"
            }
            UnixErrorKind::NoChild => "ChildProcessError",
            UnixErrorKind::BrokenPipe | UnixErrorKind::Shutdown => "BrokenPipeError",
            UnixErrorKind::ConnectionAborted => "ConnectionAbortedError",
            UnixErrorKind::ConnectionRefused => "ConnectionRefusedError",
            UnixErrorKind::ConnectionReset => "ConnectionResetError",
            UnixErrorKind::Exists => "FileExistsError",
            UnixErrorKind::NotFound => "FileNotFoundError",
            UnixErrorKind::Interrupted => "InterruptedError",
            UnixErrorKind::IsADirectory => "IsADirectoryError",
            UnixErrorKind::NotADirectory => "NotADirectoryError",
            UnixErrorKind::PermissionDenied | UnixErrorKind::NotPermitted => "PermissionError",
            UnixErrorKind::NoSuchProcess => "ProcessLookupError",
            UnixErrorKind::TimedOut => "TimeoutError",
            _ => "OSError",
        }
    }
}

/// A failed binding call. Built where the failure is observed and only turned
/// into a managed exception at the ABI boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnixError {
    /// The system call failed with an errno.
    Os {
        call: &'static str,
        subject: Option<String>,
        kind: UnixErrorKind,
    },
    /// A database lookup had no matching entry.
    NotFound { call: &'static str },
    /// The platform does not provide the call.
    Unsupported { call: &'static str },
    /// An argument failed validation before any native call was made.
    Argument {
        exception: &'static str,
        message: String,
    },
}

impl UnixError {
    pub fn os(call: &'static str, kind: UnixErrorKind) -> Self {
        UnixError::Os {
            call,
            subject: None,
            kind,
        }
    }

    pub fn last_os(call: &'static str) -> Self {
        Self::os(call, UnixErrorKind::last_os_error())
    }

    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        match self {
            UnixError::Os { call, kind, .. } => UnixError::Os {
                call,
                subject: Some(subject.into()),
                kind,
            },
            other => other,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        UnixError::Argument {
            exception: "TypeError",
            message: message.into(),
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        UnixError::Argument {
            exception: "ValueError",
            message: message.into(),
        }
    }

    pub fn overflow_error(message: impl Into<String>) -> Self {
        UnixError::Argument {
            exception: "OverflowError",
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<UnixErrorKind> {
        match self {
            UnixError::Os { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn call(&self) -> Option<&'static str> {
        match self {
            UnixError::Os { call, .. }
            | UnixError::NotFound { call }
            | UnixError::Unsupported { call } => Some(*call),
            UnixError::Argument { .. } => None,
        }
    }

    pub fn exception_kind(&self) -> &'static str {
        match self {
            UnixError::Os { kind, .. } => kind.exception_kind(),
            UnixError::NotFound { .. } => "LookupError",
            UnixError::Unsupported { .. } => "NotImplementedError",
            UnixError::Argument { exception, .. } => *exception,
        }
    }
}

impl fmt::Display for UnixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnixError::Os {
                call,
                subject,
                kind,
            } => {
                write!(f, "[Errno {}] {call}: {}", kind.errno(), kind.strerror())?;
                match subject.as_deref() {
                    Some(subject) if !subject.is_empty() => write!(f, ": '{subject}'"),
                    _ => Ok(()),
                }
            }
            UnixError::NotFound { call } => write!(f, "{call}: entry not found"),
            UnixError::Unsupported { call } => write!(f, "{call} not implemented"),
            UnixError::Argument { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for UnixError {}

/// Record `err` as the pending exception. OS errors carry
/// `(errno, message, call, subject)` as their args, with `""` standing in for
/// a missing subject.
pub fn raise_unix_error<T: ExceptionSentinel>(py: &mut PyToken<'_>, err: &UnixError) -> T {
    let message = err.to_string();
    match err {
        UnixError::Os {
            call,
            subject,
            kind,
        } => {
            let args = {
                let mut heap = py.heap();
                vec![
                    MoltObject::from_int(i64::from(kind.errno())),
                    heap.alloc_str(&message),
                    heap.alloc_str(call),
                    heap.alloc_str(subject.as_deref().unwrap_or("")),
                ]
            };
            raise_exception_with_args(py, kind.exception_kind(), args)
        }
        _ => raise_exception(py, err.exception_kind(), &message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molt_runtime_core::{take_exception, with_gil};

    #[test]
    fn eagain_and_ewouldblock_normalize_together() {
        assert_eq!(UnixErrorKind::from_errno(libc::EAGAIN), UnixErrorKind::WouldBlock);
        assert_eq!(
            UnixErrorKind::from_errno(libc::EWOULDBLOCK),
            UnixErrorKind::WouldBlock
        );
        assert!(UnixErrorKind::WouldBlock.is_would_block());
        assert!(!UnixErrorKind::Interrupted.is_would_block());
    }

    #[test]
    fn errno_mapping_is_reversible() {
        for code in [libc::EPIPE, libc::EBADF, libc::ENOENT, libc::EINTR, libc::ENOSPC] {
            assert_eq!(UnixErrorKind::from_errno(code).errno(), code);
        }
        assert_eq!(UnixErrorKind::from_errno(4242), UnixErrorKind::Unknown(4242));
        assert_eq!(UnixErrorKind::Unknown(4242).errno(), 4242);
    }

    #[test]
    fn os_error_display_names_call() {
        let err = UnixError::os("write", UnixErrorKind::BadDescriptor);
        let text = err.to_string();
        assert!(text.starts_with(&format!("[Errno {}] write: ", libc::EBADF)));
        assert!(!text.contains("os error"));
        let with_subject = UnixError::os("open", UnixErrorKind::NotFound).with_subject("/nope");
        assert!(with_subject.to_string().ends_with(": '/nope'"));
    }

    #[test]
    fn exception_kinds_follow_oserror_hierarchy() {
        assert_eq!(
            UnixError::os("write", UnixErrorKind::WouldBlock).exception_kind(),
            "BlockingIOError"
        );
        assert_eq!(
            UnixError::os("write", UnixErrorKind::BrokenPipe).exception_kind(),
            "BrokenPipeError"
        );
        assert_eq!(
            UnixError::os("write", UnixErrorKind::Io).exception_kind(),
            "OSError"
        );
        assert_eq!(
            UnixError::NotFound { call: "getprotobyname" }.exception_kind(),
            "LookupError"
        );
        assert_eq!(
            UnixError::Unsupported { call: "getgroups" }.to_string(),
            "getgroups not implemented"
        );
    }

    #[test]
    fn raised_os_error_carries_errno_and_call() {
        with_gil(|mut py| {
            let err = UnixError::os("single_write", UnixErrorKind::WouldBlock);
            let sentinel: u64 = raise_unix_error(&mut py, &err);
            assert_eq!(sentinel, MoltObject::none().bits());
            let exc = take_exception().expect("pending exception");
            let mut heap = py.heap();
            let (kind, args) = heap.exception(exc).unwrap();
            assert_eq!(kind, "BlockingIOError");
            let args = heap.tuple(args).unwrap().to_vec();
            assert_eq!(args.len(), 4);
            assert_eq!(args[0].as_int(), Some(i64::from(libc::EAGAIN)));
            assert_eq!(heap.str_value(args[2]).unwrap(), "single_write");
            assert_eq!(heap.str_value(args[3]).unwrap(), "");
            heap.dec_ref(exc);
        });
    }
}
