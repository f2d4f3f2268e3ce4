//! Error types and the OS status translator.
//!
//! Every OS failure that crosses the engine boundary is an [`OsError`]: a stable
//! machine-readable code (`"EPIPE"`) paired with a human-readable message
//! (`"broken pipe"`). Caller misuse is reported separately as a
//! [`ContractViolation`] and is never routed through the translator.

use std::borrow::Cow;
use std::io;

use thiserror::Error;

/// A named OS error: stable code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct OsError {
    code: &'static str,
    message: Cow<'static, str>,
    errno: i32,
}

impl OsError {
    /// Translates a positive `errno` value.
    pub(crate) fn from_errno(errno: i32) -> Self {
        match describe(errno) {
            Some((code, message)) => Self {
                code,
                message: Cow::Borrowed(message),
                errno,
            },
            None => Self {
                code: "UNKNOWN",
                message: Cow::Owned(format!("unknown system error {errno}")),
                errno,
            },
        }
    }

    /// Translates a negative status as returned by the read path (`-errno`).
    pub(crate) fn from_status(status: isize) -> Self {
        debug_assert!(status < 0, "only negative statuses carry an error");

        let errno = i32::try_from(status.unsigned_abs()).unwrap_or(libc::EIO);
        Self::from_errno(errno)
    }

    /// Captures `errno` of the syscall that just failed.
    pub(crate) fn last() -> Self {
        Self::from_errno(last_errno())
    }

    pub(crate) fn errno(&self) -> i32 {
        self.errno
    }

    /// Stable OS error name, e.g. `"EPIPE"`.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Human-readable description, e.g. `"broken pipe"`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The closest standard library error kind.
    pub fn kind(&self) -> io::ErrorKind {
        io::Error::from_raw_os_error(self.errno).kind()
    }
}

impl From<OsError> for io::Error {
    fn from(value: OsError) -> Self {
        Self::from_raw_os_error(value.errno)
    }
}

/// Caller-side misuse of a stream. These indicate a bug in the host, not an
/// OS condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// `writev` was called while the previous write has not reported completion.
    #[error("a write is already pending on this stream")]
    WritePending,

    /// `end` was called while the previous shutdown has not reported completion.
    #[error("a shutdown is already pending on this stream")]
    ShutdownPending,

    /// The stream was asked to close; no further operation is permitted.
    #[error("the stream is closing")]
    Closing,

    /// The stream id does not name an open stream (it was closed, or never opened).
    #[error("the stream is not open")]
    NotOpen,
}

/// Any failure reported synchronously by a stream operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// The descriptor could not be adopted as a stream.
    #[error("cannot open stream: {0}")]
    Init(#[source] OsError),

    /// The OS rejected an operation.
    #[error(transparent)]
    Io(#[from] OsError),

    /// The caller broke the stream's usage contract.
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

impl StreamError {
    /// The translated OS error behind this failure, if any.
    pub fn os_error(&self) -> Option<&OsError> {
        match self {
            Self::Init(error) | Self::Io(error) => Some(error),
            Self::ContractViolation(_) => None,
        }
    }

    /// Shorthand for the OS error code, if any.
    pub fn code(&self) -> Option<&'static str> {
        self.os_error().map(OsError::code)
    }
}

/// A specialized `Result` for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

pub(crate) fn last_errno() -> i32 {
    io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

macro_rules! errno_table {
    ($($name:ident => $message:literal,)*) => {
        fn describe(errno: i32) -> Option<(&'static str, &'static str)> {
            match errno {
                $(libc::$name => Some((stringify!($name), $message)),)*
                _ => None,
            }
        }
    };
}

// Aliases (EWOULDBLOCK, EOPNOTSUPP, EDEADLOCK) share values with the names below
// on the supported platforms and are deliberately absent.
errno_table! {
    E2BIG => "argument list too long",
    EACCES => "permission denied",
    EADDRINUSE => "address already in use",
    EADDRNOTAVAIL => "address not available",
    EAGAIN => "resource temporarily unavailable",
    EALREADY => "connection already in progress",
    EBADF => "bad file descriptor",
    EBUSY => "resource busy or locked",
    ECANCELED => "operation canceled",
    ECONNABORTED => "software caused connection abort",
    ECONNREFUSED => "connection refused",
    ECONNRESET => "connection reset by peer",
    EEXIST => "file already exists",
    EFAULT => "bad address in system call argument",
    EFBIG => "file too large",
    EINTR => "interrupted system call",
    EINVAL => "invalid argument",
    EIO => "i/o error",
    EISDIR => "illegal operation on a directory",
    ELOOP => "too many symbolic links encountered",
    EMFILE => "too many open files",
    ENAMETOOLONG => "name too long",
    ENFILE => "file table overflow",
    ENOBUFS => "no buffer space available",
    ENODEV => "no such device",
    ENOENT => "no such file or directory",
    ENOMEM => "not enough memory",
    ENOSPC => "no space left on device",
    ENOSYS => "function not implemented",
    ENOTCONN => "socket is not connected",
    ENOTDIR => "not a directory",
    ENOTEMPTY => "directory not empty",
    ENOTSOCK => "socket operation on non-socket",
    ENOTSUP => "operation not supported on socket",
    ENOTTY => "inappropriate ioctl for device",
    ENXIO => "no such device or address",
    EPERM => "operation not permitted",
    EPIPE => "broken pipe",
    EROFS => "read-only file system",
    ESPIPE => "invalid seek",
    ESRCH => "no such process",
    ETIMEDOUT => "connection timed out",
    EXDEV => "cross-device link not permitted",
}
