//! Thin wrappers over the descriptor syscalls the engine performs.

use crate::error::{OsError, last_errno};

use libc::{F_GETFL, F_SETFL, O_ACCMODE, O_NONBLOCK, O_RDONLY, O_WRONLY, fcntl};
use std::io::IoSlice;
use std::os::unix::io::RawFd;

/// Largest segment count handed to a single `writev(2)`.
pub(crate) const IOV_MAX: usize = 1024;

/// Reads once into `buffer`, returning the byte count or `-errno`.
pub(crate) fn read(fd: RawFd, buffer: &mut [u8]) -> isize {
    let result = unsafe { libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len()) };

    if result < 0 {
        -(last_errno() as isize)
    } else {
        result
    }
}

/// Scatter-writes `slices`, returning how many bytes the OS accepted.
pub(crate) fn writev(fd: RawFd, slices: &[IoSlice<'_>]) -> Result<usize, OsError> {
    let count = slices.len().min(IOV_MAX);

    // IoSlice is ABI compatible with iovec on unix.
    let result = unsafe { libc::writev(fd, slices.as_ptr().cast::<libc::iovec>(), count as i32) };

    if result < 0 {
        return Err(OsError::last());
    }

    Ok(result as usize)
}

pub(crate) fn shutdown_write(fd: RawFd) -> Result<(), OsError> {
    if unsafe { libc::shutdown(fd, libc::SHUT_WR) } < 0 {
        return Err(OsError::last());
    }

    Ok(())
}

/// Toggles `O_NONBLOCK` on the descriptor.
pub(crate) fn set_blocking(fd: RawFd, blocking: bool) -> Result<(), OsError> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(OsError::last());
    }

    let updated = if blocking {
        flags & !O_NONBLOCK
    } else {
        flags | O_NONBLOCK
    };

    if updated != flags && unsafe { fcntl(fd, F_SETFL, updated) } < 0 {
        return Err(OsError::last());
    }

    Ok(())
}

/// Returns `(readable, writable)` for the descriptor's access mode.
pub(crate) fn access_mode(fd: RawFd) -> Result<(bool, bool), OsError> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(OsError::last());
    }

    let mode = flags & O_ACCMODE;

    Ok((mode != O_WRONLY, mode != O_RDONLY))
}

/// Closes the descriptor unless it is one of the standard streams.
pub(crate) fn close(fd: RawFd) {
    if fd > libc::STDERR_FILENO {
        unsafe { libc::close(fd) };
    }
}

pub(crate) fn is_transient(errno: i32) -> bool {
    errno == libc::EAGAIN || errno == libc::EWOULDBLOCK || errno == libc::EINTR
}
