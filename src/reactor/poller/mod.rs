//! Readiness backends.
//!
//! Both backends validate a descriptor at Init, so an OS rejection surfaces
//! before any read or write is attempted, keep it in the kernel set only while
//! it has interest, and report readiness per registration token.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(any(target_os = "macos", target_os = "ios"))]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) use epoll::EpollPoller as Poller;
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub(crate) use kqueue::KqueuePoller as Poller;

/// Which readiness kinds a handle currently wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const NONE: Self = Self {
        read: false,
        write: false,
    };

    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// One readiness notification. Hang-ups and errors are reported as both
/// readable and writable so the next syscall surfaces the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub(crate) token: usize,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}
