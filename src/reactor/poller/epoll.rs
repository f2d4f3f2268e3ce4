use super::{Interest, Readiness};
use crate::error::{OsError, last_errno};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::time::Duration;

pub(crate) struct EpollPoller {
    epoll: RawFd,
    events: Vec<epoll_event>,
}

impl EpollPoller {
    pub(crate) fn new(capacity: usize) -> Result<Self, OsError> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(OsError::last());
        }

        let events = vec![epoll_event { events: 0, u64: 0 }; capacity.max(1)];

        Ok(Self { epoll, events })
    }

    /// Checks that the descriptor can be watched at all. Nothing stays
    /// registered: epoll reports hang-ups even for an empty interest set, so a
    /// descriptor is only in the set while it has interest.
    pub(crate) fn register(&self, fd: RawFd, token: usize) -> Result<(), OsError> {
        self.control(EPOLL_CTL_ADD, fd, token, Interest::NONE)?;
        self.deregister(fd);

        Ok(())
    }

    pub(crate) fn reregister(
        &self,
        fd: RawFd,
        token: usize,
        previous: Interest,
        interest: Interest,
    ) -> Result<(), OsError> {
        if interest.is_empty() {
            self.deregister(fd);
            return Ok(());
        }

        let op = if previous.is_empty() {
            EPOLL_CTL_ADD
        } else {
            EPOLL_CTL_MOD
        };

        self.control(op, fd, token, interest)
    }

    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, ptr::null_mut());
        }
    }

    /// Waits for readiness, appending notifications to `ready`. An interrupted
    /// wait yields no notifications.
    pub(crate) fn poll(
        &mut self,
        ready: &mut Vec<Readiness>,
        timeout: Option<Duration>,
    ) -> Result<(), OsError> {
        let timeout_ms = match timeout {
            Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let errno = last_errno();
            if errno == libc::EINTR {
                return Ok(());
            }
            return Err(OsError::from_errno(errno));
        }

        for event in self.events.iter().take(n as usize) {
            // epoll_event is packed on some targets; copy the fields out.
            let flags = event.events;
            let token = event.u64 as usize;
            let broken = flags & (EPOLLERR | EPOLLHUP) as u32 != 0;

            ready.push(Readiness {
                token,
                readable: broken || flags & EPOLLIN as u32 != 0,
                writable: broken || flags & EPOLLOUT as u32 != 0,
            });
        }

        Ok(())
    }

    fn control(&self, op: i32, fd: RawFd, token: usize, interest: Interest) -> Result<(), OsError> {
        let mut flags = 0u32;
        if interest.read {
            flags |= EPOLLIN as u32;
        }
        if interest.write {
            flags |= EPOLLOUT as u32;
        }

        let mut event = epoll_event {
            events: flags,
            u64: token as u64,
        };

        if unsafe { epoll_ctl(self.epoll, op, fd, &mut event) } < 0 {
            return Err(OsError::last());
        }

        Ok(())
    }
}

impl AsRawFd for EpollPoller {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll) };
    }
}
