use super::{Interest, Readiness};
use crate::error::{OsError, last_errno};

use libc::{EV_ADD, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent, kqueue};
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::time::Duration;

pub(crate) struct KqueuePoller {
    kqueue: RawFd,
    events: Vec<kevent>,
}

fn change(fd: RawFd, filter: i16, flags: u16, token: usize) -> kevent {
    kevent {
        ident: fd as usize,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: token as *mut _,
    }
}

impl KqueuePoller {
    pub(crate) fn new(capacity: usize) -> Result<Self, OsError> {
        let kqueue = unsafe { kqueue() };
        if kqueue < 0 {
            return Err(OsError::last());
        }

        let events = vec![change(0, 0, 0, 0); capacity.max(1)];

        Ok(Self { kqueue, events })
    }

    /// Checks that the descriptor can be watched by adding and removing a read
    /// filter. Darwin rejects some terminal devices here with `EINVAL`.
    pub(crate) fn register(&self, fd: RawFd, token: usize) -> Result<(), OsError> {
        self.apply(&[change(fd, EVFILT_READ, EV_ADD, token)])?;
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
        let mut changes = Vec::with_capacity(2);

        for (filter, was, wants) in [
            (EVFILT_READ, previous.read, interest.read),
            (EVFILT_WRITE, previous.write, interest.write),
        ] {
            if wants && !was {
                changes.push(change(fd, filter, EV_ADD, token));
            } else if was && !wants {
                changes.push(change(fd, filter, EV_DELETE, token));
            }
        }

        if changes.is_empty() {
            return Ok(());
        }

        self.apply(&changes)
    }

    pub(crate) fn deregister(&self, fd: RawFd) {
        // Either filter may be absent; kevent reports ENOENT for it, which is fine.
        for filter in [EVFILT_READ, EVFILT_WRITE] {
            let _ = self.apply(&[change(fd, filter, EV_DELETE, 0)]);
        }
    }

    pub(crate) fn poll(
        &mut self,
        ready: &mut Vec<Readiness>,
        timeout: Option<Duration>,
    ) -> Result<(), OsError> {
        let ts = timeout.map(|duration| libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        let n = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                ts_ptr,
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
            let broken = event.flags & (EV_EOF | EV_ERROR) != 0;

            ready.push(Readiness {
                token: event.udata as usize,
                readable: event.filter == EVFILT_READ || broken,
                writable: event.filter == EVFILT_WRITE || broken,
            });
        }

        Ok(())
    }

    fn apply(&self, changes: &[kevent]) -> Result<(), OsError> {
        let result = unsafe {
            kevent(
                self.kqueue,
                changes.as_ptr(),
                changes.len() as i32,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };

        if result < 0 {
            return Err(OsError::last());
        }

        Ok(())
    }
}

impl AsRawFd for KqueuePoller {
    fn as_raw_fd(&self) -> RawFd {
        self.kqueue
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.kqueue) };
    }
}
