//! Embedded request records.
//!
//! Each stream owns exactly one write slot and one shutdown slot. A slot is
//! busy from submission until its completion callback has been dispatched, and
//! its record is reused by the next submission instead of being reallocated.

use crate::error::OsError;
use crate::reactor::io;

use std::io::IoSlice;
use std::mem;
use std::os::unix::io::RawFd;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Idle,
    InFlight,
    Completed(Result<(), OsError>),
}

/// A request record of size one.
pub(crate) struct RequestSlot<T> {
    request: T,
    state: SlotState,
}

impl<T: Default> Default for RequestSlot<T> {
    fn default() -> Self {
        Self {
            request: T::default(),
            state: SlotState::Idle,
        }
    }
}

impl<T> RequestSlot<T> {
    /// Claims the slot, or `None` while a previous request is outstanding.
    pub(crate) fn acquire(&mut self) -> Option<&mut T> {
        if self.state != SlotState::Idle {
            return None;
        }

        self.state = SlotState::InFlight;
        Some(&mut self.request)
    }

    pub(crate) fn in_flight_mut(&mut self) -> Option<&mut T> {
        match self.state {
            SlotState::InFlight => Some(&mut self.request),
            _ => None,
        }
    }

    pub(crate) fn complete(&mut self, status: Result<(), OsError>) {
        debug_assert_eq!(self.state, SlotState::InFlight);
        self.state = SlotState::Completed(status);
    }

    /// Frees a completed slot and yields its status for dispatch.
    pub(crate) fn take_completed(&mut self) -> Option<Result<(), OsError>> {
        match mem::replace(&mut self.state, SlotState::Idle) {
            SlotState::Completed(status) => Some(status),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Frees the slot at close: a finished request keeps its status, an
    /// unfinished one is reported as canceled.
    pub(crate) fn cancel(&mut self) -> Option<Result<(), OsError>> {
        match mem::replace(&mut self.state, SlotState::Idle) {
            SlotState::Idle => None,
            SlotState::InFlight => Some(Err(OsError::from_errno(libc::ECANCELED))),
            SlotState::Completed(status) => Some(status),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state == SlotState::Idle
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.state == SlotState::InFlight
    }
}

/// Outcome of pushing a write forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flush {
    Done(Result<(), OsError>),
    WouldBlock,
}

/// The reusable scatter-write record. Segments are borrowed, never copied.
#[derive(Default)]
pub(crate) struct WriteRequest<'a> {
    slices: Vec<IoSlice<'a>>,
    start: usize,
}

impl<'a> WriteRequest<'a> {
    pub(crate) fn fill(&mut self, buffers: &[&'a [u8]]) {
        self.slices.clear();
        self.slices.extend(
            buffers
                .iter()
                .copied()
                .filter(|buffer| !buffer.is_empty())
                .map(IoSlice::new),
        );
        self.start = 0;
    }

    pub(crate) fn remaining(&self) -> usize {
        self.slices[self.start..].iter().map(|slice| slice.len()).sum()
    }

    fn advance(&mut self, written: usize) {
        let mut pending = &mut self.slices[self.start..];
        IoSlice::advance_slices(&mut pending, written);
        let left = pending.len();
        self.start = self.slices.len() - left;
    }

    /// Writes until everything is accepted, the descriptor would block, or the
    /// OS reports an error. Interrupted calls are retried.
    pub(crate) fn flush(&mut self, fd: RawFd) -> Flush {
        while self.start < self.slices.len() {
            match io::writev(fd, &self.slices[self.start..]) {
                Ok(0) => {
                    self.release();
                    return Flush::Done(Err(OsError::from_errno(libc::EIO)));
                }
                Ok(written) => self.advance(written),
                Err(error) if error.errno() == libc::EINTR => continue,
                Err(error) if io::is_transient(error.errno()) => return Flush::WouldBlock,
                Err(error) => {
                    self.release();
                    return Flush::Done(Err(error));
                }
            }
        }

        self.release();
        Flush::Done(Ok(()))
    }

    fn release(&mut self) {
        self.slices.clear();
        self.start = 0;
    }
}
