//! Streams over terminals, pipes and sockets.
//!
//! A stream is opened with [`Reactor::open`](crate::Reactor::open) and driven
//! through a [`Stream`] view, obtained from
//! [`Reactor::stream`](crate::Reactor::stream) or handed to a callback.
//! Operations either fail synchronously or report exactly once through the
//! stream's [`Callbacks`], on a later reactor turn.

mod buffer;
mod callbacks;
pub(crate) mod handle;
mod request;

pub use buffer::DEFAULT_READ_BUFFER_SIZE;
pub use callbacks::Callbacks;
pub(crate) use callbacks::Dispatch;

use crate::error::{ContractViolation, OsError, Result};
use crate::reactor::core::Shared;
use crate::tty::{self, HandleType, TtyMode, WindowSize};
use handle::StreamHandle;

use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::{Level, event};

/// Names a stream opened on a reactor.
///
/// Ids are never reused: once a stream has been closed, its id reports
/// [`ContractViolation::NotOpen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub(crate) index: usize,
    pub(crate) serial: u64,
}

/// Lifecycle state of an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Open, no read interest.
    Paused,
    /// Open, reads are delivered to `on_read`.
    Reading,
    /// `close` was requested; `on_close` has not fired yet.
    Closing,
}

/// A mutable view of one stream.
pub struct Stream<'r, 'a> {
    id: StreamId,
    handle: &'r mut StreamHandle<'a>,
    shared: &'r mut Shared,
}

impl<'r, 'a> Stream<'r, 'a> {
    pub(crate) fn new(handle: &'r mut StreamHandle<'a>, shared: &'r mut Shared) -> Self {
        let id = StreamId {
            index: handle.token,
            serial: handle.serial,
        };

        Self { id, handle, shared }
    }

    /// The id this stream was opened under.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Where the stream is in its lifecycle.
    pub fn state(&self) -> StreamState {
        self.handle.state
    }

    /// What the descriptor was classified as when the stream was opened.
    pub fn handle_type(&self) -> HandleType {
        self.handle.kind
    }

    /// False for write-only descriptors.
    pub fn is_readable(&self) -> bool {
        self.handle.readable
    }

    /// False for read-only descriptors and once `end` has been called.
    pub fn is_writable(&self) -> bool {
        self.handle.writable
    }

    /// The whole caller-provided read buffer. After `on_read(Ok(n))` the first
    /// `n` bytes hold the data just read.
    pub fn read_buffer(&self) -> &[u8] {
        self.handle.buffer.as_slice()
    }

    /// The bytes delivered by the most recent read cycle.
    pub fn last_read(&self) -> &[u8] {
        self.handle.buffer.filled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.handle.state == StreamState::Closing {
            return Err(ContractViolation::Closing.into());
        }

        Ok(())
    }

    /// Writes `buffers` in order, as one request.
    ///
    /// The segments are borrowed until `on_write` fires; they are never
    /// copied. `on_write` fires on a later turn even when the data was
    /// accepted right away, and a write with no bytes succeeds without
    /// touching the descriptor.
    pub fn writev(&mut self, buffers: &[&'a [u8]]) -> Result<()> {
        self.ensure_open()?;

        if !self.handle.writable {
            return Err(OsError::from_errno(libc::EPIPE).into());
        }

        let Some(request) = self.handle.write.acquire() else {
            return Err(ContractViolation::WritePending.into());
        };

        request.fill(buffers);
        let bytes = request.remaining();

        event!(
            Level::TRACE,
            message = "write submitted",
            fd = self.handle.fd,
            segments = buffers.len(),
            bytes
        );

        self.handle.flush_write(self.shared);

        Ok(())
    }

    /// [`writev`](Self::writev) with a single segment.
    pub fn write(&mut self, buffer: &'a [u8]) -> Result<()> {
        self.writev(&[buffer])
    }

    /// Half-closes the write side once any in-flight write has drained;
    /// `on_end` reports the outcome. Only sockets support a half-close, so on
    /// pipes and terminals `on_end` receives `ENOTSOCK`. Either way the stream
    /// accepts no further writes.
    pub fn end(&mut self) -> Result<()> {
        self.ensure_open()?;

        if !self.handle.shutdown.is_idle() {
            return Err(ContractViolation::ShutdownPending.into());
        }

        if !self.handle.writable {
            return Err(OsError::from_errno(libc::ENOTCONN).into());
        }

        self.handle.writable = false;
        self.handle.shutdown.acquire();

        event!(Level::TRACE, message = "shutdown requested", fd = self.handle.fd);

        self.handle.drain_shutdown(self.shared);

        Ok(())
    }

    /// Starts delivering reads to `on_read`.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.handle.state == StreamState::Reading {
            return Err(OsError::from_errno(libc::EALREADY).into());
        }

        if !self.handle.readable {
            return Err(OsError::from_errno(libc::ENOTCONN).into());
        }

        self.handle.state = StreamState::Reading;

        if let Err(error) = self.handle.sync_interest(&self.shared.poller) {
            self.handle.state = StreamState::Paused;
            return Err(error.into());
        }

        event!(Level::TRACE, message = "reading", fd = self.handle.fd);

        Ok(())
    }

    /// Stops delivering reads. Data already buffered by the OS stays there.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.handle.state != StreamState::Reading {
            return Err(OsError::from_errno(libc::EINVAL).into());
        }

        self.handle.state = StreamState::Paused;
        self.handle.sync_interest(&self.shared.poller)?;

        event!(Level::TRACE, message = "paused", fd = self.handle.fd);

        Ok(())
    }

    /// Closes the descriptor now and schedules `on_close`.
    ///
    /// Pending writes and shutdowns report before `on_close`: with their real
    /// status if they already finished, with `ECANCELED` otherwise.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;

        self.handle.state = StreamState::Closing;
        self.handle.release(self.shared);
        self.shared.closing.push_back(self.handle.token);

        event!(Level::DEBUG, message = "stream closing", fd = self.handle.fd);

        Ok(())
    }

    /// The mode last set through this stream. `Normal` again once
    /// [`reset_mode`](crate::reset_mode) has restored this terminal.
    pub fn mode(&self) -> TtyMode {
        self.handle.terminal.mode()
    }

    /// Switches the terminal's line discipline. Fails with `ENOTTY` on
    /// anything but a terminal.
    pub fn set_mode(&mut self, mode: TtyMode) -> Result<()> {
        self.ensure_open()?;

        self.handle.terminal.set_mode(self.handle.fd, mode)?;

        Ok(())
    }

    /// `Raw` when `enable` is set, `Normal` otherwise.
    pub fn set_raw_mode(&mut self, enable: bool) -> Result<()> {
        self.set_mode(if enable { TtyMode::Raw } else { TtyMode::Normal })
    }

    /// Queries the terminal's size; `ENOTTY` for other descriptors.
    pub fn window_size(&self) -> Result<WindowSize> {
        self.ensure_open()?;

        Ok(tty::window_size(self.handle.fd)?)
    }

    /// Asks the OS now, rather than relying on [`handle_type`](Self::handle_type).
    pub fn is_terminal(&self) -> bool {
        tty::is_terminal(self.handle.fd)
    }
}

impl AsRawFd for Stream<'_, '_> {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.fd
    }
}

impl fmt::Debug for Stream<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("fd", &self.handle.fd)
            .field("kind", &self.handle.kind)
            .field("state", &self.handle.state)
            .finish()
    }
}
