use super::StreamState;
use super::buffer::ReadBuffer;
use super::callbacks::Dispatch;
use super::request::{Flush, RequestSlot, WriteRequest};
use crate::error::OsError;
use crate::reactor::core::{Completion, Shared};
use crate::reactor::io;
use crate::reactor::poller::{Interest, Poller};
use crate::tty::{HandleType, TerminalState};

use std::os::unix::io::RawFd;
use tracing::{Level, event};

/// Engine-side record of one stream. Owned by the reactor's slab; the host
/// only ever sees it through a [`Stream`](super::Stream) view.
pub(crate) struct StreamHandle<'a> {
    pub(crate) token: usize,
    pub(crate) serial: u64,
    pub(crate) fd: RawFd,
    pub(crate) kind: HandleType,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) state: StreamState,
    pub(crate) buffer: ReadBuffer<'a>,
    pub(crate) write: RequestSlot<WriteRequest<'a>>,
    pub(crate) shutdown: RequestSlot<()>,
    pub(crate) terminal: TerminalState,
    pub(crate) callbacks: Option<Box<dyn Dispatch<'a> + 'a>>,
    interest: Interest,
}

impl<'a> StreamHandle<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        token: usize,
        serial: u64,
        fd: RawFd,
        kind: HandleType,
        readable: bool,
        writable: bool,
        buffer: &'a mut [u8],
        callbacks: Box<dyn Dispatch<'a> + 'a>,
    ) -> Self {
        Self {
            token,
            serial,
            fd,
            kind,
            readable,
            writable,
            state: StreamState::Paused,
            buffer: ReadBuffer::new(buffer),
            write: RequestSlot::default(),
            shutdown: RequestSlot::default(),
            terminal: TerminalState::new(),
            callbacks: Some(callbacks),
            interest: Interest::NONE,
        }
    }

    fn wanted_interest(&self) -> Interest {
        if self.state == StreamState::Closing {
            return Interest::NONE;
        }

        Interest {
            read: self.state == StreamState::Reading,
            write: self.write.is_in_flight(),
        }
    }

    /// Brings the poller registration in line with what the handle waits for.
    pub(crate) fn sync_interest(&mut self, poller: &Poller) -> Result<(), OsError> {
        let wanted = self.wanted_interest();
        if wanted == self.interest {
            return Ok(());
        }

        poller.reregister(self.fd, self.token, self.interest, wanted)?;
        self.interest = wanted;

        Ok(())
    }

    /// One read cycle. `None` means the wakeup was spurious and nothing is
    /// reported; otherwise the status is due to `on_read`. Reading stops at
    /// end-of-stream and on errors.
    pub(crate) fn read_once(&mut self) -> Option<Result<usize, OsError>> {
        if self.buffer.is_empty() {
            self.state = StreamState::Paused;
            return Some(Err(OsError::from_errno(libc::ENOBUFS)));
        }

        let span = self.buffer.span();
        let result = io::read(self.fd, span);

        if result > 0 {
            let count = result as usize;
            self.buffer.set_filled(count);

            event!(Level::TRACE, message = "read", fd = self.fd, bytes = count);

            return Some(Ok(count));
        }

        if result == 0 {
            self.state = StreamState::Paused;

            event!(Level::TRACE, message = "end of stream", fd = self.fd);

            return Some(Ok(0));
        }

        let error = OsError::from_status(result);
        if io::is_transient(error.errno()) {
            return None;
        }

        self.state = StreamState::Paused;

        event!(Level::TRACE, message = "read failed", fd = self.fd, error = %error);

        Some(Err(error))
    }

    /// Pushes the in-flight write forward, queueing its completion (and a
    /// shutdown waiting behind it) once it finishes.
    pub(crate) fn flush_write(&mut self, shared: &mut Shared) {
        let fd = self.fd;
        let Some(request) = self.write.in_flight_mut() else {
            return;
        };

        let status = match request.flush(fd) {
            Flush::Done(status) => status,
            Flush::WouldBlock => match self.sync_interest(&shared.poller) {
                Ok(()) => {
                    event!(Level::TRACE, message = "write would block", fd);
                    return;
                }
                Err(error) => Err(error),
            },
        };

        self.complete_write(status, shared);
    }

    fn complete_write(&mut self, status: Result<(), OsError>, shared: &mut Shared) {
        event!(Level::TRACE, message = "write finished", fd = self.fd, ok = status.is_ok());

        self.write.complete(status);
        shared.queue(Completion::write(self.token));

        if let Err(error) = self.sync_interest(&shared.poller) {
            event!(Level::WARN, message = "dropping write interest failed", fd = self.fd, error = %error);
        }

        self.drain_shutdown(shared);
    }

    /// Runs a requested shutdown once no write is in flight.
    pub(crate) fn drain_shutdown(&mut self, shared: &mut Shared) {
        if !self.shutdown.is_in_flight() || self.write.is_in_flight() {
            return;
        }

        // Pipes and terminals fail with ENOTSOCK; the peer sees EOF at close.
        let status = io::shutdown_write(self.fd);

        event!(
            Level::TRACE,
            message = "write side shut down",
            fd = self.fd,
            kind = ?self.kind,
            ok = status.is_ok()
        );

        self.shutdown.complete(status);
        shared.queue(Completion::shutdown(self.token));
    }

    /// Releases every OS resource the handle holds. Callbacks and slots are
    /// left to the close phase.
    pub(crate) fn release(&mut self, shared: &mut Shared) {
        if !self.interest.is_empty() {
            shared.poller.deregister(self.fd);
            self.interest = Interest::NONE;
        }

        if let Err(error) = self.terminal.restore(self.fd) {
            event!(Level::WARN, message = "restoring terminal mode failed", fd = self.fd, error = %error);
        }

        shared.descriptors.remove(&self.fd);
        io::close(self.fd);
    }
}
