use crate::builder::ReactorBuilder;
use crate::error::{ContractViolation, OsError, Result, StreamError};
use crate::reactor::io;
use crate::reactor::poller::{Poller, Readiness};
use crate::stream::handle::StreamHandle;
use crate::stream::{Callbacks, Dispatch, Stream, StreamId, StreamState};
use crate::tty::{self, HandleType};
use crate::utils::slab::Slab;

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionKind {
    Write,
    Shutdown,
}

/// A finished request waiting for the pending phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    token: usize,
    kind: CompletionKind,
}

impl Completion {
    pub(crate) fn write(token: usize) -> Self {
        Self {
            token,
            kind: CompletionKind::Write,
        }
    }

    pub(crate) fn shutdown(token: usize) -> Self {
        Self {
            token,
            kind: CompletionKind::Shutdown,
        }
    }
}

/// Reactor state a stream operation may touch besides its own handle.
pub(crate) struct Shared {
    pub(crate) poller: Poller,
    pub(crate) completions: VecDeque<Completion>,
    pub(crate) closing: VecDeque<usize>,
    pub(crate) descriptors: HashMap<RawFd, usize>,
}

impl Shared {
    pub(crate) fn queue(&mut self, completion: Completion) {
        self.completions.push_back(completion);
    }
}

/// Single-threaded readiness loop owning every stream opened on it.
///
/// `'a` is the lifetime of everything streams borrow from the host: read
/// buffers, write segments and callbacks.
///
/// One turn polls for readiness and delivers reads and write progress, then
/// reports finished writes and shutdowns in submission order, then runs
/// `on_close` for streams closed before the phase started.
pub struct Reactor<'a> {
    shared: Shared,
    handles: Slab<StreamHandle<'a>>,
    ready: Vec<Readiness>,
    next_serial: u64,
    blocking_tty_writes: bool,
}

impl<'a> Reactor<'a> {
    /// A reactor with the default configuration.
    pub fn new() -> Result<Self> {
        ReactorBuilder::new().build()
    }

    pub(crate) fn with_config(event_capacity: usize, blocking_tty_writes: bool) -> Result<Self> {
        let poller = Poller::new(event_capacity)?;

        event!(
            Level::DEBUG,
            message = "reactor created",
            event_capacity,
            blocking_tty_writes
        );

        Ok(Self {
            shared: Shared {
                poller,
                completions: VecDeque::new(),
                closing: VecDeque::new(),
                descriptors: HashMap::new(),
            },
            handles: Slab::new(),
            ready: Vec::with_capacity(event_capacity),
            next_serial: 0,
            blocking_tty_writes,
        })
    }

    /// Adopts `fd` as a paused stream.
    ///
    /// The stream owns the descriptor from here on and closes it at
    /// [`Stream::close`] (standard descriptors 0 to 2 are never closed). Each
    /// read cycle fills `read_buffer`, which stays borrowed for the lifetime of
    /// the reactor.
    ///
    /// Fails with [`StreamError::Init`] when the descriptor is not a terminal,
    /// pipe or socket (`EINVAL`), is already owned by an open stream
    /// (`EEXIST`), or cannot be inspected or watched.
    pub fn open<C: 'a>(
        &mut self,
        fd: RawFd,
        read_buffer: &'a mut [u8],
        callbacks: Callbacks<'a, C>,
    ) -> Result<StreamId> {
        let kind = tty::classify(fd).map_err(StreamError::Init)?;
        if !kind.is_streamable() {
            return Err(StreamError::Init(OsError::from_errno(libc::EINVAL)));
        }

        if self.shared.descriptors.contains_key(&fd) {
            return Err(StreamError::Init(OsError::from_errno(libc::EEXIST)));
        }

        let (readable, writable) = io::access_mode(fd).map_err(StreamError::Init)?;

        // Descriptor flags stay untouched until the poller accepts the fd.
        let token = self.handles.next_key();
        self.shared
            .poller
            .register(fd, token)
            .map_err(StreamError::Init)?;

        if kind == HandleType::Tty && self.blocking_tty_writes {
            if let Err(error) = io::set_blocking(fd, true) {
                event!(Level::WARN, message = "setting terminal blocking failed", fd, error = %error);
            }
        } else {
            io::set_blocking(fd, false).map_err(StreamError::Init)?;
        }

        let serial = self.next_serial;
        self.next_serial += 1;

        let callbacks: Box<dyn Dispatch<'a> + 'a> = Box::new(callbacks);
        let handle = StreamHandle::new(
            token,
            serial,
            fd,
            kind,
            readable,
            writable,
            read_buffer,
            callbacks,
        );

        let index = self.handles.insert(handle);
        debug_assert_eq!(index, token);
        self.shared.descriptors.insert(fd, token);

        event!(
            Level::DEBUG,
            message = "stream opened",
            fd,
            kind = ?kind,
            readable,
            writable
        );

        Ok(StreamId {
            index: token,
            serial,
        })
    }

    /// A view of an open stream. Streams stay reachable while closing, until
    /// their `on_close` has fired.
    pub fn stream(&mut self, id: StreamId) -> Result<Stream<'_, 'a>> {
        let handle = self
            .handles
            .get_mut(id.index)
            .filter(|handle| handle.serial == id.serial)
            .ok_or(ContractViolation::NotOpen)?;

        Ok(Stream::new(handle, &mut self.shared))
    }

    /// Number of streams not yet fully closed.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether every stream has finished closing.
    pub fn is_empty(&self) -> bool {
        self.handles.len() == 0
    }

    /// Whether another turn could deliver a callback: a stream is reading, a
    /// request is outstanding, or a close is pending.
    pub fn is_alive(&self) -> bool {
        !self.shared.completions.is_empty()
            || !self.shared.closing.is_empty()
            || self.handles.iter().any(|(_, handle)| {
                handle.state == StreamState::Reading
                    || !handle.write.is_idle()
                    || !handle.shutdown.is_idle()
            })
    }

    /// Turns until nothing is alive.
    pub fn run(&mut self) -> Result<()> {
        while self.run_once()? {}

        Ok(())
    }

    /// One turn, waiting for readiness if nothing is queued. Returns whether
    /// the reactor is still alive afterwards.
    pub fn run_once(&mut self) -> Result<bool> {
        if !self.is_alive() {
            return Ok(false);
        }

        let queued = !self.shared.completions.is_empty() || !self.shared.closing.is_empty();
        self.turn(if queued { Some(Duration::ZERO) } else { None })
    }

    /// One turn that never waits for readiness.
    pub fn run_nowait(&mut self) -> Result<bool> {
        self.turn(Some(Duration::ZERO))
    }

    /// Closes every stream that is not already closing, then calls
    /// [`reset_mode`](crate::reset_mode). `on_close` callbacks fire on the next
    /// turn.
    ///
    /// The reset is process-wide: a terminal whose snapshot was taken by a
    /// stream on another reactor is put back too, and that stream then reports
    /// [`TtyMode::Normal`](crate::TtyMode::Normal).
    pub fn close_all(&mut self) {
        let Self {
            handles, shared, ..
        } = self;

        for (_, handle) in handles.iter_mut() {
            if handle.state != StreamState::Closing {
                let mut stream = Stream::new(handle, shared);
                // Only fails for streams already closing.
                let _ = stream.close();
            }
        }

        tty::reset_mode();
    }

    fn turn(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let mut ready = mem::take(&mut self.ready);
        ready.clear();

        let polled = self.shared.poller.poll(&mut ready, timeout);
        if let Err(error) = polled {
            self.ready = ready;
            return Err(error.into());
        }

        for readiness in ready.drain(..) {
            self.process_readiness(readiness);
        }
        self.ready = ready;

        self.process_completions();
        self.process_closing();

        Ok(self.is_alive())
    }

    fn process_readiness(&mut self, readiness: Readiness) {
        let Self {
            handles, shared, ..
        } = self;

        if readiness.readable {
            if let Some(handle) = handles.get_mut(readiness.token) {
                if handle.state == StreamState::Reading {
                    if let Some(status) = handle.read_once() {
                        if let Err(error) = handle.sync_interest(&shared.poller) {
                            event!(Level::WARN, message = "dropping read interest failed", fd = handle.fd, error = %error);
                        }

                        dispatch(handle, shared, |callbacks, stream| {
                            callbacks.data_available(stream, status)
                        });
                    }
                }
            }
        }

        if readiness.writable {
            if let Some(handle) = handles.get_mut(readiness.token) {
                if handle.state != StreamState::Closing {
                    handle.flush_write(shared);
                }
            }
        }
    }

    fn process_completions(&mut self) {
        let batch = mem::take(&mut self.shared.completions);

        for completion in batch {
            let Some(handle) = self.handles.get_mut(completion.token) else {
                continue;
            };

            match completion.kind {
                CompletionKind::Write => {
                    if let Some(status) = handle.write.take_completed() {
                        dispatch(handle, &mut self.shared, |callbacks, stream| {
                            callbacks.write_complete(stream, status)
                        });
                    }
                }
                CompletionKind::Shutdown => {
                    if let Some(status) = handle.shutdown.take_completed() {
                        dispatch(handle, &mut self.shared, |callbacks, stream| {
                            callbacks.shutdown_complete(stream, status)
                        });
                    }
                }
            }
        }
    }

    fn process_closing(&mut self) {
        let batch = mem::take(&mut self.shared.closing);

        for token in batch {
            let Some(handle) = self.handles.get_mut(token) else {
                continue;
            };

            if let Some(status) = handle.write.cancel() {
                dispatch(handle, &mut self.shared, |callbacks, stream| {
                    callbacks.write_complete(stream, status)
                });
            }

            if let Some(status) = handle.shutdown.cancel() {
                dispatch(handle, &mut self.shared, |callbacks, stream| {
                    callbacks.shutdown_complete(stream, status)
                });
            }

            let Some(mut handle) = self.handles.remove(token) else {
                continue;
            };
            self.shared
                .completions
                .retain(|completion| completion.token != token);

            event!(Level::DEBUG, message = "stream closed", fd = handle.fd);

            if let Some(callbacks) = handle.callbacks.take() {
                callbacks.closed();
            }
        }
    }
}

/// Lends the handle's callbacks a view of their own stream. The bundle is
/// taken out for the duration of the call, so a callback may operate on the
/// stream, including closing it.
fn dispatch<'a>(
    handle: &mut StreamHandle<'a>,
    shared: &mut Shared,
    call: impl FnOnce(&mut (dyn Dispatch<'a> + 'a), &mut Stream<'_, 'a>),
) {
    let Some(mut callbacks) = handle.callbacks.take() else {
        return;
    };

    let mut stream = Stream::new(handle, shared);
    call(callbacks.as_mut(), &mut stream);

    handle.callbacks = Some(callbacks);
}

impl Drop for Reactor<'_> {
    fn drop(&mut self) {
        let mut released = 0usize;

        for mut handle in self.handles.drain() {
            if handle.state != StreamState::Closing {
                handle.release(&mut self.shared);
                released += 1;
            }
        }

        if released > 0 {
            event!(Level::DEBUG, message = "reactor dropped open streams", count = released);
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    use libc::{F_GETFL, fcntl};
    use std::os::unix::io::AsRawFd;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0i32; 2];
        let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(res, 0, "pipe() failed");
        (fds[0], fds[1])
    }

    #[test]
    fn failed_registration_leaves_descriptor_flags_alone() {
        let mut buffer = [0u8; 8];
        let (read, write) = pipe();
        let (spare_read, spare_write) = pipe();
        let mut reactor = Reactor::new().expect("reactor");

        // epoll_ctl on a descriptor that is not an epoll instance fails with EINVAL.
        let poller = reactor.shared.poller.as_raw_fd();
        assert_eq!(unsafe { libc::dup2(spare_read, poller) }, poller);

        let before = unsafe { fcntl(read, F_GETFL) };
        let error = reactor
            .open(read, &mut buffer, Callbacks::new(()))
            .unwrap_err();

        assert_eq!(error, StreamError::Init(OsError::from_errno(libc::EINVAL)));
        assert_eq!(unsafe { fcntl(read, F_GETFL) }, before);
        assert!(reactor.is_empty());
        assert!(!reactor.shared.descriptors.contains_key(&read));

        drop(reactor);
        unsafe {
            libc::close(read);
            libc::close(write);
            libc::close(spare_read);
            libc::close(spare_write);
        }
    }
}
