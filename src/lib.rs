//! Callback-driven byte streams over terminals, pipes and sockets.
//!
//! A [`Reactor`] adopts descriptors as streams and drives them from a
//! single-threaded readiness loop. Every stream reads into one caller-owned
//! buffer, has at most one write and one shutdown in flight, and reports
//! through a [`Callbacks`] bundle until `on_close` has fired. Terminals can be
//! switched between line-discipline modes and restored process-wide with
//! [`reset_mode`].
//!
//! # Architecture
//!
//! - **Reactor**: registry of streams, epoll/kqueue polling, turn phases
//! - **Stream**: view of one stream for operations and inside callbacks
//! - **Callbacks**: context plus `on_read`, `on_write`, `on_end`, `on_close`
//! - **ReactorBuilder**: fluent configuration
//! - **tty**: terminal modes, window size, descriptor classification
//! - **OsError**: named OS errors (`EPIPE`, "broken pipe")
//!
//! # Example
//! ```ignore
//! let mut buffer = [0u8; DEFAULT_READ_BUFFER_SIZE];
//! let mut reactor = Reactor::new()?;
//!
//! let callbacks = Callbacks::new(()).on_read(|_, stream, status| match status {
//!     Ok(0) | Err(_) => drop(stream.close()),
//!     Ok(n) => print!("{}", String::from_utf8_lossy(&stream.read_buffer()[..n])),
//! });
//!
//! let id = reactor.open(0, &mut buffer, callbacks)?;
//! reactor.stream(id)?.resume()?;
//! reactor.run()?;
//! ```

mod builder;
mod error;
mod reactor;
mod stream;
mod tty;
mod utils;

pub use builder::ReactorBuilder;
pub use error::{ContractViolation, OsError, Result, StreamError};
pub use reactor::core::Reactor;
pub use stream::{Callbacks, DEFAULT_READ_BUFFER_SIZE, Stream, StreamId, StreamState};
pub use tty::{HandleType, TtyMode, WindowSize, guess_handle, is_terminal, reset_mode};
