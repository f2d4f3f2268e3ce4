//! Event-driven readiness reactor.
//!
//! - [`core`]: the reactor, its registry of streams and the turn phases
//! - [`poller`]: epoll (Linux) and kqueue (macOS) backends
//! - [`io`]: descriptor syscalls

pub(crate) mod core;
pub(crate) mod io;
pub(crate) mod poller;
