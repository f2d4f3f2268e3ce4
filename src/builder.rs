//! Fluent builder for Reactor construction.

use crate::error::Result;
use crate::reactor::core::Reactor;

/// Default number of readiness events collected per poll.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Upper bound on the event capacity; the poll syscalls take an `i32` count.
const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Builder for configuring a [`Reactor`].
///
/// # Example
/// ```ignore
/// let reactor = ReactorBuilder::new()
///     .event_capacity(16)
///     .blocking_tty_writes(false)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ReactorBuilder {
    event_capacity: usize,
    blocking_tty_writes: bool,
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactorBuilder {
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            blocking_tty_writes: true,
        }
    }

    /// How many readiness events one poll can return, between 1 and 65536.
    /// Values outside that range are clamped.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.clamp(1, MAX_EVENT_CAPACITY);
        self
    }

    /// Whether terminals are switched to blocking mode when opened, so writes
    /// to them complete in one call. Enabled by default.
    pub fn blocking_tty_writes(mut self, enable: bool) -> Self {
        self.blocking_tty_writes = enable;
        self
    }

    /// Creates the reactor and its poller.
    pub fn build<'a>(self) -> Result<Reactor<'a>> {
        Reactor::with_config(self.event_capacity, self.blocking_tty_writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let builder = ReactorBuilder::default();

        assert_eq!(builder.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(builder.blocking_tty_writes);
    }

    #[test]
    fn event_capacity_has_a_floor() {
        let builder = ReactorBuilder::new().event_capacity(0);

        assert_eq!(builder.event_capacity, 1);
    }

    #[test]
    fn event_capacity_has_a_ceiling() {
        let builder = ReactorBuilder::new().event_capacity(usize::MAX);
        assert_eq!(builder.event_capacity, MAX_EVENT_CAPACITY);

        let builder = ReactorBuilder::new().event_capacity(i32::MAX as usize + 1);
        assert_eq!(builder.event_capacity, MAX_EVENT_CAPACITY);
    }

    #[test]
    fn build_creates_an_idle_reactor() {
        let mut reactor = ReactorBuilder::new()
            .event_capacity(4)
            .blocking_tty_writes(false)
            .build()
            .expect("reactor");

        assert!(reactor.is_empty());
        assert!(!reactor.is_alive());
        assert_eq!(reactor.run_once(), Ok(false));
        assert_eq!(reactor.run_nowait(), Ok(false));
    }
}
