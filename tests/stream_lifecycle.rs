mod common;

use std::os::unix::io::AsRawFd;

use common::{CloseOn, Event};
use static_assertions::{assert_impl_all, assert_not_impl_any};
use ttystream::{
    Callbacks, ContractViolation, HandleType, OsError, Reactor, StreamError, StreamState,
};

assert_not_impl_any!(Reactor<'static>: Send, Sync);
assert_impl_all!(StreamError: std::error::Error, Send, Sync, Clone);
assert_impl_all!(OsError: std::error::Error, Send, Sync, Clone);

fn closing() -> StreamError {
    StreamError::ContractViolation(ContractViolation::Closing)
}

#[test]
fn test_open_then_close_fires_only_on_close() {
    let log = common::log();
    let mut buffer = [0u8; 64];
    let (read, write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let id = reactor
        .open(read, &mut buffer, common::recording(&log, CloseOn::Never))
        .unwrap();

    {
        let stream = reactor.stream(id).unwrap();
        assert_eq!(stream.state(), StreamState::Paused);
        assert_eq!(stream.handle_type(), HandleType::Pipe);
        assert!(stream.is_readable());
        assert!(!stream.is_writable());
        assert_eq!(stream.as_raw_fd(), read);
    }
    assert!(!reactor.is_alive());

    reactor.stream(id).unwrap().close().unwrap();
    assert_eq!(reactor.stream(id).unwrap().state(), StreamState::Closing);

    // on_close is deferred to the close phase.
    assert!(log.borrow().events.is_empty());
    assert!(reactor.is_alive());

    reactor.run().unwrap();

    assert_eq!(log.borrow().events, vec![Event::Close]);
    assert!(reactor.is_empty());

    common::close(write);
}

#[test]
fn test_close_while_reading_delivers_no_read() {
    let log = common::log();
    let mut buffer = [0u8; 64];
    let (read, write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let id = reactor
        .open(read, &mut buffer, common::recording(&log, CloseOn::Never))
        .unwrap();

    reactor.stream(id).unwrap().resume().unwrap();
    common::write_all(write, b"pending");
    reactor.stream(id).unwrap().close().unwrap();

    reactor.run().unwrap();

    assert_eq!(log.borrow().events, vec![Event::Close]);
    assert!(log.borrow().data.is_empty());

    common::close(write);
}

#[test]
fn test_operations_after_close() {
    let log = common::log();
    let mut buffer = [0u8; 64];
    let (local, peer) = common::socketpair();

    let mut reactor = Reactor::new().unwrap();
    let id = reactor
        .open(local, &mut buffer, common::recording(&log, CloseOn::Never))
        .unwrap();

    let mut stream = reactor.stream(id).unwrap();
    stream.close().unwrap();

    assert_eq!(stream.write(b"late"), Err(closing()));
    assert_eq!(stream.end(), Err(closing()));
    assert_eq!(stream.resume(), Err(closing()));
    assert_eq!(stream.pause(), Err(closing()));
    assert_eq!(stream.close(), Err(closing()));
    assert_eq!(stream.set_raw_mode(true), Err(closing()));

    reactor.run().unwrap();
    assert_eq!(log.borrow().events, vec![Event::Close]);

    assert!(matches!(
        reactor.stream(id),
        Err(StreamError::ContractViolation(ContractViolation::NotOpen))
    ));

    // The peer sees the close.
    assert!(common::read_some(peer).is_empty());
    common::close(peer);
}

#[test]
fn test_closed_id_stays_stale_after_slot_reuse() {
    let first_log = common::log();
    let second_log = common::log();
    let mut first_buffer = [0u8; 16];
    let mut second_buffer = [0u8; 16];
    let (first_read, first_write) = common::pipe();
    let (second_read, second_write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let first = reactor
        .open(
            first_read,
            &mut first_buffer,
            common::recording(&first_log, CloseOn::Never),
        )
        .unwrap();
    reactor.stream(first).unwrap().close().unwrap();
    reactor.run().unwrap();

    let second = reactor
        .open(
            second_read,
            &mut second_buffer,
            common::recording(&second_log, CloseOn::Never),
        )
        .unwrap();

    assert_ne!(first, second);
    assert!(reactor.stream(first).is_err());
    assert!(reactor.stream(second).is_ok());
    assert_eq!(reactor.len(), 1);

    common::close(first_write);
    common::close(second_write);
}

#[test]
fn test_open_rejects_regular_file() {
    let file = tempfile::tempfile().unwrap();
    let mut buffer = [0u8; 16];

    let mut reactor = Reactor::new().unwrap();
    let error = reactor
        .open(file.as_raw_fd(), &mut buffer, Callbacks::new(()))
        .unwrap_err();

    assert!(matches!(error, StreamError::Init(_)));
    assert_eq!(error.code(), Some("EINVAL"));
    assert!(reactor.is_empty());
}

#[test]
fn test_open_rejects_bad_descriptor() {
    let mut buffer = [0u8; 16];

    let mut reactor = Reactor::new().unwrap();
    let error = reactor.open(-1, &mut buffer, Callbacks::new(())).unwrap_err();

    assert!(matches!(error, StreamError::Init(_)));
    assert_eq!(error.code(), Some("EBADF"));
}

#[test]
fn test_open_rejects_descriptor_already_owned() {
    let mut first = [0u8; 16];
    let mut second = [0u8; 16];
    let (read, write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    reactor.open(read, &mut first, Callbacks::new(())).unwrap();

    let error = reactor.open(read, &mut second, Callbacks::new(())).unwrap_err();
    assert!(matches!(error, StreamError::Init(_)));
    assert_eq!(error.code(), Some("EEXIST"));
    assert_eq!(reactor.len(), 1);

    common::close(write);
}

#[test]
fn test_resume_and_pause_transitions() {
    let mut buffer = [0u8; 16];
    let (read, write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let id = reactor.open(read, &mut buffer, Callbacks::new(())).unwrap();
    let mut stream = reactor.stream(id).unwrap();

    assert_eq!(stream.pause().unwrap_err().code(), Some("EINVAL"));

    stream.resume().unwrap();
    assert_eq!(stream.state(), StreamState::Reading);
    assert_eq!(stream.resume().unwrap_err().code(), Some("EALREADY"));

    stream.pause().unwrap();
    assert_eq!(stream.state(), StreamState::Paused);
    assert_eq!(stream.pause().unwrap_err().code(), Some("EINVAL"));

    assert!(!reactor.is_alive());

    common::close(write);
}

#[test]
fn test_resume_on_write_only_end_is_enotconn() {
    let mut buffer = [0u8; 16];
    let (read, write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let id = reactor.open(write, &mut buffer, Callbacks::new(())).unwrap();

    let error = reactor.stream(id).unwrap().resume().unwrap_err();
    assert!(matches!(error, StreamError::Io(_)));
    assert_eq!(error.code(), Some("ENOTCONN"));

    common::close(read);
}

#[test]
fn test_drop_closes_open_streams_without_callbacks() {
    let log = common::log();
    let (read, write) = common::pipe();

    {
        let mut buffer = [0u8; 16];
        let mut reactor = Reactor::new().unwrap();
        reactor
            .open(write, &mut buffer, common::recording(&log, CloseOn::Never))
            .unwrap();
    }

    assert!(log.borrow().events.is_empty());
    // The write end was closed with the reactor.
    assert!(common::read_some(read).is_empty());

    common::close(read);
}

#[test]
fn test_close_all_closes_each_stream_once() {
    let first = common::log();
    let second = common::log();
    let mut first_buffer = [0u8; 16];
    let mut second_buffer = [0u8; 16];
    let (first_read, first_write) = common::pipe();
    let (second_read, second_write) = common::pipe();

    let mut reactor = Reactor::new().unwrap();
    let reader = reactor
        .open(first_read, &mut first_buffer, common::recording(&first, CloseOn::Never))
        .unwrap();
    let writer = reactor
        .open(second_write, &mut second_buffer, common::recording(&second, CloseOn::Never))
        .unwrap();
    reactor.stream(reader).unwrap().resume().unwrap();

    reactor.close_all();
    // Streams already closing are left alone.
    reactor.close_all();

    assert_eq!(reactor.len(), 2);
    assert_eq!(reactor.stream(reader).unwrap().state(), StreamState::Closing);
    assert_eq!(reactor.stream(writer).unwrap().state(), StreamState::Closing);
    assert!(first.borrow().events.is_empty());

    reactor.run().unwrap();

    assert_eq!(first.borrow().events, vec![Event::Close]);
    assert_eq!(second.borrow().events, vec![Event::Close]);
    assert!(reactor.is_empty());
    assert!(common::read_some(second_read).is_empty());

    common::close(first_write);
    common::close(second_read);
}
