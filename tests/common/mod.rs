#![allow(dead_code)]

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use ttystream::Callbacks;

/// One callback invocation, with OS errors reduced to their code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Read(Result<usize, &'static str>),
    Write(Result<(), &'static str>),
    End(Result<(), &'static str>),
    Close,
}

#[derive(Debug, Default)]
pub struct Log {
    pub events: Vec<Event>,
    pub data: Vec<u8>,
}

pub type SharedLog = Rc<RefCell<Log>>;

pub fn log() -> SharedLog {
    Rc::new(RefCell::new(Log::default()))
}

/// When the recording callbacks close their own stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOn {
    Never,
    /// End-of-stream or a read error.
    Eof,
    /// Any read callback.
    AnyRead,
}

/// Callbacks that append every invocation to `log`.
pub fn recording<'a>(log: &SharedLog, close_on: CloseOn) -> Callbacks<'a, SharedLog> {
    Callbacks::new(log.clone())
        .on_read(move |log, stream, status| {
            {
                let mut log = log.borrow_mut();
                if let Ok(n) = status {
                    log.data.extend_from_slice(&stream.read_buffer()[..n]);
                }
                log.events.push(Event::Read(status.clone().map_err(|e| e.code())));
            }

            let close = match close_on {
                CloseOn::Never => false,
                CloseOn::Eof => !matches!(status, Ok(n) if n > 0),
                CloseOn::AnyRead => true,
            };
            if close {
                stream.close().expect("close from on_read");
            }
        })
        .on_write(|log, _, status| {
            log.borrow_mut()
                .events
                .push(Event::Write(status.map_err(|e| e.code())));
        })
        .on_end(|log, _, status| {
            log.borrow_mut()
                .events
                .push(Event::End(status.map_err(|e| e.code())));
        })
        .on_close(|log| log.borrow_mut().events.push(Event::Close))
}

pub fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

pub fn socketpair() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(res, 0, "socketpair() failed");
    (fds[0], fds[1])
}

pub fn write_all(fd: RawFd, mut data: &[u8]) {
    while !data.is_empty() {
        let n = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
        assert!(n > 0, "write() failed");
        data = &data[n as usize..];
    }
}

/// One blocking read of up to 4096 bytes.
pub fn read_some(fd: RawFd) -> Vec<u8> {
    let mut chunk = [0u8; 4096];
    let n = unsafe { libc::read(fd, chunk.as_mut_ptr().cast(), chunk.len()) };
    assert!(n >= 0, "read() failed");
    chunk[..n as usize].to_vec()
}

/// Blocking reads until `len` bytes arrived or the writer went away.
pub fn read_exact(fd: RawFd, len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let chunk = read_some(fd);
        if chunk.is_empty() {
            break;
        }
        data.extend_from_slice(&chunk);
    }
    data
}

pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}
