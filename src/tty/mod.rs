//! Terminal modes and descriptor introspection.
//!
//! These operations are synchronous: they talk to the OS directly and never
//! touch a stream's pending requests.

mod terminal;

pub use terminal::reset_mode;
pub(crate) use terminal::TerminalState;

use crate::error::OsError;

use std::mem;
use std::os::unix::io::RawFd;

/// Terminal line-discipline modes. The numeric values are stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TtyMode {
    /// The mode the terminal had before any handle changed it.
    #[default]
    Normal = 0,

    /// Character-at-a-time input without echo or signal keys; output
    /// post-processing is kept so `\n` still moves to a new line.
    Raw = 1,

    /// Fully raw binary I/O (`cfmakeraw`). Not available on Windows consoles.
    Io = 2,
}

impl TtyMode {
    /// The stable numeric value; [`TryFrom<u32>`] maps it back.
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for TtyMode {
    type Error = OsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Raw),
            2 => Ok(Self::Io),
            _ => Err(OsError::from_errno(libc::EINVAL)),
        }
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub columns: u16,
    pub rows: u16,
}

/// What kind of object a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Tty,
    /// Anonymous pipe or FIFO.
    Pipe,
    Socket,
    /// Regular file or non-terminal character device.
    File,
    Unknown,
}

impl HandleType {
    /// Whether a stream can be opened on this kind of descriptor.
    pub fn is_streamable(self) -> bool {
        matches!(self, Self::Tty | Self::Pipe | Self::Socket)
    }
}

/// Reports whether `fd` refers to a terminal.
pub fn is_terminal(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Classifies `fd`; descriptors that cannot be inspected are `Unknown`.
pub fn guess_handle(fd: RawFd) -> HandleType {
    classify(fd).unwrap_or(HandleType::Unknown)
}

pub(crate) fn classify(fd: RawFd) -> Result<HandleType, OsError> {
    let mut stat: libc::stat = unsafe { mem::zeroed() };

    if unsafe { libc::fstat(fd, &mut stat) } < 0 {
        return Err(OsError::last());
    }

    let kind = match stat.st_mode & libc::S_IFMT {
        libc::S_IFIFO => HandleType::Pipe,
        libc::S_IFSOCK => HandleType::Socket,
        libc::S_IFCHR if is_terminal(fd) => HandleType::Tty,
        libc::S_IFREG | libc::S_IFCHR => HandleType::File,
        _ => HandleType::Unknown,
    };

    Ok(kind)
}

pub(crate) fn window_size(fd: RawFd) -> Result<WindowSize, OsError> {
    let mut size: libc::winsize = unsafe { mem::zeroed() };

    loop {
        if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) } == 0 {
            break;
        }

        let error = OsError::last();
        if error.errno() != libc::EINTR {
            return Err(error);
        }
    }

    Ok(WindowSize {
        columns: size.ws_col,
        rows: size.ws_row,
    })
}
