use super::TtyMode;
use crate::error::OsError;

use libc::{
    BRKINT, CS8, ECHO, ICANON, ICRNL, IEXTEN, INPCK, ISIG, ISTRIP, IXON, ONLCR, TCSADRAIN,
    VMIN, VTIME, termios,
};
use std::mem;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, event};

/// The terminal state captured process-wide by the first handle that left
/// `Normal` mode. `reset` is shared with that handle and set once
/// [`reset_mode`] has put the terminal back.
struct Saved {
    fd: RawFd,
    termios: termios,
    reset: Arc<AtomicBool>,
}

static SAVED: Mutex<Option<Saved>> = Mutex::new(None);

fn saved() -> std::sync::MutexGuard<'static, Option<Saved>> {
    SAVED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-handle terminal bookkeeping.
pub(crate) struct TerminalState {
    mode: TtyMode,
    original: Option<termios>,
    /// Present while this handle owns the process-wide snapshot.
    owner: Option<Arc<AtomicBool>>,
}

impl TerminalState {
    pub(crate) fn new() -> Self {
        Self {
            mode: TtyMode::Normal,
            original: None,
            owner: None,
        }
    }

    fn was_reset(&self) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|reset| reset.load(Ordering::Acquire))
    }

    pub(crate) fn mode(&self) -> TtyMode {
        if self.was_reset() {
            return TtyMode::Normal;
        }

        self.mode
    }

    pub(crate) fn set_mode(&mut self, fd: RawFd, mode: TtyMode) -> Result<(), OsError> {
        if self.was_reset() {
            self.mode = TtyMode::Normal;
            self.owner = None;
        }

        if self.mode == mode {
            return Ok(());
        }

        let original = match self.original {
            Some(original) if self.mode != TtyMode::Normal => original,
            _ => {
                let current = get_attributes(fd)?;
                self.original = Some(current);

                let mut saved = saved();
                if saved.is_none() {
                    let reset = Arc::new(AtomicBool::new(false));
                    *saved = Some(Saved {
                        fd,
                        termios: current,
                        reset: Arc::clone(&reset),
                    });
                    self.owner = Some(reset);
                }

                current
            }
        };

        let mut next = original;
        match mode {
            TtyMode::Normal => {}
            TtyMode::Raw => {
                next.c_iflag &= !(BRKINT | ICRNL | INPCK | ISTRIP | IXON);
                next.c_oflag |= ONLCR;
                next.c_cflag |= CS8;
                next.c_lflag &= !(ECHO | ICANON | IEXTEN | ISIG);
                next.c_cc[VMIN] = 1;
                next.c_cc[VTIME] = 0;
            }
            TtyMode::Io => unsafe { libc::cfmakeraw(&mut next) },
        }

        set_attributes(fd, &next)?;
        self.mode = mode;

        event!(Level::DEBUG, message = "terminal mode set", fd, mode = ?mode);

        Ok(())
    }

    /// Returns the terminal to the mode it had before this handle changed it
    /// and drops the process-wide snapshot if this handle took it.
    pub(crate) fn restore(&mut self, fd: RawFd) -> Result<(), OsError> {
        let result = self.set_mode(fd, TtyMode::Normal);

        if let Some(owner) = self.owner.take() {
            let mut saved = saved();
            if saved
                .as_ref()
                .is_some_and(|saved| Arc::ptr_eq(&saved.reset, &owner))
            {
                *saved = None;
            }
        }

        result
    }
}

/// Restores the terminal state saved by the first handle that switched a
/// terminal out of `Normal` mode, then forgets it.
///
/// This affects the whole process and is best-effort: failures are logged, not
/// returned. Calling it when nothing was saved does nothing. The stream that
/// took the snapshot reports `Normal` afterwards, so setting a mode on it again
/// reapplies it.
pub fn reset_mode() {
    let Some(saved) = saved().take() else {
        return;
    };

    saved.reset.store(true, Ordering::Release);

    match set_attributes(saved.fd, &saved.termios) {
        Ok(()) => event!(Level::DEBUG, message = "terminal mode reset", fd = saved.fd),
        Err(error) => event!(
            Level::WARN,
            message = "terminal mode reset failed",
            fd = saved.fd,
            error = %error
        ),
    }
}

fn get_attributes(fd: RawFd) -> Result<termios, OsError> {
    let mut attributes: termios = unsafe { mem::zeroed() };

    if unsafe { libc::tcgetattr(fd, &mut attributes) } < 0 {
        return Err(OsError::last());
    }

    Ok(attributes)
}

fn set_attributes(fd: RawFd, attributes: &termios) -> Result<(), OsError> {
    loop {
        if unsafe { libc::tcsetattr(fd, TCSADRAIN, attributes) } == 0 {
            return Ok(());
        }

        let error = OsError::last();
        if error.errno() != libc::EINTR {
            return Err(error);
        }
    }
}
