use super::Stream;
use crate::error::OsError;

type CompletionFn<'a, C> = dyn FnMut(&mut C, &mut Stream<'_, 'a>, Result<(), OsError>) + 'a;
type ReadFn<'a, C> = dyn FnMut(&mut C, &mut Stream<'_, 'a>, Result<usize, OsError>) + 'a;
type CloseFn<'a, C> = dyn FnOnce(&mut C) + 'a;

/// The capability bundle a stream reports through.
///
/// Every callback receives the bundle's context first, so state shared between
/// the four notifications lives in one place. The bundle is handed to the
/// reactor at [`Reactor::open`](crate::Reactor::open) and released right after
/// `on_close` returns; nothing is invoked after that.
///
/// Callbacks left unset do nothing.
///
/// ```ignore
/// let callbacks = Callbacks::new(Vec::new())
///     .on_read(|seen, stream, status| {
///         if let Ok(n) = status {
///             seen.extend_from_slice(&stream.read_buffer()[..n]);
///         }
///     })
///     .on_close(|seen| println!("{} bytes", seen.len()));
/// ```
pub struct Callbacks<'a, C> {
    context: C,
    on_write: Box<CompletionFn<'a, C>>,
    on_end: Box<CompletionFn<'a, C>>,
    on_read: Box<ReadFn<'a, C>>,
    on_close: Box<CloseFn<'a, C>>,
}

fn ignore<C, T>(_: &mut C, _: &mut Stream<'_, '_>, _: T) {}

fn ignore_close<C>(_: &mut C) {}

impl<'a, C: 'a> Callbacks<'a, C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            on_write: Box::new(ignore::<C, Result<(), OsError>>),
            on_end: Box::new(ignore::<C, Result<(), OsError>>),
            on_read: Box::new(ignore::<C, Result<usize, OsError>>),
            on_close: Box::new(ignore_close::<C>),
        }
    }

    /// Called once per `writev` with the final status of the write.
    pub fn on_write<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut C, &mut Stream<'_, 'a>, Result<(), OsError>) + 'a,
    {
        self.on_write = Box::new(callback);
        self
    }

    /// Called once per `end` with the status of the half-close.
    pub fn on_end<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut C, &mut Stream<'_, 'a>, Result<(), OsError>) + 'a,
    {
        self.on_end = Box::new(callback);
        self
    }

    /// Called per read cycle: `Ok(n)` with `n > 0` bytes, `Ok(0)` at
    /// end-of-stream, or the error that stopped reading.
    pub fn on_read<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut C, &mut Stream<'_, 'a>, Result<usize, OsError>) + 'a,
    {
        self.on_read = Box::new(callback);
        self
    }

    /// Called exactly once, last, after the stream has been closed.
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut C) + 'a,
    {
        self.on_close = Box::new(callback);
        self
    }

    pub fn context(&self) -> &C {
        &self.context
    }
}

/// Type-erased view of a [`Callbacks`] bundle as stored on a handle.
pub(crate) trait Dispatch<'a> {
    fn write_complete(&mut self, stream: &mut Stream<'_, 'a>, status: Result<(), OsError>);

    fn shutdown_complete(&mut self, stream: &mut Stream<'_, 'a>, status: Result<(), OsError>);

    fn data_available(&mut self, stream: &mut Stream<'_, 'a>, status: Result<usize, OsError>);

    /// Fires `on_close` and releases the bundle.
    fn closed(self: Box<Self>);
}

impl<'a, C: 'a> Dispatch<'a> for Callbacks<'a, C> {
    fn write_complete(&mut self, stream: &mut Stream<'_, 'a>, status: Result<(), OsError>) {
        (self.on_write)(&mut self.context, stream, status);
    }

    fn shutdown_complete(&mut self, stream: &mut Stream<'_, 'a>, status: Result<(), OsError>) {
        (self.on_end)(&mut self.context, stream, status);
    }

    fn data_available(&mut self, stream: &mut Stream<'_, 'a>, status: Result<usize, OsError>) {
        (self.on_read)(&mut self.context, stream, status);
    }

    fn closed(self: Box<Self>) {
        let Callbacks {
            mut context,
            on_close,
            ..
        } = *self;

        on_close(&mut context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn closed_fires_on_close_then_releases_context() {
        let released = Rc::new(Cell::new(false));

        struct Guard(Rc<Cell<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let seen = Rc::new(Cell::new(0));
        let callbacks = Callbacks::new(Guard(released.clone())).on_close({
            let seen = seen.clone();
            let released = released.clone();
            move |_| {
                assert!(!released.get(), "context released before on_close");
                seen.set(seen.get() + 1);
            }
        });

        let bundle: Box<dyn Dispatch<'_>> = Box::new(callbacks);
        bundle.closed();

        assert_eq!(seen.get(), 1);
        assert!(released.get());
    }

    #[test]
    fn default_callbacks_keep_the_context() {
        let callbacks = Callbacks::<'_, u32>::new(7);

        assert_eq!(*callbacks.context(), 7);

        // The no-op on_close must not panic.
        let bundle: Box<dyn Dispatch<'_>> = Box::new(callbacks);
        bundle.closed();
    }
}
