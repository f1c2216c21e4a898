//! Firmware update state shared by the update service and the main loop.

use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use log::{error, info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateKind {
    Firmware,
    Filesystem,
}

impl UpdateKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Firmware => "sketch",
            Self::Filesystem => "filesystem",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateError {
    AlreadyRunning,
    EmptyImage,
    ImageTooLarge,
    Overrun,
    Incomplete,
    Sink,
    Aborted,
    Unsupported,
}

/// Process-wide "update in progress" flag.
pub struct UpdateTracker {
    updating: AtomicBool,
    last_percent: AtomicU8,
}

impl Default for UpdateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTracker {
    pub const fn new() -> Self {
        Self {
            updating: AtomicBool::new(false),
            last_percent: AtomicU8::new(u8::MAX),
        }
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn begin(&self, kind: UpdateKind) -> Result<(), UpdateError> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UpdateError::AlreadyRunning);
        }
        self.last_percent.store(u8::MAX, Ordering::Relaxed);
        info!("start updating {}", kind.as_str());
        Ok(())
    }

    pub fn progress(&self, done: u32, total: u32) {
        if total == 0 {
            return;
        }
        let percent = ((done as u64 * 100) / total as u64).min(100) as u8;
        if self.last_percent.swap(percent, Ordering::Relaxed) != percent {
            info!("update progress: {}%", percent);
        }
    }

    pub fn end(&self) {
        self.updating.store(false, Ordering::Release);
        info!("update end");
    }

    pub fn fail(&self, err: UpdateError) {
        self.updating.store(false, Ordering::Release);
        error!("update error: {:?}", err);
    }
}

/// Destination of a streamed image.
pub trait ImageSink {
    type Error: Debug;

    fn capacity(&self) -> u32;
    fn write(&mut self, offset: u32, chunk: &[u8]) -> Result<(), Self::Error>;
    fn finish(&mut self) -> Result<(), Self::Error>;
}

impl<S: ImageSink> ImageSink for &mut S {
    type Error = S::Error;

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }

    fn write(&mut self, offset: u32, chunk: &[u8]) -> Result<(), Self::Error> {
        (**self).write(offset, chunk)
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        (**self).finish()
    }
}

/// One transfer of a known-length image.
///
/// Dropping an unfinished session reports it as aborted so the update flag
/// never stays set.
pub struct UpdateSession<'a, S: ImageSink> {
    tracker: &'a UpdateTracker,
    sink: S,
    total: u32,
    received: u32,
    closed: bool,
}

impl<'a, S: ImageSink> UpdateSession<'a, S> {
    pub fn start(
        tracker: &'a UpdateTracker,
        sink: S,
        kind: UpdateKind,
        total: u32,
    ) -> Result<Self, UpdateError> {
        if total == 0 {
            return Err(UpdateError::EmptyImage);
        }
        if total > sink.capacity() {
            warn!(
                "image of {} bytes exceeds slot of {} bytes",
                total,
                sink.capacity()
            );
            return Err(UpdateError::ImageTooLarge);
        }
        tracker.begin(kind)?;
        tracker.progress(0, total);

        Ok(Self {
            tracker,
            sink,
            total,
            received: 0,
            closed: false,
        })
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn remaining(&self) -> u32 {
        self.total - self.received
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        if chunk.len() as u64 > self.remaining() as u64 {
            return Err(self.close_with(UpdateError::Overrun));
        }
        if let Err(err) = self.sink.write(self.received, chunk) {
            error!("image write at {} failed: {:?}", self.received, err);
            return Err(self.close_with(UpdateError::Sink));
        }
        self.received += chunk.len() as u32;
        self.tracker.progress(self.received, self.total);
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), UpdateError> {
        if self.received != self.total {
            return Err(self.close_with(UpdateError::Incomplete));
        }
        if let Err(err) = self.sink.finish() {
            error!("image finalize failed: {:?}", err);
            return Err(self.close_with(UpdateError::Sink));
        }
        self.closed = true;
        self.tracker.end();
        Ok(())
    }

    fn close_with(&mut self, err: UpdateError) -> UpdateError {
        if !self.closed {
            self.closed = true;
            self.tracker.fail(err);
        }
        err
    }
}

impl<S: ImageSink> Drop for UpdateSession<'_, S> {
    fn drop(&mut self) {
        self.close_with(UpdateError::Aborted);
    }
}
