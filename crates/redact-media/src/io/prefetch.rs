//! Decode-ahead wrapper running a source on its own thread.

use crossbeam::channel::{bounded, Receiver};
use image::RgbImage;
use std::thread;
use tracing::{debug, warn};

use super::FrameSource;
use crate::error::{MediaError, MediaResult};

/// Pulls frames from an inner source on a producer thread, keeping at most
/// `capacity` decoded frames queued.
///
/// The producer stops at the first error, at end of input, or when this
/// source is dropped.
pub struct PrefetchSource {
    rx: Option<Receiver<MediaResult<RgbImage>>>,
    handle: Option<thread::JoinHandle<()>>,
    done: bool,
}

impl PrefetchSource {
    pub fn spawn<S>(mut inner: S, capacity: usize) -> MediaResult<Self>
    where
        S: FrameSource + 'static,
    {
        let (tx, rx) = bounded::<MediaResult<RgbImage>>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("redact-decode".to_string())
            .spawn(move || {
                let mut produced = 0u64;
                loop {
                    let item = match inner.next_frame() {
                        Ok(Some(frame)) => Ok(frame),
                        Ok(None) => break,
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    if tx.send(item).is_err() {
                        debug!(produced, "Frame consumer went away, stopping decode");
                        return;
                    }
                    if failed {
                        return;
                    }
                    produced += 1;
                }
                debug!(produced, "Decode finished");
            })
            .map_err(|e| MediaError::internal(format!("failed to spawn decode thread: {e}")))?;

        Ok(Self {
            rx: Some(rx),
            handle: Some(handle),
            done: false,
        })
    }
}

impl FrameSource for PrefetchSource {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.done {
            return Ok(None);
        }
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => {
                self.done = true;
                Err(e)
            }
            Err(_) => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

impl Drop for PrefetchSource {
    fn drop(&mut self) {
        // Unblocks a producer waiting on a full channel.
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Decode thread panicked");
            }
        }
    }
}
