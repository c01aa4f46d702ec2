//! Frame hand-off between the GStreamer streaming thread and the surface
//!
//! The app sink callback runs on a GStreamer thread and writes each frame
//! straight into the render surface registered for the movie. Until a
//! surface is registered, frames are counted and discarded. The engine
//! takes the new-frame flag once per task tick; a frame written over an
//! untaken one counts as dropped.

use crate::engine::PixelBuffer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination for decoded frames, shared with the app sink callback
#[derive(Clone, Default)]
pub struct FrameSink {
    /// Surface the engine renders into
    target: Arc<Mutex<Option<PixelBuffer>>>,

    /// Flag indicating a new frame is available
    new_frame_available: Arc<AtomicBool>,

    /// Frames delivered by GStreamer
    frames_received: Arc<AtomicU64>,

    /// Frames overwritten before anyone consumed them
    frames_dropped: Arc<AtomicU64>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn target(&self) -> MutexGuard<'_, Option<PixelBuffer>> {
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or clear) the surface frames are written into
    pub fn set_target(&self, buffer: Option<PixelBuffer>) {
        *self.target() = buffer;
        self.new_frame_available.store(false, Ordering::Release);
    }

    /// Copy one frame with `stride` bytes per row into the target
    pub fn deliver(&self, data: &[u8], stride: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let target = self.target();
        let Some(buffer) = target.as_ref() else {
            return;
        };

        // Check if we're dropping a frame (previous frame not consumed yet)
        if self.new_frame_available.swap(true, Ordering::AcqRel) {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("Video frame dropped (previous frame not consumed in time)");
        }
        buffer.write_rows(data, stride);
    }

    /// Mark the current frame as consumed, returning whether there was one
    pub fn take_new_frame(&self) -> bool {
        self.new_frame_available.swap(false, Ordering::AcqRel)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_without_target_are_discarded() {
        let sink = FrameSink::new();
        sink.deliver(&[1u8; 16], 8);
        assert_eq!(sink.frames_received(), 1);
        assert!(!sink.take_new_frame());
    }

    #[test]
    fn test_deliver_writes_into_target() {
        let sink = FrameSink::new();
        let surface = PixelBuffer::new(2, 2);
        sink.set_target(Some(surface.clone()));

        let callback_side = sink.clone();
        callback_side.deliver(&[7u8; 16], 8);

        assert!(sink.take_new_frame());
        assert!(!sink.take_new_frame());
        surface.with_pixels(|p| assert!(p.iter().all(|b| *b == 7)));
    }

    #[test]
    fn test_unconsumed_frames_count_as_dropped() {
        let sink = FrameSink::new();
        sink.set_target(Some(PixelBuffer::new(1, 1)));

        sink.deliver(&[1, 2, 3, 4], 4);
        sink.deliver(&[1, 2, 3, 4], 4);
        assert_eq!(sink.frames_dropped(), 1);

        assert!(sink.take_new_frame());
        sink.deliver(&[1, 2, 3, 4], 4);
        assert_eq!(sink.frames_dropped(), 1);
        assert_eq!(sink.frames_received(), 3);
    }

    #[test]
    fn test_frames_taken_every_tick_are_not_dropped() {
        let sink = FrameSink::new();
        sink.set_target(Some(PixelBuffer::new(1, 1)));

        for _ in 0..5 {
            sink.deliver(&[1, 2, 3, 4], 4);
            assert!(sink.take_new_frame());
        }
        assert_eq!(sink.frames_received(), 5);
        assert_eq!(sink.frames_dropped(), 0);
    }

    #[test]
    fn test_clearing_target_stops_writes() {
        let sink = FrameSink::new();
        let surface = PixelBuffer::new(1, 1);
        sink.set_target(Some(surface.clone()));
        sink.set_target(None);

        sink.deliver(&[9, 9, 9, 9], 4);
        surface.with_pixels(|p| assert_eq!(p, &[0, 0, 0, 0]));
    }
}
