//! Capability surface of the native movie-decoding engine
//!
//! The engine is an opaque service. Movies are created from a property array,
//! advanced by a cooperative `movies_task` call and rendered either into a
//! hardware visual context (one GPU frame token per new image) or into a
//! caller-owned RGBA surface that the engine writes in place.
//!
//! Optional capabilities have default bodies reporting
//! [`MovieError::NotImplemented`], so a backend only overrides what it
//! supports.

use crate::Result;
use crate::gl::SharedGlContext;
use crate::property::PropertyArray;
use common::{FourCc, LoadState, MovieBox, MovieError, NativeHandle, TexCoords, TextureTarget};
use std::sync::{Arc, Mutex, MutexGuard};

/// Movie time in units of the movie's time scale
pub type TimeValue = i64;

/// Status code reported by the engine when construction fails
pub type EngineStatus = i32;

/// What a hardware frame token describes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub target: TextureTarget,
    pub texture_id: u32,
    /// Clean-aperture coordinates, lower-left first
    pub clean_coords: TexCoords,
}

/// Shared RGBA pixel buffer rendered into by the engine.
///
/// Clones share the same storage, so the engine can keep a handle for its
/// streaming thread while the display context uploads from its own.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Zeroed buffer of `width` x `height` RGBA pixels
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * Self::BYTES_PER_PIXEL as usize;
        Self {
            data: Arc::new(Mutex::new(vec![0u8; len])),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL as usize
    }

    pub fn len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles share storage
    pub fn same_storage(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // A writer panicking mid-frame leaves at worst a torn frame
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` over the current pixels
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock())
    }

    /// Copy rows from `src` laid out with `src_stride` bytes per row.
    ///
    /// Rows and columns beyond the buffer are clipped. Returns the number of
    /// rows written.
    pub fn write_rows(&self, src: &[u8], src_stride: usize) -> usize {
        let row_bytes = self.row_bytes();
        if src_stride == 0 || row_bytes == 0 {
            return 0;
        }
        let copy_bytes = row_bytes.min(src_stride);
        let mut dst = self.lock();

        let mut rows = 0;
        for (dst_row, src_row) in dst.chunks_exact_mut(row_bytes).zip(src.chunks(src_stride)) {
            let n = copy_bytes.min(src_row.len());
            dst_row[..n].copy_from_slice(&src_row[..n]);
            rows += 1;
        }
        rows
    }
}

/// Native decode engine, addressed through explicit native handles.
pub trait MovieEngine {
    /// Short backend name for logs
    fn name(&self) -> &str;

    fn enter_movies(&self) -> Result<()>;
    fn exit_movies(&self);

    /// Engine version, if the backend can report one
    fn version(&self) -> Option<u32> {
        None
    }

    /// Create a movie; per-record statuses are written back into `properties`
    fn new_movie_from_properties(
        &self,
        properties: &mut PropertyArray,
    ) -> std::result::Result<NativeHandle, EngineStatus>;

    fn dispose_movie(&self, movie: NativeHandle);

    /// Advance the engine's internal state, spending at most roughly `budget_ms`
    fn movies_task(&self, movie: NativeHandle, budget_ms: u32) -> Result<()>;

    fn movie_box(&self, movie: NativeHandle) -> MovieBox;
    fn set_movie_box(&self, movie: NativeHandle, bounds: MovieBox);

    fn start(&self, movie: NativeHandle);
    fn stop(&self, movie: NativeHandle);
    fn go_to_beginning(&self, movie: NativeHandle);
    fn rate(&self, movie: NativeHandle) -> f64;
    fn set_rate(&self, movie: NativeHandle, rate: f64);
    fn time(&self, movie: NativeHandle) -> TimeValue;
    fn set_time(&self, movie: NativeHandle, time: TimeValue);
    fn duration(&self, movie: NativeHandle) -> TimeValue;
    fn time_scale(&self, movie: NativeHandle) -> i32;

    /// Volume in 8.8 fixed point; negative means muted
    fn volume(&self, movie: NativeHandle) -> i16;
    fn set_volume(&self, movie: NativeHandle, volume: i16);

    fn set_looping(&self, movie: NativeHandle, looping: bool);
    fn load_state(&self, movie: NativeHandle) -> LoadState;
    fn is_active(&self, movie: NativeHandle) -> bool;
    fn is_done(&self, movie: NativeHandle) -> bool;

    fn track_count(&self, _movie: NativeHandle) -> u32 {
        0
    }

    fn track_media_type(&self, _movie: NativeHandle, _index: u32) -> Option<FourCc> {
        None
    }

    fn supports_visual_context(&self) -> bool {
        false
    }

    fn create_visual_context(&self, _shared: &SharedGlContext) -> Result<NativeHandle> {
        Err(MovieError::NotImplemented("create_visual_context"))
    }

    fn release_visual_context(&self, _context: NativeHandle) {}

    fn visual_context_task(&self, _context: NativeHandle) {}

    fn is_new_image_available(&self, _context: NativeHandle) -> bool {
        false
    }

    /// Next frame token of the visual context, if any
    fn copy_image(&self, _context: NativeHandle) -> Result<Option<NativeHandle>> {
        Err(MovieError::NotImplemented("copy_image"))
    }

    fn release_image(&self, _image: NativeHandle) {}

    fn image_info(&self, _image: NativeHandle) -> Result<ImageInfo> {
        Err(MovieError::NotImplemented("image_info"))
    }

    fn supports_surface(&self) -> bool {
        false
    }

    /// Wrap `buffer` as a render surface covering `bounds`
    fn new_surface(
        &self,
        _buffer: &PixelBuffer,
        _bounds: MovieBox,
        _pixel_format: FourCc,
    ) -> Result<NativeHandle> {
        Err(MovieError::NotImplemented("new_surface"))
    }

    fn set_movie_surface(&self, _movie: NativeHandle, _surface: NativeHandle) {}

    fn dispose_surface(&self, _surface: NativeHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_geometry() {
        let buffer = PixelBuffer::new(3, 2);
        assert_eq!(buffer.row_bytes(), 12);
        assert_eq!(buffer.len(), 24);
        assert!(!buffer.is_empty());
        assert!(PixelBuffer::new(0, 10).is_empty());
        buffer.with_pixels(|p| assert!(p.iter().all(|b| *b == 0)));
    }

    #[test]
    fn test_write_rows_honours_stride() {
        let buffer = PixelBuffer::new(2, 2);
        // 2 pixels per row plus 4 bytes of padding
        let mut src = Vec::new();
        src.extend_from_slice(&[1u8; 8]);
        src.extend_from_slice(&[0xEE; 4]);
        src.extend_from_slice(&[2u8; 8]);
        src.extend_from_slice(&[0xEE; 4]);

        assert_eq!(buffer.write_rows(&src, 12), 2);
        buffer.with_pixels(|p| {
            assert_eq!(&p[..8], &[1u8; 8]);
            assert_eq!(&p[8..], &[2u8; 8]);
        });
    }

    #[test]
    fn test_write_rows_into_empty_buffer() {
        let buffer = PixelBuffer::new(0, 4);
        assert_eq!(buffer.write_rows(&[5u8; 16], 4), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_rows_clips_short_source() {
        let buffer = PixelBuffer::new(2, 3);
        assert_eq!(buffer.write_rows(&[9u8; 8], 8), 1);
        assert_eq!(buffer.write_rows(&[], 0), 0);
        buffer.with_pixels(|p| {
            assert_eq!(&p[..8], &[9u8; 8]);
            assert!(p[8..].iter().all(|b| *b == 0));
        });
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = PixelBuffer::new(1, 1);
        let writer = buffer.clone();
        writer.write_rows(&[1, 2, 3, 4], 4);
        assert!(buffer.same_storage(&writer));
        buffer.with_pixels(|p| assert_eq!(p, &[1, 2, 3, 4]));
        assert!(!buffer.same_storage(&PixelBuffer::new(1, 1)));
    }
}
