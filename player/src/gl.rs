//! GPU capability surface and deferred texture release
//!
//! Texture names belong to one graphics context and may only be deleted
//! while that context is current. [`GlContext`] pairs a [`GlApi`] backend
//! with a queue of names whose owners went away while it was not current;
//! the queue is drained at the start of the next pump tick.

use crate::Result;
use common::{NativeHandle, TextureTarget};
use std::cell::RefCell;
use std::num::NonZeroU32;
use std::ops::Deref;
use std::rc::Rc;

/// Non-zero GPU texture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Sampling filter applied to freshly allocated textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    #[default]
    Linear,
    Nearest,
}

/// Upload pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8 bits per channel, R G B A byte order
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8 => 4,
        }
    }
}

/// Native context and pixel format handed to the hardware visual context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedGlContext {
    pub context: NativeHandle,
    pub pixel_format: NativeHandle,
}

/// Texture calls used by the presentation pipeline.
///
/// `set_filter`, `tex_image_2d` and `tex_sub_image_2d` act on whatever
/// texture is bound to `target`.
pub trait GlApi {
    fn gen_texture(&self) -> Result<TextureId>;
    fn delete_texture(&self, id: TextureId);
    fn bind_texture(&self, target: TextureTarget, id: Option<TextureId>);
    fn enable(&self, target: TextureTarget);
    fn disable(&self, target: TextureTarget);
    fn supports_target(&self, target: TextureTarget) -> bool;
    fn set_filter(&self, target: TextureTarget, filter: TextureFilter);

    /// Allocate storage for the bound texture without initial contents
    fn tex_image_2d(&self, target: TextureTarget, size: (u32, u32), format: PixelFormat) -> Result<()>;

    /// Overwrite a region of the bound texture
    fn tex_sub_image_2d(
        &self,
        target: TextureTarget,
        origin: (u32, u32),
        size: (u32, u32),
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<()>;

    fn is_context_current(&self) -> bool {
        true
    }

    fn shared_context(&self) -> Option<SharedGlContext> {
        None
    }
}

/// A [`GlApi`] plus the names waiting for it to become current again.
pub struct GlContext {
    api: Rc<dyn GlApi>,
    pending: RefCell<Vec<TextureId>>,
}

impl GlContext {
    pub fn new(api: Rc<dyn GlApi>) -> Rc<Self> {
        Rc::new(Self {
            api,
            pending: RefCell::new(Vec::new()),
        })
    }

    pub fn api(&self) -> &dyn GlApi {
        self.api.as_ref()
    }

    /// Delete now if the context is current, otherwise queue for later
    pub fn release(&self, id: TextureId) {
        if self.api.is_context_current() {
            self.api.delete_texture(id);
        } else {
            log::debug!("Context not current, deferring release of texture {}", id.get());
            self.pending.borrow_mut().push(id);
        }
    }

    /// Delete every queued name; returns how many were released
    pub fn drain_pending(&self) -> usize {
        if !self.api.is_context_current() {
            return 0;
        }
        let drained = std::mem::take(&mut *self.pending.borrow_mut());
        for id in &drained {
            self.api.delete_texture(*id);
        }
        drained.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Deref for GlContext {
    type Target = dyn GlApi;

    fn deref(&self) -> &Self::Target {
        self.api.as_ref()
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        let count = self.drain_pending();
        let leaked = self.pending();
        if count > 0 {
            log::debug!("Released {} deferred textures at context teardown", count);
        }
        if leaked > 0 {
            log::warn!("{} textures outlived their graphics context", leaked);
        }
    }
}

/// One GPU texture name, released exactly once.
pub struct OwnedTexture {
    gl: Rc<GlContext>,
    id: Option<TextureId>,
}

impl OwnedTexture {
    pub fn generate(gl: Rc<GlContext>) -> Result<Self> {
        let id = gl.gen_texture()?;
        Ok(Self { gl, id: Some(id) })
    }

    /// `None` once released
    pub fn id(&self) -> Option<TextureId> {
        self.id
    }

    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.gl.release(id);
        }
    }
}

impl Drop for OwnedTexture {
    fn drop(&mut self) {
        self.release();
    }
}
