//! [`GlApi`] on top of wgpu
//!
//! wgpu has no bind-to-target state machine, so this backend keeps one:
//! names are handed out locally, each target remembers the last name bound
//! to it, and uploads go to whatever that name refers to.

use super::{GpuCapabilities, GpuContext, GpuTexture};
use crate::Result;
use crate::gl::{GlApi, PixelFormat, TextureFilter, TextureId};
use common::{MovieError, TextureTarget};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

fn gpu_error(err: anyhow::Error) -> MovieError {
    MovieError::Gpu(format!("{:#}", err))
}

/// A texture name; storage appears with the first `tex_image_2d`
#[derive(Default)]
struct TextureSlot {
    filter: TextureFilter,
    storage: Option<GpuTexture>,
}

/// wgpu-backed texture calls
pub struct WgpuGl {
    context: GpuContext,
    textures: RefCell<HashMap<TextureId, TextureSlot>>,
    bound: RefCell<HashMap<TextureTarget, TextureId>>,
    enabled: RefCell<HashSet<TextureTarget>>,
    next_id: Cell<u32>,
}

impl WgpuGl {
    /// Initialize a device on the best available adapter
    pub fn new() -> Result<Self> {
        let context = pollster::block_on(GpuContext::new()).map_err(gpu_error)?;
        Ok(Self::with_context(context))
    }

    pub fn with_context(context: GpuContext) -> Self {
        Self {
            context,
            textures: RefCell::new(HashMap::new()),
            bound: RefCell::new(HashMap::new()),
            enabled: RefCell::new(HashSet::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn capabilities(&self) -> GpuCapabilities {
        self.context.capabilities()
    }

    /// Number of live texture names
    pub fn texture_count(&self) -> usize {
        self.textures.borrow().len()
    }

    pub fn is_enabled(&self, target: TextureTarget) -> bool {
        self.enabled.borrow().contains(&target)
    }

    /// Run `f` against the storage behind `id`
    pub fn with_texture<R>(
        &self,
        id: TextureId,
        f: impl FnOnce(&GpuTexture, &GpuContext) -> R,
    ) -> Result<R> {
        let textures = self.textures.borrow();
        let storage = textures
            .get(&id)
            .and_then(|slot| slot.storage.as_ref())
            .ok_or_else(|| MovieError::Gpu(format!("texture {} has no storage", id.get())))?;
        Ok(f(storage, &self.context))
    }

    /// Read a whole texture back as `(width, height, rgba)`
    pub fn read_texture(&self, id: TextureId) -> Result<(u32, u32, Vec<u8>)> {
        self.with_texture(id, |texture, context| {
            texture
                .read_rgba(&context.device, &context.queue)
                .map(|pixels| (texture.width, texture.height, pixels))
        })?
        .map_err(gpu_error)
    }

    fn bound_to(&self, target: TextureTarget) -> Result<TextureId> {
        self.bound
            .borrow()
            .get(&target)
            .copied()
            .ok_or_else(|| MovieError::Gpu(format!("no texture bound to {:?}", target)))
    }
}

impl GlApi for WgpuGl {
    fn gen_texture(&self) -> Result<TextureId> {
        let raw = self.next_id.get();
        let id = TextureId::new(raw).ok_or_else(|| MovieError::Gpu("texture names exhausted".into()))?;
        self.next_id.set(raw.wrapping_add(1));
        self.textures.borrow_mut().insert(id, TextureSlot::default());
        Ok(id)
    }

    fn delete_texture(&self, id: TextureId) {
        if let Some(slot) = self.textures.borrow_mut().remove(&id) {
            if let Some(storage) = slot.storage {
                storage.texture.destroy();
            }
        }
        self.bound.borrow_mut().retain(|_, bound| *bound != id);
    }

    fn bind_texture(&self, target: TextureTarget, id: Option<TextureId>) {
        let mut bound = self.bound.borrow_mut();
        match id {
            Some(id) => {
                bound.insert(target, id);
            }
            None => {
                bound.remove(&target);
            }
        }
    }

    fn enable(&self, target: TextureTarget) {
        self.enabled.borrow_mut().insert(target);
    }

    fn disable(&self, target: TextureTarget) {
        self.enabled.borrow_mut().remove(&target);
    }

    fn supports_target(&self, _target: TextureTarget) -> bool {
        // Any extent is allowed for a wgpu 2D texture
        true
    }

    fn set_filter(&self, target: TextureTarget, filter: TextureFilter) {
        let Ok(id) = self.bound_to(target) else {
            log::warn!("set_filter with nothing bound to {:?}", target);
            return;
        };
        if let Some(slot) = self.textures.borrow_mut().get_mut(&id) {
            slot.filter = filter;
            if let Some(storage) = slot.storage.as_mut() {
                storage.filter = filter;
            }
        }
    }

    fn tex_image_2d(&self, target: TextureTarget, size: (u32, u32), format: PixelFormat) -> Result<()> {
        let PixelFormat::Rgba8 = format;
        let id = self.bound_to(target)?;
        let mut textures = self.textures.borrow_mut();
        let slot = textures
            .get_mut(&id)
            .ok_or_else(|| MovieError::Gpu(format!("texture {} was deleted", id.get())))?;

        let storage = GpuTexture::allocate(&self.context.device, size.0, size.1, slot.filter)
            .map_err(gpu_error)?;
        if let Some(previous) = slot.storage.replace(storage) {
            previous.texture.destroy();
        }
        log::debug!("Allocated {}x{} storage for texture {}", size.0, size.1, id.get());
        Ok(())
    }

    fn tex_sub_image_2d(
        &self,
        target: TextureTarget,
        origin: (u32, u32),
        size: (u32, u32),
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<()> {
        let PixelFormat::Rgba8 = format;
        let id = self.bound_to(target)?;
        self.with_texture(id, |texture, context| {
            texture.write_region(&context.queue, origin, size, pixels)
        })?
        .map_err(gpu_error)
    }

    fn is_context_current(&self) -> bool {
        !self.context.is_lost()
    }
}

impl Drop for WgpuGl {
    fn drop(&mut self) {
        let leaked = self.textures.get_mut().len();
        if leaked > 0 {
            log::debug!("Destroying {} textures with the GPU device", leaked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PixelBuffer;
    use crate::gl::GlContext;
    use crate::texture::Texture;
    use std::rc::Rc;

    /// Tests run only where an adapter is available
    fn gpu() -> Option<Rc<WgpuGl>> {
        match WgpuGl::new() {
            Ok(gl) => Some(Rc::new(gl)),
            Err(e) => {
                eprintln!("Skipping GPU test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_upload_and_read_back() {
        let Some(gl) = gpu() else { return };
        let id = gl.gen_texture().unwrap();
        gl.bind_texture(TextureTarget::Texture2D, Some(id));
        gl.tex_image_2d(TextureTarget::Texture2D, (4, 2), PixelFormat::Rgba8).unwrap();
        gl.tex_sub_image_2d(TextureTarget::Texture2D, (0, 0), (3, 1), PixelFormat::Rgba8, &[200u8; 12])
            .unwrap();

        let (width, height, pixels) = gl.read_texture(id).unwrap();
        assert_eq!((width, height), (4, 2));
        assert_eq!(&pixels[..12], &[200u8; 12]);
        assert!(pixels[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_surface_texture_on_device() {
        let Some(gl) = gpu() else { return };
        let context = GlContext::new(gl.clone());
        let buffer = PixelBuffer::new(3, 3);
        buffer.write_rows(&[255u8; 36], 12);

        let mut texture = Texture::for_surface(context, &buffer, TextureFilter::Nearest).unwrap();
        assert!(texture.update(true).unwrap());
        let id = TextureId::new(texture.texture_id()).unwrap();
        let (width, height, pixels) = gl.read_texture(id).unwrap();
        assert_eq!((width, height), texture.allocated_size());
        assert_eq!(&pixels[..12], &[255u8; 12]);

        texture.destroy();
        assert_eq!(gl.texture_count(), 0);
    }

    #[test]
    fn test_upload_without_binding_fails() {
        let Some(gl) = gpu() else { return };
        let err = gl
            .tex_image_2d(TextureTarget::Rectangle, (2, 2), PixelFormat::Rgba8)
            .unwrap_err();
        assert!(matches!(err, MovieError::Gpu(_)));
    }
}
