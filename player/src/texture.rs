//! GPU texture holding the most recent movie frame
//!
//! A [`Texture`] is fed by one of three sources:
//! - `Detached`: no native source, `update` never produces a frame
//! - `Visual`: the engine owns the texture and hands out frame tokens
//! - `Surface`: we own the texture and re-upload an RGBA buffer each frame
//!
//! Texture coordinates always describe the valid region of the allocation,
//! so consumers must sample with [`Texture::tex_coords`] rather than the unit
//! square.

use crate::Result;
use crate::engine::{MovieEngine, PixelBuffer};
use crate::gl::{GlApi, GlContext, OwnedTexture, PixelFormat, TextureFilter, TextureId};
use common::{NativeHandle, TexCoords, TextureDescriptor, TextureTarget};
use std::rc::Rc;

/// Preferred sampling target first
const TARGET_PREFERENCE: [TextureTarget; 2] = [TextureTarget::Rectangle, TextureTarget::Texture2D];

/// Best target the backend supports
pub fn choose_target(gl: &dyn GlApi) -> TextureTarget {
    TARGET_PREFERENCE
        .into_iter()
        .find(|t| gl.supports_target(*t))
        .unwrap_or(TextureTarget::Texture2D)
}

/// Allocation extent for a logical frame size on `target`
pub fn allocation_size(target: TextureTarget, size: (u32, u32)) -> (u32, u32) {
    if target.requires_power_of_two() {
        (size.0.next_power_of_two(), size.1.next_power_of_two())
    } else {
        size
    }
}

/// Coordinates of the `size` region inside an `allocated` texture
pub fn region_coords(size: (u32, u32), allocated: (u32, u32)) -> TexCoords {
    let u = size.0 as f32 / allocated.0.max(1) as f32;
    let v = size.1 as f32 / allocated.1.max(1) as f32;
    TexCoords::from_extent(u, v)
}

/// Hardware path: frame tokens from a visual context
pub struct VisualFrames {
    engine: Rc<dyn MovieEngine>,
    context: NativeHandle,
    image: Option<NativeHandle>,
}

impl VisualFrames {
    fn release_image(&mut self) {
        if let Some(image) = self.image.take() {
            self.engine.release_image(image);
        }
    }
}

type UploadFn = Box<dyn Fn(&dyn GlApi) -> Result<()>>;

/// Software path: an owned texture and the upload call bound to its buffer
pub struct SurfaceUpload {
    texture: OwnedTexture,
    allocated: (u32, u32),
    push: UploadFn,
}

pub enum FrameSource {
    Detached,
    Visual(VisualFrames),
    Surface(SurfaceUpload),
}

/// Texture holding the current movie frame.
pub struct Texture {
    gl: Rc<GlContext>,
    target: TextureTarget,
    texture_id: u32,
    size: (u32, u32),
    tex_coords: TexCoords,
    source: FrameSource,
}

impl Texture {
    /// Texture with no frame source
    pub fn detached(gl: Rc<GlContext>) -> Self {
        Self {
            gl,
            target: TextureTarget::Texture2D,
            texture_id: 0,
            size: (0, 0),
            tex_coords: TexCoords::default(),
            source: FrameSource::Detached,
        }
    }

    /// Texture fed by frame tokens of a visual context.
    ///
    /// Nothing is allocated here; the engine names the texture with each frame.
    pub fn for_visual_context(gl: Rc<GlContext>, engine: Rc<dyn MovieEngine>, context: NativeHandle) -> Self {
        Self {
            gl,
            target: TextureTarget::Rectangle,
            texture_id: 0,
            size: (0, 0),
            tex_coords: TexCoords::default(),
            source: FrameSource::Visual(VisualFrames {
                engine,
                context,
                image: None,
            }),
        }
    }

    /// Texture re-uploaded from `buffer` on every update
    pub fn for_surface(gl: Rc<GlContext>, buffer: &PixelBuffer, filter: TextureFilter) -> Result<Self> {
        let target = choose_target(gl.api());
        let size = buffer.size();
        let allocated = allocation_size(target, size);
        let tex_coords = region_coords(size, allocated);

        let texture = OwnedTexture::generate(gl.clone())?;
        gl.bind_texture(target, texture.id());
        gl.set_filter(target, filter);
        gl.tex_image_2d(target, allocated, PixelFormat::Rgba8)?;

        let pixels = buffer.clone();
        let push: UploadFn = Box::new(move |gl: &dyn GlApi| {
            pixels.with_pixels(|data| gl.tex_sub_image_2d(target, (0, 0), size, PixelFormat::Rgba8, data))
        });

        log::debug!(
            "Allocated {}x{} {:?} texture for {}x{} frames",
            allocated.0,
            allocated.1,
            target,
            size.0,
            size.1
        );

        Ok(Self {
            target,
            texture_id: texture.id().map_or(0, TextureId::get),
            size,
            tex_coords,
            source: FrameSource::Surface(SurfaceUpload {
                texture,
                allocated,
                push,
            }),
            gl,
        })
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// Current texture name, 0 when there is none
    pub fn texture_id(&self) -> u32 {
        self.texture_id
    }

    /// Logical frame size
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Size of the GPU allocation, which may exceed the logical size
    pub fn allocated_size(&self) -> (u32, u32) {
        match &self.source {
            FrameSource::Surface(upload) => upload.allocated,
            _ => self.size,
        }
    }

    pub fn tex_coords(&self) -> TexCoords {
        self.tex_coords
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// What the renderer needs to sample the frame, once one exists
    pub fn descriptor(&self) -> Option<TextureDescriptor> {
        (self.texture_id != 0).then_some(TextureDescriptor {
            texture_id: self.texture_id,
            target: self.target,
            size: self.size,
            tex_coords: self.tex_coords,
        })
    }

    /// Bind the current texture; does nothing once destroyed or before a frame
    pub fn bind(&self) {
        if let Some(id) = TextureId::new(self.texture_id) {
            self.gl.bind_texture(self.target, Some(id));
        }
    }

    pub fn unbind(&self) {
        self.gl.bind_texture(self.target, None);
    }

    pub fn enable(&self) {
        self.gl.enable(self.target);
    }

    pub fn disable(&self) {
        self.gl.disable(self.target);
    }

    /// Bind and enable
    pub fn select(&self) -> &Self {
        self.bind();
        self.enable();
        self
    }

    /// Disable and unbind
    pub fn deselect(&self) -> &Self {
        self.disable();
        self.unbind();
        self
    }

    /// Pull the latest frame into the texture.
    ///
    /// Returns true when the texture now holds a new frame. `force` fetches a
    /// frame token even if the engine reports nothing new.
    pub fn update(&mut self, force: bool) -> Result<bool> {
        match &mut self.source {
            FrameSource::Detached => Ok(false),
            FrameSource::Visual(frames) => {
                if !force && !frames.engine.is_new_image_available(frames.context) {
                    return Ok(false);
                }
                frames.release_image();
                self.texture_id = 0;
                let Some(image) = frames.engine.copy_image(frames.context)? else {
                    return Ok(false);
                };
                frames.image = Some(image);

                let info = frames.engine.image_info(image)?;
                let c = info.clean_coords.0;
                self.target = info.target;
                self.texture_id = info.texture_id;
                self.tex_coords = info.clean_coords;
                self.size = (
                    (c[2][0] - c[0][0]).abs().round() as u32,
                    (c[2][1] - c[0][1]).abs().round() as u32,
                );
                Ok(true)
            }
            FrameSource::Surface(upload) => {
                let Some(id) = upload.texture.id() else {
                    return Ok(false);
                };
                self.gl.bind_texture(self.target, Some(id));
                (upload.push)(self.gl.api())?;
                Ok(true)
            }
        }
    }

    /// Release native and GPU resources; safe to call more than once
    pub fn destroy(&mut self) {
        match &mut self.source {
            FrameSource::Detached => {}
            FrameSource::Visual(frames) => frames.release_image(),
            FrameSource::Surface(upload) => upload.texture.release(),
        }
        self.texture_id = 0;
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("target", &self.target)
            .field("texture_id", &self.texture_id)
            .field("size", &self.size)
            .field("tex_coords", &self.tex_coords)
            .finish()
    }
}
