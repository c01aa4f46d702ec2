//! Display contexts: where the decode engine renders frames
//!
//! Two strategies exist. The hardware visual context lets the engine place
//! frames straight into GPU textures and hand back tokens. The software
//! surface context gives the engine a CPU RGBA buffer and uploads it into a
//! texture we own. Which one is used is decided once, by probing the
//! strategies in [`CONTEXT_PRIORITY`] order.

use crate::Result;
use crate::engine::{MovieEngine, PixelBuffer};
use crate::gl::{GlContext, TextureFilter};
use crate::texture::Texture;
use common::{MovieError, MovieProperty, NativeHandle, PropertyValue, tags};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Visual,
    Surface,
}

impl ContextKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Visual => "hardware visual",
            Self::Surface => "software surface",
        }
    }

    /// Whether this strategy can run on the given engine and backend
    pub fn is_supported(&self, engine: &dyn MovieEngine, gl: &GlContext) -> bool {
        match self {
            Self::Visual => engine.supports_visual_context() && gl.shared_context().is_some(),
            Self::Surface => engine.supports_surface(),
        }
    }
}

/// Probe order; the first supported strategy wins
pub const CONTEXT_PRIORITY: [ContextKind; 2] = [ContextKind::Visual, ContextKind::Surface];

/// First supported strategy in `order`
pub fn first_supported(order: &[ContextKind], supported: impl Fn(ContextKind) -> bool) -> Option<ContextKind> {
    order.iter().copied().find(|kind| supported(*kind))
}

/// Strategy to use for this engine and backend
pub fn probe(engine: &dyn MovieEngine, gl: &GlContext) -> Option<ContextKind> {
    first_supported(&CONTEXT_PRIORITY, |kind| kind.is_supported(engine, gl))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Created,
    TextureBound,
    Destroyed,
}

/// Hardware path: the engine renders into textures of a shared context
pub struct VisualContext {
    engine: Rc<dyn MovieEngine>,
    gl: Rc<GlContext>,
    handle: Option<NativeHandle>,
    texture: Option<Texture>,
    destroyed: bool,
}

impl VisualContext {
    fn new(engine: Rc<dyn MovieEngine>, gl: Rc<GlContext>) -> Result<Self> {
        let shared = gl.shared_context().ok_or(MovieError::UnsupportedContext)?;
        let handle = engine.create_visual_context(&shared)?;
        log::debug!("Created visual context {:#x}", handle.as_raw());
        Ok(Self {
            engine,
            gl,
            handle: Some(handle),
            texture: None,
            destroyed: false,
        })
    }

    fn texture(&mut self) -> Option<&mut Texture> {
        let handle = self.handle?;
        let texture = self
            .texture
            .get_or_insert_with(|| Texture::for_visual_context(self.gl.clone(), self.engine.clone(), handle));
        Some(texture)
    }

    fn destroy(&mut self) {
        self.texture = None;
        if let Some(handle) = self.handle.take() {
            self.engine.release_visual_context(handle);
            log::debug!("Released visual context {:#x}", handle.as_raw());
        }
        self.destroyed = true;
    }
}

/// Software path: the engine draws into a CPU buffer we upload each frame
pub struct SurfaceContext {
    engine: Rc<dyn MovieEngine>,
    gl: Rc<GlContext>,
    filter: TextureFilter,
    surface: Option<NativeHandle>,
    buffer: Option<PixelBuffer>,
    texture: Option<Texture>,
    destroyed: bool,
}

impl SurfaceContext {
    fn new(engine: Rc<dyn MovieEngine>, gl: Rc<GlContext>, filter: TextureFilter) -> Self {
        Self {
            engine,
            gl,
            filter,
            surface: None,
            buffer: None,
            texture: None,
            destroyed: false,
        }
    }

    /// Buffer the engine currently renders into
    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    fn texture(&mut self) -> Result<Option<&mut Texture>> {
        let Some(buffer) = &self.buffer else {
            return Ok(None);
        };
        if self.texture.is_none() {
            self.texture = Some(Texture::for_surface(self.gl.clone(), buffer, self.filter)?);
        }
        Ok(self.texture.as_mut())
    }

    fn release_surface(&mut self) {
        self.texture = None;
        self.buffer = None;
        if let Some(surface) = self.surface.take() {
            self.engine.dispose_surface(surface);
        }
    }

    fn update_for_movie(&mut self, movie: NativeHandle) -> Result<bool> {
        self.release_surface();

        let mut bounds = self.engine.movie_box(movie);
        if !bounds.is_normalized() {
            bounds = bounds.normalized();
            self.engine.set_movie_box(movie, bounds);
        }
        if !bounds.has_area() {
            log::debug!("Movie has no visual area, skipping surface allocation");
            return Ok(false);
        }

        let buffer = PixelBuffer::new(bounds.width() as u32, bounds.height() as u32);
        match self.engine.new_surface(&buffer, bounds, tags::PIXEL_FORMAT_RGBA) {
            Ok(surface) => {
                self.engine.set_movie_surface(movie, surface);
                self.surface = Some(surface);
            }
            // The texture still gets built; it just shows a blank frame
            Err(e) => log::warn!("Failed to create render surface: {}", e),
        }
        log::debug!("Rendering into {}x{} surface", buffer.width(), buffer.height());
        self.buffer = Some(buffer);
        Ok(true)
    }

    fn destroy(&mut self) {
        self.release_surface();
        self.destroyed = true;
    }
}

/// Rendering destination for a movie, chosen once per controller.
pub enum DisplayContext {
    Visual(VisualContext),
    Surface(SurfaceContext),
}

impl DisplayContext {
    /// Probe for the best strategy and create it
    pub fn create(engine: Rc<dyn MovieEngine>, gl: Rc<GlContext>, filter: TextureFilter) -> Result<Self> {
        let kind = probe(engine.as_ref(), &gl).ok_or(MovieError::UnsupportedContext)?;
        Self::with_kind(kind, engine, gl, filter)
    }

    /// Create a specific strategy without probing
    pub fn with_kind(
        kind: ContextKind,
        engine: Rc<dyn MovieEngine>,
        gl: Rc<GlContext>,
        filter: TextureFilter,
    ) -> Result<Self> {
        Ok(match kind {
            ContextKind::Visual => Self::Visual(VisualContext::new(engine, gl)?),
            ContextKind::Surface => Self::Surface(SurfaceContext::new(engine, gl, filter)),
        })
    }

    pub fn kind(&self) -> ContextKind {
        match self {
            Self::Visual(_) => ContextKind::Visual,
            Self::Surface(_) => ContextKind::Surface,
        }
    }

    pub fn state(&self) -> ContextState {
        let (destroyed, textured, created) = match self {
            Self::Visual(ctx) => (ctx.destroyed, ctx.texture.is_some(), ctx.handle.is_some()),
            Self::Surface(ctx) => (ctx.destroyed, ctx.texture.is_some(), ctx.buffer.is_some()),
        };
        if destroyed {
            ContextState::Destroyed
        } else if textured {
            ContextState::TextureBound
        } else if created {
            ContextState::Created
        } else {
            ContextState::Uninitialized
        }
    }

    /// Native handle of the visual context or render surface
    pub fn native_handle(&self) -> Option<NativeHandle> {
        match self {
            Self::Visual(ctx) => ctx.handle,
            Self::Surface(ctx) => ctx.surface,
        }
    }

    /// Properties this context contributes to movie construction
    pub fn movie_properties(&self) -> Vec<MovieProperty> {
        match self {
            Self::Visual(VisualContext {
                handle: Some(handle), ..
            }) => vec![MovieProperty::new(
                tags::CONTEXT,
                tags::VISUAL,
                PropertyValue::Handle(*handle),
            )],
            _ => Vec::new(),
        }
    }

    /// Frame texture, built on first access
    pub fn texture(&mut self) -> Result<Option<&mut Texture>> {
        match self {
            Self::Visual(ctx) => Ok(ctx.texture()),
            Self::Surface(ctx) => ctx.texture(),
        }
    }

    pub fn has_texture(&self) -> bool {
        match self {
            Self::Visual(ctx) => ctx.texture.is_some(),
            Self::Surface(ctx) => ctx.texture.is_some(),
        }
    }

    /// Drop the texture; the next access rebuilds it
    pub fn reset(&mut self) {
        match self {
            Self::Visual(ctx) => ctx.texture = None,
            Self::Surface(ctx) => ctx.texture = None,
        }
    }

    /// Per-tick housekeeping
    pub fn process(&self) {
        if let Self::Visual(VisualContext {
            engine,
            handle: Some(handle),
            ..
        }) = self
        {
            engine.visual_context_task(*handle);
        }
    }

    /// Prepare for a freshly loaded movie.
    ///
    /// Returns false when the movie has nothing to show.
    pub fn update_for_movie(&mut self, movie: NativeHandle) -> Result<bool> {
        if self.state() == ContextState::Destroyed {
            log::warn!("Ignoring movie update on a destroyed display context");
            return Ok(false);
        }
        match self {
            Self::Visual(_) => Ok(true),
            Self::Surface(ctx) => ctx.update_for_movie(movie),
        }
    }

    /// Release every native resource; later calls are no-ops
    pub fn destroy(&mut self) {
        match self {
            Self::Visual(ctx) => ctx.destroy(),
            Self::Surface(ctx) => ctx.destroy(),
        }
    }
}

impl Drop for DisplayContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EngineCall, GlCall, RecordingEngine, RecordingGl, handle};
    use common::{MovieBox, TextureTarget};

    fn setup(engine: RecordingEngine, gl: RecordingGl) -> (Rc<RecordingEngine>, Rc<RecordingGl>, Rc<GlContext>) {
        let engine = Rc::new(engine);
        let gl = Rc::new(gl);
        let context = GlContext::new(gl.clone());
        (engine, gl, context)
    }

    #[test]
    fn test_first_supported_is_deterministic() {
        assert_eq!(first_supported(&CONTEXT_PRIORITY, |_| true), Some(ContextKind::Visual));
        assert_eq!(
            first_supported(&CONTEXT_PRIORITY, |k| k == ContextKind::Surface),
            Some(ContextKind::Surface)
        );
        assert_eq!(first_supported(&CONTEXT_PRIORITY, |_| false), None);
        assert_eq!(first_supported(&[], |_| true), None);
    }

    #[test]
    fn test_probe_prefers_visual() {
        let (engine, _gl, context) = setup(RecordingEngine::new().with_visual(), RecordingGl::new().with_shared_context());
        assert_eq!(probe(engine.as_ref(), &context), Some(ContextKind::Visual));

        // Without a shareable native context the hardware path is unavailable
        let (engine, _gl, context) = setup(RecordingEngine::new().with_visual(), RecordingGl::new());
        assert_eq!(probe(engine.as_ref(), &context), Some(ContextKind::Surface));
    }

    #[test]
    fn test_create_fails_without_any_strategy() {
        let (engine, _gl, context) = setup(RecordingEngine::new().without_surface(), RecordingGl::new());
        let result = DisplayContext::create(engine, context, TextureFilter::Linear);
        assert!(matches!(result, Err(MovieError::UnsupportedContext)));
    }

    #[test]
    fn test_visual_context_lifecycle() {
        let (engine, _gl, context) = setup(RecordingEngine::new().with_visual(), RecordingGl::new().with_shared_context());
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Linear).unwrap();
        assert_eq!(display.kind(), ContextKind::Visual);
        assert_eq!(display.state(), ContextState::Created);

        let native = display.native_handle().unwrap();
        let props = display.movie_properties();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].class, tags::CONTEXT);
        assert_eq!(props[0].id, tags::VISUAL);
        assert_eq!(props[0].value, PropertyValue::Handle(native));

        display.process();
        assert_eq!(engine.count(|c| *c == EngineCall::VisualContextTask(native.as_raw())), 1);

        assert!(display.update_for_movie(handle(0x999)).unwrap());
        assert!(display.texture().unwrap().is_some());
        assert_eq!(display.state(), ContextState::TextureBound);

        display.destroy();
        display.destroy();
        drop(display);
        assert_eq!(engine.count(|c| *c == EngineCall::ReleaseVisualContext(native.as_raw())), 1);
    }

    #[test]
    fn test_surface_context_has_no_properties() {
        let (engine, _gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        let display = DisplayContext::create(engine, context, TextureFilter::Linear).unwrap();
        assert_eq!(display.kind(), ContextKind::Surface);
        assert_eq!(display.state(), ContextState::Uninitialized);
        assert!(display.movie_properties().is_empty());
    }

    #[test]
    fn test_surface_update_normalizes_box() {
        let (engine, _gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        engine.set_movie_box_value(MovieBox::new(10, 20, 330, 260));
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Linear).unwrap();

        let movie = handle(0x500);
        assert!(display.update_for_movie(movie).unwrap());
        assert_eq!(display.state(), ContextState::Created);

        let normalized = MovieBox::new(0, 0, 320, 240);
        let calls = engine.calls();
        assert!(calls.contains(&EngineCall::SetMovieBox(normalized)));
        assert!(calls.contains(&EngineCall::NewSurface(normalized)));

        let surface = display.native_handle().unwrap();
        assert!(calls.contains(&EngineCall::SetMovieSurface(movie.as_raw(), surface.as_raw())));
        let DisplayContext::Surface(ctx) = &display else {
            panic!("expected surface context");
        };
        assert_eq!(ctx.buffer().unwrap().size(), (320, 240));
        assert!(engine.surface_buffer(surface.as_raw()).unwrap().same_storage(ctx.buffer().unwrap()));
    }

    #[test]
    fn test_surface_update_without_area() {
        let (engine, _gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        engine.set_movie_box_value(MovieBox::default());
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Linear).unwrap();

        assert!(!display.update_for_movie(handle(0x500)).unwrap());
        assert!(display.texture().unwrap().is_none());
        assert_eq!(engine.count(|c| matches!(c, EngineCall::NewSurface(_))), 0);
    }

    #[test]
    fn test_surface_update_replaces_previous_surface() {
        let (engine, gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Nearest).unwrap();

        display.update_for_movie(handle(0x500)).unwrap();
        let first = display.native_handle().unwrap();
        assert!(display.texture().unwrap().is_some());

        display.update_for_movie(handle(0x501)).unwrap();
        assert_eq!(engine.count(|c| *c == EngineCall::DisposeSurface(first.as_raw())), 1);
        assert_ne!(display.native_handle(), Some(first));
        // The old texture went with the old surface
        assert_eq!(gl.deleted(), vec![1]);
        assert!(gl.calls().contains(&GlCall::Filter(TextureTarget::Rectangle, TextureFilter::Nearest)));
    }

    #[test]
    fn test_surface_failure_still_yields_texture() {
        let (engine, _gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        engine.fail_surface();
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Linear).unwrap();

        assert!(display.update_for_movie(handle(0x500)).unwrap());
        assert!(display.native_handle().is_none());
        assert!(display.texture().unwrap().is_some());
        assert_eq!(engine.count(|c| matches!(c, EngineCall::SetMovieSurface(..))), 0);
    }

    #[test]
    fn test_reset_rebuilds_texture() {
        let (engine, _gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        let mut display = DisplayContext::create(engine, context, TextureFilter::Linear).unwrap();
        display.update_for_movie(handle(0x500)).unwrap();

        let before = display.texture().unwrap().unwrap().texture_id();
        display.reset();
        assert!(!display.has_texture());
        let after = display.texture().unwrap().unwrap().texture_id();
        assert_ne!(before, after);
    }

    #[test]
    fn test_destroyed_context_is_inert() {
        let (engine, gl, context) = setup(RecordingEngine::new(), RecordingGl::new());
        let mut display = DisplayContext::create(engine.clone(), context, TextureFilter::Linear).unwrap();
        display.update_for_movie(handle(0x500)).unwrap();
        let surface = display.native_handle().unwrap();
        display.texture().unwrap();

        display.destroy();
        assert_eq!(display.state(), ContextState::Destroyed);
        assert!(display.texture().unwrap().is_none());
        assert!(!display.update_for_movie(handle(0x501)).unwrap());

        display.destroy();
        drop(display);
        assert_eq!(engine.count(|c| *c == EngineCall::DisposeSurface(surface.as_raw())), 1);
        assert_eq!(gl.deleted(), vec![1]);
    }
}
