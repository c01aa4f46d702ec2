//! Recording doubles for the engine and graphics backends

use crate::Result;
use crate::engine::{EngineStatus, ImageInfo, MovieEngine, PixelBuffer, TimeValue};
use crate::gl::{GlApi, PixelFormat, SharedGlContext, TextureFilter, TextureId};
use crate::property::PropertyArray;
use common::{FourCc, LoadState, MovieBox, MovieError, MovieProperty, NativeHandle, TexCoords, TextureTarget, tags};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn handle(raw: usize) -> NativeHandle {
    NativeHandle::from_raw(raw).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Gen(u32),
    Delete(u32),
    Bind(TextureTarget, Option<u32>),
    Enable(TextureTarget),
    Disable(TextureTarget),
    Filter(TextureTarget, TextureFilter),
    Image(TextureTarget, (u32, u32)),
    SubImage(TextureTarget, (u32, u32), (u32, u32), usize),
}

/// Graphics backend that hands out increasing names and records every call
pub struct RecordingGl {
    calls: RefCell<Vec<GlCall>>,
    current: Cell<bool>,
    rectangle: Cell<bool>,
    shared: Cell<Option<SharedGlContext>>,
    next_id: Cell<u32>,
}

impl RecordingGl {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            current: Cell::new(true),
            rectangle: Cell::new(true),
            shared: Cell::new(None),
            next_id: Cell::new(1),
        }
    }

    pub fn without_rectangle(self) -> Self {
        self.rectangle.set(false);
        self
    }

    pub fn with_shared_context(self) -> Self {
        self.shared.set(Some(SharedGlContext {
            context: handle(0xC0),
            pixel_format: handle(0xF0),
        }));
        self
    }

    pub fn set_current(&self, current: bool) {
        self.current.set(current);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn deleted(&self) -> Vec<u32> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                GlCall::Delete(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl GlApi for RecordingGl {
    fn gen_texture(&self) -> Result<TextureId> {
        let raw = self.next_id.get();
        self.next_id.set(raw + 1);
        self.record(GlCall::Gen(raw));
        TextureId::new(raw).ok_or_else(|| MovieError::Gpu("texture names exhausted".into()))
    }

    fn delete_texture(&self, id: TextureId) {
        self.record(GlCall::Delete(id.get()));
    }

    fn bind_texture(&self, target: TextureTarget, id: Option<TextureId>) {
        self.record(GlCall::Bind(target, id.map(TextureId::get)));
    }

    fn enable(&self, target: TextureTarget) {
        self.record(GlCall::Enable(target));
    }

    fn disable(&self, target: TextureTarget) {
        self.record(GlCall::Disable(target));
    }

    fn supports_target(&self, target: TextureTarget) -> bool {
        match target {
            TextureTarget::Texture2D => true,
            TextureTarget::Rectangle => self.rectangle.get(),
        }
    }

    fn set_filter(&self, target: TextureTarget, filter: TextureFilter) {
        self.record(GlCall::Filter(target, filter));
    }

    fn tex_image_2d(&self, target: TextureTarget, size: (u32, u32), _format: PixelFormat) -> Result<()> {
        self.record(GlCall::Image(target, size));
        Ok(())
    }

    fn tex_sub_image_2d(
        &self,
        target: TextureTarget,
        origin: (u32, u32),
        size: (u32, u32),
        _format: PixelFormat,
        pixels: &[u8],
    ) -> Result<()> {
        self.record(GlCall::SubImage(target, origin, size, pixels.len()));
        Ok(())
    }

    fn is_context_current(&self) -> bool {
        self.current.get()
    }

    fn shared_context(&self) -> Option<SharedGlContext> {
        self.shared.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    EnterMovies,
    ExitMovies,
    NewMovie(usize),
    DisposeMovie(usize),
    MoviesTask(usize, u32),
    SetMovieBox(MovieBox),
    Start,
    Stop,
    GoToBeginning,
    SetRate(f64),
    SetTime(TimeValue),
    SetVolume(i16),
    SetLooping(bool),
    CreateVisualContext,
    ReleaseVisualContext(usize),
    VisualContextTask(usize),
    CopyImage,
    ReleaseImage(usize),
    NewSurface(MovieBox),
    SetMovieSurface(usize, usize),
    DisposeSurface(usize),
}

/// Decode engine double with scripted answers and a call log
pub struct RecordingEngine {
    calls: RefCell<Vec<EngineCall>>,
    visual: Cell<bool>,
    surface: Cell<bool>,
    surface_fails: Cell<bool>,
    fail_status: Cell<Option<EngineStatus>>,
    task_error: RefCell<Option<String>>,
    movie_box: Cell<MovieBox>,
    new_image: Cell<bool>,
    no_images: Cell<bool>,
    image_coords: Cell<TexCoords>,
    volume: Cell<i16>,
    rate: Cell<f64>,
    time: Cell<TimeValue>,
    looping: Cell<bool>,
    tracks: RefCell<Vec<FourCc>>,
    properties: RefCell<Vec<MovieProperty>>,
    surfaces: RefCell<HashMap<usize, PixelBuffer>>,
    next_handle: Cell<usize>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            visual: Cell::new(false),
            surface: Cell::new(true),
            surface_fails: Cell::new(false),
            fail_status: Cell::new(None),
            task_error: RefCell::new(None),
            movie_box: Cell::new(MovieBox::new(0, 0, 640, 480)),
            new_image: Cell::new(false),
            no_images: Cell::new(false),
            image_coords: Cell::new(TexCoords([[0.0, 480.0], [640.0, 480.0], [640.0, 0.0], [0.0, 0.0]])),
            volume: Cell::new(0x0100),
            rate: Cell::new(0.0),
            time: Cell::new(0),
            looping: Cell::new(false),
            tracks: RefCell::new(vec![tags::VIDEO, tags::SOUND]),
            properties: RefCell::new(Vec::new()),
            surfaces: RefCell::new(HashMap::new()),
            next_handle: Cell::new(0x100),
        }
    }

    pub fn with_visual(self) -> Self {
        self.visual.set(true);
        self
    }

    pub fn without_surface(self) -> Self {
        self.surface.set(false);
        self
    }

    pub fn set_movie_box_value(&self, bounds: MovieBox) {
        self.movie_box.set(bounds);
    }

    pub fn fail_construction(&self, status: EngineStatus) {
        self.fail_status.set(Some(status));
    }

    pub fn fail_surface(&self) {
        self.surface_fails.set(true);
    }

    pub fn fail_task(&self, message: &str) {
        *self.task_error.borrow_mut() = Some(message.to_string());
    }

    pub fn set_new_image(&self, available: bool) {
        self.new_image.set(available);
    }

    /// Make `copy_image` come back empty
    pub fn run_out_of_images(&self) {
        self.no_images.set(true);
    }

    pub fn set_volume_raw(&self, raw: i16) {
        self.volume.set(raw);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Properties seen by the last construction call
    pub fn last_properties(&self) -> Vec<MovieProperty> {
        self.properties.borrow().clone()
    }

    /// Buffer registered for `surface`
    pub fn surface_buffer(&self, surface: usize) -> Option<PixelBuffer> {
        self.surfaces.borrow().get(&surface).cloned()
    }

    fn record(&self, call: EngineCall) {
        self.calls.borrow_mut().push(call);
    }

    fn next(&self) -> NativeHandle {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        handle(raw)
    }
}

impl MovieEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn enter_movies(&self) -> Result<()> {
        self.record(EngineCall::EnterMovies);
        Ok(())
    }

    fn exit_movies(&self) {
        self.record(EngineCall::ExitMovies);
    }

    fn version(&self) -> Option<u32> {
        Some(0x0730_0000)
    }

    fn new_movie_from_properties(
        &self,
        properties: &mut PropertyArray,
    ) -> std::result::Result<NativeHandle, EngineStatus> {
        *self.properties.borrow_mut() = properties.entries().to_vec();
        if let Some(status) = self.fail_status.get() {
            properties.set_status(0, status);
            return Err(status);
        }
        let movie = self.next();
        self.record(EngineCall::NewMovie(movie.as_raw()));
        Ok(movie)
    }

    fn dispose_movie(&self, movie: NativeHandle) {
        self.record(EngineCall::DisposeMovie(movie.as_raw()));
    }

    fn movies_task(&self, movie: NativeHandle, budget_ms: u32) -> Result<()> {
        self.record(EngineCall::MoviesTask(movie.as_raw(), budget_ms));
        match self.task_error.borrow().as_ref() {
            Some(message) => Err(MovieError::Engine(message.clone())),
            None => Ok(()),
        }
    }

    fn movie_box(&self, _movie: NativeHandle) -> MovieBox {
        self.movie_box.get()
    }

    fn set_movie_box(&self, _movie: NativeHandle, bounds: MovieBox) {
        self.record(EngineCall::SetMovieBox(bounds));
        self.movie_box.set(bounds);
    }

    fn start(&self, _movie: NativeHandle) {
        self.record(EngineCall::Start);
        self.rate.set(1.0);
    }

    fn stop(&self, _movie: NativeHandle) {
        self.record(EngineCall::Stop);
        self.rate.set(0.0);
    }

    fn go_to_beginning(&self, _movie: NativeHandle) {
        self.record(EngineCall::GoToBeginning);
        self.time.set(0);
    }

    fn rate(&self, _movie: NativeHandle) -> f64 {
        self.rate.get()
    }

    fn set_rate(&self, _movie: NativeHandle, rate: f64) {
        self.record(EngineCall::SetRate(rate));
        self.rate.set(rate);
    }

    fn time(&self, _movie: NativeHandle) -> TimeValue {
        self.time.get()
    }

    fn set_time(&self, _movie: NativeHandle, time: TimeValue) {
        self.record(EngineCall::SetTime(time));
        self.time.set(time);
    }

    fn duration(&self, _movie: NativeHandle) -> TimeValue {
        6000
    }

    fn time_scale(&self, _movie: NativeHandle) -> i32 {
        600
    }

    fn volume(&self, _movie: NativeHandle) -> i16 {
        self.volume.get()
    }

    fn set_volume(&self, _movie: NativeHandle, volume: i16) {
        self.record(EngineCall::SetVolume(volume));
        self.volume.set(volume);
    }

    fn set_looping(&self, _movie: NativeHandle, looping: bool) {
        self.record(EngineCall::SetLooping(looping));
        self.looping.set(looping);
    }

    fn load_state(&self, _movie: NativeHandle) -> LoadState {
        LoadState::Complete
    }

    fn is_active(&self, _movie: NativeHandle) -> bool {
        true
    }

    fn is_done(&self, _movie: NativeHandle) -> bool {
        false
    }

    fn track_count(&self, _movie: NativeHandle) -> u32 {
        self.tracks.borrow().len() as u32
    }

    fn track_media_type(&self, _movie: NativeHandle, index: u32) -> Option<FourCc> {
        self.tracks.borrow().get(index as usize).copied()
    }

    fn supports_visual_context(&self) -> bool {
        self.visual.get()
    }

    fn create_visual_context(&self, _shared: &SharedGlContext) -> Result<NativeHandle> {
        self.record(EngineCall::CreateVisualContext);
        Ok(self.next())
    }

    fn release_visual_context(&self, context: NativeHandle) {
        self.record(EngineCall::ReleaseVisualContext(context.as_raw()));
    }

    fn visual_context_task(&self, context: NativeHandle) {
        self.record(EngineCall::VisualContextTask(context.as_raw()));
    }

    fn is_new_image_available(&self, _context: NativeHandle) -> bool {
        self.new_image.get()
    }

    fn copy_image(&self, _context: NativeHandle) -> Result<Option<NativeHandle>> {
        self.record(EngineCall::CopyImage);
        self.new_image.set(false);
        if self.no_images.get() {
            return Ok(None);
        }
        Ok(Some(self.next()))
    }

    fn release_image(&self, image: NativeHandle) {
        self.record(EngineCall::ReleaseImage(image.as_raw()));
    }

    fn image_info(&self, image: NativeHandle) -> Result<ImageInfo> {
        Ok(ImageInfo {
            target: TextureTarget::Rectangle,
            texture_id: image.as_raw() as u32,
            clean_coords: self.image_coords.get(),
        })
    }

    fn supports_surface(&self) -> bool {
        self.surface.get()
    }

    fn new_surface(&self, buffer: &PixelBuffer, bounds: MovieBox, _pixel_format: FourCc) -> Result<NativeHandle> {
        self.record(EngineCall::NewSurface(bounds));
        if self.surface_fails.get() {
            return Err(MovieError::Engine("out of surface memory".into()));
        }
        let surface = self.next();
        self.surfaces.borrow_mut().insert(surface.as_raw(), buffer.clone());
        Ok(surface)
    }

    fn set_movie_surface(&self, movie: NativeHandle, surface: NativeHandle) {
        self.record(EngineCall::SetMovieSurface(movie.as_raw(), surface.as_raw()));
    }

    fn dispose_surface(&self, surface: NativeHandle) {
        self.record(EngineCall::DisposeSurface(surface.as_raw()));
        self.surfaces.borrow_mut().remove(&surface.as_raw());
    }
}
