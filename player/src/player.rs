//! Playback controller
//!
//! [`Movie`] ties a display context, a native movie and a subsystem lease
//! together. The caller pumps it with [`Movie::process`] once per render
//! tick and samples [`Movie::current_texture`] when drawing.

use crate::Result;
use crate::config::{PlaybackSettings, TextureSettings};
use crate::context::{ContextKind, DisplayContext};
use crate::engine::TimeValue;
use crate::gl::GlContext;
use crate::movie::MovieHandle;
use crate::stats::PumpStats;
use crate::subsystem::{MediaSubsystem, SubsystemLease};
use crate::texture::Texture;
use crate::with_movie;
use common::{
    LoadState, MovieBox, MovieInfo, MovieProperty, NativeHandle, PropertyValue, TextureDescriptor, TrackInfo,
    decode_volume, encode_volume, tags,
};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// Volume restored by `unmute` when the movie was silent rather than muted
const UNMUTE_FLOOR: f32 = 0.1;

/// Movie presented as a texture.
pub struct Movie {
    movie: MovieHandle,
    gl: Rc<GlContext>,
    stats: PumpStats,
    source: Option<String>,
    // Dropped after `movie` so the engine is exited last
    lease: SubsystemLease,
}

impl Movie {
    /// Controller with a probed display context and no movie loaded
    pub fn new(subsystem: &Rc<MediaSubsystem>, gl: Rc<GlContext>, texture: &TextureSettings) -> Result<Self> {
        let lease = subsystem.acquire()?;
        let context = DisplayContext::create(subsystem.engine(), gl.clone(), texture.filter_mode())?;
        log::info!("Using {} display context", context.kind().name());

        Ok(Self {
            movie: MovieHandle::new(subsystem.engine(), context),
            gl,
            stats: PumpStats::new(),
            source: None,
            lease,
        })
    }

    /// Controller with `source` loaded
    pub fn open(
        subsystem: &Rc<MediaSubsystem>,
        gl: Rc<GlContext>,
        texture: &TextureSettings,
        source: &str,
    ) -> Result<Self> {
        let mut movie = Self::new(subsystem, gl, texture)?;
        movie.load_path(source)?;
        Ok(movie)
    }

    /// Load a URL if `source` has a scheme, a file path otherwise
    pub fn load_path(&mut self, source: &str) -> Result<()> {
        if source.contains("://") {
            self.load_url(source)
        } else {
            self.load_file_path(source)
        }
    }

    pub fn load_url(&mut self, url: &str) -> Result<()> {
        let property = MovieProperty::new(tags::DATA_LOCATION, tags::URL, PropertyValue::Url(url.to_string()));
        self.load_from_properties(&[property])?;
        self.source = Some(url.to_string());
        Ok(())
    }

    pub fn load_file_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let property = MovieProperty::new(
            tags::DATA_LOCATION,
            tags::NATIVE_PATH,
            PropertyValue::Text(path.clone()),
        );
        self.load_from_properties(&[property])?;
        self.source = Some(path);
        Ok(())
    }

    /// Replace the current movie with one built from `properties`
    pub fn load_from_properties(&mut self, properties: &[MovieProperty]) -> Result<()> {
        self.source = None;
        self.movie.load_from_properties(properties)?;
        self.stats.reset();
        log::info!(
            "Loaded movie {:#x}",
            self.movie.native_handle().map_or(0, NativeHandle::as_raw)
        );
        Ok(())
    }

    /// Advance decoding by one tick, spending at most about `budget` in the engine
    pub fn process(&mut self, budget: Duration) -> Result<()> {
        let released = self.gl.drain_pending();
        if released > 0 {
            log::debug!("Released {} deferred textures", released);
        }

        if let Some(context) = self.movie.context() {
            context.process();
        }

        self.stats.record_tick();
        let Some(movie) = self.movie.native_handle() else {
            return Ok(());
        };
        let budget_ms = budget.as_millis().min(u32::MAX as u128) as u32;
        log::trace!("Engine task for movie {:#x} ({} ms)", movie.as_raw(), budget_ms);

        #[cfg(feature = "profiling")]
        let started = std::time::Instant::now();
        let result = self.movie.engine().movies_task(movie, budget_ms);
        #[cfg(feature = "profiling")]
        self.stats.record_task_time(started.elapsed());

        if result.is_err() {
            self.stats.record_task_error();
        }
        result
    }

    /// Texture holding the latest frame, pulling a new one if available.
    ///
    /// `None` for movies without a visual area.
    pub fn current_texture(&mut self) -> Result<Option<&Texture>> {
        if !self.movie.has_visuals() {
            return Ok(None);
        }
        let Some(context) = self.movie.context_mut() else {
            return Ok(None);
        };
        let Some(texture) = context.texture()? else {
            return Ok(None);
        };
        if texture.update(false)? {
            self.stats.record_frame();
        }
        Ok(Some(texture))
    }

    pub fn texture_descriptor(&mut self) -> Result<Option<TextureDescriptor>> {
        Ok(self.current_texture()?.and_then(Texture::descriptor))
    }

    pub fn start(&self) {
        with_movie!(self, (), |engine, movie| engine.start(movie))
    }

    pub fn stop(&self) {
        with_movie!(self, (), |engine, movie| engine.stop(movie))
    }

    /// Rate zero, keeping position
    pub fn pause(&self) {
        self.set_rate(0.0);
    }

    pub fn go_to_beginning(&self) {
        with_movie!(self, (), |engine, movie| engine.go_to_beginning(movie))
    }

    pub fn rate(&self) -> f64 {
        with_movie!(self, 0.0, |engine, movie| engine.rate(movie))
    }

    pub fn set_rate(&self, rate: f64) {
        with_movie!(self, (), |engine, movie| engine.set_rate(movie, rate))
    }

    /// Position in time scale units
    pub fn time(&self) -> TimeValue {
        with_movie!(self, 0, |engine, movie| engine.time(movie))
    }

    pub fn set_time(&self, time: TimeValue) {
        with_movie!(self, (), |engine, movie| engine.set_time(movie, time))
    }

    pub fn duration(&self) -> TimeValue {
        with_movie!(self, 0, |engine, movie| engine.duration(movie))
    }

    /// Time units per second
    pub fn time_scale(&self) -> i32 {
        with_movie!(self, 0, |engine, movie| engine.time_scale(movie))
    }

    /// Current volume; negative while muted
    pub fn volume(&self) -> f32 {
        with_movie!(self, 0.0, |engine, movie| decode_volume(engine.volume(movie)))
    }

    pub fn set_volume(&self, volume: f32) {
        with_movie!(self, (), |engine, movie| engine.set_volume(movie, encode_volume(volume)))
    }

    /// Mute, or flip the mute state when `toggle` is set
    pub fn mute(&self, toggle: bool) {
        let volume = self.volume();
        if toggle || volume >= 0.0 {
            self.set_volume(-volume);
        }
    }

    /// Restore a muted volume; a silent movie gets a small audible level
    pub fn unmute(&self) {
        let volume = self.volume();
        if volume < 0.0 {
            self.set_volume(-volume);
        } else if volume == 0.0 {
            self.set_volume(UNMUTE_FLOOR);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.volume() < 0.0
    }

    /// Loop from the start of the movie
    pub fn set_looping(&self, looping: bool) {
        with_movie!(self, (), |engine, movie| {
            engine.go_to_beginning(movie);
            engine.set_looping(movie, looping);
        })
    }

    pub fn load_state(&self) -> LoadState {
        with_movie!(self, LoadState::Error, |engine, movie| engine.load_state(movie))
    }

    pub fn is_active(&self) -> bool {
        with_movie!(self, false, |engine, movie| engine.is_active(movie))
    }

    pub fn is_done(&self) -> bool {
        with_movie!(self, false, |engine, movie| engine.is_done(movie))
    }

    pub fn movie_box(&self) -> MovieBox {
        self.movie.movie_box()
    }

    pub fn has_visuals(&self) -> bool {
        self.movie.has_visuals()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.movie.tracks()
    }

    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.movie.native_handle()
    }

    pub fn display_context(&self) -> Option<ContextKind> {
        self.movie.context().map(DisplayContext::kind)
    }

    /// Version of the decode engine
    pub fn engine_version(&self) -> Option<u32> {
        self.lease.subsystem().version()
    }

    pub fn stats(&self) -> &PumpStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut PumpStats {
        &mut self.stats
    }

    /// Snapshot of the movie and its current frame
    pub fn info(&mut self) -> Result<MovieInfo> {
        let texture = self.texture_descriptor()?;
        Ok(MovieInfo {
            source: self.source.clone().unwrap_or_default(),
            display_context: self.display_context().map_or("none", |k| k.name()).to_string(),
            movie_box: self.movie_box(),
            has_visuals: self.has_visuals(),
            duration: self.duration(),
            time_scale: self.time_scale(),
            load_state: self.load_state(),
            volume: self.volume(),
            tracks: self.tracks(),
            texture,
        })
    }

    /// Apply configured transport state to the loaded movie
    pub fn apply_playback(&self, settings: &PlaybackSettings) {
        self.set_volume(settings.volume);
        self.set_looping(settings.looping);
        if settings.autoplay {
            self.start();
            if settings.rate != 1.0 {
                self.set_rate(settings.rate);
            }
        }
    }

    /// Dispose the movie and its display context; safe to call repeatedly
    pub fn destroy(&mut self) {
        self.movie.destroy();
        let released = self.gl.drain_pending();
        if released > 0 {
            log::debug!("Released {} deferred textures during teardown", released);
        }
    }
}

impl Drop for Movie {
    fn drop(&mut self) {
        self.destroy();
    }
}
