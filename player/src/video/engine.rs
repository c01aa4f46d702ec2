//! GStreamer movie engine
//!
//! Movies are playbins addressed by handle. There is no hardware visual
//! context here; frames reach the GPU through render surfaces that the
//! app sink callback writes into.

use super::frames::FrameSink;
use super::pipeline;
use crate::Result;
use crate::config::EngineSettings;
use crate::engine::{EngineStatus, MovieEngine, PixelBuffer, TimeValue};
use crate::log_and_continue;
use crate::property::PropertyArray;
use common::{
    FourCc, LoadState, MovieBox, MovieError, NativeHandle, PropertyValue, decode_volume, tags,
};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Malformed or missing construction parameter
pub const STATUS_PARAM: EngineStatus = -50;
/// Local file does not exist or cannot be resolved
pub const STATUS_FILE_NOT_FOUND: EngineStatus = -43;
/// Pipeline could not be built or prerolled
pub const STATUS_CANNOT_OPEN: EngineStatus = -2000;
/// Property the engine does not understand
pub const STATUS_PROPERTY_NOT_SUPPORTED: EngineStatus = -2195;

/// Engine times are milliseconds
const TIME_SCALE: i32 = 1000;

/// Where a new movie comes from, plus its construction flags
#[derive(Debug, Clone, PartialEq)]
struct MovieSource {
    uri: String,
    local: bool,
    active: bool,
}

struct GstMovie {
    playbin: gst::Element,
    app_sink: gst_app::AppSink,
    frames: FrameSink,
    bounds: MovieBox,
    surface: Option<NativeHandle>,
    /// Requested rate; zero while stopped
    rate: f64,
    /// Rate of the current playback segment
    segment_rate: f64,
    volume: i16,
    looping: bool,
    active: bool,
    done: bool,
    failed: bool,
    local: bool,
}

impl GstMovie {
    fn play(&mut self) {
        log_and_continue!(self.playbin.set_state(gst::State::Playing), "start playback");
    }

    fn pause(&mut self) {
        log_and_continue!(self.playbin.set_state(gst::State::Paused), "pause playback");
    }

    fn apply_rate(&mut self, rate: f64) {
        if rate == 0.0 {
            self.rate = 0.0;
            self.pause();
            return;
        }

        if rate != self.segment_rate {
            let position = self
                .playbin
                .query_position::<gst::ClockTime>()
                .unwrap_or(gst::ClockTime::ZERO);
            let flags = gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE;
            let result = if rate > 0.0 {
                self.playbin.seek(
                    rate,
                    flags,
                    gst::SeekType::Set,
                    Some(position),
                    gst::SeekType::None,
                    gst::ClockTime::NONE,
                )
            } else {
                self.playbin.seek(
                    rate,
                    flags,
                    gst::SeekType::Set,
                    Some(gst::ClockTime::ZERO),
                    gst::SeekType::Set,
                    Some(position),
                )
            };
            match result {
                Ok(()) => self.segment_rate = rate,
                Err(e) => log::warn!("Failed to change playback rate to {}: {}", rate, e),
            }
        }

        self.rate = rate;
        self.play();
    }

    fn seek_to(&mut self, position: gst::ClockTime, flags: gst::SeekFlags) {
        match self.playbin.seek_simple(gst::SeekFlags::FLUSH | flags, position) {
            Ok(()) => {
                self.done = false;
                // A simple seek resets the segment to normal speed
                self.segment_rate = 1.0;
                if self.rate != 0.0 && self.rate != 1.0 {
                    self.apply_rate(self.rate);
                }
            }
            Err(e) => log::warn!("Failed to seek to {}: {}", position, e),
        }
    }

    /// Drain the bus until it is empty or the deadline passes
    fn pump_bus(&mut self, deadline: Instant) -> Result<()> {
        let Some(bus) = self.playbin.bus() else {
            return Ok(());
        };

        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    if self.looping {
                        log::debug!("Movie reached end, looping");
                        self.seek_to(gst::ClockTime::ZERO, gst::SeekFlags::KEY_UNIT);
                    } else {
                        log::info!("Movie playback finished");
                        self.done = true;
                    }
                }
                gst::MessageView::Error(err) => {
                    self.failed = true;
                    return Err(MovieError::Engine(format!(
                        "{} (debug: {:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                gst::MessageView::Warning(warning) => {
                    log::warn!("GStreamer warning: {}", warning.error());
                }
                gst::MessageView::Buffering(buffering) => {
                    log::trace!("Buffering {}%", buffering.percent());
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }

    fn track_counts(&self) -> [(FourCc, u32); 3] {
        let count = |name: &str| self.playbin.property::<i32>(name).max(0) as u32;
        [
            (tags::VIDEO, count("n-video")),
            (tags::SOUND, count("n-audio")),
            (tags::TEXT, count("n-text")),
        ]
    }

    fn shutdown(&self) {
        pipeline::clear_frame_callback(&self.app_sink);
        self.frames.set_target(None);
        pipeline::shutdown(&self.playbin);
        log::debug!(
            "Movie frames: {} received, {} dropped",
            self.frames.frames_received(),
            self.frames.frames_dropped()
        );
    }
}

/// Movie engine backed by GStreamer playbins
///
/// Construction is synchronous whatever `mins/asok` says: opening a movie
/// blocks in preroll for up to `preroll_timeout_ms` so the movie box is known
/// when the handle is returned. The flag is accepted with status 0.
pub struct GstEngine {
    settings: EngineSettings,
    movies: RefCell<HashMap<NativeHandle, GstMovie>>,
    surfaces: RefCell<HashMap<NativeHandle, PixelBuffer>>,
    next_handle: Cell<usize>,
}

impl GstEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            movies: RefCell::new(HashMap::new()),
            surfaces: RefCell::new(HashMap::new()),
            next_handle: Cell::new(1),
        }
    }

    fn next_handle(&self) -> Option<NativeHandle> {
        let raw = self.next_handle.get();
        self.next_handle.set(raw.wrapping_add(1).max(1));
        NativeHandle::from_raw(raw)
    }

    fn with_movie<R>(&self, movie: NativeHandle, default: R, f: impl FnOnce(&mut GstMovie) -> R) -> R {
        match self.movies.borrow_mut().get_mut(&movie) {
            Some(entry) => f(entry),
            None => {
                log::warn!("Unknown movie handle {:#x}", movie.as_raw());
                default
            }
        }
    }

    fn open(&self, source: &MovieSource) -> std::result::Result<GstMovie, EngineStatus> {
        let (playbin, app_sink) = pipeline::build_playbin(&source.uri).map_err(|e| {
            log::error!("Failed to build pipeline for {}: {:#}", source.uri, e);
            STATUS_CANNOT_OPEN
        })?;
        pipeline::configure_app_sink(&app_sink);

        let frames = FrameSink::new();
        pipeline::setup_frame_callback(&app_sink, frames.clone());

        let timeout = Duration::from_millis(self.settings.preroll_timeout_ms);
        if let Err(e) = pipeline::preroll(&playbin, timeout) {
            log::error!("Failed to open {}: {:#}", source.uri, e);
            pipeline::clear_frame_callback(&app_sink);
            pipeline::shutdown(&playbin);
            return Err(STATUS_CANNOT_OPEN);
        }

        let bounds = match pipeline::detect_video_size(&app_sink) {
            Some((width, height)) => MovieBox::new(0, 0, clamp_extent(width), clamp_extent(height)),
            None => {
                log::debug!("No video stream negotiated for {}", source.uri);
                MovieBox::default()
            }
        };
        pipeline::detect_fps(&app_sink);

        Ok(GstMovie {
            playbin,
            app_sink,
            frames,
            bounds,
            surface: None,
            rate: 0.0,
            segment_rate: 1.0,
            volume: common::encode_volume(1.0),
            looping: false,
            active: source.active,
            done: false,
            failed: false,
            local: source.local,
        })
    }
}

fn clamp_extent(extent: u32) -> i16 {
    i16::try_from(extent).unwrap_or(i16::MAX)
}

/// Absolute `file://` URI for a local path
fn file_uri(path: &str) -> std::result::Result<String, EngineStatus> {
    let absolute = std::fs::canonicalize(path).map_err(|e| {
        log::debug!("Cannot resolve {}: {}", path, e);
        STATUS_FILE_NOT_FOUND
    })?;
    gst::glib::filename_to_uri(&absolute, None)
        .map(|uri| uri.to_string())
        .map_err(|_| STATUS_PARAM)
}

/// Read the construction list, writing a status back into every record
///
/// The first data location wins; later flags override earlier ones.
fn resolve_source(properties: &mut PropertyArray) -> std::result::Result<MovieSource, EngineStatus> {
    let mut location: Option<(String, bool)> = None;
    let mut active = false;
    let mut failure = None;
    let mut statuses = Vec::with_capacity(properties.len());

    for property in properties.entries() {
        let status = match (property.class, property.id, &property.value) {
            (tags::DATA_LOCATION, tags::NATIVE_PATH, PropertyValue::Text(path)) => match file_uri(path) {
                Ok(uri) => {
                    location.get_or_insert((uri, true));
                    0
                }
                Err(status) => status,
            },
            (tags::DATA_LOCATION, tags::URL, PropertyValue::Url(url)) => {
                location.get_or_insert_with(|| (url.clone(), url.starts_with("file://")));
                0
            }
            (tags::NEW_MOVIE, tags::ACTIVE, PropertyValue::Bool(flag)) => {
                active = *flag;
                0
            }
            (tags::NEW_MOVIE, tags::DONT_INTERACT, PropertyValue::Bool(_))
            | (tags::INSTANTIATION, tags::DONT_ASK_UNRESOLVED, PropertyValue::Bool(_))
            | (tags::INSTANTIATION, tags::ASYNC_OK, PropertyValue::Bool(_)) => 0,
            _ => STATUS_PROPERTY_NOT_SUPPORTED,
        };
        if status != 0 && status != STATUS_PROPERTY_NOT_SUPPORTED {
            failure.get_or_insert(status);
        }
        statuses.push(status);
    }

    for (index, status) in statuses.into_iter().enumerate() {
        properties.set_status(index, status);
    }

    match location {
        Some((uri, local)) => Ok(MovieSource { uri, local, active }),
        None => Err(failure.unwrap_or(STATUS_PARAM)),
    }
}

impl MovieEngine for GstEngine {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn enter_movies(&self) -> Result<()> {
        pipeline::initialize_gstreamer().map_err(|e| MovieError::Engine(format!("{:#}", e)))
    }

    fn exit_movies(&self) {
        let movies: Vec<_> = self.movies.borrow_mut().drain().collect();
        if !movies.is_empty() {
            log::warn!("Shutting down with {} movies still open", movies.len());
        }
        for (_, movie) in movies {
            movie.shutdown();
        }
        self.surfaces.borrow_mut().clear();
    }

    fn version(&self) -> Option<u32> {
        let (major, minor, micro, _) = gst::version();
        Some((major << 16) | ((minor & 0xFF) << 8) | (micro & 0xFF))
    }

    fn new_movie_from_properties(
        &self,
        properties: &mut PropertyArray,
    ) -> std::result::Result<NativeHandle, EngineStatus> {
        let source = resolve_source(properties)?;
        let movie = self.open(&source)?;
        let handle = self.next_handle().ok_or(STATUS_PARAM)?;

        log::info!(
            "Opened movie {:#x}: {} ({}x{})",
            handle.as_raw(),
            source.uri,
            movie.bounds.width(),
            movie.bounds.height()
        );
        self.movies.borrow_mut().insert(handle, movie);
        Ok(handle)
    }

    fn dispose_movie(&self, movie: NativeHandle) {
        // Take it out first so shutdown runs without the map borrowed
        let removed = self.movies.borrow_mut().remove(&movie);
        match removed {
            Some(entry) => entry.shutdown(),
            None => log::debug!("Movie {:#x} already disposed", movie.as_raw()),
        }
    }

    fn movies_task(&self, movie: NativeHandle, budget_ms: u32) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(budget_ms));
        self.with_movie(movie, Ok(()), |m| {
            if m.frames.take_new_frame() {
                log::trace!("Movie {:#x} has a new frame", movie.as_raw());
            }
            m.pump_bus(deadline)
        })
    }

    fn movie_box(&self, movie: NativeHandle) -> MovieBox {
        self.with_movie(movie, MovieBox::default(), |m| m.bounds)
    }

    fn set_movie_box(&self, movie: NativeHandle, bounds: MovieBox) {
        self.with_movie(movie, (), |m| m.bounds = bounds);
    }

    fn start(&self, movie: NativeHandle) {
        self.with_movie(movie, (), |m| {
            let rate = if m.rate == 0.0 { 1.0 } else { m.rate };
            m.apply_rate(rate);
        });
    }

    fn stop(&self, movie: NativeHandle) {
        self.with_movie(movie, (), |m| m.apply_rate(0.0));
    }

    fn go_to_beginning(&self, movie: NativeHandle) {
        self.with_movie(movie, (), |m| m.seek_to(gst::ClockTime::ZERO, gst::SeekFlags::KEY_UNIT));
    }

    fn rate(&self, movie: NativeHandle) -> f64 {
        self.with_movie(movie, 0.0, |m| m.rate)
    }

    fn set_rate(&self, movie: NativeHandle, rate: f64) {
        self.with_movie(movie, (), |m| m.apply_rate(rate));
    }

    fn time(&self, movie: NativeHandle) -> TimeValue {
        self.with_movie(movie, 0, |m| {
            m.playbin
                .query_position::<gst::ClockTime>()
                .map_or(0, |position| position.mseconds() as TimeValue)
        })
    }

    fn set_time(&self, movie: NativeHandle, time: TimeValue) {
        let position = gst::ClockTime::from_mseconds(time.max(0) as u64);
        self.with_movie(movie, (), |m| m.seek_to(position, gst::SeekFlags::ACCURATE));
    }

    fn duration(&self, movie: NativeHandle) -> TimeValue {
        self.with_movie(movie, 0, |m| {
            m.playbin
                .query_duration::<gst::ClockTime>()
                .map_or(0, |duration| duration.mseconds() as TimeValue)
        })
    }

    fn time_scale(&self, _movie: NativeHandle) -> i32 {
        TIME_SCALE
    }

    fn volume(&self, movie: NativeHandle) -> i16 {
        self.with_movie(movie, 0, |m| m.volume)
    }

    fn set_volume(&self, movie: NativeHandle, volume: i16) {
        self.with_movie(movie, (), |m| {
            m.volume = volume;
            let level = f64::from(decode_volume(volume).abs());
            m.playbin.set_property("volume", level);
            m.playbin.set_property("mute", volume < 0);
        });
    }

    fn set_looping(&self, movie: NativeHandle, looping: bool) {
        self.with_movie(movie, (), |m| m.looping = looping);
    }

    fn load_state(&self, movie: NativeHandle) -> LoadState {
        self.with_movie(movie, LoadState::Error, |m| {
            if m.failed {
                return LoadState::Error;
            }
            let (_, current, _) = m.playbin.state(Some(gst::ClockTime::ZERO));
            match current {
                gst::State::Playing | gst::State::Paused if m.local => LoadState::Complete,
                gst::State::Playing | gst::State::Paused => LoadState::Playable,
                gst::State::Ready => LoadState::Loaded,
                _ => LoadState::Loading,
            }
        })
    }

    fn is_active(&self, movie: NativeHandle) -> bool {
        self.with_movie(movie, false, |m| m.active)
    }

    fn is_done(&self, movie: NativeHandle) -> bool {
        self.with_movie(movie, true, |m| m.done)
    }

    fn track_count(&self, movie: NativeHandle) -> u32 {
        self.with_movie(movie, 0, |m| m.track_counts().iter().map(|(_, n)| n).sum())
    }

    fn track_media_type(&self, movie: NativeHandle, index: u32) -> Option<FourCc> {
        self.with_movie(movie, None, |m| {
            let mut remaining = index;
            for (media, count) in m.track_counts() {
                if remaining < count {
                    return Some(media);
                }
                remaining -= count;
            }
            None
        })
    }

    fn supports_surface(&self) -> bool {
        true
    }

    fn new_surface(
        &self,
        buffer: &PixelBuffer,
        bounds: MovieBox,
        pixel_format: FourCc,
    ) -> Result<NativeHandle> {
        if pixel_format != tags::PIXEL_FORMAT_RGBA {
            return Err(MovieError::NotImplemented("non-RGBA render surfaces"));
        }
        if buffer.size() != (bounds.width().max(0) as u32, bounds.height().max(0) as u32) {
            log::warn!(
                "Surface buffer {}x{} does not match movie box {}x{}",
                buffer.width(),
                buffer.height(),
                bounds.width(),
                bounds.height()
            );
        }

        let handle = self
            .next_handle()
            .ok_or_else(|| MovieError::Engine("surface handle space exhausted".into()))?;
        self.surfaces.borrow_mut().insert(handle, buffer.clone());
        log::debug!("Created {}x{} surface {:#x}", buffer.width(), buffer.height(), handle.as_raw());
        Ok(handle)
    }

    fn set_movie_surface(&self, movie: NativeHandle, surface: NativeHandle) {
        let buffer = self.surfaces.borrow().get(&surface).cloned();
        if buffer.is_none() {
            log::warn!("Unknown surface handle {:#x}", surface.as_raw());
        }
        self.with_movie(movie, (), |m| {
            m.surface = buffer.as_ref().map(|_| surface);
            m.frames.set_target(buffer);
        });
    }

    fn dispose_surface(&self, surface: NativeHandle) {
        if self.surfaces.borrow_mut().remove(&surface).is_none() {
            log::debug!("Surface {:#x} already disposed", surface.as_raw());
            return;
        }
        for movie in self.movies.borrow_mut().values_mut() {
            if movie.surface == Some(surface) {
                movie.frames.set_target(None);
                movie.surface = None;
            }
        }
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        for (_, movie) in self.movies.get_mut().drain() {
            movie.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MovieProperty;

    fn build(properties: &[MovieProperty]) -> PropertyArray {
        PropertyArray::build(&[properties])
    }

    fn native_path(path: &str) -> MovieProperty {
        MovieProperty::new(tags::DATA_LOCATION, tags::NATIVE_PATH, PropertyValue::Text(path.into()))
    }

    #[test]
    fn test_resolve_local_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let mut properties = build(&[
            native_path(&path),
            MovieProperty::flag(tags::NEW_MOVIE, tags::ACTIVE, true),
        ]);

        let source = resolve_source(&mut properties).unwrap();
        assert!(source.uri.starts_with("file://"));
        assert!(source.local);
        assert!(source.active);
        assert_eq!(properties.status(0), Some(0));
        assert_eq!(properties.status(1), Some(0));
    }

    #[test]
    fn test_missing_file_reports_status() {
        let mut properties = build(&[native_path("/definitely/not/here.mov")]);
        let status = resolve_source(&mut properties).unwrap_err();
        assert_eq!(status, STATUS_FILE_NOT_FOUND);
        assert_eq!(properties.status(0), Some(STATUS_FILE_NOT_FOUND));
    }

    #[test]
    fn test_remote_url_is_not_local() {
        let url = MovieProperty::new(
            tags::DATA_LOCATION,
            tags::URL,
            PropertyValue::Url("https://example.com/clip.mp4".into()),
        );
        let mut properties = build(&[url]);
        let source = resolve_source(&mut properties).unwrap();
        assert_eq!(source.uri, "https://example.com/clip.mp4");
        assert!(!source.local);
        assert!(!source.active);
    }

    #[test]
    fn test_unknown_property_is_flagged_but_not_fatal() {
        let url = MovieProperty::new(
            tags::DATA_LOCATION,
            tags::URL,
            PropertyValue::Url("file:///tmp/clip.mp4".into()),
        );
        let unknown = MovieProperty::new(tags::CONTEXT, tags::VISUAL, PropertyValue::U32(7));
        let mut properties = build(&[url, unknown]);

        let source = resolve_source(&mut properties).unwrap();
        assert!(source.local);
        assert_eq!(properties.status(1), Some(STATUS_PROPERTY_NOT_SUPPORTED));
    }

    #[test]
    fn test_async_load_flag_is_accepted() {
        let url = MovieProperty::new(
            tags::DATA_LOCATION,
            tags::URL,
            PropertyValue::Url("file:///tmp/clip.mp4".into()),
        );
        let mut properties = build(&[url, MovieProperty::flag(tags::INSTANTIATION, tags::ASYNC_OK, true)]);
        assert!(resolve_source(&mut properties).is_ok());
        assert_eq!(properties.status(1), Some(0));
    }

    #[test]
    fn test_no_location_is_a_param_error() {
        let mut properties = build(&[MovieProperty::flag(tags::NEW_MOVIE, tags::ACTIVE, true)]);
        assert_eq!(resolve_source(&mut properties).unwrap_err(), STATUS_PARAM);
    }

    #[test]
    fn test_handles_are_unique_and_nonzero() {
        let engine = GstEngine::new(EngineSettings::default());
        let a = engine.next_handle().unwrap();
        let b = engine.next_handle().unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.time_scale(a), TIME_SCALE);
    }

    #[test]
    fn test_unknown_handles_use_defaults() {
        let engine = GstEngine::new(EngineSettings::default());
        let ghost = NativeHandle::from_raw(99).unwrap();
        assert_eq!(engine.movie_box(ghost), MovieBox::default());
        assert_eq!(engine.load_state(ghost), LoadState::Error);
        assert!(engine.is_done(ghost));
        assert!(engine.movies_task(ghost, 10).is_ok());
        engine.dispose_movie(ghost);
    }

    #[test]
    fn test_non_rgba_surface_is_rejected() {
        let engine = GstEngine::new(EngineSettings::default());
        let buffer = PixelBuffer::new(4, 4);
        let err = engine
            .new_surface(&buffer, MovieBox::new(0, 0, 4, 4), FourCc::from_bytes(*b"BGRA"))
            .unwrap_err();
        assert!(matches!(err, MovieError::NotImplemented(_)));

        let surface = engine
            .new_surface(&buffer, MovieBox::new(0, 0, 4, 4), tags::PIXEL_FORMAT_RGBA)
            .unwrap();
        engine.dispose_surface(surface);
        engine.dispose_surface(surface);
    }
}
