//! Native movie lifetime

use crate::Result;
use crate::context::DisplayContext;
use crate::engine::MovieEngine;
use crate::property::PropertyArray;
use common::{MovieBox, MovieError, MovieProperty, NativeHandle, TrackInfo, tags};
use std::cell::Cell;
use std::rc::Rc;

/// One native movie plus the display context it renders into.
pub struct MovieHandle {
    engine: Rc<dyn MovieEngine>,
    handle: Option<NativeHandle>,
    context: Option<DisplayContext>,
    bounds: Cell<MovieBox>,
}

impl MovieHandle {
    pub fn new(engine: Rc<dyn MovieEngine>, context: DisplayContext) -> Self {
        Self {
            engine,
            handle: None,
            context: Some(context),
            bounds: Cell::new(MovieBox::default()),
        }
    }

    /// Construction properties every movie gets after the caller's own
    pub fn default_properties() -> [MovieProperty; 4] {
        [
            MovieProperty::flag(tags::NEW_MOVIE, tags::ACTIVE, true),
            MovieProperty::flag(tags::NEW_MOVIE, tags::DONT_INTERACT, true),
            MovieProperty::flag(tags::INSTANTIATION, tags::DONT_ASK_UNRESOLVED, true),
            MovieProperty::flag(tags::INSTANTIATION, tags::ASYNC_OK, true),
        ]
    }

    pub fn engine(&self) -> &dyn MovieEngine {
        self.engine.as_ref()
    }

    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    pub fn context(&self) -> Option<&DisplayContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut DisplayContext> {
        self.context.as_mut()
    }

    /// Replace the current movie with one built from `extra` properties.
    ///
    /// The list handed to the engine is `extra`, then the defaults, then the
    /// display context's own properties.
    pub fn load_from_properties(&mut self, extra: &[MovieProperty]) -> Result<()> {
        self.destroy_movie();

        let context = self.context.as_mut().ok_or(MovieError::UnsupportedContext)?;
        context.reset();

        let defaults = Self::default_properties();
        let context_properties = context.movie_properties();
        let mut properties = PropertyArray::build(&[extra, &defaults, &context_properties]);

        let movie = match self.engine.new_movie_from_properties(&mut properties) {
            Ok(movie) => movie,
            Err(status) => {
                log::error!("Failed to create movie (status {})", status);
                properties.log_dump(log::Level::Error);
                return Err(MovieError::Construction {
                    status,
                    properties: properties.diagnostics(),
                });
            }
        };
        self.handle = Some(movie);
        properties.log_dump(log::Level::Debug);
        log_tracks(self.engine.as_ref(), movie);

        context.update_for_movie(movie)?;
        self.bounds.set(self.engine.movie_box(movie));
        Ok(())
    }

    /// Stop and dispose the native movie; safe to call repeatedly
    pub fn destroy_movie(&mut self) {
        if let Some(movie) = self.handle.take() {
            self.engine.stop(movie);
            self.engine.dispose_movie(movie);
            self.bounds.set(MovieBox::default());
            log::debug!("Disposed movie {:#x}", movie.as_raw());
        }
    }

    /// Movie, then display context
    pub fn destroy(&mut self) {
        self.destroy_movie();
        if let Some(mut context) = self.context.take() {
            context.destroy();
        }
    }

    /// Bounding box, refreshed from the engine while a movie is loaded
    pub fn movie_box(&self) -> MovieBox {
        if let Some(movie) = self.handle {
            self.bounds.set(self.engine.movie_box(movie));
        }
        self.bounds.get()
    }

    /// Bounding box as of the last query
    pub fn cached_box(&self) -> MovieBox {
        self.bounds.get()
    }

    /// True when the movie has a positive visual area
    pub fn has_visuals(&self) -> bool {
        self.movie_box().has_area()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        let Some(movie) = self.handle else {
            return Vec::new();
        };
        (0..self.engine.track_count(movie))
            .map(|index| TrackInfo {
                index,
                media_type: self.engine.track_media_type(movie, index),
            })
            .collect()
    }
}

fn log_tracks(engine: &dyn MovieEngine, movie: NativeHandle) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let count = engine.track_count(movie);
    log::debug!("Movie {:#x} has {} tracks", movie.as_raw(), count);
    for index in 0..count {
        match engine.track_media_type(movie, index) {
            Some(media) => log::debug!("    track {}: {}", index, media),
            None => log::debug!("    track {}: unknown media", index),
        }
    }
}

impl Drop for MovieHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
