//! GStreamer movie backend
//!
//! - `pipeline`: playbin and app sink setup
//! - `frames`: frame hand-off from the streaming thread into render surfaces
//! - `engine`: [`GstEngine`], the `MovieEngine` implementation
//!
//! # Architecture
//!
//! 1. `playbin` demuxes and decodes whatever the URI points at
//! 2. `videoconvert` turns decoded frames into RGBA
//! 3. The `AppSink` callback copies each frame into the movie's surface
//! 4. The surface display context uploads that surface into its texture

mod engine;
mod frames;
mod pipeline;

pub use engine::GstEngine;
pub use frames::FrameSink;
