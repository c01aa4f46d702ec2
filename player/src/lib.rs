//! Movie frames presented as GPU textures.
//!
//! A [`Movie`] owns one native movie from a [`MovieEngine`] and the
//! [`DisplayContext`] the movie renders into. Pump it once per render tick
//! with [`Movie::process`] and draw its [`Texture`] using the texture's own
//! coordinates: textures may be padded to power-of-two sizes, so the valid
//! image rarely spans `(0,0)..(1,1)`.
//!
//! Backends:
//! - `video` feature: [`video::GstEngine`], GStreamer playbins
//! - `gpu` feature: [`gpu::WgpuGl`], wgpu textures

mod macros;

pub mod config;
pub mod context;
pub mod engine;
pub mod gl;
pub mod movie;
pub mod player;
pub mod property;
pub mod stats;
pub mod subsystem;
pub mod texture;

#[cfg(feature = "gpu")]
pub mod gpu;
#[cfg(feature = "video")]
pub mod video;

#[cfg(test)]
mod test_support;

pub use common::{
    FourCc, LoadState, MovieBox, MovieError, MovieInfo, MovieProperty, NativeHandle, PropertyValue,
    TexCoords, TextureDescriptor, TextureTarget, TrackInfo, tags,
};
pub use config::Config;
pub use context::{ContextKind, DisplayContext};
pub use engine::{MovieEngine, PixelBuffer};
pub use gl::{GlApi, GlContext, TextureFilter, TextureId};
pub use movie::MovieHandle;
pub use player::Movie;
pub use subsystem::MediaSubsystem;
pub use texture::Texture;

pub type Result<T> = std::result::Result<T, MovieError>;
