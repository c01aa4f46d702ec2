//! Common types and utilities for movietex.
//!
//! This crate defines the value types shared between the playback library
//! (`movietex`) and the control CLI (`movietexctl`): four-character codes,
//! movie-construction properties, geometry, the texture consumption contract
//! and the error type surfaced at the library boundary.
//!
//! # Property protocol
//!
//! Movies are constructed from an ordered list of `(class, id, value)`
//! triples. Both tags are four-character codes packed big-endian into a
//! `u32` on the wire.
//!
//! # Examples
//!
//! ```
//! use common::{tags, FourCc, MovieProperty, PropertyValue};
//!
//! let prop = MovieProperty::new(
//!     tags::DATA_LOCATION,
//!     tags::NATIVE_PATH,
//!     PropertyValue::Text("/tmp/clip.mov".to_string()),
//! );
//! assert_eq!(prop.class.as_u32(), 0x646c_6f63);
//! assert_eq!("dloc".parse::<FourCc>().unwrap(), prop.class);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use thiserror::Error;

/// Errors surfaced at the library boundary.
///
/// Releasing an already released resource is not an error: every destroy
/// path absorbs it as a no-op.
#[derive(Error, Debug)]
pub enum MovieError {
    #[error(
        "failed to create movie from properties (engine status {status}): {}",
        format_diagnostics(properties)
    )]
    Construction {
        status: i32,
        properties: Vec<PropertyDiagnostic>,
    },

    #[error("no suitable display context could be found")]
    UnsupportedContext,

    #[error("not implemented by this backend: {0}")]
    NotImplemented(&'static str),

    #[error("invalid four-character code: {0:?}")]
    InvalidFourCc(String),

    #[error("decode engine error: {0}")]
    Engine(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

fn format_diagnostics(properties: &[PropertyDiagnostic]) -> String {
    properties
        .iter()
        .map(|p| format!("{}/{}={}", p.class, p.id, p.status))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A four-character code packed big-endian into a `u32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FourCc(u32);

impl FourCc {
    pub const fn from_bytes(tag: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(tag))
    }

    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl FromStr for FourCc {
    type Err = MovieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !s.is_ascii() {
            return Err(MovieError::InvalidFourCc(s.to_string()));
        }
        Ok(Self::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc('{}')", self)
    }
}

impl From<FourCc> for String {
    fn from(tag: FourCc) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for FourCc {
    type Error = MovieError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Well-known tags of the movie property protocol.
pub mod tags {
    use super::FourCc;

    pub const DATA_LOCATION: FourCc = FourCc::from_bytes(*b"dloc");
    pub const NATIVE_PATH: FourCc = FourCc::from_bytes(*b"cfnp");
    pub const URL: FourCc = FourCc::from_bytes(*b"cfur");

    pub const NEW_MOVIE: FourCc = FourCc::from_bytes(*b"mprp");
    pub const ACTIVE: FourCc = FourCc::from_bytes(*b"actv");
    pub const DONT_INTERACT: FourCc = FourCc::from_bytes(*b"intn");

    pub const INSTANTIATION: FourCc = FourCc::from_bytes(*b"mins");
    pub const DONT_ASK_UNRESOLVED: FourCc = FourCc::from_bytes(*b"aurn");
    pub const ASYNC_OK: FourCc = FourCc::from_bytes(*b"asok");

    pub const CONTEXT: FourCc = FourCc::from_bytes(*b"ctxt");
    pub const VISUAL: FourCc = FourCc::from_bytes(*b"visu");

    pub const VIDEO: FourCc = FourCc::from_bytes(*b"vide");
    pub const SOUND: FourCc = FourCc::from_bytes(*b"soun");
    pub const TEXT: FourCc = FourCc::from_bytes(*b"text");

    pub const ENGINE_VERSION: FourCc = FourCc::from_bytes(*b"qtim");
    pub const PIXEL_FORMAT_RGBA: FourCc = FourCc::from_bytes(*b"RGBA");
}

/// Opaque, non-null native handle.
///
/// Nullable handles are spelled `Option<NativeHandle>`; the raw value is only
/// reachable through [`NativeHandle::as_raw`] at native call boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonZeroUsize);

impl NativeHandle {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

/// Value of a movie-construction property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Native one-byte Boolean
    Bool(bool),
    U32(u32),
    I32(i32),
    /// String handle (file system paths)
    Text(String),
    /// URL handle
    Url(String),
    /// Native object handle (e.g. a visual context)
    Handle(NativeHandle),
}

impl PropertyValue {
    /// Size in bytes advertised for this value in the wire record.
    pub fn native_size(&self) -> u32 {
        let size = match self {
            Self::Bool(_) => std::mem::size_of::<u8>(),
            Self::U32(_) => std::mem::size_of::<u32>(),
            Self::I32(_) => std::mem::size_of::<i32>(),
            Self::Text(_) | Self::Url(_) | Self::Handle(_) => std::mem::size_of::<usize>(),
        };
        size as u32
    }
}

/// A single `(class, id, value)` movie-construction triple.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieProperty {
    pub class: FourCc,
    pub id: FourCc,
    pub value: PropertyValue,
}

impl MovieProperty {
    pub fn new(class: FourCc, id: FourCc, value: PropertyValue) -> Self {
        Self { class, id, value }
    }

    pub fn flag(class: FourCc, id: FourCc, value: bool) -> Self {
        Self::new(class, id, PropertyValue::Bool(value))
    }
}

/// Status reported by the decode engine for one property record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiagnostic {
    pub class: FourCc,
    pub id: FourCc,
    pub status: i32,
}

/// Movie bounding box as reported by the decode engine.
///
/// Zero width and height signals audio-only media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieBox {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl MovieBox {
    pub fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right as i32 - self.left as i32
    }

    pub fn height(&self) -> i32 {
        self.bottom as i32 - self.top as i32
    }

    /// True when both extents are positive
    pub fn has_area(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn is_normalized(&self) -> bool {
        self.left == 0 && self.top == 0
    }

    /// Same extent with the origin moved to (0, 0)
    pub fn normalized(&self) -> Self {
        Self {
            left: 0,
            top: 0,
            right: self.right.saturating_sub(self.left),
            bottom: self.bottom.saturating_sub(self.top),
        }
    }
}

/// Convert a floating volume to 8.8 fixed point.
///
/// The sign survives the conversion: negative volume means "muted, but
/// remember the level".
pub fn encode_volume(volume: f32) -> i16 {
    let fixed = (volume * 256.0).round() as i32 & 0xFFFF;
    fixed as u16 as i16
}

/// Convert an 8.8 fixed point volume back to floating point.
pub fn decode_volume(raw: i16) -> f32 {
    raw as f32 / 256.0
}

/// GPU texture target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureTarget {
    /// Classic 2D target; power-of-two allocation on older drivers
    Texture2D,
    /// Rectangle target; accepts any size
    Rectangle,
}

impl TextureTarget {
    pub fn requires_power_of_two(&self) -> bool {
        matches!(self, Self::Texture2D)
    }

    /// OpenGL enum value of the target
    pub fn gl_enum(&self) -> u32 {
        match self {
            Self::Texture2D => 0x0DE1,
            Self::Rectangle => 0x84F5,
        }
    }

    pub fn from_gl_enum(value: u32) -> Option<Self> {
        match value {
            0x0DE1 => Some(Self::Texture2D),
            0x84F5 => Some(Self::Rectangle),
            _ => None,
        }
    }
}

/// Four `(u, v)` pairs locating the valid image inside an allocated texture.
///
/// Callers must sample with this quad and never assume `(0,0)..(1,1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TexCoords(pub [[f32; 2]; 4]);

impl TexCoords {
    /// Quad `(0,v) (u,v) (u,0) (0,0)` for a valid region of `u` by `v`.
    pub fn from_extent(u: f32, v: f32) -> Self {
        Self([[0.0, v], [u, v], [u, 0.0], [0.0, 0.0]])
    }

    pub fn full() -> Self {
        Self::from_extent(1.0, 1.0)
    }

    /// Extreme corner of the quad
    pub fn extent(&self) -> (f32, f32) {
        self.0
            .iter()
            .fold((0.0f32, 0.0f32), |(u, v), c| (u.max(c[0]), v.max(c[1])))
    }
}

impl Default for TexCoords {
    fn default() -> Self {
        Self([[0.0; 2]; 4])
    }
}

/// Texture consumption contract exposed to the rendering pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureDescriptor {
    pub texture_id: u32,
    pub target: TextureTarget,
    pub size: (u32, u32),
    pub tex_coords: TexCoords,
}

/// Load progress of a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadState {
    Error,
    Loading,
    Loaded,
    Playable,
    PlaythroughOk,
    Complete,
}

impl LoadState {
    pub fn raw(&self) -> i64 {
        match self {
            Self::Error => -1,
            Self::Loading => 1000,
            Self::Loaded => 2000,
            Self::Playable => 10000,
            Self::PlaythroughOk => 20000,
            Self::Complete => 100000,
        }
    }

    pub fn from_raw(raw: i64) -> Self {
        match raw {
            i64::MIN..=-1 => Self::Error,
            0..=1999 => Self::Loading,
            2000..=9999 => Self::Loaded,
            10000..=19999 => Self::Playable,
            20000..=99999 => Self::PlaythroughOk,
            _ => Self::Complete,
        }
    }
}

/// One track of a loaded movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: u32,
    pub media_type: Option<FourCc>,
}

/// Summary of a loaded movie, printed by `movietexctl info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieInfo {
    pub source: String,
    pub display_context: String,
    pub movie_box: MovieBox,
    pub has_visuals: bool,
    pub duration: i64,
    pub time_scale: i32,
    pub load_state: LoadState,
    pub volume: f32,
    pub tracks: Vec<TrackInfo>,
    pub texture: Option<TextureDescriptor>,
}

impl MovieInfo {
    /// Duration in seconds, if the time scale is known
    pub fn duration_secs(&self) -> Option<f64> {
        (self.time_scale > 0).then(|| self.duration as f64 / self.time_scale as f64)
    }
}
