//! Decoding of VP8 key frames, the lossy payload of WebP images.
//!
//! The input is one VP8 frame as found in the `VP8 ` chunk of a WebP file,
//! starting with its 3-byte frame tag. Locating that chunk inside the RIFF
//! container is up to the caller. Inter frames are rejected.
//!
//! # Features
//!
//! - `std` (default): `std::error::Error` for [`DecodeError`].
//! - `pixel-types`: decode straight to [`rgb`] pixel types.
//! - `imgref`: decode to an `imgref::ImgVec`.
//!
//! # no_std Support
//!
//! The decoder only needs `alloc`:
//! ```toml
//! [dependencies]
//! zenvp8 = { version = "...", default-features = false }
//! ```
//!
//! # Decoding
//!
//! Use the convenience functions:
//!
//! ```rust,no_run
//! let vp8_data: &[u8] = &[]; // a VP8 key frame
//! let (pixels, width, height) = zenvp8::decode_rgba(vp8_data)?;
//! # Ok::<(), zenvp8::DecodeError>(())
//! ```
//!
//! Or a [`DecodeConfig`] for control over chroma upsampling, the loop filter
//! and resource limits:
//!
//! ```rust,no_run
//! use zenvp8::{DecodeConfig, DecodeRequest, Limits, LoopFilterMode, UpsamplingMethod};
//!
//! let config = DecodeConfig::default()
//!     .upsampling(UpsamplingMethod::Bilinear)
//!     .loop_filter(LoopFilterMode::Standard)
//!     .limits(Limits::default().max_dimensions(4096, 4096));
//! let vp8_data: &[u8] = &[]; // a VP8 key frame
//! let (pixels, width, height) = DecodeRequest::new(&config, vp8_data).decode_rgb()?;
//! # Ok::<(), zenvp8::DecodeError>(())
//! ```
//!
//! [`vp8::Vp8Decoder`] returns the decoded planes and the parsed frame
//! header instead of pixels.
//!
//! # Logging
//!
//! Header fields and anomalies are reported through the [`log`] facade at
//! debug and warn level, per-row progress at trace level. No logger is
//! installed by this crate.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod common;
pub mod decoder;

// Byte cursor over the uncompressed part of a frame
mod slice_reader;

/// Type-safe pixel formats for decoding.
#[cfg(feature = "pixel-types")]
pub mod pixel;

pub use decoder::{
    decode_rgb, decode_rgb_into, decode_rgba, decode_rgba_into, decode_yuv420, DecodeConfig,
    DecodeError, DecodeRequest, ImageInfo, Limits, LoopFilterMode, UpsamplingMethod, YuvPlanes,
};

pub use decoder::vp8;
