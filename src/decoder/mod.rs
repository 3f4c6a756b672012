//! VP8 key frame decoder

mod api;
mod bit_reader;
#[cfg(test)]
pub(crate) mod bool_writer;
mod coefficients;
pub mod header;
mod limits;
mod loop_filter;
mod quant;
pub mod vp8;
mod yuv;

// Re-export public API
pub use api::{
    decode_rgb, decode_rgb_into, decode_rgba, decode_rgba_into, decode_yuv420, DecodeConfig,
    DecodeError, DecodeRequest, ImageInfo, LoopFilterMode, UpsamplingMethod, YuvPlanes,
};
pub use limits::Limits;
