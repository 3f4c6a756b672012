//! Typed pixel output.
//!
//! With the `pixel-types` feature, decoding can produce pixel types from the
//! [`rgb`] crate instead of raw bytes:
//!
//! ```rust,no_run
//! use rgb::Rgba;
//!
//! let vp8_data: &[u8] = &[]; // a VP8 key frame
//! let (pixels, w, h): (Vec<Rgba<u8>>, u32, u32) = zenvp8::pixel::decode(vp8_data)?;
//! # Ok::<(), zenvp8::DecodeError>(())
//! ```

use alloc::vec::Vec;

use rgb::{AsPixels, ComponentBytes, Rgb, Rgba};

use crate::decoder::DecodeError;

mod private {
    pub trait Sealed {}
}

/// Pixel type a VP8 frame can be decoded to.
pub trait DecodePixel: Copy + 'static + private::Sealed {
    /// Number of bytes per pixel: 3 for RGB, 4 for RGBA.
    const CHANNELS: usize;
}

impl private::Sealed for Rgb<u8> {}
impl private::Sealed for Rgba<u8> {}

impl DecodePixel for Rgb<u8> {
    const CHANNELS: usize = 3;
}

impl DecodePixel for Rgba<u8> {
    const CHANNELS: usize = 4;
}

fn decode_bytes<P: DecodePixel>(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    if P::CHANNELS == 4 {
        crate::decode_rgba(data)
    } else {
        crate::decode_rgb(data)
    }
}

/// Decode a VP8 key frame into a vector of typed pixels.
///
/// [`Rgb<u8>`] gives RGB, [`Rgba<u8>`] RGBA with opaque alpha.
///
/// Returns `(pixels, width, height)`.
pub fn decode<P: DecodePixel>(data: &[u8]) -> Result<(Vec<P>, u32, u32), DecodeError>
where
    [u8]: AsPixels<P>,
{
    let (bytes, w, h) = decode_bytes::<P>(data)?;
    let pixels: &[P] = bytes.as_pixels();
    Ok((pixels.to_vec(), w, h))
}

/// Decode a VP8 key frame into a pre-allocated pixel buffer whose rows are
/// `stride_pixels` apart.
///
/// Returns `(width, height)`.
pub fn decode_into<P: DecodePixel>(
    data: &[u8],
    output: &mut [P],
    stride_pixels: u32,
) -> Result<(u32, u32), DecodeError>
where
    [P]: ComponentBytes<u8>,
{
    let buf: &mut [u8] = output.as_bytes_mut();
    if P::CHANNELS == 4 {
        crate::decode_rgba_into(data, buf, stride_pixels)
    } else {
        crate::decode_rgb_into(data, buf, stride_pixels)
    }
}

/// Decode a VP8 key frame to an [`imgref::ImgVec`].
///
/// # Example
///
/// ```rust,no_run
/// use rgb::Rgba;
///
/// let vp8_data: &[u8] = &[]; // a VP8 key frame
/// let img: imgref::ImgVec<Rgba<u8>> = zenvp8::pixel::decode_to_img(vp8_data)?;
/// println!("{}x{}", img.width(), img.height());
/// # Ok::<(), zenvp8::DecodeError>(())
/// ```
#[cfg(feature = "imgref")]
pub fn decode_to_img<P: DecodePixel>(data: &[u8]) -> Result<imgref::ImgVec<P>, DecodeError>
where
    [u8]: AsPixels<P>,
{
    let (pixels, w, h) = decode::<P>(data)?;
    Ok(imgref::ImgVec::new(pixels, w as usize, h as usize))
}
