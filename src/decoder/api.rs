use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use thiserror::Error;

use super::header::read_uncompressed_header;
use super::limits::Limits;
use super::vp8::{Frame, Vp8Decoder};
use crate::slice_reader::SliceReader;

/// Errors that can occur when decoding a VP8 key frame.
///
/// No variant ever comes with a partially decoded image.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The `[0x9D, 0x01, 0x2A]` start code was not found after the frame tag.
    #[error("Invalid VP8 magic: {0:x?}")]
    Vp8MagicInvalid([u8; 3]),

    /// The frame tag describes an inter frame.
    #[error("VP8 inter frames are not supported")]
    InterFrameUnsupported,

    /// The frame tag carries a version above 3.
    #[error("Unsupported VP8 version: {0}")]
    UnsupportedVersion(u8),

    /// The first partition is larger than the data that follows the header.
    #[error("VP8 first partition of {size} bytes exceeds the {available} bytes available")]
    FirstPartitionTooLarge {
        /// Declared size of the first partition.
        size: usize,
        /// Bytes left after the uncompressed header.
        available: usize,
    },

    /// A dimension is 0 or larger than 16384.
    #[error("Invalid VP8 dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width from the frame header.
        width: u16,
        /// Height from the frame header.
        height: u16,
    },

    /// The data ends inside the uncompressed header or the partition table.
    #[error("Truncated VP8 data")]
    TruncatedInput,

    /// Invalid function call or parameter, including exceeded limits.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The image size does not fit in memory arithmetic.
    #[error("Image too large")]
    ImageTooLarge,
}

/// Methods for upsampling the half-resolution chroma planes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpsamplingMethod {
    /// Each chroma sample covers its 2x2 block of pixels.
    ///
    /// Matches the -nofancy option in dwebp.
    #[default]
    Simple,
    /// Bilinear interpolation between the four nearest chroma samples,
    /// weighted 9:3:3:1 by distance and rounded once. libwebp-style fancy
    /// upsampling, which can differ from libwebp by 1.
    Bilinear,
}

/// Which deblocking filter runs after reconstruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopFilterMode {
    /// The full filter the frame header asks for, on macroblock and
    /// sub-block edges.
    #[default]
    Standard,
    /// Only macroblock edges, with a single 3:1 blend of the two samples
    /// next to the edge. Cheaper, not bit-exact with other decoders.
    MacroblockEdges,
    /// No filtering.
    Disabled,
}

/// Decoder configuration. Reusable across requests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeConfig {
    /// Chroma upsampling for RGB output. Default: `Simple`.
    pub upsampling: UpsamplingMethod,
    /// Loop filter. Default: `Standard`.
    pub loop_filter: LoopFilterMode,
    /// Limits checked before any pixel buffer is allocated.
    pub limits: Limits,
}

impl DecodeConfig {
    /// Set the upsampling method.
    #[must_use]
    pub fn upsampling(mut self, method: UpsamplingMethod) -> Self {
        self.upsampling = method;
        self
    }

    /// Set the loop filter mode.
    #[must_use]
    pub fn loop_filter(mut self, mode: LoopFilterMode) -> Self {
        self.loop_filter = mode;
        self
    }

    /// Set the decode limits.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Decoding request that borrows configuration and input data.
///
/// # Example
///
/// ```rust,no_run
/// use zenvp8::{DecodeConfig, DecodeRequest, UpsamplingMethod};
///
/// let config = DecodeConfig::default().upsampling(UpsamplingMethod::Bilinear);
/// let vp8_data: &[u8] = &[]; // a VP8 key frame
/// let (pixels, w, h) = DecodeRequest::new(&config, vp8_data).decode_rgba()?;
/// # Ok::<(), zenvp8::DecodeError>(())
/// ```
pub struct DecodeRequest<'a> {
    config: &'a DecodeConfig,
    data: &'a [u8],
    stride_pixels: Option<u32>,
}

impl<'a> DecodeRequest<'a> {
    /// Create a new decoding request.
    #[must_use]
    pub fn new(config: &'a DecodeConfig, data: &'a [u8]) -> Self {
        Self {
            config,
            data,
            stride_pixels: None,
        }
    }

    /// Set row stride in pixels for `_into` methods. Must be >= image width.
    #[must_use]
    pub fn stride(mut self, stride_pixels: u32) -> Self {
        self.stride_pixels = Some(stride_pixels);
        self
    }

    /// Decode to RGBA pixels.
    pub fn decode_rgba(self) -> Result<(Vec<u8>, u32, u32), DecodeError> {
        decode_to_vec::<4>(self.data, self.config)
    }

    /// Decode to RGB pixels.
    pub fn decode_rgb(self) -> Result<(Vec<u8>, u32, u32), DecodeError> {
        decode_to_vec::<3>(self.data, self.config)
    }

    /// Decode to RGBA, writing into a pre-allocated buffer.
    ///
    /// If [`stride`](Self::stride) is set, rows are written with that pixel stride.
    /// Otherwise rows are packed (stride == width).
    pub fn decode_rgba_into(self, output: &mut [u8]) -> Result<(u32, u32), DecodeError> {
        decode_to_slice::<4>(self.data, self.config, output, self.stride_pixels)
    }

    /// Decode to RGB, writing into a pre-allocated buffer.
    ///
    /// Strides work as in [`decode_rgba_into`](Self::decode_rgba_into).
    pub fn decode_rgb_into(self, output: &mut [u8]) -> Result<(u32, u32), DecodeError> {
        decode_to_slice::<3>(self.data, self.config, output, self.stride_pixels)
    }

    /// Read image info without decoding pixel data.
    pub fn info(self) -> Result<ImageInfo, DecodeError> {
        ImageInfo::from_vp8(self.data)
    }

    /// Decode to YUV 4:2:0 planes.
    pub fn decode_yuv420(self) -> Result<YuvPlanes, DecodeError> {
        let frame = Vp8Decoder::decode_frame_with_config(self.data, self.config)?;
        Ok(YuvPlanes::from(frame))
    }
}

fn decode_to_vec<const BPP: usize>(
    data: &[u8],
    config: &DecodeConfig,
) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    let frame = Vp8Decoder::decode_frame_with_config(data, config)?;
    let row_stride = usize::from(frame.width) * BPP;
    let size = row_stride
        .checked_mul(usize::from(frame.height))
        .ok_or(DecodeError::ImageTooLarge)?;

    let mut buf = vec![0u8; size];
    frame.fill::<BPP>(&mut buf, row_stride, config.upsampling);
    Ok((buf, u32::from(frame.width), u32::from(frame.height)))
}

/// Checks the output buffer against the frame header, then decodes. The
/// buffer is untouched when decoding fails.
fn decode_to_slice<const BPP: usize>(
    data: &[u8],
    config: &DecodeConfig,
    output: &mut [u8],
    stride_pixels: Option<u32>,
) -> Result<(u32, u32), DecodeError> {
    let info = ImageInfo::from_vp8(data)?;
    let (width, height) = (info.width, info.height);
    let stride_pixels = stride_pixels.unwrap_or(width);

    if stride_pixels < width {
        return Err(DecodeError::InvalidParameter(alloc::format!(
            "stride_pixels {} < width {}",
            stride_pixels,
            width
        )));
    }

    let row_stride = (stride_pixels as usize)
        .checked_mul(BPP)
        .ok_or(DecodeError::ImageTooLarge)?;
    let required = row_stride
        .checked_mul(height as usize)
        .ok_or(DecodeError::ImageTooLarge)?;
    if output.len() < required {
        return Err(DecodeError::InvalidParameter(alloc::format!(
            "output buffer too small: got {}, need {}",
            output.len(),
            required
        )));
    }

    let frame = Vp8Decoder::decode_frame_with_config(data, config)?;
    frame.fill::<BPP>(output, row_stride, config.upsampling);
    Ok((width, height))
}

/// Decode a VP8 key frame to RGBA pixels.
///
/// Returns the pixels, four bytes each in row-major order, and the
/// dimensions.
///
/// # Example
///
/// ```rust,no_run
/// let vp8_data: &[u8] = &[]; // a VP8 key frame
/// let (pixels, width, height) = zenvp8::decode_rgba(vp8_data)?;
/// # Ok::<(), zenvp8::DecodeError>(())
/// ```
///
/// Uses the default [`Limits`], which accept every frame with a valid header.
pub fn decode_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    decode_to_vec::<4>(data, &DecodeConfig::default())
}

/// Decode a VP8 key frame to RGB pixels.
pub fn decode_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    decode_to_vec::<3>(data, &DecodeConfig::default())
}

/// Decode a VP8 key frame directly into a pre-allocated RGBA buffer.
///
/// # Arguments
/// * `data` - VP8 key frame data
/// * `output` - Pre-allocated output buffer (must be at least `stride_pixels * height * 4` bytes)
/// * `stride_pixels` - Row stride in pixels (must be >= width)
///
/// # Returns
/// Width and height of the decoded image.
pub fn decode_rgba_into(
    data: &[u8],
    output: &mut [u8],
    stride_pixels: u32,
) -> Result<(u32, u32), DecodeError> {
    decode_to_slice::<4>(data, &DecodeConfig::default(), output, Some(stride_pixels))
}

/// Decode a VP8 key frame directly into a pre-allocated RGB buffer.
///
/// Same as [`decode_rgba_into`] with three bytes per pixel.
pub fn decode_rgb_into(
    data: &[u8],
    output: &mut [u8],
    stride_pixels: u32,
) -> Result<(u32, u32), DecodeError> {
    decode_to_slice::<3>(data, &DecodeConfig::default(), output, Some(stride_pixels))
}

/// Decode a VP8 key frame to its native YUV 4:2:0 planes.
pub fn decode_yuv420(data: &[u8]) -> Result<YuvPlanes, DecodeError> {
    let frame = Vp8Decoder::decode_frame(data)?;
    Ok(YuvPlanes::from(frame))
}

/// What the first ten bytes of a key frame say about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Requested horizontal upscaling, 0 to 3. Not applied by the decoder.
    pub horizontal_scale: u8,
    /// Requested vertical upscaling, 0 to 3. Not applied by the decoder.
    pub vertical_scale: u8,
    /// Bitstream version.
    pub version: u8,
    /// Whether the frame is meant to be displayed.
    pub show_frame: bool,
    /// Size of the first partition in bytes.
    pub first_partition_size: u32,
}

impl ImageInfo {
    /// Parse image information from VP8 key frame data.
    pub fn from_vp8(data: &[u8]) -> Result<Self, DecodeError> {
        let header = read_uncompressed_header(&mut SliceReader::new(data))?;
        Ok(Self {
            width: u32::from(header.width),
            height: u32::from(header.height),
            horizontal_scale: header.horizontal_scale,
            vertical_scale: header.vertical_scale,
            version: header.tag.version,
            show_frame: header.tag.show_frame,
            first_partition_size: header.tag.first_partition_size,
        })
    }
}

/// Decoded YUV 4:2:0 planar image data.
///
/// Contains separate Y, U, and V planes at their native resolutions.
/// Y is full resolution, U and V are half resolution in each dimension.
#[derive(Debug, Clone)]
pub struct YuvPlanes {
    /// Luma plane (full resolution).
    pub y: Vec<u8>,
    /// Chroma blue plane (half resolution in each dimension).
    pub u: Vec<u8>,
    /// Chroma red plane (half resolution in each dimension).
    pub v: Vec<u8>,
    /// Width of the luma plane in pixels.
    pub y_width: u32,
    /// Height of the luma plane in pixels.
    pub y_height: u32,
    /// Width of each chroma plane in pixels.
    pub uv_width: u32,
    /// Height of each chroma plane in pixels.
    pub uv_height: u32,
}

impl From<Frame> for YuvPlanes {
    fn from(frame: Frame) -> Self {
        Self {
            y_width: u32::from(frame.width),
            y_height: u32::from(frame.height),
            uv_width: u32::from(frame.chroma_width()),
            uv_height: u32::from(frame.chroma_height()),
            y: frame.ybuf,
            u: frame.ubuf,
            v: frame.vbuf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2x2 and 3x3 solid red images encoded by libwebp, without their RIFF wrapper.
    const RED_2X2: [u8; 48] = [
        0xd0, 0x01, 0x00, 0x9d, 0x01, 0x2a, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x34, 0x25, 0xa0,
        0x02, 0x74, 0xba, 0x01, 0xf8, 0x00, 0x03, 0xb0, 0x00, 0xfe, 0xf0, 0xc4, 0x0b, 0xff, 0x20,
        0xb9, 0x61, 0x75, 0xc8, 0xd7, 0xff, 0x20, 0x3f, 0xe4, 0x07, 0xfc, 0x80, 0xff, 0xf8, 0xf2,
        0x00, 0x00, 0x00,
    ];

    fn red_3x3() -> [u8; 48] {
        let mut data = RED_2X2;
        data[6] = 3;
        data[8] = 3;
        data
    }

    fn assert_uniform_red(pixels: &[u8], bpp: usize) {
        let first = &pixels[..bpp];
        assert!(pixels.chunks_exact(bpp).all(|px| px == first), "{pixels:?}");
        assert!(first[0] > 200 && first[1] < 64 && first[2] < 64, "{first:?}");
    }

    #[test]
    fn decode_2x2_single_color_image() {
        let (rgb, w, h) = decode_rgb(&RED_2X2).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(rgb.len(), 2 * 2 * 3);
        assert_uniform_red(&rgb, 3);
    }

    #[test]
    fn decode_3x3_single_color_image() {
        // the odd tail row and column come from a half-used chroma sample
        let data = red_3x3();
        for upsampling in [UpsamplingMethod::Simple, UpsamplingMethod::Bilinear] {
            let config = DecodeConfig::default().upsampling(upsampling);
            let (rgba, w, h) = DecodeRequest::new(&config, &data).decode_rgba().unwrap();
            assert_eq!((w, h), (3, 3));
            assert_uniform_red(&rgba, 4);
            assert!(rgba.chunks_exact(4).all(|px| px[3] == 255));
        }
    }

    #[test]
    fn info_reads_uncompressed_header() {
        let info = ImageInfo::from_vp8(&RED_2X2).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                width: 2,
                height: 2,
                horizontal_scale: 0,
                vertical_scale: 0,
                version: 0,
                show_frame: true,
                first_partition_size: 14,
            }
        );
    }

    #[test]
    fn into_rejects_narrow_stride_and_small_buffer() {
        let mut out = vec![0u8; 64];
        assert!(matches!(
            decode_rgba_into(&RED_2X2, &mut out, 1),
            Err(DecodeError::InvalidParameter(_))
        ));
        let mut small = vec![0u8; 2 * 2 * 4 - 1];
        assert!(matches!(
            decode_rgba_into(&RED_2X2, &mut small, 2),
            Err(DecodeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn into_respects_stride() {
        let mut out = vec![0u8; 5 * 2 * 3];
        let (w, h) = decode_rgb_into(&RED_2X2, &mut out, 5).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_uniform_red(&out[..6], 3);
        assert_uniform_red(&out[15..21], 3);
        assert!(out[6..15].iter().all(|&b| b == 0));
    }

    #[test]
    fn into_leaves_buffer_alone_on_error() {
        let mut data = RED_2X2;
        data[3] = 0;
        let mut out = vec![7u8; 64];
        assert!(decode_rgba_into(&data, &mut out, 2).is_err());
        assert!(out.iter().all(|&b| b == 7));
    }

    #[test]
    fn yuv_planes_have_chroma_dimensions() {
        let planes = decode_yuv420(&red_3x3()).unwrap();
        assert_eq!((planes.y_width, planes.y_height), (3, 3));
        assert_eq!((planes.uv_width, planes.uv_height), (2, 2));
        assert_eq!(planes.y.len(), 9);
        assert_eq!(planes.u.len(), 4);
        assert_eq!(planes.v.len(), 4);
    }

    #[test]
    fn limits_are_checked() {
        let config = DecodeConfig::default().limits(Limits::default().max_dimensions(1, 1));
        assert!(matches!(
            DecodeRequest::new(&config, &RED_2X2).decode_rgba(),
            Err(DecodeError::InvalidParameter(_))
        ));
    }
}
