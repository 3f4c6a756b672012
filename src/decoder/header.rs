//! Frame header parsing (RFC 6386, sections 9.1 to 9.11 and 19.2).
//!
//! The first ten bytes of a key frame are uncompressed: the frame tag, the
//! start code and the dimensions. Everything else in the header is read from
//! the first partition with the bool decoder, as one flat sequence of
//! "presence flag, then payload" steps that fills a plain [`FrameHeader`].

use alloc::boxed::Box;

use super::api::DecodeError;
use super::bit_reader::BoolReader;
use crate::common::types::*;
use crate::slice_reader::SliceReader;

/// Bytes that follow the frame tag of every key frame.
pub const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Largest width or height accepted.
pub const MAX_DIMENSION: u16 = 16384;

/// The 3-byte tag at the start of every VP8 frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTag {
    /// Whether this is a key (intra-only) frame.
    pub key_frame: bool,
    /// Bitstream version, 0 to 3.
    pub version: u8,
    /// Whether the frame is meant to be displayed.
    pub show_frame: bool,
    /// Size in bytes of the first partition (modes and header).
    pub first_partition_size: u32,
}

impl FrameTag {
    /// Splits the 24-bit little-endian tag into its fields.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            key_frame: bits & 1 == 0,
            version: ((bits >> 1) & 7) as u8,
            show_frame: (bits >> 4) & 1 != 0,
            first_partition_size: bits >> 5,
        }
    }
}

/// The uncompressed part of a key frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UncompressedHeader {
    pub tag: FrameTag,
    pub width: u16,
    pub height: u16,
    pub horizontal_scale: u8,
    pub vertical_scale: u8,
}

/// Reads and validates the frame tag, start code and dimensions, leaving
/// `r` at the first byte of the first partition.
pub(crate) fn read_uncompressed_header(
    r: &mut SliceReader<'_>,
) -> Result<UncompressedHeader, DecodeError> {
    let tag = FrameTag::from_bits(r.read_u24_le()?);

    if !tag.key_frame {
        return Err(DecodeError::InterFrameUnsupported);
    }
    if tag.version > 3 {
        return Err(DecodeError::UnsupportedVersion(tag.version));
    }

    let magic = r.read_array::<3>()?;
    if magic != START_CODE {
        return Err(DecodeError::Vp8MagicInvalid(magic));
    }

    let w = r.read_u16_le()?;
    let h = r.read_u16_le()?;
    let width = w & 0x3fff;
    let height = h & 0x3fff;

    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    let header = UncompressedHeader {
        tag,
        width,
        height,
        horizontal_scale: (w >> 14) as u8,
        vertical_scale: (h >> 14) as u8,
    };

    log::debug!(
        "vp8 key frame {}x{} version {} first partition {} bytes",
        width,
        height,
        tag.version,
        tag.first_partition_size
    );
    if !tag.show_frame {
        log::warn!("vp8 frame is marked as not for display, decoding anyway");
    }
    if header.horizontal_scale != 0 || header.vertical_scale != 0 {
        log::warn!(
            "ignoring vp8 upscaling request ({}, {})",
            header.horizontal_scale,
            header.vertical_scale
        );
    }

    Ok(header)
}

/// Which loop filter variant the frame asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterType {
    /// The normal filter, on luma and chroma.
    #[default]
    Normal,
    /// The simple filter, luma only.
    Simple,
}

/// Segmentation settings (section 9.3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Whether macroblocks are split into segments at all.
    pub enabled: bool,
    /// Whether per-macroblock segment ids are coded in this frame.
    pub update_map: bool,
    /// Whether the per-segment values below were sent in this frame.
    pub update_data: bool,
    /// Per-segment values replace the frame values instead of adjusting them.
    pub absolute_values: bool,
    /// Quantizer index (or delta) per segment.
    pub quantizer_level: [i8; MAX_SEGMENTS],
    /// Loop filter level (or delta) per segment.
    pub filter_level: [i8; MAX_SEGMENTS],
    /// Probabilities of the segment id tree.
    pub tree_probs: [Prob; 3],
}

/// Loop filter adjustments by reference frame and prediction mode (section 9.6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopFilterDeltas {
    /// Whether the deltas apply.
    pub enabled: bool,
    /// Deltas by reference frame. Key frames only use the intra entry, index 0.
    pub ref_deltas: [i8; 4],
    /// Deltas by mode. Key frames only use the B_PRED entry, index 0.
    pub mode_deltas: [i8; 4],
}

/// Quantizer indices (section 9.6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuantIndices {
    /// Base index, luma AC.
    pub y_ac: u8,
    /// Luma DC delta.
    pub y_dc_delta: i8,
    /// Second-order DC delta.
    pub y2_dc_delta: i8,
    /// Second-order AC delta.
    pub y2_ac_delta: i8,
    /// Chroma DC delta.
    pub uv_dc_delta: i8,
    /// Chroma AC delta.
    pub uv_ac_delta: i8,
}

/// Everything the first partition says about the frame before the
/// per-macroblock data starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Color space bit. Only 0 (YUV) is defined; the value is not acted on.
    pub color_space: u8,
    /// Clamping type bit. Reconstruction always clamps.
    pub clamping_type: u8,
    /// Segment settings.
    pub segmentation: Segmentation,
    /// Loop filter variant.
    pub filter_type: FilterType,
    /// Frame loop filter level, 0 to 63. 0 disables filtering.
    pub filter_level: u8,
    /// Sharpness, 0 to 7.
    pub sharpness: u8,
    /// Loop filter adjustments.
    pub filter_deltas: LoopFilterDeltas,
    /// Number of DCT token partitions: 1, 2, 4 or 8.
    pub num_partitions: u8,
    /// Quantizer indices.
    pub quant: QuantIndices,
    /// Refresh entropy probabilities bit. Irrelevant for a single frame.
    pub refresh_entropy_probs: bool,
    /// Token probabilities after this frame's updates.
    pub token_probs: Box<TokenProbTables>,
    /// Probability that a macroblock has coefficients, when skipping is enabled.
    pub prob_skip_false: Option<Prob>,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            color_space: 0,
            clamping_type: 0,
            segmentation: Segmentation {
                tree_probs: [255; 3],
                ..Segmentation::default()
            },
            filter_type: FilterType::Normal,
            filter_level: 0,
            sharpness: 0,
            filter_deltas: LoopFilterDeltas::default(),
            num_partitions: 1,
            quant: QuantIndices::default(),
            refresh_entropy_probs: false,
            token_probs: Box::new(COEFF_PROBS),
            prob_skip_false: None,
        }
    }
}

impl FrameHeader {
    /// Reads the header fields from the start of the first partition.
    ///
    /// The bool decoder cannot fail, so neither can this: a truncated first
    /// partition yields zeros for the missing fields.
    pub(crate) fn read(b: &mut BoolReader<'_>) -> Self {
        let mut header = Self {
            color_space: b.read_literal(1),
            clamping_type: b.read_literal(1),
            ..Self::default()
        };
        if header.color_space != 0 {
            log::debug!("reserved vp8 color space {} ignored", header.color_space);
        }

        header.segmentation.enabled = b.read_flag();
        if header.segmentation.enabled {
            read_segmentation(b, &mut header.segmentation);
        }

        header.filter_type = if b.read_flag() {
            FilterType::Simple
        } else {
            FilterType::Normal
        };
        header.filter_level = b.read_literal(6);
        header.sharpness = b.read_literal(3);

        header.filter_deltas.enabled = b.read_flag();
        if header.filter_deltas.enabled && b.read_flag() {
            for delta in header.filter_deltas.ref_deltas.iter_mut() {
                *delta = b.read_optional_signed_value(6) as i8;
            }
            for delta in header.filter_deltas.mode_deltas.iter_mut() {
                *delta = b.read_optional_signed_value(6) as i8;
            }
        }

        header.num_partitions = 1 << b.read_literal(2);

        header.quant = QuantIndices {
            y_ac: b.read_literal(7),
            y_dc_delta: b.read_optional_signed_value(4) as i8,
            y2_dc_delta: b.read_optional_signed_value(4) as i8,
            y2_ac_delta: b.read_optional_signed_value(4) as i8,
            uv_dc_delta: b.read_optional_signed_value(4) as i8,
            uv_ac_delta: b.read_optional_signed_value(4) as i8,
        };

        header.refresh_entropy_probs = b.read_flag();

        update_token_probabilities(b, &mut header.token_probs);

        header.prob_skip_false = if b.read_flag() {
            Some(b.read_literal(8))
        } else {
            None
        };

        log::debug!(
            "vp8 header: {:?} filter level {} sharpness {}, {} partitions, base quantizer {}, segments {}",
            header.filter_type,
            header.filter_level,
            header.sharpness,
            header.num_partitions,
            header.quant.y_ac,
            header.segmentation.enabled
        );

        header
    }
}

fn read_segmentation(b: &mut BoolReader<'_>, seg: &mut Segmentation) {
    seg.update_map = b.read_flag();
    seg.update_data = b.read_flag();

    if seg.update_data {
        seg.absolute_values = b.read_flag();
        for q in seg.quantizer_level.iter_mut() {
            *q = b.read_optional_signed_value(7) as i8;
        }
        for level in seg.filter_level.iter_mut() {
            *level = b.read_optional_signed_value(6) as i8;
        }
    }

    if seg.update_map {
        for prob in seg.tree_probs.iter_mut() {
            *prob = if b.read_flag() { b.read_literal(8) } else { 255 };
        }
    }
}

fn update_token_probabilities(b: &mut BoolReader<'_>, probs: &mut TokenProbTables) {
    for (i, is) in COEFF_UPDATE_PROBS.iter().enumerate() {
        for (j, js) in is.iter().enumerate() {
            for (k, ks) in js.iter().enumerate() {
                for (t, &prob) in ks.iter().enumerate() {
                    if b.read_bool(prob) {
                        probs[i][j][k][t] = b.read_literal(8);
                    }
                }
            }
        }
    }
}
