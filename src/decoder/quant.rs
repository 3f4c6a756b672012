//! Dequantisation factors (RFC 6386, sections 9.6 and 14.1).

use super::header::{FrameHeader, QuantIndices, Segmentation};
use crate::common::types::{AC_QUANT, DC_QUANT, MAX_SEGMENTS};

/// Multipliers applied to decoded tokens, one set per segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Dequant {
    pub ydc: i16,
    pub yac: i16,
    pub y2dc: i16,
    pub y2ac: i16,
    pub uvdc: i16,
    pub uvac: i16,
}

fn dc_quant(index: i32) -> i16 {
    DC_QUANT[index.clamp(0, 127) as usize]
}

fn ac_quant(index: i32) -> i16 {
    AC_QUANT[index.clamp(0, 127) as usize]
}

impl Dequant {
    /// Factors for the quantizer index `base` adjusted by the frame deltas.
    pub(crate) fn from_index(base: i32, q: &QuantIndices) -> Self {
        let y2ac = i32::from(ac_quant(base + i32::from(q.y2_ac_delta))) * 155 / 100;
        Self {
            ydc: dc_quant(base + i32::from(q.y_dc_delta)),
            yac: ac_quant(base),
            y2dc: dc_quant(base + i32::from(q.y2_dc_delta)) * 2,
            // The intermediate result (max `284*155`) can be larger than the `i16` range.
            y2ac: y2ac.max(8) as i16,
            uvdc: dc_quant(base + i32::from(q.uv_dc_delta)).min(132),
            uvac: ac_quant(base + i32::from(q.uv_ac_delta)),
        }
    }
}

/// Base quantizer index of `segment`: the frame index, replaced or adjusted
/// by the segment's value when segmentation is on. Clamped to 0..=127 before
/// the per-plane deltas are added.
fn segment_index(seg: &Segmentation, base: u8, segment: usize) -> i32 {
    let base = i32::from(base);
    if !seg.enabled {
        return base;
    }
    let level = i32::from(seg.quantizer_level[segment]);
    let index = if seg.absolute_values { level } else { base + level };
    index.clamp(0, 127)
}

/// Dequantisation factors for all four segments.
pub(crate) fn segment_dequant(header: &FrameHeader) -> [Dequant; MAX_SEGMENTS] {
    core::array::from_fn(|segment| {
        let index = segment_index(&header.segmentation, header.quant.y_ac, segment);
        Dequant::from_index(index, &header.quant)
    })
}
