//! Deblocking loop filter (RFC 6386, section 15).
//!
//! The segment kernels take eight pixels straddling an edge,
//! `p3 p2 p1 p0 | q0 q1 q2 q3`. The `_horizontal` variants filter a run of
//! pixels within one row (across a vertical edge), the `_vertical` variants
//! gather them down a column from `point - 4 * stride`.

use super::header::{FilterType, FrameHeader};
use crate::common::types::LumaMode;

#[inline]
fn c(val: i32) -> i32 {
    val.clamp(-128, 127)
}

// unsigned to signed
#[inline]
fn u2s(val: u8) -> i32 {
    i32::from(val) - 128
}

// signed to unsigned
#[inline]
fn s2u(val: i32) -> u8 {
    (c(val) + 128) as u8
}

#[inline]
fn diff(a: u8, b: u8) -> i32 {
    (i32::from(a) - i32::from(b)).abs()
}

/// Adjusts p0 and q0 toward each other and returns the filter value used.
fn common_adjust(use_outer_taps: bool, px: &mut [u8; 8]) -> i32 {
    let p1 = u2s(px[2]);
    let p0 = u2s(px[3]);
    let q0 = u2s(px[4]);
    let q1 = u2s(px[5]);

    let outer = if use_outer_taps { c(p1 - q1) } else { 0 };
    let a = c(outer + 3 * (q0 - p0));

    // the two halves round in opposite directions
    let b = c(a + 3) >> 3;
    let a = c(a + 4) >> 3;

    px[4] = s2u(q0 - a);
    px[3] = s2u(p0 + b);

    a
}

#[inline]
fn simple_threshold(edge_limit: i32, px: &[u8; 8]) -> bool {
    diff(px[3], px[4]) * 2 + (diff(px[2], px[5]) >> 1) <= edge_limit
}

fn should_filter(interior_limit: i32, edge_limit: i32, px: &[u8; 8]) -> bool {
    simple_threshold(edge_limit, px)
        && diff(px[0], px[1]) <= interior_limit
        && diff(px[1], px[2]) <= interior_limit
        && diff(px[2], px[3]) <= interior_limit
        && diff(px[7], px[6]) <= interior_limit
        && diff(px[6], px[5]) <= interior_limit
        && diff(px[5], px[4]) <= interior_limit
}

#[inline]
fn high_edge_variance(threshold: i32, px: &[u8; 8]) -> bool {
    diff(px[2], px[3]) > threshold || diff(px[5], px[4]) > threshold
}

fn simple_segment(edge_limit: u8, px: &mut [u8; 8]) {
    if simple_threshold(i32::from(edge_limit), px) {
        common_adjust(true, px);
    }
}

fn subblock_filter(hev_threshold: u8, interior_limit: u8, edge_limit: u8, px: &mut [u8; 8]) {
    if !should_filter(i32::from(interior_limit), i32::from(edge_limit), px) {
        return;
    }
    let p1 = u2s(px[2]);
    let q1 = u2s(px[5]);
    let hv = high_edge_variance(i32::from(hev_threshold), px);

    let a = (common_adjust(hv, px) + 1) >> 1;

    if !hv {
        px[5] = s2u(q1 - a);
        px[2] = s2u(p1 + a);
    }
}

fn macroblock_filter(hev_threshold: u8, interior_limit: u8, edge_limit: u8, px: &mut [u8; 8]) {
    if !should_filter(i32::from(interior_limit), i32::from(edge_limit), px) {
        return;
    }
    if high_edge_variance(i32::from(hev_threshold), px) {
        common_adjust(true, px);
        return;
    }

    let p2 = u2s(px[1]);
    let p1 = u2s(px[2]);
    let p0 = u2s(px[3]);
    let q0 = u2s(px[4]);
    let q1 = u2s(px[5]);
    let q2 = u2s(px[6]);

    let w = c(c(p1 - q1) + 3 * (q0 - p0));

    let a = c((27 * w + 63) >> 7);
    px[4] = s2u(q0 - a);
    px[3] = s2u(p0 + a);

    let a = c((18 * w + 63) >> 7);
    px[5] = s2u(q1 - a);
    px[2] = s2u(p1 + a);

    let a = c((9 * w + 63) >> 7);
    px[6] = s2u(q2 - a);
    px[1] = s2u(p2 + a);
}

fn along_row(pixels: &mut [u8], f: impl FnOnce(&mut [u8; 8])) {
    let mut px = [0u8; 8];
    px.copy_from_slice(&pixels[..8]);
    f(&mut px);
    pixels[..8].copy_from_slice(&px);
}

fn down_column(pixels: &mut [u8], point: usize, stride: usize, f: impl FnOnce(&mut [u8; 8])) {
    let start = point - 4 * stride;
    let mut px: [u8; 8] = core::array::from_fn(|i| pixels[start + i * stride]);
    f(&mut px);
    for (i, &p) in px.iter().enumerate() {
        pixels[start + i * stride] = p;
    }
}

pub(crate) fn simple_segment_horizontal(edge_limit: u8, pixels: &mut [u8]) {
    along_row(pixels, |px| simple_segment(edge_limit, px));
}

pub(crate) fn simple_segment_vertical(edge_limit: u8, pixels: &mut [u8], point: usize, stride: usize) {
    down_column(pixels, point, stride, |px| simple_segment(edge_limit, px));
}

pub(crate) fn subblock_filter_horizontal(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
) {
    along_row(pixels, |px| {
        subblock_filter(hev_threshold, interior_limit, edge_limit, px)
    });
}

pub(crate) fn subblock_filter_vertical(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    down_column(pixels, point, stride, |px| {
        subblock_filter(hev_threshold, interior_limit, edge_limit, px)
    });
}

pub(crate) fn macroblock_filter_horizontal(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
) {
    along_row(pixels, |px| {
        macroblock_filter(hev_threshold, interior_limit, edge_limit, px)
    });
}

pub(crate) fn macroblock_filter_vertical(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    down_column(pixels, point, stride, |px| {
        macroblock_filter(hev_threshold, interior_limit, edge_limit, px)
    });
}

/// Filter strength of one macroblock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MacroblockFilter {
    /// 0 disables filtering of this macroblock.
    pub level: u8,
    pub interior_limit: u8,
    pub hev_threshold: u8,
    /// Whether the edges between 4x4 sub-blocks are filtered too.
    pub inner_edges: bool,
}

impl MacroblockFilter {
    /// Strength for a macroblock of `segment` coded with `luma_mode`.
    ///
    /// `has_coefficients` is false for macroblocks that were skipped or whose
    /// blocks are all zero.
    pub(crate) fn new(
        header: &FrameHeader,
        segment: usize,
        luma_mode: LumaMode,
        has_coefficients: bool,
    ) -> Self {
        let inner_edges = luma_mode == LumaMode::B || has_coefficients;

        if header.filter_level == 0 {
            return Self {
                inner_edges,
                ..Self::default()
            };
        }

        let mut level = i32::from(header.filter_level);
        let seg = &header.segmentation;
        if seg.enabled {
            let seg_level = i32::from(seg.filter_level[segment]);
            level = if seg.absolute_values {
                seg_level
            } else {
                level + seg_level
            };
            level = level.clamp(0, 63);
        }

        let deltas = &header.filter_deltas;
        if deltas.enabled {
            // key frames only use the intra reference frame
            level += i32::from(deltas.ref_deltas[0]);
            if luma_mode == LumaMode::B {
                level += i32::from(deltas.mode_deltas[0]);
            }
            level = level.clamp(0, 63);
        }

        let sharpness = i32::from(header.sharpness);
        let mut interior_limit = level;
        if sharpness != 0 {
            interior_limit >>= if sharpness > 4 { 2 } else { 1 };
            interior_limit = interior_limit.min(9 - sharpness);
        }
        if interior_limit == 0 {
            interior_limit = 1;
        }

        let hev_threshold = if level >= 40 {
            2
        } else if level >= 15 {
            1
        } else {
            0
        };

        Self {
            level: level as u8,
            interior_limit: interior_limit as u8,
            hev_threshold,
            inner_edges,
        }
    }
}

/// Reconstructed planes of a whole frame, padded to whole macroblocks.
pub(crate) struct PlanesMut<'a> {
    pub y: &'a mut [u8],
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub mb_width: usize,
    pub mb_height: usize,
}

/// Runs the standard filter over every macroblock in raster order.
///
/// `filters` holds one entry per macroblock.
pub(crate) fn filter_frame(planes: &mut PlanesMut<'_>, filter_type: FilterType, filters: &[MacroblockFilter]) {
    for mby in 0..planes.mb_height {
        for mbx in 0..planes.mb_width {
            let f = filters[mby * planes.mb_width + mbx];
            if f.level == 0 {
                continue;
            }
            match filter_type {
                FilterType::Simple => filter_macroblock_simple(planes, mbx, mby, &f),
                FilterType::Normal => filter_macroblock_normal(planes, mbx, mby, &f),
            }
        }
    }
}

fn edge_limits(f: &MacroblockFilter) -> (u8, u8) {
    let mbedge = (u16::from(f.level) + 2) * 2 + u16::from(f.interior_limit);
    let subedge = u16::from(f.level) * 2 + u16::from(f.interior_limit);
    (mbedge as u8, subedge as u8)
}

fn filter_macroblock_simple(planes: &mut PlanesMut<'_>, mbx: usize, mby: usize, f: &MacroblockFilter) {
    let stride = planes.mb_width * 16;
    let buf = &mut *planes.y;
    let (mbedge, subedge) = edge_limits(f);
    let x0 = mbx * 16;
    let y0 = mby * 16;

    if mbx > 0 {
        for y in y0..y0 + 16 {
            simple_segment_horizontal(mbedge, &mut buf[y * stride + x0 - 4..][..8]);
        }
    }
    if f.inner_edges {
        for x in (x0 + 4..x0 + 16).step_by(4) {
            for y in y0..y0 + 16 {
                simple_segment_horizontal(subedge, &mut buf[y * stride + x - 4..][..8]);
            }
        }
    }
    if mby > 0 {
        for x in x0..x0 + 16 {
            simple_segment_vertical(mbedge, buf, y0 * stride + x, stride);
        }
    }
    if f.inner_edges {
        for y in (y0 + 4..y0 + 16).step_by(4) {
            for x in x0..x0 + 16 {
                simple_segment_vertical(subedge, buf, y * stride + x, stride);
            }
        }
    }
}

fn filter_macroblock_normal(planes: &mut PlanesMut<'_>, mbx: usize, mby: usize, f: &MacroblockFilter) {
    let (mbedge, subedge) = edge_limits(f);
    let hev = f.hev_threshold;
    let interior = f.interior_limit;

    let luma_stride = planes.mb_width * 16;
    let chroma_stride = planes.mb_width * 8;

    // Each plane: (buffer, stride, macroblock size)
    let mut targets: [(&mut [u8], usize, usize); 3] = [
        (&mut *planes.y, luma_stride, 16),
        (&mut *planes.u, chroma_stride, 8),
        (&mut *planes.v, chroma_stride, 8),
    ];

    for (buf, stride, size) in targets.iter_mut() {
        let (stride, size) = (*stride, *size);
        let x0 = mbx * size;
        let y0 = mby * size;

        if mbx > 0 {
            for y in y0..y0 + size {
                macroblock_filter_horizontal(hev, interior, mbedge, &mut buf[y * stride + x0 - 4..][..8]);
            }
        }
        if f.inner_edges {
            for x in (x0 + 4..x0 + size).step_by(4) {
                for y in y0..y0 + size {
                    subblock_filter_horizontal(hev, interior, subedge, &mut buf[y * stride + x - 4..][..8]);
                }
            }
        }
    }

    for (buf, stride, size) in targets.iter_mut() {
        let (stride, size) = (*stride, *size);
        let x0 = mbx * size;
        let y0 = mby * size;

        if mby > 0 {
            for x in x0..x0 + size {
                macroblock_filter_vertical(hev, interior, mbedge, buf, y0 * stride + x, stride);
            }
        }
        if f.inner_edges {
            for y in (y0 + 4..y0 + size).step_by(4) {
                for x in x0..x0 + size {
                    subblock_filter_vertical(hev, interior, subedge, buf, y * stride + x, stride);
                }
            }
        }
    }
}

/// The simplified edge-only blend: across every macroblock edge inside the
/// frame, `p0` and `q0` move a quarter of the way toward each other when
/// their difference is below `level * 2 + sharpness`.
pub(crate) fn filter_frame_edges_only(planes: &mut PlanesMut<'_>, level: u8, sharpness: u8) {
    if level == 0 {
        return;
    }
    let limit = i32::from(level) * 2 + i32::from(sharpness);

    let blend = |p0: &mut u8, q0: &mut u8| {
        let (p, q) = (i32::from(*p0), i32::from(*q0));
        if (p - q).abs() < limit {
            *p0 = ((3 * p + q + 2) >> 2) as u8;
            *q0 = ((3 * q + p + 2) >> 2) as u8;
        }
    };

    let (mb_width, mb_height) = (planes.mb_width, planes.mb_height);
    let mut targets: [(&mut [u8], usize); 3] = [
        (&mut *planes.y, 16),
        (&mut *planes.u, 8),
        (&mut *planes.v, 8),
    ];

    for (buf, size) in targets.iter_mut() {
        let size = *size;
        let stride = mb_width * size;
        for mby in 0..mb_height {
            for mbx in 0..mb_width {
                let x0 = mbx * size;
                let y0 = mby * size;
                if mbx > 0 {
                    for y in y0..y0 + size {
                        let (left, right) = buf.split_at_mut(y * stride + x0);
                        blend(&mut left[y * stride + x0 - 1], &mut right[0]);
                    }
                }
                if mby > 0 {
                    for x in x0..x0 + size {
                        let (above, below) = buf.split_at_mut(y0 * stride + x);
                        blend(&mut above[(y0 - 1) * stride + x], &mut below[0]);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_filter_smooths_small_step() {
        let mut px = [100, 100, 100, 100, 110, 110, 110, 110];
        simple_segment_horizontal(40, &mut px);
        // a = c(c(100 - 110) + 3 * 10) = 20, q0 -= (24 >> 3), p0 += (23 >> 3)
        assert_eq!(px, [100, 100, 100, 102, 107, 110, 110, 110]);
    }

    #[test]
    fn test_simple_filter_keeps_strong_edges() {
        let original = [10, 10, 10, 10, 200, 200, 200, 200];
        let mut px = original;
        simple_segment_horizontal(40, &mut px);
        assert_eq!(px, original);
    }

    #[test]
    fn test_vertical_matches_horizontal() {
        let row = [90u8, 95, 98, 100, 112, 113, 115, 118];
        let stride = 3;
        let mut column = vec![0u8; 8 * stride];
        for (i, &p) in row.iter().enumerate() {
            column[i * stride + 1] = p;
        }

        let mut h = row;
        macroblock_filter_horizontal(0, 10, 60, &mut h);
        macroblock_filter_vertical(0, 10, 60, &mut column, 4 * stride + 1, stride);
        let v: Vec<u8> = (0..8).map(|i| column[i * stride + 1]).collect();
        assert_eq!(&h[..], &v[..]);
        assert_ne!(h, row);

        let mut h = row;
        subblock_filter_horizontal(0, 10, 60, &mut h);
        let mut column2 = vec![0u8; 8 * stride];
        for (i, &p) in row.iter().enumerate() {
            column2[i * stride + 1] = p;
        }
        subblock_filter_vertical(0, 10, 60, &mut column2, 4 * stride + 1, stride);
        let v: Vec<u8> = (0..8).map(|i| column2[i * stride + 1]).collect();
        assert_eq!(&h[..], &v[..]);
    }

    #[test]
    fn test_macroblock_filter_touches_three_pixels_each_side() {
        let mut px = [100, 100, 100, 100, 108, 108, 108, 108];
        macroblock_filter_horizontal(5, 10, 40, &mut px);
        // w = c(-8 + 24) = 16: taps move p0/q0 by 3, p1/q1 by 2, p2/q2 by 1
        assert_eq!(px, [100, 101, 102, 103, 105, 106, 107, 108]);
    }

    #[test]
    fn test_interior_limit_blocks_filtering() {
        let original = [100, 130, 100, 100, 108, 108, 108, 108];
        let mut px = original;
        macroblock_filter_horizontal(5, 10, 40, &mut px);
        assert_eq!(px, original);
    }

    #[test]
    fn test_subblock_filter_high_variance_only_moves_p0_q0() {
        let mut px = [100, 100, 90, 100, 108, 118, 108, 108];
        subblock_filter_horizontal(2, 20, 60, &mut px);
        assert_eq!(px[2], 90);
        assert_eq!(px[5], 118);
        assert_ne!(px[3], 100);
    }

    fn header(level: u8, sharpness: u8) -> FrameHeader {
        FrameHeader {
            filter_level: level,
            sharpness,
            ..FrameHeader::default()
        }
    }

    #[test]
    fn test_filter_parameters() {
        let f = MacroblockFilter::new(&header(32, 0), 0, LumaMode::DC, false);
        assert_eq!(
            f,
            MacroblockFilter {
                level: 32,
                interior_limit: 32,
                hev_threshold: 1,
                inner_edges: false,
            }
        );

        let f = MacroblockFilter::new(&header(63, 5), 0, LumaMode::B, false);
        assert_eq!(f.interior_limit, 4);
        assert_eq!(f.hev_threshold, 2);
        assert!(f.inner_edges);

        let f = MacroblockFilter::new(&header(1, 7), 0, LumaMode::TM, true);
        assert_eq!(f.interior_limit, 1);
        assert_eq!(f.hev_threshold, 0);
        assert!(f.inner_edges);
    }

    #[test]
    fn test_filter_parameters_segments_and_deltas() {
        let mut h = header(20, 0);
        h.segmentation.enabled = true;
        h.segmentation.filter_level = [0, 10, -30, 50];
        h.filter_deltas.enabled = true;
        h.filter_deltas.ref_deltas[0] = 2;
        h.filter_deltas.mode_deltas[0] = -4;

        assert_eq!(MacroblockFilter::new(&h, 0, LumaMode::DC, false).level, 22);
        assert_eq!(MacroblockFilter::new(&h, 1, LumaMode::B, false).level, 28);
        assert_eq!(MacroblockFilter::new(&h, 2, LumaMode::DC, false).level, 2);
        assert_eq!(MacroblockFilter::new(&h, 3, LumaMode::DC, false).level, 63);

        h.segmentation.absolute_values = true;
        assert_eq!(MacroblockFilter::new(&h, 1, LumaMode::DC, false).level, 12);
    }

    fn noisy_planes(mbw: usize, mbh: usize) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let y = (0..mbw * mbh * 256).map(|i| ((i * 37) % 23 + 100) as u8).collect();
        let u = (0..mbw * mbh * 64).map(|i| ((i * 13) % 11 + 120) as u8).collect();
        let v = (0..mbw * mbh * 64).map(|i| ((i * 7) % 5 + 125) as u8).collect();
        (y, u, v)
    }

    #[test]
    fn test_level_zero_is_a_no_op() {
        let (mut y, mut u, mut v) = noisy_planes(2, 2);
        let original = (y.clone(), u.clone(), v.clone());
        let h = header(0, 3);
        let filters: Vec<_> = (0..4)
            .map(|_| MacroblockFilter::new(&h, 0, LumaMode::B, true))
            .collect();

        let mut planes = PlanesMut {
            y: &mut y,
            u: &mut u,
            v: &mut v,
            mb_width: 2,
            mb_height: 2,
        };
        filter_frame(&mut planes, FilterType::Normal, &filters);
        filter_frame(&mut planes, FilterType::Simple, &filters);
        filter_frame_edges_only(&mut planes, 0, 3);

        assert_eq!((y, u, v), original);
    }

    #[test]
    fn test_simple_filter_leaves_chroma() {
        let (mut y, mut u, mut v) = noisy_planes(2, 1);
        let (y0, u0, v0) = (y.clone(), u.clone(), v.clone());
        let filters = [MacroblockFilter::new(&header(40, 0), 0, LumaMode::B, true); 2];
        let mut planes = PlanesMut {
            y: &mut y,
            u: &mut u,
            v: &mut v,
            mb_width: 2,
            mb_height: 1,
        };
        filter_frame(&mut planes, FilterType::Simple, &filters);
        assert_ne!(y, y0);
        assert_eq!(u, u0);
        assert_eq!(v, v0);
    }

    #[test]
    fn test_edges_only_blend() {
        // two macroblocks side by side, flat 100 and flat 104
        let mut y = vec![0u8; 32 * 16];
        for row in y.chunks_exact_mut(32) {
            row[..16].fill(100);
            row[16..].fill(104);
        }
        let mut u = vec![128u8; 16 * 8];
        let mut v = vec![128u8; 16 * 8];
        let mut planes = PlanesMut {
            y: &mut y,
            u: &mut u,
            v: &mut v,
            mb_width: 2,
            mb_height: 1,
        };
        filter_frame_edges_only(&mut planes, 2, 1);
        for row in y.chunks_exact(32) {
            assert_eq!(row[14], 100);
            assert_eq!(row[15], 101);
            assert_eq!(row[16], 103);
            assert_eq!(row[17], 104);
        }
        assert!(u.iter().chain(&v).all(|&p| p == 128));
    }

    #[test]
    fn test_edges_only_respects_limit() {
        let mut y = vec![0u8; 16 * 32];
        y[..16 * 16].fill(50);
        y[16 * 16..].fill(60);
        let original = y.clone();
        let mut u = vec![128u8; 8 * 16];
        let mut v = vec![128u8; 8 * 16];
        let mut planes = PlanesMut {
            y: &mut y,
            u: &mut u,
            v: &mut v,
            mb_width: 1,
            mb_height: 2,
        };
        // limit 2 * 4 + 1 = 9 is below the step of 10
        filter_frame_edges_only(&mut planes, 4, 1);
        assert_eq!(y, original);
    }
}
