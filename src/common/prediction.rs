//! Intra prediction (RFC 6386, section 12).
//!
//! Prediction runs in a small bordered workspace rather than in the frame
//! planes: row 0 holds the pixels above the macroblock (plus four above-right
//! pixels for luma), column 0 holds the pixels to its left, and the corner
//! holds the pixel above-left. Predicted and reconstructed samples start at
//! `(1, 1)`. Neighbours outside the frame read as 127 above and 129 to the
//! left, with whole-block DC falling back to 128 when it has no neighbours.

use super::types::IntraMode;

/// Luma workspace stride: 1 border pixel, 16 luma pixels, 4 above-right, padding.
pub(crate) const LUMA_STRIDE: usize = 32;
/// Luma workspace size: 1 border row plus 16 rows.
pub(crate) const LUMA_BLOCK_SIZE: usize = LUMA_STRIDE * (1 + 16);

/// Chroma workspace stride.
pub(crate) const CHROMA_STRIDE: usize = 32;
/// Chroma workspace size: 1 border row plus 8 rows.
pub(crate) const CHROMA_BLOCK_SIZE: usize = CHROMA_STRIDE * (1 + 8);

/// Fills the luma workspace border for macroblock `(mbx, mby)`.
///
/// `top` is the reconstructed row directly above the macroblock row, across
/// the whole (macroblock-padded) plane width. `left` is the above-left pixel
/// followed by the 16 pixels left of the macroblock.
pub(crate) fn update_border_luma(
    ws: &mut [u8; LUMA_BLOCK_SIZE],
    mbx: usize,
    mby: usize,
    mbw: usize,
    top: &[u8],
    left: &[u8; 17],
) {
    let stride = LUMA_STRIDE;

    if mby == 0 {
        ws[1..stride].fill(127);
    } else {
        ws[1..][..16].copy_from_slice(&top[mbx * 16..][..16]);

        if mbx == mbw - 1 {
            let last = top[mbx * 16 + 15];
            ws[17..21].fill(last);
        } else {
            ws[17..21].copy_from_slice(&top[mbx * 16 + 16..][..4]);
        }
    }

    // Sub-blocks in the right column below the first row use the
    // macroblock's above-right pixels.
    for i in 17usize..21 {
        ws[4 * stride + i] = ws[i];
        ws[8 * stride + i] = ws[i];
        ws[12 * stride + i] = ws[i];
    }

    if mbx == 0 {
        for i in 0usize..16 {
            ws[(i + 1) * stride] = 129;
        }
    } else {
        for (i, &l) in left[1..].iter().enumerate() {
            ws[(i + 1) * stride] = l;
        }
    }

    ws[0] = corner(mbx, mby, left[0]);
}

/// Fills a chroma workspace border, laid out like [`update_border_luma`]
/// with 8 pixels per side and no above-right pixels.
pub(crate) fn update_border_chroma(
    ws: &mut [u8; CHROMA_BLOCK_SIZE],
    mbx: usize,
    mby: usize,
    top: &[u8],
    left: &[u8; 9],
) {
    let stride = CHROMA_STRIDE;

    if mby == 0 {
        ws[1..stride].fill(127);
    } else {
        ws[1..][..8].copy_from_slice(&top[mbx * 8..][..8]);
    }

    if mbx == 0 {
        for y in 0usize..8 {
            ws[(y + 1) * stride] = 129;
        }
    } else {
        for (y, &l) in left[1..].iter().enumerate() {
            ws[(y + 1) * stride] = l;
        }
    }

    ws[0] = corner(mbx, mby, left[0]);
}

fn corner(mbx: usize, mby: usize, above_left: u8) -> u8 {
    if mby == 0 {
        127
    } else if mbx == 0 {
        129
    } else {
        above_left
    }
}

fn avg3(left: u8, this: u8, right: u8) -> u8 {
    let avg = (u16::from(left) + 2 * u16::from(this) + u16::from(right) + 2) >> 2;
    avg as u8
}

fn avg2(this: u8, right: u8) -> u8 {
    let avg = (u16::from(this) + u16::from(right) + 1) >> 1;
    avg as u8
}

/// Copies the row above into every row of the `size`x`size` block.
pub(crate) fn predict_vpred(ws: &mut [u8], size: usize, stride: usize) {
    let (above, rows) = ws.split_at_mut(stride);
    let above = &above[1..][..size];

    for row in rows.chunks_exact_mut(stride).take(size) {
        row[1..][..size].copy_from_slice(above);
    }
}

/// Fills each row with the pixel to its left.
pub(crate) fn predict_hpred(ws: &mut [u8], size: usize, stride: usize) {
    for row in ws.chunks_exact_mut(stride).skip(1).take(size) {
        let left = row[0];
        row[1..][..size].fill(left);
    }
}

/// Average of the available neighbours. `above` and `left` say whether the
/// macroblock has a neighbour in that direction inside the frame.
pub(crate) fn predict_dcpred(ws: &mut [u8], size: usize, stride: usize, above: bool, left: bool) {
    let mut sum = 0u32;
    let mut shf = if size == 8 { 2u32 } else { 3u32 };

    if left {
        for y in 0usize..size {
            sum += u32::from(ws[(y + 1) * stride]);
        }
        shf += 1;
    }

    if above {
        sum += ws[1..][..size].iter().map(|&p| u32::from(p)).sum::<u32>();
        shf += 1;
    }

    let dcval = if !left && !above {
        128u8
    } else {
        ((sum + (1 << (shf - 1))) >> shf) as u8
    };

    for y in 0usize..size {
        ws[1 + stride * (y + 1)..][..size].fill(dcval);
    }
}

/// True motion: `left + above - above_left`, clamped.
pub(crate) fn predict_tmpred(ws: &mut [u8], size: usize, stride: usize) {
    let (above, rows) = ws.split_at_mut(stride);
    let p = i32::from(above[0]);
    let above = &above[1..][..size];

    for row in rows.chunks_exact_mut(stride).take(size) {
        let left_minus_p = i32::from(row[0]) - p;
        for (cur, &abv) in row[1..][..size].iter_mut().zip(above) {
            *cur = (left_minus_p + i32::from(abv)).clamp(0, 255) as u8;
        }
    }
}

/// Neighbours of one 4x4 sub-block.
struct Edges {
    /// Four pixels above, then four above-right.
    top: [u8; 8],
    /// Four pixels to the left, top to bottom.
    left: [u8; 4],
    corner: u8,
}

impl Edges {
    fn gather(ws: &[u8], x0: usize, y0: usize, stride: usize) -> Self {
        let above = (y0 - 1) * stride + x0;
        let mut top = [0u8; 8];
        top.copy_from_slice(&ws[above..][..8]);
        Self {
            top,
            left: core::array::from_fn(|i| ws[(y0 + i) * stride + x0 - 1]),
            corner: ws[above - 1],
        }
    }

    /// Left column bottom-up, the corner, then the four pixels above.
    fn edge(&self) -> [u8; 9] {
        let [l0, l1, l2, l3] = self.left;
        let [t0, t1, t2, t3, ..] = self.top;
        [l3, l2, l1, l0, self.corner, t0, t1, t2, t3]
    }
}

/// Predicts the 4x4 sub-block at `(x0, y0)` of a luma workspace.
pub(crate) fn predict_4x4(ws: &mut [u8], mode: IntraMode, x0: usize, y0: usize, stride: usize) {
    let edges = Edges::gather(ws, x0, y0, stride);
    let rows = match mode {
        IntraMode::DC => dc_4x4(&edges),
        IntraMode::TM => tm_4x4(&edges),
        IntraMode::VE => ve_4x4(&edges),
        IntraMode::HE => he_4x4(&edges),
        IntraMode::LD => ld_4x4(&edges),
        IntraMode::RD => rd_4x4(&edges),
        IntraMode::VR => vr_4x4(&edges),
        IntraMode::VL => vl_4x4(&edges),
        IntraMode::HD => hd_4x4(&edges),
        IntraMode::HU => hu_4x4(&edges),
    };

    for (y, row) in rows.iter().enumerate() {
        ws[(y0 + y) * stride + x0..][..4].copy_from_slice(row);
    }
}

type Block4 = [[u8; 4]; 4];

fn dc_4x4(e: &Edges) -> Block4 {
    let sum: u32 = e.top[..4]
        .iter()
        .chain(&e.left)
        .map(|&p| u32::from(p))
        .sum();
    [[((sum + 4) >> 3) as u8; 4]; 4]
}

fn tm_4x4(e: &Edges) -> Block4 {
    let p = i32::from(e.corner);
    core::array::from_fn(|y| {
        let left_minus_p = i32::from(e.left[y]) - p;
        core::array::from_fn(|x| (left_minus_p + i32::from(e.top[x])).clamp(0, 255) as u8)
    })
}

fn ve_4x4(e: &Edges) -> Block4 {
    let t = &e.top;
    let row = [
        avg3(e.corner, t[0], t[1]),
        avg3(t[0], t[1], t[2]),
        avg3(t[1], t[2], t[3]),
        avg3(t[2], t[3], t[4]),
    ];
    [row; 4]
}

fn he_4x4(e: &Edges) -> Block4 {
    let [l0, l1, l2, l3] = e.left;
    [
        [avg3(e.corner, l0, l1); 4],
        [avg3(l0, l1, l2); 4],
        [avg3(l1, l2, l3); 4],
        [avg3(l2, l3, l3); 4],
    ]
}

fn ld_4x4(e: &Edges) -> Block4 {
    let t = &e.top;
    core::array::from_fn(|y| {
        core::array::from_fn(|x| {
            let i = x + y;
            avg3(t[i], t[i + 1], t[(i + 2).min(7)])
        })
    })
}

fn rd_4x4(e: &Edges) -> Block4 {
    let edge = e.edge();
    core::array::from_fn(|y| {
        core::array::from_fn(|x| {
            let i = 4 + x - y;
            avg3(edge[i - 1], edge[i], edge[i + 1])
        })
    })
}

fn vr_4x4(e: &Edges) -> Block4 {
    let [_, e1, e2, e3, e4, e5, e6, e7, e8] = e.edge();
    [
        [avg2(e4, e5), avg2(e5, e6), avg2(e6, e7), avg2(e7, e8)],
        [avg3(e3, e4, e5), avg3(e4, e5, e6), avg3(e5, e6, e7), avg3(e6, e7, e8)],
        [avg3(e2, e3, e4), avg2(e4, e5), avg2(e5, e6), avg2(e6, e7)],
        [avg3(e1, e2, e3), avg3(e3, e4, e5), avg3(e4, e5, e6), avg3(e5, e6, e7)],
    ]
}

fn vl_4x4(e: &Edges) -> Block4 {
    let [a0, a1, a2, a3, a4, a5, a6, a7] = e.top;
    [
        [avg2(a0, a1), avg2(a1, a2), avg2(a2, a3), avg2(a3, a4)],
        [avg3(a0, a1, a2), avg3(a1, a2, a3), avg3(a2, a3, a4), avg3(a3, a4, a5)],
        [avg2(a1, a2), avg2(a2, a3), avg2(a3, a4), avg3(a4, a5, a6)],
        [avg3(a1, a2, a3), avg3(a2, a3, a4), avg3(a3, a4, a5), avg3(a5, a6, a7)],
    ]
}

fn hd_4x4(e: &Edges) -> Block4 {
    let [e0, e1, e2, e3, e4, e5, e6, e7, _] = e.edge();
    [
        [avg2(e3, e4), avg3(e3, e4, e5), avg3(e4, e5, e6), avg3(e5, e6, e7)],
        [avg2(e2, e3), avg3(e2, e3, e4), avg2(e3, e4), avg3(e3, e4, e5)],
        [avg2(e1, e2), avg3(e1, e2, e3), avg2(e2, e3), avg3(e2, e3, e4)],
        [avg2(e0, e1), avg3(e0, e1, e2), avg2(e1, e2), avg3(e1, e2, e3)],
    ]
}

fn hu_4x4(e: &Edges) -> Block4 {
    let [l0, l1, l2, l3] = e.left;
    [
        [avg2(l0, l1), avg3(l0, l1, l2), avg2(l1, l2), avg3(l1, l2, l3)],
        [avg2(l1, l2), avg3(l1, l2, l3), avg2(l2, l3), avg3(l2, l3, l3)],
        [avg2(l2, l3), avg3(l2, l3, l3), l3, l3],
        [l3; 4],
    ]
}

/// Adds a 4x4 residual to the prediction at `(x0, y0)`, clamping to 0..=255.
pub(crate) fn add_residue(
    pblock: &mut [u8],
    rblock: &[i32; 16],
    y0: usize,
    x0: usize,
    stride: usize,
) {
    let mut pos = y0 * stride + x0;
    for row in rblock.chunks_exact(4) {
        for (p, &r) in pblock[pos..][..4].iter_mut().zip(row) {
            *p = (r + i32::from(*p)).clamp(0, 255) as u8;
        }
        pos += stride;
    }
}
