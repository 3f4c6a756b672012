//! Conversion of the decoded YUV 4:2:0 planes to interleaved RGB or RGBA.
//!
//! Luma maps one to one onto output pixels while each chroma sample covers a
//! 2x2 block, so chroma has to be upsampled first. The simple method repeats
//! each chroma sample over its block:
//!
//! ```text
//! u0 u0 u1 u1
//! u0 u0 u1 u1
//! u2 u2 u3 u3
//! u2 u2 u3 u3
//! ```
//!
//! The bilinear ("fancy") method weights the nearest chroma sample 9, the two
//! next nearest 3 and the diagonal one 1, so that for the pixel one down and
//! one right of the top-left corner `u = (9*u0 + 3*u1 + 3*u2 + u3 + 8) / 16`.
//! Samples past the edge of the chroma plane repeat the edge sample.

use alloc::vec;

/// Fixed-point coefficients of the conversion, scaled by 2^16.
const R_FROM_V: i32 = 91881;
const G_FROM_U: i32 = 22554;
const G_FROM_V: i32 = 46802;
const B_FROM_U: i32 = 116130;

#[inline(always)]
fn clamp255(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline(always)]
fn yuv_to_r(y: u8, v: u8) -> u8 {
    let v = i32::from(v) - 128;
    clamp255(i32::from(y) + ((R_FROM_V * v) >> 16))
}

#[inline(always)]
fn yuv_to_g(y: u8, u: u8, v: u8) -> u8 {
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;
    clamp255(i32::from(y) - ((G_FROM_U * u + G_FROM_V * v) >> 16))
}

#[inline(always)]
fn yuv_to_b(y: u8, u: u8) -> u8 {
    let u = i32::from(u) - 128;
    clamp255(i32::from(y) + ((B_FROM_U * u) >> 16))
}

/// Writes one pixel; the fourth byte, when there is one, is opaque alpha.
#[inline]
fn set_pixel(px: &mut [u8], y: u8, u: u8, v: u8) {
    px[0] = yuv_to_r(y, v);
    px[1] = yuv_to_g(y, u, v);
    px[2] = yuv_to_b(y, u);
    if let Some(a) = px.get_mut(3) {
        *a = 255;
    }
}

/// Cropped planes of a frame: luma is `width` samples per row, chroma
/// `width.div_ceil(2)`.
#[derive(Clone, Copy)]
pub(crate) struct PlanesRef<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub width: usize,
    pub height: usize,
}

impl PlanesRef<'_> {
    fn chroma_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    fn chroma_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    fn y_row(&self, row: usize) -> &[u8] {
        &self.y[row * self.width..][..self.width]
    }

    fn uv_rows(&self, row: usize) -> (&[u8], &[u8]) {
        let cw = self.chroma_width();
        (&self.u[row * cw..][..cw], &self.v[row * cw..][..cw])
    }
}

/// Fills `buffer` by repeating each chroma sample over its 2x2 block.
///
/// BPP is the number of bytes per output pixel, 3 or 4. Rows of `buffer` are
/// `row_stride` bytes apart.
pub(crate) fn fill_rgb_buffer_simple<const BPP: usize>(
    buffer: &mut [u8],
    row_stride: usize,
    planes: PlanesRef<'_>,
) {
    for (row, out) in buffer
        .chunks_mut(row_stride)
        .take(planes.height)
        .enumerate()
    {
        let y_row = planes.y_row(row);
        let (u_row, v_row) = planes.uv_rows(row / 2);

        for (x, px) in out[..planes.width * BPP].chunks_exact_mut(BPP).enumerate() {
            set_pixel(px, y_row[x], u_row[x / 2], v_row[x / 2]);
        }
    }
}

/// Chroma rows blended into output row `row`: the nearest one first, then
/// the next nearest (the same row at the top and bottom edges).
fn fancy_rows(row: usize, chroma_height: usize) -> (usize, usize) {
    let last = chroma_height - 1;
    if row == 0 {
        (0, 0)
    } else if row % 2 == 1 {
        let near = (row - 1) / 2;
        (near, (near + 1).min(last))
    } else {
        let near = row / 2;
        (near, near - 1)
    }
}

/// Interpolates one output row of chroma from its two contributing chroma
/// rows, weighting `near` 3 to 1 vertically and each sample 3 to 1
/// horizontally.
fn upsample_row(near: &[u8], far: &[u8], out: &mut [u8]) {
    let last = near.len() - 1;
    let blend = |main: usize, side: usize| {
        let (a, b) = (u16::from(near[main]), u16::from(near[side]));
        let (c, d) = (u16::from(far[main]), u16::from(far[side]));
        ((9 * a + 3 * b + 3 * c + d + 8) / 16) as u8
    };

    for (x, sample) in out.iter_mut().enumerate() {
        *sample = if x == 0 {
            blend(0, 0)
        } else if x % 2 == 1 {
            let main = (x - 1) / 2;
            blend(main, (main + 1).min(last))
        } else {
            let main = x / 2;
            blend(main, main - 1)
        };
    }
}

/// Fills `buffer` with bilinear chroma upsampling, laid out as in
/// [`fill_rgb_buffer_simple`].
pub(crate) fn fill_rgb_buffer_fancy<const BPP: usize>(
    buffer: &mut [u8],
    row_stride: usize,
    planes: PlanesRef<'_>,
) {
    let mut u_line = vec![0u8; planes.width];
    let mut v_line = vec![0u8; planes.width];
    let chroma_height = planes.chroma_height();

    for (row, out) in buffer
        .chunks_mut(row_stride)
        .take(planes.height)
        .enumerate()
    {
        let (near, far) = fancy_rows(row, chroma_height);
        let (u_near, v_near) = planes.uv_rows(near);
        let (u_far, v_far) = planes.uv_rows(far);
        upsample_row(u_near, u_far, &mut u_line);
        upsample_row(v_near, v_far, &mut v_line);

        let y_row = planes.y_row(row);
        for (((px, &y), &u), &v) in out[..planes.width * BPP]
            .chunks_exact_mut(BPP)
            .zip(y_row)
            .zip(&u_line)
            .zip(&v_line)
        {
            set_pixel(px, y, u, v);
        }
    }
}
