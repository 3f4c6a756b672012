//! Key frame reconstruction (RFC 6386, sections 11 to 15 and 19.3).
//!
//! Macroblocks are decoded in raster order straight into planes padded to
//! whole macroblocks. Intra prediction reads its neighbours from those
//! planes, so by the time macroblock `(x, y)` is predicted every macroblock
//! above it and to its left has been written. The loop filter runs once the
//! whole frame is reconstructed, and the planes are cropped last.

use alloc::vec;
use alloc::vec::Vec;

use super::api::{DecodeConfig, DecodeError, LoopFilterMode, UpsamplingMethod};
use super::bit_reader::{tree_nodes_from, BoolReader, TreeNode};
use super::coefficients::{read_macroblock_coefficients, MacroblockCoefficients};
use super::header::{read_uncompressed_header, FrameHeader, UncompressedHeader};
use super::loop_filter::{filter_frame, filter_frame_edges_only, MacroblockFilter, PlanesMut};
use super::quant::{segment_dequant, Dequant};
use super::yuv::{self, PlanesRef};
use crate::common::prediction::*;
use crate::common::transform::{idct4x4, idct4x4_dc, iwht4x4};
use crate::common::types::*;
use crate::slice_reader::SliceReader;

const KEYFRAME_YMODE_NODES: [TreeNode; 4] =
    tree_nodes_from(KEYFRAME_YMODE_TREE, KEYFRAME_YMODE_PROBS);

const KEYFRAME_BPRED_MODE_NODES: [[[TreeNode; 9]; 10]; 10] = {
    let mut nodes = [[[TreeNode::UNINIT; 9]; 10]; 10];
    let mut above = 0;
    while above < 10 {
        let mut left = 0;
        while left < 10 {
            nodes[above][left] =
                tree_nodes_from(KEYFRAME_BPRED_MODE_TREE, KEYFRAME_BPRED_MODE_PROBS[above][left]);
            left += 1;
        }
        above += 1;
    }
    nodes
};

const KEYFRAME_UV_MODE_NODES: [TreeNode; 3] =
    tree_nodes_from(KEYFRAME_UV_MODE_TREE, KEYFRAME_UV_MODE_PROBS);

/// Modes of the macroblock being decoded.
#[derive(Default, Clone, Copy, Debug)]
struct Macroblock {
    /// Sub-block modes in raster order. For whole-block luma modes the
    /// bottom row holds the implied mode, which is what later contexts read.
    bpred: [IntraMode; 16],
    luma_mode: LumaMode,
    chroma_mode: ChromaMode,
    segment: usize,
    coeffs_skipped: bool,
}

/// What later macroblocks need from an already decoded neighbour: its
/// bottom (for the row below) or right (for the next one along) sub-block
/// modes and non-zero flags.
#[derive(Default, Clone, Copy)]
struct Neighbour {
    bpred: [IntraMode; 4],
    /// Laid out as `y2, y, y, y, y, u, u, v, v`.
    complexity: [u8; 9],
}

/// A decoded key frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width of the luma plane.
    pub width: u16,
    /// Height of the luma plane.
    pub height: u16,
    /// Luma plane, `width` samples per row.
    pub ybuf: Vec<u8>,
    /// Blue-difference chroma, `width.div_ceil(2)` samples per row.
    pub ubuf: Vec<u8>,
    /// Red-difference chroma, laid out like `ubuf`.
    pub vbuf: Vec<u8>,
    /// Bitstream version from the frame tag.
    pub version: u8,
    /// Whether the frame tag marks this frame for display.
    pub for_display: bool,
    /// The parsed frame header.
    pub header: FrameHeader,
}

impl Frame {
    /// Width of the chroma planes.
    #[must_use]
    pub fn chroma_width(&self) -> u16 {
        self.width.div_ceil(2)
    }

    /// Height of the chroma planes.
    #[must_use]
    pub fn chroma_height(&self) -> u16 {
        self.height.div_ceil(2)
    }

    fn planes(&self) -> PlanesRef<'_> {
        PlanesRef {
            y: &self.ybuf,
            u: &self.ubuf,
            v: &self.vbuf,
            width: usize::from(self.width),
            height: usize::from(self.height),
        }
    }

    /// Converts the frame into `buf`, `BPP` bytes per pixel with rows
    /// `row_stride` bytes apart. `buf` must hold every row.
    pub(crate) fn fill<const BPP: usize>(
        &self,
        buf: &mut [u8],
        row_stride: usize,
        upsampling: UpsamplingMethod,
    ) {
        match upsampling {
            UpsamplingMethod::Simple => {
                yuv::fill_rgb_buffer_simple::<BPP>(buf, row_stride, self.planes());
            }
            UpsamplingMethod::Bilinear => {
                yuv::fill_rgb_buffer_fancy::<BPP>(buf, row_stride, self.planes());
            }
        }
    }

    /// Fills a tightly packed RGB buffer of `width * height * 3` bytes.
    pub fn fill_rgb(&self, buf: &mut [u8], upsampling: UpsamplingMethod) {
        self.fill::<3>(buf, usize::from(self.width) * 3, upsampling);
    }

    /// Fills a tightly packed RGBA buffer of `width * height * 4` bytes.
    pub fn fill_rgba(&self, buf: &mut [u8], upsampling: UpsamplingMethod) {
        self.fill::<4>(buf, usize::from(self.width) * 4, upsampling);
    }
}

/// Decoder for a single VP8 key frame.
pub struct Vp8Decoder<'a> {
    /// First partition, positioned after the frame header.
    modes: BoolReader<'a>,
    /// Token partitions; macroblock row `r` uses `r % len`.
    partitions: Vec<BoolReader<'a>>,
    info: UncompressedHeader,
    header: FrameHeader,
    loop_filter: LoopFilterMode,

    mb_width: usize,
    mb_height: usize,

    dequant: [Dequant; MAX_SEGMENTS],
    segment_tree: [TreeNode; 3],

    top: Vec<Neighbour>,
    left: Neighbour,

    ybuf: Vec<u8>,
    ubuf: Vec<u8>,
    vbuf: Vec<u8>,
    filters: Vec<MacroblockFilter>,
}

impl<'a> Vp8Decoder<'a> {
    /// Parses everything up to the first macroblock and allocates the planes.
    /// All validation happens before the allocation.
    fn new(data: &'a [u8], config: &DecodeConfig) -> Result<Self, DecodeError> {
        let mut r = SliceReader::new(data);
        let info = read_uncompressed_header(&mut r)?;

        let first_size = info.tag.first_partition_size as usize;
        if first_size > r.remaining() {
            return Err(DecodeError::FirstPartitionTooLarge {
                size: first_size,
                available: r.remaining(),
            });
        }

        config
            .limits
            .check_dimensions(u32::from(info.width), u32::from(info.height))?;

        let mut modes = BoolReader::new(r.take_slice(first_size)?);
        let header = FrameHeader::read(&mut modes);
        let partitions = split_partitions(&mut r, usize::from(header.num_partitions))?;

        let mb_width = usize::from(info.width).div_ceil(16);
        let mb_height = usize::from(info.height).div_ceil(16);
        let luma_len = (mb_width * 16)
            .checked_mul(mb_height * 16)
            .ok_or(DecodeError::ImageTooLarge)?;

        if header.segmentation.enabled {
            log::debug!(
                "vp8 segmentation: map update {}, data update {}, absolute {}, quantizers {:?}, filter levels {:?}",
                header.segmentation.update_map,
                header.segmentation.update_data,
                header.segmentation.absolute_values,
                header.segmentation.quantizer_level,
                header.segmentation.filter_level
            );
        }

        Ok(Self {
            modes,
            partitions,
            info,
            dequant: segment_dequant(&header),
            segment_tree: tree_nodes_from(SEGMENT_ID_TREE, header.segmentation.tree_probs),
            header,
            loop_filter: config.loop_filter,
            mb_width,
            mb_height,
            top: vec![Neighbour::default(); mb_width],
            left: Neighbour::default(),
            ybuf: vec![128; luma_len],
            ubuf: vec![128; luma_len / 4],
            vbuf: vec![128; luma_len / 4],
            filters: Vec::with_capacity(mb_width * mb_height),
        })
    }

    /// Decodes a key frame with the default configuration.
    pub fn decode_frame(data: &'a [u8]) -> Result<Frame, DecodeError> {
        Self::decode_frame_with_config(data, &DecodeConfig::default())
    }

    /// Decodes a key frame, applying `config`'s limits and loop filter mode.
    pub fn decode_frame_with_config(
        data: &'a [u8],
        config: &DecodeConfig,
    ) -> Result<Frame, DecodeError> {
        let mut decoder = Self::new(data, config)?;
        decoder.decode_macroblocks();
        decoder.apply_loop_filter();
        Ok(decoder.into_frame())
    }

    fn read_macroblock_header(&mut self, mbx: usize) -> Macroblock {
        let b = &mut self.modes;
        let mut mb = Macroblock::default();

        let seg = &self.header.segmentation;
        if seg.enabled && seg.update_map {
            mb.segment = b.read_with_tree(&self.segment_tree) as usize;
        }

        mb.coeffs_skipped = match self.header.prob_skip_false {
            Some(prob) => b.read_bool(prob),
            None => false,
        };

        // The trees only reach valid modes, so the defaults are never used.
        let luma = b.read_with_tree(&KEYFRAME_YMODE_NODES);
        mb.luma_mode = LumaMode::from_i8(luma).unwrap_or_default();

        let top = &mut self.top[mbx];
        match mb.luma_mode.into_intra() {
            None => {
                for y in 0usize..4 {
                    for x in 0usize..4 {
                        let above = top.bpred[x] as usize;
                        let left = self.left.bpred[y] as usize;
                        let sub = b.read_with_tree(&KEYFRAME_BPRED_MODE_NODES[above][left]);
                        let mode = IntraMode::from_i8(sub).unwrap_or_default();
                        mb.bpred[x + y * 4] = mode;
                        top.bpred[x] = mode;
                        self.left.bpred[y] = mode;
                    }
                }
            }
            Some(mode) => {
                mb.bpred = [mode; 16];
                top.bpred = [mode; 4];
                self.left.bpred = [mode; 4];
            }
        }

        let chroma = b.read_with_tree(&KEYFRAME_UV_MODE_NODES);
        mb.chroma_mode = ChromaMode::from_i8(chroma).unwrap_or_default();

        mb
    }

    /// Reads the residuals of a macroblock, or clears the neighbour contexts
    /// of a skipped one.
    fn read_residuals(&mut self, mb: &Macroblock, mbx: usize, partition: usize) -> MacroblockCoefficients {
        let top = &mut self.top[mbx].complexity;
        let left = &mut self.left.complexity;
        let has_y2 = mb.luma_mode != LumaMode::B;

        if mb.coeffs_skipped {
            let first = if has_y2 { 0 } else { 1 };
            top[first..].fill(0);
            left[first..].fill(0);
            return MacroblockCoefficients::default();
        }

        read_macroblock_coefficients(
            &mut self.partitions[partition],
            &self.header.token_probs,
            &self.dequant[mb.segment],
            has_y2,
            top,
            left,
        )
    }

    fn decode_macroblocks(&mut self) {
        for mby in 0..self.mb_height {
            let partition = mby % self.partitions.len();
            self.left = Neighbour::default();

            for mbx in 0..self.mb_width {
                let mb = self.read_macroblock_header(mbx);
                let mut coeffs = self.read_residuals(&mb, mbx, partition);
                let non_zero = inverse_transform(&mut coeffs, mb.luma_mode);

                self.reconstruct_luma(mbx, mby, &mb, &coeffs.blocks);
                self.reconstruct_chroma(mbx, mby, &mb, &coeffs.blocks);

                self.filters.push(MacroblockFilter::new(
                    &self.header,
                    mb.segment,
                    mb.luma_mode,
                    non_zero,
                ));
            }

            log::trace!("vp8 macroblock row {}/{} done", mby + 1, self.mb_height);
        }

        if self.modes.is_past_end() {
            log::debug!("vp8 first partition is shorter than its modes");
        }
    }

    fn reconstruct_luma(&mut self, mbx: usize, mby: usize, mb: &Macroblock, blocks: &[[i32; 16]; 24]) {
        let stride = LUMA_STRIDE;
        let plane_stride = self.mb_width * 16;
        let (x, y) = (mbx * 16, mby * 16);

        let mut ws = [0u8; LUMA_BLOCK_SIZE];
        let above: &[u8] = if mby == 0 {
            &[]
        } else {
            &self.ybuf[(y - 1) * plane_stride..][..plane_stride]
        };
        let left = left_column::<17>(&self.ybuf, plane_stride, x, y);
        update_border_luma(&mut ws, mbx, mby, self.mb_width, above, &left);

        match mb.luma_mode {
            LumaMode::V => predict_vpred(&mut ws, 16, stride),
            LumaMode::H => predict_hpred(&mut ws, 16, stride),
            LumaMode::TM => predict_tmpred(&mut ws, 16, stride),
            LumaMode::DC => predict_dcpred(&mut ws, 16, stride, mby != 0, mbx != 0),
            LumaMode::B => {}
        }

        for (i, block) in blocks[..16].iter().enumerate() {
            let y0 = 1 + (i / 4) * 4;
            let x0 = 1 + (i % 4) * 4;
            // sub-blocks predict from their reconstructed neighbours, one at a time
            if mb.luma_mode == LumaMode::B {
                predict_4x4(&mut ws, mb.bpred[i], x0, y0, stride);
            }
            add_residue(&mut ws, block, y0, x0, stride);
        }

        for (row, out) in self.ybuf[y * plane_stride..]
            .chunks_exact_mut(plane_stride)
            .take(16)
            .enumerate()
        {
            out[x..][..16].copy_from_slice(&ws[(row + 1) * stride + 1..][..16]);
        }
    }

    fn reconstruct_chroma(&mut self, mbx: usize, mby: usize, mb: &Macroblock, blocks: &[[i32; 16]; 24]) {
        let stride = CHROMA_STRIDE;
        let plane_stride = self.mb_width * 8;
        let (x, y) = (mbx * 8, mby * 8);

        for (plane, residuals) in [(&mut self.ubuf, &blocks[16..20]), (&mut self.vbuf, &blocks[20..24])] {
            let mut ws = [0u8; CHROMA_BLOCK_SIZE];
            let above: &[u8] = if mby == 0 {
                &[]
            } else {
                &plane[(y - 1) * plane_stride..][..plane_stride]
            };
            let left = left_column::<9>(plane, plane_stride, x, y);
            update_border_chroma(&mut ws, mbx, mby, above, &left);

            match mb.chroma_mode {
                ChromaMode::V => predict_vpred(&mut ws, 8, stride),
                ChromaMode::H => predict_hpred(&mut ws, 8, stride),
                ChromaMode::TM => predict_tmpred(&mut ws, 8, stride),
                ChromaMode::DC => predict_dcpred(&mut ws, 8, stride, mby != 0, mbx != 0),
            }

            for (i, block) in residuals.iter().enumerate() {
                add_residue(&mut ws, block, 1 + (i / 2) * 4, 1 + (i % 2) * 4, stride);
            }

            for (row, out) in plane[y * plane_stride..]
                .chunks_exact_mut(plane_stride)
                .take(8)
                .enumerate()
            {
                out[x..][..8].copy_from_slice(&ws[(row + 1) * stride + 1..][..8]);
            }
        }
    }

    fn apply_loop_filter(&mut self) {
        let header = &self.header;
        let mut planes = PlanesMut {
            y: &mut self.ybuf,
            u: &mut self.ubuf,
            v: &mut self.vbuf,
            mb_width: self.mb_width,
            mb_height: self.mb_height,
        };

        log::debug!(
            "vp8 loop filter {:?}: {:?} level {} sharpness {}",
            self.loop_filter,
            header.filter_type,
            header.filter_level,
            header.sharpness
        );

        match self.loop_filter {
            LoopFilterMode::Standard => filter_frame(&mut planes, header.filter_type, &self.filters),
            LoopFilterMode::MacroblockEdges => {
                filter_frame_edges_only(&mut planes, header.filter_level, header.sharpness);
            }
            LoopFilterMode::Disabled => {}
        }
    }

    fn into_frame(self) -> Frame {
        let width = usize::from(self.info.width);
        let height = usize::from(self.info.height);
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        Frame {
            width: self.info.width,
            height: self.info.height,
            ybuf: crop(&self.ybuf, self.mb_width * 16, width, height),
            ubuf: crop(&self.ubuf, self.mb_width * 8, chroma_width, chroma_height),
            vbuf: crop(&self.vbuf, self.mb_width * 8, chroma_width, chroma_height),
            version: self.info.tag.version,
            for_display: self.info.tag.show_frame,
            header: self.header,
        }
    }
}

/// Splits what follows the first partition into the token partitions.
///
/// A partition whose declared size runs past the data is clamped to what is
/// there; the last partition takes the rest of the data.
fn split_partitions<'a>(
    r: &mut SliceReader<'a>,
    count: usize,
) -> Result<Vec<BoolReader<'a>>, DecodeError> {
    let table_len = 3 * (count - 1);
    if r.remaining() < table_len {
        return Err(DecodeError::TruncatedInput);
    }

    let sizes = (1..count)
        .map(|_| r.read_u24_le().map(|s| s as usize))
        .collect::<Result<Vec<_>, _>>()?;

    let mut partitions = Vec::with_capacity(count);
    for (i, &size) in sizes.iter().enumerate() {
        let available = r.remaining();
        if size > available {
            log::warn!(
                "vp8 partition {} declares {} bytes but only {} remain",
                i,
                size,
                available
            );
        }
        partitions.push(BoolReader::new(r.take_slice(size.min(available))?));
    }
    partitions.push(BoolReader::new(r.remaining_slice()));

    log::debug!(
        "vp8 token partitions: {:?} + {} bytes",
        sizes,
        r.remaining()
    );

    Ok(partitions)
}

/// The pixel above-left of `(x, y)` followed by the `N - 1` pixels to its
/// left. Positions outside the plane are left as 0; the border update
/// replaces them.
fn left_column<const N: usize>(plane: &[u8], stride: usize, x: usize, y: usize) -> [u8; N] {
    core::array::from_fn(|i| {
        if x == 0 || (i == 0 && y == 0) {
            0
        } else {
            plane[(y + i - 1) * stride + x - 1]
        }
    })
}

/// Runs the inverse transforms in place, leaving residuals in `blocks`.
///
/// Returns whether the macroblock has any non-zero coefficient, which
/// decides whether its inner edges are filtered.
fn inverse_transform(coeffs: &mut MacroblockCoefficients, luma_mode: LumaMode) -> bool {
    if luma_mode != LumaMode::B {
        iwht4x4(&mut coeffs.y2);
        for (block, &dc) in coeffs.blocks[..16].iter_mut().zip(coeffs.y2.iter()) {
            block[0] = dc;
        }
    }

    let non_zero = coeffs.has_tokens || coeffs.blocks[..16].iter().any(|b| b[0] != 0);

    for block in coeffs.blocks.iter_mut() {
        if block[1..].iter().any(|&c| c != 0) {
            idct4x4(block);
        } else if block[0] != 0 {
            idct4x4_dc(block);
        }
    }

    non_zero
}

fn crop(plane: &[u8], stride: usize, width: usize, height: usize) -> Vec<u8> {
    plane
        .chunks_exact(stride)
        .take(height)
        .flat_map(|row| &row[..width])
        .copied()
        .collect()
}
