//! Synthesises small VP8 key frames with known content.
//!
//! Frames use the default token probabilities and only carry DC tokens of
//! magnitude 1 to 4, which is enough to compute the decoded pixels by hand.
#![allow(dead_code)]

#[path = "../../src/decoder/bool_writer.rs"]
mod bool_writer;

use bool_writer::BoolWriter;
use zenvp8::common::types::{
    ChromaMode, IntraMode, LumaMode, Prob, COEFF_BANDS, COEFF_PROBS, COEFF_UPDATE_PROBS,
    KEYFRAME_BPRED_MODE_PROBS, KEYFRAME_BPRED_MODE_TREE, KEYFRAME_UV_MODE_PROBS,
    KEYFRAME_UV_MODE_TREE, KEYFRAME_YMODE_PROBS, KEYFRAME_YMODE_TREE, NUM_DCT_TOKENS,
    SEGMENT_ID_TREE,
};

const SEGMENT_TREE_PROBS: [Prob; 3] = [128, 128, 128];

type BlockProbs = [[[Prob; NUM_DCT_TOKENS - 1]; 3]; 8];

/// Luma prediction of a synthesised macroblock.
#[derive(Clone, Copy, Debug)]
pub enum Luma {
    Whole(LumaMode),
    Sub([IntraMode; 16]),
}

/// One macroblock: its modes and the DC tokens it carries.
#[derive(Clone, Copy, Debug)]
pub struct Mb {
    pub luma: Luma,
    pub chroma: ChromaMode,
    pub skip: bool,
    /// Only coded when the frame has segment quantizers.
    pub segment: u8,
    /// DC token of the second-order block. Whole-block luma modes only.
    pub y2_dc: i32,
    /// DC token of each luma block. Sub-block luma modes only.
    pub y_dc: [i32; 16],
}

impl Mb {
    pub fn whole(mode: LumaMode) -> Self {
        Self {
            luma: Luma::Whole(mode),
            chroma: ChromaMode::DC,
            skip: false,
            segment: 0,
            y2_dc: 0,
            y_dc: [0; 16],
        }
    }

    pub fn sub(modes: [IntraMode; 16]) -> Self {
        Self {
            luma: Luma::Sub(modes),
            ..Self::whole(LumaMode::DC)
        }
    }

    pub fn y2_dc(mut self, token: i32) -> Self {
        self.y2_dc = token;
        self
    }

    pub fn y_dc(mut self, block: usize, token: i32) -> Self {
        self.y_dc[block] = token;
        self
    }

    pub fn segment(mut self, segment: u8) -> Self {
        self.segment = segment;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    fn has_y2(&self) -> bool {
        matches!(self.luma, Luma::Whole(_))
    }
}

/// Builds the bytes of a key frame, starting at the frame tag.
#[derive(Clone, Debug)]
pub struct KeyFrameBuilder {
    width: u16,
    height: u16,
    version: u8,
    show: bool,
    simple_filter: bool,
    filter_level: u8,
    sharpness: u8,
    partitions_log2: u8,
    q_index: u8,
    skip_prob: Option<u8>,
    /// Absolute quantizer index per segment.
    segment_quantizers: Option<[i8; 4]>,
    macroblocks: Vec<Mb>,
}

impl KeyFrameBuilder {
    /// A frame of DC-predicted macroblocks without tokens, quantizer index 0
    /// and the loop filter off.
    pub fn new(width: u16, height: u16) -> Self {
        let count = usize::from(width.div_ceil(16)) * usize::from(height.div_ceil(16));
        Self {
            width,
            height,
            version: 0,
            show: true,
            simple_filter: false,
            filter_level: 0,
            sharpness: 0,
            partitions_log2: 0,
            q_index: 0,
            skip_prob: None,
            segment_quantizers: None,
            macroblocks: vec![Mb::whole(LumaMode::DC); count],
        }
    }

    pub fn mb_width(&self) -> usize {
        usize::from(self.width.div_ceil(16))
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    pub fn filter(mut self, simple: bool, level: u8, sharpness: u8) -> Self {
        self.simple_filter = simple;
        self.filter_level = level;
        self.sharpness = sharpness;
        self
    }

    pub fn partitions_log2(mut self, log2: u8) -> Self {
        self.partitions_log2 = log2;
        self
    }

    pub fn q_index(mut self, q: u8) -> Self {
        self.q_index = q;
        self
    }

    pub fn skip_prob(mut self, prob: u8) -> Self {
        self.skip_prob = Some(prob);
        self
    }

    pub fn segment_quantizers(mut self, quantizers: [i8; 4]) -> Self {
        self.segment_quantizers = Some(quantizers);
        self
    }

    pub fn mb(mut self, mbx: usize, mby: usize, mb: Mb) -> Self {
        let index = mby * self.mb_width() + mbx;
        self.macroblocks[index] = mb;
        self
    }

    pub fn all_mbs(mut self, mb: Mb) -> Self {
        self.macroblocks.fill(mb);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mb_width = self.mb_width();
        let num_partitions = 1usize << self.partitions_log2;

        let mut first = BoolWriter::new();
        self.write_header(&mut first);

        let mut partitions: Vec<BoolWriter> = (0..num_partitions).map(|_| BoolWriter::new()).collect();
        let mut top_modes = vec![[IntraMode::DC; 4]; mb_width];
        let mut top_nz = vec![[0u8; 9]; mb_width];

        for (mby, row) in self.macroblocks.chunks(mb_width).enumerate() {
            let mut left_modes = [IntraMode::DC; 4];
            let mut left_nz = [0u8; 9];
            let tokens = &mut partitions[mby % num_partitions];

            for (mbx, mb) in row.iter().enumerate() {
                assert!(!mb.skip || self.skip_prob.is_some(), "skipping needs a skip probability");
                if self.segment_quantizers.is_some() {
                    first.write_tree(&SEGMENT_ID_TREE, &SEGMENT_TREE_PROBS, mb.segment as i8);
                }
                write_modes(&mut first, mb, self.skip_prob, &mut top_modes[mbx], &mut left_modes);
                write_residuals(tokens, mb, &mut top_nz[mbx], &mut left_nz);
            }
        }

        let first = first.finish();
        let partitions: Vec<Vec<u8>> = partitions.into_iter().map(BoolWriter::finish).collect();

        let tag = (first.len() as u32) << 5 | u32::from(self.show) << 4 | u32::from(self.version) << 1;
        let mut data = tag.to_le_bytes()[..3].to_vec();
        data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
        data.extend_from_slice(&self.width.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&first);
        for part in &partitions[..num_partitions - 1] {
            data.extend_from_slice(&(part.len() as u32).to_le_bytes()[..3]);
        }
        for part in &partitions {
            data.extend_from_slice(part);
        }
        data
    }

    fn write_header(&self, w: &mut BoolWriter) {
        w.write_literal(1, 0); // color space
        w.write_literal(1, 0); // clamping type
        w.write_flag(self.segment_quantizers.is_some());
        if let Some(quantizers) = self.segment_quantizers {
            w.write_flag(true); // update map
            w.write_flag(true); // update data
            w.write_flag(true); // absolute values
            for q in quantizers {
                w.write_optional_signed(7, Some(i32::from(q)));
            }
            for _ in 0..4 {
                w.write_optional_signed(6, None);
            }
            for p in SEGMENT_TREE_PROBS {
                w.write_flag(true);
                w.write_literal(8, u32::from(p));
            }
        }
        w.write_flag(self.simple_filter);
        w.write_literal(6, u32::from(self.filter_level));
        w.write_literal(3, u32::from(self.sharpness));
        w.write_flag(false); // loop filter deltas
        w.write_literal(2, u32::from(self.partitions_log2));
        w.write_literal(7, u32::from(self.q_index));
        for _ in 0..5 {
            w.write_optional_signed(4, None);
        }
        w.write_flag(false); // refresh entropy probs

        for &p in COEFF_UPDATE_PROBS.iter().flatten().flatten().flatten() {
            w.write_bool(false, p);
        }

        w.write_flag(self.skip_prob.is_some());
        if let Some(prob) = self.skip_prob {
            w.write_literal(8, u32::from(prob));
        }
    }
}

fn implied_sub_mode(mode: LumaMode) -> IntraMode {
    match mode {
        LumaMode::DC | LumaMode::B => IntraMode::DC,
        LumaMode::V => IntraMode::VE,
        LumaMode::H => IntraMode::HE,
        LumaMode::TM => IntraMode::TM,
    }
}

fn write_modes(
    w: &mut BoolWriter,
    mb: &Mb,
    skip_prob: Option<u8>,
    top: &mut [IntraMode; 4],
    left: &mut [IntraMode; 4],
) {
    if let Some(prob) = skip_prob {
        w.write_bool(mb.skip, prob);
    }

    match mb.luma {
        Luma::Whole(mode) => {
            w.write_tree(&KEYFRAME_YMODE_TREE, &KEYFRAME_YMODE_PROBS, mode as i8);
            let implied = implied_sub_mode(mode);
            *top = [implied; 4];
            *left = [implied; 4];
        }
        Luma::Sub(modes) => {
            w.write_tree(&KEYFRAME_YMODE_TREE, &KEYFRAME_YMODE_PROBS, LumaMode::B as i8);
            for y in 0..4 {
                for x in 0..4 {
                    let mode = modes[x + y * 4];
                    let probs = &KEYFRAME_BPRED_MODE_PROBS[top[x] as usize][left[y] as usize];
                    w.write_tree(&KEYFRAME_BPRED_MODE_TREE, probs, mode as i8);
                    top[x] = mode;
                    left[y] = mode;
                }
            }
        }
    }

    w.write_tree(&KEYFRAME_UV_MODE_TREE, &KEYFRAME_UV_MODE_PROBS, mb.chroma as i8);
}

fn write_residuals(w: &mut BoolWriter, mb: &Mb, top: &mut [u8; 9], left: &mut [u8; 9]) {
    let has_y2 = mb.has_y2();

    if mb.skip {
        let first = usize::from(!has_y2);
        top[first..].fill(0);
        left[first..].fill(0);
        return;
    }

    let (luma_probs, first) = if has_y2 {
        let nz = write_block(w, &COEFF_PROBS[1], 0, top[0] + left[0], mb.y2_dc);
        top[0] = nz;
        left[0] = nz;
        (&COEFF_PROBS[0], 1)
    } else {
        (&COEFF_PROBS[3], 0)
    };

    for y in 0..4 {
        for x in 0..4 {
            let dc = if has_y2 { 0 } else { mb.y_dc[x + y * 4] };
            let nz = write_block(w, luma_probs, first, top[x + 1] + left[y + 1], dc);
            top[x + 1] = nz;
            left[y + 1] = nz;
        }
    }

    for j in [5usize, 7] {
        for y in 0..2 {
            for x in 0..2 {
                let nz = write_block(w, &COEFF_PROBS[2], 0, top[x + j] + left[y + j], 0);
                top[x + j] = nz;
                left[y + j] = nz;
            }
        }
    }
}

/// Writes a block holding at most one token, at scan position `first`.
/// Returns the non-zero context it leaves behind.
fn write_block(w: &mut BoolWriter, probs: &BlockProbs, first: usize, ctx: u8, token: i32) -> u8 {
    let p = &probs[usize::from(COEFF_BANDS[first])][usize::from(ctx)];
    if token == 0 {
        w.write_bool(false, p[0]);
        return 0;
    }

    w.write_bool(true, p[0]);
    w.write_bool(true, p[1]);
    let magnitude = token.unsigned_abs();
    match magnitude {
        1 => w.write_bool(false, p[2]),
        2 => {
            w.write_bool(true, p[2]);
            w.write_bool(false, p[3]);
            w.write_bool(false, p[4]);
        }
        3 | 4 => {
            w.write_bool(true, p[2]);
            w.write_bool(false, p[3]);
            w.write_bool(true, p[4]);
            w.write_bool(magnitude == 4, p[5]);
        }
        _ => panic!("token {token} is out of range"),
    }
    w.write_flag(token < 0);

    let next = first + 1;
    let next_ctx = if magnitude == 1 { 1 } else { 2 };
    w.write_bool(false, probs[usize::from(COEFF_BANDS[next])][next_ctx][0]);
    1
}

/// Asserts that every pixel of a `width` wide plane inside the given
/// rectangle equals `value`.
pub fn assert_region(plane: &[u8], width: usize, x: core::ops::Range<usize>, y: core::ops::Range<usize>, value: u8) {
    for row in y {
        for col in x.clone() {
            assert_eq!(plane[row * width + col], value, "pixel ({col}, {row})");
        }
    }
}
