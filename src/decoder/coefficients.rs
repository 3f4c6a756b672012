//! DCT token decoding (RFC 6386, section 13).
//!
//! Each 4x4 block is a run of tokens in zigzag order, each token decoded
//! with probabilities picked by block type, coefficient band and a context
//! describing the previous token. Tokens come out dequantised.

use super::bit_reader::BoolReader;
use super::quant::Dequant;
use crate::common::types::*;

/// Block type, the first index of the token probabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum Plane {
    /// Luma blocks whose DC comes from the second-order block.
    YCoeff1 = 0,
    /// The second-order block of luma DCs.
    Y2 = 1,
    /// Chroma blocks.
    Chroma = 2,
    /// Luma blocks with their own DC, in B_PRED macroblocks.
    YCoeff0 = 3,
}

/// Reads one block's tokens into `output` (natural order, dequantised),
/// starting at scan position `first` with context `complexity`.
///
/// Returns whether anything but an immediate end-of-block was read, which is
/// the context the next block to the right and below will see.
pub(crate) fn read_coefficients(
    reader: &mut BoolReader<'_>,
    output: &mut [i32; 16],
    probs: &[[[Prob; NUM_DCT_TOKENS - 1]; 3]; 8],
    first: usize,
    complexity: usize,
    dq: (i16, i16),
) -> bool {
    debug_assert!(complexity <= 2);
    let (dcq, acq) = dq;

    let mut n = first;
    let mut prob = &probs[usize::from(COEFF_BANDS[n])][complexity];

    while n < 16 {
        // end of block
        if !reader.read_bool(prob[0]) {
            break;
        }

        // zero runs do not allow an end of block to follow
        while !reader.read_bool(prob[1]) {
            n += 1;
            if n == 16 {
                return true;
            }
            prob = &probs[usize::from(COEFF_BANDS[n])][0];
        }

        let v: i32;
        let next_ctx: usize;

        if !reader.read_bool(prob[2]) {
            v = 1;
            next_ctx = 1;
        } else {
            if !reader.read_bool(prob[3]) {
                if !reader.read_bool(prob[4]) {
                    v = 2;
                } else {
                    v = 3 + reader.read_bit(prob[5]);
                }
            } else {
                let cat = if !reader.read_bool(prob[6]) {
                    usize::from(reader.read_bool(prob[7]))
                } else {
                    let bit1 = reader.read_bit(prob[8]);
                    let bit0 = reader.read_bit(prob[9 + bit1 as usize]);
                    2 + (2 * bit1 + bit0) as usize
                };

                let mut extra = 0i32;
                for &p in PROB_DCT_CAT[cat].iter().take_while(|&&p| p != 0) {
                    extra = extra + extra + reader.read_bit(p);
                }
                v = i32::from(DCT_CAT_BASE[cat]) + extra;
            }
            next_ctx = 2;
        }

        let signed_v = if reader.read_flag() { -v } else { v };

        let zigzag = usize::from(ZIGZAG[n]);
        let q = if zigzag > 0 { acq } else { dcq };
        output[zigzag] = signed_v * i32::from(q);

        n += 1;
        if n < 16 {
            prob = &probs[usize::from(COEFF_BANDS[n])][next_ctx];
        }
    }

    n > first
}

/// Coefficients of one macroblock, dequantised, before any inverse transform.
#[derive(Clone)]
pub(crate) struct MacroblockCoefficients {
    /// Second-order block. All zero unless the luma mode is whole-block.
    pub y2: [i32; 16],
    /// 16 luma blocks, then 4 U and 4 V, each in raster order.
    pub blocks: [[i32; 16]; 24],
    /// Whether any luma or chroma block held a token.
    pub has_tokens: bool,
}

impl Default for MacroblockCoefficients {
    fn default() -> Self {
        Self {
            y2: [0; 16],
            blocks: [[0; 16]; 24],
            has_tokens: false,
        }
    }
}

/// Reads every block of a macroblock that is not skipped.
///
/// `top` and `left` hold the non-zero flags along the macroblock's upper and
/// left edges, laid out as `y2, y, y, y, y, u, u, v, v`, and are updated
/// for the macroblocks that follow.
pub(crate) fn read_macroblock_coefficients(
    reader: &mut BoolReader<'_>,
    probs: &TokenProbTables,
    dq: &Dequant,
    has_y2: bool,
    top: &mut [u8; 9],
    left: &mut [u8; 9],
) -> MacroblockCoefficients {
    let mut coeffs = MacroblockCoefficients::default();

    let plane = if has_y2 {
        let complexity = top[0] + left[0];
        let nz = read_coefficients(
            reader,
            &mut coeffs.y2,
            &probs[Plane::Y2 as usize],
            0,
            usize::from(complexity),
            (dq.y2dc, dq.y2ac),
        );
        top[0] = u8::from(nz);
        left[0] = u8::from(nz);
        Plane::YCoeff1
    } else {
        Plane::YCoeff0
    };

    let first = if plane == Plane::YCoeff1 { 1 } else { 0 };
    for y in 0usize..4 {
        let mut left_ctx = left[y + 1];
        for x in 0usize..4 {
            let complexity = top[x + 1] + left_ctx;
            let nz = read_coefficients(
                reader,
                &mut coeffs.blocks[x + y * 4],
                &probs[plane as usize],
                first,
                usize::from(complexity),
                (dq.ydc, dq.yac),
            );
            coeffs.has_tokens |= nz;
            left_ctx = u8::from(nz);
            top[x + 1] = u8::from(nz);
        }
        left[y + 1] = left_ctx;
    }

    // U contexts sit at 5..7, V at 7..9
    for (j, base) in [(5usize, 16usize), (7, 20)] {
        for y in 0usize..2 {
            let mut left_ctx = left[y + j];
            for x in 0usize..2 {
                let complexity = top[x + j] + left_ctx;
                let nz = read_coefficients(
                    reader,
                    &mut coeffs.blocks[base + x + y * 2],
                    &probs[Plane::Chroma as usize],
                    0,
                    usize::from(complexity),
                    (dq.uvdc, dq.uvac),
                );
                coeffs.has_tokens |= nz;
                left_ctx = u8::from(nz);
                top[x + j] = u8::from(nz);
            }
            left[y + j] = left_ctx;
        }
    }

    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::bool_writer::BoolWriter;

    const DQ: (i16, i16) = (1, 1);

    /// Writes `values` (scan order, trailing zeros trimmed) as tokens.
    fn write_block(
        w: &mut BoolWriter,
        probs: &[[[Prob; NUM_DCT_TOKENS - 1]; 3]; 8],
        first: usize,
        complexity: usize,
        values: &[i32],
    ) {
        let mut ctx = complexity;
        let mut skip_eob = false;
        for (n, &v) in values.iter().enumerate().skip(first) {
            let p = &probs[usize::from(COEFF_BANDS[n])][ctx];
            let token = match v.unsigned_abs() {
                0 => DCT_0,
                1 => DCT_1,
                2 => DCT_2,
                3 => DCT_3,
                4 => DCT_4,
                5..=6 => DCT_CAT1,
                7..=10 => DCT_CAT2,
                11..=18 => DCT_CAT3,
                19..=34 => DCT_CAT4,
                35..=66 => DCT_CAT5,
                _ => DCT_CAT6,
            };
            if skip_eob {
                // the end-of-block branch is implied after a zero
                write_tree_from(w, p, token, 2);
            } else {
                write_tree_from(w, p, token, 0);
            }
            if token >= DCT_CAT1 {
                let cat = (token - DCT_CAT1) as usize;
                let extra = v.unsigned_abs() - u32::from(DCT_CAT_BASE[cat]);
                let bits: Vec<u8> = PROB_DCT_CAT[cat]
                    .iter()
                    .copied()
                    .take_while(|&p| p != 0)
                    .collect();
                for (i, &p) in bits.iter().enumerate() {
                    let shift = bits.len() - 1 - i;
                    w.write_bool((extra >> shift) & 1 != 0, p);
                }
            }
            if v != 0 {
                w.write_flag(v < 0);
            }
            skip_eob = v == 0;
            ctx = match v.unsigned_abs() {
                0 => 0,
                1 => 1,
                _ => 2,
            };
        }
        if values.len() < 16 {
            let p = &probs[usize::from(COEFF_BANDS[values.len().max(first)])][ctx];
            w.write_bool(false, p[0]);
        }
    }

    fn write_tree_from(w: &mut BoolWriter, p: &[Prob; 11], token: i8, start: usize) {
        let mut path = Vec::new();
        let mut index = DCT_TOKEN_TREE.iter().position(|&t| t == -token).unwrap();
        loop {
            let node = index & !1;
            path.push((index & 1 == 1, p[node / 2]));
            if node == start {
                break;
            }
            index = DCT_TOKEN_TREE
                .iter()
                .position(|&t| t > 0 && t as usize == node)
                .unwrap();
        }
        for &(bit, prob) in path.iter().rev() {
            w.write_bool(bit, prob);
        }
    }

    fn decode(values: &[i32], plane: Plane, first: usize, complexity: usize) -> ([i32; 16], bool) {
        let probs = &COEFF_PROBS[plane as usize];
        let mut w = BoolWriter::new();
        write_block(&mut w, probs, first, complexity, values);
        let bytes = w.finish();

        let mut out = [0i32; 16];
        let mut reader = BoolReader::new(&bytes);
        let nz = read_coefficients(&mut reader, &mut out, probs, first, complexity, DQ);
        (out, nz)
    }

    fn natural_order(scan: &[i32]) -> [i32; 16] {
        let mut out = [0i32; 16];
        for (n, &v) in scan.iter().enumerate() {
            out[usize::from(ZIGZAG[n])] = v;
        }
        out
    }

    #[test]
    fn test_empty_block() {
        let (out, nz) = decode(&[], Plane::Chroma, 0, 0);
        assert_eq!(out, [0; 16]);
        assert!(!nz);
    }

    #[test]
    fn test_all_token_sizes() {
        let scan = [-1, 2, 0, 0, 3, -4, 6, 10, -18, 34, 66, -67, 2048, 0, 1, -1];
        let (out, nz) = decode(&scan, Plane::YCoeff0, 0, 0);
        assert!(nz);
        assert_eq!(out, natural_order(&scan));
    }

    #[test]
    fn test_first_position_one_keeps_dc() {
        let scan = [0, 5, 0, -7];
        let (out, nz) = decode(&scan, Plane::YCoeff1, 1, 2);
        assert!(nz);
        assert_eq!(out, natural_order(&scan));
        assert_eq!(out[0], 0);
    }

    #[test]
    fn test_trailing_zero_run_reaches_end() {
        let mut scan = [0i32; 16];
        scan[0] = 9;
        // zeros through position 15 with no end-of-block
        let probs = &COEFF_PROBS[Plane::Y2 as usize];
        let mut w = BoolWriter::new();
        write_block(&mut w, probs, 0, 1, &scan);
        let bytes = w.finish();
        let mut out = [0i32; 16];
        let nz = read_coefficients(&mut BoolReader::new(&bytes), &mut out, probs, 0, 1, DQ);
        assert!(nz);
        assert_eq!(out, natural_order(&scan));
    }

    #[test]
    fn test_dequantisation() {
        let scan = [3, -2];
        let probs = &COEFF_PROBS[Plane::Chroma as usize];
        let mut w = BoolWriter::new();
        write_block(&mut w, probs, 0, 0, &scan);
        let bytes = w.finish();
        let mut out = [0i32; 16];
        read_coefficients(&mut BoolReader::new(&bytes), &mut out, probs, 0, 0, (10, 7));
        assert_eq!(out[0], 30);
        assert_eq!(out[1], -14);
        assert!(out[2..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_macroblock_contexts() {
        let dq = Dequant {
            ydc: 1,
            yac: 1,
            y2dc: 1,
            y2ac: 1,
            uvdc: 1,
            uvac: 1,
        };
        let mut top = [0u8; 9];
        let mut left = [0u8; 9];
        top[1] = 1;

        // Mirror the reader's context bookkeeping while writing.
        let mut w = BoolWriter::new();
        write_block(&mut w, &COEFF_PROBS[Plane::Y2 as usize], 0, 0, &[4]);
        let mut wtop = top;
        let mut wleft = left;
        for y in 0..4 {
            for x in 0..4 {
                let values: &[i32] = if x == y { &[0, 1] } else { &[] };
                let ctx = usize::from(wtop[x + 1] + wleft[y + 1]);
                write_block(&mut w, &COEFF_PROBS[Plane::YCoeff1 as usize], 1, ctx, values);
                let nz = u8::from(!values.is_empty());
                wtop[x + 1] = nz;
                wleft[y + 1] = nz;
            }
        }
        for _ in 0..8 {
            write_block(&mut w, &COEFF_PROBS[Plane::Chroma as usize], 0, 0, &[]);
        }
        let bytes = w.finish();

        let coeffs = read_macroblock_coefficients(
            &mut BoolReader::new(&bytes),
            &COEFF_PROBS,
            &dq,
            true,
            &mut top,
            &mut left,
        );
        assert_eq!(coeffs.y2[0], 4);
        assert!(coeffs.has_tokens);
        for i in 0..16 {
            let expected = if i % 5 == 0 { 1 } else { 0 };
            assert_eq!(coeffs.blocks[i][1], expected, "block {i}");
            assert_eq!(coeffs.blocks[i][0], 0);
        }
        assert_eq!(top, [1, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(left, [1, 0, 0, 0, 1, 0, 0, 0, 0]);
    }
}
