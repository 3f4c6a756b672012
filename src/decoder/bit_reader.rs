//! Boolean entropy decoder (RFC 6386, section 7).
//!
//! Every header field after the first ten bytes, every mode and every DCT
//! token is coded as a sequence of bools, each with its own probability.
//! The decoder here is the bit-at-a-time formulation: a 16-bit window is kept
//! in `value`, the top byte of which is compared against the split point.

use crate::common::types::Prob;

/// VP8 probability tree node, built from the `[i8]` tree tables in
/// [`crate::common::types`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct TreeNode {
    /// Left branch: a node index, or a leaf value tagged with `0x80`.
    pub left: u8,
    /// Right branch: a node index, or a leaf value tagged with `0x80`.
    pub right: u8,
    /// Probability of taking the left branch.
    pub prob: Prob,
}

impl TreeNode {
    pub(crate) const UNINIT: TreeNode = TreeNode {
        left: 0,
        right: 0,
        prob: 0,
    };

    const fn prepare_branch(t: i8) -> u8 {
        if t > 0 {
            (t as u8) / 2
        } else {
            let value = -t;
            0x80 | (value as u8)
        }
    }

    const fn value_from_branch(t: u8) -> i8 {
        (t & !0x80) as i8
    }
}

/// Pairs a tree table with its probabilities. `N` must be `2 * M`.
pub(crate) const fn tree_nodes_from<const N: usize, const M: usize>(
    tree: [i8; N],
    probs: [Prob; M],
) -> [TreeNode; M] {
    if N != 2 * M {
        panic!("invalid tree with probs");
    }
    let mut nodes = [TreeNode::UNINIT; M];
    let mut i = 0;
    while i < M {
        nodes[i].left = TreeNode::prepare_branch(tree[2 * i]);
        nodes[i].right = TreeNode::prepare_branch(tree[2 * i + 1]);
        nodes[i].prob = probs[i];
        i += 1;
    }
    nodes
}

/// Boolean entropy decoder over one partition.
///
/// Reading past the end of the partition never fails: missing bytes are
/// zero, which is how trailing padding is treated by reference decoders.
/// [`BoolReader::is_past_end`] reports whether that happened.
pub(crate) struct BoolReader<'a> {
    data: &'a [u8],
    /// Next unread byte of `data`.
    pos: usize,
    /// Coded value window. The top byte lines up with `range`.
    value: u32,
    /// Always within `128..=255` between calls.
    range: u32,
    /// Shifts since the last byte was pulled into `value`.
    bit_count: u8,
    past_end: bool,
}

impl<'a> BoolReader<'a> {
    /// Starts decoding at the first byte of `data`.
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let b0 = data.first().copied().unwrap_or(0);
        let b1 = data.get(1).copied().unwrap_or(0);
        Self {
            data,
            pos: 2,
            value: (u32::from(b0) << 8) | u32::from(b1),
            range: 255,
            bit_count: 0,
            past_end: data.len() < 2,
        }
    }

    /// Decodes one bool whose probability of being `false` is `prob / 256`.
    #[inline]
    pub(crate) fn read_bool(&mut self, prob: Prob) -> bool {
        let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);
        let big_split = split << 8;

        let bit = if self.value >= big_split {
            self.range -= split;
            self.value -= big_split;
            true
        } else {
            self.range = split;
            false
        };

        while self.range < 128 {
            self.value <<= 1;
            self.range <<= 1;
            self.bit_count += 1;

            if self.bit_count == 8 {
                self.bit_count = 0;
                match self.data.get(self.pos) {
                    Some(&byte) => self.value |= u32::from(byte),
                    None => self.note_past_end(),
                }
                self.pos += 1;
            }
        }

        bit
    }

    /// [`Self::read_bool`] as `0` or `1`, convenient for building magnitudes.
    #[inline]
    pub(crate) fn read_bit(&mut self, prob: Prob) -> i32 {
        i32::from(self.read_bool(prob))
    }

    /// A bool at even odds.
    #[inline]
    pub(crate) fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// An unsigned `n`-bit value, most significant bit first.
    pub(crate) fn read_literal(&mut self, n: u8) -> u8 {
        debug_assert!(n <= 8);
        let mut v = 0u8;
        for _ in 0..n {
            v = (v << 1) | u8::from(self.read_flag());
        }
        v
    }

    /// An `n`-bit magnitude followed by a sign flag, set meaning negative.
    pub(crate) fn read_signed_literal(&mut self, n: u8) -> i32 {
        let magnitude = i32::from(self.read_literal(n));
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// A presence flag followed, when set, by a signed literal. Absent reads as 0.
    pub(crate) fn read_optional_signed_value(&mut self, n: u8) -> i32 {
        if self.read_flag() {
            self.read_signed_literal(n)
        } else {
            0
        }
    }

    /// Walks `tree` from its root, returning the leaf value reached.
    pub(crate) fn read_with_tree(&mut self, tree: &[TreeNode]) -> i8 {
        let mut node = tree[0];
        loop {
            let branch = if self.read_bool(node.prob) {
                node.right
            } else {
                node.left
            };
            match tree.get(usize::from(branch)) {
                Some(&next) if branch & 0x80 == 0 => node = next,
                _ => return TreeNode::value_from_branch(branch),
            }
        }
    }

    /// True once a byte beyond the end of the partition has been needed.
    pub(crate) fn is_past_end(&self) -> bool {
        self.past_end
    }

    #[cfg(test)]
    pub(crate) fn range(&self) -> u32 {
        self.range
    }

    #[cold]
    fn note_past_end(&mut self) {
        if !self.past_end {
            log::debug!(
                "bool decoder ran past the end of its {} byte partition, reading zeros",
                self.data.len()
            );
            self.past_end = true;
        }
    }
}
