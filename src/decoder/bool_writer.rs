// Boolean entropy encoder used to synthesise bitstreams in tests.
//
// Self-contained so the integration tests can include it with `#[path]`.

use alloc::vec::Vec;

pub(crate) struct BoolWriter {
    /// the entropy values that have been encoded so far
    writer: Vec<u8>,
    /// value of the current bytes being encoded
    bottom: u32,
    /// the range for the next bit, must be between 128 and 255 inclusive
    range: u32,
    /// number of bits left before the top byte of `bottom` is complete
    bit_num: i32,
}

#[allow(dead_code)]
impl BoolWriter {
    pub(crate) fn new() -> Self {
        Self {
            writer: Vec::new(),
            bottom: 0,
            range: 255,
            bit_num: 24,
        }
    }

    // Carry into already written bytes, 0xff rolls over to the byte before.
    fn add_one_to_output(&mut self) {
        let mut i = self.writer.len();
        while i > 0 {
            i -= 1;
            if self.writer[i] < 255 {
                self.writer[i] += 1;
                return;
            }
            self.writer[i] = 0;
        }
        self.writer.insert(0, 1);
    }

    pub(crate) fn write_bool(&mut self, bit: bool, prob: u8) {
        let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);

        if bit {
            self.bottom += split;
            self.range -= split;
        } else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;

            if self.bottom & (1 << 31) != 0 {
                self.add_one_to_output();
            }
            self.bottom <<= 1;

            self.bit_num -= 1;
            if self.bit_num == 0 {
                self.writer.push((self.bottom >> 24) as u8);
                self.bottom &= (1 << 24) - 1;
                self.bit_num = 8;
            }
        }
    }

    pub(crate) fn write_flag(&mut self, flag: bool) {
        self.write_bool(flag, 128);
    }

    pub(crate) fn write_literal(&mut self, bits: u8, value: u32) {
        for bit in (0..bits).rev() {
            self.write_flag((value >> bit) & 1 != 0);
        }
    }

    /// Magnitude, then a sign flag that is set for negative values.
    pub(crate) fn write_signed(&mut self, bits: u8, value: i32) {
        self.write_literal(bits, value.unsigned_abs());
        self.write_flag(value < 0);
    }

    pub(crate) fn write_optional_signed(&mut self, bits: u8, value: Option<i32>) {
        self.write_flag(value.is_some());
        if let Some(value) = value {
            self.write_signed(bits, value);
        }
    }

    /// Writes the branch decisions leading to leaf `value` of `tree`.
    pub(crate) fn write_tree(&mut self, tree: &[i8], probs: &[u8], value: i8) {
        assert_eq!(tree.len(), probs.len() * 2);
        let mut index = tree
            .iter()
            .position(|&t| t == -value)
            .unwrap_or_else(|| panic!("{value} is not a leaf of {tree:?}"));

        let mut path = Vec::new();
        loop {
            let node = index & !1;
            path.push((index & 1 == 1, probs[node / 2]));
            if node == 0 {
                break;
            }
            index = tree
                .iter()
                .position(|&t| t > 0 && t as usize == node)
                .unwrap_or_else(|| panic!("node {node} has no parent in {tree:?}"));
        }

        for &(bit, prob) in path.iter().rev() {
            self.write_bool(bit, prob);
        }
    }

    /// Flushes the pending bits and returns the encoded bytes.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        let mut c = self.bit_num;
        let mut v = self.bottom;
        if self.bottom & (1 << (32 - self.bit_num)) != 0 {
            self.add_one_to_output();
        }
        v <<= c & 0b111;
        c = (c >> 3) - 1;
        while c >= 0 {
            v <<= 8;
            c -= 1;
        }
        c = 3;
        while c >= 0 {
            self.writer.push((v >> 24) as u8);
            v <<= 8;
            c -= 1;
        }
        self.writer
    }
}
