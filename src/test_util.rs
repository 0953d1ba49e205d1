//! Extensions to `test_assembler` for building frame table sections.

use test_assembler::Section;

pub trait SectionMethods {
    fn uleb(self, val: u64) -> Self;
    fn sleb(self, val: i64) -> Self;
}

impl SectionMethods for Section {
    fn uleb(mut self, mut val: u64) -> Self {
        loop {
            let mut byte = (val & 0x7f) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80;
            }
            self = self.D8(byte);
            if val == 0 {
                return self;
            }
        }
    }

    fn sleb(mut self, mut val: i64) -> Self {
        loop {
            let mut byte = (val & 0x7f) as u8;
            val >>= 7;
            let done = (val == 0 && byte & 0x40 == 0) || (val == -1 && byte & 0x40 != 0);
            if !done {
                byte |= 0x80;
            }
            self = self.D8(byte);
            if done {
                return self;
            }
        }
    }
}
