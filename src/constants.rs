//! Constant definitions for the persisted table encoding.
//!
//! Call frame instruction opcodes are represented as `struct DwCfa(u8)`,
//! with an exported const definition for each opcode. The opcode values are
//! the DWARF `DW_CFA_*` values so that tables produced here are bit-exact
//! with what existing debuggers and profilers consume.

#![allow(non_upper_case_globals)]
#![allow(missing_docs)]

use core::fmt;

// The `dw!` macro turns this:
//
//     dw!(DwFoo(u8) {
//         DW_FOO_bar = 0,
//         DW_FOO_baz = 1,
//     });
//
// into a newtype struct with one exported const per name and a `Display`
// impl that prints the name when known.
macro_rules! dw {
    ($struct_name:ident($struct_type:ty) { $($name:ident = $val:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $struct_name(pub $struct_type);

        $(
            pub const $name: $struct_name = $struct_name($val);
        )+

        impl fmt::Display for $struct_name {
            fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
                match *self {
                    $(
                        $name => write!(f, stringify!($name)),
                    )+
                    otherwise => write!(f, "Unknown {}: {}",
                                        stringify!($struct_name),
                                        otherwise.0),
                }
            }
        }
    };
}

dw!(DwCfa(u8) {
    // Primary opcodes: the operand lives in the low 6 bits.
    DW_CFA_advance_loc = 0x40,
    DW_CFA_offset = 0x80,
    DW_CFA_restore = 0xc0,

    // Extended opcodes: operands follow as LEB128 or fixed-width values.
    DW_CFA_nop = 0x00,
    DW_CFA_advance_loc1 = 0x02,
    DW_CFA_advance_loc2 = 0x03,
    DW_CFA_advance_loc4 = 0x04,
    DW_CFA_offset_extended = 0x05,
    DW_CFA_restore_extended = 0x06,
    DW_CFA_undefined = 0x07,
    DW_CFA_same_value = 0x08,
    DW_CFA_register = 0x09,
    DW_CFA_remember_state = 0x0a,
    DW_CFA_restore_state = 0x0b,
    DW_CFA_def_cfa = 0x0c,
    DW_CFA_def_cfa_register = 0x0d,
    DW_CFA_def_cfa_offset = 0x0e,
    DW_CFA_def_cfa_expression = 0x0f,
    DW_CFA_expression = 0x10,
    DW_CFA_offset_extended_sf = 0x11,
    DW_CFA_def_cfa_sf = 0x12,
    DW_CFA_def_cfa_offset_sf = 0x13,
});

/// The mask that selects a primary opcode from an instruction byte.
pub const CFI_PRIMARY_OPCODE_MASK: u8 = 0b1100_0000;
/// The mask that selects a primary opcode's embedded operand.
pub const CFI_PRIMARY_OPERAND_MASK: u8 = 0b0011_1111;

/// The distinguished id value that marks a record as a common-defaults
/// record rather than a function record.
pub const DEFAULTS_ID: u32 = 0xffff_ffff;

/// The table format version this crate reads and writes.
pub const FRAME_VERSION: u8 = 4;
