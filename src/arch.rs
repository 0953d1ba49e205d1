//! Architecture-specific register numbering tables.
//!
//! Each architecture defines a disjoint numbering for its registers and a
//! fixed return-address column. These numbers are what the persisted tables
//! encode; the name tables here exist only for display.

use crate::common::Register;

macro_rules! registers {
    ($struct_name:ident, $name:literal, $ra:ident, { $($register:ident = ($val:expr, $disp:expr)),+ $(,)? }) => {
        #[doc = concat!("Register mapping for ", $name, ".")]
        #[derive(Debug, Clone, Copy)]
        pub struct $struct_name;

        impl $struct_name {
            $(
                #[allow(missing_docs)]
                pub const $register: Register = Register($val);
            )+

            /// The return-address column for this architecture.
            pub const RETURN_ADDRESS: Register = Self::$ra;

            /// Look up the display name for a register number.
            pub fn register_name(register: Register) -> Option<&'static str> {
                match register {
                    $(
                        Self::$register => Some($disp),
                    )+
                    _ => None,
                }
            }

            /// Look up a register number by its display name.
            pub fn name_to_register(name: &str) -> Option<Register> {
                match name {
                    $(
                        $disp => Some(Self::$register),
                    )+
                    _ => None,
                }
            }
        }
    };
}

registers!(X86_64, "x86-64", RA, {
    RAX = (0, "rax"),
    RDX = (1, "rdx"),
    RCX = (2, "rcx"),
    RBX = (3, "rbx"),
    RSI = (4, "rsi"),
    RDI = (5, "rdi"),
    RBP = (6, "rbp"),
    RSP = (7, "rsp"),
    R8 = (8, "r8"),
    R9 = (9, "r9"),
    R10 = (10, "r10"),
    R11 = (11, "r11"),
    R12 = (12, "r12"),
    R13 = (13, "r13"),
    R14 = (14, "r14"),
    R15 = (15, "r15"),
    RA = (16, "RA"),
});

registers!(AArch64, "AArch64", X30, {
    X0 = (0, "x0"),
    X1 = (1, "x1"),
    X2 = (2, "x2"),
    X3 = (3, "x3"),
    X4 = (4, "x4"),
    X5 = (5, "x5"),
    X6 = (6, "x6"),
    X7 = (7, "x7"),
    X8 = (8, "x8"),
    X9 = (9, "x9"),
    X10 = (10, "x10"),
    X11 = (11, "x11"),
    X12 = (12, "x12"),
    X13 = (13, "x13"),
    X14 = (14, "x14"),
    X15 = (15, "x15"),
    X16 = (16, "x16"),
    X17 = (17, "x17"),
    X18 = (18, "x18"),
    X19 = (19, "x19"),
    X20 = (20, "x20"),
    X21 = (21, "x21"),
    X22 = (22, "x22"),
    X23 = (23, "x23"),
    X24 = (24, "x24"),
    X25 = (25, "x25"),
    X26 = (26, "x26"),
    X27 = (27, "x27"),
    X28 = (28, "x28"),
    X29 = (29, "x29"),
    X30 = (30, "x30"),
    SP = (31, "sp"),
});
