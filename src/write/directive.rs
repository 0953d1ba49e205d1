//! Textual authoring directives.
//!
//! Assemblers describe frame tables with `.cfi_*` directive lines; this
//! module gives [`RuleTracker`](crate::write::RuleTracker) events a textual
//! surface syntax so existing toolchain output can be consumed directly.

use std::fmt;
use std::str::FromStr;

use crate::common::Register;

/// One authoring event for a function's rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfiDirective {
    /// Open the function's table (`.cfi_startproc`).
    StartProc,
    /// Close the function's table (`.cfi_endproc`).
    EndProc,
    /// Set the CFA rule to register + offset (`.cfi_def_cfa`).
    DefCfa {
        /// The base register.
        register: Register,
        /// The offset from the base register.
        offset: i32,
    },
    /// Replace only the offset of the current CFA rule
    /// (`.cfi_def_cfa_offset`).
    DefCfaOffset {
        /// The new offset.
        offset: i32,
    },
    /// Replace only the base register of the current CFA rule
    /// (`.cfi_def_cfa_register`).
    DefCfaRegister {
        /// The new base register.
        register: Register,
    },
    /// Add a delta to the offset of the current CFA rule
    /// (`.cfi_adjust_cfa_offset`).
    AdjustCfaOffset {
        /// The delta to add.
        delta: i32,
    },
    /// Record the register as saved at CFA + offset (`.cfi_offset`).
    Offset {
        /// The saved register.
        register: Register,
        /// The offset from the CFA.
        offset: i32,
    },
    /// Record the register's caller value as held in another register
    /// (`.cfi_register`).
    RegisterIn {
        /// The saved register.
        register: Register,
        /// The register holding the caller value.
        in_register: Register,
    },
    /// Revert the register to its rule from the defaults record
    /// (`.cfi_restore`).
    Restore {
        /// The target register.
        register: Register,
    },
    /// Mark the register as unmodified from the caller's frame
    /// (`.cfi_same_value`).
    SameValue {
        /// The target register.
        register: Register,
    },
    /// Mark the register's caller value as unrecoverable
    /// (`.cfi_undefined`).
    Undefined {
        /// The target register.
        register: Register,
    },
    /// Push the current rule state onto the state stack
    /// (`.cfi_remember_state`).
    RememberState,
    /// Pop the state stack into the current rule state
    /// (`.cfi_restore_state`).
    RestoreState,
}

/// An error parsing a textual directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveParseError {
    /// The line does not start with a known `.cfi_*` directive.
    UnknownDirective(String),
    /// The directive has the wrong number of operands.
    WrongOperandCount,
    /// An operand is not a valid integer.
    BadOperand(String),
}

impl fmt::Display for DirectiveParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DirectiveParseError::UnknownDirective(ref name) => {
                write!(f, "unknown directive: {}", name)
            }
            DirectiveParseError::WrongOperandCount => {
                write!(f, "wrong number of operands for directive")
            }
            DirectiveParseError::BadOperand(ref operand) => {
                write!(f, "bad directive operand: {}", operand)
            }
        }
    }
}

impl std::error::Error for DirectiveParseError {}

impl FromStr for CfiDirective {
    type Err = DirectiveParseError;

    /// Parse a directive line such as `.cfi_def_cfa 7, 8`.
    ///
    /// Registers are given as architecture numbering table integers, the
    /// same values that get encoded on the wire.
    fn from_str(s: &str) -> Result<CfiDirective, DirectiveParseError> {
        let s = s.trim();
        let (name, rest) = match s.find(char::is_whitespace) {
            Some(at) => (&s[..at], &s[at..]),
            None => (s, ""),
        };

        let mut operands = rest.split(',').map(str::trim).filter(|s| !s.is_empty());

        let directive = match name {
            ".cfi_startproc" => CfiDirective::StartProc,
            ".cfi_endproc" => CfiDirective::EndProc,
            ".cfi_def_cfa" => {
                let register = register(&mut operands)?;
                let offset = integer(&mut operands)?;
                CfiDirective::DefCfa { register, offset }
            }
            ".cfi_def_cfa_offset" => CfiDirective::DefCfaOffset {
                offset: integer(&mut operands)?,
            },
            ".cfi_def_cfa_register" => CfiDirective::DefCfaRegister {
                register: register(&mut operands)?,
            },
            ".cfi_adjust_cfa_offset" => CfiDirective::AdjustCfaOffset {
                delta: integer(&mut operands)?,
            },
            ".cfi_offset" => {
                let register = register(&mut operands)?;
                let offset = integer(&mut operands)?;
                CfiDirective::Offset { register, offset }
            }
            ".cfi_register" => {
                let target = register(&mut operands)?;
                let in_register = register(&mut operands)?;
                CfiDirective::RegisterIn {
                    register: target,
                    in_register,
                }
            }
            ".cfi_restore" => CfiDirective::Restore {
                register: register(&mut operands)?,
            },
            ".cfi_same_value" => CfiDirective::SameValue {
                register: register(&mut operands)?,
            },
            ".cfi_undefined" => CfiDirective::Undefined {
                register: register(&mut operands)?,
            },
            ".cfi_remember_state" => CfiDirective::RememberState,
            ".cfi_restore_state" => CfiDirective::RestoreState,
            otherwise => {
                return Err(DirectiveParseError::UnknownDirective(otherwise.to_string()))
            }
        };

        if operands.next().is_some() {
            return Err(DirectiveParseError::WrongOperandCount);
        }
        Ok(directive)
    }
}

fn register<'a, I>(operands: &mut I) -> Result<Register, DirectiveParseError>
where
    I: Iterator<Item = &'a str>,
{
    let operand = operands.next().ok_or(DirectiveParseError::WrongOperandCount)?;
    operand
        .parse::<u16>()
        .map(Register)
        .map_err(|_| DirectiveParseError::BadOperand(operand.to_string()))
}

fn integer<'a, I>(operands: &mut I) -> Result<i32, DirectiveParseError>
where
    I: Iterator<Item = &'a str>,
{
    let operand = operands.next().ok_or(DirectiveParseError::WrongOperandCount)?;
    operand
        .parse::<i32>()
        .map_err(|_| DirectiveParseError::BadOperand(operand.to_string()))
}
