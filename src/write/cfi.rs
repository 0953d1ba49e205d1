//! Building and serializing frame tables.

use indexmap::IndexSet;

use crate::common::Register;
use crate::constants;
use crate::write::{CfiDirective, Error, Result, Writer};

/// Opaque expression bytecode for a CFA rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression(pub Vec<u8>);

/// The identifier of a defaults record within a [`FrameTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultsId(usize);

/// A table of frame records to be serialized as a section.
#[derive(Debug, Default)]
pub struct FrameTable {
    /// Defaults records, deduplicated and kept in insertion order so that
    /// rebuilding the same table produces byte-identical output.
    defaults: IndexSet<CommonDefaults>,
    /// Function records and the defaults record each one references.
    functions: Vec<(DefaultsId, FunctionProgram)>,
}

impl FrameTable {
    /// Add a defaults record.
    ///
    /// If the same record has already been added, its existing id is
    /// returned instead of storing a duplicate.
    pub fn add_defaults(&mut self, defaults: CommonDefaults) -> DefaultsId {
        let (index, _) = self.defaults.insert_full(defaults);
        DefaultsId(index)
    }

    /// The number of distinct defaults records in this table.
    pub fn defaults_count(&self) -> usize {
        self.defaults.len()
    }

    /// Add a function record.
    ///
    /// # Panics
    ///
    /// Panics if the defaults id is not from this table.
    pub fn add_function(&mut self, defaults: DefaultsId, function: FunctionProgram) {
        debug_assert!(defaults.0 < self.defaults.len());
        self.functions.push((defaults, function));
    }

    /// Build a table from one shared defaults record and a set of function
    /// programs, hoisting the longest run of leading offset-zero
    /// instructions shared by every program into the defaults record's
    /// initial program and stripping it from each function.
    pub fn factor(defaults: CommonDefaults, functions: Vec<FunctionProgram>) -> FrameTable {
        let mut defaults = defaults;
        let shared = shared_initial_run(&functions);
        if shared > 0 {
            for (_, instruction) in &functions[0].instructions[..shared] {
                defaults.initial_instructions.push(instruction.clone());
            }
            #[cfg(feature = "log")]
            log::debug!(
                "hoisted {} shared instructions into the defaults record",
                shared
            );
        }

        let mut table = FrameTable::default();
        let id = table.add_defaults(defaults);
        for mut function in functions {
            function.instructions.drain(..shared);
            table.add_function(id, function);
        }
        table
    }

    /// Serialize this table.
    ///
    /// Defaults records are emitted at the point of first reference, in
    /// insertion order, so repeated writes of the same table are
    /// byte-identical.
    pub fn write<W: Writer>(&self, w: &mut W) -> Result<()> {
        let mut defaults_offsets = vec![None; self.defaults.len()];
        for (id, function) in &self.functions {
            let defaults_offset = match defaults_offsets[id.0] {
                Some(offset) => offset,
                None => {
                    // Only write defaults records as they are referenced.
                    // The id is in range by construction.
                    let defaults = self.defaults.get_index(id.0).unwrap();
                    let offset = w.len();
                    defaults.write(w)?;
                    defaults_offsets[id.0] = Some(offset);
                    offset
                }
            };

            let defaults = self.defaults.get_index(id.0).unwrap();
            function.write(w, defaults_offset, defaults)?;
        }
        Ok(())
    }
}

/// The length of the longest run of leading offset-zero instructions that
/// every function shares.
fn shared_initial_run(functions: &[FunctionProgram]) -> usize {
    let first = match functions.first() {
        Some(first) => first,
        None => return 0,
    };
    let mut shared = first
        .instructions
        .iter()
        .take_while(|(offset, instruction)| *offset == 0 && instruction.valid_as_initial())
        .count();
    for function in &functions[1..] {
        shared = function
            .instructions
            .iter()
            .take_while(|(offset, _)| *offset == 0)
            .zip(&first.instructions[..shared])
            .take_while(|(a, b)| *a == *b)
            .count();
    }
    shared
}

/// A defaults record under construction: the alignment factors, the
/// return-address column, and the initial rule program shared by every
/// function that references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommonDefaults {
    address_size: u8,
    // Kept private so the non-zero check in `new` cannot be bypassed; the
    // factored encodings divide by these.
    code_alignment_factor: u8,
    data_alignment_factor: i8,
    return_address_register: Register,
    initial_instructions: Vec<FrameInstruction>,
}

impl CommonDefaults {
    /// Construct a new defaults record.
    ///
    /// # Panics
    ///
    /// Panics if either alignment factor is zero.
    pub fn new(
        address_size: u8,
        code_alignment_factor: u8,
        data_alignment_factor: i8,
        return_address_register: Register,
    ) -> CommonDefaults {
        assert_ne!(code_alignment_factor, 0);
        assert_ne!(data_alignment_factor, 0);
        CommonDefaults {
            address_size,
            code_alignment_factor,
            data_alignment_factor,
            return_address_register,
            initial_instructions: Vec::new(),
        }
    }

    /// The size of a target address, in bytes.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// The factor all code advance deltas are scaled by.
    pub fn code_alignment_factor(&self) -> u8 {
        self.code_alignment_factor
    }

    /// The factor all data offsets are scaled by.
    pub fn data_alignment_factor(&self) -> i8 {
        self.data_alignment_factor
    }

    /// The register column used to recover the parent frame's instruction
    /// pointer.
    pub fn return_address_register(&self) -> Register {
        self.return_address_register
    }

    /// Append an instruction to the initial rule program.
    pub fn add_instruction(&mut self, instruction: FrameInstruction) {
        self.initial_instructions.push(instruction);
    }

    /// Serialize this record.
    fn write<W: Writer>(&self, w: &mut W) -> Result<()> {
        let length_offset = w.len();
        w.write_u32(0)?;
        let start = w.len();

        w.write_u32(constants::DEFAULTS_ID)?;
        w.write_u8(constants::FRAME_VERSION)?;
        // Empty augmentation.
        w.write_u8(0)?;
        w.write_u8(self.address_size)?;
        // Segment selector size.
        w.write_u8(0)?;
        w.write_uleb128(self.code_alignment_factor.into())?;
        w.write_sleb128(self.data_alignment_factor.into())?;
        w.write_uleb128(self.return_address_register.0.into())?;

        for instruction in &self.initial_instructions {
            instruction.write(w, self)?;
        }

        write_nop(w, length_offset, self.address_size)?;
        patch_length(w, length_offset, start)
    }
}

/// A function record under construction: one function's rule program,
/// relative to a defaults record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionProgram {
    address: u64,
    length: u32,
    instructions: Vec<(u32, FrameInstruction)>,
}

impl FunctionProgram {
    /// Construct a new function record for the code starting at `address`
    /// and covering `length` bytes.
    pub fn new(address: u64, length: u32) -> FunctionProgram {
        FunctionProgram {
            address,
            length,
            instructions: Vec::new(),
        }
    }

    /// The address of the first instruction this record covers.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The number of code bytes this record covers.
    pub fn len(&self) -> u32 {
        self.length
    }

    /// Return true if this record covers no code bytes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Append an instruction that takes effect `offset` code bytes into the
    /// function.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is smaller than the offset of the previous
    /// instruction.
    pub fn add_instruction(&mut self, offset: u32, instruction: FrameInstruction) {
        debug_assert!(self.instructions.last().map_or(0, |x| x.0) <= offset);
        self.instructions.push((offset, instruction));
    }

    /// Serialize this record.
    fn write<W: Writer>(
        &self,
        w: &mut W,
        defaults_offset: usize,
        defaults: &CommonDefaults,
    ) -> Result<()> {
        if defaults_offset > u32::MAX as usize {
            return Err(Error::ValueTooLarge);
        }

        let length_offset = w.len();
        w.write_u32(0)?;
        let start = w.len();

        w.write_u32(defaults_offset as u32)?;
        w.write_address(self.address, defaults.address_size)?;
        w.write_address(self.length.into(), defaults.address_size)?;

        let mut prev_offset = 0;
        for (offset, instruction) in &self.instructions {
            write_advance_loc(w, defaults.code_alignment_factor, prev_offset, *offset)?;
            prev_offset = *offset;
            instruction.write(w, defaults)?;
        }

        write_nop(w, length_offset, defaults.address_size)?;
        patch_length(w, length_offset, start)
    }
}

/// An instruction in a rule program under construction.
///
/// Offsets here are unfactored byte values; factoring by the alignment
/// factors happens during serialization, and fails if a value is not a
/// multiple of its factor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameInstruction {
    /// Set the CFA rule to register + offset.
    Cfa(Register, i32),
    /// Replace only the base register of the current CFA rule.
    CfaRegister(Register),
    /// Replace only the offset of the current CFA rule.
    CfaOffset(i32),
    /// Set the CFA rule to expression bytecode.
    CfaExpression(Expression),
    /// Revert the register to its rule from the defaults' initial program.
    Restore(Register),
    /// Mark the register's caller value as unrecoverable.
    Undefined(Register),
    /// Mark the register as unmodified from the caller's frame.
    SameValue(Register),
    /// Record the register as saved at CFA + offset.
    Offset(Register, i32),
    /// Record the register's caller value as held in another register.
    Register(Register, Register),
    /// Push the current rule state onto the state stack.
    RememberState,
    /// Pop the state stack into the current rule state.
    RestoreState,
}

impl FrameInstruction {
    /// Serialize this instruction, factoring its offsets by the given
    /// record's alignment factors.
    fn write<W: Writer>(&self, w: &mut W, defaults: &CommonDefaults) -> Result<()> {
        match *self {
            FrameInstruction::Cfa(register, offset) => {
                if offset < 0 {
                    let factored =
                        factored_data_offset(offset.into(), defaults.data_alignment_factor)?;
                    w.write_u8(constants::DW_CFA_def_cfa_sf.0)?;
                    w.write_uleb128(register.0.into())?;
                    w.write_sleb128(factored)?;
                } else {
                    // Unfactored.
                    w.write_u8(constants::DW_CFA_def_cfa.0)?;
                    w.write_uleb128(register.0.into())?;
                    w.write_uleb128(offset as u64)?;
                }
            }
            FrameInstruction::CfaRegister(register) => {
                w.write_u8(constants::DW_CFA_def_cfa_register.0)?;
                w.write_uleb128(register.0.into())?;
            }
            FrameInstruction::CfaOffset(offset) => {
                if offset < 0 {
                    let factored =
                        factored_data_offset(offset.into(), defaults.data_alignment_factor)?;
                    w.write_u8(constants::DW_CFA_def_cfa_offset_sf.0)?;
                    w.write_sleb128(factored)?;
                } else {
                    // Unfactored.
                    w.write_u8(constants::DW_CFA_def_cfa_offset.0)?;
                    w.write_uleb128(offset as u64)?;
                }
            }
            FrameInstruction::CfaExpression(ref expression) => {
                w.write_u8(constants::DW_CFA_def_cfa_expression.0)?;
                w.write_uleb128(expression.0.len() as u64)?;
                w.write(&expression.0)?;
            }
            FrameInstruction::Restore(register) => {
                if register.0 < 0x40 {
                    w.write_u8(constants::DW_CFA_restore.0 | register.0 as u8)?;
                } else {
                    w.write_u8(constants::DW_CFA_restore_extended.0)?;
                    w.write_uleb128(register.0.into())?;
                }
            }
            FrameInstruction::Undefined(register) => {
                w.write_u8(constants::DW_CFA_undefined.0)?;
                w.write_uleb128(register.0.into())?;
            }
            FrameInstruction::SameValue(register) => {
                w.write_u8(constants::DW_CFA_same_value.0)?;
                w.write_uleb128(register.0.into())?;
            }
            FrameInstruction::Offset(register, offset) => {
                let factored =
                    factored_data_offset(offset.into(), defaults.data_alignment_factor)?;
                if factored < 0 {
                    w.write_u8(constants::DW_CFA_offset_extended_sf.0)?;
                    w.write_uleb128(register.0.into())?;
                    w.write_sleb128(factored)?;
                } else if register.0 < 0x40 {
                    w.write_u8(constants::DW_CFA_offset.0 | register.0 as u8)?;
                    w.write_uleb128(factored as u64)?;
                } else {
                    w.write_u8(constants::DW_CFA_offset_extended.0)?;
                    w.write_uleb128(register.0.into())?;
                    w.write_uleb128(factored as u64)?;
                }
            }
            FrameInstruction::Register(register, src_register) => {
                w.write_u8(constants::DW_CFA_register.0)?;
                w.write_uleb128(register.0.into())?;
                w.write_uleb128(src_register.0.into())?;
            }
            FrameInstruction::RememberState => {
                w.write_u8(constants::DW_CFA_remember_state.0)?;
            }
            FrameInstruction::RestoreState => {
                w.write_u8(constants::DW_CFA_restore_state.0)?;
            }
        }
        Ok(())
    }

    /// Return true if this instruction may appear in a defaults record's
    /// initial program.
    ///
    /// `Restore` reverts to the initial program and the state stack does
    /// not exist yet while the initial program runs, so neither may be
    /// hoisted there.
    fn valid_as_initial(&self) -> bool {
        !matches!(
            *self,
            FrameInstruction::Restore(_)
                | FrameInstruction::RememberState
                | FrameInstruction::RestoreState
        )
    }
}

/// Patch the record's length field now that the record body is complete.
fn patch_length<W: Writer>(w: &mut W, length_offset: usize, start: usize) -> Result<()> {
    let length = w.len() - start;
    if length as u64 >= 0xffff_fff0 {
        return Err(Error::ValueTooLarge);
    }
    w.write_u32_at(length_offset, length as u32)
}

/// Pad the record with nops until its total size, length field included, is
/// a multiple of the address size.
fn write_nop<W: Writer>(w: &mut W, record_start: usize, address_size: u8) -> Result<()> {
    while (w.len() - record_start) % usize::from(address_size) != 0 {
        w.write_u8(constants::DW_CFA_nop.0)?;
    }
    Ok(())
}

/// Emit the smallest advance encoding for the given code delta.
fn write_advance_loc<W: Writer>(
    w: &mut W,
    code_alignment_factor: u8,
    prev_offset: u32,
    offset: u32,
) -> Result<()> {
    if offset == prev_offset {
        return Ok(());
    }
    let delta = factored_code_delta(code_alignment_factor, offset - prev_offset)?;
    if delta < 0x40 {
        w.write_u8(constants::DW_CFA_advance_loc.0 | delta as u8)?;
    } else if delta < 0x100 {
        w.write_u8(constants::DW_CFA_advance_loc1.0)?;
        w.write_u8(delta as u8)?;
    } else if delta < 0x1_0000 {
        w.write_u8(constants::DW_CFA_advance_loc2.0)?;
        w.write_u16(delta as u16)?;
    } else {
        w.write_u8(constants::DW_CFA_advance_loc4.0)?;
        w.write_u32(delta)?;
    }
    Ok(())
}

fn factored_code_delta(code_alignment_factor: u8, delta: u32) -> Result<u32> {
    let factor = u32::from(code_alignment_factor);
    if delta % factor == 0 {
        Ok(delta / factor)
    } else {
        Err(Error::InvalidCodeOffset(delta))
    }
}

fn factored_data_offset(offset: i64, data_alignment_factor: i8) -> Result<i64> {
    let factor = i64::from(data_alignment_factor);
    if offset % factor == 0 {
        Ok(offset / factor)
    } else {
        Err(Error::InvalidDataOffset(offset))
    }
}

/// The rule for recovering one register's caller value, as tracked while
/// authoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRule {
    /// The caller value is unrecoverable.
    Undefined,
    /// The register was not modified.
    SameValue,
    /// The caller value is saved at CFA + offset.
    Offset(i32),
    /// The caller value is held in another register.
    Register(Register),
}

/// The CFA rule as tracked while authoring.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackedCfa {
    /// No CFA rule has been established yet.
    Unset,
    /// Register + offset.
    RegisterAndOffset(Register, i32),
    /// Expression bytecode.
    Expression(Expression),
}

/// Tracks one function's rule state while it is being authored, emitting a
/// minimal instruction program.
///
/// Construction opens the function's table; authoring events arrive through
/// [`event`](RuleTracker::event) (one directive at a time, mirroring a
/// `.cfi_*` stream) or [`rules_at`](RuleTracker::rules_at) (the desired
/// whole state at an offset, diffed against the tracked state). The two
/// surfaces may be mixed. [`end`](RuleTracker::end) closes the table and
/// [`into_program`](RuleTracker::into_program) yields the finished record.
#[derive(Debug, Clone)]
pub struct RuleTracker {
    defaults: CommonDefaults,
    start_address: u64,
    initial_cfa: TrackedCfa,
    initial_rules: Vec<(Register, RegisterRule)>,
    cfa: TrackedCfa,
    rules: Vec<(Register, RegisterRule)>,
    stack: Vec<(TrackedCfa, Vec<(Register, RegisterRule)>)>,
    last_offset: u32,
    last_state_offset: Option<u32>,
    instructions: Vec<(u32, FrameInstruction)>,
    end_offset: Option<u32>,
}

impl RuleTracker {
    /// Open a table for the function starting at `start_address`, with the
    /// rule state established by the defaults record's initial program.
    pub fn new(defaults: &CommonDefaults, start_address: u64) -> RuleTracker {
        let mut initial_cfa = TrackedCfa::Unset;
        let mut initial_rules = Vec::new();
        for instruction in &defaults.initial_instructions {
            match *instruction {
                FrameInstruction::Cfa(register, offset) => {
                    initial_cfa = TrackedCfa::RegisterAndOffset(register, offset);
                }
                FrameInstruction::CfaRegister(register) => {
                    if let TrackedCfa::RegisterAndOffset(_, offset) = initial_cfa {
                        initial_cfa = TrackedCfa::RegisterAndOffset(register, offset);
                    }
                }
                FrameInstruction::CfaOffset(offset) => {
                    if let TrackedCfa::RegisterAndOffset(register, _) = initial_cfa {
                        initial_cfa = TrackedCfa::RegisterAndOffset(register, offset);
                    }
                }
                FrameInstruction::CfaExpression(ref expression) => {
                    initial_cfa = TrackedCfa::Expression(expression.clone());
                }
                FrameInstruction::Undefined(register) => {
                    set_tracked(&mut initial_rules, register, RegisterRule::Undefined);
                }
                FrameInstruction::SameValue(register) => {
                    set_tracked(&mut initial_rules, register, RegisterRule::SameValue);
                }
                FrameInstruction::Offset(register, offset) => {
                    set_tracked(&mut initial_rules, register, RegisterRule::Offset(offset));
                }
                FrameInstruction::Register(register, src) => {
                    set_tracked(&mut initial_rules, register, RegisterRule::Register(src));
                }
                FrameInstruction::Restore(_)
                | FrameInstruction::RememberState
                | FrameInstruction::RestoreState => {}
            }
        }

        RuleTracker {
            defaults: defaults.clone(),
            start_address,
            cfa: initial_cfa.clone(),
            rules: initial_rules.clone(),
            initial_cfa,
            initial_rules,
            stack: Vec::new(),
            last_offset: 0,
            last_state_offset: None,
            instructions: Vec::new(),
            end_offset: None,
        }
    }

    /// The address this function's table starts at.
    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    /// Apply one authoring directive at `offset` code bytes into the
    /// function.
    ///
    /// Offsets must not decrease across events; multiple directives may
    /// share an offset. Each directive is lowered to the cheapest
    /// instruction that produces the desired state, or to nothing at all if
    /// the state is unchanged.
    pub fn event(&mut self, offset: u32, directive: &CfiDirective) -> Result<()> {
        if self.end_offset.is_some() || offset < self.last_offset {
            return Err(Error::OutOfOrderEvent);
        }
        self.last_offset = offset;

        match *directive {
            CfiDirective::StartProc => Ok(()),
            CfiDirective::EndProc => self.end(offset),
            CfiDirective::DefCfa { register, offset: o } => self.set_cfa(offset, register, o),
            CfiDirective::DefCfaOffset { offset: o } => {
                let (register, _) = self.cfa_register_and_offset()?;
                self.set_cfa(offset, register, o)
            }
            CfiDirective::DefCfaRegister { register } => {
                let (_, o) = self.cfa_register_and_offset()?;
                self.set_cfa(offset, register, o)
            }
            CfiDirective::AdjustCfaOffset { delta } => {
                let (register, o) = self.cfa_register_and_offset()?;
                let o = o.checked_add(delta).ok_or(Error::ValueTooLarge)?;
                self.set_cfa(offset, register, o)
            }
            CfiDirective::Offset { register, offset: o } => {
                self.set_rule(offset, register, RegisterRule::Offset(o))
            }
            CfiDirective::RegisterIn {
                register,
                in_register,
            } => self.set_rule(offset, register, RegisterRule::Register(in_register)),
            CfiDirective::Undefined { register } => {
                self.set_rule(offset, register, RegisterRule::Undefined)
            }
            CfiDirective::SameValue { register } => {
                self.set_rule(offset, register, RegisterRule::SameValue)
            }
            CfiDirective::Restore { register } => {
                let rule = tracked(&self.initial_rules, register);
                self.set_rule(offset, register, rule)
            }
            CfiDirective::RememberState => {
                self.stack.push((self.cfa.clone(), self.rules.clone()));
                self.instructions
                    .push((offset, FrameInstruction::RememberState));
                Ok(())
            }
            CfiDirective::RestoreState => {
                let (cfa, rules) = self.stack.pop().ok_or(Error::RestoreWithoutRemember)?;
                self.cfa = cfa;
                self.rules = rules;
                self.instructions
                    .push((offset, FrameInstruction::RestoreState));
                Ok(())
            }
        }
    }

    /// Record the desired whole rule state at `offset` code bytes into the
    /// function.
    ///
    /// Offsets must strictly increase across whole-state events; a second
    /// whole-state event at the same offset is a conflict. The tracked
    /// state is diffed against the desired one and only the difference is
    /// emitted. Registers absent from `rules` revert to undefined, via
    /// `Restore` when that matches the defaults' rule.
    pub fn rules_at(
        &mut self,
        offset: u32,
        cfa: (Register, i32),
        rules: &[(Register, RegisterRule)],
    ) -> Result<()> {
        if self.last_state_offset == Some(offset) {
            return Err(Error::ConflictingRuleAtSameOffset);
        }
        if self.end_offset.is_some() || offset < self.last_offset {
            return Err(Error::OutOfOrderEvent);
        }
        self.last_offset = offset;
        self.last_state_offset = Some(offset);

        self.set_cfa(offset, cfa.0, cfa.1)?;

        let dropped: Vec<Register> = self
            .rules
            .iter()
            .chain(&self.initial_rules)
            .map(|&(register, _)| register)
            .filter(|&register| {
                tracked(&self.rules, register) != RegisterRule::Undefined
                    && !rules.iter().any(|&(r, _)| r == register)
            })
            .collect();
        for register in dropped {
            self.set_rule(offset, register, RegisterRule::Undefined)?;
        }
        for &(register, rule) in rules {
            self.set_rule(offset, register, rule)?;
        }
        Ok(())
    }

    /// Close the table at `offset` code bytes into the function, recording
    /// the function's byte length.
    pub fn end(&mut self, offset: u32) -> Result<()> {
        if self.end_offset.is_some() || offset < self.last_offset {
            return Err(Error::OutOfOrderEvent);
        }
        self.end_offset = Some(offset);
        Ok(())
    }

    /// Convert into the finished function record.
    ///
    /// Fails with `UnterminatedProgram` if the table was never closed.
    pub fn into_program(self) -> Result<FunctionProgram> {
        let length = self.end_offset.ok_or(Error::UnterminatedProgram)?;
        Ok(FunctionProgram {
            address: self.start_address,
            length,
            instructions: self.instructions,
        })
    }

    fn cfa_register_and_offset(&self) -> Result<(Register, i32)> {
        match self.cfa {
            TrackedCfa::RegisterAndOffset(register, offset) => Ok((register, offset)),
            _ => Err(Error::InvalidCfaContext),
        }
    }

    /// Move the CFA rule to register + offset, emitting the cheapest
    /// instruction that gets there.
    fn set_cfa(&mut self, at: u32, register: Register, offset: i32) -> Result<()> {
        let instruction = match self.cfa {
            TrackedCfa::RegisterAndOffset(r, o) if r == register && o == offset => return Ok(()),
            TrackedCfa::RegisterAndOffset(r, _) if r == register => {
                FrameInstruction::CfaOffset(offset)
            }
            TrackedCfa::RegisterAndOffset(_, o) if o == offset => {
                FrameInstruction::CfaRegister(register)
            }
            _ => FrameInstruction::Cfa(register, offset),
        };
        self.cfa = TrackedCfa::RegisterAndOffset(register, offset);
        self.instructions.push((at, instruction));
        Ok(())
    }

    /// Move one register to the given rule, emitting the cheapest
    /// instruction that gets there.
    fn set_rule(&mut self, at: u32, register: Register, rule: RegisterRule) -> Result<()> {
        if tracked(&self.rules, register) == rule {
            return Ok(());
        }
        let instruction = if rule == tracked(&self.initial_rules, register) {
            FrameInstruction::Restore(register)
        } else {
            match rule {
                RegisterRule::Undefined => FrameInstruction::Undefined(register),
                RegisterRule::SameValue => FrameInstruction::SameValue(register),
                RegisterRule::Offset(offset) => FrameInstruction::Offset(register, offset),
                RegisterRule::Register(src) => FrameInstruction::Register(register, src),
            }
        };
        set_tracked(&mut self.rules, register, rule);
        self.instructions.push((at, instruction));
        Ok(())
    }
}

/// The tracked rule for a register; absent means undefined.
fn tracked(rules: &[(Register, RegisterRule)], register: Register) -> RegisterRule {
    rules
        .iter()
        .find(|&&(r, _)| r == register)
        .map_or(RegisterRule::Undefined, |&(_, rule)| rule)
}

fn set_tracked(rules: &mut Vec<(Register, RegisterRule)>, register: Register, rule: RegisterRule) {
    match rules.iter_mut().find(|(r, _)| *r == register) {
        Some(entry) => entry.1 = rule,
        None => rules.push((register, rule)),
    }
}
