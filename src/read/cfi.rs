//! Decoding of persisted call frame information tables.
//!
//! A frame table is a sequence of records: *common-defaults* records that
//! hold the state shared by many functions (alignment factors, the
//! return-address column, and an initial rule program), and *function*
//! records that reference a defaults record and carry only the function's
//! divergence from it. Decoding replays a function's rule program up to a
//! target address and yields the [`RuleState`] in effect there.
//!
//! Decoding never mutates the section or the parsed records, so the same
//! table can be decoded concurrently for different addresses. The scratch
//! state lives in a caller-owned [`UnwindContext`], which allocates nothing
//! after construction; this is what makes the decode path usable from
//! restricted contexts such as signal handlers.

use arrayvec::ArrayVec;

use crate::common::{FrameSectionOffset, Register};
use crate::constants;
use crate::read::endian_slice::EndianSlice;
use crate::endianity::Endianity;
use crate::read::parser::{Error, Result};
use crate::read::reader::Reader;

/// The maximum depth of remembered rule states.
///
/// Compilers emit remember/restore pairs around shrink-wrapped epilogues and
/// rarely nest them; a small fixed stack keeps the context allocation-free.
const MAX_RULE_STACK_DEPTH: usize = 8;

/// The maximum number of simultaneously tracked register rules.
///
/// Rules are stored as `(register, rule)` pairs rather than indexed by
/// register number, because nearly all registers carry the implicit
/// `Undefined` rule at any given point.
const MAX_REGISTER_RULES: usize = 32;

/// A parsed view of a persisted frame table section.
///
/// The section bytes are borrowed, never copied; records are parsed lazily
/// as they are iterated or looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSection<R: Reader>(R);

impl<'input, Endian> FrameSection<EndianSlice<'input, Endian>>
where
    Endian: Endianity,
{
    /// Construct a new `FrameSection` from the section's raw bytes.
    ///
    /// It is the caller's responsibility to locate the section within the
    /// surrounding artifact and present it as a `&[u8]` slice.
    pub fn new(section: &'input [u8], endian: Endian) -> Self {
        Self::from(EndianSlice::new(section, endian))
    }
}

impl<R: Reader> From<R> for FrameSection<R> {
    fn from(section: R) -> Self {
        FrameSection(section)
    }
}

impl<R: Reader> FrameSection<R> {
    /// Iterate over the records in this section, in order.
    pub fn entries(&self) -> FrameEntriesIter<R> {
        FrameEntriesIter {
            section: self.clone(),
            input: self.0.clone(),
        }
    }

    /// Parse the `CommonDefaults` record at the given section offset.
    ///
    /// The offset comes from untrusted table data, so anything other than a
    /// well-formed defaults record at that offset (a function record, a
    /// mid-record offset, an offset past the end) is reported as
    /// `NoEntryAtGivenOffset`.
    pub fn defaults_from_offset(
        &self,
        offset: FrameSectionOffset,
    ) -> Result<CommonDefaults<R>> {
        let mut input = self.0.clone();
        if input.skip(offset.0).is_err() {
            return Err(Error::NoEntryAtGivenOffset);
        }
        match parse_record(self, &mut input) {
            Ok(Some(Entry::Defaults(defaults))) => Ok(defaults),
            _ => Err(Error::NoEntryAtGivenOffset),
        }
    }

    /// Find the function record covering the given address.
    ///
    /// This performs a linear scan of the section. Callers that unwind
    /// repeatedly are expected to layer their own lookup structure on top.
    pub fn function_for_address(&self, address: u64) -> Result<FunctionProgram<R>> {
        let mut entries = self.entries();
        while let Some(entry) = entries.next()? {
            if let Entry::Function(partial) = entry {
                let function = partial.parse(|offset| self.defaults_from_offset(offset))?;
                if function.contains(address) {
                    return Ok(function);
                }
            }
        }
        Err(Error::UnknownFunction)
    }

    /// Decode the rule state in effect at the given address.
    ///
    /// Convenience for `function_for_address` followed by
    /// [`FunctionProgram::rule_state_for_address`].
    pub fn rule_state_for_address(
        &self,
        ctx: &mut UnwindContext<R>,
        address: u64,
    ) -> Result<RuleState<R>> {
        let function = self.function_for_address(address)?;
        function.rule_state_for_address(ctx, address)
    }

    fn reader(&self) -> &R {
        &self.0
    }
}

/// A lazy iterator over the records of a frame section.
///
/// Can be used with `FallibleIterator` when that feature is enabled.
#[derive(Debug, Clone)]
pub struct FrameEntriesIter<R: Reader> {
    section: FrameSection<R>,
    input: R,
}

impl<R: Reader> FrameEntriesIter<R> {
    /// Advance the iterator to the next record.
    pub fn next(&mut self) -> Result<Option<Entry<R>>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        match parse_record(&self.section, &mut self.input) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.input.empty();
                Err(e)
            }
        }
    }
}

#[cfg(feature = "fallible-iterator")]
impl<R: Reader> fallible_iterator::FallibleIterator for FrameEntriesIter<R> {
    type Item = Entry<R>;
    type Error = Error;

    fn next(&mut self) -> Result<Option<Entry<R>>> {
        FrameEntriesIter::next(self)
    }
}

/// A record parsed out of a frame section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<R: Reader> {
    /// A common-defaults record.
    Defaults(CommonDefaults<R>),
    /// A function record whose defaults reference has not been resolved yet.
    Function(PartialFunctionProgram<R>),
}

fn parse_record<R: Reader>(
    section: &FrameSection<R>,
    input: &mut R,
) -> Result<Option<Entry<R>>> {
    let offset = input.offset_from(section.reader());
    let length = input.read_u32()?;
    if length == 0 {
        // A zero-length record terminates the section early.
        input.empty();
        return Ok(None);
    }
    if length >= 0xffff_fff0 {
        return Err(Error::UnknownReservedLength);
    }

    let mut rest = input.split(length as usize)?;
    let id = rest.read_u32()?;
    if id == constants::DEFAULTS_ID {
        CommonDefaults::parse_rest(offset, length as usize, rest)
            .map(|defaults| Some(Entry::Defaults(defaults)))
    } else {
        Ok(Some(Entry::Function(PartialFunctionProgram {
            offset,
            length: length as usize,
            defaults_offset: FrameSectionOffset(id as usize),
            rest,
        })))
    }
}

/// A common-defaults record: the rule state shared by every function that
/// references it.
///
/// Normally there is one of these per translation unit or ABI; its initial
/// rule program establishes the baseline every function's program diverges
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonDefaults<R: Reader> {
    offset: usize,
    length: usize,
    version: u8,
    address_size: u8,
    code_alignment_factor: u64,
    data_alignment_factor: i64,
    return_address_register: Register,
    initial_instructions: R,
}

impl<R: Reader> CommonDefaults<R> {
    fn parse_rest(offset: usize, length: usize, mut rest: R) -> Result<CommonDefaults<R>> {
        let version = rest.read_u8()?;
        if version != constants::FRAME_VERSION {
            return Err(Error::UnknownVersion(version));
        }

        let augmentation = rest.read_null_terminated_slice()?;
        if !augmentation.is_empty() {
            return Err(Error::UnknownAugmentation);
        }

        let address_size = rest.read_u8()?;
        match address_size {
            2 | 4 | 8 => {}
            otherwise => return Err(Error::UnsupportedAddressSize(otherwise)),
        }
        let segment_size = rest.read_u8()?;
        if segment_size != 0 {
            return Err(Error::UnsupportedSegmentSize(segment_size));
        }

        let code_alignment_factor = rest.read_uleb128()?;
        let data_alignment_factor = rest.read_sleb128()?;
        let return_address_register = parse_register(rest.read_uleb128()?)?;

        Ok(CommonDefaults {
            offset,
            length,
            version,
            address_size,
            code_alignment_factor,
            data_alignment_factor,
            return_address_register,
            initial_instructions: rest,
        })
    }

    /// The offset of this record within its section.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The table format version of this record.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// The size of a target address, in bytes.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// The factor all code advance deltas are scaled by.
    pub fn code_alignment_factor(&self) -> u64 {
        self.code_alignment_factor
    }

    /// The factor all data offsets are scaled by.
    pub fn data_alignment_factor(&self) -> i64 {
        self.data_alignment_factor
    }

    /// The register column used to recover the parent frame's instruction
    /// pointer.
    pub fn return_address_register(&self) -> Register {
        self.return_address_register
    }

    /// Iterate over this record's initial rule program.
    pub fn instructions(&self) -> FrameInstructionIter<R> {
        FrameInstructionIter {
            input: self.initial_instructions.clone(),
        }
    }
}

/// A function record whose defaults reference has not been resolved yet.
///
/// Resolving the reference requires re-parsing the defaults record, which
/// callers may want to cache; the split lets them supply that cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFunctionProgram<R: Reader> {
    offset: usize,
    length: usize,
    defaults_offset: FrameSectionOffset,
    rest: R,
}

impl<R: Reader> PartialFunctionProgram<R> {
    /// The section offset of the defaults record this function references.
    pub fn defaults_offset(&self) -> FrameSectionOffset {
        self.defaults_offset
    }

    /// Resolve the defaults reference and finish parsing the record.
    pub fn parse<F>(&self, get_defaults: F) -> Result<FunctionProgram<R>>
    where
        F: FnOnce(FrameSectionOffset) -> Result<CommonDefaults<R>>,
    {
        let defaults = get_defaults(self.defaults_offset)?;
        let mut rest = self.rest.clone();
        let initial_address = rest.read_address(defaults.address_size())?;
        let address_range = rest.read_address(defaults.address_size())?;
        Ok(FunctionProgram {
            offset: self.offset,
            length: self.length,
            defaults,
            initial_address,
            address_range,
            instructions: rest,
        })
    }
}

/// A function record: one function's rule program, relative to a defaults
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionProgram<R: Reader> {
    offset: usize,
    length: usize,
    defaults: CommonDefaults<R>,
    initial_address: u64,
    address_range: u64,
    instructions: R,
}

impl<R: Reader> FunctionProgram<R> {
    /// The offset of this record within its section.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The defaults record this function references.
    pub fn defaults(&self) -> &CommonDefaults<R> {
        &self.defaults
    }

    /// The address of the first instruction this record covers.
    pub fn initial_address(&self) -> u64 {
        self.initial_address
    }

    /// The number of code bytes this record covers.
    pub fn len(&self) -> u64 {
        self.address_range
    }

    /// Return true if this record covers no code bytes.
    pub fn is_empty(&self) -> bool {
        self.address_range == 0
    }

    /// Return true if the given address is within this record's range.
    pub fn contains(&self, address: u64) -> bool {
        let start = self.initial_address;
        let end = start.wrapping_add(self.address_range);
        start <= address && address < end
    }

    /// Iterate over this function's rule program.
    pub fn instructions(&self) -> FrameInstructionIter<R> {
        FrameInstructionIter {
            input: self.instructions.clone(),
        }
    }

    /// Decode the rule state in effect at `address`.
    ///
    /// Replays the defaults' initial program in full, then this function's
    /// program until the next advance would step past `address`. Returns
    /// `OffsetOutOfRange` if `address` is outside this record's range; that
    /// is a caller lookup bug, not a malformed table.
    pub fn rule_state_for_address(
        &self,
        ctx: &mut UnwindContext<R>,
        address: u64,
    ) -> Result<RuleState<R>> {
        if !self.contains(address) {
            return Err(Error::OffsetOutOfRange);
        }
        ctx.initialize(&self.defaults)?;
        let mut table = UnwindTable::new(ctx, self);
        while let Some(row) = table.next_row()? {
            if row.contains(address) {
                return Ok(row.clone());
            }
        }
        Err(Error::OffsetOutOfRange)
    }
}

fn parse_register(value: u64) -> Result<Register> {
    if value <= u64::from(u16::MAX) {
        Ok(Register(value as u16))
    } else {
        Err(Error::UnsupportedRegister(value))
    }
}

/// The canonical frame address (CFA) recovery rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfaRule<R: Reader> {
    /// The CFA is the given register's value plus an offset.
    RegisterAndOffset {
        /// The register holding the base value.
        register: Register,
        /// The offset from the base value.
        offset: i64,
    },
    /// The CFA is computed by evaluating expression bytecode.
    ///
    /// This crate treats the bytecode as opaque; evaluation is a pluggable
    /// extension point (see [`Unwinder`](crate::read::Unwinder)).
    Expression(Expression<R>),
}

impl<R: Reader> Default for CfaRule<R> {
    fn default() -> Self {
        CfaRule::RegisterAndOffset {
            register: Register(0),
            offset: 0,
        }
    }
}

/// A rule describing where a register's caller value can be recovered.
///
/// This is a closed set: new architectures add register numbers, never new
/// rule shapes, so every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRule {
    /// The register's caller value is not recoverable.
    Undefined,
    /// The register has not been modified from the caller's frame.
    SameValue,
    /// The caller value is saved at the address CFA + offset.
    Offset(i64),
    /// The caller value is held in another register.
    Register(Register),
}

impl RegisterRule {
    fn is_defined(&self) -> bool {
        !matches!(self, RegisterRule::Undefined)
    }
}

/// Expression bytecode attached to a CFA rule.
///
/// The bytes are carried through decoding untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression<R: Reader>(pub R);

// Rules are stored as a small vec of (register, rule) pairs: there are
// usually only a handful, and every absent register implicitly carries
// `Undefined`, so neither a hash map nor a register-indexed vec pays off.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegisterRuleMap {
    rules: ArrayVec<(Register, RegisterRule), MAX_REGISTER_RULES>,
}

impl RegisterRuleMap {
    pub(crate) fn get(&self, register: Register) -> RegisterRule {
        self.rules
            .iter()
            .find(|rule| rule.0 == register)
            .map(|r| {
                debug_assert!(r.1.is_defined());
                r.1
            })
            .unwrap_or(RegisterRule::Undefined)
    }

    pub(crate) fn set(&mut self, register: Register, rule: RegisterRule) -> Result<()> {
        if !rule.is_defined() {
            let idx = self.rules.iter().position(|r| r.0 == register);
            if let Some(idx) = idx {
                self.rules.swap_remove(idx);
            }
            return Ok(());
        }

        for (reg, old_rule) in &mut self.rules {
            debug_assert!(old_rule.is_defined());
            if *reg == register {
                *old_rule = rule;
                return Ok(());
            }
        }

        self.rules
            .try_push((register, rule))
            .map_err(|_| Error::TooManyRegisterRules)
    }

    fn clear(&mut self) {
        self.rules.clear();
    }

    fn iter(&self) -> RegisterRuleIter {
        RegisterRuleIter(self.rules.iter())
    }
}

impl PartialEq for RegisterRuleMap {
    fn eq(&self, rhs: &Self) -> bool {
        for (reg, rule) in &self.rules {
            debug_assert!(rule.is_defined());
            if *rule != rhs.get(*reg) {
                return false;
            }
        }
        for (reg, rhs_rule) in &rhs.rules {
            debug_assert!(rhs_rule.is_defined());
            if *rhs_rule != self.get(*reg) {
                return false;
            }
        }
        true
    }
}

impl Eq for RegisterRuleMap {}

/// An unordered iterator over defined register rules.
#[derive(Debug, Clone)]
pub struct RegisterRuleIter<'iter>(
    core::slice::Iter<'iter, (Register, RegisterRule)>,
);

impl<'iter> Iterator for RegisterRuleIter<'iter> {
    type Item = &'iter (Register, RegisterRule);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// The complete rule state valid over one address range: the CFA rule and
/// every defined register rule.
///
/// A state applies to all program counters where
/// `state.start_address() <= pc < state.end_address()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleState<R: Reader> {
    start_address: u64,
    end_address: u64,
    cfa: CfaRule<R>,
    registers: RegisterRuleMap,
}

// Not derived: `R` only appears inside `CfaRule`, which has its own
// `R`-independent default, so `R: Default` must not be required.
impl<R: Reader> Default for RuleState<R> {
    fn default() -> Self {
        RuleState {
            start_address: 0,
            end_address: 0,
            cfa: Default::default(),
            registers: Default::default(),
        }
    }
}

impl<R: Reader> RuleState<R> {
    /// The first address this state applies to.
    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    /// The first address past this state's range.
    pub fn end_address(&self) -> u64 {
        self.end_address
    }

    /// Return true if the given address falls within this state's range.
    pub fn contains(&self, address: u64) -> bool {
        self.start_address <= address && address < self.end_address
    }

    /// The CFA recovery rule for this state.
    pub fn cfa(&self) -> &CfaRule<R> {
        &self.cfa
    }

    /// The recovery rule for the given register.
    ///
    /// Registers with no recorded rule are `Undefined`.
    pub fn register(&self, register: Register) -> RegisterRule {
        self.registers.get(register)
    }

    /// Iterate over all defined `(register, rule)` pairs, in no particular
    /// order.
    pub fn registers(&self) -> RegisterRuleIter {
        self.registers.iter()
    }
}

/// Reusable scratch state for decoding rule programs.
///
/// Constructing a context is the only allocation decoding performs; one
/// context can be reused across any number of decodes. A context is
/// exclusively borrowed for the duration of a decode, so using a separate
/// context per thread makes concurrent decoding of shared tables safe.
#[derive(Debug, Clone)]
pub struct UnwindContext<R: Reader> {
    // The state stack for remember/restore. The last entry is the row the
    // table is currently building; there is always at least one entry.
    stack: ArrayVec<RuleState<R>, MAX_RULE_STACK_DEPTH>,
    // Register rules as they stand after the defaults' initial program,
    // consulted by restore instructions.
    initial_rules: RegisterRuleMap,
    is_initialized: bool,
}

impl<R: Reader> Default for UnwindContext<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Reader> UnwindContext<R> {
    /// Construct a new, empty context.
    pub fn new() -> UnwindContext<R> {
        let mut stack = ArrayVec::new();
        stack.push(RuleState::default());
        UnwindContext {
            stack,
            initial_rules: Default::default(),
            is_initialized: false,
        }
    }

    /// Replay a defaults record's initial program and latch the resulting
    /// rules as the baseline for restore instructions.
    fn initialize(&mut self, defaults: &CommonDefaults<R>) -> Result<()> {
        self.reset();
        {
            let mut table = UnwindTable::new_for_defaults(self, defaults);
            while table.next_row()?.is_some() {}
        }
        self.initial_rules = self.row().registers.clone();
        self.is_initialized = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(RuleState::default());
        self.initial_rules.clear();
        self.is_initialized = false;
    }

    fn row(&self) -> &RuleState<R> {
        self.stack.last().expect("stack is never empty")
    }

    fn row_mut(&mut self) -> &mut RuleState<R> {
        self.stack.last_mut().expect("stack is never empty")
    }

    fn start_address(&self) -> u64 {
        self.row().start_address
    }

    fn set_start_address(&mut self, address: u64) {
        self.row_mut().start_address = address;
    }

    fn set_cfa(&mut self, cfa: CfaRule<R>) {
        self.row_mut().cfa = cfa;
    }

    fn cfa_mut(&mut self) -> &mut CfaRule<R> {
        &mut self.row_mut().cfa
    }

    fn set_register_rule(&mut self, register: Register, rule: RegisterRule) -> Result<()> {
        self.row_mut().registers.set(register, rule)
    }

    fn get_initial_rule(&self, register: Register) -> RegisterRule {
        self.initial_rules.get(register)
    }

    fn push_row(&mut self) -> Result<()> {
        let new_row = self.row().clone();
        self.stack
            .try_push(new_row)
            .map_err(|_| Error::StateStackOverflow)
    }

    fn pop_row(&mut self) -> Result<()> {
        if self.stack.len() == 1 {
            return Err(Error::PopWithEmptyStack);
        }
        self.stack.pop();
        Ok(())
    }
}

/// An iterator over the rows of a rule table, produced by replaying a rule
/// program.
///
/// Most callers want [`FunctionProgram::rule_state_for_address`] instead;
/// this type is exposed for consumers that want every row, such as dump
/// tools.
#[derive(Debug)]
pub struct UnwindTable<'ctx, R: Reader> {
    code_alignment_factor: u64,
    data_alignment_factor: i64,
    next_start_address: u64,
    end_address: u64,
    returned_last_row: bool,
    is_function: bool,
    instructions: FrameInstructionIter<R>,
    ctx: &'ctx mut UnwindContext<R>,
}

impl<'ctx, R: Reader> UnwindTable<'ctx, R> {
    /// Construct a table over the given function's rule program.
    ///
    /// The context must have been initialized for the function's defaults
    /// record, which [`FunctionProgram::rule_state_for_address`] does
    /// automatically.
    pub fn new(
        ctx: &'ctx mut UnwindContext<R>,
        function: &FunctionProgram<R>,
    ) -> UnwindTable<'ctx, R> {
        assert!(ctx.is_initialized);
        UnwindTable {
            code_alignment_factor: function.defaults.code_alignment_factor,
            data_alignment_factor: function.defaults.data_alignment_factor,
            next_start_address: function.initial_address,
            end_address: function.initial_address.wrapping_add(function.address_range),
            returned_last_row: false,
            is_function: true,
            instructions: function.instructions(),
            ctx,
        }
    }

    fn new_for_defaults(
        ctx: &'ctx mut UnwindContext<R>,
        defaults: &CommonDefaults<R>,
    ) -> UnwindTable<'ctx, R> {
        UnwindTable {
            code_alignment_factor: defaults.code_alignment_factor,
            data_alignment_factor: defaults.data_alignment_factor,
            next_start_address: 0,
            end_address: 0,
            returned_last_row: false,
            is_function: false,
            instructions: defaults.instructions(),
            ctx,
        }
    }

    /// Evaluate instructions until the next row of the table is complete,
    /// and return it.
    ///
    /// The borrow of the yielded row ends at the next call, so this cannot
    /// be a `FallibleIterator`.
    pub fn next_row(&mut self) -> Result<Option<&RuleState<R>>> {
        self.ctx.set_start_address(self.next_start_address);

        loop {
            match self.instructions.next() {
                Err(e) => return Err(e),

                Ok(None) => {
                    if self.returned_last_row {
                        return Ok(None);
                    }
                    let row = self.ctx.row_mut();
                    row.end_address = self.end_address;
                    self.returned_last_row = true;
                    return Ok(Some(self.ctx.row()));
                }

                Ok(Some(instruction)) => {
                    if self.evaluate(instruction)? {
                        return Ok(Some(self.ctx.row()));
                    }
                }
            }
        }
    }

    /// Evaluate one instruction. Return `Ok(true)` if the current row is
    /// complete.
    fn evaluate(&mut self, instruction: FrameInstruction<R>) -> Result<bool> {
        use FrameInstruction::*;

        match instruction {
            // Advancing the address completes the current row.
            AdvanceLoc { delta } => {
                let delta = u64::from(delta)
                    .checked_mul(self.code_alignment_factor)
                    .ok_or(Error::InvalidAddressRange)?;
                self.next_start_address = self
                    .ctx
                    .start_address()
                    .checked_add(delta)
                    .ok_or(Error::InvalidAddressRange)?;
                self.ctx.row_mut().end_address = self.next_start_address;
                return Ok(true);
            }

            // CFA rule changes.
            DefCfa { register, offset } => {
                self.ctx.set_cfa(CfaRule::RegisterAndOffset {
                    register,
                    offset: offset as i64,
                });
            }
            DefCfaSf {
                register,
                factored_offset,
            } => {
                self.ctx.set_cfa(CfaRule::RegisterAndOffset {
                    register,
                    offset: factored_offset * self.data_alignment_factor,
                });
            }
            DefCfaRegister { register } => {
                if let CfaRule::RegisterAndOffset {
                    register: ref mut reg,
                    ..
                } = *self.ctx.cfa_mut()
                {
                    *reg = register;
                } else {
                    return Err(Error::CfiInstructionInInvalidContext);
                }
            }
            DefCfaOffset { offset } => {
                if let CfaRule::RegisterAndOffset {
                    offset: ref mut off,
                    ..
                } = *self.ctx.cfa_mut()
                {
                    *off = offset as i64;
                } else {
                    return Err(Error::CfiInstructionInInvalidContext);
                }
            }
            DefCfaOffsetSf { factored_offset } => {
                if let CfaRule::RegisterAndOffset {
                    offset: ref mut off,
                    ..
                } = *self.ctx.cfa_mut()
                {
                    *off = factored_offset * self.data_alignment_factor;
                } else {
                    return Err(Error::CfiInstructionInInvalidContext);
                }
            }
            DefCfaExpression { expression } => {
                self.ctx.set_cfa(CfaRule::Expression(expression));
            }

            // Register rule changes.
            Undefined { register } => {
                self.ctx.set_register_rule(register, RegisterRule::Undefined)?;
            }
            SameValue { register } => {
                self.ctx.set_register_rule(register, RegisterRule::SameValue)?;
            }
            Offset {
                register,
                factored_offset,
            } => {
                let offset = factored_offset as i64 * self.data_alignment_factor;
                self.ctx
                    .set_register_rule(register, RegisterRule::Offset(offset))?;
            }
            OffsetSf {
                register,
                factored_offset,
            } => {
                let offset = factored_offset * self.data_alignment_factor;
                self.ctx
                    .set_register_rule(register, RegisterRule::Offset(offset))?;
            }
            Register {
                dest_register,
                src_register,
            } => {
                self.ctx
                    .set_register_rule(dest_register, RegisterRule::Register(src_register))?;
            }
            Restore { register } => {
                if !self.is_function {
                    // A restore inside the initial program has no baseline
                    // to restore from.
                    return Err(Error::CfiInstructionInInvalidContext);
                }
                let initial_rule = self.ctx.get_initial_rule(register);
                self.ctx.set_register_rule(register, initial_rule)?;
            }

            // State stack.
            RememberState => {
                self.ctx.push_row()?;
            }
            RestoreState => {
                // Pop state while preserving the current location.
                let start_address = self.ctx.start_address();
                self.ctx.pop_row()?;
                self.ctx.set_start_address(start_address);
            }

            Nop => {}
        }

        Ok(false)
    }
}

/// A single decoded rule program instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameInstruction<R: Reader> {
    /// Skip `delta * code_alignment_factor` code bytes before the following
    /// instructions take effect.
    AdvanceLoc {
        /// The factored advance delta.
        delta: u32,
    },
    /// Set the CFA rule to register + offset.
    DefCfa {
        /// The base register.
        register: Register,
        /// The unfactored, non-negative offset.
        offset: u64,
    },
    /// Set the CFA rule to register + factored signed offset.
    DefCfaSf {
        /// The base register.
        register: Register,
        /// The factored offset.
        factored_offset: i64,
    },
    /// Replace only the base register of the current CFA rule.
    DefCfaRegister {
        /// The new base register.
        register: Register,
    },
    /// Replace only the offset of the current CFA rule.
    DefCfaOffset {
        /// The unfactored, non-negative offset.
        offset: u64,
    },
    /// Replace only the offset of the current CFA rule, signed and factored.
    DefCfaOffsetSf {
        /// The factored offset.
        factored_offset: i64,
    },
    /// Set the CFA rule to expression bytecode.
    DefCfaExpression {
        /// The opaque bytecode.
        expression: Expression<R>,
    },
    /// Mark the register's caller value as unrecoverable.
    Undefined {
        /// The target register.
        register: Register,
    },
    /// Mark the register as unmodified from the caller's frame.
    SameValue {
        /// The target register.
        register: Register,
    },
    /// Record the register as saved at CFA + factored offset.
    Offset {
        /// The target register.
        register: Register,
        /// The factored offset.
        factored_offset: u64,
    },
    /// Record the register as saved at CFA + factored signed offset.
    OffsetSf {
        /// The target register.
        register: Register,
        /// The factored offset.
        factored_offset: i64,
    },
    /// Record the register's caller value as held in another register.
    Register {
        /// The target register.
        dest_register: Register,
        /// The register holding the caller value.
        src_register: Register,
    },
    /// Revert the register to its rule from the defaults' initial program.
    Restore {
        /// The target register.
        register: Register,
    },
    /// Push the current rule state onto the state stack.
    RememberState,
    /// Pop the state stack into the current rule state.
    RestoreState,
    /// Padding; has no effect.
    Nop,
}

impl<R: Reader> FrameInstruction<R> {
    fn parse(input: &mut R) -> Result<FrameInstruction<R>> {
        let instruction = input.read_u8()?;
        let high_bits = instruction & constants::CFI_PRIMARY_OPCODE_MASK;

        if high_bits == constants::DW_CFA_advance_loc.0 {
            let delta = instruction & constants::CFI_PRIMARY_OPERAND_MASK;
            return Ok(FrameInstruction::AdvanceLoc {
                delta: u32::from(delta),
            });
        }
        if high_bits == constants::DW_CFA_offset.0 {
            let register = Register(u16::from(instruction & constants::CFI_PRIMARY_OPERAND_MASK));
            let factored_offset = input.read_uleb128()?;
            return Ok(FrameInstruction::Offset {
                register,
                factored_offset,
            });
        }
        if high_bits == constants::DW_CFA_restore.0 {
            let register = Register(u16::from(instruction & constants::CFI_PRIMARY_OPERAND_MASK));
            return Ok(FrameInstruction::Restore { register });
        }

        debug_assert_eq!(high_bits, 0);
        match constants::DwCfa(instruction) {
            constants::DW_CFA_nop => Ok(FrameInstruction::Nop),
            constants::DW_CFA_advance_loc1 => {
                let delta = input.read_u8()?;
                Ok(FrameInstruction::AdvanceLoc {
                    delta: u32::from(delta),
                })
            }
            constants::DW_CFA_advance_loc2 => {
                let delta = input.read_u16()?;
                Ok(FrameInstruction::AdvanceLoc {
                    delta: u32::from(delta),
                })
            }
            constants::DW_CFA_advance_loc4 => {
                let delta = input.read_u32()?;
                Ok(FrameInstruction::AdvanceLoc { delta })
            }
            constants::DW_CFA_offset_extended => {
                let register = parse_register(input.read_uleb128()?)?;
                let factored_offset = input.read_uleb128()?;
                Ok(FrameInstruction::Offset {
                    register,
                    factored_offset,
                })
            }
            constants::DW_CFA_offset_extended_sf => {
                let register = parse_register(input.read_uleb128()?)?;
                let factored_offset = input.read_sleb128()?;
                Ok(FrameInstruction::OffsetSf {
                    register,
                    factored_offset,
                })
            }
            constants::DW_CFA_restore_extended => {
                let register = parse_register(input.read_uleb128()?)?;
                Ok(FrameInstruction::Restore { register })
            }
            constants::DW_CFA_undefined => {
                let register = parse_register(input.read_uleb128()?)?;
                Ok(FrameInstruction::Undefined { register })
            }
            constants::DW_CFA_same_value => {
                let register = parse_register(input.read_uleb128()?)?;
                Ok(FrameInstruction::SameValue { register })
            }
            constants::DW_CFA_register => {
                let dest_register = parse_register(input.read_uleb128()?)?;
                let src_register = parse_register(input.read_uleb128()?)?;
                Ok(FrameInstruction::Register {
                    dest_register,
                    src_register,
                })
            }
            constants::DW_CFA_remember_state => Ok(FrameInstruction::RememberState),
            constants::DW_CFA_restore_state => Ok(FrameInstruction::RestoreState),
            constants::DW_CFA_def_cfa => {
                let register = parse_register(input.read_uleb128()?)?;
                let offset = input.read_uleb128()?;
                Ok(FrameInstruction::DefCfa { register, offset })
            }
            constants::DW_CFA_def_cfa_sf => {
                let register = parse_register(input.read_uleb128()?)?;
                let factored_offset = input.read_sleb128()?;
                Ok(FrameInstruction::DefCfaSf {
                    register,
                    factored_offset,
                })
            }
            constants::DW_CFA_def_cfa_register => {
                let register = parse_register(input.read_uleb128()?)?;
                Ok(FrameInstruction::DefCfaRegister { register })
            }
            constants::DW_CFA_def_cfa_offset => {
                let offset = input.read_uleb128()?;
                Ok(FrameInstruction::DefCfaOffset { offset })
            }
            constants::DW_CFA_def_cfa_offset_sf => {
                let factored_offset = input.read_sleb128()?;
                Ok(FrameInstruction::DefCfaOffsetSf { factored_offset })
            }
            constants::DW_CFA_def_cfa_expression => {
                let length = input.read_uleb128()? as usize;
                let expression = input.split(length)?;
                Ok(FrameInstruction::DefCfaExpression {
                    expression: Expression(expression),
                })
            }
            otherwise => Err(Error::UnknownFrameInstruction(otherwise)),
        }
    }
}

/// A lazy iterator over the instructions of one rule program.
#[derive(Debug, Clone)]
pub struct FrameInstructionIter<R: Reader> {
    input: R,
}

impl<R: Reader> FrameInstructionIter<R> {
    /// Advance the iterator to the next instruction.
    pub fn next(&mut self) -> Result<Option<FrameInstruction<R>>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        match FrameInstruction::parse(&mut self.input) {
            Ok(instruction) => Ok(Some(instruction)),
            Err(e) => {
                self.input.empty();
                Err(e)
            }
        }
    }
}

#[cfg(feature = "fallible-iterator")]
impl<R: Reader> fallible_iterator::FallibleIterator for FrameInstructionIter<R> {
    type Item = FrameInstruction<R>;
    type Error = Error;

    fn next(&mut self) -> Result<Option<FrameInstruction<R>>> {
        FrameInstructionIter::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::X86_64;
    use crate::endianity::LittleEndian;
    use crate::test_util::SectionMethods;
    use test_assembler::{Endian, Label, LabelMaker, Section};

    type Slice<'a> = EndianSlice<'a, LittleEndian>;

    /// Append a defaults record for x86-64: CFA is rsp + 8, the return
    /// address is saved at CFA - 8.
    fn append_defaults(section: Section, version: u8) -> Section {
        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = section
            .D32(&length)
            .mark(&start)
            .D32(constants::DEFAULTS_ID)
            .D8(version)
            // Empty augmentation.
            .D8(0)
            // Address size and segment selector size.
            .D8(8)
            .D8(0)
            // Code and data alignment factors, return address register.
            .uleb(1)
            .sleb(-8)
            .uleb(X86_64::RA.0.into())
            // def_cfa rsp, 8
            .D8(constants::DW_CFA_def_cfa.0)
            .uleb(X86_64::RSP.0.into())
            .uleb(8)
            // offset ra, cfa - 8
            .D8(constants::DW_CFA_offset.0 | X86_64::RA.0 as u8)
            .uleb(1)
            .mark(&end);
        length.set_const((&end - &start) as u64);
        section
    }

    /// Append a function record for the worked example: push rbp, set up a
    /// frame pointer, pop it again before returning.
    fn append_square_function(section: Section, defaults_offset: u32) -> Section {
        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = section
            .D32(&length)
            .mark(&start)
            .D32(defaults_offset)
            .D64(0x1000)
            .D64(0x12)
            // 0x1: after `push rbp`.
            .D8(constants::DW_CFA_advance_loc.0 | 1)
            .D8(constants::DW_CFA_def_cfa_offset.0)
            .uleb(16)
            .D8(constants::DW_CFA_offset.0 | X86_64::RBP.0 as u8)
            .uleb(2)
            // 0x4: after `mov rbp, rsp`.
            .D8(constants::DW_CFA_advance_loc.0 | 3)
            .D8(constants::DW_CFA_def_cfa_register.0)
            .uleb(X86_64::RBP.0.into())
            // 0x11: after `pop rbp`.
            .D8(constants::DW_CFA_advance_loc.0 | 0xd)
            .D8(constants::DW_CFA_def_cfa.0)
            .uleb(X86_64::RSP.0.into())
            .uleb(8)
            .D8(constants::DW_CFA_restore.0 | X86_64::RBP.0 as u8)
            .mark(&end);
        length.set_const((&end - &start) as u64);
        section
    }

    fn section_contents(section: Section) -> Vec<u8> {
        section.get_contents().unwrap()
    }

    #[test]
    fn parse_defaults_record() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);

        let mut entries = section.entries();
        let defaults = match entries.next() {
            Ok(Some(Entry::Defaults(defaults))) => defaults,
            otherwise => panic!("unexpected entry: {:?}", otherwise),
        };
        assert_eq!(entries.next(), Ok(None));

        assert_eq!(defaults.offset(), 0);
        assert_eq!(defaults.version(), constants::FRAME_VERSION);
        assert_eq!(defaults.address_size(), 8);
        assert_eq!(defaults.code_alignment_factor(), 1);
        assert_eq!(defaults.data_alignment_factor(), -8);
        assert_eq!(defaults.return_address_register(), X86_64::RA);

        let mut instructions = defaults.instructions();
        assert_eq!(
            instructions.next(),
            Ok(Some(FrameInstruction::DefCfa {
                register: X86_64::RSP,
                offset: 8,
            }))
        );
        assert_eq!(
            instructions.next(),
            Ok(Some(FrameInstruction::Offset {
                register: X86_64::RA,
                factored_offset: 1,
            }))
        );
        assert_eq!(instructions.next(), Ok(None));
    }

    #[test]
    fn parse_defaults_unknown_version() {
        let section = append_defaults(Section::with_endian(Endian::Little), 99);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(section.entries().next(), Err(Error::UnknownVersion(99)));
    }

    #[test]
    fn parse_defaults_truncated() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let mut contents = section_contents(section);
        contents.truncate(contents.len() - 4);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(section.entries().next(), Err(Error::UnexpectedEof));
    }

    #[test]
    fn parse_reserved_length() {
        let section = Section::with_endian(Endian::Little).D32(0xffff_fff0u32);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(
            section.entries().next(),
            Err(Error::UnknownReservedLength)
        );
    }

    #[test]
    fn zero_length_record_terminates() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION)
            .D32(0)
            // Bytes past the terminator are never looked at.
            .D32(0xdead_beefu32);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);

        let mut entries = section.entries();
        assert!(matches!(entries.next(), Ok(Some(Entry::Defaults(_)))));
        assert_eq!(entries.next(), Ok(None));
    }

    #[test]
    fn parse_function_record() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let defaults_end = section.size() as u32;
        let section = append_square_function(section, 0);
        let contents = section_contents(section);
        assert!(defaults_end > 0);
        let section = FrameSection::new(&contents, LittleEndian);

        let function = section.function_for_address(0x1000).unwrap();
        assert_eq!(function.initial_address(), 0x1000);
        assert_eq!(function.len(), 0x12);
        assert_eq!(function.defaults().offset(), 0);
        assert!(function.contains(0x1011));
        assert!(!function.contains(0x1012));
    }

    #[test]
    fn function_with_bad_defaults_offset() {
        // Point the function record into the middle of its own bytes.
        let section = append_square_function(Section::with_endian(Endian::Little), 2);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(
            section.function_for_address(0x1000),
            Err(Error::NoEntryAtGivenOffset)
        );

        // Point the function record past the end of the section.
        let section = append_square_function(Section::with_endian(Endian::Little), 0x1000);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(
            section.function_for_address(0x1000),
            Err(Error::NoEntryAtGivenOffset)
        );
    }

    #[test]
    fn no_function_for_address() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let section = append_square_function(section, 0);
        let contents = section_contents(section);
        let section = FrameSection::<Slice>::new(&contents, LittleEndian);
        assert_eq!(
            section.function_for_address(0x2000),
            Err(Error::UnknownFunction)
        );
    }

    #[test]
    fn rule_states_through_prologue_and_epilogue() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let section = append_square_function(section, 0);
        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);
        let mut ctx = UnwindContext::new();

        let rsp_plus_8 = CfaRule::RegisterAndOffset {
            register: X86_64::RSP,
            offset: 8,
        };

        // At entry, before the push.
        let row = section.rule_state_for_address(&mut ctx, 0x1000).unwrap();
        assert_eq!((row.start_address(), row.end_address()), (0x1000, 0x1001));
        assert_eq!(*row.cfa(), rsp_plus_8);
        assert_eq!(row.register(X86_64::RA), RegisterRule::Offset(-8));
        assert_eq!(row.register(X86_64::RBP), RegisterRule::Undefined);

        // After the push: the stack grew, rbp is spilled.
        let row = section.rule_state_for_address(&mut ctx, 0x1002).unwrap();
        assert_eq!((row.start_address(), row.end_address()), (0x1001, 0x1004));
        assert_eq!(
            *row.cfa(),
            CfaRule::RegisterAndOffset {
                register: X86_64::RSP,
                offset: 16,
            }
        );
        assert_eq!(row.register(X86_64::RBP), RegisterRule::Offset(-16));

        // The frame pointer takes over as the CFA base.
        let row = section.rule_state_for_address(&mut ctx, 0x100a).unwrap();
        assert_eq!((row.start_address(), row.end_address()), (0x1004, 0x1011));
        assert_eq!(
            *row.cfa(),
            CfaRule::RegisterAndOffset {
                register: X86_64::RBP,
                offset: 16,
            }
        );
        assert_eq!(row.register(X86_64::RBP), RegisterRule::Offset(-16));

        // After the pop, back to the entry state.
        let row = section.rule_state_for_address(&mut ctx, 0x1011).unwrap();
        assert_eq!((row.start_address(), row.end_address()), (0x1011, 0x1012));
        assert_eq!(*row.cfa(), rsp_plus_8);
        assert_eq!(row.register(X86_64::RBP), RegisterRule::Undefined);
        assert_eq!(row.register(X86_64::RA), RegisterRule::Offset(-8));
    }

    #[test]
    fn rule_state_outside_function_range() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let section = append_square_function(section, 0);
        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);

        let function = section.function_for_address(0x1000).unwrap();
        let mut ctx = UnwindContext::new();
        assert_eq!(
            function.rule_state_for_address(&mut ctx, 0x1012),
            Err(Error::OffsetOutOfRange)
        );
    }

    #[test]
    fn advance_overflow_is_rejected() {
        // A huge code alignment factor makes the scaled advance overflow.
        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = Section::with_endian(Endian::Little)
            .D32(&length)
            .mark(&start)
            .D32(constants::DEFAULTS_ID)
            .D8(constants::FRAME_VERSION)
            .D8(0)
            .D8(8)
            .D8(0)
            .uleb(u64::MAX)
            .sleb(-8)
            .uleb(X86_64::RA.0.into())
            .mark(&end);
        length.set_const((&end - &start) as u64);

        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = section
            .D32(&length)
            .mark(&start)
            .D32(0)
            .D64(0x1000)
            .D64(0x12)
            .D8(constants::DW_CFA_advance_loc.0 | 3)
            .mark(&end);
        length.set_const((&end - &start) as u64);

        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);

        let function = section.function_for_address(0x1000).unwrap();
        let mut ctx = UnwindContext::new();
        assert_eq!(
            function.rule_state_for_address(&mut ctx, 0x1004),
            Err(Error::InvalidAddressRange)
        );
    }

    fn parse_instruction(bytes: &[u8]) -> Result<FrameInstruction<Slice>> {
        let mut input = EndianSlice::new(bytes, LittleEndian);
        FrameInstruction::parse(&mut input)
    }

    #[test]
    fn parse_primary_instructions() {
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_advance_loc.0 | 0x2c]),
            Ok(FrameInstruction::AdvanceLoc { delta: 0x2c })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_offset.0 | 6, 0x02]),
            Ok(FrameInstruction::Offset {
                register: Register(6),
                factored_offset: 2,
            })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_restore.0 | 6]),
            Ok(FrameInstruction::Restore {
                register: Register(6),
            })
        );
    }

    #[test]
    fn parse_extended_instructions() {
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_advance_loc2.0, 0x34, 0x12]),
            Ok(FrameInstruction::AdvanceLoc { delta: 0x1234 })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_def_cfa_sf.0, 0x07, 0x7e]),
            Ok(FrameInstruction::DefCfaSf {
                register: Register(7),
                factored_offset: -2,
            })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_offset_extended_sf.0, 0x06, 0x7e]),
            Ok(FrameInstruction::OffsetSf {
                register: Register(6),
                factored_offset: -2,
            })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_register.0, 0x06, 0x0c]),
            Ok(FrameInstruction::Register {
                dest_register: Register(6),
                src_register: Register(12),
            })
        );
        assert_eq!(
            parse_instruction(&[constants::DW_CFA_nop.0]),
            Ok(FrameInstruction::Nop)
        );
    }

    #[test]
    fn parse_unknown_instruction() {
        assert_eq!(
            parse_instruction(&[0x3f]),
            Err(Error::UnknownFrameInstruction(constants::DwCfa(0x3f)))
        );
        assert_eq!(parse_instruction(&[constants::DW_CFA_offset.0 | 6]), Err(Error::UnexpectedEof));
    }

    /// Build a section whose function uses remember/restore around a
    /// frame-pointer switch.
    fn append_remember_restore(section: Section, defaults_offset: u32) -> Section {
        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = section
            .D32(&length)
            .mark(&start)
            .D32(defaults_offset)
            .D64(0x2000)
            .D64(0x20)
            .D8(constants::DW_CFA_remember_state.0)
            .D8(constants::DW_CFA_advance_loc.0 | 4)
            .D8(constants::DW_CFA_def_cfa_offset.0)
            .uleb(32)
            .D8(constants::DW_CFA_advance_loc.0 | 4)
            .D8(constants::DW_CFA_restore_state.0)
            .mark(&end);
        length.set_const((&end - &start) as u64);
        section
    }

    #[test]
    fn remember_and_restore_state() {
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION);
        let section = append_remember_restore(section, 0);
        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);
        let mut ctx = UnwindContext::new();

        let row = section.rule_state_for_address(&mut ctx, 0x2004).unwrap();
        assert_eq!(
            *row.cfa(),
            CfaRule::RegisterAndOffset {
                register: X86_64::RSP,
                offset: 32,
            }
        );

        // Past the restore, the remembered entry state is back.
        let row = section.rule_state_for_address(&mut ctx, 0x2008).unwrap();
        assert_eq!(
            *row.cfa(),
            CfaRule::RegisterAndOffset {
                register: X86_64::RSP,
                offset: 8,
            }
        );
    }

    #[test]
    fn restore_state_with_empty_stack() {
        let length = Label::new();
        let start = Label::new();
        let end = Label::new();
        let section = append_defaults(Section::with_endian(Endian::Little), constants::FRAME_VERSION)
            .D32(&length)
            .mark(&start)
            .D32(0)
            .D64(0x2000)
            .D64(0x20)
            .D8(constants::DW_CFA_restore_state.0)
            .mark(&end);
        length.set_const((&end - &start) as u64);
        let contents = section_contents(section);
        let section = FrameSection::new(&contents, LittleEndian);

        let mut ctx = UnwindContext::new();
        assert_eq!(
            section.rule_state_for_address(&mut ctx, 0x2000),
            Err(Error::PopWithEmptyStack)
        );
    }
}
