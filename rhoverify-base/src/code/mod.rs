use std::fmt;

use smallvec::SmallVec;

use crate::{
    attribute::{AttributeInfo, CodeAttribute, ExceptionEntry},
    util::MemorySize,
};

use self::op::{Inst, RawOpcode};

pub mod method;
pub mod op;
mod op_print;
pub mod types;

/// A byte offset into the code array
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionIndex(pub u32);
impl InstructionIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}
impl From<u16> for InstructionIndex {
    fn from(v: u16) -> InstructionIndex {
        InstructionIndex(u32::from(v))
    }
}
impl fmt::Display for InstructionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inst with location
pub type InstL = (InstructionIndex, Inst);

#[derive(Debug, Clone)]
pub enum InstructionParseError {
    NotEnoughData {
        opcode: RawOpcode,
        needed: usize,
        had: usize,
    },
    ExpectedOpCodeAt(InstructionIndex),
    UnknownOpcode {
        idx: InstructionIndex,
        opcode: RawOpcode,
    },
    UnknownWideOpcode {
        idx: InstructionIndex,
        opcode: RawOpcode,
    },
    InvalidTableSwitchRange {
        idx: InstructionIndex,
        low: i32,
        high: i32,
    },
    NegativeLookupSwitchCount {
        idx: InstructionIndex,
        npairs: i32,
    },
    /// A branch whose destination is not the start of an instruction
    InvalidBranchTarget {
        idx: InstructionIndex,
        target: i64,
    },
    /// The code array is too large to be addressed at all
    CodeTooLong(usize),
}
impl fmt::Display for InstructionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionParseError::NotEnoughData {
                opcode,
                needed,
                had,
            } => write!(
                f,
                "instruction with opcode {:#04X} needs {} bytes but only {} remain",
                opcode, needed, had
            ),
            InstructionParseError::ExpectedOpCodeAt(idx) => {
                write!(f, "expected an opcode at offset {}", idx)
            }
            InstructionParseError::UnknownOpcode { idx, opcode } => {
                write!(f, "unknown opcode {:#04X} at offset {}", opcode, idx)
            }
            InstructionParseError::UnknownWideOpcode { idx, opcode } => write!(
                f,
                "opcode {:#04X} at offset {} can not be modified by wide",
                opcode, idx
            ),
            InstructionParseError::InvalidTableSwitchRange { idx, low, high } => write!(
                f,
                "tableswitch at offset {} has high {} lower than low {}",
                idx, high, low
            ),
            InstructionParseError::NegativeLookupSwitchCount { idx, npairs } => write!(
                f,
                "lookupswitch at offset {} has a negative pair count {}",
                idx, npairs
            ),
            InstructionParseError::InvalidBranchTarget { idx, target } => write!(
                f,
                "branch at offset {} targets offset {} which is not the start of an instruction",
                idx, target
            ),
            InstructionParseError::CodeTooLong(len) => {
                write!(f, "code array of {} bytes can not be addressed", len)
            }
        }
    }
}

/// Why an exception table entry does not fit the code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionRangeError {
    /// The start was not before the end
    InverseOrder,
    InvalidStartIndex,
    InvalidEndIndex,
    InvalidHandlerIndex,
}

/// The decoded code of a method
#[derive(Debug, Clone)]
pub struct CodeInfo {
    instructions: Vec<InstL>,
    /// Indices into `instructions` of each instruction's branch targets, in the order given by
    /// [`Inst::branch_offsets`]
    targets: Vec<SmallVec<[usize; 2]>>,
    code_length: u32,
    max_locals: u16,
    max_stack: u16,
    exception_table: Vec<ExceptionEntry>,
    attributes: Vec<AttributeInfo>,
}
impl CodeInfo {
    #[must_use]
    /// Get an index into the insts vec from an index into the code array
    pub fn get_instruction_idx(&self, idx: InstructionIndex) -> Option<usize> {
        // The instructions are stored in increasing order of their position
        self.instructions
            .binary_search_by(|(i_idx, _)| i_idx.cmp(&idx))
            .ok()
    }

    #[must_use]
    pub fn instructions(&self) -> &[InstL] {
        &self.instructions
    }

    #[must_use]
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionEntry] {
        &self.exception_table
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// The length of the code array in bytes
    #[must_use]
    pub fn code_length(&self) -> u32 {
        self.code_length
    }

    /// The branch targets of the instruction at index `i` of [`CodeInfo::instructions`],
    /// as indices into the same sequence
    #[must_use]
    pub fn targets(&self, i: usize) -> &[usize] {
        self.targets.get(i).map_or(&[], |x| x.as_slice())
    }

    #[must_use]
    /// If the index is not found -> None
    /// If the index would be inside an instruction -> None
    pub fn get_instruction_at(&self, idx: InstructionIndex) -> Option<&Inst> {
        self.get_instruction_idx(idx)
            .and_then(|x| self.instructions.get(x))
            .map(|x| &x.1)
    }

    #[must_use]
    pub fn has_instruction_at(&self, idx: InstructionIndex) -> bool {
        self.get_instruction_idx(idx).is_some()
    }

    /// Whether the offset is the start of an instruction or the end of the code array
    #[must_use]
    pub fn is_instruction_boundary(&self, idx: InstructionIndex) -> bool {
        idx.0 == self.code_length || self.has_instruction_at(idx)
    }

    #[must_use]
    pub fn last(&self) -> Option<&InstL> {
        self.instructions.last()
    }

    /// Checks an exception.
    /// Note that this only checks validity for applying it to the function, and doesn't
    /// care if it is actually from this function or not
    pub fn check_exception_basic(&self, exc: &ExceptionEntry) -> Result<(), ExceptionRangeError> {
        // the start must be before the end
        // start..end
        if exc.start_pc >= exc.end_pc {
            return Err(ExceptionRangeError::InverseOrder);
        }

        if !self.has_instruction_at(exc.start_pc.into()) {
            return Err(ExceptionRangeError::InvalidStartIndex);
        }

        // end must either be a valid instruction,
        // or it must be the last index of the code
        if !self.is_instruction_boundary(exc.end_pc.into()) {
            return Err(ExceptionRangeError::InvalidEndIndex);
        }

        // Ensure that there is code at the handler
        if !self.has_instruction_at(exc.handler_pc.into()) {
            return Err(ExceptionRangeError::InvalidHandlerIndex);
        }
        Ok(())
    }
}

/// Decode the code array into a sequence of instructions and resolve every branch.
pub fn parse_code(code_attr: &CodeAttribute) -> Result<CodeInfo, InstructionParseError> {
    let code = code_attr.code.as_slice();
    let code_length =
        u32::try_from(code.len()).map_err(|_| InstructionParseError::CodeTooLong(code.len()))?;
    let mut instructions = Vec::new();

    let mut idx: usize = 0;
    while idx < code.len() {
        // Fits as it is less than the code length
        #[allow(clippy::cast_possible_truncation)]
        let inst_idx = InstructionIndex(idx as u32);
        // We don't need to give the entirety of the code to the instructions but it does not
        // harm anything.
        let inst = Inst::parse(code, inst_idx)?;
        idx += inst.memory_size();
        instructions.push((inst_idx, inst));
    }

    let mut targets = Vec::with_capacity(instructions.len());
    for (inst_idx, inst) in &instructions {
        let mut inst_targets = SmallVec::new();
        for offset in inst.branch_offsets() {
            let target = i64::from(inst_idx.0) + i64::from(offset);
            let found = u32::try_from(target).ok().and_then(|target| {
                instructions
                    .binary_search_by(|(i_idx, _)| i_idx.0.cmp(&target))
                    .ok()
            });
            match found {
                Some(found) => inst_targets.push(found),
                None => {
                    return Err(InstructionParseError::InvalidBranchTarget {
                        idx: *inst_idx,
                        target,
                    })
                }
            }
        }
        targets.push(inst_targets);
    }

    Ok(CodeInfo {
        instructions,
        targets,
        code_length,
        max_locals: code_attr.max_locals,
        max_stack: code_attr.max_stack,
        exception_table: code_attr.exception_table.clone(),
        attributes: code_attr.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_attr(code: Vec<u8>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 2,
            max_locals: 2,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn resolves_branches() {
        // 0: iconst_0
        // 1: ifeq +4 (-> 5)
        // 4: nop
        // 5: goto -5 (-> 0)
        let code = parse_code(&code_attr(vec![0x03, 0x99, 0x00, 0x04, 0x00, 0xA7, 0xFF, 0xFB]))
            .unwrap();
        assert_eq!(code.instructions().len(), 4);
        assert_eq!(code.code_length(), 8);
        assert_eq!(code.targets(1), &[3]);
        assert_eq!(code.targets(3), &[0]);
        assert!(code.targets(0).is_empty());
        assert_eq!(code.get_instruction_idx(InstructionIndex(4)), Some(2));
        assert_eq!(code.get_instruction_idx(InstructionIndex(2)), None);
        assert!(code.is_instruction_boundary(InstructionIndex(8)));
        assert!(!code.is_instruction_boundary(InstructionIndex(9)));
    }

    #[test]
    fn rejects_branch_into_instruction() {
        // ifeq +2 lands inside its own operands
        let err = parse_code(&code_attr(vec![0x99, 0x00, 0x02, 0xB1])).unwrap_err();
        assert!(matches!(
            err,
            InstructionParseError::InvalidBranchTarget { target: 2, .. }
        ));

        let err = parse_code(&code_attr(vec![0xA7, 0xFF, 0x00])).unwrap_err();
        assert!(matches!(
            err,
            InstructionParseError::InvalidBranchTarget { target: -256, .. }
        ));
    }

    #[test]
    fn exception_ranges() {
        // 0: nop, 1: nop, 2: return
        let code = parse_code(&code_attr(vec![0x00, 0x00, 0xB1])).unwrap();
        let entry = |start_pc, end_pc, handler_pc| ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: crate::constant_pool::ConstantPoolIndexRaw::new(0),
        };
        assert_eq!(code.check_exception_basic(&entry(0, 3, 2)), Ok(()));
        assert_eq!(
            code.check_exception_basic(&entry(1, 1, 2)),
            Err(ExceptionRangeError::InverseOrder)
        );
        assert_eq!(
            code.check_exception_basic(&entry(0, 4, 2)),
            Err(ExceptionRangeError::InvalidEndIndex)
        );
        assert_eq!(
            code.check_exception_basic(&entry(0, 2, 3)),
            Err(ExceptionRangeError::InvalidHandlerIndex)
        );
    }
}
