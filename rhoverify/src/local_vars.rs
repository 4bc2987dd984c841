//! What the LocalVariableTable says about each local variable slot of a method.

use std::{collections::BTreeMap, fmt};

use rhoverify_base::code::method::{DescriptorType, DescriptorTypeBasic};

use crate::error::LocalVariableInfoInconsistent;

/// The type of a local variable slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalVariableType {
    Type(DescriptorType),
    /// The second slot of a `long`
    LongUpper,
    /// The second slot of a `double`
    DoubleUpper,
}
impl fmt::Display for LocalVariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalVariableType::Type(ty) => write!(f, "{}", ty),
            LocalVariableType::LongUpper => f.write_str("long_Upper"),
            LocalVariableType::DoubleUpper => f.write_str("double_Upper"),
        }
    }
}

/// Names and types of one slot, keyed by bytecode offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalVariableInfo {
    names: BTreeMap<u32, String>,
    types: BTreeMap<u32, LocalVariableType>,
}
impl LocalVariableInfo {
    #[must_use]
    pub fn new() -> LocalVariableInfo {
        LocalVariableInfo::default()
    }

    /// Declare the variable for the offsets `start_pc..start_pc + length`.
    /// Nothing is recorded if the declaration conflicts with an earlier one.
    pub fn add(
        &mut self,
        name: &str,
        start_pc: u32,
        length: u32,
        ty: &LocalVariableType,
    ) -> Result<(), LocalVariableInfoInconsistent> {
        let end_pc = start_pc.saturating_add(length);
        for offset in start_pc..end_pc {
            self.check_at(offset, name, ty)?;
        }

        for offset in start_pc..end_pc {
            self.names.insert(offset, name.to_owned());
            self.types.insert(offset, ty.clone());
        }
        Ok(())
    }

    fn check_at(
        &self,
        offset: u32,
        name: &str,
        ty: &LocalVariableType,
    ) -> Result<(), LocalVariableInfoInconsistent> {
        if let Some(existing) = self.names.get(&offset) {
            if existing != name {
                return Err(LocalVariableInfoInconsistent(format!(
                    "At bytecode offset '{}' a local variable has two different names: '{}' and '{}'.",
                    offset, existing, name
                )));
            }
        }

        if let Some(existing) = self.types.get(&offset) {
            if existing != ty {
                return Err(LocalVariableInfoInconsistent(format!(
                    "At bytecode offset '{}' a local variable has two different types: '{}' and '{}'.",
                    offset, existing, ty
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn name_at(&self, offset: u32) -> Option<&str> {
        self.names.get(&offset).map(String::as_str)
    }

    #[must_use]
    pub fn type_at(&self, offset: u32) -> Option<&LocalVariableType> {
        self.types.get(&offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddLocalVariableError {
    Inconsistent(LocalVariableInfoInconsistent),
    /// The slot, or the second slot of a wide type, is not below `max_locals`
    SlotOutOfRange { slot: usize, max_locals: usize },
}
impl From<LocalVariableInfoInconsistent> for AddLocalVariableError {
    fn from(err: LocalVariableInfoInconsistent) -> Self {
        Self::Inconsistent(err)
    }
}

/// The local variable information of every slot of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariablesInfo {
    slots: Vec<LocalVariableInfo>,
}
impl LocalVariablesInfo {
    #[must_use]
    pub fn new(max_locals: u16) -> LocalVariablesInfo {
        LocalVariablesInfo {
            slots: vec![LocalVariableInfo::new(); usize::from(max_locals)],
        }
    }

    #[must_use]
    pub fn max_locals(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&LocalVariableInfo> {
        self.slots.get(slot)
    }

    /// Declare a variable in `slot`. Longs and doubles also mark the following slot with the
    /// matching upper half type.
    pub fn add(
        &mut self,
        slot: usize,
        name: &str,
        start_pc: u32,
        length: u32,
        ty: &DescriptorType,
    ) -> Result<(), AddLocalVariableError> {
        let max_locals = self.slots.len();
        let upper = match ty {
            DescriptorType::Basic(DescriptorTypeBasic::Long) => Some(LocalVariableType::LongUpper),
            DescriptorType::Basic(DescriptorTypeBasic::Double) => {
                Some(LocalVariableType::DoubleUpper)
            }
            _ => None,
        };
        let last_slot = if upper.is_some() { slot + 1 } else { slot };
        if last_slot >= max_locals {
            return Err(AddLocalVariableError::SlotOutOfRange {
                slot: last_slot,
                max_locals,
            });
        }

        self.slots[slot].add(name, start_pc, length, &LocalVariableType::Type(ty.clone()))?;
        if let Some(upper) = upper {
            self.slots[slot + 1].add(name, start_pc, length, &upper)?;
        }
        Ok(())
    }
}
