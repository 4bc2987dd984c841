//! Operand types of instructions.
//! Each type knows its encoded size and how to read itself from the code array.

use crate::{constant_pool::ConstantPoolIndexRaw, util::StaticMemorySize};

/// Internal
pub trait ParseOutput {
    type Output;
    /// The data is assured to be exactly [`StaticMemorySize::MEMORY_SIZE`] bytes long
    fn parse(d: &[u8]) -> Self::Output;
}
macro_rules! operand_types {
    ([
        $($name:ident = $mem_size:expr; $d:ident -> $parse_t:ty $parse:block),* $(,)*
    ]) => {
        $(
            /// Internal
            #[derive(Debug, Clone, Copy)]
            pub struct $name;
            impl ParseOutput for $name {
                type Output = $parse_t;
                fn parse($d: &[u8]) -> $parse_t {
                    $parse
                }
            }
            impl StaticMemorySize for $name {
                const MEMORY_SIZE: usize = $mem_size;
            }
        )*
    };
}
operand_types!([
    Byte = 1; d -> i8 { i8::from_be_bytes([d[0]]) },
    UnsignedByte = 1; d -> u8 { d[0] },
    Short = 2; d -> i16 { i16::from_be_bytes([d[0], d[1]]) },
    UnsignedShort = 2; d -> u16 { u16::from_be_bytes([d[0], d[1]]) },
    Int = 4; d -> i32 { i32::from_be_bytes([d[0], d[1], d[2], d[3]]) },
]);

impl<T> ParseOutput for ConstantPoolIndexRaw<T> {
    type Output = ConstantPoolIndexRaw<T>;
    fn parse(d: &[u8]) -> Self::Output {
        let v = u16::from_be_bytes([d[0], d[1]]);
        ConstantPoolIndexRaw::new(v)
    }
}
impl<T> StaticMemorySize for ConstantPoolIndexRaw<T> {
    const MEMORY_SIZE: usize = 2;
}

/// A constant pool index stored in a single byte, as used by `ldc`
#[derive(Debug, Clone, Copy)]
pub struct ConstantPoolIndexByte;
impl ParseOutput for ConstantPoolIndexByte {
    type Output = ConstantPoolIndexRaw<crate::constant_pool::ConstantInfo>;
    fn parse(d: &[u8]) -> Self::Output {
        ConstantPoolIndexRaw::new(u16::from(d[0]))
    }
}
impl StaticMemorySize for ConstantPoolIndexByte {
    const MEMORY_SIZE: usize = 1;
}

pub type LocalVariableIndex = UnsignedShort;
pub type LocalVariableIndexByte = UnsignedByte;
/// Signed offset relative to the start of the branching instruction
pub type BranchOffset = Short;
pub type BranchOffsetWide = Int;
