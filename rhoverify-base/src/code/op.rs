use crate::code::types::{
    BranchOffset, BranchOffsetWide, Byte, ConstantPoolIndexByte, Int, LocalVariableIndex,
    LocalVariableIndexByte, ParseOutput, Short, UnsignedByte, UnsignedShort,
};
use crate::code::{InstructionIndex, InstructionParseError};
use crate::constant_pool::{
    ClassConstant, ConstantInfo, ConstantPoolIndexRaw, FieldRefConstant,
    InterfaceMethodRefConstant, InvokeDynamicConstant, MethodRefConstant,
};
use crate::util::{MemorySize, StaticMemorySize};

macro_rules! define_instruction {
    ($(#[$name_outer:meta])*
    $name: ident: {
        opcode: $opcode:expr,
        mnemonic: $mnemonic:expr,
        args: [$(
            $(#[$arg_outer:meta])*
            $arg:ident : $arg_ty:ty
        ),* $(,)*] $(,)?
    }) => {
        $(#[$name_outer])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $(
                $(#[$arg_outer])*
                pub $arg : <$arg_ty as ParseOutput>::Output,
            )*
        }
        impl $name {
            pub const OPCODE: RawOpcode = $opcode;
            pub const MNEMONIC: &'static str = $mnemonic;

            /// The index must be within the data
            #[allow(unused_variables, unused_mut, unused_assignments)]
            pub(crate) fn parse(data: &[u8], idx: InstructionIndex) -> Result<$name, InstructionParseError> {
                let data = &data[idx.as_usize()..];
                let needed_size: usize = $name::MEMORY_SIZE;
                if data.len() < needed_size {
                    return Err(InstructionParseError::NotEnoughData {
                        opcode: Self::OPCODE,
                        needed: needed_size,
                        had: data.len(),
                    });
                }

                // Skip over the opcode
                let mut idx = 1;
                $(
                    let size = <$arg_ty>::MEMORY_SIZE;
                    let $arg = <$arg_ty>::parse(&data[idx..(idx + size)]);
                    idx += size;
                )*
                Ok(Self {
                    $(
                        $arg,
                    )*
                })
            }
        }
        // The size of themselves in the code
        impl StaticMemorySize for $name {
            const MEMORY_SIZE: usize = 1 + $(<$arg_ty>::MEMORY_SIZE +)* 0;
        }
    };
}

/// Define the instructions (opcodes)
/// Note: the opcode expr should be a simple number that can be used in a match expression.
macro_rules! define_instructions {
    ([$(
        $(#[$name_outer:meta])*
        $name:ident : {$($data:tt)*},
    )+],
    EXTERN: [$($ext_name:ident),+ $(,)?],
    WIDE_INSTR: [$(
        $(#[$wide_name_outer:meta])*
        $wide_name:ident : {$($wide_data:tt)*},
    )+]) => {
        $(
            define_instruction!(
                $(#[$name_outer])*
                $name : {$($data)*}
            );
        )+

        $(
            define_instruction!(
                $(#[$wide_name_outer])*
                $wide_name : {$($wide_data)*}
            );
        )+

        #[cfg(test)]
        fn check_instruction_duplicates() {
            let info: &[(&str, RawOpcode)] = &[
                $(
                    (stringify!($name), $name::OPCODE),
                )+
                $(
                    (stringify!($ext_name), $ext_name::OPCODE),
                )+
            ];

            for (li, (ls, lo)) in info.iter().enumerate() {
                for (ri, (rs, ro)) in info.iter().enumerate() {
                    if li == ri {
                        continue;
                    }

                    assert_ne!(ls, rs, "Duplicate opcode name!");
                    assert_ne!(lo, ro, "Duplicate opcode!: '{}' and '{}'", ls, rs);
                }
            }
        }

        #[derive(Clone, PartialEq, Eq)]
        pub enum InstM {
            $(
                $(#[$name_outer])*
                $name ($name),
            )+
            $(
                $ext_name ($ext_name),
            )+
        }
        impl InstM {
            pub fn parse(code: &[u8], idx: InstructionIndex) -> Result<InstM, InstructionParseError> {
                let opcode: RawOpcode = code
                    .get(idx.as_usize()).copied()
                    .ok_or(InstructionParseError::ExpectedOpCodeAt(idx))?;
                match opcode {
                    $(
                        $name::OPCODE => Ok(InstM::$name($name::parse(code, idx)?)),
                    )+
                    $(
                        $ext_name::OPCODE => Ok(InstM::$ext_name($ext_name::parse(code, idx)?)),
                    )+
                    _ => Err(InstructionParseError::UnknownOpcode {
                        idx,
                        opcode,
                    })
                }
            }

            #[must_use]
            pub fn opcode(&self) -> RawOpcode {
                match self {
                    $(
                        InstM::$name(_) => $name::OPCODE,
                    )+
                    $(
                        InstM::$ext_name(_) => $ext_name::OPCODE,
                    )+
                }
            }

            /// The mnemonic of the instruction, such as `iload`
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(
                        InstM::$name(_) => $name::MNEMONIC,
                    )+
                    $(
                        InstM::$ext_name(_) => $ext_name::MNEMONIC,
                    )+
                }
            }
        }
        impl MemorySize for InstM {
            fn memory_size(&self) -> usize {
                match self {
                    $(
                        InstM::$name(v) => v.memory_size(),
                    )+
                    $(
                        InstM::$ext_name(v) => v.memory_size(),
                    )+
                }
            }
        }
        // Custom formatting to only print the struct, which is nicer to see
        impl std::fmt::Debug for InstM {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        InstM::$name(v) => std::fmt::Debug::fmt(v, f),
                    )+
                    $(
                        InstM::$ext_name(v) => std::fmt::Debug::fmt(v, f),
                    )+
                }
            }
        }

        #[derive(Clone, PartialEq, Eq)]
        pub enum WideInstM {
            $(
                $(#[$wide_name_outer])*
                $wide_name ($wide_name),
            )+
        }
        impl WideInstM {
            pub fn parse(code: &[u8], idx: InstructionIndex) -> Result<WideInstM, InstructionParseError> {
                let opcode: RawOpcode = code
                    .get(idx.as_usize()).copied()
                    .ok_or(InstructionParseError::ExpectedOpCodeAt(idx))?;
                match opcode {
                    $(
                        $wide_name::OPCODE => Ok(WideInstM::$wide_name($wide_name::parse(code, idx)?)),
                    )+
                    _ => Err(InstructionParseError::UnknownWideOpcode {
                        idx,
                        opcode,
                    })
                }
            }

            /// The mnemonic of the modified instruction
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(
                        WideInstM::$wide_name(_) => $wide_name::MNEMONIC,
                    )+
                }
            }
        }
        impl MemorySize for WideInstM {
            fn memory_size(&self) -> usize {
                match self {
                    $(
                        WideInstM::$wide_name(v) => v.memory_size(),
                    )+
                }
            }
        }
        impl std::fmt::Debug for WideInstM {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        WideInstM::$wide_name(v) => std::fmt::Debug::fmt(v, f),
                    )+
                }
            }
        }
    };
}

pub type RawOpcode = u8;

define_instructions! {[
    Nop: { opcode: 0x00, mnemonic: "nop", args: [] },
    /// Pushes null to the stack
    AConstNull: { opcode: 0x01, mnemonic: "aconst_null", args: [] },
    IntConstNeg1: { opcode: 0x02, mnemonic: "iconst_m1", args: [] },
    IntConst0: { opcode: 0x03, mnemonic: "iconst_0", args: [] },
    IntConst1: { opcode: 0x04, mnemonic: "iconst_1", args: [] },
    IntConst2: { opcode: 0x05, mnemonic: "iconst_2", args: [] },
    IntConst3: { opcode: 0x06, mnemonic: "iconst_3", args: [] },
    IntConst4: { opcode: 0x07, mnemonic: "iconst_4", args: [] },
    IntConst5: { opcode: 0x08, mnemonic: "iconst_5", args: [] },
    LongConst0: { opcode: 0x09, mnemonic: "lconst_0", args: [] },
    LongConst1: { opcode: 0x0A, mnemonic: "lconst_1", args: [] },
    FloatConst0: { opcode: 0x0B, mnemonic: "fconst_0", args: [] },
    FloatConst1: { opcode: 0x0C, mnemonic: "fconst_1", args: [] },
    FloatConst2: { opcode: 0x0D, mnemonic: "fconst_2", args: [] },
    DoubleConst0: { opcode: 0x0E, mnemonic: "dconst_0", args: [] },
    DoubleConst1: { opcode: 0x0F, mnemonic: "dconst_1", args: [] },
    /// Sign extends the byte to an int
    PushByte: { opcode: 0x10, mnemonic: "bipush", args: [val: Byte] },
    PushShort: { opcode: 0x11, mnemonic: "sipush", args: [val: Short] },
    /// Push a single-slot constant from the constant pool
    LoadConstant: {
        opcode: 0x12,
        mnemonic: "ldc",
        args: [index: ConstantPoolIndexByte],
    },
    LoadConstantWide: {
        opcode: 0x13,
        mnemonic: "ldc_w",
        args: [index: ConstantPoolIndexRaw<ConstantInfo>],
    },
    /// Push a long or double from the constant pool
    LoadConstant2Wide: {
        opcode: 0x14,
        mnemonic: "ldc2_w",
        args: [index: ConstantPoolIndexRaw<ConstantInfo>],
    },

    IntLoad: { opcode: 0x15, mnemonic: "iload", args: [index: LocalVariableIndexByte] },
    LongLoad: { opcode: 0x16, mnemonic: "lload", args: [index: LocalVariableIndexByte] },
    FloatLoad: { opcode: 0x17, mnemonic: "fload", args: [index: LocalVariableIndexByte] },
    DoubleLoad: { opcode: 0x18, mnemonic: "dload", args: [index: LocalVariableIndexByte] },
    /// Load a reference from a local variable
    /// Cannot load a value of type returnAddress
    ALoad: { opcode: 0x19, mnemonic: "aload", args: [index: LocalVariableIndexByte] },
    IntLoad0: { opcode: 0x1A, mnemonic: "iload_0", args: [] },
    IntLoad1: { opcode: 0x1B, mnemonic: "iload_1", args: [] },
    IntLoad2: { opcode: 0x1C, mnemonic: "iload_2", args: [] },
    IntLoad3: { opcode: 0x1D, mnemonic: "iload_3", args: [] },
    LongLoad0: { opcode: 0x1E, mnemonic: "lload_0", args: [] },
    LongLoad1: { opcode: 0x1F, mnemonic: "lload_1", args: [] },
    LongLoad2: { opcode: 0x20, mnemonic: "lload_2", args: [] },
    LongLoad3: { opcode: 0x21, mnemonic: "lload_3", args: [] },
    FloatLoad0: { opcode: 0x22, mnemonic: "fload_0", args: [] },
    FloatLoad1: { opcode: 0x23, mnemonic: "fload_1", args: [] },
    FloatLoad2: { opcode: 0x24, mnemonic: "fload_2", args: [] },
    FloatLoad3: { opcode: 0x25, mnemonic: "fload_3", args: [] },
    DoubleLoad0: { opcode: 0x26, mnemonic: "dload_0", args: [] },
    DoubleLoad1: { opcode: 0x27, mnemonic: "dload_1", args: [] },
    DoubleLoad2: { opcode: 0x28, mnemonic: "dload_2", args: [] },
    DoubleLoad3: { opcode: 0x29, mnemonic: "dload_3", args: [] },
    ALoad0: { opcode: 0x2A, mnemonic: "aload_0", args: [] },
    ALoad1: { opcode: 0x2B, mnemonic: "aload_1", args: [] },
    ALoad2: { opcode: 0x2C, mnemonic: "aload_2", args: [] },
    ALoad3: { opcode: 0x2D, mnemonic: "aload_3", args: [] },

    IntArrayLoad: { opcode: 0x2E, mnemonic: "iaload", args: [] },
    LongArrayLoad: { opcode: 0x2F, mnemonic: "laload", args: [] },
    FloatArrayLoad: { opcode: 0x30, mnemonic: "faload", args: [] },
    DoubleArrayLoad: { opcode: 0x31, mnemonic: "daload", args: [] },
    /// Load a reference from an array with an index
    AALoad: { opcode: 0x32, mnemonic: "aaload", args: [] },
    ByteArrayLoad: { opcode: 0x33, mnemonic: "baload", args: [] },
    CharArrayLoad: { opcode: 0x34, mnemonic: "caload", args: [] },
    ShortArrayLoad: { opcode: 0x35, mnemonic: "saload", args: [] },

    IntStore: { opcode: 0x36, mnemonic: "istore", args: [index: LocalVariableIndexByte] },
    LongStore: { opcode: 0x37, mnemonic: "lstore", args: [index: LocalVariableIndexByte] },
    FloatStore: { opcode: 0x38, mnemonic: "fstore", args: [index: LocalVariableIndexByte] },
    DoubleStore: { opcode: 0x39, mnemonic: "dstore", args: [index: LocalVariableIndexByte] },
    /// Store a reference (or return address) into a local variable
    AStore: { opcode: 0x3A, mnemonic: "astore", args: [index: LocalVariableIndexByte] },
    IntStore0: { opcode: 0x3B, mnemonic: "istore_0", args: [] },
    IntStore1: { opcode: 0x3C, mnemonic: "istore_1", args: [] },
    IntStore2: { opcode: 0x3D, mnemonic: "istore_2", args: [] },
    IntStore3: { opcode: 0x3E, mnemonic: "istore_3", args: [] },
    LongStore0: { opcode: 0x3F, mnemonic: "lstore_0", args: [] },
    LongStore1: { opcode: 0x40, mnemonic: "lstore_1", args: [] },
    LongStore2: { opcode: 0x41, mnemonic: "lstore_2", args: [] },
    LongStore3: { opcode: 0x42, mnemonic: "lstore_3", args: [] },
    FloatStore0: { opcode: 0x43, mnemonic: "fstore_0", args: [] },
    FloatStore1: { opcode: 0x44, mnemonic: "fstore_1", args: [] },
    FloatStore2: { opcode: 0x45, mnemonic: "fstore_2", args: [] },
    FloatStore3: { opcode: 0x46, mnemonic: "fstore_3", args: [] },
    DoubleStore0: { opcode: 0x47, mnemonic: "dstore_0", args: [] },
    DoubleStore1: { opcode: 0x48, mnemonic: "dstore_1", args: [] },
    DoubleStore2: { opcode: 0x49, mnemonic: "dstore_2", args: [] },
    DoubleStore3: { opcode: 0x4A, mnemonic: "dstore_3", args: [] },
    AStore0: { opcode: 0x4B, mnemonic: "astore_0", args: [] },
    AStore1: { opcode: 0x4C, mnemonic: "astore_1", args: [] },
    AStore2: { opcode: 0x4D, mnemonic: "astore_2", args: [] },
    AStore3: { opcode: 0x4E, mnemonic: "astore_3", args: [] },

    IntArrayStore: { opcode: 0x4F, mnemonic: "iastore", args: [] },
    LongArrayStore: { opcode: 0x50, mnemonic: "lastore", args: [] },
    FloatArrayStore: { opcode: 0x51, mnemonic: "fastore", args: [] },
    DoubleArrayStore: { opcode: 0x52, mnemonic: "dastore", args: [] },
    /// Stores a reference to a value into an array at an index
    AAStore: { opcode: 0x53, mnemonic: "aastore", args: [] },
    ByteArrayStore: { opcode: 0x54, mnemonic: "bastore", args: [] },
    CharArrayStore: { opcode: 0x55, mnemonic: "castore", args: [] },
    ShortArrayStore: { opcode: 0x56, mnemonic: "sastore", args: [] },

    Pop: { opcode: 0x57, mnemonic: "pop", args: [] },
    Pop2: { opcode: 0x58, mnemonic: "pop2", args: [] },
    Dup: { opcode: 0x59, mnemonic: "dup", args: [] },
    DupX1: { opcode: 0x5A, mnemonic: "dup_x1", args: [] },
    DupX2: { opcode: 0x5B, mnemonic: "dup_x2", args: [] },
    Dup2: { opcode: 0x5C, mnemonic: "dup2", args: [] },
    Dup2X1: { opcode: 0x5D, mnemonic: "dup2_x1", args: [] },
    Dup2X2: { opcode: 0x5E, mnemonic: "dup2_x2", args: [] },
    Swap: { opcode: 0x5F, mnemonic: "swap", args: [] },

    IntAdd: { opcode: 0x60, mnemonic: "iadd", args: [] },
    LongAdd: { opcode: 0x61, mnemonic: "ladd", args: [] },
    FloatAdd: { opcode: 0x62, mnemonic: "fadd", args: [] },
    DoubleAdd: { opcode: 0x63, mnemonic: "dadd", args: [] },
    IntSubtract: { opcode: 0x64, mnemonic: "isub", args: [] },
    LongSubtract: { opcode: 0x65, mnemonic: "lsub", args: [] },
    FloatSubtract: { opcode: 0x66, mnemonic: "fsub", args: [] },
    DoubleSubtract: { opcode: 0x67, mnemonic: "dsub", args: [] },
    IntMultiply: { opcode: 0x68, mnemonic: "imul", args: [] },
    LongMultiply: { opcode: 0x69, mnemonic: "lmul", args: [] },
    FloatMultiply: { opcode: 0x6A, mnemonic: "fmul", args: [] },
    DoubleMultiply: { opcode: 0x6B, mnemonic: "dmul", args: [] },
    IntDivide: { opcode: 0x6C, mnemonic: "idiv", args: [] },
    LongDivide: { opcode: 0x6D, mnemonic: "ldiv", args: [] },
    FloatDivide: { opcode: 0x6E, mnemonic: "fdiv", args: [] },
    DoubleDivide: { opcode: 0x6F, mnemonic: "ddiv", args: [] },
    IntRemainder: { opcode: 0x70, mnemonic: "irem", args: [] },
    LongRemainder: { opcode: 0x71, mnemonic: "lrem", args: [] },
    FloatRemainder: { opcode: 0x72, mnemonic: "frem", args: [] },
    DoubleRemainder: { opcode: 0x73, mnemonic: "drem", args: [] },
    IntNegate: { opcode: 0x74, mnemonic: "ineg", args: [] },
    LongNegate: { opcode: 0x75, mnemonic: "lneg", args: [] },
    FloatNegate: { opcode: 0x76, mnemonic: "fneg", args: [] },
    DoubleNegate: { opcode: 0x77, mnemonic: "dneg", args: [] },
    IntShiftLeft: { opcode: 0x78, mnemonic: "ishl", args: [] },
    LongShiftLeft: { opcode: 0x79, mnemonic: "lshl", args: [] },
    IntArithmeticShiftRight: { opcode: 0x7A, mnemonic: "ishr", args: [] },
    LongArithmeticShiftRight: { opcode: 0x7B, mnemonic: "lshr", args: [] },
    IntLogicalShiftRight: { opcode: 0x7C, mnemonic: "iushr", args: [] },
    LongLogicalShiftRight: { opcode: 0x7D, mnemonic: "lushr", args: [] },
    IntAnd: { opcode: 0x7E, mnemonic: "iand", args: [] },
    LongAnd: { opcode: 0x7F, mnemonic: "land", args: [] },
    IntOr: { opcode: 0x80, mnemonic: "ior", args: [] },
    LongOr: { opcode: 0x81, mnemonic: "lor", args: [] },
    IntXor: { opcode: 0x82, mnemonic: "ixor", args: [] },
    LongXor: { opcode: 0x83, mnemonic: "lxor", args: [] },
    IntIncrement: {
        opcode: 0x84,
        mnemonic: "iinc",
        args: [
            /// Index into local variable array
            index: LocalVariableIndexByte,
            /// The amount to increment by
            increment_amount: Byte,
        ],
    },

    IntToLong: { opcode: 0x85, mnemonic: "i2l", args: [] },
    IntToFloat: { opcode: 0x86, mnemonic: "i2f", args: [] },
    IntToDouble: { opcode: 0x87, mnemonic: "i2d", args: [] },
    LongToInt: { opcode: 0x88, mnemonic: "l2i", args: [] },
    LongToFloat: { opcode: 0x89, mnemonic: "l2f", args: [] },
    LongToDouble: { opcode: 0x8A, mnemonic: "l2d", args: [] },
    FloatToInt: { opcode: 0x8B, mnemonic: "f2i", args: [] },
    FloatToLong: { opcode: 0x8C, mnemonic: "f2l", args: [] },
    FloatToDouble: { opcode: 0x8D, mnemonic: "f2d", args: [] },
    DoubleToInt: { opcode: 0x8E, mnemonic: "d2i", args: [] },
    DoubleToLong: { opcode: 0x8F, mnemonic: "d2l", args: [] },
    DoubleToFloat: { opcode: 0x90, mnemonic: "d2f", args: [] },
    IntToByte: { opcode: 0x91, mnemonic: "i2b", args: [] },
    IntToChar: { opcode: 0x92, mnemonic: "i2c", args: [] },
    IntToShort: { opcode: 0x93, mnemonic: "i2s", args: [] },

    LongCmp: { opcode: 0x94, mnemonic: "lcmp", args: [] },
    FloatCmpL: { opcode: 0x95, mnemonic: "fcmpl", args: [] },
    FloatCmpG: { opcode: 0x96, mnemonic: "fcmpg", args: [] },
    DoubleCmpL: { opcode: 0x97, mnemonic: "dcmpl", args: [] },
    DoubleCmpG: { opcode: 0x98, mnemonic: "dcmpg", args: [] },

    IfEqZero: { opcode: 0x99, mnemonic: "ifeq", args: [branch_offset: BranchOffset] },
    IfNeZero: { opcode: 0x9A, mnemonic: "ifne", args: [branch_offset: BranchOffset] },
    IfLtZero: { opcode: 0x9B, mnemonic: "iflt", args: [branch_offset: BranchOffset] },
    IfGeZero: { opcode: 0x9C, mnemonic: "ifge", args: [branch_offset: BranchOffset] },
    IfGtZero: { opcode: 0x9D, mnemonic: "ifgt", args: [branch_offset: BranchOffset] },
    IfLeZero: { opcode: 0x9E, mnemonic: "ifle", args: [branch_offset: BranchOffset] },
    /// Branch to an offset if two ints are equal
    /// Continues onwards if the condition fails
    IfICmpEq: { opcode: 0x9F, mnemonic: "if_icmpeq", args: [branch_offset: BranchOffset] },
    IfICmpNe: { opcode: 0xA0, mnemonic: "if_icmpne", args: [branch_offset: BranchOffset] },
    IfICmpLt: { opcode: 0xA1, mnemonic: "if_icmplt", args: [branch_offset: BranchOffset] },
    IfICmpGe: { opcode: 0xA2, mnemonic: "if_icmpge", args: [branch_offset: BranchOffset] },
    IfICmpGt: { opcode: 0xA3, mnemonic: "if_icmpgt", args: [branch_offset: BranchOffset] },
    IfICmpLe: { opcode: 0xA4, mnemonic: "if_icmple", args: [branch_offset: BranchOffset] },
    IfACmpEq: { opcode: 0xA5, mnemonic: "if_acmpeq", args: [branch_offset: BranchOffset] },
    IfACmpNe: { opcode: 0xA6, mnemonic: "if_acmpne", args: [branch_offset: BranchOffset] },
    Goto: { opcode: 0xA7, mnemonic: "goto", args: [branch_offset: BranchOffset] },
    /// Jump to a subroutine, pushing the return address
    Jsr: { opcode: 0xA8, mnemonic: "jsr", args: [branch_offset: BranchOffset] },
    /// Return from a subroutine, to the address held in the local variable
    Ret: { opcode: 0xA9, mnemonic: "ret", args: [index: LocalVariableIndexByte] },

    IntReturn: { opcode: 0xAC, mnemonic: "ireturn", args: [] },
    LongReturn: { opcode: 0xAD, mnemonic: "lreturn", args: [] },
    FloatReturn: { opcode: 0xAE, mnemonic: "freturn", args: [] },
    DoubleReturn: { opcode: 0xAF, mnemonic: "dreturn", args: [] },
    /// Return reference from method
    AReturn: { opcode: 0xB0, mnemonic: "areturn", args: [] },
    /// Return void from method
    Return: { opcode: 0xB1, mnemonic: "return", args: [] },

    GetStatic: {
        opcode: 0xB2,
        mnemonic: "getstatic",
        args: [index: ConstantPoolIndexRaw<FieldRefConstant>],
    },
    PutStaticField: {
        opcode: 0xB3,
        mnemonic: "putstatic",
        args: [index: ConstantPoolIndexRaw<FieldRefConstant>],
    },
    GetField: {
        opcode: 0xB4,
        mnemonic: "getfield",
        args: [index: ConstantPoolIndexRaw<FieldRefConstant>],
    },
    PutField: {
        opcode: 0xB5,
        mnemonic: "putfield",
        args: [index: ConstantPoolIndexRaw<FieldRefConstant>],
    },
    InvokeVirtual: {
        opcode: 0xB6,
        mnemonic: "invokevirtual",
        args: [index: ConstantPoolIndexRaw<MethodRefConstant>],
    },
    /// Invoke an instance initializer, a private method, or a superclass method
    InvokeSpecial: {
        opcode: 0xB7,
        mnemonic: "invokespecial",
        args: [index: ConstantPoolIndexRaw<MethodRefConstant>],
    },
    InvokeStatic: {
        opcode: 0xB8,
        mnemonic: "invokestatic",
        args: [index: ConstantPoolIndexRaw<MethodRefConstant>],
    },
    InvokeInterface: {
        opcode: 0xB9,
        mnemonic: "invokeinterface",
        args: [
            index: ConstantPoolIndexRaw<InterfaceMethodRefConstant>,
            /// The number of argument slots, including the object reference
            count: UnsignedByte,
            /// Must be zero
            zero: UnsignedByte,
        ],
    },
    InvokeDynamic: {
        opcode: 0xBA,
        mnemonic: "invokedynamic",
        args: [
            index: ConstantPoolIndexRaw<InvokeDynamicConstant>,
            zero: UnsignedShort,
        ],
    },

    New: {
        opcode: 0xBB,
        mnemonic: "new",
        args: [index: ConstantPoolIndexRaw<ClassConstant>],
    },
    /// Creates new array of primitive values
    NewArray: { opcode: 0xBC, mnemonic: "newarray", args: [atype: UnsignedByte] },
    /// Create a new array of reference
    ANewArray: {
        opcode: 0xBD,
        mnemonic: "anewarray",
        args: [index: ConstantPoolIndexRaw<ClassConstant>],
    },
    ArrayLength: { opcode: 0xBE, mnemonic: "arraylength", args: [] },
    AThrow: { opcode: 0xBF, mnemonic: "athrow", args: [] },
    /// Check whether an object is a specific type
    CheckCast: {
        opcode: 0xC0,
        mnemonic: "checkcast",
        args: [index: ConstantPoolIndexRaw<ClassConstant>],
    },
    /// Check if object is of a type
    InstanceOf: {
        opcode: 0xC1,
        mnemonic: "instanceof",
        args: [index: ConstantPoolIndexRaw<ClassConstant>],
    },
    MonitorEnter: { opcode: 0xC2, mnemonic: "monitorenter", args: [] },
    MonitorExit: { opcode: 0xC3, mnemonic: "monitorexit", args: [] },
    /// Create a new multidimensional array
    MultiANewArray: {
        opcode: 0xC5,
        mnemonic: "multianewarray",
        args: [
            index: ConstantPoolIndexRaw<ClassConstant>,
            dimensions: UnsignedByte,
        ],
    },
    IfNull: { opcode: 0xC6, mnemonic: "ifnull", args: [branch_offset: BranchOffset] },
    IfNonNull: { opcode: 0xC7, mnemonic: "ifnonnull", args: [branch_offset: BranchOffset] },
    GotoWide: { opcode: 0xC8, mnemonic: "goto_w", args: [branch_offset: BranchOffsetWide] },
    JsrWide: { opcode: 0xC9, mnemonic: "jsr_w", args: [branch_offset: BranchOffsetWide] },

    /// Reserved for debuggers
    Breakpoint: { opcode: 0xCA, mnemonic: "breakpoint", args: [] },
    /// Reserved for internal use by a virtual machine
    ImpDep1: { opcode: 0xFE, mnemonic: "impdep1", args: [] },
    /// Reserved for internal use by a virtual machine
    ImpDep2: { opcode: 0xFF, mnemonic: "impdep2", args: [] },
],
EXTERN: [
    Wide,
    LookupSwitch,
    TableSwitch,
],
WIDE_INSTR: [
    WideIntLoad: { opcode: IntLoad::OPCODE, mnemonic: "iload", args: [index: LocalVariableIndex] },
    WideLongLoad: { opcode: LongLoad::OPCODE, mnemonic: "lload", args: [index: LocalVariableIndex] },
    WideFloatLoad: { opcode: FloatLoad::OPCODE, mnemonic: "fload", args: [index: LocalVariableIndex] },
    WideDoubleLoad: { opcode: DoubleLoad::OPCODE, mnemonic: "dload", args: [index: LocalVariableIndex] },
    WideALoad: { opcode: ALoad::OPCODE, mnemonic: "aload", args: [index: LocalVariableIndex] },
    WideIntStore: { opcode: IntStore::OPCODE, mnemonic: "istore", args: [index: LocalVariableIndex] },
    WideLongStore: { opcode: LongStore::OPCODE, mnemonic: "lstore", args: [index: LocalVariableIndex] },
    WideFloatStore: { opcode: FloatStore::OPCODE, mnemonic: "fstore", args: [index: LocalVariableIndex] },
    WideDoubleStore: { opcode: DoubleStore::OPCODE, mnemonic: "dstore", args: [index: LocalVariableIndex] },
    WideAStore: { opcode: AStore::OPCODE, mnemonic: "astore", args: [index: LocalVariableIndex] },
    WideRet: { opcode: Ret::OPCODE, mnemonic: "ret", args: [index: LocalVariableIndex] },
    WideIntIncrement: {
        opcode: IntIncrement::OPCODE,
        mnemonic: "iinc",
        args: [
            /// Index into local variable array
            index: LocalVariableIndex,
            /// The amount to increment by
            increment_amount: Short,
        ],
    },
]}

// Redeclaration so Rust analyzer picks up on it properly
pub type Inst = InstM;
pub type WideInst = WideInstM;

/// The number of padding bytes after the opcode of a switch at `idx`, so that the operands are
/// aligned to four bytes from the start of the code.
fn switch_padding(idx: InstructionIndex) -> usize {
    // 0 -> 0
    // 1 -> 4 - 1 -> 3
    // 2 -> 4 - 2 -> 2
    // 3 -> 4 - 3 -> 1
    let after_opcode = (idx.as_usize() + 1) % 4;
    if after_opcode == 0 {
        0
    } else {
        4 - after_opcode
    }
}

/// Slice `len` bytes starting at `start`, or report that the instruction is truncated
fn switch_bytes(
    data: &[u8],
    opcode: RawOpcode,
    start: usize,
    len: usize,
) -> Result<&[u8], InstructionParseError> {
    let end = start.saturating_add(len);
    data.get(start..end)
        .ok_or(InstructionParseError::NotEnoughData {
            opcode,
            needed: end,
            had: data.len(),
        })
}

/// pop: [key: Int]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitch {
    /// 0-3
    padding: u8,
    pub default: i32,
    pub pairs: Vec<LookupSwitchPair>,
}
impl LookupSwitch {
    pub const OPCODE: RawOpcode = 0xAB;
    pub const MNEMONIC: &'static str = "lookupswitch";

    pub(crate) fn parse(
        data: &[u8],
        idx: InstructionIndex,
    ) -> Result<LookupSwitch, InstructionParseError> {
        let data = &data[idx.as_usize()..];
        let padding = switch_padding(idx);
        let header_start = 1 + padding;

        let header = switch_bytes(data, Self::OPCODE, header_start, Int::MEMORY_SIZE * 2)?;
        let default = Int::parse(&header[..4]);
        let npairs = Int::parse(&header[4..8]);
        let npairs =
            usize::try_from(npairs).map_err(|_| InstructionParseError::NegativeLookupSwitchCount {
                idx,
                npairs,
            })?;

        let pairs_start = header_start + Int::MEMORY_SIZE * 2;
        let pair_data = switch_bytes(
            data,
            Self::OPCODE,
            pairs_start,
            npairs.saturating_mul(LookupSwitchPair::MEMORY_SIZE),
        )?;
        let pairs = pair_data
            .chunks_exact(LookupSwitchPair::MEMORY_SIZE)
            .map(LookupSwitchPair::parse)
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let padding = padding as u8;
        Ok(Self {
            padding,
            default,
            pairs,
        })
    }
}
impl MemorySize for LookupSwitch {
    fn memory_size(&self) -> usize {
        1 + self.padding as usize
            // default
            + Int::MEMORY_SIZE
            // npairs
            + Int::MEMORY_SIZE
            + (self.pairs.len() * LookupSwitchPair::MEMORY_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitchPair {
    pub match_v: i32,
    pub offset: i32,
}
impl LookupSwitchPair {
    fn parse(data: &[u8]) -> LookupSwitchPair {
        let match_v = Int::parse(&data[..Int::MEMORY_SIZE]);
        let offset = Int::parse(&data[Int::MEMORY_SIZE..]);
        Self { match_v, offset }
    }
}
impl StaticMemorySize for LookupSwitchPair {
    const MEMORY_SIZE: usize = Int::MEMORY_SIZE + Int::MEMORY_SIZE;
}

/// pop: [index: Int]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSwitch {
    padding: u8,
    pub default: i32,
    pub low: i32,
    pub high: i32,
    pub jump_offsets: Vec<i32>,
}
impl TableSwitch {
    pub const OPCODE: RawOpcode = 0xAA;
    pub const MNEMONIC: &'static str = "tableswitch";

    pub(crate) fn parse(data: &[u8], idx: InstructionIndex) -> Result<Self, InstructionParseError> {
        let data = &data[idx.as_usize()..];
        let padding = switch_padding(idx);
        let header_start = 1 + padding;

        let header = switch_bytes(data, Self::OPCODE, header_start, Int::MEMORY_SIZE * 3)?;
        let default = Int::parse(&header[..4]);
        let low = Int::parse(&header[4..8]);
        let high = Int::parse(&header[8..12]);
        if high < low {
            return Err(InstructionParseError::InvalidTableSwitchRange { idx, low, high });
        }

        // high >= low so this is positive and at most 2^32
        let jump_table_count = usize::try_from(i64::from(high) - i64::from(low) + 1).map_err(
            |_| InstructionParseError::InvalidTableSwitchRange { idx, low, high },
        )?;
        let table_start = header_start + Int::MEMORY_SIZE * 3;
        let table = switch_bytes(
            data,
            Self::OPCODE,
            table_start,
            jump_table_count.saturating_mul(Int::MEMORY_SIZE),
        )?;
        let jump_offsets = table.chunks_exact(Int::MEMORY_SIZE).map(Int::parse).collect();

        #[allow(clippy::cast_possible_truncation)]
        let padding = padding as u8;
        Ok(Self {
            padding,
            default,
            low,
            high,
            jump_offsets,
        })
    }
}
impl MemorySize for TableSwitch {
    fn memory_size(&self) -> usize {
        1 + self.padding as usize
            + Int::MEMORY_SIZE
            + Int::MEMORY_SIZE
            + Int::MEMORY_SIZE
            + (self.jump_offsets.len() * Int::MEMORY_SIZE)
    }
}

/// Extends the local variable index of the wrapped instruction to two bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wide(pub WideInstM);
impl Wide {
    pub const OPCODE: RawOpcode = 0xC4;
    pub const MNEMONIC: &'static str = "wide";

    pub(crate) fn parse(data: &[u8], idx: InstructionIndex) -> Result<Self, InstructionParseError> {
        // skip over opcode
        Ok(Self(WideInstM::parse(data, InstructionIndex(idx.0 + 1))?))
    }
}
impl MemorySize for Wide {
    fn memory_size(&self) -> usize {
        1 + self.0.memory_size()
    }
}

/// A use of a local variable slot by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableUse {
    pub index: u16,
    /// Whether the value is a long or double, and so also uses `index + 1`
    pub wide: bool,
}
impl LocalVariableUse {
    fn single(index: impl Into<u16>) -> Option<LocalVariableUse> {
        Some(LocalVariableUse {
            index: index.into(),
            wide: false,
        })
    }

    fn double(index: impl Into<u16>) -> Option<LocalVariableUse> {
        Some(LocalVariableUse {
            index: index.into(),
            wide: true,
        })
    }
}

impl InstM {
    /// Whether execution can never continue to the next instruction in the code array
    #[must_use]
    pub fn is_unconditional_exit(&self) -> bool {
        matches!(
            self,
            Inst::IntReturn(_)
                | Inst::LongReturn(_)
                | Inst::FloatReturn(_)
                | Inst::DoubleReturn(_)
                | Inst::AReturn(_)
                | Inst::Return(_)
                | Inst::AThrow(_)
                | Inst::Goto(_)
                | Inst::GotoWide(_)
                | Inst::Ret(_)
                | Inst::Wide(Wide(WideInst::WideRet(_)))
                | Inst::TableSwitch(_)
                | Inst::LookupSwitch(_)
        )
    }

    /// Whether this stores a reference (or return address) into a local variable
    #[must_use]
    pub fn is_astore(&self) -> bool {
        matches!(
            self,
            Inst::AStore(_)
                | Inst::AStore0(_)
                | Inst::AStore1(_)
                | Inst::AStore2(_)
                | Inst::AStore3(_)
                | Inst::Wide(Wide(WideInst::WideAStore(_)))
        )
    }

    /// Whether this is one of the instructions reserved for use by implementations
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Inst::Breakpoint(_) | Inst::ImpDep1(_) | Inst::ImpDep2(_)
        )
    }

    /// The local variable slot that this instruction reads or writes, if any
    #[must_use]
    pub fn local_variable_index(&self) -> Option<LocalVariableUse> {
        match self {
            Inst::IntLoad(x) => LocalVariableUse::single(x.index),
            Inst::FloatLoad(x) => LocalVariableUse::single(x.index),
            Inst::ALoad(x) => LocalVariableUse::single(x.index),
            Inst::IntStore(x) => LocalVariableUse::single(x.index),
            Inst::FloatStore(x) => LocalVariableUse::single(x.index),
            Inst::AStore(x) => LocalVariableUse::single(x.index),
            Inst::Ret(x) => LocalVariableUse::single(x.index),
            Inst::IntIncrement(x) => LocalVariableUse::single(x.index),
            Inst::LongLoad(x) => LocalVariableUse::double(x.index),
            Inst::DoubleLoad(x) => LocalVariableUse::double(x.index),
            Inst::LongStore(x) => LocalVariableUse::double(x.index),
            Inst::DoubleStore(x) => LocalVariableUse::double(x.index),

            Inst::IntLoad0(_) | Inst::FloatLoad0(_) | Inst::ALoad0(_) => {
                LocalVariableUse::single(0u16)
            }
            Inst::IntLoad1(_) | Inst::FloatLoad1(_) | Inst::ALoad1(_) => {
                LocalVariableUse::single(1u16)
            }
            Inst::IntLoad2(_) | Inst::FloatLoad2(_) | Inst::ALoad2(_) => {
                LocalVariableUse::single(2u16)
            }
            Inst::IntLoad3(_) | Inst::FloatLoad3(_) | Inst::ALoad3(_) => {
                LocalVariableUse::single(3u16)
            }
            Inst::IntStore0(_) | Inst::FloatStore0(_) | Inst::AStore0(_) => {
                LocalVariableUse::single(0u16)
            }
            Inst::IntStore1(_) | Inst::FloatStore1(_) | Inst::AStore1(_) => {
                LocalVariableUse::single(1u16)
            }
            Inst::IntStore2(_) | Inst::FloatStore2(_) | Inst::AStore2(_) => {
                LocalVariableUse::single(2u16)
            }
            Inst::IntStore3(_) | Inst::FloatStore3(_) | Inst::AStore3(_) => {
                LocalVariableUse::single(3u16)
            }
            Inst::LongLoad0(_) | Inst::DoubleLoad0(_) | Inst::LongStore0(_) | Inst::DoubleStore0(_) => {
                LocalVariableUse::double(0u16)
            }
            Inst::LongLoad1(_) | Inst::DoubleLoad1(_) | Inst::LongStore1(_) | Inst::DoubleStore1(_) => {
                LocalVariableUse::double(1u16)
            }
            Inst::LongLoad2(_) | Inst::DoubleLoad2(_) | Inst::LongStore2(_) | Inst::DoubleStore2(_) => {
                LocalVariableUse::double(2u16)
            }
            Inst::LongLoad3(_) | Inst::DoubleLoad3(_) | Inst::LongStore3(_) | Inst::DoubleStore3(_) => {
                LocalVariableUse::double(3u16)
            }

            Inst::Wide(Wide(wide)) => match wide {
                WideInst::WideIntLoad(x) => LocalVariableUse::single(x.index),
                WideInst::WideFloatLoad(x) => LocalVariableUse::single(x.index),
                WideInst::WideALoad(x) => LocalVariableUse::single(x.index),
                WideInst::WideIntStore(x) => LocalVariableUse::single(x.index),
                WideInst::WideFloatStore(x) => LocalVariableUse::single(x.index),
                WideInst::WideAStore(x) => LocalVariableUse::single(x.index),
                WideInst::WideRet(x) => LocalVariableUse::single(x.index),
                WideInst::WideIntIncrement(x) => LocalVariableUse::single(x.index),
                WideInst::WideLongLoad(x) => LocalVariableUse::double(x.index),
                WideInst::WideDoubleLoad(x) => LocalVariableUse::double(x.index),
                WideInst::WideLongStore(x) => LocalVariableUse::double(x.index),
                WideInst::WideDoubleStore(x) => LocalVariableUse::double(x.index),
            },
            _ => None,
        }
    }

    /// The constant pool entry this instruction refers to, if any
    #[must_use]
    pub fn constant_pool_index(&self) -> Option<ConstantPoolIndexRaw<ConstantInfo>> {
        Some(match self {
            Inst::LoadConstant(x) => x.index,
            Inst::LoadConstantWide(x) => x.index,
            Inst::LoadConstant2Wide(x) => x.index,
            Inst::GetStatic(x) => x.index.into_generic(),
            Inst::PutStaticField(x) => x.index.into_generic(),
            Inst::GetField(x) => x.index.into_generic(),
            Inst::PutField(x) => x.index.into_generic(),
            Inst::InvokeVirtual(x) => x.index.into_generic(),
            Inst::InvokeSpecial(x) => x.index.into_generic(),
            Inst::InvokeStatic(x) => x.index.into_generic(),
            Inst::InvokeInterface(x) => x.index.into_generic(),
            Inst::InvokeDynamic(x) => x.index.into_generic(),
            Inst::New(x) => x.index.into_generic(),
            Inst::ANewArray(x) => x.index.into_generic(),
            Inst::CheckCast(x) => x.index.into_generic(),
            Inst::InstanceOf(x) => x.index.into_generic(),
            Inst::MultiANewArray(x) => x.index.into_generic(),
            _ => return None,
        })
    }

    /// The branch offsets, relative to the start of this instruction.
    /// For switches the default comes first, followed by the table.
    #[must_use]
    pub fn branch_offsets(&self) -> Vec<i32> {
        match self {
            Inst::IfEqZero(x) => vec![x.branch_offset.into()],
            Inst::IfNeZero(x) => vec![x.branch_offset.into()],
            Inst::IfLtZero(x) => vec![x.branch_offset.into()],
            Inst::IfGeZero(x) => vec![x.branch_offset.into()],
            Inst::IfGtZero(x) => vec![x.branch_offset.into()],
            Inst::IfLeZero(x) => vec![x.branch_offset.into()],
            Inst::IfICmpEq(x) => vec![x.branch_offset.into()],
            Inst::IfICmpNe(x) => vec![x.branch_offset.into()],
            Inst::IfICmpLt(x) => vec![x.branch_offset.into()],
            Inst::IfICmpGe(x) => vec![x.branch_offset.into()],
            Inst::IfICmpGt(x) => vec![x.branch_offset.into()],
            Inst::IfICmpLe(x) => vec![x.branch_offset.into()],
            Inst::IfACmpEq(x) => vec![x.branch_offset.into()],
            Inst::IfACmpNe(x) => vec![x.branch_offset.into()],
            Inst::IfNull(x) => vec![x.branch_offset.into()],
            Inst::IfNonNull(x) => vec![x.branch_offset.into()],
            Inst::Goto(x) => vec![x.branch_offset.into()],
            Inst::Jsr(x) => vec![x.branch_offset.into()],
            Inst::GotoWide(x) => vec![x.branch_offset],
            Inst::JsrWide(x) => vec![x.branch_offset],
            Inst::TableSwitch(x) => std::iter::once(x.default)
                .chain(x.jump_offsets.iter().copied())
                .collect(),
            Inst::LookupSwitch(x) => std::iter::once(x.default)
                .chain(x.pairs.iter().map(|p| p.offset))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops() {
        check_instruction_duplicates();
    }

    #[test]
    fn fixed_size_instructions() {
        let code = [0x84, 2, 0xFF];
        let inst = Inst::parse(&code, InstructionIndex(0)).unwrap();
        assert_eq!(
            inst,
            Inst::IntIncrement(IntIncrement {
                index: 2,
                increment_amount: -1
            })
        );
        assert_eq!(inst.memory_size(), 3);
        assert_eq!(inst.name(), "iinc");

        let truncated = [0x11, 0x01];
        assert!(matches!(
            Inst::parse(&truncated, InstructionIndex(0)),
            Err(InstructionParseError::NotEnoughData {
                opcode: 0x11,
                needed: 3,
                had: 2
            })
        ));

        assert!(matches!(
            Inst::parse(&[0xCB], InstructionIndex(0)),
            Err(InstructionParseError::UnknownOpcode { opcode: 0xCB, .. })
        ));
    }

    #[test]
    fn wide_instructions() {
        let code = [0xC4, 0x84, 0x01, 0x00, 0xFF, 0xFE];
        let inst = Inst::parse(&code, InstructionIndex(0)).unwrap();
        assert_eq!(inst.memory_size(), 6);
        assert_eq!(
            inst.local_variable_index(),
            Some(LocalVariableUse {
                index: 256,
                wide: false
            })
        );

        let code = [0xC4, 0x37, 0x00, 0x05];
        let inst = Inst::parse(&code, InstructionIndex(0)).unwrap();
        assert_eq!(inst.memory_size(), 4);
        assert_eq!(
            inst.local_variable_index(),
            Some(LocalVariableUse {
                index: 5,
                wide: true
            })
        );

        assert!(matches!(
            Inst::parse(&[0xC4, 0x00], InstructionIndex(0)),
            Err(InstructionParseError::UnknownWideOpcode { opcode: 0x00, .. })
        ));
    }

    #[test]
    fn switch_padding_depends_on_position() {
        // nop, then a lookupswitch at offset 1 with two bytes of padding
        let mut code = vec![0x00, 0xAB, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&7i32.to_be_bytes());
        code.extend_from_slice(&12i32.to_be_bytes());
        let inst = Inst::parse(&code, InstructionIndex(1)).unwrap();
        assert_eq!(inst.memory_size(), code.len() - 1);
        assert_eq!(inst.branch_offsets(), vec![20, 12]);

        let mut table = vec![0xAA, 0, 0, 0];
        table.extend_from_slice(&8i32.to_be_bytes());
        table.extend_from_slice(&5i32.to_be_bytes());
        table.extend_from_slice(&4i32.to_be_bytes());
        assert!(matches!(
            Inst::parse(&table, InstructionIndex(0)),
            Err(InstructionParseError::InvalidTableSwitchRange {
                low: 5,
                high: 4,
                ..
            })
        ));
    }
}
