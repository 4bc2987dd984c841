//! Attributes attached to classes, fields, methods and code.
//!
//! The set of attributes that are understood is closed. Anything else is kept as
//! [`Attribute::Unknown`] so that it can be reported on and otherwise ignored.

use crate::{
    class::InnerClassAccessFlags,
    constant_pool::{ClassConstant, ConstantInfo, ConstantPoolIndexRaw, Utf8Constant},
};

pub const CODE: &str = "Code";
pub const CONSTANT_VALUE: &str = "ConstantValue";
pub const EXCEPTIONS: &str = "Exceptions";
pub const SYNTHETIC: &str = "Synthetic";
pub const DEPRECATED: &str = "Deprecated";
pub const SOURCE_FILE: &str = "SourceFile";
pub const INNER_CLASSES: &str = "InnerClasses";
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    /// The name the attribute was stored under
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub data: Attribute,
}
impl AttributeInfo {
    #[must_use]
    pub fn new(name_index: ConstantPoolIndexRaw<Utf8Constant>, data: Attribute) -> AttributeInfo {
        AttributeInfo { name_index, data }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code(CodeAttribute),
    ConstantValue(ConstantValueAttribute),
    Exceptions(ExceptionsAttribute),
    Synthetic,
    Deprecated,
    SourceFile(SourceFileAttribute),
    InnerClasses(InnerClassesAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    Unknown { bytes: Vec<u8> },
}
impl Attribute {
    /// The name that an attribute of this kind must be stored under.
    /// `None` for unknown attributes, which may have any name.
    #[must_use]
    pub fn expected_name(&self) -> Option<&'static str> {
        Some(match self {
            Attribute::Code(_) => CODE,
            Attribute::ConstantValue(_) => CONSTANT_VALUE,
            Attribute::Exceptions(_) => EXCEPTIONS,
            Attribute::Synthetic => SYNTHETIC,
            Attribute::Deprecated => DEPRECATED,
            Attribute::SourceFile(_) => SOURCE_FILE,
            Attribute::InnerClasses(_) => INNER_CLASSES,
            Attribute::LineNumberTable(_) => LINE_NUMBER_TABLE,
            Attribute::LocalVariableTable(_) => LOCAL_VARIABLE_TABLE,
            Attribute::Unknown { .. } => return None,
        })
    }

    /// Name used when describing the kind of attribute
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.expected_name().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn as_code(&self) -> Option<&CodeAttribute> {
        match self {
            Attribute::Code(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    /// Exclusive
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero means that it catches everything
    pub catch_type: ConstantPoolIndexRaw<ClassConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantValueAttribute {
    /// Must point at a constant of the kind appropriate for the field's type
    pub constant_value_index: ConstantPoolIndexRaw<ConstantInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionsAttribute {
    pub exception_index_table: Vec<ConstantPoolIndexRaw<ClassConstant>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFileAttribute {
    pub source_file_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassesAttribute {
    pub classes: Vec<InnerClassEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner_class_info_index: ConstantPoolIndexRaw<ClassConstant>,
    /// Zero if the inner class is not a member
    pub outer_class_info_index: ConstantPoolIndexRaw<ClassConstant>,
    /// Zero if the inner class is anonymous
    pub inner_name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub inner_class_access_flags: InnerClassAccessFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTableAttribute {
    pub entries: Vec<LineNumberEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTableAttribute {
    pub entries: Vec<LocalVariableEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub descriptor_index: ConstantPoolIndexRaw<Utf8Constant>,
    /// The local variable slot
    pub index: u16,
}
