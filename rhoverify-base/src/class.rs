use std::borrow::Cow;

use crate::{
    attribute::{AttributeInfo, CodeAttribute},
    code::method::{MethodDescriptor, MethodDescriptorError},
    constant_pool::{ClassConstant, ConstantPool, ConstantPoolIndexRaw, Utf8Constant},
};

bitflags::bitflags! {
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by `invokespecial`
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags::bitflags! {
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags::bitflags! {
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags::bitflags! {
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

/// Java 1.1
pub const MAJOR_MIN: u16 = 45;
/// Java 5, `ldc` of a class constant
pub const MAJOR_1_5: u16 = 49;
/// Java 7, `ldc` of method handles and method types
pub const MAJOR_1_7: u16 = 51;
/// Java 8, interfaces may have private and default methods
pub const MAJOR_1_8: u16 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassFileVersion {
    pub major: u16,
    pub minor: u16,
}

#[derive(Debug, Clone)]
pub enum ClassFileIndexError {
    InvalidThisClassIndex,
    InvalidThisClassNameIndex,
    InvalidSuperClassIndex,
    InvalidSuperClassNameIndex,
    InvalidInterfaceIndex(ConstantPoolIndexRaw<ClassConstant>),
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub descriptor_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub attributes: Vec<AttributeInfo>,
}
impl FieldInfo {
    #[must_use]
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Option<Cow<'a, str>> {
        pool.get_text(self.name_index)
    }

    #[must_use]
    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Option<Cow<'a, str>> {
        pool.get_text(self.descriptor_index)
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub descriptor_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub attributes: Vec<AttributeInfo>,
}
impl MethodInfo {
    #[must_use]
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Option<Cow<'a, str>> {
        pool.get_text(self.name_index)
    }

    #[must_use]
    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Option<Cow<'a, str>> {
        pool.get_text(self.descriptor_index)
    }

    /// Parse the descriptor. `None` if the index does not lead to text.
    #[must_use]
    pub fn parsed_descriptor(
        &self,
        pool: &ConstantPool,
    ) -> Option<Result<MethodDescriptor, MethodDescriptorError>> {
        self.descriptor(pool)
            .map(|desc| MethodDescriptor::from_text(desc.as_ref()))
    }

    /// The first Code attribute, if there is one.
    #[must_use]
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|x| x.data.as_code())
    }

    #[must_use]
    /// Whether the method should have code or not.
    /// Note that this does not determine if there actually is code, there could be a malformed
    /// class file, but it does tell us if there _should_ be.
    pub fn should_have_code(&self) -> bool {
        // native and abstract methods do not have code
        !self.access_flags.contains(MethodAccessFlags::NATIVE)
            && !self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }
}

/// A class as produced by a class file parser. This is never mutated by verification.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: ClassFileVersion,
    pub const_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantPoolIndexRaw<ClassConstant>,
    /// Zero if there is no super class
    pub super_class: ConstantPoolIndexRaw<ClassConstant>,
    pub interfaces: Vec<ConstantPoolIndexRaw<ClassConstant>>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}
impl ClassFile {
    #[must_use]
    pub fn get_text_t(&self, i: ConstantPoolIndexRaw<Utf8Constant>) -> Option<Cow<'_, str>> {
        self.const_pool.get_text(i)
    }

    #[must_use]
    pub fn get_method(&self, index: usize) -> Option<&MethodInfo> {
        self.methods.get(index)
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Whether this is a class (and not an interface)
    #[must_use]
    pub fn is_class(&self) -> bool {
        !self.is_interface()
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::FINAL)
    }

    #[must_use]
    pub fn is_super(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::SUPER)
    }

    pub fn get_this_class_name(&self) -> Result<Cow<'_, str>, ClassFileIndexError> {
        let this_class = self
            .const_pool
            .get_t(self.this_class)
            .ok_or(ClassFileIndexError::InvalidThisClassIndex)?;
        self.get_text_t(this_class.name_index)
            .ok_or(ClassFileIndexError::InvalidThisClassNameIndex)
    }

    /// The name of this class, or a placeholder if the class file is malformed.
    /// Use [`ClassFile::get_this_class_name`] where the difference matters.
    #[must_use]
    pub fn name_or_placeholder(&self) -> Cow<'_, str> {
        self.get_this_class_name()
            .unwrap_or(Cow::Borrowed("<<unnamed class>>"))
    }

    pub fn get_super_class_name(&self) -> Result<Option<Cow<'_, str>>, ClassFileIndexError> {
        // There is no base class
        // Only the root class should have no base class, but we don't do that verification here
        if self.super_class.is_zero() {
            return Ok(None);
        }

        let super_class = self
            .const_pool
            .get_t(self.super_class)
            .ok_or(ClassFileIndexError::InvalidSuperClassIndex)?;
        self.get_text_t(super_class.name_index)
            .map(Some)
            .ok_or(ClassFileIndexError::InvalidSuperClassNameIndex)
    }

    pub fn get_interface_names(&self) -> Result<Vec<Cow<'_, str>>, ClassFileIndexError> {
        self.interfaces
            .iter()
            .map(|&index| {
                self.const_pool
                    .get_class_name(index)
                    .ok_or(ClassFileIndexError::InvalidInterfaceIndex(index))
            })
            .collect()
    }

    /// Find the index of a method with the exact name and descriptor
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            m.name(&self.const_pool).as_deref() == Some(name)
                && m.descriptor(&self.const_pool).as_deref() == Some(descriptor)
        })
    }
}
