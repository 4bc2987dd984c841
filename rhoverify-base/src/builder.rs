//! Assembling class models in memory.
//!
//! Constants are deduplicated: asking for the same constant twice gives back the same index.
//! [`ClassBuilder::push_raw`] bypasses this, for building deliberately malformed pools.

use indexmap::IndexMap;

use crate::{
    attribute::{Attribute, AttributeInfo, CodeAttribute},
    class::{
        ClassAccessFlags, ClassFile, ClassFileVersion, FieldAccessFlags, FieldInfo,
        MethodAccessFlags, MethodInfo,
    },
    constant_pool::{
        ClassConstant, ConstantInfo, ConstantPool, ConstantPoolIndexRaw, DoubleConstant,
        FieldRefConstant, FloatConstant, IntegerConstant, InterfaceMethodRefConstant,
        InvokeDynamicConstant, DynamicConstant, LongConstant, MethodHandleConstant,
        MethodRefConstant, MethodTypeConstant, NameAndTypeConstant, StringConstant, Utf8Constant,
    },
};

/// Key used to find an existing equivalent constant.
/// Floats are keyed by their bits so that they can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
}

#[derive(Debug, Clone)]
pub struct ClassBuilder {
    version: ClassFileVersion,
    pool: ConstantPool,
    known: IndexMap<PoolKey, ConstantPoolIndexRaw<ConstantInfo>>,
    access_flags: ClassAccessFlags,
    this_class: ConstantPoolIndexRaw<ClassConstant>,
    super_class: ConstantPoolIndexRaw<ClassConstant>,
    interfaces: Vec<ConstantPoolIndexRaw<ClassConstant>>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: Vec<AttributeInfo>,
}
impl ClassBuilder {
    /// A public class with `ACC_SUPER` set and version 52.0.
    /// `super_class` is `None` only for the root of the hierarchy.
    #[must_use]
    pub fn new(name: &str, super_class: Option<&str>) -> ClassBuilder {
        let mut builder = ClassBuilder {
            version: ClassFileVersion {
                major: 52,
                minor: 0,
            },
            pool: ConstantPool::new(),
            known: IndexMap::new(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: ConstantPoolIndexRaw::new(0),
            super_class: ConstantPoolIndexRaw::new(0),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class(name);
        if let Some(super_class) = super_class {
            builder.super_class = builder.class(super_class);
        }
        builder
    }

    /// Start an interface, which always has `java/lang/Object` as its superclass
    #[must_use]
    pub fn new_interface(name: &str) -> ClassBuilder {
        let mut builder = ClassBuilder::new(name, Some("java/lang/Object"));
        builder.access_flags =
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
        builder
    }

    pub fn set_version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.version = ClassFileVersion { major, minor };
        self
    }

    pub fn set_access_flags(&mut self, flags: ClassAccessFlags) -> &mut Self {
        self.access_flags = flags;
        self
    }

    /// Point `this_class` at an arbitrary index
    pub fn set_this_class(&mut self, index: ConstantPoolIndexRaw<ClassConstant>) -> &mut Self {
        self.this_class = index;
        self
    }

    /// Point `super_class` at an arbitrary index
    pub fn set_super_class(&mut self, index: ConstantPoolIndexRaw<ClassConstant>) -> &mut Self {
        self.super_class = index;
        self
    }

    pub fn add_interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn intern(&mut self, key: PoolKey, info: ConstantInfo) -> ConstantPoolIndexRaw<ConstantInfo> {
        if let Some(index) = self.known.get(&key) {
            return *index;
        }

        let index = self.pool.push(info);
        self.known.insert(key, index);
        index
    }

    /// Add an entry without checking for an existing equivalent one
    pub fn push_raw(&mut self, info: impl Into<ConstantInfo>) -> ConstantPoolIndexRaw<ConstantInfo> {
        self.pool.push(info)
    }

    pub fn utf8(&mut self, text: &str) -> ConstantPoolIndexRaw<Utf8Constant> {
        self.intern(
            PoolKey::Utf8(text.to_owned()),
            Utf8Constant::from_text(text).into(),
        )
        .cast()
    }

    pub fn integer(&mut self, value: i32) -> ConstantPoolIndexRaw<IntegerConstant> {
        self.intern(PoolKey::Integer(value), IntegerConstant { value }.into())
            .cast()
    }

    pub fn float(&mut self, value: f32) -> ConstantPoolIndexRaw<FloatConstant> {
        self.intern(PoolKey::Float(value.to_bits()), FloatConstant { value }.into())
            .cast()
    }

    pub fn long(&mut self, value: i64) -> ConstantPoolIndexRaw<LongConstant> {
        self.intern(PoolKey::Long(value), LongConstant { value }.into())
            .cast()
    }

    pub fn double(&mut self, value: f64) -> ConstantPoolIndexRaw<DoubleConstant> {
        self.intern(PoolKey::Double(value.to_bits()), DoubleConstant { value }.into())
            .cast()
    }

    pub fn class(&mut self, name: &str) -> ConstantPoolIndexRaw<ClassConstant> {
        let name_index = self.utf8(name);
        self.intern(
            PoolKey::Class(name_index.get()),
            ClassConstant { name_index }.into(),
        )
        .cast()
    }

    pub fn string(&mut self, text: &str) -> ConstantPoolIndexRaw<StringConstant> {
        let string_index = self.utf8(text);
        self.intern(
            PoolKey::String(string_index.get()),
            StringConstant { string_index }.into(),
        )
        .cast()
    }

    pub fn name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<NameAndTypeConstant> {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(
            PoolKey::NameAndType(name_index.get(), descriptor_index.get()),
            NameAndTypeConstant {
                name_index,
                descriptor_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<FieldRefConstant> {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::FieldRef(class_index.get(), name_and_type_index.get()),
            FieldRefConstant {
                class_index,
                name_and_type_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<MethodRefConstant> {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::MethodRef(class_index.get(), name_and_type_index.get()),
            MethodRefConstant {
                class_index,
                name_and_type_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<InterfaceMethodRefConstant> {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::InterfaceMethodRef(class_index.get(), name_and_type_index.get()),
            InterfaceMethodRefConstant {
                class_index,
                name_and_type_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn method_type(&mut self, descriptor: &str) -> ConstantPoolIndexRaw<MethodTypeConstant> {
        let descriptor_index = self.utf8(descriptor);
        self.intern(
            PoolKey::MethodType(descriptor_index.get()),
            MethodTypeConstant { descriptor_index }.into(),
        )
        .cast()
    }

    pub fn method_handle(
        &mut self,
        reference_kind: u8,
        reference_index: ConstantPoolIndexRaw<ConstantInfo>,
    ) -> ConstantPoolIndexRaw<MethodHandleConstant> {
        self.intern(
            PoolKey::MethodHandle(reference_kind, reference_index.get()),
            MethodHandleConstant {
                reference_kind,
                reference_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn dynamic(
        &mut self,
        bootstrap_method_attr_index: u16,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<DynamicConstant> {
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::Dynamic(bootstrap_method_attr_index, name_and_type_index.get()),
            DynamicConstant {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
            .into(),
        )
        .cast()
    }

    pub fn invoke_dynamic(
        &mut self,
        bootstrap_method_attr_index: u16,
        name: &str,
        descriptor: &str,
    ) -> ConstantPoolIndexRaw<InvokeDynamicConstant> {
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::InvokeDynamic(bootstrap_method_attr_index, name_and_type_index.get()),
            InvokeDynamicConstant {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
            .into(),
        )
        .cast()
    }

    /// Wrap the attribute with the name it is expected to have.
    /// Unknown attributes are named `Unknown`.
    pub fn attribute(&mut self, data: Attribute) -> AttributeInfo {
        let name = data.expected_name().unwrap_or("Unknown");
        self.named_attribute(name, data)
    }

    pub fn named_attribute(&mut self, name: &str, data: Attribute) -> AttributeInfo {
        let name_index = self.utf8(name);
        AttributeInfo::new(name_index, data)
    }

    /// Add a field, returning its index
    pub fn add_field(&mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> usize {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self.fields.len() - 1
    }

    /// Add an attribute to the field at the index.
    /// Does nothing if there is no such field.
    pub fn add_field_attribute(&mut self, field: usize, data: Attribute) -> &mut Self {
        let attribute = self.attribute(data);
        if let Some(field) = self.fields.get_mut(field) {
            field.attributes.push(attribute);
        }
        self
    }

    /// Add a method, with a Code attribute if `code` is given, returning its index
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<CodeAttribute>,
    ) -> usize {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let attributes = code
            .map(|code| vec![self.attribute(Attribute::Code(code))])
            .unwrap_or_default();
        self.methods.push(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        self.methods.len() - 1
    }

    /// Add an attribute to the method at the index.
    /// Does nothing if there is no such method.
    pub fn add_method_attribute(&mut self, method: usize, data: Attribute) -> &mut Self {
        let attribute = self.attribute(data);
        if let Some(method) = self.methods.get_mut(method) {
            method.attributes.push(attribute);
        }
        self
    }

    pub fn add_class_attribute(&mut self, data: Attribute) -> &mut Self {
        let attribute = self.attribute(data);
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn build(self) -> ClassFile {
        ClassFile {
            version: self.version,
            const_pool: self.pool,
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }
}

/// A Code attribute with the given bytes and no exception table or attributes
#[must_use]
pub fn code(max_stack: u16, max_locals: u16, code: Vec<u8>) -> CodeAttribute {
    CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table: Vec::new(),
        attributes: Vec::new(),
    }
}
