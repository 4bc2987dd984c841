//! Pass 2: the class as a whole, without looking at the instructions.
//!
//! This runs four steps, each of which may need Pass 1 of other classes:
//! 1. Every constant pool entry, member and attribute is well-formed and refers to entries of
//!    the kind it should.
//! 2. Field and method references use legal names and descriptors.
//! 3. The superclass chain reaches the root without cycles or final ancestors.
//! 4. No final method is overridden.
//!
//! Along the way the LocalVariableTables of each method are collected.

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use rhoverify_base::{
    attribute::{Attribute, AttributeInfo, CodeAttribute},
    class::{
        ClassAccessFlags, FieldAccessFlags, FieldInfo, MethodAccessFlags, MethodInfo, MAJOR_1_7,
        MAJOR_1_8,
    },
    code::method::{DescriptorType, DescriptorTypeBasic, MethodDescriptor},
    constant_pool::{
        ClassConstant, ConstantInfo, ConstantPoolIndexRaw, FieldRefConstant,
        InterfaceMethodRefConstant, KindName, MethodHandleKind, MethodRefConstant,
        NameAndTypeConstant, Utf8Constant,
    },
    util::{
        valid_class_method_name, valid_class_name, valid_field_name, valid_interface_method_name,
        valid_java_identifier, valid_method_name, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME,
    },
    ClassFile,
};
use tracing::{span, Level};

use crate::{
    error::{class_violation, CheckResult, ConstraintViolation, FatalError},
    formatter::{node_to_string, Node},
    local_vars::{AddLocalVariableError, LocalVariablesInfo},
    outcome::Outcome,
    registry::Registry,
    resolve,
    verifier::{MethodLocalVariables, Verifier},
};

use super::{conclude, Pass, PassVerifier};

pub(crate) struct Pass2<'a> {
    pub registry: &'a Registry,
    pub verifier: &'a Verifier,
}
impl<'a> Pass for Pass2<'a> {
    fn do_verify(&self, state: &PassVerifier) -> Result<Outcome, FatalError> {
        let class_name = self.verifier.class_name();
        let span = span!(Level::TRACE, "pass2", class = class_name);
        let _enter = span.enter();

        if !self.verifier.do_pass1(self.registry)?.is_ok() {
            return Ok(Outcome::not_yet());
        }

        let class = self
            .registry
            .find_class(class_name)
            .ok_or_else(|| FatalError::MissingClass(class_name.to_owned()))?;

        let checker = Checker {
            registry: self.registry,
            state,
            class: &class,
            class_name,
        };
        let mut local_variables = vec![None; class.methods.len()];
        let result = checker.check(&mut local_variables);
        if result.is_ok() {
            self.verifier.set_local_variables(local_variables);
        }
        conclude(result)
    }
}

struct Checker<'a> {
    registry: &'a Registry,
    state: &'a PassVerifier,
    class: &'a Rc<ClassFile>,
    class_name: &'a str,
}
impl<'a> Checker<'a> {
    fn check(&self, local_variables: &mut MethodLocalVariables) -> CheckResult {
        self.check_pool_shape(local_variables)?;
        self.check_member_references()?;
        self.check_superclass_chain()?;
        self.check_final_overrides()?;
        Ok(())
    }

    fn advise(&self, message: String) {
        tracing::debug!("{}", message);
        self.state.add_message(message);
    }

    fn describe(&self, node: Node<'_>) -> String {
        node_to_string(self.class, node)
    }

    /// Get the entry, rejecting if it is out of range or of the wrong kind
    fn get_t<T: KindName>(&self, index: ConstantPoolIndexRaw<T>, context: &str) -> CheckResult<&'a T>
    where
        &'a T: TryFrom<&'a ConstantInfo>,
    {
        let pool = &self.class.const_pool;
        pool.get_t(index).ok_or_else(|| {
            let found = pool
                .get(index)
                .map_or("nothing (out of range)", ConstantInfo::kind_name);
            ConstraintViolation::class(format!(
                "Illegal constant pool index '{}' in {}: expected a {} but found {}.",
                index,
                context,
                T::KIND_NAME,
                found
            ))
            .into()
        })
    }

    fn text(&self, index: ConstantPoolIndexRaw<Utf8Constant>, context: &str) -> CheckResult<Cow<'a, str>> {
        let utf8 = self.get_t(index, context)?;
        match utf8.as_text() {
            Some(text) => Ok(text),
            None => class_violation(format!(
                "CONSTANT_Utf8 entry '{}' used in {} is not valid modified UTF-8.",
                index, context
            )),
        }
    }

    fn class_name_at(&self, index: ConstantPoolIndexRaw<ClassConstant>, context: &str) -> CheckResult<Cow<'a, str>> {
        let class = self.get_t(index, context)?;
        self.text(class.name_index, context)
    }

    fn name_and_type(
        &self,
        index: ConstantPoolIndexRaw<NameAndTypeConstant>,
        context: &str,
    ) -> CheckResult<(Cow<'a, str>, Cow<'a, str>)> {
        let nat = self.get_t(index, context)?;
        Ok((
            self.text(nat.name_index, context)?,
            self.text(nat.descriptor_index, context)?,
        ))
    }

    /// Check that the attribute is stored under the name that its kind requires, returning the
    /// name
    fn attribute_name(&self, attribute: &AttributeInfo, owner: &str) -> CheckResult<Cow<'a, str>> {
        let name = self.text(attribute.name_index, &format!("an attribute of {}", owner))?;
        if let Some(expected) = attribute.data.expected_name() {
            if name != expected {
                return class_violation(format!(
                    "Attribute '{}' of {} is stored under the name '{}'.",
                    expected, owner, name
                ));
            }
        }
        Ok(name)
    }

    fn pass1_of(&self, class_name: &str) -> Result<Outcome, FatalError> {
        self.registry.get(class_name).do_pass1()
    }

    /// Check that a class used as an exception exists and descends from the throwable root
    fn check_throwable(&self, class_name: &str, usage: &str) -> CheckResult {
        let outcome = self.pass1_of(class_name)?;
        if !outcome.is_ok() {
            return class_violation(format!(
                "{} names class '{}' which does not pass verification pass 1: {}",
                usage,
                class_name,
                outcome.message()
            ));
        }

        let throwable = &self.registry.config().throwable_class;
        if !resolve::is_subclass_of(self.registry, class_name, throwable) {
            return class_violation(format!(
                "{} names class '{}' which is not a subclass of '{}'.",
                usage, class_name, throwable
            ));
        }
        Ok(())
    }

    fn check_pool_shape(&self, local_variables: &mut MethodLocalVariables) -> CheckResult {
        self.check_class_flags()?;
        self.check_constant_pool()?;
        self.check_interfaces()?;
        self.check_class_attributes()?;

        let mut fields = HashSet::new();
        for field in &self.class.fields {
            self.check_field(field, &mut fields)?;
        }

        let mut methods = HashSet::new();
        for (method, local_variables) in self.class.methods.iter().zip(local_variables.iter_mut()) {
            self.check_method(method, &mut methods, local_variables)?;
        }

        Ok(())
    }

    fn check_class_flags(&self) -> CheckResult {
        let flags = self.class.access_flags;
        if flags.contains(ClassAccessFlags::INTERFACE) {
            if !flags.contains(ClassAccessFlags::ABSTRACT) {
                return class_violation(format!(
                    "Interface '{}' must have the ACC_ABSTRACT modifier set.",
                    self.class_name
                ));
            }
            if flags.intersects(ClassAccessFlags::FINAL | ClassAccessFlags::ENUM) {
                return class_violation(format!(
                    "Interface '{}' must not have the ACC_FINAL or ACC_ENUM modifiers set.",
                    self.class_name
                ));
            }
            if flags.contains(ClassAccessFlags::SUPER) {
                self.advise(format!(
                    "Interface '{}' has the ACC_SUPER modifier set, which has no meaning for interfaces.",
                    self.class_name
                ));
            }
        } else {
            if flags.contains(ClassAccessFlags::ANNOTATION) {
                return class_violation(format!(
                    "Class '{}' has the ACC_ANNOTATION modifier set but is not an interface.",
                    self.class_name
                ));
            }
            if flags.contains(ClassAccessFlags::FINAL | ClassAccessFlags::ABSTRACT) {
                return class_violation(format!(
                    "Class '{}' must not have both the ACC_FINAL and ACC_ABSTRACT modifiers set.",
                    self.class_name
                ));
            }
        }
        Ok(())
    }

    fn check_constant_pool(&self) -> CheckResult {
        let major = self.class.version.major;
        for (index, info) in self.class.const_pool.iter() {
            let context = format!("constant pool entry #{} ({})", index, info.kind_name());
            match info {
                ConstantInfo::Utf8(v) => {
                    if v.as_text().is_none() {
                        return class_violation(format!(
                            "Constant pool entry #{} is not valid modified UTF-8.",
                            index
                        ));
                    }
                }
                ConstantInfo::Integer(_) | ConstantInfo::Float(_) | ConstantInfo::Unusable => {}
                ConstantInfo::Long(_) | ConstantInfo::Double(_) => {
                    let upper = index
                        .get()
                        .checked_add(1)
                        .map(ConstantPoolIndexRaw::<ConstantInfo>::new);
                    let has_upper = upper.map_or(false, |upper| {
                        matches!(self.class.const_pool.get(upper), Some(ConstantInfo::Unusable))
                    });
                    if !has_upper {
                        return class_violation(format!(
                            "Constant pool entry #{} ({}) must be followed by an unusable entry, as it occupies two slots.",
                            index,
                            info.kind_name()
                        ));
                    }
                }
                ConstantInfo::Class(v) => {
                    let name = self.text(v.name_index, &context)?;
                    if !valid_class_name(&name) {
                        return class_violation(format!(
                            "Illegal class name '{}' in {}.",
                            name, context
                        ));
                    }
                }
                ConstantInfo::String(v) => {
                    self.text(v.string_index, &context)?;
                }
                ConstantInfo::FieldRef(v) => {
                    self.get_t(v.class_index, &context)?;
                    self.get_t(v.name_and_type_index, &context)?;
                }
                ConstantInfo::MethodRef(v) => {
                    self.get_t(v.class_index, &context)?;
                    self.get_t(v.name_and_type_index, &context)?;
                }
                ConstantInfo::InterfaceMethodRef(v) => {
                    self.get_t(v.class_index, &context)?;
                    self.get_t(v.name_and_type_index, &context)?;
                }
                ConstantInfo::NameAndType(v) => {
                    self.text(v.name_index, &context)?;
                    self.text(v.descriptor_index, &context)?;
                }
                ConstantInfo::MethodHandle(v) => {
                    let kind = match MethodHandleKind::from_u8(v.reference_kind) {
                        Some(kind) => kind,
                        None => {
                            return class_violation(format!(
                                "Illegal reference kind '{}' in {}.",
                                v.reference_kind, context
                            ))
                        }
                    };
                    let target = v.reference_index;
                    match kind {
                        MethodHandleKind::GetField
                        | MethodHandleKind::GetStatic
                        | MethodHandleKind::PutField
                        | MethodHandleKind::PutStatic => {
                            self.get_t::<FieldRefConstant>(target.cast(), &context)?;
                        }
                        MethodHandleKind::InvokeVirtual | MethodHandleKind::NewInvokeSpecial => {
                            self.get_t::<MethodRefConstant>(target.cast(), &context)?;
                        }
                        MethodHandleKind::InvokeStatic | MethodHandleKind::InvokeSpecial => {
                            let is_interface_ref = matches!(
                                self.class.const_pool.get(target),
                                Some(ConstantInfo::InterfaceMethodRef(_))
                            );
                            if !(is_interface_ref && major >= MAJOR_1_8) {
                                self.get_t::<MethodRefConstant>(target.cast(), &context)?;
                            }
                        }
                        MethodHandleKind::InvokeInterface => {
                            self.get_t::<InterfaceMethodRefConstant>(target.cast(), &context)?;
                        }
                    }
                }
                ConstantInfo::MethodType(v) => {
                    let descriptor = self.text(v.descriptor_index, &context)?;
                    if let Err(err) = MethodDescriptor::from_text(&descriptor) {
                        return class_violation(format!(
                            "Illegal descriptor (==signature) '{}' used by {}: {}",
                            descriptor, context, err
                        ));
                    }
                }
                ConstantInfo::Dynamic(v) => {
                    self.get_t(v.name_and_type_index, &context)?;
                }
                ConstantInfo::InvokeDynamic(v) => {
                    self.get_t(v.name_and_type_index, &context)?;
                }
                ConstantInfo::Module(v) => {
                    self.text(v.name_index, &context)?;
                }
                ConstantInfo::Package(v) => {
                    self.text(v.name_index, &context)?;
                }
            }
        }

        if major < MAJOR_1_7 {
            let newer = self.class.const_pool.iter().find(|(_, info)| {
                matches!(
                    info,
                    ConstantInfo::MethodHandle(_)
                        | ConstantInfo::MethodType(_)
                        | ConstantInfo::Dynamic(_)
                        | ConstantInfo::InvokeDynamic(_)
                )
            });
            if let Some((index, info)) = newer {
                self.advise(format!(
                    "Constant pool entry #{} is a {}, which class files of version {} can not use.",
                    index,
                    info.kind_name(),
                    major
                ));
            }
        }

        Ok(())
    }

    fn check_interfaces(&self) -> CheckResult {
        for &index in &self.class.interfaces {
            let name = self.class_name_at(index, "the interfaces list")?;
            let outcome = self.pass1_of(&name)?;
            if !outcome.is_ok() {
                return class_violation(format!(
                    "Could not load in interface '{}' of '{}': {}",
                    name,
                    self.class_name,
                    outcome.message()
                ));
            }

            let interface = self
                .registry
                .find_class(&name)
                .ok_or_else(|| FatalError::MissingClass(name.clone().into_owned()))?;
            if !interface.is_interface() {
                return class_violation(format!(
                    "Class '{}' implements '{}' which is not an interface.",
                    self.class_name, name
                ));
            }
        }
        Ok(())
    }

    /// Whether the pool refers to any class nested in this one
    fn references_inner_class(&self) -> bool {
        let prefix = format!("{}$", self.class_name);
        self.class.const_pool.iter().any(|(_, info)| match info {
            ConstantInfo::Class(class) => self
                .class
                .const_pool
                .get_text(class.name_index)
                .map_or(false, |name| name.starts_with(&prefix)),
            _ => false,
        })
    }

    fn check_class_attributes(&self) -> CheckResult {
        let owner = format!("class '{}'", self.class_name);
        let mut source_files = 0;
        let mut inner_classes = 0;
        for attribute in &self.class.attributes {
            let name = self.attribute_name(attribute, &owner)?;
            match &attribute.data {
                Attribute::SourceFile(source) => {
                    source_files += 1;
                    if source_files > 1 {
                        return class_violation(format!(
                            "The {} may only have one SourceFile attribute.",
                            owner
                        ));
                    }

                    let file = self.text(source.source_file_index, "the SourceFile attribute")?;
                    if file.contains(|c: char| matches!(c, '/' | '\\' | ':')) || !file.ends_with(".java") {
                        self.advise(format!(
                            "SourceFile attribute '{}' has a funny name: it should be a plain file name ending in '.java'.",
                            file
                        ));
                    }
                }
                Attribute::InnerClasses(inner) => {
                    inner_classes += 1;
                    for entry in &inner.classes {
                        let context = format!("the InnerClasses entry '{}'", self.describe(Node::InnerClass(entry)));
                        self.get_t(entry.inner_class_info_index, &context)?;
                        if !entry.outer_class_info_index.is_zero() {
                            self.get_t(entry.outer_class_info_index, &context)?;
                        }
                        if !entry.inner_name_index.is_zero() {
                            self.text(entry.inner_name_index, &context)?;
                        }
                    }
                }
                Attribute::Synthetic | Attribute::Deprecated => {}
                Attribute::Unknown { .. } => {
                    self.advise(format!(
                        "Unknown attribute '{}' of {} is ignored.",
                        name, owner
                    ));
                }
                Attribute::Code(_)
                | Attribute::ConstantValue(_)
                | Attribute::Exceptions(_)
                | Attribute::LineNumberTable(_)
                | Attribute::LocalVariableTable(_) => {
                    self.advise(format!(
                        "Attribute '{}' is not expected on {} and is ignored.",
                        name, owner
                    ));
                }
            }
        }

        if inner_classes > 1 {
            let message = format!(
                "The {} may only have one InnerClasses attribute, but has {}.",
                owner, inner_classes
            );
            if self.references_inner_class() {
                return class_violation(message);
            }
            self.advise(message);
        }

        Ok(())
    }

    fn check_field(&self, field: &FieldInfo, seen: &mut HashSet<(String, String)>) -> CheckResult {
        let name = self.text(field.name_index, &format!("a field of '{}'", self.class_name))?;
        let owner = format!("field '{}'", name);
        if !valid_field_name(&name) {
            return class_violation(format!(
                "Field '{}' of class '{}' has an illegal name.",
                name, self.class_name
            ));
        }

        let descriptor = self.text(field.descriptor_index, &owner)?;
        let ty = match DescriptorType::from_text(&descriptor) {
            Ok(ty) => ty,
            Err(err) => {
                return class_violation(format!(
                    "Illegal descriptor (==signature) '{}' used by {}: {}",
                    descriptor, owner, err
                ))
            }
        };

        self.check_field_flags(&name, field.access_flags)?;

        if !seen.insert((name.clone().into_owned(), descriptor.into_owned())) {
            return class_violation(format!(
                "No two fields (like '{}') are allowed have same names and signatures!",
                self.describe(Node::Field(field))
            ));
        }

        let mut constant_values = 0;
        for attribute in &field.attributes {
            let attribute_name = self.attribute_name(attribute, &owner)?;
            match &attribute.data {
                Attribute::ConstantValue(value) => {
                    constant_values += 1;
                    if constant_values > 1 {
                        return class_violation(format!(
                            "The {} may only have one ConstantValue attribute.",
                            owner
                        ));
                    }

                    let constant = self.class.const_pool.get(value.constant_value_index);
                    let fits = matches!(
                        (&ty, constant),
                        (DescriptorType::Basic(DescriptorTypeBasic::Long), Some(ConstantInfo::Long(_)))
                            | (DescriptorType::Basic(DescriptorTypeBasic::Float), Some(ConstantInfo::Float(_)))
                            | (DescriptorType::Basic(DescriptorTypeBasic::Double), Some(ConstantInfo::Double(_)))
                            | (
                                DescriptorType::Basic(
                                    DescriptorTypeBasic::Int
                                        | DescriptorTypeBasic::Short
                                        | DescriptorTypeBasic::Char
                                        | DescriptorTypeBasic::Byte
                                        | DescriptorTypeBasic::Boolean
                                ),
                                Some(ConstantInfo::Integer(_))
                            )
                    ) || (ty.object_class_name() == Some("java/lang/String")
                        && !ty.is_array()
                        && matches!(constant, Some(ConstantInfo::String(_))));
                    if !fits {
                        return class_violation(format!(
                            "Illegal type of ConstantValue '{}' for {} of type '{}'.",
                            self.describe(Node::Attribute(attribute)),
                            owner,
                            ty
                        ));
                    }

                    if !field.access_flags.contains(FieldAccessFlags::STATIC) {
                        self.advise(format!(
                            "ConstantValue attribute of {} is ignored because the field is not static.",
                            owner
                        ));
                    }
                }
                Attribute::Synthetic | Attribute::Deprecated => {}
                Attribute::Unknown { .. } => {
                    self.advise(format!(
                        "Unknown attribute '{}' of {} is ignored.",
                        attribute_name, owner
                    ));
                }
                Attribute::Code(_)
                | Attribute::Exceptions(_)
                | Attribute::SourceFile(_)
                | Attribute::InnerClasses(_)
                | Attribute::LineNumberTable(_)
                | Attribute::LocalVariableTable(_) => {
                    self.advise(format!(
                        "Attribute '{}' is not expected on {} and is ignored.",
                        attribute_name, owner
                    ));
                }
            }
        }

        Ok(())
    }

    fn check_field_flags(&self, name: &str, flags: FieldAccessFlags) -> CheckResult {
        let visibility = flags
            & (FieldAccessFlags::PUBLIC | FieldAccessFlags::PRIVATE | FieldAccessFlags::PROTECTED);
        if visibility.bits().count_ones() > 1 {
            return class_violation(format!(
                "Field '{}' must only have at most one of its ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC modifiers set.",
                name
            ));
        }

        if self.class.is_interface() {
            let required =
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
            if !flags.contains(required) {
                return class_violation(format!(
                    "Interface field '{}' must have the ACC_PUBLIC, ACC_STATIC and ACC_FINAL modifiers set.",
                    name
                ));
            }
            if flags.intersects(FieldAccessFlags::VOLATILE | FieldAccessFlags::TRANSIENT) {
                return class_violation(format!(
                    "Interface field '{}' must not have the ACC_VOLATILE or ACC_TRANSIENT modifiers set.",
                    name
                ));
            }
        } else if flags.contains(FieldAccessFlags::FINAL | FieldAccessFlags::VOLATILE) {
            return class_violation(format!(
                "Field '{}' must only have at most one of its ACC_FINAL, ACC_VOLATILE modifiers set.",
                name
            ));
        }

        Ok(())
    }

    fn check_method(
        &self,
        method: &MethodInfo,
        seen: &mut HashSet<(String, String)>,
        local_variables: &mut Option<Rc<LocalVariablesInfo>>,
    ) -> CheckResult {
        let name = self.text(method.name_index, &format!("a method of '{}'", self.class_name))?;
        let owner = format!("method '{}'", name);
        if !valid_method_name(&name, true) {
            return class_violation(format!(
                "Method '{}' of class '{}' has an illegal name.",
                name, self.class_name
            ));
        }

        let descriptor_text = self.text(method.descriptor_index, &owner)?;
        let descriptor = match MethodDescriptor::from_text(&descriptor_text) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                return class_violation(format!(
                    "Illegal descriptor (==signature) '{}' used by {}: {}",
                    descriptor_text, owner, err
                ))
            }
        };

        let types = descriptor
            .parameters()
            .iter()
            .chain(descriptor.return_type())
            .filter_map(DescriptorType::object_class_name);
        for class_name in types {
            let outcome = self.pass1_of(class_name)?;
            if !outcome.is_ok() {
                return class_violation(format!(
                    "The descriptor of {} refers to class '{}' which does not pass verification pass 1: {}",
                    owner,
                    class_name,
                    outcome.message()
                ));
            }
        }

        if name == STATIC_INITIALIZER_NAME
            && (!descriptor.parameters().is_empty() || descriptor.return_type().is_some())
        {
            return class_violation(format!(
                "Method '{}' must have the descriptor '()V', not '{}'.",
                STATIC_INITIALIZER_NAME, descriptor_text
            ));
        }

        self.check_method_flags(&name, method.access_flags)?;

        if !seen.insert((name.clone().into_owned(), descriptor_text.into_owned())) {
            return class_violation(format!(
                "No two methods (like '{}') are allowed have same names and signatures!",
                self.describe(Node::Method(method))
            ));
        }

        let mut codes = 0;
        for attribute in &method.attributes {
            let attribute_name = self.attribute_name(attribute, &owner)?;
            match &attribute.data {
                Attribute::Code(code) => {
                    codes += 1;
                    if !method.should_have_code() {
                        return class_violation(format!(
                            "Method '{}' is native or abstract and must not have a Code attribute.",
                            self.describe(Node::Method(method))
                        ));
                    }
                    if codes > 1 {
                        break;
                    }
                    let is_static = method.access_flags.contains(MethodAccessFlags::STATIC);
                    *local_variables = Some(Rc::new(self.check_code(&name, is_static, code)?));
                }
                Attribute::Exceptions(exceptions) => {
                    let usage = format!("The Exceptions attribute of {}", owner);
                    for &index in &exceptions.exception_index_table {
                        let exception = self.class_name_at(index, &usage)?;
                        self.check_throwable(&exception, &usage)?;
                    }
                }
                Attribute::Synthetic | Attribute::Deprecated => {}
                Attribute::Unknown { .. } => {
                    self.advise(format!(
                        "Unknown attribute '{}' of {} is ignored.",
                        attribute_name, owner
                    ));
                }
                Attribute::ConstantValue(_)
                | Attribute::SourceFile(_)
                | Attribute::InnerClasses(_)
                | Attribute::LineNumberTable(_)
                | Attribute::LocalVariableTable(_) => {
                    self.advise(format!(
                        "Attribute '{}' is not expected on {} and is ignored.",
                        attribute_name, owner
                    ));
                }
            }
        }

        if method.should_have_code() && codes != 1 {
            return class_violation(format!(
                "Method '{}' must have exactly one Code attribute, but has {}.",
                self.describe(Node::Method(method)),
                codes
            ));
        }

        Ok(())
    }

    fn check_method_flags(&self, name: &str, flags: MethodAccessFlags) -> CheckResult {
        let major = self.class.version.major;
        if name == STATIC_INITIALIZER_NAME {
            // Other modifiers of the class initializer are ignored
            if major >= MAJOR_1_7 && !flags.contains(MethodAccessFlags::STATIC) {
                return class_violation(format!(
                    "Method '{}' must have the ACC_STATIC modifier set.",
                    STATIC_INITIALIZER_NAME
                ));
            }
            return Ok(());
        }

        let visibility = flags
            & (MethodAccessFlags::PUBLIC | MethodAccessFlags::PRIVATE | MethodAccessFlags::PROTECTED);
        if visibility.bits().count_ones() > 1 {
            return class_violation(format!(
                "Method '{}' must only have at most one of its ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC modifiers set.",
                name
            ));
        }

        if self.class.is_interface() {
            if name == CONSTRUCTOR_NAME {
                return class_violation(format!(
                    "Interface '{}' must not declare an instance initialization method.",
                    self.class_name
                ));
            }

            if major < MAJOR_1_8 {
                if !flags.contains(MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT) {
                    return class_violation(format!(
                        "Interface method '{}' must have the ACC_PUBLIC and ACC_ABSTRACT modifiers set.",
                        name
                    ));
                }
            } else if !flags.intersects(MethodAccessFlags::PUBLIC | MethodAccessFlags::PRIVATE) {
                return class_violation(format!(
                    "Interface method '{}' must have exactly one of the ACC_PUBLIC and ACC_PRIVATE modifiers set.",
                    name
                ));
            }

            let forbidden = MethodAccessFlags::PROTECTED
                | MethodAccessFlags::FINAL
                | MethodAccessFlags::SYNCHRONIZED
                | MethodAccessFlags::NATIVE;
            if flags.intersects(forbidden) {
                return class_violation(format!(
                    "Interface method '{}' must not have the ACC_PROTECTED, ACC_FINAL, ACC_SYNCHRONIZED or ACC_NATIVE modifiers set.",
                    name
                ));
            }
        }

        if name == CONSTRUCTOR_NAME {
            let allowed = MethodAccessFlags::PUBLIC
                | MethodAccessFlags::PRIVATE
                | MethodAccessFlags::PROTECTED
                | MethodAccessFlags::VARARGS
                | MethodAccessFlags::STRICT
                | MethodAccessFlags::SYNTHETIC;
            if !allowed.contains(flags) {
                return class_violation(format!(
                    "Instance initialization method '{}' must only have the ACC_PUBLIC, ACC_PRIVATE, ACC_PROTECTED, ACC_VARARGS, ACC_STRICT or ACC_SYNTHETIC modifiers set.",
                    name
                ));
            }
        }

        if flags.contains(MethodAccessFlags::ABSTRACT) {
            let forbidden = MethodAccessFlags::FINAL
                | MethodAccessFlags::NATIVE
                | MethodAccessFlags::PRIVATE
                | MethodAccessFlags::STATIC
                | MethodAccessFlags::STRICT
                | MethodAccessFlags::SYNCHRONIZED;
            if flags.intersects(forbidden) {
                return class_violation(format!(
                    "Abstract method '{}' must not have any of the ACC_FINAL, ACC_NATIVE, ACC_PRIVATE, ACC_STATIC, ACC_STRICT, ACC_SYNCHRONIZED modifiers set.",
                    name
                ));
            }
        }

        Ok(())
    }

    fn check_code(
        &self,
        method_name: &str,
        is_static: bool,
        code: &CodeAttribute,
    ) -> CheckResult<LocalVariablesInfo> {
        let owner = format!("the Code attribute of method '{}'", method_name);
        if code.code.is_empty() {
            return class_violation(format!("The code array of {} must not be empty.", owner));
        }

        for entry in &code.exception_table {
            if entry.catch_type.is_zero() {
                continue;
            }
            let usage = format!("The exception table entry '{}' of {}", self.describe(Node::ExceptionEntry(entry)), owner);
            let catch_type = self.class_name_at(entry.catch_type, &usage)?;
            self.check_throwable(&catch_type, &usage)?;
        }

        let max_locals = usize::from(code.max_locals);
        let mut info = LocalVariablesInfo::new(code.max_locals);
        let mut local_variable_tables = 0;
        for attribute in &code.attributes {
            let attribute_name = self.attribute_name(attribute, &owner)?;
            match &attribute.data {
                Attribute::LineNumberTable(_) => {
                    self.advise(format!(
                        "LineNumberTable attribute of {} is only useful for debuggers, its offsets are checked in pass 3a.",
                        owner
                    ));
                }
                Attribute::LocalVariableTable(table) => {
                    local_variable_tables += 1;
                    if !is_static && local_variable_tables > max_locals {
                        return class_violation(format!(
                            "Too many LocalVariableTable attributes in {}: there are {} but max_locals is {}.",
                            owner, local_variable_tables, max_locals
                        ));
                    }

                    self.advise(format!(
                        "LocalVariableTable attribute of {} is only useful for debuggers, its offsets are checked in pass 3a.",
                        owner
                    ));

                    for entry in &table.entries {
                        let context = format!("the LocalVariableTable of {}", owner);
                        let name = self.text(entry.name_index, &context)?;
                        if !valid_java_identifier(&name) {
                            return class_violation(format!(
                                "The LocalVariableTable of {} declares a local variable by the name '{}' which is not a legal Java simple name.",
                                owner, name
                            ));
                        }

                        let descriptor = self.text(entry.descriptor_index, &context)?;
                        let ty = match DescriptorType::from_text(&descriptor) {
                            Ok(ty) => ty,
                            Err(err) => {
                                return class_violation(format!(
                                    "Illegal descriptor (==signature) '{}' used by local variable '{}' in {}: {}",
                                    descriptor, name, owner, err
                                ))
                            }
                        };

                        let slot = usize::from(entry.index);
                        let last_slot = if ty.is_wide() { slot + 1 } else { slot };
                        if last_slot >= max_locals {
                            return class_violation(format!(
                                "The LocalVariableTable of {} refers to local variable slot {} (of type '{}') but max_locals is {}.",
                                owner, slot, ty, max_locals
                            ));
                        }

                        let added = info.add(
                            slot,
                            &name,
                            u32::from(entry.start_pc),
                            u32::from(entry.length),
                            &ty,
                        );
                        match added {
                            Ok(()) => {}
                            Err(AddLocalVariableError::Inconsistent(err)) => {
                                return class_violation(format!(
                                    "Conflicting information in LocalVariableTable of {}: {}",
                                    owner, err
                                ))
                            }
                            Err(AddLocalVariableError::SlotOutOfRange { slot, max_locals }) => {
                                return Err(FatalError::AssertionViolated(format!(
                                    "Local variable slot {} was checked against max_locals {} but is out of range.",
                                    slot, max_locals
                                ))
                                .into())
                            }
                        }
                    }
                }
                Attribute::Unknown { .. } => {
                    self.advise(format!(
                        "Unknown attribute '{}' of {} is ignored.",
                        attribute_name, owner
                    ));
                }
                Attribute::Code(_)
                | Attribute::ConstantValue(_)
                | Attribute::Exceptions(_)
                | Attribute::Synthetic
                | Attribute::Deprecated
                | Attribute::SourceFile(_)
                | Attribute::InnerClasses(_) => {
                    self.advise(format!(
                        "Attribute '{}' is not expected on {} and is ignored.",
                        attribute_name, owner
                    ));
                }
            }
        }

        Ok(info)
    }

    /// Register the class named by an object type, so that it is verified in turn
    fn schedule(&self, ty: &DescriptorType) {
        if let Some(class_name) = ty.object_class_name() {
            self.registry.get(class_name);
        }
    }

    fn check_member_references(&self) -> CheckResult {
        for (index, info) in self.class.const_pool.iter() {
            let node = || self.describe(Node::Constant(index));
            match info {
                ConstantInfo::FieldRef(v) => {
                    let context = format!("constant pool entry #{}", index);
                    self.class_name_at(v.class_index, &context)?;
                    let (name, descriptor) = self.name_and_type(v.name_and_type_index, &context)?;
                    if !valid_field_name(&name) {
                        return class_violation(format!(
                            "Invalid field name '{}' referenced by '{}'.",
                            name,
                            node()
                        ));
                    }

                    match DescriptorType::from_text(&descriptor) {
                        Ok(ty) => self.schedule(&ty),
                        Err(err) => {
                            return class_violation(format!(
                                "Illegal descriptor (==signature) '{}' used by '{}': {}",
                                descriptor,
                                node(),
                                err
                            ))
                        }
                    }
                }
                ConstantInfo::MethodRef(v) => {
                    let context = format!("constant pool entry #{}", index);
                    self.class_name_at(v.class_index, &context)?;
                    let (name, descriptor) = self.name_and_type(v.name_and_type_index, &context)?;
                    if !valid_class_method_name(&name) {
                        return class_violation(format!(
                            "Invalid (non-interface) method name '{}' referenced by '{}'.",
                            name,
                            node()
                        ));
                    }

                    let descriptor = self.method_ref_descriptor(&descriptor, &node)?;
                    if name == CONSTRUCTOR_NAME && descriptor.return_type().is_some() {
                        return class_violation(format!(
                            "Instance initialization method must have VOID return type, but '{}' does not.",
                            node()
                        ));
                    }
                }
                ConstantInfo::InterfaceMethodRef(v) => {
                    let context = format!("constant pool entry #{}", index);
                    self.class_name_at(v.class_index, &context)?;
                    let (name, descriptor) = self.name_and_type(v.name_and_type_index, &context)?;
                    if !valid_interface_method_name(&name) {
                        return class_violation(format!(
                            "Invalid (interface) method name '{}' referenced by '{}'.",
                            name,
                            node()
                        ));
                    }
                    self.method_ref_descriptor(&descriptor, &node)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse the descriptor of a method reference and schedule the classes it mentions
    fn method_ref_descriptor(&self, descriptor: &str, node: &dyn Fn() -> String) -> CheckResult<MethodDescriptor> {
        let descriptor = match MethodDescriptor::from_text(descriptor) {
            Ok(parsed) => parsed,
            Err(err) => {
                return class_violation(format!(
                    "Illegal descriptor (==signature) '{}' used by '{}': {}",
                    descriptor,
                    node(),
                    err
                ))
            }
        };

        for ty in descriptor.parameters().iter().chain(descriptor.return_type()) {
            self.schedule(ty);
        }
        Ok(descriptor)
    }

    fn check_superclass_chain(&self) -> CheckResult {
        let object_class = &self.registry.config().object_class;
        let mut seen = HashSet::new();
        seen.insert(self.class_name.to_owned());

        let mut name = self.class_name.to_owned();
        let mut super_name = self
            .class
            .get_super_class_name()
            .ok()
            .flatten()
            .map(Cow::into_owned);
        loop {
            let current = match super_name {
                Some(current) => current,
                None => {
                    if &name != object_class {
                        return class_violation(format!(
                            "Superclass of '{}' missing but not {} itself!",
                            name, object_class
                        ));
                    }
                    return Ok(());
                }
            };

            if !seen.insert(current.clone()) {
                return class_violation("Circular superclass hierarchy detected.");
            }

            if !self.pass1_of(&current)?.is_ok() {
                return class_violation(format!("Could not load in ancestor class '{}'.", current));
            }

            let super_class = self
                .registry
                .find_class(&current)
                .ok_or_else(|| FatalError::MissingClass(current.clone()))?;
            if super_class.is_final() {
                return class_violation(format!(
                    "Ancestor class '{}' has the FINAL access modifier and must therefore not be subclassed.",
                    current
                ));
            }
            if super_class.is_interface() {
                return class_violation(format!(
                    "Ancestor class '{}' is an interface and can not be subclassed.",
                    current
                ));
            }

            super_name = match super_class.get_super_class_name() {
                Ok(super_name) => super_name.map(Cow::into_owned),
                Err(_) => {
                    return Err(FatalError::AssertionViolated(format!(
                        "Class '{}' passed verification pass 1 with an invalid super_class entry.",
                        current
                    ))
                    .into())
                }
            };
            name = current;
        }
    }

    fn check_final_overrides(&self) -> CheckResult {
        // name and descriptor to the class that declares it, nearest to this class first
        let mut declared: HashMap<(String, String), String> = HashMap::new();
        let mut classes = vec![Rc::clone(self.class)];
        classes.extend(resolve::superclasses(self.registry, self.class));

        for class in &classes {
            let class_name = class.name_or_placeholder();
            let pool = &class.const_pool;
            for method in &class.methods {
                if method.access_flags.contains(MethodAccessFlags::STATIC) {
                    continue;
                }

                let (name, descriptor) = match (method.name(pool), method.descriptor(pool)) {
                    (Some(name), Some(descriptor)) => (name.into_owned(), descriptor.into_owned()),
                    // Ancestors passed their own pass 1 only, their methods may be malformed
                    _ => continue,
                };
                let key = (name, descriptor);

                if method.access_flags.contains(MethodAccessFlags::FINAL) {
                    if let Some(overrider) = declared.get(&key) {
                        let (name, descriptor) = &key;
                        if method.access_flags.contains(MethodAccessFlags::PRIVATE) {
                            self.advise(format!(
                                "Method '{}{}' in class '{}' overrides the final (not-overridable) definition in class '{}'. This is okay, as the original definition was private; however this constraint leverage was introduced by JLS 8.4.6 (not vmspec2) and the behaviour of the Sun verifiers.",
                                name, descriptor, overrider, class_name
                            ));
                        } else {
                            return class_violation(format!(
                                "Method '{}{}' in class '{}' overrides the final (not-overridable) definition in class '{}'.",
                                name, descriptor, overrider, class_name
                            ));
                        }
                    }
                }

                declared
                    .entry(key)
                    .or_insert_with(|| class_name.clone().into_owned());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rhoverify_base::{
        attribute::{ExceptionsAttribute, LocalVariableEntry, LocalVariableTableAttribute},
        builder::{code, ClassBuilder},
        constant_pool::{ConstantPool, IntegerConstant, LongConstant},
        MemoryRepository,
    };

    use super::*;

    const RETURN: u8 = 0xB1;

    fn base_repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new();
        repo.add(ClassBuilder::new("java/lang/Object", None).build())
            .unwrap();
        repo.add(ClassBuilder::new("java/lang/Throwable", Some("java/lang/Object")).build())
            .unwrap();
        repo
    }

    fn pass2(repo: MemoryRepository, name: &str) -> (Outcome, Vec<String>) {
        let handle = Registry::new(repo).get(name);
        let outcome = handle.do_pass2().unwrap();
        (outcome, handle.messages())
    }

    fn void_method(builder: &mut ClassBuilder, flags: MethodAccessFlags, name: &str) -> usize {
        builder.add_method(flags, name, "()V", Some(code(0, 1, vec![RETURN])))
    }

    #[test]
    fn superclass_chain() {
        let mut repo = base_repo();
        repo.add(ClassBuilder::new("A", Some("B")).build()).unwrap();
        repo.add(ClassBuilder::new("B", Some("C")).build()).unwrap();
        repo.add(ClassBuilder::new("C", Some("A")).build()).unwrap();
        repo.add(ClassBuilder::new("Fine", Some("Middle")).build())
            .unwrap();
        repo.add(ClassBuilder::new("Middle", Some("java/lang/Object")).build())
            .unwrap();
        repo.add(ClassBuilder::new("Orphan", Some("Nowhere")).build())
            .unwrap();
        repo.add(ClassBuilder::new("Rootless", None).build()).unwrap();

        let mut sealed = ClassBuilder::new("Sealed", Some("java/lang/Object"));
        sealed.set_access_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL);
        repo.add(sealed.build()).unwrap();
        repo.add(ClassBuilder::new("Unsealed", Some("Sealed")).build())
            .unwrap();

        let (outcome, _) = pass2(repo.clone(), "A");
        assert_eq!(outcome.message(), "Circular superclass hierarchy detected.");
        assert!(pass2(repo.clone(), "Fine").0.is_ok());
        assert!(pass2(repo.clone(), "java/lang/Object").0.is_ok());
        assert_eq!(
            pass2(repo.clone(), "Orphan").0.message(),
            "Could not load in ancestor class 'Nowhere'."
        );
        assert!(pass2(repo.clone(), "Rootless")
            .0
            .message()
            .starts_with("Superclass of 'Rootless' missing"));
        assert!(pass2(repo, "Unsealed")
            .0
            .message()
            .contains("has the FINAL access modifier"));
    }

    #[test]
    fn final_methods() {
        let mut repo = base_repo();
        let mut parent = ClassBuilder::new("P", Some("java/lang/Object"));
        void_method(&mut parent, MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL, "f");
        void_method(&mut parent, MethodAccessFlags::PRIVATE | MethodAccessFlags::FINAL, "g");
        void_method(
            &mut parent,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::FINAL,
            "h",
        );
        repo.add(parent.build()).unwrap();

        let mut overrides = ClassBuilder::new("OverridesF", Some("P"));
        void_method(&mut overrides, MethodAccessFlags::PUBLIC, "f");
        repo.add(overrides.build()).unwrap();

        let mut redeclares = ClassBuilder::new("RedeclaresG", Some("P"));
        void_method(&mut redeclares, MethodAccessFlags::PUBLIC, "g");
        void_method(&mut redeclares, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "h");
        repo.add(redeclares.build()).unwrap();

        let (outcome, _) = pass2(repo.clone(), "OverridesF");
        assert_eq!(
            outcome.message(),
            "Method 'f()V' in class 'OverridesF' overrides the final (not-overridable) definition in class 'P'."
        );

        let (outcome, messages) = pass2(repo, "RedeclaresG");
        assert!(outcome.is_ok());
        let advisories = messages
            .iter()
            .filter(|m| m.contains("overrides the final"))
            .count();
        assert_eq!(advisories, 1);
    }

    #[test]
    fn local_variable_table_bounds() {
        fn with_local(slot: u16, descriptor: &str) -> ClassFile {
            let mut builder = ClassBuilder::new("Locals", Some("java/lang/Object"));
            let name_index = builder.utf8("x");
            let descriptor_index = builder.utf8(descriptor);
            let table = builder.attribute(Attribute::LocalVariableTable(LocalVariableTableAttribute {
                entries: vec![LocalVariableEntry {
                    start_pc: 0,
                    length: 1,
                    name_index,
                    descriptor_index,
                    index: slot,
                }],
            }));
            let mut body = code(0, 5, vec![RETURN]);
            body.attributes.push(table);
            builder.add_method(MethodAccessFlags::PUBLIC, "run", "()V", Some(body));
            builder.build()
        }

        for (slot, descriptor, ok) in [(5, "I", false), (4, "I", true), (4, "J", false), (3, "D", true)] {
            let mut repo = base_repo();
            repo.add(with_local(slot, descriptor)).unwrap();
            let handle = Registry::new(repo).get("Locals");
            let outcome = handle.do_pass2().unwrap();
            assert_eq!(outcome.is_ok(), ok, "slot {} of type {}: {}", slot, descriptor, outcome);

            let info = handle.local_variables_info(0).unwrap();
            if ok {
                let info = info.unwrap();
                assert_eq!(info.max_locals(), 5);
                assert_eq!(info.get(usize::from(slot)).unwrap().name_at(0), Some("x"));
            } else {
                assert!(info.is_none());
            }
        }
    }

    #[test]
    fn local_variable_table_count() {
        fn with_tables(flags: MethodAccessFlags, tables: usize) -> ClassFile {
            let mut builder = ClassBuilder::new("Tables", Some("java/lang/Object"));
            let mut body = code(0, 1, vec![RETURN]);
            for _ in 0..tables {
                let table = builder.attribute(Attribute::LocalVariableTable(
                    LocalVariableTableAttribute {
                        entries: Vec::new(),
                    },
                ));
                body.attributes.push(table);
            }
            builder.add_method(flags, "run", "()V", Some(body));
            builder.build()
        }

        let cases = [
            (MethodAccessFlags::PUBLIC, 1, true),
            (MethodAccessFlags::PUBLIC, 3, false),
            (MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, 3, true),
        ];
        for (flags, tables, ok) in cases {
            let mut repo = base_repo();
            repo.add(with_tables(flags, tables)).unwrap();
            let (outcome, _) = pass2(repo, "Tables");
            assert_eq!(outcome.is_ok(), ok, "{:?} with {} tables: {}", flags, tables, outcome);
            if !ok {
                assert!(outcome
                    .message()
                    .contains("Too many LocalVariableTable attributes"));
            }
        }
    }

    /// Every entry of the pool, with unusable slots, in index order
    fn pool_entries(class: &ClassFile) -> Vec<ConstantInfo> {
        (0..class.const_pool.len())
            .map(|i| {
                let index = ConstantPoolIndexRaw::<ConstantInfo>::new(u16::try_from(i).unwrap());
                class
                    .const_pool
                    .get(index)
                    .cloned()
                    .unwrap_or(ConstantInfo::Unusable)
            })
            .collect()
    }

    #[test]
    fn wide_constants_occupy_two_slots() {
        let mut repo = base_repo();

        // A long as the very last entry, with no slot after it
        let mut tail = ClassBuilder::new("Tail", Some("java/lang/Object")).build();
        let mut entries = pool_entries(&tail);
        entries.push(LongConstant { value: 1 }.into());
        tail.const_pool = ConstantPool::from_entries(entries);
        repo.add(tail).unwrap();

        // A double whose second slot holds another constant
        let mut builder = ClassBuilder::new("Overlap", Some("java/lang/Object"));
        let double = builder.double(2.0);
        let [hi, lo] = double.get().to_be_bytes();
        builder.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "run",
            "()V",
            Some(code(2, 0, vec![0x14, hi, lo, 0x58, RETURN])),
        );
        let mut overlap = builder.build();
        let mut entries = pool_entries(&overlap);
        entries[usize::from(double.get()) + 1] = IntegerConstant { value: 3 }.into();
        overlap.const_pool = ConstantPool::from_entries(entries);
        repo.add(overlap).unwrap();

        let registry = Registry::new(repo);
        for name in ["Tail", "Overlap"] {
            let outcome = registry.get(name).do_pass2().unwrap();
            assert!(outcome.is_rejected(), "{}: {}", name, outcome);
            assert!(outcome.message().contains("must be followed by an unusable entry"));
        }
        assert!(registry.get("Overlap").do_pass3a(0).unwrap().is_not_yet());
    }

    #[test]
    fn members() {
        let mut repo = base_repo();
        repo.add(ClassBuilder::new("NotThrowable", Some("java/lang/Object")).build())
            .unwrap();

        let mut duplicate = ClassBuilder::new("Duplicate", Some("java/lang/Object"));
        duplicate.add_field(FieldAccessFlags::PUBLIC, "x", "I");
        duplicate.add_field(FieldAccessFlags::PRIVATE, "x", "I");
        repo.add(duplicate.build()).unwrap();

        let mut shadowed = ClassBuilder::new("DifferentTypes", Some("java/lang/Object"));
        shadowed.add_field(FieldAccessFlags::PUBLIC, "x", "I");
        shadowed.add_field(FieldAccessFlags::PUBLIC, "x", "J");
        repo.add(shadowed.build()).unwrap();

        let mut visibility = ClassBuilder::new("Visibility", Some("java/lang/Object"));
        visibility.add_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::PRIVATE, "x", "I");
        repo.add(visibility.build()).unwrap();

        let mut iface = ClassBuilder::new_interface("Iface");
        iface.add_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC, "K", "I");
        repo.add(iface.build()).unwrap();

        let mut throws = ClassBuilder::new("Throws", Some("java/lang/Object"));
        let good = throws.class("java/lang/Throwable");
        let bad = throws.class("NotThrowable");
        let run = void_method(&mut throws, MethodAccessFlags::PUBLIC, "run");
        throws.add_method_attribute(
            run,
            Attribute::Exceptions(ExceptionsAttribute {
                exception_index_table: vec![good, bad],
            }),
        );
        repo.add(throws.build()).unwrap();

        let mut no_code = ClassBuilder::new("NoCode", Some("java/lang/Object"));
        no_code.add_method(MethodAccessFlags::PUBLIC, "run", "()V", None);
        repo.add(no_code.build()).unwrap();

        let mut odd = ClassBuilder::new("Odd", Some("java/lang/Object"));
        let data = Attribute::Unknown { bytes: vec![1, 2] };
        let weird = odd.named_attribute("Weird", data);
        odd.add_class_attribute(Attribute::Synthetic);
        let mut class = odd.build();
        class.attributes.push(weird);
        repo.add(class).unwrap();

        assert!(pass2(repo.clone(), "Duplicate")
            .0
            .message()
            .starts_with("No two fields"));
        assert!(pass2(repo.clone(), "DifferentTypes").0.is_ok());
        assert!(pass2(repo.clone(), "Visibility")
            .0
            .message()
            .contains("at most one of its ACC_PRIVATE"));
        assert!(pass2(repo.clone(), "Iface")
            .0
            .message()
            .starts_with("Interface field 'K'"));
        assert!(pass2(repo.clone(), "Throws")
            .0
            .message()
            .contains("'NotThrowable' which is not a subclass of 'java/lang/Throwable'"));
        assert!(pass2(repo.clone(), "NoCode")
            .0
            .message()
            .contains("exactly one Code attribute"));

        let (outcome, messages) = pass2(repo, "Odd");
        assert!(outcome.is_ok());
        assert_eq!(
            messages,
            vec!["Pass 2: Unknown attribute 'Weird' of class 'Odd' is ignored.".to_owned()]
        );
    }

    #[test]
    fn references() {
        let mut repo = base_repo();

        let mut bad_init = ClassBuilder::new("BadInit", Some("java/lang/Object"));
        bad_init.method_ref("java/lang/Object", "<init>", "()I");
        repo.add(bad_init.build()).unwrap();

        let mut bad_field = ClassBuilder::new("BadField", Some("java/lang/Object"));
        bad_field.field_ref("java/lang/Object", "x", "Q");
        repo.add(bad_field.build()).unwrap();

        let mut schedules = ClassBuilder::new("Schedules", Some("java/lang/Object"));
        schedules.method_ref("Other", "run", "(LArg;)LResult;");
        repo.add(schedules.build()).unwrap();

        assert!(pass2(repo.clone(), "BadInit")
            .0
            .message()
            .starts_with("Instance initialization method must have VOID return type"));
        assert!(pass2(repo.clone(), "BadField")
            .0
            .message()
            .starts_with("Illegal descriptor"));

        let registry = Registry::new(repo);
        assert!(registry.get("Schedules").do_pass2().unwrap().is_ok());
        let names = registry.verifiers();
        assert!(names.iter().any(|name| name == "Arg"));
        assert!(names.iter().any(|name| name == "Result"));
    }
}
