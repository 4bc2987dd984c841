//! Pass 3a: the static constraints on the code of a single method.
//! This is everything that can be checked one instruction at a time, along with the parts of
//! the Code attribute that refer to offsets in the code array.

use std::{collections::HashSet, fmt::Display, rc::Rc};

use rhoverify_base::{
    attribute::{Attribute, CodeAttribute},
    class::{FieldAccessFlags, MethodAccessFlags, MAJOR_1_5, MAJOR_1_7},
    code::{
        method::{DescriptorType, MethodDescriptor},
        op::{Inst, InvokeInterface},
        parse_code, CodeInfo, ExceptionRangeError, InstructionIndex, InstructionParseError,
    },
    constant_pool::{
        ClassConstant, ConstantInfo, ConstantPoolIndexRaw, FieldRefConstant, MethodRefConstant,
        NameAndTypeConstant,
    },
    util::{
        array_dimensions, CONSTRUCTOR_NAME, MAX_ARRAY_DIMENSIONS, MAX_CODE_SIZE,
        STATIC_INITIALIZER_NAME,
    },
    ClassFile,
};
use tracing::{span, Level};

use crate::{
    error::{class_violation, CheckResult, ConstraintViolation, FatalError},
    formatter::{node_to_string, Node},
    outcome::Outcome,
    registry::Registry,
    resolve,
    verifier::Verifier,
};

use super::{conclude, Pass, PassVerifier};

/// The outcome for a method whose code array can not be decoded
pub(crate) fn bad_bytecode(method_name: &str, err: &InstructionParseError) -> Outcome {
    let message = format!(
        "Bad bytecode in the code array of the Code attribute of method '{}': {}",
        method_name, err
    );
    tracing::info!("Rejected: {}", message);
    Outcome::rejected(message)
}

pub(crate) struct Pass3a<'a> {
    pub registry: &'a Registry,
    pub verifier: &'a Verifier,
    pub method_index: usize,
}
impl<'a> Pass for Pass3a<'a> {
    fn do_verify(&self, state: &PassVerifier) -> Result<Outcome, FatalError> {
        let class_name = self.verifier.class_name();
        let span = span!(Level::TRACE, "pass3a", class = class_name, method = self.method_index);
        let _enter = span.enter();

        if !self.verifier.do_pass2(self.registry)?.is_ok() {
            return Ok(Outcome::not_yet());
        }

        let class = self
            .registry
            .find_class(class_name)
            .ok_or_else(|| FatalError::MissingClass(class_name.to_owned()))?;
        let method = class
            .get_method(self.method_index)
            .ok_or_else(|| FatalError::InvalidMethod {
                class_name: class_name.to_owned(),
                index: self.method_index,
            })?;

        let code_attr = match method.code() {
            Some(code_attr) => code_attr,
            // Abstract and native methods have nothing to check
            None => return Ok(Outcome::ok()),
        };

        let method_name = method
            .name(&class.const_pool)
            .unwrap_or_default()
            .into_owned();
        let code = match parse_code(code_attr) {
            Ok(code) => code,
            Err(err) => return Ok(bad_bytecode(&method_name, &err)),
        };

        let checker = CodeChecker {
            registry: self.registry,
            state,
            class: &class,
            class_name,
            method_name: &method_name,
            code_attr,
            code: &code,
        };
        conclude(checker.check())
    }
}

/// How a field instruction uses the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldAccess {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}
impl FieldAccess {
    fn is_static(self) -> bool {
        matches!(self, FieldAccess::GetStatic | FieldAccess::PutStatic)
    }

    fn is_put(self) -> bool {
        matches!(self, FieldAccess::PutStatic | FieldAccess::PutField)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

struct CodeChecker<'a> {
    registry: &'a Registry,
    state: &'a PassVerifier,
    class: &'a Rc<ClassFile>,
    class_name: &'a str,
    method_name: &'a str,
    code_attr: &'a CodeAttribute,
    code: &'a CodeInfo,
}
impl<'a> CodeChecker<'a> {
    fn check(&self) -> CheckResult {
        self.check_code_attribute_offsets()?;
        self.check_code_shape()?;
        for (i, (_, inst)) in self.code.instructions().iter().enumerate() {
            self.check_instruction(i, inst)?;
        }
        Ok(())
    }

    fn advise(&self, message: String) {
        tracing::debug!("{}", message);
        self.state.add_message(message);
    }

    fn operand<T>(&self, inst: &Inst, message: impl Display) -> CheckResult<T> {
        Err(ConstraintViolation::operand(format!(
            "Instruction {} constraint violated: {}",
            node_to_string(self.class, Node::Instruction(inst)),
            message
        ))
        .into())
    }

    fn instruction<T>(&self, inst: &Inst, message: impl Display) -> CheckResult<T> {
        Err(ConstraintViolation::instruction(format!(
            "Instruction {} constraint violated: {}",
            node_to_string(self.class, Node::Instruction(inst)),
            message
        ))
        .into())
    }

    /// The parts of the Code attribute that Pass 2 could not check without decoding the code
    fn check_code_attribute_offsets(&self) -> CheckResult {
        let pool = &self.class.const_pool;
        let owner = format!("the Code attribute of method '{}'", self.method_name);

        for attribute in &self.code_attr.attributes {
            match &attribute.data {
                Attribute::LineNumberTable(table) => {
                    let mut seen = HashSet::new();
                    for entry in &table.entries {
                        if !self.code.has_instruction_at(entry.start_pc.into()) {
                            return class_violation(format!(
                                "LineNumberTable attribute of {} refers to a code offset ('{}') that does not exist.",
                                owner, entry.start_pc
                            ));
                        }
                        if !seen.insert(entry.start_pc) {
                            self.advise(format!(
                                "LineNumberTable attribute of {} has more than one line number for code offset '{}'.",
                                owner, entry.start_pc
                            ));
                        }
                    }
                }
                Attribute::LocalVariableTable(table) => {
                    for entry in &table.entries {
                        let name = pool.get_text(entry.name_index).unwrap_or_default();
                        if !self.code.has_instruction_at(entry.start_pc.into()) {
                            return class_violation(format!(
                                "LocalVariableTable attribute of {} declares local variable '{}' starting at code offset '{}', which is not the start of an instruction.",
                                owner, name, entry.start_pc
                            ));
                        }

                        let end = u32::from(entry.start_pc) + u32::from(entry.length);
                        if !self.code.is_instruction_boundary(InstructionIndex(end)) {
                            return class_violation(format!(
                                "LocalVariableTable attribute of {} declares local variable '{}' ending at code offset '{}', which is neither the start of an instruction nor the end of the code array.",
                                owner, name, end
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        for entry in self.code.exception_table() {
            let problem = match self.code.check_exception_basic(entry) {
                Ok(()) => continue,
                Err(ExceptionRangeError::InverseOrder) => format!(
                    "has a start_pc ('{}') not smaller than its end_pc ('{}')",
                    entry.start_pc, entry.end_pc
                ),
                Err(ExceptionRangeError::InvalidStartIndex) => format!(
                    "has a start_pc ('{}') that does not refer to an instruction",
                    entry.start_pc
                ),
                Err(ExceptionRangeError::InvalidEndIndex) => format!(
                    "has an end_pc ('{}') that is neither the start of an instruction nor the end of the code array",
                    entry.end_pc
                ),
                Err(ExceptionRangeError::InvalidHandlerIndex) => format!(
                    "has a handler_pc ('{}') that does not refer to an instruction",
                    entry.handler_pc
                ),
            };
            return class_violation(format!(
                "Exception table entry '{}' of {} {}.",
                node_to_string(self.class, Node::ExceptionEntry(entry)),
                owner,
                problem
            ));
        }

        Ok(())
    }

    /// Constraints on the code as a whole, and on which instructions may appear at all
    fn check_code_shape(&self) -> CheckResult {
        if self.code_attr.code.len() >= MAX_CODE_SIZE {
            return class_violation(format!(
                "Code array in the Code attribute of method '{}' is too big: it must be smaller than {} bytes, but is {}.",
                self.method_name,
                MAX_CODE_SIZE,
                self.code_attr.code.len()
            ));
        }

        for (_, inst) in self.code.instructions() {
            if inst.is_reserved() {
                return self.instruction(
                    inst,
                    format!(
                        "'{}' is an illegal instruction for _internal_ JVM use!",
                        inst.name()
                    ),
                );
            }
        }

        if let Some((_, last)) = self.code.last() {
            if !last.is_unconditional_exit() {
                return self.instruction(
                    last,
                    "Execution must not fall off the bottom of the code array.",
                );
            }
        }

        Ok(())
    }

    fn check_instruction(&self, i: usize, inst: &Inst) -> CheckResult {
        if let Some(local) = inst.local_variable_index() {
            self.check_local_variable(inst, local.index, local.wide)?;
        }

        match inst {
            Inst::Jsr(_) | Inst::JsrWide(_) => self.check_subroutine_target(i, inst),
            Inst::LoadConstant(x) => self.check_load_constant(inst, x.index),
            Inst::LoadConstantWide(x) => self.check_load_constant(inst, x.index),
            Inst::LoadConstant2Wide(x) => match self.class.const_pool.get(x.index) {
                Some(ConstantInfo::Long(_) | ConstantInfo::Double(_)) => {
                    let upper = x
                        .index
                        .get()
                        .checked_add(1)
                        .map(ConstantPoolIndexRaw::<ConstantInfo>::new);
                    match upper.and_then(|upper| self.class.const_pool.get(upper)) {
                        Some(ConstantInfo::Unusable) => Ok(()),
                        _ => self.operand(
                            inst,
                            format!(
                                "Operand of LDC2_W occupies constant pool slots '{}' and '{}', but the second one is not part of it.",
                                x.index,
                                u32::from(x.index.get()) + 1
                            ),
                        ),
                    }
                }
                other => self.operand(
                    inst,
                    format!(
                        "Operand of LDC2_W must be CONSTANT_Long or CONSTANT_Double, but is '{}'.",
                        other.map_or("nothing", ConstantInfo::kind_name)
                    ),
                ),
            },
            Inst::GetStatic(x) => self.check_field_access(inst, x.index, FieldAccess::GetStatic),
            Inst::PutStaticField(x) => {
                self.check_field_access(inst, x.index, FieldAccess::PutStatic)
            }
            Inst::GetField(x) => self.check_field_access(inst, x.index, FieldAccess::GetField),
            Inst::PutField(x) => self.check_field_access(inst, x.index, FieldAccess::PutField),
            Inst::InvokeVirtual(x) => self.check_method_ref(inst, x.index, InvokeKind::Virtual),
            Inst::InvokeSpecial(x) => self.check_method_ref(inst, x.index, InvokeKind::Special),
            Inst::InvokeStatic(x) => self.check_method_ref(inst, x.index, InvokeKind::Static),
            Inst::InvokeInterface(x) => self.check_invoke_interface(inst, x),
            Inst::InvokeDynamic(_) => Err(FatalError::Unsupported(format!(
                "invokedynamic in method '{}' of '{}' can not be verified.",
                self.method_name, self.class_name
            ))
            .into()),
            Inst::New(x) => {
                let name = self.class_operand(inst, x.index)?;
                if name.starts_with('[') {
                    return self.operand(inst, "NEW must not be used to create an array.");
                }
                self.check_class_loads(inst, &name)
            }
            Inst::ANewArray(x) => {
                let name = self.class_operand(inst, x.index)?;
                let dimensions = array_dimensions(&name) + 1;
                if dimensions > MAX_ARRAY_DIMENSIONS {
                    return self.operand(
                        inst,
                        format!(
                            "Not allowed to create an array with more than {} dimensions; actual: {}.",
                            MAX_ARRAY_DIMENSIONS, dimensions
                        ),
                    );
                }
                self.check_class_loads(inst, &name)
            }
            Inst::MultiANewArray(x) => {
                let name = self.class_operand(inst, x.index)?;
                if x.dimensions == 0 {
                    return self.operand(inst, "Number of dimensions to create must be greater than zero.");
                }
                let available = array_dimensions(&name);
                if available < usize::from(x.dimensions) {
                    return self.operand(
                        inst,
                        format!(
                            "Not allowed to create an array with more dimensions ('{}') than the one referenced by the CONSTANT_Class '{}'.",
                            x.dimensions, name
                        ),
                    );
                }
                self.check_class_loads(inst, &name)
            }
            Inst::CheckCast(x) => {
                let name = self.class_operand(inst, x.index)?;
                self.check_class_loads(inst, &name)
            }
            Inst::InstanceOf(x) => {
                let name = self.class_operand(inst, x.index)?;
                self.check_class_loads(inst, &name)
            }
            Inst::NewArray(x) => {
                // T_BOOLEAN through T_LONG
                if !(4..=11).contains(&x.atype) {
                    return self.operand(inst, format!("Illegal array type '{}' for NEWARRAY.", x.atype));
                }
                Ok(())
            }
            Inst::LookupSwitch(x) => {
                let mut seen = HashSet::new();
                for pair in &x.pairs {
                    if !seen.insert(pair.match_v) {
                        return self.operand(inst, format!("Match '{}' occurs more than once.", pair.match_v));
                    }
                }
                if x.pairs.windows(2).any(|w| w[0].match_v > w[1].match_v) {
                    return self.operand(inst, "Lookupswitch table is not sorted but should be.");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_local_variable(&self, inst: &Inst, index: u16, wide: bool) -> CheckResult {
        let index = i64::from(index);
        let max_locals = i64::from(self.code.max_locals());
        if wide {
            if index + 1 >= max_locals {
                return self.operand(
                    inst,
                    format!(
                        "Index '{}' must not be greater than max_locals-2 '{}'.",
                        index,
                        max_locals - 2
                    ),
                );
            }
        } else if index >= max_locals {
            return self.operand(
                inst,
                format!(
                    "Index '{}' must not be greater than max_locals-1 '{}'.",
                    index,
                    max_locals - 1
                ),
            );
        }
        Ok(())
    }

    fn check_subroutine_target(&self, i: usize, inst: &Inst) -> CheckResult {
        let target = match self.code.targets(i).first() {
            Some(&target) => target,
            None => {
                return Err(FatalError::AssertionViolated(format!(
                    "Decoded subroutine jump in method '{}' has no target.",
                    self.method_name
                ))
                .into())
            }
        };

        if target == 0 {
            return self.operand(
                inst,
                "A subroutine must not start at the first instruction of the code array.",
            );
        }

        let (_, target_inst) = &self.code.instructions()[target];
        if !target_inst.is_astore() {
            return self.operand(
                inst,
                format!(
                    "The first instruction of a subroutine must be an ASTORE, but is '{}'.",
                    target_inst.name()
                ),
            );
        }
        Ok(())
    }

    fn check_load_constant(&self, inst: &Inst, index: ConstantPoolIndexRaw<ConstantInfo>) -> CheckResult {
        let major = self.class.version.major;
        match self.class.const_pool.get(index) {
            Some(ConstantInfo::Integer(_) | ConstantInfo::Float(_) | ConstantInfo::String(_)) => Ok(()),
            Some(ConstantInfo::Class(class)) => {
                if major < MAJOR_1_5 {
                    self.advise(format!(
                        "Instruction {} loads a CONSTANT_Class, which class files of version {} may not do.",
                        node_to_string(self.class, Node::Instruction(inst)),
                        major
                    ));
                }
                let name = self.class.const_pool.get_text(class.name_index).unwrap_or_default();
                self.check_class_loads(inst, &name)
            }
            Some(info @ (ConstantInfo::MethodType(_) | ConstantInfo::MethodHandle(_))) => {
                if major < MAJOR_1_7 {
                    return self.operand(
                        inst,
                        format!(
                            "A {} may only be loaded by class files of version {} or later.",
                            info.kind_name(),
                            MAJOR_1_7
                        ),
                    );
                }
                Ok(())
            }
            Some(ConstantInfo::Dynamic(_)) => Err(FatalError::Unsupported(format!(
                "Loading a CONSTANT_Dynamic in method '{}' of '{}' can not be verified.",
                self.method_name, self.class_name
            ))
            .into()),
            other => self.operand(
                inst,
                format!(
                    "Operand of LDC or LDC_W must be one of CONSTANT_Integer, CONSTANT_Float, CONSTANT_String, CONSTANT_Class, CONSTANT_MethodType or CONSTANT_MethodHandle, but is '{}'.",
                    other.map_or("nothing", ConstantInfo::kind_name)
                ),
            ),
        }
    }

    fn class_operand(&self, inst: &Inst, index: ConstantPoolIndexRaw<ClassConstant>) -> CheckResult<String> {
        match self.class.const_pool.get_class_name(index) {
            Some(name) => Ok(name.into_owned()),
            None => self.operand(inst, "Operand must be a CONSTANT_Class with a valid name."),
        }
    }

    /// The class named by a class reference must pass Pass 1.
    /// For arrays that is the element class, if it is not primitive.
    fn check_class_loads(&self, inst: &Inst, name: &str) -> CheckResult {
        let element;
        let class_name = if name.starts_with('[') {
            element = match DescriptorType::from_text(name) {
                Ok(ty) => ty,
                Err(err) => {
                    return self.operand(inst, format!("Illegal array class name '{}': {}", name, err))
                }
            };
            match element.object_class_name() {
                Some(class_name) => class_name,
                None => return Ok(()),
            }
        } else {
            name
        };

        let outcome = self.registry.get(class_name).do_pass1()?;
        if !outcome.is_ok() {
            return self.operand(
                inst,
                format!(
                    "Class '{}' is referenced, but cannot be loaded: '{}'.",
                    class_name, outcome
                ),
            );
        }
        Ok(())
    }

    fn name_and_type(&self, inst: &Inst, index: ConstantPoolIndexRaw<NameAndTypeConstant>) -> CheckResult<(String, String)> {
        match self.class.const_pool.get_name_and_type(index) {
            Some((name, descriptor)) => Ok((name.into_owned(), descriptor.into_owned())),
            None => self.operand(inst, "Operand does not refer to a valid CONSTANT_NameAndType."),
        }
    }

    fn check_field_access(
        &self,
        inst: &Inst,
        index: ConstantPoolIndexRaw<FieldRefConstant>,
        access: FieldAccess,
    ) -> CheckResult {
        let field_ref = match self.class.const_pool.get_t(index) {
            Some(field_ref) => field_ref,
            None => return self.operand(inst, "Operand must be a CONSTANT_Fieldref."),
        };
        let class_name = self.class_operand(inst, field_ref.class_index)?;
        let (name, descriptor) = self.name_and_type(inst, field_ref.name_and_type_index)?;
        self.check_class_loads(inst, &class_name)?;

        let not_found = || {
            format!(
                "Referenced field '{}' does not exist in class '{}'.",
                name, class_name
            )
        };
        let target = match self.registry.find_class(&class_name) {
            Some(target) => target,
            None => return self.operand(inst, not_found()),
        };
        let found = match resolve::find_field(self.registry, target, &name, &descriptor) {
            Some(found) => found,
            None => return self.operand(inst, not_found()),
        };

        let declaring_class = found.class.name_or_placeholder().into_owned();
        let flags = found.class.fields[found.index].access_flags;

        if access.is_put()
            && flags.contains(FieldAccessFlags::FINAL)
            && declaring_class != self.class_name
        {
            return self.operand(
                inst,
                format!(
                    "Referenced field '{}' is final and must therefore be declared in the current class '{}' which is not the case: it is declared in '{}'.",
                    name, self.class_name, declaring_class
                ),
            );
        }

        let is_static = flags.contains(FieldAccessFlags::STATIC);
        if access.is_static() && !is_static {
            return self.operand(inst, format!("Referenced field '{}' is not static which it should be.", name));
        }
        if !access.is_static() && is_static {
            return self.operand(inst, format!("Referenced field '{}' is static which it shouldn't be.", name));
        }

        if access == FieldAccess::PutStatic
            && found.class.is_interface()
            && self.method_name != STATIC_INITIALIZER_NAME
        {
            return self.operand(
                inst,
                format!(
                    "Interface field '{}' must be set in a '{}' method.",
                    name, STATIC_INITIALIZER_NAME
                ),
            );
        }

        Ok(())
    }

    fn check_method_ref(
        &self,
        inst: &Inst,
        index: ConstantPoolIndexRaw<MethodRefConstant>,
        kind: InvokeKind,
    ) -> CheckResult {
        let method_ref = match self.class.const_pool.get_t(index) {
            Some(method_ref) => method_ref,
            None => return self.operand(inst, "Operand must be a CONSTANT_Methodref."),
        };
        let class_name = self.class_operand(inst, method_ref.class_index)?;
        let (name, descriptor) = self.name_and_type(inst, method_ref.name_and_type_index)?;

        if name == CONSTRUCTOR_NAME && kind != InvokeKind::Special {
            return self.operand(
                inst,
                "Only INVOKESPECIAL is allowed to invoke instance initialization methods.",
            );
        }
        if name.starts_with('<') && name != CONSTRUCTOR_NAME {
            return self.operand(
                inst,
                "No method with a name beginning with '<' other than the instance initialization method may be invoked.",
            );
        }

        self.check_invoke(inst, &class_name, &name, &descriptor, kind)
    }

    fn check_invoke_interface(&self, inst: &Inst, x: &InvokeInterface) -> CheckResult {
        let method_ref = match self.class.const_pool.get_t(x.index) {
            Some(method_ref) => method_ref,
            None => return self.operand(inst, "Operand must be a CONSTANT_InterfaceMethodref."),
        };
        let class_name = self.class_operand(inst, method_ref.class_index)?;
        let (name, descriptor) = self.name_and_type(inst, method_ref.name_and_type_index)?;
        if name.starts_with('<') {
            return self.operand(inst, "Interface methods can not be initialization methods.");
        }

        if x.count == 0 {
            return self.operand(inst, "The 'count' argument must not be 0.");
        }
        if let Ok(parsed) = MethodDescriptor::from_text(&descriptor) {
            let expected = parsed.parameter_slots() + 1;
            if usize::from(x.count) != expected {
                return self.operand(
                    inst,
                    format!(
                        "The 'count' argument should be '{}' but is '{}'.",
                        expected, x.count
                    ),
                );
            }
        }
        if x.zero != 0 {
            return self.operand(inst, "The fourth operand byte of INVOKEINTERFACE must be zero.");
        }

        self.check_invoke(inst, &class_name, &name, &descriptor, InvokeKind::Interface)
    }

    fn check_invoke(
        &self,
        inst: &Inst,
        class_name: &str,
        name: &str,
        descriptor: &str,
        kind: InvokeKind,
    ) -> CheckResult {
        let parsed = match MethodDescriptor::from_text(descriptor) {
            Ok(parsed) => parsed,
            Err(err) => {
                return self.operand(inst, format!("Illegal method descriptor '{}': {}", descriptor, err))
            }
        };

        let types = parsed
            .parameters()
            .iter()
            .chain(parsed.return_type())
            .filter_map(DescriptorType::object_class_name);
        for type_name in types {
            let outcome = self.registry.get(type_name).do_pass2()?;
            if !outcome.is_ok() {
                return self.operand(
                    inst,
                    format!(
                        "Class '{}' is referenced, but cannot be loaded and resolved: '{}'.",
                        type_name, outcome
                    ),
                );
            }
        }

        self.check_class_loads(inst, class_name)?;

        // Methods invoked on arrays are those of the root class
        let lookup_name = if class_name.starts_with('[') {
            self.registry.config().object_class.as_str()
        } else {
            class_name
        };
        let target = match self.registry.find_class(lookup_name) {
            Some(target) => target,
            None => return Err(FatalError::MissingClass(lookup_name.to_owned()).into()),
        };

        if kind == InvokeKind::Interface && !target.is_interface() {
            return self.operand(
                inst,
                format!(
                    "Referenced class '{}' must be an interface for INVOKEINTERFACE.",
                    lookup_name
                ),
            );
        }
        if kind != InvokeKind::Interface && target.is_interface() {
            return self.operand(
                inst,
                format!(
                    "Referenced class '{}' is an interface, which a CONSTANT_Methodref must not refer to.",
                    lookup_name
                ),
            );
        }

        let found = match resolve::find_method(self.registry, Rc::clone(&target), name, descriptor) {
            Some(found) => found,
            None => {
                return self.operand(
                    inst,
                    format!(
                        "Referenced method '{}' with expected signature '{}' not found in class '{}'.",
                        name, descriptor, lookup_name
                    ),
                )
            }
        };

        let is_static = found.class.methods[found.index]
            .access_flags
            .contains(MethodAccessFlags::STATIC);
        if kind == InvokeKind::Static && !is_static {
            return self.operand(inst, format!("Referenced method '{}' has ACC_STATIC unset.", name));
        }
        if kind != InvokeKind::Static && is_static {
            return self.operand(inst, format!("Referenced method '{}' has ACC_STATIC set.", name));
        }

        if kind == InvokeKind::Special {
            self.check_super_lookup(inst, lookup_name, name, &parsed)?;
        }

        Ok(())
    }

    /// With ACC_SUPER, invokespecial of a superclass method selects the nearest declaration in
    /// the superclasses of the current class
    fn check_super_lookup(
        &self,
        inst: &Inst,
        referenced: &str,
        name: &str,
        descriptor: &MethodDescriptor,
    ) -> CheckResult {
        if name == CONSTRUCTOR_NAME
            || !self.class.is_super()
            || referenced == self.class_name
            || !resolve::is_subclass_of(self.registry, self.class_name, referenced)
        {
            return Ok(());
        }

        let declared = resolve::superclasses(self.registry, self.class)
            .iter()
            .any(|ancestor| {
                let pool = &ancestor.const_pool;
                ancestor.methods.iter().any(|method| {
                    method.name(pool).as_deref() == Some(name)
                        && matches!(
                            method.parsed_descriptor(pool),
                            Some(Ok(candidate)) if candidate == *descriptor
                        )
                })
            });
        if !declared {
            return self.operand(
                inst,
                format!(
                    "ACC_SUPER special lookup procedure not successful: method '{}' with proper signature not declared in superclass hierarchy.",
                    name
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rhoverify_base::{
        attribute::{ExceptionEntry, LineNumberEntry, LineNumberTableAttribute},
        builder::{code, ClassBuilder},
        class::ClassAccessFlags,
        MemoryRepository,
    };

    use super::*;

    const RETURN: u8 = 0xB1;
    const POP: u8 = 0x57;
    const POP2: u8 = 0x58;
    const ICONST_0: u8 = 0x03;

    fn be<T>(index: ConstantPoolIndexRaw<T>) -> [u8; 2] {
        index.get().to_be_bytes()
    }

    fn byte<T>(index: ConstantPoolIndexRaw<T>) -> u8 {
        u8::try_from(index.get()).unwrap()
    }

    fn repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new();
        repo.add(ClassBuilder::new("java/lang/Object", None).build())
            .unwrap();
        repo.add(ClassBuilder::new("java/lang/Throwable", Some("java/lang/Object")).build())
            .unwrap();

        let mut holder = ClassBuilder::new("Holder", Some("java/lang/Object"));
        holder.add_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC, "count", "I");
        holder.add_field(FieldAccessFlags::PUBLIC, "value", "I");
        holder.add_field(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            "K",
            "I",
        );
        holder.add_field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "secret", "I");
        let body = || Some(code(0, 1, vec![RETURN]));
        holder.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "make", "()V", body());
        holder.add_method(MethodAccessFlags::PUBLIC, "work", "()V", body());
        holder.add_method(MethodAccessFlags::PUBLIC, "<init>", "()V", body());
        holder.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "take",
            "(LMissing;)V",
            body(),
        );
        repo.add(holder.build()).unwrap();
        repo.add(ClassBuilder::new("Child", Some("Holder")).build())
            .unwrap();

        // A private field on the way up does not hide the public one above it
        let mut shade = ClassBuilder::new("Shade", Some("Holder"));
        shade.add_field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "count", "I");
        repo.add(shade.build()).unwrap();
        repo.add(ClassBuilder::new("Below", Some("Shade")).build())
            .unwrap();

        let mut iface = ClassBuilder::new_interface("Iface");
        iface.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT, "go", "()V", None);
        repo.add(iface.build()).unwrap();

        repo
    }

    /// Run Pass 3a over a static method `run` of class `Main` whose code comes from `body`
    fn verify_in(
        super_class: &str,
        max_locals: u16,
        body: impl FnOnce(&mut ClassBuilder) -> Vec<u8>,
    ) -> Result<Outcome, FatalError> {
        let mut builder = ClassBuilder::new("Main", Some(super_class));
        let bytes = body(&mut builder);
        builder.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "run",
            "()V",
            Some(code(4, max_locals, bytes)),
        );
        let mut repo = repo();
        repo.add(builder.build()).unwrap();
        Registry::new(repo).get("Main").do_pass3a(0)
    }

    fn verify(max_locals: u16, body: impl FnOnce(&mut ClassBuilder) -> Vec<u8>) -> Outcome {
        verify_in("java/lang/Object", max_locals, body).unwrap()
    }

    fn rejected_with(outcome: &Outcome, text: &str) -> bool {
        outcome.is_rejected() && outcome.message().contains(text)
    }

    #[test]
    fn local_variable_indices() {
        assert!(verify(5, |_| vec![0x15, 4, POP, RETURN]).is_ok());
        let outcome = verify(5, |_| vec![0x15, 5, POP, RETURN]);
        assert!(rejected_with(&outcome, "Index '5' must not be greater than max_locals-1 '4'."));
        assert!(outcome.message().starts_with("Instruction iload"));

        let outcome = verify(5, |_| vec![0x16, 4, POP2, RETURN]);
        assert!(rejected_with(&outcome, "Index '4' must not be greater than max_locals-2 '3'."));
        assert!(verify(5, |_| vec![0x16, 3, POP2, RETURN]).is_ok());

        // wide iload 4, wide lload 3 and wide lload 4
        assert!(verify(5, |_| vec![0xC4, 0x15, 0, 4, POP, RETURN]).is_ok());
        assert!(verify(5, |_| vec![0xC4, 0x16, 0, 3, POP2, RETURN]).is_ok());
        assert!(verify(5, |_| vec![0xC4, 0x16, 0, 4, POP2, RETURN]).is_rejected());
    }

    fn lookupswitch(matches: &[i32]) -> Vec<u8> {
        // The opcode is followed by three bytes of padding, then the default and the count
        let end = i32::try_from(12 + 8 * matches.len()).unwrap();
        let mut bytes = vec![0xAB, 0, 0, 0];
        bytes.extend(end.to_be_bytes());
        bytes.extend(i32::try_from(matches.len()).unwrap().to_be_bytes());
        for m in matches {
            bytes.extend(m.to_be_bytes());
            bytes.extend(end.to_be_bytes());
        }
        bytes.push(RETURN);
        bytes
    }

    #[test]
    fn lookupswitch_tables() {
        assert!(verify(0, |_| lookupswitch(&[3, 5, 9])).is_ok());
        assert!(rejected_with(
            &verify(0, |_| lookupswitch(&[5, 3, 9])),
            "Lookupswitch table is not sorted but should be."
        ));
        assert!(rejected_with(
            &verify(0, |_| lookupswitch(&[3, 3, 9])),
            "Match '3' occurs more than once."
        ));
    }

    #[test]
    fn code_shape() {
        assert!(rejected_with(
            &verify(0, |_| vec![0xFE, RETURN]),
            "illegal instruction for _internal_ JVM use!"
        ));
        let outcome = verify(0, |_| vec![0x00]);
        assert!(rejected_with(&outcome, "fall off the bottom"));
        assert!(verify(0, |_| vec![0xE0, RETURN])
            .message()
            .starts_with("Bad bytecode in the code array"));
    }

    #[test]
    fn switch_ends_code() {
        // return, then a switch at offset 1 whose every target is the return
        let back = (-1i32).to_be_bytes();
        let mut lookup = vec![RETURN, 0xAB, 0, 0];
        lookup.extend(back);
        lookup.extend(0i32.to_be_bytes());
        assert!(verify(0, move |_| lookup).is_ok());

        let mut table = vec![RETURN, 0xAA, 0, 0];
        table.extend(back);
        table.extend(0i32.to_be_bytes());
        table.extend(0i32.to_be_bytes());
        table.extend(back);
        assert!(verify(0, move |_| table).is_ok());
    }

    #[test]
    fn subroutines() {
        // jsr to an astore, which then returns
        assert!(verify(2, |_| vec![0xA8, 0, 4, RETURN, 0x4C, 0xA9, 1]).is_ok());
        assert!(rejected_with(
            &verify(2, |_| vec![0xA8, 0, 4, RETURN, 0x00, RETURN]),
            "must be an ASTORE"
        ));
        assert!(rejected_with(
            &verify(2, |_| vec![0x4C, 0xA8, 0xFF, 0xFF, RETURN]),
            "must not start at the first instruction"
        ));
    }

    fn get_static(class: &'static str, name: &'static str) -> impl FnOnce(&mut ClassBuilder) -> Vec<u8> {
        move |b| {
            let [hi, lo] = be(b.field_ref(class, name, "I"));
            vec![0xB2, hi, lo, POP, RETURN]
        }
    }

    #[test]
    fn field_instructions() {
        assert!(verify(0, get_static("Holder", "count")).is_ok());
        assert!(verify(0, get_static("Child", "count")).is_ok());
        assert!(verify(0, get_static("Below", "count")).is_ok());
        assert!(rejected_with(
            &verify(0, get_static("Holder", "value")),
            "Referenced field 'value' is not static which it should be."
        ));
        assert!(rejected_with(
            &verify(0, get_static("Holder", "missing")),
            "Referenced field 'missing' does not exist in class 'Holder'."
        ));
        assert!(rejected_with(
            &verify(0, get_static("Child", "secret")),
            "Referenced field 'secret' does not exist in class 'Child'."
        ));
        assert!(rejected_with(
            &verify(0, get_static("Nowhere", "x")),
            "Class 'Nowhere' is referenced, but cannot be loaded"
        ));

        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.field_ref("Holder", "count", "I"));
            vec![0xB4, hi, lo, POP, RETURN]
        });
        assert!(rejected_with(&outcome, "is static which it shouldn't be."));

        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.field_ref("Holder", "K", "I"));
            vec![ICONST_0, 0xB3, hi, lo, RETURN]
        });
        assert!(rejected_with(
            &outcome,
            "is final and must therefore be declared in the current class 'Main'"
        ));
    }

    fn invoke(opcode: u8, class: &str, name: &str, descriptor: &str) -> Outcome {
        verify(0, |b| {
            let [hi, lo] = be(b.method_ref(class, name, descriptor));
            vec![opcode, hi, lo, RETURN]
        })
    }

    #[test]
    fn invoke_instructions() {
        const INVOKEVIRTUAL: u8 = 0xB6;
        const INVOKESPECIAL: u8 = 0xB7;
        const INVOKESTATIC: u8 = 0xB8;

        assert!(invoke(INVOKESTATIC, "Holder", "make", "()V").is_ok());
        assert!(invoke(INVOKESTATIC, "Child", "make", "()V").is_ok());
        assert!(invoke(INVOKESPECIAL, "Holder", "<init>", "()V").is_ok());
        assert!(rejected_with(
            &invoke(INVOKESTATIC, "Holder", "<init>", "()V"),
            "Only INVOKESPECIAL is allowed to invoke instance initialization methods."
        ));
        assert!(rejected_with(
            &invoke(INVOKEVIRTUAL, "Holder", "make", "()V"),
            "Referenced method 'make' has ACC_STATIC set."
        ));
        assert!(rejected_with(
            &invoke(INVOKESTATIC, "Holder", "gone", "()V"),
            "Referenced method 'gone' with expected signature '()V' not found in class 'Holder'."
        ));
        assert!(rejected_with(
            &invoke(INVOKESTATIC, "Holder", "take", "(LMissing;)V"),
            "Class 'Missing' is referenced, but cannot be loaded and resolved"
        ));

        // The superclass method is found by the ACC_SUPER lookup
        let outcome = verify_in("Holder", 1, |b| {
            let [hi, lo] = be(b.method_ref("Holder", "work", "()V"));
            vec![0xB7, hi, lo, RETURN]
        })
        .unwrap();
        assert!(outcome.is_ok(), "{}", outcome);
    }

    #[test]
    fn interface_and_dynamic_invocation() {
        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.interface_method_ref("Iface", "go", "()V"));
            vec![0xB9, hi, lo, 1, 0, RETURN]
        });
        assert!(outcome.is_ok(), "{}", outcome);

        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.interface_method_ref("Iface", "go", "()V"));
            vec![0xB9, hi, lo, 2, 0, RETURN]
        });
        assert!(rejected_with(&outcome, "The 'count' argument should be '1' but is '2'."));

        let result = verify_in("java/lang/Object", 0, |b| {
            let [hi, lo] = be(b.invoke_dynamic(0, "run", "()V"));
            vec![0xBA, hi, lo, 0, 0, RETURN]
        });
        assert!(matches!(result, Err(FatalError::Unsupported(_))));
    }

    #[test]
    fn constants() {
        assert!(verify(0, |b| vec![0x12, byte(b.string("hi")), POP, RETURN]).is_ok());
        assert!(verify(0, |b| vec![0x12, byte(b.class("Holder")), POP, RETURN]).is_ok());
        assert!(verify(0, |b| vec![0x12, byte(b.method_type("()V")), POP, RETURN]).is_ok());
        assert!(rejected_with(
            &verify(0, |b| vec![0x12, byte(b.class("Nowhere")), POP, RETURN]),
            "Class 'Nowhere' is referenced, but cannot be loaded"
        ));
        assert!(rejected_with(
            &verify(0, |b| vec![0x12, byte(b.long(1)), POP, RETURN]),
            "Operand of LDC or LDC_W must be one of"
        ));

        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.integer(7));
            vec![0x14, hi, lo, POP2, RETURN]
        });
        assert!(rejected_with(
            &outcome,
            "Operand of LDC2_W must be CONSTANT_Long or CONSTANT_Double, but is 'CONSTANT_Integer'."
        ));
        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.double(7.0));
            vec![0x14, hi, lo, POP2, RETURN]
        });
        assert!(outcome.is_ok());
    }

    #[test]
    fn object_creation() {
        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.class("[I"));
            vec![0xBB, hi, lo, POP, RETURN]
        });
        assert!(rejected_with(&outcome, "NEW must not be used to create an array."));

        assert!(verify(0, |_| vec![ICONST_0, 0xBC, 10, POP, RETURN]).is_ok());
        assert!(rejected_with(
            &verify(0, |_| vec![ICONST_0, 0xBC, 3, POP, RETURN]),
            "Illegal array type '3' for NEWARRAY."
        ));

        let multi = |dimensions: u8| {
            verify(0, move |b| {
                let [hi, lo] = be(b.class("[[LHolder;"));
                vec![ICONST_0, ICONST_0, 0xC5, hi, lo, dimensions, POP, RETURN]
            })
        };
        assert!(multi(2).is_ok());
        assert!(multi(3).is_rejected());
        assert!(rejected_with(
            &multi(0),
            "Number of dimensions to create must be greater than zero."
        ));

        let deepest = format!("{}I", "[".repeat(MAX_ARRAY_DIMENSIONS));
        let outcome = verify(0, |b| {
            let [hi, lo] = be(b.class(&deepest));
            vec![ICONST_0, 0xBD, hi, lo, POP, RETURN]
        });
        assert!(rejected_with(&outcome, "more than 255 dimensions"));
    }

    #[test]
    fn code_attribute_offsets() {
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let line_numbers = builder.attribute(Attribute::LineNumberTable(LineNumberTableAttribute {
            entries: vec![
                LineNumberEntry {
                    start_pc: 0,
                    line_number: 1,
                },
                LineNumberEntry {
                    start_pc: 0,
                    line_number: 2,
                },
                LineNumberEntry {
                    start_pc: 2,
                    line_number: 3,
                },
            ],
        }));
        let mut body = code(1, 1, vec![ICONST_0, POP, RETURN]);
        body.attributes.push(line_numbers);
        builder.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "run", "()V", Some(body.clone()));

        body.attributes.clear();
        body.exception_table.push(ExceptionEntry {
            start_pc: 2,
            end_pc: 1,
            handler_pc: 0,
            catch_type: ConstantPoolIndexRaw::new(0),
        });
        builder.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "caught", "()V", Some(body.clone()));

        let bad_line = builder.attribute(Attribute::LineNumberTable(LineNumberTableAttribute {
            entries: vec![LineNumberEntry {
                start_pc: 5,
                line_number: 1,
            }],
        }));
        body.exception_table.clear();
        body.attributes.push(bad_line);
        builder.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "lines", "()V", Some(body));

        let mut repo = repo();
        repo.add(builder.build()).unwrap();
        let handle = Registry::new(repo).get("Main");

        assert!(handle.do_pass3a(0).unwrap().is_ok());
        assert!(handle
            .messages()
            .iter()
            .any(|m| m.starts_with("Pass 3a, method 0 ('run'): LineNumberTable")));

        let outcome = handle.do_pass3a(1).unwrap();
        assert!(rejected_with(&outcome, "not smaller than its end_pc"));

        let outcome = handle.do_pass3a(2).unwrap();
        assert!(rejected_with(
            &outcome,
            "refers to a code offset ('5') that does not exist."
        ));
    }

    #[test]
    fn preconditions() {
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        builder.set_access_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT);
        builder.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            "run",
            "()V",
            None,
        );
        let mut repo = repo();
        repo.add(builder.build()).unwrap();
        repo.add(ClassBuilder::new("Broken", Some("Nowhere")).build())
            .unwrap();
        let registry = Registry::new(repo);

        let main = registry.get("Main");
        assert!(main.do_pass3a(0).unwrap().is_ok());
        assert!(matches!(
            main.do_pass3a(1),
            Err(FatalError::InvalidMethod { index: 1, .. })
        ));
        assert!(registry.get("Broken").do_pass3a(0).unwrap().is_not_yet());
    }
}
