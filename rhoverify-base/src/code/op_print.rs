use itertools::Itertools;

use crate::{
    class::ClassFile,
    code::method::MethodDescriptor,
    constant_pool::{ClassConstant, ConstantInfo, ConstantPoolIndexRaw, NameAndTypeConstant},
};

use super::op::{Inst, WideInst};

struct FormatInst<'a> {
    class_file: &'a ClassFile,
}
impl<'a> FormatInst<'a> {
    fn single<T>(&self, inst: &Inst, index: ConstantPoolIndexRaw<T>) -> String {
        format!(
            "{} @{}",
            inst.name(),
            index_as_pretty_string(self.class_file, index)
        )
    }
}

impl Inst {
    /// This converts the instruction to a readable string, resolving constant pool operands.
    /// Bad pool indices are rendered in the output rather than reported, since this is used
    /// for building messages about instructions that might be faulty.
    #[must_use]
    pub fn as_pretty_string(&self, class_file: &ClassFile) -> String {
        let f = FormatInst { class_file };
        match self {
            Inst::LoadConstant(x) => f.single(self, x.index),
            Inst::LoadConstantWide(x) => f.single(self, x.index),
            Inst::LoadConstant2Wide(x) => f.single(self, x.index),
            Inst::GetStatic(x) => f.single(self, x.index),
            Inst::PutStaticField(x) => f.single(self, x.index),
            Inst::GetField(x) => f.single(self, x.index),
            Inst::PutField(x) => f.single(self, x.index),
            Inst::InvokeVirtual(x) => f.single(self, x.index),
            Inst::InvokeSpecial(x) => f.single(self, x.index),
            Inst::InvokeStatic(x) => f.single(self, x.index),
            Inst::InvokeDynamic(x) => f.single(self, x.index),
            Inst::New(x) => f.single(self, x.index),
            Inst::ANewArray(x) => f.single(self, x.index),
            Inst::CheckCast(x) => f.single(self, x.index),
            Inst::InstanceOf(x) => f.single(self, x.index),
            Inst::InvokeInterface(x) => format!("{} {}", f.single(self, x.index), x.count),
            Inst::MultiANewArray(x) => format!("{} [{}]", f.single(self, x.index), x.dimensions),

            Inst::PushByte(x) => format!("{} #{}", self.name(), x.val),
            Inst::PushShort(x) => format!("{} #{}", self.name(), x.val),
            Inst::NewArray(x) => format!("{} {}", self.name(), x.atype),
            Inst::IntIncrement(x) => format!(
                "{} [{}] = [{}] + {}",
                self.name(),
                x.index,
                x.index,
                x.increment_amount
            ),
            Inst::Wide(wide) => match &wide.0 {
                WideInst::WideIntIncrement(x) => format!(
                    "wide {} [{}] = [{}] + {}",
                    wide.0.name(),
                    x.index,
                    x.index,
                    x.increment_amount
                ),
                inner => match self.local_variable_index() {
                    Some(local) => format!("wide {} [{}]", inner.name(), local.index),
                    None => format!("wide {:?}", inner),
                },
            },
            Inst::TableSwitch(x) => {
                let cases = x
                    .jump_offsets
                    .iter()
                    .zip(i64::from(x.low)..)
                    .map(|(offset, key)| format!("{}: {:+}", key, offset))
                    .join(", ");
                format!("{} {{ {}, default: {:+} }}", self.name(), cases, x.default)
            }
            Inst::LookupSwitch(x) => {
                let cases = x
                    .pairs
                    .iter()
                    .map(|pair| format!("{}: {:+}", pair.match_v, pair.offset))
                    .join(", ");
                format!("{} {{ {}, default: {:+} }}", self.name(), cases, x.default)
            }
            _ => {
                if let Some(local) = self.local_variable_index() {
                    format!("{} [{}]", self.name(), local.index)
                } else if let Some(offset) = self.branch_offsets().first() {
                    format!("{} {:+}", self.name(), offset)
                } else {
                    self.name().to_owned()
                }
            }
        }
    }
}

fn index_as_pretty_string<T>(class_file: &ClassFile, index: ConstantPoolIndexRaw<T>) -> String {
    let index = index.into_generic();
    let pool = &class_file.const_pool;
    if let Some(value) = pool.get(index) {
        match value {
            ConstantInfo::Utf8(v) => match v.as_text() {
                Some(text) => format!("utf8\"{}\"", text),
                None => "utf8[BadModifiedUtf8]".to_owned(),
            },
            ConstantInfo::Integer(v) => format!("{}", v.value),
            ConstantInfo::Float(v) => format!("{}_f", v.value),
            ConstantInfo::Long(v) => format!("{}_l", v.value),
            ConstantInfo::Double(v) => format!("{}_d", v.value),
            ConstantInfo::Class(class) => {
                if let Some(class_name) = pool.get_text(class.name_index) {
                    format!("Class({})", class_name)
                } else {
                    format!("Class[BAD POOL INDEX {:?}->{:?}]", index, class.name_index)
                }
            }
            ConstantInfo::String(v) => {
                if let Some(text) = pool.get_text(v.string_index) {
                    format!("str\"{}\"", text)
                } else {
                    format!("str[BAD POOL INDEX {:?}->{:?}]", index, v.string_index)
                }
            }
            ConstantInfo::FieldRef(field) => {
                let class_name = class_name_string(class_file, field.class_index);
                if let Some((name, typ)) = pool.get_name_and_type(field.name_and_type_index) {
                    format!("{}::{}:{}", class_name, name, typ)
                } else {
                    format!("{}::[BadNatIndex {:?}]", class_name, field.name_and_type_index)
                }
            }
            ConstantInfo::MethodRef(method) => {
                method_to_string(class_file, method.class_index, method.name_and_type_index)
            }
            ConstantInfo::InterfaceMethodRef(method) => {
                method_to_string(class_file, method.class_index, method.name_and_type_index)
            }
            ConstantInfo::NameAndType(nat) => {
                let name = pool
                    .get_text(nat.name_index)
                    .map_or_else(|| format!("[BadNameIndex {:?}]", nat.name_index), |x| x.into_owned());
                let typ = pool.get_text(nat.descriptor_index).map_or_else(
                    || format!("[BadDescriptorIndex {:?}]", nat.descriptor_index),
                    |x| x.into_owned(),
                );
                format!("{}:{}", name, typ)
            }
            ConstantInfo::MethodHandle(handle) => format!(
                "MH[kind {} -> {:?}]",
                handle.reference_kind, handle.reference_index
            ),
            ConstantInfo::MethodType(typ) => {
                if let Some(descriptor) = pool.get_text(typ.descriptor_index) {
                    format!("MT[{}]", descriptor)
                } else {
                    format!("MethodType[BadDescriptorIndex {:?}]", typ.descriptor_index)
                }
            }
            ConstantInfo::Dynamic(dynamic) => {
                let nat = nat_to_string(class_file, dynamic.name_and_type_index);
                format!("Dynamic[Bootstrap: {}; {}]", dynamic.bootstrap_method_attr_index, nat)
            }
            ConstantInfo::InvokeDynamic(inv) => {
                let nat = nat_to_string(class_file, inv.name_and_type_index);
                format!("Bootstrap: {}; {}", inv.bootstrap_method_attr_index, nat)
            }
            ConstantInfo::Module(module) => match pool.get_text(module.name_index) {
                Some(name) => format!("Module({})", name),
                None => format!("Module[BadNameIndex {:?}]", module.name_index),
            },
            ConstantInfo::Package(package) => match pool.get_text(package.name_index) {
                Some(name) => format!("Package({})", name),
                None => format!("Package[BadNameIndex {:?}]", package.name_index),
            },
            ConstantInfo::Unusable => "[Unusable Upper Bits]".to_owned(),
        }
    } else {
        format!("[BAD POOL INDEX {:?}]", index)
    }
}

fn class_name_string(class_file: &ClassFile, class_index: ConstantPoolIndexRaw<ClassConstant>) -> String {
    let pool = &class_file.const_pool;
    if let Some(class) = pool.get_t(class_index) {
        if let Some(text) = pool.get_text(class.name_index) {
            text.into_owned()
        } else {
            format!("[BadClassNameIndex {:?} -> {:?}]", class_index, class.name_index)
        }
    } else {
        format!("[BadClassIndex {:?}]", class_index)
    }
}

fn nat_to_string(class_file: &ClassFile, nat_index: ConstantPoolIndexRaw<NameAndTypeConstant>) -> String {
    match class_file.const_pool.get_name_and_type(nat_index) {
        Some((name, typ)) => format!("{}:{}", name, typ),
        None => format!("[BadNatIndex {:?}]", nat_index),
    }
}

fn method_to_string(
    class_file: &ClassFile,
    class_index: ConstantPoolIndexRaw<ClassConstant>,
    nat_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
) -> String {
    let class_name = class_name_string(class_file, class_index);

    if let Some((name, typ)) = class_file.const_pool.get_name_and_type(nat_index) {
        let typ = match MethodDescriptor::from_text(&typ) {
            Ok(method_descriptor) => method_descriptor.to_string(),
            Err(_) => format!("[BadMethodDescriptor {}]", typ),
        };

        format!("{}::{}:{}", class_name, name, typ)
    } else {
        format!("{}::[BadNatIndex {:?}]", class_name, nat_index)
    }
}
