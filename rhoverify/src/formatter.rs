//! Rendering parts of a class as text for messages.
//! Rendering never fails: anything that can't be resolved through the constant pool is shown as
//! a `<<Kind>>` placeholder.

use rhoverify_base::{
    attribute::{
        Attribute, AttributeInfo, ExceptionEntry, InnerClassEntry, LineNumberEntry,
        LocalVariableEntry,
    },
    class::{ClassFile, FieldAccessFlags, FieldInfo, MethodAccessFlags, MethodInfo},
    code::{
        method::{DescriptorType, MethodDescriptor},
        op::Inst,
    },
    constant_pool::{ConstantInfo, ConstantPool, ConstantPoolIndexRaw},
};

/// Something inside of a class that can be rendered
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Constant(ConstantPoolIndexRaw<ConstantInfo>),
    Field(&'a FieldInfo),
    Method(&'a MethodInfo),
    Attribute(&'a AttributeInfo),
    ExceptionEntry(&'a ExceptionEntry),
    LocalVariable(&'a LocalVariableEntry),
    LineNumber(&'a LineNumberEntry),
    InnerClass(&'a InnerClassEntry),
    Instruction(&'a Inst),
}
impl<'a> Node<'a> {
    fn kind_name(&self) -> &'static str {
        match self {
            Node::Constant(_) => "Constant",
            Node::Field(_) => "Field",
            Node::Method(_) => "Method",
            Node::Attribute(_) => "Attribute",
            Node::ExceptionEntry(_) => "CodeException",
            Node::LocalVariable(_) => "LocalVariable",
            Node::LineNumber(_) => "LineNumber",
            Node::InnerClass(_) => "InnerClass",
            Node::Instruction(_) => "Instruction",
        }
    }
}

/// Render the node, resolving pool references through `class`
#[must_use]
pub fn node_to_string(class: &ClassFile, node: Node<'_>) -> String {
    let pool = &class.const_pool;
    let text = match node {
        Node::Constant(index) => constant_to_string(pool, index),
        Node::Field(field) => field_to_string(pool, field),
        Node::Method(method) => method_to_string(pool, method),
        Node::Attribute(attribute) => attribute_to_string(class, attribute),
        Node::ExceptionEntry(entry) => {
            let catch_type = if entry.catch_type.is_zero() {
                Some("<Any exception>".to_owned())
            } else {
                pool.get_class_name(entry.catch_type).map(|x| x.into_owned())
            };
            catch_type.map(|catch_type| {
                format!(
                    "[{}, {}) -> {}: {}",
                    entry.start_pc, entry.end_pc, entry.handler_pc, catch_type
                )
            })
        }
        Node::LocalVariable(entry) => local_variable_to_string(pool, entry),
        Node::LineNumber(entry) => Some(format!(
            "line {} at pc {}",
            entry.line_number, entry.start_pc
        )),
        Node::InnerClass(entry) => inner_class_to_string(pool, entry),
        Node::Instruction(inst) => Some(inst.as_pretty_string(class)),
    };

    text.unwrap_or_else(|| format!("<<{}>>", node.kind_name()))
}

fn constant_to_string(pool: &ConstantPool, index: ConstantPoolIndexRaw<ConstantInfo>) -> Option<String> {
    Some(match pool.get(index)? {
        ConstantInfo::Utf8(v) => v.as_text()?.into_owned(),
        ConstantInfo::Integer(v) => v.value.to_string(),
        ConstantInfo::Float(v) => v.value.to_string(),
        ConstantInfo::Long(v) => v.value.to_string(),
        ConstantInfo::Double(v) => v.value.to_string(),
        ConstantInfo::Class(v) => pool.get_text(v.name_index)?.into_owned(),
        ConstantInfo::String(v) => format!("\"{}\"", pool.get_text(v.string_index)?),
        ConstantInfo::FieldRef(v) => {
            let (name, descriptor) = pool.get_name_and_type(v.name_and_type_index)?;
            format!("{}.{}:{}", pool.get_class_name(v.class_index)?, name, descriptor)
        }
        ConstantInfo::MethodRef(v) => {
            let (name, descriptor) = pool.get_name_and_type(v.name_and_type_index)?;
            format!("{}.{}{}", pool.get_class_name(v.class_index)?, name, descriptor)
        }
        ConstantInfo::InterfaceMethodRef(v) => {
            let (name, descriptor) = pool.get_name_and_type(v.name_and_type_index)?;
            format!("{}.{}{}", pool.get_class_name(v.class_index)?, name, descriptor)
        }
        ConstantInfo::NameAndType(v) => format!(
            "{}:{}",
            pool.get_text(v.name_index)?,
            pool.get_text(v.descriptor_index)?
        ),
        ConstantInfo::MethodHandle(v) => {
            // The referenced entry is a member reference, which does not lead back here
            let target = match pool.get(v.reference_index)? {
                ConstantInfo::MethodHandle(_) => return None,
                _ => constant_to_string(pool, v.reference_index)?,
            };
            format!("MethodHandle(kind {}, {})", v.reference_kind, target)
        }
        ConstantInfo::MethodType(v) => pool.get_text(v.descriptor_index)?.into_owned(),
        ConstantInfo::Dynamic(v) => {
            let (name, descriptor) = pool.get_name_and_type(v.name_and_type_index)?;
            format!("#{}:{}:{}", v.bootstrap_method_attr_index, name, descriptor)
        }
        ConstantInfo::InvokeDynamic(v) => {
            let (name, descriptor) = pool.get_name_and_type(v.name_and_type_index)?;
            format!("#{}:{}{}", v.bootstrap_method_attr_index, name, descriptor)
        }
        ConstantInfo::Module(v) => pool.get_text(v.name_index)?.into_owned(),
        ConstantInfo::Package(v) => pool.get_text(v.name_index)?.into_owned(),
        ConstantInfo::Unusable => return None,
    })
}

fn field_flag_words(flags: FieldAccessFlags) -> Vec<&'static str> {
    [
        (FieldAccessFlags::PUBLIC, "public"),
        (FieldAccessFlags::PRIVATE, "private"),
        (FieldAccessFlags::PROTECTED, "protected"),
        (FieldAccessFlags::STATIC, "static"),
        (FieldAccessFlags::FINAL, "final"),
        (FieldAccessFlags::VOLATILE, "volatile"),
        (FieldAccessFlags::TRANSIENT, "transient"),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, word)| word)
    .collect()
}

fn method_flag_words(flags: MethodAccessFlags) -> Vec<&'static str> {
    [
        (MethodAccessFlags::PUBLIC, "public"),
        (MethodAccessFlags::PRIVATE, "private"),
        (MethodAccessFlags::PROTECTED, "protected"),
        (MethodAccessFlags::STATIC, "static"),
        (MethodAccessFlags::FINAL, "final"),
        (MethodAccessFlags::SYNCHRONIZED, "synchronized"),
        (MethodAccessFlags::NATIVE, "native"),
        (MethodAccessFlags::ABSTRACT, "abstract"),
        (MethodAccessFlags::STRICT, "strictfp"),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, word)| word)
    .collect()
}

fn field_to_string(pool: &ConstantPool, field: &FieldInfo) -> Option<String> {
    let name = field.name(pool)?;
    let descriptor = DescriptorType::from_text(&field.descriptor(pool)?).ok()?;
    let mut words: Vec<&str> = field_flag_words(field.access_flags);
    let descriptor = descriptor.to_string();
    words.push(&descriptor);
    words.push(&name);
    Some(words.join(" "))
}

fn method_to_string(pool: &ConstantPool, method: &MethodInfo) -> Option<String> {
    let name = method.name(pool)?;
    let descriptor = MethodDescriptor::from_text(&method.descriptor(pool)?).ok()?;
    let return_type = descriptor
        .return_type()
        .map_or_else(|| "void".to_owned(), ToString::to_string);
    let parameters = descriptor
        .parameters()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut words: Vec<&str> = method_flag_words(method.access_flags);
    let signature = format!("{} {}({})", return_type, name, parameters);
    words.push(&signature);
    Some(words.join(" "))
}

fn attribute_to_string(class: &ClassFile, attribute: &AttributeInfo) -> Option<String> {
    let pool = &class.const_pool;
    Some(match &attribute.data {
        Attribute::Code(code) => format!(
            "Code(max_stack = {}, max_locals = {}, code_length = {})",
            code.max_stack,
            code.max_locals,
            code.code.len()
        ),
        Attribute::ConstantValue(value) => format!(
            "ConstantValue({})",
            constant_to_string(pool, value.constant_value_index)?
        ),
        Attribute::Exceptions(exceptions) => {
            let names = exceptions
                .exception_index_table
                .iter()
                .map(|&index| pool.get_class_name(index).map(|x| x.into_owned()))
                .collect::<Option<Vec<_>>>()?;
            format!("Exceptions({})", names.join(", "))
        }
        Attribute::Synthetic => "Synthetic".to_owned(),
        Attribute::Deprecated => "Deprecated".to_owned(),
        Attribute::SourceFile(source) => {
            format!("SourceFile({})", pool.get_text(source.source_file_index)?)
        }
        Attribute::InnerClasses(inner) => {
            format!("InnerClasses({} entries)", inner.classes.len())
        }
        Attribute::LineNumberTable(table) => {
            format!("LineNumberTable({} entries)", table.entries.len())
        }
        Attribute::LocalVariableTable(table) => {
            format!("LocalVariableTable({} entries)", table.entries.len())
        }
        Attribute::Unknown { bytes } => format!(
            "Unknown attribute '{}' ({} bytes)",
            pool.get_text(attribute.name_index)?,
            bytes.len()
        ),
    })
}

fn local_variable_to_string(pool: &ConstantPool, entry: &LocalVariableEntry) -> Option<String> {
    let name = pool.get_text(entry.name_index)?;
    let descriptor = DescriptorType::from_text(&pool.get_text(entry.descriptor_index)?).ok()?;
    Some(format!(
        "{} {} (slot {}, pc {}..{})",
        descriptor,
        name,
        entry.index,
        entry.start_pc,
        u32::from(entry.start_pc) + u32::from(entry.length)
    ))
}

fn inner_class_to_string(pool: &ConstantPool, entry: &InnerClassEntry) -> Option<String> {
    let inner = pool.get_class_name(entry.inner_class_info_index)?;
    let outer = if entry.outer_class_info_index.is_zero() {
        None
    } else {
        Some(pool.get_class_name(entry.outer_class_info_index)?)
    };
    let name = if entry.inner_name_index.is_zero() {
        None
    } else {
        Some(pool.get_text(entry.inner_name_index)?)
    };

    Some(match (outer, name) {
        (Some(outer), Some(name)) => format!("{} (member '{}' of {})", inner, name, outer),
        (None, Some(name)) => format!("{} (local '{}')", inner, name),
        (_, None) => format!("{} (anonymous)", inner),
    })
}

#[cfg(test)]
mod tests {
    use rhoverify_base::{
        builder::{code, ClassBuilder},
        code::op::Return,
    };

    use super::*;

    #[test]
    fn members() {
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        builder.add_field(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
            "names",
            "[Ljava/lang/String;",
        );
        builder.add_method(
            MethodAccessFlags::PRIVATE,
            "run",
            "(IJ)Z",
            Some(code(0, 4, vec![0x03, 0xAC])),
        );
        let class = builder.build();

        assert_eq!(
            node_to_string(&class, Node::Field(&class.fields[0])),
            "public static java.lang.String[] names"
        );
        assert_eq!(
            node_to_string(&class, Node::Method(&class.methods[0])),
            "private boolean run(int, long)"
        );
        assert_eq!(
            node_to_string(&class, Node::Attribute(&class.methods[0].attributes[0])),
            "Code(max_stack = 0, max_locals = 4, code_length = 2)"
        );
        assert_eq!(
            node_to_string(&class, Node::Instruction(&Inst::Return(Return {}))),
            "return"
        );
    }

    #[test]
    fn constants_and_placeholders() {
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let method = builder.method_ref("Main", "run", "()V");
        let string = builder.string("hi");
        let class = builder.build();

        assert_eq!(
            node_to_string(&class, Node::Constant(method.into_generic())),
            "Main.run()V"
        );
        assert_eq!(
            node_to_string(&class, Node::Constant(string.into_generic())),
            "\"hi\""
        );
        assert_eq!(
            node_to_string(&class, Node::Constant(ConstantPoolIndexRaw::new(900))),
            "<<Constant>>"
        );

        let entry = ExceptionEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 3,
            catch_type: ConstantPoolIndexRaw::new(0),
        };
        assert_eq!(
            node_to_string(&class, Node::ExceptionEntry(&entry)),
            "[0, 2) -> 3: <Any exception>"
        );
        let entry = ExceptionEntry {
            catch_type: ConstantPoolIndexRaw::new(900),
            ..entry
        };
        assert_eq!(
            node_to_string(&class, Node::ExceptionEntry(&entry)),
            "<<CodeException>>"
        );
    }
}
