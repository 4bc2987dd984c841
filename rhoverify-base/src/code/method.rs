use std::{fmt, num::NonZeroUsize};

use crate::util::MAX_ARRAY_DIMENSIONS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorTypeError {
    /// There was no type where one was expected
    Empty,
    UnknownType(char),
    /// `L` without the terminating `;`
    UnterminatedClassName,
    /// `L;`
    EmptyClassName,
    /// There was more text after a complete type
    TrailingData,
    /// More than [`MAX_ARRAY_DIMENSIONS`]
    TooManyDimensions(usize),
}
impl fmt::Display for DescriptorTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorTypeError::Empty => f.write_str("expected a type"),
            DescriptorTypeError::UnknownType(c) => write!(f, "unknown type character '{}'", c),
            DescriptorTypeError::UnterminatedClassName => {
                f.write_str("class name is not terminated by ';'")
            }
            DescriptorTypeError::EmptyClassName => f.write_str("class name is empty"),
            DescriptorTypeError::TrailingData => f.write_str("unexpected data after type"),
            DescriptorTypeError::TooManyDimensions(n) => write!(
                f,
                "array has {} dimensions, more than the allowed {}",
                n, MAX_ARRAY_DIMENSIONS
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodDescriptorError {
    MissingOpeningParen,
    MissingClosingParen,
    /// `V` used as a parameter
    VoidParameter,
    Parameter(DescriptorTypeError),
    ReturnType(DescriptorTypeError),
}
impl fmt::Display for MethodDescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodDescriptorError::MissingOpeningParen => f.write_str("missing '('"),
            MethodDescriptorError::MissingClosingParen => f.write_str("missing ')'"),
            MethodDescriptorError::VoidParameter => f.write_str("void is not a parameter type"),
            MethodDescriptorError::Parameter(err) => write!(f, "bad parameter type: {}", err),
            MethodDescriptorError::ReturnType(err) => write!(f, "bad return type: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorTypeBasic {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    /// The internal (slash separated) name of the class
    Class(String),
    Short,
    Boolean,
}
impl DescriptorTypeBasic {
    /// The source-level name of primitive types
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        Some(match self {
            DescriptorTypeBasic::Byte => "byte",
            DescriptorTypeBasic::Char => "char",
            DescriptorTypeBasic::Double => "double",
            DescriptorTypeBasic::Float => "float",
            DescriptorTypeBasic::Int => "int",
            DescriptorTypeBasic::Long => "long",
            DescriptorTypeBasic::Class(_) => return None,
            DescriptorTypeBasic::Short => "short",
            DescriptorTypeBasic::Boolean => "boolean",
        })
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            DescriptorTypeBasic::Byte => out.push('B'),
            DescriptorTypeBasic::Char => out.push('C'),
            DescriptorTypeBasic::Double => out.push('D'),
            DescriptorTypeBasic::Float => out.push('F'),
            DescriptorTypeBasic::Int => out.push('I'),
            DescriptorTypeBasic::Long => out.push('J'),
            DescriptorTypeBasic::Class(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            DescriptorTypeBasic::Short => out.push('S'),
            DescriptorTypeBasic::Boolean => out.push('Z'),
        }
    }

    /// Parse a single non-array type from the start of the text, returning the rest
    fn parse_prefix(text: &str) -> Result<(DescriptorTypeBasic, &str), DescriptorTypeError> {
        let mut chars = text.chars();
        let first = chars.next().ok_or(DescriptorTypeError::Empty)?;
        let rest = chars.as_str();
        let basic = match first {
            'B' => DescriptorTypeBasic::Byte,
            'C' => DescriptorTypeBasic::Char,
            'D' => DescriptorTypeBasic::Double,
            'F' => DescriptorTypeBasic::Float,
            'I' => DescriptorTypeBasic::Int,
            'J' => DescriptorTypeBasic::Long,
            'S' => DescriptorTypeBasic::Short,
            'Z' => DescriptorTypeBasic::Boolean,
            'L' => {
                let end = rest
                    .find(';')
                    .ok_or(DescriptorTypeError::UnterminatedClassName)?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(DescriptorTypeError::EmptyClassName);
                }
                return Ok((DescriptorTypeBasic::Class(name.to_owned()), &rest[end + 1..]));
            }
            c => return Err(DescriptorTypeError::UnknownType(c)),
        };
        Ok((basic, rest))
    }
}
impl fmt::Display for DescriptorTypeBasic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorTypeBasic::Class(name) => f.write_str(&name.replace('/', ".")),
            // Only class lacks a name
            _ => f.write_str(self.name().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Basic(DescriptorTypeBasic),
    Array {
        level: NonZeroUsize,
        component: DescriptorTypeBasic,
    },
}
impl DescriptorType {
    #[must_use]
    /// Helper to construct a single level array of the type.
    /// type[]
    pub fn single_array(component: DescriptorTypeBasic) -> Self {
        Self::Array {
            level: NonZeroUsize::MIN,
            component,
        }
    }

    /// Parse a complete field descriptor
    pub fn from_text(text: &str) -> Result<DescriptorType, DescriptorTypeError> {
        let (desc, rest) = DescriptorType::parse_prefix(text)?;
        if rest.is_empty() {
            Ok(desc)
        } else {
            Err(DescriptorTypeError::TrailingData)
        }
    }

    fn parse_prefix(text: &str) -> Result<(DescriptorType, &str), DescriptorTypeError> {
        let level = text.bytes().take_while(|x| *x == b'[').count();
        if level > MAX_ARRAY_DIMENSIONS {
            return Err(DescriptorTypeError::TooManyDimensions(level));
        }

        let (component, rest) = DescriptorTypeBasic::parse_prefix(&text[level..])?;
        let desc = match NonZeroUsize::new(level) {
            Some(level) => DescriptorType::Array { level, component },
            None => DescriptorType::Basic(component),
        };
        Ok((desc, rest))
    }

    /// The number of local variable slots, or stack slots, that this type occupies
    #[must_use]
    pub fn size(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// Whether this is a `long` or a `double`
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            DescriptorType::Basic(DescriptorTypeBasic::Long | DescriptorTypeBasic::Double)
        )
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, DescriptorType::Array { .. })
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            DescriptorType::Array { .. } | DescriptorType::Basic(DescriptorTypeBasic::Class(_))
        )
    }

    /// The class named by an object type, or by the element type of an array of objects
    #[must_use]
    pub fn object_class_name(&self) -> Option<&str> {
        match self {
            DescriptorType::Basic(DescriptorTypeBasic::Class(name))
            | DescriptorType::Array {
                component: DescriptorTypeBasic::Class(name),
                ..
            } => Some(name.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        match self {
            DescriptorType::Basic(_) => 0,
            DescriptorType::Array { level, .. } => level.get(),
        }
    }

    /// The descriptor text for this type
    #[must_use]
    pub fn to_descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            DescriptorType::Basic(basic) => basic.write_descriptor(out),
            DescriptorType::Array { level, component } => {
                for _ in 0..level.get() {
                    out.push('[');
                }
                component.write_descriptor(out);
            }
        }
    }
}
impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorType::Basic(basic) => write!(f, "{}", basic),
            DescriptorType::Array { level, component } => {
                write!(f, "{}", component)?;
                for _ in 0..level.get() {
                    f.write_str("[]")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    parameters: Vec<DescriptorType>,
    /// None represents void
    return_type: Option<DescriptorType>,
}
impl MethodDescriptor {
    #[must_use]
    /// Construct a method descriptor that takes in the given parameters and potentially returns
    /// some type
    pub fn new(parameters: Vec<DescriptorType>, return_type: Option<DescriptorType>) -> Self {
        Self {
            parameters,
            return_type,
        }
    }

    #[must_use]
    /// Construct a [`MethodDescriptor`] that returns void
    pub fn new_void(parameters: Vec<DescriptorType>) -> Self {
        Self::new(parameters, None)
    }

    #[must_use]
    pub fn parameters(&self) -> &[DescriptorType] {
        self.parameters.as_slice()
    }

    #[must_use]
    pub fn return_type(&self) -> Option<&DescriptorType> {
        self.return_type.as_ref()
    }

    /// The number of slots the parameters occupy, not counting `this`
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(DescriptorType::size).sum()
    }

    pub fn from_text(desc: &str) -> Result<Self, MethodDescriptorError> {
        let mut rest = desc
            .strip_prefix('(')
            .ok_or(MethodDescriptorError::MissingOpeningParen)?;

        let mut parameters = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }

            if rest.is_empty() {
                return Err(MethodDescriptorError::MissingClosingParen);
            }

            if rest.starts_with('V') {
                return Err(MethodDescriptorError::VoidParameter);
            }

            let (param, after) =
                DescriptorType::parse_prefix(rest).map_err(MethodDescriptorError::Parameter)?;
            parameters.push(param);
            rest = after;
        }

        let return_type = if rest == "V" {
            None
        } else {
            Some(DescriptorType::from_text(rest).map_err(MethodDescriptorError::ReturnType)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// The descriptor text for this method
    #[must_use]
    pub fn to_descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.parameters {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        match &self.return_type {
            Some(ret) => ret.write_descriptor(&mut out),
            None => out.push('V'),
        }
        out
    }
}
impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.return_type {
            Some(ret) => write!(f, "{}", ret)?,
            None => f.write_str("void")?,
        }
        f.write_str(" (")?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_descriptors() {
        assert_eq!(
            DescriptorType::from_text("I"),
            Ok(DescriptorType::Basic(DescriptorTypeBasic::Int))
        );
        let strings = DescriptorType::from_text("[[Ljava/lang/String;").unwrap();
        assert_eq!(strings.dimensions(), 2);
        assert_eq!(strings.object_class_name(), Some("java/lang/String"));
        assert_eq!(strings.to_string(), "java.lang.String[][]");
        assert_eq!(strings.to_descriptor(), "[[Ljava/lang/String;");

        assert!(DescriptorType::from_text("J").unwrap().is_wide());
        assert!(!DescriptorType::from_text("[J").unwrap().is_wide());

        assert_eq!(
            DescriptorType::from_text("Ljava/lang/Object"),
            Err(DescriptorTypeError::UnterminatedClassName)
        );
        assert_eq!(
            DescriptorType::from_text("II"),
            Err(DescriptorTypeError::TrailingData)
        );
        assert_eq!(
            DescriptorType::from_text("V"),
            Err(DescriptorTypeError::UnknownType('V'))
        );
        assert_eq!(DescriptorType::from_text(""), Err(DescriptorTypeError::Empty));

        let deep = format!("{}I", "[".repeat(256));
        assert_eq!(
            DescriptorType::from_text(&deep),
            Err(DescriptorTypeError::TooManyDimensions(256))
        );
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::from_text("(IJ[Ljava/lang/Object;)V").unwrap();
        assert_eq!(desc.parameters().len(), 3);
        assert_eq!(desc.parameter_slots(), 4);
        assert_eq!(desc.return_type(), None);
        assert_eq!(desc.to_descriptor(), "(IJ[Ljava/lang/Object;)V");
        assert_eq!(desc.to_string(), "void (int, long, java.lang.Object[])");

        let desc = MethodDescriptor::from_text("()D").unwrap();
        assert!(desc.return_type().unwrap().is_wide());

        assert_eq!(
            MethodDescriptor::from_text("I)V"),
            Err(MethodDescriptorError::MissingOpeningParen)
        );
        assert_eq!(
            MethodDescriptor::from_text("(I"),
            Err(MethodDescriptorError::MissingClosingParen)
        );
        assert_eq!(
            MethodDescriptor::from_text("(V)V"),
            Err(MethodDescriptorError::VoidParameter)
        );
        assert!(matches!(
            MethodDescriptor::from_text("()"),
            Err(MethodDescriptorError::ReturnType(_))
        ));
        assert!(matches!(
            MethodDescriptor::from_text("()VV"),
            Err(MethodDescriptorError::ReturnType(_))
        ));
    }
}
