use crate::code::method::DescriptorType;

/// Name of instance initialization methods
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of the class initialization method
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";
/// The code array must be strictly smaller than this
pub const MAX_CODE_SIZE: usize = 65536;
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

pub trait MemorySize {
    fn memory_size(&self) -> usize;
}
pub trait StaticMemorySize {
    const MEMORY_SIZE: usize;
}
impl<T: StaticMemorySize> MemorySize for T {
    fn memory_size(&self) -> usize {
        T::MEMORY_SIZE
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '$' || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '$' || c == '_'
}

/// Whether the name is a legal identifier in the Java language
#[must_use]
pub fn valid_java_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_part),
        _ => false,
    }
}

/// Whether the name is a legal method name in the Java language.
/// This excludes the special initialization names.
#[must_use]
pub fn valid_java_lang_method_name(name: &str) -> bool {
    valid_java_identifier(name)
}

/// Whether the name may be declared as a method.
/// `<clinit>` is only accepted if `allow_static_init` is set.
#[must_use]
pub fn valid_method_name(name: &str, allow_static_init: bool) -> bool {
    if valid_java_lang_method_name(name) {
        return true;
    }

    if allow_static_init {
        name == CONSTRUCTOR_NAME || name == STATIC_INITIALIZER_NAME
    } else {
        name == CONSTRUCTOR_NAME
    }
}

/// Whether the name may be referred to by a method reference into a class
#[must_use]
pub fn valid_class_method_name(name: &str) -> bool {
    valid_method_name(name, false)
}

/// Whether the name may be referred to by a method reference into an interface.
/// Interfaces have no instance initializers to refer to.
#[must_use]
pub fn valid_interface_method_name(name: &str) -> bool {
    if name.starts_with('<') {
        return false;
    }
    valid_java_lang_method_name(name)
}

#[must_use]
pub fn valid_field_name(name: &str) -> bool {
    valid_java_identifier(name)
}

/// Whether the name is usable as a class name in the internal form, either slash separated
/// (`java/lang/Object`) or an array descriptor (`[Ljava/lang/Object;`)
#[must_use]
pub fn valid_class_name(name: &str) -> bool {
    if name.starts_with('[') {
        return DescriptorType::from_text(name).is_ok();
    }

    !name.is_empty()
        && access_path_iter(name)
            .all(|part| !part.is_empty() && !part.contains(['.', ';', '[']))
}

/// Note: This will work fine for path to a class as well
#[must_use]
pub fn access_path_iter(package: &str) -> impl DoubleEndedIterator<Item = &str> + Clone {
    package.split('/')
}

/// The number of array dimensions of a class name like `[[I`
#[must_use]
pub fn array_dimensions(class_name: &str) -> usize {
    class_name.bytes().take_while(|x| *x == b'[').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(valid_java_identifier("hello"));
        assert!(valid_java_identifier("$proxy_1"));
        assert!(valid_java_identifier("_"));
        assert!(valid_java_identifier("größe"));
        assert!(!valid_java_identifier(""));
        assert!(!valid_java_identifier("1abc"));
        assert!(!valid_java_identifier("a-b"));
        assert!(!valid_java_identifier("<init>"));
    }

    #[test]
    fn method_names() {
        assert!(valid_method_name("<init>", false));
        assert!(!valid_method_name("<clinit>", false));
        assert!(valid_method_name("<clinit>", true));
        assert!(!valid_method_name("<other>", true));

        assert!(valid_class_method_name("<init>"));
        assert!(valid_class_method_name("run"));
        assert!(!valid_class_method_name("<clinit>"));

        assert!(!valid_interface_method_name("<init>"));
        assert!(!valid_interface_method_name("<clinit>"));
        assert!(valid_interface_method_name("run"));
    }

    #[test]
    fn class_names() {
        assert!(valid_class_name("java/lang/Object"));
        assert!(valid_class_name("Main"));
        assert!(valid_class_name("[I"));
        assert!(valid_class_name("[[Ljava/lang/String;"));
        assert!(!valid_class_name("java.lang.Object"));
        assert!(!valid_class_name("java//Object"));
        assert!(!valid_class_name("[Q"));
        assert!(!valid_class_name(""));

        assert_eq!(array_dimensions("[[I"), 2);
        assert_eq!(array_dimensions("java/lang/Object"), 0);
    }
}
