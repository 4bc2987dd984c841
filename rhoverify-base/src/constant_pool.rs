//! The constant pool of a class file and typed indices into it.
//!
//! Entries cross-reference each other by index. Nothing here assumes that an index is valid:
//! every lookup goes through [`ConstantPool::get_t`], which only succeeds when the index is in
//! range and the entry at it has exactly the expected kind.

use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

/// An index into the constant pool which is expected to point at an entry of kind `T`.
/// Note that it is _not_ assured to actually point at a `T`, that is only known after a lookup.
pub struct ConstantPoolIndexRaw<T>(u16, PhantomData<fn() -> T>);
impl<T> ConstantPoolIndexRaw<T> {
    #[must_use]
    pub const fn new(i: u16) -> Self {
        Self(i, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }

    /// Zero is used by the format to mean 'no entry' in some positions (such as the super class)
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn into_generic(self) -> ConstantPoolIndexRaw<ConstantInfo> {
        ConstantPoolIndexRaw::new(self.0)
    }

    #[must_use]
    pub fn cast<U>(self) -> ConstantPoolIndexRaw<U> {
        ConstantPoolIndexRaw::new(self.0)
    }
}
impl<T> Clone for ConstantPoolIndexRaw<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ConstantPoolIndexRaw<T> {}
impl<T> PartialEq for ConstantPoolIndexRaw<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for ConstantPoolIndexRaw<T> {}
impl<T> Hash for ConstantPoolIndexRaw<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u16(self.0);
    }
}
impl<T> fmt::Debug for ConstantPoolIndexRaw<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
impl<T> fmt::Display for ConstantPoolIndexRaw<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Utf8Constant {
    /// The bytes, in Java's modified utf8
    pub bytes: Vec<u8>,
}
impl Utf8Constant {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            bytes: cesu8::to_java_cesu8(text).into_owned(),
        }
    }

    /// Decode the modified utf8. `None` if the bytes are not valid modified utf8.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        cesu8::from_java_cesu8(&self.bytes).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassConstant {
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringConstant {
    pub string_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRefConstant {
    pub class_index: ConstantPoolIndexRaw<ClassConstant>,
    pub name_and_type_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRefConstant {
    pub class_index: ConstantPoolIndexRaw<ClassConstant>,
    pub name_and_type_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceMethodRefConstant {
    pub class_index: ConstantPoolIndexRaw<ClassConstant>,
    pub name_and_type_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameAndTypeConstant {
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
    pub descriptor_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandleConstant {
    /// 1..=9, see [`MethodHandleKind`]
    pub reference_kind: u8,
    pub reference_index: ConstantPoolIndexRaw<ConstantInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodTypeConstant {
    pub descriptor_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: ConstantPoolIndexRaw<NameAndTypeConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleConstant {
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageConstant {
    pub name_index: ConstantPoolIndexRaw<Utf8Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}
impl MethodHandleKind {
    #[must_use]
    pub fn from_u8(kind: u8) -> Option<MethodHandleKind> {
        Some(match kind {
            1 => Self::GetField,
            2 => Self::GetStatic,
            3 => Self::PutField,
            4 => Self::PutStatic,
            5 => Self::InvokeVirtual,
            6 => Self::InvokeStatic,
            7 => Self::InvokeSpecial,
            8 => Self::NewInvokeSpecial,
            9 => Self::InvokeInterface,
            _ => return None,
        })
    }
}

macro_rules! define_constant_info {
    ($($variant:ident ($ty:ident) = $tag:expr, $kind_name:expr;)*) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum ConstantInfo {
            $(
                $variant($ty),
            )*
            /// Index zero, and the slot directly after a `Long` or `Double`
            Unusable,
        }
        impl ConstantInfo {
            #[must_use]
            pub fn tag(&self) -> Option<u8> {
                match self {
                    $(
                        Self::$variant(_) => Some($tag),
                    )*
                    Self::Unusable => None,
                }
            }

            /// The name of the kind of entry, as the format names it
            #[must_use]
            pub fn kind_name(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => $kind_name,
                    )*
                    Self::Unusable => "(unusable)",
                }
            }
        }
        $(
            impl<'a> TryFrom<&'a ConstantInfo> for &'a $ty {
                type Error = ();

                fn try_from(info: &'a ConstantInfo) -> Result<&'a $ty, ()> {
                    match info {
                        ConstantInfo::$variant(v) => Ok(v),
                        _ => Err(()),
                    }
                }
            }
            impl From<$ty> for ConstantInfo {
                fn from(v: $ty) -> ConstantInfo {
                    ConstantInfo::$variant(v)
                }
            }
            impl KindName for $ty {
                const KIND_NAME: &'static str = $kind_name;
            }
        )*
    };
}

/// The format name of the kind of constant a typed index expects
pub trait KindName {
    const KIND_NAME: &'static str;
}
impl KindName for ConstantInfo {
    const KIND_NAME: &'static str = "(any constant)";
}

define_constant_info! {
    Utf8(Utf8Constant) = 1, "CONSTANT_Utf8";
    Integer(IntegerConstant) = 3, "CONSTANT_Integer";
    Float(FloatConstant) = 4, "CONSTANT_Float";
    Long(LongConstant) = 5, "CONSTANT_Long";
    Double(DoubleConstant) = 6, "CONSTANT_Double";
    Class(ClassConstant) = 7, "CONSTANT_Class";
    String(StringConstant) = 8, "CONSTANT_String";
    FieldRef(FieldRefConstant) = 9, "CONSTANT_Fieldref";
    MethodRef(MethodRefConstant) = 10, "CONSTANT_Methodref";
    InterfaceMethodRef(InterfaceMethodRefConstant) = 11, "CONSTANT_InterfaceMethodref";
    NameAndType(NameAndTypeConstant) = 12, "CONSTANT_NameAndType";
    MethodHandle(MethodHandleConstant) = 15, "CONSTANT_MethodHandle";
    MethodType(MethodTypeConstant) = 16, "CONSTANT_MethodType";
    Dynamic(DynamicConstant) = 17, "CONSTANT_Dynamic";
    InvokeDynamic(InvokeDynamicConstant) = 18, "CONSTANT_InvokeDynamic";
    Module(ModuleConstant) = 19, "CONSTANT_Module";
    Package(PackageConstant) = 20, "CONSTANT_Package";
}

impl ConstantInfo {
    /// Long and Double take up two slots in the pool
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    /// Index zero is always [`ConstantInfo::Unusable`]
    entries: Vec<ConstantInfo>,
}
impl ConstantPool {
    #[must_use]
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![ConstantInfo::Unusable],
        }
    }

    /// Construct from the raw entry list as read by a parser.
    /// The list must include the unusable zero entry and the unusable entries after wide
    /// constants, so that positions line up with indices.
    #[must_use]
    pub fn from_entries(entries: Vec<ConstantInfo>) -> ConstantPool {
        ConstantPool { entries }
    }

    /// Append an entry, returning its index.
    /// Wide entries are followed by an unusable slot.
    pub fn push(&mut self, info: impl Into<ConstantInfo>) -> ConstantPoolIndexRaw<ConstantInfo> {
        let info = info.into();
        let index = ConstantPoolIndexRaw::new(
            self.entries
                .len()
                .try_into()
                .expect("constant pool should not exceed u16::MAX entries"),
        );
        let is_wide = info.is_wide();
        self.entries.push(info);
        if is_wide {
            self.entries.push(ConstantInfo::Unusable);
        }
        index
    }

    /// The `constant_pool_count`: one more than the largest valid index
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Whether the index is within `1..len`. This says nothing about what is at the index.
    #[must_use]
    pub fn in_range<T>(&self, i: ConstantPoolIndexRaw<T>) -> bool {
        i.0 != 0 && usize::from(i.0) < self.entries.len()
    }

    /// Get the entry at the index, if it is in range.
    /// Note: this will return [`ConstantInfo::Unusable`] for the slot after a wide entry.
    #[must_use]
    pub fn get<T>(&self, i: ConstantPoolIndexRaw<T>) -> Option<&ConstantInfo> {
        if i.0 == 0 {
            return None;
        }
        self.entries.get(usize::from(i.0))
    }

    /// Get the entry at the index only if it has exactly the kind expected by the index.
    #[must_use]
    pub fn get_t<'a, T>(&'a self, i: ConstantPoolIndexRaw<T>) -> Option<&'a T>
    where
        &'a T: TryFrom<&'a ConstantInfo>,
    {
        self.get(i).and_then(|x| <&T>::try_from(x).ok())
    }

    #[must_use]
    pub fn get_text(&self, i: ConstantPoolIndexRaw<Utf8Constant>) -> Option<Cow<'_, str>> {
        self.get_t(i).and_then(Utf8Constant::as_text)
    }

    #[must_use]
    pub fn get_class_name(&self, i: ConstantPoolIndexRaw<ClassConstant>) -> Option<Cow<'_, str>> {
        let class = self.get_t(i)?;
        self.get_text(class.name_index)
    }

    /// Get the (name, descriptor) pair of a name and type entry
    #[must_use]
    pub fn get_name_and_type(
        &self,
        i: ConstantPoolIndexRaw<NameAndTypeConstant>,
    ) -> Option<(Cow<'_, str>, Cow<'_, str>)> {
        let nat = self.get_t(i)?;
        Some((
            self.get_text(nat.name_index)?,
            self.get_text(nat.descriptor_index)?,
        ))
    }

    /// Iterate over every usable entry with its index
    pub fn iter(&self) -> impl Iterator<Item = (ConstantPoolIndexRaw<ConstantInfo>, &ConstantInfo)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, x)| !matches!(x, ConstantInfo::Unusable))
            .map(|(i, x)| {
                // Construction through `push` and `from_entries` keeps this within u16
                #[allow(clippy::cast_possible_truncation)]
                let i = i as u16;
                (ConstantPoolIndexRaw::new(i), x)
            })
    }
}
impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup_requires_exact_kind() {
        let mut pool = ConstantPool::new();
        let name = pool.push(Utf8Constant::from_text("java/lang/Object"));
        let class = pool.push(ClassConstant {
            name_index: name.cast(),
        });

        assert!(pool.get_t::<ClassConstant>(class.cast()).is_some());
        assert!(pool.get_t::<Utf8Constant>(class.cast()).is_none());
        assert!(pool.get_t::<ClassConstant>(ConstantPoolIndexRaw::new(0)).is_none());
        assert!(pool.get_t::<ClassConstant>(ConstantPoolIndexRaw::new(40)).is_none());
        assert_eq!(
            pool.get_class_name(class.cast()).as_deref(),
            Some("java/lang/Object")
        );
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.push(LongConstant { value: 5 });
        let after = pool.push(IntegerConstant { value: 1 });
        assert_eq!(long.get(), 1);
        assert_eq!(after.get(), 3);
        assert_eq!(
            pool.get(ConstantPoolIndexRaw::<ConstantInfo>::new(2)),
            Some(&ConstantInfo::Unusable)
        );
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn modified_utf8_nul() {
        // Modified utf8 encodes NUL as two bytes
        let c = Utf8Constant::from_text("a\0b");
        assert_eq!(c.bytes, vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(c.as_text().as_deref(), Some("a\0b"));

        let bad = Utf8Constant { bytes: vec![0xFF] };
        assert!(bad.as_text().is_none());
    }
}
