use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::class::{ClassFile, ClassFileIndexError};

/// Resolves class names (in internal `a/b/C` form) to their class models
pub trait ClassRepository {
    /// Returns `None` if there is no class with that name
    fn find_class(&self, name: &str) -> Option<Rc<ClassFile>>;
}

impl<T: ClassRepository + ?Sized> ClassRepository for Rc<T> {
    fn find_class(&self, name: &str) -> Option<Rc<ClassFile>> {
        (**self).find_class(name)
    }
}

/// A repository of classes that are already in memory
#[derive(Default, Clone)]
pub struct MemoryRepository {
    map: IndexMap<String, Rc<ClassFile>>,
}
impl MemoryRepository {
    #[must_use]
    pub fn new() -> MemoryRepository {
        MemoryRepository::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Store the class under an explicit name, which does not have to match its own.
    pub fn insert(&mut self, name: impl Into<String>, class_file: impl Into<Rc<ClassFile>>) {
        let name = name.into();
        if self.map.contains_key(&name) {
            tracing::warn!("Replacing class {} in memory repository", name);
        }
        self.map.insert(name, class_file.into());
    }

    /// Store the class under the name its `this_class` entry gives
    pub fn add(&mut self, class_file: impl Into<Rc<ClassFile>>) -> Result<(), ClassFileIndexError> {
        let class_file = class_file.into();
        let name = class_file.get_this_class_name()?.into_owned();
        self.insert(name, class_file);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<ClassFile>> {
        self.map.shift_remove(name)
    }

    /// Names of the stored classes, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}
impl ClassRepository for MemoryRepository {
    fn find_class(&self, name: &str) -> Option<Rc<ClassFile>> {
        self.map.get(name).cloned()
    }
}
impl fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("classes", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::ClassBuilder;

    use super::*;

    #[test]
    fn stores_by_own_name() {
        let mut repo = MemoryRepository::new();
        repo.add(ClassBuilder::new("a/B", Some("java/lang/Object")).build())
            .unwrap();
        repo.insert("Alias", ClassBuilder::new("a/C", None).build());

        assert_eq!(repo.len(), 2);
        assert!(repo.find_class("a/B").is_some());
        assert!(repo.find_class("a/C").is_none());
        assert_eq!(
            repo.find_class("Alias")
                .unwrap()
                .get_this_class_name()
                .unwrap(),
            "a/C"
        );
        assert_eq!(repo.names().collect::<Vec<_>>(), vec!["a/B", "Alias"]);

        let shared: Rc<dyn ClassRepository> = Rc::new(repo);
        assert!(shared.find_class("a/B").is_some());
    }
}
