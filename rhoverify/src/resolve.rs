//! Member lookup across the class hierarchy.
//! Classes that can not be found are skipped, and every walk stops at a class it has already
//! visited, so malformed hierarchies terminate.

use std::{collections::HashSet, rc::Rc};

use rhoverify_base::{class::FieldAccessFlags, ClassFile};

use crate::registry::Registry;

/// A member of some class, by index into its fields or methods
pub(crate) struct Found {
    pub class: Rc<ClassFile>,
    pub index: usize,
}

/// The superclasses of the class, nearest first, as far as they can be found
pub(crate) fn superclasses(registry: &Registry, class: &ClassFile) -> Vec<Rc<ClassFile>> {
    let mut seen = HashSet::new();
    seen.insert(class.name_or_placeholder().into_owned());

    let mut result: Vec<Rc<ClassFile>> = Vec::new();
    let mut current = class.get_super_class_name().ok().flatten().map(|x| x.into_owned());
    while let Some(name) = current {
        if !seen.insert(name.clone()) {
            break;
        }

        let super_class = match registry.find_class(&name) {
            Some(super_class) => super_class,
            None => break,
        };
        current = super_class
            .get_super_class_name()
            .ok()
            .flatten()
            .map(|x| x.into_owned());
        result.push(super_class);
    }
    result
}

/// Whether `class_name` is `ancestor` or one of its subclasses
pub(crate) fn is_subclass_of(registry: &Registry, class_name: &str, ancestor: &str) -> bool {
    if class_name == ancestor {
        return true;
    }

    match registry.find_class(class_name) {
        Some(class) => superclasses(registry, &class)
            .iter()
            .any(|x| x.get_this_class_name().map_or(false, |name| name == ancestor)),
        None => false,
    }
}

fn declared_field(class: &ClassFile, name: &str, descriptor: &str) -> Option<usize> {
    class.fields.iter().position(|field| {
        field.name(&class.const_pool).as_deref() == Some(name)
            && field.descriptor(&class.const_pool).as_deref() == Some(descriptor)
    })
}

/// Find a field the way field resolution does: the class itself, then its superinterfaces,
/// then its superclass. Private fields of supertypes are not inherited, so the search walks
/// past them.
pub(crate) fn find_field(
    registry: &Registry,
    class: Rc<ClassFile>,
    name: &str,
    descriptor: &str,
) -> Option<Found> {
    fn search(
        registry: &Registry,
        class: Rc<ClassFile>,
        name: &str,
        descriptor: &str,
        inherited: bool,
        seen: &mut HashSet<String>,
    ) -> Option<Found> {
        if !seen.insert(class.name_or_placeholder().into_owned()) {
            return None;
        }

        if let Some(index) = declared_field(&class, name, descriptor) {
            let private = class.fields[index]
                .access_flags
                .contains(FieldAccessFlags::PRIVATE);
            if !(inherited && private) {
                return Some(Found { class, index });
            }
        }

        for interface in class.get_interface_names().unwrap_or_default() {
            if let Some(interface) = registry.find_class(&interface) {
                if let Some(found) = search(registry, interface, name, descriptor, true, seen) {
                    return Some(found);
                }
            }
        }

        let super_class = class.get_super_class_name().ok().flatten()?;
        let super_class = registry.find_class(&super_class)?;
        search(registry, super_class, name, descriptor, true, seen)
    }

    search(registry, class, name, descriptor, false, &mut HashSet::new())
}

/// Find a method: the class itself, then its superclasses, then every interface that those
/// implement, including superinterfaces.
pub(crate) fn find_method(
    registry: &Registry,
    class: Rc<ClassFile>,
    name: &str,
    descriptor: &str,
) -> Option<Found> {
    let mut chain = vec![Rc::clone(&class)];
    chain.extend(superclasses(registry, &class));

    for class in &chain {
        if let Some(index) = class.find_method(name, descriptor) {
            return Some(Found {
                class: Rc::clone(class),
                index,
            });
        }
    }

    let mut seen = HashSet::new();
    let mut pending: Vec<Rc<ClassFile>> = Vec::new();
    for class in chain.iter().rev() {
        for interface in class.get_interface_names().unwrap_or_default().iter().rev() {
            if let Some(interface) = registry.find_class(interface) {
                pending.push(interface);
            }
        }
    }

    // Depth first, in declaration order
    while let Some(interface) = pending.pop() {
        if !seen.insert(interface.name_or_placeholder().into_owned()) {
            continue;
        }

        if let Some(index) = interface.find_method(name, descriptor) {
            return Some(Found {
                class: interface,
                index,
            });
        }

        for super_interface in interface.get_interface_names().unwrap_or_default().iter().rev() {
            if let Some(super_interface) = registry.find_class(super_interface) {
                pending.push(super_interface);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use rhoverify_base::{
        builder::ClassBuilder,
        class::{FieldAccessFlags, MethodAccessFlags},
        MemoryRepository,
    };

    use super::*;

    fn registry() -> Registry {
        let mut repo = MemoryRepository::new();
        repo.add(ClassBuilder::new("java/lang/Object", None).build())
            .unwrap();

        let mut iface = ClassBuilder::new_interface("I");
        iface.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            "run",
            "()V",
            None,
        );
        iface.add_field(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            "K",
            "I",
        );
        repo.add(iface.build()).unwrap();

        let mut parent = ClassBuilder::new("P", Some("java/lang/Object"));
        parent.add_field(FieldAccessFlags::PROTECTED, "x", "J");
        repo.add(parent.build()).unwrap();

        let mut child = ClassBuilder::new("C", Some("P"));
        child.add_interface("I");
        repo.add(child.build()).unwrap();

        // Hides P's field from its subclasses without being visible to them itself
        let mut hider = ClassBuilder::new("H", Some("P"));
        hider.add_field(FieldAccessFlags::PRIVATE, "x", "J");
        repo.add(hider.build()).unwrap();
        repo.add(ClassBuilder::new("G", Some("H")).build()).unwrap();

        // A cycle that never reaches the root
        repo.add(ClassBuilder::new("Loop1", Some("Loop2")).build())
            .unwrap();
        repo.add(ClassBuilder::new("Loop2", Some("Loop1")).build())
            .unwrap();

        Registry::new(repo)
    }

    #[test]
    fn lookups() {
        let registry = registry();
        let child = registry.find_class("C").unwrap();

        let found = find_field(&registry, Rc::clone(&child), "x", "J").unwrap();
        assert_eq!(found.class.get_this_class_name().unwrap(), "P");
        let found = find_field(&registry, Rc::clone(&child), "K", "I").unwrap();
        assert_eq!(found.class.get_this_class_name().unwrap(), "I");
        assert!(find_field(&registry, Rc::clone(&child), "x", "I").is_none());

        let hider = registry.find_class("H").unwrap();
        let found = find_field(&registry, hider, "x", "J").unwrap();
        assert_eq!(found.class.get_this_class_name().unwrap(), "H");
        let below = registry.find_class("G").unwrap();
        let found = find_field(&registry, below, "x", "J").unwrap();
        assert_eq!(found.class.get_this_class_name().unwrap(), "P");

        let found = find_method(&registry, Rc::clone(&child), "run", "()V").unwrap();
        assert_eq!(found.class.get_this_class_name().unwrap(), "I");
        assert!(find_method(&registry, child, "walk", "()V").is_none());

        assert!(is_subclass_of(&registry, "C", "java/lang/Object"));
        assert!(!is_subclass_of(&registry, "P", "C"));
        assert!(!is_subclass_of(&registry, "Loop1", "java/lang/Object"));
        let looped = registry.find_class("Loop1").unwrap();
        assert_eq!(superclasses(&registry, &looped).len(), 1);
    }
}
