//! Pass 1: the class can be found, and its header is sane enough to look inside.

use rhoverify_base::{
    class::{ClassFileIndexError, MAJOR_MIN},
    ClassFile,
};
use tracing::{span, Level};

use crate::{
    error::{class_violation, CheckResult, FatalError},
    outcome::Outcome,
    registry::Registry,
};

use super::{conclude, Pass, PassVerifier};

pub(crate) struct Pass1<'a> {
    pub registry: &'a Registry,
    pub class_name: &'a str,
}
impl<'a> Pass for Pass1<'a> {
    fn do_verify(&self, _state: &PassVerifier) -> Result<Outcome, FatalError> {
        let span = span!(Level::TRACE, "pass1", class = self.class_name);
        let _enter = span.enter();

        let class = match self.registry.find_class(self.class_name) {
            Some(class) => class,
            None => {
                let message = format!("Class '{}' could not be found.", self.class_name);
                tracing::info!("Rejected: {}", message);
                return Ok(Outcome::rejected(message));
            }
        };

        conclude(self.check(&class))
    }
}
impl<'a> Pass1<'a> {
    fn check(&self, class: &ClassFile) -> CheckResult {
        match class.get_this_class_name() {
            Ok(name) => {
                if name != self.class_name {
                    return class_violation(format!(
                        "Wrong name: the class file declares '{}' but was requested as '{}'.",
                        name, self.class_name
                    ));
                }
            }
            Err(ClassFileIndexError::InvalidThisClassIndex) => {
                return class_violation(format!(
                    "this_class index '{}' does not refer to a CONSTANT_Class.",
                    class.this_class
                ))
            }
            Err(_) => {
                return class_violation(format!(
                    "this_class index '{}' refers to a CONSTANT_Class without a valid name.",
                    class.this_class
                ))
            }
        }

        let max = self.registry.config().max_major_version;
        let major = class.version.major;
        if major < MAJOR_MIN || major > max {
            return class_violation(format!(
                "Unsupported class file version {}.{}: the major version must be between {} and {}.",
                major, class.version.minor, MAJOR_MIN, max
            ));
        }

        if !class.super_class.is_zero() && class.const_pool.get_t(class.super_class).is_none() {
            return class_violation(format!(
                "super_class index '{}' does not refer to a CONSTANT_Class.",
                class.super_class
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rhoverify_base::{builder::ClassBuilder, constant_pool::ConstantPoolIndexRaw, MemoryRepository};

    use super::*;

    fn verify(repo: MemoryRepository, name: &str) -> Outcome {
        Registry::new(repo).get(name).do_pass1().unwrap()
    }

    #[test]
    fn header_checks() {
        let mut repo = MemoryRepository::new();
        repo.add(ClassBuilder::new("Good", Some("java/lang/Object")).build())
            .unwrap();
        repo.insert(
            "Misnamed",
            ClassBuilder::new("Other", Some("java/lang/Object")).build(),
        );

        let mut future = ClassBuilder::new("Future", Some("java/lang/Object"));
        future.set_version(99, 0);
        repo.add(future.build()).unwrap();

        let mut bad_super = ClassBuilder::new("BadSuper", None);
        let utf8 = bad_super.utf8("java/lang/Object");
        bad_super.set_super_class(utf8.cast());
        repo.add(bad_super.build()).unwrap();

        let mut bad_this = ClassBuilder::new("BadThis", None);
        bad_this.set_this_class(ConstantPoolIndexRaw::new(40));
        repo.insert("BadThis", bad_this.build());

        assert!(verify(repo.clone(), "Good").is_ok());
        assert!(verify(repo.clone(), "Missing").is_rejected());
        assert!(verify(repo.clone(), "Misnamed")
            .message()
            .starts_with("Wrong name"));
        assert!(verify(repo.clone(), "Future")
            .message()
            .contains("major version"));
        assert!(verify(repo.clone(), "BadSuper")
            .message()
            .contains("super_class"));
        assert!(verify(repo, "BadThis").message().contains("this_class"));
    }
}
