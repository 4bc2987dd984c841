use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;
use rhoverify_base::{ClassFile, ClassRepository};

use crate::{
    error::FatalError,
    local_vars::LocalVariablesInfo,
    outcome::Outcome,
    pass::data_flow::DataFlowVerifier,
    verifier::Verifier,
    VerifierConfig,
};

/// Notified once for every class name the first time it is registered.
pub trait RegistryObserver {
    /// The registry is in a consistent state when this is called, and may be used freely,
    /// including requesting more verifiers.
    fn on_registered(&self, registry: &Registry, class_name: &str);
}

struct RegistryInner {
    repository: Rc<dyn ClassRepository>,
    config: VerifierConfig,
    data_flow: RefCell<Option<Rc<dyn DataFlowVerifier>>>,
    verifiers: RefCell<IndexMap<String, Rc<Verifier>>>,
    observers: RefCell<Vec<Rc<dyn RegistryObserver>>>,
    /// Registered names whose observers have not been notified yet
    pending: RefCell<VecDeque<String>>,
    dispatching: Cell<bool>,
    /// Number of pass requests currently running
    depth: Cell<usize>,
}

/// The one place that verifiers are created, so that there is a single verifier per class name.
/// Cloning gives another handle to the same registry.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}
impl Registry {
    pub fn new(repository: impl ClassRepository + 'static) -> Registry {
        Registry::with_config(repository, VerifierConfig::default())
    }

    pub fn with_config(repository: impl ClassRepository + 'static, config: VerifierConfig) -> Registry {
        Registry {
            inner: Rc::new(RegistryInner {
                repository: Rc::new(repository),
                config,
                data_flow: RefCell::new(None),
                verifiers: RefCell::new(IndexMap::new()),
                observers: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                depth: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.inner.config
    }

    /// Set the verifier that Pass 3b delegates to.
    /// Cached Pass 3b outcomes are not affected.
    pub fn set_data_flow_verifier(&self, data_flow: Option<Rc<dyn DataFlowVerifier>>) {
        *self.inner.data_flow.borrow_mut() = data_flow;
    }

    #[must_use]
    pub fn data_flow_verifier(&self) -> Option<Rc<dyn DataFlowVerifier>> {
        self.inner.data_flow.borrow().clone()
    }

    /// Look up a class in the repository
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<Rc<ClassFile>> {
        self.inner.repository.find_class(name)
    }

    /// Get the verifier for the class, creating it if this is the first request for it.
    pub fn get(&self, class_name: &str) -> VerifierHandle {
        let (verifier, created) = {
            let mut verifiers = self.inner.verifiers.borrow_mut();
            if let Some(verifier) = verifiers.get(class_name) {
                (Rc::clone(verifier), false)
            } else {
                let verifier = Rc::new(Verifier::new(class_name));
                verifiers.insert(class_name.to_owned(), Rc::clone(&verifier));
                (verifier, true)
            }
        };

        if created {
            if self.inner.config.log_registration {
                tracing::info!("Registered verifier for {}", class_name);
            } else {
                tracing::trace!("Registered verifier for {}", class_name);
            }

            self.inner
                .pending
                .borrow_mut()
                .push_back(class_name.to_owned());
            self.dispatch();
        }

        VerifierHandle {
            registry: self.clone(),
            verifier,
        }
    }

    /// Notify observers of every pending name.
    /// If this is called from inside an observer, the outer call handles the new names.
    fn dispatch(&self) {
        if self.inner.dispatching.replace(true) {
            return;
        }

        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let name = match next {
                Some(name) => name,
                None => break,
            };

            // Observers may attach or detach others while being notified
            let observers = self.inner.observers.borrow().clone();
            for observer in observers {
                observer.on_registered(self, &name);
            }
        }

        self.inner.dispatching.set(false);
    }

    pub fn attach(&self, observer: Rc<dyn RegistryObserver>) {
        self.inner.observers.borrow_mut().push(observer);
    }

    /// Returns whether the observer was attached
    pub fn detach(&self, observer: &Rc<dyn RegistryObserver>) -> bool {
        let mut observers = self.inner.observers.borrow_mut();
        let len = observers.len();
        observers.retain(|x| !Rc::ptr_eq(x, observer));
        observers.len() != len
    }

    /// Drop every verifier and observer
    pub fn clear(&self) {
        self.inner.verifiers.borrow_mut().clear();
        self.inner.observers.borrow_mut().clear();
        self.inner.pending.borrow_mut().clear();
    }

    /// Names of the classes that have verifiers, in registration order
    #[must_use]
    pub fn verifiers(&self) -> Vec<String> {
        self.inner.verifiers.borrow().keys().cloned().collect()
    }

    /// Account for one more nested pass request for the class
    pub(crate) fn enter(&self, class_name: &str) -> Result<DepthGuard<'_>, FatalError> {
        let depth = self.inner.depth.get();
        let limit = self.inner.config.max_depth;
        if depth >= limit {
            tracing::error!(
                "Recursion limit of {} reached while verifying {}",
                limit,
                class_name
            );
            return Err(FatalError::RecursionLimit {
                class_name: class_name.to_owned(),
                limit,
            });
        }

        self.inner.depth.set(depth + 1);
        Ok(DepthGuard {
            depth: &self.inner.depth,
        })
    }
}
impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("repository", &"(unprintable)")
            .field("config", &self.inner.config)
            .field("verifiers", &self.verifiers())
            .field("observers", &self.inner.observers.borrow().len())
            .finish()
    }
}

pub(crate) struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}
impl<'a> Drop for DepthGuard<'a> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// A verifier together with the registry that it resolves classes through
#[derive(Clone)]
pub struct VerifierHandle {
    registry: Registry,
    verifier: Rc<Verifier>,
}
impl VerifierHandle {
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.verifier.class_name()
    }

    #[must_use]
    pub fn verifier(&self) -> &Rc<Verifier> {
        &self.verifier
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether both handles refer to the same verifier instance
    #[must_use]
    pub fn same_verifier(&self, other: &VerifierHandle) -> bool {
        Rc::ptr_eq(&self.verifier, &other.verifier)
    }

    pub fn do_pass1(&self) -> Result<Outcome, FatalError> {
        self.verifier.do_pass1(&self.registry)
    }

    pub fn do_pass2(&self) -> Result<Outcome, FatalError> {
        self.verifier.do_pass2(&self.registry)
    }

    pub fn do_pass3a(&self, method_index: usize) -> Result<Outcome, FatalError> {
        self.verifier.do_pass3a(&self.registry, method_index)
    }

    pub fn do_pass3b(&self, method_index: usize) -> Result<Outcome, FatalError> {
        self.verifier.do_pass3b(&self.registry, method_index)
    }

    pub fn flush(&self) {
        self.verifier.flush();
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.verifier.messages(&self.registry)
    }

    pub fn local_variables_info(
        &self,
        method_index: usize,
    ) -> Result<Option<Rc<LocalVariablesInfo>>, FatalError> {
        self.verifier
            .local_variables_info(&self.registry, method_index)
    }
}
impl fmt::Debug for VerifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierHandle")
            .field("class_name", &self.class_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rhoverify_base::MemoryRepository;

    use super::*;

    struct Recorder {
        seen: RefCell<Vec<String>>,
    }
    impl RegistryObserver for Recorder {
        fn on_registered(&self, registry: &Registry, class_name: &str) {
            self.seen.borrow_mut().push(class_name.to_owned());
            // Registering from inside a notification must not recurse into observers
            if class_name == "A" {
                registry.get("B");
                registry.get("A");
            }
        }
    }

    #[test]
    fn observers_fire_once_per_name() {
        let registry = Registry::new(MemoryRepository::new());
        let recorder = Rc::new(Recorder {
            seen: RefCell::new(Vec::new()),
        });
        let observer: Rc<dyn RegistryObserver> = recorder.clone();
        registry.attach(Rc::clone(&observer));

        let a = registry.get("A");
        assert!(a.same_verifier(&registry.get("A")));
        registry.get("B");
        assert_eq!(*recorder.seen.borrow(), vec!["A".to_owned(), "B".to_owned()]);
        assert_eq!(registry.verifiers(), vec!["A".to_owned(), "B".to_owned()]);

        assert!(registry.detach(&observer));
        assert!(!registry.detach(&observer));
        registry.get("C");
        assert_eq!(recorder.seen.borrow().len(), 2);

        registry.clear();
        assert!(registry.verifiers().is_empty());
        assert!(!a.same_verifier(&registry.get("A")));
    }

    #[test]
    fn depth_guard() {
        let registry = Registry::with_config(
            MemoryRepository::new(),
            VerifierConfig {
                max_depth: 1,
                ..VerifierConfig::default()
            },
        );
        {
            let _guard = registry.enter("A").unwrap();
            assert!(matches!(
                registry.enter("B"),
                Err(FatalError::RecursionLimit { limit: 1, .. })
            ));
        }
        assert!(registry.enter("A").is_ok());
    }
}
