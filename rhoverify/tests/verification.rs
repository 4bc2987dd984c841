use std::{cell::RefCell, rc::Rc};

use rhoverify::{
    pass::data_flow::NO_DATA_FLOW_VERIFIER, DataFlowContext, DataFlowVerifier, FatalError,
    Outcome, Registry, RegistryObserver, Status, VerifierConfig,
};
use rhoverify_base::{
    builder::{code, ClassBuilder},
    class::MethodAccessFlags,
    MemoryRepository,
};

const ICONST_0: u8 = 0x03;
const ISTORE_0: u8 = 0x3B;
const POP: u8 = 0x57;
const RETURN: u8 = 0xB1;

fn init_logging() {
    // Only the first test to get here installs the subscriber
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn base_repo() -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    repo.add(ClassBuilder::new("java/lang/Object", None).build())
        .unwrap();
    repo.add(ClassBuilder::new("java/lang/Throwable", Some("java/lang/Object")).build())
        .unwrap();
    repo
}

fn static_method(builder: &mut ClassBuilder, name: &str, max_locals: u16, body: Vec<u8>) {
    builder.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name,
        "()V",
        Some(code(1, max_locals, body)),
    );
}

#[test]
fn passes_are_cached_and_ordered() {
    init_logging();
    let mut repo = base_repo();
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    static_method(&mut main, "run", 1, vec![ICONST_0, ISTORE_0, RETURN]);
    // Falls off the end of the code
    static_method(&mut main, "broken", 1, vec![ICONST_0, POP]);
    repo.add(main.build()).unwrap();

    let registry = Registry::new(repo);
    let handle = registry.get("Main");

    let first = handle.do_pass2().unwrap();
    assert!(first.is_ok());
    assert_eq!(handle.do_pass2().unwrap(), first);
    assert!(handle.do_pass1().unwrap().is_ok());

    assert!(handle.do_pass3a(0).unwrap().is_ok());
    let broken = handle.do_pass3a(1).unwrap();
    assert!(broken.is_rejected());
    assert!(broken.message().contains("fall off the bottom"));
    assert_eq!(handle.do_pass3a(1).unwrap(), broken);

    // Another handle for the same name shares the cached outcomes
    let again = registry.get("Main");
    assert!(again.same_verifier(&handle));
    assert_eq!(again.do_pass3a(1).unwrap(), broken);
}

#[test]
fn later_passes_wait_for_earlier_ones() {
    init_logging();
    let mut repo = base_repo();
    let mut bad = ClassBuilder::new("Bad", Some("java/lang/Object"));
    static_method(&mut bad, "run", 1, vec![RETURN]);
    // Not a valid method name
    static_method(&mut bad, "no;good", 1, vec![RETURN]);
    repo.add(bad.build()).unwrap();

    let registry = Registry::new(repo);
    let handle = registry.get("Bad");
    assert!(handle.do_pass1().unwrap().is_ok());
    assert!(handle.do_pass2().unwrap().is_rejected());
    assert!(handle.do_pass3a(0).unwrap().is_not_yet());
    assert!(handle.do_pass3b(0).unwrap().is_not_yet());
    assert!(handle.local_variables_info(0).unwrap().is_none());

    let missing = registry.get("Nowhere");
    assert!(missing.do_pass1().unwrap().is_rejected());
    let outcome = missing.do_pass2().unwrap();
    assert_eq!(outcome.status(), Status::NotYet);
    assert_eq!(outcome, Outcome::not_yet());
}

struct Recorder {
    seen: RefCell<Vec<String>>,
}
impl RegistryObserver for Recorder {
    fn on_registered(&self, _registry: &Registry, class_name: &str) {
        self.seen.borrow_mut().push(class_name.to_owned());
    }
}

#[test]
fn observers_see_classes_registered_by_passes() {
    init_logging();
    let mut repo = base_repo();
    repo.add(ClassBuilder::new("Parent", Some("java/lang/Object")).build())
        .unwrap();
    repo.add(ClassBuilder::new("Child", Some("Parent")).build())
        .unwrap();

    let registry = Registry::new(repo);
    let recorder = Rc::new(Recorder {
        seen: RefCell::new(Vec::new()),
    });
    registry.attach(recorder.clone());

    assert!(registry.get("Child").do_pass2().unwrap().is_ok());
    assert!(registry.get("Child").do_pass2().unwrap().is_ok());

    let seen = recorder.seen.borrow();
    assert_eq!(seen.first().map(String::as_str), Some("Child"));
    assert!(seen.iter().any(|name| name == "Parent"));
    assert!(seen.iter().any(|name| name == "java/lang/Object"));
    for name in seen.iter() {
        assert_eq!(seen.iter().filter(|x| *x == name).count(), 1, "{} seen twice", name);
    }
}

#[test]
fn superclass_hierarchy() {
    init_logging();
    let mut repo = base_repo();
    repo.add(ClassBuilder::new("A", Some("java/lang/Object")).build())
        .unwrap();
    repo.add(ClassBuilder::new("B", Some("A")).build()).unwrap();
    repo.add(ClassBuilder::new("C", Some("B")).build()).unwrap();
    repo.add(ClassBuilder::new("Loop1", Some("Loop2")).build())
        .unwrap();
    repo.add(ClassBuilder::new("Loop2", Some("Loop1")).build())
        .unwrap();
    repo.add(ClassBuilder::new("Orphan", Some("Gone")).build())
        .unwrap();

    let registry = Registry::new(repo);
    assert!(registry.get("C").do_pass2().unwrap().is_ok());

    let outcome = registry.get("Loop1").do_pass2().unwrap();
    assert!(outcome.is_rejected());
    assert!(outcome.message().contains("Circular superclass hierarchy detected."));

    let outcome = registry.get("Orphan").do_pass2().unwrap();
    assert!(outcome.is_rejected());
    assert!(outcome.message().contains("'Gone'"));
}

#[test]
fn final_methods_and_private_ancestors() {
    init_logging();
    let mut repo = base_repo();

    let mut parent = ClassBuilder::new("Parent", Some("java/lang/Object"));
    let body = || Some(code(0, 1, vec![RETURN]));
    parent.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL, "locked", "()V", body());
    parent.add_method(MethodAccessFlags::PRIVATE | MethodAccessFlags::FINAL, "hidden", "()V", body());
    repo.add(parent.build()).unwrap();

    let mut overrider = ClassBuilder::new("Overrider", Some("Parent"));
    overrider.add_method(MethodAccessFlags::PUBLIC, "locked", "()V", body());
    repo.add(overrider.build()).unwrap();

    let mut shadow = ClassBuilder::new("Shadow", Some("Parent"));
    shadow.add_method(MethodAccessFlags::PUBLIC, "hidden", "()V", body());
    repo.add(shadow.build()).unwrap();

    let registry = Registry::new(repo);

    let outcome = registry.get("Overrider").do_pass2().unwrap();
    assert!(outcome.is_rejected());
    assert!(outcome.message().contains("overrides the final"));

    let shadow = registry.get("Shadow");
    assert!(shadow.do_pass2().unwrap().is_ok());
    assert!(shadow
        .messages()
        .iter()
        .any(|m| m.starts_with("Pass 2: ") && m.contains("original definition was private")));
}

#[test]
fn local_variable_slots() {
    init_logging();
    let mut repo = base_repo();
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    // iload_3 with only three slots
    static_method(&mut main, "over", 3, vec![0x1D, POP, RETURN]);
    static_method(&mut main, "fine", 4, vec![0x1D, POP, RETURN]);
    repo.add(main.build()).unwrap();

    let handle = Registry::new(repo).get("Main");
    let outcome = handle.do_pass3a(0).unwrap();
    assert!(outcome.is_rejected());
    assert!(outcome.message().contains("max_locals"));
    assert!(handle.do_pass3a(1).unwrap().is_ok());

    let info = handle.local_variables_info(1).unwrap().unwrap();
    assert_eq!(info.max_locals(), 4);
}

#[test]
fn flushing_forgets_outcomes_and_messages() {
    init_logging();
    let mut repo = base_repo();
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    static_method(&mut main, "run", 1, vec![RETURN]);
    repo.add(main.build()).unwrap();

    let registry = Registry::new(repo);
    registry.set_data_flow_verifier(Some(Rc::new(Counting {
        calls: RefCell::new(Vec::new()),
    })));
    let handle = registry.get("Main");
    assert!(handle.do_pass3b(0).unwrap().is_ok());
    assert!(!handle.messages().is_empty());

    handle.flush();
    assert!(handle.messages().is_empty());
    assert!(format!("{:?}", handle.verifier()).contains("pass2: None"));

    // Outcomes are computed again, with the data-flow verifier now gone
    registry.set_data_flow_verifier(None);
    assert!(handle.do_pass2().unwrap().is_ok());
    assert_eq!(handle.do_pass3b(0).unwrap().message(), NO_DATA_FLOW_VERIFIER);
}

#[test]
fn nesting_is_limited() {
    init_logging();
    let mut repo = base_repo();
    repo.add(ClassBuilder::new("Main", Some("java/lang/Object")).build())
        .unwrap();

    let registry = Registry::with_config(
        repo,
        VerifierConfig {
            max_depth: 1,
            ..VerifierConfig::default()
        },
    );
    let handle = registry.get("Main");
    assert!(handle.do_pass1().unwrap().is_ok());
    assert!(matches!(
        handle.do_pass2(),
        Err(FatalError::RecursionLimit { limit: 1, .. })
    ));
    // Nothing was cached, and the depth was unwound
    assert!(handle.do_pass1().unwrap().is_ok());
    assert!(matches!(handle.do_pass2(), Err(FatalError::RecursionLimit { .. })));
}

#[test]
fn data_flow_without_verifier() {
    init_logging();
    let mut repo = base_repo();
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    static_method(&mut main, "run", 1, vec![RETURN]);
    repo.add(main.build()).unwrap();

    let handle = Registry::new(repo).get("Main");
    let outcome = handle.do_pass3b(0).unwrap();
    assert_eq!(outcome.status(), Status::NotYet);
    assert_eq!(outcome.message(), NO_DATA_FLOW_VERIFIER);
}

struct Counting {
    calls: RefCell<Vec<(usize, u16)>>,
}
impl DataFlowVerifier for Counting {
    fn verify(&self, ctx: &DataFlowContext<'_>) -> Result<Outcome, FatalError> {
        self.calls
            .borrow_mut()
            .push((ctx.method_index, ctx.code.max_locals()));
        assert_eq!(ctx.local_variables.max_locals(), usize::from(ctx.code.max_locals()));
        ctx.state.add_message("looked at it");
        if ctx.code.instructions().len() > 1 {
            Ok(Outcome::rejected("Too long."))
        } else {
            Ok(Outcome::ok())
        }
    }
}

#[test]
fn data_flow_is_delegated() {
    init_logging();
    let mut repo = base_repo();
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    static_method(&mut main, "run", 1, vec![RETURN]);
    static_method(&mut main, "long", 2, vec![ICONST_0, POP, RETURN]);
    static_method(&mut main, "broken", 1, vec![ICONST_0]);
    repo.add(main.build()).unwrap();

    let registry = Registry::new(repo);
    let counting = Rc::new(Counting {
        calls: RefCell::new(Vec::new()),
    });
    registry.set_data_flow_verifier(Some(counting.clone()));

    let handle = registry.get("Main");
    assert!(handle.do_pass3b(0).unwrap().is_ok());
    assert!(handle.do_pass3b(0).unwrap().is_ok());
    assert!(handle.do_pass3b(1).unwrap().is_rejected());
    // Pass 3a fails, so the data-flow verifier never sees it
    assert!(handle.do_pass3b(2).unwrap().is_not_yet());

    assert_eq!(*counting.calls.borrow(), vec![(0, 1), (1, 2)]);
    assert!(handle
        .messages()
        .contains(&"Pass 3b, method 0 ('run'): looked at it".to_owned()));
}
