#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::missing_errors_doc)]
// Shadowing is nice.
#![allow(clippy::shadow_unrelated)]
// Cool idea but highlights entire function and is too aggressive.
#![allow(clippy::option_if_let_else)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::semicolon_if_nothing_returned)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::too_many_lines)]

//! The class file model that the verifier works over: constant pool, members, attributes,
//! descriptors and decoded bytecode.
//!
//! Nothing here reads class files from bytes. Models come from a [`builder::ClassBuilder`]
//! or from whatever parser the embedding uses, and are found through a
//! [`repository::ClassRepository`].

pub mod attribute;
pub mod builder;
pub mod class;
pub mod code;
pub mod constant_pool;
pub mod repository;
pub mod util;

pub use class::ClassFile;
pub use repository::{ClassRepository, MemoryRepository};
