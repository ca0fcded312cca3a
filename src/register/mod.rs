// src/register/mod.rs

//! Typed registers: the parsed view of every file matching a path
//! predicate.

pub mod file_register;
pub mod identifier;
pub mod registry;

pub use file_register::{FileRegister, Register};
pub use identifier::{GlobIdentifier, PathIdentifier, any_path, extension, identifier, not};
pub use registry::FilesRegistry;
