//! Read, inspect, and edit JVM classes
//!
//! The pieces here are the class-level plumbing that the backporting passes are built on:
//!
//!   - [`class_file`] is a faithful model of the binary `.class` format, with an editable
//!     constant pool and typed views of the attributes the passes care about
//!   - [`class_graph`] is the combined repository of program and library classes, answering
//!     subtyping and method resolution queries
//!   - [`code`] walks method bodies and rewrites instruction sequences in place
//!   - descriptors and generic signatures can be parsed, rendered, and have their class names
//!     substituted
//!
//! ### Simple example
//!
//! Building a class, then reading it back:
//!
//! ```
//! use jbackport::jvm::class_file::{ClassBuilder, ClassFile, Code, Version};
//! use jbackport::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let name = BinaryName::from_string(String::from("me/alec/Greeter")).unwrap();
//! let mut class = ClassBuilder::new(
//!     Version::JAVA8,
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     &name,
//!     Some(&BinaryName::OBJECT),
//!     &[],
//! )?;
//! let code = Code {
//!     max_stack: 0,
//!     max_locals: 0,
//!     code_array: vec![0xb1], // return
//!     exception_table: vec![],
//!     attributes: vec![],
//! };
//! class.add_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "greet",
//!     "()V",
//!     Some(&code),
//! )?;
//!
//! let bytes: Vec<u8> = class.result().to_bytes()?;
//! let parsed = ClassFile::from_bytes(&bytes)?;
//! assert_eq!(parsed.name()?, name);
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod signatures;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
