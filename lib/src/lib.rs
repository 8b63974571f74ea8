//! Backport compiled JVM programs onto older runtimes
//!
//! The [`jvm`] module is a self-contained class file library. The [`backport`] module contains the
//! passes which rewrite a program: replacing uses of types and methods, collecting lambda
//! expressions, and relocating static interface methods.

pub mod backport;
pub mod jvm;
pub mod util;
