//! Rewriting JVM programs so that they run against older APIs
//!
//! The passes here work on a [`Program`] (the class files being converted) together with a
//! [`ClassGraph`](crate::jvm::class_graph::ClassGraph) holding both the program and the library
//! it is converted against:
//!
//!   - [`StaticInterfaceMethodRelocator`] moves static interface methods into helper classes
//!   - [`ApiConverter`] redirects types and method calls according to replacement rules
//!   - [`LambdaExpressionCollector`] decodes `LambdaMetafactory` call sites (read-only)
//!
//! Changes are reported through a [`ConversionObserver`].

mod converter;
mod errors;
mod lambda;
mod observer;
mod pattern;
mod program;
mod relocator;
mod rules;
mod settings;

pub use converter::*;
pub use errors::*;
pub use lambda::*;
pub use observer::*;
pub use pattern::*;
pub use program::*;
pub use relocator::*;
pub use rules::*;
pub use settings::*;
