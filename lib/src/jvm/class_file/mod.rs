//! Binary representation of class files
//!
//! Everything here mirrors the [`class` file format][0] closely: indices stay indices, and
//! attributes are kept as raw bytes until something asks for a typed view of them. This keeps a
//! parse followed by a serialize byte-for-byte faithful, while still letting the rewriting passes
//! edit the bits they care about.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod annotations;
mod attribute;
mod class;
mod class_builder;
mod constants;
mod field;
mod method;
mod serialize;
mod version;

pub use annotations::*;
pub use attribute::*;
pub use class::*;
pub use class_builder::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use serialize::*;
pub use version::*;
