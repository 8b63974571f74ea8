//! Bytecode walking and rewriting
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. Rewriting passes never re-assemble whole method bodies. Instead,
//! they:
//!
//!   - decode the [list of bytecode instructions][0] into [`Instruction`]s, which only record
//!     where an instruction starts and how long it is
//!   - find the [jump targets](jump_targets), so that a multi-instruction match never swallows a
//!     position something else can jump to
//!   - overwrite matched instructions with replacements that are no longer than the original,
//!     padding the rest with `nop`
//!
//! Since no instruction moves, branch offsets, exception tables, line numbers, local variable
//! ranges, and stack map frames all stay valid without being touched.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod instructions;
mod replacer;

pub use instructions::*;
pub use replacer::*;
