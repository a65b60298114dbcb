//! Typed, SSA-form intermediate language of the Viper toolchain.
//!
//! The IL uses block parameters instead of PHI nodes: join points declare
//! typed parameters and every predecessor edge supplies matching branch
//! arguments. This crate owns the data model, the opcode inventory, the
//! trap taxonomy shared with the VM, the deterministic textual format and
//! a builder for programmatic construction.

#![warn(missing_docs)]

pub mod build;
mod block;
mod function;
mod instr;
mod loc;
mod module;
mod opcode;
pub mod text;
mod trap;
mod types;
mod value;

pub use block::{BasicBlock, Param};
pub use function::Function;
pub use instr::Instr;
pub use loc::SourceLoc;
pub use module::{ExternDecl, Global, Module};
pub use opcode::{Opcode, ResultKind};
pub use trap::TrapKind;
pub use types::Type;
pub use value::{TempId, Value};
