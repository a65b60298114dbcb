//! Analyses and transforms over Viper IL.
//!
//! The analyses (CFG, dominator tree, loop info) address blocks by their
//! index within the function, so they stay valid while a pass mutates
//! instruction lists in place. The verifier rejects malformed modules with
//! rule-tagged diagnostics; the two transforms (constant folding, mem2reg)
//! preserve verification.

#![warn(missing_docs)]

mod cfg;
mod const_fold;
mod dominators;
mod loops;
mod mem2reg;
mod verify;

pub use cfg::Cfg;
pub use const_fold::const_fold;
pub use dominators::DominatorTree;
pub use loops::{Loop, LoopInfo};
pub use mem2reg::{mem2reg, Mem2RegStats};
pub use verify::{verify_module, VerifyError};
