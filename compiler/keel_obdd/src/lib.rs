//! Bit-pattern algebra for bitdata layout synthesis.
//!
//! A [`Pat`] is an immutable, width-indexed value denoting the set of bit
//! vectors that a value of some bit-level type may take. Patterns are
//! built bottom-up (a single tag literal or field, narrowest first),
//! widened by concatenation, and combined with the usual set operations.
//! Layout synthesis uses them to prove that the constructors of a bitdata
//! type have disjoint representations and to derive a cheap runtime
//! discriminator — a [`MaskTest`] of the form `(x & mask) == bits` or
//! `(x & mask) != bits` — for each constructor.
//!
//! # Representation
//!
//! Sets are stored as ordered binary decision diagrams: an if-then-else
//! DAG over bit indices where bit 0 is the least significant bit and
//! child nodes test strictly lower bits than their parents. The `ite`
//! smart constructor maintains that invariant and collapses redundant
//! tests, so structurally equal diagrams denote equal sets.
//!
//! Widths are capped at [`MAX_WIDTH`] so that masks, tag bits, and
//! representative vectors all fit in a `u128`.

mod bdd;
mod pat;

pub use mask_test::{MaskOp, MaskTest};
pub use pat::Pat;

/// Maximum supported width, in bits, of any bit-level type.
pub const MAX_WIDTH: u32 = 128;
