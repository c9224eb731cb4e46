//! Symbolic natural-number sizes and the linear equation solver.
//!
//! Bit and byte sizes of declarations start out as *size expressions*:
//! either literals or unresolved variables held in a [`NatPool`] arena
//! and shared by [`NatIdx`] handle wherever the same width is reused.
//! Each definition group contributes one [`LinearEqn`] per constructor
//! (or structure) relating those expressions, and [`solve`] assigns
//! concrete values to every variable the batch determines uniquely.
//!
//! Variables the equations cannot pin down are left unbound — whether
//! that is acceptable (a polymorphic area size) or fatal (an unsized
//! bitdata type) is the caller's decision, made in its size checks.

mod eqn;
mod pool;

pub use eqn::{solve, LinearEqn, SolveError};
pub use pool::{NatIdx, NatPool};
