//! Size resolution and bit-level layout synthesis.
//!
//! This crate is the heart of the front end's layout analysis. It takes
//! the type-level declarations of one compilation unit — bitdata types,
//! structs, areas, synonyms, possibly mutually recursive and with sizes
//! left for inference — and:
//!
//! 1. schedules them into dependency-ordered groups (`keel_graph`),
//! 2. derives and solves the linear equations relating their sizes
//!    (`keel_nat`),
//! 3. validates every resolved size, and
//! 4. synthesizes verified bit-level layouts for bitdata constructors
//!    (`keel_obdd`): disjointness ("confusion") checking, junk
//!    reporting, and a mask-test discriminator per constructor —
//!    plus byte offsets and alignments for structs and areas.
//!
//! Everything downstream (constructor functions, field accessors,
//! pattern-match dispatch) consumes the [`UnitLayouts`] produced here.

mod defn;
mod error;
mod layout;
mod unit;


pub use defn::{
    AreaDefn, AreaTy, BitTy, BitdataDefn, CtorDefn, Defn, DefnId, DefnKind, Region, StructDefn,
    StructRegion, SynonymDefn,
};
pub use error::{LayoutError, Party};
pub use layout::{
    AreaLayout, BitdataTypeLayout, CtorLayout, FieldLayout, LayoutInfo, StructFieldLayout,
    StructLayout, UnitLayouts,
};
pub use unit::Unit;
