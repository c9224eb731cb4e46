//! The definition model handed over by scope and kind inference.
//!
//! Upstream passes deliver one [`Defn`] per type-level declaration,
//! already annotated with its field and region types. Definitions live
//! in an arena and reference each other by [`DefnId`], so mutually
//! recursive declarations are unremarkable; [`Defn::referenced`]
//! recovers the dependency edges the scheduler needs.

use std::fmt;

use keel_diagnostic::Span;
use keel_nat::NatIdx;

/// A 32-bit handle to a definition within its compilation unit.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct DefnId(u32);

impl DefnId {
    /// Create an id from a raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        DefnId(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The id as an arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DefnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefnId({})", self.0)
    }
}

/// One type-level declaration.
#[derive(Debug)]
pub struct Defn {
    pub span: Span,
    pub name: String,
    pub kind: DefnKind,
}

/// The declaration forms whose sizes and layouts this core computes.
#[derive(Debug)]
pub enum DefnKind {
    Bitdata(BitdataDefn),
    Struct(StructDefn),
    Area(AreaDefn),
    Synonym(SynonymDefn),
}

/// A bitdata declaration: a tagged union packed into a fixed number of
/// bits.
#[derive(Debug)]
pub struct BitdataDefn {
    /// The declared bit size, or a fresh variable when it is to be
    /// inferred from the constructors.
    pub size: NatIdx,
    pub ctors: Vec<CtorDefn>,
}

/// One constructor of a bitdata declaration.
#[derive(Debug)]
pub struct CtorDefn {
    pub span: Span,
    pub name: String,
    /// Regions in declaration order, most significant first.
    pub regions: Vec<Region>,
}

/// One region of a constructor: either a run of equally-typed named
/// fields or a run of literal tag bits.
#[derive(Debug)]
pub enum Region {
    Fields { names: Vec<String>, ty: BitTy },
    TagBits {
        span: Span,
        value: u128,
        /// The region width: a literal when the source gave one (e.g.
        /// `B101` is three bits wide), a fresh variable otherwise.
        width: NatIdx,
    },
}

/// A type usable in a bitdata field position.
#[derive(Clone, Debug)]
pub enum BitTy {
    /// The primitive bit-vector type `Bit n`.
    Bit(NatIdx),
    /// Another definition with a bit-level representation.
    Ref(DefnId),
}

/// A struct declaration: a byte-precise memory layout.
#[derive(Debug)]
pub struct StructDefn {
    /// The declared byte size, or a fresh variable.
    pub size: NatIdx,
    /// Alignment from an explicit `aligned` clause, if any.
    pub declared_align: Option<u64>,
    pub regions: Vec<StructRegion>,
}

/// One region of a struct: named fields of a common type, or anonymous
/// padding (`fields` absent).
#[derive(Debug)]
pub struct StructRegion {
    pub span: Span,
    pub fields: Option<Vec<String>>,
    pub ty: AreaTy,
}

/// A type usable in a struct field or area position.
#[derive(Clone, Debug)]
pub enum AreaTy {
    /// An upstream-provided area type of known size and alignment
    /// (machine words, stored scalars, arrays thereof).
    Prim {
        name: String,
        size: NatIdx,
        align: u64,
    },
    /// A definition with a byte-level representation.
    Ref(DefnId),
}

/// An area declaration: a named region of statically allocated memory.
#[derive(Debug)]
pub struct AreaDefn {
    pub ty: AreaTy,
    pub declared_align: Option<u64>,
}

/// A type synonym; shares the target's size and representation.
#[derive(Debug)]
pub struct SynonymDefn {
    pub target: DefnId,
}

impl Defn {
    /// Ids of the sibling definitions this declaration mentions; these
    /// are the forward dependency edges for scheduling.
    pub fn referenced(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let push_bit = |ty: &BitTy, out: &mut Vec<usize>| {
            if let BitTy::Ref(id) = ty {
                out.push(id.index());
            }
        };
        let push_area = |ty: &AreaTy, out: &mut Vec<usize>| {
            if let AreaTy::Ref(id) = ty {
                out.push(id.index());
            }
        };
        match &self.kind {
            DefnKind::Bitdata(b) => {
                for ctor in &b.ctors {
                    for region in &ctor.regions {
                        if let Region::Fields { ty, .. } = region {
                            push_bit(ty, &mut out);
                        }
                    }
                }
            }
            DefnKind::Struct(s) => {
                for region in &s.regions {
                    push_area(&region.ty, &mut out);
                }
            }
            DefnKind::Area(a) => push_area(&a.ty, &mut out),
            DefnKind::Synonym(s) => out.push(s.target.index()),
        }
        out
    }
}

/// Short rendering of a bit-level type for equation labels and
/// diagnostics.
pub(crate) fn describe_bit_ty(defns: &[Defn], pool: &keel_nat::NatPool, ty: &BitTy) -> String {
    match ty {
        BitTy::Bit(n) => format!("Bit {}", pool.describe(*n)),
        BitTy::Ref(id) => defns[id.index()].name.clone(),
    }
}

/// Short rendering of an area type.
pub(crate) fn describe_area_ty(defns: &[Defn], ty: &AreaTy) -> String {
    match ty {
        AreaTy::Prim { name, .. } => name.clone(),
        AreaTy::Ref(id) => defns[id.index()].name.clone(),
    }
}

/// Follow a synonym chain to the definition it ultimately names.
/// Returns `None` if the chain is cyclic.
pub(crate) fn resolve_synonyms(defns: &[Defn], mut id: DefnId) -> Option<DefnId> {
    let mut steps = 0;
    while let DefnKind::Synonym(s) = &defns[id.index()].kind {
        id = s.target;
        steps += 1;
        if steps > defns.len() {
            return None;
        }
    }
    Some(id)
}
