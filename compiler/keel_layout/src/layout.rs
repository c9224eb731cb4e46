//! Computed layouts: what the layout core hands downstream.
//!
//! Constructor-function generation consumes [`CtorLayout`] (field
//! offset/width tables, tag bits, the constructor's exact bit pattern
//! and its mask-test discriminator); struct and area code generation
//! consume resolved byte sizes, field offsets, and alignments.

use std::fmt;

use keel_diagnostic::Span;
use keel_obdd::{MaskOp, MaskTest, Pat};

use crate::defn::{AreaTy, BitTy, DefnId};
use crate::error::{LayoutError, Party};

/// One field of a bitdata constructor, with its computed position.
#[derive(Clone, Debug)]
pub struct FieldLayout {
    pub name: String,
    /// Offset of the least significant bit of the field.
    pub offset: u32,
    pub width: u32,
    /// The field's source type.
    pub ty: BitTy,
}

impl FieldLayout {
    /// Extract this field from a value of the enclosing bitdata type.
    pub fn extract(&self, word: u128) -> u128 {
        (word >> self.offset) & mask_of(self.width)
    }

    /// Insert `field` into `word` at this field's position.
    pub fn inject(&self, word: u128, field: u128) -> u128 {
        let mask = mask_of(self.width) << self.offset;
        (word & !mask) | ((field << self.offset) & mask)
    }
}

fn mask_of(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// The finished layout of one bitdata constructor.
#[derive(Clone, Debug)]
pub struct CtorLayout {
    pub span: Span,
    pub name: String,
    /// Constructor number within its type.
    pub index: u32,
    /// Fields in declaration order, most significant first.
    pub fields: Vec<FieldLayout>,
    /// The literal bits contributed by tag regions, in place.
    pub tag_bits: u128,
    /// Exactly the vectors this constructor can produce.
    pub pat: Pat,
    /// The discriminator: accepts every vector of `pat` and rejects
    /// every vector of every sibling constructor.
    pub mask_test: MaskTest,
}

impl CtorLayout {
    /// Number of fields the constructor function takes.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for CtorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}@{}+{}", field.name, field.offset, field.width)?;
        }
        write!(f, "] if {}", self.mask_test)
    }
}

/// The finished layout of a bitdata type.
#[derive(Clone, Debug)]
pub struct BitdataTypeLayout {
    pub width: u32,
    /// Union of all constructors' patterns.
    pub pat: Pat,
    pub ctors: Vec<CtorLayout>,
}

/// One field of a struct, with its computed position.
#[derive(Clone, Debug)]
pub struct StructFieldLayout {
    pub name: String,
    /// Byte offset from the start of the structure.
    pub offset: u64,
    /// Size of the field in bytes.
    pub size: u64,
    pub ty: AreaTy,
}

/// The finished layout of a struct type.
#[derive(Clone, Debug)]
pub struct StructLayout {
    pub byte_size: u64,
    /// Least common multiple of the field alignments, or the declared
    /// alignment once validated against that minimum.
    pub alignment: u64,
    /// Named fields only; padding regions occupy space but are absent.
    pub fields: Vec<StructFieldLayout>,
}

impl StructLayout {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&StructFieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The resolved placement of an area declaration.
#[derive(Clone, Debug)]
pub struct AreaLayout {
    /// `None` when the area's size is legitimately polymorphic.
    pub byte_size: Option<u64>,
    pub alignment: u64,
}

/// Per-definition analysis result.
#[derive(Clone, Debug)]
pub enum LayoutInfo {
    Bitdata(BitdataTypeLayout),
    Struct(StructLayout),
    Area(AreaLayout),
    /// A synonym forwards to the definition it ultimately names.
    Synonym { target: DefnId },
}

/// All layouts computed for one compilation unit. Definitions whose
/// analysis failed have no entry; their errors are in the handler.
#[derive(Debug, Default)]
pub struct UnitLayouts {
    infos: Vec<Option<LayoutInfo>>,
}

impl UnitLayouts {
    pub(crate) fn new(len: usize) -> Self {
        UnitLayouts {
            infos: vec![None; len],
        }
    }

    pub(crate) fn set(&mut self, index: usize, info: LayoutInfo) {
        self.infos[index] = Some(info);
    }

    /// The layout computed for a definition, if analysis succeeded.
    pub fn get(&self, id: DefnId) -> Option<&LayoutInfo> {
        self.infos.get(id.index())?.as_ref()
    }

    /// The bitdata layout for a definition, if it is one.
    pub fn bitdata(&self, id: DefnId) -> Option<&BitdataTypeLayout> {
        match self.get(id)? {
            LayoutInfo::Bitdata(l) => Some(l),
            _ => None,
        }
    }

    /// The struct layout for a definition, if it is one.
    pub fn struct_layout(&self, id: DefnId) -> Option<&StructLayout> {
        match self.get(id)? {
            LayoutInfo::Struct(l) => Some(l),
            _ => None,
        }
    }

    /// The area layout for a definition, if it is one.
    pub fn area(&self, id: DefnId) -> Option<&AreaLayout> {
        match self.get(id)? {
            LayoutInfo::Area(l) => Some(l),
            _ => None,
        }
    }
}

/// A constructor whose pattern and fields are computed but whose
/// discriminator is still pending.
pub(crate) struct PendingCtor {
    pub(crate) span: Span,
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldLayout>,
    pub(crate) tag_bits: u128,
    pub(crate) pat: Pat,
}

impl PendingCtor {
    fn party(&self) -> Party {
        Party::new(self.name.clone(), self.span)
    }
}

/// Choose a mask-test discriminator for constructor `i`, validating the
/// equality and inequality candidates against every sibling's pattern
/// and widening the survivor with `blur`. Also performs the pairwise
/// confusion check for `i` against each sibling.
///
/// The equality candidate is preferred; if neither candidate rejects
/// all siblings, no sound mask test exists and the failure names the
/// two conflicting constructors.
pub(crate) fn calc_mask_test(
    type_name: &str,
    ctors: &[PendingCtor],
    i: usize,
    width: u32,
) -> Result<MaskTest, LayoutError> {
    let cpat = &ctors[i].pat;
    let eq = cpat.mask_test(MaskOp::Eq);
    let neq = cpat.mask_test(MaskOp::Neq);
    let mut eq_conflict: Option<usize> = None;
    let mut neq_conflict: Option<usize> = None;
    let mut butnot = Pat::empty(width);

    for (j, other) in ctors.iter().enumerate() {
        if i == j {
            continue;
        }
        let dpat = &other.pat;
        butnot = butnot.or(dpat);
        if !cpat.disjoint(dpat) {
            return Err(LayoutError::Confusion {
                type_name: type_name.to_string(),
                first: ctors[i].party(),
                second: other.party(),
                overlap: cpat.and(dpat).show_bits(),
            });
        }
        if eq_conflict.is_none() && !eq.disjoint(dpat) {
            eq_conflict = Some(j);
        }
        if neq_conflict.is_none() && !neq.disjoint(dpat) {
            neq_conflict = Some(j);
        }
    }

    match (eq_conflict, neq_conflict) {
        (None, _) => Ok(eq.blur(&butnot)),
        (_, None) => Ok(neq.blur(&butnot)),
        (Some(a), Some(b)) => Err(LayoutError::NoMaskTest {
            ctor: ctors[i].party(),
            eq_conflict: ctors[a].party(),
            neq_conflict: ctors[b].party(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use keel_nat::NatPool;

    fn field(name: &str, offset: u32, width: u32) -> FieldLayout {
        let mut pool = NatPool::new();
        let w = pool.lit(u64::from(width));
        FieldLayout {
            name: name.to_string(),
            offset,
            width,
            ty: BitTy::Bit(w),
        }
    }

    #[test]
    fn extract_and_inject_roundtrip() {
        let f = field("flags", 4, 8);
        let word = 0xABCDu128;
        assert_eq!(f.extract(word), 0xBC);
        assert_eq!(f.inject(word, 0x12), 0xA12D);
        assert_eq!(f.extract(f.inject(word, 0x7F)), 0x7F);
        // Bits outside the field are untouched.
        assert_eq!(f.inject(word, 0x12) & 0xF, word & 0xF);
    }

    #[test]
    fn inject_truncates_oversized_values() {
        let f = field("b", 0, 4);
        assert_eq!(f.inject(0, 0xFF), 0xF);
    }

    #[test]
    fn full_width_field_selects_everything() {
        let f = field("w", 0, 128);
        assert_eq!(f.extract(u128::MAX), u128::MAX);
        assert_eq!(f.inject(0, u128::MAX), u128::MAX);
    }
}
