//! Per-unit analysis: scheduling, size solving, layout synthesis.
//!
//! [`Unit::analyze`] drives the whole pipeline. Definitions are
//! partitioned into strongly connected groups and the groups processed
//! in dependency order; within one group, every constructor contributes
//! a linear size equation, the batch is solved, and only then — once
//! widths are concrete — are bit patterns, confusion checks, and
//! discriminators computed. Failures go to the [`Handler`]; a failed
//! definition's layout is simply absent, and a failed group does not
//! stop later groups from being diagnosed.

use keel_diagnostic::{Diagnostic, ErrorCode, Handler, Span};
use keel_graph::Group;
use keel_nat::{solve, LinearEqn, NatIdx, NatPool};
use keel_obdd::{Pat, MAX_WIDTH};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::defn::{
    describe_area_ty, describe_bit_ty, resolve_synonyms, AreaDefn, AreaTy, BitTy, BitdataDefn,
    CtorDefn, Defn, DefnId, DefnKind, Region, StructDefn, StructRegion, SynonymDefn,
};
use crate::error::LayoutError;
use crate::layout::{
    calc_mask_test, AreaLayout, BitdataTypeLayout, CtorLayout, FieldLayout, LayoutInfo,
    PendingCtor, StructFieldLayout, StructLayout, UnitLayouts,
};

/// One compilation unit's worth of definitions, plus the size-expression
/// pool they share.
#[derive(Default)]
pub struct Unit {
    pub defns: Vec<Defn>,
    pub pool: NatPool,
}

impl Unit {
    /// Create an empty unit.
    pub fn new() -> Self {
        Unit::default()
    }

    /// Add a definition, returning its id. Forward references are fine:
    /// ids are assigned sequentially, so a definition may mention ids
    /// that are only added later.
    pub fn add(&mut self, defn: Defn) -> DefnId {
        let id = DefnId::from_raw(self.defns.len() as u32);
        self.defns.push(defn);
        id
    }

    /// Add a bitdata declaration. `declared_size` is the explicit
    /// `/ n` width when the source gave one.
    pub fn add_bitdata(
        &mut self,
        span: Span,
        name: &str,
        declared_size: Option<u64>,
        ctors: Vec<CtorDefn>,
    ) -> DefnId {
        let size = match declared_size {
            Some(n) => self.pool.lit(n),
            None => self.pool.var(format!("size of {name}")),
        };
        self.add(Defn {
            span,
            name: name.to_string(),
            kind: DefnKind::Bitdata(BitdataDefn { size, ctors }),
        })
    }

    /// Add a struct declaration.
    pub fn add_struct(
        &mut self,
        span: Span,
        name: &str,
        declared_size: Option<u64>,
        declared_align: Option<u64>,
        regions: Vec<StructRegion>,
    ) -> DefnId {
        let size = match declared_size {
            Some(n) => self.pool.lit(n),
            None => self.pool.var(format!("size of {name}")),
        };
        self.add(Defn {
            span,
            name: name.to_string(),
            kind: DefnKind::Struct(StructDefn {
                size,
                declared_align,
                regions,
            }),
        })
    }

    /// Add an area declaration.
    pub fn add_area(
        &mut self,
        span: Span,
        name: &str,
        ty: AreaTy,
        declared_align: Option<u64>,
    ) -> DefnId {
        self.add(Defn {
            span,
            name: name.to_string(),
            kind: DefnKind::Area(AreaDefn { ty, declared_align }),
        })
    }

    /// Add a type synonym.
    pub fn add_synonym(&mut self, span: Span, name: &str, target: DefnId) -> DefnId {
        self.add(Defn {
            span,
            name: name.to_string(),
            kind: DefnKind::Synonym(SynonymDefn { target }),
        })
    }

    /// The primitive `Bit n` type of a known width.
    pub fn bit(&mut self, width: u64) -> BitTy {
        BitTy::Bit(self.pool.lit(width))
    }

    /// A tag-bits region. `width` is the declared region width; absent,
    /// it becomes a variable for the solver to determine.
    pub fn tag(&mut self, span: Span, value: u128, width: Option<u64>) -> Region {
        let width = match width {
            Some(n) => self.pool.lit(n),
            None => self.pool.var("width of tag bits"),
        };
        Region::TagBits { span, value, width }
    }

    /// An upstream-provided area type with known size and alignment.
    pub fn prim_area(&mut self, name: &str, size: u64, align: u64) -> AreaTy {
        AreaTy::Prim {
            name: name.to_string(),
            size: self.pool.lit(size),
            align,
        }
    }

    /// Run the full analysis, reporting failures to `handler`.
    pub fn analyze(&mut self, handler: &mut Handler) -> UnitLayouts {
        let edges: Vec<Vec<usize>> = self.defns.iter().map(Defn::referenced).collect();
        let schedule = keel_graph::schedule(&edges);
        let mut out = UnitLayouts::new(self.defns.len());
        for (_, group) in schedule.iter() {
            calc_group_sizes(&self.defns, &mut self.pool, group, &mut out, handler);
        }
        out
    }
}

/// Process one definition group: build and solve the size equations,
/// then check sizes and synthesize layouts for each member.
fn calc_group_sizes(
    defns: &[Defn],
    pool: &mut NatPool,
    group: &Group,
    out: &mut UnitLayouts,
    handler: &mut Handler,
) {
    // Collect the linear equations for the whole group. A definition
    // whose equations cannot even be built is dropped from the group
    // (reported, output absent) without disturbing its siblings.
    let mut eqns: Vec<LinearEqn> = Vec::new();
    let mut failed: FxHashSet<usize> = FxHashSet::default();
    for &m in &group.members {
        let defn = &defns[m];
        let result = match &defn.kind {
            DefnKind::Bitdata(b) => init_bitdata_eqns(defns, pool, defn, b, &mut eqns),
            DefnKind::Struct(s) => init_struct_eqn(defns, pool, defn, s, &mut eqns),
            DefnKind::Area(_) | DefnKind::Synonym(_) => Ok(()),
        };
        if let Err(err) = result {
            handler.report(err.to_diagnostic());
            failed.insert(m);
        }
    }

    // Solve the batch. An unsolvable system is systemic: the whole
    // group is abandoned (later groups still run).
    if !eqns.is_empty() {
        if let Err(err) = solve(eqns, pool) {
            handler.report(err.to_diagnostic());
            return;
        }
    }

    // Synthesize layouts. A member may need a sibling's layout (e.g. a
    // synonym of a type in the same group), so iterate to a fixpoint;
    // whatever is left is genuinely unresolvable and gets a strict
    // final pass that turns "not yet" into the proper error.
    let mut pending: Vec<usize> = group
        .members
        .iter()
        .copied()
        .filter(|m| !failed.contains(m))
        .collect();
    loop {
        let mut progress = false;
        let mut still = Vec::new();
        for m in pending {
            match try_layout(defns, pool, m, out, handler, false) {
                Ok(Some(info)) => {
                    out.set(m, info);
                    progress = true;
                }
                Ok(None) => still.push(m),
                Err(err) => handler.report(err.to_diagnostic()),
            }
        }
        pending = still;
        if pending.is_empty() || !progress {
            break;
        }
    }
    for m in pending {
        match try_layout(defns, pool, m, out, handler, true) {
            Ok(Some(info)) => out.set(m, info),
            // A synonym of a failed definition stays silently absent:
            // the target already carries the report.
            Ok(None) => {}
            Err(err) => handler.report(err.to_diagnostic()),
        }
    }
}

/// One equation per constructor: the region widths (fields weighted by
/// their multiplicity, tag regions by their width) sum to the type's
/// bit size.
fn init_bitdata_eqns(
    defns: &[Defn],
    pool: &NatPool,
    defn: &Defn,
    b: &BitdataDefn,
    eqns: &mut Vec<LinearEqn>,
) -> Result<(), LayoutError> {
    for ctor in &b.ctors {
        let mut eqn = LinearEqn::new(ctor.span);
        eqn.add_rhs_term(b.size, &defn.name, pool);
        for region in &ctor.regions {
            match region {
                Region::Fields { names, ty } => {
                    let size = bit_size_of(defns, ty, ctor.span)?;
                    eqn.add_term(
                        names.len() as i128,
                        size,
                        &describe_bit_ty(defns, pool, ty),
                        pool,
                    );
                }
                Region::TagBits { width, .. } => {
                    eqn.add_term(1, *width, "tag bits", pool);
                }
            }
        }
        eqns.push(eqn);
    }
    Ok(())
}

/// One equation per struct: region byte sizes (fields weighted by
/// multiplicity, padding counted once) sum to the declared byte size.
fn init_struct_eqn(
    defns: &[Defn],
    pool: &NatPool,
    defn: &Defn,
    s: &StructDefn,
    eqns: &mut Vec<LinearEqn>,
) -> Result<(), LayoutError> {
    let mut eqn = LinearEqn::new(defn.span);
    eqn.add_rhs_term(s.size, &defn.name, pool);
    for region in &s.regions {
        let size = byte_size_of(defns, &region.ty, region.span)?;
        let coeff = region.fields.as_ref().map_or(1, Vec::len) as i128;
        eqn.add_term(coeff, size, &describe_area_ty(defns, &region.ty), pool);
    }
    eqns.push(eqn);
    Ok(())
}

/// The size expression giving a bit-level type's width.
fn bit_size_of(defns: &[Defn], ty: &BitTy, span: Span) -> Result<NatIdx, LayoutError> {
    match ty {
        BitTy::Bit(n) => Ok(*n),
        BitTy::Ref(id) => {
            let target = resolve_synonyms(defns, *id).ok_or_else(|| LayoutError::CyclicSynonym {
                span: defns[id.index()].span,
                name: defns[id.index()].name.clone(),
            })?;
            match &defns[target.index()].kind {
                DefnKind::Bitdata(b) => Ok(b.size),
                _ => Err(LayoutError::NoBitRepresentation {
                    span,
                    ty: defns[target.index()].name.clone(),
                }),
            }
        }
    }
}

/// The size expression giving an area type's byte size.
fn byte_size_of(defns: &[Defn], ty: &AreaTy, span: Span) -> Result<NatIdx, LayoutError> {
    match ty {
        AreaTy::Prim { size, .. } => Ok(*size),
        AreaTy::Ref(id) => {
            let target = resolve_synonyms(defns, *id).ok_or_else(|| LayoutError::CyclicSynonym {
                span: defns[id.index()].span,
                name: defns[id.index()].name.clone(),
            })?;
            match &defns[target.index()].kind {
                DefnKind::Struct(s) => Ok(s.size),
                _ => Err(LayoutError::NoByteRepresentation {
                    span,
                    ty: defns[target.index()].name.clone(),
                }),
            }
        }
    }
}

/// The bit pattern of a field type: `all(n)` for `Bit n`, the computed
/// pattern for a reference. `Ok(None)` means the width or pattern is
/// not available (yet).
fn bit_pat_of(
    defns: &[Defn],
    pool: &NatPool,
    out: &UnitLayouts,
    ty: &BitTy,
    span: Span,
) -> Result<Option<Pat>, LayoutError> {
    match ty {
        BitTy::Bit(n) => match pool.value(*n) {
            Some(w) if w > u64::from(MAX_WIDTH) => Err(LayoutError::InvalidWidth {
                span,
                name: format!("Bit {w}"),
                width: w,
            }),
            Some(w) => Ok(Some(Pat::all(w as u32))),
            None => Ok(None),
        },
        BitTy::Ref(id) => {
            let target = resolve_synonyms(defns, *id).ok_or_else(|| LayoutError::CyclicSynonym {
                span: defns[id.index()].span,
                name: defns[id.index()].name.clone(),
            })?;
            match &defns[target.index()].kind {
                DefnKind::Bitdata(_) => Ok(out.bitdata(target).map(|l| l.pat.clone())),
                _ => Err(LayoutError::NoBitRepresentation {
                    span,
                    ty: defns[target.index()].name.clone(),
                }),
            }
        }
    }
}

/// The alignment of an area type, once known: primitives carry theirs,
/// references take the computed alignment of the target struct.
fn alignment_of(defns: &[Defn], out: &UnitLayouts, ty: &AreaTy) -> Option<u64> {
    match ty {
        AreaTy::Prim { align, .. } => Some(*align),
        AreaTy::Ref(id) => {
            let target = resolve_synonyms(defns, *id)?;
            Some(out.struct_layout(target)?.alignment)
        }
    }
}

/// Attempt to lay out one definition. `Ok(None)` means some input
/// (typically a sibling's pattern or alignment) is not computed yet;
/// with `strict` set, that situation becomes the error it deserves.
fn try_layout(
    defns: &[Defn],
    pool: &NatPool,
    m: usize,
    out: &UnitLayouts,
    handler: &mut Handler,
    strict: bool,
) -> Result<Option<LayoutInfo>, LayoutError> {
    let defn = &defns[m];
    match &defn.kind {
        DefnKind::Bitdata(b) => calc_bitdata_layout(defns, pool, out, defn, b, handler, strict),
        DefnKind::Struct(s) => calc_struct_layout(defns, pool, out, defn, s, strict),
        DefnKind::Area(a) => calc_area_layout(defns, pool, out, defn, a, strict),
        DefnKind::Synonym(_) => {
            let id = DefnId::from_raw(m as u32);
            let target =
                resolve_synonyms(defns, id).ok_or_else(|| LayoutError::CyclicSynonym {
                    span: defn.span,
                    name: defn.name.clone(),
                })?;
            if out.get(target).is_some() {
                Ok(Some(LayoutInfo::Synonym { target }))
            } else {
                Ok(None)
            }
        }
    }
}

/// Steps 1-5 of bitdata synthesis: per-constructor patterns, junk
/// reporting, confusion checks, and discriminator selection.
fn calc_bitdata_layout(
    defns: &[Defn],
    pool: &NatPool,
    out: &UnitLayouts,
    defn: &Defn,
    b: &BitdataDefn,
    handler: &mut Handler,
    strict: bool,
) -> Result<Option<LayoutInfo>, LayoutError> {
    let Some(width) = pool.value(b.size) else {
        return Err(LayoutError::BitSizeNotDetermined {
            span: defn.span,
            name: defn.name.clone(),
        });
    };
    if width > u64::from(MAX_WIDTH) {
        return Err(LayoutError::InvalidWidth {
            span: defn.span,
            name: defn.name.clone(),
            width,
        });
    }
    let width = width as u32;

    let mut pendings = Vec::with_capacity(b.ctors.len());
    for ctor in &b.ctors {
        match calc_ctor_layout(defns, pool, out, ctor, strict)? {
            Some(pending) => pendings.push(pending),
            None => return Ok(None),
        }
    }
    debug!("BitSize({}) = {width}", defn.name);

    // Union the constructor patterns and report unclaimed combinations.
    let mut pat = Pat::empty(width);
    for pending in &pendings {
        pat = pending.pat.or(&pat);
    }
    let junk = pat.not();
    if !junk.is_empty() {
        let n = junk.size();
        let what = if n == 1 {
            "a junk value".to_string()
        } else {
            format!("{n} junk values")
        };
        handler.report(
            Diagnostic::warning(ErrorCode::E2007)
                .with_message(format!("bitdata type `{}` includes {what}", defn.name))
                .with_label(defn.span, "declared here"),
        );
    }

    // Confusion checks and discriminators.
    let mut tests = Vec::with_capacity(pendings.len());
    for i in 0..pendings.len() {
        let test = calc_mask_test(&defn.name, &pendings, i, width)?;
        debug!("pred {}(x :: Bit {width}) = {test}", pendings[i].name);
        tests.push(test);
    }

    let ctors = pendings
        .into_iter()
        .zip(tests)
        .enumerate()
        .map(|(index, (pending, mask_test))| CtorLayout {
            span: pending.span,
            name: pending.name,
            index: index as u32,
            fields: pending.fields,
            tag_bits: pending.tag_bits,
            pat: pending.pat,
            mask_test,
        })
        .collect();

    Ok(Some(LayoutInfo::Bitdata(BitdataTypeLayout {
        width,
        pat,
        ctors,
    })))
}

/// Fold one constructor's regions right-to-left (least significant
/// first), accumulating its pattern, tag bits, and field positions.
/// `Ok(None)` defers until every referenced pattern is available.
fn calc_ctor_layout(
    defns: &[Defn],
    pool: &NatPool,
    out: &UnitLayouts,
    ctor: &CtorDefn,
    strict: bool,
) -> Result<Option<PendingCtor>, LayoutError> {
    let mut pat = Pat::all(0);
    let mut fields: Vec<FieldLayout> = Vec::new();
    let mut tag_bits = 0u128;

    for region in ctor.regions.iter().rev() {
        let offset = pat.width();
        match region {
            Region::Fields { names, ty } => {
                let fpat = match bit_pat_of(defns, pool, out, ty, ctor.span)? {
                    Some(p) => p,
                    None if strict => {
                        return Err(LayoutError::NoBitRepresentation {
                            span: ctor.span,
                            ty: describe_bit_ty(defns, pool, ty),
                        });
                    }
                    None => return Ok(None),
                };
                let width = fpat.width();
                for _ in names {
                    pat = fpat.concat(&pat);
                }
                // The first-listed field takes the most significant
                // position in the region.
                let mut o = offset + width * names.len() as u32;
                for name in names {
                    o -= width;
                    fields.push(FieldLayout {
                        name: name.clone(),
                        offset: o,
                        width,
                        ty: ty.clone(),
                    });
                }
            }
            Region::TagBits { span, value, width } => {
                let Some(w) = pool.value(*width) else {
                    return Err(LayoutError::TagWidthNotDetermined { span: *span });
                };
                if u64::from(128 - value.leading_zeros()) > w {
                    return Err(LayoutError::LiteralOutOfRange {
                        span: *span,
                        value: *value,
                        width: w,
                    });
                }
                let w = w as u32;
                pat = Pat::literal(w, *value, offset).and(&pat.pad_left(w));
                if *value != 0 {
                    tag_bits |= value << offset;
                }
            }
        }
    }

    // Declaration order for the field table, most significant first.
    fields.sort_by_key(|f| std::cmp::Reverse(f.offset));

    Ok(Some(PendingCtor {
        span: ctor.span,
        name: ctor.name.clone(),
        fields,
        tag_bits,
        pat,
    }))
}

/// Sequential offsets, per-field alignment checks, and the minimal
/// (LCM) alignment for one struct.
fn calc_struct_layout(
    defns: &[Defn],
    pool: &NatPool,
    out: &UnitLayouts,
    defn: &Defn,
    s: &StructDefn,
    strict: bool,
) -> Result<Option<LayoutInfo>, LayoutError> {
    let Some(byte_size) = pool.value(s.size) else {
        return Err(LayoutError::ByteSizeNotDetermined {
            span: defn.span,
            name: defn.name.clone(),
        });
    };

    let mut offset = 0u64;
    let mut fields: Vec<StructFieldLayout> = Vec::new();
    let mut min_align = 1u64;
    for region in &s.regions {
        let size_idx = byte_size_of(defns, &region.ty, region.span)?;
        let Some(size) = pool.value(size_idx) else {
            return Err(LayoutError::FieldSizeNotDetermined {
                span: region.span,
                ty: describe_area_ty(defns, &region.ty),
            });
        };
        let Some(names) = &region.fields else {
            // Anonymous padding: occupies space, no alignment demands.
            offset += size;
            continue;
        };
        let align = match alignment_of(defns, out, &region.ty) {
            Some(a) if a > 0 => a,
            Some(_) | None if strict => {
                return Err(LayoutError::AlignmentNotDetermined {
                    span: region.span,
                    ty: describe_area_ty(defns, &region.ty),
                });
            }
            Some(_) | None => return Ok(None),
        };
        for name in names {
            if offset % align != 0 {
                return Err(LayoutError::OffsetMisaligned {
                    span: region.span,
                    field: name.clone(),
                    offset,
                    align,
                });
            }
            debug!("field {name}: offset={offset}, alignment={align}");
            fields.push(StructFieldLayout {
                name: name.clone(),
                offset,
                size,
                ty: region.ty.clone(),
            });
            min_align = lcm(min_align, align);
            offset += size;
        }
    }

    let alignment = match s.declared_align {
        Some(a) if a == 0 || a % min_align != 0 => {
            return Err(LayoutError::BadDeclaredAlignment {
                span: defn.span,
                declared: a,
                min: min_align,
            });
        }
        Some(a) => a,
        None => min_align,
    };
    debug!("ByteSize({}) = {byte_size}, alignment={alignment}", defn.name);

    Ok(Some(LayoutInfo::Struct(StructLayout {
        byte_size,
        alignment,
        fields,
    })))
}

/// Size (possibly polymorphic) and alignment for one area declaration.
fn calc_area_layout(
    defns: &[Defn],
    pool: &NatPool,
    out: &UnitLayouts,
    defn: &Defn,
    a: &AreaDefn,
    strict: bool,
) -> Result<Option<LayoutInfo>, LayoutError> {
    let size_idx = byte_size_of(defns, &a.ty, defn.span)?;
    let byte_size = pool.value(size_idx);
    let align = match alignment_of(defns, out, &a.ty) {
        Some(al) if al > 0 => al,
        Some(_) | None if strict => {
            return Err(LayoutError::AlignmentNotDetermined {
                span: defn.span,
                ty: describe_area_ty(defns, &a.ty),
            });
        }
        Some(_) | None => return Ok(None),
    };
    let alignment = match a.declared_align {
        Some(d) if d == 0 || d % align != 0 => {
            return Err(LayoutError::BadDeclaredAlignment {
                span: defn.span,
                declared: d,
                min: align,
            });
        }
        Some(d) => d,
        None => align,
    };
    debug!(
        "area {}: size={byte_size:?}, alignment={alignment}",
        defn.name
    );
    Ok(Some(LayoutInfo::Area(AreaLayout {
        byte_size,
        alignment,
    })))
}

/// Least common multiple of two alignments.
fn lcm(a: u64, b: u64) -> u64 {
    a * (b / gcd(a, b))
}

/// Greatest common divisor of two alignments.
fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b > 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lcm_of_common_alignments() {
        assert_eq!(lcm(1, 4), 4);
        assert_eq!(lcm(4, 8), 8);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(8, 8), 8);
    }
}
