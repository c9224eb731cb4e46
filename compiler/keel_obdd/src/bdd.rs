//! Ordered binary decision diagrams over bit indices.
//!
//! The invariant throughout: a branch node testing bit `var` has children
//! that only test bits strictly below `var`. Everything here preserves it,
//! so structural equality of diagrams coincides with equality of the
//! boolean functions (and hence of the vector sets) they denote.

use std::rc::Rc;

/// Handle to an immutable, structurally shared decision diagram.
#[derive(Clone)]
pub(crate) struct Bdd(Rc<Node>);

enum Node {
    /// Constant formula; `true` accepts every vector.
    Const(bool),
    /// Branch on bit `var`.
    Ite {
        var: u32,
        if_true: Bdd,
        if_false: Bdd,
    },
}

/// Shift left without wrapping; saturates at `u128::MAX`.
fn shl_sat(x: u128, shift: u32) -> u128 {
    if x == 0 {
        0
    } else if shift > x.leading_zeros() {
        u128::MAX
    } else {
        x << shift
    }
}

impl Bdd {
    pub(crate) fn constant(val: bool) -> Bdd {
        Bdd(Rc::new(Node::Const(val)))
    }

    fn branch(var: u32, if_true: Bdd, if_false: Bdd) -> Bdd {
        Bdd(Rc::new(Node::Ite {
            var,
            if_true,
            if_false,
        }))
    }

    /// Test whether this diagram is the given constant.
    pub(crate) fn is_const(&self, val: bool) -> bool {
        matches!(&*self.0, Node::Const(v) if *v == val)
    }

    /// The highest bit index tested at the root, or 0 for a constant.
    fn test_var(&self) -> u32 {
        match &*self.0 {
            Node::Const(_) => 0,
            Node::Ite { var, .. } => *var,
        }
    }

    /// Specialize for `bit var = val`. Assumes every test in `self` is at
    /// most `var`; if the root tests a lower bit the whole diagram is
    /// independent of `var` and is returned unchanged.
    fn with(&self, var: u32, val: bool) -> Bdd {
        match &*self.0 {
            Node::Ite {
                var: v,
                if_true,
                if_false,
            } if *v == var => {
                if val {
                    if_true.clone()
                } else {
                    if_false.clone()
                }
            }
            _ => self.clone(),
        }
    }

    /// Smart constructor: `c.ite(t, f)` denotes `if c then t else f`,
    /// keeping the ordering invariant and eliding the test when both
    /// branches come out equal.
    pub(crate) fn ite(&self, if_true: &Bdd, if_false: &Bdd) -> Bdd {
        match &*self.0 {
            Node::Const(true) => if_true.clone(),
            Node::Const(false) => if_false.clone(),
            Node::Ite { .. } => {
                // Branch on the highest bit tested by any of the three
                // inputs, then recurse on both specializations.
                let var = self
                    .test_var()
                    .max(if_true.test_var())
                    .max(if_false.test_var());
                let t = self
                    .with(var, true)
                    .ite(&if_true.with(var, true), &if_false.with(var, true));
                let f = self
                    .with(var, false)
                    .ite(&if_true.with(var, false), &if_false.with(var, false));
                if t.same(&f) {
                    t
                } else {
                    Bdd::branch(var, t, f)
                }
            }
        }
    }

    pub(crate) fn not(&self) -> Bdd {
        self.ite(&Bdd::constant(false), &Bdd::constant(true))
    }

    pub(crate) fn and(&self, that: &Bdd) -> Bdd {
        self.ite(that, &Bdd::constant(false))
    }

    pub(crate) fn or(&self, that: &Bdd) -> Bdd {
        self.ite(&Bdd::constant(true), that)
    }

    /// Structural equality, with a pointer-identity fast path.
    pub(crate) fn same(&self, that: &Bdd) -> bool {
        if Rc::ptr_eq(&self.0, &that.0) {
            return true;
        }
        match (&*self.0, &*that.0) {
            (Node::Const(a), Node::Const(b)) => a == b,
            (
                Node::Ite {
                    var: va,
                    if_true: ta,
                    if_false: fa,
                },
                Node::Ite {
                    var: vb,
                    if_true: tb,
                    if_false: fb,
                },
            ) => va == vb && ta.same(tb) && fa.same(fb),
            _ => false,
        }
    }

    /// Membership test for a single vector.
    pub(crate) fn includes(&self, v: u128) -> bool {
        match &*self.0 {
            Node::Const(val) => *val,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if (v >> var) & 1 == 1 {
                    if_true.includes(v)
                } else {
                    if_false.includes(v)
                }
            }
        }
    }

    /// Smallest vector in the set. Assumes the set is non-empty.
    pub(crate) fn minimum(&self) -> u128 {
        match &*self.0 {
            Node::Const(_) => 0,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if if_false.is_const(false) {
                    (1u128 << var) | if_true.minimum()
                } else {
                    if_false.minimum()
                }
            }
        }
    }

    /// Smallest vector *not* in the set. Assumes the complement is
    /// non-empty.
    pub(crate) fn smallest_outside(&self) -> u128 {
        match &*self.0 {
            Node::Const(_) => 0,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if if_false.is_const(true) {
                    (1u128 << var) | if_true.smallest_outside()
                } else {
                    if_false.smallest_outside()
                }
            }
        }
    }

    /// Number of vectors of the given width in the set, saturating at
    /// `u128::MAX` (only reachable for the full 128-bit universe).
    pub(crate) fn size(&self, width: u32) -> u128 {
        match &*self.0 {
            Node::Const(val) => {
                if *val {
                    shl_sat(1, width)
                } else {
                    0
                }
            }
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                let both = if_true
                    .size(*var)
                    .saturating_add(if_false.size(*var));
                shl_sat(both, width - 1 - var)
            }
        }
    }

    /// Copy of this diagram with every bit index incremented by `padding`.
    pub(crate) fn shift_left(&self, padding: u32) -> Bdd {
        match &*self.0 {
            Node::Const(_) => self.clone(),
            Node::Ite {
                var,
                if_true,
                if_false,
            } => Bdd::branch(
                var + padding,
                if_true.shift_left(padding),
                if_false.shift_left(padding),
            ),
        }
    }

    /// Check the variable ordering invariant below the given bound.
    #[cfg(test)]
    pub(crate) fn ordered(&self, width: u32) -> bool {
        match &*self.0 {
            Node::Const(_) => true,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => *var < width && if_false.ordered(*var) && if_true.ordered(*var),
        }
    }

    /// Diagram for the singleton set `{value}` over bits
    /// `[offset, offset + width)`, with all other bits unconstrained.
    pub(crate) fn literal(width: u32, value: u128, offset: u32) -> Bdd {
        let mut bdd = Bdd::constant(true);
        for i in 0..width {
            let var = offset + i;
            bdd = if (value >> i) & 1 == 1 {
                Bdd::branch(var, bdd, Bdd::constant(false))
            } else {
                Bdd::branch(var, Bdd::constant(false), bdd)
            };
        }
        bdd
    }

    // The remaining operations assume a diagram in "mask-test shape":
    // every branch node has one constant child, so the accepted (for an
    // equality test) or rejected (inequality) vectors form a single cube
    // that a mask/compare pair can describe exactly. `op` selects the
    // shape: `false` for equality tests, `true` for inequality.

    /// Bits tested along the spine of a mask-test-shaped diagram.
    pub(crate) fn mask(&self, op: bool) -> u128 {
        match &*self.0 {
            Node::Const(_) => 0,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                let child = if if_false.is_const(op) {
                    if_true
                } else {
                    if_false
                };
                child.mask(op) | (1u128 << var)
            }
        }
    }

    /// Expected values of the tested bits of a mask-test-shaped diagram.
    pub(crate) fn bits(&self, op: bool) -> u128 {
        match &*self.0 {
            Node::Const(_) => 0,
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if if_false.is_const(op) {
                    if_true.bits(op) | (1u128 << var)
                } else {
                    if_false.bits(op)
                }
            }
        }
    }

    /// Weaken this diagram into mask-test shape: tests where one branch
    /// is the constant `op` are kept, any other test is dropped by
    /// unioning its branches. The result accepts a superset of the
    /// original set, so it is only a *candidate* discriminator and must
    /// be validated against sibling patterns.
    pub(crate) fn mask_test(&self, op: bool) -> Bdd {
        match &*self.0 {
            Node::Const(_) => self.clone(),
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if if_true.is_const(op) {
                    Bdd::branch(*var, if_true.clone(), if_false.mask_test(op))
                } else if if_false.is_const(op) {
                    Bdd::branch(*var, if_true.mask_test(op), if_false.clone())
                } else {
                    if_true.or(if_false).mask_test(op)
                }
            }
        }
    }

    /// Drop the root test by unioning its branches, widening the set.
    /// Returns `None` on a constant (nothing left to blur away).
    pub(crate) fn blur(&self) -> Option<Bdd> {
        match &*self.0 {
            Node::Const(_) => None,
            Node::Ite {
                if_true, if_false, ..
            } => Some(if_true.or(if_false)),
        }
    }

    /// Total number of lines a full textual rendering would need.
    pub(crate) fn count_lines(&self) -> usize {
        match &*self.0 {
            Node::Const(val) => usize::from(*val),
            Node::Ite {
                if_true, if_false, ..
            } => if_true.count_lines() + if_false.count_lines(),
        }
    }

    /// Render this diagram as `01_` lines into `lines`, which holds at
    /// most `cap` entries; returns the logical next line index so callers
    /// can detect truncation. `lines.len()` must equal `min(next, cap)`.
    pub(crate) fn show_bits(
        &self,
        width: u32,
        lines: &mut Vec<String>,
        next: usize,
        cap: usize,
    ) -> usize {
        match &*self.0 {
            Node::Const(false) => next,
            Node::Const(true) => {
                if next < cap {
                    lines.push("_".repeat(width as usize));
                }
                next + 1
            }
            Node::Ite {
                var,
                if_true,
                if_false,
            } => {
                if width - 1 > *var {
                    // The leading bit is unconstrained here.
                    let end = self.show_bits(width - 1, lines, next, cap);
                    let len = lines.len();
                    for line in &mut lines[next.min(len)..] {
                        line.insert(0, '_');
                    }
                    end
                } else {
                    let end_false = if_false.show_bits(width - 1, lines, next, cap);
                    let end_true = if_true.show_bits(width - 1, lines, end_false, cap);
                    let len = lines.len();
                    for line in &mut lines[next.min(len)..end_false.min(len)] {
                        line.insert(0, '0');
                    }
                    for line in &mut lines[end_false.min(len)..end_true.min(len)] {
                        line.insert(0, '1');
                    }
                    end_true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ite_collapses_equal_branches() {
        let t = Bdd::constant(true);
        let cond = Bdd::literal(1, 1, 0);
        assert!(cond.ite(&t, &t).is_const(true));
    }

    #[test]
    fn literal_includes_only_its_value() {
        let bdd = Bdd::literal(3, 0b101, 0);
        assert!(bdd.includes(0b101));
        assert!(!bdd.includes(0b100));
        assert!(!bdd.includes(0b111));
        assert_eq!(bdd.size(3), 1);
        assert_eq!(bdd.minimum(), 0b101);
    }

    #[test]
    fn literal_at_offset_leaves_low_bits_free() {
        let bdd = Bdd::literal(2, 0b10, 4);
        // Bits 4..6 fixed to 10, bits 0..4 free.
        assert!(bdd.includes(0b10_0000));
        assert!(bdd.includes(0b10_1111));
        assert!(!bdd.includes(0b01_0000));
        assert_eq!(bdd.size(6), 16);
    }

    #[test]
    fn ordering_invariant_survives_combination() {
        let a = Bdd::literal(4, 3, 0);
        let b = Bdd::literal(2, 1, 2);
        assert!(a.or(&b).ordered(4));
        assert!(a.and(&b.not()).ordered(4));
        assert!(a.shift_left(5).ordered(9));
    }

    #[test]
    fn size_saturates_at_full_universe() {
        assert_eq!(Bdd::constant(true).size(128), u128::MAX);
        assert_eq!(Bdd::constant(true).size(127), 1u128 << 127);
        assert_eq!(Bdd::constant(false).size(128), 0);
    }

    #[test]
    fn smallest_outside_complements_minimum() {
        let zero = Bdd::literal(3, 0, 0);
        assert_eq!(zero.smallest_outside(), 1);
        assert_eq!(zero.not().minimum(), 1);
        assert_eq!(zero.not().smallest_outside(), 0);
    }
}
