//! Width-indexed sets of bit vectors.

use std::fmt;

use crate::bdd::Bdd;
use crate::mask_test::{MaskOp, MaskTest};

/// Maximum number of `01_` lines rendered for one pattern.
const SHOW_LINES: usize = 10;

/// An immutable set of bit vectors of a fixed width.
///
/// Two patterns are comparable (equal, intersected, unioned, checked for
/// disjointness) only at the same width; mixing widths is a logic error
/// and is caught by debug assertions.
#[derive(Clone)]
pub struct Pat {
    pub(crate) width: u32,
    pub(crate) bdd: Bdd,
}

impl Pat {
    /// The pattern containing every vector of the given width.
    pub fn all(width: u32) -> Pat {
        Pat {
            width,
            bdd: Bdd::constant(true),
        }
    }

    /// The pattern containing no vector of the given width.
    pub fn empty(width: u32) -> Pat {
        Pat {
            width,
            bdd: Bdd::constant(false),
        }
    }

    /// The singleton set `{value}` in bits `[offset, offset + width)`,
    /// with the `offset` low bits left unconstrained. The result has
    /// width `width + offset`; `value` is taken modulo `2^width`.
    pub fn literal(width: u32, value: u128, offset: u32) -> Pat {
        Pat {
            width: width + offset,
            bdd: Bdd::literal(width, value, offset),
        }
    }

    /// The singleton zero pattern of the given width.
    pub fn zero(width: u32) -> Pat {
        Pat::literal(width, 0, 0)
    }

    /// Every nonzero vector of the given width.
    pub fn nonzero(width: u32) -> Pat {
        Pat::zero(width).not()
    }

    /// Unsigned vectors of the given width strictly greater than `val`.
    pub fn greater(width: u32, val: u128) -> Pat {
        if width < 128 && val >= 1u128 << width {
            return Pat::empty(width);
        }
        let mut bdd = Bdd::constant(false);
        let mut val = val;
        for i in 0..width {
            if val & 1 == 0 {
                bdd = Bdd::literal(1, 1, i).ite(&Bdd::constant(true), &bdd);
            } else if !bdd.is_const(false) {
                bdd = Bdd::literal(1, 1, i).ite(&bdd, &Bdd::constant(false));
            }
            val >>= 1;
        }
        Pat { width, bdd }
    }

    /// Unsigned vectors greater than or equal to `val`.
    pub fn greater_eq(width: u32, val: u128) -> Pat {
        if val == 0 {
            Pat::all(width)
        } else {
            Pat::greater(width, val - 1)
        }
    }

    /// Unsigned vectors strictly less than `val`.
    pub fn less(width: u32, val: u128) -> Pat {
        Pat::greater_eq(width, val).not()
    }

    /// Unsigned vectors less than or equal to `val`.
    pub fn less_eq(width: u32, val: u128) -> Pat {
        Pat::greater(width, val).not()
    }

    /// The width of this pattern in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// True iff this pattern is the full universe of its width.
    pub fn is_all(&self) -> bool {
        self.bdd.is_const(true)
    }

    /// True iff this pattern contains no vector.
    pub fn is_empty(&self) -> bool {
        self.bdd.is_const(false)
    }

    /// Number of vectors in the set, for diagnostics. Saturates at
    /// `u128::MAX` (reachable only for the full 128-bit universe).
    pub fn size(&self) -> u128 {
        if self.width == 0 {
            0
        } else {
            self.bdd.size(self.width)
        }
    }

    /// Set complement within this width.
    #[must_use]
    pub fn not(&self) -> Pat {
        Pat {
            width: self.width,
            bdd: self.bdd.not(),
        }
    }

    /// Set intersection. Both patterns must have the same width.
    #[must_use]
    pub fn and(&self, that: &Pat) -> Pat {
        debug_assert_eq!(self.width, that.width);
        Pat {
            width: self.width,
            bdd: self.bdd.and(&that.bdd),
        }
    }

    /// Set union. Both patterns must have the same width.
    #[must_use]
    pub fn or(&self, that: &Pat) -> Pat {
        debug_assert_eq!(self.width, that.width);
        Pat {
            width: self.width,
            bdd: self.bdd.or(&that.bdd),
        }
    }

    /// True iff the two sets (of equal width) share no vector.
    pub fn disjoint(&self, that: &Pat) -> bool {
        debug_assert_eq!(self.width, that.width);
        self.bdd.and(&that.bdd).is_const(false)
    }

    /// True iff every vector of `self` is also in `that`.
    pub fn subset_of(&self, that: &Pat) -> bool {
        debug_assert_eq!(self.width, that.width);
        self.bdd.and(&that.bdd.not()).is_const(false)
    }

    /// Membership test for a single vector.
    pub fn includes(&self, v: u128) -> bool {
        self.bdd.includes(v)
    }

    /// Smallest vector in the set; meaningless for an empty pattern.
    pub fn minimum(&self) -> u128 {
        self.bdd.minimum()
    }

    /// Smallest vector outside the set; meaningless for a full pattern.
    pub fn smallest_outside(&self) -> u128 {
        self.bdd.smallest_outside()
    }

    /// Widen with `padding` unconstrained high bits.
    #[must_use]
    pub fn pad_left(&self, padding: u32) -> Pat {
        Pat {
            width: self.width + padding,
            bdd: self.bdd.clone(),
        }
    }

    /// Widen with unconstrained high bits up to `width`, which must be at
    /// least the current width.
    #[must_use]
    pub fn pad_left_to(&self, width: u32) -> Pat {
        debug_assert!(width >= self.width);
        if width > self.width {
            self.pad_left(width - self.width)
        } else {
            self.clone()
        }
    }

    /// Concatenation: `self` supplies the most significant bits and
    /// `that` the least significant, the Cartesian product of the two
    /// constraint sets. The result has width `self.width + that.width`.
    #[must_use]
    pub fn concat(&self, that: &Pat) -> Pat {
        Pat {
            width: self.width + that.width,
            bdd: self.bdd.shift_left(that.width).and(&that.bdd),
        }
    }

    /// A candidate mask/compare discriminator for this pattern. The
    /// candidate accepts every vector in the pattern but possibly more;
    /// callers must validate it against sibling patterns before use.
    pub fn mask_test(&self, op: MaskOp) -> MaskTest {
        MaskTest::new(self, op)
    }

    /// Render the set as up to [`SHOW_LINES`] lines of `0`/`1`/`_`
    /// characters (most significant bit first), for diagnostics.
    pub fn show_bits(&self) -> Vec<String> {
        let cap = SHOW_LINES.min(self.bdd.count_lines());
        let mut lines = Vec::with_capacity(cap);
        let next = self.bdd.show_bits(self.width, &mut lines, 0, cap);
        if next > cap {
            if let Some(last) = lines.last_mut() {
                *last = format!("etc... ({} more lines)", 1 + next - cap);
            }
        }
        lines
    }
}

impl PartialEq for Pat {
    fn eq(&self, other: &Pat) -> bool {
        self.width == other.width && self.bdd.same(&other.bdd)
    }
}

impl Eq for Pat {}

// Debug shows the width and the `01_` lines, which is what test
// failures need to be readable.
impl fmt::Debug for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pat<{}>{{", self.width)?;
        for (i, line) in self.show_bits().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{line}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    /// Union-of-literals pattern over 8 bits, driven by an arbitrary
    /// byte list; empty input gives the empty pattern.
    fn pat8(vals: &[u8]) -> Pat {
        vals.iter().fold(Pat::empty(8), |acc, &v| {
            acc.or(&Pat::literal(8, u128::from(v), 0))
        })
    }

    #[test]
    fn all_and_empty() {
        assert!(Pat::all(8).is_all());
        assert!(!Pat::empty(8).is_all());
        assert!(Pat::empty(8).is_empty());
        assert_eq!(Pat::all(8).size(), 256);
        assert_eq!(Pat::empty(8).size(), 0);
    }

    #[test]
    fn literal_constrains_only_its_range() {
        // Bits [6, 8) = 0b10, bits [0, 6) free.
        let p = Pat::literal(2, 0b10, 6);
        assert_eq!(p.width(), 8);
        assert_eq!(p.size(), 64);
        assert!(p.includes(0b1000_0000));
        assert!(p.includes(0b1011_1111));
        assert!(!p.includes(0b1100_0000));
    }

    #[test]
    fn concat_is_cartesian() {
        let hi = Pat::literal(2, 0b01, 0);
        let lo = Pat::literal(3, 0b110, 0);
        let p = hi.concat(&lo);
        assert_eq!(p.width(), 5);
        assert_eq!(p.size(), 1);
        assert!(p.includes(0b01_110));
    }

    #[test]
    fn concat_width_composes_associatively() {
        let a = Pat::literal(2, 1, 0);
        let b = Pat::all(3);
        let c = Pat::literal(1, 0, 0);
        let left = a.concat(&b).concat(&c);
        let right = a.concat(&b.concat(&c));
        assert_eq!(left, right);
        assert_eq!(left.width(), 6);
    }

    #[test]
    fn range_patterns() {
        let less = Pat::less(8, 54);
        let gte = Pat::greater_eq(8, 54);
        assert!(less.disjoint(&gte));
        assert!(less.or(&gte).is_all());
        assert_eq!(less.size(), 54);
        assert!(less.includes(53));
        assert!(!less.includes(54));
        assert_eq!(gte.minimum(), 54);
        assert_eq!(less.smallest_outside(), 54);
    }

    #[test]
    fn greater_of_max_is_empty() {
        assert!(Pat::greater(4, 15).is_empty());
        assert!(Pat::greater(4, 200).is_empty());
        assert!(Pat::less_eq(4, 15).is_all());
    }

    #[test]
    fn nonzero_excludes_exactly_zero() {
        let p = Pat::nonzero(5);
        assert!(!p.includes(0));
        assert_eq!(p.size(), 31);
        assert_eq!(p.minimum(), 1);
        assert_eq!(p.smallest_outside(), 0);
    }

    #[test]
    fn incremental_range_construction() {
        // Stripping 0..i from the universe leaves exactly >= i, and
        // accumulating 0..i builds exactly < i.
        let mut a = Pat::all(8);
        let mut e = Pat::empty(8);
        for i in 0..=255u128 {
            assert_eq!(a, Pat::greater_eq(8, i));
            assert_eq!(e, Pat::less(8, i));
            a = a.and(&Pat::literal(8, i, 0).not());
            e = e.or(&Pat::literal(8, i, 0));
        }
    }

    #[test]
    fn show_bits_renders_fixed_and_free_positions() {
        let p = Pat::literal(2, 0b10, 6);
        assert_eq!(p.show_bits(), vec!["10______".to_string()]);
        assert_eq!(Pat::empty(4).show_bits(), Vec::<String>::new());
        assert_eq!(Pat::all(4).show_bits(), vec!["____".to_string()]);
    }

    proptest! {
        #[test]
        fn or_is_commutative_and_idempotent(
            xs in proptest::collection::vec(any::<u8>(), 0..6),
            ys in proptest::collection::vec(any::<u8>(), 0..6),
        ) {
            let p = pat8(&xs);
            let q = pat8(&ys);
            prop_assert!(p.or(&q) == q.or(&p));
            prop_assert!(p.or(&p) == p);
        }

        #[test]
        fn or_is_associative(
            xs in proptest::collection::vec(any::<u8>(), 0..5),
            ys in proptest::collection::vec(any::<u8>(), 0..5),
            zs in proptest::collection::vec(any::<u8>(), 0..5),
        ) {
            let p = pat8(&xs);
            let q = pat8(&ys);
            let r = pat8(&zs);
            prop_assert!(p.or(&q).or(&r) == p.or(&q.or(&r)));
        }

        #[test]
        fn and_distributes_over_or(
            xs in proptest::collection::vec(any::<u8>(), 0..5),
            ys in proptest::collection::vec(any::<u8>(), 0..5),
            zs in proptest::collection::vec(any::<u8>(), 0..5),
        ) {
            let p = pat8(&xs);
            let q = pat8(&ys);
            let r = pat8(&zs);
            prop_assert!(p.and(&q.or(&r)) == p.and(&q).or(&p.and(&r)));
        }

        #[test]
        fn double_negation_is_identity(
            xs in proptest::collection::vec(any::<u8>(), 0..6),
        ) {
            let p = pat8(&xs);
            prop_assert!(p.not().not() == p);
        }

        #[test]
        fn disjoint_iff_intersection_empty(
            xs in proptest::collection::vec(any::<u8>(), 0..6),
            ys in proptest::collection::vec(any::<u8>(), 0..6),
        ) {
            let p = pat8(&xs);
            let q = pat8(&ys);
            prop_assert_eq!(p.disjoint(&q), p.and(&q) == Pat::empty(8));
        }

        #[test]
        fn size_counts_distinct_members(
            xs in proptest::collection::vec(any::<u8>(), 0..8),
        ) {
            let p = pat8(&xs);
            let mut distinct = xs.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(p.size(), distinct.len() as u128);
            for v in distinct {
                prop_assert!(p.includes(u128::from(v)));
            }
        }
    }
}
