//! Linear equations over size expressions, and their solver.

use std::fmt;

use keel_diagnostic::{Diagnostic, ErrorCode, Span};
use smallvec::SmallVec;

use crate::pool::{NatIdx, NatPool};

/// One weighted occurrence of a size variable.
#[derive(Clone, Debug)]
struct Term {
    coeff: i128,
    nat: NatIdx,
    /// Names the quantity for diagnostics (e.g. a field's type).
    label: String,
}

impl Term {
    fn append_to(&self, buf: &mut String) {
        let c = self.coeff.abs();
        if c > 1 {
            buf.push_str(&c.to_string());
            buf.push(' ');
        }
        buf.push_str("Size(");
        buf.push_str(&self.label);
        buf.push(')');
    }
}

/// A linear equation over size expressions.
///
/// Conceptually `sum(coeff * var) = constant`: terms accumulate on the
/// left, constants fold into the right. The term list maintains the
/// invariant that every stored coefficient is non-zero and no variable
/// appears twice ([`LinearEqn::add_term`] merges). Terms whose variable
/// is already known collapse into the constant immediately, so an
/// equation only ever carries genuinely open quantities.
#[derive(Clone, Debug)]
pub struct LinearEqn {
    span: Span,
    terms: SmallVec<[Term; 4]>,
    rhs: i128,
}

impl LinearEqn {
    /// Create an empty equation attributed to the given declaration.
    pub fn new(span: Span) -> Self {
        LinearEqn {
            span,
            terms: SmallVec::new(),
            rhs: 0,
        }
    }

    /// Source position of the declaration this equation came from.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Add a constant to the left hand side (implemented by subtracting
    /// it from the right).
    pub fn add_const(&mut self, c: i128) {
        self.rhs -= c;
    }

    /// Add `coeff * nat` to the left hand side. A known size collapses
    /// to a constant; an open variable is merged into the term list,
    /// dropping the entry if its combined coefficient reaches zero.
    pub fn add_term(&mut self, coeff: i128, nat: NatIdx, label: &str, pool: &NatPool) {
        if coeff == 0 {
            return;
        }
        if let Some(v) = pool.value(nat) {
            self.add_const(coeff * i128::from(v));
            return;
        }
        for i in 0..self.terms.len() {
            if self.terms[i].nat == nat {
                let merged = self.terms[i].coeff + coeff;
                if merged == 0 {
                    self.terms.remove(i);
                } else {
                    self.terms[i].coeff = merged;
                }
                return;
            }
        }
        self.terms.push(Term {
            coeff,
            nat,
            label: label.to_string(),
        });
    }

    /// Add `nat` with coefficient one on the right hand side.
    pub fn add_rhs_term(&mut self, nat: NatIdx, label: &str, pool: &NatPool) {
        self.add_term(-1, nat, label, pool);
    }

    /// The coefficient of `nat` in this equation, if it occurs.
    fn coeff_of(&self, nat: NatIdx) -> Option<i128> {
        self.terms
            .iter()
            .find(|t| t.nat == nat)
            .map(|t| t.coeff)
    }

    /// Substitute newly bound variables, then attempt to close the
    /// equation: no open terms must balance exactly, a single open term
    /// determines its variable (which must come out a non-negative
    /// integer), and two or more open terms leave the equation unsolved
    /// (`Ok(false)`).
    fn solved(&mut self, pool: &mut NatPool) -> Result<bool, SolveError> {
        let mut i = 0;
        while i < self.terms.len() {
            if let Some(v) = pool.value(self.terms[i].nat) {
                let t = self.terms.remove(i);
                self.add_const(t.coeff * i128::from(v));
            } else {
                i += 1;
            }
        }

        match self.terms.len() {
            0 => {
                if self.rhs == 0 {
                    Ok(true)
                } else {
                    Err(SolveError::Inconsistent {
                        span: self.span,
                        residual: self.rhs.unsigned_abs(),
                    })
                }
            }
            1 => {
                let (mut coeff, mut rhs) = (self.terms[0].coeff, self.rhs);
                if coeff < 0 {
                    coeff = -coeff;
                    rhs = -rhs;
                }
                if rhs % coeff != 0 || rhs < 0 {
                    return Err(SolveError::Unsatisfiable {
                        span: self.span,
                        eqn: self.to_string(),
                    });
                }
                pool.bind(self.terms[0].nat, (rhs / coeff) as u64);
                self.terms.clear();
                self.rhs = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Rewrite this equation to eliminate the leading variable of `eqn`.
    /// With coefficient `c` there and `d` here, the replacement is
    /// `(c/g) * self - (d/g) * eqn` where `g = gcd(c, d)`, which by
    /// construction no longer mentions that variable. No-op if the
    /// variable does not occur here.
    fn elim_var(&mut self, eqn: &LinearEqn, pool: &NatPool) {
        let Some(lead) = eqn.terms.first() else {
            return;
        };
        let Some(d) = self.coeff_of(lead.nat) else {
            return;
        };
        let c = lead.coeff;
        let g = gcd(c, d);
        let c = c / g;
        let d = d / g;

        self.rhs *= c;
        for t in &mut self.terms {
            t.coeff *= c;
        }
        self.add_const(eqn.rhs * d);
        for t in &eqn.terms {
            self.add_term(t.coeff * -d, t.nat, &t.label, pool);
        }
    }
}

impl fmt::Display for LinearEqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Positive terms (and a negative constant) print on the left,
        // negative terms (and a positive constant) on the right.
        let mut lhs = String::new();
        for t in self.terms.iter().filter(|t| t.coeff > 0) {
            if !lhs.is_empty() {
                lhs.push_str(" + ");
            }
            t.append_to(&mut lhs);
        }
        if self.rhs < 0 {
            if !lhs.is_empty() {
                lhs.push_str(" + ");
            }
            lhs.push_str(&(-self.rhs).to_string());
        }
        if lhs.is_empty() {
            lhs.push('0');
        }

        let mut rhs = String::new();
        for t in self.terms.iter().filter(|t| t.coeff < 0) {
            if !rhs.is_empty() {
                rhs.push_str(" + ");
            }
            t.append_to(&mut rhs);
        }
        if self.rhs > 0 {
            if !rhs.is_empty() {
                rhs.push_str(" + ");
            }
            rhs.push_str(&self.rhs.to_string());
        }
        if rhs.is_empty() {
            rhs.push('0');
        }

        write!(f, "{lhs} = {rhs}")
    }
}

/// Greatest common divisor of two non-zero coefficients (always
/// positive).
fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b > 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Failure to solve a batch of equations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveError {
    /// An equation reduced to `0 = residual` with `residual != 0`: two
    /// different sizes are required of the same quantity.
    Inconsistent { span: Span, residual: u128 },
    /// A variable is forced to a negative or non-integral value.
    Unsatisfiable { span: Span, eqn: String },
    /// The system leaves an equation with several open variables even
    /// after elimination: multiple solutions exist.
    MultipleSolutions { span: Span, eqn: String },
}

impl SolveError {
    /// Convert to a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            SolveError::Inconsistent { span, residual } => Diagnostic::error(ErrorCode::E1001)
                .with_message(format!("sizes differ by {residual}"))
                .with_label(*span, "sizes required by this declaration do not agree"),
            SolveError::Unsatisfiable { span, eqn } => Diagnostic::error(ErrorCode::E1002)
                .with_message(format!("cannot satisfy {eqn}"))
                .with_label(*span, "no non-negative integer size satisfies this declaration"),
            SolveError::MultipleSolutions { span, eqn } => Diagnostic::error(ErrorCode::E1003)
                .with_message(format!("multiple solutions for {eqn}"))
                .with_label(*span, "sizes in this declaration are not uniquely determined"),
        }
    }
}

/// Solve a batch of equations, binding every variable the system
/// determines uniquely.
///
/// Equations that close immediately are retired; any other equation has
/// its leading variable eliminated from the rest of the batch and is
/// deferred. Deferred equations are re-checked (most recent first, so
/// the triangular system back-substitutes) once the queue drains; one
/// that still has several open variables admits multiple solutions.
///
/// Redundant but consistent equations close as `0 = 0` and never fail.
/// Variables mentioned by no equation simply stay unbound.
pub fn solve(eqns: Vec<LinearEqn>, pool: &mut NatPool) -> Result<(), SolveError> {
    let mut queue = eqns;
    queue.reverse();
    let mut deferred: Vec<LinearEqn> = Vec::new();
    while let Some(mut eqn) = queue.pop() {
        if eqn.solved(pool)? {
            continue;
        }
        for rest in &mut queue {
            rest.elim_var(&eqn, pool);
        }
        deferred.push(eqn);
    }
    for mut eqn in deferred.into_iter().rev() {
        if !eqn.solved(pool)? {
            return Err(SolveError::MultipleSolutions {
                span: eqn.span(),
                eqn: eqn.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn span(n: u32) -> Span {
        Span::new(n, n + 1)
    }

    #[test]
    fn single_variable_is_assigned() {
        // 4 + x + 4 = 12  =>  x = 4
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let total = pool.lit(12);
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_const(4);
        eqn.add_term(1, x, "x", &pool);
        eqn.add_const(4);
        eqn.add_rhs_term(total, "total", &pool);
        solve(vec![eqn], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(4));
    }

    #[test]
    fn coefficient_division_must_be_exact() {
        // 3x = 8 has no integer solution.
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_term(3, x, "x", &pool);
        eqn.add_const(-8);
        let err = solve(vec![eqn], &mut pool).unwrap_err();
        assert!(matches!(err, SolveError::Unsatisfiable { .. }));
    }

    #[test]
    fn negative_solution_is_rejected() {
        // x + 12 = 8 would need x = -4.
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_term(1, x, "x", &pool);
        eqn.add_const(12);
        eqn.add_const(-8);
        let err = solve(vec![eqn], &mut pool).unwrap_err();
        assert!(matches!(err, SolveError::Unsatisfiable { .. }));
    }

    #[test]
    fn elimination_solves_coupled_system() {
        // x + y = 10, x - y = 4  =>  x = 7, y = 3
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let y = pool.var("y");
        let mut e1 = LinearEqn::new(span(0));
        e1.add_term(1, x, "x", &pool);
        e1.add_term(1, y, "y", &pool);
        e1.add_const(-10);
        let mut e2 = LinearEqn::new(span(1));
        e2.add_term(1, x, "x", &pool);
        e2.add_term(-1, y, "y", &pool);
        e2.add_const(-4);
        solve(vec![e1, e2], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(7));
        assert_eq!(pool.value(y), Some(3));
    }

    #[test]
    fn scaled_coefficients_use_gcd() {
        // 2x + 2y = 10, 4x + 2y = 16  =>  x = 3, y = 2
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let y = pool.var("y");
        let mut e1 = LinearEqn::new(span(0));
        e1.add_term(2, x, "x", &pool);
        e1.add_term(2, y, "y", &pool);
        e1.add_const(-10);
        let mut e2 = LinearEqn::new(span(1));
        e2.add_term(4, x, "x", &pool);
        e2.add_term(2, y, "y", &pool);
        e2.add_const(-16);
        solve(vec![e1, e2], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(3));
        assert_eq!(pool.value(y), Some(2));
    }

    #[test]
    fn redundant_consistent_equations_are_fine() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let mut e1 = LinearEqn::new(span(0));
        e1.add_term(1, x, "x", &pool);
        e1.add_const(-6);
        let mut e2 = LinearEqn::new(span(1));
        e2.add_term(2, x, "x", &pool);
        e2.add_const(-12);
        solve(vec![e1, e2], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(6));
    }

    #[test]
    fn contradictory_equations_are_inconsistent() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let mut e1 = LinearEqn::new(span(0));
        e1.add_term(1, x, "x", &pool);
        e1.add_const(-6);
        let mut e2 = LinearEqn::new(span(1));
        e2.add_term(1, x, "x", &pool);
        e2.add_const(-8);
        let err = solve(vec![e1, e2], &mut pool).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Inconsistent { residual: 2, .. }
        ));
    }

    #[test]
    fn underdetermined_system_reports_multiple_solutions() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let y = pool.var("y");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_term(1, x, "x", &pool);
        eqn.add_term(1, y, "y", &pool);
        eqn.add_const(-10);
        let err = solve(vec![eqn], &mut pool).unwrap_err();
        assert!(matches!(err, SolveError::MultipleSolutions { .. }));
    }

    #[test]
    fn unreferenced_variables_stay_unbound() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let free = pool.var("free");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_term(1, x, "x", &pool);
        eqn.add_const(-6);
        solve(vec![eqn], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(6));
        assert!(pool.is_unresolved(free));
    }

    #[test]
    fn duplicate_variable_terms_merge() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_term(2, x, "x", &pool);
        eqn.add_term(3, x, "x", &pool);
        eqn.add_const(-15);
        solve(vec![eqn], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(3));
    }

    #[test]
    fn known_sizes_collapse_to_constants() {
        let mut pool = NatPool::new();
        let w = pool.lit(7);
        let x = pool.var("x");
        let mut eqn = LinearEqn::new(span(0));
        // 2 fields of width 7 plus a tag of width x make 16 bits.
        eqn.add_term(2, w, "Bit 7", &pool);
        eqn.add_term(1, x, "tag", &pool);
        eqn.add_const(-16);
        solve(vec![eqn], &mut pool).unwrap();
        assert_eq!(pool.value(x), Some(2));
    }

    #[test]
    fn display_splits_terms_by_sign() {
        let mut pool = NatPool::new();
        let x = pool.var("x");
        let s = pool.var("s");
        let mut eqn = LinearEqn::new(span(0));
        eqn.add_const(4);
        eqn.add_term(2, x, "Bit 8", &pool);
        eqn.add_rhs_term(s, "T", &pool);
        assert_eq!(eqn.to_string(), "2 Size(Bit 8) + 4 = Size(T)");
    }
}
