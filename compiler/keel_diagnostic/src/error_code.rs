use std::fmt;

/// Error codes for all layout-core diagnostics.
///
/// Format: E#### where the first digit indicates the phase:
/// - E1xxx: size constraint solving
/// - E2xxx: bitdata layout synthesis
/// - E3xxx: struct/area layout
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Solver Errors (E1xxx)
    /// Equation requires two different widths for the same quantity
    E1001,
    /// Equation has no non-negative integer solution
    E1002,
    /// Equation is under-determined (multiple solutions)
    E1003,

    // Bitdata Layout Errors (E2xxx)
    /// Bit size of a type could not be determined
    E2001,
    /// Computed width is outside the supported range
    E2002,
    /// Tag literal does not fit in its region width
    E2003,
    /// Field type has no bit-level representation
    E2004,
    /// Two constructors admit overlapping bit patterns
    E2005,
    /// No mask-test discriminator exists for a constructor
    E2006,
    /// Bitdata type has unclaimed bit combinations (warning)
    E2007,
    /// Type synonym chain forms a cycle
    E2008,

    // Struct/Area Layout Errors (E3xxx)
    /// Byte size of a structure could not be determined
    E3001,
    /// Size of a structure field could not be determined
    E3002,
    /// Field type has no byte-level representation
    E3003,
    /// Field alignment does not divide field offset
    E3004,
    /// Declared alignment is not a multiple of the minimal alignment
    E3005,
    /// Alignment of a field type could not be determined
    E3006,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
