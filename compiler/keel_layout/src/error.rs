//! Layout errors and their diagnostics.

use keel_diagnostic::{Diagnostic, ErrorCode, Span};

/// A named source location, used to point at the declarations involved
/// in a multi-party failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Party {
    pub name: String,
    pub span: Span,
}

impl Party {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Party {
            name: name.into(),
            span,
        }
    }
}

/// Layout failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// A bitdata type's width did not resolve to a concrete value.
    BitSizeNotDetermined { span: Span, name: String },
    /// A computed width is above the supported maximum.
    InvalidWidth { span: Span, name: String, width: u64 },
    /// A tag literal needs more bits than its region provides.
    LiteralOutOfRange { span: Span, value: u128, width: u64 },
    /// A tag region's width did not resolve to a concrete value.
    TagWidthNotDetermined { span: Span },
    /// A field type has no bit-level representation (or its pattern
    /// could not be computed, e.g. a recursive bitdata reference).
    NoBitRepresentation { span: Span, ty: String },
    /// Two constructors of one bitdata type admit overlapping patterns.
    Confusion {
        type_name: String,
        first: Party,
        second: Party,
        /// `01_` rendering of the shared sub-pattern.
        overlap: Vec<String>,
    },
    /// Neither the `==` nor the `!=` mask-test candidate rejects every
    /// sibling constructor.
    NoMaskTest {
        ctor: Party,
        eq_conflict: Party,
        neq_conflict: Party,
    },
    /// A synonym chain is cyclic, so no size can ever be assigned.
    CyclicSynonym { span: Span, name: String },

    /// A structure's byte size did not resolve to a concrete value.
    ByteSizeNotDetermined { span: Span, name: String },
    /// A struct field's byte size did not resolve to a concrete value.
    FieldSizeNotDetermined { span: Span, ty: String },
    /// A field type has no byte-level representation.
    NoByteRepresentation { span: Span, ty: String },
    /// The alignment of a field type could not be determined.
    AlignmentNotDetermined { span: Span, ty: String },
    /// A field's alignment does not divide its computed offset.
    OffsetMisaligned {
        span: Span,
        field: String,
        offset: u64,
        align: u64,
    },
    /// A declared alignment is not a multiple of the minimal alignment
    /// required by the fields.
    BadDeclaredAlignment { span: Span, declared: u64, min: u64 },
}

impl LayoutError {
    /// Convert to a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LayoutError::BitSizeNotDetermined { span, name } => {
                Diagnostic::error(ErrorCode::E2001)
                    .with_message(format!("bit size of `{name}` is not determined"))
                    .with_label(*span, "no unique width follows from this declaration")
            }
            LayoutError::InvalidWidth { span, name, width } => {
                Diagnostic::error(ErrorCode::E2002)
                    .with_message(format!(
                        "width {width} of `{name}` exceeds the maximum of {} bits",
                        keel_obdd::MAX_WIDTH
                    ))
                    .with_label(*span, "width computed for this declaration")
            }
            LayoutError::LiteralOutOfRange { span, value, width } => {
                Diagnostic::error(ErrorCode::E2003)
                    .with_message(format!(
                        "tag literal {value} does not fit in {width} bit{}",
                        if *width == 1 { "" } else { "s" }
                    ))
                    .with_label(*span, "literal too wide for its region")
            }
            LayoutError::TagWidthNotDetermined { span } => Diagnostic::error(ErrorCode::E2001)
                .with_message("width of tag bits is not determined")
                .with_label(*span, "no unique width follows for these tag bits"),
            LayoutError::NoBitRepresentation { span, ty } => Diagnostic::error(ErrorCode::E2004)
                .with_message(format!("type `{ty}` has no bit-level representation"))
                .with_label(*span, "field type used here"),
            LayoutError::Confusion {
                type_name,
                first,
                second,
                overlap,
            } => {
                let mut diag = Diagnostic::error(ErrorCode::E2005)
                    .with_message(format!(
                        "constructors `{}` and `{}` of `{type_name}` have overlapping bit patterns",
                        first.name, second.name
                    ))
                    .with_label(first.span, format!("constructor `{}`", first.name))
                    .with_secondary_label(second.span, format!("constructor `{}`", second.name));
                for line in overlap {
                    diag = diag.with_note(format!("values matching {line} are ambiguous"));
                }
                diag
            }
            LayoutError::NoMaskTest {
                ctor,
                eq_conflict,
                neq_conflict,
            } => {
                let detail = if eq_conflict.name == neq_conflict.name {
                    format!(
                        "the tests using == and != both conflict with `{}`",
                        eq_conflict.name
                    )
                } else {
                    format!(
                        "the test using == conflicts with `{}`, and the test using != conflicts with `{}`",
                        eq_conflict.name, neq_conflict.name
                    )
                };
                Diagnostic::error(ErrorCode::E2006)
                    .with_message(format!(
                        "unable to find a mask test for `{}` ({detail})",
                        ctor.name
                    ))
                    .with_label(ctor.span, format!("constructor `{}`", ctor.name))
                    .with_secondary_label(
                        eq_conflict.span,
                        format!("conflicts with `{}`", eq_conflict.name),
                    )
                    .with_secondary_label(
                        neq_conflict.span,
                        format!("conflicts with `{}`", neq_conflict.name),
                    )
            }
            LayoutError::CyclicSynonym { span, name } => Diagnostic::error(ErrorCode::E2008)
                .with_message(format!("type synonym `{name}` is cyclic"))
                .with_label(*span, "this synonym ultimately refers to itself"),
            LayoutError::ByteSizeNotDetermined { span, name } => {
                Diagnostic::error(ErrorCode::E3001)
                    .with_message(format!("byte size of `{name}` is not determined"))
                    .with_label(*span, "no unique size follows from this declaration")
            }
            LayoutError::FieldSizeNotDetermined { span, ty } => {
                Diagnostic::error(ErrorCode::E3002)
                    .with_message(format!("size of field type `{ty}` is not determined"))
                    .with_label(*span, "field declared here")
            }
            LayoutError::NoByteRepresentation { span, ty } => Diagnostic::error(ErrorCode::E3003)
                .with_message(format!("type `{ty}` has no byte-level representation"))
                .with_label(*span, "field type used here"),
            LayoutError::AlignmentNotDetermined { span, ty } => {
                Diagnostic::error(ErrorCode::E3006)
                    .with_message(format!("alignment of `{ty}` could not be determined"))
                    .with_label(*span, "field declared here")
            }
            LayoutError::OffsetMisaligned {
                span,
                field,
                offset,
                align,
            } => Diagnostic::error(ErrorCode::E3004)
                .with_message(format!(
                    "cannot access field `{field}` (offset {offset} is not divisible by alignment {align})"
                ))
                .with_label(*span, "field placed at a misaligned offset"),
            LayoutError::BadDeclaredAlignment {
                span,
                declared,
                min,
            } => Diagnostic::error(ErrorCode::E3005)
                .with_message(format!(
                    "declared alignment {declared} is not a multiple of the required alignment {min}"
                ))
                .with_label(*span, "alignment declared here"),
        }
    }
}
