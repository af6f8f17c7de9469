use std::fmt;

/// Machine-readable error codes for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    CycleDetected,
    StructureInvalid,
    MissingRequirement,
    UnexpectedItemType,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::CycleDetected => "E2003",
            Self::StructureInvalid => "E2101",
            Self::MissingRequirement => "E2102",
            Self::UnexpectedItemType => "E9101",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Sort options parse error",
            Self::CycleDetected => "Dependency cycle detected",
            Self::StructureInvalid => "Invalid item structure",
            Self::MissingRequirement => "Required item not registered",
            Self::UnexpectedItemType => "Unexpected item type",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix the [sort] table of the options file and retry."),
            Self::CycleDetected => {
                Some("Remove one relation of the reported path to make the graph acyclic.")
            }
            Self::StructureInvalid => {
                Some("Check container, group and generalization declarations of the listed items.")
            }
            Self::MissingRequirement => {
                Some("Register the missing item or mark the requirement optional with '?'.")
            }
            Self::UnexpectedItemType => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures that abort a sort. Data problems are issues, never errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortError {
    /// A registered item is not of the type a typed sort was asked for.
    #[error("item '{full_name}' is not a {expected}")]
    UnexpectedItemType {
        full_name: String,
        expected: &'static str,
    },
}

impl SortError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnexpectedItemType { .. } => ErrorCode::UnexpectedItemType,
        }
    }
}
