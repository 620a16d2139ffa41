use core::fmt;

use crate::ndt::{Kind, Type};

#[macro_export]
macro_rules! internal_err {
    () => {
        $crate::error::Error::Internal(None, std::file!(), std::line!()).into()
    };
    ( $x:expr ) => {
        $crate::error::Error::Internal(Some($x.to_string()), std::file!(), std::line!()).into()
    };
}

#[macro_export]
macro_rules! err {
    ( $x:expr ) => {
        $crate::error::Error::Other($x.to_string()).into()
    };
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    // handle state
    NullHandle(&'static str),
    Permission(&'static str),

    // indexing
    Bounds {
        index: isize,
        len: usize,
        dim: usize,
    },
    ZeroStep {
        dim: usize,
    },
    TooManyIndices {
        ndim: usize,
        given: usize,
    },
    InvalidSubscript(String),

    // kinds and fields
    UnsupportedKind {
        expected: Kind,
        actual: Type,
    },
    UnsupportedDimension(Type),
    MissingField {
        name: String,
        tp: Type,
    },
    EmptyFieldList,
    DuplicateField(String),

    // sequence generators
    NonScalarOperand(&'static str),
    InvalidCount(String),

    // value conversion
    TypeMismatch {
        value: String,
        tp: Type,
    },
    Overflow {
        value: String,
        tp: Type,
    },
    LossyConversion {
        value: String,
        tp: Type,
    },
    DimensionMismatch {
        expected: usize,
        given: usize,
    },

    // types
    TypeParse(String),

    // resources
    AllocationFailed(Option<usize>),

    Other(String),
    Internal(Option<String>, &'static str, u32),
}

impl Error {
    fn as_str(&self) -> String {
        match self {
            Error::NullHandle(attr) => {
                format!("cannot access attribute '{attr}' of a null array")
            }
            Error::Permission(what) => {
                format!("cannot {what} through an array that is not writable")
            }
            Error::Bounds { index, len, dim } => {
                format!("index {index} is out of bounds for dimension {dim} of length {len}")
            }
            Error::ZeroStep { dim } => {
                format!("slice step cannot be zero (dimension {dim})")
            }
            Error::TooManyIndices { ndim, given } => {
                format!("too many indices: {given} given for an array with {ndim} dimensions")
            }
            Error::InvalidSubscript(s) => format!("invalid subscript: {s}"),
            Error::UnsupportedKind { expected, actual } => format!(
                "expected an array of '{expected}' kind, not '{}' ({actual})",
                actual.kind()
            ),
            Error::UnsupportedDimension(tp) => {
                format!("dimension kind not supported: {tp}")
            }
            Error::MissingField { name, tp } => {
                format!("field name {name:?} does not exist in type {tp}")
            }
            Error::EmptyFieldList => "at least one field name must be specified".to_string(),
            Error::DuplicateField(name) => format!("field name {name:?} is repeated"),
            Error::NonScalarOperand(which) => {
                format!("operand '{which}' must be a scalar")
            }
            Error::InvalidCount(s) => {
                format!("count must be a non-negative integer, got {s}")
            }
            Error::TypeMismatch { value, tp } => {
                format!("cannot assign {value} to a value of type {tp}")
            }
            Error::Overflow { value, tp } => {
                format!("value {value} overflows type {tp}")
            }
            Error::LossyConversion { value, tp } => {
                format!("value {value} cannot be represented exactly as {tp}")
            }
            Error::DimensionMismatch { expected, given } => {
                format!("cannot broadcast {given} values into a dimension of size {expected}")
            }
            Error::TypeParse(s) => format!("malformed type string\n{s}"),
            Error::AllocationFailed(Some(n)) => format!("failed to allocate {n} bytes"),
            Error::AllocationFailed(None) => {
                "failed to allocate: requested size does not fit in memory".to_string()
            }
            Error::Other(s) => s.to_string(),
            Error::Internal(None, file, line) => format!("Internal Error ({file}:{line})"),
            Error::Internal(Some(msg), file, line) => {
                format!("Internal Error ({file}:{line})\n{msg}")
            }
        }
    }

    /// The broad error category, used by the command line to pick an exit
    /// status and by tests to match errors without comparing messages.
    pub fn category(&self) -> &'static str {
        match self {
            Error::NullHandle(_) => "attribute",
            Error::Permission(_) => "permission",
            Error::Bounds { .. } | Error::TooManyIndices { .. } => "index",
            Error::ZeroStep { .. } | Error::InvalidSubscript(_) => "index",
            Error::UnsupportedKind { .. } | Error::UnsupportedDimension(_) => "type",
            Error::MissingField { .. } | Error::EmptyFieldList | Error::DuplicateField(_) => {
                "field"
            }
            Error::NonScalarOperand(_) | Error::InvalidCount(_) => "value",
            Error::TypeMismatch { .. } | Error::Overflow { .. } => "value",
            Error::LossyConversion { .. } | Error::DimensionMismatch { .. } => "value",
            Error::TypeParse(_) => "parse",
            Error::AllocationFailed(_) => "memory",
            Error::Other(_) | Error::Internal(..) => "other",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.as_str())
    }
}

impl std::error::Error for Error {}

impl<T> From<Error> for Result<T> {
    fn from(val: Error) -> Self {
        Err(val)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_message_names_index_length_and_dimension() {
        let e = Error::Bounds {
            index: 7,
            len: 3,
            dim: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("length 3"));
        assert!(msg.contains("dimension 1"));
    }

    #[test]
    fn missing_field_names_field_and_type() {
        let tp: Type = "{x: int32, y: float64}".parse().unwrap();
        let e = Error::MissingField {
            name: "nonexistent".to_string(),
            tp,
        };
        assert_eq!(
            e.to_string(),
            "Error: field name \"nonexistent\" does not exist in type {x : int32, y : float64}"
        );
    }

    #[test]
    fn unsupported_kind_reports_actual_kind() {
        let e = Error::UnsupportedKind {
            expected: Kind::Struct,
            actual: Type::int32(),
        };
        assert!(e.to_string().contains("'sint'"));
    }

    #[test]
    fn err_macro_builds_other() {
        let r: Result<()> = err!("boom");
        assert_eq!(r, Err(Error::Other("boom".to_string())));
    }
}
