use std::fmt;

use crate::error::Result;
use crate::memory::ForeignRef;
use crate::ndt::{promote_types_arithmetic, Type};

/// Value
///
/// A plain Rust representation of array contents, used to fill arrays and
/// to read them back. Scalars, nested lists (dimensions) and records
/// (structs) map directly onto the type tree.
///
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Object(Option<ForeignRef>),
}

impl Value {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    /// Deduce the type an array built from this value should have.
    ///
    /// Integers become `int32` when they fit and `int64` otherwise, floats
    /// `float64`. Lists of equally sized elements become fixed dimensions,
    /// ragged lists var dimensions, and element types are promoted to a
    /// common type.
    ///
    /// ```
    /// use ndview::array::Value;
    ///
    /// let v = Value::from(vec![vec![1, 2], vec![3, 4]]);
    /// assert_eq!(v.deduce_type().unwrap().to_string(), "2 * 2 * int32");
    /// ```
    ///
    pub fn deduce_type(&self) -> Result<Type> {
        match self {
            Value::Bool(_) => Ok(Type::bool()),
            Value::Int(i) if i32::try_from(*i).is_ok() => Ok(Type::int32()),
            Value::Int(_) => Ok(Type::int64()),
            Value::UInt(_) => Ok(Type::uint64()),
            Value::Float(_) => Ok(Type::float64()),
            Value::String(_) => Ok(Type::string()),
            Value::Bytes(_) => Ok(Type::bytes()),
            Value::Object(_) => Ok(Type::object()),
            Value::Struct(fields) => Type::make_struct(
                fields
                    .iter()
                    .map(|(name, v)| Ok((name.clone(), v.deduce_type()?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::List(items) => {
                let types = items
                    .iter()
                    .map(|v| v.deduce_type())
                    .collect::<Result<Vec<_>>>()?;
                let Some(first) = types.first() else {
                    return Ok(Type::fixed_dim(0, Type::int32()));
                };
                let ragged = types.iter().any(|t| t.shape() != first.shape());
                let dtype = types[1..]
                    .iter()
                    .try_fold(first.dtype().clone(), |acc, t| common_dtype(&acc, t.dtype()))?;
                let element = if ragged {
                    let ndim = types.iter().map(|t| t.ndim()).min().unwrap_or(0);
                    (0..ndim).fold(dtype, |el, _| Type::var_dim(el))
                } else {
                    first.with_replaced_dtype(dtype)
                };
                if ragged {
                    Ok(Type::var_dim(element))
                } else {
                    Ok(Type::fixed_dim(items.len(), element))
                }
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Value::List(items) => format!("a list of {} values", items.len()),
            Value::Struct(_) => "a struct value".to_string(),
            Value::Object(_) => "an object".to_string(),
            other => other.to_string(),
        }
    }
}

fn common_dtype(a: &Type, b: &Type) -> Result<Type> {
    if a == b {
        return Ok(a.clone());
    }
    match (a.as_scalar(), b.as_scalar()) {
        (Some(_), Some(_)) => promote_types_arithmetic(a, b),
        // mixed non-numeric elements fall back to opaque object slots
        _ => Ok(Type::object()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Bool(l), Bool(r)) => l == r,
            (Int(l), Int(r)) => l == r,
            (UInt(l), UInt(r)) => l == r,
            (Int(l), UInt(r)) | (UInt(r), Int(l)) => u64::try_from(*l).is_ok_and(|l| l == *r),
            (Float(l), Float(r)) => l == r,
            (String(l), String(r)) => l == r,
            (Bytes(l), Bytes(r)) => l == r,
            (List(l), List(r)) => l == r,
            (Struct(l), Struct(r)) => l == r,
            (Object(l), Object(r)) => l == r,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Object(None) => write!(f, "None"),
            Value::Object(Some(obj)) => write!(f, "{obj:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, item)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! value_from {
    ($variant:ident, $as:ty, $($from:ty),*) => {
        $(
            impl From<$from> for Value {
                fn from(x: $from) -> Self {
                    Value::$variant(x as $as)
                }
            }
        )*
    };
}

value_from!(Int, i64, i8, i16, i32, i64, isize);
value_from!(UInt, u64, u8, u16, u32, u64, usize);
value_from!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::String(x.to_string())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::String(x)
    }
}

impl From<ForeignRef> for Value {
    fn from(x: ForeignRef) -> Self {
        Value::Object(Some(x))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(x: Vec<T>) -> Self {
        Value::List(x.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, T: Into<Value>> FromIterator<(S, T)> for Value {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Value::Struct(
            iter.into_iter()
                .map(|(name, v)| (name.into(), v.into()))
                .collect(),
        )
    }
}
