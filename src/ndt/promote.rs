use super::core::Type;
use super::kind::{Kind, ScalarType};
use crate::error::{Error, Result};

/// Integral promotion: everything narrower than `int32` becomes `int32`.
fn promote_integral(st: ScalarType) -> ScalarType {
    use ScalarType::*;
    match st {
        Bool | Int8 | Int16 | UInt8 | UInt16 => Int32,
        other => other,
    }
}

fn rank(st: ScalarType) -> usize {
    use ScalarType::*;
    match st {
        Bool => 0,
        Int8 | UInt8 => 1,
        Int16 | UInt16 => 2,
        Int32 | UInt32 => 3,
        Int64 | UInt64 => 4,
        Float32 => 5,
        Float64 => 6,
    }
}

fn to_unsigned(st: ScalarType) -> ScalarType {
    use ScalarType::*;
    match st {
        Int8 => UInt8,
        Int16 => UInt16,
        Int32 => UInt32,
        Int64 => UInt64,
        other => other,
    }
}

/// Result type of an arithmetic operation between two scalar types.
///
/// Follows the usual arithmetic conversions: narrow integers are first
/// promoted to `int32`, a floating point operand wins over any integer,
/// and mixed signedness resolves to the wider type, or to the unsigned
/// type when both have the same width.
///
/// ```
/// use ndview::ndt::{promote_types_arithmetic, Type};
///
/// let tp = promote_types_arithmetic(&Type::int32(), &Type::float64()).unwrap();
/// assert_eq!(tp, Type::float64());
/// ```
///
pub fn promote_types_arithmetic(a: &Type, b: &Type) -> Result<Type> {
    let (Some(sa), Some(sb)) = (a.as_scalar(), b.as_scalar()) else {
        let actual = if a.as_scalar().is_none() { a } else { b };
        return Err(Error::UnsupportedKind {
            expected: Kind::Real,
            actual: actual.clone(),
        });
    };

    let (sa, sb) = (promote_integral(sa), promote_integral(sb));

    if sa.is_float() || sb.is_float() {
        let wider = if rank(sa) >= rank(sb) { sa } else { sb };
        return Ok(Type::scalar(wider));
    }

    if sa == sb {
        return Ok(Type::scalar(sa));
    }

    let same_sign = sa.kind() == sb.kind();
    if same_sign {
        let wider = if rank(sa) >= rank(sb) { sa } else { sb };
        return Ok(Type::scalar(wider));
    }

    let (signed, unsigned) = if sa.kind() == Kind::SInt {
        (sa, sb)
    } else {
        (sb, sa)
    };

    let promoted = if rank(unsigned) >= rank(signed) {
        unsigned
    } else if signed.size() > unsigned.size() {
        signed
    } else {
        to_unsigned(signed)
    };
    Ok(Type::scalar(promoted))
}
