use log::debug;

use super::coercion::{store_scalar, CoercibleInto};
use super::core::Array;
use super::value::Value;
use crate::error::{Error, Result};
use crate::internal_err;
use crate::ndt::{promote_types_arithmetic, Kind, ScalarType, Type};

fn scalar_operand(value: &Value, which: &'static str) -> Result<Type> {
    if !value.is_scalar() {
        return Err(Error::NonScalarOperand(which));
    }
    value.deduce_type()
}

fn numeric_dtype(tp: &Type) -> Result<ScalarType> {
    match tp.as_scalar() {
        Some(st) if st.kind() != Kind::Bool => Ok(st),
        _ => Err(Error::UnsupportedKind {
            expected: Kind::Real,
            actual: tp.clone(),
        }),
    }
}

/// Allocate a one dimensional array of `values`, stored as `st`.
fn fill(st: ScalarType, values: impl ExactSizeIterator<Item = Value>) -> Result<Array> {
    let tp = Type::fixed_dim(values.len(), Type::scalar(st));
    let a = Array::allocate(&tp)?;
    let p = a.preamble("data")?;
    for (i, v) in values.enumerate() {
        unsafe { store_scalar(st, p.data.add(i * st.size()), &v)? };
    }
    Ok(a)
}

/// Check that `value` can be stored as `st`, writing only to scratch space.
fn check_operand(st: ScalarType, value: &Value) -> Result<()> {
    let mut scratch = [0u8; 8];
    unsafe { store_scalar(st, scratch.as_mut_ptr(), value) }
}

fn int_value(v: i128) -> Value {
    match i64::try_from(v) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::UInt(v as u64),
    }
}

/// Evenly spaced values in `[start, stop)`, like Python's `range` extended
/// to floating point.
///
/// `start` defaults to 0 and `step` to 1. Without an explicit type the
/// element type is the arithmetic promotion of the three operands.
///
/// ```
/// use ndview::array::{range, Value};
///
/// let a = range(None, Value::from(5), None, None).unwrap();
/// assert_eq!(a.get_type().unwrap().to_string(), "5 * int32");
/// assert_eq!(a.to_value().unwrap(), Value::from(vec![0, 1, 2, 3, 4]));
/// ```
///
pub fn range(
    start: Option<Value>,
    stop: Value,
    step: Option<Value>,
    tp: Option<&Type>,
) -> Result<Array> {
    let start = start.unwrap_or(Value::Int(0));
    let step = step.unwrap_or(Value::Int(1));

    let start_tp = scalar_operand(&start, "start")?;
    let stop_tp = scalar_operand(&stop, "stop")?;
    let step_tp = scalar_operand(&step, "step")?;

    let tp = match tp {
        Some(tp) => tp.clone(),
        None => promote_types_arithmetic(&start_tp, &promote_types_arithmetic(&stop_tp, &step_tp)?)?,
    };
    let st = numeric_dtype(&tp)?;
    for operand in [&start, &stop, &step] {
        check_operand(st, operand)?;
    }

    let a = if st.is_integer() {
        let (begin, end, by): (i128, i128, i128) = (
            start.coerce_into(&tp)?,
            stop.coerce_into(&tp)?,
            step.coerce_into(&tp)?,
        );
        if by == 0 {
            return Err(Error::ZeroStep { dim: 0 });
        }
        let count = if by > 0 && end > begin {
            (end - begin + by - 1) / by
        } else if by < 0 && end < begin {
            (begin - end - by - 1) / -by
        } else {
            0
        };
        let count = usize::try_from(count).map_err(|_| Error::AllocationFailed(None))?;
        fill(st, (0..count).map(|i| int_value(begin + i as i128 * by)))?
    } else if st.is_float() {
        let (begin, end, by): (f64, f64, f64) = (
            start.coerce_into(&tp)?,
            stop.coerce_into(&tp)?,
            step.coerce_into(&tp)?,
        );
        if by == 0.0 {
            return Err(Error::ZeroStep { dim: 0 });
        }
        let count = ((end - begin) / by).ceil();
        let count = if count.is_finite() && count > 0.0 {
            count as usize
        } else {
            0
        };
        fill(st, (0..count).map(|i| Value::Float(begin + i as f64 * by)))?
    } else {
        return internal_err!(format!("range over unexpected type {tp}"));
    };

    debug!("range({start}, {stop}, {step}) of type {tp}");
    Ok(a)
}

/// `count` evenly spaced values from `start` to `stop`, both included.
///
/// Without an explicit type the element type is the promotion of `start`
/// and `stop`, with integers promoted to `float64`. Only floating point
/// element types are supported.
///
/// ```
/// use ndview::array::{linspace, Value};
///
/// let a = linspace(Value::from(0), Value::from(1), Value::from(5), None).unwrap();
/// assert_eq!(a.to_value().unwrap(), Value::from(vec![0.0, 0.25, 0.5, 0.75, 1.0]));
/// ```
///
pub fn linspace(start: Value, stop: Value, count: Value, tp: Option<&Type>) -> Result<Array> {
    let count = match count {
        Value::Int(n) if n >= 0 => n as usize,
        Value::UInt(n) => n as usize,
        other => return Err(Error::InvalidCount(other.describe())),
    };

    let start_tp = scalar_operand(&start, "start")?;
    let stop_tp = scalar_operand(&stop, "stop")?;

    let tp = match tp {
        Some(tp) => tp.clone(),
        None => {
            let tp = promote_types_arithmetic(&start_tp, &stop_tp)?;
            match tp.as_scalar() {
                Some(st) if st.is_integer() => Type::float64(),
                _ => tp,
            }
        }
    };
    let st = match tp.as_scalar() {
        Some(st) if st.is_float() => st,
        _ => {
            return Err(Error::UnsupportedKind {
                expected: Kind::Real,
                actual: tp,
            })
        }
    };

    let begin: f64 = start.coerce_into(&tp)?;
    let end: f64 = stop.coerce_into(&tp)?;
    let step = if count > 1 {
        (end - begin) / (count - 1) as f64
    } else {
        0.0
    };
    let a = fill(
        st,
        (0..count).map(|i| {
            if count > 1 && i == count - 1 {
                Value::Float(end)
            } else {
                Value::Float(begin + i as f64 * step)
            }
        }),
    )?;

    debug!("linspace({start}, {stop}, {count}) of type {tp}");
    Ok(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(a: &Array) -> Value {
        a.to_value().unwrap()
    }

    #[test]
    fn integer_ranges() {
        let a = range(Some(Value::from(2)), Value::from(10), Some(Value::from(3)), None).unwrap();
        assert_eq!(values(&a), Value::from(vec![2, 5, 8]));

        let down = range(Some(Value::from(5)), Value::from(0), Some(Value::from(-2)), None).unwrap();
        assert_eq!(values(&down), Value::from(vec![5, 3, 1]));

        let empty = range(Some(Value::from(5)), Value::from(0), None, None).unwrap();
        assert_eq!(empty.shape().unwrap(), vec![0]);
    }

    #[test]
    fn float_ranges() {
        let a = range(None, Value::from(1.0), Some(Value::from(0.25)), None).unwrap();
        assert_eq!(a.get_type().unwrap().to_string(), "4 * float64");
        assert_eq!(values(&a), Value::from(vec![0.0, 0.25, 0.5, 0.75]));
    }

    #[test]
    fn explicit_types() {
        let tp: Type = "int8".parse().unwrap();
        let a = range(None, Value::from(3), None, Some(&tp)).unwrap();
        assert_eq!(a.get_type().unwrap().to_string(), "3 * int8");

        let f32: Type = "float32".parse().unwrap();
        let b = range(None, Value::from(2), None, Some(&f32)).unwrap();
        assert_eq!(values(&b), Value::from(vec![0.0, 1.0]));

        assert!(matches!(
            range(None, Value::from(3), None, Some(&Type::bool())),
            Err(Error::UnsupportedKind { .. })
        ));
    }

    #[test]
    fn operands_must_fit_the_explicit_type() {
        let int8: Type = "int8".parse().unwrap();
        assert!(matches!(
            range(None, Value::from(1000), None, Some(&int8)),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            range(Some(Value::from(-300)), Value::from(0), None, Some(&int8)),
            Err(Error::Overflow { .. })
        ));
        let a = range(None, Value::from(127), Some(Value::from(100)), Some(&int8)).unwrap();
        assert_eq!(values(&a), Value::from(vec![0, 100]));
    }

    #[test]
    fn huge_counts_fail_to_allocate() {
        let f32: Type = "float32".parse().unwrap();
        assert!(matches!(
            linspace(Value::from(0.0), Value::from(1.0), Value::from(1u64 << 62), Some(&f32)),
            Err(Error::AllocationFailed(_))
        ));
        assert!(matches!(
            range(None, Value::from(i64::MAX), None, Some(&Type::int64())),
            Err(Error::AllocationFailed(_))
        ));
        assert!(matches!(
            range(None, Value::from(1e300), None, None),
            Err(Error::AllocationFailed(_))
        ));
    }

    #[test]
    fn zero_step() {
        assert_eq!(
            range(None, Value::from(3), Some(Value::from(0)), None).map(|_| ()),
            Err(Error::ZeroStep { dim: 0 })
        );
        assert!(matches!(
            range(None, Value::from(3.0), Some(Value::from(0.0)), None),
            Err(Error::ZeroStep { .. })
        ));
    }

    #[test]
    fn non_scalar_operands() {
        assert_eq!(
            range(None, Value::from(vec![1, 2]), None, None).map(|_| ()),
            Err(Error::NonScalarOperand("stop"))
        );
        assert_eq!(
            linspace(Value::from(0), Value::from(vec![1.0]), Value::from(3), None).map(|_| ()),
            Err(Error::NonScalarOperand("stop"))
        );
    }

    #[test]
    fn linspace_counts() {
        let one = linspace(Value::from(2.0), Value::from(3.0), Value::from(1), None).unwrap();
        assert_eq!(values(&one), Value::from(vec![2.0]));

        let none = linspace(Value::from(0), Value::from(1), Value::from(0), None).unwrap();
        assert_eq!(none.shape().unwrap(), vec![0]);

        assert!(matches!(
            linspace(Value::from(0), Value::from(1), Value::from(-1), None),
            Err(Error::InvalidCount(_))
        ));
        assert!(matches!(
            linspace(Value::from(0), Value::from(1), Value::from(2.5), None),
            Err(Error::InvalidCount(_))
        ));
    }

    #[test]
    fn linspace_types() {
        let a = linspace(Value::from(0), Value::from(1), Value::from(3), None).unwrap();
        assert_eq!(a.get_type().unwrap().to_string(), "3 * float64");

        let tp: Type = "float32".parse().unwrap();
        let b = linspace(Value::from(0), Value::from(1), Value::from(3), Some(&tp)).unwrap();
        assert_eq!(b.get_type().unwrap().to_string(), "3 * float32");

        assert!(matches!(
            linspace(Value::from(0), Value::from(1), Value::from(3), Some(&Type::int32())),
            Err(Error::UnsupportedKind { .. })
        ));
    }

    #[test]
    fn linspace_ends_exactly_at_stop() {
        let a = linspace(Value::from(0.1), Value::from(0.7), Value::from(7), None).unwrap();
        let Value::List(items) = values(&a) else {
            panic!("expected a list");
        };
        assert_eq!(items.last(), Some(&Value::Float(0.7)));
    }
}
