use std::ptr;

use super::value::Value;
use crate::error::{Error, Result};
use crate::ndt::{ScalarType, Type};

/// Scalar values a [`Value`] can be coerced into before being stored.
pub trait CoercibleInto<T>: Sized {
    fn coerce_into(&self, tp: &Type) -> Result<T>;
}

impl CoercibleInto<i128> for Value {
    fn coerce_into(&self, tp: &Type) -> Result<i128> {
        match self {
            Value::Bool(b) => Ok(*b as i128),
            Value::Int(i) => Ok(*i as i128),
            Value::UInt(u) => Ok(*u as i128),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => Ok(*x as i128),
            Value::Float(_) => Err(Error::LossyConversion {
                value: self.describe(),
                tp: tp.clone(),
            }),
            _ => Err(mismatch(self, tp)),
        }
    }
}

impl CoercibleInto<f64> for Value {
    fn coerce_into(&self, tp: &Type) -> Result<f64> {
        match self {
            Value::Bool(b) => Ok(*b as i32 as f64),
            Value::Int(i) => Ok(*i as f64),
            Value::UInt(u) => Ok(*u as f64),
            Value::Float(x) => Ok(*x),
            _ => Err(mismatch(self, tp)),
        }
    }
}

impl CoercibleInto<bool> for Value {
    fn coerce_into(&self, tp: &Type) -> Result<bool> {
        let lossy = || Error::LossyConversion {
            value: self.describe(),
            tp: tp.clone(),
        };
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) | Value::UInt(0) => Ok(false),
            Value::Int(1) | Value::UInt(1) => Ok(true),
            Value::Int(_) | Value::UInt(_) => Err(lossy()),
            Value::Float(x) if *x == 0.0 => Ok(false),
            Value::Float(x) if *x == 1.0 => Ok(true),
            Value::Float(_) => Err(lossy()),
            _ => Err(mismatch(self, tp)),
        }
    }
}

fn mismatch(value: &Value, tp: &Type) -> Error {
    Error::TypeMismatch {
        value: value.describe(),
        tp: tp.clone(),
    }
}

macro_rules! store_int {
    ($t:ty, $dst:expr, $v:expr, $value:expr, $tp:expr) => {{
        let v = <$t>::try_from($v).map_err(|_| Error::Overflow {
            value: $value.describe(),
            tp: $tp.clone(),
        })?;
        store_bytes($dst, &v.to_ne_bytes());
    }};
}

unsafe fn store_bytes(dst: *mut u8, bytes: &[u8]) {
    ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
}

unsafe fn load_bytes<const N: usize>(src: *const u8) -> [u8; N] {
    let mut bytes = [0u8; N];
    ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), N);
    bytes
}

/// Coerce `value` into a scalar of type `st` and write it at `dst`.
///
/// The value is fully validated before any byte is written.
///
/// # Safety
///
/// `dst` must be valid for writes of `st.size()` bytes.
pub unsafe fn store_scalar(st: ScalarType, dst: *mut u8, value: &Value) -> Result<()> {
    use ScalarType::*;
    let tp = Type::scalar(st);
    match st {
        Bool => {
            let b: bool = value.coerce_into(&tp)?;
            store_bytes(dst, &[b as u8]);
        }
        Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 => {
            let v: i128 = value.coerce_into(&tp)?;
            match st {
                Int8 => store_int!(i8, dst, v, value, tp),
                Int16 => store_int!(i16, dst, v, value, tp),
                Int32 => store_int!(i32, dst, v, value, tp),
                Int64 => store_int!(i64, dst, v, value, tp),
                UInt8 => store_int!(u8, dst, v, value, tp),
                UInt16 => store_int!(u16, dst, v, value, tp),
                UInt32 => store_int!(u32, dst, v, value, tp),
                _ => store_int!(u64, dst, v, value, tp),
            }
        }
        Float32 => {
            let x: f64 = value.coerce_into(&tp)?;
            store_bytes(dst, &(x as f32).to_ne_bytes());
        }
        Float64 => {
            let x: f64 = value.coerce_into(&tp)?;
            store_bytes(dst, &x.to_ne_bytes());
        }
    }
    Ok(())
}

/// Read a scalar of type `st` stored at `src`.
///
/// # Safety
///
/// `src` must be valid for reads of `st.size()` bytes.
pub unsafe fn load_scalar(st: ScalarType, src: *const u8) -> Value {
    use ScalarType::*;
    match st {
        Bool => Value::Bool(*src != 0),
        Int8 => Value::Int(i8::from_ne_bytes(load_bytes(src)) as i64),
        Int16 => Value::Int(i16::from_ne_bytes(load_bytes(src)) as i64),
        Int32 => Value::Int(i32::from_ne_bytes(load_bytes(src)) as i64),
        Int64 => Value::Int(i64::from_ne_bytes(load_bytes(src))),
        UInt8 => Value::UInt(*src as u64),
        UInt16 => Value::UInt(u16::from_ne_bytes(load_bytes(src)) as u64),
        UInt32 => Value::UInt(u32::from_ne_bytes(load_bytes(src)) as u64),
        UInt64 => Value::UInt(u64::from_ne_bytes(load_bytes(src))),
        Float32 => Value::Float(f32::from_ne_bytes(load_bytes(src)) as f64),
        Float64 => Value::Float(f64::from_ne_bytes(load_bytes(src))),
    }
}

/// Read a pointer-sized word.
///
/// # Safety
///
/// `src` must be valid for reads of a pointer-sized value.
pub unsafe fn load_word(src: *const u8) -> usize {
    usize::from_ne_bytes(load_bytes(src))
}

/// Write a pointer-sized word.
///
/// # Safety
///
/// `dst` must be valid for writes of a pointer-sized value.
pub unsafe fn store_word(dst: *mut u8, word: usize) {
    store_bytes(dst, &word.to_ne_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(st: ScalarType, v: Value) -> Result<Value> {
        let mut buf = [0u8; 8];
        unsafe {
            store_scalar(st, buf.as_mut_ptr(), &v)?;
            Ok(load_scalar(st, buf.as_ptr()))
        }
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(roundtrip(ScalarType::Int8, Value::Int(-128)), Ok(Value::Int(-128)));
        assert!(matches!(
            roundtrip(ScalarType::Int8, Value::Int(300)),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            roundtrip(ScalarType::UInt32, Value::Int(-1)),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn floats_into_integers_must_be_exact() {
        assert_eq!(roundtrip(ScalarType::Int32, Value::Float(4.0)), Ok(Value::Int(4)));
        assert!(matches!(
            roundtrip(ScalarType::Int32, Value::Float(4.5)),
            Err(Error::LossyConversion { .. })
        ));
    }

    #[test]
    fn bools() {
        assert_eq!(roundtrip(ScalarType::Bool, Value::Int(1)), Ok(Value::Bool(true)));
        assert!(roundtrip(ScalarType::Bool, Value::Int(2)).is_err());
        assert_eq!(roundtrip(ScalarType::Float64, Value::Bool(true)), Ok(Value::Float(1.0)));
    }

    #[test]
    fn strings_do_not_coerce_to_numbers() {
        assert!(matches!(
            roundtrip(ScalarType::Float64, Value::from("1.0")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn failed_store_leaves_destination_untouched() {
        let mut buf = [7u8; 8];
        let res = unsafe { store_scalar(ScalarType::Int16, buf.as_mut_ptr(), &Value::Int(1 << 20)) };
        assert!(res.is_err());
        assert_eq!(buf, [7u8; 8]);
    }

    #[test]
    fn words() {
        let mut buf = [0u8; 8];
        unsafe {
            store_word(buf.as_mut_ptr(), 0xdead);
            assert_eq!(load_word(buf.as_ptr()), 0xdead);
        }
    }
}
