use log::trace;

use super::arrmeta::ArrMeta;
use super::coercion::{load_word, store_scalar, store_word};
use super::core::Array;
use super::value::Value;
use crate::err;
use crate::error::{Error, Result};
use crate::internal_err;
use crate::memory::{BlockKind, ForeignRef, MemoryBlock, MAX_ALIGNMENT};
use crate::ndt::{StructType, Type, TypeNode, POINTER_SIZE};

impl Array {
    /// Build a new array holding `value`.
    ///
    /// The type is deduced from the value unless one is given, in which
    /// case every element is coerced into it.
    ///
    /// ```
    /// use ndview::array::{Array, Value};
    ///
    /// let tp = "3 * float32".parse().unwrap();
    /// let a = Array::from_value(&Value::from(vec![1, 2, 3]), Some(&tp)).unwrap();
    /// assert_eq!(a.to_value().unwrap(), Value::from(vec![1.0, 2.0, 3.0]));
    /// ```
    ///
    pub fn from_value(value: &Value, tp: Option<&Type>) -> Result<Array> {
        let tp = match tp {
            Some(tp) => tp.clone(),
            None => value.deduce_type()?,
        };
        let a = Array::allocate(&tp)?;
        a.set_value(value)?;
        Ok(a)
    }

    /// Overwrite every element of this array with `value`, broadcasting
    /// scalars and single element lists across dimensions.
    ///
    /// The value is checked against the type before anything is written.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        let p = self.preamble("value")?;
        if !self.is_writable()? {
            return Err(Error::Permission("assign"));
        }
        check_value(&p.tp, value)?;
        unsafe { check_layout(&p.tp, &p.meta, Some(p.data), value)? };
        trace!("assigning {} to array of type {}", value.describe(), p.tp);
        unsafe { store_value(&p.tp, &p.meta, p.data, value) }
    }

    /// Copy this array into freshly allocated memory with the default
    /// layout for its type.
    pub fn eval_copy(&self) -> Result<Array> {
        let p = self.preamble("value")?;
        let copy = Array::allocate(&p.tp)?;
        copy.set_value(&self.to_value()?)?;
        Ok(copy)
    }
}

fn mismatch(value: &Value, tp: &Type) -> Error {
    Error::TypeMismatch {
        value: value.describe(),
        tp: tp.clone(),
    }
}

/// Pair each field of `st` with its value, by name for struct values and
/// by position for lists.
fn struct_values<'v>(st: &StructType, tp: &Type, value: &'v Value) -> Result<Vec<&'v Value>> {
    match value {
        Value::Struct(pairs) => {
            if let Some((name, _)) = pairs.iter().find(|(n, _)| st.field_index(n).is_none()) {
                return Err(Error::MissingField {
                    name: name.clone(),
                    tp: tp.clone(),
                });
            }
            st.names()
                .iter()
                .map(|name| match pairs.iter().find(|(n, _)| n == name) {
                    Some((_, v)) => Ok(v),
                    None => err!(format!("no value given for field {name:?} of type {tp}")),
                })
                .collect()
        }
        Value::List(items) if items.len() == st.len() => Ok(items.iter().collect()),
        Value::List(items) => Err(Error::DimensionMismatch {
            expected: st.len(),
            given: items.len(),
        }),
        _ => Err(mismatch(value, tp)),
    }
}

/// Check that `value` can be stored into an element of type `tp`.
pub(crate) fn check_value(tp: &Type, value: &Value) -> Result<()> {
    match tp.node() {
        TypeNode::Scalar(st) => {
            let mut scratch = [0u8; 8];
            unsafe { store_scalar(*st, scratch.as_mut_ptr(), value) }
        }
        TypeNode::FixedString(n) => match value {
            Value::String(s) if s.len() <= *n => Ok(()),
            Value::String(_) => Err(Error::Overflow {
                value: value.describe(),
                tp: tp.clone(),
            }),
            _ => Err(mismatch(value, tp)),
        },
        TypeNode::FixedBytes { size, .. } => match value {
            Value::Bytes(b) if b.len() == *size => Ok(()),
            Value::Bytes(b) => Err(Error::DimensionMismatch {
                expected: *size,
                given: b.len(),
            }),
            _ => Err(mismatch(value, tp)),
        },
        TypeNode::String => match value {
            Value::String(_) => Ok(()),
            _ => Err(mismatch(value, tp)),
        },
        TypeNode::Bytes => match value {
            Value::Bytes(_) => Ok(()),
            _ => Err(mismatch(value, tp)),
        },
        TypeNode::Object => Ok(()),
        TypeNode::FixedDim { size, element } => match value {
            Value::List(items) if items.len() == *size || items.len() == 1 => {
                items.iter().try_for_each(|v| check_value(element, v))
            }
            Value::List(items) => Err(Error::DimensionMismatch {
                expected: *size,
                given: items.len(),
            }),
            v => check_value(element, v),
        },
        TypeNode::VarDim { element } => match value {
            Value::List(items) => items.iter().try_for_each(|v| check_value(element, v)),
            v => check_value(element, v),
        },
        TypeNode::Pointer { target } => check_value(target, value),
        TypeNode::Struct(st) => struct_values(st, tp, value)?
            .into_iter()
            .zip(st.types())
            .try_for_each(|(v, ftp)| check_value(ftp, v)),
    }
}

/// Whether writing into `tp` can resize a var dimension or follow a pointer.
fn has_indirection(tp: &Type) -> bool {
    match tp.node() {
        TypeNode::VarDim { .. } | TypeNode::Pointer { .. } => true,
        TypeNode::FixedDim { element, .. } => has_indirection(element),
        TypeNode::Struct(st) => st.types().iter().any(has_indirection),
        _ => false,
    }
}

/// Check that storing `value` at `data` only needs layout changes that can
/// be made, so that a failing assignment writes nothing.
///
/// Var dimensions viewed at an offset cannot be resized, and pointers must
/// not be null. `data` is `None` for an element a resize will zero-fill.
///
/// # Safety
///
/// When given, `data` must point at a readable element of type `tp` laid
/// out by `meta`.
unsafe fn check_layout(
    tp: &Type,
    meta: &ArrMeta,
    data: Option<*const u8>,
    value: &Value,
) -> Result<()> {
    if !has_indirection(tp) {
        return Ok(());
    }
    let word = |at: usize| data.map_or(0, |d| load_word(d.add(at)));

    match (tp.node(), meta) {
        (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { stride, element: em }) => {
            for i in 0..*size {
                let item = match value {
                    Value::List(items) if items.len() == *size => &items[i],
                    Value::List(items) => &items[0],
                    v => v,
                };
                let at = data.map(|d| d.wrapping_offset(i as isize * stride));
                check_layout(element, em, at, item)?;
            }
            Ok(())
        }
        (
            TypeNode::VarDim { element },
            ArrMeta::VarDim {
                blockref,
                stride,
                offset,
                element: em,
            },
        ) => {
            let begin = word(0);
            let size = word(POINTER_SIZE);
            let len = match value {
                Value::List(items) => items.len(),
                _ => size,
            };
            let resized = len != size || (begin == 0 && len > 0);
            if resized {
                if *offset != 0 {
                    return err!(format!(
                        "cannot resize a variable dimension viewed at an offset ({tp})"
                    ));
                }
                if len > 0 {
                    payload_arena(blockref)?;
                }
            }
            let base = (begin as *const u8).wrapping_offset(*offset);
            for i in 0..len {
                let item = match value {
                    Value::List(items) => &items[i],
                    v => v,
                };
                let at = (!resized).then(|| base.wrapping_offset(i as isize * stride));
                check_layout(element, em, at, item)?;
            }
            Ok(())
        }
        (TypeNode::Pointer { target }, ArrMeta::Pointer { offset, target: tm, .. }) => {
            let addr = word(0);
            if addr == 0 {
                return err!("cannot assign through a null pointer");
            }
            let at = (addr as *const u8).wrapping_offset(*offset);
            check_layout(target, tm, Some(at), value)
        }
        (
            TypeNode::Struct(st),
            ArrMeta::Struct {
                data_offsets,
                fields,
            },
        ) => {
            let values = struct_values(st, tp, value)?;
            for (((ftp, fmeta), offset), fv) in
                st.types().iter().zip(fields).zip(data_offsets).zip(values)
            {
                check_layout(ftp, fmeta, data.map(|d| d.wrapping_add(*offset)), fv)?;
            }
            Ok(())
        }
        _ => internal_err!(format!("arrmeta does not match type {tp}")),
    }
}

/// Copy `bytes` into the payload arena and point the string slot at `dst`
/// to them.
unsafe fn store_span(blockref: &Option<MemoryBlock>, dst: *mut u8, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        store_word(dst, 0);
        store_word(dst.add(POINTER_SIZE), 0);
        return Ok(());
    }
    let arena = payload_arena(blockref)?;
    let begin = arena.arena_alloc(bytes.len(), 1)?;
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), begin, bytes.len());
    store_word(dst, begin as usize);
    store_word(dst.add(POINTER_SIZE), begin as usize + bytes.len());
    Ok(())
}

fn payload_arena(blockref: &Option<MemoryBlock>) -> Result<&MemoryBlock> {
    match blockref {
        Some(block) if block.kind() == BlockKind::Arena => Ok(block),
        _ => err!("variable-sized data can only be stored in an array that owns its payload"),
    }
}

/// Write `value` into the element described by `tp` and `meta` at `data`.
/// `value` must already have passed [`check_value`].
///
/// # Safety
///
/// `data` must point at a writable element of type `tp` laid out by `meta`.
pub(crate) unsafe fn store_value(
    tp: &Type,
    meta: &ArrMeta,
    data: *mut u8,
    value: &Value,
) -> Result<()> {
    match (tp.node(), meta, value) {
        (TypeNode::Scalar(st), _, _) => store_scalar(*st, data, value),
        (TypeNode::FixedString(n), _, Value::String(s)) => {
            std::ptr::write_bytes(data, 0, *n);
            std::ptr::copy_nonoverlapping(s.as_ptr(), data, s.len().min(*n));
            Ok(())
        }
        (TypeNode::FixedBytes { size, .. }, _, Value::Bytes(b)) => {
            std::ptr::copy_nonoverlapping(b.as_ptr(), data, b.len().min(*size));
            Ok(())
        }
        (TypeNode::String, ArrMeta::BlockRef(blockref), Value::String(s)) => {
            store_span(blockref, data, s.as_bytes())
        }
        (TypeNode::Bytes, ArrMeta::BlockRef(blockref), Value::Bytes(b)) => {
            store_span(blockref, data, b)
        }
        (TypeNode::Object, _, Value::Object(obj)) => {
            ForeignRef::store(data, obj.as_ref());
            Ok(())
        }
        (TypeNode::Object, _, v) => {
            ForeignRef::store(data, Some(&ForeignRef::new(v.clone())));
            Ok(())
        }
        (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { stride, element: em }, v) => {
            for i in 0..*size {
                let item = match v {
                    Value::List(items) if items.len() == *size => &items[i],
                    Value::List(items) => &items[0],
                    v => v,
                };
                store_value(element, em, data.wrapping_offset(i as isize * stride), item)?;
            }
            Ok(())
        }
        (
            TypeNode::VarDim { element },
            ArrMeta::VarDim {
                blockref,
                stride,
                offset,
                element: em,
            },
            v,
        ) => {
            let mut begin = load_word(data);
            let size = load_word(data.add(POINTER_SIZE));
            let len = match v {
                Value::List(items) => items.len(),
                _ => size,
            };

            if len != size || (begin == 0 && len > 0) {
                if *offset != 0 {
                    return internal_err!(format!(
                        "resize of a variable dimension viewed at an offset ({tp})"
                    ));
                }
                begin = if len == 0 {
                    0
                } else {
                    let align = element.data_alignment().min(MAX_ALIGNMENT);
                    let bytes = len
                        .checked_mul(stride.unsigned_abs())
                        .ok_or(Error::AllocationFailed(None))?;
                    payload_arena(blockref)?.arena_alloc(bytes, align)? as usize
                };
                store_word(data, begin);
                store_word(data.add(POINTER_SIZE), len);
            }

            let base = (begin as *mut u8).wrapping_offset(*offset);
            for i in 0..len {
                let item = match v {
                    Value::List(items) => &items[i],
                    v => v,
                };
                store_value(element, em, base.wrapping_offset(i as isize * stride), item)?;
            }
            Ok(())
        }
        (TypeNode::Pointer { target }, ArrMeta::Pointer { offset, target: tm, .. }, v) => {
            let addr = load_word(data);
            if addr == 0 {
                return err!("cannot assign through a null pointer");
            }
            store_value(target, tm, (addr as *mut u8).wrapping_offset(*offset), v)
        }
        (
            TypeNode::Struct(st),
            ArrMeta::Struct {
                data_offsets,
                fields,
            },
            v,
        ) => {
            let values = struct_values(st, tp, v)?;
            for (((ftp, fmeta), offset), fv) in
                st.types().iter().zip(fields).zip(data_offsets).zip(values)
            {
                store_value(ftp, fmeta, data.add(*offset), fv)?;
            }
            Ok(())
        }
        (TypeNode::FixedString(_) | TypeNode::FixedBytes { .. }, _, v)
        | (TypeNode::String | TypeNode::Bytes, _, v) => Err(mismatch(v, tp)),
        _ => internal_err!(format!("arrmeta does not match type {tp}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    #[test]
    fn scalars_broadcast_across_dimensions() {
        let a = Array::allocate(&"2 * 3 * int16".parse().unwrap()).unwrap();
        a.set_value(&Value::from(7)).unwrap();
        assert_eq!(a.to_value().unwrap(), Value::from(vec![vec![7; 3], vec![7; 3]]));

        a.set_value(&Value::from(vec![vec![1, 2, 3]])).unwrap();
        assert_eq!(
            a.to_value().unwrap(),
            Value::from(vec![vec![1, 2, 3], vec![1, 2, 3]])
        );
    }

    #[test]
    fn wrong_lengths_are_rejected_before_writing() {
        let a = Array::from_value(&Value::from(vec![1, 2, 3]), None).unwrap();
        assert_eq!(
            a.set_value(&Value::from(vec![9, 9])),
            Err(Error::DimensionMismatch {
                expected: 3,
                given: 2
            })
        );
        assert!(a.set_value(&Value::from(vec![Value::from(1), Value::from(2), Value::from("x")])).is_err());
        assert_eq!(a.to_value().unwrap(), Value::from(vec![1, 2, 3]));
    }

    #[test]
    fn strings_and_bytes() {
        let v = Value::from(vec!["alpha", "", "gamma"]);
        let a = Array::from_value(&v, None).unwrap();
        assert_eq!(a.get_type().unwrap().to_string(), "3 * string");
        assert_eq!(a.to_value().unwrap(), v);

        let b = Array::from_value(&Value::Bytes(vec![1, 2]), Some(&"fixed_bytes[2]".parse().unwrap()))
            .unwrap();
        assert_eq!(b.to_value().unwrap(), Value::Bytes(vec![1, 2]));

        let fs = "fixed_string[3]".parse().unwrap();
        assert!(matches!(
            Array::from_value(&Value::from("toolong"), Some(&fs)),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn var_dims_can_be_resized() {
        let a = Array::from_value(&Value::from(vec![vec![1, 2, 3], vec![4]]), None).unwrap();
        a.set_value(&Value::from(vec![vec![5], vec![6, 7, 8, 9]])).unwrap();
        assert_eq!(
            a.to_value().unwrap(),
            Value::from(vec![vec![5], vec![6, 7, 8, 9]])
        );
    }

    #[test]
    fn failed_resizes_write_nothing() {
        let tp: Type = "2 * var * 2 * int32".parse().unwrap();
        let original = Value::from(vec![vec![vec![1, 2], vec![3, 4]], vec![vec![5, 6], vec![7, 8]]]);
        let a = Array::from_value(&original, Some(&tp)).unwrap();

        let second = a.view((.., .., 1)).unwrap();
        assert_eq!(second.get_type().unwrap().to_string(), "2 * var * int32");
        assert!(matches!(
            second.set_value(&Value::from(vec![vec![70, 80], vec![90]])),
            Err(Error::Other(_))
        ));
        assert_eq!(a.to_value().unwrap(), original);

        second.set_value(&Value::from(vec![vec![70, 80], vec![90, 100]])).unwrap();
        assert_eq!(
            a.to_value().unwrap(),
            Value::from(vec![vec![vec![1, 70], vec![3, 80]], vec![vec![5, 90], vec![7, 100]]])
        );
    }

    #[test]
    fn null_pointers_are_found_before_writing() {
        let tp: Type = "{a : int32, b : pointer[int32]}".parse().unwrap();
        let a = Array::allocate(&tp).unwrap();
        a.assign(0, &Value::from(1)).unwrap();
        assert!(a.set_value(&Value::List(vec![2.into(), 3.into()])).is_err());
        assert_eq!(a.view(0).unwrap().to_value().unwrap(), Value::from(1));
    }

    #[test]
    fn structs_by_name_and_position() {
        let tp: Type = "{x : int32, y : float64}".parse().unwrap();
        let a = Array::from_value(&record(vec![("y", 2.5.into()), ("x", 1.into())]), Some(&tp)).unwrap();
        assert_eq!(
            a.to_value().unwrap(),
            record(vec![("x", 1.into()), ("y", 2.5.into())])
        );

        a.set_value(&Value::List(vec![3.into(), 4.into()])).unwrap();
        assert_eq!(
            a.to_value().unwrap(),
            record(vec![("x", 3.into()), ("y", 4.0.into())])
        );

        assert!(matches!(
            a.set_value(&record(vec![("x", 1.into()), ("z", 2.into())])),
            Err(Error::MissingField { .. })
        ));
    }

    #[test]
    fn readonly_arrays_refuse_assignment() {
        let a = Array::from_value(&Value::from(1), None).unwrap();
        let r = a.readonly().unwrap();
        assert_eq!(r.set_value(&Value::from(2)), Err(Error::Permission("assign")));
    }

    #[test]
    fn copies_are_independent() {
        let a = Array::from_value(&Value::from(vec![1, 2]), None).unwrap();
        let b = a.eval_copy().unwrap();
        b.set_value(&Value::from(0)).unwrap();
        assert_eq!(a.to_value().unwrap(), Value::from(vec![1, 2]));
        assert_ne!(a.data_ptr().unwrap(), b.data_ptr().unwrap());
    }

    #[test]
    fn arbitrary_values_in_object_slots() {
        let a = Array::from_value(&Value::from(vec![Value::from(1), Value::from("a")]), None).unwrap();
        assert_eq!(a.get_type().unwrap().to_string(), "2 * object");
        let Value::List(items) = a.to_value().unwrap() else {
            panic!("expected a list");
        };
        let Value::Object(Some(obj)) = &items[1] else {
            panic!("expected an object");
        };
        assert_eq!(obj.downcast_ref::<Value>(), Some(&Value::from("a")));
    }
}
