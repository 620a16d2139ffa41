use super::arrmeta::ArrMeta;
use super::coercion::{load_scalar, load_word};
use super::core::Array;
use super::value::Value;
use crate::err;
use crate::error::Result;
use crate::internal_err;
use crate::memory::ForeignRef;
use crate::ndt::{Type, TypeNode, POINTER_SIZE};

impl Array {
    /// Read the whole array back into a [`Value`].
    ///
    /// ```
    /// use ndview::array::{Array, Value};
    ///
    /// let a = Array::from_value(&Value::from(vec![1, 2, 3]), None).unwrap();
    /// assert_eq!(a.to_value().unwrap(), Value::from(vec![1, 2, 3]));
    /// ```
    ///
    pub fn to_value(&self) -> Result<Value> {
        let p = self.preamble("value")?;
        unsafe { load_value(&p.tp, &p.meta, p.data) }
    }
}

/// Read a (begin, end) pair of addresses.
///
/// # Safety
///
/// `src` must hold a string or bytes slot written by this crate.
unsafe fn load_span<'a>(src: *const u8) -> &'a [u8] {
    let begin = load_word(src);
    let end = load_word(src.add(POINTER_SIZE));
    if begin == 0 || end <= begin {
        &[]
    } else {
        std::slice::from_raw_parts(begin as *const u8, end - begin)
    }
}

/// Read the element described by `tp` and `meta` at `data`.
///
/// # Safety
///
/// `data` must point at a valid element of type `tp` laid out by `meta`.
pub(crate) unsafe fn load_value(tp: &Type, meta: &ArrMeta, data: *const u8) -> Result<Value> {
    match (tp.node(), meta) {
        (TypeNode::Scalar(st), _) => Ok(load_scalar(*st, data)),
        (TypeNode::FixedString(n), _) => {
            let bytes = std::slice::from_raw_parts(data, *n);
            let len = bytes.iter().position(|b| *b == 0).unwrap_or(*n);
            Ok(Value::String(String::from_utf8_lossy(&bytes[..len]).into_owned()))
        }
        (TypeNode::FixedBytes { size, .. }, _) => {
            Ok(Value::Bytes(std::slice::from_raw_parts(data, *size).to_vec()))
        }
        (TypeNode::String, _) => Ok(Value::String(
            String::from_utf8_lossy(load_span(data)).into_owned(),
        )),
        (TypeNode::Bytes, _) => Ok(Value::Bytes(load_span(data).to_vec())),
        (TypeNode::Object, _) => Ok(Value::Object(ForeignRef::load(data))),
        (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { stride, element: em }) => {
            (0..*size as isize)
                .map(|i| load_value(element, em, data.wrapping_offset(i * stride)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
        (
            TypeNode::VarDim { element },
            ArrMeta::VarDim {
                stride,
                offset,
                element: em,
                ..
            },
        ) => {
            let begin = load_word(data);
            let size = load_word(data.add(POINTER_SIZE));
            if begin == 0 {
                return Ok(Value::List(vec![]));
            }
            let base = (begin as *const u8).wrapping_offset(*offset);
            (0..size as isize)
                .map(|i| load_value(element, em, base.wrapping_offset(i * stride)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
        (TypeNode::Pointer { target }, ArrMeta::Pointer { offset, target: tm, .. }) => {
            let addr = load_word(data);
            if addr == 0 {
                return err!("cannot dereference a null pointer");
            }
            load_value(target, tm, (addr as *const u8).wrapping_offset(*offset))
        }
        (
            TypeNode::Struct(st),
            ArrMeta::Struct {
                data_offsets,
                fields,
            },
        ) => st
            .names()
            .iter()
            .zip(st.types())
            .zip(fields.iter().zip(data_offsets))
            .map(|((name, ftp), (fmeta, offset))| {
                Ok((name.clone(), load_value(ftp, fmeta, data.add(*offset))?))
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Struct),
        _ => internal_err!(format!("arrmeta does not match type {tp}")),
    }
}
