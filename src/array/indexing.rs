use log::debug;

use super::arrmeta::ArrMeta;
use super::coercion::load_word;
use super::core::{expect_kind, Array, ArrayPreamble, Flags};
use super::subset::{IndexSpec, Subscript};
use super::value::Value;
use crate::err;
use crate::error::{Error, Result};
use crate::internal_err;
use crate::memory::MemoryBlock;
use crate::ndt::{Kind, Type, TypeNode, POINTER_SIZE};

/// A partially indexed element: where it lives and how to read it.
struct Cursor {
    tp: Type,
    meta: ArrMeta,
    data: *mut u8,
    owner: MemoryBlock,
}

/// Resolve an index against a dimension of length `len`.
fn resolve_index(index: isize, len: usize, dim: usize) -> Result<usize> {
    let resolved = if index < 0 {
        index + len as isize
    } else {
        index
    };
    if (0..len as isize).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(Error::Bounds { index, len, dim })
    }
}

/// Resolve a range against a dimension of length `len`, returning the
/// first position, the number of positions selected and the step.
///
/// Bounds are clamped to the dimension, negative bounds count from the end
/// and a negative step walks backwards from the end.
pub fn resolve_range(
    start: Option<isize>,
    stop: Option<isize>,
    step: Option<isize>,
    len: usize,
    dim: usize,
) -> Result<(isize, usize, isize)> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::ZeroStep { dim });
    }

    let len = len as isize;
    let clamp = |b: isize, lo: isize, hi: isize| {
        if b < 0 {
            (b + len).max(lo)
        } else {
            b.min(hi)
        }
    };

    // (span - 1) / |step| + 1 stays in range for any nonzero step
    let (start, count) = if step > 0 {
        let start = start.map_or(0, |b| clamp(b, 0, len));
        let stop = stop.map_or(len, |b| clamp(b, 0, len));
        let count = if stop > start {
            (stop - start - 1) as usize / step as usize + 1
        } else {
            0
        };
        (start, count)
    } else {
        let start = start.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = stop.map_or(-1, |b| clamp(b, -1, len - 1));
        let count = if start > stop {
            (start - stop - 1) as usize / step.unsigned_abs() + 1
        } else {
            0
        };
        (start, count)
    };

    Ok((start, count, step))
}

/// Stride of a dimension after taking every `step`th of `count` elements.
/// With at most one element left the stride is never used.
fn stepped_stride(stride: isize, step: isize, count: usize) -> Result<isize> {
    if count <= 1 {
        return Ok(stride);
    }
    match stride.checked_mul(step) {
        Some(stride) => Ok(stride),
        None => err!(format!("slice step {step} overflows a stride of {stride} bytes")),
    }
}

/// Apply `specs` to the element at `cur`.
///
/// `exact` is true while `cur.data` is the address of one particular
/// element, and false once a range has been taken over an outer dimension
/// (the data pointer then only locates the first element). Var dimensions
/// and pointers need an exact address to be indexed.
fn apply(cur: Cursor, specs: &[IndexSpec], dim: usize, exact: bool) -> Result<Cursor> {
    let Some((spec, rest)) = specs.split_first() else {
        return Ok(cur);
    };

    match (cur.tp.node(), &cur.meta) {
        (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { stride, element: em }) => {
            match *spec {
                IndexSpec::Index(i) => {
                    let i = resolve_index(i, *size, dim)?;
                    let next = Cursor {
                        tp: element.clone(),
                        meta: (**em).clone(),
                        data: cur.data.wrapping_offset(i as isize * stride),
                        owner: cur.owner,
                    };
                    apply(next, rest, dim + 1, exact)
                }
                IndexSpec::Range { start, stop, step } => {
                    let (start, count, step) = resolve_range(start, stop, step, *size, dim)?;
                    let stride = *stride;
                    let first = Cursor {
                        tp: element.clone(),
                        meta: (**em).clone(),
                        data: cur.data.wrapping_offset(start * stride),
                        owner: cur.owner,
                    };
                    let inner = apply(first, rest, dim + 1, false)?;
                    Ok(Cursor {
                        tp: Type::fixed_dim(count, inner.tp),
                        meta: ArrMeta::FixedDim {
                            stride: stepped_stride(stride, step, count)?,
                            element: Box::new(inner.meta),
                        },
                        data: inner.data,
                        owner: inner.owner,
                    })
                }
                IndexSpec::Ellipsis => internal_err!("ellipsis left in an expanded subscript"),
            }
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
            if spec.is_full_range() || !exact {
                if !spec.is_full_range() {
                    return Err(Error::InvalidSubscript(format!(
                        "only ':' can be applied to a var dimension nested inside another dimension (dimension {dim})"
                    )));
                }
                // apply the rest relative to a null element address, then
                // fold the resulting displacement into the var offset
                let rel = Cursor {
                    tp: element.clone(),
                    meta: (**em).clone(),
                    data: std::ptr::null_mut(),
                    owner: cur.owner.acquire(),
                };
                let inner = apply(rel, rest, dim + 1, false)?;
                return Ok(Cursor {
                    tp: Type::var_dim(inner.tp),
                    meta: ArrMeta::VarDim {
                        blockref: blockref.clone(),
                        stride: *stride,
                        offset: offset + inner.data as isize,
                        element: Box::new(inner.meta),
                    },
                    data: cur.data,
                    owner: cur.owner,
                });
            }

            let begin = unsafe { load_word(cur.data) };
            let size = unsafe { load_word(cur.data.add(POINTER_SIZE)) };
            let base = (begin as *mut u8).wrapping_offset(*offset);
            let owner = blockref.clone().unwrap_or(cur.owner);
            match *spec {
                IndexSpec::Index(i) => {
                    let i = resolve_index(i, size, dim)?;
                    let next = Cursor {
                        tp: element.clone(),
                        meta: (**em).clone(),
                        data: base.wrapping_offset(i as isize * stride),
                        owner,
                    };
                    apply(next, rest, dim + 1, true)
                }
                IndexSpec::Range { start, stop, step } => {
                    let (start, count, step) = resolve_range(start, stop, step, size, dim)?;
                    let first = Cursor {
                        tp: element.clone(),
                        meta: (**em).clone(),
                        data: base.wrapping_offset(start * stride),
                        owner,
                    };
                    let inner = apply(first, rest, dim + 1, false)?;
                    Ok(Cursor {
                        tp: Type::fixed_dim(count, inner.tp),
                        meta: ArrMeta::FixedDim {
                            stride: stepped_stride(*stride, step, count)?,
                            element: Box::new(inner.meta),
                        },
                        data: inner.data,
                        owner: inner.owner,
                    })
                }
                IndexSpec::Ellipsis => internal_err!("ellipsis left in an expanded subscript"),
            }
        }
        (TypeNode::Pointer { .. }, ArrMeta::Pointer { .. }) if exact => {
            apply(deref_cursor(cur)?, specs, dim, true)
        }
        (TypeNode::Pointer { .. }, _) => Err(Error::InvalidSubscript(format!(
            "cannot index through a pointer nested inside another dimension (dimension {dim})"
        ))),
        (
            TypeNode::Struct(st),
            ArrMeta::Struct {
                data_offsets,
                fields,
            },
        ) => match *spec {
            IndexSpec::Index(i) => {
                let i = resolve_index(i, st.len(), dim)?;
                let next = Cursor {
                    tp: st.types()[i].clone(),
                    meta: fields[i].clone(),
                    data: cur.data.wrapping_add(data_offsets[i]),
                    owner: cur.owner,
                };
                apply(next, rest, dim + 1, exact)
            }
            IndexSpec::Range { start, stop, step } => {
                if !rest.is_empty() {
                    return Err(Error::InvalidSubscript(format!(
                        "a range of struct fields cannot be indexed further (dimension {dim})"
                    )));
                }
                let (start, count, step) = resolve_range(start, stop, step, st.len(), dim)?;
                let selected: Vec<usize> = (0..count as isize)
                    .map(|k| (start + k * step) as usize)
                    .collect();
                let tp = Type::make_struct(
                    selected
                        .iter()
                        .map(|&i| (st.names()[i].clone(), st.types()[i].clone()))
                        .collect(),
                )?;
                Ok(Cursor {
                    tp,
                    meta: ArrMeta::Struct {
                        data_offsets: selected.iter().map(|&i| data_offsets[i]).collect(),
                        fields: selected.iter().map(|&i| fields[i].clone()).collect(),
                    },
                    data: cur.data,
                    owner: cur.owner,
                })
            }
            IndexSpec::Ellipsis => internal_err!("ellipsis left in an expanded subscript"),
        },
        _ => Err(Error::TooManyIndices {
            ndim: dim,
            given: dim + specs.len(),
        }),
    }
}

/// Follow a pointer element to its target.
fn deref_cursor(cur: Cursor) -> Result<Cursor> {
    let (TypeNode::Pointer { target }, ArrMeta::Pointer { blockref, offset, target: tm }) =
        (cur.tp.node(), &cur.meta)
    else {
        return internal_err!("deref of a non-pointer element");
    };
    let addr = unsafe { load_word(cur.data) };
    if addr == 0 {
        return err!("cannot dereference a null pointer");
    }
    Ok(Cursor {
        tp: target.clone(),
        meta: (**tm).clone(),
        data: (addr as *mut u8).wrapping_offset(*offset),
        owner: blockref.clone().unwrap_or(cur.owner),
    })
}

impl Array {
    fn cursor(p: &ArrayPreamble) -> Cursor {
        Cursor {
            tp: p.tp.clone(),
            meta: p.meta.clone(),
            data: p.data,
            owner: p.owner.acquire(),
        }
    }

    fn from_cursor(cur: Cursor, flags: Flags) -> Array {
        Array::from_preamble(ArrayPreamble {
            data: cur.data,
            tp: cur.tp,
            meta: cur.meta,
            owner: cur.owner,
            flags: flags - Flags::OWNS_DATA,
        })
    }

    /// Index this array, producing a view that aliases the same memory.
    ///
    /// Integer indices remove a dimension, ranges keep it (possibly
    /// shorter, reversed or strided) and a lone ellipsis returns a view of
    /// the whole array. Integer indices past the dimensions select struct
    /// fields by position.
    ///
    /// ```
    /// use ndview::array::{Array, Value, IndexSpec};
    ///
    /// let a = Array::from_value(&Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]), None).unwrap();
    /// let col = a.view((.., 1)).unwrap();
    /// assert_eq!(col.to_value().unwrap(), Value::from(vec![2, 5]));
    ///
    /// let rev = a.view((1, IndexSpec::range(None, None, Some(-1)))).unwrap();
    /// assert_eq!(rev.to_value().unwrap(), Value::from(vec![6, 5, 4]));
    /// ```
    ///
    pub fn view<S: Into<Subscript>>(&self, subscript: S) -> Result<Array> {
        let p = self.preamble("getitem")?;
        let subscript = subscript.into();

        let cur = match &subscript {
            Subscript::Ellipsis => Array::cursor(p),
            _ => {
                let specs = subscript.expand(p.tp.ndim())?;
                let allowed = p.tp.ndim() + usize::from(p.tp.dtype().as_struct().is_some());
                if specs.len() > allowed {
                    return Err(Error::TooManyIndices {
                        ndim: p.tp.ndim(),
                        given: specs.len(),
                    });
                }
                apply(Array::cursor(p), &specs, 0, true)?
            }
        };

        debug!("view {subscript} of {} gives {}", p.tp, cur.tp);
        Ok(Array::from_cursor(cur, p.flags))
    }

    /// Assign `value` to the elements selected by `subscript`.
    ///
    /// ```
    /// use ndview::array::{Array, Value};
    ///
    /// let a = Array::from_value(&Value::from(vec![0, 0, 0, 0]), None).unwrap();
    /// a.assign(1..3, &Value::from(7)).unwrap();
    /// assert_eq!(a.to_value().unwrap(), Value::from(vec![0, 7, 7, 0]));
    /// ```
    ///
    pub fn assign<S: Into<Subscript>>(&self, subscript: S, value: &Value) -> Result<()> {
        let p = self.preamble("setitem")?;
        if !p.flags.contains(Flags::WRITE) {
            return Err(Error::Permission("assign"));
        }
        self.view(subscript)?.set_value(value)
    }

    /// A view of the target of a `pointer[T]` array.
    pub fn deref(&self) -> Result<Array> {
        let p = self.preamble("deref")?;
        expect_kind(&p.tp, Kind::Pointer)?;
        let cur = deref_cursor(Array::cursor(p))?;
        Ok(Array::from_cursor(cur, p.flags))
    }
}
