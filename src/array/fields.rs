use log::debug;

use super::arrmeta::{ArrMeta, DimMeta};
use super::core::{expect_kind, Array, ArrayPreamble, Flags};
use crate::error::{Error, Result};
use crate::internal_err;
use crate::ndt::{Kind, Type};

impl Array {
    /// Select a subset of struct fields, in the requested order, as a view
    /// of the same memory.
    ///
    /// The array's dtype must be a struct. Dimensions are kept as they are;
    /// only the struct level is rebuilt, reusing the original field
    /// offsets so that no data moves.
    ///
    /// ```
    /// use ndview::array::{Array, Value};
    ///
    /// let tp = "3 * {x : int32, y : float64, z : int8}".parse().unwrap();
    /// let a = Array::allocate(&tp).unwrap();
    /// let zx = a.project(&["z", "x"]).unwrap();
    /// assert_eq!(zx.get_type().unwrap().to_string(), "3 * {z : int8, x : int32}");
    /// ```
    ///
    pub fn project<S: AsRef<str>>(&self, fields: &[S]) -> Result<Array> {
        let p = self.preamble("fields")?;
        let dtype = p.tp.dtype();
        expect_kind(dtype, Kind::Struct)?;
        let Some(st) = dtype.as_struct() else {
            return internal_err!("struct kind without a struct type");
        };

        if fields.is_empty() {
            return Err(Error::EmptyFieldList);
        }

        let selected = fields
            .iter()
            .map(|name| {
                st.field_index(name.as_ref()).ok_or_else(|| Error::MissingField {
                    name: name.as_ref().to_string(),
                    tp: dtype.clone(),
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let new_dtype = Type::make_struct(
            selected
                .iter()
                .map(|&i| (st.names()[i].clone(), st.types()[i].clone()))
                .collect(),
        )?;
        let tp = p.tp.with_replaced_dtype(new_dtype);

        // copy the dimension levels, then rebuild the struct level
        let mut dims: Vec<DimMeta> = Vec::with_capacity(p.tp.ndim());
        let (mut level_tp, mut level_meta) = (&p.tp, &p.meta);
        while level_tp.ndim() > 0 {
            let (dim, next) = level_meta.copy_construct_onedim(level_tp, &p.owner)?;
            let Some(element) = level_tp.element_type() else {
                return internal_err!(format!("dimension without an element: {level_tp}"));
            };
            dims.push(dim);
            (level_tp, level_meta) = (element, next);
        }

        let ArrMeta::Struct {
            data_offsets,
            fields: field_meta,
        } = level_meta
        else {
            return Err(Error::UnsupportedDimension(level_tp.clone()));
        };
        let struct_meta = ArrMeta::Struct {
            data_offsets: selected.iter().map(|&i| data_offsets[i]).collect(),
            fields: selected
                .iter()
                .map(|&i| field_meta[i].copy_construct(&p.owner))
                .collect(),
        };
        let meta = dims
            .into_iter()
            .rev()
            .fold(struct_meta, |element, dim| dim.wrap(element));

        debug!("projected {} onto {}", p.tp, tp);

        Ok(Array::from_preamble(ArrayPreamble {
            data: p.data,
            tp,
            meta,
            owner: p.owner.acquire(),
            flags: p.flags - Flags::OWNS_DATA,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Value;

    fn points() -> Array {
        let tp: Type = "3 * {x : int32, y : float64, z : int8}".parse().unwrap();
        let rows: Vec<Value> = (0..3)
            .map(|i| {
                vec![
                    ("x", Value::from(i)),
                    ("y", Value::from(i as f64 / 2.0)),
                    ("z", Value::from(-i)),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        Array::from_value(&Value::List(rows), Some(&tp)).unwrap()
    }

    #[test]
    fn projection_reorders_fields_and_keeps_offsets() {
        let a = points();
        let zx = a.project(&["z", "x"]).unwrap();
        assert_eq!(
            zx.get_type().unwrap().to_string(),
            "3 * {z : int8, x : int32}"
        );
        assert_eq!(zx.data_ptr().unwrap(), a.data_ptr().unwrap());
        assert_eq!(zx.strides().unwrap(), a.strides().unwrap());
        let element = zx.arrmeta().unwrap().element().unwrap();
        assert_eq!(element.data_offsets(), Some(&[16usize, 0][..]));
        assert!(zx.owner().unwrap().ptr_eq(a.owner().unwrap()));
    }

    #[test]
    fn projected_views_alias_the_original() {
        let a = points();
        let y = a.project(&["y"]).unwrap();
        y.assign(1, &Value::List(vec![Value::from(9.0)])).unwrap();
        assert_eq!(
            a.view((1, 1)).unwrap().to_value().unwrap(),
            Value::from(9.0)
        );
    }

    #[test]
    fn projecting_every_field_in_order_is_identity() {
        let a = points();
        let all = a.project(&["x", "y", "z"]).unwrap();
        assert_eq!(all.get_type().unwrap(), a.get_type().unwrap());
        assert_eq!(all.to_value().unwrap(), a.to_value().unwrap());
    }

    #[test]
    fn unknown_and_empty_field_lists() {
        let a = points();
        let err = a.project(&["x", "nonexistent"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: field name \"nonexistent\" does not exist in type {x : int32, y : float64, z : int8}"
        );
        assert_eq!(
            a.project::<&str>(&[]).map(|_| ()),
            Err(Error::EmptyFieldList)
        );
        assert!(matches!(
            a.project(&["x", "x"]),
            Err(Error::DuplicateField(_))
        ));
    }

    #[test]
    fn non_struct_dtypes_are_rejected() {
        let a = Array::from_value(&Value::from(vec![1, 2]), None).unwrap();
        assert!(matches!(
            a.project(&["x"]),
            Err(Error::UnsupportedKind {
                expected: Kind::Struct,
                ..
            })
        ));
        assert_eq!(
            Array::null().project(&["x"]).map(|_| ()),
            Err(Error::NullHandle("fields"))
        );
    }

    #[test]
    fn var_dimensions_keep_their_payload() {
        let tp: Type = "var * {a : int32, b : string}".parse().unwrap();
        let v = Value::List(vec![
            vec![("a", Value::from(1)), ("b", Value::from("one"))].into_iter().collect(),
            vec![("a", Value::from(2)), ("b", Value::from("two"))].into_iter().collect(),
        ]);
        let a = Array::from_value(&v, Some(&tp)).unwrap();
        let b = a.project(&["b"]).unwrap();
        let expected: Vec<Value> = ["one", "two"]
            .iter()
            .map(|s| vec![("b", Value::from(*s))].into_iter().collect())
            .collect();
        assert_eq!(b.to_value().unwrap(), Value::List(expected));
        assert_eq!(
            b.arrmeta().unwrap().blockref(),
            a.arrmeta().unwrap().blockref()
        );
    }

    #[test]
    fn pointer_dimensions_are_rejected() {
        let target = points();
        let ptr = Array::pointer_to(&target).unwrap();
        assert!(matches!(
            ptr.project(&["x"]),
            Err(Error::UnsupportedDimension(_))
        ));
    }
}
