//! Property tests for array views, projections and sequence generators.

use ndview::array::{linspace, range, Array, Flags, IndexSpec, Value};
use ndview::error::Error;
use ndview::ndt::Type;
use proptest::prelude::*;

fn nested(shape: &[usize], next: &mut i64) -> Value {
    match shape.split_first() {
        None => {
            *next += 1;
            Value::Int(*next - 1)
        }
        Some((n, rest)) => Value::List((0..*n).map(|_| nested(rest, next)).collect()),
    }
}

/// An int64 array of the given shape holding 0, 1, 2, ... in row-major order.
fn counting(shape: &[usize]) -> Array {
    let tp = Type::fixed_dims(shape, Type::int64());
    Array::from_value(&nested(shape, &mut 0), Some(&tp)).unwrap()
}

fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 1..4)
}

fn records() -> Array {
    let tp: Type = "4 * {a : int8, b : float64, c : int32}".parse().unwrap();
    let rows: Vec<Value> = (0..4)
        .map(|i| {
            vec![
                ("a", Value::from(i)),
                ("b", Value::from(i as f64 * 1.5)),
                ("c", Value::from(i * 100)),
            ]
            .into_iter()
            .collect()
        })
        .collect();
    Array::from_value(&Value::List(rows), Some(&tp)).unwrap()
}

// ============================================================
// Indexing
// ============================================================

proptest! {
    #[test]
    fn integer_index_removes_one_dimension_and_aliases(
        shape in shape_strategy(),
        seed in any::<usize>(),
    ) {
        let a = counting(&shape);
        let i = (seed % shape[0]) as isize;
        let v = a.view(i).unwrap();
        prop_assert_eq!(v.ndim().unwrap(), a.ndim().unwrap() - 1);
        prop_assert!(v.owner().unwrap().ptr_eq(a.owner().unwrap()));

        v.set_value(&Value::from(-1)).unwrap();
        let Value::List(rows) = a.to_value().unwrap() else {
            panic!("expected a list");
        };
        prop_assert_eq!(rows[i as usize].clone(), v.to_value().unwrap());
    }

    #[test]
    fn negative_indices_count_from_the_end(len in 1usize..20, back in 1usize..20) {
        prop_assume!(back <= len);
        let a = counting(&[len]);
        let v = a.view(-(back as isize)).unwrap();
        prop_assert_eq!(v.to_value().unwrap(), Value::Int((len - back) as i64));
    }

    #[test]
    fn out_of_bounds_indices_report_index_length_and_dimension(len in 1usize..10, extra in 0usize..10) {
        let a = counting(&[2, len]);
        let index = (len + extra) as isize;
        prop_assert_eq!(
            a.view((0, index)).map(|_| ()),
            Err(Error::Bounds { index, len, dim: 1 })
        );
    }

    #[test]
    fn range_length_matches_slice_arithmetic(
        len in 0usize..20,
        a in -25isize..25,
        b in -25isize..25,
        s in (-6isize..6).prop_filter("nonzero step", |s| *s != 0),
    ) {
        let arr = counting(&[len]);
        let v = arr.view(IndexSpec::range(Some(a), Some(b), Some(s))).unwrap();
        prop_assert_eq!(v.ndim().unwrap(), 1);

        // the same selection, computed on plain indices
        let n = len as isize;
        let norm = |x: isize| if x < 0 { x + n } else { x };
        let (lo, hi) = if s > 0 { (0, n) } else { (-1, n - 1) };
        let start = norm(a).clamp(lo, hi);
        let stop = norm(b).clamp(lo, hi);
        let expected: Vec<Value> = std::iter::successors(Some(start), |i| Some(i + s))
            .take_while(|i| if s > 0 { *i < stop } else { *i > stop })
            .map(|i| Value::Int(i as i64))
            .collect();

        let span = stop - start;
        let ceil = if s > 0 { (span + s - 1) / s } else { (span + s + 1) / s };
        prop_assert_eq!(v.shape().unwrap()[0] as isize, ceil.max(0));
        prop_assert_eq!(v.to_value().unwrap(), Value::List(expected));
    }

    #[test]
    fn any_nonzero_step_selects_the_slice(
        len in 0usize..20,
        s in any::<isize>().prop_filter("nonzero step", |s| *s != 0),
    ) {
        let arr = counting(&[len]);
        let v = arr.view(IndexSpec::range(None, None, Some(s))).unwrap();

        let (n, s) = (len as i128, s as i128);
        let first = if s > 0 { 0 } else { n - 1 };
        let expected: Vec<Value> = std::iter::successors(Some(first), |i| Some(i + s))
            .take_while(|i| (0..n).contains(i))
            .map(|i| Value::Int(i as i64))
            .collect();
        prop_assert_eq!(v.shape().unwrap(), vec![expected.len() as isize]);
        prop_assert_eq!(v.to_value().unwrap(), Value::List(expected));
    }

    #[test]
    fn lone_ellipsis_is_observationally_identical(shape in shape_strategy()) {
        let a = counting(&shape);
        let v = a.view(IndexSpec::Ellipsis).unwrap();
        prop_assert_eq!(v.shape().unwrap(), a.shape().unwrap());
        prop_assert_eq!(v.strides().unwrap(), a.strides().unwrap());
        prop_assert_eq!(v.data_ptr().unwrap(), a.data_ptr().unwrap());
        prop_assert_eq!(v.to_value().unwrap(), a.to_value().unwrap());
    }

    #[test]
    fn zero_steps_are_rejected(shape in shape_strategy()) {
        let a = counting(&shape);
        prop_assert_eq!(
            a.view(IndexSpec::range(None, None, Some(0))).map(|_| ()),
            Err(Error::ZeroStep { dim: 0 })
        );
    }

    // ============================================================
    // Sequence generators
    // ============================================================

    #[test]
    fn integer_ranges_match_std(start in -50i64..50, stop in -50i64..50, step in 1i64..7) {
        let a = range(Some(Value::from(start)), Value::from(stop), Some(Value::from(step)), None)
            .unwrap();
        let expected: Vec<Value> = (start..stop).step_by(step as usize).map(Value::Int).collect();
        prop_assert_eq!(a.to_value().unwrap(), Value::List(expected));
    }

    #[test]
    fn linspace_includes_both_ends(start in -1e3f64..1e3, stop in -1e3f64..1e3, count in 2usize..50) {
        let a = linspace(Value::from(start), Value::from(stop), Value::from(count), None).unwrap();
        let Value::List(items) = a.to_value().unwrap() else {
            panic!("expected a list");
        };
        prop_assert_eq!(items.len(), count);
        prop_assert_eq!(items.first(), Some(&Value::Float(start)));
        prop_assert_eq!(items.last(), Some(&Value::Float(stop)));
    }
}

// ============================================================
// Fixed examples
// ============================================================

#[test]
fn views_outlive_the_original_handle() {
    let a = counting(&[3, 4]);
    let owner = a.owner().unwrap().clone();
    let v = a.view(1).unwrap();
    drop(a);
    assert_eq!(v.to_value().unwrap(), Value::from(vec![4i64, 5, 6, 7]));
    assert_eq!(owner.use_count(), 2);
    drop(v);
    assert_eq!(owner.use_count(), 1);
}

#[test]
fn fresh_allocations_own_their_data() {
    let a = Array::allocate(&"3 * 4 * int32".parse().unwrap()).unwrap();
    assert_eq!(a.shape().unwrap(), vec![3, 4]);
    assert!(a.flags().unwrap().contains(Flags::OWNS_DATA));
    assert!(!a.view(..).unwrap().flags().unwrap().contains(Flags::OWNS_DATA));
}

#[test]
fn null_handles_fail_attribute_access() {
    let a = Array::null();
    assert_eq!(a.shape(), Err(Error::NullHandle("shape")));
    assert_eq!(a.strides(), Err(Error::NullHandle("strides")));
}

#[test]
fn projection_round_trip_keeps_layout() {
    let h = records();
    let p = h.project(&["a", "b", "c"]).unwrap();
    assert_eq!(p.shape().unwrap(), h.shape().unwrap());
    assert_eq!(p.strides().unwrap(), h.strides().unwrap());
    assert_eq!(p.arrmeta().unwrap(), h.arrmeta().unwrap());
    assert_eq!(p.get_type().unwrap(), h.get_type().unwrap());
}

#[test]
fn projection_reorders_fields() {
    let h = records();
    let p = h.project(&["c", "a"]).unwrap();
    assert_eq!(
        p.get_type().unwrap().to_string(),
        "4 * {c : int32, a : int8}"
    );
    for i in 0..4 {
        assert_eq!(
            p.view((i, 0)).unwrap().to_value().unwrap(),
            h.view((i, 2)).unwrap().to_value().unwrap()
        );
    }

    p.assign((2, 0), &Value::from(-7)).unwrap();
    assert_eq!(h.view((2, 2)).unwrap().to_value().unwrap(), Value::from(-7));
}

#[test]
fn projection_errors() {
    let h = records();
    assert_eq!(
        h.project::<&str>(&[]).map(|_| ()),
        Err(Error::EmptyFieldList)
    );
    match h.project(&["nonexistent"]) {
        Err(Error::MissingField { name, .. }) => assert_eq!(name, "nonexistent"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        counting(&[3]).project(&["a"]),
        Err(Error::UnsupportedKind { .. })
    ));
}

#[test]
fn range_examples() {
    let int = Type::int32();
    let a = range(Some(Value::from(0)), Value::from(10), Some(Value::from(2)), Some(&int)).unwrap();
    assert_eq!(a.to_value().unwrap(), Value::from(vec![0, 2, 4, 6, 8]));

    let b = range(Some(Value::from(0)), Value::from(10), Some(Value::from(3)), Some(&int)).unwrap();
    assert_eq!(b.to_value().unwrap(), Value::from(vec![0, 3, 6, 9]));

    assert!(matches!(
        range(Some(Value::from(0)), Value::from(10), Some(Value::from(0)), Some(&int)),
        Err(Error::ZeroStep { .. })
    ));
}

#[test]
fn linspace_example() {
    let a = linspace(
        Value::from(0.0),
        Value::from(1.0),
        Value::from(5),
        Some(&Type::float64()),
    )
    .unwrap();
    assert_eq!(
        a.to_value().unwrap(),
        Value::from(vec![0.0, 0.25, 0.5, 0.75, 1.0])
    );
}

#[test]
fn oversized_requests_fail_to_allocate() {
    let tp: Type = "4611686018427387904 * 4 * int8".parse().unwrap();
    assert!(matches!(Array::allocate(&tp), Err(Error::AllocationFailed(_))));
    assert!(matches!(
        linspace(Value::from(0.0), Value::from(1.0), Value::from(1u64 << 62), Some(&Type::float32())),
        Err(Error::AllocationFailed(_))
    ));
}

#[test]
fn readonly_views_refuse_writes() {
    let a = counting(&[4]).readonly().unwrap();
    assert_eq!(
        a.assign(0, &Value::from(1)),
        Err(Error::Permission("assign"))
    );
}
