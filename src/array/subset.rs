use std::fmt::Display;
use std::ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo};
use std::str::FromStr;

use pest::iterators::Pair;
use pest::Parser;

use crate::error::{Error, Result};
use crate::internal_err;

/// A single index applied to one dimension (or struct level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpec {
    /// Select one position, removing the dimension. Negative indices count
    /// from the end.
    Index(isize),
    /// Select positions `start..stop` every `step`, with slice semantics:
    /// missing bounds span the whole dimension and out of range bounds are
    /// clamped.
    Range {
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    },
    /// Stands for as many full ranges as needed to cover the remaining
    /// dimensions.
    Ellipsis,
}

impl IndexSpec {
    pub fn range(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> IndexSpec {
        IndexSpec::Range { start, stop, step }
    }

    /// The full range `:`.
    pub fn all() -> IndexSpec {
        IndexSpec::range(None, None, None)
    }

    /// Whether this index leaves a dimension untouched.
    pub fn is_full_range(&self) -> bool {
        matches!(
            self,
            IndexSpec::Range {
                start: None,
                stop: None,
                step: None | Some(1)
            }
        )
    }
}

impl Display for IndexSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn bound(b: &Option<isize>) -> String {
            b.map_or(String::new(), |b| b.to_string())
        }
        match self {
            IndexSpec::Index(i) => write!(f, "{i}"),
            IndexSpec::Range { start, stop, step } => {
                write!(f, "{}:{}", bound(start), bound(stop))?;
                match step {
                    Some(step) => write!(f, ":{step}"),
                    None => Ok(()),
                }
            }
            IndexSpec::Ellipsis => write!(f, "..."),
        }
    }
}

/// Subscript
///
/// A full index expression: a lone ellipsis, a single index applied to the
/// first dimension, or a tuple of indices applied to leading dimensions in
/// order.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    Ellipsis,
    Single(IndexSpec),
    Tuple(Vec<IndexSpec>),
}

impl Subscript {
    /// The indices to apply, outermost dimension first.
    pub fn specs(&self) -> Vec<IndexSpec> {
        match self {
            Subscript::Ellipsis => vec![IndexSpec::Ellipsis],
            Subscript::Single(spec) => vec![*spec],
            Subscript::Tuple(specs) => specs.clone(),
        }
    }

    /// Replace the ellipsis (if any) with full ranges so that exactly
    /// `ndim` leading dimensions are indexed. At most one ellipsis may
    /// appear.
    pub fn expand(&self, ndim: usize) -> Result<Vec<IndexSpec>> {
        let specs = self.specs();
        let n_ellipsis = specs.iter().filter(|s| **s == IndexSpec::Ellipsis).count();
        if n_ellipsis > 1 {
            return Err(Error::InvalidSubscript(format!(
                "an index can only have a single ellipsis, found {n_ellipsis} in {self}"
            )));
        }

        let given = specs.len() - n_ellipsis;
        let fill = ndim.saturating_sub(given);
        Ok(specs
            .into_iter()
            .flat_map(|s| match s {
                IndexSpec::Ellipsis => vec![IndexSpec::all(); fill],
                s => vec![s],
            })
            .collect())
    }
}

impl Display for Subscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subscript::Ellipsis => write!(f, "..."),
            Subscript::Single(spec) => write!(f, "{spec}"),
            Subscript::Tuple(specs) => {
                let parts: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

impl From<isize> for IndexSpec {
    fn from(i: isize) -> Self {
        IndexSpec::Index(i)
    }
}

impl From<i32> for IndexSpec {
    fn from(i: i32) -> Self {
        IndexSpec::Index(i as isize)
    }
}

impl From<usize> for IndexSpec {
    fn from(i: usize) -> Self {
        IndexSpec::Index(i as isize)
    }
}

impl From<Range<isize>> for IndexSpec {
    fn from(r: Range<isize>) -> Self {
        IndexSpec::range(Some(r.start), Some(r.end), None)
    }
}

impl From<RangeInclusive<isize>> for IndexSpec {
    fn from(r: RangeInclusive<isize>) -> Self {
        // an inclusive end of -1 or isize::MAX runs to the end of the dimension
        let stop = r.end().checked_add(1).filter(|&stop| stop != 0);
        IndexSpec::range(Some(*r.start()), stop, None)
    }
}

impl From<RangeFrom<isize>> for IndexSpec {
    fn from(r: RangeFrom<isize>) -> Self {
        IndexSpec::range(Some(r.start), None, None)
    }
}

impl From<RangeTo<isize>> for IndexSpec {
    fn from(r: RangeTo<isize>) -> Self {
        IndexSpec::range(None, Some(r.end), None)
    }
}

impl From<RangeFull> for IndexSpec {
    fn from(_: RangeFull) -> Self {
        IndexSpec::all()
    }
}

impl From<IndexSpec> for Subscript {
    fn from(spec: IndexSpec) -> Self {
        match spec {
            IndexSpec::Ellipsis => Subscript::Ellipsis,
            spec => Subscript::Single(spec),
        }
    }
}

macro_rules! subscript_from_spec {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Subscript {
                fn from(spec: $t) -> Self {
                    Subscript::from(IndexSpec::from(spec))
                }
            }
        )+
    };
}

subscript_from_spec!(
    isize,
    i32,
    usize,
    Range<isize>,
    RangeInclusive<isize>,
    RangeFrom<isize>,
    RangeTo<isize>,
    RangeFull
);

impl From<Vec<IndexSpec>> for Subscript {
    fn from(specs: Vec<IndexSpec>) -> Self {
        Subscript::Tuple(specs)
    }
}

macro_rules! subscript_from_tuple {
    ($($t:ident),+) => {
        impl<$($t: Into<IndexSpec>),+> From<($($t,)+)> for Subscript {
            #[allow(non_snake_case)]
            fn from(($($t,)+): ($($t,)+)) -> Self {
                Subscript::Tuple(vec![$($t.into()),+])
            }
        }
    };
}

subscript_from_tuple!(A, B);
subscript_from_tuple!(A, B, C);
subscript_from_tuple!(A, B, C, D);

#[derive(pest_derive::Parser)]
#[grammar = "array/subscript.pest"]
struct SubscriptParser;

/// Parse an index expression such as `1`, `::-1` or `(..., 0, 1:3)`.
pub fn parse_subscript(s: &str) -> Result<Subscript> {
    let mut pairs = SubscriptParser::parse(Rule::subscript, s)
        .map_err(|e| Error::InvalidSubscript(e.to_string()))?;

    let Some(subscript) = pairs.next() else {
        return internal_err!("empty parse for subscript");
    };

    let Some(inner) = subscript.into_inner().next() else {
        return internal_err!("subscript without an index");
    };

    match inner.as_rule() {
        Rule::tuple => Ok(Subscript::Tuple(
            inner.into_inner().map(parse_spec).collect::<Result<_>>()?,
        )),
        _ => Ok(Subscript::from(parse_spec(inner)?)),
    }
}

fn parse_spec(pair: Pair<Rule>) -> Result<IndexSpec> {
    match pair.as_rule() {
        Rule::ellipsis => Ok(IndexSpec::Ellipsis),
        Rule::index => Ok(IndexSpec::Index(parse_integer(pair.as_str())?)),
        Rule::range => {
            let mut bounds = pair
                .into_inner()
                .map(|bound| match bound.into_inner().next() {
                    Some(i) => parse_integer(i.as_str()).map(Some),
                    None => Ok(None),
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter();
            let start = bounds.next().flatten();
            let stop = bounds.next().flatten();
            let step = bounds.next().flatten();
            Ok(IndexSpec::range(start, stop, step))
        }
        rule => internal_err!(format!("unexpected index rule {rule:?}")),
    }
}

fn parse_integer(s: &str) -> Result<isize> {
    s.parse()
        .map_err(|_| Error::InvalidSubscript(format!("index {s} is out of range")))
}

impl FromStr for Subscript {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_subscript(s)
    }
}
