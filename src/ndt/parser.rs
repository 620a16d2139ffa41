/// Type String Parser
///
/// Parses datashape-style type strings such as `3 * 4 * int32`,
/// `var * {name: string, score: float64}` or `pointer[2 * int8]` into a
/// [`Type`]. The grammar lives in `datashape.pest`; the functions here walk
/// the resulting `pest::iterators::Pair`s and build descriptor nodes.
///
use std::str::FromStr;

use pest::iterators::Pair;
use pest::Parser;

use super::core::Type;
use super::kind::ScalarType;
use crate::error::{Error, Result};
use crate::internal_err;

#[derive(pest_derive::Parser)]
#[grammar = "ndt/datashape.pest"]
struct DatashapeParser;

pub fn parse_type(s: &str) -> Result<Type> {
    let mut pairs = DatashapeParser::parse(Rule::datashape, s)
        .map_err(|e| Error::TypeParse(e.to_string()))?;

    let Some(datashape) = pairs.next() else {
        return internal_err!("empty parse for datashape");
    };

    match datashape.into_inner().next() {
        Some(tp) if tp.as_rule() == Rule::tp => parse_tp(tp),
        _ => internal_err!("expected a type"),
    }
}

fn parse_tp(pair: Pair<Rule>) -> Result<Type> {
    let mut dims = vec![];
    let mut dtype = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::dim => dims.push(inner),
            _ => dtype = Some(parse_dtype(inner)?),
        }
    }

    let Some(dtype) = dtype else {
        return internal_err!("type without a dtype");
    };

    dims.into_iter().rev().try_fold(dtype, |el, dim| {
        let Some(dim) = dim.into_inner().next() else {
            return internal_err!("empty dimension");
        };
        match dim.as_rule() {
            Rule::fixed_dim => Ok(Type::fixed_dim(parse_integer(dim.as_str())?, el)),
            Rule::var_dim => Ok(Type::var_dim(el)),
            rule => internal_err!(format!("unexpected dimension rule {rule:?}")),
        }
    })
}

fn parse_dtype(pair: Pair<Rule>) -> Result<Type> {
    match pair.as_rule() {
        Rule::struct_type => {
            let fields = pair
                .into_inner()
                .map(|field| {
                    let mut inner = field.into_inner();
                    match (inner.next(), inner.next()) {
                        (Some(name), Some(tp)) => Ok((name.as_str().to_string(), parse_tp(tp)?)),
                        _ => internal_err!("malformed struct field"),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Type::make_struct(fields)
        }
        Rule::pointer_type => match pair.into_inner().next() {
            Some(target) => Ok(Type::pointer(parse_tp(target)?)),
            None => internal_err!("pointer without a target"),
        },
        Rule::fixed_string => match pair.into_inner().next() {
            Some(n) => Ok(Type::fixed_string(parse_integer(n.as_str())?)),
            None => internal_err!("fixed_string without a size"),
        },
        Rule::fixed_bytes => {
            let mut inner = pair.into_inner();
            let size = match inner.next() {
                Some(n) => parse_integer(n.as_str())?,
                None => return internal_err!("fixed_bytes without a size"),
            };
            let align = match inner.next() {
                Some(n) => parse_integer(n.as_str())?,
                None => 1,
            };
            if !align.is_power_of_two() || (size > 0 && size % align != 0) {
                return Err(Error::TypeParse(format!(
                    "fixed_bytes[{size}, align={align}] has an invalid alignment"
                )));
            }
            Ok(Type::fixed_bytes(size, align))
        }
        Rule::scalar_name => parse_scalar_name(pair.as_str()),
        rule => internal_err!(format!("unexpected type rule {rule:?}")),
    }
}

fn parse_scalar_name(name: &str) -> Result<Type> {
    match name {
        "string" => Ok(Type::string()),
        "bytes" => Ok(Type::bytes()),
        "object" => Ok(Type::object()),
        // common aliases
        "int" => Ok(Type::int32()),
        "real" | "float" => Ok(Type::float64()),
        _ => ScalarType::from_str(name)
            .map(Type::scalar)
            .map_err(|_| Error::TypeParse(format!("unknown type name '{name}'"))),
    }
}

fn parse_integer(s: &str) -> Result<usize> {
    s.parse::<usize>()
        .map_err(|_| Error::TypeParse(format!("'{s}' is not a valid size")))
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_type(s)
    }
}
