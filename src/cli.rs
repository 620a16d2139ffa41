use crate::array::{linspace, range, Array, Subscript, Value};
use crate::error::{Error, Result};
use crate::ndt::{Type, TypeNode};
use crate::session::Session;

/// Inspect array types, views and generated sequences.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "ndview", version)]
pub struct Cli {
    /// Column at which printed lists wrap
    #[arg(long, global = true)]
    pub width: Option<usize>,

    /// Longest list printed without eliding entries
    #[arg(long, global = true)]
    pub max_items: Option<usize>,

    /// Digits printed after the decimal point
    #[arg(long, global = true)]
    pub precision: Option<usize>,

    /// Log more (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Show the layout of a type string, e.g. "3 * {x: int32, y: float64}"
    Describe { tp: Type },

    /// Print evenly spaced values in [start, stop)
    Range {
        #[arg(value_parser = parse_number, allow_hyphen_values = true)]
        stop: Value,
        #[arg(long, value_parser = parse_number, allow_hyphen_values = true)]
        start: Option<Value>,
        #[arg(long, value_parser = parse_number, allow_hyphen_values = true)]
        step: Option<Value>,
        #[arg(long = "type")]
        tp: Option<Type>,
    },

    /// Print COUNT evenly spaced values from START to STOP
    Linspace {
        #[arg(value_parser = parse_number, allow_hyphen_values = true)]
        start: Value,
        #[arg(value_parser = parse_number, allow_hyphen_values = true)]
        stop: Value,
        #[arg(value_parser = parse_number, allow_hyphen_values = true)]
        count: Value,
        #[arg(long = "type")]
        tp: Option<Type>,
    },

    /// Fill an array of TYPE with counting values and print a view of it,
    /// e.g. `view "3 * 4 * int32" "(::-1, 1:3)"`
    View {
        tp: Type,
        #[arg(allow_hyphen_values = true)]
        subscript: Subscript,
    },
}

/// Parse a command line number, keeping integers exact.
pub fn parse_number(s: &str) -> Result<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Ok(Value::UInt(u));
    }
    s.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::TypeMismatch {
            value: format!("{s:?}"),
            tp: Type::float64(),
        })
}

/// Counting values shaped like `tp`. Var dimensions get three entries.
fn counting_value(tp: &Type, next: &mut i64) -> Value {
    match tp.node() {
        TypeNode::FixedDim { size, element } => {
            Value::List((0..*size).map(|_| counting_value(element, next)).collect())
        }
        TypeNode::VarDim { element } => {
            Value::List((0..3).map(|_| counting_value(element, next)).collect())
        }
        TypeNode::Struct(st) => st
            .names()
            .iter()
            .zip(st.types())
            .map(|(name, ftp)| (name.clone(), counting_value(ftp, next)))
            .collect(),
        TypeNode::Pointer { target } => counting_value(target, next),
        node => {
            let n = *next;
            *next += 1;
            match node {
                TypeNode::Scalar(st) if !st.is_integer() && !st.is_float() => Value::Bool(n % 2 == 1),
                TypeNode::String | TypeNode::FixedString(_) => Value::String(n.to_string()),
                TypeNode::Bytes => Value::Bytes(n.to_string().into_bytes()),
                TypeNode::FixedBytes { size, .. } => Value::Bytes(vec![n as u8; *size]),
                TypeNode::Object => Value::Object(None),
                _ => Value::Int(n % 128),
            }
        }
    }
}

fn describe(tp: &Type) -> Result<String> {
    let a = Array::allocate(tp)?;
    Ok([
        format!("type:         {tp}"),
        format!("kind:         {}", tp.kind()),
        format!("ndim:         {}", a.ndim()?),
        format!("shape:        {:?}", a.shape()?),
        format!("strides:      {:?}", a.strides()?),
        format!("data size:    {}", tp.data_size()?),
        format!("arrmeta size: {}", tp.arrmeta_size()),
    ]
    .join("\n"))
}

/// Run one command, returning what it prints.
pub fn run(cli: &Cli, session: &Session) -> Result<String> {
    let print = &session.print;
    match &cli.command {
        Command::Describe { tp } => describe(tp),
        Command::Range {
            stop,
            start,
            step,
            tp,
        } => {
            let a = range(start.clone(), stop.clone(), step.clone(), tp.as_ref())?;
            Ok(a.display(print).to_string())
        }
        Command::Linspace {
            start,
            stop,
            count,
            tp,
        } => {
            let a = linspace(start.clone(), stop.clone(), count.clone(), tp.as_ref())?;
            Ok(a.display(print).to_string())
        }
        Command::View { tp, subscript } => {
            let mut next = 0;
            let a = Array::from_value(&counting_value(tp, &mut next), Some(tp))?;
            let v = a.view(subscript.clone())?;
            Ok(v.display(print).to_string())
        }
    }
}
