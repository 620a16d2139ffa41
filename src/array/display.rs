use std::fmt::Display;

use super::core::Array;
use super::value::Value;
use crate::session::PrintOptions;

/// An array paired with the options used to print it.
pub struct ArrayDisplay<'a> {
    array: &'a Array,
    options: &'a PrintOptions,
}

impl Array {
    pub fn display<'a>(&'a self, options: &'a PrintOptions) -> ArrayDisplay<'a> {
        ArrayDisplay {
            array: self,
            options,
        }
    }
}

impl Display for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.display(&PrintOptions::default()).fmt(f)
    }
}

const PREFIX: &str = "array(";

impl Display for ArrayDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Ok(tp) = self.array.get_type() else {
            return write!(f, "array(null)");
        };
        match self.array.to_value() {
            Ok(value) => {
                let body = render(&value, self.options, PREFIX.len());
                write!(f, "{PREFIX}{body}, type=\"{tp}\")")
            }
            Err(_) => write!(f, "{PREFIX}<unreadable>, type=\"{tp}\")"),
        }
    }
}

fn render_scalar(value: &Value, options: &PrintOptions) -> String {
    match (value, options.precision) {
        (Value::Float(x), Some(p)) => format!("{x:.p$}"),
        (Value::Struct(fields), _) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, v)| format!("{name}: {}", render(v, options, 0)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        (v, _) => v.to_string(),
    }
}

/// Render `value`, wrapping lists that would run past `options.width`.
/// `indent` is the column the rendered text starts at.
fn render(value: &Value, options: &PrintOptions, indent: usize) -> String {
    let Value::List(items) = value else {
        return render_scalar(value, options);
    };

    // keep the first and last few entries of long lists
    let n = items.len();
    let shown: Vec<Option<&Value>> = if n > options.max_items {
        let head = options.max_items.div_ceil(2);
        let tail = options.max_items / 2;
        items[..head]
            .iter()
            .map(Some)
            .chain(std::iter::once(None))
            .chain(items[n - tail..].iter().map(Some))
            .collect()
    } else {
        items.iter().map(Some).collect()
    };

    let strs: Vec<String> = shown
        .iter()
        .map(|item| match item {
            Some(v) => render(v, options, indent + 1),
            None => "...".to_string(),
        })
        .collect();

    let nested = items.iter().any(|v| matches!(v, Value::List(_)));
    let pad = " ".repeat(indent + 1);
    let mut out = String::from("[");

    if nested {
        out.push_str(&strs.join(&format!(",\n{pad}")));
    } else {
        let mut col = indent + 1;
        for (i, s) in strs.iter().enumerate() {
            if i > 0 {
                if col + 2 + s.len() > options.width {
                    out.push_str(",\n");
                    out.push_str(&pad);
                    col = indent + 1;
                } else {
                    out.push_str(", ");
                    col += 2;
                }
            }
            out.push_str(s);
            col += s.len();
        }
    }

    out.push(']');
    out
}
