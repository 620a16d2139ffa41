use crate::cli::Cli;

/// Options controlling how arrays are printed.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    /// Column at which lists wrap onto a new line.
    pub width: usize,
    /// Longest list printed in full; longer ones keep their first and last
    /// entries around an ellipsis.
    pub max_items: usize,
    /// Digits after the decimal point for floating point values.
    pub precision: Option<usize>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        PrintOptions {
            width: 80,
            max_items: 100,
            precision: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub print: PrintOptions,
    pub verbosity: u8,
}

impl From<&Cli> for Session {
    fn from(value: &Cli) -> Self {
        let defaults = PrintOptions::default();
        Session {
            print: PrintOptions {
                width: value.width.unwrap_or(defaults.width),
                max_items: value.max_items.unwrap_or(defaults.max_items),
                precision: value.precision,
            },
            verbosity: value.verbose,
        }
    }
}
