//! Per-command flag sets
//!
//! Every command in the tree owns one [`FlagSet`]: a named collection of
//! declared flags, the positional arguments left over after parsing, and the
//! stream its usage text is written to. Declaring a flag returns a shared
//! binding (`Rc` with interior mutability) that an action closure can capture
//! and read after dispatch, so parsed values flow to the code that needs them
//! without any global state.
//!
//! [`FlagSet::parse`] is the standard parser and can be passed directly to
//! [`Command::execute`](crate::command::Command::execute); callers that need
//! different parsing rules inject their own function with the same signature.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

/// Errors produced while parsing an argument list against a [`FlagSet`]
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("flag provided but not defined: -{0}")]
    UnknownFlag(String),
    #[error("flag needs an argument: -{0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for flag -{name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    /// `-h` or `-help` was passed without a flag of that name being defined.
    #[error("help requested")]
    Help,
}

/// Storage a declared flag writes into when parsed. The same `Rc` is handed
/// back to the caller at declaration time.
enum Binding {
    Bool(Rc<Cell<bool>>),
    Int(Rc<Cell<i64>>),
    Str(Rc<RefCell<String>>),
}

impl Binding {
    fn set(&self, name: &str, value: &str) -> Result<(), ParseError> {
        match self {
            Binding::Bool(cell) => cell.set(parse_bool(name, value)?),
            Binding::Int(cell) => {
                let parsed = value.parse().map_err(|e: std::num::ParseIntError| {
                    ParseError::InvalidValue {
                        name: name.to_string(),
                        value: value.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                cell.set(parsed);
            }
            Binding::Str(slot) => *slot.borrow_mut() = value.to_string(),
        }
        Ok(())
    }

    fn is_bool(&self) -> bool {
        matches!(self, Binding::Bool(_))
    }

    /// Type label shown after the flag name in the defaults listing. Bools
    /// take no value, so they get none.
    fn type_label(&self) -> Option<&'static str> {
        match self {
            Binding::Bool(_) => None,
            Binding::Int(_) => Some("int"),
            Binding::Str(_) => Some("string"),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ParseError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ParseError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

struct Flag {
    usage: String,
    /// Rendered default for the listing; `None` when the default is the
    /// type's zero value.
    default: Option<String>,
    binding: Binding,
}

/// A named set of declared flags and, after [`parse`](FlagSet::parse), the
/// remaining positional arguments.
pub struct FlagSet {
    name: String,
    flags: BTreeMap<String, Flag>,
    args: Rc<RefCell<Vec<String>>>,
    output: Box<dyn Write>,
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagSet")
            .field("name", &self.name)
            .field("flags", &self.flags.keys().collect::<Vec<_>>())
            .field("args", &self.args.borrow())
            .finish_non_exhaustive()
    }
}

impl FlagSet {
    /// Creates an empty flag set. Usage text goes to stderr until
    /// [`set_output`](FlagSet::set_output) replaces the stream.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        FlagSet {
            name: name.into(),
            flags: BTreeMap::new(),
            args: Rc::new(RefCell::new(Vec::new())),
            output: Box::new(std::io::stderr()),
        }
    }

    /// The identifier used in `Usage of X:` headers.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a boolean flag and returns its shared binding.
    pub fn bool_flag(&mut self, name: &str, default: bool, usage: &str) -> Rc<Cell<bool>> {
        let cell = Rc::new(Cell::new(default));
        let rendered = default.then(|| "true".to_string());
        self.register(name, usage, rendered, Binding::Bool(Rc::clone(&cell)));
        cell
    }

    /// Declares an integer flag and returns its shared binding.
    pub fn int_flag(&mut self, name: &str, default: i64, usage: &str) -> Rc<Cell<i64>> {
        let cell = Rc::new(Cell::new(default));
        let rendered = (default != 0).then(|| default.to_string());
        self.register(name, usage, rendered, Binding::Int(Rc::clone(&cell)));
        cell
    }

    /// Declares a string flag and returns its shared binding.
    pub fn string_flag(&mut self, name: &str, default: &str, usage: &str) -> Rc<RefCell<String>> {
        let slot = Rc::new(RefCell::new(default.to_string()));
        let rendered = (!default.is_empty()).then(|| format!("{default:?}"));
        self.register(name, usage, rendered, Binding::Str(Rc::clone(&slot)));
        slot
    }

    fn register(&mut self, name: &str, usage: &str, default: Option<String>, binding: Binding) {
        let flag = Flag {
            usage: usage.to_string(),
            default,
            binding,
        };
        if self.flags.insert(name.to_string(), flag).is_some() {
            debug!("flag -{name} redefined in set `{}`", self.name);
        }
    }

    /// Parses `args` against the declared flags, the standard parser for
    /// dispatch.
    ///
    /// Flags accept one or two leading dashes. Values are given as
    /// `-name=value` for any flag or `-name value` for flags that take a
    /// value; a bare boolean flag sets it to true. Parsing stops at `--` or
    /// at the first token that is not a flag (a lone `-` counts as
    /// positional); that token and everything after it become the remaining
    /// positionals.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownFlag`] for an undeclared flag,
    /// [`ParseError::MissingValue`] when a value flag ends the argument list,
    /// [`ParseError::InvalidValue`] when a value does not parse, and
    /// [`ParseError::Help`] when `-h` or `-help` is passed without such a
    /// flag being declared.
    pub fn parse(&mut self, args: &[String]) -> Result<(), ParseError> {
        self.args.borrow_mut().clear();

        let mut i = 0;
        while i < args.len() {
            let token = args[i].as_str();
            if token == "--" {
                i += 1;
                break;
            }
            if token == "-" || !token.starts_with('-') {
                break;
            }

            let stripped = token.strip_prefix("--").unwrap_or(&token[1..]);
            let (name, inline) = match stripped.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (stripped, None),
            };

            let Some(flag) = self.flags.get(name) else {
                if inline.is_none() && (name == "h" || name == "help") {
                    return Err(ParseError::Help);
                }
                return Err(ParseError::UnknownFlag(name.to_string()));
            };

            match inline {
                Some(value) => flag.binding.set(name, value)?,
                None if flag.binding.is_bool() => flag.binding.set(name, "true")?,
                None => {
                    i += 1;
                    let Some(value) = args.get(i) else {
                        return Err(ParseError::MissingValue(name.to_string()));
                    };
                    flag.binding.set(name, value)?;
                }
            }
            i += 1;
        }

        self.args.borrow_mut().extend_from_slice(&args[i..]);
        Ok(())
    }

    /// The `i`-th remaining positional argument, if any.
    #[must_use]
    pub fn arg(&self, i: usize) -> Option<String> {
        self.args.borrow().get(i).cloned()
    }

    /// All remaining positional arguments.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        self.args.borrow().clone()
    }

    /// Shared handle to the post-parse positionals, for action closures that
    /// interpret trailing arguments themselves.
    #[must_use]
    pub fn positionals(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.args)
    }

    /// The stream usage text is written to.
    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Redirects usage text, e.g. to stdout or a capture buffer in tests.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Writes a listing of the declared flags to the configured output, in
    /// flag-name order. Write failures are swallowed; usage output is
    /// best-effort.
    pub fn print_defaults(&mut self) {
        for (name, flag) in &self.flags {
            let _ = match flag.binding.type_label() {
                Some(label) => writeln!(self.output, "  -{name} {label}"),
                None => writeln!(self.output, "  -{name}"),
            };
            let _ = match &flag.default {
                Some(default) => writeln!(self.output, "        {} (default {default})", flag.usage),
                None => writeln!(self.output, "        {}", flag.usage),
            };
        }
    }

    /// Writes the `Usage of X:` header followed by the flag listing. The
    /// command layer extends this with the subcommand listing; see
    /// [`Command::usage`](crate::command::Command::usage).
    pub fn usage(&mut self) {
        let _ = writeln!(self.output, "Usage of {}:", self.name);
        self.print_defaults();
    }
}
