//! Hierarchical subcommand dispatch with per-command flag sets
//!
//! A tool built on this crate assembles a tree of [`Command`] nodes at
//! startup, each owning its own [`FlagSet`], then hands the raw argument list
//! to [`Command::execute`]. Traversal parses the current node's flags,
//! consumes the first remaining positional as a subcommand name, and descends
//! until no child matches; the resolved node's action runs with every visited
//! level parsed exactly once.
//!
//! Nodes without an action are routers: resolving to one renders its usage
//! and yields [`DispatchError::Usage`] instead of terminating the process, so
//! the dispatcher can also be embedded in long-lived hosts. One-shot CLIs map
//! outcomes to conventional exit statuses with [`DispatchError::exit_code`]:
//!
//! ```no_run
//! use std::process::ExitCode;
//!
//! use cmdtree::{Command, DispatchError, FlagSet};
//!
//! fn main() -> ExitCode {
//!     let mut serve_flags = FlagSet::new("serve");
//!     let addr = serve_flags.string_flag("addr", "127.0.0.1:8080", "listen address");
//!     let serve = Command::new(
//!         "serve",
//!         serve_flags,
//!         Some(Box::new(move || {
//!             println!("serving on {}", addr.borrow());
//!             Ok(())
//!         })),
//!     );
//!
//!     let mut root = Command::new("mytool", FlagSet::new("mytool"), None);
//!     root.add_command(serve);
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     match root.execute(&args, FlagSet::parse) {
//!         Ok(()) => ExitCode::SUCCESS,
//!         Err(err) => {
//!             // Usage and help have already written their text.
//!             if !matches!(err, DispatchError::Usage { .. } | DispatchError::Help { .. }) {
//!                 eprintln!("{err}");
//!             }
//!             ExitCode::from(err.exit_code())
//!         }
//!     }
//! }
//! ```

pub mod command;
pub mod flags;

pub use command::{Action, ActionError, Command, DispatchError, DuplicateCommand};
pub use flags::{FlagSet, ParseError};
