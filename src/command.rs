//! The command tree: named nodes, recursive resolution, dispatch
//!
//! A [`Command`] is one point in the dispatch hierarchy. It owns its own
//! [`FlagSet`], an optional terminal action, and a name-keyed map of
//! subcommands. [`Command::execute`] parses the current level's flags with an
//! injected parser, consumes the first remaining positional as a subcommand
//! name, and descends until no child matches. The resolved node either runs
//! its action or, for router nodes, renders usage and reports the
//! [`DispatchError::Usage`] sentinel — the dispatcher never terminates the
//! process itself, so it can be embedded in long-lived hosts.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use log::debug;
use thiserror::Error;

use crate::flags::{FlagSet, ParseError};

/// Boxed error returned by terminal actions; opaque to the dispatcher.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Zero-argument callback run once traversal resolves to an actionable node.
/// Actions capture the flag bindings they need at construction time.
pub type Action = Box<dyn FnMut() -> Result<(), ActionError>>;

/// Outcomes of [`Command::execute`] other than a successful action run
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Flag parsing failed at some tree level; levels below it were never
    /// visited.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Help was requested at `command`, whose usage has already been written.
    #[error("help requested for `{command}`")]
    Help { command: String },
    /// Traversal resolved to `command`, which has no action; its usage has
    /// already been written.
    #[error("`{command}` is not a runnable command")]
    Usage { command: String },
    /// The terminal action failed; passed through without added context.
    #[error("{0}")]
    Action(ActionError),
}

impl DispatchError {
    /// Conventional process exit status for this outcome: 2 for usage and
    /// parse errors, 0 for an explicit help request, 1 for action failures.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchError::Help { .. } => 0,
            DispatchError::Action(_) => 1,
            DispatchError::Parse(_) | DispatchError::Usage { .. } => 2,
        }
    }
}

/// Duplicate registration reported by [`Command::try_add_command`]
#[derive(Error, Debug)]
#[error("subcommand `{name}` is already registered under `{parent}`")]
pub struct DuplicateCommand {
    pub parent: String,
    pub name: String,
}

/// A named node in the dispatch tree, optionally bearing an action and
/// subcommands.
pub struct Command {
    name: String,
    flags: FlagSet,
    action: Option<Action>,
    children: BTreeMap<String, Command>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("action", &self.action.is_some())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Creates a node with no subcommands. An absent action marks a router
    /// node that exists to group subcommands; resolving to it renders usage
    /// instead of running anything.
    #[must_use]
    pub fn new(name: impl Into<String>, flags: FlagSet, action: Option<Action>) -> Self {
        Command {
            name: name.into(),
            flags,
            action,
            children: BTreeMap::new(),
        }
    }

    /// The name used for tree lookup and usage display.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `child` under its name. A later registration with the same
    /// name replaces the earlier one; callers that want duplicates rejected
    /// use [`try_add_command`](Command::try_add_command) instead.
    pub fn add_command(&mut self, child: Command) {
        let name = child.name.clone();
        if self.children.insert(name.clone(), child).is_some() {
            debug!("subcommand `{name}` of `{}` replaced by a later registration", self.name);
        }
    }

    /// Strict registration for callers that treat a duplicate name as a bug.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateCommand`] if a child with the same name is already
    /// registered; the existing child is left in place.
    pub fn try_add_command(&mut self, child: Command) -> Result<(), DuplicateCommand> {
        if self.children.contains_key(&child.name) {
            return Err(DuplicateCommand {
                parent: self.name.clone(),
                name: child.name,
            });
        }
        self.add_command(child);
        Ok(())
    }

    /// Writes this node's usage to its flag set's output: the `Usage of X:`
    /// header, the flag listing, and the names of any direct subcommands in
    /// deterministic (sorted) order. Write failures are swallowed.
    pub fn usage(&mut self) {
        self.flags.usage();
        if !self.children.is_empty() {
            let names = self
                .children
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(self.flags.output(), "\nAvailable commands: {names}.");
        }
    }

    /// Parses flags level by level, descends into matching subcommands, and
    /// runs the action of the deepest match. `args` is the raw argument list
    /// without the program name. The parser is injected so parsing behavior
    /// stays swappable; [`FlagSet::parse`] is the standard choice.
    ///
    /// The parser runs exactly once per visited level, and never for levels
    /// below the resolved node. A positional that matches no subcommand stops
    /// descent there and is left, with everything after it, for the resolved
    /// node's action to interpret.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Parse`] if the parser fails at any level.
    /// - [`DispatchError::Help`] if the parser reports a help request; the
    ///   usage of the node it happened at has already been written.
    /// - [`DispatchError::Usage`] if the resolved node has no action; its
    ///   usage has already been written. Callers conventionally map this to
    ///   exit status 2, see [`DispatchError::exit_code`].
    /// - [`DispatchError::Action`] carrying the action's own error, verbatim.
    pub fn execute<P>(&mut self, args: &[String], mut parser: P) -> Result<(), DispatchError>
    where
        P: FnMut(&mut FlagSet, &[String]) -> Result<(), ParseError>,
    {
        self.dispatch(args, &mut parser)
    }

    fn dispatch<P>(&mut self, args: &[String], parser: &mut P) -> Result<(), DispatchError>
    where
        P: FnMut(&mut FlagSet, &[String]) -> Result<(), ParseError>,
    {
        match parser(&mut self.flags, args) {
            Ok(()) => {}
            Err(ParseError::Help) => {
                self.usage();
                return Err(DispatchError::Help {
                    command: self.name.clone(),
                });
            }
            Err(err) => return Err(DispatchError::Parse(err)),
        }

        if let Some(head) = self.flags.arg(0)
            && let Some(child) = self.children.get_mut(&head)
        {
            debug!("`{}`: descending into `{head}`", self.name);
            let rest = self.flags.args().split_off(1);
            return child.dispatch(&rest, parser);
        }

        match self.action {
            Some(ref mut action) => action().map_err(DispatchError::Action),
            None => {
                debug!("`{}` has no action, rendering usage", self.name);
                self.usage();
                Err(DispatchError::Usage {
                    command: self.name.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capturing_flags(name: &str, buf: &SharedBuf) -> FlagSet {
        let mut flags = FlagSet::new(name);
        flags.set_output(Box::new(buf.clone()));
        flags
    }

    fn marker_action(ran: &Rc<Cell<bool>>) -> Action {
        let ran = Rc::clone(ran);
        Box::new(move || {
            ran.set(true);
            Ok(())
        })
    }

    #[test]
    fn test_add_command_last_wins() {
        let ran_first = Rc::new(Cell::new(false));
        let ran_second = Rc::new(Cell::new(false));
        let mut root = Command::new("root", FlagSet::new("root"), None);
        root.add_command(Command::new(
            "dup",
            FlagSet::new("dup"),
            Some(marker_action(&ran_first)),
        ));
        root.add_command(Command::new(
            "dup",
            FlagSet::new("dup"),
            Some(marker_action(&ran_second)),
        ));

        root.execute(&["dup".to_string()], FlagSet::parse).unwrap();
        assert!(!ran_first.get());
        assert!(ran_second.get());
    }

    #[test]
    fn test_try_add_command_rejects_duplicate() {
        let mut root = Command::new("root", FlagSet::new("root"), None);
        root.try_add_command(Command::new("serve", FlagSet::new("serve"), None))
            .unwrap();
        let err = root
            .try_add_command(Command::new("serve", FlagSet::new("serve"), None))
            .unwrap_err();
        assert_eq!(err.parent, "root");
        assert_eq!(err.name, "serve");
    }

    #[test]
    fn test_usage_lists_children_sorted() {
        let buf = SharedBuf::default();
        let mut flags = capturing_flags("mytool", &buf);
        flags.bool_flag("v", false, "verbose output");
        let mut root = Command::new("mytool", flags, None);
        root.add_command(Command::new("serve", FlagSet::new("serve"), None));
        root.add_command(Command::new("deploy", FlagSet::new("deploy"), None));

        root.usage();
        insta::assert_snapshot!(buf.contents(), @r"
Usage of mytool:
  -v
        verbose output

Available commands: deploy, serve.
");
    }

    #[test]
    fn test_usage_without_children_omits_listing() {
        let buf = SharedBuf::default();
        let mut leaf = Command::new("serve", capturing_flags("serve", &buf), None);
        leaf.usage();
        assert!(!buf.contents().contains("Available commands"));
        assert!(buf.contents().starts_with("Usage of serve:"));
    }

    #[test]
    fn test_help_renders_usage_of_current_node() {
        let buf = SharedBuf::default();
        let mut root = Command::new("mytool", capturing_flags("mytool", &buf), None);
        root.add_command(Command::new("serve", FlagSet::new("serve"), None));

        let err = root
            .execute(&["-h".to_string()], FlagSet::parse)
            .unwrap_err();
        match err {
            DispatchError::Help { command } => assert_eq!(command, "mytool"),
            other => panic!("Expected Help, got: {other:?}"),
        }
        assert!(buf.contents().contains("Usage of mytool:"));
        assert!(buf.contents().contains("Available commands: serve."));
    }

    #[test]
    fn test_exit_codes() {
        let usage = DispatchError::Usage {
            command: "root".to_string(),
        };
        let help = DispatchError::Help {
            command: "root".to_string(),
        };
        let action = DispatchError::Action("boom".into());
        let parse = DispatchError::Parse(ParseError::Help);
        assert_eq!(usage.exit_code(), 2);
        assert_eq!(help.exit_code(), 0);
        assert_eq!(action.exit_code(), 1);
        assert_eq!(parse.exit_code(), 2);
    }

    #[test]
    fn test_debug_omits_closures() {
        let mut root = Command::new("root", FlagSet::new("root"), None);
        root.add_command(Command::new(
            "serve",
            FlagSet::new("serve"),
            Some(Box::new(|| Ok(()))),
        ));
        let rendered = format!("{root:?}");
        assert!(rendered.contains("\"serve\""));
        assert!(rendered.contains("action: true"));
    }
}
