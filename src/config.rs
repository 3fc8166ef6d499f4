// ABOUTME: Version, REPL prompt constants and the interpreter options record

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const WELCOME_MESSAGE: &str = "Welcome to glorp!";
pub const PROMPT: &str = ">> ";
pub const CONTINUATION_PROMPT: &str = ".. ";
pub const QUIT_COMMAND: &str = ":q";

pub const REPL_FILENAME: &str = "interactive";
pub const STDIN_FILENAME: &str = "<stdin>";

/// Options threaded through one interpretation. Imports inherit the
/// importer's options with the file name swapped for the target.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub file_name: String,

    /// Remaining CLI positionals, exposed to programs as the `args`
    /// variable (a list of char lists).
    pub args: Vec<String>,

    /// Print the token stream instead of evaluating.
    pub lex: bool,
    /// Print the expression tree instead of evaluating.
    pub ast: bool,
    /// Force the interactive REPL.
    pub repl: bool,
    /// Dump interpreter internals after the run.
    pub verbose: bool,
}

impl Options {
    pub fn for_file(file_name: impl Into<String>) -> Options {
        Options {
            file_name: file_name.into(),
            ..Options::default()
        }
    }
}
