// ABOUTME: CLI entry point: argument parsing, script/stdin execution and
// the interactive REPL with balance-probe continuation

use clap::Parser;
use glorp::builtins::register_builtins;
use glorp::config::{
    Options, CONTINUATION_PROMPT, PROMPT, QUIT_COMMAND, REPL_FILENAME, STDIN_FILENAME,
    WELCOME_MESSAGE,
};
use glorp::env::Environment;
use glorp::interpreter::interpret;
use glorp::lexer::{needs_more_input, Source};
use glorp::value::{List, Value};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Read;
use std::process::ExitCode;
use std::rc::Rc;

/// An interpreted scripting language
#[derive(Parser, Debug)]
#[command(name = "glorp")]
#[command(about = "An interpreted scripting language")]
struct CliArgs {
    /// File to interpret, use '-' for stdin; starts the REPL when omitted
    #[arg(value_name = "FILE")]
    file: Option<String>,

    /// Arguments for the program, exposed as the `args` variable
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Print lexer output then exit
    #[arg(short = 'l', long = "lex")]
    lex: bool,

    /// Print the parsed tree then exit
    #[arg(short = 'a', long = "ast")]
    ast: bool,

    /// Start the interactive REPL
    #[arg(short = 'r', long = "repl")]
    repl: bool,

    /// Dump interpreter internals after the run
    #[arg(short = 'V', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let repl_mode = cli.repl || cli.file.is_none();
    let file = cli.file.clone().unwrap_or_default();

    let options = Rc::new(Options {
        file_name: if repl_mode {
            REPL_FILENAME.to_string()
        } else {
            file.clone()
        },
        args: cli.args,
        lex: cli.lex,
        ast: cli.ast,
        repl: repl_mode,
        verbose: cli.verbose,
    });

    let env = Environment::global();
    register_builtins(&env);
    bind_program_args(&env, &options.args);

    if repl_mode {
        return run_repl(&env, &options);
    }

    let (name, text) = if file == "-" {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("glorp: failed to read stdin: {e}");
            return ExitCode::from(1);
        }
        (STDIN_FILENAME.to_string(), input)
    } else {
        match std::fs::read_to_string(&file) {
            Ok(text) => (file.clone(), text),
            Err(e) => {
                eprintln!("glorp: {file}: {e}");
                return ExitCode::from(1);
            }
        }
    };

    let src = Source::new(name, text);
    match interpret(&src, &options, &env) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", e.report());
            ExitCode::from(1)
        }
    }
}

/// The program's `args` variable: a list of char lists.
fn bind_program_args(env: &Rc<Environment>, args: &[String]) {
    let list = List::new();
    for arg in args {
        list.push(Value::List(List::from_values(arg.chars().map(Value::Char))));
    }
    env.set_local("args", Value::List(list), false)
        .expect("fresh environment accepts the args binding");
}

/// Read-evaluate-print loop. Lines accumulate in a buffer until the
/// balance probe (or an unexpected-EOF parse) stops asking for more;
/// non-Unit results print in repr form.
fn run_repl(env: &Rc<Environment>, options: &Rc<Options>) -> ExitCode {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("glorp: failed to initialize the REPL: {e}");
            return ExitCode::from(1);
        }
    };

    println!("{WELCOME_MESSAGE}");

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim() == QUIT_COMMAND {
                    break;
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if needs_more_input(&buffer) {
                    continue;
                }

                let src = Source::new(REPL_FILENAME, buffer.clone());
                match interpret(&src, options, env) {
                    Err(e) if e.is_incomplete() && !buffer.trim().is_empty() => {
                        continue;
                    }
                    outcome => {
                        let _ = rl.add_history_entry(buffer.trim_end());
                        buffer.clear();
                        match outcome {
                            Ok(value) => {
                                let value = value.flatten();
                                if !value.is_unit() {
                                    println!("{}", value.repr());
                                }
                            }
                            Err(e) => eprint!("{}", e.report()),
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("glorp: {e}");
                return ExitCode::from(1);
            }
        }
    }

    ExitCode::SUCCESS
}
