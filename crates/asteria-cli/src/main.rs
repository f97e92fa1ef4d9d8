//! Thin driver around the `asteria` crate.
//!
//! Reads one script (from a file, or from standard input when no file or
//! `-` is given), compiles it, executes it once, and maps the outcome to a
//! process exit code. There is no REPL front-end and no external-function
//! yield loop to drive — host functions in this core run to completion
//! synchronously, so compiling and executing a script is the entire job.

use std::{
    io::Read as _,
    process::ExitCode,
};

use clap::Parser;

use asteria::{compile, execute, CompileOptions, ExecutionResult, GlobalContext, Value};

const PACKAGE_STRING: &str = concat!("asteria ", env!("CARGO_PKG_VERSION"));
const HOMEPAGE: &str = "https://github.com/asteria-lang/asteria";

#[repr(u8)]
enum ExitStatus {
    Success = 0,
    SystemError = 1,
    InvalidArgument = 2,
    CompileError = 3,
    RuntimeError = 4,
    NonInteger = 5,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status as u8)
    }
}

/// Command-line arguments, following upstream Asteria's `getopt`
/// grammar (`+hIiO::Vv`, one optional file, trailing verbatim
/// script arguments).
#[derive(Parser)]
#[command(name = "asteria", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    #[arg(short = 'h')]
    help: bool,

    #[arg(short = 'V')]
    version: bool,

    /// Enables verbose diagnostics on standard error.
    #[arg(short = 'v')]
    verbose: bool,

    /// Forces interactive (REPL) mode. Accepted for command-line
    /// compatibility; this core has no REPL front-end, so setting it is an
    /// invalid-argument error rather than a silent no-op.
    #[arg(short = 'i')]
    force_interactive: bool,

    /// Suppresses interactive mode. Always a no-op here since the only mode
    /// this CLI implements is non-interactive.
    #[arg(short = 'I')]
    suppress_interactive: bool,

    #[arg(short = 'O', num_args = 0..=1, default_missing_value = "1")]
    optimize: Option<u8>,

    /// Script file to run, or `-`/absent for standard input.
    file: Option<String>,

    /// Everything after the file name is passed to the script verbatim,
    /// retrievable as its `args` array.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script_args: Vec<String>,
}

fn print_help() {
    println!(
        "Usage: asteria [OPTIONS] [[--] FILE [ARGUMENTS]...]\n\n\
         \x20\x20-h      show help message then exit\n\
         \x20\x20-I      suppress interactive mode [default = auto]\n\
         \x20\x20-i      force interactive mode (unsupported; this build has no REPL)\n\
         \x20\x20-O[n]   set optimization level to `n` [default = 0]\n\
         \x20\x20-V      show version information then exit\n\
         \x20\x20-v      enable verbose mode\n\n\
         Source code is read from standard input if no FILE is specified or `-` is\n\
         given as FILE, and otherwise from FILE. ARGUMENTS following FILE are passed\n\
         to the script as strings verbatim.\n\n\
         If the script returns an integer, it is truncated to an 8-bit unsigned\n\
         integer and used as the exit status. If the script returns nothing, the\n\
         exit status is zero. If the script returns a non-integer value, the exit\n\
         status is 5. If the script fails to compile, the exit status is 3; if it\n\
         raises an uncaught exception, the exit status is 4.\n\n\
         Visit the homepage at <{HOMEPAGE}>."
    );
}

fn print_version() {
    println!("{PACKAGE_STRING}\n\nVisit the homepage at <{HOMEPAGE}>.");
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return ExitStatus::InvalidArgument.into();
        }
    };

    if cli.help {
        print_help();
        return ExitStatus::Success.into();
    }
    if cli.version {
        print_version();
        return ExitStatus::Success.into();
    }
    if cli.force_interactive {
        eprintln!("error: interactive mode is not supported by this build");
        return ExitStatus::InvalidArgument.into();
    }
    let _ = cli.suppress_interactive;

    if cli.verbose {
        tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter("asteria=debug").init();
    }

    let file_name = cli.file.as_deref().unwrap_or("-");
    let source = match read_source(file_name) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitStatus::SystemError.into();
        }
    };

    let options = CompileOptions::default().optimize(cli.optimize.unwrap_or(0));
    let program = match compile(&source, file_name, &options) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            return ExitStatus::CompileError.into();
        }
    };

    let mut globals = GlobalContext::new();
    if cli.verbose {
        globals.register_hook(|loc| tracing::debug!(%loc, "executing statement"));
    }

    let args: Vec<Value> = cli.script_args.iter().map(|s| Value::from(s.clone())).collect();
    match execute(&program, &args, &mut globals) {
        ExecutionResult::Void => ExitStatus::Success.into(),
        ExecutionResult::Value(Value::Null) => ExitStatus::Success.into(),
        ExecutionResult::Value(Value::Integer(code)) => ExitCode::from(u8::try_from(code & 0xff).unwrap_or(0)),
        ExecutionResult::Value(_) => ExitStatus::NonInteger.into(),
        ExecutionResult::Exception(exc) => {
            eprintln!("{exc}");
            ExitStatus::RuntimeError.into()
        }
    }
}

fn read_source(file_name: &str) -> Result<String, std::io::Error> {
    if file_name == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(file_name)
    }
}
