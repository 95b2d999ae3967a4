//! Lumo CLI: run a script file or evaluate code from the command line.

use std::env;
use std::path::Path;
use std::process;

use colored::Colorize;
use tracing_subscriber::EnvFilter;

use lumo::span::Span;
use lumo::{LumoError, RunOptions};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    Help,
    Version,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    run: RunOptions,
    log: Option<String>,
}

fn print_usage() {
    eprintln!("Lumo {} - the Lumo scripting language", VERSION);
    eprintln!();
    eprintln!("Usage: lumo [options] <script.lm>");
    eprintln!("       lumo [options] -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>          Evaluate code and print the result");
    eprintln!("  --disassemble      Print bytecode before running");
    eprintln!("  --no-type-check    Skip compile-time type diagnostics");
    eprintln!("  --log <filter>     Log filter, e.g. debug or lumo::vm=trace (overrides LUMO_LOG)");
    eprintln!("  --help, -h         Show this help message");
    eprintln!("  --version, -v      Show the version");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  lumo script.lm                 Run a script file");
    eprintln!("  lumo --disassemble script.lm   Show the bytecode, then run");
    eprintln!("  lumo -e 'print(1 + 1)'         Evaluate code directly");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    eprintln!();
    print_usage();
    process::exit(64);
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        command: Command::Help,
        run: RunOptions::default(),
        log: None,
    };
    let mut command = None;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-e" => {
                i += 1;
                match args.get(i) {
                    Some(code) => command = Some(Command::Eval { code: code.clone() }),
                    None => usage_error("-e requires code to evaluate"),
                }
            }
            "--disassemble" => options.run.disassemble = true,
            "--no-type-check" => options.run.type_check = false,
            "--log" => {
                i += 1;
                match args.get(i) {
                    Some(filter) => options.log = Some(filter.clone()),
                    None => usage_error("--log requires a filter"),
                }
            }
            "-h" | "--help" => return Options {
                command: Command::Help,
                ..options
            },
            "-v" | "--version" => return Options {
                command: Command::Version,
                ..options
            },
            flag if flag.starts_with('-') => usage_error(&format!("unknown option '{}'", flag)),
            file => {
                if command.is_some() {
                    usage_error(&format!("unexpected argument '{}'", file));
                }
                command = Some(Command::Run { file: file.to_string() });
            }
        }
        i += 1;
    }

    match command {
        Some(command) => Options { command, ..options },
        None => usage_error("no script file given"),
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|_| ()),
        None => EnvFilter::try_from_env("LUMO_LOG").map_err(|_| ()),
    }
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(64);
    }
    let options = parse_args(&args);

    match &options.command {
        Command::Help => print_usage(),
        Command::Version => println!("lumo {}", VERSION),
        Command::Run { file } => {
            init_logging(options.log.as_deref());
            run_file(file, &options.run);
        }
        Command::Eval { code } => {
            init_logging(options.log.as_deref());
            run_eval(code, &options.run);
        }
    }
}

fn run_file(file: &str, options: &RunOptions) {
    let path = Path::new(file);
    if let Err(err) = lumo::run_file(path, options) {
        report(&err, file);
        process::exit(err.exit_code());
    }
}

fn run_eval(code: &str, options: &RunOptions) {
    match lumo::run_with_options(code, None, options) {
        Ok((value, _)) if !value.is_null() => println!("{}", value),
        Ok(_) => {}
        Err(err) => {
            report(&err, "<eval>");
            process::exit(err.exit_code());
        }
    }
}

/// Print a diagnostic as `file:line:column: error: message`.
fn report(err: &LumoError, origin: &str) {
    if let LumoError::Compile(diagnostics) = err {
        for diagnostic in &diagnostics.0 {
            print_diagnostic(origin, Some(diagnostic.span()), "error:", &diagnostic.to_string());
        }
        return;
    }
    let label = match err {
        LumoError::Runtime(_) => "runtime error:",
        LumoError::Io(_) => "io error:",
        _ => "error:",
    };
    print_diagnostic(origin, err.span(), label, &err.to_string());
}

fn print_diagnostic(origin: &str, span: Option<Span>, label: &str, message: &str) {
    let location = match span {
        Some(span) if span.column > 0 => format!("{}:{}:{}", origin, span.line, span.column),
        Some(span) if span.line > 0 => format!("{}:{}", origin, span.line),
        _ => origin.to_string(),
    };
    eprintln!("{}: {} {}", location.bold(), label.red().bold(), message);
}
