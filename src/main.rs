use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use sousc::{
    CodegenOptions, CompileError, Target,
    frontend::{SourceFile, SourceFileOrigin},
    middle::ir::pretty_print::pretty_print_program,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// Only check that the program is grammatical
    Parsed,
    /// The typed IR
    Analyzed,
    /// The typed IR after optimization
    Optimized,
    /// Generated JavaScript
    Js,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_file: PathBuf,
    #[arg(value_enum)]
    output: OutputMode,
    /// Spaces per indentation level in generated code
    #[arg(long, default_value_t = 4)]
    indent: usize,
    #[arg(long)]
    no_color: bool,
    /// Log each compiler stage (overridden by SOUS_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SOUS_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Source file '{}' does not exist!", args.source_file.display()),
            )
            .exit()
    }

    let contents = match std::fs::read_to_string(&args.source_file) {
        Ok(contents) => contents,
        Err(error) => Args::command()
            .error(
                ErrorKind::Io,
                format!("Failed to read '{}': {error}", args.source_file.display()),
            )
            .exit(),
    };

    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file.clone()),
    };

    match run(&source, &args) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}: {error}", "error".red().bold());
            eprintln!("{}", source.highlight_position(error.position()));
            ExitCode::FAILURE
        }
    }
}

fn run(source: &SourceFile, args: &Args) -> Result<String, CompileError> {
    let output = match args.output {
        OutputMode::Parsed => {
            sousc::parse(source)?;
            format!("{} {}\n", source.origin, "is syntactically correct".green())
        }
        OutputMode::Analyzed => pretty_print_program(&sousc::analyze(source)?),
        OutputMode::Optimized => pretty_print_program(&sousc::optimize(source)?),
        OutputMode::Js => sousc::compile(
            source,
            Target::JavaScript,
            &CodegenOptions {
                indent_width: args.indent,
            },
        )?,
    };

    Ok(output)
}
