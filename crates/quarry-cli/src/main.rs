//! Quarry CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quarry_bytecode::{assemble, Function, Program};
use quarry_client::{Evaluate, RemoteEvaluator};
use quarry_translate::{translate, Bindings};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version = "0.1.0")]
#[command(about = "Translate host bytecode into QIR queries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and translate every function
    Check {
        /// File to check
        file: PathBuf,
    },
    /// Print the QIR term for the entry function
    Translate {
        /// File to translate
        file: PathBuf,
        /// Function to translate (defaults to the last one)
        #[arg(long)]
        entry: Option<String>,
        /// Extra collection sources
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Translate the entry function and evaluate it remotely
    Eval {
        /// File to translate
        file: PathBuf,
        /// Evaluator address, host:port
        #[arg(long)]
        addr: String,
        /// Function to translate (defaults to the last one)
        #[arg(long)]
        entry: Option<String>,
        /// Extra collection sources
        #[arg(long = "source")]
        sources: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Check { file } => {
            let program = load(&file)?;
            let mut checked = 0;
            for function in &program.functions {
                // Comprehension bodies only make sense inlined at their
                // call site.
                if function
                    .code
                    .params
                    .first()
                    .is_some_and(|p| p.starts_with('.'))
                {
                    continue;
                }
                let bindings = bindings_for(&program, &[], &function.code.name);
                let term = translate(function, &bindings)
                    .map_err(|e| format!("{}: {}", function.code.name, e))?;
                quarry_qir::validate(&term, bindings.source_names())
                    .map_err(|e| format!("{}: {}", function.code.name, e))?;
                checked += 1;
            }
            println!("Translated {} functions", checked);
            Ok(())
        }
        Command::Translate {
            file,
            entry,
            sources,
        } => {
            let program = load(&file)?;
            let function = pick_entry(&program, entry.as_deref())?;
            let bindings = bindings_for(&program, &sources, &function.code.name);
            let term = translate(function, &bindings)?;
            quarry_qir::validate(&term, bindings.source_names())?;
            println!("{}", term);
            Ok(())
        }
        Command::Eval {
            file,
            addr,
            entry,
            sources,
        } => {
            let program = load(&file)?;
            let function = pick_entry(&program, entry.as_deref())?;
            let bindings = bindings_for(&program, &sources, &function.code.name);
            let term = translate(function, &bindings)?;

            let mut evaluator = RemoteEvaluator::connect(addr.as_str())?;
            let reduced = evaluator.evaluate(&term)?;
            println!("{}", reduced);
            Ok(())
        }
    }
}

fn load(file: &Path) -> Result<Program, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(file)?;
    match assemble(&source) {
        Ok(program) => Ok(program),
        Err(errors) => {
            for error in errors {
                eprintln!("{:?}", miette::Report::new(error));
            }
            Err("assembly failed".into())
        }
    }
}

fn pick_entry<'a>(
    program: &'a Program,
    entry: Option<&str>,
) -> Result<&'a Function, Box<dyn std::error::Error>> {
    match entry {
        Some(name) => program
            .function(name)
            .ok_or_else(|| format!("no function named {}", name).into()),
        None => program
            .entry()
            .ok_or_else(|| "file defines no functions".into()),
    }
}

/// Bindings for translating `entry`: declared and extra sources, plus
/// every other function in the file as a user function.
fn bindings_for(program: &Program, extra_sources: &[String], entry: &str) -> Bindings {
    let mut bindings = Bindings::new();
    for source in &program.sources {
        bindings.add_source(source.clone());
    }
    for source in extra_sources {
        bindings.add_source(source.clone());
    }
    for function in &program.functions {
        if function.code.name != entry {
            bindings.add_function(function.clone());
        }
    }
    bindings
}
