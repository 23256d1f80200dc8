use std::path::{Path, PathBuf};

use cellsolve_core::{Engine, Model, Property, SheetSolver, SolveResult, SolverConfig};
use cellsolve_sheet::{ProblemFile, Workbook};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cellsolve")]
#[command(about = "Solve linear and mixed-integer models laid out in formula workbooks", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the model from a problem file and solve it
    Solve {
        /// The problem file (JSON)
        file: PathBuf,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
        /// Override the engine named in the file
        #[arg(short, long)]
        engine: Option<String>,
    },
    /// Extract the model without solving and print it
    Inspect {
        /// The problem file (JSON)
        file: PathBuf,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Evaluate a single cell of the problem's workbook
    Eval {
        /// The problem file (JSON)
        file: PathBuf,
        /// Cell address, e.g. B1 or Sheet2!C3
        cell: String,
    },
    /// List solver properties and engines
    Options,
}

#[derive(Serialize)]
struct SolveReport<'a> {
    #[serde(flatten)]
    result: &'a SolveResult,
    variables: Vec<String>,
    warnings: Vec<String>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_solver(file: &Path) -> SheetSolver<Workbook> {
    let problem = match ProblemFile::load(file) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    match problem.into_solver() {
        Ok(solver) => solver,
        Err(e) => {
            eprintln!("Error in {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

fn cell_names(solver: &SheetSolver<Workbook>) -> Vec<String> {
    let Some(book) = solver.document() else {
        return Vec::new();
    };
    solver
        .variables()
        .iter()
        .map(|&cell| book.display_cell(cell))
        .collect()
}

fn print_model(model: &Model, names: &[String]) {
    let sense = if model.maximize { "maximize" } else { "minimize" };
    println!("Objective ({}):", sense);
    for (name, coefficient) in names.iter().zip(&model.objective) {
        println!("  {:16} {:>12.6}", name, coefficient);
    }
    println!();

    println!("Variables:");
    for (name, var) in names.iter().zip(&model.variables) {
        println!("  {:16} {:10} [{}, {}]", name, var.kind.to_string(), var.lower, var.upper);
    }
    println!();

    println!("Constraints:");
    for constraint in &model.constraints {
        let terms: Vec<String> = names
            .iter()
            .zip(&constraint.row.coefficients)
            .filter(|(_, c)| **c != 0.0)
            .map(|(name, c)| format!("{} {}", c, name))
            .collect();
        let lhs = if terms.is_empty() { "0".to_string() } else { terms.join(" + ") };
        println!(
            "  #{:<3} {} {} {}",
            constraint.source, lhs, constraint.operator, constraint.row.bound
        );
    }

    for warning in &model.warnings {
        println!();
        println!("Warning: {}", warning);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Solve { file, format, engine } => {
            let mut solver = load_solver(&file);
            if let Some(engine) = engine {
                solver.set_engine(engine);
            }
            debug!(event = "cli_solve", file = %file.display(), engine = solver.engine());

            let result = solver.solve().clone();
            let names = cell_names(&solver);
            let warnings: Vec<String> = solver.warnings().iter().map(|w| w.to_string()).collect();

            if format == "json" {
                let report = SolveReport {
                    result: &result,
                    variables: names,
                    warnings,
                };
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error writing JSON: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                println!("Engine: {}", solver.engine());
                println!("Status: {}", result.status);
                if result.success {
                    println!("Objective value: {}", result.objective_value);
                    println!();
                    println!("Solution:");
                    for (name, value) in names.iter().zip(&result.solution) {
                        println!("  {:16} {:>12.6}", name, value);
                    }
                }
                for warning in &warnings {
                    println!();
                    println!("Warning: {}", warning);
                }
            }

            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Inspect { file, format } => {
            let mut solver = load_solver(&file);
            let model = match solver.extract_model() {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };

            if format == "json" {
                match serde_json::to_string_pretty(&model) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error writing JSON: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                print_model(&model, &cell_names(&solver));
            }
        }
        Commands::Eval { file, cell } => {
            let problem = match ProblemFile::load(&file) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };
            let book = match problem.workbook() {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("Error in {}: {}", file.display(), e);
                    std::process::exit(1);
                }
            };
            let Some(target) = book.resolve(&cell, 0) else {
                eprintln!("Invalid cell address: {}", cell);
                std::process::exit(1);
            };

            let name = book.display_cell(target);
            match book.evaluate(target) {
                Ok(value) => match book.formula(target) {
                    Some(formula) => println!("{} = {} = {}", name, formula, value),
                    None => println!("{} = {}", name, value),
                },
                Err(e) => {
                    eprintln!("{}: {}", name, e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Options => {
            let defaults = SolverConfig::default();
            println!("Properties:");
            for property in Property::ALL {
                println!(
                    "  {:12} {:8} default {:6} {}",
                    property.name(),
                    property.value_type().to_string(),
                    defaults.get(property).to_string(),
                    property.description()
                );
            }
            println!();
            println!("Engines:");
            for engine in Engine::ALL {
                let integers = if engine.supports_integers() {
                    "integer and binary variables"
                } else {
                    "continuous relaxation only"
                };
                println!("  {:8} {}", engine.name(), integers);
            }
        }
    }
}
