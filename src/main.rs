use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{error, info};

use evacuation::{build_model, optimize, Backend, Error, InputDocument, Problem, SolverConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Evacuation logistics optimizer", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve an input document and write the result document
    Solve {
        /// Input document
        #[clap(short, long, default_value = "datos_optimizacion.json")]
        input: PathBuf,
        /// Where the result document is written
        #[clap(short, long, default_value = "resultados_optimizacion.json")]
        output: PathBuf,
        /// Also write the assembled model in LP format
        #[clap(long)]
        lp: Option<PathBuf>,
        /// Solver values this close to an integer are read as that integer
        #[clap(long, default_value_t = 1e-6)]
        tolerance: f64,
        /// MILP backend (microlp or gurobi)
        #[clap(long, default_value = "microlp")]
        backend: Backend,
    },
    /// Validate an input document and report the model size without solving
    Check {
        /// Input document
        #[clap(short, long, default_value = "datos_optimizacion.json")]
        input: PathBuf,
        /// Also write the assembled model in LP format
        #[clap(long)]
        lp: Option<PathBuf>,
    },
}

fn read_input(path: &Path) -> Result<InputDocument, Error> {
    let reader = BufReader::new(File::open(path)?);
    let doc = serde_json::from_reader(reader)?;
    Ok(doc)
}

fn write_lp(problem: &Problem, path: &Path) -> Result<(), Error> {
    std::fs::write(path, build_model(problem).to_string())?;
    info!("Wrote model to {}", path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Solve {
            input,
            output,
            lp,
            tolerance,
            backend,
        } => {
            let doc = read_input(&input)?;
            if let Some(path) = lp {
                write_lp(&Problem::new(&doc)?, &path)?;
            }

            let config = SolverConfig {
                integrality_tolerance: tolerance,
                backend,
            };
            let result = optimize(&doc, &config)?;
            info!(
                "status {}, objective {:?}, {} routes",
                result.status,
                result.objective,
                result.routes.len()
            );

            let writer = BufWriter::new(File::create(&output)?);
            serde_json::to_writer_pretty(writer, &result)?;
            info!("Wrote results to {}", output.display());
        }
        Command::Check { input, lp } => {
            let problem = Problem::new(&read_input(&input)?)?;
            let model = build_model(&problem);
            info!(
                "{} nodes, {} arcs, {} families, {} persons to evacuate",
                problem.network().nodes().len(),
                problem.network().arcs().len(),
                problem.families().len(),
                problem.expected_persons()
            );
            info!(
                "model has {} variables and {} constraints",
                model.vars().len(),
                model.constraints().len()
            );
            if let Some(path) = lp {
                write_lp(&problem, &path)?;
            }
        }
    }

    Ok(())
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
