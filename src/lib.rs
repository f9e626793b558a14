//! Evacuation logistics as a mixed-integer program.
//!
//! Families leave their origin, may pass through transit points and end at safe havens.
//! [`Problem`] validates an input document, [`EvacuationSolver`] builds and solves the
//! model, and the resulting [`Solution`] carries flows, decomposed routes and a
//! reconciliation of the evacuated head-count.

use derive_more::{Display, From};

pub mod milp;
pub mod models;
pub mod problem;
pub mod solution;

pub use milp::{Backend, Milp, MilpSolver, SolveStatus, SolverConfig, SolverError};
pub use models::EvacuationSolver;
pub use problem::{InputDocument, InvalidModelError, Problem};
pub use solution::{OutputDocument, Reconciliation, Route, Solution};

use models::evacuation::{Parameters, Sets};

#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "invalid input: {}", _0)]
    InvalidModel(InvalidModelError),
    #[display(fmt = "solver error: {}", _0)]
    Solver(SolverError),
    #[display(fmt = "i/o error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "json error: {}", _0)]
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

/// Builds the MILP for `problem` without solving it
pub fn build_model(problem: &Problem) -> Milp {
    let (model, _) = EvacuationSolver::build(&Sets::new(problem), &Parameters::new(problem));
    model
}

/// Validates `doc`, solves it with the configured backend and renders the output document.
/// Infeasible and unbounded models are reported through the status, not as errors.
pub fn optimize(doc: &InputDocument, config: &SolverConfig) -> Result<OutputDocument, Error> {
    let problem = Problem::new(doc)?;
    let solver = config.backend.solver()?;
    let solution = EvacuationSolver::solve(&problem, solver.as_ref(), config)?;
    Ok(solution.to_document(&problem))
}
