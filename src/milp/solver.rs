use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use super::{Milp, VarId};

/// Outcome of a solve. A non-optimal outcome is a regular result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    #[serde(rename = "Not Solved")]
    #[display(fmt = "Not Solved")]
    NotSolved,
    Undefined,
}

/// What a backend returns: the status and, when available, one value per declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    pub status: SolveStatus,
    pub values: Option<TiVec<VarId, f64>>,
}

impl RawSolution {
    pub fn without_values(status: SolveStatus) -> RawSolution {
        RawSolution {
            status,
            values: None,
        }
    }
}

/// Failures of the solving machinery itself, as opposed to infeasible or unbounded models.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum SolverError {
    #[display(fmt = "{} backend failed: {}", backend, message)]
    Backend { backend: String, message: String },
    #[display(fmt = "backend {} is not available in this build", _0)]
    Unavailable(Backend),
    #[display(fmt = "{} backend returned {} values for {} variables", backend, got, expected)]
    ValueCount {
        backend: String,
        expected: usize,
        got: usize,
    },
}

impl std::error::Error for SolverError {}

/// A branch-and-bound MILP engine able to solve an assembled [`Milp`].
pub trait MilpSolver {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Solves the model once. Blocks until the backend returns.
    fn solve(&self, milp: &Milp) -> Result<RawSolution, SolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// good_lp's pure Rust branch-and-bound
    #[display(fmt = "microlp")]
    Microlp,
    /// Gurobi, through the `gurobi` feature
    #[display(fmt = "gurobi")]
    Gurobi,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Microlp
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "microlp" => Ok(Backend::Microlp),
            "gurobi" => Ok(Backend::Gurobi),
            other => Err(format!("unknown backend {}", other)),
        }
    }
}

impl Backend {
    pub fn solver(&self) -> Result<Box<dyn MilpSolver>, SolverError> {
        match self {
            Backend::Microlp => Ok(Box::new(super::microlp::MicrolpSolver)),
            #[cfg(feature = "gurobi")]
            Backend::Gurobi => Ok(Box::new(super::gurobi::GurobiSolver::default())),
            #[cfg(not(feature = "gurobi"))]
            Backend::Gurobi => Err(SolverError::Unavailable(Backend::Gurobi)),
        }
    }
}

/// Settings for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// A value this close to an integer is read as that integer
    pub integrality_tolerance: f64,
    /// The backend used to solve the MILP
    pub backend: Backend,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            integrality_tolerance: 1e-6,
            backend: Backend::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_follow_milp_convention() {
        assert_eq!(SolveStatus::NotSolved.to_string(), "Not Solved");
        assert_eq!(
            serde_json::to_string(&SolveStatus::NotSolved).unwrap(),
            "\"Not Solved\""
        );
        assert_eq!(
            serde_json::to_string(&SolveStatus::Optimal).unwrap(),
            "\"Optimal\""
        );
    }

    #[test]
    fn parses_backends() {
        assert_eq!("MicroLP".parse::<Backend>(), Ok(Backend::Microlp));
        assert_eq!("gurobi".parse::<Backend>(), Ok(Backend::Gurobi));
        assert!("cbc".parse::<Backend>().is_err());
        assert!(Backend::Microlp.solver().is_ok());
    }

    #[test]
    fn config_defaults_when_fields_are_missing() {
        let config: SolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SolverConfig::default());
        let config: SolverConfig = serde_json::from_str(r#"{"backend": "gurobi"}"#).unwrap();
        assert_eq!(config.backend, Backend::Gurobi);
    }
}
