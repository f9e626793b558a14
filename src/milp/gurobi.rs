use grb::prelude::*;
use log::{debug, warn};
use typed_index_collections::TiVec;

use super::{LinExpr, Milp, MilpSolver, RawSolution, Sense, SolveStatus, SolverError, VarId, VarKind};

/// Solves models with Gurobi. Requires a local Gurobi installation and license.
#[derive(Debug, Clone)]
pub struct GurobiSolver {
    /// Whether Gurobi may write its own log to stdout
    pub output: bool,
    /// Number of threads Gurobi may use. 0 lets Gurobi decide.
    pub threads: i32,
}

impl Default for GurobiSolver {
    fn default() -> Self {
        Self {
            output: false,
            threads: 1,
        }
    }
}

impl GurobiSolver {
    fn expression(expr: &LinExpr, vars: &TiVec<VarId, Var>) -> grb::expr::LinExpr {
        let mut out = grb::expr::LinExpr::new();
        for (var, coeff) in expr.terms() {
            out.add_term(*coeff, vars[*var]);
        }
        out.add_constant(expr.constant());
        out
    }

    fn build(&self, milp: &Milp) -> grb::Result<(Model, TiVec<VarId, Var>)> {
        let mut model = Model::new(milp.name())?;
        model.set_param(param::OutputFlag, self.output as i32)?;
        model.set_param(param::Threads, self.threads)?;

        let mut vars: TiVec<VarId, Var> = TiVec::new();
        for def in milp.vars() {
            let vtype = match def.kind {
                VarKind::Binary => VarType::Binary,
                VarKind::Integer => VarType::Integer,
                VarKind::Continuous => VarType::Continuous,
            };
            vars.push(model.add_var(
                &def.name,
                vtype,
                0.0,
                def.lower,
                def.upper,
                std::iter::empty(),
            )?);
        }
        model.update()?;

        for c in milp.constraints() {
            let lhs = Self::expression(c.lhs(), &vars);
            let rhs = c.rhs();
            match c.sense() {
                Sense::Le => model.add_constr(c.name(), c!(lhs <= rhs))?,
                Sense::Eq => model.add_constr(c.name(), c!(lhs == rhs))?,
                Sense::Ge => model.add_constr(c.name(), c!(lhs >= rhs))?,
            };
        }

        model.set_objective(Self::expression(milp.objective(), &vars), Minimize)?;
        model.update()?;

        Ok((model, vars))
    }

    fn status(status: Status) -> SolveStatus {
        match status {
            Status::Optimal => SolveStatus::Optimal,
            Status::Infeasible => SolveStatus::Infeasible,
            Status::Unbounded | Status::InfOrUnbd => SolveStatus::Unbounded,
            Status::Loaded
            | Status::InProgress
            | Status::TimeLimit
            | Status::NodeLimit
            | Status::SolutionLimit
            | Status::IterationLimit
            | Status::Interrupted => SolveStatus::NotSolved,
            other => {
                warn!("gurobi finished with status {:?}", other);
                SolveStatus::Undefined
            }
        }
    }

    fn run(&self, milp: &Milp) -> grb::Result<RawSolution> {
        let (mut model, vars) = self.build(milp)?;
        debug!(
            "handing {} variables and {} constraints to gurobi",
            vars.len(),
            milp.constraints().len()
        );
        model.optimize()?;

        let status = Self::status(model.status()?);

        // a stopped run may still hold an incumbent, which is reported as is
        if model.get_attr(attr::SolCount)? == 0 {
            return Ok(RawSolution::without_values(status));
        }

        let mut values: TiVec<VarId, f64> = TiVec::new();
        for var in vars.iter() {
            values.push(model.get_obj_attr(attr::X, var)?);
        }

        Ok(RawSolution {
            status,
            values: Some(values),
        })
    }
}

impl MilpSolver for GurobiSolver {
    fn name(&self) -> &str {
        "gurobi"
    }

    fn solve(&self, milp: &Milp) -> Result<RawSolution, SolverError> {
        self.run(milp).map_err(|e| SolverError::Backend {
            backend: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_runs_are_not_solved() {
        assert_eq!(GurobiSolver::status(Status::Optimal), SolveStatus::Optimal);
        assert_eq!(GurobiSolver::status(Status::InfOrUnbd), SolveStatus::Unbounded);
        assert_eq!(GurobiSolver::status(Status::TimeLimit), SolveStatus::NotSolved);
        assert_eq!(GurobiSolver::status(Status::SolutionLimit), SolveStatus::NotSolved);
        assert_eq!(GurobiSolver::status(Status::Numeric), SolveStatus::Undefined);
    }
}
