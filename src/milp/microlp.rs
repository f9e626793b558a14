use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use log::{debug, info, warn};
use typed_index_collections::TiVec;

use super::{LinExpr, Milp, MilpSolver, RawSolution, Sense, SolveStatus, SolverError, VarId, VarKind};

/// Solves models with good_lp's pure Rust `microlp` branch-and-bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpSolver;

impl MicrolpSolver {
    fn expression(expr: &LinExpr, vars: &TiVec<VarId, Variable>) -> Expression {
        let mut out = Expression::from(expr.constant());
        for (var, coeff) in expr.terms() {
            out.add_mul(*coeff, vars[*var]);
        }
        out
    }
}

impl MilpSolver for MicrolpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, milp: &Milp) -> Result<RawSolution, SolverError> {
        // constraints without variables are decided here; microlp gets only the rest
        let empty: TiVec<VarId, f64> = TiVec::new();
        if let Some(c) = milp
            .constraints()
            .iter()
            .find(|c| c.lhs().is_constant() && !c.is_satisfied(&empty, 0.0))
        {
            info!("constraint {} cannot hold for any assignment", c.name());
            return Ok(RawSolution::without_values(SolveStatus::Infeasible));
        }

        let mut problem_vars = ProblemVariables::new();
        let vars: TiVec<VarId, Variable> = milp
            .vars()
            .iter()
            .map(|def| {
                let mut definition = variable();
                definition = match def.kind {
                    VarKind::Binary => definition.binary(),
                    VarKind::Integer => definition.integer(),
                    VarKind::Continuous => definition,
                };
                if def.lower.is_finite() {
                    definition = definition.min(def.lower);
                }
                if def.upper.is_finite() {
                    definition = definition.max(def.upper);
                }
                problem_vars.add(definition)
            })
            .collect::<Vec<_>>()
            .into();

        let objective = Self::expression(milp.objective(), &vars);
        let mut model = problem_vars.minimise(objective).using(microlp);

        let mut skipped = 0;
        for c in milp.constraints() {
            if c.lhs().is_constant() {
                skipped += 1;
                continue;
            }
            let lhs = Self::expression(c.lhs(), &vars);
            let rhs = c.rhs();
            model.add_constraint(match c.sense() {
                Sense::Le => constraint!(lhs <= rhs),
                Sense::Eq => constraint!(lhs == rhs),
                Sense::Ge => constraint!(lhs >= rhs),
            });
        }
        debug!(
            "handing {} variables and {} constraints to microlp ({} trivial constraints skipped)",
            vars.len(),
            milp.constraints().len() - skipped,
            skipped
        );

        match model.solve() {
            Ok(solution) => {
                let values: TiVec<VarId, f64> = vars
                    .iter()
                    .map(|v| solution.value(*v))
                    .collect::<Vec<_>>()
                    .into();
                Ok(RawSolution {
                    status: SolveStatus::Optimal,
                    values: Some(values),
                })
            }
            Err(ResolutionError::Infeasible) => {
                Ok(RawSolution::without_values(SolveStatus::Infeasible))
            }
            Err(ResolutionError::Unbounded) => {
                Ok(RawSolution::without_values(SolveStatus::Unbounded))
            }
            Err(e) => {
                warn!("microlp stopped without a solution: {}", e);
                Ok(RawSolution::without_values(SolveStatus::NotSolved))
            }
        }
    }
}
