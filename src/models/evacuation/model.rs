use itertools::iproduct;
use log::{debug, info};
use typed_index_collections::TiVec;

use super::sets_and_parameters::{Parameters, Sets};
use crate::milp::{LinExpr, Milp, MilpSolver, SolveStatus, SolverConfig, SolverError, VarId, VarKind};
use crate::models::utils::AddVars;
use crate::problem::{ArcIndex, FamilyIndex, NodeIndex, Problem};
use crate::solution::{routes, Solution};

pub struct Variables {
    /// family-units of family k routed across arc e, indexed (k, e)
    pub x: TiVec<FamilyIndex, TiVec<ArcIndex, VarId>>,
    /// 1 if node n is activated. Only transit nodes and safe havens have one.
    pub y: TiVec<NodeIndex, Option<VarId>>,
}

pub struct EvacuationSolver {}

#[allow(non_snake_case)]
impl EvacuationSolver {
    /// builds the evacuation model
    pub fn build(sets: &Sets, parameters: &Parameters) -> (Milp, Variables) {
        info!(
            "Building evacuation model for {} families over {} arcs",
            sets.K.len(),
            sets.E.len()
        );

        let mut model = Milp::new("evacuation");

        //*************CREATE VARIABLES*************//
        let p = parameters;

        // family-units of family k across arc e
        let x: TiVec<FamilyIndex, TiVec<ArcIndex, VarId>> =
            (sets.K.len(), sets.E.len()).vars_with(|(k, e): (FamilyIndex, ArcIndex)| {
                model.add_var(
                    &format!(
                        "x_{}_{}_{}_{}",
                        p.id[k], p.h[k], p.label[p.tail[e]], p.label[p.head[e]]
                    ),
                    VarKind::Integer,
                    0.0,
                    f64::INFINITY,
                )
            });

        // activation of transit points and safe havens
        let mut y: TiVec<NodeIndex, Option<VarId>> = vec![None; p.label.len()].into();
        for n in &sets.RF {
            y[*n] = Some(model.add_var(&format!("y_{}", p.label[*n]), VarKind::Binary, 0.0, 1.0));
        }

        let vars = Variables { x, y };

        // ******************** ADD CONSTRAINTS ********************
        Self::origin_constraints(&mut model, sets, parameters, &vars);
        Self::transit_constraints(&mut model, sets, parameters, &vars);
        Self::haven_constraints(&mut model, sets, parameters, &vars);
        Self::balance_constraints(&mut model, sets, parameters, &vars);

        // transportation cost per person and km plus the fixed cost of opened nodes
        let transport_costs = iproduct!(&sets.K, &sets.E)
            .map(|(k, e)| (p.c * p.d[*e] * p.h[*k], vars.x[*k][*e]))
            .collect::<LinExpr>();
        let activation_costs = sets
            .RF
            .iter()
            .filter_map(|n| vars.y[*n].map(|y| (p.Ac[*n], y)))
            .collect::<LinExpr>();
        model.set_objective(transport_costs + activation_costs);

        info!(
            "Successfully built evacuation model with {} variables and {} constraints",
            model.vars().len(),
            model.constraints().len()
        );

        (model, vars)
    }

    /// sum of x[k][e] over the given arcs
    fn flow(vars: &Variables, k: FamilyIndex, arcs: &[ArcIndex]) -> LinExpr {
        arcs.iter().map(|e| vars.x[k][*e]).collect()
    }

    /// sum of h[k] * x[k][e] over every family and the given arcs
    fn persons(vars: &Variables, sets: &Sets, parameters: &Parameters, arcs: &[ArcIndex]) -> LinExpr {
        iproduct!(&sets.K, arcs)
            .map(|(k, e)| (parameters.h[*k], vars.x[*k][*e]))
            .collect()
    }

    /// net departure of each family from its origin, and the person capacity of origins
    fn origin_constraints(model: &mut Milp, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let p = parameters;

        for k in &sets.K {
            let o = p.O[*k];
            let lhs = Self::flow(vars, *k, &sets.E_out[o]) - Self::flow(vars, *k, &sets.E_in[o]);
            model.add_constr(
                &format!("origin_balance_{}_{}_{}", p.id[*k], p.h[*k], p.label[o]),
                lhs.equals(p.Q[*k]),
            );
        }

        for a in &sets.A {
            let lhs = Self::persons(vars, sets, p, &sets.E_out[*a]);
            model.add_constr(&format!("origin_capacity_{}", p.label[*a]), lhs.leq(p.alpha));
        }
    }

    /// flow conservation at transit points and their activation-gated capacity
    fn transit_constraints(model: &mut Milp, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let p = parameters;

        for (k, r) in iproduct!(&sets.K, &sets.R) {
            let lhs = Self::flow(vars, *k, &sets.E_in[*r]);
            let rhs = Self::flow(vars, *k, &sets.E_out[*r]);
            model.add_constr(
                &format!("transit_conservation_{}_{}_{}", p.id[*k], p.h[*k], p.label[*r]),
                lhs.equals(rhs),
            );
        }

        for r in &sets.R {
            let lhs = Self::persons(vars, sets, p, &sets.E_out[*r]);
            let rhs = Self::activated(vars, *r) * p.beta;
            model.add_constr(&format!("transit_capacity_{}", p.label[*r]), lhs.leq(rhs));
        }
    }

    /// net accumulation at safe havens, gated by activation, and their absolute capacity
    fn haven_constraints(model: &mut Milp, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let p = parameters;

        for f in &sets.F {
            let inflow = Self::persons(vars, sets, p, &sets.E_in[*f]);
            let outflow = Self::persons(vars, sets, p, &sets.E_out[*f]);
            let rhs = Self::activated(vars, *f) * p.pi[*f];
            model.add_constr(
                &format!("haven_slack_{}", p.label[*f]),
                (inflow.clone() - outflow).leq(rhs),
            );
            model.add_constr(&format!("haven_capacity_{}", p.label[*f]), inflow.leq(p.gamma));
        }
    }

    /// per-family ties between the first hop and the arrival, and no fabricated flow at havens
    fn balance_constraints(model: &mut Milp, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let p = parameters;

        for k in &sets.K {
            let first = Self::flow(vars, *k, &sets.E_first) - Self::flow(vars, *k, &sets.E_first_back);
            let arrival =
                Self::flow(vars, *k, &sets.E_arrival) - Self::flow(vars, *k, &sets.E_arrival_back);
            model.add_constr(
                &format!("stage_balance_{}_{}", p.id[*k], p.h[*k]),
                first.equals(arrival),
            );
        }

        for (k, f) in iproduct!(&sets.K, &sets.F) {
            let lhs = Self::flow(vars, *k, &sets.E_out[*f]);
            let rhs = Self::flow(vars, *k, &sets.E_in[*f]);
            model.add_constr(
                &format!("haven_net_{}_{}_{}", p.id[*k], p.h[*k], p.label[*f]),
                lhs.leq(rhs),
            );
        }
    }

    fn activated(vars: &Variables, n: NodeIndex) -> LinExpr {
        vars.y[n].map(LinExpr::from).unwrap_or_default()
    }

    /// Builds, solves and interprets the model for `problem`. Routes are decomposed
    /// only when the solver proves optimality.
    pub fn solve(
        problem: &Problem,
        solver: &dyn MilpSolver,
        config: &SolverConfig,
    ) -> Result<Solution, SolverError> {
        let sets = Sets::new(problem);
        let parameters = Parameters::new(problem);
        let (model, vars) = EvacuationSolver::build(&sets, &parameters);

        info!("Solving evacuation model with {}", solver.name());
        let raw = solver.solve(&model)?;
        if let Some(values) = &raw.values {
            if values.len() != model.vars().len() {
                return Err(SolverError::ValueCount {
                    backend: solver.name().to_string(),
                    expected: model.vars().len(),
                    got: values.len(),
                });
            }
        }
        info!("Solver finished with status {}", raw.status);

        let mut solution = Solution::interpret(problem, &model, &vars, &raw, config);

        if solution.status == SolveStatus::Optimal {
            solution.routes = routes::decompose(problem, &solution.flows);
            solution.reconciliation = Some(routes::reconcile(problem, &solution.routes));
            debug!("decomposed {} routes", solution.routes.len());
        }

        Ok(solution)
    }
}
