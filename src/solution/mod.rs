use std::collections::BTreeMap;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::milp::{Milp, RawSolution, SolveStatus, SolverConfig};
use crate::models::evacuation::Variables;
use crate::models::utils::ConvertVars;
use crate::problem::{ArcIndex, FamilyId, FamilyIndex, NodeIndex, Problem};

pub mod routes;

pub use routes::{Reconciliation, Route};

/// Family-units of one family travelling across one arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowRecord {
    pub arc: ArcIndex,
    pub from: NodeIndex,
    pub to: NodeIndex,
    /// Number of family-units on the arc
    pub quantity: u64,
    /// quantity * household size
    pub persons: u64,
}

/// The positive flows of a single family, in arc order.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyFlows {
    pub family: FamilyIndex,
    pub id: FamilyId,
    pub household_size: u32,
    pub origin: NodeIndex,
    pub flows: Vec<FlowRecord>,
}

/// The interpreted outcome of one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolveStatus,
    /// Objective value at the returned assignment, if there is one
    pub objective: Option<f64>,
    /// Activation value of every transit node and safe haven, if the solver returned values
    pub activation: Vec<(NodeIndex, Option<f64>)>,
    /// Nodes whose activation is 1
    pub activated: Vec<NodeIndex>,
    /// Positive flows, for every family that has any
    pub flows: Vec<FamilyFlows>,
    /// Decomposed routes. Empty unless the status is optimal.
    pub routes: Vec<Route>,
    /// Person-count check of the routes. Only present for optimal solutions.
    pub reconciliation: Option<Reconciliation>,
}

/// Snaps `value` to the nearest integer, warning when it is further away than `tolerance`
fn snap(value: f64, tolerance: f64, name: &str) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() > tolerance {
        warn!(
            "{} = {} is not integral within {}, reading it as {}",
            name, value, tolerance, rounded
        );
    }
    rounded
}

impl Solution {
    /// Reads activation and flow values out of a raw solver assignment.
    pub fn interpret(
        problem: &Problem,
        model: &Milp,
        vars: &Variables,
        raw: &RawSolution,
        config: &SolverConfig,
    ) -> Solution {
        let network = problem.network();
        let tolerance = config.integrality_tolerance;

        let values = match &raw.values {
            Some(values) => values,
            None => {
                return Solution {
                    status: raw.status,
                    objective: None,
                    activation: network.activatable().map(|n| (n, None)).collect(),
                    activated: Vec::new(),
                    flows: Vec::new(),
                    routes: Vec::new(),
                    reconciliation: None,
                }
            }
        };

        let y = vars.y.convert(values);
        let activation: Vec<(NodeIndex, Option<f64>)> = y
            .iter_enumerated()
            .filter_map(|(n, value)| {
                let name = &model.var(vars.y[n]?).name;
                value.map(|v| (n, Some(snap(v, tolerance, name))))
            })
            .collect();
        let activated = activation
            .iter()
            .filter(|(_, value)| *value == Some(1.0))
            .map(|(n, _)| *n)
            .collect();

        let x = vars.x.convert(values);
        let mut flows = Vec::new();
        for (k, row) in x.iter_enumerated() {
            let family = problem.family(k);
            let records: Vec<FlowRecord> = row
                .iter_enumerated()
                .filter_map(|(e, value)| {
                    let quantity = snap(*value, tolerance, &model.var(vars.x[k][e]).name);
                    if quantity <= 0.0 {
                        return None;
                    }
                    let arc = network.arc(e);
                    let quantity = quantity as u64;
                    Some(FlowRecord {
                        arc: e,
                        from: arc.from,
                        to: arc.to,
                        quantity,
                        persons: quantity * family.household_size as u64,
                    })
                })
                .collect();

            trace!("family {} has {} positive flows", family.id, records.len());
            if !records.is_empty() {
                flows.push(FamilyFlows {
                    family: k,
                    id: family.id,
                    household_size: family.household_size,
                    origin: family.origin,
                    flows: records,
                });
            }
        }

        Solution {
            status: raw.status,
            objective: Some(model.objective().eval(values)),
            activation,
            activated,
            flows,
            routes: Vec::new(),
            reconciliation: None,
        }
    }

    /// Whether the routes account for every person that had to be evacuated
    pub fn is_reconciled(&self) -> bool {
        self.reconciliation
            .as_ref()
            .map_or(false, Reconciliation::is_consistent)
    }

    /// Renders the solution as the output document
    pub fn to_document(&self, problem: &Problem) -> OutputDocument {
        let network = problem.network();
        let label = |n: NodeIndex| network.label(n).to_string();

        let entries = |family: &FamilyFlows| -> Vec<FlowEntry> {
            family
                .flows
                .iter()
                .map(|f| FlowEntry {
                    from: label(f.from),
                    to: label(f.to),
                    quantity: f.quantity,
                    persons: f.persons,
                })
                .collect()
        };

        let variables_x = self
            .flows
            .iter()
            .map(|family| (family.id, entries(family)))
            .collect();

        let flows_per_family = self
            .flows
            .iter()
            .map(|family| {
                (
                    family.id,
                    FamilySummary {
                        household_size: family.household_size,
                        origin: label(family.origin),
                        flows: entries(family),
                    },
                )
            })
            .collect();

        OutputDocument {
            status: self.status,
            objective: self.objective,
            variables_x,
            variables_y: self
                .activation
                .iter()
                .map(|(n, value)| (label(*n), *value))
                .collect(),
            summary: Summary {
                activated: self.activated.iter().map(|n| label(*n)).collect(),
                flows_per_family,
            },
            routes: self
                .routes
                .iter()
                .map(|route| RouteEntry::new(route, problem))
                .collect(),
            reconciliation: self.reconciliation.as_ref().map(|r| ReconciliationEntry {
                reported: r.reported,
                expected: r.expected,
                consistent: r.is_consistent(),
            }),
        }
    }
}

/// The output document produced for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub status: SolveStatus,
    #[serde(rename = "valor_objetivo")]
    pub objective: Option<f64>,
    #[serde(rename = "variables_X")]
    pub variables_x: BTreeMap<FamilyId, Vec<FlowEntry>>,
    #[serde(rename = "variables_Y")]
    pub variables_y: BTreeMap<String, Option<f64>>,
    #[serde(rename = "resumen")]
    pub summary: Summary,
    #[serde(rename = "reporte_rutas")]
    pub routes: Vec<RouteEntry>,
    #[serde(rename = "conciliacion")]
    pub reconciliation: Option<ReconciliationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    #[serde(rename = "desde")]
    pub from: String,
    #[serde(rename = "hacia")]
    pub to: String,
    #[serde(rename = "cantidad")]
    pub quantity: u64,
    #[serde(rename = "personas")]
    pub persons: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "nodos_activados")]
    pub activated: Vec<String>,
    #[serde(rename = "flujos_por_familia")]
    pub flows_per_family: BTreeMap<FamilyId, FamilySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    #[serde(rename = "tamaño_familia")]
    pub household_size: u32,
    #[serde(rename = "origen")]
    pub origin: String,
    #[serde(rename = "flujos")]
    pub flows: Vec<FlowEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(rename = "id_familia")]
    pub family: FamilyId,
    #[serde(rename = "tamaño_familia")]
    pub household_size: u32,
    #[serde(rename = "familias_en_ruta")]
    pub quantity: u64,
    #[serde(rename = "personas_en_ruta")]
    pub persons: u64,
    #[serde(rename = "ruta")]
    pub path: Vec<String>,
    #[serde(rename = "ruta_str")]
    pub path_str: String,
    #[serde(rename = "num_nodos_ruta")]
    pub nodes: usize,
    #[serde(rename = "distancia")]
    pub distance: f64,
    #[serde(rename = "origen")]
    pub origin: String,
    #[serde(rename = "destino")]
    pub destination: String,
}

impl RouteEntry {
    fn new(route: &Route, problem: &Problem) -> RouteEntry {
        let network = problem.network();
        let path: Vec<String> = route
            .path
            .iter()
            .map(|n| network.label(*n).to_string())
            .collect();
        RouteEntry {
            family: route.family_id,
            household_size: route.household_size,
            quantity: route.quantity,
            persons: route.persons,
            path_str: path.join("->"),
            nodes: path.len(),
            path,
            distance: route.distance,
            origin: network.label(route.origin()).to_string(),
            destination: network.label(route.destination()).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    #[serde(rename = "personas_reportadas")]
    pub reported: u64,
    #[serde(rename = "personas_esperadas")]
    pub expected: u64,
    #[serde(rename = "consistente")]
    pub consistent: bool,
}
