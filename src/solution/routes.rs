use std::collections::HashSet;

use log::{info, trace, warn};
use typed_index_collections::TiVec;

use super::{FamilyFlows, FlowRecord};
use crate::problem::{ArcIndex, Distance, FamilyId, FamilyIndex, NodeClass, NodeIndex, Problem};

/// A discrete origin-to-haven path carrying some family-units of one family
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub family: FamilyIndex,
    pub family_id: FamilyId,
    pub household_size: u32,
    /// Number of family-units following the route
    pub quantity: u64,
    /// quantity * household size
    pub persons: u64,
    /// Visited nodes, origin first
    pub path: Vec<NodeIndex>,
    /// Arcs between consecutive nodes of `path`
    pub arcs: Vec<ArcIndex>,
    /// Sum of the arc distances along the path
    pub distance: Distance,
}

impl Route {
    pub fn origin(&self) -> NodeIndex {
        self.path[0]
    }

    pub fn destination(&self) -> NodeIndex {
        self.path[self.path.len() - 1]
    }

    /// Renders the path as `A1->R1->F1`
    pub fn path_str(&self, problem: &Problem) -> String {
        let network = problem.network();
        self.path
            .iter()
            .map(|n| network.label(*n))
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Number of persons carried by the routes compared with the number that had to leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub reported: u64,
    pub expected: u64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.reported == self.expected
    }
}

/// Walks backward from `haven` to the family's origin, always taking the unvisited
/// predecessor arc with the largest residual. Returns the arcs in travel order, or None
/// if the walk runs into a dead end.
fn walk_back(
    problem: &Problem,
    origin: NodeIndex,
    haven: NodeIndex,
    residual: &TiVec<ArcIndex, u64>,
) -> Option<Vec<ArcIndex>> {
    let network = problem.network();

    let mut arcs = Vec::new();
    let mut visited: HashSet<NodeIndex> = HashSet::from([haven]);
    let mut current = haven;

    while current != origin {
        let next = network
            .incoming(current)
            .iter()
            .copied()
            .filter(|e| residual[*e] > 0 && !visited.contains(&network.arc(*e).from))
            // max_by_key keeps the last maximum, so compare on reversed index
            .max_by_key(|e| (residual[*e], std::cmp::Reverse(*e)))?;

        current = network.arc(next).from;
        visited.insert(current);
        arcs.push(next);
    }

    arcs.reverse();
    Some(arcs)
}

/// Family-units each safe haven keeps: what enters it minus what leaves it
fn retention(problem: &Problem, family: &FamilyFlows) -> Vec<(NodeIndex, u64)> {
    let network = problem.network();
    network
        .nodes_of(NodeClass::SafeHaven)
        .filter_map(|haven| {
            let flow = |arc: &FlowRecord| arc.quantity;
            let inflow: u64 = family.flows.iter().filter(|f| f.to == haven).map(flow).sum();
            let outflow: u64 = family.flows.iter().filter(|f| f.from == haven).map(flow).sum();
            if outflow > inflow {
                warn!(
                    "family {} leaves {} with {} more family-units than arrived",
                    family.id,
                    network.label(haven),
                    outflow - inflow
                );
            }
            let kept = inflow.saturating_sub(outflow);
            if kept > 0 {
                Some((haven, kept))
            } else {
                None
            }
        })
        .collect()
}

/// Splits the flows of one family into routes ending where the family-units stay
fn decompose_family(problem: &Problem, family: &FamilyFlows) -> Vec<Route> {
    let network = problem.network();

    let mut residual: TiVec<ArcIndex, u64> = vec![0; network.arcs().len()].into();
    for flow in &family.flows {
        residual[flow.arc] += flow.quantity;
    }

    let mut routes = Vec::new();
    for (haven, mut kept) in retention(problem, family) {
        while kept > 0 {
            let arcs = match walk_back(problem, family.origin, haven, &residual) {
                Some(arcs) if !arcs.is_empty() => arcs,
                _ => {
                    warn!(
                        "no path from {} to {} for family {}, dropping {} family-units",
                        network.label(family.origin),
                        network.label(haven),
                        family.id,
                        kept
                    );
                    break;
                }
            };

            let bottleneck = arcs.iter().map(|e| residual[*e]).min().unwrap_or(0);
            let quantity = bottleneck.min(kept);
            for e in &arcs {
                residual[*e] -= quantity;
            }
            kept -= quantity;

            let mut path = vec![family.origin];
            path.extend(arcs.iter().map(|e| network.arc(*e).to));

            trace!(
                "family {}: {} family-units over {} arcs",
                family.id,
                quantity,
                arcs.len()
            );
            routes.push(Route {
                family: family.family,
                family_id: family.id,
                household_size: family.household_size,
                quantity,
                persons: quantity * family.household_size as u64,
                distance: arcs.iter().map(|e| network.arc(*e).distance).sum(),
                path,
                arcs,
            });
        }
    }

    routes
}

/// Decomposes per-family arc flows into routes. Families are processed in the given order,
/// and within a family the safe havens in declaration order. A haven receives routes for
/// the family-units it keeps, so flow passing through it continues to the next haven.
pub fn decompose(problem: &Problem, flows: &[FamilyFlows]) -> Vec<Route> {
    flows
        .iter()
        .flat_map(|family| decompose_family(problem, family))
        .collect()
}

/// Compares the persons carried by `routes` with the persons that had to be evacuated
pub fn reconcile(problem: &Problem, routes: &[Route]) -> Reconciliation {
    let reconciliation = Reconciliation {
        reported: routes.iter().map(|r| r.persons).sum(),
        expected: problem.expected_persons(),
    };

    if reconciliation.is_consistent() {
        info!(
            "Routes account for all {} persons",
            reconciliation.expected
        );
    } else {
        warn!(
            "Routes carry {} persons but {} had to be evacuated",
            reconciliation.reported, reconciliation.expected
        );
    }

    reconciliation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::InputDocument;
    use serde_json::json;

    fn problem(distances: serde_json::Value, valor: u32) -> Problem {
        let doc = InputDocument::from_value(json!({
            "etiquetasA": ["A1"],
            "etiquetasR": ["R1", "R2"],
            "etiquetasF": ["F1", "F2"],
            "distancias": distances,
            "idFamilias": [5],
            "idf": {"5": {"h": 3, "ns": "A1", "valor": valor}}
        }))
        .unwrap();
        Problem::new(&doc).unwrap()
    }

    /// flows given as (from, to, quantity) labels
    fn flows(problem: &Problem, arcs: &[(&str, &str, u64)]) -> Vec<FamilyFlows> {
        let network = problem.network();
        let family = FamilyIndex::from(0);
        let records = arcs
            .iter()
            .map(|(from, to, quantity)| {
                let from = network.index_of(from).unwrap();
                let to = network.index_of(to).unwrap();
                FlowRecord {
                    arc: network.arc_between(from, to).unwrap(),
                    from,
                    to,
                    quantity: *quantity,
                    persons: quantity * 3,
                }
            })
            .collect();
        vec![FamilyFlows {
            family,
            id: 5,
            household_size: 3,
            origin: problem.family(family).origin,
            flows: records,
        }]
    }

    fn paths(problem: &Problem, routes: &[Route]) -> Vec<(String, u64)> {
        routes
            .iter()
            .map(|r| (r.path_str(problem), r.quantity))
            .collect()
    }

    fn diamond() -> serde_json::Value {
        json!({
            "A1": {"R1": 2, "R2": 4},
            "R1": {"F1": 3},
            "R2": {"F1": 1}
        })
    }

    #[test]
    fn follows_single_path() {
        let problem = problem(diamond(), 2);
        let flows = flows(&problem, &[("A1", "R1", 2), ("R1", "F1", 2)]);
        let routes = decompose(&problem, &flows);

        assert_eq!(paths(&problem, &routes), vec![("A1->R1->F1".to_string(), 2)]);
        assert_eq!(routes[0].persons, 6);
        assert_eq!(routes[0].distance, 5.0);
        assert!(reconcile(&problem, &routes).is_consistent());
    }

    #[test]
    fn takes_the_larger_inflow_first() {
        let problem = problem(diamond(), 5);
        let flows = flows(
            &problem,
            &[("A1", "R1", 2), ("A1", "R2", 3), ("R1", "F1", 2), ("R2", "F1", 3)],
        );
        let routes = decompose(&problem, &flows);

        assert_eq!(
            paths(&problem, &routes),
            vec![
                ("A1->R2->F1".to_string(), 3),
                ("A1->R1->F1".to_string(), 2)
            ]
        );
        assert_eq!(routes[0].distance, 5.0);
        assert_eq!(
            reconcile(&problem, &routes),
            Reconciliation {
                reported: 15,
                expected: 15
            }
        );
    }

    fn merge() -> serde_json::Value {
        json!({
            "A1": {"R1": 2, "R2": 1},
            "R2": {"R1": 1},
            "R1": {"F1": 3}
        })
    }

    #[test]
    fn splits_merging_flows_largest_first() {
        let problem = problem(merge(), 3);
        let flows = flows(
            &problem,
            &[("A1", "R1", 1), ("A1", "R2", 2), ("R1", "F1", 3), ("R2", "R1", 2)],
        );
        let routes = decompose(&problem, &flows);

        assert_eq!(
            paths(&problem, &routes),
            vec![
                ("A1->R2->R1->F1".to_string(), 2),
                ("A1->R1->F1".to_string(), 1)
            ]
        );
        assert_eq!(routes[0].distance, 5.0);
        assert_eq!(routes[0].arcs.len(), 3);
        assert_eq!(routes[1].distance, 5.0);
        assert!(reconcile(&problem, &routes).is_consistent());
    }

    #[test]
    fn ties_go_to_the_first_arc() {
        let problem = problem(merge(), 2);
        let flows = flows(
            &problem,
            &[("A1", "R1", 1), ("A1", "R2", 1), ("R1", "F1", 2), ("R2", "R1", 1)],
        );
        let routes = decompose(&problem, &flows);

        assert_eq!(
            paths(&problem, &routes),
            vec![
                ("A1->R1->F1".to_string(), 1),
                ("A1->R2->R1->F1".to_string(), 1)
            ]
        );
    }

    #[test]
    fn continues_through_a_haven_to_the_next() {
        let distances = json!({
            "A1": {"F1": 4},
            "F1": {"F2": 6}
        });
        let problem = problem(distances, 2);
        let flows = flows(&problem, &[("A1", "F1", 2), ("F1", "F2", 1)]);
        let routes = decompose(&problem, &flows);

        assert_eq!(
            paths(&problem, &routes),
            vec![
                ("A1->F1".to_string(), 1),
                ("A1->F1->F2".to_string(), 1)
            ]
        );
        assert_eq!(routes[1].distance, 10.0);
        assert!(reconcile(&problem, &routes).is_consistent());
    }

    #[test]
    fn haven_passing_everything_on_gets_no_route() {
        let distances = json!({
            "A1": {"F1": 4},
            "F1": {"F2": 6}
        });
        let problem = problem(distances, 2);
        let flows = flows(&problem, &[("A1", "F1", 2), ("F1", "F2", 2)]);
        let routes = decompose(&problem, &flows);

        assert_eq!(paths(&problem, &routes), vec![("A1->F1->F2".to_string(), 2)]);
        assert_eq!(routes[0].persons, 6);
    }

    #[test]
    fn drops_terminus_without_path_to_origin() {
        let problem = problem(diamond(), 2);
        let flows = flows(&problem, &[("R1", "F1", 2)]);
        let routes = decompose(&problem, &flows);

        assert!(routes.is_empty());
        let reconciliation = reconcile(&problem, &routes);
        assert!(!reconciliation.is_consistent());
        assert_eq!(reconciliation.expected, 6);
    }

    #[test]
    fn does_not_loop_through_cycles() {
        let distances = json!({
            "A1": {"R1": 1},
            "R1": {"R2": 1, "F1": 1},
            "R2": {"R1": 1}
        });
        let problem = problem(distances, 1);
        // R1 <-> R2 circulation that never touches the origin
        let flows = flows(&problem, &[("R2", "R1", 1), ("R1", "R2", 1), ("R1", "F1", 1)]);
        let routes = decompose(&problem, &flows);

        assert!(routes.is_empty());
    }

    #[test]
    fn zero_demand_yields_no_routes() {
        let problem = problem(diamond(), 0);
        let routes = decompose(&problem, &[]);

        assert!(routes.is_empty());
        assert!(reconcile(&problem, &routes).is_consistent());
    }
}
