use std::collections::BTreeMap;

use evacuation::problem::{ArcIndex, FamilyIndex, NodeClass, Problem};
use evacuation::solution::routes::{decompose, reconcile};
use evacuation::solution::{FamilyFlows, FlowRecord};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

const TRANSITS: usize = 3;
const HAVENS: usize = 3;

/// A path A1 -> (some transits, in increasing order) -> one haven, optionally moving on
/// to a later haven, carrying `quantity` units
#[derive(Debug, Clone)]
struct PathPlan {
    transits: Vec<bool>,
    haven: usize,
    onward: Option<usize>,
    quantity: u64,
}

fn path_plan() -> impl Strategy<Value = PathPlan> {
    (
        prop::collection::vec(any::<bool>(), TRANSITS),
        0..HAVENS,
        prop::option::of(0..HAVENS),
        1u64..5,
    )
        .prop_map(|(transits, haven, onward, quantity)| PathPlan {
            transits,
            haven,
            onward: onward.filter(|next| *next > haven),
            quantity,
        })
}

fn labels(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// Every forward arc A1 -> R, A1 -> F, R_i -> R_j (i < j), R -> F and F_i -> F_j (i < j),
/// with the given lengths
fn distances(lengths: &[u32]) -> Value {
    let transits = labels("R", TRANSITS);
    let havens = labels("F", HAVENS);
    let mut next = lengths.iter().cycle().copied();
    let mut out = Map::new();

    let mut a1 = Map::new();
    for to in transits.iter().chain(havens.iter()) {
        a1.insert(to.clone(), json!(next.next()));
    }
    out.insert("A1".to_string(), Value::Object(a1));

    for (i, from) in transits.iter().enumerate() {
        let mut row = Map::new();
        for to in transits[i + 1..].iter().chain(havens.iter()) {
            row.insert(to.clone(), json!(next.next()));
        }
        out.insert(from.clone(), Value::Object(row));
    }

    for (i, from) in havens.iter().enumerate().take(HAVENS - 1) {
        let mut row = Map::new();
        for to in &havens[i + 1..] {
            row.insert(to.clone(), json!(next.next()));
        }
        out.insert(from.clone(), Value::Object(row));
    }

    Value::Object(out)
}

fn problem(distances: &Value, household_size: u32, value: u64) -> Problem {
    Problem::new(
        &serde_json::from_value(json!({
            "etiquetasA": ["A1"],
            "etiquetasR": labels("R", TRANSITS),
            "etiquetasF": labels("F", HAVENS),
            "distancias": distances,
            "idFamilias": [1],
            "idf": {"1": {"h": household_size, "ns": "A1", "valor": value}}
        }))
        .unwrap(),
    )
    .unwrap()
}

/// Sums the given paths into per-arc flows, ordered by arc
fn flows(problem: &Problem, paths: &[PathPlan]) -> FamilyFlows {
    let network = problem.network();
    let family = FamilyIndex::from(0);
    let household_size = problem.family(family).household_size;

    let mut quantities: BTreeMap<ArcIndex, u64> = BTreeMap::new();
    for path in paths {
        let mut nodes = vec!["A1".to_string()];
        for (i, used) in path.transits.iter().enumerate() {
            if *used {
                nodes.push(format!("R{}", i + 1));
            }
        }
        nodes.push(format!("F{}", path.haven + 1));
        if let Some(next) = path.onward {
            nodes.push(format!("F{}", next + 1));
        }

        for pair in nodes.windows(2) {
            let from = network.index_of(&pair[0]).unwrap();
            let to = network.index_of(&pair[1]).unwrap();
            *quantities.entry(network.arc_between(from, to).unwrap()).or_default() += path.quantity;
        }
    }

    FamilyFlows {
        family,
        id: 1,
        household_size,
        origin: problem.family(family).origin,
        flows: quantities
            .into_iter()
            .map(|(arc, quantity)| FlowRecord {
                arc,
                from: network.arc(arc).from,
                to: network.arc(arc).to,
                quantity,
                persons: quantity * household_size as u64,
            })
            .collect(),
    }
}

proptest! {
    #[test]
    fn decomposed_path_flows_reconcile(
        lengths in prop::collection::vec(1u32..20, 1..16),
        paths in prop::collection::vec(path_plan(), 1..8),
        household_size in 1u32..6,
    ) {
        let input = distances(&lengths);
        let total: u64 = paths.iter().map(|p| p.quantity).sum();
        let problem = problem(&input, household_size, total);
        let family = flows(&problem, &paths);

        let routes = decompose(&problem, &[family.clone()]);
        let reconciliation = reconcile(&problem, &routes);
        prop_assert!(reconciliation.is_consistent());
        prop_assert_eq!(routes.iter().map(|r| r.quantity).sum::<u64>(), total);

        let network = problem.network();
        for haven in network.nodes_of(NodeClass::SafeHaven) {
            let arriving: u64 = family.flows.iter().filter(|f| f.to == haven).map(|f| f.quantity).sum();
            let leaving: u64 = family.flows.iter().filter(|f| f.from == haven).map(|f| f.quantity).sum();
            let routed: u64 = routes
                .iter()
                .filter(|r| r.destination() == haven)
                .map(|r| r.quantity)
                .sum();
            prop_assert_eq!(routed, arriving - leaving, "haven {}", network.label(haven));
        }

        for route in &routes {
            prop_assert!(route.quantity > 0);
            prop_assert_eq!(network.label(route.origin()), "A1");
            prop_assert_eq!(network.class(route.destination()), NodeClass::SafeHaven);
            prop_assert_eq!(route.persons, route.quantity * household_size as u64);

            let recomputed: f64 = route
                .path
                .windows(2)
                .map(|pair| {
                    input[network.label(pair[0])][network.label(pair[1])]
                        .as_f64()
                        .unwrap()
                })
                .sum();
            prop_assert_eq!(route.distance, recomputed);
        }
    }
}
