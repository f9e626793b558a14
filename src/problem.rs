use std::collections::{HashMap, HashSet};

use derive_more::{Deref, Display, From, Into};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

/// The type used for distance
pub type Distance = f64;
/// The type used for cost.
pub type Cost = f64;
/// Identifier of a family, unique within a run.
pub type FamilyId = u32;

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct NodeIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct ArcIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct FamilyIndex(usize);

/// Errors raised while validating an input document. No model is built when one occurs.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum InvalidModelError {
    /// The document could not be parsed (missing key, wrong type, ...)
    #[display(fmt = "malformed input document: {}", _0)]
    Malformed(String),
    /// A label appears more than once across the origin, transit and safe-haven sets
    #[display(fmt = "label {} is declared more than once", _0)]
    DuplicateLabel(String),
    /// A label is referenced but never declared as a node
    #[display(fmt = "unknown label {} referenced in {}", label, context)]
    UnknownLabel { label: String, context: String },
    /// A family departs from a node that is not an origin
    #[display(fmt = "family {} departs from {}, which is not an origin node", family, label)]
    OriginNotInOriginSet { family: FamilyId, label: String },
    /// A family id is listed but has no record
    #[display(fmt = "family {} has no record in idf", _0)]
    UnknownFamily(FamilyId),
    /// A family id is listed twice
    #[display(fmt = "family {} is listed more than once", _0)]
    DuplicateFamily(FamilyId),
    /// A distance that is negative or not finite
    #[display(fmt = "invalid distance {} from {} to {}", distance, from, to)]
    InvalidDistance { from: String, to: String, distance: f64 },
    /// A count (household size, required flow, family id) that is not a non-negative integer
    #[display(fmt = "{} must be a non-negative integer, got {}", field, value)]
    InvalidNumber { field: String, value: String },
    /// A negative capacity, cost or weight
    #[display(fmt = "parameter {} must be non-negative, got {}", name, value)]
    InvalidParameter { name: String, value: f64 },
}

impl std::error::Error for InvalidModelError {}

/// A number that may arrive either as a JSON number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// Interprets the value as a non-negative integer count.
    pub fn count(&self, field: &str) -> Result<u32, InvalidModelError> {
        let invalid = || InvalidModelError::InvalidNumber {
            field: field.to_string(),
            value: match self {
                Numeric::Number(x) => x.to_string(),
                Numeric::Text(s) => s.clone(),
            },
        };

        let x = match self {
            Numeric::Number(x) => *x,
            Numeric::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        };

        if !x.is_finite() || x < 0.0 || x.fract() != 0.0 || x > u32::MAX as f64 {
            return Err(invalid());
        }
        Ok(x as u32)
    }
}

impl From<u32> for Numeric {
    fn from(x: u32) -> Self {
        Numeric::Number(x as f64)
    }
}

/// A family record as found in the `idf` mapping of the input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyRecord {
    /// Household size
    pub h: Numeric,
    /// Origin label
    pub ns: String,
    /// Number of family-units that must depart the origin
    pub valor: Numeric,
}

/// The input document consumed by the model builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDocument {
    #[serde(rename = "etiquetasA")]
    pub origins: Vec<String>,
    #[serde(rename = "etiquetasR")]
    pub transits: Vec<String>,
    #[serde(rename = "etiquetasF")]
    pub havens: Vec<String>,
    #[serde(rename = "distancias")]
    pub distances: HashMap<String, HashMap<String, Distance>>,
    #[serde(rename = "idFamilias")]
    pub family_ids: Vec<Numeric>,
    #[serde(rename = "idf")]
    pub families: HashMap<String, FamilyRecord>,
    #[serde(rename = "costoPorKm", default)]
    pub cost_per_km: Cost,
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub ac: HashMap<String, Cost>,
    #[serde(default)]
    pub pi: HashMap<String, f64>,
}

impl InputDocument {
    pub fn from_json(json: &str) -> Result<InputDocument, InvalidModelError> {
        serde_json::from_str(json).map_err(|e| InvalidModelError::Malformed(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<InputDocument, InvalidModelError> {
        serde_json::from_value(value).map_err(|e| InvalidModelError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NodeClass {
    Origin,
    Transit,
    SafeHaven,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The label of the node, unique across all classes
    label: String,
    /// The class the node belongs to
    class: NodeClass,
}

impl Node {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn class(&self) -> NodeClass {
        self.class
    }

    /// Whether the node carries an activation decision (transit points and safe havens)
    pub fn is_activatable(&self) -> bool {
        !matches!(self.class, NodeClass::Origin)
    }
}

/// A directed connection with a strictly positive distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub distance: Distance,
}

/// The static evacuation network. Only connected pairs are stored as arcs, and the
/// adjacency lists are derived once at construction.
#[derive(Debug, Clone)]
pub struct Network {
    nodes: TiVec<NodeIndex, Node>,
    arcs: TiVec<ArcIndex, Arc>,
    outgoing: TiVec<NodeIndex, Vec<ArcIndex>>,
    incoming: TiVec<NodeIndex, Vec<ArcIndex>>,
    lookup: HashMap<String, NodeIndex>,
}

impl Network {
    /// Builds the network from the three label sets and the nested distance mapping.
    /// Nodes are ordered origins, transits, havens; arcs follow that order on both endpoints.
    pub fn new(
        origins: &[String],
        transits: &[String],
        havens: &[String],
        distances: &HashMap<String, HashMap<String, Distance>>,
    ) -> Result<Network, InvalidModelError> {
        let mut nodes: TiVec<NodeIndex, Node> = TiVec::new();
        let mut lookup = HashMap::new();

        let classes = [
            (origins, NodeClass::Origin),
            (transits, NodeClass::Transit),
            (havens, NodeClass::SafeHaven),
        ];
        for (labels, class) in classes {
            for label in labels {
                if lookup.contains_key(label) {
                    return Err(InvalidModelError::DuplicateLabel(label.clone()));
                }
                lookup.insert(label.clone(), NodeIndex(nodes.len()));
                nodes.push(Node {
                    label: label.clone(),
                    class,
                });
            }
        }

        // checked in declaration order so the same document always reports the same error
        let context = || "distancias".to_string();
        let mut unknown: Vec<&String> = distances
            .keys()
            .filter(|from| !lookup.contains_key(*from))
            .collect();
        unknown.sort();
        if let Some(from) = unknown.first() {
            return Err(InvalidModelError::UnknownLabel {
                label: (*from).clone(),
                context: context(),
            });
        }

        for from in nodes.iter().map(Node::label) {
            let row = match distances.get(from) {
                Some(row) => row,
                None => continue,
            };
            let mut targets: Vec<(&String, f64)> = row.iter().map(|(to, d)| (to, *d)).collect();
            // unknown labels first, then declaration order
            targets.sort_by_key(|(to, _)| (lookup.get(*to).copied(), *to));

            for (to, distance) in targets {
                if !lookup.contains_key(to) {
                    return Err(InvalidModelError::UnknownLabel {
                        label: to.clone(),
                        context: context(),
                    });
                }
                if !distance.is_finite() || distance < 0.0 {
                    return Err(InvalidModelError::InvalidDistance {
                        from: from.to_string(),
                        to: to.clone(),
                        distance,
                    });
                }
            }
        }

        let mut arcs: TiVec<ArcIndex, Arc> = TiVec::new();
        let mut outgoing: TiVec<NodeIndex, Vec<ArcIndex>> = vec![Vec::new(); nodes.len()].into();
        let mut incoming: TiVec<NodeIndex, Vec<ArcIndex>> = vec![Vec::new(); nodes.len()].into();

        for (i, from) in nodes.iter_enumerated() {
            let row = match distances.get(from.label()) {
                Some(row) => row,
                None => continue,
            };
            for (j, to) in nodes.iter_enumerated() {
                let distance = row.get(to.label()).copied().unwrap_or(0.0);
                if distance > 0.0 {
                    let a = ArcIndex(arcs.len());
                    arcs.push(Arc {
                        from: i,
                        to: j,
                        distance,
                    });
                    outgoing[i].push(a);
                    incoming[j].push(a);
                }
            }
        }

        debug!("network has {} nodes and {} arcs", nodes.len(), arcs.len());

        Ok(Network {
            nodes,
            arcs,
            outgoing,
            incoming,
            lookup,
        })
    }

    pub fn nodes(&self) -> &TiVec<NodeIndex, Node> {
        &self.nodes
    }

    pub fn arcs(&self) -> &TiVec<ArcIndex, Arc> {
        &self.arcs
    }

    pub fn node(&self, n: NodeIndex) -> &Node {
        &self.nodes[n]
    }

    pub fn arc(&self, a: ArcIndex) -> &Arc {
        &self.arcs[a]
    }

    pub fn label(&self, n: NodeIndex) -> &str {
        self.nodes[n].label()
    }

    pub fn class(&self, n: NodeIndex) -> NodeClass {
        self.nodes[n].class()
    }

    /// The index of the node with the given label, if any
    pub fn index_of(&self, label: &str) -> Option<NodeIndex> {
        self.lookup.get(label).copied()
    }

    /// Arcs leaving node `n`, in arc order
    pub fn outgoing(&self, n: NodeIndex) -> &[ArcIndex] {
        &self.outgoing[n]
    }

    /// Arcs entering node `n`, in arc order
    pub fn incoming(&self, n: NodeIndex) -> &[ArcIndex] {
        &self.incoming[n]
    }

    /// All nodes of the given class, in declaration order
    pub fn nodes_of(&self, class: NodeClass) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter_enumerated()
            .filter(move |(_, node)| node.class() == class)
            .map(|(n, _)| n)
    }

    /// Transit points and safe havens, in declaration order
    pub fn activatable(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter_enumerated()
            .filter(|(_, node)| node.is_activatable())
            .map(|(n, _)| n)
    }

    /// The arc connecting `from` to `to`, if they are connected
    pub fn arc_between(&self, from: NodeIndex, to: NodeIndex) -> Option<ArcIndex> {
        self.outgoing[from]
            .iter()
            .copied()
            .find(|a| self.arcs[*a].to == to)
    }

    /// The distance from `from` to `to`, if they are connected
    pub fn distance(&self, from: NodeIndex, to: NodeIndex) -> Option<Distance> {
        self.arc_between(from, to).map(|a| self.arcs[a].distance)
    }
}

/// A demand unit: `value` family-units of `household_size` persons leaving `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Family {
    pub id: FamilyId,
    pub household_size: u32,
    pub origin: NodeIndex,
    pub value: u32,
}

impl Family {
    /// The number of persons this family must evacuate
    pub fn persons(&self) -> u64 {
        self.household_size as u64 * self.value as u64
    }
}

/// Capacity and cost parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityParameters {
    /// Objective weight per unit of distance and person
    pub cost_per_km: Cost,
    /// Maximum person throughput at an origin
    pub alpha: f64,
    /// Maximum person throughput at an activated transit point
    pub beta: f64,
    /// Maximum person inflow at a safe haven
    pub gamma: f64,
    /// Activation cost per node. Zero for origins.
    pub activation_cost: TiVec<NodeIndex, Cost>,
    /// Net accumulation weight per node. Zero for anything but safe havens.
    pub pi: TiVec<NodeIndex, f64>,
}

/// A validated optimization problem: the network, the demand and the parameters.
#[derive(Debug, Clone)]
pub struct Problem {
    network: Network,
    families: TiVec<FamilyIndex, Family>,
    parameters: CapacityParameters,
}

impl Problem {
    pub fn new(doc: &InputDocument) -> Result<Problem, InvalidModelError> {
        let network = Network::new(&doc.origins, &doc.transits, &doc.havens, &doc.distances)?;
        let families = Self::read_families(doc, &network)?;
        let parameters = Self::read_parameters(doc, &network)?;

        info!(
            "validated problem with {} nodes, {} arcs and {} families",
            network.nodes().len(),
            network.arcs().len(),
            families.len()
        );

        Ok(Problem {
            network,
            families,
            parameters,
        })
    }

    pub fn from_json(json: &str) -> Result<Problem, InvalidModelError> {
        Problem::new(&InputDocument::from_json(json)?)
    }

    fn read_families(
        doc: &InputDocument,
        network: &Network,
    ) -> Result<TiVec<FamilyIndex, Family>, InvalidModelError> {
        // idf is keyed by the textual id; normalise the keys so "7" and 7 agree
        let mut records: HashMap<FamilyId, &FamilyRecord> = HashMap::new();
        for (key, record) in &doc.families {
            match Numeric::Text(key.clone()).count("idf key") {
                Ok(id) => {
                    records.insert(id, record);
                }
                Err(_) => warn!("ignoring idf entry with non-numeric key {}", key),
            }
        }

        let mut seen = HashSet::new();
        let mut families = TiVec::new();
        for raw in &doc.family_ids {
            let id = raw.count("idFamilias")?;
            if !seen.insert(id) {
                return Err(InvalidModelError::DuplicateFamily(id));
            }
            let record = records
                .get(&id)
                .ok_or(InvalidModelError::UnknownFamily(id))?;

            let origin =
                network
                    .index_of(&record.ns)
                    .ok_or_else(|| InvalidModelError::UnknownLabel {
                        label: record.ns.clone(),
                        context: format!("origin of family {}", id),
                    })?;
            if network.class(origin) != NodeClass::Origin {
                return Err(InvalidModelError::OriginNotInOriginSet {
                    family: id,
                    label: record.ns.clone(),
                });
            }

            families.push(Family {
                id,
                household_size: record.h.count(&format!("h of family {}", id))?,
                origin,
                value: record.valor.count(&format!("valor of family {}", id))?,
            });
        }

        if records.len() > families.len() {
            warn!(
                "{} idf entries are not listed in idFamilias and are ignored",
                records.len() - families.len()
            );
        }

        Ok(families)
    }

    fn read_parameters(
        doc: &InputDocument,
        network: &Network,
    ) -> Result<CapacityParameters, InvalidModelError> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(value)
            } else {
                Err(InvalidModelError::InvalidParameter {
                    name: name.to_string(),
                    value,
                })
            }
        };

        let n = network.nodes().len();
        let mut activation_cost: TiVec<NodeIndex, Cost> = vec![0.0; n].into();
        let mut pi: TiVec<NodeIndex, f64> = vec![0.0; n].into();

        for (label, &cost) in &doc.ac {
            let node = network
                .index_of(label)
                .ok_or_else(|| InvalidModelError::UnknownLabel {
                    label: label.clone(),
                    context: "ac".to_string(),
                })?;
            if !network.node(node).is_activatable() {
                warn!("ignoring activation cost of origin {}", label);
                continue;
            }
            activation_cost[node] = non_negative(&format!("ac[{}]", label), cost)?;
        }

        for (label, &weight) in &doc.pi {
            let node = network
                .index_of(label)
                .ok_or_else(|| InvalidModelError::UnknownLabel {
                    label: label.clone(),
                    context: "pi".to_string(),
                })?;
            if network.class(node) != NodeClass::SafeHaven {
                warn!("ignoring pi of {}, which is not a safe haven", label);
                continue;
            }
            pi[node] = non_negative(&format!("pi[{}]", label), weight)?;
        }

        Ok(CapacityParameters {
            cost_per_km: non_negative("costoPorKm", doc.cost_per_km)?,
            alpha: non_negative("alpha", doc.alpha)?,
            beta: non_negative("beta", doc.beta)?,
            gamma: non_negative("gamma", doc.gamma)?,
            activation_cost,
            pi,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn families(&self) -> &TiVec<FamilyIndex, Family> {
        &self.families
    }

    pub fn family(&self, f: FamilyIndex) -> &Family {
        &self.families[f]
    }

    pub fn parameters(&self) -> &CapacityParameters {
        &self.parameters
    }

    /// The number of persons that must be evacuated over all families
    pub fn expected_persons(&self) -> u64 {
        self.families.iter().map(Family::persons).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "etiquetasA": ["A1", "A2"],
            "etiquetasR": ["R1"],
            "etiquetasF": ["F1"],
            "distancias": {
                "A1": {"R1": 5.0, "F1": 0.0},
                "A2": {"F1": 12.5},
                "R1": {"F1": 5.0}
            },
            "idFamilias": [1, "2"],
            "idf": {
                "1": {"h": 4, "ns": "A1", "valor": 2},
                "2": {"h": "3", "ns": "A2", "valor": 1}
            },
            "costoPorKm": 1.5,
            "alpha": 100,
            "ac": {"R1": 10.0},
            "pi": {"F1": 50.0}
        })
    }

    fn problem(value: serde_json::Value) -> Result<Problem, InvalidModelError> {
        Problem::new(&InputDocument::from_value(value)?)
    }

    #[test]
    fn builds_sparse_arcs_in_declaration_order() {
        let problem = problem(document()).unwrap();
        let network = problem.network();

        let arcs: Vec<(&str, &str)> = network
            .arcs()
            .iter()
            .map(|a| (network.label(a.from), network.label(a.to)))
            .collect();
        // the zero distance A1 -> F1 is not a connection
        assert_eq!(arcs, vec![("A1", "R1"), ("A2", "F1"), ("R1", "F1")]);

        let r1 = network.index_of("R1").unwrap();
        assert_eq!(network.incoming(r1).len(), 1);
        assert_eq!(network.outgoing(r1).len(), 1);
        assert_eq!(network.distance(network.index_of("A2").unwrap(), network.index_of("F1").unwrap()), Some(12.5));
    }

    #[test]
    fn reads_families_and_defaults() {
        let problem = problem(document()).unwrap();
        let families = problem.families();

        assert_eq!(families.len(), 2);
        assert_eq!(families.raw[1].id, 2);
        assert_eq!(families.raw[1].household_size, 3);
        assert_eq!(problem.expected_persons(), 4 * 2 + 3);

        let parameters = problem.parameters();
        assert_eq!(parameters.beta, 0.0);
        assert_eq!(parameters.gamma, 0.0);
        let r1 = problem.network().index_of("R1").unwrap();
        let f1 = problem.network().index_of("F1").unwrap();
        assert_eq!(parameters.activation_cost[r1], 10.0);
        assert_eq!(parameters.activation_cost[f1], 0.0);
        assert_eq!(parameters.pi[f1], 50.0);
    }

    #[test]
    fn rejects_origin_outside_origin_set() {
        let mut doc = document();
        doc["idf"]["1"]["ns"] = json!("R1");
        assert_eq!(
            problem(doc).unwrap_err(),
            InvalidModelError::OriginNotInOriginSet {
                family: 1,
                label: "R1".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_labels() {
        let mut doc = document();
        doc["idf"]["2"]["ns"] = json!("Z9");
        assert!(matches!(
            problem(doc),
            Err(InvalidModelError::UnknownLabel { label, .. }) if label == "Z9"
        ));

        let mut doc = document();
        doc["distancias"]["A1"]["Q"] = json!(3.0);
        assert!(matches!(
            problem(doc),
            Err(InvalidModelError::UnknownLabel { label, .. }) if label == "Q"
        ));
    }

    #[test]
    fn rejects_overlapping_label_sets() {
        let mut doc = document();
        doc["etiquetasF"] = json!(["F1", "R1"]);
        assert_eq!(
            problem(doc).unwrap_err(),
            InvalidModelError::DuplicateLabel("R1".to_string())
        );
    }

    #[test]
    fn rejects_missing_keys_and_bad_numbers() {
        let mut doc = document();
        doc.as_object_mut().unwrap().remove("idf");
        assert!(matches!(problem(doc), Err(InvalidModelError::Malformed(_))));

        let mut doc = document();
        doc["idf"]["1"]["valor"] = json!(1.5);
        assert!(matches!(problem(doc), Err(InvalidModelError::InvalidNumber { .. })));

        let mut doc = document();
        doc["idFamilias"] = json!([1, 2, 1]);
        assert_eq!(problem(doc).unwrap_err(), InvalidModelError::DuplicateFamily(1));

        let mut doc = document();
        doc["idFamilias"] = json!([1, 2, 3]);
        assert_eq!(problem(doc).unwrap_err(), InvalidModelError::UnknownFamily(3));

        let mut doc = document();
        doc["distancias"]["A1"]["R1"] = json!(-1.0);
        assert!(matches!(problem(doc), Err(InvalidModelError::InvalidDistance { .. })));
    }

    #[test]
    fn reports_the_first_bad_distance_in_declaration_order() {
        let mut doc = document();
        doc["distancias"]["R1"]["F1"] = json!(-2.0);
        doc["distancias"]["A2"]["F1"] = json!(-3.0);
        doc["distancias"]["A1"]["F1"] = json!(-4.0);
        doc["distancias"]["A1"]["R1"] = json!(-1.0);

        for _ in 0..5 {
            assert_eq!(
                problem(doc.clone()).unwrap_err(),
                InvalidModelError::InvalidDistance {
                    from: "A1".to_string(),
                    to: "R1".to_string(),
                    distance: -1.0
                }
            );
        }

        let mut doc = document();
        doc["distancias"]["Z2"] = json!({"F1": 1.0});
        doc["distancias"]["Z1"] = json!({"F1": 1.0});
        assert!(matches!(
            problem(doc),
            Err(InvalidModelError::UnknownLabel { label, .. }) if label == "Z1"
        ));
    }

    #[test]
    fn ignores_weights_without_a_variable() {
        let mut doc = document();
        doc["ac"]["A1"] = json!(99.0);
        doc["pi"]["R1"] = json!(7.0);
        let problem = problem(doc).unwrap();
        let a1 = problem.network().index_of("A1").unwrap();
        let r1 = problem.network().index_of("R1").unwrap();
        assert_eq!(problem.parameters().activation_cost[a1], 0.0);
        assert_eq!(problem.parameters().pi[r1], 0.0);
    }
}
