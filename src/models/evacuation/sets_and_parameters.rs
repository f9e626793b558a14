use log::trace;
use typed_index_collections::TiVec;

use crate::problem::{ArcIndex, FamilyId, FamilyIndex, NodeClass, NodeIndex, Problem};

/// sets for the evacuation model
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of origin nodes
    pub A: Vec<NodeIndex>,
    /// Set of transit nodes
    pub R: Vec<NodeIndex>,
    /// Set of safe havens
    pub F: Vec<NodeIndex>,
    /// Nodes carrying an activation decision, R followed by F
    pub RF: Vec<NodeIndex>,
    /// Set of families
    pub K: Vec<FamilyIndex>,
    /// Set of connected arcs
    pub E: Vec<ArcIndex>,
    /// Arcs leaving each node
    pub E_out: TiVec<NodeIndex, Vec<ArcIndex>>,
    /// Arcs entering each node
    pub E_in: TiVec<NodeIndex, Vec<ArcIndex>>,
    /// First hop arcs, A -> R ∪ F
    pub E_first: Vec<ArcIndex>,
    /// Reverse of the first hop, R ∪ F -> A
    pub E_first_back: Vec<ArcIndex>,
    /// Arrival arcs, A ∪ R -> F
    pub E_arrival: Vec<ArcIndex>,
    /// Reverse of the arrival, F -> A ∪ R
    pub E_arrival_back: Vec<ArcIndex>,
}

/// parameters for the evacuation model
#[allow(non_snake_case)]
#[derive(Debug)]
pub struct Parameters {
    /// cost per km and person
    pub c: f64,
    /// distance of arc e
    pub d: TiVec<ArcIndex, f64>,
    /// tail of arc e
    pub tail: TiVec<ArcIndex, NodeIndex>,
    /// head of arc e
    pub head: TiVec<ArcIndex, NodeIndex>,
    /// household size of family k
    pub h: TiVec<FamilyIndex, f64>,
    /// family-units of family k that must leave its origin
    pub Q: TiVec<FamilyIndex, f64>,
    /// origin node of family k
    pub O: TiVec<FamilyIndex, NodeIndex>,
    /// person capacity of an origin
    pub alpha: f64,
    /// person capacity of an activated transit node
    pub beta: f64,
    /// person capacity of a safe haven
    pub gamma: f64,
    /// activation cost of node n
    pub Ac: TiVec<NodeIndex, f64>,
    /// bound on net accumulation at an activated safe haven
    pub pi: TiVec<NodeIndex, f64>,
    /// label of node n, used for naming
    pub label: TiVec<NodeIndex, String>,
    /// external id of family k, used for naming
    pub id: TiVec<FamilyIndex, FamilyId>,
}

#[allow(non_snake_case)]
impl Sets {
    pub fn new(problem: &Problem) -> Sets {
        let network = problem.network();
        let class = |n: NodeIndex| network.class(n);

        let A: Vec<NodeIndex> = network.nodes_of(NodeClass::Origin).collect();
        let R: Vec<NodeIndex> = network.nodes_of(NodeClass::Transit).collect();
        let F: Vec<NodeIndex> = network.nodes_of(NodeClass::SafeHaven).collect();
        let RF = R.iter().chain(F.iter()).copied().collect();

        let E: Vec<ArcIndex> = network.arcs().keys().collect();
        let E_out = network
            .nodes()
            .keys()
            .map(|n| network.outgoing(n).to_vec())
            .collect::<Vec<_>>()
            .into();
        let E_in = network
            .nodes()
            .keys()
            .map(|n| network.incoming(n).to_vec())
            .collect::<Vec<_>>()
            .into();

        let select = |from: &[NodeClass], to: &[NodeClass]| -> Vec<ArcIndex> {
            E.iter()
                .copied()
                .filter(|e| {
                    let arc = network.arc(*e);
                    from.contains(&class(arc.from)) && to.contains(&class(arc.to))
                })
                .collect()
        };

        use NodeClass::*;
        let E_first = select(&[Origin], &[Transit, SafeHaven]);
        let E_first_back = select(&[Transit, SafeHaven], &[Origin]);
        let E_arrival = select(&[Origin, Transit], &[SafeHaven]);
        let E_arrival_back = select(&[SafeHaven], &[Origin, Transit]);

        trace!(
            "first hop arcs: {:?}, arrival arcs: {:?}",
            E_first,
            E_arrival
        );

        Sets {
            A,
            R,
            F,
            RF,
            K: problem.families().keys().collect(),
            E,
            E_out,
            E_in,
            E_first,
            E_first_back,
            E_arrival,
            E_arrival_back,
        }
    }
}

#[allow(non_snake_case)]
impl Parameters {
    pub fn new(problem: &Problem) -> Parameters {
        let network = problem.network();
        let families = problem.families();
        let capacity = problem.parameters();

        let arc_map = |f: &dyn Fn(ArcIndex) -> NodeIndex| -> TiVec<ArcIndex, NodeIndex> {
            network.arcs().keys().map(f).collect::<Vec<_>>().into()
        };

        Parameters {
            c: capacity.cost_per_km,
            d: network
                .arcs()
                .iter()
                .map(|a| a.distance)
                .collect::<Vec<_>>()
                .into(),
            tail: arc_map(&|e| network.arc(e).from),
            head: arc_map(&|e| network.arc(e).to),
            h: families
                .iter()
                .map(|f| f.household_size as f64)
                .collect::<Vec<_>>()
                .into(),
            Q: families
                .iter()
                .map(|f| f.value as f64)
                .collect::<Vec<_>>()
                .into(),
            O: families
                .iter()
                .map(|f| f.origin)
                .collect::<Vec<_>>()
                .into(),
            alpha: capacity.alpha,
            beta: capacity.beta,
            gamma: capacity.gamma,
            Ac: capacity.activation_cost.clone(),
            pi: capacity.pi.clone(),
            label: network
                .nodes()
                .iter()
                .map(|n| n.label().to_string())
                .collect::<Vec<_>>()
                .into(),
            id: families
                .iter()
                .map(|f| f.id)
                .collect::<Vec<_>>()
                .into(),
        }
    }
}
