//! Graph assembly: node ids, edges and the routing dispatch table.
//!
//! ```text
//! __start__ ─┬─► Market Analyst ◄─► tools_market   ─► Msg Clear Market ─┐
//!            ├─► News Analyst   ◄─► tools_news     ─► Msg Clear News   ─┤
//!            └─► ...                                                     ▼
//!                                                            Analyst Collector
//!                                                                    │
//!            Bull Researcher ◄──► Bear Researcher ─► Research Manager ─► Trader
//!                                                                         │
//!            Risky ─► Safe ─► Neutral ─► Risky ... ─► Risk Judge ◄────────┘ (via Risky)
//!                                                        │
//!                                          Portfolio Manager? ─► __end__
//! ```
//!
//! The graph is fixed at build time. Conditional edges carry a [`Router`] and the full list of
//! targets the router may pick; [`PipelineGraph::next`] refuses a route outside that list.

use crate::deliberation::capability::LoopState;
use crate::deliberation::config::validate_roles;
use crate::deliberation::debate::{
    route_investment_debate, route_risk_debate, InvestRoute, RiskRoute,
};
use crate::deliberation::error::PipelineError;
use crate::deliberation::roles::{AnalystRole, InvestSide, RiskDebater};
use crate::deliberation::state::PipelineState;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Every node the pipeline can visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Start,
    Analyst(AnalystRole),
    Tools(AnalystRole),
    Clear(AnalystRole),
    Collector,
    Researcher(InvestSide),
    ResearchManager,
    Trader,
    RiskDebater(RiskDebater),
    RiskJudge,
    PortfolioManager,
    End,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Start => f.write_str("__start__"),
            NodeId::Analyst(role) => f.write_str(role.display_name()),
            NodeId::Tools(role) => write!(f, "tools_{}", role.key()),
            NodeId::Clear(role) => write!(f, "Msg Clear {}", capitalized(role.key())),
            NodeId::Collector => f.write_str("Analyst Collector"),
            NodeId::Researcher(InvestSide::Bull) => f.write_str("Bull Researcher"),
            NodeId::Researcher(InvestSide::Bear) => f.write_str("Bear Researcher"),
            NodeId::ResearchManager => f.write_str("Research Manager"),
            NodeId::Trader => f.write_str("Trader"),
            NodeId::RiskDebater(debater) => f.write_str(debater.display_name()),
            NodeId::RiskJudge => f.write_str("Risk Judge"),
            NodeId::PortfolioManager => f.write_str("Portfolio Manager"),
            NodeId::End => f.write_str("__end__"),
        }
    }
}

fn capitalized(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Decision function attached to a conditional edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Router {
    /// Tool loop of one analyst, resolved through the dispatch table.
    Capability(AnalystRole),
    InvestDebate,
    RiskDebate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Direct {
        from: NodeId,
        to: NodeId,
    },
    Conditional {
        from: NodeId,
        router: Router,
        targets: Vec<NodeId>,
    },
}

impl Edge {
    pub fn from(&self) -> NodeId {
        match self {
            Edge::Direct { from, .. } | Edge::Conditional { from, .. } => *from,
        }
    }

    fn targets(&self) -> Vec<NodeId> {
        match self {
            Edge::Direct { to, .. } => vec![*to],
            Edge::Conditional { targets, .. } => targets.clone(),
        }
    }
}

/// Where one analyst's loop goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRoute {
    pub tools: NodeId,
    pub clear: NodeId,
}

impl CapabilityRoute {
    fn for_role(role: AnalystRole) -> Self {
        Self {
            tools: NodeId::Tools(role),
            clear: NodeId::Clear(role),
        }
    }

    pub fn route(&self, loop_state: LoopState) -> Option<NodeId> {
        match loop_state {
            LoopState::ExecutingTools => Some(self.tools),
            LoopState::Finalized => Some(self.clear),
            LoopState::Invoking => None,
        }
    }
}

/// Static routing parameters fixed when the graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebateRouting {
    pub max_debate_rounds: usize,
    pub max_risk_discuss_rounds: usize,
    pub portfolio_manager: bool,
}

impl Default for DebateRouting {
    fn default() -> Self {
        Self {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            portfolio_manager: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineGraph {
    roles: Vec<AnalystRole>,
    dispatch: BTreeMap<AnalystRole, CapabilityRoute>,
    edges: Vec<Edge>,
    routing: DebateRouting,
}

impl PipelineGraph {
    /// Assemble the graph for `roles`, in the order given.
    pub fn build(roles: &[AnalystRole], routing: DebateRouting) -> Result<Self, PipelineError> {
        validate_roles(roles)?;

        let dispatch: BTreeMap<AnalystRole, CapabilityRoute> = roles
            .iter()
            .map(|role| (*role, CapabilityRoute::for_role(*role)))
            .collect();

        let mut edges = Vec::new();
        for role in roles {
            edges.push(Edge::Direct {
                from: NodeId::Start,
                to: NodeId::Analyst(*role),
            });
        }
        for role in roles {
            let route = dispatch[role];
            edges.push(Edge::Conditional {
                from: NodeId::Analyst(*role),
                router: Router::Capability(*role),
                targets: vec![route.tools, route.clear],
            });
            edges.push(Edge::Direct {
                from: route.tools,
                to: NodeId::Analyst(*role),
            });
            edges.push(Edge::Direct {
                from: route.clear,
                to: NodeId::Collector,
            });
        }

        let bull = NodeId::Researcher(InvestSide::Bull);
        let bear = NodeId::Researcher(InvestSide::Bear);
        edges.push(Edge::Direct {
            from: NodeId::Collector,
            to: bull,
        });
        edges.push(Edge::Conditional {
            from: bull,
            router: Router::InvestDebate,
            targets: vec![bear, NodeId::ResearchManager],
        });
        edges.push(Edge::Conditional {
            from: bear,
            router: Router::InvestDebate,
            targets: vec![bull, NodeId::ResearchManager],
        });
        edges.push(Edge::Direct {
            from: NodeId::ResearchManager,
            to: NodeId::Trader,
        });
        edges.push(Edge::Direct {
            from: NodeId::Trader,
            to: NodeId::RiskDebater(RiskDebater::Risky),
        });
        for (i, debater) in RiskDebater::ROTATION.iter().enumerate() {
            let following = RiskDebater::ROTATION[(i + 1) % RiskDebater::ROTATION.len()];
            edges.push(Edge::Conditional {
                from: NodeId::RiskDebater(*debater),
                router: Router::RiskDebate,
                targets: vec![NodeId::RiskDebater(following), NodeId::RiskJudge],
            });
        }
        if routing.portfolio_manager {
            edges.push(Edge::Direct {
                from: NodeId::RiskJudge,
                to: NodeId::PortfolioManager,
            });
            edges.push(Edge::Direct {
                from: NodeId::PortfolioManager,
                to: NodeId::End,
            });
        } else {
            edges.push(Edge::Direct {
                from: NodeId::RiskJudge,
                to: NodeId::End,
            });
        }

        let graph = Self {
            roles: roles.to_vec(),
            dispatch,
            edges,
            routing,
        };
        graph.check_topology()?;
        log::debug!(
            "assembled graph: {} roles, {} edges",
            graph.roles.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    /// Same as [`build`](Self::build), from role names such as `"market"`.
    pub fn build_from_names(names: &[&str], routing: DebateRouting) -> Result<Self, PipelineError> {
        let roles = names
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<AnalystRole>, _>>()?;
        Self::build(&roles, routing)
    }

    pub fn roles(&self) -> &[AnalystRole] {
        &self.roles
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn routing(&self) -> DebateRouting {
        self.routing
    }

    /// Dispatch table entry for `role`, if the role was selected.
    pub fn capability_route(&self, role: AnalystRole) -> Option<&CapabilityRoute> {
        self.dispatch.get(&role)
    }

    /// Nodes started in parallel from `__start__`, in role order.
    pub fn fan_out_targets(&self) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|edge| edge.from() == NodeId::Start)
            .flat_map(Edge::targets)
            .collect()
    }

    /// Successor of `from` given the state after `from` ran.
    pub fn next(&self, from: &NodeId, state: &PipelineState) -> Result<NodeId, PipelineError> {
        if *from == NodeId::Start {
            return Err(PipelineError::ExecutionFailed(
                "__start__ fans out; it has no single successor".to_string(),
            ));
        }
        let edge = self
            .edges
            .iter()
            .find(|edge| edge.from() == *from)
            .ok_or_else(|| {
                PipelineError::ExecutionFailed(format!("no outgoing edge from {}", from))
            })?;

        match edge {
            Edge::Direct { to, .. } => Ok(*to),
            Edge::Conditional {
                router, targets, ..
            } => {
                let chosen = self.route(*router, state).ok_or_else(|| {
                    PipelineError::ExecutionFailed(format!("router for {} produced no route", from))
                })?;
                if !targets.contains(&chosen) {
                    return Err(PipelineError::ExecutionFailed(format!(
                        "router for {} picked {}, which is not a declared target",
                        from, chosen
                    )));
                }
                Ok(chosen)
            }
        }
    }

    fn route(&self, router: Router, state: &PipelineState) -> Option<NodeId> {
        match router {
            Router::Capability(role) => self
                .dispatch
                .get(&role)
                .and_then(|route| route.route(LoopState::after(state))),
            Router::InvestDebate => Some(
                match route_investment_debate(
                    &state.investment_debate_state,
                    self.routing.max_debate_rounds,
                ) {
                    InvestRoute::Speak(side) => NodeId::Researcher(side),
                    InvestRoute::Judge => NodeId::ResearchManager,
                },
            ),
            Router::RiskDebate => Some(
                match route_risk_debate(
                    &state.risk_debate_state,
                    self.routing.max_risk_discuss_rounds,
                ) {
                    RiskRoute::Speak(debater) => NodeId::RiskDebater(debater),
                    RiskRoute::Judge => NodeId::RiskJudge,
                },
            ),
        }
    }

    /// Loop edges are the way back into a tool loop and the debater-to-debater hops.
    fn is_loop_edge(from: NodeId, to: NodeId) -> bool {
        matches!(
            (from, to),
            (NodeId::Tools(_), NodeId::Analyst(_))
                | (NodeId::Researcher(_), NodeId::Researcher(_))
                | (NodeId::RiskDebater(_), NodeId::RiskDebater(_))
        )
    }

    /// Without its loop edges the graph must be acyclic and every node must reach `__end__`.
    fn check_topology(&self) -> Result<(), PipelineError> {
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        for edge in &self.edges {
            let from = edge.from();
            in_degree.entry(from).or_insert(0);
            for to in edge.targets() {
                in_degree.entry(to).or_insert(0);
                if Self::is_loop_edge(from, to) {
                    continue;
                }
                adjacency.entry(from).or_default().push(to);
                *in_degree.entry(to).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut visited = 0;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for to in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(to) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*to);
                    }
                }
            }
        }
        if visited != in_degree.len() {
            return Err(PipelineError::InvalidConfig(
                "graph has a cycle outside the tool and debate loops".to_string(),
            ));
        }

        let mut reachable = HashSet::new();
        let mut stack = vec![NodeId::Start];
        while let Some(node) = stack.pop() {
            if reachable.insert(node) {
                for edge in self.edges.iter().filter(|edge| edge.from() == node) {
                    stack.extend(edge.targets());
                }
            }
        }
        if !reachable.contains(&NodeId::End) {
            return Err(PipelineError::InvalidConfig(
                "__end__ is not reachable from __start__".to_string(),
            ));
        }
        Ok(())
    }
}
