use crate::domain::money::Cents;
use crate::domain::session::SessionData;
use crate::error::{CheckoutError, Result};
use serde::{Deserialize, Serialize};

/// The customer's answer to an offer screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

/// A sandboxed boolean predicate over session data, evaluated by `Condition`
/// nodes. A closed structure with no access to the host environment; there is
/// deliberately no way to express arbitrary code here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Predicate {
    Always,
    TotalSpentAtLeast { cents: Cents },
    PurchasedProduct { product_id: String },
    AcceptedAnyUpsell,
    AllOf { terms: Vec<Predicate> },
    AnyOf { terms: Vec<Predicate> },
    Not { term: Box<Predicate> },
}

impl Predicate {
    pub fn evaluate(&self, data: &SessionData) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::TotalSpentAtLeast { cents } => data.total_spent >= *cents,
            Predicate::PurchasedProduct { product_id } => {
                data.products_purchased.iter().any(|p| p == product_id)
            }
            Predicate::AcceptedAnyUpsell => !data.upsells_accepted.is_empty(),
            Predicate::AllOf { terms } => terms.iter().all(|t| t.evaluate(data)),
            Predicate::AnyOf { terms } => terms.iter().any(|t| t.evaluate(data)),
            Predicate::Not { term } => !term.evaluate(data),
        }
    }
}

/// Node variants are a closed set; `resolve_next` matches exhaustively so an
/// unknown node type cannot slip through as an untyped string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum NodeKind {
    Trigger,
    Upsell,
    Downsell,
    Condition { predicate: Predicate },
    ThankYou,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub offer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelEdge {
    pub source: String,
    pub target: String,
    pub condition: Option<Decision>,
}

/// A directed graph of post-purchase offer screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: String,
    pub name: String,
    pub nodes: Vec<FunnelNode>,
    pub edges: Vec<FunnelEdge>,
}

/// Where traversal lands after a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Show this node next; callers advance the session to it.
    Next(String),
    /// The funnel is done; callers complete the session.
    Complete,
}

/// Condition chains are author data; the hop cap only guards against an
/// accidental condition-to-condition cycle hanging a request.
const MAX_CONDITION_HOPS: usize = 32;

impl Funnel {
    /// Structural validation: exactly one trigger, edges reference known nodes.
    pub fn validate(&self) -> Result<()> {
        let triggers = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Trigger))
            .count();
        if triggers != 1 {
            return Err(CheckoutError::Invalid(format!(
                "funnel {} must have exactly one trigger node, found {triggers}",
                self.id
            )));
        }
        for edge in &self.edges {
            if self.node(&edge.source).is_none() || self.node(&edge.target).is_none() {
                return Err(CheckoutError::Invalid(format!(
                    "funnel {} edge {} -> {} references an unknown node",
                    self.id, edge.source, edge.target
                )));
            }
        }
        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Option<&FunnelNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The single trigger node's id. Valid funnels always have one.
    pub fn entry_node(&self) -> Option<&FunnelNode> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Trigger))
    }

    /// Picks the outgoing edge for a decision: a matching-condition edge
    /// first, then an unconditioned edge, otherwise the funnel terminates.
    fn outgoing(&self, node_id: &str, decision: Decision) -> Option<&FunnelEdge> {
        let candidates: Vec<&FunnelEdge> =
            self.edges.iter().filter(|e| e.source == node_id).collect();
        candidates
            .iter()
            .find(|e| e.condition == Some(decision))
            .or_else(|| candidates.iter().find(|e| e.condition.is_none()))
            .copied()
    }

    /// Resolves the next node after `decision` at `current_node_id`.
    ///
    /// Pure with respect to the graph and session data: identical inputs
    /// always yield the identical resolution. `Condition` nodes are crossed
    /// by evaluating their predicate (true maps to `Accept`, false to
    /// `Decline`) and following the induced edge. Cycles between offer nodes
    /// are the funnel author's responsibility and are not detected here.
    pub fn resolve_next(
        &self,
        current_node_id: &str,
        decision: Decision,
        data: &SessionData,
    ) -> Result<Resolution> {
        let mut node_id = current_node_id.to_string();
        let mut decision = decision;

        for _ in 0..MAX_CONDITION_HOPS {
            let Some(edge) = self.outgoing(&node_id, decision) else {
                return Ok(Resolution::Complete);
            };
            let target = self.node(&edge.target).ok_or_else(|| {
                CheckoutError::NotFound("funnel node", edge.target.clone())
            })?;

            match &target.kind {
                NodeKind::ThankYou => return Ok(Resolution::Complete),
                NodeKind::Upsell | NodeKind::Downsell => {
                    return Ok(Resolution::Next(target.id.clone()));
                }
                NodeKind::Condition { predicate } => {
                    decision = if predicate.evaluate(data) {
                        Decision::Accept
                    } else {
                        Decision::Decline
                    };
                    node_id = target.id.clone();
                }
                // A trigger is an entry point, not a screen; landing on one
                // mid-traversal means the author wired an edge backwards.
                NodeKind::Trigger => {
                    return Err(CheckoutError::Invalid(format!(
                        "funnel {} routes back into trigger node {}",
                        self.id, target.id
                    )));
                }
            }
        }
        Err(CheckoutError::Invalid(format!(
            "funnel {} condition chain exceeded {MAX_CONDITION_HOPS} hops",
            self.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> FunnelNode {
        FunnelNode {
            id: id.into(),
            kind,
            offer_id: None,
        }
    }

    fn edge(source: &str, target: &str, condition: Option<Decision>) -> FunnelEdge {
        FunnelEdge {
            source: source.into(),
            target: target.into(),
            condition,
        }
    }

    /// trigger -> upsellA; (upsellA, decline) -> downsellB; (upsellA, accept) -> thankYou
    fn example_funnel() -> Funnel {
        Funnel {
            id: "fnl_1".into(),
            name: "post-purchase".into(),
            nodes: vec![
                node("trigger", NodeKind::Trigger),
                node("upsellA", NodeKind::Upsell),
                node("downsellB", NodeKind::Downsell),
                node("thankYou", NodeKind::ThankYou),
            ],
            edges: vec![
                edge("trigger", "upsellA", None),
                edge("upsellA", "downsellB", Some(Decision::Decline)),
                edge("upsellA", "thankYou", Some(Decision::Accept)),
            ],
        }
    }

    #[test]
    fn test_validate_requires_single_trigger() {
        let mut funnel = example_funnel();
        assert!(funnel.validate().is_ok());

        funnel.nodes.push(node("trigger2", NodeKind::Trigger));
        assert!(funnel.validate().is_err());

        funnel.nodes.retain(|n| !matches!(n.kind, NodeKind::Trigger));
        assert!(funnel.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_edges() {
        let mut funnel = example_funnel();
        funnel.edges.push(edge("upsellA", "nowhere", None));
        assert!(funnel.validate().is_err());
    }

    #[test]
    fn test_decline_routes_to_downsell() {
        let funnel = example_funnel();
        let resolution = funnel
            .resolve_next("upsellA", Decision::Decline, &SessionData::default())
            .unwrap();
        assert_eq!(resolution, Resolution::Next("downsellB".into()));
    }

    #[test]
    fn test_accept_routes_to_thank_you() {
        let funnel = example_funnel();
        let resolution = funnel
            .resolve_next("upsellA", Decision::Accept, &SessionData::default())
            .unwrap();
        assert_eq!(resolution, Resolution::Complete);
    }

    #[test]
    fn test_no_matching_edge_terminates() {
        let funnel = example_funnel();
        let resolution = funnel
            .resolve_next("downsellB", Decision::Accept, &SessionData::default())
            .unwrap();
        assert_eq!(resolution, Resolution::Complete);
    }

    #[test]
    fn test_unconditioned_edge_is_fallback() {
        let mut funnel = example_funnel();
        funnel.edges = vec![
            edge("trigger", "upsellA", None),
            edge("upsellA", "downsellB", None),
        ];
        // No accept-tagged edge, so the unconditioned one wins either way.
        for decision in [Decision::Accept, Decision::Decline] {
            let resolution = funnel
                .resolve_next("upsellA", decision, &SessionData::default())
                .unwrap();
            assert_eq!(resolution, Resolution::Next("downsellB".into()));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let funnel = example_funnel();
        let data = SessionData::default();
        let first = funnel.resolve_next("upsellA", Decision::Decline, &data).unwrap();
        let second = funnel.resolve_next("upsellA", Decision::Decline, &data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_condition_node_branches_on_session_data() {
        let mut funnel = example_funnel();
        funnel.nodes.push(node(
            "bigSpender",
            NodeKind::Condition {
                predicate: Predicate::TotalSpentAtLeast { cents: Cents(10_000) },
            },
        ));
        funnel.edges = vec![
            edge("trigger", "upsellA", None),
            edge("upsellA", "bigSpender", Some(Decision::Accept)),
            edge("bigSpender", "upsellA", Some(Decision::Decline)),
            edge("bigSpender", "downsellB", Some(Decision::Accept)),
        ];

        let mut data = SessionData::default();
        data.total_spent = Cents(20_000);
        let resolution = funnel.resolve_next("upsellA", Decision::Accept, &data).unwrap();
        assert_eq!(resolution, Resolution::Next("downsellB".into()));

        data.total_spent = Cents(500);
        let resolution = funnel.resolve_next("upsellA", Decision::Accept, &data).unwrap();
        assert_eq!(resolution, Resolution::Next("upsellA".into()));
    }

    #[test]
    fn test_condition_cycle_hits_hop_cap() {
        let funnel = Funnel {
            id: "fnl_loop".into(),
            name: "loop".into(),
            nodes: vec![
                node("trigger", NodeKind::Trigger),
                node(
                    "c1",
                    NodeKind::Condition {
                        predicate: Predicate::Always,
                    },
                ),
                node(
                    "c2",
                    NodeKind::Condition {
                        predicate: Predicate::Always,
                    },
                ),
            ],
            edges: vec![
                edge("trigger", "c1", None),
                edge("c1", "c2", Some(Decision::Accept)),
                edge("c2", "c1", Some(Decision::Accept)),
            ],
        };
        let err = funnel
            .resolve_next("trigger", Decision::Accept, &SessionData::default())
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Invalid(_)));
    }

    #[test]
    fn test_predicate_evaluation() {
        let mut data = SessionData::default();
        data.products_purchased.push("prod_1".into());
        data.upsells_accepted.push("offer_1".into());
        data.total_spent = Cents(4500);

        assert!(Predicate::Always.evaluate(&data));
        assert!(Predicate::PurchasedProduct {
            product_id: "prod_1".into()
        }
        .evaluate(&data));
        assert!(Predicate::AcceptedAnyUpsell.evaluate(&data));
        assert!(Predicate::AllOf {
            terms: vec![
                Predicate::TotalSpentAtLeast { cents: Cents(4000) },
                Predicate::Not {
                    term: Box::new(Predicate::PurchasedProduct {
                        product_id: "prod_2".into()
                    })
                },
            ]
        }
        .evaluate(&data));
    }
}
