use crate::types::{ActionCode, FireState, FireView, NodeType, NodeView, Snapshot};

#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub node_id: String,
    pub action: ActionCode,
}

/// Scripted commander that only looks at what a player would see: suppress
/// the largest visible fire from the closest usable node, otherwise sweep
/// the map with scans.
#[derive(Clone, Debug, Default)]
pub struct Autopilot {
    scan_cursor: usize,
}

impl Autopilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide(&mut self, snapshot: &Snapshot) -> Option<Decision> {
        let usable: Vec<&NodeView> = snapshot
            .nodes
            .iter()
            .filter(|node| !node.compromised)
            .collect();
        if usable.is_empty() {
            return None;
        }

        if let Some(target) = largest_visible_threat(snapshot) {
            let node = usable
                .iter()
                .filter(|node| node.node_type != NodeType::Investigation)
                .min_by(|a, b| distance(a, target).total_cmp(&distance(b, target)))
                .or_else(|| {
                    usable
                        .iter()
                        .min_by(|a, b| distance(a, target).total_cmp(&distance(b, target)))
                })?;
            let action = if node.node_type == NodeType::Investigation {
                ActionCode::ControlLine
            } else {
                ActionCode::Suppress
            };
            return Some(Decision {
                node_id: node.id.clone(),
                action,
            });
        }

        let scanners: Vec<&&NodeView> = usable
            .iter()
            .filter(|node| node.node_type != NodeType::Action)
            .collect();
        if scanners.is_empty() {
            return None;
        }
        let node = scanners[self.scan_cursor % scanners.len()];
        self.scan_cursor = self.scan_cursor.wrapping_add(scanners.len() / 3 + 1);
        Some(Decision {
            node_id: node.id.clone(),
            action: ActionCode::Scan,
        })
    }
}

fn largest_visible_threat(snapshot: &Snapshot) -> Option<&FireView> {
    snapshot
        .fires
        .iter()
        .filter(|fire| fire.state == FireState::Revealed && fire.radius > 0.0)
        .max_by(|a, b| a.radius.total_cmp(&b.radius))
}

fn distance(node: &NodeView, fire: &FireView) -> f32 {
    ((node.x - fire.x).powi(2) + (node.y - fire.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MissionState;

    fn node(id: &str, x: f32, node_type: NodeType, compromised: bool) -> NodeView {
        NodeView {
            id: id.to_string(),
            x,
            y: 0.0,
            node_type,
            is_asset: false,
            compromised,
            selected: false,
        }
    }

    fn fire(x: f32, radius: f32, state: FireState) -> FireView {
        FireView {
            id: format!("fire_{x}"),
            x,
            y: 0.0,
            radius,
            max_radius: 600.0,
            state,
        }
    }

    fn snapshot(nodes: Vec<NodeView>, fires: Vec<FireView>) -> Snapshot {
        Snapshot {
            tick: 1,
            elapsed_ms: 0,
            time_left_ms: 120_000,
            visible_coverage_percent: 0.0,
            active_threats: 0,
            spread_multiplier: 0.1,
            fires,
            nodes,
            evacuations: Vec::new(),
            priority_zones: Vec::new(),
            wind: None,
            mission: MissionState::Active,
            events: Vec::new(),
            timeline: Vec::new(),
        }
    }

    #[test]
    fn suppresses_largest_revealed_fire_from_nearest_node() {
        let mut pilot = Autopilot::new();
        let view = snapshot(
            vec![
                node("a", 0.0, NodeType::Generic, false),
                node("b", 900.0, NodeType::Generic, false),
                node("c", 1_000.0, NodeType::Generic, true),
            ],
            vec![
                fire(100.0, 20.0, FireState::Revealed),
                fire(1_000.0, 80.0, FireState::Revealed),
                fire(500.0, 0.0, FireState::Mitigated),
            ],
        );
        assert_eq!(
            pilot.decide(&view),
            Some(Decision {
                node_id: "b".to_string(),
                action: ActionCode::Suppress,
            })
        );
    }

    #[test]
    fn investigation_only_board_draws_control_line() {
        let mut pilot = Autopilot::new();
        let view = snapshot(
            vec![node("INT-0", 0.0, NodeType::Investigation, false)],
            vec![fire(100.0, 20.0, FireState::Revealed)],
        );
        assert_eq!(
            pilot.decide(&view).map(|decision| decision.action),
            Some(ActionCode::ControlLine)
        );
    }

    #[test]
    fn sweeps_with_scans_when_nothing_is_visible() {
        let mut pilot = Autopilot::new();
        let view = snapshot(
            vec![
                node("INT-0", 0.0, NodeType::Investigation, false),
                node("ACT-1", 10.0, NodeType::Action, false),
                node("INT-2", 20.0, NodeType::Investigation, false),
            ],
            vec![],
        );
        let first = pilot.decide(&view).expect("decision");
        let second = pilot.decide(&view).expect("decision");
        assert_eq!(first.action, ActionCode::Scan);
        assert_ne!(first.node_id, "ACT-1");
        assert_ne!(first.node_id, second.node_id);
    }

    #[test]
    fn no_usable_nodes_means_no_decision() {
        let mut pilot = Autopilot::new();
        let view = snapshot(vec![node("a", 0.0, NodeType::Generic, true)], vec![]);
        assert!(pilot.decide(&view).is_none());
    }
}
