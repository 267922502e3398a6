use super::*;

use crate::constants::{EMERGENCY_MENU_RANGE, LOW_RISK_PROB_HIGH, LOW_RISK_SHRINK, SCAN_MENU_RANGE};
use crate::types::{ActionChoice, ActionCode, ActionMenu, ActionOutcome, ProbabilityRequest};
use crate::world::{cdn_action_label, is_cdn_decision_node};

impl MissionEngine {
    fn ensure_active(&self) -> Result<(), ActionError> {
        if self.is_ended() {
            return Err(ActionError::MissionEnded);
        }
        Ok(())
    }

    fn ensure_reachable(&self, node_id: &str) -> Result<usize, ActionError> {
        self.ensure_active()?;
        let idx = self.node_index(node_id)?;
        if self.nodes[idx].view.compromised {
            return Err(ActionError::NodeCompromised(node_id.to_string()));
        }
        Ok(idx)
    }

    /// Selects the node and lists the decisions it offers.
    pub fn open_action_menu(&mut self, node_id: &str) -> Result<ActionMenu, ActionError> {
        let idx = self.ensure_reachable(node_id)?;
        for (other, node) in self.nodes.iter_mut().enumerate() {
            node.view.selected = other == idx;
        }
        let distance = self.nearest_fire_distance(self.nodes[idx].position);
        let choices = self.menu_choices(idx, distance);
        self.push_timeline(format!("NODE SELECTED: {node_id}"));
        Ok(ActionMenu {
            node_id: node_id.to_string(),
            nearest_fire_distance: distance,
            choices,
        })
    }

    fn menu_choices(&self, idx: usize, distance: Option<f32>) -> Vec<ActionChoice> {
        let node = &self.nodes[idx].view;
        let choice = |action: ActionCode, label: &str| ActionChoice {
            value: action.code(),
            action,
            label: label.to_string(),
        };
        match node.node_type {
            NodeType::Action => vec![
                choice(ActionCode::Suppress, "Suppression"),
                choice(ActionCode::Evacuate, "Evacuation"),
            ],
            NodeType::Investigation => vec![
                choice(ActionCode::Scan, "Investigate Scan"),
                choice(ActionCode::ControlLine, "Control Line"),
            ],
            NodeType::Generic => {
                let distance = distance.unwrap_or(f32::INFINITY);
                if distance < EMERGENCY_MENU_RANGE {
                    vec![choice(ActionCode::Suppress, "EMERGENCY SUPPRESSION")]
                } else if distance > SCAN_MENU_RANGE {
                    vec![
                        choice(ActionCode::Scan, "Investigate Area (Scan)"),
                        choice(ActionCode::ControlLine, "Control Line (Preventative)"),
                    ]
                } else if is_cdn_decision_node(&node.id) {
                    [ActionCode::Suppress, ActionCode::Evacuate]
                        .into_iter()
                        .map(|action| {
                            choice(action, cdn_action_label(&node.id, action).unwrap_or(action.label()))
                        })
                        .collect()
                } else {
                    vec![
                        choice(ActionCode::Suppress, "Direct Suppression"),
                        choice(ActionCode::Evacuate, "Evacuate"),
                    ]
                }
            }
        }
    }

    /// Resolves one decision against the node's position and advances the
    /// mission clock. The caller forwards `probability_request` to the
    /// probability service and hands the answer to `apply_probability_feedback`,
    /// which closes the turn; a turn left open is closed by the next decision.
    pub fn handle_action(
        &mut self,
        node_id: &str,
        action: ActionCode,
        distance: Option<f32>,
    ) -> Result<ActionOutcome, ActionError> {
        self.finish_turn();
        let idx = self.ensure_reachable(node_id)?;
        let target = self.nodes[idx].position;
        self.actions_taken = self.actions_taken.saturating_add(1);
        for node in &mut self.nodes {
            node.view.selected = false;
        }

        self.push_timeline(format!("DECISION FIRED: [{}] on {node_id}", action.label()));
        if let Some(label) = cdn_action_label(node_id, action) {
            self.push_timeline(format!("CDN UPDATE: {node_id} - STATUS: {label}"));
        }

        let mut outcome = ActionOutcome {
            action,
            fire_hits: 0,
            fires_revealed: 0,
            zones_revealed: 0,
            clock_advance_ms: 0,
            probability_request: ProbabilityRequest {
                node_id: node_id.to_string(),
                value: action.code(),
                distance,
            },
        };

        let penalty_ms = match action {
            ActionCode::Evacuate => {
                self.resolve_evacuation(node_id, target);
                0
            }
            ActionCode::Suppress | ActionCode::ControlLine => {
                let (hits, cost_ms) = self.resolve_suppression(node_id, target);
                outcome.fire_hits = hits;
                cost_ms
            }
            ActionCode::Scan => {
                let (fires, zones) = self.resolve_scan(target);
                outcome.fires_revealed = fires;
                outcome.zones_revealed = zones;
                0
            }
        };

        outcome.clock_advance_ms = self.config.time_per_action_ms + penalty_ms;
        self.elapsed_ms = self.elapsed_ms.saturating_add(outcome.clock_advance_ms);
        self.turn_pending = true;
        self.refresh_derived_state();

        tracing::debug!(
            node_id,
            action = action.label(),
            hits = outcome.fire_hits,
            clock_advance_ms = outcome.clock_advance_ms,
            "decision resolved"
        );
        Ok(outcome)
    }

    fn resolve_evacuation(&mut self, node_id: &str, target: Vec2) {
        let radius = self.config.evacuation_radius;
        self.evacuations.push(EvacuationZone {
            position: target,
            radius,
        });
        self.events.push(RuntimeEvent::EvacuationCreated {
            x: target.x,
            y: target.y,
            radius,
        });
        self.push_timeline(format!("EVACUATION: Safe zone established at {node_id}."));
    }

    /// Returns the number of fires hit and the clock penalty, which is the
    /// largest single-fire cost.
    fn resolve_suppression(&mut self, node_id: &str, target: Vec2) -> (usize, u64) {
        let radius = self.rules.suppression_radius;
        let mut hits = 0;
        let mut cost_ms = 0;
        for fire in &mut self.fires {
            if fire.is_mitigated() || fire.position.distance(target) >= radius {
                continue;
            }
            cost_ms = cost_ms.max(fire.suppression_cost_ms());
            fire.reveal();
            fire.mitigate();
            hits += 1;
        }

        self.events.push(RuntimeEvent::SuppressionApplied {
            node_id: node_id.to_string(),
            fires: hits,
            cost_ms,
        });
        if hits > 0 {
            self.push_timeline(format!(
                "SUPPRESSION: {hits} points neutralized. TIME COST: +{}s",
                cost_ms / 1_000
            ));
        } else {
            self.push_timeline("SUPPRESSION FAILED: No active ignitions in range.");
        }
        (hits, cost_ms)
    }

    fn resolve_scan(&mut self, target: Vec2) -> (usize, usize) {
        let radius = self.rules.scan_radius;
        let mut fires_found = 0;
        for fire in &mut self.fires {
            if fire.position.distance(target) < radius && fire.reveal() {
                fires_found += 1;
            }
        }
        let mut zones_found = 0;
        for zone in &mut self.priority_zones {
            if !zone.revealed && zone.position.distance(target) < radius {
                zone.revealed = true;
                zones_found += 1;
            }
        }
        self.wind.revealed = true;

        self.events.push(RuntimeEvent::ScanCompleted {
            x: target.x,
            y: target.y,
            radius,
            fires_found,
            zones_found,
        });
        if zones_found > 0 {
            self.push_timeline(format!(
                "INTEL ACQUIRED: {zones_found} Priority Assets identified."
            ));
        }
        if fires_found > 0 {
            self.push_timeline(format!(
                "SCAN REPORT: {fires_found} hidden thermal signatures revealed."
            ));
        } else {
            self.push_timeline("SCAN REPORT: No active fires detected in this sector.");
        }
        self.push_timeline(format!(
            "METEOROLOGY: Wind {} at {} mph.",
            wind_direction_name(self.wind.angle),
            self.wind.speed_mph
        ));
        (fires_found, zones_found)
    }

    /// A low high-spread probability knocks every unmitigated fire back.
    /// Runs the ignition turn owed by the last decision. Returns the number of
    /// fires it started.
    pub fn finish_turn(&mut self) -> usize {
        if !std::mem::take(&mut self.turn_pending) || self.is_ended() {
            return 0;
        }
        let created = self.run_turn_ignition();
        self.refresh_derived_state();
        created
    }

    pub(super) fn apply_low_risk_shrink(&mut self, prob_high: Option<f32>) {
        let Some(prob_high) = prob_high.filter(|p| p.is_finite()) else {
            return;
        };
        if prob_high >= LOW_RISK_PROB_HIGH {
            return;
        }
        let mut shrunk = 0;
        for fire in self.fires.iter_mut().filter(|fire| fire.is_threat()) {
            fire.radius *= LOW_RISK_SHRINK;
            shrunk += 1;
        }
        if shrunk > 0 {
            self.push_timeline(format!(
                "CDN EFFECT: Low risk assessment shrank {shrunk} active fires."
            ));
        }
    }
}
