//! Discrete decision network behind `/process_action`.
//!
//! Two independent parents feed one child:
//!
//! ```text
//! Action (off/on) ──┐
//!                   ├──> FireIntensity (low/high)
//! Weather (dry/humid)┘
//! ```
//!
//! A decision fixes `Action` by intervention and `Weather` is marginalized
//! out, so `P(high | do(Action = a)) = Σ_w P(w) · P(high | a, w)`.

use serde::Serialize;

use crate::error::ActionError;
use crate::types::{ActionCode, ProbabilityRequest};
use crate::world::is_cdn_decision_node;

/// Spread increments reported back to the mission, before clamping.
pub const LOW_SPREAD_INCREMENT: f32 = 0.4;
pub const HIGH_SPREAD_INCREMENT: f32 = 1.8;
pub const HIGH_INTENSITY_CUTOFF: f32 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProbabilityResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_increment: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_high: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_msg: Option<String>,
}

impl ProbabilityResponse {
    fn success(spread_increment: f32, prob_high: f32) -> Self {
        Self {
            status: "success".to_string(),
            spread_increment: Some(spread_increment),
            prob_high: Some(prob_high),
            cdn_msg: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Clone, Debug)]
pub struct SpreadModel {
    /// `P(Weather = dry)`; humid is the complement.
    pub p_dry: f32,
    /// `P(FireIntensity = high | Action, Weather)` indexed `[action][weather]`
    /// with weather 0 = dry, 1 = humid.
    pub p_high: [[f32; 2]; 2],
}

impl Default for SpreadModel {
    fn default() -> Self {
        Self {
            p_dry: 0.7,
            p_high: [[0.1, 0.5], [0.8, 0.9]],
        }
    }
}

impl SpreadModel {
    pub fn prob_high(&self, action_on: bool) -> f32 {
        let row = self.p_high[usize::from(action_on)];
        self.p_dry * row[0] + (1.0 - self.p_dry) * row[1]
    }

    /// Scan and control-line decisions skip the network with fixed answers;
    /// evacuation and suppression set `Action` to off and on.
    pub fn evaluate(&self, request: &ProbabilityRequest) -> Result<ProbabilityResponse, ActionError> {
        let action = ActionCode::from_code(i64::from(request.value))
            .ok_or(ActionError::InvalidAction(i64::from(request.value)))?;
        let action_on = match action {
            ActionCode::ControlLine => return Ok(ProbabilityResponse::success(0.02, 0.05)),
            ActionCode::Scan => return Ok(ProbabilityResponse::success(0.08, 0.15)),
            ActionCode::Evacuate => false,
            ActionCode::Suppress => true,
        };

        let prob_high = self.prob_high(action_on);
        let spread = if prob_high < HIGH_INTENSITY_CUTOFF {
            LOW_SPREAD_INCREMENT
        } else {
            HIGH_SPREAD_INCREMENT
        };
        let mut response = ProbabilityResponse::success(spread, prob_high);
        if is_cdn_decision_node(&request.node_id) {
            response.cdn_msg = Some(format!(
                "{} -> P(high intensity) {:.0}%",
                request.node_id,
                prob_high * 100.0
            ));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(node_id: &str, value: u8) -> ProbabilityRequest {
        ProbabilityRequest {
            node_id: node_id.to_string(),
            value,
            distance: Some(120.0),
        }
    }

    #[test]
    fn marginal_over_weather() {
        let model = SpreadModel::default();
        assert!((model.prob_high(false) - 0.22).abs() < 1e-6);
        assert!((model.prob_high(true) - 0.83).abs() < 1e-6);
    }

    #[test]
    fn suppression_reports_high_spread() {
        let response = SpreadModel::default()
            .evaluate(&request("Node_9", 1))
            .expect("valid value");
        assert!(response.is_success());
        assert_eq!(response.spread_increment, Some(HIGH_SPREAD_INCREMENT));
        assert!(response.cdn_msg.is_none());
    }

    #[test]
    fn evacuation_reports_low_spread_with_cdn_message() {
        let response = SpreadModel::default()
            .evaluate(&request("Fire Across Gap", 0))
            .expect("valid value");
        assert_eq!(response.spread_increment, Some(LOW_SPREAD_INCREMENT));
        assert_eq!(
            response.cdn_msg.as_deref(),
            Some("Fire Across Gap -> P(high intensity) 22%")
        );
    }

    #[test]
    fn scan_and_control_line_bypass_the_network() {
        let model = SpreadModel::default();
        let scan = model.evaluate(&request("INT-0", 2)).expect("scan");
        assert_eq!(scan.spread_increment, Some(0.08));
        assert_eq!(scan.prob_high, Some(0.15));
        let line = model.evaluate(&request("INT-0", 3)).expect("control line");
        assert_eq!(line.spread_increment, Some(0.02));
        assert_eq!(line.prob_high, Some(0.05));
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert_eq!(
            SpreadModel::default().evaluate(&request("INT-0", 9)),
            Err(ActionError::InvalidAction(9))
        );
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let json = serde_json::to_value(ProbabilityResponse {
            status: "error".to_string(),
            spread_increment: None,
            prob_high: None,
            cdn_msg: None,
        })
        .expect("serializable");
        assert_eq!(json, serde_json::json!({ "status": "error" }));
    }
}
