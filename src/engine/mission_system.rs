use super::*;

use crate::constants::ALL_CLEAR_GRACE_MS;
use crate::types::CollisionPolicy;

impl MissionEngine {
    /// Fraction of the map covered by every fire, hidden ones included.
    pub fn coverage(&self) -> f32 {
        self.coverage_of(|_| true)
    }

    /// Fraction of the map covered by fires the player has seen.
    pub fn visible_coverage(&self) -> f32 {
        self.coverage_of(Fire::is_revealed)
    }

    pub fn visible_coverage_percent(&self) -> f32 {
        (self.visible_coverage() * 100.0).min(100.0)
    }

    fn coverage_of(&self, include: impl Fn(&Fire) -> bool) -> f32 {
        let map_area = self.width * self.height;
        if map_area <= 0.0 {
            return 0.0;
        }
        let burned: f32 = self
            .fires
            .iter()
            .filter(|fire| include(fire))
            .map(Fire::area)
            .sum();
        burned / map_area
    }

    pub fn active_threats(&self) -> usize {
        self.fires.iter().filter(|fire| fire.is_threat()).count()
    }

    pub(super) fn refresh_derived_state(&mut self) {
        let fires = &self.fires;
        for node in &mut self.nodes {
            node.view.compromised = fires
                .iter()
                .any(|fire| fire.is_active() && fire.covers(node.position));
        }
    }

    /// Whether any burning fire reaches an asset of the given radius under the
    /// configured collision policy.
    pub(super) fn asset_hit(&self, position: Vec2, asset_radius: f32) -> bool {
        let policy = self.rules.collision;
        self.fires.iter().filter(|fire| fire.is_active()).any(|fire| {
            let distance = fire.position.distance(position);
            match policy {
                CollisionPolicy::CenterInCircle => distance < fire.radius,
                CollisionPolicy::MarginOverlap { margin } => {
                    distance < fire.radius + asset_radius + margin
                }
            }
        })
    }

    fn any_asset_lost(&self) -> bool {
        match self.rules.asset_source {
            AssetSource::PriorityZones => self
                .priority_zones
                .iter()
                .any(|zone| self.asset_hit(zone.position, zone.radius)),
            AssetSource::AssetNodes { .. } => self
                .nodes
                .iter()
                .filter(|node| node.view.is_asset)
                .any(|node| self.asset_hit(node.position, 0.0)),
        }
    }

    /// Terminal guards in fixed priority order.
    pub(super) fn evaluate_mission_state(&self) -> MissionState {
        if self.elapsed_ms >= self.config.mission_duration_ms {
            return MissionState::TimedOut;
        }
        if self.coverage() >= self.config.coverage_threshold {
            return MissionState::CoverageExceeded;
        }
        if self.any_asset_lost() {
            return MissionState::AssetLost;
        }
        if self.elapsed_ms > ALL_CLEAR_GRACE_MS && !self.fires.is_empty() && self.active_threats() == 0
        {
            return MissionState::AllClear;
        }
        MissionState::Active
    }

    pub(super) fn check_mission_end(&mut self) {
        if self.is_ended() {
            return;
        }
        let next = self.evaluate_mission_state();
        if next.is_terminal() {
            self.end_mission(next);
        }
    }

    fn end_mission(&mut self, state: MissionState) {
        self.state = state;
        self.stop_ignition_timers();
        for node in &mut self.nodes {
            node.view.selected = false;
        }
        let reason = state.reason().to_string();
        self.events.push(RuntimeEvent::MissionEnded {
            state,
            success: state.is_success(),
            reason: reason.clone(),
        });
        self.push_timeline(format!("SIMULATION TERMINATED: {reason}"));
        tracing::info!(
            state = state.key(),
            success = state.is_success(),
            elapsed_ms = self.elapsed_ms,
            ticks = self.tick_counter,
            coverage = self.coverage(),
            "mission ended"
        );
    }
}
