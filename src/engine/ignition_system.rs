use super::*;

use crate::constants::PLACEMENT_ATTEMPTS;
use crate::types::{PlacementFallback, TurnBasedIgnition};
use crate::world::{clamp_to_map, fallback_position, in_bounds, sample_land_point, LandMask};

use super::utils::{polar_offset, wind_biased_angle};

impl MissionEngine {
    /// Mission-start seeds never give up; they land on the fallback point if
    /// no spot is found.
    pub(super) fn spawn_initial_fires(&mut self) {
        let reveal_flags = self.rules.initial_fires_revealed.clone();
        for revealed in reveal_flags {
            let position = self
                .pick_seed_position()
                .unwrap_or_else(|| fallback_position(self.width, self.height));
            self.push_fire(position, revealed, IgnitionKind::Seed);
        }
        self.push_timeline(format!(
            "THERMAL ALERT: {} ignition point(s) reported.",
            self.fires.len()
        ));
    }

    pub(super) fn arm_ignition_timers(&mut self) {
        let IgnitionPolicy::RealTime(policy) = &self.rules.ignition else {
            return;
        };
        let (min, max) = (policy.timer_min_ms, policy.timer_max_ms);
        let periodic_ms = policy.periodic_ms;
        let staggered: VecDeque<u64> = policy.staggered_seeds_ms.iter().copied().collect();

        self.timers = IgnitionTimers {
            next_timer_at_ms: Some(self.sim_time_ms + self.roll_delay_ms(min, max)),
            next_periodic_at_ms: Some(self.sim_time_ms + periodic_ms),
            staggered_seeds_at_ms: staggered,
        };
    }

    fn roll_delay_ms(&mut self, min: u64, max: u64) -> u64 {
        let lo = min.min(i32::MAX as u64) as i32;
        let hi = max.min(i32::MAX as u64) as i32;
        self.rng.int(lo, hi).max(0) as u64
    }

    pub(super) fn run_ignition_timers(&mut self) {
        let (min, max, periodic_ms, periodic_chance) = match &self.rules.ignition {
            IgnitionPolicy::RealTime(policy) => (
                policy.timer_min_ms,
                policy.timer_max_ms,
                policy.periodic_ms,
                policy.periodic_chance,
            ),
            IgnitionPolicy::TurnBased(_) => return,
        };
        let now = self.sim_time_ms;

        while self
            .timers
            .staggered_seeds_at_ms
            .front()
            .is_some_and(|at| now >= *at)
        {
            self.timers.staggered_seeds_at_ms.pop_front();
            self.attempt_ignition(true);
        }

        if self.timers.next_timer_at_ms.is_some_and(|at| now >= at) {
            self.attempt_ignition(false);
            self.timers.next_timer_at_ms = Some(now + self.roll_delay_ms(min, max));
        }

        if let Some(at) = self.timers.next_periodic_at_ms {
            if now >= at {
                if self.rng.bool(periodic_chance) {
                    self.attempt_ignition(false);
                }
                self.timers.next_periodic_at_ms = Some(at + periodic_ms.max(1));
            }
        }
    }

    pub(super) fn stop_ignition_timers(&mut self) {
        self.timers = IgnitionTimers::default();
    }

    /// One turn's worth of ignition after a resolved decision. Returns how many
    /// fires appeared.
    pub(super) fn run_turn_ignition(&mut self) -> usize {
        let IgnitionPolicy::TurnBased(policy) = &self.rules.ignition else {
            return 0;
        };
        let policy = policy.clone();

        let all_capped = !self.fires.is_empty() && self.fires.iter().all(Fire::is_capped);
        if all_capped {
            return 0;
        }

        let mut created = 0;
        if self.rng.bool(policy.new_fire_chance) && self.attempt_ignition(false).is_some() {
            created += 1;
        }
        created + self.spread_spot_fires(&policy)
    }

    /// Embers thrown downwind from every unmitigated fire still below its cap.
    pub(super) fn spread_spot_fires(&mut self, policy: &TurnBasedIgnition) -> usize {
        let origins: Vec<Vec2> = self
            .fires
            .iter()
            .filter(|fire| fire.is_threat() && !fire.is_capped())
            .map(|fire| fire.position)
            .collect();

        let mut landed = Vec::new();
        for origin in origins {
            if !self.rng.bool(policy.spot_chance) {
                continue;
            }
            let count = self.rng.int(policy.spot_count_min, policy.spot_count_max);
            for _ in 0..count {
                let angle = self.wind.angle
                    + self.rng.range(-policy.spot_variance, policy.spot_variance);
                let jump = self.rng.range(policy.spot_jump_min, policy.spot_jump_max);
                let candidate = polar_offset(origin, angle, jump);
                if in_bounds(self.width, self.height, candidate) && self.terrain.is_land(candidate)
                {
                    landed.push(candidate);
                }
            }
        }

        for position in &landed {
            self.push_fire(*position, false, IgnitionKind::Spot);
        }
        if !landed.is_empty() {
            self.push_timeline(format!(
                "WIND SPREAD: {} new hidden signatures detected.",
                landed.len()
            ));
        }
        landed.len()
    }

    /// Seed or branch ignition. New fires always start hidden. Returns the
    /// index of the new fire, or `None` when placement was abandoned.
    pub(super) fn attempt_ignition(&mut self, force_seed: bool) -> Option<usize> {
        let seed_chance = match &self.rules.ignition {
            IgnitionPolicy::TurnBased(policy) => policy.seed_weight,
            IgnitionPolicy::RealTime(policy) => policy.seed_chance,
        };
        let wants_seed = force_seed || self.rng.bool(seed_chance);
        let parent = if wants_seed {
            None
        } else {
            self.pick_branch_parent()
        };

        let (kind, position) = match parent {
            Some(parent_idx) => (IgnitionKind::Branch, self.pick_branch_position(parent_idx)),
            None => (IgnitionKind::Seed, self.pick_seed_position()),
        };
        let position = match (position, self.rules.placement_fallback) {
            (Some(position), _) => position,
            (None, PlacementFallback::FixedPoint(point)) => {
                clamp_to_map(self.width, self.height, point)
            }
            (None, PlacementFallback::Abandon) => {
                tracing::debug!(?kind, "ignition abandoned; no valid placement");
                return None;
            }
        };

        let idx = self.push_fire(position, false, kind);
        let label = match kind {
            IgnitionKind::Branch => "FIRE SPREAD: Sequential path expanding.",
            _ => "NEW IGNITION: Remote sector compromised.",
        };
        self.push_timeline(label);
        Some(idx)
    }

    fn pick_branch_parent(&mut self) -> Option<usize> {
        let rule = &self.rules.branch;
        let candidates: Vec<usize> = self
            .fires
            .iter()
            .enumerate()
            .filter(|(_, fire)| {
                rule.parent_min_radius.map_or(true, |min| fire.radius > min)
                    && (!rule.unmitigated_parent || fire.is_threat())
            })
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.pick_index(candidates.len())])
    }

    pub(super) fn pick_branch_position(&mut self, parent_idx: usize) -> Option<Vec2> {
        let parent = self.fires.get(parent_idx)?;
        let origin = parent.position;
        let parent_radius = parent.radius;
        let rule = self.rules.branch.clone();

        for _ in 0..PLACEMENT_ATTEMPTS {
            let angle = if rule.wind_biased {
                wind_biased_angle(&mut self.rng, self.wind.angle)
            } else {
                self.rng.angle()
            };
            let mut distance = rule.base_distance + self.rng.next_f32() * rule.jitter;
            if rule.add_parent_radius {
                distance += parent_radius;
            }
            let candidate = polar_offset(origin, angle, distance);
            if in_bounds(self.width, self.height, candidate) && self.terrain.is_land(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Random land point kept at least the seed spacing away from every fire.
    pub(super) fn pick_seed_position(&mut self) -> Option<Vec2> {
        let spacing = self.rules.seed_min_spacing;
        let fires = &self.fires;
        sample_land_point(
            &self.terrain,
            self.width,
            self.height,
            &mut self.rng,
            PLACEMENT_ATTEMPTS,
            |candidate| {
                spacing <= 0.0
                    || fires
                        .iter()
                        .all(|fire| fire.position.distance(candidate) >= spacing)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::{rule_set, TICK_MS, WIND_BIAS_SPREAD};
    use crate::engine::utils::angle_delta;
    use crate::engine::{Fire, MissionEngine, MissionOptions};
    use crate::types::{FireState, IgnitionKind, IgnitionPolicy, RuntimeEvent, Variant, Vec2};
    use crate::world::Terrain;

    fn engine(variant: Variant, seed: u32) -> MissionEngine {
        MissionEngine::new(
            variant,
            seed,
            MissionOptions {
                terrain: Some(Terrain::all_land(2_400.0, 1_600.0)),
                ..MissionOptions::default()
            },
        )
    }

    fn single_fire(engine: &mut MissionEngine, x: f32, y: f32, radius: f32) {
        engine.fires.clear();
        engine.priority_zones.clear();
        let max = engine.rules.fire_max_radius;
        engine
            .fires
            .push(Fire::new("fire_x".to_string(), Vec2 { x, y }, radius, max, true));
    }

    #[test]
    fn initial_fires_follow_variant_reveal_flags() {
        let only = engine(Variant::HumanOnly, 10);
        assert_eq!(only.fires.len(), 1);
        assert_eq!(only.fires[0].state, FireState::Hidden);
        assert!(only.clone().build_snapshot(false).fires.is_empty());

        let cdn = engine(Variant::HumanCdn, 10);
        assert_eq!(cdn.fires.len(), 2);
        assert_eq!(cdn.fires[0].state, FireState::Revealed);
        assert_eq!(cdn.fires[1].state, FireState::Hidden);
    }

    #[test]
    fn initial_seed_lands_on_fallback_when_map_is_water() {
        let terrain = Terrain::from_tiles(vec!["~".repeat(30); 20], 40.0);
        let engine = MissionEngine::new(
            Variant::HumanOnly,
            3,
            MissionOptions {
                terrain: Some(terrain),
                ..MissionOptions::default()
            },
        );
        assert_eq!(engine.fires.len(), 1);
        assert_eq!(engine.fires[0].position, Vec2 { x: 500.0, y: 500.0 });
    }

    #[test]
    fn real_time_timers_ignite_hidden_fires() {
        let mut engine = engine(Variant::HumanOnly, 31);
        engine.config.mission_duration_ms = u64::MAX;
        engine.priority_zones.clear();
        let initial = engine.fires.len();
        let ticks = 16_000 / TICK_MS;
        for _ in 0..ticks {
            engine.step(TICK_MS);
        }
        // two staggered seeds plus at least one timer ignition
        assert!(engine.fires.len() >= initial + 3, "{}", engine.fires.len());
        assert!(engine.fires[initial..]
            .iter()
            .all(|fire| fire.state == FireState::Hidden));
    }

    #[test]
    fn turn_policy_does_nothing_on_ticks() {
        let mut engine = engine(Variant::HumanCdn, 31);
        let initial = engine.fires.len();
        for _ in 0..2_000 {
            engine.step(TICK_MS);
        }
        assert_eq!(engine.fires.len(), initial);
    }

    #[test]
    fn turn_ignition_skips_when_every_fire_is_capped() {
        let mut engine = engine(Variant::HumanCdn, 12);
        for fire in &mut engine.fires {
            fire.radius = fire.max_radius;
        }
        let before = engine.fires.len();
        for _ in 0..50 {
            assert_eq!(engine.run_turn_ignition(), 0);
        }
        assert_eq!(engine.fires.len(), before);
    }

    #[test]
    fn spot_fires_land_downwind_within_jump_range() {
        let mut engine = engine(Variant::HumanCdn, 77);
        let IgnitionPolicy::TurnBased(policy) = rule_set(Variant::HumanCdn).ignition else {
            panic!("expected turn-based policy");
        };
        let origin = Vec2 {
            x: 1_200.0,
            y: 800.0,
        };
        let mut total = 0;
        for _ in 0..40 {
            single_fire(&mut engine, origin.x, origin.y, 40.0);
            let created = engine.spread_spot_fires(&policy);
            total += created;
            assert_eq!(engine.fires.len(), 1 + created);
            for fire in &engine.fires[1..] {
                let dx = fire.position.x - origin.x;
                let dy = fire.position.y - origin.y;
                let jump = (dx * dx + dy * dy).sqrt();
                assert!(jump >= 119.9 && jump <= 200.1, "jump {jump}");
                let delta = angle_delta(dy.atan2(dx), engine.wind.angle);
                assert!(delta.abs() <= policy.spot_variance + 1e-3, "delta {delta}");
                assert_eq!(fire.state, FireState::Hidden);
            }
        }
        assert!(total > 0);
    }

    #[test]
    fn mitigated_fires_throw_no_spot_fires() {
        let mut engine = engine(Variant::HumanCdn, 77);
        let IgnitionPolicy::TurnBased(policy) = rule_set(Variant::HumanCdn).ignition else {
            panic!("expected turn-based policy");
        };
        for _ in 0..20 {
            single_fire(&mut engine, 1_200.0, 800.0, 40.0);
            engine.fires[0].mitigate();
            assert_eq!(engine.spread_spot_fires(&policy), 0);
        }
    }

    #[test]
    fn branch_positions_lean_downwind_past_parent_edge() {
        let mut engine = engine(Variant::HumanOnly, 5);
        single_fire(&mut engine, 1_200.0, 800.0, 100.0);
        let samples = 500;
        let mut downwind = 0;
        for _ in 0..samples {
            let position = engine
                .pick_branch_position(0)
                .expect("open map accepts branches");
            let dx = position.x - 1_200.0;
            let dy = position.y - 800.0;
            let distance = (dx * dx + dy * dy).sqrt();
            assert!((149.9..=220.1).contains(&distance), "distance {distance}");
            if angle_delta(dy.atan2(dx), engine.wind.angle).abs() <= WIND_BIAS_SPREAD + 1e-3 {
                downwind += 1;
            }
        }
        assert!(downwind as f32 / samples as f32 > 0.7);
    }

    #[test]
    fn branch_parent_must_exceed_minimum_radius() {
        let mut only = engine(Variant::HumanOnly, 5);
        single_fire(&mut only, 1_200.0, 800.0, 5.0);
        assert_eq!(only.pick_branch_parent(), None);
        only.fires[0].radius = 5.5;
        assert_eq!(only.pick_branch_parent(), Some(0));

        let mut cdn = engine(Variant::HumanCdn, 5);
        single_fire(&mut cdn, 1_200.0, 800.0, 0.0);
        cdn.fires[0].mitigate();
        assert_eq!(cdn.pick_branch_parent(), Some(0));
    }

    #[test]
    fn seeds_respect_minimum_spacing() {
        let mut engine = engine(Variant::HumanOnly, 8);
        for _ in 0..6 {
            engine.attempt_ignition(true);
        }
        for (idx, a) in engine.fires.iter().enumerate() {
            for b in engine.fires.iter().skip(idx + 1) {
                assert!(a.position.distance(b.position) >= 350.0);
            }
        }
    }

    #[test]
    fn real_time_placement_is_abandoned_on_water() {
        let mut engine = engine(Variant::HumanOnly, 8);
        engine.terrain = Terrain::from_tiles(vec!["~".repeat(60); 40], 40.0);
        let before = engine.fires.len();
        assert!(engine.attempt_ignition(true).is_none());
        assert!(engine.attempt_ignition(false).is_none());
        assert_eq!(engine.fires.len(), before);
    }

    #[test]
    fn turn_based_placement_falls_back_to_fixed_point() {
        let mut engine = engine(Variant::HumanCdn, 8);
        engine.terrain = Terrain::from_tiles(vec!["~".repeat(60); 40], 40.0);
        let idx = engine.attempt_ignition(true).expect("fallback placement");
        assert_eq!(engine.fires[idx].position, Vec2 { x: 500.0, y: 500.0 });
        let events = engine.build_snapshot(true).events;
        assert!(events.iter().any(|event| matches!(
            event,
            RuntimeEvent::FireIgnited {
                kind: IgnitionKind::Seed,
                ..
            }
        )));
    }
}
