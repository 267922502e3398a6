use std::collections::VecDeque;

use crate::constants::{
    rule_set, COVERAGE_THRESHOLD, DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH, EVACUATION_RADIUS,
    EVACUATION_THREAT_MARGIN, INITIAL_SPREAD_MULTIPLIER, MISSION_DURATION_MS, PRIORITY_ZONE_RADIUS,
    SYNERGY_RANGE, TICK_RATE, TIMELINE_SNAPSHOT_LEN, TIME_PER_ACTION_MS, WIND_MAGNITUDE,
    WIND_SPEED_MAX_MPH, WIND_SPEED_MIN_MPH,
};
use crate::error::{ActionError, UplinkError};
use crate::probability::ProbabilityResponse;
use crate::rng::Rng;
use crate::types::{
    AssetSource, ClockMode, EvacuationZoneView, IgnitionKind, IgnitionPolicy, MissionConfig,
    MissionState, MissionSummary, NodeType, NodeView, PriorityZoneView, RuleSet, RuntimeEvent,
    Snapshot, TimelineEvent, Variant, Vec2, WindView, WorldInit,
};
use crate::world::{generate_nodes, generate_priority_zones, generate_terrain, Terrain};

mod action_system;
mod fire;
mod ignition_system;
mod mission_system;
mod utils;

pub use self::fire::Fire;
pub use self::utils::wind_direction_name;

use self::utils::now_ms;

#[derive(Clone, Debug)]
struct NodeInternal {
    view: NodeView,
    position: Vec2,
}

#[derive(Clone, Debug)]
struct PriorityZone {
    position: Vec2,
    radius: f32,
    revealed: bool,
}

#[derive(Clone, Copy, Debug)]
struct EvacuationZone {
    position: Vec2,
    radius: f32,
}

#[derive(Clone, Debug)]
struct Wind {
    angle: f32,
    magnitude: f32,
    speed_mph: i32,
    revealed: bool,
}

/// Real-time ignition deadlines, in simulation milliseconds.
#[derive(Clone, Debug, Default)]
struct IgnitionTimers {
    next_timer_at_ms: Option<u64>,
    next_periodic_at_ms: Option<u64>,
    staggered_seeds_at_ms: VecDeque<u64>,
}

#[derive(Clone, Debug)]
pub struct MissionOptions {
    pub map_width: f32,
    pub map_height: f32,
    pub mission_duration_ms_override: Option<u64>,
    pub clock_override: Option<ClockMode>,
    /// Replaces the generated terrain; its size replaces the map size.
    pub terrain: Option<Terrain>,
}

impl Default for MissionOptions {
    fn default() -> Self {
        Self {
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            mission_duration_ms_override: None,
            clock_override: None,
            terrain: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MissionEngine {
    pub started_at_ms: u64,
    pub rules: RuleSet,
    pub config: MissionConfig,
    pub terrain: Terrain,
    pub width: f32,
    pub height: f32,

    rng: Rng,
    fires: Vec<Fire>,
    nodes: Vec<NodeInternal>,
    evacuations: Vec<EvacuationZone>,
    priority_zones: Vec<PriorityZone>,
    wind: Wind,
    spread_multiplier: f32,
    events: Vec<RuntimeEvent>,
    timeline: Vec<TimelineEvent>,
    timers: IgnitionTimers,

    /// Mission clock read by the timeout guard.
    elapsed_ms: u64,
    /// Tick time; drives growth and real-time ignition timers.
    sim_time_ms: u64,
    tick_counter: u64,
    state: MissionState,
    actions_taken: u32,
    /// Set between a decision and its probability feedback.
    turn_pending: bool,
    next_id_counter: u64,
}

impl MissionEngine {
    pub fn new(variant: Variant, seed: u32, options: MissionOptions) -> Self {
        let mut rules = rule_set(variant);
        if let Some(clock) = options.clock_override {
            rules.clock = clock;
        }
        let terrain = options
            .terrain
            .unwrap_or_else(|| generate_terrain(options.map_width, options.map_height, seed));
        let width = terrain.width;
        let height = terrain.height;
        let mut rng = Rng::new(seed);

        let wind = Wind {
            angle: rng.angle(),
            magnitude: WIND_MAGNITUDE,
            speed_mph: rng.int(WIND_SPEED_MIN_MPH, WIND_SPEED_MAX_MPH),
            revealed: false,
        };

        let config = MissionConfig {
            variant,
            tick_rate: TICK_RATE,
            mission_duration_ms: options
                .mission_duration_ms_override
                .unwrap_or(MISSION_DURATION_MS),
            time_per_action_ms: TIME_PER_ACTION_MS,
            coverage_threshold: COVERAGE_THRESHOLD,
            suppression_radius: rules.suppression_radius,
            scan_radius: rules.scan_radius,
            evacuation_radius: EVACUATION_RADIUS,
            turn_based: matches!(rules.ignition, IgnitionPolicy::TurnBased(_)),
            clock: rules.clock,
        };

        let mut engine = Self {
            started_at_ms: now_ms(),
            rules,
            config,
            terrain,
            width,
            height,
            rng,
            fires: Vec::new(),
            nodes: Vec::new(),
            evacuations: Vec::new(),
            priority_zones: Vec::new(),
            wind,
            spread_multiplier: INITIAL_SPREAD_MULTIPLIER,
            events: Vec::new(),
            timeline: Vec::new(),
            timers: IgnitionTimers::default(),
            elapsed_ms: 0,
            sim_time_ms: 0,
            tick_counter: 0,
            state: MissionState::Active,
            actions_taken: 0,
            turn_pending: false,
            next_id_counter: 1,
        };
        engine.push_timeline("MISSION STARTED: Monitoring operational area.");
        engine.spawn_initial_fires();
        engine.place_assets_and_nodes();
        engine.arm_ignition_timers();
        engine.refresh_derived_state();
        engine
    }

    fn place_assets_and_nodes(&mut self) {
        if self.rules.asset_source == AssetSource::PriorityZones {
            self.priority_zones =
                generate_priority_zones(&self.terrain, self.width, self.height, &mut self.rng)
                    .into_iter()
                    .map(|position| PriorityZone {
                        position,
                        radius: PRIORITY_ZONE_RADIUS,
                        revealed: false,
                    })
                    .collect();
        }
        let asset_count = match self.rules.asset_source {
            AssetSource::AssetNodes { count } => count,
            AssetSource::PriorityZones => 0,
        };
        let anchors: Vec<Vec2> = self.fires.iter().map(|fire| fire.position).collect();
        self.nodes = generate_nodes(
            self.rules.node_layout,
            asset_count,
            &self.terrain,
            self.width,
            self.height,
            &anchors,
            &mut self.rng,
        )
        .into_iter()
        .map(|node| NodeInternal {
            view: NodeView {
                id: node.id,
                x: node.position.x,
                y: node.position.y,
                node_type: node.node_type,
                is_asset: node.is_asset,
                compromised: false,
                selected: false,
            },
            position: node.position,
        })
        .collect();
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn spread_multiplier(&self) -> f32 {
        self.spread_multiplier
    }

    pub fn fires(&self) -> &[Fire] {
        &self.fires
    }

    pub fn get_world_init(&self) -> WorldInit {
        WorldInit {
            width: self.width,
            height: self.height,
            cell_size: self.terrain.cell_size,
            tiles: self.terrain.tiles.clone(),
            config: self.config.clone(),
        }
    }

    pub fn step(&mut self, dt_ms: u64) {
        if self.is_ended() {
            return;
        }
        self.tick_counter += 1;
        self.sim_time_ms = self.sim_time_ms.saturating_add(dt_ms);
        if self.rules.clock == ClockMode::WallClock {
            self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        }

        self.run_ignition_timers();
        self.update_fires();
        self.refresh_derived_state();
        self.check_mission_end();
    }

    /// Growth for every fire is computed against the fire set as it stood at
    /// the start of the tick.
    fn update_fires(&mut self) {
        let threats: Vec<(Vec2, bool)> = self
            .fires
            .iter()
            .map(|fire| (fire.position, fire.is_threat()))
            .collect();
        let bonus = self.rules.synergy_bonus;
        let synergy: Vec<f32> = threats
            .iter()
            .enumerate()
            .map(|(idx, (position, _))| {
                let neighbors = threats
                    .iter()
                    .enumerate()
                    .filter(|(other, (other_pos, threat))| {
                        *other != idx && *threat && position.distance(*other_pos) < SYNERGY_RANGE
                    })
                    .count();
                neighbors as f32 * bonus
            })
            .collect();

        let multiplier = self.spread_multiplier;
        for (fire, synergy) in self.fires.iter_mut().zip(synergy) {
            if fire.is_active() {
                fire.update(synergy, multiplier);
            }
        }
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let duration = self.config.mission_duration_ms;
        let time_left_ms = duration.saturating_sub(self.elapsed_ms.min(duration));
        let threat_distance = EVACUATION_RADIUS + EVACUATION_THREAT_MARGIN;
        let snapshot = Snapshot {
            tick: self.tick_counter,
            elapsed_ms: self.elapsed_ms,
            time_left_ms,
            visible_coverage_percent: self.visible_coverage_percent(),
            active_threats: self.active_threats(),
            spread_multiplier: self.spread_multiplier,
            fires: self
                .fires
                .iter()
                .filter(|fire| fire.is_revealed())
                .map(Fire::view)
                .collect(),
            nodes: self.nodes.iter().map(|node| node.view.clone()).collect(),
            evacuations: self
                .evacuations
                .iter()
                .map(|zone| EvacuationZoneView {
                    x: zone.position.x,
                    y: zone.position.y,
                    radius: zone.radius,
                    threatened: self.fires.iter().any(|fire| {
                        fire.is_threat()
                            && fire.position.distance(zone.position) < fire.radius + threat_distance
                    }),
                })
                .collect(),
            priority_zones: self
                .priority_zones
                .iter()
                .filter(|zone| zone.revealed)
                .map(|zone| PriorityZoneView {
                    x: zone.position.x,
                    y: zone.position.y,
                    radius: zone.radius,
                    revealed: zone.revealed,
                    compromised: self.asset_hit(zone.position, zone.radius),
                })
                .collect(),
            wind: self.wind.revealed.then(|| WindView {
                angle: self.wind.angle,
                magnitude: self.wind.magnitude,
                speed_mph: self.wind.speed_mph,
                direction: wind_direction_name(self.wind.angle).to_string(),
            }),
            mission: self.state,
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
            timeline: self
                .timeline
                .iter()
                .rev()
                .take(TIMELINE_SNAPSHOT_LEN)
                .cloned()
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect(),
        };
        if include_events {
            self.events.clear();
        }
        snapshot
    }

    pub fn build_summary(&self) -> MissionSummary {
        MissionSummary {
            variant: self.rules.variant,
            state: self.state,
            success: self.state.is_success(),
            reason: self.state.reason().to_string(),
            elapsed_ms: self.elapsed_ms,
            ticks: self.tick_counter,
            coverage: self.coverage(),
            fires_total: self.fires.len(),
            fires_mitigated: self.fires.iter().filter(|fire| fire.is_mitigated()).count(),
            actions_taken: self.actions_taken,
            timeline: self.timeline.clone(),
        }
    }

    /// Applies the probability service's answer to the last decision. Any
    /// failure leaves the multiplier where it was.
    /// Applies the probability answer for the last decision, then closes its
    /// turn. Returns the number of fires the turn started.
    pub fn apply_probability_feedback(
        &mut self,
        result: Result<ProbabilityResponse, UplinkError>,
    ) -> usize {
        match result {
            Ok(response) if response.is_success() => self.absorb_probability(&response),
            Ok(response) => {
                tracing::warn!(status = %response.status, "probability service rejected decision");
            }
            Err(err) => {
                tracing::warn!(error = %err, "probability uplink failed; spread multiplier unchanged");
            }
        }
        self.finish_turn()
    }

    fn absorb_probability(&mut self, response: &ProbabilityResponse) {
        if self.rules.low_risk_shrink {
            self.apply_low_risk_shrink(response.prob_high);
        }
        if let Some(message) = response.cdn_msg.as_deref() {
            self.push_timeline(format!("CDN ANALYSIS: {message}"));
        }

        let multiplier = crate::constants::clamp_spread_multiplier(response.spread_increment);
        self.spread_multiplier = multiplier;
        self.events
            .push(RuntimeEvent::SpreadMultiplierChanged { multiplier });
        self.push_timeline(format!(
            "FIRE DYNAMICS: Spread multiplier adjusted to {multiplier:.3}"
        ));
    }

    fn node_index(&self, node_id: &str) -> Result<usize, ActionError> {
        self.nodes
            .iter()
            .position(|node| node.view.id == node_id)
            .ok_or_else(|| ActionError::UnknownNode(node_id.to_string()))
    }

    fn nearest_fire_distance(&self, point: Vec2) -> Option<f32> {
        self.fires
            .iter()
            .map(|fire| fire.position.distance(point))
            .min_by(|a, b| a.total_cmp(b))
    }

    fn push_timeline(&mut self, label: impl Into<String>) {
        self.timeline.push(TimelineEvent {
            at_ms: self.elapsed_ms,
            label: label.into(),
        });
    }

    fn push_fire(&mut self, position: Vec2, revealed: bool, kind: IgnitionKind) -> usize {
        let id = self.make_id("fire");
        self.fires.push(Fire::new(
            id.clone(),
            position,
            self.rules.fire_initial_radius,
            self.rules.fire_max_radius,
            revealed,
        ));
        tracing::debug!(fire_id = %id, ?kind, x = position.x, y = position.y, revealed, "fire ignited");
        self.events.push(RuntimeEvent::FireIgnited { fire_id: id, kind });
        self.fires.len() - 1
    }

    fn make_id(&mut self, prefix: &str) -> String {
        let id = format!("{}_{}", prefix, self.next_id_counter);
        self.next_id_counter = self.next_id_counter.saturating_add(1);
        id
    }
}
