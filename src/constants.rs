use crate::types::{
    AssetSource, BranchRule, ClockMode, CollisionPolicy, IgnitionPolicy, NodeLayout,
    PlacementFallback, RealTimeIgnition, RuleSet, TurnBasedIgnition, Variant, Vec2,
};

pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const DEFAULT_MAP_WIDTH: f32 = 2_400.0;
pub const DEFAULT_MAP_HEIGHT: f32 = 1_600.0;
pub const TERRAIN_CELL_SIZE: f32 = 40.0;

pub const MISSION_DURATION_MS: u64 = 120_000;
pub const TIME_PER_ACTION_MS: u64 = 5_000;
pub const COVERAGE_THRESHOLD: f32 = 0.60;
pub const ALL_CLEAR_GRACE_MS: u64 = 20_000;

pub const INITIAL_SPREAD_MULTIPLIER: f32 = 0.1;
pub const SPREAD_MULTIPLIER_MIN: f32 = 0.02;
pub const SPREAD_MULTIPLIER_MAX: f32 = 0.08;
pub const SPREAD_MULTIPLIER_DEFAULT: f32 = 0.05;

pub const FIRE_BASE_GROWTH: f32 = 0.5;
pub const SYNERGY_RANGE: f32 = 400.0;
pub const MIN_SIZE_DAMPING: f32 = 0.1;
pub const MITIGATED_DECAY_PER_TICK: f32 = 0.6;
/// A fire within this distance of its max radius counts as capped.
pub const FIRE_CAP_TOLERANCE: f32 = 1.0;

pub const WIND_BIAS_CHANCE: f32 = 0.8;
pub const WIND_BIAS_SPREAD: f32 = 0.3;
pub const WIND_MAGNITUDE: f32 = 0.30;
pub const WIND_SPEED_MIN_MPH: i32 = 20;
pub const WIND_SPEED_MAX_MPH: i32 = 49;

pub const EVACUATION_RADIUS: f32 = 150.0;
pub const EVACUATION_THREAT_MARGIN: f32 = 50.0;
pub const SCAN_RADIUS: f32 = 450.0;

pub const PRIORITY_ZONE_COUNT: usize = 3;
pub const PRIORITY_ZONE_RADIUS: f32 = 25.0;
pub const PRIORITY_ZONE_SPACING: f32 = 200.0;
pub const PRIORITY_ZONE_ATTEMPTS: u32 = 1_000;
pub const PRIORITY_ZONE_LAND_AFTER: u32 = 500;

pub const PLACEMENT_ATTEMPTS: u32 = 150;
pub const FALLBACK_POSITION: Vec2 = Vec2 { x: 500.0, y: 500.0 };

pub const LOW_RISK_PROB_HIGH: f32 = 0.3;
pub const LOW_RISK_SHRINK: f32 = 0.8;

pub const EMERGENCY_MENU_RANGE: f32 = 100.0;
pub const SCAN_MENU_RANGE: f32 = 300.0;

pub const TIMELINE_SNAPSHOT_LEN: usize = 24;

/// Clock penalty for suppressing one fire, stepped on how close it is to its cap.
pub fn suppression_cost_ms(size_ratio: f32) -> u64 {
    if size_ratio >= 0.60 {
        return 35_000;
    }
    if size_ratio >= 0.40 {
        return 20_000;
    }
    if size_ratio >= 0.20 {
        return 10_000;
    }
    5_000
}

pub fn clamp_spread_multiplier(spread_increment: Option<f32>) -> f32 {
    let raw = spread_increment
        .filter(|value| value.is_finite())
        .unwrap_or(SPREAD_MULTIPLIER_DEFAULT);
    raw.clamp(SPREAD_MULTIPLIER_MIN, SPREAD_MULTIPLIER_MAX)
}

pub fn rule_set(variant: Variant) -> RuleSet {
    match variant {
        Variant::HumanOnly => RuleSet {
            variant,
            ignition: IgnitionPolicy::RealTime(RealTimeIgnition {
                timer_min_ms: 8_000,
                timer_max_ms: 15_000,
                periodic_ms: 10_000,
                periodic_chance: 0.3,
                staggered_seeds_ms: vec![6_000, 14_000],
                seed_chance: 0.20,
            }),
            branch: BranchRule {
                base_distance: 50.0,
                jitter: 70.0,
                add_parent_radius: true,
                wind_biased: true,
                unmitigated_parent: true,
                parent_min_radius: Some(5.0),
            },
            seed_min_spacing: 350.0,
            fire_initial_radius: 15.0,
            fire_max_radius: 600.0,
            synergy_bonus: 0.25,
            suppression_radius: 450.0,
            scan_radius: SCAN_RADIUS,
            asset_source: AssetSource::PriorityZones,
            collision: CollisionPolicy::CenterInCircle,
            node_layout: NodeLayout::Clustered {
                count: 48,
                anchored: 7,
                spacing: 40.0,
            },
            placement_fallback: PlacementFallback::Abandon,
            clock: ClockMode::Discrete,
            initial_fires_revealed: vec![false],
            low_risk_shrink: false,
        },
        Variant::HumanCdn => RuleSet {
            variant,
            ignition: IgnitionPolicy::TurnBased(TurnBasedIgnition {
                new_fire_chance: 0.50,
                seed_weight: 0.30,
                spot_chance: 0.60,
                spot_count_min: 1,
                spot_count_max: 3,
                spot_jump_min: 120.0,
                spot_jump_max: 200.0,
                spot_variance: std::f32::consts::FRAC_PI_6,
            }),
            branch: BranchRule {
                base_distance: 150.0,
                jitter: 150.0,
                add_parent_radius: false,
                wind_biased: false,
                unmitigated_parent: false,
                parent_min_radius: None,
            },
            seed_min_spacing: 0.0,
            fire_initial_radius: 40.0,
            fire_max_radius: 200.0,
            synergy_bonus: 0.35,
            suppression_radius: 280.0,
            scan_radius: SCAN_RADIUS,
            asset_source: AssetSource::AssetNodes { count: 3 },
            collision: CollisionPolicy::CenterInCircle,
            node_layout: NodeLayout::Grid { cols: 6, rows: 5 },
            placement_fallback: PlacementFallback::FixedPoint(FALLBACK_POSITION),
            clock: ClockMode::Discrete,
            initial_fires_revealed: vec![true, false],
            low_risk_shrink: true,
        },
    }
}
