use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Real-time ignition, priority zones as assets.
    HumanOnly,
    /// Turn-based ignition, asset nodes.
    HumanCdn,
}

impl Variant {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human_only" => Some(Self::HumanOnly),
            "human_cdn" => Some(Self::HumanCdn),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::HumanOnly => "human_only",
            Self::HumanCdn => "human_cdn",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCode {
    Evacuate,
    Suppress,
    Scan,
    ControlLine,
}

impl ActionCode {
    pub fn from_code(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Evacuate),
            1 => Some(Self::Suppress),
            2 => Some(Self::Scan),
            3 => Some(Self::ControlLine),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Evacuate => 0,
            Self::Suppress => 1,
            Self::Scan => 2,
            Self::ControlLine => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Evacuate => "Evacuation",
            Self::Suppress => "Direct Suppression",
            Self::Scan => "Investigation Scan",
            Self::ControlLine => "Control Line",
        }
    }

    /// Evacuation and suppression are answered by the spread network and
    /// land in the activity log; scan and control-line use fixed answers.
    pub fn queries_network(self) -> bool {
        matches!(self, Self::Evacuate | Self::Suppress)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FireState {
    Hidden,
    Revealed,
    Mitigated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnitionKind {
    Seed,
    Branch,
    Spot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Investigation,
    Action,
    Generic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    Active,
    TimedOut,
    CoverageExceeded,
    AssetLost,
    AllClear,
}

impl MissionState {
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }

    pub fn is_success(self) -> bool {
        self == Self::AllClear
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Active => "Mission in progress.",
            Self::TimedOut => "OPERATIONAL TIMEOUT: Time Limit Reached.",
            Self::CoverageExceeded => {
                "CRITICAL FAILURE: Fire spread has exceeded containment thresholds (60%+)."
            }
            Self::AssetLost => "MISSION FAILURE: A high-value priority asset has been consumed by fire.",
            Self::AllClear => "MISSION SUCCESS: All thermal threats have been successfully mitigated.",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::TimedOut => "timed_out",
            Self::CoverageExceeded => "coverage_exceeded",
            Self::AssetLost => "asset_lost",
            Self::AllClear => "all_clear",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn distance(self, other: Vec2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Clone, Debug)]
pub struct TurnBasedIgnition {
    pub new_fire_chance: f32,
    pub seed_weight: f32,
    pub spot_chance: f32,
    pub spot_count_min: i32,
    pub spot_count_max: i32,
    pub spot_jump_min: f32,
    pub spot_jump_max: f32,
    /// Half-width of the spot-fire cone around the wind angle.
    pub spot_variance: f32,
}

#[derive(Clone, Debug)]
pub struct RealTimeIgnition {
    pub timer_min_ms: u64,
    pub timer_max_ms: u64,
    pub periodic_ms: u64,
    pub periodic_chance: f32,
    pub staggered_seeds_ms: Vec<u64>,
    pub seed_chance: f32,
}

#[derive(Clone, Debug)]
pub enum IgnitionPolicy {
    TurnBased(TurnBasedIgnition),
    RealTime(RealTimeIgnition),
}

#[derive(Clone, Debug)]
pub struct BranchRule {
    pub base_distance: f32,
    pub jitter: f32,
    pub add_parent_radius: bool,
    pub wind_biased: bool,
    pub unmitigated_parent: bool,
    /// Parents must be strictly larger than this; `None` accepts any fire.
    pub parent_min_radius: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Asset center lies strictly inside the fire circle.
    CenterInCircle,
    /// Fire circle comes within `margin` of the asset's own radius.
    MarginOverlap { margin: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSource {
    PriorityZones,
    AssetNodes { count: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeLayout {
    Grid { cols: usize, rows: usize },
    Clustered { count: usize, anchored: usize, spacing: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlacementFallback {
    Abandon,
    FixedPoint(Vec2),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Only decisions advance the mission clock.
    Discrete,
    /// Tick time advances the mission clock as well.
    WallClock,
}

#[derive(Clone, Debug)]
pub struct RuleSet {
    pub variant: Variant,
    pub ignition: IgnitionPolicy,
    pub branch: BranchRule,
    pub seed_min_spacing: f32,
    pub fire_initial_radius: f32,
    pub fire_max_radius: f32,
    pub synergy_bonus: f32,
    pub suppression_radius: f32,
    pub scan_radius: f32,
    pub asset_source: AssetSource,
    pub collision: CollisionPolicy,
    pub node_layout: NodeLayout,
    pub placement_fallback: PlacementFallback,
    pub clock: ClockMode,
    pub initial_fires_revealed: Vec<bool>,
    pub low_risk_shrink: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MissionConfig {
    pub variant: Variant,
    #[serde(rename = "tickRate")]
    pub tick_rate: u32,
    #[serde(rename = "missionDurationMs")]
    pub mission_duration_ms: u64,
    #[serde(rename = "timePerActionMs")]
    pub time_per_action_ms: u64,
    #[serde(rename = "coverageThreshold")]
    pub coverage_threshold: f32,
    #[serde(rename = "suppressionRadius")]
    pub suppression_radius: f32,
    #[serde(rename = "scanRadius")]
    pub scan_radius: f32,
    #[serde(rename = "evacuationRadius")]
    pub evacuation_radius: f32,
    #[serde(rename = "turnBased")]
    pub turn_based: bool,
    pub clock: ClockMode,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorldInit {
    pub width: f32,
    pub height: f32,
    #[serde(rename = "cellSize")]
    pub cell_size: f32,
    pub tiles: Vec<String>,
    pub config: MissionConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct FireView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    #[serde(rename = "maxRadius")]
    pub max_radius: f32,
    pub state: FireState,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(rename = "isAsset")]
    pub is_asset: bool,
    pub compromised: bool,
    pub selected: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvacuationZoneView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub threatened: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PriorityZoneView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub revealed: bool,
    pub compromised: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct WindView {
    pub angle: f32,
    pub magnitude: f32,
    #[serde(rename = "speedMph")]
    pub speed_mph: i32,
    pub direction: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TimelineEvent {
    #[serde(rename = "atMs")]
    pub at_ms: u64,
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionChoice {
    pub value: u8,
    pub action: ActionCode,
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionMenu {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// `None` when no fire exists yet.
    #[serde(rename = "nearestFireDistance")]
    pub nearest_fire_distance: Option<f32>,
    pub choices: Vec<ActionChoice>,
}

/// Payload the host forwards to the probability service after a decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProbabilityRequest {
    pub node_id: String,
    pub value: u8,
    pub distance: Option<f32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionOutcome {
    pub action: ActionCode,
    #[serde(rename = "fireHits")]
    pub fire_hits: usize,
    #[serde(rename = "firesRevealed")]
    pub fires_revealed: usize,
    #[serde(rename = "zonesRevealed")]
    pub zones_revealed: usize,
    #[serde(rename = "clockAdvanceMs")]
    pub clock_advance_ms: u64,
    #[serde(skip)]
    pub probability_request: ProbabilityRequest,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    FireIgnited {
        #[serde(rename = "fireId")]
        fire_id: String,
        kind: IgnitionKind,
    },
    SuppressionApplied {
        #[serde(rename = "nodeId")]
        node_id: String,
        fires: usize,
        #[serde(rename = "costMs")]
        cost_ms: u64,
    },
    EvacuationCreated {
        x: f32,
        y: f32,
        radius: f32,
    },
    ScanCompleted {
        x: f32,
        y: f32,
        radius: f32,
        #[serde(rename = "firesFound")]
        fires_found: usize,
        #[serde(rename = "zonesFound")]
        zones_found: usize,
    },
    SpreadMultiplierChanged {
        multiplier: f32,
    },
    MissionEnded {
        state: MissionState,
        success: bool,
        reason: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(rename = "timeLeftMs")]
    pub time_left_ms: u64,
    /// Percent of the map covered by revealed fires, capped at 100.
    #[serde(rename = "visibleCoveragePercent")]
    pub visible_coverage_percent: f32,
    #[serde(rename = "activeThreats")]
    pub active_threats: usize,
    #[serde(rename = "spreadMultiplier")]
    pub spread_multiplier: f32,
    pub fires: Vec<FireView>,
    pub nodes: Vec<NodeView>,
    pub evacuations: Vec<EvacuationZoneView>,
    #[serde(rename = "priorityZones")]
    pub priority_zones: Vec<PriorityZoneView>,
    pub wind: Option<WindView>,
    pub mission: MissionState,
    pub events: Vec<RuntimeEvent>,
    pub timeline: Vec<TimelineEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MissionSummary {
    pub variant: Variant,
    pub state: MissionState,
    pub success: bool,
    pub reason: String,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub ticks: u64,
    pub coverage: f32,
    #[serde(rename = "firesTotal")]
    pub fires_total: usize,
    #[serde(rename = "firesMitigated")]
    pub fires_mitigated: usize,
    #[serde(rename = "actionsTaken")]
    pub actions_taken: u32,
    pub timeline: Vec<TimelineEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityEntry {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "actionPerformed")]
    pub action_performed: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<ActivityEntry>,
}
