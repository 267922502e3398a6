use crate::constants::{
    FALLBACK_POSITION, PRIORITY_ZONE_ATTEMPTS, PRIORITY_ZONE_COUNT, PRIORITY_ZONE_LAND_AFTER,
    PRIORITY_ZONE_SPACING, TERRAIN_CELL_SIZE,
};
use crate::rng::Rng;
use crate::types::{ActionCode, NodeLayout, NodeType, Vec2};

pub const LAND: char = '.';
pub const WATER: char = '~';
pub const URBAN: char = 'U';

/// Named nodes backed by a variable in the probability model.
pub const CDN_NODE_NAMES: [&str; 4] = [
    "Ribbon Bridge Status",
    "Fire Across Gap",
    "Enemy ATK/Artillery",
    "Weather Status",
];

/// Land/water classification of map coordinates.
pub trait LandMask {
    fn is_land(&self, point: Vec2) -> bool;

    fn is_urban(&self, _point: Vec2) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct Terrain {
    pub width: f32,
    pub height: f32,
    pub cell_size: f32,
    pub tiles: Vec<String>,
}

impl Terrain {
    pub fn all_land(width: f32, height: f32) -> Self {
        let cols = (width / TERRAIN_CELL_SIZE).ceil().max(1.0) as usize;
        let rows = (height / TERRAIN_CELL_SIZE).ceil().max(1.0) as usize;
        Self {
            width,
            height,
            cell_size: TERRAIN_CELL_SIZE,
            tiles: vec![LAND.to_string().repeat(cols); rows],
        }
    }

    pub fn from_tiles(tiles: Vec<String>, cell_size: f32) -> Self {
        let cols = tiles.iter().map(|row| row.chars().count()).max().unwrap_or(0);
        Self {
            width: cols as f32 * cell_size,
            height: tiles.len() as f32 * cell_size,
            cell_size,
            tiles,
        }
    }

    pub fn tile_at(&self, point: Vec2) -> Option<char> {
        if !point.x.is_finite() || !point.y.is_finite() || point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let col = (point.x / self.cell_size).floor() as usize;
        let row = (point.y / self.cell_size).floor() as usize;
        self.tiles.get(row)?.chars().nth(col)
    }
}

impl LandMask for Terrain {
    fn is_land(&self, point: Vec2) -> bool {
        matches!(self.tile_at(point), Some(tile) if tile != WATER)
    }

    fn is_urban(&self, point: Vec2) -> bool {
        self.tile_at(point) == Some(URBAN)
    }
}

/// Lakes, one river and a handful of towns on an otherwise dry map.
pub fn generate_terrain(width: f32, height: f32, seed: u32) -> Terrain {
    let mut rng = Rng::new(seed ^ 0x9e37_79b9);
    let cols = (width / TERRAIN_CELL_SIZE).ceil().max(1.0) as i32;
    let rows = (height / TERRAIN_CELL_SIZE).ceil().max(1.0) as i32;
    let mut grid: Vec<Vec<char>> = vec![vec![LAND; cols as usize]; rows as usize];

    let lakes = rng.int(2, 4);
    for _ in 0..lakes {
        let cx = rng.int(0, cols - 1);
        let cy = rng.int(0, rows - 1);
        let radius = rng.int(2, 6);
        carve_blob(&mut grid, cx, cy, radius, WATER, None);
    }
    carve_river(&mut grid, &mut rng);

    let towns = rng.int(4, 7);
    for _ in 0..towns {
        let cx = rng.int(1, (cols - 2).max(1));
        let cy = rng.int(1, (rows - 2).max(1));
        let radius = rng.int(1, 2);
        carve_blob(&mut grid, cx, cy, radius, URBAN, Some(LAND));
    }

    Terrain {
        width,
        height,
        cell_size: TERRAIN_CELL_SIZE,
        tiles: grid
            .into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect(),
    }
}

fn carve_blob(
    grid: &mut [Vec<char>],
    cx: i32,
    cy: i32,
    radius: i32,
    tile: char,
    only_over: Option<char>,
) {
    let rows = grid.len() as i32;
    for y in (cy - radius).max(0)..=(cy + radius).min(rows - 1) {
        let row = &mut grid[y as usize];
        let cols = row.len() as i32;
        for x in (cx - radius).max(0)..=(cx + radius).min(cols - 1) {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let cell = &mut row[x as usize];
            if only_over.is_some_and(|required| *cell != required) {
                continue;
            }
            *cell = tile;
        }
    }
}

fn carve_river(grid: &mut [Vec<char>], rng: &mut Rng) {
    let rows = grid.len() as i32;
    let Some(cols) = grid.first().map(|row| row.len() as i32) else {
        return;
    };
    let mut y = rng.int(rows / 4, (rows * 3 / 4).max(rows / 4));
    for x in 0..cols {
        grid[y as usize][x as usize] = WATER;
        y = (y + rng.int(-1, 1)).clamp(0, rows - 1);
    }
}

/// Strict interior test; points on the map edge are rejected.
pub fn in_bounds(width: f32, height: f32, point: Vec2) -> bool {
    point.x > 0.0 && point.x < width && point.y > 0.0 && point.y < height
}

pub fn clamp_to_map(width: f32, height: f32, point: Vec2) -> Vec2 {
    Vec2 {
        x: point.x.clamp(0.0, width),
        y: point.y.clamp(0.0, height),
    }
}

pub fn fallback_position(width: f32, height: f32) -> Vec2 {
    clamp_to_map(width, height, FALLBACK_POSITION)
}

/// Uniform land point accepted by `accept`, or `None` after `attempts` draws.
pub fn sample_land_point(
    mask: &dyn LandMask,
    width: f32,
    height: f32,
    rng: &mut Rng,
    attempts: u32,
    accept: impl Fn(Vec2) -> bool,
) -> Option<Vec2> {
    for _ in 0..attempts {
        let candidate = Vec2 {
            x: rng.next_f32() * width,
            y: rng.next_f32() * height,
        };
        if in_bounds(width, height, candidate) && mask.is_land(candidate) && accept(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Urban cells first; plain land is accepted once half the attempts are spent.
/// A zone that finds no spot is skipped.
pub fn generate_priority_zones(
    mask: &dyn LandMask,
    width: f32,
    height: f32,
    rng: &mut Rng,
) -> Vec<Vec2> {
    let mut zones: Vec<Vec2> = Vec::new();
    for _ in 0..PRIORITY_ZONE_COUNT {
        for attempt in 0..PRIORITY_ZONE_ATTEMPTS {
            let candidate = Vec2 {
                x: rng.next_f32() * width,
                y: rng.next_f32() * height,
            };
            let acceptable = mask.is_urban(candidate)
                || (attempt > PRIORITY_ZONE_LAND_AFTER && mask.is_land(candidate));
            if !acceptable {
                continue;
            }
            if zones
                .iter()
                .any(|zone| zone.distance(candidate) < PRIORITY_ZONE_SPACING)
            {
                continue;
            }
            zones.push(candidate);
            break;
        }
    }
    zones
}

#[derive(Clone, Debug)]
pub struct PlacedNode {
    pub id: String,
    pub position: Vec2,
    pub node_type: NodeType,
    pub is_asset: bool,
}

pub fn generate_nodes(
    layout: NodeLayout,
    asset_count: usize,
    mask: &dyn LandMask,
    width: f32,
    height: f32,
    anchors: &[Vec2],
    rng: &mut Rng,
) -> Vec<PlacedNode> {
    match layout {
        NodeLayout::Grid { cols, rows } => {
            generate_grid_nodes(cols, rows, asset_count, mask, width, height, rng)
        }
        NodeLayout::Clustered {
            count,
            anchored,
            spacing,
        } => generate_clustered_nodes(count, anchored, spacing, mask, width, height, anchors, rng),
    }
}

fn generate_grid_nodes(
    cols: usize,
    rows: usize,
    asset_count: usize,
    mask: &dyn LandMask,
    width: f32,
    height: f32,
    rng: &mut Rng,
) -> Vec<PlacedNode> {
    let cols = cols.max(1);
    let rows = rows.max(1);
    let cell_w = width / cols as f32;
    let cell_h = height / rows as f32;
    let mut nodes = Vec::with_capacity(cols * rows);

    for idx in 0..cols * rows {
        let grid_row = (idx / cols) as f32;
        let grid_col = (idx % cols) as f32;
        let mut position = None;
        for _ in 0..150 {
            let candidate = Vec2 {
                x: grid_col * cell_w + rng.next_f32() * cell_w,
                y: grid_row * cell_h + rng.next_f32() * cell_h,
            };
            if in_bounds(width, height, candidate) && mask.is_land(candidate) {
                position = Some(candidate);
                break;
            }
        }
        let position = position.unwrap_or(Vec2 {
            x: grid_col * cell_w + cell_w / 2.0,
            y: grid_row * cell_h + cell_h / 2.0,
        });

        let node_type = if idx % 2 == 0 {
            NodeType::Investigation
        } else {
            NodeType::Action
        };
        let prefix = if node_type == NodeType::Investigation {
            "INT"
        } else {
            "ACT"
        };
        nodes.push(PlacedNode {
            id: format!("{prefix}-{idx}"),
            position,
            node_type,
            is_asset: false,
        });
    }

    let mut action_indices: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.node_type == NodeType::Action)
        .map(|(idx, _)| idx)
        .collect();
    rng.shuffle(&mut action_indices);
    for idx in action_indices.into_iter().take(asset_count) {
        nodes[idx].is_asset = true;
    }
    nodes
}

#[allow(clippy::too_many_arguments)]
fn generate_clustered_nodes(
    count: usize,
    anchored: usize,
    spacing: f32,
    mask: &dyn LandMask,
    width: f32,
    height: f32,
    anchors: &[Vec2],
    rng: &mut Rng,
) -> Vec<PlacedNode> {
    let mut nodes: Vec<PlacedNode> = Vec::with_capacity(count);
    for idx in 0..count {
        let mut position = None;
        for _ in 0..100 {
            let candidate = if idx < anchored && !anchors.is_empty() {
                let anchor = anchors[rng.pick_index(anchors.len())];
                let angle = rng.angle();
                let dist = rng.range(80.0, 380.0);
                Vec2 {
                    x: anchor.x + angle.cos() * dist,
                    y: anchor.y + angle.sin() * dist,
                }
            } else {
                Vec2 {
                    x: rng.next_f32() * width,
                    y: rng.next_f32() * height,
                }
            };
            if !in_bounds(width, height, candidate) || !mask.is_land(candidate) {
                continue;
            }
            if nodes
                .iter()
                .any(|node| node.position.distance(candidate) < spacing)
            {
                continue;
            }
            position = Some(candidate);
            break;
        }

        nodes.push(PlacedNode {
            id: CDN_NODE_NAMES
                .get(idx)
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("Node_{idx}")),
            position: position.unwrap_or_else(|| fallback_position(width, height)),
            node_type: NodeType::Generic,
            is_asset: false,
        });
    }
    nodes
}

/// Decision label for the named nodes the probability model knows about.
pub fn cdn_action_label(node_id: &str, action: ActionCode) -> Option<&'static str> {
    match (node_id, action) {
        ("Ribbon Bridge Status", ActionCode::Suppress) => Some("Deploy Bridge"),
        ("Ribbon Bridge Status", ActionCode::Evacuate) => Some("Retract Bridge"),
        ("Fire Across Gap", ActionCode::Suppress) => Some("Suppress Enemy"),
        ("Fire Across Gap", ActionCode::Evacuate) => Some("Cease Fire"),
        ("Enemy ATK/Artillery", ActionCode::Evacuate) => Some("Neutralize Battery"),
        ("Enemy ATK/Artillery", ActionCode::Suppress) => Some("Monitor Position"),
        _ => None,
    }
}

pub fn is_cdn_decision_node(node_id: &str) -> bool {
    matches!(
        node_id,
        "Ribbon Bridge Status" | "Fire Across Gap" | "Enemy ATK/Artillery"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land_ratio(terrain: &Terrain) -> f32 {
        let tiles: Vec<char> = terrain.tiles.iter().flat_map(|row| row.chars()).collect();
        let land = tiles.iter().filter(|tile| **tile != WATER).count();
        land as f32 / tiles.len().max(1) as f32
    }

    fn island() -> Terrain {
        Terrain::from_tiles(
            vec![
                "~~~~~".to_string(),
                "~..U~".to_string(),
                "~...~".to_string(),
                "~~~~~".to_string(),
            ],
            100.0,
        )
    }

    #[test]
    fn tiles_classify_land_water_and_urban() {
        let terrain = island();
        assert_eq!(terrain.width, 500.0);
        assert_eq!(terrain.height, 400.0);
        assert!(!terrain.is_land(Vec2 { x: 50.0, y: 50.0 }));
        assert!(terrain.is_land(Vec2 { x: 150.0, y: 150.0 }));
        assert!(terrain.is_urban(Vec2 { x: 350.0, y: 150.0 }));
        assert!(terrain.is_land(Vec2 { x: 350.0, y: 150.0 }));
        assert!(!terrain.is_land(Vec2 { x: -1.0, y: 150.0 }));
        assert!(!terrain.is_land(Vec2 { x: 150.0, y: 900.0 }));
    }

    #[test]
    fn sampled_points_are_on_land() {
        let terrain = island();
        let mut rng = Rng::new(12);
        for _ in 0..200 {
            let point = sample_land_point(&terrain, 500.0, 400.0, &mut rng, 150, |_| true)
                .expect("island has land");
            assert!(terrain.is_land(point));
        }
    }

    #[test]
    fn sampler_gives_up_when_nothing_is_acceptable() {
        let terrain = island();
        let mut rng = Rng::new(12);
        assert!(sample_land_point(&terrain, 500.0, 400.0, &mut rng, 150, |_| false).is_none());
    }

    #[test]
    fn generated_terrain_keeps_most_of_the_map_dry() {
        for seed in [1, 2, 3, 99, 4_242] {
            let terrain = generate_terrain(2_400.0, 1_600.0, seed);
            assert_eq!(terrain.tiles.len(), 40);
            assert!(terrain.tiles.iter().all(|row| row.len() == 60));
            assert!(land_ratio(&terrain) > 0.5, "seed {seed}");
        }
    }

    #[test]
    fn priority_zones_keep_minimum_spacing() {
        let terrain = Terrain::all_land(2_400.0, 1_600.0);
        let mut rng = Rng::new(5);
        let zones = generate_priority_zones(&terrain, 2_400.0, 1_600.0, &mut rng);
        assert_eq!(zones.len(), PRIORITY_ZONE_COUNT);
        for (idx, a) in zones.iter().enumerate() {
            for b in zones.iter().skip(idx + 1) {
                assert!(a.distance(*b) >= PRIORITY_ZONE_SPACING);
            }
        }
    }

    #[test]
    fn priority_zones_are_skipped_on_an_all_water_map() {
        let terrain = Terrain::from_tiles(vec!["~~~".to_string(); 3], 100.0);
        let mut rng = Rng::new(5);
        assert!(generate_priority_zones(&terrain, 300.0, 300.0, &mut rng).is_empty());
    }

    #[test]
    fn grid_layout_alternates_types_and_flags_action_assets() {
        let terrain = Terrain::all_land(1_200.0, 800.0);
        let mut rng = Rng::new(8);
        let nodes = generate_nodes(
            NodeLayout::Grid { cols: 6, rows: 5 },
            3,
            &terrain,
            1_200.0,
            800.0,
            &[],
            &mut rng,
        );
        assert_eq!(nodes.len(), 30);
        let investigations = nodes
            .iter()
            .filter(|node| node.node_type == NodeType::Investigation)
            .count();
        assert_eq!(investigations, 15);
        assert_eq!(nodes[0].id, "INT-0");
        assert_eq!(nodes[1].id, "ACT-1");
        let assets: Vec<_> = nodes.iter().filter(|node| node.is_asset).collect();
        assert_eq!(assets.len(), 3);
        assert!(assets.iter().all(|node| node.node_type == NodeType::Action));
    }

    #[test]
    fn grid_cell_without_land_falls_back_to_cell_center() {
        let terrain = Terrain::from_tiles(vec!["~~".to_string(); 2], 100.0);
        let mut rng = Rng::new(8);
        let nodes = generate_nodes(
            NodeLayout::Grid { cols: 2, rows: 1 },
            0,
            &terrain,
            200.0,
            200.0,
            &[],
            &mut rng,
        );
        assert_eq!(nodes[0].position, Vec2 { x: 50.0, y: 100.0 });
        assert_eq!(nodes[1].position, Vec2 { x: 150.0, y: 100.0 });
    }

    #[test]
    fn clustered_layout_names_cdn_nodes_first() {
        let terrain = Terrain::all_land(2_400.0, 1_600.0);
        let mut rng = Rng::new(21);
        let anchors = [Vec2 { x: 1_200.0, y: 800.0 }];
        let nodes = generate_nodes(
            NodeLayout::Clustered {
                count: 48,
                anchored: 7,
                spacing: 40.0,
            },
            0,
            &terrain,
            2_400.0,
            1_600.0,
            &anchors,
            &mut rng,
        );
        assert_eq!(nodes.len(), 48);
        assert_eq!(nodes[0].id, "Ribbon Bridge Status");
        assert_eq!(nodes[3].id, "Weather Status");
        assert_eq!(nodes[4].id, "Node_4");
        for node in nodes.iter().take(7) {
            let dist = node.position.distance(anchors[0]);
            assert!((80.0..=380.0).contains(&dist), "{} at {dist}", node.id);
        }
    }

    #[test]
    fn cdn_labels_cover_named_nodes_only() {
        assert_eq!(
            cdn_action_label("Ribbon Bridge Status", ActionCode::Suppress),
            Some("Deploy Bridge")
        );
        assert_eq!(cdn_action_label("Node_9", ActionCode::Suppress), None);
        assert!(!is_cdn_decision_node("Weather Status"));
    }
}
