//! Doodad and building placement lists relative to the terrain centre.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{AdtTile, MAP_OFFSET};

/// Yaw offset between placement records and the output frame, in degrees.
const YAW_OFFSET: f64 = 90.0;

const CLASSES: [(&str, &[&str]); 4] = [
    (
        "vegetation",
        &[
            "tree", "bush", "fern", "shrub", "plant", "flower", "vine", "ivy", "grass", "weed",
            "canopy", "leaves",
        ],
    ),
    ("rock", &["rock", "stone", "boulder", "cliff"]),
    (
        "prop",
        &[
            "fence", "post", "sign", "lamp", "torch", "banner", "flag", "lantern", "brazier",
        ],
    ),
    (
        "container",
        &["barrel", "crate", "box", "chest", "wagon", "cart", "sack", "bag"],
    ),
];

/// Visual category of a doodad model path, by keyword.
pub fn classify_doodad(model: &str) -> &'static str {
    let model = model.to_lowercase();
    CLASSES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| model.contains(keyword)))
        .map_or("misc", |(class, _)| *class)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoodadEntry {
    pub id: u32,
    pub model: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub scale: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingEntry {
    pub id: u32,
    pub model: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub scale: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSet {
    pub doodads: Vec<DoodadEntry>,
    pub wmos: Vec<BuildingEntry>,
    pub total_doodads: usize,
    pub total_wmos: usize,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn model_key(path: &str) -> String {
    path.to_lowercase().replace('\\', "/")
}

/// Maps record coordinates into the frame centred on the reference cell.
struct Frame {
    offset_x: f64,
    offset_z: f64,
    center_height: f64,
}

impl Frame {
    fn position(&self, p: [f32; 3]) -> (f64, f64, f64) {
        (
            round_to(self.offset_x + p[0] as f64, 2),
            round_to(p[1] as f64 - self.center_height, 2),
            round_to(self.offset_z + p[2] as f64, 2),
        )
    }

    fn rotation(r: [f32; 3]) -> (f64, f64, f64) {
        (
            round_to(r[2] as f64, 2),
            round_to(r[1] as f64 - YAW_OFFSET, 2),
            round_to(r[0] as f64, 2),
        )
    }
}

/// Collect placements from every tile, keeping the first occurrence of each
/// unique id. Doodads and buildings share one id set, doodads first per tile.
///
/// # Arguments
///
/// * `tiles` - Decoded tiles in extraction order.
/// * `center` - Position of the terrain reference cell.
/// * `center_height` - Height at the heightmap midpoint.
pub fn collect_placements(
    tiles: &[((i32, i32), AdtTile)],
    center: [f32; 3],
    center_height: f32,
) -> PlacementSet {
    let frame = Frame {
        offset_x: center[1] as f64 - MAP_OFFSET,
        offset_z: center[0] as f64 - MAP_OFFSET,
        center_height: center_height as f64,
    };
    let mut seen = HashSet::new();
    let mut set = PlacementSet::default();

    for (_, tile) in tiles {
        for doodad in &tile.doodads {
            if !seen.insert(doodad.unique_id) {
                continue;
            }
            let (x, y, z) = frame.position(doodad.position);
            let (rot_x, rot_y, rot_z) = Frame::rotation(doodad.rotation);
            let model = model_key(&doodad.model);
            set.doodads.push(DoodadEntry {
                id: doodad.unique_id,
                kind: classify_doodad(&model).to_string(),
                model,
                x,
                y,
                z,
                rot_x,
                rot_y,
                rot_z,
                scale: round_to(doodad.scale as f64 / 1024.0, 3),
            });
        }

        for building in &tile.buildings {
            if !seen.insert(building.unique_id) {
                continue;
            }
            let (x, y, z) = frame.position(building.position);
            let (rot_x, rot_y, rot_z) = Frame::rotation(building.rotation);
            let size = |axis: usize| {
                round_to(
                    (building.extents_max[axis] as f64 - building.extents_min[axis] as f64).abs(),
                    2,
                )
            };
            let scale = if building.scale > 0 {
                building.scale as f64 / 1024.0
            } else {
                1.0
            };
            set.wmos.push(BuildingEntry {
                id: building.unique_id,
                model: model_key(&building.model),
                x,
                y,
                z,
                rot_x,
                rot_y,
                rot_z,
                scale: round_to(scale, 3),
                size_x: size(0),
                size_y: size(1),
                size_z: size(2),
            });
        }
    }

    set.total_doodads = set.doodads.len();
    set.total_wmos = set.wmos.len();
    set
}
