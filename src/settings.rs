use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    archive::DEFAULT_LOAD_ORDER,
    logging::LogLevel,
    terrain::BakeOptions,
    texture::{ImageOptions, OutputImageFormat},
};

pub const HUMAN_MALE: &str = "Character\\Human\\Male\\HumanMale";
pub const HUMAN_FEMALE: &str = "Character\\Human\\Female\\HumanFemale";

/// Terrain block to extract and how to bake it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub map: String,
    pub center_x: i32,
    pub center_y: i32,
    /// 1 extracts 3×3 tiles, 2 extracts 5×5.
    pub radius: u32,
    pub image_format: OutputImageFormat,
    /// Output file name prefix.
    pub prefix: String,
    pub bake: BakeOptions,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            map: "Azeroth".to_string(),
            center_x: 32,
            center_y: 48,
            radius: 1,
            image_format: OutputImageFormat::Png,
            prefix: "northshire".to_string(),
            bake: BakeOptions::default(),
        }
    }
}

/// Building batch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingSettings {
    /// Buildings with more groups are skipped.
    pub max_groups: u32,
    /// Placements farther than this from the terrain centre on either
    /// horizontal axis are ignored.
    pub half_world: f64,
    /// Re-export buildings whose output already exists.
    pub force: bool,
}

impl Default for BuildingSettings {
    fn default() -> Self {
        Self {
            max_groups: 100,
            half_world: 800.0,
            force: false,
        }
    }
}

/// Persisted extraction settings shared by every CLI command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_level: LogLevel,
    /// Container names, lowest priority first.
    pub archive_load_order: Vec<String>,
    /// Model path (without extension) to the submesh ids to keep.
    pub geoset_filters: BTreeMap<String, Vec<u16>>,
    /// Model path (without extension) to body texture candidates, in order.
    pub default_textures: BTreeMap<String, Vec<String>>,
    /// Keep sequence variations other than the first.
    pub include_variations: bool,
    pub images: ImageOptions,
    pub terrain: TerrainSettings,
    pub buildings: BuildingSettings,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            output_dir: PathBuf::from("output"),
            log_level: LogLevel::Info,
            archive_load_order: DEFAULT_LOAD_ORDER.iter().map(|s| s.to_string()).collect(),
            geoset_filters: BTreeMap::from([(
                HUMAN_MALE.to_string(),
                vec![0, 3, 101, 201, 301, 401, 501, 702, 1301, 1501],
            )]),
            default_textures: BTreeMap::from([
                (
                    HUMAN_MALE.to_string(),
                    (0..3)
                        .map(|n| format!("Character\\Human\\Male\\HumanMaleSkin00_{n:02}.blp"))
                        .collect(),
                ),
                (
                    HUMAN_FEMALE.to_string(),
                    vec!["Character\\Human\\Female\\HumanFemaleSkin00_00.blp".to_string()],
                ),
            ]),
            include_variations: false,
            images: ImageOptions::default(),
            terrain: TerrainSettings::default(),
            buildings: BuildingSettings::default(),
        }
    }
}

/// Key used by the per-model tables: the virtual path without its extension.
pub fn model_key(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) if !path[dot..].contains('\\') && !path[dot..].contains('/') => &path[..dot],
        _ => path,
    }
}

impl ExtractSettings {
    pub fn geoset_filter(&self, model_path: &str) -> Option<&[u16]> {
        let key = model_key(model_path);
        self.geoset_filters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, ids)| ids.as_slice())
    }

    pub fn default_textures(&self, model_path: &str) -> &[String] {
        let key = model_key(model_path);
        self.default_textures
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, paths)| paths.as_slice())
            .unwrap_or_default()
    }
}

/// Save extraction settings to a JSON file.
pub fn save_settings(path: &Path, settings: &ExtractSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)
        .context("failed to serialize extraction settings as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save settings: {}", path.display()))?;
    Ok(())
}

/// Load extraction settings from a JSON file. Missing fields take defaults.
pub fn load_settings(path: &Path) -> Result<ExtractSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load settings: {}", path.display()))?;
    let settings: ExtractSettings =
        serde_json::from_str(&content).context("failed to parse settings JSON")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_default_settings_when_serialize_then_json_contains_terrain_center() {
        let settings = ExtractSettings::default();
        let json = serde_json::to_string(&settings).expect("serialize settings");
        assert!(json.contains("center_x"));
        assert!(json.contains("archive_load_order"));
    }

    #[test]
    fn given_partial_json_when_loading_then_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "terrain": { "radius": 2 }, "buildings": { "force": true } }"#)
            .expect("write");

        let settings = load_settings(&path).expect("load");

        assert_eq!(settings.terrain.radius, 2);
        assert_eq!(settings.terrain.map, "Azeroth");
        assert!(settings.buildings.force);
        assert_eq!(settings.buildings.max_groups, 100);
        assert_eq!(settings.archive_load_order.len(), 12);
    }

    #[test]
    fn given_saved_settings_when_loading_then_values_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let mut settings = ExtractSettings::default();
        settings.terrain.prefix = "goldshire".to_string();

        save_settings(&path, &settings).expect("save");
        let loaded = load_settings(&path).expect("load");

        assert_eq!(loaded, settings);
    }

    #[test]
    fn given_human_male_path_when_looking_up_tables_then_case_insensitive_match_is_found() {
        let settings = ExtractSettings::default();

        let filter = settings
            .geoset_filter("character\\human\\male\\humanmale.m2")
            .expect("filter");

        assert!(filter.contains(&1301));
        assert_eq!(settings.default_textures("Character\\Human\\Male\\HumanMale.M2").len(), 3);
        assert!(settings.default_textures("Creature\\Wolf\\Wolf.m2").is_empty());
    }
}
