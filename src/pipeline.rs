//! Batch driver: opens the archive pool once, converts assets one at a time
//! and writes every output only after its asset encoded completely.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use image::RgbaImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    archive::ArchivePool,
    error::{DecodeError, ExtractError},
    gltf_export::encode_glb,
    logging::ResultExt,
    m2::{AnimationSources, M2File, M2Skin},
    scene::{
        EmbeddedImage, SceneModel,
        animation::retained_sequences,
        building::{CollisionMesh, build_building, extract_collision, rendered_materials},
        model::{CharacterOptions, ModelParts, build_character, build_doodad},
    },
    settings::{ExtractSettings, model_key},
    terrain::{
        self, AdtTile, HeightGrid, PlacementSet, TerrainBaker, TileRange, Wdt, analyze_positions,
        cell_samples, collect_placements,
    },
    texture::{DefaultCodec, ImageCodec, TextureCache, embed_image, texture_path_candidates},
    wmo::{WmoGroup, WmoRoot},
};

pub const MANIFEST_FILE: &str = "doodad_manifest.json";
pub const COLLISION_FILE: &str = "collision_data.json";
pub const DOODAD_DIR: &str = "doodads";
pub const BUILDING_DIR: &str = "wmos";

// ─── Context ──────────────────────────────────────────────────────────────────

/// State shared by every asset of a batch: the open containers, the image
/// codec and the decoded texture cache.
pub struct ExtractContext {
    pool: ArchivePool,
    codec: Box<dyn ImageCodec>,
    textures: TextureCache,
    settings: ExtractSettings,
}

impl ExtractContext {
    pub fn new(pool: ArchivePool, settings: ExtractSettings) -> Self {
        Self {
            pool,
            codec: Box::new(DefaultCodec),
            textures: TextureCache::new(),
            settings,
        }
    }

    /// Open the containers named by the settings' load order.
    pub fn open(settings: ExtractSettings) -> Result<Self> {
        let pool = ArchivePool::open(&settings.data_dir, &settings.archive_load_order)
            .with_context(|| {
                format!("failed to open containers under {}", settings.data_dir.display())
            })?;
        info!("opened {} containers", pool.len());
        Ok(Self::new(pool, settings))
    }

    pub fn with_codec(mut self, codec: Box<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &ExtractSettings {
        &self.settings
    }

    pub fn pool(&self) -> &ArchivePool {
        &self.pool
    }

    /// Release the containers. Further reads find nothing.
    pub fn close(&mut self) {
        self.pool.close_all();
    }

    fn read_required(&self, path: &str) -> Result<Vec<u8>, ExtractError> {
        self.pool.try_read(path).ok_or_else(|| ExtractError::NotFound {
            path: path.to_string(),
        })
    }

    fn load_texture(&mut self, path: &str) -> Option<Arc<RgbaImage>> {
        self.textures
            .fetch(&self.pool, self.codec.as_ref(), &texture_path_candidates(path))
    }

    fn embed(&mut self, path: &str) -> Option<EmbeddedImage> {
        let image = self.load_texture(path)?;
        embed_image(self.codec.as_ref(), &image, &self.settings.images)
    }
}

// ─── Outputs ──────────────────────────────────────────────────────────────────

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub glb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<usize>,
}

/// Index of extracted doodad and building containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    #[serde(default)]
    pub models: BTreeMap<String, ManifestEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_extracted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_failed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmos: Option<BTreeMap<String, ManifestEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wmo_extracted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wmo_skipped: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wmo_failed: Option<usize>,
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Write `bytes` next to `path` under a `.tmp` name and return that name.
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let staging = staging_path(path);
    fs::write(&staging, bytes)
        .with_context(|| format!("failed to write output: {}", staging.display()))?;
    Ok(staging)
}

/// Write `bytes` to `path` through a temporary sibling so a failed write
/// never leaves a partial file under the final name.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let staging = stage(path, bytes)?;
    fs::rename(&staging, path)
        .with_context(|| format!("failed to move output into place: {}", path.display()))?;
    debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    write_output(path, &json_bytes(path, value)?)
}

fn json_bytes(path: &Path, value: &impl Serialize) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))
}

/// Files of one output unit. [`OutputSet::commit`] writes all of them or,
/// on failure, removes whatever it already wrote.
#[derive(Debug, Default)]
struct OutputSet {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl OutputSet {
    fn add(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.files.push((path, bytes));
    }

    fn add_json(&mut self, path: PathBuf, value: &impl Serialize) -> Result<()> {
        let bytes = json_bytes(&path, value)?;
        self.add(path, bytes);
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let mut staged = Vec::with_capacity(self.files.len());
        for (path, bytes) in &self.files {
            match stage(path, bytes) {
                Ok(staging) => staged.push(staging),
                Err(err) => {
                    for staging in &staged {
                        discard(staging);
                    }
                    discard(&staging_path(path));
                    return Err(err);
                }
            }
        }

        for (index, (path, _)) in self.files.iter().enumerate() {
            if let Err(err) = fs::rename(&staged[index], path) {
                for (done, _) in &self.files[..index] {
                    discard(done);
                }
                for staging in &staged[index..] {
                    discard(staging);
                }
                return Err(err).with_context(|| {
                    format!("failed to move output into place: {}", path.display())
                });
            }
            debug!("wrote {}", path.display());
        }
        Ok(())
    }
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!("failed to remove {}: {err}", path.display());
    }
}

fn read_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load a placement list written by [`extract_terrain`].
pub fn load_placements(path: &Path) -> Result<PlacementSet> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load placements: {}", path.display()))?;
    serde_json::from_str(&content).context("failed to parse placement JSON")
}

/// Last path component of a virtual path with either separator.
fn base_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Output file name for an asset: lowercased base name with the extension
/// replaced by `.glb`.
fn glb_name(path: &str) -> String {
    let base = base_name(path).to_lowercase();
    match base.rfind('.') {
        Some(dot) => format!("{}.glb", &base[..dot]),
        None => format!("{base}.glb"),
    }
}

/// Reserve `name`, appending `_2`, `_3`, ... to its stem while it is taken.
fn reserve_name(taken: &mut HashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, extension) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 2;
    loop {
        let candidate = if extension.is_empty() {
            format!("{stem}_{n}")
        } else {
            format!("{stem}_{n}.{extension}")
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Archive spelling of a placement model path, with the `.m2` extension.
fn m2_archive_path(model: &str) -> String {
    let native = model.replace('/', "\\");
    if native.to_ascii_lowercase().ends_with(".m2") {
        native
    } else {
        format!("{native}.m2")
    }
}

/// First skin partition of a model.
pub fn skin_path(model_path: &str) -> String {
    format!("{}00.skin", model_key(model_path))
}

// ─── Models ───────────────────────────────────────────────────────────────────

fn decoded<T>(path: &str, result: Result<T, DecodeError>) -> Result<T, ExtractError> {
    result.map_err(|err| ExtractError::decode(path, err))
}

fn character_scene(ctx: &mut ExtractContext, model_path: &str) -> Result<SceneModel, ExtractError> {
    let model_bytes = ctx.read_required(model_path)?;
    let model = decoded(model_path, M2File::parse(&model_bytes))?;
    let skin_path = skin_path(model_path);
    let skin_bytes = ctx.read_required(&skin_path)?;
    let skin = decoded(&skin_path, M2Skin::parse(&skin_bytes))?;
    let vertices = decoded(model_path, model.vertices())?;
    let textures = decoded(model_path, model.textures())?;
    let sequences = model.sequences().unwrap_or_else(|err| {
        warn!("{model_path}: ignoring sequence table: {err}");
        Vec::new()
    });

    let include_variations = ctx.settings.include_variations;
    let mut external = Vec::new();
    for index in retained_sequences(&sequences, include_variations) {
        let sequence = &sequences[index];
        if sequence.is_embedded() || sequence.is_alias() {
            continue;
        }
        let path = sequence.anim_file_path(model_path);
        match ctx.pool.try_read(&path) {
            Some(bytes) => external.push((index, bytes)),
            None => debug!("{path} not found, sequence {index} keeps rest pose"),
        }
    }
    let sources = external.iter().fold(
        AnimationSources::for_sequences(&model_bytes, &sequences),
        |sources, (index, bytes)| sources.with_external(*index, bytes),
    );
    let bones = decoded(model_path, model.bones(&sources))?;

    let candidates = ctx.settings.default_textures(model_path).to_vec();
    let mut body_texture = candidates.iter().find_map(|path| ctx.embed(path));
    if body_texture.is_none() {
        body_texture = textures
            .iter()
            .filter(|texture| texture.kind == 0)
            .find_map(|texture| texture.filename())
            .and_then(|path| ctx.embed(path));
    }
    let geoset_filter = ctx
        .settings
        .geoset_filter(model_path)
        .map(|ids| ids.iter().copied().collect::<HashSet<_>>());

    let name = model_key(base_name(model_path));
    build_character(
        ModelParts {
            name,
            vertices: &vertices,
            skin: &skin,
        },
        &bones,
        &sequences,
        CharacterOptions {
            geoset_filter,
            body_texture,
            include_variations,
        },
    )
}

/// Convert one character or creature model into `<name>.glb`.
///
/// # Arguments
///
/// * `ctx` - Batch context holding the containers.
/// * `model_path` - Virtual path of the `.m2` file.
/// * `output_dir` - Directory receiving the container.
///
/// # Returns
///
/// Path of the written container.
pub fn extract_model(ctx: &mut ExtractContext, model_path: &str, output_dir: &Path) -> Result<PathBuf> {
    let scene = character_scene(ctx, model_path)
        .with_context(|| format!("failed to convert model {model_path}"))?;
    let bytes = encode_glb(&scene).context("failed to encode model container")?;
    let output = output_dir.join(format!("{}.glb", scene.name));
    write_output(&output, &bytes)?;
    info!("{model_path} -> {} ({} KB)", output.display(), bytes.len() / 1024);
    Ok(output)
}

fn doodad_scene(ctx: &mut ExtractContext, model_path: &str) -> Result<SceneModel, ExtractError> {
    let model_bytes = ctx.read_required(model_path)?;
    let model = decoded(model_path, M2File::parse(&model_bytes))?;
    let skin_path = skin_path(model_path);
    let skin_bytes = ctx.read_required(&skin_path)?;
    let skin = decoded(&skin_path, M2Skin::parse(&skin_bytes))?;
    let vertices = decoded(model_path, model.vertices())?;
    let textures = decoded(model_path, model.textures())?;
    let combos = decoded(model_path, model.texture_combos())?;

    let referenced: HashSet<u16> = skin
        .submesh_textures(&combos)
        .into_values()
        .flatten()
        .collect();
    let mut images = BTreeMap::new();
    for index in referenced {
        let Some(path) = textures.get(index as usize).and_then(|t| t.filename()) else {
            continue;
        };
        if let Some(image) = ctx.embed(path) {
            images.insert(index, image);
        }
    }

    build_doodad(
        ModelParts {
            name: base_name(model_path),
            vertices: &vertices,
            skin: &skin,
        },
        &combos,
        images,
    )
}

/// Convert every distinct doodad model of a placement list into
/// `doodads/<name>.glb` and write a fresh manifest.
///
/// Models are processed by descending instance count. Models missing from
/// every container count as skipped, undecodable ones as failed.
pub fn extract_doodads(
    ctx: &mut ExtractContext,
    placements: &PlacementSet,
    output_dir: &Path,
) -> Result<BatchSummary> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in &placements.doodads {
        *counts.entry(entry.model.as_str()).or_default() += 1;
    }
    let mut models: Vec<(&str, usize)> = counts.into_iter().collect();
    models.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    info!(
        "{} unique doodad models ({} instances)",
        models.len(),
        placements.doodads.len()
    );

    let mut summary = BatchSummary::default();
    let mut manifest = AssetManifest::default();
    let mut taken = HashSet::new();

    for (index, (model, instances)) in models.iter().enumerate() {
        let file_name = reserve_name(&mut taken, &glb_name(model));
        let archive_path = m2_archive_path(model);
        debug!("[{}/{}] {archive_path}", index + 1, models.len());

        let encoded = doodad_scene(ctx, &archive_path)
            .and_then(|scene| encode_glb(&scene))
            .log_failure(&format!("doodad {model}"));
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(ExtractError::NotFound { .. }) => {
                summary.skipped += 1;
                continue;
            }
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };
        write_output(&output_dir.join(DOODAD_DIR).join(&file_name), &bytes)?;
        manifest.models.insert(
            model.to_string(),
            ManifestEntry {
                glb: format!("{DOODAD_DIR}/{file_name}"),
                instances: Some(*instances),
            },
        );
        summary.extracted += 1;
    }

    manifest.total_extracted = Some(summary.extracted);
    manifest.total_failed = Some(summary.failed);
    write_json(&output_dir.join(MANIFEST_FILE), &manifest)?;
    info!(
        "doodads: {} extracted, {} skipped, {} failed",
        summary.extracted, summary.skipped, summary.failed
    );
    Ok(summary)
}

// ─── Buildings ────────────────────────────────────────────────────────────────

enum BuildingOutcome {
    /// The scene is `None` when only collision was requested.
    Converted(Option<Box<SceneModel>>, CollisionMesh),
    TooLarge(u32),
}

fn load_building(
    ctx: &mut ExtractContext,
    root_path: &str,
    with_scene: bool,
) -> Result<BuildingOutcome, ExtractError> {
    let root_bytes = ctx.read_required(root_path)?;
    let root = decoded(root_path, WmoRoot::parse(&root_bytes))?;
    let group_count = root.header.group_count;
    if group_count == 0 {
        return Err(ExtractError::EmptyModel {
            name: root_path.to_string(),
        });
    }
    if group_count > ctx.settings.buildings.max_groups {
        return Ok(BuildingOutcome::TooLarge(group_count));
    }

    let mut groups = Vec::new();
    for index in 0..group_count as usize {
        let group_path = WmoRoot::group_path(root_path, index);
        let Some(bytes) = ctx.pool.try_read(&group_path) else {
            debug!("{group_path} not found, skipping group");
            continue;
        };
        groups.push(decoded(&group_path, WmoGroup::parse(&bytes))?);
    }
    let collision = extract_collision(&groups);
    if !with_scene {
        return Ok(BuildingOutcome::Converted(None, collision));
    }

    let mut textures = BTreeMap::new();
    for material in rendered_materials(&groups) {
        let Some(path) = root
            .materials
            .get(material as usize)
            .map(|m| m.texture_path.clone())
            .filter(|path| !path.is_empty())
        else {
            continue;
        };
        if let Some(image) = ctx.embed(&path) {
            textures.insert(material, image);
        }
    }
    let scene = build_building(base_name(root_path), &groups, textures)?;
    Ok(BuildingOutcome::Converted(Some(Box::new(scene)), collision))
}

/// Convert the buildings of a placement list into `wmos/<name>.glb`, adding
/// a `wmos` section to the existing manifest and collision meshes to
/// `collision_data.json`.
///
/// Placements farther than `half_world` from the centre are ignored.
/// Existing containers are kept unless `force` is set.
pub fn extract_buildings(
    ctx: &mut ExtractContext,
    placements: &PlacementSet,
    output_dir: &Path,
) -> Result<BatchSummary> {
    let limits = ctx.settings.buildings.clone();
    let mut models: Vec<&str> = placements
        .wmos
        .iter()
        .filter(|entry| entry.x.abs() <= limits.half_world && entry.z.abs() <= limits.half_world)
        .map(|entry| entry.model.as_str())
        .collect();
    models.sort_unstable();
    models.dedup();
    info!("{} unique building models in range", models.len());

    let manifest_path = output_dir.join(MANIFEST_FILE);
    let collision_path = output_dir.join(COLLISION_FILE);
    let mut manifest: AssetManifest = read_json_or_default(&manifest_path)?;
    let mut collision: BTreeMap<String, CollisionMesh> = read_json_or_default(&collision_path)?;
    let mut entries = manifest.wmos.take().unwrap_or_default();
    let mut summary = BatchSummary::default();

    for (index, model) in models.iter().enumerate() {
        let file_name = glb_name(model);
        let output = output_dir.join(BUILDING_DIR).join(&file_name);
        let entry = ManifestEntry {
            glb: format!("{BUILDING_DIR}/{file_name}"),
            instances: None,
        };
        let archive_path = model.replace('/', "\\");
        debug!("[{}/{}] {archive_path}", index + 1, models.len());

        if !limits.force && output.exists() {
            entries.insert(model.to_string(), entry);
            summary.skipped += 1;
            if !collision.contains_key(*model)
                && let Ok(BuildingOutcome::Converted(_, mesh)) =
                    load_building(ctx, &archive_path, false)
                && !mesh.is_empty()
            {
                collision.insert(model.to_string(), mesh);
            }
            continue;
        }

        let outcome = load_building(ctx, &archive_path, true)
            .and_then(|outcome| match outcome {
                BuildingOutcome::Converted(Some(scene), mesh) => {
                    encode_glb(&scene).map(|bytes| Some((bytes, mesh)))
                }
                BuildingOutcome::Converted(None, _) => Ok(None),
                BuildingOutcome::TooLarge(groups) => {
                    info!("skipping {model}: {groups} groups");
                    Ok(None)
                }
            })
            .log_failure(&format!("building {model}"));
        match outcome {
            Ok(Some((bytes, mesh))) => {
                write_output(&output, &bytes)?;
                entries.insert(model.to_string(), entry);
                if !mesh.is_empty() {
                    collision.insert(model.to_string(), mesh);
                }
                summary.extracted += 1;
            }
            Ok(None) | Err(ExtractError::NotFound { .. }) => summary.skipped += 1,
            Err(_) => summary.failed += 1,
        }
    }

    manifest.wmos = Some(entries);
    manifest.total_wmo_extracted = Some(summary.extracted);
    manifest.total_wmo_skipped = Some(summary.skipped);
    manifest.total_wmo_failed = Some(summary.failed);
    write_json(&manifest_path, &manifest)?;
    let compact = serde_json::to_vec(&collision).context("failed to serialize collision data")?;
    write_output(&collision_path, &compact)?;
    info!(
        "buildings: {} extracted, {} skipped, {} failed",
        summary.extracted, summary.skipped, summary.failed
    );
    Ok(summary)
}

// ─── Terrain ──────────────────────────────────────────────────────────────────

/// What a terrain run produced.
#[derive(Debug, Clone, Default)]
pub struct TerrainReport {
    pub tiles_loaded: usize,
    pub textures_written: usize,
    pub heightmap: PathBuf,
    pub placements: PlacementSet,
}

/// Decode the tiles around the configured centre and write the heightmap,
/// its metadata, one baked texture per tile and the placement list.
pub fn extract_terrain(ctx: &mut ExtractContext, output_dir: &Path) -> Result<TerrainReport> {
    let options = ctx.settings.terrain.clone();
    let wdt_path = terrain::wdt_path(&options.map);
    let wdt_bytes = ctx
        .read_required(&wdt_path)
        .with_context(|| format!("map {} has no directory", options.map))?;
    let wdt = Wdt::parse(&wdt_bytes)
        .map_err(|err| ExtractError::decode(&wdt_path, err))
        .context("failed to decode map directory")?;
    let range = TileRange::around(options.center_x, options.center_y, options.radius);
    info!(
        "{}: {}x{} tiles from ({}, {}), {} present in map",
        options.map,
        range.count_x,
        range.count_y,
        range.start_x,
        range.start_y,
        wdt.tile_count()
    );

    let mut tiles: Vec<((i32, i32), AdtTile)> = Vec::new();
    for (x, y) in range.tiles() {
        if !wdt.has_tile(x, y) {
            debug!("tile ({x}, {y}) not in map");
            continue;
        }
        let path = terrain::adt_path(&options.map, x, y);
        let Some(bytes) = ctx.pool.try_read(&path) else {
            warn!("{path} listed in map but not found");
            continue;
        };
        match AdtTile::parse(&bytes) {
            Ok(tile) => tiles.push(((x, y), tile)),
            Err(err) => warn!("failed to decode {path}: {err}"),
        }
    }
    if tiles.is_empty() {
        bail!("no terrain tiles could be loaded around ({}, {})", options.center_x, options.center_y);
    }

    let analysis = analyze_positions(&cell_samples(&tiles));
    let grid = HeightGrid::assemble(&range, &tiles, analysis.as_ref().map(|a| a.height_index));
    let center_tile = (options.center_x, options.center_y);
    let center = tiles
        .iter()
        .find(|(coords, _)| *coords == center_tile)
        .and_then(|(_, tile)| terrain::reference_position(tile))
        .unwrap_or([0.0; 3]);

    let mut outputs = OutputSet::default();
    let heightmap = output_dir.join(format!("{}_heightmap.bin", options.prefix));
    outputs.add(heightmap.clone(), grid.to_le_bytes());
    let meta = terrain::terrain_meta(&grid, &range, center_tile, center, analysis.as_ref());
    outputs.add_json(output_dir.join(format!("{}_meta.json", options.prefix)), &meta)?;

    let mut baker = TerrainBaker::new(options.bake);
    let big_alpha = wdt.has_big_alpha();
    let mut textures_written = 0;
    for (index, coords) in range.tiles().into_iter().enumerate() {
        let Some((_, tile)) = tiles.iter().find(|(c, _)| *c == coords) else {
            continue;
        };
        let image = baker.bake(tile, big_alpha, |name| {
            ctx.textures
                .fetch(&ctx.pool, ctx.codec.as_ref(), &texture_path_candidates(name))
        });
        let encoded = ctx
            .codec
            .encode_rgb(&image, options.image_format)
            .log_failure(&format!("tile {coords:?} texture"));
        let Ok(bytes) = encoded else {
            continue;
        };
        let path = output_dir.join(format!(
            "{}_tex_{index}.{}",
            options.prefix,
            options.image_format.extension()
        ));
        outputs.add(path, bytes);
        textures_written += 1;
    }

    let placements = collect_placements(&tiles, center, grid.center_height());
    outputs.add_json(output_dir.join(format!("{}_doodads.json", options.prefix)), &placements)?;
    outputs.commit().context("failed to write terrain outputs")?;
    info!(
        "terrain: {} tiles, {}x{} heights, {} doodads, {} buildings",
        tiles.len(),
        grid.width,
        grid.height,
        placements.total_doodads,
        placements.total_wmos
    );

    Ok(TerrainReport {
        tiles_loaded: tiles.len(),
        textures_written,
        heightmap,
        placements,
    })
}
