use std::{path::PathBuf, process};

use anyhow::Result;
use clap::{Parser, Subcommand};
use wow2gltf::{
    logging::{LogLevel, init_logging},
    pipeline::{
        ExtractContext, extract_buildings, extract_doodads, extract_model, extract_terrain,
        load_placements,
    },
    settings::{ExtractSettings, HUMAN_MALE, load_settings, save_settings},
};

#[derive(Parser, Debug)]
#[command(name = "wow2gltf")]
#[command(about = "Convert WoW 3.3.5a models, buildings and terrain to glTF")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings JSON; missing fields take defaults
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Game data directory holding the extracted containers
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log verbosity (RUST_LOG overrides)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one character or creature model
    Model {
        /// Virtual path of the .m2 file (default: the human male model)
        path: Option<String>,
        /// Keep every sequence variation
        #[arg(long)]
        variations: bool,
    },
    /// Decode terrain tiles around a centre tile
    Terrain {
        #[arg(long)]
        map: Option<String>,
        #[arg(long)]
        x: Option<i32>,
        #[arg(long)]
        y: Option<i32>,
        /// 1 extracts 3x3 tiles, 2 extracts 5x5
        #[arg(long)]
        radius: Option<u32>,
        /// Output file name prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Convert the doodads listed in a placement file
    Doodads {
        /// Placement JSON written by the terrain command
        placements: PathBuf,
    },
    /// Convert the buildings listed in a placement file
    Buildings {
        /// Placement JSON written by the terrain command
        placements: PathBuf,
        /// Re-export buildings whose container already exists
        #[arg(long)]
        force: bool,
    },
    /// Write the effective settings to a JSON file
    InitSettings {
        #[arg(default_value = "wow2gltf.json")]
        path: PathBuf,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => ExtractSettings::default(),
    };
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    if let Some(dir) = args.output {
        settings.output_dir = dir;
    }
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    init_logging(settings.log_level);

    match &args.command {
        Command::InitSettings { path } => {
            save_settings(path, &settings)?;
            println!("Settings written to {}", path.display());
            return Ok(());
        }
        Command::Model {
            variations: true, ..
        } => settings.include_variations = true,
        Command::Terrain {
            map,
            x,
            y,
            radius,
            prefix,
        } => {
            let terrain = &mut settings.terrain;
            if let Some(map) = map {
                terrain.map = map.clone();
            }
            terrain.center_x = x.unwrap_or(terrain.center_x);
            terrain.center_y = y.unwrap_or(terrain.center_y);
            terrain.radius = radius.unwrap_or(terrain.radius);
            if let Some(prefix) = prefix {
                terrain.prefix = prefix.clone();
            }
        }
        Command::Buildings { force: true, .. } => settings.buildings.force = true,
        _ => {}
    }

    let output_dir = settings.output_dir.clone();
    let mut ctx = ExtractContext::open(settings)?;

    match args.command {
        Command::Model { path, .. } => {
            let path = path.unwrap_or_else(|| format!("{HUMAN_MALE}.m2"));
            let output = extract_model(&mut ctx, &path, &output_dir)?;
            println!("Model: {}", output.display());
        }
        Command::Terrain { .. } => {
            let report = extract_terrain(&mut ctx, &output_dir)?;
            println!("Tiles: {}", report.tiles_loaded);
            println!("Textures: {}", report.textures_written);
            println!("Heightmap: {}", report.heightmap.display());
            println!(
                "Placements: {} doodads, {} buildings",
                report.placements.total_doodads, report.placements.total_wmos
            );
        }
        Command::Doodads { placements } => {
            let placements = load_placements(&placements)?;
            let summary = extract_doodads(&mut ctx, &placements, &output_dir)?;
            println!(
                "Doodads: {} extracted, {} skipped, {} failed",
                summary.extracted, summary.skipped, summary.failed
            );
        }
        Command::Buildings { placements, .. } => {
            let placements = load_placements(&placements)?;
            let summary = extract_buildings(&mut ctx, &placements, &output_dir)?;
            println!(
                "Buildings: {} extracted, {} skipped, {} failed",
                summary.extracted, summary.skipped, summary.failed
            );
        }
        Command::InitSettings { .. } => {}
    }

    ctx.close();
    Ok(())
}
