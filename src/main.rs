use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use land_router::geo::tile_key_for;
use land_router::{
    Coord, EdgeSpec, Profile, RoadClass, RouteStatus, Router, RouterOptions, TileStore,
    TileWriter, ACCESS_CAR, ACCESS_FOOT,
};

#[derive(Parser)]
#[command(name = "land-router")]
#[command(about = "Tile-based road routing over a SQLite tile store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the demo tile (a three-node residential chain) into a tile database
    Generate {
        /// Tile database to create or update
        db: PathBuf,
    },
    /// Find a route between two coordinates
    Route {
        /// Tile database
        db: PathBuf,
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
        /// Intermediate waypoints (lat,lon), in order
        #[arg(long = "via")]
        via: Vec<String>,
        /// Travel profile
        #[arg(long, value_enum, default_value_t = Profile::Car)]
        profile: Profile,
        /// Tile zoom level
        #[arg(long, default_value_t = 14)]
        zoom: u32,
        /// Tile cache capacity (0 disables caching)
        #[arg(long, default_value_t = 0)]
        cache: usize,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_coord(s: &str) -> Result<Coord> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("coordinate must be in format 'lat,lon': {}", s);
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok(Coord::new(lat, lon))
}

fn generate(db: &PathBuf) -> Result<()> {
    let base_lat = 47.0;
    let base_lon = 9.0;
    let z = 14;
    let (x, y) = tile_key_for(base_lat, base_lon, z);
    println!("Generating tile z={} x={} y={}", z, x, y);

    let mut writer = TileWriter::new(z, x, y);
    let a = writer.add_node(base_lat, base_lon);
    let b = writer.add_node(base_lat, base_lon + 0.001);
    let c = writer.add_node(base_lat, base_lon + 0.002);
    for (from, to) in [(a, b), (b, c)] {
        writer.add_edge(EdgeSpec {
            from_node: from,
            to_node: to,
            speed_mps: 13.9,
            foot_speed_mps: 1.4,
            oneway: false,
            road_class: RoadClass::Residential,
            access_mask: ACCESS_CAR | ACCESS_FOOT,
            shape: vec![],
        });
    }
    let blob = writer.finish()?;

    let mut store = TileStore::open(db, 0)?;
    store.insert(z, x, y, &blob)?;
    println!(
        "Created {} with 1 tile (z={} x={} y={})",
        db.display(),
        z,
        x,
        y
    );
    Ok(())
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Generate { db } => {
            generate(&db)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Route {
            db,
            from,
            to,
            via,
            profile,
            zoom,
            cache,
            json,
        } => {
            let mut waypoints = vec![parse_coord(&from)?];
            for coord in &via {
                waypoints.push(parse_coord(coord)?);
            }
            waypoints.push(parse_coord(&to)?);

            let options = RouterOptions {
                tile_zoom: zoom,
                tile_cache_capacity: cache,
            };
            let mut router = Router::new(&db, options)?;
            let result = router.route(profile, &waypoints);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(if result.status == RouteStatus::Ok {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                });
            }

            if result.status != RouteStatus::Ok {
                eprintln!("Route failed: {} {}", result.status, result.error_message);
                return Ok(ExitCode::from(2));
            }
            println!(
                "distance_m={:.2} duration_s={:.2} points={}",
                result.distance_m,
                result.duration_s,
                result.polyline.len()
            );
            for point in &result.polyline {
                println!("{:.6} {:.6}", point.lat, point.lon);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too; only real usage
            // mistakes exit nonzero.
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
