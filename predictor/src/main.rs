use std::path::PathBuf;

use clap::{Parser, Subcommand};
use predictor::{
    PredictionService, PredictorConfig,
    models::GeoPoint,
    store::{InMemoryShapeStore, InMemoryTelemetryStore, ShapeFile, TrackFile},
};
use shared::{
    PositionPredictionRequest, TimePredictionByCoordinatesRequest,
    TimePredictionByDistanceRequest,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Predict vehicle positions and arrival times along a route shape"
)]
struct Args {
    /// JSON file with the route shape vertices
    #[arg(long)]
    shape: PathBuf,

    /// JSON file with the vehicle's GPS fixes
    #[arg(long)]
    track: PathBuf,

    /// Max distance, in degrees, between a fix and the route
    #[arg(long)]
    max_distance: Option<f64>,

    /// Nearest vertices considered when projecting onto the route
    #[arg(long)]
    neighbors: Option<usize>,

    /// Index of the first fix used for the speed estimate
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    first_index: isize,

    /// Index of the last fix used for the speed estimate, negative counts from the end
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    last_index: isize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Position of the vehicle some seconds after its last fix
    Position {
        #[arg(long)]
        seconds: u32,
    },
    /// Arrival time at a cumulative distance along the shape
    ArrivalDistance {
        #[arg(long)]
        distance: f64,
    },
    /// Arrival time at the route point nearest to a location
    ArrivalCoords {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Last known position and route length
    Details,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "predictor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = PredictorConfig::from_env()?;
    if let Some(max_distance) = args.max_distance {
        config.max_projection_distance = max_distance;
    }
    if let Some(neighbors) = args.neighbors {
        config.neighbor_count = neighbors;
    }

    let shape = ShapeFile::read_from_path(&args.shape)?;
    let track = TrackFile::read_from_path(&args.track)?;
    tracing::info!(
        "loaded shape {} ({} points) and {} fixes for {}",
        shape.shape_id,
        shape.points.len(),
        track.fixes.len(),
        track.vehicle_id
    );
    let shape_id = shape.shape_id;
    let vehicle_id = track.vehicle_id.clone();

    let service = PredictionService::new(
        InMemoryShapeStore::from_files([shape]),
        InMemoryTelemetryStore::from_files([track]),
        config,
    );

    let output = match args.command {
        Command::Position { seconds } => {
            serde_json::to_string_pretty(&service.predict_position(&PositionPredictionRequest {
                vehicle_id,
                shape_id,
                prediction_time_seconds: seconds,
                first_index: args.first_index,
                last_index: args.last_index,
            })?)?
        }
        Command::ArrivalDistance { distance } => serde_json::to_string_pretty(
            &service.predict_arrival_by_distance(&TimePredictionByDistanceRequest {
                vehicle_id,
                shape_id,
                target_distance_traveled: distance,
                first_index: args.first_index,
                last_index: args.last_index,
            })?,
        )?,
        Command::ArrivalCoords { lat, lon } => serde_json::to_string_pretty(
            &service.predict_arrival_by_coordinates(&TimePredictionByCoordinatesRequest {
                vehicle_id,
                shape_id,
                target_location: GeoPoint::new(lat, lon),
                first_index: args.first_index,
                last_index: args.last_index,
            })?,
        )?,
        Command::Details => {
            serde_json::to_string_pretty(&service.vehicle_details(&vehicle_id, shape_id)?)?
        }
    };
    println!("{output}");

    Ok(())
}
