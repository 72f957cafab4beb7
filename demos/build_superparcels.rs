use clap::Parser;
use geo_superparcel::geojson_io::{parse_feature_collection, read_parcels, write_superparcels};
use geo_superparcel::{plan_work_items, run_batch, SuperParcelConfig};
use geojson::GeoJson;
use log::info;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input GeoJSON FeatureCollection of parcel polygons
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory, one GeoJSON file per work unit
    #[arg(short, long)]
    output: PathBuf,

    /// Property holding the owner name
    #[arg(long, default_value = "OWNER")]
    owner_field: String,

    /// Property holding the region code
    #[arg(long, default_value = "FIPS")]
    region_field: String,

    /// JSON configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Distance threshold(s), overriding the configuration
    #[arg(short, long)]
    threshold: Vec<f64>,

    /// Minimum parcels per super-parcel, overriding the configuration
    #[arg(long)]
    min_samples: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SuperParcelConfig::from_json_str(&fs::read_to_string(path)?)?,
        None => SuperParcelConfig::default(),
    };
    if !args.threshold.is_empty() {
        config = config.with_thresholds(args.threshold.clone());
    }
    if let Some(m) = args.min_samples {
        config = config.with_min_samples(m);
    }
    config.validate()?;

    info!("Reading parcels from {:?}", args.input);
    let fc = parse_feature_collection(&fs::read_to_string(&args.input)?)?;
    let parcels = read_parcels(&fc, &args.owner_field, &args.region_field)?;

    fs::create_dir_all(&args.output)?;
    let items = plan_work_items(&parcels, &config);

    let mut write_errors = 0;
    let summary = run_batch(items, config.max_workers, |result| {
        let Ok(Some(output)) = result.outcome else {
            return;
        };
        let name = match result.threshold {
            Some(t) => format!("superparcels_{}_{}.geojson", result.region_code, t),
            None => format!("superparcels_{}.geojson", result.region_code),
        };
        let path = args.output.join(name);
        let written = File::create(&path).map(BufWriter::new).map_err(|e| e.to_string()).and_then(|w| {
            let fc = write_superparcels(&output.superparcels);
            serde_json::to_writer_pretty(w, &GeoJson::FeatureCollection(fc)).map_err(|e| e.to_string())
        });
        match written {
            Ok(()) => info!(
                "Wrote {} super-parcels ({} singles, {} rejected) to {:?}",
                output.superparcels.len(),
                output.singles.len(),
                output.rejected.len(),
                path
            ),
            Err(e) => {
                log::error!("Failed to write {:?}: {}", path, e);
                write_errors += 1;
            }
        }
    });

    println!(
        "{} units produced output, {} empty, {} failed, {} write errors",
        summary.produced, summary.empty, summary.failed, write_errors
    );
    Ok(())
}
