//! Satellite mosaic command-line renderer.
//!
//! Renders a request file against a fragment dump:
//! - `render` writes a zip archive (when `--out` ends in `.zip`) or loose files
//! - `render --frame-days N` writes one bundle per time sub-window
//! - `check` validates a request without reading any raster

mod local;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use compositor::{DeliveryBundle, Pipeline, PipelineConfig, RenderRequest};

use local::LocalStore;

#[derive(Parser, Debug)]
#[command(name = "mosaic-cli")]
#[command(about = "Render satellite mosaics from dumped fragments")]
struct Cli {
    /// Log level
    #[arg(long, env = "MOSAIC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a request into a delivery bundle
    Render(RenderArgs),
    /// Validate a request and the pipeline configuration
    Check {
        /// Request file (YAML, or JSON with a .json extension)
        #[arg(long)]
        request: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Request file (YAML, or JSON with a .json extension)
    #[arg(long)]
    request: PathBuf,

    /// JSON array of {scene, fragment} objects in priority order
    #[arg(long)]
    fragments: PathBuf,

    /// Output: a .zip archive or a directory for loose files
    #[arg(long)]
    out: PathBuf,

    /// Render one frame per this many days of the request's time range
    #[arg(long)]
    frame_days: Option<i64>,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    let config = PipelineConfig::from_env();
    match cli.command {
        Command::Render(args) => {
            let written = render(&args, config)?;
            for path in &written {
                println!("{}", path.display());
            }
        }
        Command::Check { request } => check(&request, &config)?,
    }
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_request(path: &Path) -> Result<RenderRequest> {
    RenderRequest::from_file(path)
        .with_context(|| format!("Failed to load request {}", path.display()))
}

/// Render and write the bundle(s), returning the paths written.
fn render(args: &RenderArgs, config: PipelineConfig) -> Result<Vec<PathBuf>> {
    let mut request = load_request(&args.request)?;
    let store = LocalStore::load(&args.fragments)?;
    let pipeline =
        Pipeline::new(&store, &store, config).context("Invalid pipeline configuration")?;

    if let Some(days) = args.frame_days {
        if days <= 0 {
            bail!("--frame-days must be positive, got {}", days);
        }
        let frames = pipeline
            .render_frames(&request, days)
            .context("Failed to render animation frames")?;

        let mut written = Vec::new();
        for frame in &frames {
            let label = frame.time_range.start.format("%Y-%m-%d").to_string();
            let target = if request.archive {
                args.out.join(format!("{}.zip", label))
            } else {
                args.out.join(label)
            };
            written.extend(write_bundle(&frame.bundle, &target)?);
        }
        info!(frames = frames.len(), out = %args.out.display(), "Wrote animation frames");
        return Ok(written);
    }

    request.archive = request.archive || is_zip(&args.out);
    let bundle = if request.time_range.is_some() {
        pipeline.run(&request)
    } else {
        pipeline.render_scenes(&request, store.scenes())
    }
    .context("Failed to render request")?;

    let written = write_bundle(&bundle, &args.out)?;
    info!(name = %bundle.name, out = %args.out.display(), "Wrote delivery bundle");
    Ok(written)
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("zip"))
}

fn write_bundle(bundle: &DeliveryBundle, target: &Path) -> Result<Vec<PathBuf>> {
    if !is_zip(target) {
        return bundle
            .write_to_dir(target)
            .with_context(|| format!("Failed to write bundle into {}", target.display()));
    }

    let bytes = match &bundle.archive {
        Some(bytes) => bytes.clone(),
        None => bundle.to_archive().context("Failed to build archive")?,
    };
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(target, bytes)
        .with_context(|| format!("Failed to write archive {}", target.display()))?;
    Ok(vec![target.to_path_buf()])
}

/// Run every check that needs no raster data.
fn check(path: &Path, config: &PipelineConfig) -> Result<()> {
    config.validate().context("Invalid pipeline configuration")?;
    let request = load_request(path)?;

    let plan = request.plan(config).context("Request would be rejected")?;
    if request.time_range.is_some() {
        request.time_range()?;
    }

    info!(
        format = %plan.format,
        area_ha = plan.area_ha,
        bands = %plan.assets.join(","),
        enhance = %request.enhance,
        "Request is valid"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::FragmentDump;
    use std::io::Cursor;
    use test_utils::{bbox, constant_fragment, scene, temp_test_dir, with_bounds};

    use mosaic_common::BoundingBox;

    const REQUEST: &str = r#"
region:
  type: Polygon
  coordinates: [[[0.60, 41.60], [0.62, 41.60], [0.62, 41.615], [0.60, 41.615], [0.60, 41.60]]]
time_range: 2024-01-01/2024-01-31
view: { assets: [red, green, blue] }
"#;

    fn field_dump(id: &str, day: u32) -> FragmentDump {
        let (min_x, min_y, max_x, max_y) = bbox::FIELD;
        FragmentDump {
            scene: scene(id, day, 2.0),
            fragment: with_bounds(
                constant_fragment(id, &["red", "green", "blue", "nir"], 6, 5, 1200.0),
                BoundingBox::new(min_x, min_y, max_x, max_y),
            ),
        }
    }

    fn write_inputs(dir: &Path, request: &str, dumps: &[FragmentDump]) -> (PathBuf, PathBuf) {
        let request_path = dir.join("request.yaml");
        let fragments_path = dir.join("fragments.json");
        std::fs::write(&request_path, request).unwrap();
        std::fs::write(&fragments_path, serde_json::to_string(dumps).unwrap()).unwrap();
        (request_path, fragments_path)
    }

    #[test]
    fn test_render_to_zip() {
        let dir = temp_test_dir();
        let (request, fragments) = write_inputs(dir.path(), REQUEST, &[field_dump("S2A_1", 4)]);
        let args = RenderArgs {
            request,
            fragments,
            out: dir.path().join("out/bundle.zip"),
            frame_days: None,
        };

        let written = render(&args, PipelineConfig::default()).unwrap();
        assert_eq!(written, vec![args.out.clone()]);

        let bytes = std::fs::read(&args.out).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);
    }

    #[test]
    fn test_render_loose_files() {
        let dir = temp_test_dir();
        let (request, fragments) = write_inputs(dir.path(), REQUEST, &[field_dump("S2A_1", 4)]);
        let out = dir.path().join("bundle");
        let args = RenderArgs {
            request,
            fragments,
            out: out.clone(),
            frame_days: None,
        };

        let written = render(&args, PipelineConfig::default()).unwrap();
        assert_eq!(written.len(), 4);
        assert!(out.join("image.pgw").exists());
    }

    #[test]
    fn test_render_frames() {
        let dir = temp_test_dir();
        let (request, fragments) = write_inputs(
            dir.path(),
            REQUEST,
            &[field_dump("EARLY", 2), field_dump("LATE", 28)],
        );
        let args = RenderArgs {
            request,
            fragments,
            out: dir.path().join("frames"),
            frame_days: Some(15),
        };

        render(&args, PipelineConfig::default()).unwrap();
        assert!(args.out.join("2024-01-01/image.png").exists());
        assert!(args.out.join("2024-01-16/image.png").exists());
    }

    #[test]
    fn test_render_unsupported_format() {
        let dir = temp_test_dir();
        let request = format!("{}format: TIFF\n", REQUEST);
        let (request, fragments) = write_inputs(dir.path(), &request, &[field_dump("S2A_1", 4)]);
        let args = RenderArgs {
            request,
            fragments,
            out: dir.path().join("bundle.zip"),
            frame_days: None,
        };

        let err = render(&args, PipelineConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("TIFF"));
        assert!(!args.out.exists());
    }

    #[test]
    fn test_check_request() {
        let dir = temp_test_dir();
        let (request, _) = write_inputs(dir.path(), REQUEST, &[]);
        assert!(check(&request, &PipelineConfig::default()).is_ok());

        let tight = PipelineConfig {
            max_area_hectares: 10,
            ..PipelineConfig::default()
        };
        assert!(check(&request, &tight).is_err());
    }

    #[test]
    fn test_check_rejects_colormap_on_rgb_view() {
        let dir = temp_test_dir();
        let request = format!("{}treatment: {{ colormap: viridis }}\n", REQUEST);
        let (request, _) = write_inputs(dir.path(), &request, &[]);

        let err = check(&request, &PipelineConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("colormap"));
    }

    #[test]
    fn test_zip_detection() {
        assert!(is_zip(Path::new("out/bundle.ZIP")));
        assert!(!is_zip(Path::new("out/bundle")));
    }
}
