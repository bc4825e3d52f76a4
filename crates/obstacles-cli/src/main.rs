//! CLI for obstacle detection over recorded frames

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use obstacles_pointcloud::bridge::converters::{read_point_cloud, read_raw_depth};
use obstacles_pointcloud::{
    CallContext, CameraIntrinsics, Dependencies, DetectOptions, Geometry, Obstacle,
    ObstacleService, PipelineVariant, ServiceConfig, StaticCamera,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "obstacles")]
#[command(about = "Detect obstacles in depth maps and point clouds", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run detection on one recorded frame
    Detect {
        /// Service configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Point cloud file (.pcd ASCII or XYZ text)
        #[arg(long, conflicts_with = "depth")]
        cloud: Option<PathBuf>,

        /// Raw little-endian u16 depth buffer, millimetres
        #[arg(long, requires_all = ["width", "height"])]
        depth: Option<PathBuf>,

        /// Depth map width in pixels
        #[arg(long)]
        width: Option<usize>,

        /// Depth map height in pixels
        #[arg(long)]
        height: Option<usize>,

        /// Camera intrinsics (JSON); without them depth frames use the median estimate
        #[arg(long)]
        intrinsics: Option<PathBuf>,

        /// Pipeline variant; defaults to depth when --depth is given
        #[arg(long, value_enum)]
        variant: Option<Variant>,

        /// Attach member points to every obstacle
        #[arg(long)]
        include_points: bool,

        /// Print obstacles as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a configuration file
    Validate {
        /// Service configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    Pointcloud,
    Depth,
}

impl From<Variant> for PipelineVariant {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Pointcloud => PipelineVariant::PointCloud,
            Variant::Depth => PipelineVariant::Depth,
        }
    }
}

/// Recorded frame named on the command line.
enum FrameSource {
    Cloud(PathBuf),
    Depth {
        path: PathBuf,
        width: usize,
        height: usize,
    },
}

fn load_intrinsics(path: &Path) -> anyhow::Result<CameraIntrinsics> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading intrinsics {}", path.display()))?;
    let intrinsics: CameraIntrinsics = serde_json::from_str(&text)
        .with_context(|| format!("parsing intrinsics {}", path.display()))?;
    Ok(intrinsics)
}

fn build_camera(
    name: &str,
    source: &FrameSource,
    intrinsics: Option<CameraIntrinsics>,
) -> anyhow::Result<StaticCamera> {
    let mut camera = StaticCamera::new(name);
    match source {
        FrameSource::Cloud(path) => {
            let cloud = read_point_cloud(path)
                .with_context(|| format!("loading point cloud {}", path.display()))?;
            camera = camera.with_point_cloud(cloud);
        }
        FrameSource::Depth {
            path,
            width,
            height,
        } => {
            let depth = read_raw_depth(path, *width, *height)
                .with_context(|| format!("loading depth map {}", path.display()))?;
            camera = camera.with_depth_map(depth);
        }
    }
    if let Some(k) = intrinsics {
        camera = camera.with_intrinsics(k);
    }
    Ok(camera)
}

fn describe(index: usize, obstacle: &Obstacle) -> String {
    let c = obstacle.geometry.center();
    match &obstacle.geometry {
        Geometry::Point { .. } => format!(
            "{}. point at ({:.1}, {:.1}, {:.1}) mm",
            index + 1,
            c[0],
            c[1],
            c[2]
        ),
        Geometry::Box { .. } => {
            let d = obstacle.geometry.dimensions();
            format!(
                "{}. box at ({:.1}, {:.1}, {:.1}) mm, size {:.1} x {:.1} x {:.1} mm, {} points",
                index + 1,
                c[0],
                c[1],
                c[2],
                d[0],
                d[1],
                d[2],
                obstacle.point_count
            )
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { config } => {
            let cfg = ServiceConfig::from_json_file(&config)?;
            let deps = cfg.validate()?;
            let cluster = cfg.cluster_config()?;
            println!("{} Configuration is valid", "✓".green().bold());
            println!("  Camera: {}", deps.join(", ").cyan());
            println!("  Effective radius: {:.3} mm", cluster.effective_radius_mm());
            println!("  Ground normal: {:?}", cluster.ground_normal());
        }

        Commands::Detect {
            config,
            cloud,
            depth,
            width,
            height,
            intrinsics,
            variant,
            include_points,
            json,
        } => {
            let cfg = ServiceConfig::from_json_file(&config)?;
            let source = match (cloud, depth, width, height) {
                (Some(path), None, _, _) => FrameSource::Cloud(path),
                (None, Some(path), Some(width), Some(height)) => FrameSource::Depth {
                    path,
                    width,
                    height,
                },
                _ => bail!("give either --cloud, or --depth with --width and --height"),
            };
            let variant = variant.map(PipelineVariant::from).unwrap_or(match source {
                FrameSource::Cloud(_) => PipelineVariant::PointCloud,
                FrameSource::Depth { .. } => PipelineVariant::Depth,
            });
            let intrinsics = intrinsics.as_deref().map(load_intrinsics).transpose()?;

            let camera = build_camera(&cfg.camera_name, &source, intrinsics)?;
            let deps = Dependencies::new().with_camera(Arc::new(camera));
            let service = ObstacleService::new("obstacles", &cfg, variant, deps)?;

            let options = DetectOptions {
                include_points: include_points.then_some(true),
            };
            let start = Instant::now();
            let obstacles = service.detect_obstacles("", &options, &CallContext::default())?;
            let elapsed = start.elapsed();
            info!(
                obstacles = obstacles.len(),
                %variant,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "detection finished"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&obstacles)?);
            } else {
                println!(
                    "{} Found {} obstacles ({} pipeline)",
                    "✓".green().bold(),
                    obstacles.len(),
                    variant.to_string().cyan()
                );
                println!("  Time: {:?}", elapsed);
                println!();
                for (i, obstacle) in obstacles.iter().enumerate() {
                    println!("{}", describe(i, obstacle));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use obstacles_pointcloud::Camera;
    use std::io::Write;

    #[test]
    fn test_build_camera_from_xyz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.xyz");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "0 0 1000\n5 0 1000").unwrap();

        let camera = build_camera("cam", &FrameSource::Cloud(path), None).unwrap();
        assert_eq!(camera.name(), "cam");
        assert_eq!(camera.next_point_cloud().unwrap().len(), 2);
    }

    #[test]
    fn test_build_camera_from_raw_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.raw");
        std::fs::write(&path, [1u8, 0, 2, 0, 3, 0]).unwrap();

        let source = FrameSource::Depth {
            path,
            width: 3,
            height: 1,
        };
        let camera = build_camera("cam", &source, None).unwrap();
        assert_eq!(camera.depth_map().unwrap().data(), &[1, 2, 3]);
        assert_eq!(camera.intrinsics().unwrap(), None);
    }

    #[test]
    fn test_wrong_depth_size_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.raw");
        std::fs::write(&path, [1u8, 0, 2]).unwrap();
        let source = FrameSource::Depth {
            path,
            width: 2,
            height: 1,
        };
        assert!(build_camera("cam", &source, None).is_err());
    }

    #[test]
    fn test_load_intrinsics() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"width": 640, "height": 480, "fx": 600.0, "fy": 600.0, "ppx": 320.0, "ppy": 240.0}}"#
        )
        .unwrap();
        let k = load_intrinsics(file.path()).unwrap();
        assert_eq!(k, CameraIntrinsics::new(640, 480, 600.0, 600.0, 320.0, 240.0));
    }

    #[test]
    fn test_describe_point() {
        let line = describe(0, &Obstacle::at_depth(1500.0));
        assert_eq!(line, "1. point at (0.0, 0.0, 1500.0) mm");
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
