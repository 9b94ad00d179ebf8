//! meshpair CLI - mesh-to-mesh correspondence from the command line.
//!
//! Usage: meshpair <COMMAND> [OPTIONS] <SOURCE> [DESTINATION]
//!
//! Run `meshpair --help` for available commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use meshpair::io;
use meshpair::prelude::*;
use meshpair::remap::{find_best_match, ElementKind, IslandClassifier};

#[derive(Parser)]
#[command(name = "meshpair")]
#[command(author, version, about = "Mesh-to-mesh correspondence CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Find the rigid transform best aligning the destination onto the source
    Align {
        /// Source mesh file
        source: PathBuf,

        /// Destination mesh file
        destination: PathBuf,
    },

    /// Compute the correspondence from destination elements to source elements
    Remap {
        /// Source mesh file
        source: PathBuf,

        /// Destination mesh file
        destination: PathBuf,

        /// Remap mode, e.g. vert-nearest or corner-poly-interp-nearest
        #[arg(short, long)]
        mode: RemapMode,

        /// Element kind to map with the topology mode
        #[arg(short, long, value_enum)]
        element: Option<Element>,

        /// Maximum source distance (default: unlimited)
        #[arg(long)]
        max_distance: Option<f64>,

        /// Thickness of projection rays
        #[arg(long, default_value = "0.0")]
        ray_radius: f64,

        /// Strength of the seam correction for corners (0.0 to 1.0)
        #[arg(long, default_value = "0.0")]
        islands_precision: f64,

        /// Align the destination onto the source first
        #[arg(long)]
        auto_align: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Element {
    /// Vertices
    Vertex,
    /// Edges
    Edge,
    /// Face corners
    Corner,
    /// Faces
    Face,
}

impl From<Element> for ElementKind {
    fn from(element: Element) -> Self {
        match element {
            Element::Vertex => ElementKind::Vertex,
            Element::Edge => ElementKind::Edge,
            Element::Corner => ElementKind::Corner,
            Element::Face => ElementKind::Face,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> std::result::Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
        }

        Commands::Align {
            source,
            destination,
        } => {
            cmd_align(&source, &destination)?;
        }

        Commands::Remap {
            source,
            destination,
            mode,
            element,
            max_distance,
            ray_radius,
            islands_precision,
            auto_align,
            sequential,
        } => {
            let kind = match (mode.element(), element) {
                (Some(kind), _) => kind,
                (None, Some(element)) => element.into(),
                (None, None) => return Err("the topology mode needs --element".into()),
            };
            let mut options = RemapOptions::default()
                .with_ray_radius(ray_radius)
                .with_islands_precision(islands_precision)
                .with_parallel(!sequential);
            if let Some(max_distance) = max_distance {
                options = options.with_max_distance(max_distance);
            }
            cmd_remap(&source, &destination, mode, kind, options, auto_align)?;
        }
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
///
/// Each distinct message (island setup, element pass) gets its own bar.
fn create_progress() -> Progress {
    // Current message and the highest percent shown for it (monotonic)
    let shown: Mutex<(String, Option<usize>)> = Mutex::new((String::new(), None));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let Ok(mut shown) = shown.lock() else {
            return;
        };
        if shown.0 != message {
            *shown = (message.to_string(), None);
        }

        // Use rounding instead of truncation for smoother progress
        let percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Only update display if percent increased (reduce flickering)
        if shown.1.is_some_and(|max| percent <= max) {
            return;
        }
        shown.1 = Some(percent);

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{}{}] {:3}% {}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn load(path: &Path) -> std::result::Result<PolyMesh, Box<dyn std::error::Error>> {
    let mesh = io::load(path)?;
    println!(
        "Loaded {}: {} vertices, {} faces",
        path.display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );
    Ok(mesh)
}

fn cmd_info(input: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Edges: {}", mesh.num_edges());
    println!("Faces: {}", mesh.num_faces());
    println!("Corners: {}", mesh.num_corners());

    let seams = mesh.seams().iter().filter(|&&s| s).count();
    let islands = SeamIslands.classify(&mesh).map_or(0, |store| store.len());
    println!("Seam edges: {}", seams);
    println!("Seam islands: {}", islands);

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    Ok(())
}

fn cmd_align(source: &Path, destination: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let src = load(source)?;
    let dst = load(destination)?;

    let start = Instant::now();
    let result = find_best_match(dst.positions(), &src);
    let elapsed = start.elapsed();

    println!("Candidate differences (lower is better):");
    for (i, score) in result.candidate_scores.iter().enumerate() {
        let marker = if *score == result.score { " *" } else { "" };
        println!("  {}: {:.6}{}", i, score, marker);
    }
    println!("Best transform ({:.2?}):", elapsed);
    let m = result.transform.matrix();
    for row in 0..4 {
        println!(
            "  [{:10.5} {:10.5} {:10.5} {:10.5}]",
            m[(row, 0)],
            m[(row, 1)],
            m[(row, 2)],
            m[(row, 3)]
        );
    }

    Ok(())
}

fn cmd_remap(
    source: &Path,
    destination: &Path,
    mode: RemapMode,
    kind: ElementKind,
    mut options: RemapOptions,
    auto_align: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let src = load(source)?;
    let dst = load(destination)?;

    if auto_align {
        let alignment = find_best_match(dst.positions(), &src);
        println!("Auto-aligned (difference {:.6})", alignment.score);
        options = options.with_space_transform(alignment.transform);
    }

    let run_mode = if options.parallel { "parallel" } else { "sequential" };
    println!("Remapping {} elements with {} ({})...", kind, mode, run_mode);

    let progress = create_progress();
    let mut map = CorrespondenceMap::default();

    let start = Instant::now();
    let status = match kind {
        ElementKind::Vertex => {
            remap_verts_with_progress(mode, &src, &dst, &options, &mut map, &progress)?
        }
        ElementKind::Edge => {
            remap_edges_with_progress(mode, &src, &dst, &options, &mut map, &progress)?
        }
        ElementKind::Corner => remap_corners_with_progress(
            mode,
            &src,
            &dst,
            Some(&SeamIslands),
            &options,
            &mut map,
            &progress,
        )?,
        ElementKind::Face => {
            remap_faces_with_progress(mode, &src, &dst, &options, &mut map, &progress)?
        }
    };
    let elapsed = start.elapsed();

    if status == RemapStatus::UnsupportedMode {
        return Err(format!("mode {} cannot map {} elements", mode, kind).into());
    }

    let mapped = map.valid_count();
    let sources: usize = map.iter().map(|item| item.len()).sum();
    let worst_sum_error = map
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| (item.weights.iter().sum::<f64>() - 1.0).abs())
        .fold(0.0_f64, f64::max);

    println!("Items: {} ({:.2?})", map.len(), elapsed);
    println!("Mapped: {}", mapped);
    println!("Empty: {}", map.len() - mapped);
    if mapped > 0 {
        println!("Average sources per mapped item: {:.3}", sources as f64 / mapped as f64);
    }
    println!("Worst weight-sum error: {:.3e}", worst_sum_error);

    Ok(())
}
