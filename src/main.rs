use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use zarrs_mzarr::adapters::{SourceAdapter, SourceFormat};
use zarrs_mzarr::container::{CONTAINER_EXTENSION, Container};
use zarrs_mzarr::convert::{ConvertOptions, convert_dir, convert_file};
use zarrs_mzarr::pyramid::PyramidKind;

#[derive(Parser)]
#[command(name = "mzarr", about = "Multi-resolution zip containers for N-dimensional images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Nifti,
    Npy,
    Tiff,
}

impl From<Format> for SourceFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Nifti => SourceFormat::Nifti,
            Format::Npy => SourceFormat::Npy,
            Format::Tiff => SourceFormat::TiffStack,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Subsampled,
    Gaussian,
}

impl From<Kind> for PyramidKind {
    fn from(value: Kind) -> Self {
        match value {
            Kind::Subsampled => PyramidKind::Subsampled,
            Kind::Gaussian => PyramidKind::Gaussian,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a source image, or a directory of them, into containers
    Convert {
        format: Format,
        /// Source file, TIFF slice directory, or directory of sources
        #[arg(short, long)]
        input: PathBuf,
        /// Container path for a single source, otherwise the output directory
        #[arg(short, long)]
        output: PathBuf,
        /// The image is a segmentation
        #[arg(long)]
        seg: bool,
        /// Store the base level lossy as well
        #[arg(long)]
        lossy: bool,
        /// Number of levels below the base
        #[arg(long, default_value = "4")]
        levels: usize,
        #[arg(long, value_enum, default_value = "subsampled")]
        kind: Kind,
        /// Treat the input as a directory of sources
        #[arg(long)]
        all: bool,
        /// Fail instead of replacing existing containers
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Show the metadata record of a container
    Info { input: PathBuf },
}

/// Output path for a single source: `output` itself, or `output/{name}.mzarr` for a directory.
fn single_output(output: &Path, input: &Path) -> PathBuf {
    if output.is_dir() {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.split('.').next().unwrap_or(n))
            .unwrap_or("image");
        output.join(format!("{name}.{CONTAINER_EXTENSION}"))
    } else {
        output.to_path_buf()
    }
}

fn run(cli: Cli) -> zarrs_mzarr::Result<bool> {
    match cli.command {
        Commands::Convert {
            format,
            input,
            output,
            seg,
            lossy,
            levels,
            kind,
            all,
            no_overwrite,
        } => {
            let adapter: Box<dyn SourceAdapter> = SourceFormat::from(format).adapter();
            let options = ConvertOptions {
                segmentation: seg,
                lossy,
                num_levels: levels,
                kind: kind.into(),
                overwrite: !no_overwrite,
            };
            if all || !adapter.is_source(&input) {
                let report = convert_dir(adapter.as_ref(), &input, &output, &options)?;
                println!("converted {} files", report.converted.len());
                for (path, e) in &report.failed {
                    eprintln!("failed: {}: {e}", path.display());
                }
                Ok(report.is_success())
            } else {
                let dst = single_output(&output, &input);
                convert_file(adapter.as_ref(), &input, &dst, &options)?;
                println!("converted {}", dst.display());
                Ok(true)
            }
        }
        Commands::Info { input } => {
            let container = Container::open(&input)?;
            let level = container.level(zarrs_mzarr::pyramid::BASE_LEVEL_NAME)?;
            println!("path      {}", input.display());
            println!("shape     {:?}", level.shape());
            println!(
                "metadata  {}",
                serde_json::to_string_pretty(container.metadata())?
            );
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
