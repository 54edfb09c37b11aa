use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use convert_batch::{
    ConversionDirection, ConversionOptions, DpiSetting, LocalFileSystem, TransferMode,
};
use std::path::PathBuf;

mod logger;
mod plan;

#[derive(Parser)]
#[command(name = "pcbz", about = "Batch PDF ↔ CBZ conversion planner", version)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show destination and transfer mode for each input without converting
    Plan {
        /// Input files
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Options file to start from
        #[arg(long)]
        options: Option<PathBuf>,

        /// Conversion direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// Destination directory (defaults to the first input's directory)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Let the engine write PDF → CBZ output straight to disk
        #[arg(long)]
        direct: bool,

        /// Rendering DPI, 0 for automatic
        #[arg(long)]
        dpi: Option<u32>,
    },

    /// Create or inspect option files
    Options {
        #[command(subcommand)]
        action: OptionsAction,
    },
}

#[derive(Subcommand)]
enum OptionsAction {
    /// Write an options file
    Init {
        /// Output JSON file
        path: PathBuf,

        /// Conversion direction
        #[arg(long, default_value = "pdf-to-cbz", value_enum)]
        direction: DirectionArg,

        /// Rendering DPI, 0 for automatic
        #[arg(long, default_value = "0")]
        dpi: u32,

        /// JPEG quality (1-100)
        #[arg(long, default_value = "98")]
        quality: u8,

        /// Store pages losslessly
        #[arg(long)]
        lossless: bool,

        /// Let the engine write PDF → CBZ output straight to disk
        #[arg(long)]
        direct: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load, validate and print an options file
    Show {
        /// Options JSON file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    PdfToCbz,
    CbzToPdf,
}

impl From<DirectionArg> for ConversionDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::PdfToCbz => Self::PdfToArchive,
            DirectionArg::CbzToPdf => Self::ArchiveToPdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::CliLogger::from_verbosity(cli.verbose)
        .init()
        .context("Failed to install logger")?;

    match cli.command {
        Commands::Plan {
            files,
            options,
            direction,
            dest,
            direct,
            dpi,
        } => {
            let mut conversion = match options {
                Some(path) => ConversionOptions::load(&path)
                    .await
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => ConversionOptions::default(),
            };
            if let Some(direction) = direction {
                conversion.direction = direction.into();
            }
            if let Some(dpi) = dpi {
                conversion.dpi = DpiSetting::from(dpi);
            }
            conversion.direct_to_disk |= direct;
            conversion.validate()?;

            let fs = match dest {
                Some(dir) => LocalFileSystem::with_destination(dir),
                None => LocalFileSystem::new(),
            };
            let plan = plan::build(&fs, files, &conversion).await?;

            println!("{} → {}", conversion.direction.name(), plan.destination_dir.display());
            println!("  DPI: {}", describe_dpi(conversion.dpi));
            println!(
                "  Quality: {}{}",
                conversion.quality,
                if conversion.lossless { " (lossless)" } else { "" }
            );
            for entry in &plan.entries {
                println!(
                    "  {} → {}  [{}, {}]",
                    entry.display_name,
                    entry.destination.display(),
                    describe_transfer(entry.transfer),
                    describe_size(entry.size_bytes)
                );
            }
            for path in &plan.skipped {
                println!("  skipped: {}", path.display());
            }
            println!("{} files queued, {} skipped", plan.entries.len(), plan.skipped.len());
        }

        Commands::Options { action } => match action {
            OptionsAction::Init {
                path,
                direction,
                dpi,
                quality,
                lossless,
                direct,
                force,
            } => {
                if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                let options = ConversionOptions {
                    direction: direction.into(),
                    dpi: DpiSetting::from(dpi),
                    quality,
                    lossless,
                    direct_to_disk: direct,
                };
                options.validate()?;
                options.save(&path).await?;
                println!("Wrote options → {}", path.display());
            }
            OptionsAction::Show { path } => {
                let options = ConversionOptions::load(&path)
                    .await
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                println!("Options ({}):", path.display());
                println!("  Direction: {}", options.direction.name());
                println!("  DPI: {}", describe_dpi(options.dpi));
                println!("  Quality: {}", options.quality);
                println!("  Lossless: {}", options.lossless);
                println!("  Direct to disk: {}", options.direct_to_disk);
            }
        },
    }

    Ok(())
}

fn describe_dpi(dpi: DpiSetting) -> String {
    match dpi {
        DpiSetting::Auto => "auto".to_string(),
        DpiSetting::Fixed(dpi) => dpi.to_string(),
    }
}

fn describe_transfer(transfer: TransferMode) -> &'static str {
    match transfer {
        TransferMode::InMemory => "in-memory",
        TransferMode::DirectToDisk => "direct",
    }
}

fn describe_size(size: Option<u64>) -> String {
    match size {
        Some(bytes) => format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0),
        None => "size unknown".to_string(),
    }
}
