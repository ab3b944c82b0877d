use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fsimage_core::{
	open_namespace, ImageFile, LoadOptions, Namespace, NamespaceReport, WalkConfig, DEFAULT_TOP_N,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

/// Output buffer for the path file
const OUTPUT_BUFFER: usize = 1024 * 1024;

/// Paths between spinner updates
const PROGRESS_EVERY: u64 = 100_000;

#[derive(Parser, Debug)]
#[command(name = "fsimage", version, about = "Namespace walker for filesystem metadata images")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Write every path of the namespace to a file, one per line
	Paths {
		/// Path to the image file
		image: PathBuf,
		/// Output file
		#[arg(long, short)]
		out: PathBuf,
		/// Worker threads (default: available parallelism)
		#[arg(long, short)]
		workers: Option<usize>,
		/// Paths buffered between the workers and the writer
		#[arg(long, default_value_t = fsimage_core::walk::DEFAULT_CHANNEL_CAPACITY)]
		channel_capacity: usize,
		/// Stop the walk after this many seconds
		#[arg(long)]
		timeout: Option<u64>,
		/// Fail on duplicate directory entries instead of keeping the later one
		#[arg(long)]
		strict: bool,
		/// No progress spinner
		#[arg(long, short)]
		quiet: bool,
	},
	/// Print namespace statistics
	Stats {
		/// Path to the image file
		image: PathBuf,
		/// Entries in each ranking
		#[arg(long, default_value_t = DEFAULT_TOP_N)]
		top: usize,
		/// Print the report as JSON
		#[arg(long)]
		json: bool,
		/// Fail on duplicate directory entries instead of keeping the later one
		#[arg(long)]
		strict: bool,
	},
	/// List the sections recorded in the image summary
	Sections {
		/// Path to the image file
		image: PathBuf,
	},
}

fn main() -> ExitCode {
	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!("{:#}", e);
			eprintln!("❌ Error: {:#}", e);
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<()> {
	let cli = Cli::parse();
	setup_logging();

	match cli.command {
		Commands::Paths {
			image,
			out,
			workers,
			channel_capacity,
			timeout,
			strict,
			quiet,
		} => {
			let namespace = load(&image, strict)?;

			let mut config = WalkConfig {
				channel_capacity,
				timeout: timeout.map(Duration::from_secs),
				..WalkConfig::default()
			};
			if let Some(workers) = workers {
				if workers == 0 {
					bail!("--workers must be at least 1");
				}
				config.workers = workers;
			}

			let cancel = config.cancel.clone();
			ctrlc::set_handler(move || {
				eprintln!("\nInterrupt received, stopping walk...");
				cancel.cancel();
			})
			.context("Failed to set signal handler")?;

			write_paths(&namespace, config, &out, quiet)?;
		}
		Commands::Stats { image, top, json, strict } => {
			let namespace = load(&image, strict)?;
			let report = NamespaceReport::build(&namespace, top);

			if json {
				println!("{}", report.to_json().context("Failed to serialize report")?);
			} else {
				println!("📊 Namespace statistics for {}", image.display());
				println!();
				print!("{}", report);
			}
		}
		Commands::Sections { image } => {
			let file = ImageFile::open(&image)
				.with_context(|| format!("Failed to open image {}", image.display()))?;
			let table = file
				.sections()
				.with_context(|| format!("Failed to read summary of {}", image.display()))?;

			println!("📋 Image: {} ({} bytes)", image.display(), file.len());
			println!("Ondisk version: {}", table.ondisk_version);
			println!("Layout version: {}", table.layout_version);
			println!("Sections: {}", table.len());
			println!();
			println!("{:<24} {:>14} {:>14}", "NAME", "OFFSET", "LENGTH");
			for section in table.iter() {
				println!("{:<24} {:>14} {:>14}", section.name, section.offset, section.length);
			}
		}
	}
	Ok(())
}

fn setup_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn load(image: &Path, strict: bool) -> Result<Namespace> {
	let options = LoadOptions {
		reject_duplicate_parents: strict,
	};
	open_namespace(image, &options).with_context(|| format!("Failed to decode image {}", image.display()))
}

/// `<out>.partial`, renamed into place once the walk completes
fn partial_path(out: &Path) -> PathBuf {
	let mut name = out.as_os_str().to_owned();
	name.push(".partial");
	PathBuf::from(name)
}

fn spinner() -> ProgressBar {
	let bar = ProgressBar::new_spinner();
	let style = ProgressStyle::default_spinner()
		.template("{spinner:.green} [{elapsed_precise}] {msg}")
		.unwrap_or_else(|_| ProgressStyle::default_spinner())
		.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
	bar.set_style(style);
	bar.enable_steady_tick(Duration::from_millis(100));
	bar
}

fn write_paths(namespace: &Namespace, config: WalkConfig, out: &Path, quiet: bool) -> Result<()> {
	let partial = partial_path(out);
	let file = File::create(&partial)
		.with_context(|| format!("Failed to create {}", partial.display()))?;
	let mut writer = BufWriter::with_capacity(OUTPUT_BUFFER, file);

	let progress = if quiet { None } else { Some(spinner()) };
	if let Some(ref p) = progress {
		p.set_message("Walking namespace...");
	}

	let mut written: u64 = 0;
	let result = namespace.walker(config).walk(|path| {
		writer.write_all(path)?;
		writer.write_all(b"\n")?;
		written += 1;
		if written % PROGRESS_EVERY == 0 {
			if let Some(ref p) = progress {
				p.set_message(format!("{} paths written", written));
			}
		}
		Ok(())
	});

	let walked = result.map_err(anyhow::Error::from).and_then(|summary| {
		writer.flush().context("Failed to flush output")?;
		Ok(summary)
	});
	let summary = match walked {
		Ok(summary) => summary,
		Err(e) => {
			if let Some(ref p) = progress {
				p.abandon_with_message("Walk failed");
			}
			drop(writer);
			let _ = fs::remove_file(&partial);
			return Err(e).context("Walk failed");
		}
	};

	if let Some(ref p) = progress {
		if summary.completed {
			p.finish_with_message(format!("Walk completed in {:.1?}", summary.duration));
		} else {
			p.abandon_with_message("Walk interrupted");
		}
	}

	let report = NamespaceReport::build(namespace, DEFAULT_TOP_N).with_walk(summary.stats);
	println!("🌳 Namespace summary");
	println!();
	print!("{}", report);
	println!();

	if !summary.completed {
		drop(writer);
		bail!(
			"walk did not finish; {} paths left in {}",
			summary.stats.paths,
			partial.display()
		);
	}

	drop(writer);
	fs::rename(&partial, out)
		.with_context(|| format!("Failed to move {} to {}", partial.display(), out.display()))?;
	println!("✅ Paths written to {}", out.display());
	Ok(())
}
