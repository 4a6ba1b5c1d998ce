//! rasterpage CLI - render document pages to PNG images

mod pages;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use rasterpage::{CacheBudget, Session, SessionOptions};

use pages::PageSelection;

#[derive(Parser)]
#[command(name = "rasterpage")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Render document pages to PNG images at 300 DPI", long_about = None)]
struct Cli {
    /// Input document
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render pages to PNG files
    Render {
        /// Input document
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Page range (e.g., "1-10", "1,3,5")
        #[arg(long)]
        pages: Option<String>,

        /// Number of worker threads (each opens its own session)
        #[arg(short, long, env = "RASTERPAGE_JOBS")]
        jobs: Option<usize>,

        /// Decoded image cache limit per session, in megabytes
        #[arg(long, value_name = "MB")]
        cache_mb: Option<usize>,
    },

    /// Show document and page geometry
    Info {
        /// Input document
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Render {
            input,
            output,
            pages,
            jobs,
            cache_mb,
        }) => cmd_render(&input, output.as_deref(), pages.as_deref(), jobs, cache_mb),
        Some(Commands::Info { input, json }) => cmd_info(&input, json),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: render if input is provided
            if let Some(input) = cli.input {
                cmd_render(&input, cli.output.as_deref(), None, None, None)
            } else {
                println!("{}", "Usage: rasterpage <FILE> [OUTPUT]".yellow());
                println!("       rasterpage --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_render(
    input: &Path,
    output: Option<&Path>,
    pages: Option<&str>,
    jobs: Option<usize>,
    cache_mb: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let selection = match pages {
        Some(p) => PageSelection::parse(p)?,
        None => PageSelection::All,
    };

    let mut options = SessionOptions::new();
    if let Some(mb) = cache_mb {
        options = options.with_cache_budget(CacheBudget::Bytes(mb.saturating_mul(1024 * 1024)));
    }

    // Open once up front to validate the document and learn the page count.
    let session = Session::open_path_with_options(input, options.clone())?;
    session.check_password()?;
    let indices = selection.indices(session.page_count());
    session.close()?;

    if indices.is_empty() {
        println!("{}", "No pages to render".yellow());
        return Ok(());
    }

    let output_dir = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_pages", stem))
    });
    fs::create_dir_all(&output_dir)?;

    let pb = ProgressBar::new(indices.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("Rendering...");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()?;

    // Sessions are single-owner; every worker opens its own.
    let results: Vec<Result<PathBuf, String>> = pool.install(|| {
        indices
            .par_iter()
            .map_init(
                || Session::open_path_with_options(input, options.clone()),
                |session, &index| {
                    let session = session.as_ref().map_err(|e| e.to_string())?;
                    let image = session
                        .render_page(index)
                        .map_err(|e| format!("page {}: {}", index + 1, e))?;
                    let path = output_dir.join(format!("page-{:04}.png", index + 1));
                    image
                        .save(&path)
                        .map_err(|e| format!("{}: {}", path.display(), e))?;
                    pb.inc(1);
                    Ok(path)
                },
            )
            .collect()
    });

    pb.finish_with_message("Done!");

    let mut failures = 0;
    for result in &results {
        match result {
            Ok(path) => log::debug!("wrote {}", path.display()),
            Err(e) => {
                eprintln!("{} {}", "Failed".red(), e);
                failures += 1;
            }
        }
    }

    println!(
        "\n{} {} pages written to {}",
        "Done!".green().bold(),
        results.len() - failures,
        output_dir.display()
    );

    if failures > 0 {
        return Err(format!("{} pages failed to render", failures).into());
    }
    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open_path(input)?;
    let info = session.info()?;
    session.close()?;

    if json {
        println!("{}", info.to_json()?);
        return Ok(());
    }

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), info.handler.to_uppercase());
    println!("{}: {}", "Pages".bold(), info.page_count);
    println!(
        "{}: {}",
        "Encrypted".bold(),
        if info.needs_password { "Yes" } else { "No" }
    );

    if info.pages.is_empty() {
        return Ok(());
    }

    println!();
    println!("{}", "Pages".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    for page in &info.pages {
        println!(
            "{:>5}  {:.1} x {:.1} pt  {} x {} px",
            page.index + 1,
            page.bounds.width(),
            page.bounds.height(),
            page.pixel_width(),
            page.pixel_height()
        );
    }

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "rasterpage".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Document page rendering tool");
    println!();
    println!("License: MIT");
}
