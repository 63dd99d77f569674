use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geogrid_render::{presets, EngineConfig, GridConfig, ImageFormat, RenderOptions, Renderer, Theme};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "geogrid",
    version,
    about = "Render local-search ranking grids into map report images",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a grid report as an image
    Render {
        /// Grid JSON file (camelCase fields)
        #[arg(short, long)]
        input: PathBuf,

        /// Render options JSON file
        #[arg(long)]
        options: Option<PathBuf>,

        /// Output format (png, jpeg, webp)
        #[arg(short, long)]
        format: Option<String>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Theme (default, dark, light)
        #[arg(long)]
        theme: Option<String>,

        /// Hide the position legend
        #[arg(long, default_value = "false")]
        no_legend: bool,

        /// Where to write the image (or the JSON payload with --base64)
        #[arg(short, long)]
        output: PathBuf,

        /// Write a JSON payload with base64 data instead of raw bytes
        #[arg(long, default_value = "false")]
        base64: bool,
    },

    /// Write the report HTML without capturing it
    Preview {
        /// Grid JSON file
        #[arg(short, long, conflicts_with = "preset")]
        input: Option<PathBuf>,

        /// Built-in preset name
        #[arg(short, long)]
        preset: Option<String>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print metrics and summary for a grid as JSON
    Metrics {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List built-in presets
    Presets,

    /// Launch the browser and print pool status
    Ready,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Commands::Render {
            input,
            options,
            format,
            width,
            height,
            theme,
            no_legend,
            output,
            base64,
        } => {
            let grid: GridConfig = read_json(&input)?;
            let defaults = RenderOptions::from_env()?;
            let mut opts = match options {
                Some(path) => defaults.overlay(read_json(&path)?)?,
                None => defaults,
            };
            if let Some(f) = format {
                opts.format = f.parse::<ImageFormat>()?;
            }
            if let Some(t) = theme {
                opts.theme = t.parse::<Theme>()?;
            }
            if let Some(w) = width {
                opts.width = w;
            }
            if let Some(h) = height {
                opts.height = h;
            }
            if no_legend {
                opts.show_legend = false;
            }

            let renderer = Renderer::chrome(EngineConfig::from_env()?);
            let outcome = if base64 {
                match renderer.render_encoded(&grid, &opts).await {
                    Ok(payload) => serde_json::to_vec_pretty(&payload).map_err(anyhow::Error::from),
                    Err(e) => Err(e.into()),
                }
            } else {
                renderer.render_image(&grid, &opts).await.map(|r| r.bytes).map_err(anyhow::Error::from)
            };
            renderer.shutdown().await;

            let bytes = outcome?;
            std::fs::write(&output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} ({} bytes)", output.display(), bytes.len());
        }

        Commands::Preview { input, preset, output } => {
            let grid: GridConfig = match (input, preset) {
                (Some(path), _) => read_json(&path)?,
                (None, Some(name)) => presets::preset(&name)?,
                (None, None) => anyhow::bail!("Either --input or --preset is required"),
            };
            let html = geogrid_render::preview(&grid, &RenderOptions::from_env()?)?;
            std::fs::write(&output, html.as_bytes()).with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote preview to {}", output.display());
        }

        Commands::Metrics { input } => {
            let grid: GridConfig = read_json(&input)?;
            grid.validate()?;
            let data = geogrid_render::grid::build(&grid)?;
            let report = serde_json::json!({
                "metrics": data.metrics,
                "summary": data.summary(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Presets => {
            println!("{}", serde_json::to_string_pretty(&presets::list())?);
        }

        Commands::Ready => {
            let renderer = Renderer::chrome(EngineConfig::from_env()?);
            let status = renderer.ready().await;
            renderer.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&status?)?);
        }
    }

    Ok(())
}
