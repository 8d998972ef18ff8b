use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use inpaint_relay::comfyui::poller::RunStatus;
use inpaint_relay::{imaging, pipeline, ComfyUIClient, Config, Workflow};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relayctl", about = "CLI for the inpaint relay", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full composite from two local image files
    Process {
        /// Image whose region gets replaced
        #[arg(long, value_name = "PATH")]
        original: PathBuf,
        /// Image providing the replacement content
        #[arg(long, value_name = "PATH")]
        replacement: PathBuf,
        /// Output width; defaults to DEFAULT_SIZE
        #[arg(long)]
        size: Option<u32>,
        /// Output path (defaults to ./composite_<size>.png)
        #[arg(long, value_name = "PATH", conflicts_with = "base64")]
        out: Option<PathBuf>,
        /// Print the PNG as base64 instead of writing a file
        #[arg(long)]
        base64: bool,
    },
    /// Show backend run status
    Status {
        /// Only report the state of this run
        #[arg(long)]
        run_id: Option<String>,
        /// Pretty-print full JSON status
        #[arg(long)]
        pretty: bool,
    },
    /// Image operations
    Image {
        #[command(subcommand)]
        cmd: ImageCmd,
    },
    /// Resize a local image the same way composites are resized
    Resize {
        input: PathBuf,
        /// Target width in pixels
        #[arg(long)]
        size: u32,
        /// Output path (defaults to ./<stem>_<size>.png)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Workflow file utilities
    Workflow {
        #[command(subcommand)]
        cmd: WorkflowCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ImageCmd {
    /// Download an output image by filename
    Get {
        /// Filename reported by the backend status
        filename: String,
        /// Output path (defaults to ./<filename>)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum WorkflowCmd {
    /// Verify that both image slot nodes exist and show their current values
    Check {
        /// Workflow file (defaults to WORKFLOW_PATH)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load env and parse CLI
    Config::dotenv_load();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut conf = Config::new()?;
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url.trim_end_matches('/').to_string();
    }

    match cli.command {
        Commands::Process { original, replacement, size, out, base64 } => {
            let size = size.unwrap_or(conf.default_size);
            let original = tokio::fs::read(&original).await?;
            let replacement = tokio::fs::read(&replacement).await?;
            let client = ComfyUIClient::with_timeout(conf.comfyui_url.clone(), conf.request_timeout)?;

            let png = pipeline::composite(&client, &conf, original, replacement, size)
                .await
                .map_err(|e| {
                    eprintln!("Error: {}", e);
                    e
                })?;
            if base64 {
                println!("{}", STANDARD.encode(&png));
            } else {
                let path = out.unwrap_or_else(|| PathBuf::from(format!("composite_{}.png", size)));
                tokio::fs::write(&path, &png).await?;
                println!("Saved {} ({} bytes)", path.display(), png.len());
            }
            Ok(())
        }
        Commands::Status { run_id, pretty } => {
            let client = ComfyUIClient::with_timeout(conf.comfyui_url.clone(), conf.request_timeout)?;
            let status = client.get_status().await?;
            if let Some(id) = run_id {
                match RunStatus::from_status(&status, &id)? {
                    RunStatus::Absent => println!("{}: absent", id),
                    RunStatus::Running(s) => println!("{}: {}", id, s),
                    RunStatus::Completed(files) if files.is_empty() => println!("{}: completed (no outputs yet)", id),
                    RunStatus::Completed(files) => {
                        println!("{}: completed", id);
                        for f in files {
                            println!("{}", f);
                        }
                    }
                }
            } else if pretty {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", serde_json::to_string(&status)?);
            }
            Ok(())
        }
        Commands::Image { cmd } => match cmd {
            ImageCmd::Get { filename, out } => {
                let client = ComfyUIClient::with_timeout(conf.comfyui_url.clone(), conf.request_timeout)?;
                let bytes = client.get_image(&filename).await.map_err(|e| {
                    eprintln!("Error: {}", e);
                    e
                })?;
                let path = out.unwrap_or_else(|| PathBuf::from(&filename));
                tokio::fs::write(&path, &bytes).await?;
                println!("Saved {} ({} bytes)", path.display(), bytes.len());
                Ok(())
            }
        },
        Commands::Resize { input, size, out } => {
            let bytes = tokio::fs::read(&input).await?;
            let max_pixels = conf.max_output_pixels;
            let png = tokio::task::spawn_blocking(move || imaging::resize(&bytes, size, max_pixels)).await??;
            let path = out.unwrap_or_else(|| {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
                PathBuf::from(format!("{}_{}.png", stem, size))
            });
            tokio::fs::write(&path, &png).await?;
            println!("Saved {} ({} bytes)", path.display(), png.len());
            Ok(())
        }
        Commands::Workflow { cmd } => match cmd {
            WorkflowCmd::Check { path } => {
                let path = path.unwrap_or_else(|| conf.workflow_path.clone());
                let workflow = Workflow::load(&path).await?;
                let mut missing = false;
                for (label, id) in [("original", conf.slots.original), ("replacement", conf.slots.replacement)] {
                    let id = id.to_string();
                    if workflow.has_node(&id) {
                        let current = workflow
                            .node_input(&id, "image")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "<unset>".to_string());
                        println!("{} slot {}: image = {}", label, id, current);
                    } else {
                        eprintln!("{} slot {}: node missing from {}", label, id, path.display());
                        missing = true;
                    }
                }
                if missing {
                    std::process::exit(1);
                }
                Ok(())
            }
        },
    }
}
