//! Lumen Command-Line Interface
//!
//! Runs WebAssembly guests without a display:
//! - graphics go to the in-process GL state machine
//! - audio is discarded or rendered to a raw `f32` file
//! - console output goes to the terminal
//!
//! A guest that hands its frame function to the host is driven at the
//! configured refresh rate until Ctrl+C, `--frames`, or the guest stops.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_bridge::{
    AudioHost, Bridge, BridgeConfig, BridgeModule, FrameLoop, HeadlessGl, HostState, LoopExit,
    NullAudio, RawFileAudio, StartOutcome,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(author, version, about = "Headless host for WebAssembly guests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instantiate a module and run it
    Run {
        /// Module file (.wasm or .wat)
        module: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many frames (0 = until Ctrl+C)
        #[arg(short, long, default_value = "0")]
        frames: u64,

        /// Render queued audio to a raw interleaved f32 stereo file
        #[arg(long)]
        audio_out: Option<PathBuf>,

        /// Initial window title
        #[arg(long)]
        title: Option<String>,
    },

    /// List a module's imports and whether they are provided
    Imports {
        /// Module file (.wasm or .wat)
        module: PathBuf,

        /// Only show imports the bridge does not provide
        #[arg(long)]
        missing: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            module,
            config,
            frames,
            audio_out,
            title,
        } => {
            let code = cmd_run(module, config, frames, audio_out, title)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }

        Commands::Imports { module, missing } => cmd_imports(module, missing),

        Commands::Config => cmd_config(),
    }
}

fn cmd_run(
    path: PathBuf,
    config_path: Option<PathBuf>,
    frames: u64,
    audio_out: Option<PathBuf>,
    title: Option<String>,
) -> Result<i32> {
    let mut config = match config_path {
        Some(p) => BridgeConfig::from_json_file(&p)
            .with_context(|| format!("Failed to load config {}", p.display()))?,
        None => BridgeConfig::headless(),
    };
    if let Some(title) = title {
        config = config.title(title);
    }

    let bridge = Bridge::new(config.clone()).context("Failed to create bridge")?;
    let module = bridge
        .load_module(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    for import in bridge.missing_imports(&module)? {
        warn!("{}::{} is not provided and will trap if called", import.module, import.name);
    }

    match audio_out {
        Some(out) => {
            info!("Rendering audio to {}", out.display());
            run_module(&bridge, &module, RawFileAudio::new(out), frames)
        }
        None => run_module(&bridge, &module, NullAudio::new(), frames),
    }
}

fn run_module<A: AudioHost + 'static>(
    bridge: &Bridge,
    module: &BridgeModule,
    audio: A,
    frames: u64,
) -> Result<i32> {
    let config = bridge.config();
    let gl = HeadlessGl::new(config.window.width, config.window.height);
    let host = HostState::new(config, gl, audio);
    let mut instance = bridge
        .instantiate(module, host)
        .context("Failed to instantiate module")?;

    let callback = match instance.start().context("Guest failed during start")? {
        StartOutcome::Completed => {
            info!("{} returned", module.name());
            return Ok(0);
        }
        StartOutcome::Exited(code) => {
            info!("{} exited with status {}", module.name(), code);
            return Ok(code);
        }
        StartOutcome::RunLoop(callback) => callback,
    };

    let mut frame_loop = FrameLoop::from_config(&config.window);
    if frames > 0 {
        frame_loop = frame_loop.with_max_frames(frames);
    }

    // Setup Ctrl+C handler
    let token = frame_loop.cancel_token();
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start frame timer")?;
    let (exit, stats) = runtime
        .block_on(frame_loop.run(&mut instance, callback))
        .context("Guest failed during a frame")?;

    let counters = instance.host().gl.context().counters();
    println!("{}", stats.summary());
    println!(
        "clears={} draws={} uploaded={}B queued_audio={} frames",
        counters.clears,
        counters.draw_calls,
        counters.uploaded_bytes,
        instance.host().audio.queued_frames()
    );

    Ok(match exit {
        LoopExit::Exited(code) => code,
        LoopExit::Cancelled | LoopExit::FrameLimit | LoopExit::GuestStopped => {
            println!("stopped: {:?}", exit);
            0
        }
    })
}

fn cmd_imports(path: PathBuf, missing_only: bool) -> Result<()> {
    let bridge = Bridge::new(BridgeConfig::default()).context("Failed to create bridge")?;
    let module = bridge
        .load_module(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let imports = bridge.imports(&module)?;
    let missing = imports.iter().filter(|i| !i.provided).count();

    for import in imports.iter().filter(|i| !missing_only || !i.provided) {
        let mark = if import.provided { "ok" } else { "MISSING" };
        println!("{:<8} {}::{}", mark, import.module, import.name);
    }
    println!("{} imports, {} missing", imports.len(), missing);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let json = serde_json::to_string_pretty(&BridgeConfig::default())?;
    println!("{}", json);
    Ok(())
}
