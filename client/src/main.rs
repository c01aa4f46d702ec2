use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use movietex::config::Config;
use movietex::gpu::WgpuGl;
use movietex::video::GstEngine;
use movietex::{GlContext, LoadState, MediaSubsystem, Movie, MovieInfo, TextureId};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Parser)]
#[command(name = "movietexctl")]
#[command(about = "Play movies into GPU textures", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/movietex/config.toml)
    #[arg(short, long, global = true, env = "MOVIETEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a movie and describe it
    Info {
        /// File path or URL
        source: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Play a movie, pumping frames into a GPU texture
    Play {
        /// File path or URL
        source: String,

        /// Stop after this many seconds (default: until the movie ends)
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Loop from the start when the movie ends
        #[arg(short, long = "loop")]
        looping: bool,

        /// Volume from -1.0 to 1.0; negative mutes
        #[arg(long, allow_hyphen_values = true)]
        volume: Option<f32>,

        /// Playback rate (1.0 is normal speed)
        #[arg(short, long)]
        rate: Option<f64>,

        /// Save the last frame as PNG
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.general.log_level.as_str()),
    )
    .init();

    log::debug!("movietexctl v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Info { source, json } => info(&config, &source, json),
        Commands::Play {
            source,
            seconds,
            looping,
            volume,
            rate,
            snapshot,
        } => {
            let mut playback = config.playback.clone();
            playback.autoplay = true;
            playback.looping |= looping;
            if let Some(volume) = volume {
                playback.volume = volume;
            }
            if let Some(rate) = rate {
                playback.rate = rate;
            }

            let (gl, mut movie) = open_movie(&config, &source)?;
            movie.apply_playback(&playback);
            pump(&config, &mut movie, seconds.map(Duration::from_secs_f64)).await?;

            if let Some(path) = snapshot {
                save_snapshot(&gl, &mut movie, &path)?;
            }
            print_stats(&movie);
            Ok(())
        }
    }
}

fn open_movie(config: &Config, source: &str) -> Result<(Rc<WgpuGl>, Movie)> {
    let gl = Rc::new(WgpuGl::new().context("Failed to initialize GPU")?);
    gl.capabilities().log_info();

    let engine = Rc::new(GstEngine::new(config.engine.clone()));
    let subsystem = MediaSubsystem::new(engine);
    let movie = Movie::open(&subsystem, GlContext::new(gl.clone()), &config.texture, source)
        .with_context(|| format!("Failed to open {}", source))?;
    Ok((gl, movie))
}

fn info(config: &Config, source: &str, json: bool) -> Result<()> {
    let (_gl, mut movie) = open_movie(config, source)?;
    let info = movie.info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_info(&info, movie.engine_version());
    }
    Ok(())
}

fn print_info(info: &MovieInfo, engine_version: Option<u32>) {
    println!("Source:          {}", info.source);
    println!("Display context: {}", info.display_context);
    if let Some(version) = engine_version {
        println!("Engine version:  {:#08x}", version);
    }
    println!(
        "Movie box:       {}x{}{}",
        info.movie_box.width(),
        info.movie_box.height(),
        if info.has_visuals { "" } else { " (no visuals)" }
    );
    match info.duration_secs() {
        Some(secs) => println!("Duration:        {:.2}s", secs),
        None => println!("Duration:        unknown"),
    }
    println!("Load state:      {:?}", info.load_state);
    println!("Volume:          {:.2}", info.volume);

    println!("Tracks:          {}", info.tracks.len());
    for track in &info.tracks {
        match track.media_type {
            Some(media) => println!("  #{} {}", track.index, media),
            None => println!("  #{} unknown", track.index),
        }
    }

    if let Some(texture) = &info.texture {
        let (u, v) = texture.tex_coords.extent();
        println!(
            "Texture:         #{} {:?} {}x{} (uv extent {:.4}, {:.4})",
            texture.texture_id, texture.target, texture.size.0, texture.size.1, u, v
        );
    }
}

/// Tick the movie until it ends, `limit` passes or Ctrl-C
async fn pump(config: &Config, movie: &mut Movie, limit: Option<Duration>) -> Result<()> {
    let mut ticker = time::interval(config.pump.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = limit.map(|limit| Instant::now() + limit);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    log::info!(
        "Pumping at {} Hz with a {:?} engine budget",
        config.pump.tick_hz,
        config.pump.task_budget()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                log::info!("Interrupted, stopping playback");
                break;
            }
        }

        if let Err(e) = movie.process(config.pump.task_budget()) {
            log::error!("Engine task failed: {}", e);
            if movie.load_state() == LoadState::Error {
                return Err(e).context("Playback failed");
            }
        }
        movie.current_texture()?;
        movie.stats_mut().maybe_log_stats(config.pump.stats_interval());

        if movie.is_done() {
            log::info!("Playback finished");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    movie.stop();
    Ok(())
}

/// Write the current frame, cropped to the movie's size, as PNG
fn save_snapshot(gl: &WgpuGl, movie: &mut Movie, path: &Path) -> Result<()> {
    let Some(descriptor) = movie.texture_descriptor()? else {
        anyhow::bail!("Movie has no visual frames to snapshot");
    };
    let id = TextureId::new(descriptor.texture_id).context("Texture has no GPU name")?;
    let (allocated_width, _, pixels) = gl.read_texture(id)?;

    // The texture may be padded past the movie's edges
    let (width, height) = descriptor.size;
    let src_row = allocated_width as usize * 4;
    let dst_row = width as usize * 4;
    let mut cropped = Vec::with_capacity(dst_row * height as usize);
    for row in pixels.chunks(src_row).take(height as usize) {
        cropped.extend_from_slice(&row[..dst_row]);
    }

    let image = image::RgbaImage::from_raw(width, height, cropped)
        .context("Snapshot buffer does not match the frame size")?;
    image
        .save(path)
        .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
    println!("✓ Saved {}x{} frame to {}", width, height, path.display());
    Ok(())
}

fn print_stats(movie: &Movie) {
    let stats = movie.stats();
    println!(
        "Played {} ticks, {} frames ({:.2} fps), {} engine errors",
        stats.ticks(),
        stats.frames_updated(),
        stats.frame_rate(),
        stats.task_errors()
    );
}
