//! samplifast - headless front end
//!
//! Plays, mixes or inspects audio files from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use samplifast::audio::{CpalOutput, FileCodec};
use samplifast::{Codec, EngineSettings, Result, Session, TrackEvent};

/// How often the play loop checks for finished tracks
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "samplifast", version, about = "Multi-track sample player and mixer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play files together until they all finish
    Play {
        /// Audio files, one per track
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Gain in percent; one value for all tracks or one per file
        #[arg(short, long)]
        gain: Vec<f32>,
        /// Trim start in seconds
        #[arg(long)]
        start: Option<f64>,
        /// Trim end in seconds
        #[arg(long)]
        end: Option<f64>,
    },
    /// Write a normalized mixdown of the files
    Mix {
        /// Output file (WAV)
        #[arg(short, long)]
        output: PathBuf,
        /// Audio files, one per track
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Gain in percent; one value for all tracks or one per file
        #[arg(short, long)]
        gain: Vec<f32>,
    },
    /// Print format details of a file
    Info {
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting samplifast");

    let cli = Cli::parse();
    let settings = EngineSettings::load();

    let result = match cli.command {
        Commands::Play {
            files,
            gain,
            start,
            end,
        } => play(&settings, &files, &gain, start, end),
        Commands::Mix {
            output,
            files,
            gain,
        } => mix(&settings, &files, &gain, &output),
        Commands::Info { file } => info(&settings, &file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build a session with one track per file, gains applied
fn open_session(settings: &EngineSettings, files: &[PathBuf], gains: &[f32]) -> Result<Session> {
    let settings = EngineSettings {
        track_count: files.len(),
        ..settings.clone()
    };
    let codec = FileCodec::new(settings.export_format);
    let mut session = Session::new(&settings, Rc::new(CpalOutput::new()), Box::new(codec));

    for (index, file) in files.iter().enumerate() {
        session.load(index, file)?;
        let gain = match gains {
            [] => None,
            [all] => Some(*all),
            per_file => per_file.get(index).copied(),
        };
        if let Some(percent) = gain {
            session.set_gain(index, percent)?;
        }
    }
    Ok(session)
}

fn play(
    settings: &EngineSettings,
    files: &[PathBuf],
    gains: &[f32],
    start: Option<f64>,
    end: Option<f64>,
) -> Result<()> {
    let mut session = open_session(settings, files, gains)?;

    if start.is_some() || end.is_some() {
        for index in 0..files.len() {
            let duration = session.track(index)?.duration_secs();
            session.trim(index, start.unwrap_or(0.0), end.unwrap_or(duration))?;
        }
    }

    session.play_pause_all()?;
    for event in session.wait_until_stopped(POLL_INTERVAL) {
        match event {
            TrackEvent::Finished(index) => {
                log::info!("Track {} finished: {}", index + 1, files[index].display());
            }
        }
    }
    Ok(())
}

fn mix(settings: &EngineSettings, files: &[PathBuf], gains: &[f32], output: &Path) -> Result<()> {
    let session = open_session(settings, files, gains)?;
    let mix = session.export_mix(output)?;
    println!(
        "{}: {} frames, {} ch @ {} Hz",
        output.display(),
        mix.frames(),
        mix.channels(),
        mix.sample_rate()
    );
    Ok(())
}

fn info(settings: &EngineSettings, file: &Path) -> Result<()> {
    let buffer = FileCodec::new(settings.export_format).decode(file)?;
    println!("{}", file.display());
    println!("  sample rate: {} Hz", buffer.sample_rate());
    println!("  channels:    {}", buffer.channels());
    println!("  frames:      {}", buffer.frames());
    println!("  duration:    {:.3} s", buffer.duration_secs());
    Ok(())
}
