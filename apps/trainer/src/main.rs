use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nimbus_domain::PatternBook;
use nimbus_tutor::{input_queue, MidiManager, MidiNoteOut, MonotonicClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod replay;
mod session;

use replay::ReplayEvent;
use session::Session;

#[derive(Parser, Debug)]
#[command(author, version, about = "Learn the clouds' rhythms on a MIDI drum pad")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List MIDI input and output ports
    Ports,
    /// Print a pattern book as YAML
    ShowBook {
        /// YAML or JSON pattern book; the built-in book when omitted
        #[arg(long)]
        book: Option<PathBuf>,
    },
    /// Play against the clouds from a MIDI pad
    Run {
        #[arg(long)]
        book: Option<PathBuf>,
        /// Substring of the input port name
        #[arg(long)]
        input: String,
        /// Substring of the output port used to play mastered clouds
        #[arg(long)]
        output: Option<String>,
        #[arg(long, default_value_t = 9)]
        channel: u8,
        #[arg(long, default_value_t = 16)]
        tick_ms: u64,
        #[arg(long, default_value_t = 256)]
        queue: usize,
    },
    /// Feed a recorded JSON event list through a simulated session
    Replay {
        events: PathBuf,
        #[arg(long)]
        book: Option<PathBuf>,
        #[arg(long, default_value_t = 0.016)]
        tick_seconds: f64,
    },
}

fn load_book(path: Option<&Path>) -> Result<PatternBook> {
    match path {
        Some(path) => PatternBook::from_path(path)
            .with_context(|| format!("loading pattern book {}", path.display())),
        None => Ok(PatternBook::builtin()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Args::parse().command {
        Command::Ports => {
            for device in MidiManager::list_inputs()? {
                println!("in   {}", device.name);
            }
            for device in MidiManager::list_outputs()? {
                println!("out  {}", device.name);
            }
        }
        Command::ShowBook { book } => {
            print!("{}", load_book(book.as_deref())?.to_yaml()?);
        }
        Command::Run {
            book,
            input,
            output,
            channel,
            tick_ms,
            queue,
        } => {
            let book = load_book(book.as_deref())?;
            run(book, &input, output.as_deref(), channel, tick_ms, queue).await?;
        }
        Command::Replay {
            events,
            book,
            tick_seconds,
        } => {
            let book = load_book(book.as_deref())?;
            let reader = BufReader::new(File::open(&events)?);
            let events: Vec<ReplayEvent> = serde_json::from_reader(reader)?;
            info!(count = events.len(), "loaded recorded events");
            let summary = replay::replay(book, &events, tick_seconds)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

async fn run(
    book: PatternBook,
    input: &str,
    output: Option<&str>,
    channel: u8,
    tick_ms: u64,
    queue: usize,
) -> Result<()> {
    let (sender, mut receiver) = input_queue(queue);
    let melody_cue = Arc::new(AtomicBool::new(false));
    let _connection = MidiManager::connect_input(input, sender, melody_cue.clone())?;
    let mut notes = match output {
        Some(hint) => Some(MidiNoteOut::connect(hint, channel, 110)?),
        None => None,
    };

    let mut session = Session::new(book, MonotonicClock::new())?;
    info!(cloud = %session.controller().current_pattern_id(), "session started");

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if melody_cue.swap(false, Ordering::AcqRel) {
                    session.melody_cue()?;
                }
                session.drain(&mut receiver, &mut |note: u8| strike_feedback(notes.as_mut(), note));
                session.step(&mut |note: u8| {
                    if let Some(out) = notes.as_mut() {
                        if let Err(err) = out.note_on(note) {
                            warn!(note, "playback failed: {err:?}");
                        }
                    }
                })?;
            }
            _ = &mut shutdown => {
                info!("stopping session");
                break;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(session.analytics())?);
    Ok(())
}

/// Echoes a kept strike on the active cloud's instrument.
fn strike_feedback(out: Option<&mut MidiNoteOut>, note: u8) {
    let Some(out) = out else {
        return;
    };
    if let Err(err) = out.note_on(note).and_then(|()| out.note_off(note)) {
        warn!(note, "strike feedback failed: {err:?}");
    }
}
