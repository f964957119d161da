use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use rik_assistant::api::Backend;
use rik_assistant::session::{Mode, Role, SessionState, SessionUpdate};
use rik_assistant::voice::{ConsoleSpeaker, Recognizer, Speaker, WakeWordDetector};
use rik_assistant::{Config, RikClient, SessionController, SessionHandle};

/// Rik - Voice-activated life coaching assistant
#[derive(Parser)]
#[command(name = "rik", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use the microphone and speakers (wake word, voice input, spoken replies)
    #[cfg(feature = "audio")]
    #[arg(long)]
    voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show today's progress summary
    Status,
    /// Print the morning briefing
    Briefing,
    /// Generate a schedule
    Schedule {
        /// Date to plan (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Send a single chat message
    Chat {
        /// Message to send
        message: String,
        /// Conversation mode (general, learning_routine, planning_day)
        #[arg(short, long, default_value = "general", value_parser = parse_mode)]
        context: Mode,
    },
    /// Test microphone input
    #[cfg(feature = "audio")]
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    #[cfg(feature = "audio")]
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    Mode::parse(s).ok_or_else(|| format!("unknown mode {s:?}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,rik_assistant=info",
        1 => "info,rik_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(
        base_url = %config.server.base_url,
        user_id = %config.user_id,
        "loaded configuration"
    );

    #[cfg(feature = "audio")]
    let voice = cli.voice;
    #[cfg(not(feature = "audio"))]
    let voice = false;

    let Some(command) = cli.command else {
        return interactive(config, voice).await;
    };

    let client = RikClient::from_config(&config)?;
    match command {
        Command::Status => cmd_status(&client).await,
        Command::Briefing => {
            let briefing = client.morning_briefing().await?;
            println!("{}", briefing.briefing);
            Ok(())
        }
        Command::Schedule { date } => {
            let date =
                date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let summary = client.generate_schedule(&date).await?;
            println!("Generated {} schedule item(s) for {date}", summary.count);
            Ok(())
        }
        Command::Chat { message, context } => {
            let reply = client.chat(&message, context).await?;
            println!("{}", reply.response);
            Ok(())
        }
        #[cfg(feature = "audio")]
        Command::TestMic { duration } => test_mic(duration).await,
        #[cfg(feature = "audio")]
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

async fn cmd_status(client: &RikClient) -> anyhow::Result<()> {
    let status = client.status().await?;

    if !status.greeting.is_empty() {
        println!("{}", status.greeting);
    }
    println!(
        "Schedule: {}/{} done",
        status.schedule_completed, status.schedule_total
    );
    println!("Habits:   {}/{} done", status.habits_done, status.habits_total);
    println!("Points:   {}", status.points);
    println!("Streak:   {} day(s)", status.streak);
    println!(
        "Routine:  {}",
        if status.routine_learned {
            "learned"
        } else {
            "not learned yet"
        }
    );

    Ok(())
}

/// Run an interactive session on the terminal
async fn interactive(mut config: Config, voice: bool) -> anyhow::Result<()> {
    let backend: Arc<dyn Backend> = Arc::new(RikClient::from_config(&config)?);
    let (speaker, recognizer) = voice_io(&mut config, voice);
    let text_mode = recognizer.is_none();

    tracing::info!(
        base_url = %config.server.base_url,
        user_id = %config.user_id,
        voice = !text_mode,
        "starting rik"
    );

    let wake = WakeWordDetector::new(config.session.wake_words.clone());
    let (handle, task) = SessionController::spawn(config.session, backend, speaker, recognizer);
    let printer = tokio::spawn(print_updates(handle.subscribe(), text_mode));

    if text_mode {
        println!("Rik is asleep. Type \"hey rik\" or /wake to start, /quit to exit.");
    } else {
        println!("Say \"hey rik\" to start. Type /quit to exit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        if !handle_line(&handle, &wake, line.trim()).await? {
            break;
        }
    }

    let _ = handle.shutdown().await;
    drop(handle);
    let _ = task.await;
    printer.abort();

    Ok(())
}

/// Apply one line of terminal input; returns false to quit
async fn handle_line(
    handle: &SessionHandle,
    wake: &WakeWordDetector,
    line: &str,
) -> anyhow::Result<bool> {
    let awake = handle.snapshot().state.is_awake();

    match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
        ("", _) => {}
        ("/quit" | "/exit", _) => return Ok(false),
        ("/wake", _) => handle.activate().await?,
        ("/sleep", _) => handle.deactivate().await?,
        ("/listen", _) => handle.start_voice_input().await?,
        ("/save-routine", _) => handle.save_routine().await?,
        ("/briefing", _) => handle.request_briefing().await?,
        ("/mode", "") => println!("Mode: {}", handle.snapshot().mode),
        ("/mode", name) => match Mode::parse(name) {
            Some(mode) => handle.set_mode(mode).await?,
            None => println!("Unknown mode {name:?} (general, routine, plan)"),
        },
        (cmd, _) if cmd.starts_with('/') => {
            println!("Commands: /wake /sleep /listen /save-routine /briefing /mode [name] /quit");
        }
        _ if awake => handle.submit(line).await?,
        _ if wake.contains_wake_word(line) => handle.activate().await?,
        _ => println!("Rik is asleep. Type \"hey rik\" or /wake first."),
    }

    Ok(true)
}

/// Print session updates to stdout
///
/// In text mode the console speaker already prints spoken replies, so only
/// messages that were logged without playback are echoed here.
async fn print_updates(mut updates: broadcast::Receiver<SessionUpdate>, text_mode: bool) {
    let mut state = SessionState::Dormant;

    loop {
        match updates.recv().await {
            Ok(SessionUpdate::State { state: next, mode }) => {
                if next != state {
                    tracing::debug!(state = %next, %mode, "state changed");
                    if !next.is_awake() && state.is_awake() {
                        println!("(Rik is asleep)");
                    }
                }
                state = next;
            }
            Ok(SessionUpdate::Message { message, spoken }) => match message.role {
                Role::User if !text_mode => println!("You: {}", message.content),
                Role::Assistant if !text_mode || !spoken => {
                    println!("Rik: {}", message.content);
                }
                _ => {}
            },
            Ok(SessionUpdate::Notice(notice)) => println!("! {notice}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "update printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

type VoiceIo = (Option<Arc<dyn Speaker>>, Option<Arc<dyn Recognizer>>);

/// Pick speech output and input for the session
#[cfg(feature = "audio")]
fn voice_io(config: &mut Config, voice: bool) -> VoiceIo {
    use rik_assistant::voice::{AudioSpeaker, MicrophoneRecognizer};

    if !voice {
        return (Some(Arc::new(ConsoleSpeaker::new("Rik"))), None);
    }

    config.session.auto_listen = true;

    let speaker: Arc<dyn Speaker> = match AudioSpeaker::from_config(&config.voice) {
        Ok(speaker) => Arc::new(speaker),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, printing replies instead");
            Arc::new(ConsoleSpeaker::new("Rik"))
        }
    };

    let recognizer: Option<Arc<dyn Recognizer>> =
        match MicrophoneRecognizer::from_config(&config.voice) {
            Ok(recognizer) => Some(Arc::new(recognizer)),
            Err(e) => {
                tracing::warn!(error = %e, "voice input unavailable, continuing in text mode");
                None
            }
        };

    (Some(speaker), recognizer)
}

#[cfg(not(feature = "audio"))]
fn voice_io(_config: &mut Config, _voice: bool) -> VoiceIo {
    (Some(Arc::new(ConsoleSpeaker::new("Rik"))), None)
}

/// Test microphone input
#[cfg(feature = "audio")]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use std::time::Duration;

    use rik_assistant::voice::{AudioCapture, SAMPLE_RATE};

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<f32>>();
    let capture = AudioCapture::start(tx).await?;
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            samples.extend(chunk);
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    drop(capture);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[cfg(feature = "audio")]
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test TTS output
#[cfg(feature = "audio")]
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    use rik_assistant::voice::AudioSpeaker;

    println!("Testing TTS with text: \"{text}\"\n");

    let speaker = AudioSpeaker::from_config(&config.voice)?;
    speaker.speak(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
