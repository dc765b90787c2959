//! eartrainer CLI - practice, render and score ear-training exercises.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eartrainer_core::dsp::{AudioBuffer, analysis, renderer};
use eartrainer_core::error::AudioError;
use eartrainer_core::exercise::{CorrectAnswer, ExerciseSpec, UserAnswer};
use eartrainer_core::playback::{AudioSink, EndedSignal, SilentSink};
use eartrainer_core::profile::{format_db, format_hz, format_pan};
use eartrainer_core::service::{AnyService, LocalService, SessionContext};
use eartrainer_core::{Config, Difficulty, ExerciseKind, ExerciseRunner};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eartrainer")]
#[command(version, about = "Ear-training exercises in the terminal", long_about = None)]
struct Cli {
    /// Config file (default: config.toml in the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer exercises interactively
    Practice {
        /// Exercise kind (note, panning, volume, equalizing, interval-sequence, harmony-chord)
        #[arg(short, long, default_value = "note")]
        kind: ExerciseKind,

        #[arg(short, long, default_value = "easy")]
        difficulty: Difficulty,

        /// Stop after this many exercises
        #[arg(short, long, default_value = "5")]
        rounds: u32,

        /// Sign in with this email instead of practicing as a guest
        #[arg(long, requires = "password")]
        email: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Render an exercise to a WAV file
    Render {
        /// Output WAV file path
        output: PathBuf,

        /// Exercise JSON to render; a generated one when absent
        #[arg(short, long)]
        exercise: Option<PathBuf>,

        #[arg(short, long, default_value = "note")]
        kind: ExerciseKind,

        #[arg(short, long, default_value = "easy")]
        difficulty: Difficulty,

        /// Sample rate in Hz (default: from config)
        #[arg(short, long)]
        sample_rate: Option<u32>,
    },

    /// Score an answer to an exercise JSON file
    Score {
        exercise: PathBuf,

        /// Option index, number, or space-separated notes
        answer: String,
    },

    /// Show a leaderboard (needs the remote client)
    Leaderboard {
        /// Per-exercise board instead of the global one
        #[arg(short, long)]
        kind: Option<ExerciseKind>,

        #[arg(short, long)]
        difficulty: Option<Difficulty>,

        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Practice {
            kind,
            difficulty,
            rounds,
            email,
            password,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(practice(&config, kind, difficulty, rounds, email, password))?;
        }

        Commands::Render {
            output,
            exercise,
            kind,
            difficulty,
            sample_rate,
        } => {
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            let spec = match exercise {
                Some(path) => read_exercise(&path)?,
                None => LocalService::new(config.seed).generate(kind, difficulty),
            };
            let mut buffer = eartrainer_core::render_exercise(&spec, config.sample_rate)?;
            apply_gain(&mut buffer, config.master_gain);
            renderer::write_wav(&output, &buffer)?;

            println!("Exercise:  {} ({}, {})", spec.id, spec.kind, spec.difficulty);
            println!("Question:  {}", spec.question);
            println!("Answer:    {}", describe_answer(&spec.correct_answer));
            println!("Output:    {}", output.display());
            println!("{}", serde_json::to_string_pretty(&analysis::analyze(&buffer))?);
        }

        Commands::Score { exercise, answer } => {
            let spec = read_exercise(&exercise)?;
            let answer = parse_answer(&spec, &answer)?;
            let result = eartrainer_core::validate(&spec, &answer)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Leaderboard {
            kind,
            difficulty,
            limit,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(leaderboard(&config, kind, difficulty, limit))?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn,eartrainer_core=info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_exercise(path: &Path) -> Result<ExerciseSpec, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let spec: ExerciseSpec = serde_json::from_str(&text)?;
    spec.check()?;
    Ok(spec)
}

fn apply_gain(buffer: &mut AudioBuffer, gain: f64) {
    let gain = gain as f32;
    for s in &mut buffer.samples {
        *s *= gain;
    }
}

/// Read an answer typed for `spec`: an option number (1-based), a number,
/// or note names.
fn parse_answer(spec: &ExerciseSpec, input: &str) -> Result<UserAnswer, String> {
    let input = input.trim();
    match &spec.correct_answer {
        CorrectAnswer::NoteChoice { options, .. } => {
            let n: usize = input
                .parse()
                .map_err(|_| format!("expected an option number, got '{input}'"))?;
            if n == 0 || n > options.len() {
                return Err(format!("pick an option between 1 and {}", options.len()));
            }
            Ok(UserAnswer::Index(n - 1))
        }
        CorrectAnswer::Pan(_) | CorrectAnswer::GainOffsetDb(_) | CorrectAnswer::Frequency(_) => input
            .trim_end_matches(|c: char| c.is_alphabetic() || c == '%')
            .trim()
            .parse()
            .map(UserAnswer::Scalar)
            .map_err(|_| format!("expected a number, got '{input}'")),
        CorrectAnswer::Sequence(_) | CorrectAnswer::Chord(_) => Ok(UserAnswer::Notes(
            input
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
    }
}

fn describe_answer(answer: &CorrectAnswer) -> String {
    match answer {
        CorrectAnswer::NoteChoice { index, options } => options.get(*index).cloned().unwrap_or_default(),
        CorrectAnswer::Pan(v) => format_pan(*v),
        CorrectAnswer::GainOffsetDb(v) => format_db(*v),
        CorrectAnswer::Frequency(v) => format_hz(*v),
        CorrectAnswer::Sequence(notes) => notes.join(" "),
        CorrectAnswer::Chord(notes) => notes.join(" + "),
    }
}

// ── Practice ───────────────────────────────────────────────────────────

/// The output the CLI plays through: the default device when built with
/// it, silence otherwise.
enum CliSink {
    #[cfg(feature = "device")]
    Device(eartrainer_core::playback::device::DeviceSink),
    Silent(SilentSink),
}

impl CliSink {
    fn open(config: &Config) -> Self {
        #[cfg(feature = "device")]
        match eartrainer_core::playback::device::DeviceSink::open(config.master_gain) {
            Ok(device) => return CliSink::Device(device),
            Err(e) => tracing::warn!("no audio output, practicing silently: {e}"),
        }
        #[cfg(not(feature = "device"))]
        tracing::warn!("built without audio output, practicing silently");
        CliSink::Silent(SilentSink::new(config.sample_rate))
    }
}

impl AudioSink for CliSink {
    fn sample_rate(&self) -> u32 {
        match self {
            #[cfg(feature = "device")]
            CliSink::Device(s) => s.sample_rate(),
            CliSink::Silent(s) => s.sample_rate(),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            #[cfg(feature = "device")]
            CliSink::Device(s) => s.is_available(),
            CliSink::Silent(s) => s.is_available(),
        }
    }

    fn start(&self, buffer: AudioBuffer) -> Result<EndedSignal, AudioError> {
        match self {
            #[cfg(feature = "device")]
            CliSink::Device(s) => s.start(buffer),
            CliSink::Silent(s) => s.start(buffer),
        }
    }

    fn stop_all(&self) {
        match self {
            #[cfg(feature = "device")]
            CliSink::Device(s) => s.stop_all(),
            CliSink::Silent(s) => s.stop_all(),
        }
    }
}

async fn practice(
    config: &Config,
    kind: ExerciseKind,
    difficulty: Difficulty,
    rounds: u32,
    email: Option<String>,
    password: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = sign_in(config, email, password).await?;
    let service = AnyService::for_session(&session, config)?;
    let mut runner = ExerciseRunner::new(service, Arc::new(CliSink::open(config)), kind, difficulty);
    let profile = kind.profile();

    println!("{}", profile.title);
    println!("{}\n", profile.instructions);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    for round in 1..=rounds {
        let spec = match runner.load(kind, difficulty).await {
            Ok(spec) => spec.clone(),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        println!("── Exercise {round}/{rounds} ── {}", spec.question);
        let options = spec.note_options();
        if !options.is_empty() {
            let listed: Vec<String> = options
                .iter()
                .enumerate()
                .map(|(i, o)| format!("{}) {o}", i + 1))
                .collect();
            println!("{}", listed.join("  "));
        }
        runner.listen().await?;
        println!("{}", runner.status_text());

        loop {
            print!("answer (r = replay, q = quit) > ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                return Ok(());
            };
            let line = line?;
            match line.trim() {
                "q" => return finish(&session, runner.totals()),
                "r" => {
                    runner.listen().await?;
                    continue;
                }
                _ => {}
            }
            let answer = match parse_answer(&spec, &line) {
                Ok(a) => a,
                Err(e) => {
                    eprintln!("{e}");
                    continue;
                }
            };
            if let Err(e) = fill_draft(&mut runner, answer) {
                eprintln!("{e}");
                continue;
            }
            match runner.submit().await {
                Ok(verdict) => {
                    println!("{} (accuracy {:.0}%)", verdict.message, verdict.accuracy);
                    break;
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    }

    finish(&session, runner.totals())
}

/// Copy a typed answer into the runner's draft.
fn fill_draft(
    runner: &mut ExerciseRunner<AnyService, CliSink>,
    answer: UserAnswer,
) -> Result<(), eartrainer_core::error::RunnerError> {
    runner.clear_selection()?;
    match answer {
        UserAnswer::Index(i) => runner.select_index(i),
        UserAnswer::Scalar(v) => runner.set_scalar(v),
        UserAnswer::Notes(notes) => {
            for note in &notes {
                if runner.kind() == ExerciseKind::HarmonyChord {
                    runner.toggle_note(note)?;
                } else {
                    runner.push_note(note)?;
                }
            }
            Ok(())
        }
    }
}

fn finish(
    session: &SessionContext,
    totals: eartrainer_core::service::ScoreTotals,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "\n{}: {} points, {}/{} correct",
        session.user().username,
        totals.score,
        totals.correct_count,
        totals.question_count
    );
    Ok(())
}

#[cfg(feature = "remote")]
async fn sign_in(
    config: &Config,
    email: Option<String>,
    password: Option<String>,
) -> Result<SessionContext, Box<dyn std::error::Error>> {
    match (email, password) {
        (Some(email), Some(password)) => {
            let client = eartrainer_core::service::RemoteService::anonymous(config)?;
            Ok(client.login(&email, &password).await?)
        }
        _ => Ok(SessionContext::guest()),
    }
}

#[cfg(not(feature = "remote"))]
async fn sign_in(
    _config: &Config,
    email: Option<String>,
    _password: Option<String>,
) -> Result<SessionContext, Box<dyn std::error::Error>> {
    if email.is_some() {
        tracing::warn!("built without the remote client, practicing as a guest");
    }
    Ok(SessionContext::guest())
}

#[cfg(feature = "remote")]
async fn leaderboard(
    config: &Config,
    kind: Option<ExerciseKind>,
    difficulty: Option<Difficulty>,
    limit: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = eartrainer_core::service::RemoteService::anonymous(config)?;
    let rows = match kind {
        Some(kind) => client.exercise_leaderboard(kind, difficulty, limit, 0).await?,
        None => client.global_leaderboard(limit, 0).await?,
    };
    for row in rows {
        println!(
            "{:>3}. {:<20} {:>6} pts  {:>5.1}%  streak {}",
            row.rank,
            row.display_name(),
            row.total_score,
            row.success_rate * 100.0,
            row.longest_streak
        );
    }
    Ok(())
}

#[cfg(not(feature = "remote"))]
async fn leaderboard(
    _config: &Config,
    _kind: Option<ExerciseKind>,
    _difficulty: Option<Difficulty>,
    _limit: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    Err("leaderboards need a build with the remote client".into())
}
