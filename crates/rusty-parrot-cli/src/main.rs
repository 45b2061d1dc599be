use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;

use rusty_parrot_core::config::{Config, LoggingConfig};
use rusty_parrot_core::{ParrotError, VoiceMode};
use rusty_parrot_media::wav;
use rusty_parrot_realtime::collect_transcript;
use rusty_parrot_translate::{Translator, build_instructions};

#[derive(Parser)]
#[command(
    name = "rusty-parrot",
    about = "Speech-to-speech translation that keeps the speaker's voice",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a WAV recording into another language
    Translate {
        /// Input WAV file (any rate/channel count)
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file (24 kHz mono)
        #[arg(short, long)]
        output: PathBuf,

        /// Output voice
        #[arg(long)]
        voice: Option<String>,

        /// Voice mode: preserve, enhanced or neutral
        #[arg(long)]
        mode: Option<String>,

        /// Target language code
        #[arg(long, conflicts_with = "pair")]
        target: Option<String>,

        /// Language pair label, e.g. "English → French"
        #[arg(long)]
        pair: Option<String>,

        /// Upload in real-time paced chunks and write audio as it arrives
        #[arg(long)]
        streaming: bool,

        /// Print the transcript of the translated speech (streaming only)
        #[arg(long, requires = "streaming")]
        transcript: bool,
    },

    /// Translate text
    Text {
        text: String,

        /// Source language code, or "auto"
        #[arg(long, default_value = "auto")]
        from: String,

        /// Target language code
        #[arg(long)]
        to: Option<String>,
    },

    /// List available voices
    Voices,

    /// List languages and language pairs
    Languages,

    /// List voice modes
    Modes,

    /// Print the session instructions for a mode and language
    Instructions {
        #[arg(long, default_value = "preserve")]
        mode: String,

        #[arg(long, default_value = "fr")]
        target: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets redacted)
    Show,
    /// Check configuration for problems
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let defaults = LoggingConfig::default();
    let logging = logging.unwrap_or(&defaults);

    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());
    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    for directive in &logging.filters {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring invalid log filter '{directive}': {e}"),
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let to_stdout = logging.output == "stdout";
    if logging.format == "json" {
        let builder = builder.json();
        if to_stdout {
            builder.with_writer(std::io::stdout).init();
        } else {
            builder.with_writer(std::io::stderr).init();
        }
    } else if to_stdout {
        builder.with_writer(std::io::stdout).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(cli.verbose, config.logging.as_ref());

    match cli.command {
        Commands::Translate {
            input,
            output,
            voice,
            mode,
            target,
            pair,
            streaming,
            transcript,
        } => {
            let mut translator = Translator::from_config(&config)?;
            let voice = voice.unwrap_or_else(|| translator.voice().to_string());
            let mode = mode
                .map(|m| VoiceMode::parse(&m))
                .unwrap_or(translator.voice_mode());
            let target = target.unwrap_or_else(|| translator.target_language().to_string());
            translator.configure(&voice, mode, &target)?;
            if let Some(label) = pair {
                let pair = translator.select_language_pair(&label);
                tracing::info!(pair = pair.label, "Using language pair");
            }

            let pcm = wav::read_wav_file(&input)?;
            let audio = if streaming {
                translate_streaming(&translator, pcm, transcript).await
            } else {
                translator.translate_single_shot(&pcm).await
            };

            let audio = match audio {
                Ok(audio) => audio,
                Err(e) => {
                    eprintln!("{}", e.user_summary());
                    return Err(e.into());
                }
            };
            wav::write_wav_file(&output, &audio)?;
            println!(
                "Wrote {} ({:.1} s of audio)",
                output.display(),
                audio.len() as f64 / (rusty_parrot_media::SAMPLE_RATE as f64 * 2.0)
            );
        }
        Commands::Text { text, from, to } => {
            let translator = Translator::from_config(&config)?;
            let to = to.unwrap_or_else(|| translator.target_language().to_string());
            let result = translator.translate_text(&text, &from, &to).await?;
            let source = result.source_info(translator.catalog());
            let target = result.target_info(translator.catalog());
            println!("{} {} → {} {}", source.flag, source.name, target.flag, target.name);
            println!("{}", result.text);
        }
        Commands::Voices => {
            let catalog = rusty_parrot_core::Catalog::builtin();
            for voice in catalog.voices() {
                println!("{:<10} {:<10} {}", voice.id, voice.name, voice.description);
            }
        }
        Commands::Languages => {
            let catalog = rusty_parrot_core::Catalog::builtin();
            for lang in catalog.languages() {
                println!("{} {:<4} {}", lang.flag, lang.code, lang.name);
            }
            println!();
            println!("Language pairs:");
            for pair in catalog.language_pairs() {
                println!("  {}  (swap: {})", pair.label, pair.swap().label);
            }
        }
        Commands::Modes => {
            for mode in VoiceMode::ALL {
                println!("{:<10} {}", mode.as_str(), mode.description());
            }
        }
        Commands::Instructions { mode, target } => {
            let catalog = rusty_parrot_core::Catalog::builtin();
            println!("{}", build_instructions(&catalog, VoiceMode::parse(&mode), &target));
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut redacted = config.clone();
                for key in [&mut redacted.realtime.api_key, &mut redacted.text.api_key] {
                    if key.is_some() {
                        *key = Some("***".into());
                    }
                }
                println!("Config: {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if errors.is_empty() {
                    println!("Config OK ({} warning(s))", warnings.len());
                } else {
                    anyhow::bail!("{} config error(s)", errors.len());
                }
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Config::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
        },
    }

    Ok(())
}

async fn translate_streaming(
    translator: &Translator,
    pcm: Vec<u8>,
    show_transcript: bool,
) -> Result<Vec<u8>, ParrotError> {
    let mut stream = translator.translate_pcm_streaming(pcm).await?;
    let transcript = stream.take_transcript();

    let mut audio = Vec::new();
    let mut stderr = std::io::stderr();
    while let Some(chunk) = stream.next().await {
        audio.extend_from_slice(&chunk?);
        let _ = write!(stderr, "\rReceived {} bytes", audio.len());
        let _ = stderr.flush();
    }
    let _ = writeln!(stderr);

    if show_transcript {
        if let Some(queue) = transcript {
            println!("Transcript: {}", collect_transcript(queue).await);
        }
    }
    Ok(audio)
}
