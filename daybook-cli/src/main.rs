// Daybook CLI - Streaming chat sessions with daily-activity logging
// Runs a session against an external generation command and stores
// extracted activity records in SQLite

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use daybook_core::{
    ActivityStore, EngineError, EngineHandle, EosStop, GenerationEngine, GenerationParams,
    Session, SessionError, StopPredicate,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Chat(cmd) => handle_chat(cmd).await?,
        Command::Show(cmd) => handle_show(cmd)?,
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "daybook",
    author,
    version,
    about = "Daybook: chat with a generation backend and log daily activities",
    long_about = "Streams a reply from an external generation command, then mines it for\ndaily-activity fields (steps, sleep, mood, ...) and stores them by day."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one chat session and log any extracted activity record
    Chat(ChatArgs),
    /// Show activity records stored for a day
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// The message to send
    message: String,
    /// Day number the resulting record is keyed by
    #[arg(short, long)]
    day: u32,
    /// Shell command that reads a prompt on stdin and streams the reply on stdout
    #[arg(short, long)]
    engine_cmd: String,
    /// Database path (default: ./activities.db)
    #[arg(long, default_value = "activities.db")]
    db: PathBuf,
    /// Cap on newly decoded tokens
    #[arg(long, default_value_t = 256)]
    max_new_tokens: usize,
    /// Use greedy decoding instead of sampling
    #[arg(long)]
    greedy: bool,
    #[arg(long, default_value_t = 0.9)]
    top_p: f64,
    #[arg(long, default_value_t = 50)]
    top_k: u32,
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,
    /// Beam search width (1 = disabled)
    #[arg(long, default_value_t = 1)]
    num_beams: u32,
    /// Seconds to wait for each chunk before giving up
    #[arg(long, default_value_t = 10)]
    read_timeout: u64,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Day number to look up
    #[arg(short, long)]
    day: u32,
    /// Database path (default: ./activities.db)
    #[arg(long, default_value = "activities.db")]
    db: PathBuf,
}

async fn handle_chat(args: &ChatArgs) -> Result<()> {
    let params = GenerationParams {
        max_new_tokens: args.max_new_tokens,
        do_sample: !args.greedy,
        top_p: args.top_p,
        top_k: args.top_k,
        temperature: args.temperature,
        num_beams: args.num_beams,
        read_timeout: Duration::from_secs(args.read_timeout),
    };

    let engine = EngineHandle::new(Arc::new(CommandEngine {
        command: args.engine_cmd.clone(),
    }));
    // The command engine signals end-of-turn by closing stdout, so no
    // token id is terminal.
    let mut session =
        Session::new(engine).with_stop_predicate(Arc::new(EosStop::with_ids(Vec::new())));

    // Stream the reply as it grows: each partial is cumulative, so only
    // the new suffix gets printed.
    let mut printed = 0usize;
    let result = session
        .run(&args.message, args.day, &params, |partial| {
            print!("{}", &partial[printed..]);
            let _ = std::io::stdout().flush();
            printed = partial.len();
        })
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(SessionError::ReadTimeout { partial }) => {
            println!();
            return Err(eyre!(
                "timed out waiting for the backend ({} chars of partial output received)",
                partial.len()
            ));
        }
        Err(e) => return Err(e).context("session failed"),
    };

    // Flush whatever the final break-before-yield step held back.
    if outcome.final_text.len() > printed {
        print!("{}", &outcome.final_text[printed..]);
    }
    println!();

    match outcome.record {
        Ok(Some(record)) => {
            let store = ActivityStore::open(&args.db)
                .with_context(|| format!("Failed to open {}", args.db.display()))?;
            let id = store.insert(&record)?;
            eprintln!("✓ Logged activity record #{id} for day {}", record.day);
        }
        Ok(None) => {
            eprintln!("No activity fields recognized; nothing logged");
        }
        Err(e) => {
            eprintln!("⚠ Reply contained an unusable activity value: {e}");
        }
    }

    Ok(())
}

fn handle_show(args: &ShowArgs) -> Result<()> {
    let store = ActivityStore::open(&args.db)
        .with_context(|| format!("Failed to open {}", args.db.display()))?;

    let records = store.for_day(args.day)?;
    if records.is_empty() {
        eprintln!("No records for day {}", args.day);
        return Ok(());
    }
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// Generation backend over an external command: the prompt goes to the
/// child's stdin, the reply streams back on stdout. Each successful read
/// is one chunk. The process is the blocking primitive; cancellation
/// kills it between reads.
struct CommandEngine {
    command: String,
}

impl GenerationEngine for CommandEngine {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stop: &dyn StopPredicate,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), EngineError> {
        tracing::debug!(command = %self.command, "spawning engine command");
        let mut child = ProcessCommand::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("DAYBOOK_MAX_NEW_TOKENS", params.max_new_tokens.to_string())
            .env("DAYBOOK_DO_SAMPLE", params.do_sample.to_string())
            .env("DAYBOOK_TOP_P", params.top_p.to_string())
            .env("DAYBOOK_TOP_K", params.top_k.to_string())
            .env("DAYBOOK_TEMPERATURE", params.temperature.to_string())
            .env("DAYBOOK_NUM_BEAMS", params.num_beams.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::new(format!("failed to spawn engine command: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| EngineError::new(format!("failed to write prompt: {e}")))?;
            // Dropping stdin closes it so the command sees EOF.
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::new("engine command has no stdout"))?;

        let mut buf = [0u8; 256];
        let mut pending: Vec<u8> = Vec::new();
        let mut generated: Vec<u32> = Vec::new();
        let mut killed = false;
        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                killed = true;
                break;
            }
            let n = stdout
                .read(&mut buf)
                .map_err(|e| EngineError::new(format!("failed to read engine output: {e}")))?;
            if n == 0 {
                // Stream ended; whatever is still pending can no longer
                // become a complete character.
                if !pending.is_empty() {
                    let tail = String::from_utf8_lossy(&pending).into_owned();
                    emit(&tail);
                }
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            // The command exposes no token ids; reads stand in as tokens
            // so the predicate still sees one consultation per chunk.
            let token = generated.len() as u32;
            generated.push(token);
            if stop.should_stop(token, &generated) {
                let _ = child.kill();
                killed = true;
                break;
            }

            // A read can end mid-character; the incomplete tail stays
            // pending until the next read completes it.
            let chunk = take_complete_utf8(&mut pending);
            if chunk.is_empty() {
                continue;
            }
            if !emit(&chunk) {
                let _ = child.kill();
                killed = true;
                break;
            }
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::new(format!("failed to wait for engine command: {e}")))?;
        if !status.success() && !killed {
            return Err(EngineError::new(format!(
                "engine command exited with {status}"
            )));
        }
        Ok(())
    }
}

/// Split off the longest valid UTF-8 prefix of `pending` as a String,
/// leaving an incomplete trailing sequence behind for the next read. A
/// stream with truly invalid bytes decodes lossily.
fn take_complete_utf8(pending: &mut Vec<u8>) -> String {
    let split = match std::str::from_utf8(pending) {
        Ok(s) => s.len(),
        // error_len() of None marks an unexpected end of input, i.e. a
        // character cut off by the read boundary.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };
    let rest = pending.split_off(split);
    let chunk = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    chunk
}
