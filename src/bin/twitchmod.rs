//! Bulk messaging and moderation for a Twitch channel.
//!
//! # Usage
//!
//! ```bash
//! # Fully interactive: asks for credentials, channel, mode, and file
//! twitchmod
//!
//! # Send every line of messages.txt to #somechannel, 2 seconds apart
//! twitchmod --channel somechannel --mode messages --file messages.txt --delay 2
//!
//! # Time out everyone in users.txt for 5 minutes without a confirmation prompt
//! twitchmod --channel somechannel --mode timeout --file users.txt --duration 300 --yes
//! ```
//!
//! Moderation files list one login per line, optionally as `login|reason`.
//! Credentials are read from `twitch_config.json` when present.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use twitchmod::config::{
    DEFAULT_CONFIG_PATH, is_affirmative, parse_delay, parse_timeout_duration,
};
use twitchmod::workload::{load_messages, load_targets};
use twitchmod::{
    Args, BatchAction, BatchRunner, ChatConfig, ChatSession, Credentials, Error, Helix, Mode,
    ModerationClient, PlainTextRenderer, Renderer, StoredConfig, register_biometrics,
};

const TOKEN_HELP: &str = "\
To get an OAuth token and Client ID:
1. Open https://twitchtokengenerator.com/
2. Click 'Connect with Twitch' and authorize
3. Select the scopes you need:
   chat:read, chat:edit (messages)
   moderator:manage:banned_users (bans and timeouts)
4. Copy the 'Access Token' (with or without the 'oauth:' prefix)
5. Copy the 'Client ID' from the same page
";

const MENU: &str = "
==================================================
Choose a mode:
==================================================
1. Send messages from a file
2. Ban users from a file
3. Time out users from a file
==================================================";

/// Main entry point for the twitchmod tool.
#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    register_biometrics(biometrics::Collector::new());

    let (args, _) = Args::from_command_line_relaxed("twitchmod [OPTIONS]");

    // Ctrl+C stops the batch between items; the connection is still closed.
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer = PlainTextRenderer::with_color(!args.no_color).with_interrupt(interrupted);
    let mut rl = DefaultEditor::new()?;

    println!("==================================================");
    println!("  twitchmod - messages and moderation");
    println!("==================================================");

    match run(&args, &mut rl, &mut renderer).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) if err.is_abort() => Ok(ExitCode::SUCCESS),
        Err(err) => {
            renderer.print_error(&err.to_string());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    args: &Args,
    rl: &mut DefaultEditor,
    renderer: &mut PlainTextRenderer,
) -> Result<(), Error> {
    let credentials = obtain_credentials(args, rl, renderer)?;

    let channel = match &args.channel {
        Some(channel) => channel.clone(),
        None => ask(rl, "Channel name (without #): ")?,
    };
    let channel = channel.trim().trim_start_matches('#').to_lowercase();
    if channel.is_empty() {
        return Err(Error::validation("no channel given", Some("channel".to_string())));
    }

    let mode: Mode = match &args.mode {
        Some(mode) => mode.parse()?,
        None => {
            println!("{MENU}");
            ask(rl, "\nEnter a number (1-3): ")?.parse()?
        }
    };

    let file = match &args.file {
        Some(file) => file.clone(),
        None => {
            if mode.is_moderation() {
                println!("\nFile format:\n  login\n  or\n  login|reason");
            } else {
                println!("\nFile format: one message per line");
            }
            ask(rl, "Path to the input file: ")?
        }
    };
    let file = file.trim().trim_matches('"');
    let workload = if mode.is_moderation() {
        load_targets(file)?
    } else {
        load_messages(file)?
    };

    let delay = match &args.delay {
        Some(delay) => parse_delay(Some(delay.as_str())),
        None => {
            let answer = ask(rl, "Delay between actions (seconds, default 1.5): ")?;
            parse_delay(Some(answer.as_str()))
        }
    };

    let action = match mode {
        Mode::Messages => BatchAction::SendMessages,
        Mode::Ban => BatchAction::Ban,
        Mode::Timeout => {
            let duration = match &args.duration {
                Some(duration) => parse_timeout_duration(Some(duration.as_str()))?,
                None => loop {
                    let answer =
                        ask(rl, "Timeout duration in seconds (default 600 = 10 minutes): ")?;
                    match parse_timeout_duration(Some(answer.as_str())) {
                        Ok(duration) => break duration,
                        Err(err) => renderer.print_warning(&err.to_string()),
                    }
                },
            };
            BatchAction::Timeout { duration }
        }
    };

    // Everything that can fail locally fails before the first network call.
    let runner = BatchRunner::new(action, delay)?;
    let helix = Helix::new(&credentials)?;

    renderer.print_info("Connecting to Twitch chat...");
    let mut session =
        ChatSession::connect(&ChatConfig::new(), &credentials, &channel, &helix).await?;
    if session.join_confirmed() {
        renderer.print_info(&format!("Connected to #{channel}\n"));
    } else {
        renderer.print_warning(&format!("no join acknowledgment from #{channel}; continuing"));
    }

    let skip_confirmation = args.yes;
    let mut confirm = |prompt: &str| {
        skip_confirmation || ask(rl, prompt).is_ok_and(|answer| is_affirmative(&answer))
    };

    let outcome = if mode.is_moderation() {
        let context = session.channel().clone();
        let client = ModerationClient::new(&helix, &context);
        runner
            .run_moderation(&client, &workload, &mut confirm, renderer)
            .await
    } else {
        runner
            .run_messages(&mut session, &workload, &mut confirm, renderer)
            .await
    };

    session.disconnect().await;
    renderer.print_info("Disconnected from Twitch.");

    let report = outcome?;
    if report.interrupted {
        renderer.print_info("Stopped by the operator.");
    }
    Ok(())
}

/// Decide which credentials to use: command line first, then the stored
/// file (if the operator wants it), then interactive entry.
fn obtain_credentials(
    args: &Args,
    rl: &mut DefaultEditor,
    renderer: &mut PlainTextRenderer,
) -> Result<Credentials, Error> {
    if let (Some(username), Some(token), Some(client_id)) =
        (&args.username, &args.token, &args.client_id)
    {
        return Ok(Credentials::new(username, token, client_id));
    }

    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(mut stored) = StoredConfig::load(config_path) {
        renderer.print_info(&format!("Found saved credentials for {}", stored.username));
        if is_affirmative(&ask(rl, "Use saved credentials? (y/n): ")?) {
            if stored.client_id.trim().is_empty() {
                renderer.print_info("The saved credentials have no Client ID.");
                stored.client_id = ask(rl, "Client ID: ")?;
            }
            return Ok(stored.credentials());
        }
    }

    println!("\n{TOKEN_HELP}");
    let username = match &args.username {
        Some(username) => username.clone(),
        None => ask(rl, "Twitch username: ")?,
    };
    let token = match &args.token {
        Some(token) => token.clone(),
        None => ask(rl, "Access Token: ")?,
    };
    let client_id = match &args.client_id {
        Some(client_id) => client_id.clone(),
        None => ask(rl, "Client ID: ")?,
    };
    let stored = StoredConfig {
        username: username.trim().to_lowercase(),
        token: token.trim().to_string(),
        client_id: client_id.trim().to_string(),
    };

    if is_affirmative(&ask(rl, "\nSave credentials for next time? (y/n): ")?) {
        match stored.save(config_path) {
            Ok(()) => renderer.print_info(&format!("Saved to {config_path}\n")),
            Err(err) => renderer.print_warning(&format!("could not save credentials: {err}")),
        }
    }
    Ok(stored.credentials())
}

/// Read one trimmed line from the operator. Ctrl+C or Ctrl+D at a prompt
/// ends the run.
fn ask(rl: &mut DefaultEditor, prompt: &str) -> Result<String, Error> {
    match rl.readline(prompt) {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            println!("\nInterrupted.");
            Err(Error::abort("interrupted at a prompt"))
        }
        Err(err) => Err(Error::validation(format!("input error: {err}"), None)),
    }
}
