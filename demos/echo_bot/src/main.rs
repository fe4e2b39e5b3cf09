//! Echo Bot
//!
//! A small bot showing the Parley dispatch model end to end.
//!
//! # Commands
//!
//! | Command        | What it shows                                   |
//! |----------------|-------------------------------------------------|
//! | `+ping`        | a plain reply                                   |
//! | `+echo <text>` | quote-aware arguments                           |
//! | `+quiz`        | listening for a reply to a sent message         |
//! | `+vanish`      | sending, then unsending                         |
//! | `+whoami`      | roles and the username cache                    |
//! | `+uid`         | the mentioned or replied-to user                |
//!
//! A log handler also announces thread renames.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config demos/echo_bot/parley.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley::discord::{DiscordAdapter, normalize::THREAD_ID};
use parley::facebook::FacebookAdapter;
use parley::prelude::*;
use tracing::{error, info};

/// How long `quiz` waits for an answer.
const QUIZ_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `vanish` keeps its message around.
const VANISH_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "A small Parley bot")]
struct Args {
    /// Configuration file; searched for in the current directory when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, ...).
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Commands
// ============================================================================

async fn ping(ctx: CommandContext) -> Result<()> {
    ctx.io.reply("Pong! 🏓")?.await?;
    Ok(())
}

async fn echo(ctx: CommandContext) -> Result<()> {
    if ctx.args.is_empty() {
        ctx.io
            .reply(format!("Usage: {}echo <text>", ctx.prefix))?
            .await?;
        return Ok(());
    }
    ctx.io.reply(ctx.args.join(" "))?.await?;
    Ok(())
}

async fn quiz(ctx: CommandContext) -> Result<()> {
    let question = ctx
        .io
        .reply("🧠 What is 7 × 6? Reply to this message within 30 seconds.")?
        .await?;

    let mut replies = question.subscribe_replies();
    question.listen_replies(Some(QUIZ_TIMEOUT)).await?;

    let answer = tokio::time::timeout(QUIZ_TIMEOUT, replies.recv()).await;
    question.stop_listen_replies()?;

    match answer {
        Ok(Some(reply)) => {
            let body = reply
                .event
                .as_message()
                .map(|message| message.body.trim().to_string())
                .unwrap_or_default();
            let verdict = if body == "42" {
                "✅ Correct!"
            } else {
                "❌ Nope, it was 42."
            };
            reply.io.reply(verdict)?.await?;
        }
        _ => {
            ctx.io.send("⏰ Time's up! The answer was 42.")?.await?;
        }
    }
    Ok(())
}

async fn vanish(ctx: CommandContext) -> Result<()> {
    let handle = ctx
        .io
        .send("👻 This message will vanish in 5 seconds.")?
        .await?;
    tokio::time::sleep(VANISH_DELAY).await;
    ctx.io.unsend(&handle).await?;
    Ok(())
}

async fn whoami(ctx: CommandContext) -> Result<()> {
    let sender = ctx
        .event()
        .sender_id()
        .context("message without a sender")?
        .to_string();
    let name = ctx.username(&sender).await;

    ctx.io
        .reply(format!(
            "👤 {name}\n• ID: {sender}\n• Role: {}\n• Platform: {}",
            ctx.role,
            ctx.platform()
        ))?
        .await?;
    Ok(())
}

async fn uid(ctx: CommandContext) -> Result<()> {
    let text = match ctx.io.ref_sender_id() {
        Some(id) => format!("🆔 {id}"),
        None => "Mention someone or reply to their message.".to_string(),
    };
    ctx.io.reply(text)?.await?;
    Ok(())
}

// ============================================================================
// Event Handlers
// ============================================================================

async fn announce_rename(ctx: EventContext) -> Result<()> {
    let Some(view) = ctx.io.log_event() else {
        return Ok(());
    };
    let Some(name) = view.thread_name() else {
        return Ok(());
    };
    let Some(thread) = ctx.event().extras().get::<String>(THREAD_ID) else {
        return Ok(());
    };

    let text = match name {
        Some(name) => format!("✏️ This thread is now called \"{name}\"."),
        None => "✏️ This thread's name was cleared.".to_string(),
    };
    ctx.io.send_to(text, &thread)?.await?;
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ParleyRuntime::builder();
    if let Some(config) = &args.config {
        builder = builder.config_file(config);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile.clone());
    }
    let runtime = builder.build()?;

    if let Err(e) = runtime.register_adapter::<DiscordAdapter>() {
        error!(error = %e, "Discord adapter not available");
    }
    if let Err(e) = runtime.register_adapter::<FacebookAdapter>() {
        error!(error = %e, "Facebook adapter not available");
    }

    runtime.register_command(FnCommand::new("ping", ping).description("Replies with pong"))?;
    runtime.register_command(
        FnCommand::new("echo", echo)
            .alias("say")
            .description("Repeats its arguments"),
    )?;
    runtime.register_command(FnCommand::new("quiz", quiz).description("Asks a question"))?;
    runtime.register_command(
        FnCommand::new("vanish", vanish).description("Sends a message, then unsends it"),
    )?;
    runtime.register_command(
        FnCommand::new("whoami", whoami)
            .prefix_mode(PrefixMode::Optional)
            .description("Shows your name and role"),
    )?;
    runtime.register_command(FnCommand::new("uid", uid).description("Shows a user's id"))?;
    runtime.register_event_handler(announce_rename);

    info!(
        commands = runtime.router().command_count(),
        adapters = runtime.registry().count(),
        "Echo bot ready"
    );

    runtime.run().await?;
    Ok(())
}
