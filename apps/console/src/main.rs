use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, ChatEvent, ChatSession, ChatTransport, HttpTransport, MutationOutcome,
    ThreadLoad,
};
use shared::{
    domain::{DiscussionId, Identity, MessageId},
    protocol::{DiscussionSummary, Message},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Inspect and drive chat discussions against the backend")]
struct Cli {
    /// Overrides `server_url` from chat.toml / the environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Email of the signed-in user.
    #[arg(long, env = "CHAT_IDENTITY")]
    identity: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Discussions,
    Open {
        discussion: String,
    },
    Send {
        discussion: String,
        text: String,
    },
    Edit {
        discussion: String,
        message: String,
        text: String,
    },
    Delete {
        discussion: String,
        message: String,
    },
    Start {
        peer: String,
    },
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    let transport: Arc<dyn ChatTransport> = Arc::new(HttpTransport::new(&settings.server_url)?);
    let session = ChatSession::connect(transport, Identity::new(cli.identity), settings).await;

    match cli.command {
        Command::Discussions => {
            let discussions = session.discussions().await;
            if discussions.is_empty() {
                println!("no discussions");
            }
            for summary in discussions.iter() {
                print_summary(summary);
            }
            println!("unread total: {}", session.total_unread().await);
        }
        Command::Open { discussion } => {
            open(&session, &discussion).await?;
        }
        Command::Send { discussion, text } => {
            open(&session, &discussion).await?;
            report(session.send_message(&text).await)?;
            print_thread(&session.messages().await);
        }
        Command::Edit {
            discussion,
            message,
            text,
        } => {
            open(&session, &discussion).await?;
            report(session.edit_message(&MessageId::new(message), &text).await)?;
            print_thread(&session.messages().await);
        }
        Command::Delete {
            discussion,
            message,
        } => {
            open(&session, &discussion).await?;
            report(session.delete_message(&MessageId::new(message)).await)?;
            print_thread(&session.messages().await);
        }
        Command::Start { peer } => {
            let descriptor = session.start_discussion(&Identity::new(peer)).await?;
            println!(
                "discussion {} ({})",
                descriptor.id,
                if descriptor.created {
                    "created"
                } else {
                    "existing"
                }
            );
        }
        Command::Watch => watch(&session).await?,
    }

    session.sign_out().await;
    Ok(())
}

async fn open(session: &ChatSession, discussion: &str) -> Result<()> {
    match session.open_discussion(&DiscussionId::new(discussion)).await {
        ThreadLoad::Loaded(messages) => {
            print_thread(&messages);
            Ok(())
        }
        ThreadLoad::Failed(err) => Err(anyhow!("failed to load discussion {discussion}: {err}")),
        ThreadLoad::Skipped | ThreadLoad::Stale => {
            Err(anyhow!("discussion {discussion} was not loaded"))
        }
    }
}

fn report(outcome: MutationOutcome) -> Result<()> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::Rejected(reason) => bail!("not sent: {reason}"),
        MutationOutcome::Failed(err) => bail!("backend refused the change: {err}"),
    }
}

async fn watch(session: &Arc<ChatSession>) -> Result<()> {
    let mut events = session.subscribe();
    session.spawn_poller().await;
    println!("watching every {:?}; ctrl-c to stop", session.settings().poll_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ChatEvent::DiscussionsUpdated(discussions)) => {
                    println!("-- {} discussions", discussions.len());
                    for summary in discussions.iter() {
                        print_summary(summary);
                    }
                }
                Ok(ChatEvent::ThreadUpdated { discussion_id, messages }) => {
                    println!("-- thread {discussion_id}");
                    print_thread(&messages);
                }
                Ok(ChatEvent::ActiveDiscussionChanged(active)) => {
                    println!("-- active discussion: {active:?}");
                }
                Ok(ChatEvent::SyncFailed { operation, error }) => {
                    eprintln!("-- {operation} failed: {error}");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("watch: skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.stop_poller().await;
    Ok(())
}

fn print_summary(summary: &DiscussionSummary) {
    println!(
        "{:<12} {:<28} {:<8} unread={:<3} {}  {}",
        summary.id,
        summary.peer_display_name,
        summary.peer_role,
        summary.unread_count,
        summary.last_message_time.format("%Y-%m-%d %H:%M"),
        summary.last_message_preview
    );
}

fn print_thread(messages: &[Message]) {
    for message in messages {
        println!(
            "[{}] {} {}: {}",
            message.timestamp.format("%H:%M"),
            message.id,
            message.sender_identity,
            message.content
        );
    }
}
