use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use client_core::{rest::RestDataService, validate_display_name, ChatClient, ClientEvent};
use shared::{domain::ChatSession, protocol::MessageRecord};

/// Headless smoke-test client for the chat data service.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    backend_url: String,
    #[arg(long)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a chat session and print its shareable key.
    Create {
        #[arg(long)]
        name: String,
        /// Stay connected and print the transcript as it changes.
        #[arg(long)]
        watch: bool,
    },
    /// Join an existing chat by creator name and key.
    Join {
        #[arg(long)]
        name: String,
        #[arg(long)]
        creator: String,
        #[arg(long)]
        key: String,
        /// Send one message after joining.
        #[arg(long)]
        message: Option<String>,
        /// Stay connected and print the transcript as it changes.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let client = ChatClient::new(Arc::new(RestDataService::new(
        cli.backend_url.clone(),
        cli.api_key.clone(),
    )));

    match cli.command {
        Command::Create { name, watch } => {
            let name = validate_display_name(&name)?;
            let session = client.create_session(&name).await?;
            println!("Created chat. Share these with your partner:");
            println!("  name: {}", session.creator_account);
            println!("  key:  {}", session.key);
            run_chat(&client, session, None, watch).await?;
        }
        Command::Join {
            name,
            creator,
            key,
            message,
            watch,
        } => {
            let name = validate_display_name(&name)?;
            let session = client.join_session(&creator, &key, &name).await?;
            println!("Joined chat created by {}", session.creator_account);
            run_chat(&client, session, message, watch).await?;
        }
    }

    Ok(())
}

async fn run_chat(
    client: &Arc<ChatClient>,
    session: ChatSession,
    send_once: Option<String>,
    watch: bool,
) -> Result<()> {
    let my_account = session.my_account.clone();
    let mut events = client.subscribe_events();
    client.open_session(session).await?;

    // The initial transcript arrives as the first TranscriptUpdated event.
    loop {
        match events.recv().await? {
            ClientEvent::TranscriptUpdated { messages, .. } => {
                print_transcript(&messages, &my_account);
                break;
            }
            ClientEvent::TranscriptFetchFailed { reason, .. } => {
                return Err(anyhow!("failed to load transcript: {reason}"));
            }
            _ => {}
        }
    }

    if let Some(content) = send_once {
        client.send_message(&content).await?;
        println!("-- message sent --");
    }

    if watch {
        println!("-- watching for new messages, Ctrl-C to quit --");
        loop {
            match events.recv().await {
                Ok(ClientEvent::TranscriptUpdated { messages, .. }) => {
                    println!("----");
                    print_transcript(&messages, &my_account);
                }
                Ok(ClientEvent::TranscriptFetchFailed { reason, .. }) => {
                    eprintln!("refresh failed: {reason}");
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    client.close_session().await;
    Ok(())
}

fn print_transcript(messages: &[MessageRecord], my_account: &str) {
    if messages.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for message in messages {
        let sender = if message.sender == my_account {
            "me"
        } else {
            message.sender.as_str()
        };
        println!(
            "[{}] {}: {}",
            message.created_at.with_timezone(&Local).format("%H:%M"),
            sender,
            message.content
        );
    }
}
