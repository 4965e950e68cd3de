use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use partychat::utils::RUNTIME;
use partychat::{
    ApiClient, AppState, ChatError, ChatHandle, ChatSession, ChatUpdate, Draft, Message, MessageState, Result,
    SessionOptions, WsTransport,
};

/// Headless chat client for the party booking platform.
#[derive(Parser, Debug)]
#[command(name = "partychat", version)]
struct Args {
    /// Config file; defaults to partychat.toml in the user config dir.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sign in as this user instead of the configured one.
    #[arg(long)]
    user: Option<String>,
    /// Conversation to open and send to.
    #[arg(long)]
    conversation: Option<String>,
    /// Start (or reopen) a conversation with this provider.
    #[arg(long, conflicts_with = "conversation")]
    provider: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    if let Err(e) = RUNTIME.block_on(run(args)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let state = match &args.config {
        Some(path) => AppState::load_from(path)?,
        None => AppState::load(),
    };
    let user_id = args
        .user
        .or_else(|| state.user_id.clone())
        .ok_or(ChatError::NotAuthenticated)?;

    let backend = Arc::new(ApiClient::new(&state.base_url()?, state.token.clone()));
    let transport = Arc::new(WsTransport::new(&state.ws_url()?, state.token.clone())?);
    let chat = ChatSession::spawn(backend, transport, SessionOptions::from(&state));
    let mut updates = chat.updates();
    chat.set_identity(Some(user_id.clone())).await?;

    let conversation_id = match (args.conversation, args.provider) {
        (Some(id), _) => Some(id),
        (None, Some(provider)) => Some(chat.start_conversation(&provider).await?.id),
        (None, None) => None,
    };
    if let Some(id) = &conversation_id {
        chat.open_conversation(id).await?;
    }

    let mut shown: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => print_update(&chat, &user_id, conversation_id.as_deref(), &mut shown, update).await?,
                Err(RecvError::Lagged(n)) => warn!("skipped {} updates", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                match &conversation_id {
                    Some(id) => {
                        if let Err(e) = chat.send_message(id, Draft::text(line)).await {
                            warn!("not sent: {}", e);
                        }
                    }
                    None => println!("no conversation selected (use --conversation or --provider)"),
                }
            }
        }
    }
    chat.shutdown().await
}

async fn print_update(
    chat: &ChatHandle,
    user_id: &str,
    open: Option<&str>,
    shown: &mut Vec<Message>,
    update: ChatUpdate,
) -> Result<()> {
    match update {
        ChatUpdate::ConversationsReplaced => {
            for c in chat.conversations().await? {
                println!("{:>3} unread  {}  {}", c.unread_count, c.id, c.title_for(user_id));
            }
        }
        ChatUpdate::ConversationChanged(id) => {
            if let Some(c) = chat.conversation(&id).await? {
                let preview = c.last_message_preview.clone().unwrap_or_default();
                println!("* {}: {}", c.title_for(user_id), preview);
            }
        }
        ChatUpdate::MessagesChanged(id) if open == Some(id.as_str()) => {
            let current = chat.messages(&id).await?;
            for (i, m) in current.iter().enumerate() {
                if shown.get(i) != Some(m) {
                    println!("[{}] {}: {}", status_label(&m.state), m.sender_id, m.preview());
                }
            }
            *shown = current;
        }
        ChatUpdate::MessagesChanged(_) => {}
    }
    Ok(())
}

fn status_label(state: &MessageState) -> &'static str {
    match state {
        MessageState::Sending { .. } => "sending",
        MessageState::Sent { .. } => "sent",
        MessageState::Failed { .. } => "failed",
    }
}
