//! embedchat-ctl - talk to an embedchat server from the terminal
//!
//! Streams replies, shows and resets session history, and records feedback
//! the same way the embedded widget does.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use embedchat_client::protocol::{ChatTurn, FeedbackResponse, Sender};
use embedchat_client::{
    ClientError, Conversation, EmbedClient, EmbedSettings, SessionState, StreamSession,
};
use log::{debug, warn};

const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let client = EmbedClient::new(cli.settings()).context("building HTTP client")?;
    debug!("using embed endpoint {}", client.settings().embed_url());

    match cli.command {
        Command::Chat { session, message } => handle_chat(&client, &session, &message, cli.json).await,
        Command::History { session } => handle_history(&client, &session, cli.json).await,
        Command::Reset { session } => handle_reset(&client, &session, cli.json).await,
        Command::Feedback {
            session,
            chat_id,
            up,
            down,
            clear: _,
        } => {
            let feedback = if up {
                Some(true)
            } else if down {
                Some(false)
            } else {
                None
            };
            handle_feedback(&client, &session, chat_id, feedback, cli.json).await
        }
        Command::Comment {
            session,
            chat_id,
            text,
        } => handle_comment(&client, &session, chat_id, text, cli.json).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "embedchat-ctl",
    author,
    version,
    about = "Chat with an embedchat embed from the terminal."
)]
struct Cli {
    /// Server base URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "EMBEDCHAT_SERVER_URL")]
    server: String,

    /// Embed identifier
    #[arg(long, short = 'e', env = "EMBEDCHAT_EMBED_ID")]
    embed: String,

    /// Name reported to the server as the sender
    #[arg(long, global = true)]
    username: Option<String>,

    /// Override the embed's system prompt
    #[arg(long, global = true)]
    prompt: Option<String>,

    /// Override the embed's model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override the embed's sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f64>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn settings(&self) -> EmbedSettings {
        let mut settings = EmbedSettings::new(self.server.clone(), self.embed.clone());
        settings.username = self.username.clone();
        settings.prompt = self.prompt.clone();
        settings.model = self.model.clone();
        settings.temperature = self.temperature;
        settings
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message and stream the reply (Ctrl-C stops it)
    Chat {
        /// Session identifier
        session: String,
        /// Message to send
        message: String,
    },

    /// Show the session's past turns
    History {
        /// Session identifier
        session: String,
    },

    /// Hide the session's past turns
    Reset {
        /// Session identifier
        session: String,
    },

    /// Rate a reply
    #[command(group(ArgGroup::new("score").required(true).args(["up", "down", "clear"])))]
    Feedback {
        /// Session identifier
        session: String,
        /// Chat id from the reply's final frame or from history
        chat_id: i64,
        #[arg(long)]
        up: bool,
        #[arg(long)]
        down: bool,
        #[arg(long)]
        clear: bool,
    },

    /// Attach a comment to a reply; omit the text to clear it
    Comment {
        /// Session identifier
        session: String,
        /// Chat id from the reply's final frame or from history
        chat_id: i64,
        /// Comment text
        text: Option<String>,
    },
}

async fn handle_chat(
    client: &EmbedClient,
    session_id: &str,
    message: &str,
    json: bool,
) -> Result<ExitCode> {
    let mut conversation = Conversation::new();
    let pending = conversation.submit(message);

    let mut session = StreamSession::new();
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut stdout = io::stdout();
    let mut printed = false;
    let state = client
        .stream_session(&mut session, session_id, message, |event| {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        let _ = writeln!(stdout, "{line}");
                    }
                    Err(e) => warn!("failed to encode event: {}", e),
                }
            } else if let (false, Some(text)) = (event.is_terminal(), event.text_response()) {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
                printed |= !text.is_empty();
            }
            conversation.apply(&pending, &event);
        })
        .await?;

    let turn = conversation
        .turn(&pending)
        .context("pending turn vanished")?;
    if !json {
        print_outcome(state, turn, printed);
    }

    Ok(match state {
        SessionState::Closed if turn.error.is_none() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn print_outcome(state: SessionState, turn: &ChatTurn, printed: bool) {
    match state {
        SessionState::Closed => {
            // A reply delivered whole in the final frame has not been shown yet.
            match turn.text_response.as_deref() {
                Some(text) if !printed && !text.is_empty() => println!("{text}"),
                _ if printed => println!(),
                _ => {}
            }
            if let Some(error) = &turn.error {
                eprintln!("error: {error}");
            }
            if let Some(sources) = turn.sources.as_ref().filter(|s| !s.is_empty()) {
                println!("\nSources:");
                for source in sources {
                    println!("  - {}", source.title.as_deref().unwrap_or("(untitled)"));
                }
            }
            if let Some(chat_id) = turn.chat_id {
                println!("[chat {chat_id}]");
            }
        }
        SessionState::Aborted => match &turn.error {
            Some(error) => eprintln!("\n{error}"),
            None => eprintln!("\ncancelled"),
        },
        other => eprintln!("\nstream stopped in state {other:?}"),
    }
}

async fn handle_history(client: &EmbedClient, session_id: &str, json: bool) -> Result<ExitCode> {
    let history = client.history(session_id).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(ExitCode::SUCCESS);
    }
    if history.is_empty() {
        println!("No history for session {session_id}");
        return Ok(ExitCode::SUCCESS);
    }
    for turn in &history {
        let who = match turn.sender {
            Sender::User => "you",
            Sender::System => "assistant",
        };
        let text = turn.text_response.as_deref().unwrap_or_default();
        match turn.chat_id {
            Some(chat_id) if turn.is_system() => println!("{who} [{chat_id}]: {text}"),
            _ => println!("{who}: {text}"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn handle_reset(client: &EmbedClient, session_id: &str, json: bool) -> Result<ExitCode> {
    let reset = client.reset(session_id).await;
    if json {
        println!("{}", serde_json::json!({ "success": reset }));
    } else if reset {
        println!("Session {session_id} reset");
    } else {
        println!("Session {session_id} could not be reset");
    }
    Ok(if reset {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn handle_feedback(
    client: &EmbedClient,
    session_id: &str,
    chat_id: i64,
    feedback: Option<bool>,
    json: bool,
) -> Result<ExitCode> {
    let response = client.update_feedback(session_id, chat_id, feedback).await;
    report_feedback(response, json)
}

async fn handle_comment(
    client: &EmbedClient,
    session_id: &str,
    chat_id: i64,
    text: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let response = client.update_comment(session_id, chat_id, text).await;
    report_feedback(response, json)
}

fn report_feedback(
    response: std::result::Result<FeedbackResponse, ClientError>,
    json: bool,
) -> Result<ExitCode> {
    let response = match response {
        Ok(response) => response,
        Err(ClientError::NotFound { chat_id }) => bail!("chat {chat_id} not found in this session"),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string(&response)?);
    } else if response.success {
        println!("Saved");
    } else {
        println!(
            "Not saved: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
