use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chat_client::{AudioPlayer, ChatClient, ChatSession, DirectoryPlayer, NullPlayer, TurnOutcome};
use chat_proto::{Role, SessionUpdate};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

const QUESTIONS: [&str; 4] = [
    "However far you have come, what is the one thing you keep circling back to and cannot let go of?",
    "What do you long for most right now? Once you have it, where will your heart finally come to rest?",
    "What side of yourself do you like to show people, and what truth do you keep hidden even from yourself?",
    "What does it mean to you that you exist? How would you define this world?",
];

#[derive(Parser)]
#[command(name = "spirit-chat")]
#[command(version, about = "Talk to your spirit from the terminal")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "SPIRIT_SERVER_URL", default_value = "http://localhost:8085")]
    server: String,

    /// Continue an existing conversation instead of answering the questionnaire
    #[arg(long)]
    conversation: Option<i64>,

    /// Write received audio clips to this directory
    #[arg(long, env = "SPIRIT_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    /// Command run on each written clip, e.g. "aplay -q"
    #[arg(long, requires = "audio_dir")]
    play_command: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let client = ChatClient::new(&cli.server)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let conversation_id = match cli.conversation {
        Some(id) => id,
        None => run_questionnaire(&client, &mut input).await?,
    };

    let player: Arc<dyn AudioPlayer> = match &cli.audio_dir {
        Some(dir) => {
            let player = DirectoryPlayer::new(dir);
            Arc::new(match &cli.play_command {
                Some(command) => player.with_command(command),
                None => player,
            })
        }
        None => Arc::new(NullPlayer),
    };

    let mut session = ChatSession::open(client, conversation_id, player)
        .await
        .with_context(|| format!("cannot open conversation {conversation_id}"))?;
    info!("Attached to conversation {conversation_id}");

    for message in session.messages() {
        print_message(message.role, &message.content);
    }
    println!("(type /quit to leave)");

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        let printer = tokio::spawn(print_reply(session.display()));
        let result = session.send(line).await;
        printer.abort();
        println!();

        match result {
            Ok(mut report) => {
                if let TurnOutcome::Failed(reason) = &report.outcome {
                    eprintln!("send failed: {reason}. You can try again.");
                }
                report.wait_for_playback().await;
            }
            Err(e) => eprintln!("send failed: {e}"),
        }
    }
    Ok(())
}

/// Echo the streamed reply as it grows.
async fn print_reply(mut display: tokio::sync::watch::Receiver<String>) {
    let mut shown = String::new();
    while display.changed().await.is_ok() {
        let text = display.borrow_and_update().clone();
        let Some(tail) = unseen_tail(&shown, &text) else {
            continue;
        };
        if shown.is_empty() {
            print!("spirit: ");
        }
        print!("{tail}");
        let _ = std::io::stdout().flush();
        shown = text;
    }
}

/// The part of `text` not yet printed, if `text` extends what was printed.
fn unseen_tail<'a>(shown: &str, text: &'a str) -> Option<&'a str> {
    text.strip_prefix(shown).filter(|tail| !tail.is_empty())
}

fn print_message(role: Role, content: &str) {
    match role {
        Role::User => println!("> {content}"),
        _ => println!("spirit: {content}"),
    }
}

async fn run_questionnaire(client: &ChatClient, input: &mut Lines<BufReader<Stdin>>) -> Result<i64> {
    let session = client.create_session().await?;
    println!("Answer four questions and a spirit will answer back.\n");

    for (i, question) in QUESTIONS.iter().enumerate() {
        let answer = loop {
            println!("{}. {question}", i + 1);
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = input.next_line().await? else {
                bail!("input closed before the questionnaire was finished");
            };
            if !line.trim().is_empty() {
                break line.trim().to_string();
            }
        };

        let mut update = SessionUpdate::default();
        match i {
            0 => update.question1 = Some(answer),
            1 => update.question2 = Some(answer),
            2 => update.question3 = Some(answer),
            _ => update.question4 = Some(answer),
        }
        client.update_session(session.id, &update).await?;
    }

    println!("\nSummoning your spirit...");
    let session = client.generate_spirit(session.id).await?;
    let Some(conversation_id) = session.conversation_id else {
        bail!("server did not open a conversation for session {}", session.id);
    };
    if let (Some(name), Some(traits)) = (&session.spirit_name, &session.spirit_traits) {
        println!("{name}: {traits}\n");
    }
    Ok(conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_tail_only_follows_extensions() {
        assert_eq!(unseen_tail("", "hi"), Some("hi"));
        assert_eq!(unseen_tail("hi ", "hi there"), Some("there"));
        assert_eq!(unseen_tail("hi there", "hi there"), None);
        // A persisted reply that differs from the streamed one prints nothing.
        assert_eq!(unseen_tail("I was about to", ""), None);
        assert_eq!(unseen_tail("hi there", "hello, friend"), None);
        assert_eq!(unseen_tail("안녕", "안녕하세요"), Some("하세요"));
    }
}
