use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use zulip_reader_cli::cli::{run_watch, CliConfig};
use zulip_reader_core::net::{MessageSource, ZulipClient};
use zulip_reader_core::store::{CursorStore, Database, MessageStore};
use zulip_reader_core::tracing_setup::init_tracing_with_default;
use zulip_reader_core::{MessagePost, Narrow};

#[derive(Parser)]
#[command(name = "zulip-reader-cli")]
#[command(about = "Terminal reader for a Zulip realm")]
struct Cli {
    /// Path to JSON config file (realmUrl, email, apiKey, dataDir)
    #[arg(long, short = 'c')]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the feed, optionally narrowed
    Watch {
        #[arg(long, conflicts_with_all = ["pm", "mentioned"])]
        stream: Option<String>,
        /// Requires --stream
        #[arg(long, requires = "stream")]
        topic: Option<String>,
        /// Comma separated participant emails
        #[arg(long, value_delimiter = ',', conflicts_with = "mentioned")]
        pm: Vec<String>,
        /// Only messages mentioning you
        #[arg(long)]
        mentioned: bool,
    },

    /// Send a message to a stream topic or a private conversation
    Send {
        #[arg(long, conflicts_with = "pm")]
        stream: Option<String>,
        #[arg(long, requires = "stream")]
        topic: Option<String>,
        #[arg(long, value_delimiter = ',')]
        pm: Vec<String>,
        content: String,
    },

    /// Delete the local message database
    Clear,
}

fn watch_narrow(
    stream: Option<String>,
    topic: Option<String>,
    pm: Vec<String>,
    mentioned: bool,
) -> Narrow {
    match (stream, topic) {
        (Some(stream), Some(topic)) => Narrow::topic(&stream, &topic),
        (Some(stream), None) => Narrow::stream(&stream),
        _ if !pm.is_empty() => Narrow::private_with(&pm),
        _ if mentioned => Narrow::mentioned(),
        _ => Narrow::home(),
    }
}

fn outgoing(
    stream: Option<String>,
    topic: Option<String>,
    pm: Vec<String>,
    content: String,
) -> Result<MessagePost> {
    if let Some(stream) = stream {
        return Ok(MessagePost::Stream {
            stream,
            topic: topic.unwrap_or_else(|| zulip_reader_core::constants::DEFAULT_TOPIC.to_string()),
            content,
        });
    }
    if pm.is_empty() {
        bail!("Either --stream or --pm is required");
    }
    Ok(MessagePost::Private {
        recipients: pm,
        content,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfig::load(&cli.config)?;

    match cli.command {
        Commands::Watch {
            stream,
            topic,
            pm,
            mentioned,
        } => run_watch(&config, watch_narrow(stream, topic, pm, mentioned)).await,
        Commands::Send {
            stream,
            topic,
            pm,
            content,
        } => {
            let post = outgoing(stream, topic, pm, content)?;
            let client = ZulipClient::new(&config.realm_url, &config.email, &config.api_key);
            client
                .send_message(&post)
                .await
                .context("Failed to send message")?;
            println!("sent");
            Ok(())
        }
        Commands::Clear => {
            let data_dir = config.data_dir();
            let db = Database::open(&data_dir).context("Failed to open message store")?;
            db.clear_messages()?;
            db.clear_cursors()?;
            println!("cleared {}", data_dir.display());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing_with_default("warn") {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_narrow_selection() {
        assert_eq!(
            watch_narrow(Some("general".into()), Some("lunch".into()), vec![], false),
            Narrow::topic("general", "lunch")
        );
        assert_eq!(
            watch_narrow(None, None, vec!["a@x".into()], false),
            Narrow::private_with(&["a@x"])
        );
        assert_eq!(watch_narrow(None, None, vec![], true), Narrow::mentioned());
        assert!(watch_narrow(None, None, vec![], false).is_home());
    }

    #[test]
    fn test_outgoing_requires_a_destination() {
        assert!(outgoing(None, None, vec![], "hi".into()).is_err());
        assert_eq!(
            outgoing(Some("general".into()), None, vec![], "hi".into()).unwrap(),
            MessagePost::Stream {
                stream: "general".into(),
                topic: "new topic".into(),
                content: "hi".into(),
            }
        );
    }

    #[test]
    fn test_cli_parses_watch() {
        let cli = Cli::try_parse_from([
            "zulip-reader-cli",
            "--config",
            "cfg.json",
            "watch",
            "--pm",
            "a@x,b@x",
        ])
        .unwrap();
        match cli.command {
            Commands::Watch { pm, .. } => assert_eq!(pm, vec!["a@x", "b@x"]),
            _ => panic!("expected watch"),
        }
    }
}
