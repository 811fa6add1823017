use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use zulip_reader_core::net::ZulipClient;
use zulip_reader_core::{ChannelConsumer, FeedCoordinator, Intent, Narrow};

use super::commands::{WatchCommand, HELP};
use super::config::CliConfig;
use super::output::format_event;

/// Follow a narrow until stdin closes or `q` is typed.
pub async fn run_watch(config: &CliConfig, narrow: Narrow) -> Result<()> {
    let client = Arc::new(ZulipClient::new(
        &config.realm_url,
        &config.email,
        &config.api_key,
    ));
    let (consumer, mut events) = ChannelConsumer::new();
    let feed = FeedCoordinator::open(config.core_config(), client, Arc::new(consumer))
        .context("Failed to open message store")?;

    feed.start_with(narrow.clone())
        .await
        .with_context(|| format!("Failed to register with {}", config.realm_url))?;
    eprintln!("{}", HELP);

    let mut session = WatchSession::new(feed, narrow);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(text) = format_event(&event) {
                    println!("{}", text);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                let Some(command) = WatchCommand::parse(&line) else { continue };
                if !session.handle(command) {
                    break;
                }
            }
        }
    }

    let feed = session.feed;
    feed.shutdown();
    info!("Watch finished");
    Ok(())
}

/// The coordinator plus the narrow the user is looking at.
pub struct WatchSession {
    feed: FeedCoordinator,
    current: Narrow,
}

impl WatchSession {
    pub fn new(feed: FeedCoordinator, current: Narrow) -> Self {
        Self { feed, current }
    }

    pub fn current(&self) -> &Narrow {
        &self.current
    }

    /// Apply one stdin command. Returns false on quit.
    pub fn handle(&mut self, command: WatchCommand) -> bool {
        debug!(?command, "Watch command");
        match command {
            WatchCommand::ScrollUp => {
                if !self.feed.submit(Intent::scroll_up(self.current.clone())) {
                    eprintln!("(still loading)");
                }
            }
            WatchCommand::Home => self.focus(Narrow::home(), true),
            WatchCommand::Narrow(narrow) => self.focus(narrow, false),
            WatchCommand::Quit => return false,
            WatchCommand::Unknown(text) => eprintln!("unknown command {:?}; {}", text, HELP),
        }
        true
    }

    /// `current` only moves once the coordinator accepted the focus.
    fn focus(&mut self, narrow: Narrow, reset_unread: bool) {
        if !self.feed.submit(Intent::focus(narrow.clone())) {
            eprintln!("(still loading)");
            return;
        }
        self.current = narrow;
        if reset_unread {
            self.feed.reset_unread();
        }
    }
}
