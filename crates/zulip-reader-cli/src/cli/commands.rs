use zulip_reader_core::Narrow;

/// A line typed on stdin while watching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    ScrollUp,
    /// Back to the unfiltered view; also clears unread
    Home,
    Narrow(Narrow),
    Quit,
    Unknown(String),
}

impl WatchCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let command = match head {
            "u" => WatchCommand::ScrollUp,
            "h" => WatchCommand::Home,
            "q" => WatchCommand::Quit,
            "s" if !rest.is_empty() => match rest.split_once(char::is_whitespace) {
                Some((stream, topic)) => WatchCommand::Narrow(Narrow::topic(stream, topic.trim())),
                None => WatchCommand::Narrow(Narrow::stream(rest)),
            },
            _ => WatchCommand::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "commands: u (older), h (home), s <stream> [topic], q (quit)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(WatchCommand::parse("u"), Some(WatchCommand::ScrollUp));
        assert_eq!(WatchCommand::parse(" h \n"), Some(WatchCommand::Home));
        assert_eq!(WatchCommand::parse("q"), Some(WatchCommand::Quit));
        assert_eq!(WatchCommand::parse("   "), None);
    }

    #[test]
    fn test_parse_stream_and_topic() {
        assert_eq!(
            WatchCommand::parse("s general"),
            Some(WatchCommand::Narrow(Narrow::stream("general")))
        );
        assert_eq!(
            WatchCommand::parse("s general lunch plans"),
            Some(WatchCommand::Narrow(Narrow::topic("general", "lunch plans")))
        );
    }

    #[test]
    fn test_stream_needs_a_name() {
        assert_eq!(
            WatchCommand::parse("s"),
            Some(WatchCommand::Unknown("s".to_string()))
        );
    }
}
