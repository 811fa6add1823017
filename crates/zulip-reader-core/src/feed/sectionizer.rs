use crate::models::{DisplayVariant, FeedItem, Materialization, Message, Section};
use crate::render::ContentRenderer;

/// Group an id-ascending, already-filtered message list into thread sections.
///
/// A new section starts whenever (kind, recipients, subject) changes. Inside
/// a section an item is `Compact` when its sender matches the item right
/// above it. Pure: the same input always yields the same materialization.
pub fn sectionize(messages: &[Message], renderer: &dyn ContentRenderer) -> Materialization {
    let mut sections: Vec<Section> = Vec::new();
    let mut previous: Option<&Message> = None;

    for message in messages {
        let same_thread = previous.is_some_and(|p| p.thread_key() == message.thread_key());

        if !same_thread {
            sections.push(Section::default());
        }

        let variant = match previous {
            Some(p) if same_thread && p.sender_email == message.sender_email => {
                DisplayVariant::Compact
            }
            _ => DisplayVariant::Normal,
        };

        let section_index = sections.len() - 1;
        let section = &mut sections[section_index];
        let row = section.items.len();
        section.items.push(FeedItem {
            message_id: message.id,
            section: section_index,
            row,
            variant,
            content: renderer.render(&message.content),
            kind: message.kind,
            recipients: message.recipients.clone(),
            subject: message.subject.clone(),
            sender_full_name: message.sender_full_name.clone(),
            sender_email: message.sender_email.clone(),
            timestamp: message.timestamp,
            avatar_url: message.avatar_url.clone(),
        });

        previous = Some(message);
    }

    Materialization::new(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedPosition;
    use crate::render::RawRenderer;

    fn boundaries(view: &Materialization) -> Vec<usize> {
        view.sections.iter().map(|s| s.len()).collect()
    }

    #[test]
    fn test_empty_input() {
        let view = sectionize(&[], &RawRenderer);
        assert_eq!(view.section_count(), 0);
        assert!(view.is_empty());
    }

    #[test]
    fn test_groups_by_thread_identity() {
        let messages = vec![
            Message::stream(1, "a@x", "general", "lunch", "1"),
            Message::stream(2, "b@x", "general", "lunch", "2"),
            Message::stream(3, "b@x", "general", "dinner", "3"),
            Message::private(4, "b@x", &["a@x"], "4"),
            Message::private(5, "b@x", &["a@x"], "5"),
            Message::stream(6, "b@x", "general", "lunch", "6"),
        ];
        let view = sectionize(&messages, &RawRenderer);

        assert_eq!(boundaries(&view), vec![2, 1, 2, 1]);
        let positions: Vec<FeedPosition> = view.positions();
        assert_eq!(positions[4], FeedPosition::new(2, 1));
        assert_eq!(positions[5], FeedPosition::new(3, 0));
    }

    #[test]
    fn test_compact_follows_previous_sender_in_section() {
        let messages = vec![
            Message::stream(1, "a@x", "general", "t", "hello"),
            Message::stream(2, "a@x", "general", "t", "different content"),
            Message::stream(3, "b@x", "general", "t", ""),
            Message::stream(4, "b@x", "general", "other", ""),
        ];
        let view = sectionize(&messages, &RawRenderer);
        let variants: Vec<DisplayVariant> = view.items().map(|i| i.variant).collect();

        assert_eq!(
            variants,
            vec![
                DisplayVariant::Normal,
                DisplayVariant::Compact,
                DisplayVariant::Normal,
                // first item of a new section even though the sender repeats
                DisplayVariant::Normal,
            ]
        );
    }

    #[test]
    fn test_private_recipient_order_is_irrelevant() {
        let messages = vec![
            Message::private(1, "a@x", &["a@x", "b@x"], ""),
            Message::private(2, "b@x", &["b@x", "a@x"], ""),
        ];
        let view = sectionize(&messages, &RawRenderer);
        assert_eq!(view.section_count(), 1);
    }

    #[test]
    fn test_grouping_is_stable_when_reapplied() {
        let messages = vec![
            Message::stream(1, "a@x", "general", "t", ""),
            Message::stream(2, "a@x", "general", "u", ""),
            Message::stream(3, "b@x", "general", "u", ""),
        ];
        let first = sectionize(&messages, &RawRenderer);
        let second = sectionize(&messages, &RawRenderer);
        assert_eq!(first, second);

        // Appending a distinct thread only appends sections
        let mut extended = messages.clone();
        extended.push(Message::stream(4, "a@x", "random", "t", ""));
        let extended_view = sectionize(&extended, &RawRenderer);
        assert_eq!(
            boundaries(&extended_view)[..first.section_count()],
            boundaries(&first)[..]
        );
    }

    #[test]
    fn test_content_is_rendered() {
        let messages = vec![Message::stream(1, "a@x", "general", "t", "**bold**")];
        let view = sectionize(&messages, &crate::render::MarkdownRenderer);
        assert_eq!(view.items().next().unwrap().content, "bold");
    }
}
