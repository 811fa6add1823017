use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

const LIST_BULLET: &str = "• ";
const INDENT_UNIT: &str = "  ";

/// Turns raw message content into display text.
///
/// Implementations must be pure: the sectionizer relies on equal input
/// rendering to equal output.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// Passes content through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawRenderer;

impl ContentRenderer for RawRenderer {
    fn render(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Renders Zulip markdown to plain display text.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl ContentRenderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> String {
        render_markdown(raw)
    }
}

pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options);

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut list_level: usize = 0;
    let mut link_url: Option<String> = None;
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::List(_) => {
                    list_level += 1;
                }
                Tag::Item => {
                    current.push_str(&INDENT_UNIT.repeat(list_level.saturating_sub(1)));
                    current.push_str(LIST_BULLET);
                }
                Tag::CodeBlock(_) => {
                    in_code_block = true;
                }
                Tag::Link { dest_url, .. } => {
                    link_url = Some(dest_url.to_string());
                }
                Tag::BlockQuote(_) => {
                    current.push_str("> ");
                }
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::BlockQuote(_) => {
                    flush(&mut lines, &mut current);
                    if list_level == 0 {
                        lines.push(String::new());
                    }
                }
                TagEnd::Item => {
                    flush(&mut lines, &mut current);
                }
                TagEnd::List(_) => {
                    list_level = list_level.saturating_sub(1);
                    flush(&mut lines, &mut current);
                    if list_level == 0 {
                        lines.push(String::new());
                    }
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    flush(&mut lines, &mut current);
                    lines.push(String::new());
                }
                TagEnd::Link => {
                    if let Some(url) = link_url.take() {
                        // Autolinks already show the url as their text
                        if !current.ends_with(url.as_str()) {
                            current.push_str(&format!(" ({})", url));
                        }
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    // Code blocks arrive as a single text event
                    for (i, line) in text.split('\n').enumerate() {
                        if i > 0 {
                            flush(&mut lines, &mut current);
                        }
                        current.push_str(line);
                    }
                } else {
                    current.push_str(&text);
                }
            }
            Event::Code(code) => {
                current.push('`');
                current.push_str(&code);
                current.push('`');
            }
            Event::SoftBreak => {
                current.push(' ');
            }
            Event::HardBreak => {
                flush(&mut lines, &mut current);
            }
            Event::Rule => {
                flush(&mut lines, &mut current);
                lines.push("---".to_string());
            }
            _ => {}
        }
    }
    flush(&mut lines, &mut current);

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn flush(lines: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        lines.push(std::mem::take(current));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_emphasis() {
        assert_eq!(
            render_markdown("**hello** *world*\n\nsecond"),
            "hello world\n\nsecond"
        );
    }

    #[test]
    fn test_lists_and_code() {
        let rendered = render_markdown("- one\n- `two`\n");
        assert_eq!(rendered, "• one\n• `two`");
    }

    #[test]
    fn test_links_show_url() {
        assert_eq!(
            render_markdown("[docs](https://zulip.com/api)"),
            "docs (https://zulip.com/api)"
        );
    }

    #[test]
    fn test_code_block_lines_preserved() {
        let rendered = render_markdown("```\nlet a = 1;\nlet b = 2;\n```");
        assert_eq!(rendered, "let a = 1;\nlet b = 2;");
    }

    #[test]
    fn test_raw_renderer_is_identity() {
        assert_eq!(RawRenderer.render("**x**"), "**x**");
    }
}
