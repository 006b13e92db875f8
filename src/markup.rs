//! Wiki markdown to [`MarkupBlock`]s with pulldown-cmark.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use crate::contract::{FontStyle, MarkupBlock, MarkupRenderer, Run};

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Open list: its next ordinal, `None` for bullets.
struct ListFrame {
    next: Option<u64>,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<MarkupBlock>,
    runs: Vec<Run>,
    bold: usize,
    italic: usize,
    links: Vec<String>,
    lists: Vec<ListFrame>,
    /// Marker of the list item whose text is being collected.
    item: Option<(usize, String)>,
    heading: Option<u8>,
    code: Option<String>,
    image: Option<(String, String)>,
}

impl BlockBuilder {
    fn style(&self) -> FontStyle {
        match (self.bold > 0, self.italic > 0) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Regular,
        }
    }

    fn push_text(&mut self, text: &str, style: FontStyle) {
        if let Some(code) = &mut self.code {
            code.push_str(text);
            return;
        }
        if let Some((_, alt)) = &mut self.image {
            alt.push_str(text);
            return;
        }
        let link = self.links.last().cloned();
        // Merge with the previous run when styling is identical.
        if let Some(last) = self.runs.last_mut() {
            if last.style == style && last.link == link {
                last.text.push_str(text);
                return;
            }
        }
        self.runs.push(Run {
            text: text.to_string(),
            style,
            link,
        });
    }

    fn flush(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        let is_blank = runs.iter().all(|r| r.text.trim().is_empty());
        if let Some((depth, marker)) = self.item.take() {
            self.blocks.push(MarkupBlock::ListItem {
                depth,
                marker,
                runs: trim_runs(runs),
            });
        } else if let Some(level) = self.heading.take() {
            self.blocks.push(MarkupBlock::Heading {
                level,
                runs: trim_runs(runs),
            });
        } else if !is_blank {
            self.blocks.push(MarkupBlock::Paragraph(trim_runs(runs)));
        }
    }

    fn start_item(&mut self) {
        let depth = self.lists.len().saturating_sub(1);
        let marker = match self.lists.last_mut() {
            Some(ListFrame { next: Some(n) }) => {
                let marker = format!("{n}.");
                *n += 1;
                marker
            }
            _ => "-".to_string(),
        };
        self.item = Some((depth, marker));
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                let style = self.style();
                self.push_text(&text, style);
            }
            Event::Code(text) => self.push_text(&text, FontStyle::Monospace),
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.style();
                self.push_text(&html, style);
            }
            Event::SoftBreak | Event::HardBreak => {
                let style = self.style();
                self.push_text(" ", style);
            }
            Event::Rule => {
                self.flush();
                self.blocks.push(MarkupBlock::Rule);
            }
            Event::TaskListMarker(done) => {
                self.push_text(if done { "[x] " } else { "[ ] " }, FontStyle::Monospace);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(heading_number(level));
            }
            Tag::Paragraph => {
                if self.item.is_none() {
                    self.flush();
                }
            }
            Tag::List(first) => {
                // Text of the enclosing item comes before its sub-list.
                if self.item.is_some() {
                    self.flush();
                }
                self.lists.push(ListFrame { next: first });
            }
            Tag::Item => {
                self.flush();
                self.start_item();
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.code = Some(String::new());
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Link { dest_url, .. } => self.links.push(dest_url.to_string()),
            Tag::Image { dest_url, .. } => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => self.flush(),
            TagEnd::Paragraph => {
                if self.item.is_none() {
                    self.flush();
                } else {
                    self.push_text(" ", FontStyle::Regular);
                }
            }
            TagEnd::Item => {
                if self.item.is_some() {
                    self.flush();
                }
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    self.blocks
                        .push(MarkupBlock::Code(code.trim_end_matches('\n').to_string()));
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Link => {
                self.links.pop();
            }
            TagEnd::Image => {
                if let Some((url, alt)) = self.image.take() {
                    let label = if alt.trim().is_empty() {
                        format!("Image: {url}")
                    } else {
                        format!("Image ({}): {url}", alt.trim())
                    };
                    self.runs.push(Run::link(label, url));
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<MarkupBlock> {
        if let Some(code) = self.code.take() {
            self.blocks.push(MarkupBlock::Code(code));
        }
        self.flush();
        self.blocks
    }
}

/// Drops the whitespace a block starts or ends with.
fn trim_runs(mut runs: Vec<Run>) -> Vec<Run> {
    if let Some(first) = runs.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = runs.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    runs.retain(|r| !r.text.is_empty());
    runs
}

impl MarkupRenderer for MarkdownRenderer {
    fn render(&self, text: &str) -> Vec<MarkupBlock> {
        let mut builder = BlockBuilder::default();
        for event in Parser::new(text) {
            builder.event(event);
        }
        builder.finish()
    }
}
