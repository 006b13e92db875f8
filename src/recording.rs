//! In-memory [`DocumentBuilder`] that records what was written, page by page.
//!
//! Only compiled with the `test-export-mocks` feature (on by default).

use std::path::{Path, PathBuf};

use crate::contract::{
    DocumentBuilder, Footer, ImagePlacement, MarkupBlock, Run, Table, TextSize,
};
use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Text { size: TextSize, runs: Vec<Run> },
    Gap(f32),
    Table(Table),
    Image(ImagePlacement),
    Markup(Vec<MarkupBlock>),
}

impl Recorded {
    /// Plain text of a text entry.
    pub fn text(&self) -> Option<String> {
        match self {
            Recorded::Text { runs, .. } => Some(runs.iter().map(|r| r.text.as_str()).collect()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordedPage {
    pub footer: Footer,
    pub items: Vec<Recorded>,
}

impl RecordedPage {
    pub fn texts(&self) -> Vec<String> {
        self.items.iter().filter_map(Recorded::text).collect()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }

    pub fn tables(&self) -> Vec<&Table> {
        self.items
            .iter()
            .filter_map(|i| match i {
                Recorded::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// Result of [`RecordingBuilder::finish`]; nothing touches the disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recording {
    pub pages: Vec<RecordedPage>,
    pub path: PathBuf,
}

impl Recording {
    pub fn all_texts(&self) -> Vec<String> {
        self.pages.iter().flat_map(RecordedPage::texts).collect()
    }
}

#[derive(Debug, Default)]
pub struct RecordingBuilder {
    pages: Vec<RecordedPage>,
    footer: Footer,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, item: Recorded) {
        if self.pages.is_empty() {
            self.add_page();
        }
        if let Some(page) = self.pages.last_mut() {
            page.items.push(item);
        }
    }
}

impl DocumentBuilder for RecordingBuilder {
    type Output = Recording;

    fn add_page(&mut self) {
        self.pages.push(RecordedPage {
            footer: self.footer.clone(),
            items: Vec::new(),
        });
    }

    fn page_number(&self) -> usize {
        self.pages.len()
    }

    fn set_footer(&mut self, footer: Footer) -> Result<(), RenderError> {
        self.footer = footer;
        Ok(())
    }

    fn write_text(&mut self, size: TextSize, runs: &[Run]) {
        self.push(Recorded::Text {
            size,
            runs: runs.to_vec(),
        });
    }

    fn write_gap(&mut self, lines: f32) {
        self.push(Recorded::Gap(lines));
    }

    fn write_table(&mut self, table: &Table) {
        self.push(Recorded::Table(table.clone()));
    }

    fn place_image(&mut self, png: &[u8], placement: ImagePlacement) -> Result<(), RenderError> {
        if png.is_empty() {
            return Err(RenderError::Image("empty image".to_string()));
        }
        self.push(Recorded::Image(placement));
        Ok(())
    }

    fn write_markup(&mut self, blocks: &[MarkupBlock]) {
        self.push(Recorded::Markup(blocks.to_vec()));
    }

    fn finish(self, path: &Path) -> Result<Recording, RenderError> {
        Ok(Recording {
            pages: self.pages,
            path: path.to_path_buf(),
        })
    }
}
