//! # contract: collaborator interfaces for the export pipeline
//!
//! The core never talks to the network, a PDF library, a markdown parser or
//! a QR encoder directly. It goes through the traits in this module:
//!
//! - [`Fetch`]: one HTTP-like exchange (`url, method, query -> status, body`).
//!   Implemented by [`crate::client::HttpFetcher`] (reqwest) and by
//!   [`crate::stubs::StubFetcher`] (canned payloads for dry runs and tests).
//! - [`DocumentBuilder`]: pages, styled text runs, tables, images and markup
//!   blocks. Implemented by [`crate::pdf::PdfBuilder`] and, for tests, by
//!   `RecordingBuilder`.
//! - [`MarkupRenderer`]: wiki markdown to a typed block list.
//! - [`ImageGenerator`]: scannable identifier (QR) images as PNG bytes.
//!
//! ## Mocking & Testing
//! - `Fetch` is annotated for `mockall`; with the `test-export-mocks` feature
//!   (on by default) `MockFetch` is available to integration tests.

use async_trait::async_trait;
use std::path::Path;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{ExportError, RenderError};

/// HTTP methods the export needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
}

/// How the response body is expected to be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// JSON:API document, requested with the pinned API version.
    JsonApi,
    /// Raw bytes (wiki markdown downloads).
    Raw,
}

/// A single request against the project-hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub format: BodyFormat,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            query: Vec::new(),
            format: BodyFormat::JsonApi,
        }
    }

    pub fn raw(url: impl Into<String>) -> Self {
        Self {
            format: BodyFormat::Raw,
            ..Self::get(url)
        }
    }

    /// Adds a `filter[key]=value` query parameter.
    pub fn filter(mut self, key: &str, value: &str) -> Self {
        self.query.push((format!("filter[{key}]"), value.to_string()));
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.query.push(("page[size]".to_string(), size.to_string()));
        self
    }

    /// Value of a `filter[key]` parameter, if present.
    pub fn filter_value(&self, key: &str) -> Option<&str> {
        let name = format!("filter[{key}]");
        self.query
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request/response exchange with the API.
///
/// Implementations perform no retries and no interpretation of the status
/// code; callers decide what a non-success status means.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &ApiRequest) -> Result<ApiResponse, ExportError>;
}

/// Font weight/slant of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Monospace,
}

/// A piece of inline text with uniform styling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Run {
    pub text: String,
    pub style: FontStyle,
    pub link: Option<String>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: FontStyle::Bold,
            link: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: FontStyle::Regular,
            link: Some(url.into()),
        }
    }
}

/// Text block sizes used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    /// Project titles.
    H1,
    /// Section titles.
    H2,
    /// Section sub-titles.
    H3,
    Body,
    Footer,
}

impl TextSize {
    pub fn points(self) -> f32 {
        match self {
            TextSize::H1 => 18.0,
            TextSize::H2 => 16.0,
            TextSize::H3 => 14.0,
            TextSize::Body => 12.0,
            TextSize::Footer => 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub text: String,
    pub link: Option<String>,
}

impl TableCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, link: Option<String>) -> Self {
        Self {
            text: text.into(),
            link,
        }
    }
}

/// A table with a styled header row; `column_widths` are relative ratios.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub column_widths: Vec<f32>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<TableCell>>,
}

/// Horizontal anchor of a placed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageAnchor {
    /// Flush with the right margin, at `top_mm` from the page top.
    TopRight { top_mm: f32 },
    /// Centred, at the current cursor.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub size_mm: f32,
    pub anchor: ImageAnchor,
}

/// Footer drawn by the builder on every page it starts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Footer {
    pub exported: String,
    pub qr_png: Option<Vec<u8>>,
}

/// Block-level markup produced from wiki markdown.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupBlock {
    Heading { level: u8, runs: Vec<Run> },
    Paragraph(Vec<Run>),
    ListItem { depth: usize, marker: String, runs: Vec<Run> },
    Code(String),
    Rule,
}

/// Converts wiki source text into markup blocks.
pub trait MarkupRenderer {
    fn render(&self, text: &str) -> Vec<MarkupBlock>;
}

/// Encodes a payload (a URL) as a scannable PNG image.
pub trait ImageGenerator {
    fn generate(&self, payload: &str) -> Result<Vec<u8>, RenderError>;
}

/// Page-oriented document construction.
///
/// Builders lay content out top to bottom and break pages on their own when
/// content overflows; `add_page` forces a fresh page.
pub trait DocumentBuilder {
    /// What `finish` hands back once the document is complete.
    type Output;

    fn add_page(&mut self);

    /// 1-based number of the current page, 0 before the first page.
    fn page_number(&self) -> usize;

    /// Footer for pages started from now on. Fails when the QR image cannot
    /// be used.
    fn set_footer(&mut self, footer: Footer) -> Result<(), RenderError>;

    /// Writes one block of text runs, wrapped to the content width.
    fn write_text(&mut self, size: TextSize, runs: &[Run]);

    /// Vertical gap measured in body lines.
    fn write_gap(&mut self, lines: f32);

    fn write_table(&mut self, table: &Table);

    fn place_image(&mut self, png: &[u8], placement: ImagePlacement) -> Result<(), RenderError>;

    fn write_markup(&mut self, blocks: &[MarkupBlock]);

    /// Completes the document. File-backed builders write `path` exactly once.
    fn finish(self, path: &Path) -> Result<Self::Output, RenderError>;
}
