//! printpdf-backed [`DocumentBuilder`].
//!
//! Lays content out top to bottom on A4 pages with the builtin Times faces.
//! Glyph widths are estimated, not measured, so wrapping is approximate. The
//! document is serialized once in [`DocumentBuilder::finish`] and written
//! through a temporary file that is renamed into place.
//!
//! Linked runs and table cells get a URI link annotation over the area they
//! were drawn in. Identical PNGs are decoded and embedded once.

use printpdf::graphics::{LinePoint, PaintMode, Point, Polygon, PolygonRing, WindingOrder};
use printpdf::ops::Op;
use printpdf::text::TextItem;
use printpdf::xobject::{XObject, XObjectTransform};
use printpdf::{
    Actions, BorderArray, BuiltinFont, ColorArray, LinkAnnotation, Mm, PdfDocument, PdfPage,
    PdfSaveOptions, Pt, Rect, Rgb, TextMatrix, XObjectId,
};
use std::collections::HashMap;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::contract::{
    DocumentBuilder, FontStyle, Footer, ImageAnchor, ImagePlacement, MarkupBlock, Run, Table,
    TextSize,
};
use crate::error::RenderError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
/// Space kept free at the bottom of every page for the footer.
const FOOTER_BAND_MM: f32 = 28.0;
const FOOTER_QR_MM: f32 = 15.0;
const LINE_SPACING: f32 = 1.25;
const CELL_PADDING_PT: f32 = 3.0;
const LIST_INDENT_MM: f32 = 6.0;

const HEADER_FILL: (f32, f32, f32) = (173.0 / 255.0, 216.0 / 255.0, 230.0 / 255.0);
const LINK_COLOUR: (f32, f32, f32) = (0.0, 0.0, 0.8);
const TEXT_COLOUR: (f32, f32, f32) = (0.0, 0.0, 0.0);

fn mm(value: f32) -> f32 {
    value * 72.0 / 25.4
}

fn colour((r, g, b): (f32, f32, f32)) -> printpdf::color::Color {
    printpdf::color::Color::Rgb(Rgb::new(r, g, b, None))
}

fn builtin(style: FontStyle) -> BuiltinFont {
    match style {
        FontStyle::Regular => BuiltinFont::TimesRoman,
        FontStyle::Bold => BuiltinFont::TimesBold,
        FontStyle::Italic => BuiltinFont::TimesItalic,
        FontStyle::BoldItalic => BuiltinFont::TimesBoldItalic,
        FontStyle::Monospace => BuiltinFont::Courier,
    }
}

/// Estimated advance of one character, as a share of the font size.
fn glyph_factor(style: FontStyle) -> f32 {
    match style {
        FontStyle::Monospace => 0.6,
        FontStyle::Bold | FontStyle::BoldItalic => 0.52,
        FontStyle::Regular | FontStyle::Italic => 0.48,
    }
}

fn text_width(text: &str, style: FontStyle, size: f32) -> f32 {
    text.chars().count() as f32 * size * glyph_factor(style)
}

/// The builtin fonts only cover Latin-1.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '-',
            c if (c as u32) < 0x100 && !c.is_control() => c,
            _ => '?',
        })
        .collect()
}

/// A word and the styling it was written with.
#[derive(Debug, Clone)]
struct Word {
    text: String,
    style: FontStyle,
    link: Option<String>,
}

fn split_words(runs: &[Run]) -> Vec<Word> {
    let mut words = Vec::new();
    for run in runs {
        for piece in run.text.split_whitespace() {
            words.push(Word {
                text: sanitize(piece),
                style: run.style,
                link: run.link.clone(),
            });
        }
    }
    words
}

/// Greedy line breaking. Words longer than a line are hard-split.
fn wrap(words: Vec<Word>, size: f32, width: f32) -> Vec<Vec<Word>> {
    let space = size * 0.25;
    let mut lines: Vec<Vec<Word>> = Vec::new();
    let mut line: Vec<Word> = Vec::new();
    let mut used = 0.0;

    for word in words {
        let mut pending = vec![word];
        while let Some(word) = pending.pop() {
            let w = text_width(&word.text, word.style, size);
            let needed = if line.is_empty() { w } else { used + space + w };
            if needed <= width || (line.is_empty() && word.text.chars().count() <= 1) {
                used = needed;
                line.push(word);
            } else if line.is_empty() {
                let per_char = size * glyph_factor(word.style);
                let fit = ((width / per_char).floor() as usize).max(1);
                let head: String = word.text.chars().take(fit).collect();
                let tail: String = word.text.chars().skip(fit).collect();
                if !tail.is_empty() {
                    pending.push(Word { text: tail, ..word.clone() });
                }
                pending.push(Word { text: head, ..word });
            } else {
                lines.push(std::mem::take(&mut line));
                used = 0.0;
                pending.push(word);
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// printpdf files link annotations under each page's `Resources`; viewers
/// only read them from the page dictionary itself.
fn attach_annotations(bytes: &[u8]) -> Result<Vec<u8>, RenderError> {
    let pdf_error = |e: lopdf::Error| RenderError::Pdf(e.to_string());
    let mut document = lopdf::Document::load_mem(bytes).map_err(pdf_error)?;
    let mut moved = 0;
    for page_id in document.get_pages().into_values() {
        let page = document.get_dictionary(page_id).map_err(pdf_error)?;
        let Ok(resources) = page.get(b"Resources").and_then(|r| r.as_reference()) else {
            continue;
        };
        let annotations = document
            .get_dictionary_mut(resources)
            .map_err(pdf_error)?
            .remove(b"Annots");
        if let Some(annotations) = annotations {
            if annotations.as_array().is_ok_and(|links| !links.is_empty()) {
                moved += 1;
                document
                    .get_dictionary_mut(page_id)
                    .map_err(pdf_error)?
                    .set("Annots", annotations);
            }
        }
    }
    debug!(pages_with_links = moved, "Attached link annotations");

    let mut out = Vec::with_capacity(bytes.len());
    document.save_to(&mut out).map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

/// What [`PdfBuilder::finish`] reports about the written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPdf {
    pub pages: usize,
    pub bytes: usize,
}

pub struct PdfBuilder {
    document: PdfDocument,
    pages: Vec<Vec<Op>>,
    /// Distance of the layout cursor from the page top, in points.
    y: f32,
    footer: Footer,
    footer_image: Option<(XObjectId, (usize, usize))>,
    /// Embedded images keyed by their PNG bytes.
    images: HashMap<Vec<u8>, (XObjectId, (usize, usize))>,
    /// Bottom edge and width of an image floated at the top right.
    float_right: Option<(f32, f32)>,
}

impl PdfBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            document: PdfDocument::new(title),
            pages: Vec::new(),
            y: mm(MARGIN_MM),
            footer: Footer::default(),
            footer_image: None,
            images: HashMap::new(),
            float_right: None,
        }
    }

    fn page_height(&self) -> f32 {
        mm(PAGE_HEIGHT_MM)
    }

    fn left(&self) -> f32 {
        mm(MARGIN_MM)
    }

    fn content_width(&self) -> f32 {
        mm(PAGE_WIDTH_MM - 2.0 * MARGIN_MM)
    }

    fn bottom(&self) -> f32 {
        self.page_height() - mm(FOOTER_BAND_MM)
    }

    /// Usable width at the cursor, minus any floated image.
    fn width_at_cursor(&self) -> f32 {
        match self.float_right {
            Some((until, width)) if self.y < until => self.content_width() - width,
            _ => self.content_width(),
        }
    }

    fn ops(&mut self) -> &mut Vec<Op> {
        if self.pages.is_empty() {
            self.add_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self, height: f32) {
        if self.pages.is_empty() || self.y + height > self.bottom() {
            self.add_page();
        }
    }

    fn register_image(&mut self, png: &[u8]) -> Result<(XObjectId, (usize, usize)), RenderError> {
        if let Some(known) = self.images.get(png) {
            return Ok(known.clone());
        }
        let mut warnings = Vec::new();
        let image = printpdf::image::RawImage::decode_from_bytes(png, &mut warnings)
            .map_err(|e| RenderError::Image(e.to_string()))?;
        let dims = (image.width, image.height);
        let id = XObjectId::new();
        self.document
            .resources
            .xobjects
            .map
            .insert(id.clone(), XObject::Image(image));
        self.images.insert(png.to_vec(), (id.clone(), dims));
        Ok((id, dims))
    }

    fn draw_image(&mut self, id: XObjectId, dims: (usize, usize), x: f32, top: f32, size: f32) {
        let y = self.page_height() - top - size;
        let transform = XObjectTransform {
            translate_x: Some(Pt(x)),
            translate_y: Some(Pt(y)),
            scale_x: Some(size / dims.0.max(1) as f32),
            scale_y: Some(size / dims.1.max(1) as f32),
            rotate: None,
            dpi: Some(72.0),
        };
        self.ops().push(Op::UseXobject { id, transform });
    }

    /// Writes `text` with its baseline `top + size` below the page top.
    fn draw_text(&mut self, text: &str, style: FontStyle, size: f32, x: f32, top: f32, fill: (f32, f32, f32)) {
        if text.is_empty() {
            return;
        }
        let baseline = self.page_height() - top - size * 0.8;
        let font = builtin(style);
        let ops = self.ops();
        ops.push(Op::StartTextSection);
        ops.push(Op::SetFillColor { col: colour(fill) });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(size),
            font: font.clone(),
        });
        ops.push(Op::SetTextMatrix {
            matrix: TextMatrix::Translate(Pt(x), Pt(baseline)),
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text.to_string())],
            font,
        });
        ops.push(Op::EndTextSection);
    }

    fn draw_rect(&mut self, x: f32, top: f32, width: f32, height: f32, mode: PaintMode) {
        let bottom = self.page_height() - top - height;
        let upper = bottom + height;
        let point = |x: f32, y: f32| LinePoint {
            p: Point { x: Pt(x), y: Pt(y) },
            bezier: false,
        };
        let polygon = Polygon {
            rings: vec![PolygonRing {
                points: vec![
                    point(x, bottom),
                    point(x + width, bottom),
                    point(x + width, upper),
                    point(x, upper),
                ],
            }],
            mode,
            winding_order: WindingOrder::NonZero,
        };
        self.ops().push(Op::DrawPolygon { polygon });
    }

    /// Makes the area `top` below the page top clickable, opening `uri`.
    fn link_area(&mut self, uri: &str, x: f32, top: f32, width: f32, height: f32) {
        let rect = Rect {
            x: Pt(x),
            y: Pt(self.page_height() - top - height),
            width: Pt(width),
            height: Pt(height),
        };
        let link = LinkAnnotation::new(
            rect,
            Actions::Uri(uri.to_string()),
            Some(BorderArray::Solid([0.0, 0.0, 0.0])),
            Some(ColorArray::Transparent),
            None,
        );
        self.ops().push(Op::LinkAnnotation { link });
    }

    fn draw_rule(&mut self, top: f32) {
        let y = self.page_height() - top;
        let (x0, x1) = (self.left(), self.left() + self.content_width());
        let ops = self.ops();
        ops.push(Op::SetOutlineColor { col: colour((0.6, 0.6, 0.6)) });
        ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![
                        LinePoint { p: Point { x: Pt(x0), y: Pt(y) }, bezier: false },
                        LinePoint { p: Point { x: Pt(x1), y: Pt(y) }, bezier: false },
                    ],
                }],
                mode: PaintMode::Stroke,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    fn draw_footer(&mut self) {
        let number = self.pages.len();
        let size = TextSize::Footer.points();
        let text_top = self.page_height() - mm(15.0);
        let page_label = format!("Page: {number}");
        let right = self.left() + self.content_width() - text_width(&page_label, FontStyle::Regular, size);
        self.draw_text(&page_label, FontStyle::Regular, size, right, text_top, TEXT_COLOUR);
        let exported = sanitize(&format!("Exported: {}", self.footer.exported));
        self.draw_text(&exported, FontStyle::Regular, size, self.left(), text_top, TEXT_COLOUR);

        if let Some((id, dims)) = self.footer_image.clone() {
            let qr = mm(FOOTER_QR_MM);
            let x = (mm(PAGE_WIDTH_MM) - qr) / 2.0;
            let top = self.page_height() - mm(FOOTER_BAND_MM) + mm(2.0);
            self.draw_image(id, dims, x, top, qr);
        }
    }

    /// Lays out wrapped runs starting at the cursor, `indent` from the margin.
    fn write_runs(&mut self, size: f32, runs: &[Run], indent: f32) {
        let line_height = size * LINE_SPACING;
        let words = split_words(runs);
        if words.is_empty() {
            return;
        }
        self.ensure_room(line_height);
        let width = self.width_at_cursor() - indent;
        for line in wrap(words, size, width) {
            self.ensure_room(line_height);
            self.write_line(&line, size, self.left() + indent);
            self.y += line_height;
        }
    }

    /// Draws one wrapped line, merging neighbouring words with equal styling.
    fn write_line(&mut self, line: &[Word], size: f32, start: f32) {
        let space = size * 0.25;
        let mut x = start;
        let mut segment = String::new();
        let mut segment_x = x;
        let mut current: Option<(FontStyle, Option<String>)> = None;

        for word in line {
            let key = (word.style, word.link.clone());
            if current.as_ref().is_some_and(|c| *c != key) {
                self.flush_segment(&segment, current.take(), size, segment_x);
                segment.clear();
                segment_x = x;
            }
            if !segment.is_empty() {
                segment.push(' ');
            }
            segment.push_str(&word.text);
            current = Some(key);
            x += text_width(&word.text, word.style, size) + space;
        }
        self.flush_segment(&segment, current, size, segment_x);
    }

    fn flush_segment(&mut self, text: &str, key: Option<(FontStyle, Option<String>)>, size: f32, x: f32) {
        let Some((style, link)) = key else {
            return;
        };
        let top = self.y;
        match link {
            Some(uri) if !text.is_empty() => {
                self.draw_text(text, style, size, x, top, LINK_COLOUR);
                let width = text_width(text, style, size);
                self.link_area(&uri, x, top, width, size * LINE_SPACING);
            }
            _ => self.draw_text(text, style, size, x, top, TEXT_COLOUR),
        }
    }

    /// Wraps every cell of a row; returns the lines per cell and the row height.
    fn layout_row(&self, cells: &[(String, Option<String>)], widths: &[f32], style: FontStyle) -> (Vec<Vec<Vec<Word>>>, f32) {
        let size = TextSize::Body.points();
        let wrapped: Vec<Vec<Vec<Word>>> = cells
            .iter()
            .zip(widths)
            .map(|((text, _), width)| {
                let words = split_words(&[Run {
                    text: text.clone(),
                    style,
                    link: None,
                }]);
                wrap(words, size, width - 2.0 * CELL_PADDING_PT)
            })
            .collect();
        let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let height = lines as f32 * size * LINE_SPACING + 2.0 * CELL_PADDING_PT;
        (wrapped, height)
    }

    fn draw_row(&mut self, cells: &[(String, Option<String>)], widths: &[f32], header: bool) {
        let size = TextSize::Body.points();
        let line_height = size * LINE_SPACING;
        let style = if header { FontStyle::Bold } else { FontStyle::Regular };
        let (wrapped, height) = self.layout_row(cells, widths, style);

        let top = self.y;
        let mut x = self.left();
        for (((_, link), width), cell_lines) in cells.iter().zip(widths).zip(wrapped) {
            if header {
                self.ops().push(Op::SetFillColor { col: colour(HEADER_FILL) });
                self.draw_rect(x, top, *width, height, PaintMode::Fill);
            }
            self.ops().push(Op::SetOutlineColor { col: colour(TEXT_COLOUR) });
            self.ops().push(Op::SetOutlineThickness { pt: Pt(0.15) });
            self.draw_rect(x, top, *width, height, PaintMode::Stroke);

            let fill = if link.is_some() { LINK_COLOUR } else { TEXT_COLOUR };
            for (i, line) in cell_lines.iter().enumerate() {
                let text = line.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
                let line_top = top + CELL_PADDING_PT + i as f32 * line_height;
                self.draw_text(&text, style, size, x + CELL_PADDING_PT, line_top, fill);
            }
            if let Some(uri) = link {
                self.link_area(uri, x, top, *width, height);
            }
            x += width;
        }
        self.y = top + height;
    }
}

impl DocumentBuilder for PdfBuilder {
    type Output = WrittenPdf;

    fn add_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = mm(MARGIN_MM);
        self.float_right = None;
        self.draw_footer();
        debug!(page = self.pages.len(), "Started PDF page");
    }

    fn page_number(&self) -> usize {
        self.pages.len()
    }

    fn set_footer(&mut self, footer: Footer) -> Result<(), RenderError> {
        self.footer_image = match footer.qr_png.as_deref() {
            Some(png) => Some(self.register_image(png)?),
            None => None,
        };
        self.footer = footer;
        Ok(())
    }

    fn write_text(&mut self, size: TextSize, runs: &[Run]) {
        self.write_runs(size.points(), runs, 0.0);
    }

    fn write_gap(&mut self, lines: f32) {
        self.y += lines * TextSize::Body.points() * LINE_SPACING;
    }

    fn write_table(&mut self, table: &Table) {
        let total: f32 = table.column_widths.iter().sum::<f32>().max(f32::EPSILON);
        let widths: Vec<f32> = table
            .column_widths
            .iter()
            .map(|ratio| self.content_width() * ratio / total)
            .collect();

        let header: Vec<(String, Option<String>)> =
            table.header.iter().map(|h| (h.clone(), None)).collect();
        let (_, header_height) = self.layout_row(&header, &widths, FontStyle::Bold);
        self.ensure_room(header_height);
        self.draw_row(&header, &widths, true);

        for row in &table.rows {
            let cells: Vec<(String, Option<String>)> = row
                .iter()
                .map(|cell| (cell.text.clone(), cell.link.clone()))
                .collect();
            let (_, height) = self.layout_row(&cells, &widths, FontStyle::Regular);
            if self.y + height > self.bottom() {
                // Continue on a new page under a repeated header.
                self.add_page();
                self.draw_row(&header, &widths, true);
            }
            self.draw_row(&cells, &widths, false);
        }
    }

    fn place_image(&mut self, png: &[u8], placement: ImagePlacement) -> Result<(), RenderError> {
        let (id, dims) = self.register_image(png)?;
        let size = mm(placement.size_mm);
        match placement.anchor {
            ImageAnchor::TopRight { top_mm } => {
                if self.pages.is_empty() {
                    self.add_page();
                }
                let x = self.left() + self.content_width() - size;
                let top = mm(top_mm);
                self.draw_image(id, dims, x, top, size);
                self.float_right = Some((top + size, size + mm(2.0)));
            }
            ImageAnchor::Inline => {
                self.ensure_room(size);
                let x = self.left() + (self.content_width() - size) / 2.0;
                let top = self.y;
                self.draw_image(id, dims, x, top, size);
                self.y += size;
            }
        }
        Ok(())
    }

    fn write_markup(&mut self, blocks: &[MarkupBlock]) {
        let body = TextSize::Body.points();
        for block in blocks {
            match block {
                MarkupBlock::Heading { level, runs } => {
                    let size = match level {
                        1 => TextSize::H2.points(),
                        2 => TextSize::H3.points(),
                        _ => body,
                    };
                    let bold: Vec<Run> = runs
                        .iter()
                        .map(|r| Run {
                            style: FontStyle::Bold,
                            ..r.clone()
                        })
                        .collect();
                    self.write_runs(size, &bold, 0.0);
                    self.write_gap(0.3);
                }
                MarkupBlock::Paragraph(runs) => {
                    self.write_runs(body, runs, 0.0);
                    self.write_gap(0.5);
                }
                MarkupBlock::ListItem { depth, marker, runs } => {
                    let indent = mm(LIST_INDENT_MM) * (*depth as f32 + 1.0);
                    let mut line = vec![Run::plain(marker.clone())];
                    line.extend(runs.iter().cloned());
                    self.write_runs(body, &line, indent);
                }
                MarkupBlock::Code(code) => {
                    let runs: Vec<Run> = code
                        .lines()
                        .map(|l| Run {
                            text: l.to_string(),
                            style: FontStyle::Monospace,
                            link: None,
                        })
                        .collect();
                    for run in runs {
                        self.write_runs(body * 0.9, std::slice::from_ref(&run), mm(LIST_INDENT_MM));
                    }
                    self.write_gap(0.5);
                }
                MarkupBlock::Rule => {
                    self.ensure_room(body);
                    let top = self.y + body * 0.5;
                    self.draw_rule(top);
                    self.y += body;
                }
            }
        }
    }

    fn finish(mut self, path: &Path) -> Result<WrittenPdf, RenderError> {
        if self.pages.is_empty() {
            self.add_page();
        }
        let page_count = self.pages.len();
        self.document.pages = self
            .pages
            .into_iter()
            .map(|ops| PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops))
            .collect();

        let mut warnings = Vec::new();
        let bytes = self.document.save(&PdfSaveOptions::default(), &mut warnings);
        let bytes = attach_annotations(&bytes)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        let mut file = NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut file, &bytes)?;
        file.persist(path).map_err(|e| RenderError::Io(e.error))?;

        info!(path = %path.display(), pages = page_count, bytes = bytes.len(), "Wrote PDF");
        Ok(WrittenPdf {
            pages: page_count,
            bytes: bytes.len(),
        })
    }
}
