//! Document rendering of one project tree.
//!
//! The tree below a root record is walked depth-first in pre-order, so a
//! node's pages come before all of its descendants' pages and siblings follow
//! the order of `children`. Records are only read; the same slice can be
//! rendered any number of times.

use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::contract::{
    DocumentBuilder, Footer, ImageAnchor, ImageGenerator, ImagePlacement, MarkupRenderer, Run,
    Table, TableCell, TextSize,
};
use crate::error::RenderError;
use crate::record::{title_case, MetadataValue, ParentRef, ProjectRecord};

/// `%Z` prints the zone abbreviation when formatted through a [`Tz`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

const HEADER_QR_MM: f32 = 30.0;
const HEADER_QR_TOP_MM: f32 = 5.0;
const TABLE_COLUMNS: [f32; 3] = [1.0, 0.5, 1.0];
const NOT_APPLICABLE: &str = "N/A";

/// Human label of a metadata key.
pub fn field_label(key: &str) -> String {
    match key {
        "identifiers" => "DOI".to_string(),
        "funders" => "Support/Funding Information".to_string(),
        other => title_case(&other.replace('_', " ")),
    }
}

/// The zone named by `TZ`, else the system zone.
pub fn local_zone() -> Option<Tz> {
    std::env::var("TZ")
        .ok()
        .and_then(|name| zone_named(&name))
        .or_else(|| iana_time_zone::get_timezone().ok().and_then(|name| zone_named(&name)))
}

/// IANA zone for a `TZ`-style name such as `Europe/London` or `:Asia/Tokyo`.
fn zone_named(name: &str) -> Option<Tz> {
    name.trim().trim_start_matches(':').parse::<Tz>().ok()
}

/// `<title>-<timestamp>.pdf` with spaces, slashes and colons as hyphens.
pub fn document_filename(title: &str, timestamp: &str) -> String {
    let safe = |s: &str| s.replace([' ', '/', ':'], "-");
    format!("{}-{}.pdf", safe(title), safe(timestamp))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Renders project trees through a [`DocumentBuilder`].
pub struct Renderer<'a> {
    markup: &'a dyn MarkupRenderer,
    images: &'a dyn ImageGenerator,
    exported_at: DateTime<Utc>,
    zone: Option<Tz>,
}

impl<'a> Renderer<'a> {
    pub fn new(markup: &'a dyn MarkupRenderer, images: &'a dyn ImageGenerator) -> Self {
        Self {
            markup,
            images,
            exported_at: Utc::now(),
            zone: local_zone(),
        }
    }

    /// Fixes the export time shown in footers and filenames.
    pub fn exported_at<T: TimeZone>(mut self, at: DateTime<T>) -> Self {
        self.exported_at = at.with_timezone(&Utc);
        self
    }

    /// Shows times in `zone` instead of the local one.
    pub fn time_zone(mut self, zone: Tz) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn timestamp(&self) -> String {
        match self.zone {
            Some(zone) => self.exported_at.with_timezone(&zone).format(TIMESTAMP_FORMAT).to_string(),
            // Unknown zone name: chrono can only print the offset.
            None => self.exported_at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Renders the tree rooted at `records[root_index]` into one document.
    ///
    /// Without `output_folder` the document goes to the working directory;
    /// a given folder is created when missing.
    pub fn render<B: DocumentBuilder>(
        &self,
        mut builder: B,
        records: &[ProjectRecord],
        root_index: usize,
        output_folder: Option<&Path>,
    ) -> Result<(B::Output, PathBuf), RenderError> {
        let root = records.get(root_index).ok_or(RenderError::RootOutOfRange {
            index: root_index,
            len: records.len(),
        })?;

        let timestamp = self.timestamp();
        let filename = document_filename(root.title(), &timestamp);
        let path = match output_folder {
            Some(folder) => {
                std::fs::create_dir_all(folder)?;
                folder.join(filename)
            }
            None => std::env::current_dir()?.join(filename),
        };

        let root_parent = match &root.parent {
            ParentRef::None => None,
            ParentRef::Foreign(title, url) => Some((title.clone(), url.clone())),
            ParentRef::InBatch(id) => records
                .iter()
                .find(|r| r.id() == id)
                .map(|p| (p.title().to_string(), p.url().to_string())),
        };

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&ProjectRecord, Option<(String, String)>)> = vec![(root, root_parent)];
        let mut nodes = 0;

        while let Some((record, parent)) = stack.pop() {
            if !visited.insert(record.id()) {
                continue;
            }
            self.write_node(&mut builder, record, parent.as_ref(), &timestamp)?;
            nodes += 1;

            let here = (record.title().to_string(), record.url().to_string());
            for child_id in record.children.iter().rev() {
                match records.iter().find(|r| r.id() == child_id) {
                    Some(child) => stack.push((child, Some(here.clone()))),
                    None => debug!(child_id = %child_id, "Child not in this export; skipped"),
                }
            }
        }

        let pages = builder.page_number();
        let output = builder.finish(&path)?;
        info!(
            root = %root.id(),
            nodes = nodes,
            pages = pages,
            path = %path.display(),
            "Rendered project tree"
        );
        Ok((output, path))
    }

    fn write_node<B: DocumentBuilder>(
        &self,
        builder: &mut B,
        record: &ProjectRecord,
        parent: Option<&(String, String)>,
        timestamp: &str,
    ) -> Result<(), RenderError> {
        let url = record.url();
        let qr = if url.is_empty() {
            None
        } else {
            Some(self.images.generate(url)?)
        };

        builder.set_footer(Footer {
            exported: timestamp.to_string(),
            qr_png: qr.clone(),
        })?;
        builder.add_page();

        self.write_header(builder, record, parent, qr.as_deref())?;
        self.write_metadata(builder, record);
        self.write_contributors(builder, record);
        self.write_files(builder, record);
        self.write_wikis(builder, record);
        Ok(())
    }

    fn write_header<B: DocumentBuilder>(
        &self,
        builder: &mut B,
        record: &ProjectRecord,
        parent: Option<&(String, String)>,
        qr: Option<&[u8]>,
    ) -> Result<(), RenderError> {
        if let Some(png) = qr {
            builder.place_image(
                png,
                ImagePlacement {
                    size_mm: HEADER_QR_MM,
                    anchor: ImageAnchor::TopRight {
                        top_mm: HEADER_QR_TOP_MM,
                    },
                },
            )?;
        }

        if let Some((title, url)) = parent {
            builder.write_text(TextSize::Body, &[Run::bold("Parent: "), Run::plain(title.as_str())]);
            builder.write_text(
                TextSize::Body,
                &[Run::bold("Parent URL: "), Run::link(url.as_str(), url.as_str())],
            );
            builder.write_gap(1.0);
        }

        let parent_title = parent.map(|(title, _)| title.as_str());
        if parent_title != Some(record.title()) {
            builder.write_text(TextSize::H1, &[Run::bold(record.title())]);
        }

        let url = record.url();
        if !url.is_empty() {
            builder.write_text(TextSize::Body, &[Run::bold("Project URL: "), Run::link(url, url)]);
        }
        builder.write_gap(2.0);
        Ok(())
    }

    fn write_metadata<B: DocumentBuilder>(&self, builder: &mut B, record: &ProjectRecord) {
        builder.write_text(TextSize::H2, &[Run::bold("1. Project Metadata")]);
        builder.write_gap(0.5);

        for (key, value) in record.metadata.fields() {
            // Already shown in the header.
            if key == "url" {
                continue;
            }
            let label = field_label(key);
            match value {
                MetadataValue::Text(text) => {
                    builder.write_text(
                        TextSize::Body,
                        &[Run::bold(format!("{label}: ")), Run::plain(text)],
                    );
                }
                MetadataValue::Flag(flag) => {
                    builder.write_text(
                        TextSize::Body,
                        &[Run::bold(format!("{label}: ")), Run::plain(yes_no(flag))],
                    );
                }
                MetadataValue::List(entries) => {
                    builder.write_gap(0.5);
                    builder.write_text(TextSize::H3, &[Run::bold(label)]);
                    for entry in entries {
                        for (sub_key, sub_value) in entry {
                            builder.write_text(
                                TextSize::Body,
                                &[
                                    Run::bold(format!("{}: ", field_label(sub_key))),
                                    Run::plain(sub_value),
                                ],
                            );
                        }
                        builder.write_gap(0.5);
                    }
                }
            }
        }
        builder.write_gap(2.0);
    }

    fn write_contributors<B: DocumentBuilder>(&self, builder: &mut B, record: &ProjectRecord) {
        builder.write_text(TextSize::H2, &[Run::bold("2. Contributors")]);
        let table = Table {
            column_widths: TABLE_COLUMNS.to_vec(),
            header: vec![
                "Name".to_string(),
                "Bibliographic?".to_string(),
                "Profile Link".to_string(),
            ],
            rows: record
                .contributors
                .iter()
                .map(|c| {
                    vec![
                        TableCell::text(c.full_name()),
                        TableCell::text(yes_no(c.is_bibliographic())),
                        TableCell::linked(c.profile_url(), Some(c.profile_url().to_string())),
                    ]
                })
                .collect(),
        };
        builder.write_table(&table);
        builder.write_gap(2.0);
    }

    fn write_files<B: DocumentBuilder>(&self, builder: &mut B, record: &ProjectRecord) {
        builder.write_text(TextSize::H2, &[Run::bold("3. Files in Main Project")]);
        builder.write_gap(0.5);
        builder.write_text(TextSize::H3, &[Run::bold("OSF Storage")]);

        if record.files.is_empty() {
            builder.write_gap(0.5);
            builder.write_text(TextSize::Body, &[Run::plain("No files found for this project.")]);
            builder.write_gap(0.5);
            return;
        }

        let table = Table {
            column_widths: TABLE_COLUMNS.to_vec(),
            header: vec![
                "File Name".to_string(),
                "Size (MB)".to_string(),
                "Download Link".to_string(),
            ],
            rows: record
                .files
                .iter()
                .map(|f| {
                    let download = f.download_url().map(str::to_string);
                    vec![
                        TableCell::text(f.path()),
                        TableCell::text(f.size_mb().unwrap_or(NOT_APPLICABLE)),
                        TableCell::linked(
                            f.download_url().unwrap_or(NOT_APPLICABLE),
                            download,
                        ),
                    ]
                })
                .collect(),
        };
        builder.write_table(&table);
    }

    /// The wiki section always opens a fresh page; so does every wiki after
    /// the first.
    fn write_wikis<B: DocumentBuilder>(&self, builder: &mut B, record: &ProjectRecord) {
        builder.add_page();
        builder.write_text(TextSize::H1, &[Run::bold("4. Wiki")]);
        builder.write_gap(1.0);

        if record.wikis.is_empty() {
            builder.write_text(TextSize::Body, &[Run::plain("No wiki pages found for this project.")]);
            return;
        }

        for (i, (name, content)) in record.wikis.iter().enumerate() {
            if i > 0 {
                builder.add_page();
            }
            builder.write_text(TextSize::H2, &[Run::bold(name.as_str())]);
            builder.write_markup(&self.markup.render(content));
        }
    }
}
