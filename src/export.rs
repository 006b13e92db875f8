//! Coordinates one export run: materialize the project trees, then write one
//! PDF per exportable tree.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::ExportConfig;
use crate::contract::Fetch;
use crate::error::ExportError;
use crate::markup::MarkdownRenderer;
use crate::materialize::{materialize, MaterializeOptions};
use crate::pdf::PdfBuilder;
use crate::qr::QrImageGenerator;
use crate::record::Materialized;
use crate::render::Renderer;

/// Outcome of an export run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportReport {
    /// Records materialized, components included.
    pub projects_found: usize,
    /// Ids of the records each document starts from.
    pub roots: Vec<String>,
    pub skipped_nodes: Vec<String>,
    pub documents: Vec<PathBuf>,
}

/// Stage notifications of [`Exporter::run_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress<'a> {
    /// Number of records materialized.
    Found(usize),
    /// A document for this root id is being rendered.
    Rendering(&'a str),
    Written(&'a Path),
}

pub struct Exporter<'a> {
    fetcher: &'a dyn Fetch,
    options: MaterializeOptions,
    output_dir: Option<PathBuf>,
    exported_at: Option<DateTime<Local>>,
}

impl<'a> Exporter<'a> {
    pub fn new(fetcher: &'a dyn Fetch, config: &ExportConfig, project_id: Option<String>) -> Self {
        let mut options = MaterializeOptions::new(config.api_host());
        options.page_size = config.page_size;
        options.keep_going = config.keep_going;
        options.project_id = project_id;
        Self {
            fetcher,
            options,
            output_dir: config.output_dir.clone(),
            exported_at: None,
        }
    }

    /// Pins the export timestamp instead of reading the clock per document.
    pub fn exported_at(mut self, at: DateTime<Local>) -> Self {
        self.exported_at = Some(at);
        self
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub async fn materialize(&self) -> Result<Materialized, ExportError> {
        info!(
            api_host = %self.options.api_host,
            project_id = ?self.options.project_id,
            "[EXPORT] Starting materialization"
        );
        materialize(self.fetcher, &self.options).await.map_err(|e| {
            error!(error = %e, "[EXPORT][ERROR] Materialization failed");
            e
        })
    }

    /// Writes the tree rooted at `root_index` to a PDF and returns its path.
    pub fn render_tree(
        &self,
        materialized: &Materialized,
        root_index: usize,
    ) -> Result<PathBuf, ExportError> {
        let markup = MarkdownRenderer;
        let images = QrImageGenerator::default();
        let mut renderer = Renderer::new(&markup, &images);
        if let Some(at) = self.exported_at {
            renderer = renderer.exported_at(at);
        }

        let title = materialized
            .records
            .get(root_index)
            .map(|r| r.title().to_string())
            .unwrap_or_default();
        let (written, path) = renderer
            .render(
                PdfBuilder::new(&title),
                &materialized.records,
                root_index,
                self.output_dir.as_deref(),
            )
            .map_err(|e| {
                error!(root_index = root_index, error = %e, "[EXPORT][ERROR] Rendering failed");
                ExportError::from(e)
            })?;
        info!(
            path = %path.display(),
            pages = written.pages,
            bytes = written.bytes,
            "[EXPORT] Wrote document"
        );
        Ok(path)
    }

    /// Materializes and renders every exportable tree.
    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        self.run_with(|_| {}).await
    }

    /// [`Exporter::run`], reporting each stage to `progress`.
    pub async fn run_with(
        &self,
        mut progress: impl FnMut(Progress<'_>),
    ) -> Result<ExportReport, ExportError> {
        let materialized = self.materialize().await?;
        progress(Progress::Found(materialized.records.len()));

        let mut report = ExportReport {
            projects_found: materialized.records.len(),
            skipped_nodes: materialized.skipped.clone(),
            ..ExportReport::default()
        };
        for root_index in materialized.export_roots() {
            let root_id = materialized.records[root_index].id();
            progress(Progress::Rendering(root_id));
            let path = self.render_tree(&materialized, root_index)?;
            progress(Progress::Written(&path));
            report.documents.push(path);
            report.roots.push(root_id.to_string());
        }
        if report.documents.is_empty() {
            warn!("[EXPORT] No projects to export");
        }
        info!(
            documents = report.documents.len(),
            skipped = report.skipped_nodes.len(),
            "[EXPORT] Export finished"
        );
        Ok(report)
    }
}
