//! Typed readers for one node relation each.
//!
//! Every reader decodes the relation's JSON:API documents into the shapes in
//! [`crate::resources`] and returns the canonical value stored on a
//! [`ProjectRecord`](crate::record::ProjectRecord). Required relations
//! (children, subjects, the node itself) are read with
//! [`collect_all`]; every other relation is read with
//! [`collect_best_effort`] and degrades on transport failure.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::contract::{ApiRequest, Fetch};
use crate::error::ExportError;
use crate::paginate::{collect_all, collect_best_effort, expect_success};
use crate::record::{Contributor, FileEntry, Funder, NOT_AVAILABLE};
use crate::resources::{
    ContributorResource, CustomMetadataResource, FileResource, IdentifierResource,
    NamedResource, NodeResource, SubjectResource, WikiResource,
};

/// Storage provider whose tree is exported.
pub const STORAGE_PROVIDER: &str = "osfstorage/";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resource type, language and funding of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomMetadata {
    pub resource_type: String,
    pub resource_lang: String,
    pub funders: Vec<Funder>,
}

impl Default for CustomMetadata {
    fn default() -> Self {
        Self {
            resource_type: NOT_AVAILABLE.to_string(),
            resource_lang: NOT_AVAILABLE.to_string(),
            funders: Vec::new(),
        }
    }
}

/// Size in MB rounded to two decimals, printed with at least one decimal.
pub fn format_size_mb(bytes: f64) -> String {
    let mb = (bytes / BYTES_PER_MB * 100.0).round() / 100.0;
    if mb.fract() == 0.0 {
        format!("{mb:.1}")
    } else {
        format!("{mb}")
    }
}

enum Frame {
    /// List the subfolders of a folder, then schedule its files.
    Explore(String),
    /// List the files directly inside a folder.
    EmitFiles(String),
}

/// Reads node relations through a [`Fetch`] capability.
#[derive(Clone, Copy)]
pub struct RelationReader<'a> {
    fetcher: &'a dyn Fetch,
    page_size: usize,
}

impl<'a> RelationReader<'a> {
    pub fn new(fetcher: &'a dyn Fetch, page_size: usize) -> Self {
        Self { fetcher, page_size }
    }

    fn collection(&self, url: &str) -> ApiRequest {
        ApiRequest::get(url).page_size(self.page_size)
    }

    /// A single node document. Required.
    pub async fn node(&self, url: &str) -> Result<NodeResource, ExportError> {
        let mut nodes: Vec<NodeResource> = collect_all(self.fetcher, ApiRequest::get(url)).await?;
        if nodes.is_empty() {
            return Err(ExportError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(nodes.swap_remove(0))
    }

    /// Every node of a listing, such as the caller's root projects. Required.
    pub async fn nodes(&self, request: ApiRequest) -> Result<Vec<NodeResource>, ExportError> {
        collect_all(self.fetcher, request).await
    }

    /// Child node descriptors, in API order. Required.
    pub async fn children(&self, link: &str) -> Result<Vec<NodeResource>, ExportError> {
        collect_all(self.fetcher, self.collection(link)).await
    }

    /// Comma-joined subject texts. Required.
    pub async fn subjects(&self, link: &str) -> Result<String, ExportError> {
        let subjects: Vec<SubjectResource> = collect_all(self.fetcher, self.collection(link)).await?;
        Ok(join(subjects.into_iter().map(|s| s.attributes.text)))
    }

    /// Comma-joined DOI values; the server filters on the doi category.
    pub async fn identifiers(&self, link: &str) -> Result<String, ExportError> {
        let request = self.collection(link).filter("category", "doi");
        let identifiers: Vec<IdentifierResource> =
            collect_best_effort(self.fetcher, request, "identifiers").await?;
        Ok(join(identifiers.into_iter().map(|i| i.attributes.value)))
    }

    /// Display names of a to-one or to-many relation (license, institutions).
    pub async fn names(&self, link: &str, relation: &str) -> Result<String, ExportError> {
        let named: Vec<NamedResource> =
            collect_best_effort(self.fetcher, self.collection(link), relation).await?;
        Ok(join(named.into_iter().map(|n| n.attributes.name)))
    }

    /// Contributors with their embedded user. An entry without the user
    /// embed is an upstream data defect and fails the read.
    pub async fn contributors(
        &self,
        node_id: &str,
        link: &str,
    ) -> Result<Vec<Contributor>, ExportError> {
        let contributors: Vec<ContributorResource> =
            collect_best_effort(self.fetcher, self.collection(link), "contributors").await?;

        let mut out = Vec::with_capacity(contributors.len());
        for contributor in contributors {
            let Some(user) = contributor.embeds.users.data.into_vec().into_iter().next() else {
                return Err(ExportError::MissingRelation {
                    node_id: node_id.to_string(),
                    relation: "embeds.users".to_string(),
                });
            };
            out.push(Contributor(
                user.attributes.full_name,
                contributor.attributes.bibliographic,
                user.links.html.unwrap_or_default(),
            ));
        }
        Ok(out)
    }

    /// Custom item metadata record of a node. Absent records give defaults.
    pub async fn custom_metadata(&self, url: &str) -> Result<CustomMetadata, ExportError> {
        let records: Vec<CustomMetadataResource> =
            collect_best_effort(self.fetcher, ApiRequest::get(url), "custom_metadata").await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(CustomMetadata::default());
        };
        let attributes = record.attributes;
        Ok(CustomMetadata {
            resource_type: non_empty_or_na(attributes.resource_type_general),
            resource_lang: non_empty_or_na(attributes.language),
            funders: attributes.funders,
        })
    }

    /// Walks a storage folder tree depth-first.
    ///
    /// Files in the deepest subfolders come first; a folder's own files
    /// follow all of its subfolders' files. Folders without a `files`
    /// relation are not descended into.
    pub async fn files(&self, root: &str) -> Result<Vec<FileEntry>, ExportError> {
        let mut found = Vec::new();
        let mut stack = vec![Frame::Explore(root.to_string())];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Explore(link) => {
                    let request = self.collection(&link).filter("kind", "folder");
                    let folders: Vec<FileResource> =
                        collect_best_effort(self.fetcher, request, "folders").await?;
                    debug!(folder = %link, subfolders = folders.len(), "Explored folder");

                    stack.push(Frame::EmitFiles(link));
                    // Reversed so the first listed subfolder is popped first.
                    for folder in folders.iter().rev() {
                        if let Some(sub) = folder.relationships.related("files") {
                            stack.push(Frame::Explore(sub.to_string()));
                        }
                    }
                }
                Frame::EmitFiles(link) => {
                    let request = self.collection(&link).filter("kind", "file");
                    let files: Vec<FileResource> =
                        collect_best_effort(self.fetcher, request, "files").await?;
                    found.extend(files.into_iter().map(|file| {
                        FileEntry(
                            file.attributes.materialized_path,
                            file.attributes.size.map(format_size_mb),
                            file.links.download,
                        )
                    }));
                }
            }
        }

        info!(root = %root, count = found.len(), "Listed storage files");
        Ok(found)
    }

    /// Wiki name to markdown, across every index page.
    ///
    /// A name seen again on a later page replaces the earlier content but
    /// keeps its original position.
    pub async fn wikis(&self, link: &str) -> Result<IndexMap<String, String>, ExportError> {
        let index: Vec<WikiResource> =
            collect_best_effort(self.fetcher, self.collection(link), "wikis").await?;

        let mut wikis = IndexMap::new();
        for wiki in index {
            let name = wiki.attributes.name;
            let download = wiki.links.download;
            match self.download(&download).await {
                Ok(content) => {
                    if wikis.insert(name.clone(), content).is_some() {
                        debug!(wiki = %name, "Wiki name repeated; keeping later content");
                    }
                }
                Err(e) if e.is_transport() => {
                    warn!(wiki = %name, url = %download, error = %e, "Skipping wiki that could not be downloaded");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(wikis)
    }

    async fn download(&self, url: &str) -> Result<String, ExportError> {
        let request = ApiRequest::raw(url);
        let response = self.fetcher.fetch(&request).await?;
        let body = expect_success(url, response)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn join(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(", ")
}

fn non_empty_or_na(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
