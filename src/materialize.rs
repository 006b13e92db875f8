//! Project tree materialization.
//!
//! Walks the node graph breadth-first from a seed set, reads every relation of
//! each node through [`RelationReader`], and flattens the result into an
//! arena of [`ProjectRecord`]s. Parent/child links are ids into that arena.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use tracing::{debug, error, info, warn};

use crate::contract::{ApiRequest, Fetch};
use crate::error::ExportError;
use crate::fetchers::{RelationReader, STORAGE_PROVIDER};
use crate::record::{
    title_case, Materialized, Metadata, ParentRef, ProjectRecord, NOT_AVAILABLE,
};
use crate::resources::NodeResource;

/// What to materialize and how.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// API root without a trailing slash, e.g. `https://api.osf.io/v2`.
    pub api_host: String,
    /// Single node to export; `None` exports every accessible root project.
    pub project_id: Option<String>,
    pub page_size: usize,
    /// Skip nodes that fail instead of aborting the run.
    pub keep_going: bool,
}

impl MaterializeOptions {
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            api_host: api_host.into().trim_end_matches('/').to_string(),
            project_id: None,
            page_size: 100,
            keep_going: false,
        }
    }

    pub fn project(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    fn node_url(&self, id: &str) -> String {
        format!("{}/nodes/{id}/", self.api_host)
    }
}

/// Display form of a node category.
pub fn display_category(raw: &str) -> String {
    match raw {
        "" => "Uncategorized".to_string(),
        "methods and measures" => "Methods and Measures".to_string(),
        other => title_case(other),
    }
}

/// `YYYY-MM-DD` of a timestamp in the local time zone.
pub fn normalize_date(raw: &str) -> String {
    normalize_date_in(raw, &Local)
}

/// `YYYY-MM-DD` of a timestamp in `tz`.
///
/// Offsets are applied before truncating. Timestamps without an offset are
/// already local and only lose their time part. Unparseable input is
/// returned unchanged.
pub fn normalize_date_in<Tz>(raw: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(tz).format("%Y-%m-%d").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.format("%Y-%m-%d").to_string();
    }
    debug!(raw = %raw, "Keeping unparseable date as-is");
    raw.to_string()
}

fn join_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        tags.join(", ")
    }
}

/// Materializes the requested nodes and all of their descendants.
///
/// Records come out in breadth-first discovery order, each id at most once.
/// `root_indexes` lists the records without a parent, in the same order.
pub async fn materialize(
    fetcher: &dyn Fetch,
    options: &MaterializeOptions,
) -> Result<Materialized, ExportError> {
    let reader = RelationReader::new(fetcher, options.page_size);

    let seeds = match &options.project_id {
        Some(id) => {
            info!(project_id = %id, "Materializing single project");
            vec![reader.node(&options.node_url(id)).await.map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to read requested project");
                e
            })?]
        }
        None => {
            info!(api_host = %options.api_host, "Materializing all accessible root projects");
            let request = ApiRequest::get(format!("{}/users/me/nodes/", options.api_host))
                .filter("parent", "")
                .page_size(options.page_size);
            reader.nodes(request).await.map_err(|e| {
                error!(error = %e, "Failed to list accessible projects");
                e
            })?
        }
    };

    let seed_ids: HashSet<String> = seeds.iter().map(|n| n.id.clone()).collect();
    let mut queue: VecDeque<NodeResource> = seeds.into();
    let mut added: HashSet<String> = HashSet::new();
    let mut out = Materialized::default();

    while let Some(node) = queue.pop_front() {
        if !added.insert(node.id.clone()) {
            debug!(node_id = %node.id, "Node already materialized");
            continue;
        }

        let parent_in_batch = node
            .relationships
            .related_id("parent")
            .filter(|id| seed_ids.contains(id) || added.contains(id))
            .filter(|id| !out.skipped.contains(id));

        let result = match resolve_parent(&reader, &node, parent_in_batch).await {
            Ok(parent) => materialize_node(&reader, options, &node, parent).await,
            Err(e) => Err(e),
        };

        match result {
            Ok((record, children)) => {
                if record.parent.is_none() {
                    out.root_indexes.push(out.records.len());
                }
                info!(
                    node_id = %record.id(),
                    files = record.files.len(),
                    wikis = record.wikis.len(),
                    children = children.len(),
                    "Materialized node"
                );
                queue.extend(children);
                out.records.push(record);
            }
            Err(e) => {
                fail_node(&mut out, &node.id, e, options.keep_going)?;
            }
        }
    }

    info!(
        records = out.records.len(),
        roots = out.root_indexes.len(),
        skipped = out.skipped.len(),
        "Materialization finished"
    );
    Ok(out)
}

/// Records a node failure: skipped when `keep_going`, otherwise returned.
fn fail_node(
    out: &mut Materialized,
    node_id: &str,
    e: ExportError,
    keep_going: bool,
) -> Result<(), ExportError> {
    if keep_going {
        warn!(node_id = %node_id, error = %e, "Skipping node that failed to materialize");
        out.skipped.push(node_id.to_string());
        Ok(())
    } else {
        error!(node_id = %node_id, error = %e, "Node failed to materialize");
        Err(e)
    }
}

/// Parent linkage of a node. A parent outside the batch is read once and
/// snapshotted; that read is required.
async fn resolve_parent(
    reader: &RelationReader<'_>,
    node: &NodeResource,
    in_batch: Option<String>,
) -> Result<ParentRef, ExportError> {
    let Some(href) = node.relationships.related("parent") else {
        return Ok(ParentRef::None);
    };
    if let Some(parent_id) = in_batch {
        return Ok(ParentRef::InBatch(parent_id));
    }
    let parent = reader.node(href).await?;
    debug!(node_id = %node.id, parent_id = %parent.id, "Snapshotting parent outside the batch");
    Ok(ParentRef::Foreign(
        parent.attributes.title,
        parent.links.html.unwrap_or_default(),
    ))
}

async fn materialize_node(
    reader: &RelationReader<'_>,
    options: &MaterializeOptions,
    node: &NodeResource,
    parent: ParentRef,
) -> Result<(ProjectRecord, Vec<NodeResource>), ExportError> {
    let id = node.id.as_str();
    let rels = &node.relationships;
    let attributes = &node.attributes;

    let custom = reader
        .custom_metadata(&format!(
            "{}/custom_item_metadata_records/{id}/",
            options.api_host
        ))
        .await?;

    let files = match rels.related("files") {
        Some(href) => reader.files(&format!("{href}{STORAGE_PROVIDER}")).await?,
        None => Vec::new(),
    };

    let affiliated_institutions = match rels.related("affiliated_institutions") {
        Some(link) => reader.names(link, "affiliated_institutions").await?,
        None => String::new(),
    };
    let identifiers = match rels.related("identifiers") {
        Some(link) => reader.identifiers(link).await?,
        None => String::new(),
    };
    let license = match rels.related("license") {
        Some(link) => reader.names(link, "license").await?,
        None => String::new(),
    };
    let subjects = match rels.related("subjects") {
        Some(link) => reader.subjects(link).await?,
        None => {
            return Err(ExportError::MissingRelation {
                node_id: id.to_string(),
                relation: "subjects".to_string(),
            })
        }
    };

    let contributors = match rels.related("contributors") {
        Some(link) => reader.contributors(id, link).await?,
        None => Vec::new(),
    };

    let wikis_link = rels
        .related("wikis")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/nodes/{id}/wikis/", options.api_host));
    let wikis = reader.wikis(&wikis_link).await?;

    let children = match rels.related("children") {
        Some(link) => reader.children(link).await?,
        None => Vec::new(),
    };

    let metadata = Metadata {
        title: attributes.title.clone(),
        id: id.to_string(),
        url: node.links.html.clone().unwrap_or_default(),
        description: attributes.description.clone().unwrap_or_default(),
        category: display_category(attributes.category.as_deref().unwrap_or("")),
        date_created: normalize_date(&attributes.date_created),
        date_modified: normalize_date(&attributes.date_modified),
        tags: join_tags(&attributes.tags),
        public: attributes.public,
        resource_type: custom.resource_type,
        resource_lang: custom.resource_lang,
        funders: custom.funders,
        affiliated_institutions,
        identifiers,
        license,
        subjects,
    };

    let record = ProjectRecord {
        metadata,
        files,
        contributors,
        wikis,
        parent,
        children: children.iter().map(|c| c.id.clone()).collect(),
    };
    Ok((record, children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn categories_map_to_display_names() {
        assert_eq!(display_category(""), "Uncategorized");
        assert_eq!(display_category("methods and measures"), "Methods and Measures");
        assert_eq!(display_category("project"), "Project");
        assert_eq!(display_category("data"), "Data");
    }

    #[test]
    fn dates_apply_offset_before_truncating() {
        let east = FixedOffset::east_opt(10 * 3600).unwrap();
        assert_eq!(normalize_date_in("2024-03-01T20:30:00Z", &east), "2024-03-02");
        assert_eq!(normalize_date_in("2024-03-01T20:30:00.123456Z", &Utc), "2024-03-01");
        assert_eq!(
            normalize_date_in("2024-03-02T01:00:00+02:00", &Utc),
            "2024-03-01"
        );
        assert_eq!(normalize_date_in("2024-03-01T23:59:59.5", &east), "2024-03-01");
        assert_eq!(normalize_date_in("not a date", &Utc), "not a date");
    }

    #[test]
    fn tags_join_or_fall_back_to_marker() {
        assert_eq!(join_tags(&[]), "NA");
        assert_eq!(
            join_tags(&["a".to_string(), "b".to_string()]),
            "a, b"
        );
    }
}
