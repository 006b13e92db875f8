//! Canonical project records produced by materialization.
//!
//! Field names serialize exactly as the export's canonical names
//! (`metadata.title`, `files`, `contributors`, `wikis`, `parent`,
//! `children`), so records can be dumped and reloaded as JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sentinel used when a node has no tags or a metadata value is unknown.
/// It is a marker, never a real tag.
pub const NOT_AVAILABLE: &str = "NA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub metadata: Metadata,
    pub files: Vec<FileEntry>,
    pub contributors: Vec<Contributor>,
    /// Wiki name to raw markdown, in discovery order.
    pub wikis: IndexMap<String, String>,
    pub parent: ParentRef,
    /// Child node ids in API discovery order.
    pub children: Vec<String>,
}

impl ProjectRecord {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn url(&self) -> &str {
        &self.metadata.url
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub id: String,
    pub url: String,
    pub description: String,
    pub category: String,
    pub date_created: String,
    pub date_modified: String,
    /// Comma-joined tags, or [`NOT_AVAILABLE`].
    pub tags: String,
    pub public: bool,
    pub resource_type: String,
    pub resource_lang: String,
    pub funders: Vec<Funder>,
    pub affiliated_institutions: String,
    pub identifiers: String,
    pub license: String,
    pub subjects: String,
}

/// A metadata value as shown in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue<'a> {
    Text(&'a str),
    Flag(bool),
    /// Each entry is a list of `(key, value)` pairs.
    List(Vec<Vec<(&'static str, String)>>),
}

impl Metadata {
    /// All fields in canonical order, as `(key, value)`.
    pub fn fields(&self) -> Vec<(&'static str, MetadataValue<'_>)> {
        use MetadataValue::*;
        vec![
            ("title", Text(&self.title)),
            ("id", Text(&self.id)),
            ("url", Text(&self.url)),
            ("description", Text(&self.description)),
            ("category", Text(&self.category)),
            ("date_created", Text(&self.date_created)),
            ("date_modified", Text(&self.date_modified)),
            ("tags", Text(&self.tags)),
            ("public", Flag(self.public)),
            ("resource_type", Text(&self.resource_type)),
            ("resource_lang", Text(&self.resource_lang)),
            (
                "funders",
                List(self.funders.iter().map(Funder::entries).collect()),
            ),
            ("affiliated_institutions", Text(&self.affiliated_institutions)),
            ("identifiers", Text(&self.identifiers)),
            ("license", Text(&self.license)),
            ("subjects", Text(&self.subjects)),
        ]
    }
}

/// Funding entry from the custom metadata record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Funder {
    #[serde(default)]
    pub funder_name: String,
    #[serde(default)]
    pub funder_identifier: String,
    #[serde(default)]
    pub funder_identifier_type: String,
    #[serde(default)]
    pub award_number: String,
    #[serde(default)]
    pub award_uri: String,
    #[serde(default)]
    pub award_title: String,
}

impl Funder {
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("funder_name", self.funder_name.clone()),
            ("funder_identifier", self.funder_identifier.clone()),
            ("funder_identifier_type", self.funder_identifier_type.clone()),
            ("award_number", self.award_number.clone()),
            ("award_uri", self.award_uri.clone()),
            ("award_title", self.award_title.clone()),
        ]
    }
}

/// `(materialized_path, size_mb, download_url)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry(pub String, pub Option<String>, pub Option<String>);

impl FileEntry {
    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn size_mb(&self) -> Option<&str> {
        self.1.as_deref()
    }

    pub fn download_url(&self) -> Option<&str> {
        self.2.as_deref()
    }
}

/// `(full_name, is_bibliographic, profile_url)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor(pub String, pub bool, pub String);

impl Contributor {
    pub fn full_name(&self) -> &str {
        &self.0
    }

    pub fn is_bibliographic(&self) -> bool {
        self.1
    }

    pub fn profile_url(&self) -> &str {
        &self.2
    }
}

/// Where a record hangs in its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    /// The parent was materialized in the same run; it lists this node in
    /// its `children`.
    InBatch(String),
    /// Snapshot of a parent outside the batch: `(parent_title, parent_url)`.
    Foreign(String, String),
    /// A true root.
    None,
}

impl ParentRef {
    pub fn is_none(&self) -> bool {
        matches!(self, ParentRef::None)
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, ParentRef::Foreign(..))
    }
}

/// Result of one materialization run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Materialized {
    pub records: Vec<ProjectRecord>,
    /// Positions of records with no parent, in discovery order.
    pub root_indexes: Vec<usize>,
    /// Ids of nodes that failed and were skipped (only with `keep_going`).
    pub skipped: Vec<String>,
}

impl Materialized {
    /// Positions of every record that tops an exportable tree: true roots
    /// plus records whose parent lies outside the batch, in record order.
    pub fn export_roots(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, record)| {
                self.root_indexes.contains(idx) || record.parent.is_foreign()
            })
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Upper-cases the first letter of every word and lower-cases the rest.
/// A word starts after any non-alphabetic character.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        if in_word {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        in_word = ch.is_alphabetic();
    }
    out
}
