//! Typed views of the JSON:API documents returned by the OSF v2 API.
//!
//! Every relation is decoded into one of these shapes at the boundary; the
//! fetchers then map them into the canonical record values. A document's
//! `data` member is a [`Data`]: absent/null, a single resource, or a list.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ExportError;

/// Top-level JSON:API document.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct Document<T> {
    #[serde(default)]
    pub data: Data<T>,
    #[serde(default)]
    pub links: Option<DocumentLinks>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, bound = "T: DeserializeOwned")]
pub enum Data<T> {
    Many(Vec<T>),
    One(T),
    Missing,
}

impl<T> Default for Data<T> {
    fn default() -> Self {
        Data::Missing
    }
}

impl<T> Data<T> {
    /// Single-object relations degrade to a one-element list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Data::Many(items) => items,
            Data::One(item) => vec![item],
            Data::Missing => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentLinks {
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Document<T> {
    pub fn next(&self) -> Option<String> {
        self.links.as_ref().and_then(|l| l.next.clone())
    }
}

pub fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ExportError> {
    serde_json::from_slice(body).map_err(|source| ExportError::Decode {
        url: url.to_string(),
        source,
    })
}

/// `relationships.<name>.links.related.href`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub links: Option<RelationshipLinks>,
    /// Resource linkage; only to-one relations such as `parent` carry an id.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipLinks {
    #[serde(default)]
    pub related: Option<Href>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Href {
    pub href: String,
}

/// Relationship map of a resource, keyed by relation name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Relationships(pub HashMap<String, Relationship>);

impl Relationships {
    /// Related href of a relation, if the relation and its link are present.
    pub fn related(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|r| r.links.as_ref())
            .and_then(|l| l.related.as_ref())
            .map(|h| h.href.as_str())
    }

    /// Id of a to-one relation: the linkage id, else the last segment of
    /// its related href.
    pub fn related_id(&self, name: &str) -> Option<String> {
        let linked = self
            .0
            .get(name)
            .and_then(|r| r.data.as_ref())
            .and_then(|d| d.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string);
        linked.or_else(|| {
            self.related(name)
                .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
    }
}

/// A project or component node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeResource {
    pub id: String,
    pub attributes: NodeAttributes,
    #[serde(default)]
    pub links: NodeLinks,
    #[serde(default)]
    pub relationships: Relationships,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeAttributes {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub date_created: String,
    pub date_modified: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeLinks {
    #[serde(default)]
    pub html: Option<String>,
}

/// `custom_item_metadata_records/<id>`
#[derive(Debug, Clone, Deserialize)]
pub struct CustomMetadataResource {
    pub attributes: CustomMetadataAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomMetadataAttributes {
    #[serde(default)]
    pub resource_type_general: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub funders: Vec<crate::record::Funder>,
}

/// Entry of a storage provider listing: a file or a folder.
#[derive(Debug, Clone, Deserialize)]
pub struct FileResource {
    pub attributes: FileAttributes,
    #[serde(default)]
    pub links: FileLinks,
    #[serde(default)]
    pub relationships: Relationships,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileAttributes {
    pub materialized_path: String,
    #[serde(default)]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileLinks {
    #[serde(default)]
    pub download: Option<String>,
}

/// Contributor entry; the user is embedded.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorResource {
    pub attributes: ContributorAttributes,
    pub embeds: ContributorEmbeds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContributorAttributes {
    #[serde(default)]
    pub bibliographic: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContributorEmbeds {
    pub users: Document<UserResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResource {
    pub attributes: UserAttributes,
    #[serde(default)]
    pub links: NodeLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAttributes {
    pub full_name: String,
}

/// Institutions and licenses: anything with a display `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedResource {
    pub attributes: NamedAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedAttributes {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierResource {
    pub attributes: IdentifierAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierAttributes {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectResource {
    pub attributes: SubjectAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectAttributes {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiResource {
    pub attributes: WikiAttributes,
    pub links: WikiLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiAttributes {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiLinks {
    pub download: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_accepts_list_object_null_and_absent() {
        let many: Document<NamedResource> =
            serde_json::from_str(r#"{"data": [{"attributes": {"name": "a"}}]}"#).unwrap();
        assert_eq!(many.data.into_vec().len(), 1);

        let one: Document<NamedResource> =
            serde_json::from_str(r#"{"data": {"attributes": {"name": "MIT"}}}"#).unwrap();
        assert_eq!(one.data.into_vec()[0].attributes.name, "MIT");

        let null: Document<NamedResource> = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert!(null.data.into_vec().is_empty());

        let absent: Document<NamedResource> =
            serde_json::from_str(r#"{"links": {"next": "n"}}"#).unwrap();
        assert_eq!(absent.next().as_deref(), Some("n"));
        assert!(absent.data.into_vec().is_empty());
    }

    #[test]
    fn relationships_expose_related_href() {
        let rels: Relationships = serde_json::from_str(
            r#"{"files": {"links": {"related": {"href": "https://api/x/files/"}}}, "parent": {"data": null}}"#,
        )
        .unwrap();
        assert_eq!(rels.related("files"), Some("https://api/x/files/"));
        assert_eq!(rels.related("parent"), None);
        assert_eq!(rels.related("wikis"), None);
        assert_eq!(rels.related_id("parent"), None);
    }

    #[test]
    fn related_id_prefers_linkage_then_href() {
        let rels: Relationships = serde_json::from_str(
            r#"{
                "parent": {"links": {"related": {"href": "https://api/v2/nodes/x/"}}},
                "root": {"data": {"id": "r", "type": "nodes"},
                         "links": {"related": {"href": "https://api/v2/nodes/other/"}}}
            }"#,
        )
        .unwrap();
        assert_eq!(rels.related_id("parent").as_deref(), Some("x"));
        assert_eq!(rels.related_id("root").as_deref(), Some("r"));
    }
}
