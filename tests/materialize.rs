use std::collections::HashSet;

use osf_export::error::ExportError;
use osf_export::materialize::{materialize, MaterializeOptions};
use osf_export::record::{ParentRef, NOT_AVAILABLE};
use osf_export::stubs::StubFetcher;

const HOST: &str = "https://api.test.osf.io/v2";

fn bundled() -> StubFetcher {
    StubFetcher::bundled(HOST).expect("bundled dataset loads")
}

#[tokio::test]
async fn all_projects_across_listing_pages() {
    let stub = bundled();
    let out = materialize(&stub, &MaterializeOptions::new(HOST)).await.unwrap();

    let ids: Vec<&str> = out.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["x", "y", "a", "b"]);
    assert_eq!(out.root_indexes, vec![0, 1]);
    assert!(out.skipped.is_empty());

    let x = &out.records[0];
    assert_eq!(x.title(), "Test1");
    assert_eq!(x.children, vec!["a", "b"]);
    assert_eq!(x.parent, ParentRef::None);
    assert_eq!(x.metadata.category, "Methods and Measures");
    assert_eq!(x.metadata.tags, "test1, test2, test3");
    assert_eq!(x.metadata.subjects, "Education, Literature, Geography");
    assert_eq!(x.metadata.identifiers, "10.4-2-6-25/OSF.IO/74PAD");
    assert_eq!(x.metadata.license, "mynewlicense");
    assert_eq!(x.metadata.affiliated_institutions, "Center For Open Science");
    assert_eq!(x.metadata.resource_type, "Other");
    assert_eq!(x.metadata.url, "https://test.osf.io/x/");
    assert!(x.metadata.public);
    assert_eq!(x.files.len(), 5);
    assert_eq!(x.contributors.len(), 2);
    assert_eq!(
        x.wikis.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["home", "helloworld", "anotherone"]
    );

    let y = &out.records[1];
    assert_eq!(y.metadata.tags, NOT_AVAILABLE);
    assert_eq!(y.metadata.category, "Uncategorized");
    assert!(y.files.is_empty());
    assert!(y.wikis.is_empty());
    assert_eq!(y.parent, ParentRef::None);

    for component in &out.records[2..] {
        assert_eq!(component.parent, ParentRef::InBatch("x".to_string()));
    }
    assert_eq!(out.records[2].metadata.category, "Data");
    assert_eq!(out.records[3].metadata.category, "Hypothesis");
}

#[tokio::test]
async fn single_project_includes_descendants_only() {
    let stub = bundled();
    let options = MaterializeOptions::new(HOST).project("x");
    let out = materialize(&stub, &options).await.unwrap();

    let ids: Vec<&str> = out.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["x", "a", "b"]);
    assert_eq!(out.root_indexes, vec![0]);
    assert_eq!(out.export_roots(), vec![0]);
}

#[tokio::test]
async fn every_child_reference_resolves_and_ids_are_unique() {
    let stub = bundled();
    let out = materialize(&stub, &MaterializeOptions::new(HOST)).await.unwrap();

    let ids: HashSet<&str> = out.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids.len(), out.records.len());
    for record in &out.records {
        for child in &record.children {
            assert!(ids.contains(child.as_str()), "dangling child {child}");
        }
        if let ParentRef::InBatch(parent) = &record.parent {
            let parent = out.records.iter().find(|r| r.id() == parent.as_str()).unwrap();
            assert!(parent.children.iter().any(|c| c == record.id()));
        }
    }
}

#[tokio::test]
async fn component_export_snapshots_parent_outside_batch() {
    let stub = bundled();
    let options = MaterializeOptions::new(HOST).project("a");
    let out = materialize(&stub, &options).await.unwrap();

    assert_eq!(out.records.len(), 1);
    assert!(out.root_indexes.is_empty());
    assert_eq!(
        out.records[0].parent,
        ParentRef::Foreign("Test1".to_string(), "https://test.osf.io/x/".to_string())
    );
    assert_eq!(out.export_roots(), vec![0]);
}

#[tokio::test]
async fn node_seen_twice_is_materialized_once() {
    let mut stub = bundled();
    // `y` also lists `a` as a child.
    let x_children = stub_body(&stub, &format!("{HOST}/nodes/x/children/")).await;
    stub.insert(format!("{HOST}/nodes/y/children/"), x_children);

    let out = materialize(&stub, &MaterializeOptions::new(HOST)).await.unwrap();
    let ids: Vec<&str> = out.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["x", "y", "a", "b"]);
}

async fn stub_body(stub: &StubFetcher, url: &str) -> Vec<u8> {
    use osf_export::contract::{ApiRequest, Fetch};
    stub.fetch(&ApiRequest::get(url)).await.unwrap().body
}

#[tokio::test]
async fn missing_subjects_relation_fails_the_node() {
    let mut stub = bundled();
    let node = stub_body(&stub, &format!("{HOST}/nodes/x/")).await;
    let mut document: serde_json::Value = serde_json::from_slice(&node).unwrap();
    document["data"]["relationships"]
        .as_object_mut()
        .unwrap()
        .remove("subjects");
    stub.insert(format!("{HOST}/nodes/x/"), serde_json::to_vec(&document).unwrap());

    let options = MaterializeOptions::new(HOST).project("x");
    let err = materialize(&stub, &options).await.unwrap_err();
    assert!(matches!(
        err,
        ExportError::MissingRelation { ref node_id, ref relation }
            if node_id == "x" && relation == "subjects"
    ));
}

#[tokio::test]
async fn optional_relation_failures_degrade_to_empty_values() {
    let mut stub = bundled();
    stub.fail_with(format!("{HOST}/nodes/x/license/"), 500);
    stub.fail_with(format!("{HOST}/nodes/x/institutions/"), 403);
    stub.fail_with(format!("{HOST}/nodes/x/wikis/"), 502);
    stub.fail_with(format!("{HOST}/custom_item_metadata_records/x/"), 404);

    let options = MaterializeOptions::new(HOST).project("x");
    let out = materialize(&stub, &options).await.unwrap();

    let x = &out.records[0];
    assert_eq!(x.metadata.license, "");
    assert_eq!(x.metadata.affiliated_institutions, "");
    assert_eq!(x.metadata.resource_type, NOT_AVAILABLE);
    assert!(x.metadata.funders.is_empty());
    assert!(x.wikis.is_empty());
    assert_eq!(x.metadata.subjects, "Education, Literature, Geography");
}

#[tokio::test]
async fn required_relation_failure_aborts_by_default() {
    let mut stub = bundled();
    stub.fail_with(format!("{HOST}/nodes/y/subjects/"), 500);

    let err = materialize(&stub, &MaterializeOptions::new(HOST))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn keep_going_skips_failed_nodes() {
    let mut stub = bundled();
    stub.fail_with(format!("{HOST}/nodes/y/subjects/"), 500);

    let mut options = MaterializeOptions::new(HOST);
    options.keep_going = true;
    let out = materialize(&stub, &options).await.unwrap();

    let ids: Vec<&str> = out.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["x", "a", "b"]);
    assert_eq!(out.root_indexes, vec![0]);
    assert_eq!(out.skipped, vec!["y".to_string()]);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let stub = bundled();
    let options = MaterializeOptions::new(HOST).project("zzz");
    let err = materialize(&stub, &options).await.unwrap_err();
    assert!(matches!(err, ExportError::Status { status: 404, .. }));
}

#[tokio::test]
async fn listing_requests_only_top_level_projects() {
    let stub = bundled();
    let mut options = MaterializeOptions::new(HOST);
    options.page_size = 25;
    materialize(&stub, &options).await.unwrap();

    let first = &stub.requests()[0];
    assert_eq!(first.url, format!("{HOST}/users/me/nodes/"));
    assert_eq!(first.filter_value("parent"), Some(""));
    assert!(first
        .query
        .iter()
        .any(|(k, v)| k == "page[size]" && v == "25"));
}
