use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;

use osf_export::contract::{ApiRequest, ApiResponse, MockFetch};
use osf_export::error::ExportError;
use osf_export::paginate::{collect_all, collect_best_effort, paginate_resource};

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: String,
}

fn page(ids: &[&str], next: Option<&str>) -> ApiResponse {
    let data: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
    ApiResponse {
        status: 200,
        body: serde_json::to_vec(&json!({ "data": data, "links": { "next": next } })).unwrap(),
    }
}

/// Mock answering `url -> response` for a fixed table; anything else is a 404.
fn mock_with(table: Vec<(&'static str, ApiResponse)>) -> MockFetch {
    let mut fetcher = MockFetch::new();
    fetcher.expect_fetch().returning(move |req: &ApiRequest| {
        Ok(table
            .iter()
            .find(|(url, _)| *url == req.url)
            .map(|(_, response)| response.clone())
            .unwrap_or(ApiResponse {
                status: 404,
                body: Vec::new(),
            }))
    });
    fetcher
}

fn ids(items: Vec<Item>) -> Vec<String> {
    items.into_iter().map(|i| i.id).collect()
}

#[tokio::test]
async fn concatenates_pages_in_order() {
    let fetcher = mock_with(vec![
        ("u1", page(&["a", "b"], Some("u2"))),
        ("u2", page(&["c"], Some("u3"))),
        ("u3", page(&["d", "e"], None)),
    ]);

    let items: Vec<Item> = collect_all(&fetcher, ApiRequest::get("u1")).await.unwrap();
    assert_eq!(ids(items), vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let mut fetcher = MockFetch::new();
    fetcher.expect_fetch().times(1).returning(|_| Ok(page(&["a"], None)));

    let stream = paginate_resource::<Item>(&fetcher, ApiRequest::get("u1"));
    let items: Vec<Item> = stream.try_collect().await.unwrap();
    assert_eq!(ids(items), vec!["a"]);
}

#[tokio::test]
async fn missing_data_is_an_empty_page() {
    let fetcher = mock_with(vec![(
        "u1",
        ApiResponse {
            status: 200,
            body: br#"{"meta": {"version": "2.20"}}"#.to_vec(),
        },
    )]);

    let items: Vec<Item> = collect_all(&fetcher, ApiRequest::get("u1")).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn single_object_data_is_one_item() {
    let fetcher = mock_with(vec![(
        "u1",
        ApiResponse {
            status: 200,
            body: br#"{"data": {"id": "only"}}"#.to_vec(),
        },
    )]);

    let items: Vec<Item> = collect_all(&fetcher, ApiRequest::get("u1")).await.unwrap();
    assert_eq!(ids(items), vec!["only"]);
}

#[tokio::test]
async fn failure_on_later_page_fails_required_reads() {
    let fetcher = mock_with(vec![("u1", page(&["a", "b"], Some("u2")))]);

    let err = collect_all::<Item>(&fetcher, ApiRequest::get("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Status { ref url, status: 404 } if url == "u2"));
    assert!(err.is_transport());
}

#[tokio::test]
async fn best_effort_keeps_items_before_failure() {
    let fetcher = mock_with(vec![("u1", page(&["a", "b"], Some("u2")))]);

    let items: Vec<Item> = collect_best_effort(&fetcher, ApiRequest::get("u1"), "wikis")
        .await
        .unwrap();
    assert_eq!(ids(items), vec!["a", "b"]);
}

#[tokio::test]
async fn best_effort_still_fails_on_undecodable_body() {
    let fetcher = mock_with(vec![(
        "u1",
        ApiResponse {
            status: 200,
            body: b"<html>maintenance</html>".to_vec(),
        },
    )]);

    let err = collect_best_effort::<Item>(&fetcher, ApiRequest::get("u1"), "wikis")
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Decode { .. }));
}

#[tokio::test]
async fn first_request_carries_query_and_cursors_are_sent_verbatim() {
    let mut fetcher = MockFetch::new();
    let mut seq = mockall::Sequence::new();
    fetcher
        .expect_fetch()
        .withf(|req: &ApiRequest| {
            req.url == "u1"
                && req.filter_value("parent") == Some("")
                && req.query.iter().any(|(k, v)| k == "page[size]" && v == "50")
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(page(&["a"], Some("u1?page=2"))));
    fetcher
        .expect_fetch()
        .withf(|req: &ApiRequest| req.url == "u1?page=2" && req.query.is_empty())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(page(&["b"], None)));

    let request = ApiRequest::get("u1").filter("parent", "").page_size(50);
    let items: Vec<Item> = collect_all(&fetcher, request).await.unwrap();
    assert_eq!(ids(items), vec!["a", "b"]);
}
