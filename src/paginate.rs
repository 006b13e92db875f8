//! Cursor-following pagination over JSON:API collections.
//!
//! [`paginate_with`] is the generic driver: it turns a `fetch_page` closure
//! into a lazy stream of items, following `next` cursors until there are none.
//! [`paginate_resource`] plugs the [`Fetch`] capability and the JSON:API
//! document shape into it. The stream is finite only if the upstream stops
//! handing out cursors; repeated cursors are not detected.

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use futures::{pin_mut, Future};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::contract::{ApiRequest, ApiResponse, Fetch};
use crate::error::ExportError;
use crate::resources::{decode, Document};

/// One page of a collection and the cursor of the page after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

/// Lazily concatenates every page's items, in page order.
///
/// An error from `fetch_page` is yielded once, in place of the page it was
/// fetching; the stream ends after it.
pub fn paginate_with<'a, T, C, F, Fut>(
    start: C,
    fetch_page: F,
) -> impl Stream<Item = Result<T, ExportError>> + 'a
where
    T: 'a,
    C: 'a,
    F: FnMut(C) -> Fut + 'a,
    Fut: Future<Output = Result<Page<T, C>, ExportError>> + 'a,
{
    stream::try_unfold(Some((start, fetch_page)), |state| async move {
        let Some((cursor, mut fetch_page)) = state else {
            return Ok(None);
        };
        let page = fetch_page(cursor).await?;
        let next = page.next.map(|cursor| (cursor, fetch_page));
        Ok::<_, ExportError>(Some((page.items, next)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
}

/// Turns a non-success status into [`ExportError::Status`].
pub fn expect_success(url: &str, response: ApiResponse) -> Result<Vec<u8>, ExportError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ExportError::Status {
            url: url.to_string(),
            status: response.status,
        })
    }
}

/// Fetches one JSON:API page. A page without `data` is an empty page.
pub async fn fetch_page<T: DeserializeOwned>(
    fetcher: &dyn Fetch,
    request: ApiRequest,
) -> Result<Page<T, ApiRequest>, ExportError> {
    let response = fetcher.fetch(&request).await?;
    let body = expect_success(&request.url, response)?;
    let document: Document<T> = decode(&request.url, &body)?;
    let next = document.next();
    let items = document.data.into_vec();
    debug!(url = %request.url, count = items.len(), has_next = next.is_some(), "Fetched page");
    Ok(Page {
        items,
        // Next links already carry the query of the first request.
        next: next.map(ApiRequest::get),
    })
}

/// Every item of the collection at `request`, page by page.
pub fn paginate_resource<'a, T>(
    fetcher: &'a dyn Fetch,
    request: ApiRequest,
) -> impl Stream<Item = Result<T, ExportError>> + 'a
where
    T: DeserializeOwned + 'a,
{
    paginate_with(request, move |request| fetch_page::<T>(fetcher, request))
}

/// Reads a whole collection; any failure aborts the read.
pub async fn collect_all<T: DeserializeOwned>(
    fetcher: &dyn Fetch,
    request: ApiRequest,
) -> Result<Vec<T>, ExportError> {
    paginate_resource(fetcher, request).try_collect().await
}

/// Reads a collection, keeping the items read before a transport failure.
///
/// Transport failures (no response, non-success status) end the read with a
/// warning; any other failure is returned.
pub async fn collect_best_effort<T: DeserializeOwned>(
    fetcher: &dyn Fetch,
    request: ApiRequest,
    relation: &str,
) -> Result<Vec<T>, ExportError> {
    let url = request.url.clone();
    let items = paginate_resource::<T>(fetcher, request);
    pin_mut!(items);

    let mut collected = Vec::new();
    while let Some(item) = items.next().await {
        match item {
            Ok(item) => collected.push(item),
            Err(e) if e.is_transport() => {
                warn!(
                    relation = relation,
                    url = %url,
                    kept = collected.len(),
                    error = %e,
                    "Optional relation could not be read completely"
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(collected)
}
