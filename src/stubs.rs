//! Offline [`Fetch`] implementation backed by canned documents.
//!
//! Used by `--dryrun` and by tests. Responses are keyed by request URL; a
//! request filtered by `filter[kind]` is keyed as `<url>#<kind>` so folder and
//! file listings of the same folder stay apart. Unknown keys answer 404.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::contract::{ApiRequest, ApiResponse, Fetch};
use crate::error::ExportError;

const NODES: &str = include_str!("../stubs/nodes.json");
const RELATIONS: &str = include_str!("../stubs/relations.json");
const FILES: &str = include_str!("../stubs/files.json");
const WIKIS: &str = include_str!("../stubs/wikis.json");

const WIKI_PAGES: [(&str, &str); 4] = [
    ("home", include_str!("../stubs/wiki_home.md")),
    ("home-v2", include_str!("../stubs/wiki_home_v2.md")),
    ("helloworld", include_str!("../stubs/wiki_helloworld.md")),
    ("anotherone", include_str!("../stubs/wiki_anotherone.md")),
];

/// Node ids of the bundled dataset.
pub const STUB_NODE_IDS: [&str; 4] = ["x", "y", "a", "b"];

const HOST_PLACEHOLDER: &str = "{host}";
const ID_PLACEHOLDER: &str = "{id}";

pub struct StubFetcher {
    responses: HashMap<String, ApiResponse>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl StubFetcher {
    /// Table of `(key, body)` pairs, each answering 200.
    pub fn new<K, B>(entries: impl IntoIterator<Item = (K, B)>) -> Self
    where
        K: Into<String>,
        B: Into<Vec<u8>>,
    {
        let responses = entries
            .into_iter()
            .map(|(key, body)| {
                let response = ApiResponse {
                    status: 200,
                    body: body.into(),
                };
                (key.into(), response)
            })
            .collect();
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The bundled dataset with its URLs rooted at `api_host`.
    pub fn bundled(api_host: &str) -> Result<Self, ExportError> {
        let host = api_host.trim_end_matches('/');
        let mut stub = Self::new(Vec::<(String, Vec<u8>)>::new());

        for (name, source) in [
            ("nodes.json", NODES),
            ("files.json", FILES),
            ("wikis.json", WIKIS),
        ] {
            stub.load_table(name, &source.replace(HOST_PLACEHOLDER, host))?;
        }
        for id in STUB_NODE_IDS {
            let source = RELATIONS
                .replace(HOST_PLACEHOLDER, host)
                .replace(ID_PLACEHOLDER, id);
            stub.load_table("relations.json", &source)?;
        }
        for (name, markdown) in WIKI_PAGES {
            stub.insert(format!("{host}/wikis/{name}/content/"), markdown);
        }

        debug!(entries = stub.responses.len(), api_host = %host, "Loaded bundled stub dataset");
        Ok(stub)
    }

    fn load_table(&mut self, name: &str, source: &str) -> Result<(), ExportError> {
        let table: Map<String, Value> =
            serde_json::from_str(source).map_err(|source| ExportError::Decode {
                url: format!("stubs/{name}"),
                source,
            })?;
        for (key, document) in table {
            let body = serde_json::to_vec(&document).map_err(|source| ExportError::Decode {
                url: key.clone(),
                source,
            })?;
            self.insert(key, body);
        }
        Ok(())
    }

    /// Adds or replaces a 200 response.
    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses.insert(
            key.into(),
            ApiResponse {
                status: 200,
                body: body.into(),
            },
        );
    }

    /// Makes `key` answer `status` with an empty body.
    pub fn fail_with(&mut self, key: impl Into<String>, status: u16) {
        self.responses.insert(
            key.into(),
            ApiResponse {
                status,
                body: Vec::new(),
            },
        );
    }

    /// Every request served so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Lookup key of a request.
    pub fn key(request: &ApiRequest) -> String {
        match request.filter_value("kind") {
            Some(kind) => format!("{}#{kind}", request.url),
            None => request.url.clone(),
        }
    }
}

#[async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, request: &ApiRequest) -> Result<ApiResponse, ExportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let key = Self::key(request);
        match self.responses.get(&key) {
            Some(response) => Ok(response.clone()),
            None => {
                debug!(key = %key, "No stub for request");
                Ok(ApiResponse {
                    status: 404,
                    body: br#"{"errors": [{"detail": "Not found."}]}"#.to_vec(),
                })
            }
        }
    }
}
