//! Export OSF projects, with their components, files, contributors and wikis,
//! into self-contained PDF documents.
//!
//! The pipeline has two stages. [`materialize`] walks the node graph through a
//! [`contract::Fetch`] transport and produces a flat arena of
//! [`record::ProjectRecord`]s; [`render`] lays one project tree out through a
//! [`contract::DocumentBuilder`]. [`export::Exporter`] runs both.

pub mod cli;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod export;
pub mod fetchers;
pub mod load_config;
pub mod markup;
pub mod materialize;
pub mod paginate;
pub mod pdf;
pub mod qr;
pub mod record;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod recording;
pub mod render;
pub mod resources;
pub mod stubs;

pub use error::{ExportError, RenderError};
