//! I/O modules: the imagery provider port, the file-backed scene catalog,
//! band downloads and preview output

pub mod provider;
pub mod catalog;
pub mod download;
pub mod preview;

pub use provider::{ImageryProvider, SceneCollection};
pub use catalog::{SceneCatalog, CatalogConfig};
pub use download::BandDownloader;
pub use preview::PreviewWriter;
