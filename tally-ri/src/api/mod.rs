//! HTTP API handlers for tally-ri

pub mod archive;
pub mod buildinfo;
pub mod files;
pub mod health;
pub mod results;
pub mod sse;

pub use archive::download_archive;
pub use buildinfo::get_build_info;
pub use files::get_attachment;
pub use health::health_routes;
pub use results::{get_results, get_results_csv, submit_results};
pub use sse::{event_stream, status_stream};
