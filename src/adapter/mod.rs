//! Source adapter layer
//!
//! Each jurisdiction publishes meetings in its own shape. Adapters turn
//! those shapes into canonical [`Event`](crate::model::Event)s and report
//! what they could not read; the registry maps jurisdiction keys to them.

mod fetch;
mod output;
mod registry;
pub mod sources;
pub mod text;
mod traits;

pub use fetch::{FetchError, FetchRequest, FetchSettings, Fetcher, HttpFetcher, StaticFetcher};
pub use output::{AdapterError, MalformedRecord, ScrapeOutput};
pub use registry::{AdapterRegistry, RegisteredSource};
pub use traits::SourceAdapter;
