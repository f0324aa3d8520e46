//! Application layer: the resource registry, query feature pipeline,
//! document store contract, and the cached CRUD service that ties
//! them together.

pub mod error;
pub mod features;
pub mod registry;
pub mod resources;
pub mod store;

pub use error::{AppError, ErrorReport, ResourceError};
pub use features::{PageLimits, QueryFeatures};
pub use registry::{ResourceBinding, ResourceRegistry};
pub use resources::{CachePolicy, Fetched, ResourceService};
pub use store::{
    DocumentQuery, DocumentStore, Expansion, FieldFilter, FilterPredicate, SortKey, StoreError,
};
