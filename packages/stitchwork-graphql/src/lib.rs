#![deny(unused_crate_dependencies)]
pub mod adapter;
pub mod compute;
pub mod dynamic;
pub mod introspection;
pub mod loader;
pub mod merge;
pub mod query;
pub mod response;
pub mod schema;
pub mod template;
#[cfg(test)]
mod testing;
pub mod upstream;

pub use adapter::{AdapterState, ExecutionAdapter, StitchError};
pub use compute::{Aggregate, ComputeBinding, ComputeError, ComputeFn, ComputeRegistry, FieldPath};
pub use loader::{parse_type_extensions, ExtensionManifest, ExtensionSet, LoaderError, TypeExtension};
pub use merge::{merge, ComposedSchema, MergeError};
pub use response::{ExecutionError, GraphQLRequest, GraphQLResponse, PathSegment, ResponseError};
pub use schema::UpstreamSchema;
pub use template::{DataFetchTemplate, TemplateError, TemplateRegistry};
pub use upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};
