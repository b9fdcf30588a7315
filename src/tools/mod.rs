/// Tool calling for a model that has no native function-calling API
///
/// This module provides the pieces between model text and side effects:
/// - Operation schemas and the registry that owns them
/// - Extraction of an embedded JSON call from free-form model text
/// - Validation and coercion of call arguments against a schema
/// - A dispatcher that runs operations under a time limit and output budget
/// - Built-in file, search, git, command and assessment operations
pub mod builtin;
mod dispatcher;
mod extractor;
mod policy;
mod registry;
mod schema;
mod validator;

pub use builtin::builtin_registry;
pub use dispatcher::{ToolDispatcher, ToolResult};
pub use extractor::extract;
pub use policy::ToolPolicy;
pub use registry::ToolRegistry;
pub use validator::ToolCall;

#[cfg(test)]
pub use registry::Operation;
#[cfg(test)]
pub use schema::OperationSchema;
#[cfg(test)]
pub use validator::ValidatedArgs;
