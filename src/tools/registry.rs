use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ToolError;

use super::policy::ToolPolicy;
use super::schema::OperationSchema;
use super::validator::ValidatedArgs;

/// An operation the model may request.
///
/// Implementations declare their contract through `schema()` and receive
/// arguments that already passed validation against it.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Parameter contract, also the source of the operation name
    fn schema(&self) -> OperationSchema;

    /// Upper bound for this particular call, if tighter than the dispatcher's
    fn time_limit(&self, _args: &ValidatedArgs) -> Option<Duration> {
        None
    }

    /// Permission check run before the time limit starts, so a user
    /// answering a prompt does not eat into the operation's budget
    async fn authorize(&self, _args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<String>;
}

struct Entry {
    schema: OperationSchema,
    operation: Arc<dyn Operation>,
}

/// Registry of available operations keyed by name.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    entries: BTreeMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an operation. Rejects schemas that break their own invariants.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> Result<(), ToolError> {
        let schema = operation.schema();
        schema.check()?;
        self.entries
            .insert(schema.name.clone(), Entry { schema, operation });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&OperationSchema, ToolError> {
        self.entries
            .get(name)
            .map(|entry| &entry.schema)
            .ok_or_else(|| ToolError::UnknownOperation(name.to_string()))
    }

    pub(crate) fn operation(&self, name: &str) -> Result<Arc<dyn Operation>, ToolError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(&entry.operation))
            .ok_or_else(|| ToolError::UnknownOperation(name.to_string()))
    }

    /// Drop operations by name; returns the names that were not registered
    pub fn disable(&mut self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.entries.remove(name.as_str()).is_none())
            .cloned()
            .collect()
    }

    /// Schemas sorted by operation name
    pub fn schemas(&self) -> impl Iterator<Item = &OperationSchema> {
        self.entries.values().map(|entry| &entry.schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
