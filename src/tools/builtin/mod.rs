//! Operations shipped with the agent.

mod assessment;
mod command;
mod files;
mod git;
mod search;

use std::sync::Arc;

pub use assessment::{AnalyzeRiskLevelTool, CreateSecurityChecklistTool, GetCveRemediationTool};
pub use command::ExecuteCommandTool;
pub use files::{
    CopyFileTool, CreateDirectoryTool, DeleteDirectoryTool, DeleteFileTool, GetFileContentsTool,
    GetFileInfoTool, ListDirectoryTool, WriteFileTool,
};
pub use git::{GitDiffTool, GitLogTool, GitStatusTool};
pub use search::{FindFilesTool, GrepSearchTool};

use crate::error::ToolError;

use super::registry::{Operation, ToolRegistry};

/// Registry holding every built-in operation
pub fn builtin_registry() -> Result<ToolRegistry, ToolError> {
    let operations: Vec<Arc<dyn Operation>> = vec![
        Arc::new(ExecuteCommandTool),
        Arc::new(GetFileContentsTool),
        Arc::new(WriteFileTool),
        Arc::new(ListDirectoryTool),
        Arc::new(CreateDirectoryTool),
        Arc::new(DeleteFileTool),
        Arc::new(DeleteDirectoryTool),
        Arc::new(CopyFileTool),
        Arc::new(FindFilesTool),
        Arc::new(GrepSearchTool),
        Arc::new(GetFileInfoTool),
        Arc::new(GitStatusTool),
        Arc::new(GitLogTool),
        Arc::new(GitDiffTool),
        Arc::new(AnalyzeRiskLevelTool),
        Arc::new(GetCveRemediationTool),
        Arc::new(CreateSecurityChecklistTool),
    ];

    let mut registry = ToolRegistry::new();
    for operation in operations {
        registry.register(operation)?;
    }
    Ok(registry)
}
