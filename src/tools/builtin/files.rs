use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chardetng::EncodingDetector;
use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

use crate::logging::log_debug;
use crate::tools::policy::ToolPolicy;
use crate::tools::registry::Operation;
use crate::tools::schema::{OperationSchema, ParamType, ParamValue, ParameterSpec};
use crate::tools::validator::ValidatedArgs;

/// Characters of file content returned before cutting off
const MAX_CONTENT_CHARS: usize = 5000;

/// Lines of a recursive listing returned before cutting off
const MAX_TREE_LINES: usize = 100;

/// Decode file bytes, falling back to encoding detection for non-UTF-8 input
fn decode_text(path: &str, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(err) => {
            let bytes = err.into_bytes();
            // A byte order mark wins over detection (UTF-16 exports)
            let encoding = match encoding_rs::Encoding::for_bom(&bytes) {
                Some((encoding, _)) => encoding,
                None => {
                    let mut detector = EncodingDetector::new();
                    detector.feed(&bytes, true);
                    detector.guess(None, true)
                }
            };
            log_debug(&format!("Decoding {} as {}", path, encoding.name()));
            let (content, _, _) = encoding.decode(&bytes);
            content.into_owned()
        }
    }
}

// ============================================================================
// get_file_contents
// ============================================================================

pub struct GetFileContentsTool;

#[async_trait]
impl Operation for GetFileContentsTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new(
            "get_file_contents",
            "Read and return the contents of a file with optional line range",
        )
        .param(ParameterSpec::required(
            "filepath",
            ParamType::String,
            "Path to the file to read",
        ))
        .param(ParameterSpec::optional(
            "start_line",
            ParamType::Integer,
            "Starting line (1-indexed)",
            ParamValue::Integer(1),
        ))
        .param(ParameterSpec::optional(
            "end_line",
            ParamType::Integer,
            "Ending line (1-indexed, -1 for end)",
            ParamValue::Integer(-1),
        ))
    }

    async fn execute(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<String> {
        let filepath = args.text("filepath");

        let metadata = tokio::fs::metadata(filepath)
            .await
            .with_context(|| format!("File not found: {}", filepath))?;

        if metadata.is_dir() {
            return Err(anyhow!("{} is a directory, not a file", filepath));
        }

        if metadata.len() > policy.max_file_size() {
            return Err(anyhow!(
                "File too large: {} bytes (max: {})",
                metadata.len(),
                policy.max_file_size()
            ));
        }

        let bytes = tokio::fs::read(filepath)
            .await
            .with_context(|| format!("Failed to read file: {}", filepath))?;
        let text = decode_text(filepath, bytes);

        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let start_line = args.integer("start_line");
        let end_line = match args.integer("end_line") {
            -1 => lines.len() as i64,
            n => n,
        };

        let start_idx = start_line.saturating_sub(1).clamp(0, lines.len() as i64) as usize;
        let end_idx = end_line.clamp(0, lines.len() as i64) as usize;
        let contents = if start_idx < end_idx {
            lines[start_idx..end_idx].concat()
        } else {
            String::new()
        };

        if contents.chars().count() > MAX_CONTENT_CHARS {
            let head: String = contents.chars().take(MAX_CONTENT_CHARS).collect();
            return Ok(format!(
                "File contents (lines {}-{}, first {} chars):\n{}\n\n[... truncated ...]",
                start_line, end_line, MAX_CONTENT_CHARS, head
            ));
        }

        Ok(format!(
            "File contents (lines {}-{}):\n{}",
            start_line, end_line, contents
        ))
    }
}

// ============================================================================
// write_file
// ============================================================================

pub struct WriteFileTool;

#[async_trait]
impl Operation for WriteFileTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("write_file", "Write or append content to a file")
            .param(ParameterSpec::required(
                "filepath",
                ParamType::String,
                "Path to the file to write",
            ))
            .param(ParameterSpec::required(
                "content",
                ParamType::String,
                "Content to write to the file",
            ))
            .param(ParameterSpec::optional(
                "append",
                ParamType::Boolean,
                "Append instead of overwrite",
                false.into(),
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let filepath = args.text("filepath");
        let content = args.text("content");
        let append = args.boolean("append");

        if let Some(parent) = Path::new(filepath).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directories")?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(filepath)
            .await
            .with_context(|| format!("Failed to open file: {}", filepath))?;

        file.write_all(content.as_bytes())
            .await
            .with_context(|| format!("Failed to write file: {}", filepath))?;
        file.flush().await?;

        let action = if append { "appended to" } else { "wrote to" };
        Ok(format!(
            "Successfully {} {} ({} bytes)",
            action,
            filepath,
            content.len()
        ))
    }
}

// ============================================================================
// list_directory
// ============================================================================

pub struct ListDirectoryTool;

fn tree_listing(root: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if lines.len() >= MAX_TREE_LINES {
            break;
        }

        let indent = "  ".repeat(entry.depth());
        let name = if entry.depth() == 0 {
            root.display().to_string()
        } else {
            entry.file_name().to_string_lossy().to_string()
        };

        if entry.file_type().is_dir() {
            lines.push(format!("{}{}/", indent, name));
        } else {
            lines.push(format!("{}{}", indent, name));
        }
    }

    lines
}

#[async_trait]
impl Operation for ListDirectoryTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("list_directory", "List files and directories in a path")
            .param(ParameterSpec::optional(
                "dirpath",
                ParamType::String,
                "Path to the directory to list",
                ".".into(),
            ))
            .param(ParameterSpec::optional(
                "recursive",
                ParamType::Boolean,
                "List recursively",
                false.into(),
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let dirpath = args.text("dirpath").to_string();

        if !Path::new(&dirpath).is_dir() {
            return Err(anyhow!("Directory not found: {}", dirpath));
        }

        if args.boolean("recursive") {
            let root = PathBuf::from(&dirpath);
            let lines = tokio::task::spawn_blocking(move || tree_listing(&root))
                .await
                .context("Directory walk panicked")?;
            return Ok(format!("Directory structure:\n{}", lines.join("\n")));
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dirpath)
            .await
            .with_context(|| format!("Failed to read directory: {}", dirpath))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let is_dir = entry.file_type().await?.is_dir();
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push((name, is_dir));
        }

        entries.sort();

        let listing: Vec<String> = entries
            .iter()
            .map(|(name, is_dir)| {
                let tag = if *is_dir { "[DIR]" } else { "[FILE]" };
                format!("  {} {}", tag, name)
            })
            .collect();

        Ok(format!("Contents of {}:\n{}", dirpath, listing.join("\n")))
    }
}

// ============================================================================
// create_directory / delete_file / delete_directory / copy_file
// ============================================================================

pub struct CreateDirectoryTool;

#[async_trait]
impl Operation for CreateDirectoryTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new(
            "create_directory",
            "Create a directory and any parent directories needed",
        )
        .param(ParameterSpec::required(
            "dirpath",
            ParamType::String,
            "Path to the directory to create",
        ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let dirpath = args.text("dirpath");
        tokio::fs::create_dir_all(dirpath)
            .await
            .with_context(|| format!("Failed to create directory: {}", dirpath))?;
        Ok(format!("Successfully created directory: {}", dirpath))
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl Operation for DeleteFileTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("delete_file", "Delete a file").param(ParameterSpec::required(
            "filepath",
            ParamType::String,
            "Path to the file to delete",
        ))
    }

    async fn execute(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<String> {
        policy.ensure_delete_allowed()?;
        let filepath = args.text("filepath");

        let metadata = tokio::fs::metadata(filepath)
            .await
            .with_context(|| format!("File not found: {}", filepath))?;
        if metadata.is_dir() {
            return Err(anyhow!(
                "{} is a directory, not a file. Use delete_directory instead.",
                filepath
            ));
        }

        tokio::fs::remove_file(filepath)
            .await
            .with_context(|| format!("Failed to delete file: {}", filepath))?;
        Ok(format!("Successfully deleted: {}", filepath))
    }
}

pub struct DeleteDirectoryTool;

#[async_trait]
impl Operation for DeleteDirectoryTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("delete_directory", "Delete a directory")
            .param(ParameterSpec::required(
                "dirpath",
                ParamType::String,
                "Path to the directory to delete",
            ))
            .param(ParameterSpec::optional(
                "recursive",
                ParamType::Boolean,
                "Delete directory and all contents",
                false.into(),
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<String> {
        policy.ensure_delete_allowed()?;
        let dirpath = args.text("dirpath");

        let metadata = tokio::fs::metadata(dirpath)
            .await
            .with_context(|| format!("Directory not found: {}", dirpath))?;
        if !metadata.is_dir() {
            return Err(anyhow!("{} is a file, not a directory.", dirpath));
        }

        if args.boolean("recursive") {
            tokio::fs::remove_dir_all(dirpath).await
        } else {
            tokio::fs::remove_dir(dirpath).await
        }
        .with_context(|| format!("Failed to delete directory: {}", dirpath))?;

        Ok(format!("Successfully deleted: {}", dirpath))
    }
}

pub struct CopyFileTool;

#[async_trait]
impl Operation for CopyFileTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("copy_file", "Copy a file")
            .param(ParameterSpec::required(
                "source",
                ParamType::String,
                "Source file path",
            ))
            .param(ParameterSpec::required(
                "destination",
                ParamType::String,
                "Destination file path",
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let source = args.text("source");
        let destination = args.text("destination");

        if !Path::new(source).is_file() {
            return Err(anyhow!("Source file not found: {}", source));
        }

        if let Some(parent) = Path::new(destination).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create destination directory")?;
        }

        tokio::fs::copy(source, destination)
            .await
            .with_context(|| format!("Failed to copy {} to {}", source, destination))?;
        Ok(format!("Successfully copied {} to {}", source, destination))
    }
}

// ============================================================================
// get_file_info
// ============================================================================

pub struct GetFileInfoTool;

#[cfg(unix)]
fn permissions_label(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions_label(metadata: &std::fs::Metadata) -> String {
    if metadata.permissions().readonly() {
        "read-only".to_string()
    } else {
        "read-write".to_string()
    }
}

#[async_trait]
impl Operation for GetFileInfoTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new(
            "get_file_info",
            "Get file metadata (size, type, modification time, permissions)",
        )
        .param(ParameterSpec::required(
            "filepath",
            ParamType::String,
            "Path to the file",
        ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let filepath = args.text("filepath");
        let metadata = tokio::fs::metadata(filepath)
            .await
            .with_context(|| format!("File not found: {}", filepath))?;

        let file_type = if metadata.is_dir() {
            "Directory".to_string()
        } else {
            Path::new(filepath)
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_else(|| "Unknown type".to_string())
        };

        let modified = metadata
            .modified()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(format!(
            "File Information: {}\n\nType: {}\nSize: {} bytes ({:.2} KB)\nModified: {}\nPermissions: {}\n",
            filepath,
            file_type,
            metadata.len(),
            metadata.len() as f64 / 1024.0,
            modified,
            permissions_label(&metadata)
        ))
    }
}
