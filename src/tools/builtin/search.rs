use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::logging::log_debug;
use crate::tools::policy::ToolPolicy;
use crate::tools::registry::Operation;
use crate::tools::schema::{OperationSchema, ParamType, ParamValue, ParameterSpec};
use crate::tools::validator::ValidatedArgs;

/// Blocking walks stop on their own after this, even if the caller gave up
const SEARCH_DEADLINE: Duration = Duration::from_secs(30);

// ============================================================================
// find_files
// ============================================================================

pub struct FindFilesTool;

/// Sorted matches (at most `max_results`) and whether the deadline cut the walk short
fn find_matches(
    dirpath: &str,
    pattern: &str,
    max_results: usize,
    deadline: Duration,
) -> Result<(Vec<String>, bool)> {
    let started = Instant::now();
    let full_pattern = Path::new(dirpath).join(pattern);
    let full_pattern = full_pattern.to_string_lossy();

    let paths = glob::glob(&full_pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?;

    // Only the smallest `max_results` paths are kept
    let mut matches = BTreeSet::new();
    for path in paths.filter_map(|entry| entry.ok()) {
        if started.elapsed() >= deadline {
            log_debug(&format!("find_files stopped after {:?}", deadline));
            return Ok((matches.into_iter().collect(), true));
        }
        matches.insert(path.display().to_string());
        if matches.len() > max_results {
            matches.pop_last();
        }
    }

    Ok((matches.into_iter().collect(), false))
}

#[async_trait]
impl Operation for FindFilesTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("find_files", "Find files matching a glob pattern")
            .param(ParameterSpec::required(
                "pattern",
                ParamType::String,
                "Glob pattern to search for files (e.g., '**/*.py')",
            ))
            .param(ParameterSpec::optional(
                "dirpath",
                ParamType::String,
                "Starting directory for search",
                ".".into(),
            ))
            .param(ParameterSpec::optional(
                "max_results",
                ParamType::Integer,
                "Maximum number of results to return",
                ParamValue::Integer(50),
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let pattern = args.text("pattern").to_string();
        let dirpath = args.text("dirpath").to_string();
        let max_results = args.integer("max_results").max(0) as usize;

        if !Path::new(&dirpath).exists() {
            return Err(anyhow!("Directory not found: {}", dirpath));
        }

        let (matches, stopped) = {
            let pattern = pattern.clone();
            tokio::task::spawn_blocking(move || {
                find_matches(&dirpath, &pattern, max_results, SEARCH_DEADLINE)
            })
            .await
            .context("File search panicked")??
        };

        let output = if matches.is_empty() {
            format!("No files found matching pattern: {}", pattern)
        } else {
            format!(
                "Found {} file(s) matching '{}':\n{}",
                matches.len(),
                pattern,
                matches.join("\n")
            )
        };
        Ok(with_deadline_note(output, stopped))
    }
}

// ============================================================================
// grep_search
// ============================================================================

pub struct GrepSearchTool;

struct GrepQuery {
    root: PathBuf,
    file_pattern: Pattern,
    matcher: Regex,
    max_results: usize,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}

fn with_deadline_note(output: String, stopped: bool) -> String {
    if stopped {
        format!(
            "{}\n\n[search stopped after {}s, results may be incomplete]",
            output,
            SEARCH_DEADLINE.as_secs()
        )
    } else {
        output
    }
}

/// Scan one text file line by line.
///
/// Files with a NUL byte anywhere are binary and contribute nothing.
fn grep_file(path: &Path, query: &GrepQuery, results: &mut Vec<String>) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    if reader.fill_buf()?.contains(&0) {
        log_debug(&format!("Skipping binary file {}", path.display()));
        return Ok(());
    }

    let remaining = query.max_results.saturating_sub(results.len());
    let mut found = Vec::new();
    let mut buf = Vec::new();
    let mut line_num = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_num += 1;

        if buf.contains(&0) {
            log_debug(&format!("Skipping binary file {}", path.display()));
            return Ok(());
        }

        if found.len() >= remaining {
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end();
        if query.matcher.is_match(line) {
            found.push(format!("{}:{}: {}", path.display(), line_num, line));
        }
    }

    results.extend(found);
    Ok(())
}

/// Matches in walk order and whether the deadline cut the walk short
fn grep_tree(query: &GrepQuery, deadline: Duration) -> (Vec<String>, bool) {
    let started = Instant::now();
    let mut results = Vec::new();

    let walker = WalkDir::new(&query.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in walker {
        if results.len() >= query.max_results {
            break;
        }
        if started.elapsed() >= deadline {
            log_debug(&format!("grep_search stopped after {:?}", deadline));
            return (results, true);
        }

        let name = entry.file_name().to_string_lossy();
        if !query.file_pattern.matches(&name) {
            continue;
        }

        // Unreadable files are skipped, not fatal
        if let Err(e) = grep_file(entry.path(), query, &mut results) {
            log_debug(&format!("Skipping {}: {}", entry.path().display(), e));
        }
    }

    (results, false)
}

#[async_trait]
impl Operation for GrepSearchTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("grep_search", "Search for text in files (grep-like functionality)")
            .param(ParameterSpec::required(
                "pattern",
                ParamType::String,
                "Text pattern or regex to search for",
            ))
            .param(ParameterSpec::optional(
                "dirpath",
                ParamType::String,
                "Directory to search in",
                ".".into(),
            ))
            .param(ParameterSpec::optional(
                "file_pattern",
                ParamType::String,
                "File pattern to search within (e.g., '*.py')",
                "*".into(),
            ))
            .param(ParameterSpec::optional(
                "is_regex",
                ParamType::Boolean,
                "Treat pattern as regex",
                false.into(),
            ))
            .param(ParameterSpec::optional(
                "case_sensitive",
                ParamType::Boolean,
                "Case-sensitive search",
                false.into(),
            ))
            .param(ParameterSpec::optional(
                "max_results",
                ParamType::Integer,
                "Maximum number of results",
                ParamValue::Integer(50),
            ))
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let pattern = args.text("pattern").to_string();
        let dirpath = args.text("dirpath");

        if !Path::new(dirpath).exists() {
            return Err(anyhow!("Directory not found: {}", dirpath));
        }

        let source = if args.boolean("is_regex") {
            pattern.clone()
        } else {
            regex::escape(&pattern)
        };
        let matcher = RegexBuilder::new(&source)
            .case_insensitive(!args.boolean("case_sensitive"))
            .build()
            .map_err(|e| anyhow!("Invalid regex pattern: {}", e))?;

        let file_pattern = Pattern::new(args.text("file_pattern"))
            .map_err(|e| anyhow!("Invalid file pattern: {}", e))?;

        let query = GrepQuery {
            root: PathBuf::from(dirpath),
            file_pattern,
            matcher,
            max_results: args.integer("max_results").max(0) as usize,
        };

        let (results, stopped) =
            tokio::task::spawn_blocking(move || grep_tree(&query, SEARCH_DEADLINE))
                .await
                .context("Text search panicked")?;

        let output = if results.is_empty() {
            format!("No matches found for pattern: {}", pattern)
        } else {
            format!(
                "Found {} match(es):\n{}",
                results.len(),
                results.join("\n")
            )
        };
        Ok(with_deadline_note(output, stopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::ArgValue;
    use crate::tools::validator::{ToolCall, validate};
    use tempfile::TempDir;

    fn args(op: &dyn Operation, pairs: &[(&str, ArgValue)]) -> ValidatedArgs {
        let schema = op.schema();
        let mut call = ToolCall::new(&schema.name);
        for (name, value) in pairs {
            call = call.arg(name, value.clone());
        }
        validate(&call, &schema).unwrap()
    }

    fn text(s: impl Into<String>) -> ArgValue {
        ArgValue::Text(s.into())
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("README.md"), "# Demo\nset PASSWORD here\n").unwrap();
        std::fs::write(root.join("src").join("main.rs"), "fn main() {\n    let password = \"hunter2\";\n}\n").unwrap();
        std::fs::write(root.join("src").join("notes.md"), "nothing to see\n").unwrap();
        std::fs::write(root.join(".git").join("config"), "password = leaked\n").unwrap();
        std::fs::write(root.join("blob.bin"), b"password\0\x01\x02").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_find_files_sorted_and_limited() {
        let dir = fixture();
        let root = dir.path().to_string_lossy().to_string();

        let output = FindFilesTool
            .execute(
                &args(&FindFilesTool, &[("pattern", text("**/*.md")), ("dirpath", text(&root))]),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert!(output.starts_with("Found 2 file(s) matching '**/*.md':"));
        let readme = output.find("README.md").unwrap();
        let notes = output.find("notes.md").unwrap();
        assert!(readme < notes);

        let limited = FindFilesTool
            .execute(
                &args(
                    &FindFilesTool,
                    &[
                        ("pattern", text("**/*.md")),
                        ("dirpath", text(&root)),
                        ("max_results", ArgValue::Integer(1)),
                    ],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert!(limited.starts_with("Found 1 file(s)"));
    }

    #[tokio::test]
    async fn test_find_files_no_match() {
        let dir = fixture();
        let output = FindFilesTool
            .execute(
                &args(
                    &FindFilesTool,
                    &[("pattern", text("*.toml")), ("dirpath", text(dir.path().to_string_lossy()))],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert_eq!(output, "No files found matching pattern: *.toml");
    }

    #[tokio::test]
    async fn test_grep_case_insensitive_skips_hidden_and_binary() {
        let dir = fixture();
        let output = GrepSearchTool
            .execute(
                &args(
                    &GrepSearchTool,
                    &[("pattern", text("password")), ("dirpath", text(dir.path().to_string_lossy()))],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();

        assert!(output.starts_with("Found 2 match(es):"));
        assert!(output.contains("README.md:2: set PASSWORD here"));
        assert!(output.contains("main.rs:2:"));
        assert!(!output.contains("leaked"));
        assert!(!output.contains("blob.bin"));
    }

    #[tokio::test]
    async fn test_grep_case_sensitive_with_file_pattern() {
        let dir = fixture();
        let output = GrepSearchTool
            .execute(
                &args(
                    &GrepSearchTool,
                    &[
                        ("pattern", text("PASSWORD")),
                        ("dirpath", text(dir.path().to_string_lossy())),
                        ("case_sensitive", ArgValue::Bool(true)),
                        ("file_pattern", text("*.md")),
                    ],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert!(output.starts_with("Found 1 match(es):"));
        assert!(output.contains("README.md"));
    }

    #[tokio::test]
    async fn test_grep_literal_pattern_is_escaped() {
        let dir = fixture();
        let root = dir.path().to_string_lossy().to_string();

        let literal = GrepSearchTool
            .execute(
                &args(&GrepSearchTool, &[("pattern", text("main()")), ("dirpath", text(&root))]),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert!(literal.contains("main.rs:1: fn main() {"));

        let err = GrepSearchTool
            .execute(
                &args(
                    &GrepSearchTool,
                    &[
                        ("pattern", text("main(")),
                        ("dirpath", text(&root)),
                        ("is_regex", ArgValue::Bool(true)),
                    ],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid regex pattern"));
    }

    #[test]
    fn test_find_matches_observes_deadline() {
        let dir = fixture();
        let root = dir.path().to_string_lossy().to_string();

        let (matches, stopped) = find_matches(&root, "**/*.md", 50, Duration::ZERO).unwrap();
        assert!(stopped);
        assert!(matches.is_empty());

        let (matches, stopped) = find_matches(&root, "**/*.md", 1, SEARCH_DEADLINE).unwrap();
        assert!(!stopped);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("README.md"));
    }

    #[test]
    fn test_grep_tree_observes_deadline() {
        let dir = fixture();
        let query = GrepQuery {
            root: dir.path().to_path_buf(),
            file_pattern: Pattern::new("*").unwrap(),
            matcher: Regex::new("password").unwrap(),
            max_results: 50,
        };

        let (results, stopped) = grep_tree(&query, Duration::ZERO);
        assert!(stopped);
        assert!(results.is_empty());
        assert_eq!(
            with_deadline_note("x".to_string(), true),
            "x\n\n[search stopped after 30s, results may be incomplete]"
        );
    }

    #[tokio::test]
    async fn test_grep_skips_file_with_late_nul_byte() {
        let dir = TempDir::new().unwrap();
        let mut content = b"password = one\n".to_vec();
        content.extend(std::iter::repeat_n(b'a', 9000));
        content.extend(b"\n\0\n");
        std::fs::write(dir.path().join("late.bin"), content).unwrap();
        std::fs::write(dir.path().join("plain.txt"), "password = two\n").unwrap();

        let output = GrepSearchTool
            .execute(
                &args(
                    &GrepSearchTool,
                    &[("pattern", text("password")), ("dirpath", text(dir.path().to_string_lossy()))],
                ),
                &ToolPolicy::new(),
            )
            .await
            .unwrap();
        assert!(output.starts_with("Found 1 match(es):"));
        assert!(output.contains("plain.txt:1: password = two"));
        assert!(!output.contains("late.bin"));
    }
}
