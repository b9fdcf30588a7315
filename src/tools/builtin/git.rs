use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;

use crate::tools::policy::ToolPolicy;
use crate::tools::registry::Operation;
use crate::tools::schema::{OperationSchema, ParamType, ParamValue, ParameterSpec};
use crate::tools::validator::ValidatedArgs;

const GIT_TIME_LIMIT: Duration = Duration::from_secs(10);

const MAX_DIFF_CHARS: usize = 5000;

/// Run git in `repo_path`, returning stdout or an error carrying stderr
async fn run_git(repo_path: &str, args: &[&str], failure: &str) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .kill_on_drop(true)
        .output()
        .await
        .context("Failed to run git")?;

    if !output.status.success() {
        return Err(anyhow!(
            "{}: {}",
            failure,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn repo_param() -> ParameterSpec {
    ParameterSpec::optional(
        "repo_path",
        ParamType::String,
        "Path to git repository",
        ".".into(),
    )
}

pub struct GitStatusTool;

#[async_trait]
impl Operation for GitStatusTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("git_status", "Get git repository status").param(repo_param())
    }

    fn time_limit(&self, _args: &ValidatedArgs) -> Option<Duration> {
        Some(GIT_TIME_LIMIT)
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let output = run_git(
            args.text("repo_path"),
            &["status", "--short"],
            "Not a git repository or git not found",
        )
        .await?;

        if output.is_empty() {
            Ok("Repository is clean (no changes)".to_string())
        } else {
            Ok(output)
        }
    }
}

pub struct GitLogTool;

#[async_trait]
impl Operation for GitLogTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("git_log", "Get recent git commits")
            .param(repo_param())
            .param(ParameterSpec::optional(
                "max_commits",
                ParamType::Integer,
                "Maximum number of commits to show",
                ParamValue::Integer(10),
            ))
    }

    fn time_limit(&self, _args: &ValidatedArgs) -> Option<Duration> {
        Some(GIT_TIME_LIMIT)
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let limit = format!("-{}", args.integer("max_commits").max(1));
        let output = run_git(
            args.text("repo_path"),
            &["log", "--oneline", &limit],
            "Cannot get git log",
        )
        .await?;

        if output.is_empty() {
            Ok("No commits found".to_string())
        } else {
            Ok(output)
        }
    }
}

pub struct GitDiffTool;

#[async_trait]
impl Operation for GitDiffTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new("git_diff", "Get git diff of uncommitted changes")
            .param(repo_param())
            .param(ParameterSpec::optional(
                "filepath",
                ParamType::String,
                "Specific file to show diff for (optional)",
                "".into(),
            ))
    }

    fn time_limit(&self, _args: &ValidatedArgs) -> Option<Duration> {
        Some(GIT_TIME_LIMIT)
    }

    async fn execute(&self, args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
        let mut git_args = vec!["diff"];
        let filepath = args.text("filepath");
        if !filepath.is_empty() {
            git_args.push("--");
            git_args.push(filepath);
        }

        let output = run_git(args.text("repo_path"), &git_args, "Cannot get git diff").await?;

        if output.is_empty() {
            return Ok("No changes to show".to_string());
        }

        if output.chars().count() > MAX_DIFF_CHARS {
            let head: String = output.chars().take(MAX_DIFF_CHARS).collect();
            return Ok(format!("{}\n[... diff truncated ...]", head));
        }

        Ok(output)
    }
}
