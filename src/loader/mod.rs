//! Loads the JSON documents `execute` needs from disk.

use crate::protocol::{RunRequest, ToolConfigs, ToolRegistry, Workflow};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn load_workflow_from_file<P: AsRef<Path>>(path: P) -> Result<Workflow> {
    let content = fs::read_to_string(path).context("failed to read workflow file")?;
    serde_json::from_str(&content).context("failed to parse workflow JSON")
}

pub fn load_tool_registry_from_file<P: AsRef<Path>>(path: P) -> Result<ToolRegistry> {
    let content = fs::read_to_string(path).context("failed to read tool registry file")?;
    serde_json::from_str(&content).context("failed to parse tool registry JSON")
}

pub fn load_run_request_from_file<P: AsRef<Path>>(path: P) -> Result<RunRequest> {
    let content = fs::read_to_string(path).context("failed to read inputs file")?;
    serde_json::from_str(&content).context("failed to parse inputs JSON")
}

pub fn load_tool_configs_from_file<P: AsRef<Path>>(path: P) -> Result<ToolConfigs> {
    let content = fs::read_to_string(path).context("failed to read tool configs file")?;
    serde_json::from_str(&content).context("failed to parse tool configs JSON")
}
