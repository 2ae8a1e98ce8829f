//! Request and response types exchanged with the backend.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_core::types::Money;

/// Schema version stamped on new workspaces and plans.
pub const DEFAULT_SCHEMA_VERSION: &str = "v2.0";

/// How a workspace is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceLocator {
    /// A workspace directory or its `workspace.yaml`.
    Path(PathBuf),
    /// A workspace id, looked up under the configured workspaces directory.
    Id(String),
    /// Environment override, then the configured default.
    Default,
}

/// Contents of `workspace.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub workspace_id: String,
    pub workspace_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_status")]
    pub workspace_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_environment() -> String {
    "development".into()
}

fn default_status() -> String {
    "active".into()
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.into()
}

/// Fields supplied when creating a plan. Ids and timestamps are assigned by
/// the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlanDraft {
    pub campaign_name: String,
    pub campaign_objective: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_budget: Money,
    pub created_by: String,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
    pub target_audience_name: Option<String>,
}

/// Where and when a plan was persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub media_plan_id: String,
    pub location: String,
    pub saved_at: DateTime<Utc>,
    pub line_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionReceipt {
    pub media_plan_id: String,
    pub location: String,
    pub deleted_line_items: usize,
}
