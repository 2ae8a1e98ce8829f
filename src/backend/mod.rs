//! Media-plan backend: the persistence engine behind the tools.
//!
//! The agent core only talks to the [`MediaPlanBackend`] trait. This module
//! also ships a SQLite implementation where a workspace is a directory with
//! a `workspace.yaml` and a `mediaplans.db`.
//!
//! Submodules:
//! - `errors`: Backend error type
//! - `types`: Workspace locators, drafts and receipts
//! - `sqlite`: SQLite-backed workspaces

pub mod errors;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent_core::budget;
use crate::agent_core::types::{MediaPlanRef, WorkspaceRef};

pub use errors::BackendError;
pub use sqlite::SqliteBackend;
pub use types::{
    DeletionReceipt, MediaPlanDraft, SaveReceipt, WorkspaceConfig, WorkspaceLocator,
};

/// Operations the tools need from a media-plan store.
///
/// Listing methods return flat JSON records (`meta_id`, `campaign_name`,
/// `stat_total_cost`, ...) in a stable order; filtering happens in the core.
#[async_trait]
pub trait MediaPlanBackend: Send + Sync {
    async fn load_workspace(&self, locator: &WorkspaceLocator)
        -> Result<WorkspaceRef, BackendError>;

    async fn workspace_info(&self, workspace: &WorkspaceRef)
        -> Result<WorkspaceConfig, BackendError>;

    async fn list_mediaplans(&self, workspace: &WorkspaceRef) -> Result<Vec<Value>, BackendError>;

    async fn list_campaigns(&self, workspace: &WorkspaceRef) -> Result<Vec<Value>, BackendError>;

    /// Build a new plan with backend-assigned ids. Not persisted until saved.
    async fn create_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        draft: MediaPlanDraft,
    ) -> Result<MediaPlanRef, BackendError>;

    async fn load_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        media_plan_id: &str,
    ) -> Result<MediaPlanRef, BackendError>;

    async fn save_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        plan: &MediaPlanRef,
    ) -> Result<SaveReceipt, BackendError>;

    async fn delete_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        media_plan_id: &str,
    ) -> Result<DeletionReceipt, BackendError>;

    /// Schema and business-rule violations; empty when the plan is valid.
    async fn validate_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        plan: &MediaPlanRef,
    ) -> Result<Vec<String>, BackendError>;
}

/// Business rules every stored plan must satisfy.
pub fn business_rule_violations(plan: &MediaPlanRef) -> Vec<String> {
    let mut errors = Vec::new();

    if plan.id.trim().is_empty() {
        errors.push("media plan id is empty".to_string());
    }
    if plan.campaign_name.trim().is_empty() {
        errors.push("campaign name is empty".to_string());
    }
    if !plan.total_budget.is_positive() {
        errors.push(format!(
            "campaign budget must be positive, got {}",
            plan.total_budget
        ));
    }
    if plan.start_date >= plan.end_date {
        errors.push(format!(
            "campaign start date {} must be before end date {}",
            plan.start_date, plan.end_date
        ));
    }

    for li in &plan.line_items {
        if li.id.trim().is_empty() {
            errors.push(format!("line item '{}' has an empty id", li.name));
        }
        if li.cost.is_negative() {
            errors.push(format!("line item '{}' has negative cost {}", li.id, li.cost));
        }
        if li.start_date > li.end_date {
            errors.push(format!(
                "line item '{}' starts {} after it ends {}",
                li.id, li.start_date, li.end_date
            ));
        }
        if li.start_date < plan.start_date || li.end_date > plan.end_date {
            errors.push(format!(
                "line item '{}' runs {}..{} outside the campaign {}..{}",
                li.id, li.start_date, li.end_date, plan.start_date, plan.end_date
            ));
        }
    }

    let allocated = budget::recompute_allocated(plan);
    if allocated > plan.total_budget {
        errors.push(format!(
            "line items allocate {allocated}, exceeding the campaign budget {}",
            plan.total_budget
        ));
    }

    errors
}
