//! Media-plan tools: create, edit, persist and remove plans.
//!
//! The session holds one working copy. `create_mediaplan` and
//! `load_mediaplan` replace it, `create_lineitem` edits it in memory and
//! `save_mediaplan` writes it back through the backend.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent_core::budget::{self, ViolationPolicy};
use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_router::{
    ArgumentSchema, ConfirmationGate, ParamKind, ParamSpec, ToolContext, ToolDispatcher,
    ToolHandler, ToolSpec,
};
use crate::agent_core::types::LineItem;
use crate::backend::MediaPlanDraft;

use super::{opt_bool, opt_str, req_date, req_money, req_str};

/// Campaign objectives accepted by `create_mediaplan`.
pub const CAMPAIGN_OBJECTIVES: &[&str] = &[
    "awareness",
    "consideration",
    "conversion",
    "retention",
    "loyalty",
    "other",
];

pub(super) fn register(dispatcher: &mut ToolDispatcher) -> Result<(), AgentError> {
    dispatcher.register(
        ToolSpec {
            name: "create_mediaplan",
            description: "Create a new media plan in the loaded workspace and make it the \
                          current plan. It is not persisted until save_mediaplan is called.",
            schema: ArgumentSchema::new(vec![
                ParamSpec::required("campaign_name", ParamKind::String, "Campaign name"),
                ParamSpec::required(
                    "campaign_objective",
                    ParamKind::Enum(CAMPAIGN_OBJECTIVES),
                    "Primary campaign objective",
                ),
                ParamSpec::required("start_date", ParamKind::Date, "Campaign start (YYYY-MM-DD)"),
                ParamSpec::required("end_date", ParamKind::Date, "Campaign end (YYYY-MM-DD)"),
                ParamSpec::required("budget_total", ParamKind::Number, "Total campaign budget"),
                ParamSpec::required("created_by", ParamKind::String, "Email of the planner"),
                ParamSpec::optional("product_name", ParamKind::String, "Product advertised"),
                ParamSpec::optional(
                    "product_description",
                    ParamKind::String,
                    "Short product description",
                ),
                ParamSpec::optional(
                    "target_audience_name",
                    ParamKind::String,
                    "Name of the primary audience",
                ),
            ]),
            confirmation: None,
        },
        CreateMediaPlan,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "create_lineitem",
            description: "Add a line item to the current media plan. The cost must fit the \
                          remaining budget and the flight must fall inside the campaign dates.",
            schema: ArgumentSchema::new(vec![
                ParamSpec::required("channel", ParamKind::String, "Channel, e.g. social, tv"),
                ParamSpec::required("vehicle", ParamKind::String, "Vehicle, e.g. Meta, YouTube"),
                ParamSpec::required("cost", ParamKind::Number, "Line item cost"),
                ParamSpec::required("start_date", ParamKind::Date, "Flight start (YYYY-MM-DD)"),
                ParamSpec::required("end_date", ParamKind::Date, "Flight end (YYYY-MM-DD)"),
                ParamSpec::optional("name", ParamKind::String, "Display name"),
                ParamSpec::optional("partner", ParamKind::String, "Media partner"),
                ParamSpec::optional("kpi", ParamKind::String, "Primary KPI"),
            ]),
            confirmation: None,
        },
        CreateLineItem,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "load_mediaplan",
            description: "Load a saved media plan with its line items and make it current.",
            schema: ArgumentSchema::new(vec![ParamSpec::required(
                "media_plan_id",
                ParamKind::String,
                "Media plan id",
            )]),
            confirmation: None,
        },
        LoadMediaPlan,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "save_mediaplan",
            description: "Persist the current media plan to the workspace.",
            schema: ArgumentSchema::new(vec![ParamSpec::optional(
                "include_strategic_summary",
                ParamKind::Boolean,
                "Write the strategic context summary into the plan comments (default true)",
            )]),
            confirmation: None,
        },
        SaveMediaPlan,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "validate_mediaplan",
            description: "Check a media plan against the workspace schema and business rules. \
                          Defaults to the current plan.",
            schema: ArgumentSchema::new(vec![ParamSpec::optional(
                "media_plan_id",
                ParamKind::String,
                "Media plan id",
            )]),
            confirmation: None,
        },
        ValidateMediaPlan,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "delete_mediaplan",
            description: "Delete a saved media plan. The first call only asks for \
                          confirmation; after the user explicitly agrees, call again with \
                          confirm_deletion=true.",
            schema: ArgumentSchema::new(vec![
                ParamSpec::required("media_plan_id", ParamKind::String, "Media plan id"),
                ParamSpec::optional(
                    "confirm_deletion",
                    ParamKind::Boolean,
                    "Set only after the user confirmed this exact plan",
                ),
            ]),
            confirmation: Some(ConfirmationGate {
                target_arg: "media_plan_id",
                confirm_arg: "confirm_deletion",
            }),
        },
        DeleteMediaPlan,
    )?;
    Ok(())
}

// ─── create_mediaplan ───────────────────────────────────────────────────────

struct CreateMediaPlan;

#[async_trait]
impl ToolHandler for CreateMediaPlan {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;

        let draft = MediaPlanDraft {
            campaign_name: req_str(&args, "campaign_name")?,
            campaign_objective: req_str(&args, "campaign_objective")?,
            start_date: req_date(&args, "start_date")?,
            end_date: req_date(&args, "end_date")?,
            total_budget: req_money(&args, "budget_total")?,
            created_by: req_str(&args, "created_by")?,
            product_name: opt_str(&args, "product_name"),
            product_description: opt_str(&args, "product_description"),
            target_audience_name: opt_str(&args, "target_audience_name"),
        };
        if !draft.total_budget.is_positive() {
            return Err(AgentError::validation("budget_total must be positive").into());
        }
        if draft.start_date >= draft.end_date {
            return Err(AgentError::validation(format!(
                "start_date {} must be before end_date {}",
                draft.start_date, draft.end_date
            ))
            .into());
        }

        let plan = ctx.backend.create_mediaplan(&workspace, draft).await?;
        let summary = budget::summarize(&plan);
        let message = format!(
            "Media plan '{}' created for campaign '{}'. Add line items, then save it.",
            plan.id, plan.campaign_name
        );
        let payload = json!({
            "media_plan": plan,
            "budget": summary,
            "saved": false,
            "message": message,
        });
        ctx.session.bind_media_plan(plan)?;
        Ok(payload)
    }
}

// ─── create_lineitem ────────────────────────────────────────────────────────

struct CreateLineItem;

#[async_trait]
impl ToolHandler for CreateLineItem {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let channel = req_str(&args, "channel")?;
        let vehicle = req_str(&args, "vehicle")?;
        let cost = req_money(&args, "cost")?;
        let start_date = req_date(&args, "start_date")?;
        let end_date = req_date(&args, "end_date")?;

        if cost.is_negative() {
            return Err(AgentError::validation("cost must not be negative").into());
        }
        if start_date > end_date {
            return Err(AgentError::validation(format!(
                "start_date {start_date} is after end_date {end_date}"
            ))
            .into());
        }

        let violations = budget::validate_line_item(ctx.media_plan()?, cost, start_date, end_date);
        let warnings: Vec<String> = violations.iter().map(ToString::to_string).collect();
        if !violations.is_empty() && ctx.violation_policy == ViolationPolicy::Block {
            return Err(AgentError::Conflict {
                reason: warnings.join("; "),
            }
            .into());
        }

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let item = LineItem {
            id: format!("lineitem_{}", &suffix[..8]),
            name: opt_str(&args, "name").unwrap_or_else(|| format!("{channel} - {vehicle}")),
            channel,
            vehicle,
            partner: opt_str(&args, "partner"),
            kpi: opt_str(&args, "kpi"),
            cost,
            start_date,
            end_date,
        };

        let Some(plan) = ctx.session.media_plan_mut() else {
            return Err(AgentError::precondition("no media plan loaded").into());
        };
        plan.line_items.push(item.clone());
        let summary = budget::summarize(plan);

        if !warnings.is_empty() {
            tracing::warn!(
                media_plan_id = %plan.id,
                line_item_id = %item.id,
                violations = warnings.len(),
                "line item added with violations"
            );
        }

        Ok(json!({
            "line_item": item,
            "budget": summary,
            "warnings": warnings,
        }))
    }
}

// ─── load_mediaplan ─────────────────────────────────────────────────────────

struct LoadMediaPlan;

#[async_trait]
impl ToolHandler for LoadMediaPlan {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;
        let id = req_str(&args, "media_plan_id")?;

        let plan = ctx.backend.load_mediaplan(&workspace, &id).await?;
        let payload = json!({
            "media_plan": plan,
            "budget": budget::summarize(&plan),
        });
        ctx.session.bind_media_plan(plan)?;
        Ok(payload)
    }
}

// ─── save_mediaplan ─────────────────────────────────────────────────────────

struct SaveMediaPlan;

#[async_trait]
impl ToolHandler for SaveMediaPlan {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;
        ctx.media_plan()?;

        let summary = if opt_bool(&args, "include_strategic_summary", true) {
            Some(ctx.session.strategic_summary()).filter(|s| !s.is_empty())
        } else {
            None
        };
        let included = summary.is_some();

        let Some(plan) = ctx.session.media_plan_mut() else {
            return Err(AgentError::precondition("no media plan loaded").into());
        };
        if let Some(summary) = summary {
            plan.comments = Some(summary);
        }

        let receipt = ctx.backend.save_mediaplan(&workspace, plan).await?;
        Ok(json!({
            "saved": true,
            "media_plan_id": receipt.media_plan_id,
            "location": receipt.location,
            "saved_at": receipt.saved_at,
            "line_items": receipt.line_items,
            "strategic_summary_included": included,
        }))
    }
}

// ─── validate_mediaplan ─────────────────────────────────────────────────────

struct ValidateMediaPlan;

#[async_trait]
impl ToolHandler for ValidateMediaPlan {
    async fn call(&self, ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;

        // The working copy wins over the stored one when ids match
        let plan = match opt_str(&args, "media_plan_id") {
            Some(id) => match ctx.session.media_plan().filter(|p| p.id == id) {
                Some(current) => current.clone(),
                None => ctx.backend.load_mediaplan(&workspace, &id).await?,
            },
            None => ctx.media_plan()?.clone(),
        };

        let errors = ctx.backend.validate_mediaplan(&workspace, &plan).await?;
        Ok(json!({
            "media_plan_id": plan.id,
            "valid": errors.is_empty(),
            "errors": errors,
            "budget": budget::summarize(&plan),
        }))
    }
}

// ─── delete_mediaplan ───────────────────────────────────────────────────────

/// Only reached once the dispatcher's confirmation gate has let the
/// call through.
struct DeleteMediaPlan;

#[async_trait]
impl ToolHandler for DeleteMediaPlan {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;
        let id = req_str(&args, "media_plan_id")?;

        let receipt = ctx.backend.delete_mediaplan(&workspace, &id).await?;

        let cleared = ctx.session.media_plan().is_some_and(|p| p.id == id);
        if cleared {
            ctx.session.clear_media_plan();
        }

        Ok(json!({
            "deleted": true,
            "media_plan_id": receipt.media_plan_id,
            "location": receipt.location,
            "deleted_line_items": receipt.deleted_line_items,
            "cleared_current_plan": cleared,
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
