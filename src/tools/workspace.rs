//! Workspace tools: loading a workspace and querying its contents.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::agent_core::errors::AgentError;
use crate::agent_core::filter::{CompiledFilter, FieldCatalog};
use crate::agent_core::tool_router::{
    ArgumentSchema, ParamKind, ParamSpec, ToolContext, ToolDispatcher, ToolHandler, ToolSpec,
};
use crate::backend::WorkspaceLocator;

use super::{opt_bool, opt_str};

pub(super) fn register(dispatcher: &mut ToolDispatcher) -> Result<(), AgentError> {
    dispatcher.register(
        ToolSpec {
            name: "load_workspace",
            description: "Load a media-plan workspace by directory path or workspace id. \
                          With no arguments, loads the default workspace.",
            schema: ArgumentSchema::new(vec![
                ParamSpec::optional(
                    "workspace_path",
                    ParamKind::String,
                    "Workspace directory or its workspace.yaml",
                ),
                ParamSpec::optional("workspace_id", ParamKind::String, "Workspace id"),
            ]),
            confirmation: None,
        },
        LoadWorkspace,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "get_workspace_info",
            description: "Describe the loaded workspace: configuration and what it contains.",
            schema: ArgumentSchema::default(),
            confirmation: None,
        },
        WorkspaceInfo,
    )?;
    dispatcher.register(
        ToolSpec {
            name: "list_mediaplans",
            description: "List media plans in the workspace with optional filters. Filter \
                          fields include campaign_name, campaign_objective, \
                          campaign_budget_total, campaign_start_date, stat_total_cost, \
                          stat_lineitem_count. Payloads: value (exact), [values] (any of), \
                          {\"min\":..,\"max\":..} (inclusive range), {\"regex\":..}.",
            schema: listing_schema(),
            confirmation: None,
        },
        ListRecords(Listing::MediaPlans),
    )?;
    dispatcher.register(
        ToolSpec {
            name: "list_campaigns",
            description: "List campaigns in the workspace, aggregated across their media \
                          plans, with optional filters (same payload forms as list_mediaplans).",
            schema: listing_schema(),
            confirmation: None,
        },
        ListRecords(Listing::Campaigns),
    )?;
    Ok(())
}

fn listing_schema() -> ArgumentSchema {
    ArgumentSchema::new(vec![
        ParamSpec::optional(
            "filters",
            ParamKind::Filter,
            "Object mapping field name to a filter payload",
        ),
        ParamSpec::optional(
            "include_stats",
            ParamKind::Boolean,
            "Include stat_* fields (default true)",
        ),
        ParamSpec::optional("limit", ParamKind::Integer, "Maximum records to return"),
    ])
}

// ─── load_workspace ─────────────────────────────────────────────────────────

struct LoadWorkspace;

#[async_trait]
impl ToolHandler for LoadWorkspace {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let locator = match (opt_str(&args, "workspace_path"), opt_str(&args, "workspace_id")) {
            (Some(_), Some(_)) => {
                return Err(AgentError::validation(
                    "pass either workspace_path or workspace_id, not both",
                )
                .into())
            }
            (Some(path), None) => WorkspaceLocator::Path(PathBuf::from(path)),
            (None, Some(id)) => WorkspaceLocator::Id(id),
            (None, None) => WorkspaceLocator::Default,
        };

        let workspace = ctx.backend.load_workspace(&locator).await?;
        let config = ctx.backend.workspace_info(&workspace).await?;
        ctx.session.bind_workspace(workspace.clone());

        Ok(json!({
            "workspace_id": workspace.id,
            "workspace_name": workspace.name,
            "root": workspace.root.display().to_string(),
            "environment": config.environment,
            "workspace_status": config.workspace_status,
            "schema_version": config.schema_version,
            "message": format!("Workspace '{}' loaded.", workspace.name),
        }))
    }
}

// ─── get_workspace_info ─────────────────────────────────────────────────────

struct WorkspaceInfo;

#[async_trait]
impl ToolHandler for WorkspaceInfo {
    async fn call(&self, ctx: ToolContext<'_>, _args: Value) -> anyhow::Result<Value> {
        let workspace = ctx.workspace()?;
        let config = ctx.backend.workspace_info(&workspace).await?;
        let plans = ctx.backend.list_mediaplans(&workspace).await?;
        let campaigns = ctx.backend.list_campaigns(&workspace).await?;

        Ok(json!({
            "workspace": config,
            "root": workspace.root.display().to_string(),
            "media_plan_count": plans.len(),
            "campaign_count": campaigns.len(),
            "current_media_plan": ctx.session.media_plan().map(|p| p.id.clone()),
        }))
    }
}

// ─── list_mediaplans / list_campaigns ───────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Listing {
    MediaPlans,
    Campaigns,
}

impl Listing {
    fn catalog(self) -> FieldCatalog {
        match self {
            Listing::MediaPlans => FieldCatalog::media_plans(),
            Listing::Campaigns => FieldCatalog::campaigns(),
        }
    }

    fn key(self) -> &'static str {
        match self {
            Listing::MediaPlans => "media_plans",
            Listing::Campaigns => "campaigns",
        }
    }
}

struct ListRecords(Listing);

#[async_trait]
impl ToolHandler for ListRecords {
    async fn call(&self, ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let listing = self.0;
        let workspace = ctx.workspace()?;

        // Compile before touching the backend so bad filters fail fast
        let filter = CompiledFilter::from_json(
            args.get("filters").unwrap_or(&Value::Null),
            &listing.catalog(),
        )?;
        let include_stats = opt_bool(&args, "include_stats", true);
        let limit = match args.get("limit").filter(|v| !v.is_null()) {
            None => None,
            Some(v) => match v.as_u64().filter(|n| *n > 0) {
                Some(n) => Some(n as usize),
                None => {
                    return Err(
                        AgentError::validation("limit must be a positive integer").into()
                    )
                }
            },
        };

        let records = match listing {
            Listing::MediaPlans => ctx.backend.list_mediaplans(&workspace).await?,
            Listing::Campaigns => ctx.backend.list_campaigns(&workspace).await?,
        };

        let mut matched = filter.apply(&records);
        let total_matches = matched.len();
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        if !include_stats {
            for record in &mut matched {
                if let Value::Object(map) = record {
                    strip_stats(map);
                }
            }
        }

        tracing::debug!(
            listing = listing.key(),
            scanned = records.len(),
            total_matches,
            "listing filtered"
        );

        let mut result = Map::new();
        result.insert("count".into(), json!(matched.len()));
        result.insert("total_matches".into(), json!(total_matches));
        result.insert(listing.key().into(), Value::Array(matched));
        result.insert("filters_applied".into(), json!(filter.describe()));
        Ok(Value::Object(result))
    }
}

fn strip_stats(map: &mut Map<String, Value>) {
    map.retain(|k, _| !FieldCatalog::is_stat(k));
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::tests::{harness, plan_args};
    use crate::agent_core::errors::ErrorKind;
    use crate::agent_core::session::Session;
    use crate::agent_core::tool_router::DispatchSettings;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_workspace_binds_session() {
        let (_dir, _dispatcher, session) = harness(DispatchSettings::default()).await;
        let ws = session.workspace().unwrap();
        assert_eq!(ws.name, "Acme Media");
    }

    #[tokio::test]
    async fn test_load_workspace_argument_errors() {
        let (dir, dispatcher, _) = harness(DispatchSettings::default()).await;
        let mut session = Session::new();

        let err = dispatcher
            .dispatch(
                &mut session,
                "load_workspace",
                &json!({"workspace_path": "/x", "workspace_id": "y"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let missing = dir.path().join("missing").display().to_string();
        let err = dispatcher
            .dispatch(&mut session, "load_workspace", &json!({"workspace_path": missing}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFoundError);
        assert!(session.workspace().is_none());
    }

    #[tokio::test]
    async fn test_tools_require_workspace() {
        let (_dir, dispatcher, _) = harness(DispatchSettings::default()).await;
        let mut session = Session::new();
        for tool in ["get_workspace_info", "list_mediaplans", "list_campaigns"] {
            let err = dispatcher
                .dispatch(&mut session, tool, &json!({}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PreconditionError, "{tool}");
        }
    }

    #[tokio::test]
    async fn test_listing_with_filters_stats_and_limit() {
        let (_dir, dispatcher, mut session) = harness(DispatchSettings::default()).await;
        for (name, budget) in [("Alpha", 50_000.0), ("Beta", 150_000.0), ("Gamma", 250_000.0)] {
            dispatcher
                .dispatch(&mut session, "create_mediaplan", &plan_args(name, budget))
                .await
                .unwrap();
            dispatcher
                .dispatch(&mut session, "save_mediaplan", &json!({}))
                .await
                .unwrap();
        }

        let all = dispatcher
            .dispatch(&mut session, "list_mediaplans", &json!({}))
            .await
            .unwrap();
        assert_eq!(all["count"], 3);
        assert!(all["media_plans"][0].get("stat_total_cost").is_some());

        let big = dispatcher
            .dispatch(
                &mut session,
                "list_mediaplans",
                &json!({
                    "filters": {"campaign_budget_total": {"min": 150000}},
                    "include_stats": false,
                    "limit": 1
                }),
            )
            .await
            .unwrap();
        assert_eq!(big["total_matches"], 2);
        assert_eq!(big["count"], 1);
        assert_eq!(big["media_plans"][0]["campaign_name"], "Beta");
        assert!(big["media_plans"][0].get("stat_total_cost").is_none());
        assert_eq!(big["filters_applied"][0], "campaign_budget_total >= 150000");

        let campaigns = dispatcher
            .dispatch(
                &mut session,
                "list_campaigns",
                &json!({"filters": {"campaign_name": {"regex": "^(Alpha|Gamma)$"}}}),
            )
            .await
            .unwrap();
        assert_eq!(campaigns["count"], 2);

        let info = dispatcher
            .dispatch(&mut session, "get_workspace_info", &json!({}))
            .await
            .unwrap();
        assert_eq!(info["media_plan_count"], 3);
        assert_eq!(info["campaign_count"], 3);
    }

    #[tokio::test]
    async fn test_bad_filters_and_limit_rejected() {
        let (_dir, dispatcher, mut session) = harness(DispatchSettings::default()).await;
        for args in [
            json!({"filters": {"no_such_field": 1}}),
            json!({"filters": {"campaign_budget_total": "lots"}}),
            json!({"filters": {"campaign_name": {"regex": "("}}}),
            json!({"limit": 0}),
        ] {
            let err = dispatcher
                .dispatch(&mut session, "list_mediaplans", &args)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "{args}");
        }

        let err = dispatcher
            .dispatch(&mut session, "list_campaigns", &json!({"filters": {"no_such_field": 1}}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Filter examples:"));
    }
}
