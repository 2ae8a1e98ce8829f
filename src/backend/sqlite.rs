//! SQLite-backed workspaces.
//!
//! Layout of a workspace directory:
//! - `workspace.yaml`: [`WorkspaceConfig`]
//! - `mediaplans.db`: tables `media_plans` and `line_items`
//!
//! `rusqlite` is synchronous, so every call opens its own connection inside
//! `spawn_blocking`. WAL mode plus a busy timeout lets independent sessions
//! share a workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};

use super::errors::BackendError;
use super::types::{
    DeletionReceipt, MediaPlanDraft, SaveReceipt, WorkspaceConfig, WorkspaceLocator,
    DEFAULT_SCHEMA_VERSION,
};
use super::{business_rule_violations, MediaPlanBackend};
use crate::agent_core::types::{LineItem, MediaPlanRef, Money, WorkspaceRef};

// ─── Constants ──────────────────────────────────────────────────────────────

pub const WORKSPACE_FILE: &str = "workspace.yaml";
pub const DATABASE_FILE: &str = "mediaplans.db";

/// Overrides the default workspace when `load_workspace` gets no locator.
pub const WORKSPACE_PATH_ENV: &str = "MEDIAPLAN_WORKSPACE_PATH";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── SqliteBackend ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    workspaces_dir: PathBuf,
    default_workspace: Option<PathBuf>,
}

impl SqliteBackend {
    /// `workspaces_dir` is where workspaces are looked up by id.
    pub fn new(workspaces_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspaces_dir: workspaces_dir.into(),
            default_workspace: None,
        }
    }

    pub fn with_default_workspace(mut self, path: Option<PathBuf>) -> Self {
        self.default_workspace = path;
        self
    }

    pub fn workspaces_dir(&self) -> &Path {
        &self.workspaces_dir
    }

    /// Create a new workspace in `dir` (which may already exist but must not
    /// contain a workspace).
    pub fn init_workspace(dir: &Path, name: &str) -> Result<WorkspaceRef, BackendError> {
        if name.trim().is_empty() {
            return Err(BackendError::Invalid {
                reason: "workspace name is empty".into(),
            });
        }
        let config_path = dir.join(WORKSPACE_FILE);
        if config_path.exists() {
            return Err(BackendError::Conflict {
                reason: format!("a workspace already exists at {}", dir.display()),
            });
        }
        std::fs::create_dir_all(dir)?;

        let short = uuid::Uuid::new_v4().simple().to_string();
        let config = WorkspaceConfig {
            workspace_id: format!("workspace_{}", &short[..8]),
            workspace_name: name.to_string(),
            environment: "development".into(),
            workspace_status: "active".into(),
            description: None,
            schema_version: DEFAULT_SCHEMA_VERSION.into(),
            created_at: Some(Utc::now()),
        };
        std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;
        open_db(dir)?;

        tracing::info!(
            workspace_id = %config.workspace_id,
            root = %dir.display(),
            "workspace initialized"
        );

        Ok(WorkspaceRef {
            id: config.workspace_id,
            name: config.workspace_name,
            root: dir.to_path_buf(),
        })
    }

    fn resolve_root(&self, locator: &WorkspaceLocator) -> Result<PathBuf, BackendError> {
        match locator {
            WorkspaceLocator::Path(path) => {
                let is_yaml = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml");
                let root = if is_yaml {
                    path.parent().map(Path::to_path_buf).unwrap_or_default()
                } else {
                    path.clone()
                };
                if root.join(WORKSPACE_FILE).is_file() {
                    Ok(root)
                } else {
                    Err(BackendError::not_found("workspace", path.display().to_string()))
                }
            }
            WorkspaceLocator::Id(id) => {
                if id.is_empty()
                    || !id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(BackendError::Invalid {
                        reason: format!("malformed workspace id '{id}'"),
                    });
                }
                let direct = self.workspaces_dir.join(id);
                if direct.join(WORKSPACE_FILE).is_file() {
                    return Ok(direct);
                }
                let entries = match std::fs::read_dir(&self.workspaces_dir) {
                    Ok(entries) => entries,
                    Err(_) => return Err(BackendError::not_found("workspace", id.clone())),
                };
                for entry in entries.flatten() {
                    let root = entry.path();
                    if let Ok(config) = read_config(&root) {
                        if &config.workspace_id == id {
                            return Ok(root);
                        }
                    }
                }
                Err(BackendError::not_found("workspace", id.clone()))
            }
            WorkspaceLocator::Default => {
                if let Some(path) = std::env::var(WORKSPACE_PATH_ENV)
                    .ok()
                    .filter(|p| !p.trim().is_empty())
                {
                    return self.resolve_root(&WorkspaceLocator::Path(PathBuf::from(path)));
                }
                match &self.default_workspace {
                    Some(path) => self.resolve_root(&WorkspaceLocator::Path(path.clone())),
                    None => Err(BackendError::not_found("workspace", "default")),
                }
            }
        }
    }
}

/// Run blocking storage work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, BackendError>
where
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::Storage {
            reason: format!("storage task failed: {e}"),
        })?
}

// ─── Storage helpers ────────────────────────────────────────────────────────

fn read_config(root: &Path) -> Result<WorkspaceConfig, BackendError> {
    let raw = std::fs::read_to_string(root.join(WORKSPACE_FILE))?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Open (or create) the workspace database.
fn open_db(root: &Path) -> Result<Connection, BackendError> {
    let conn = Connection::open(root.join(DATABASE_FILE))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_tables(&conn)?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> Result<(), BackendError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS media_plans (
            id TEXT PRIMARY KEY,
            schema_version TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            comments TEXT,
            campaign_id TEXT NOT NULL,
            campaign_name TEXT NOT NULL,
            campaign_objective TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            budget_cents INTEGER NOT NULL,
            product_name TEXT,
            product_description TEXT,
            audience_name TEXT
        );

        CREATE TABLE IF NOT EXISTS line_items (
            id TEXT NOT NULL,
            media_plan_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            channel TEXT NOT NULL,
            vehicle TEXT NOT NULL,
            partner TEXT,
            kpi TEXT,
            cost_cents INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            PRIMARY KEY (media_plan_id, id),
            FOREIGN KEY (media_plan_id) REFERENCES media_plans(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_line_items_plan
            ON line_items(media_plan_id, position);
        ",
    )?;
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate, BackendError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| BackendError::Storage {
        reason: format!("corrupt date '{s}': {e}"),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BackendError::Storage {
            reason: format!("corrupt timestamp '{s}': {e}"),
        })
}

fn db_location(root: &Path, media_plan_id: &str) -> String {
    format!("{}#media_plans/{media_plan_id}", root.join(DATABASE_FILE).display())
}

/// Raw `media_plans` row.
struct PlanRow {
    id: String,
    schema_version: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    comments: Option<String>,
    campaign_id: String,
    campaign_name: String,
    campaign_objective: String,
    start_date: String,
    end_date: String,
    budget_cents: i64,
    product_name: Option<String>,
    product_description: Option<String>,
    audience_name: Option<String>,
}

const PLAN_COLUMNS: &str = "p.id, p.schema_version, p.created_by, p.created_at, p.updated_at, \
     p.comments, p.campaign_id, p.campaign_name, p.campaign_objective, p.start_date, \
     p.end_date, p.budget_cents, p.product_name, p.product_description, p.audience_name";

fn plan_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlanRow> {
    Ok(PlanRow {
        id: row.get(0)?,
        schema_version: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        comments: row.get(5)?,
        campaign_id: row.get(6)?,
        campaign_name: row.get(7)?,
        campaign_objective: row.get(8)?,
        start_date: row.get(9)?,
        end_date: row.get(10)?,
        budget_cents: row.get(11)?,
        product_name: row.get(12)?,
        product_description: row.get(13)?,
        audience_name: row.get(14)?,
    })
}

/// Per-plan aggregates from `line_items`.
struct PlanStats {
    lineitem_count: i64,
    total_cost_cents: i64,
    distinct_channels: i64,
    distinct_vehicles: i64,
    min_start: Option<String>,
    max_end: Option<String>,
}

fn list_plan_rows(conn: &Connection) -> Result<Vec<(PlanRow, PlanStats)>, BackendError> {
    let sql = format!(
        "SELECT {PLAN_COLUMNS},
                COUNT(li.id), COALESCE(SUM(li.cost_cents), 0),
                COUNT(DISTINCT li.channel), COUNT(DISTINCT li.vehicle),
                MIN(li.start_date), MAX(li.end_date)
         FROM media_plans p
         LEFT JOIN line_items li ON li.media_plan_id = p.id
         GROUP BY p.id
         ORDER BY p.created_at, p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            plan_row(row)?,
            PlanStats {
                lineitem_count: row.get(15)?,
                total_cost_cents: row.get(16)?,
                distinct_channels: row.get(17)?,
                distinct_vehicles: row.get(18)?,
                min_start: row.get(19)?,
                max_end: row.get(20)?,
            },
        ))
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn plan_record(p: &PlanRow, stats: &PlanStats) -> Value {
    let budget = Money::from_cents(p.budget_cents);
    let total = Money::from_cents(stats.total_cost_cents);
    let remaining = if total > budget {
        Money::ZERO
    } else {
        budget - total
    };
    json!({
        "meta_id": p.id,
        "meta_schema_version": p.schema_version,
        "meta_created_by_name": p.created_by,
        "meta_created_at": p.created_at,
        "meta_comments": p.comments,
        "campaign_id": p.campaign_id,
        "campaign_name": p.campaign_name,
        "campaign_objective": p.campaign_objective,
        "campaign_start_date": p.start_date,
        "campaign_end_date": p.end_date,
        "campaign_budget_total": budget.as_units(),
        "campaign_product_name": p.product_name,
        "campaign_product_description": p.product_description,
        "campaign_audience_name": p.audience_name,
        "stat_lineitem_count": stats.lineitem_count,
        "stat_total_cost": total.as_units(),
        "stat_remaining_budget": remaining.as_units(),
        "stat_distinct_channel_count": stats.distinct_channels,
        "stat_distinct_vehicle_count": stats.distinct_vehicles,
        "stat_min_start_date": stats.min_start,
        "stat_max_end_date": stats.max_end,
    })
}

/// Roll plans up to one record per campaign, in order of first appearance.
/// Campaign fields come from the most recently updated plan.
fn campaign_records(rows: &[(PlanRow, PlanStats)]) -> Vec<Value> {
    struct Acc<'a> {
        latest: &'a PlanRow,
        plans: i64,
        lineitems: i64,
        cost_cents: i64,
    }

    let mut order: Vec<&str> = Vec::new();
    let mut by_campaign: HashMap<&str, Acc<'_>> = HashMap::new();

    for (plan, stats) in rows {
        let acc = by_campaign
            .entry(plan.campaign_id.as_str())
            .or_insert_with(|| {
                order.push(plan.campaign_id.as_str());
                Acc {
                    latest: plan,
                    plans: 0,
                    lineitems: 0,
                    cost_cents: 0,
                }
            });
        if plan.updated_at >= acc.latest.updated_at {
            acc.latest = plan;
        }
        acc.plans += 1;
        acc.lineitems += stats.lineitem_count;
        acc.cost_cents += stats.total_cost_cents;
    }

    order
        .into_iter()
        .filter_map(|id| by_campaign.get(id))
        .map(|acc| {
            let p = acc.latest;
            json!({
                "campaign_id": p.campaign_id,
                "campaign_name": p.campaign_name,
                "campaign_objective": p.campaign_objective,
                "campaign_start_date": p.start_date,
                "campaign_end_date": p.end_date,
                "campaign_budget_total": Money::from_cents(p.budget_cents).as_units(),
                "campaign_product_name": p.product_name,
                "campaign_audience_name": p.audience_name,
                "stat_media_plan_count": acc.plans,
                "stat_lineitem_count": acc.lineitems,
                "stat_total_cost": Money::from_cents(acc.cost_cents).as_units(),
                "stat_last_updated": p.updated_at,
            })
        })
        .collect()
}

fn load_plan(conn: &Connection, media_plan_id: &str) -> Result<MediaPlanRef, BackendError> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM media_plans p WHERE p.id = ?1");
    let row = conn
        .query_row(&sql, params![media_plan_id], plan_row)
        .optional()?
        .ok_or_else(|| BackendError::not_found("media plan", media_plan_id))?;

    let mut stmt = conn.prepare(
        "SELECT id, name, channel, vehicle, partner, kpi, cost_cents, start_date, end_date
         FROM line_items WHERE media_plan_id = ?1 ORDER BY position",
    )?;
    let raw_items = stmt.query_map(params![media_plan_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, i64>(6)?,
            r.get::<_, String>(7)?,
            r.get::<_, String>(8)?,
        ))
    })?;

    let mut line_items = Vec::new();
    for item in raw_items {
        let (id, name, channel, vehicle, partner, kpi, cost, start, end) = item?;
        line_items.push(LineItem {
            id,
            name,
            channel,
            vehicle,
            partner,
            kpi,
            cost: Money::from_cents(cost),
            start_date: parse_date(&start)?,
            end_date: parse_date(&end)?,
        });
    }

    Ok(MediaPlanRef {
        start_date: parse_date(&row.start_date)?,
        end_date: parse_date(&row.end_date)?,
        created_at: parse_timestamp(&row.created_at)?,
        id: row.id,
        campaign_id: row.campaign_id,
        campaign_name: row.campaign_name,
        campaign_objective: row.campaign_objective,
        product_name: row.product_name,
        product_description: row.product_description,
        target_audience_name: row.audience_name,
        total_budget: Money::from_cents(row.budget_cents),
        created_by: row.created_by,
        comments: row.comments,
        schema_version: row.schema_version,
        line_items,
    })
}

fn save_plan(conn: &mut Connection, plan: &MediaPlanRef, now: DateTime<Utc>) -> Result<(), BackendError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO media_plans (
            id, schema_version, created_by, created_at, updated_at, comments,
            campaign_id, campaign_name, campaign_objective, start_date, end_date,
            budget_cents, product_name, product_description, audience_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
            schema_version = excluded.schema_version,
            updated_at = excluded.updated_at,
            comments = excluded.comments,
            campaign_id = excluded.campaign_id,
            campaign_name = excluded.campaign_name,
            campaign_objective = excluded.campaign_objective,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            budget_cents = excluded.budget_cents,
            product_name = excluded.product_name,
            product_description = excluded.product_description,
            audience_name = excluded.audience_name",
        params![
            plan.id,
            plan.schema_version,
            plan.created_by,
            plan.created_at.to_rfc3339(),
            now.to_rfc3339(),
            plan.comments,
            plan.campaign_id,
            plan.campaign_name,
            plan.campaign_objective,
            plan.start_date.to_string(),
            plan.end_date.to_string(),
            plan.total_budget.cents(),
            plan.product_name,
            plan.product_description,
            plan.target_audience_name,
        ],
    )?;
    tx.execute(
        "DELETE FROM line_items WHERE media_plan_id = ?1",
        params![plan.id],
    )?;
    for (position, li) in plan.line_items.iter().enumerate() {
        tx.execute(
            "INSERT INTO line_items (
                id, media_plan_id, position, name, channel, vehicle, partner, kpi,
                cost_cents, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                li.id,
                plan.id,
                position as i64,
                li.name,
                li.channel,
                li.vehicle,
                li.partner,
                li.kpi,
                li.cost.cents(),
                li.start_date.to_string(),
                li.end_date.to_string(),
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ─── MediaPlanBackend ───────────────────────────────────────────────────────

#[async_trait]
impl MediaPlanBackend for SqliteBackend {
    async fn load_workspace(
        &self,
        locator: &WorkspaceLocator,
    ) -> Result<WorkspaceRef, BackendError> {
        let this = self.clone();
        let locator = locator.clone();
        blocking(move || {
            let root = this.resolve_root(&locator)?;
            let config = read_config(&root)?;
            open_db(&root)?;
            tracing::info!(
                workspace_id = %config.workspace_id,
                root = %root.display(),
                "workspace loaded"
            );
            Ok(WorkspaceRef {
                id: config.workspace_id,
                name: config.workspace_name,
                root,
            })
        })
        .await
    }

    async fn workspace_info(
        &self,
        workspace: &WorkspaceRef,
    ) -> Result<WorkspaceConfig, BackendError> {
        let root = workspace.root.clone();
        blocking(move || read_config(&root)).await
    }

    async fn list_mediaplans(&self, workspace: &WorkspaceRef) -> Result<Vec<Value>, BackendError> {
        let root = workspace.root.clone();
        blocking(move || {
            let conn = open_db(&root)?;
            let rows = list_plan_rows(&conn)?;
            Ok(rows.iter().map(|(p, s)| plan_record(p, s)).collect())
        })
        .await
    }

    async fn list_campaigns(&self, workspace: &WorkspaceRef) -> Result<Vec<Value>, BackendError> {
        let root = workspace.root.clone();
        blocking(move || {
            let conn = open_db(&root)?;
            let rows = list_plan_rows(&conn)?;
            Ok(campaign_records(&rows))
        })
        .await
    }

    async fn create_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        draft: MediaPlanDraft,
    ) -> Result<MediaPlanRef, BackendError> {
        let root = workspace.root.clone();
        let config = blocking(move || read_config(&root)).await?;

        let plan_suffix = uuid::Uuid::new_v4().simple().to_string();
        let campaign_suffix = uuid::Uuid::new_v4().simple().to_string();
        let plan = MediaPlanRef {
            id: format!("mediaplan_{}", &plan_suffix[..8]),
            campaign_id: format!("campaign_{}", &campaign_suffix[..8]),
            campaign_name: draft.campaign_name,
            campaign_objective: draft.campaign_objective,
            product_name: draft.product_name,
            product_description: draft.product_description,
            target_audience_name: draft.target_audience_name,
            start_date: draft.start_date,
            end_date: draft.end_date,
            total_budget: draft.total_budget,
            created_by: draft.created_by,
            created_at: Utc::now(),
            comments: None,
            schema_version: config.schema_version,
            line_items: Vec::new(),
        };

        let errors = business_rule_violations(&plan);
        if !errors.is_empty() {
            return Err(BackendError::Invalid {
                reason: errors.join("; "),
            });
        }
        Ok(plan)
    }

    async fn load_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        media_plan_id: &str,
    ) -> Result<MediaPlanRef, BackendError> {
        let root = workspace.root.clone();
        let id = media_plan_id.to_string();
        blocking(move || {
            let conn = open_db(&root)?;
            load_plan(&conn, &id)
        })
        .await
    }

    async fn save_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        plan: &MediaPlanRef,
    ) -> Result<SaveReceipt, BackendError> {
        let root = workspace.root.clone();
        let plan = plan.clone();
        blocking(move || {
            let mut conn = open_db(&root)?;
            let now = Utc::now();
            save_plan(&mut conn, &plan, now)?;
            tracing::info!(
                media_plan_id = %plan.id,
                line_items = plan.line_items.len(),
                "media plan saved"
            );
            Ok(SaveReceipt {
                location: db_location(&root, &plan.id),
                media_plan_id: plan.id,
                saved_at: now,
                line_items: plan.line_items.len(),
            })
        })
        .await
    }

    async fn delete_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        media_plan_id: &str,
    ) -> Result<DeletionReceipt, BackendError> {
        let root = workspace.root.clone();
        let id = media_plan_id.to_string();
        blocking(move || {
            let mut conn = open_db(&root)?;
            let tx = conn.transaction()?;
            let deleted_line_items =
                tx.execute("DELETE FROM line_items WHERE media_plan_id = ?1", params![id])?;
            let deleted = tx.execute("DELETE FROM media_plans WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(BackendError::not_found("media plan", id));
            }
            tx.commit()?;
            tracing::info!(media_plan_id = %id, deleted_line_items, "media plan deleted");
            Ok(DeletionReceipt {
                location: db_location(&root, &id),
                media_plan_id: id,
                deleted_line_items,
            })
        })
        .await
    }

    async fn validate_mediaplan(
        &self,
        workspace: &WorkspaceRef,
        plan: &MediaPlanRef,
    ) -> Result<Vec<String>, BackendError> {
        let root = workspace.root.clone();
        let config = blocking(move || read_config(&root)).await?;

        let mut errors = Vec::new();
        if plan.schema_version != config.schema_version {
            errors.push(format!(
                "schema version '{}' does not match workspace schema '{}'",
                plan.schema_version, config.schema_version
            ));
        }
        errors.extend(business_rule_violations(plan));
        Ok(errors)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::budget::tests::{date, line_item};

    fn draft(name: &str, budget: f64) -> MediaPlanDraft {
        MediaPlanDraft {
            campaign_name: name.into(),
            campaign_objective: "awareness".into(),
            start_date: date("2025-03-01"),
            end_date: date("2025-05-31"),
            total_budget: Money::from_units(budget).unwrap(),
            created_by: "planner@example.com".into(),
            product_name: Some("Cold Brew".into()),
            product_description: None,
            target_audience_name: Some("Commuters".into()),
        }
    }

    async fn setup() -> (tempfile::TempDir, SqliteBackend, WorkspaceRef) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("acme");
        SqliteBackend::init_workspace(&root, "Acme").unwrap();
        let backend = SqliteBackend::new(dir.path());
        let ws = backend
            .load_workspace(&WorkspaceLocator::Path(root))
            .await
            .unwrap();
        (dir, backend, ws)
    }

    #[tokio::test]
    async fn test_init_and_load_by_path_and_id() {
        let (dir, backend, ws) = setup().await;
        assert_eq!(ws.name, "Acme");

        let by_id = backend
            .load_workspace(&WorkspaceLocator::Id(ws.id.clone()))
            .await
            .unwrap();
        assert_eq!(by_id, ws);

        let by_yaml = backend
            .load_workspace(&WorkspaceLocator::Path(ws.root.join(WORKSPACE_FILE)))
            .await
            .unwrap();
        assert_eq!(by_yaml.id, ws.id);

        let err = SqliteBackend::init_workspace(&dir.path().join("acme"), "Again").unwrap_err();
        assert!(matches!(err, BackendError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_workspace_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path());
        let err = backend
            .load_workspace(&WorkspaceLocator::Id("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));

        let err = backend
            .load_workspace(&WorkspaceLocator::Id("../etc".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Invalid { .. }));

        let err = backend
            .load_workspace(&WorkspaceLocator::Path(dir.path().join("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_default_workspace() {
        let (_dir, backend, ws) = setup().await;
        let backend = backend.with_default_workspace(Some(ws.root.clone()));
        if std::env::var(WORKSPACE_PATH_ENV).is_err() {
            let loaded = backend
                .load_workspace(&WorkspaceLocator::Default)
                .await
                .unwrap();
            assert_eq!(loaded.id, ws.id);
        }
    }

    #[tokio::test]
    async fn test_create_save_load_round_trip() {
        let (_dir, backend, ws) = setup().await;
        let mut plan = backend
            .create_mediaplan(&ws, draft("Spring Launch", 50_000.0))
            .await
            .unwrap();
        assert!(plan.id.starts_with("mediaplan_"));
        assert_eq!(plan.schema_version, DEFAULT_SCHEMA_VERSION);

        // Not persisted until saved
        let err = backend.load_mediaplan(&ws, &plan.id).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));

        plan.line_items.push(line_item("li_b", 20_000.0));
        plan.line_items.push(line_item("li_a", 10_000.0));
        plan.comments = Some("Context: test".into());
        let receipt = backend.save_mediaplan(&ws, &plan).await.unwrap();
        assert_eq!(receipt.line_items, 2);
        assert!(receipt.location.contains(DATABASE_FILE));

        let loaded = backend.load_mediaplan(&ws, &plan.id).await.unwrap();
        assert_eq!(loaded.line_items, plan.line_items);
        assert_eq!(loaded.total_budget, plan.total_budget);
        assert_eq!(loaded.comments.as_deref(), Some("Context: test"));

        // Saving again replaces line items
        plan.line_items.pop();
        backend.save_mediaplan(&ws, &plan).await.unwrap();
        let loaded = backend.load_mediaplan(&ws, &plan.id).await.unwrap();
        assert_eq!(loaded.line_items.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_draft() {
        let (_dir, backend, ws) = setup().await;
        let mut d = draft("Bad", 0.0);
        d.end_date = date("2025-01-01");
        let err = backend.create_mediaplan(&ws, d).await.unwrap_err();
        assert!(matches!(err, BackendError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_listings_and_stats() {
        let (_dir, backend, ws) = setup().await;
        let mut a = backend
            .create_mediaplan(&ws, draft("Alpha", 50_000.0))
            .await
            .unwrap();
        a.line_items.push(line_item("li_1", 20_000.0));
        a.line_items.push(line_item("li_2", 5_000.5));
        backend.save_mediaplan(&ws, &a).await.unwrap();

        let b = backend
            .create_mediaplan(&ws, draft("Beta", 150_000.0))
            .await
            .unwrap();
        backend.save_mediaplan(&ws, &b).await.unwrap();

        let plans = backend.list_mediaplans(&ws).await.unwrap();
        assert_eq!(plans.len(), 2);
        let alpha = plans.iter().find(|p| p["meta_id"] == a.id.as_str()).unwrap();
        assert_eq!(alpha["stat_lineitem_count"], 2);
        assert_eq!(alpha["stat_total_cost"], 25_000.5);
        assert_eq!(alpha["stat_remaining_budget"], 24_999.5);
        assert_eq!(alpha["stat_distinct_channel_count"], 1);
        let beta = plans.iter().find(|p| p["meta_id"] == b.id.as_str()).unwrap();
        assert_eq!(beta["stat_lineitem_count"], 0);
        assert!(beta["stat_min_start_date"].is_null());

        let campaigns = backend.list_campaigns(&ws).await.unwrap();
        assert_eq!(campaigns.len(), 2);
        assert!(campaigns.iter().all(|c| c["stat_media_plan_count"] == 1));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, backend, ws) = setup().await;
        let mut plan = backend
            .create_mediaplan(&ws, draft("Gone", 1_000.0))
            .await
            .unwrap();
        plan.line_items.push(line_item("li_1", 100.0));
        backend.save_mediaplan(&ws, &plan).await.unwrap();

        let receipt = backend.delete_mediaplan(&ws, &plan.id).await.unwrap();
        assert_eq!(receipt.deleted_line_items, 1);
        assert!(backend.list_mediaplans(&ws).await.unwrap().is_empty());

        let err = backend.delete_mediaplan(&ws, &plan.id).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_reports_schema_mismatch() {
        let (_dir, backend, ws) = setup().await;
        let mut plan = backend
            .create_mediaplan(&ws, draft("Check", 1_000.0))
            .await
            .unwrap();
        assert!(backend.validate_mediaplan(&ws, &plan).await.unwrap().is_empty());

        plan.schema_version = "v0.9".into();
        let errors = backend.validate_mediaplan(&ws, &plan).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("schema version"));
    }
}
