//! ToolDispatcher: routes model tool calls to registered handlers.
//!
//! The dispatcher is the bridge between the LLM's tool call decisions and
//! the media-plan backend. For every call it handles:
//! - Lookup (unknown names are a `ValidationError`)
//! - Argument validation against the tool's schema
//! - The deletion confirmation gate
//! - Execution with a timeout and panic capture
//! - Translation of every fault into the `AgentError` taxonomy
//! - Recording the call on the session
//!
//! The registry is immutable after construction, so one dispatcher can be
//! shared by any number of sessions.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use serde_json::{json, Map, Value};

use crate::backend::{BackendError, MediaPlanBackend};
use crate::inference::types::{ToolCall, ToolDefinition};

use super::budget::ViolationPolicy;
use super::confirmation::{ConfirmationPolicy, DeleteDecision, Signal, SignalOutcome};
use super::errors::AgentError;
use super::filter::{self, FilterSpec};
use super::session::Session;
use super::types::{MediaPlanRef, ToolCallRecord, ToolOutcome, WorkspaceRef};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default per-dispatch timeout.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

// ─── Argument Schemas ───────────────────────────────────────────────────────

/// Accepted shape of a single argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    Array,
    Object,
    Enum(&'static [&'static str]),
    /// A filter payload in dictionary or list form.
    Filter,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    fn check(&self, value: &Value) -> Result<(), AgentError> {
        let ok = match &self.kind {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
            ParamKind::Enum(options) => value.as_str().is_some_and(|s| options.contains(&s)),
            ParamKind::Filter => {
                FilterSpec::parse_many(value).map_err(filter::with_examples)?;
                true
            }
        };
        if ok {
            return Ok(());
        }
        let expected = match &self.kind {
            ParamKind::String => "a string".to_string(),
            ParamKind::Number => "a number".to_string(),
            ParamKind::Integer => "an integer".to_string(),
            ParamKind::Boolean => "a boolean".to_string(),
            ParamKind::Date => "a date in YYYY-MM-DD format".to_string(),
            ParamKind::Array => "an array".to_string(),
            ParamKind::Object => "an object".to_string(),
            ParamKind::Enum(options) => format!("one of [{}]", options.join(", ")),
            ParamKind::Filter => "a filter object or list".to_string(),
        };
        Err(AgentError::validation(format!(
            "argument '{}' must be {expected}, got {value}",
            self.name
        )))
    }

    fn json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Date => json!({"type": "string", "format": "date"}),
            ParamKind::Array => json!({"type": "array"}),
            ParamKind::Object | ParamKind::Filter => json!({"type": "object"}),
            ParamKind::Enum(options) => json!({"type": "string", "enum": options}),
        };
        schema["description"] = Value::String(self.description.to_string());
        schema
    }
}

/// Declared arguments of a tool. Arguments not declared here are ignored.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
    params: Vec<ParamSpec>,
}

impl ArgumentSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Check object shape, required presence, types and enum membership.
    /// `null` counts as absent.
    pub fn validate(&self, args: &Value) -> Result<(), AgentError> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            Value::String(raw) => {
                return Err(AgentError::validation(format!(
                    "tool arguments are not valid JSON: {raw}"
                )))
            }
            other => {
                return Err(AgentError::validation(format!(
                    "tool arguments must be a JSON object, got {other}"
                )))
            }
        };

        for param in &self.params {
            match obj.get(param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(AgentError::validation(format!(
                            "missing required argument '{}'",
                            param.name
                        )));
                    }
                }
                Some(value) => param.check(value)?,
            }
        }
        Ok(())
    }

    /// JSON Schema for the tool's `parameters`.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ─── Tool Specs & Handlers ──────────────────────────────────────────────────

/// Marks a tool as destructive: the dispatcher consults the confirmation
/// state machine before invoking it.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationGate {
    /// Argument naming the target (e.g. `media_plan_id`).
    pub target_arg: &'static str,
    /// Boolean argument asserting the user already confirmed.
    pub confirm_arg: &'static str,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ArgumentSchema,
    pub confirmation: Option<ConfirmationGate>,
}

/// Everything a handler may touch during one call.
pub struct ToolContext<'a> {
    pub session: &'a mut Session,
    pub backend: &'a dyn MediaPlanBackend,
    pub violation_policy: ViolationPolicy,
}

impl ToolContext<'_> {
    /// The bound workspace, or a `PreconditionError`.
    pub fn workspace(&self) -> Result<WorkspaceRef, AgentError> {
        self.session.workspace().cloned().ok_or_else(|| {
            AgentError::precondition("no workspace loaded; call load_workspace first")
        })
    }

    /// The current media plan, or a `PreconditionError`.
    pub fn media_plan(&self) -> Result<&MediaPlanRef, AgentError> {
        self.session.media_plan().ok_or_else(|| {
            AgentError::precondition(
                "no media plan loaded; call create_mediaplan or load_mediaplan first",
            )
        })
    }
}

/// A tool implementation. Arguments have already passed schema validation.
///
/// Handlers may fail with any error; `AgentError` and `BackendError` keep
/// their kind, anything else becomes a `BackendError`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value>;
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Box<dyn ToolHandler>,
}

// ─── ToolDispatcher ─────────────────────────────────────────────────────────

/// Dispatch settings taken from the `agent` config section.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub tool_timeout: Duration,
    pub confirmation: ConfirmationPolicy,
    pub violation_policy: ViolationPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            confirmation: ConfirmationPolicy::default(),
            violation_policy: ViolationPolicy::default(),
        }
    }
}

pub struct ToolDispatcher {
    tools: Vec<RegisteredTool>,
    index: HashMap<&'static str, usize>,
    backend: Arc<dyn MediaPlanBackend>,
    settings: DispatchSettings,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn MediaPlanBackend>, settings: DispatchSettings) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            backend,
            settings,
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(
        &mut self,
        spec: ToolSpec,
        handler: impl ToolHandler + 'static,
    ) -> Result<(), AgentError> {
        if self.index.contains_key(spec.name) {
            return Err(AgentError::Conflict {
                reason: format!("tool '{}' is already registered", spec.name),
            });
        }
        self.index.insert(spec.name, self.tools.len());
        self.tools.push(RegisteredTool {
            spec,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Tool names in registration order.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.spec.name).collect()
    }

    /// Definitions sent to the LLM, in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| {
                ToolDefinition::function(
                    t.spec.name,
                    t.spec.description,
                    t.spec.schema.to_json_schema(),
                )
            })
            .collect()
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Dispatch a tool call from the model, keeping its call id.
    pub async fn dispatch_call(
        &self,
        session: &mut Session,
        call: &ToolCall,
    ) -> Result<Value, AgentError> {
        self.dispatch_with_id(session, call.id.clone(), &call.name, &call.arguments)
            .await
    }

    /// Validate → gate → execute → record.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, AgentError> {
        let id = format!("call_{}", uuid::Uuid::new_v4());
        self.dispatch_with_id(session, id, name, arguments).await
    }

    async fn dispatch_with_id(
        &self,
        session: &mut Session,
        id: String,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, AgentError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let result = self.run(session, name, arguments).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(payload) => {
                tracing::info!(tool = %name, elapsed_ms, "tool dispatched");
                ToolOutcome::Success {
                    payload: payload.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    tool = %name,
                    error_kind = e.kind().as_str(),
                    error = %e,
                    elapsed_ms,
                    "tool failed"
                );
                ToolOutcome::Failure {
                    kind: e.kind(),
                    detail: e.to_string(),
                }
            }
        };

        session.record_tool_call(ToolCallRecord {
            id,
            tool: name.to_string(),
            arguments: arguments.clone(),
            outcome,
            started_at,
            elapsed_ms,
        });

        result
    }

    async fn run(
        &self,
        session: &mut Session,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, AgentError> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| {
                AgentError::validation(format!(
                    "unknown tool '{name}'; available: {}",
                    self.tool_names().join(", ")
                ))
            })?;

        // Rejected calls leave the session untouched
        tool.spec.schema.validate(arguments)?;

        let policy = &self.settings.confirmation;
        policy.expire(session.confirmation_mut(), Utc::now());

        let cancelled = match tool.spec.confirmation {
            None => policy.on_unrelated_call(session.confirmation_mut()),
            Some(_) => None,
        };

        let mut confirmed = false;
        if let Some(gate) = tool.spec.confirmation {
            let target = arguments
                .get(gate.target_arg)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AgentError::validation(format!(
                        "missing required argument '{}'",
                        gate.target_arg
                    ))
                })?;
            let confirm = arguments
                .get(gate.confirm_arg)
                .and_then(Value::as_bool)
                .unwrap_or(false);

            match policy.on_delete(session.confirmation_mut(), target, confirm, Utc::now())? {
                DeleteDecision::AwaitConfirmation { target, superseded } => {
                    let mut payload = json!({
                        "status": "awaiting_confirmation",
                        "message": format!(
                            "Nothing has been deleted. Ask the user to explicitly confirm deleting '{target}'."
                        ),
                    });
                    payload[gate.target_arg] = Value::String(target);
                    if let Some(old) = superseded {
                        payload["cancelled_pending"] = Value::String(old);
                    }
                    return Ok(payload);
                }
                DeleteDecision::Execute { .. } => confirmed = true,
            }
        }

        let result = self.invoke(tool, session, arguments).await;

        if confirmed {
            policy.complete(session.confirmation_mut());
        }

        let mut payload = result?;
        if let (Some(target), Value::Object(map)) = (cancelled, &mut payload) {
            map.insert("cancelled_pending_deletion".into(), Value::String(target));
        }
        Ok(payload)
    }

    /// Run the handler under the timeout, normalizing every failure.
    async fn invoke(
        &self,
        tool: &RegisteredTool,
        session: &mut Session,
        arguments: &Value,
    ) -> Result<Value, AgentError> {
        let ctx = ToolContext {
            session,
            backend: self.backend.as_ref(),
            violation_policy: self.settings.violation_policy,
        };
        let call = AssertUnwindSafe(tool.handler.call(ctx, arguments.clone())).catch_unwind();

        match tokio::time::timeout(self.settings.tool_timeout, call).await {
            Err(_) => Err(AgentError::backend(format!(
                "tool '{}' timed out after {}s",
                tool.spec.name,
                self.settings.tool_timeout.as_secs()
            ))),
            Ok(Err(panic)) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = %tool.spec.name, panic = %msg, "tool handler panicked");
                Err(AgentError::backend(format!(
                    "tool '{}' failed unexpectedly: {msg}",
                    tool.spec.name
                )))
            }
            Ok(Ok(Err(e))) => Err(normalize_error(e)),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    // ─── Confirmation ───────────────────────────────────────────────────

    /// Deliver the user's explicit answer to a pending deletion.
    pub fn resolve_confirmation(
        &self,
        session: &mut Session,
        signal: Signal,
    ) -> Result<SignalOutcome, AgentError> {
        self.settings
            .confirmation
            .on_signal(session.confirmation_mut(), signal, Utc::now())
    }
}

/// Map a handler error into the taxonomy.
fn normalize_error(err: anyhow::Error) -> AgentError {
    let err = match err.downcast::<AgentError>() {
        Ok(agent) => return agent,
        Err(other) => other,
    };
    match err.downcast::<BackendError>() {
        Ok(backend) => backend.into(),
        Err(other) => AgentError::backend(format!("{other:#}")),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent_core::errors::ErrorKind;
    use crate::backend::{
        DeletionReceipt, MediaPlanDraft, SaveReceipt, WorkspaceConfig, WorkspaceLocator,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that refuses everything; for dispatcher tests that never
    /// reach storage.
    pub(crate) struct NullBackend;

    #[async_trait]
    impl MediaPlanBackend for NullBackend {
        async fn load_workspace(&self, _: &WorkspaceLocator) -> Result<WorkspaceRef, BackendError> {
            Err(BackendError::not_found("workspace", "any"))
        }
        async fn workspace_info(&self, _: &WorkspaceRef) -> Result<WorkspaceConfig, BackendError> {
            Err(BackendError::not_found("workspace", "any"))
        }
        async fn list_mediaplans(&self, _: &WorkspaceRef) -> Result<Vec<Value>, BackendError> {
            Ok(Vec::new())
        }
        async fn list_campaigns(&self, _: &WorkspaceRef) -> Result<Vec<Value>, BackendError> {
            Ok(Vec::new())
        }
        async fn create_mediaplan(
            &self,
            _: &WorkspaceRef,
            _: MediaPlanDraft,
        ) -> Result<MediaPlanRef, BackendError> {
            Err(BackendError::Storage {
                reason: "read-only".into(),
            })
        }
        async fn load_mediaplan(&self, _: &WorkspaceRef, id: &str) -> Result<MediaPlanRef, BackendError> {
            Err(BackendError::not_found("media plan", id))
        }
        async fn save_mediaplan(
            &self,
            _: &WorkspaceRef,
            _: &MediaPlanRef,
        ) -> Result<SaveReceipt, BackendError> {
            Err(BackendError::Storage {
                reason: "read-only".into(),
            })
        }
        async fn delete_mediaplan(
            &self,
            _: &WorkspaceRef,
            id: &str,
        ) -> Result<DeletionReceipt, BackendError> {
            Ok(DeletionReceipt {
                media_plan_id: id.to_string(),
                location: "null".into(),
                deleted_line_items: 0,
            })
        }
        async fn validate_mediaplan(
            &self,
            _: &WorkspaceRef,
            _: &MediaPlanRef,
        ) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }
    }

    struct Echo(Arc<AtomicUsize>);

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"echo": args}))
        }
    }

    struct Fails(fn() -> anyhow::Error);

    #[async_trait]
    impl ToolHandler for Fails {
        async fn call(&self, _ctx: ToolContext<'_>, _args: Value) -> anyhow::Result<Value> {
            Err((self.0)())
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        async fn call(&self, _ctx: ToolContext<'_>, _args: Value) -> anyhow::Result<Value> {
            panic!("boom");
        }
    }

    struct Sleeps;

    #[async_trait]
    impl ToolHandler for Sleeps {
        async fn call(&self, _ctx: ToolContext<'_>, _args: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    fn spec(name: &'static str, params: Vec<ParamSpec>) -> ToolSpec {
        ToolSpec {
            name,
            description: "test tool",
            schema: ArgumentSchema::new(params),
            confirmation: None,
        }
    }

    fn delete_spec() -> ToolSpec {
        ToolSpec {
            name: "delete_mediaplan",
            description: "delete",
            schema: ArgumentSchema::new(vec![
                ParamSpec::required("media_plan_id", ParamKind::String, "plan"),
                ParamSpec::optional("confirm_deletion", ParamKind::Boolean, "confirmed"),
            ]),
            confirmation: Some(ConfirmationGate {
                target_arg: "media_plan_id",
                confirm_arg: "confirm_deletion",
            }),
        }
    }

    fn dispatcher(settings: DispatchSettings) -> (ToolDispatcher, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let echo_calls = Arc::new(AtomicUsize::new(0));
        let delete_calls = Arc::new(AtomicUsize::new(0));
        let mut d = ToolDispatcher::new(Arc::new(NullBackend), settings);
        d.register(
            spec(
                "echo",
                vec![
                    ParamSpec::required("name", ParamKind::String, "a name"),
                    ParamSpec::optional("count", ParamKind::Integer, "a count"),
                    ParamSpec::optional("when", ParamKind::Date, "a date"),
                    ParamSpec::optional("objective", ParamKind::Enum(&["awareness", "conversion"]), "enum"),
                    ParamSpec::optional("filters", ParamKind::Filter, "filters"),
                ],
            ),
            Echo(echo_calls.clone()),
        )
        .unwrap();
        d.register(delete_spec(), Echo(delete_calls.clone())).unwrap();
        (d, echo_calls, delete_calls)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_validation_error() {
        let (d, _, _) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        let err = d.dispatch(&mut session, "nope", &json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(session.tool_calls().len(), 1);
        assert!(!session.tool_calls()[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_schema_violations_never_reach_handler() {
        let (d, echo, _) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        for bad in [
            json!("not an object"),
            json!({}),
            json!({"name": null}),
            json!({"name": 7}),
            json!({"name": "x", "count": 1.5}),
            json!({"name": "x", "when": "03/01/2025"}),
            json!({"name": "x", "objective": "fame"}),
            json!({"name": "x", "filters": {"campaign_name": {"bogus": 1}}}),
        ] {
            let err = d.dispatch(&mut session, "echo", &bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "{bad}");
        }
        assert_eq!(echo.load(Ordering::SeqCst), 0);

        let ok = d
            .dispatch(
                &mut session,
                "echo",
                &json!({"name": "x", "count": 3, "when": "2025-03-01", "objective": "awareness", "extra": true}),
            )
            .await
            .unwrap();
        assert_eq!(ok["echo"]["name"], "x");
        assert_eq!(echo.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_errors_are_normalized() {
        let mut d = ToolDispatcher::new(Arc::new(NullBackend), DispatchSettings::default());
        d.register(spec("agent", vec![]), Fails(|| anyhow::Error::new(AgentError::Conflict { reason: "dup".into() })))
            .unwrap();
        d.register(spec("backend", vec![]), Fails(|| anyhow::Error::new(BackendError::not_found("media plan", "x"))))
            .unwrap();
        d.register(spec("other", vec![]), Fails(|| anyhow::anyhow!("disk on fire")))
            .unwrap();
        d.register(spec("panics", vec![]), Panics).unwrap();

        let mut session = Session::new();
        let kinds = [
            ("agent", ErrorKind::ConflictError),
            ("backend", ErrorKind::NotFoundError),
            ("other", ErrorKind::BackendError),
            ("panics", ErrorKind::BackendError),
        ];
        for (name, kind) in kinds {
            let err = d.dispatch(&mut session, name, &json!({})).await.unwrap_err();
            assert_eq!(err.kind(), kind, "{name}");
        }
        assert_eq!(session.tool_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_is_backend_error() {
        let settings = DispatchSettings {
            tool_timeout: Duration::from_millis(20),
            ..DispatchSettings::default()
        };
        let mut d = ToolDispatcher::new(Arc::new(NullBackend), settings);
        d.register(spec("slow", vec![]), Sleeps).unwrap();
        let mut session = Session::new();
        let err = d.dispatch(&mut session, "slow", &json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_confirmed_delete_requires_prior_intent() {
        let (d, _, deletes) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        let args = json!({"media_plan_id": "mp_x", "confirm_deletion": true});

        let err = d.dispatch(&mut session, "delete_mediaplan", &args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfirmationRequiredError);

        let pending = d
            .dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": "mp_x"}))
            .await
            .unwrap();
        assert_eq!(pending["status"], "awaiting_confirmation");
        assert_eq!(pending["media_plan_id"], "mp_x");
        assert_eq!(session.pending_deletion(), Some("mp_x"));

        // Pending but not yet affirmed
        let err = d.dispatch(&mut session, "delete_mediaplan", &args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfirmationRequiredError);
        assert_eq!(deletes.load(Ordering::SeqCst), 0);

        let outcome = d.resolve_confirmation(&mut session, Signal::Affirm).unwrap();
        assert_eq!(outcome, SignalOutcome::Affirmed { target: "mp_x".into() });

        d.dispatch(&mut session, "delete_mediaplan", &args).await.unwrap();
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
        assert!(session.confirmation().is_idle());
    }

    #[tokio::test]
    async fn test_unrelated_call_cancels_pending_deletion() {
        let (d, _, deletes) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        d.dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": "mp_x"}))
            .await
            .unwrap();

        let result = d
            .dispatch(&mut session, "echo", &json!({"name": "y"}))
            .await
            .unwrap();
        assert_eq!(result["cancelled_pending_deletion"], "mp_x");
        assert!(session.confirmation().is_idle());

        let err = d.resolve_confirmation(&mut session, Signal::Affirm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionError);

        let err = d
            .dispatch(
                &mut session,
                "delete_mediaplan",
                &json!({"media_plan_id": "mp_x", "confirm_deletion": true}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfirmationRequiredError);
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_call_keeps_pending_deletion() {
        let (d, echo, deletes) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        d.dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": "mp_x"}))
            .await
            .unwrap();

        for bad in [json!({"name": 7}), json!("{not json")] {
            let err = d.dispatch(&mut session, "echo", &bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError);
            assert_eq!(session.pending_deletion(), Some("mp_x"));
        }
        let err = d
            .dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": 3}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(session.pending_deletion(), Some("mp_x"));
        assert_eq!(echo.load(Ordering::SeqCst), 0);

        d.resolve_confirmation(&mut session, Signal::Affirm).unwrap();
        d.dispatch(
            &mut session,
            "delete_mediaplan",
            &json!({"media_plan_id": "mp_x", "confirm_deletion": true}),
        )
        .await
        .unwrap();
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reject_and_other_target() {
        let (d, _, deletes) = dispatcher(DispatchSettings::default());
        let mut session = Session::new();
        d.dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": "mp_a"}))
            .await
            .unwrap();
        let switched = d
            .dispatch(&mut session, "delete_mediaplan", &json!({"media_plan_id": "mp_b"}))
            .await
            .unwrap();
        assert_eq!(switched["cancelled_pending"], "mp_a");

        d.resolve_confirmation(&mut session, Signal::Affirm).unwrap();
        let err = d
            .dispatch(
                &mut session,
                "delete_mediaplan",
                &json!({"media_plan_id": "mp_a", "confirm_deletion": true}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfirmationRequiredError);

        let outcome = d.resolve_confirmation(&mut session, Signal::Reject).unwrap();
        assert!(matches!(outcome, SignalOutcome::Cancelled { .. }));
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_definitions_in_registration_order() {
        let (d, _, _) = dispatcher(DispatchSettings::default());
        let defs = d.tool_definitions();
        assert_eq!(defs[0].function.name, "echo");
        assert_eq!(defs[1].function.name, "delete_mediaplan");
        let params = &defs[0].function.parameters;
        assert_eq!(params["required"], json!(["name"]));
        assert_eq!(params["properties"]["when"]["format"], "date");
        assert_eq!(params["properties"]["objective"]["enum"], json!(["awareness", "conversion"]));

        let mut d = d;
        let dup = d.register(delete_spec(), Panics).unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::ConflictError);
    }

    #[test]
    fn test_null_arguments_treated_as_empty() {
        let schema = ArgumentSchema::new(vec![ParamSpec::optional("x", ParamKind::String, "")]);
        assert!(schema.validate(&Value::Null).is_ok());
    }
}
