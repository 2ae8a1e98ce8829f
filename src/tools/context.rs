//! Strategic context tool: planning notes gathered during consultation.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_router::{
    ArgumentSchema, ParamKind, ParamSpec, ToolContext, ToolDispatcher, ToolHandler, ToolSpec,
};

pub(super) fn register(dispatcher: &mut ToolDispatcher) -> Result<(), AgentError> {
    dispatcher.register(
        ToolSpec {
            name: "update_strategic_context",
            description: "Record planning notes from the conversation. Keys: business_context, \
                          objectives, target_audience, budget_info, timeline, \
                          channel_preferences, constraints, success_metrics, \
                          industry_context, competitive_context. List keys accumulate.",
            schema: ArgumentSchema::new(vec![ParamSpec::required(
                "notes",
                ParamKind::Object,
                "Object mapping context key to its value",
            )]),
            confirmation: None,
        },
        UpdateStrategicContext,
    )
}

struct UpdateStrategicContext;

#[async_trait]
impl ToolHandler for UpdateStrategicContext {
    async fn call(&self, mut ctx: ToolContext<'_>, args: Value) -> anyhow::Result<Value> {
        let Some(notes) = args.get("notes").and_then(Value::as_object) else {
            return Err(AgentError::validation("argument 'notes' must be an object").into());
        };
        if notes.is_empty() {
            return Err(AgentError::validation("notes must not be empty").into());
        }

        ctx.session.note_strategic_notes(notes)?;

        tracing::debug!(keys = notes.len(), "strategic context updated");

        Ok(json!({
            "strategic_context": ctx.session.strategic_context(),
            "summary": ctx.session.strategic_summary(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::harness;
    use crate::agent_core::errors::ErrorKind;
    use crate::agent_core::tool_router::DispatchSettings;
    use serde_json::json;

    #[tokio::test]
    async fn test_notes_merge_across_calls() {
        let (_dir, dispatcher, mut session) = harness(DispatchSettings::default()).await;
        dispatcher
            .dispatch(
                &mut session,
                "update_strategic_context",
                &json!({"notes": {
                    "business_context": "Regional coffee chain entering new cities",
                    "objectives": ["Awareness"],
                }}),
            )
            .await
            .unwrap();
        let result = dispatcher
            .dispatch(
                &mut session,
                "update_strategic_context",
                &json!({"notes": {"objectives": ["Trial", "Awareness"], "target_audience": "Commuters"}}),
            )
            .await
            .unwrap();

        assert_eq!(
            result["strategic_context"]["objectives"],
            json!(["Awareness", "Trial"])
        );
        let summary = result["summary"].as_str().unwrap();
        assert!(summary.starts_with("Context: Regional coffee chain"));
        assert!(summary.contains("Audience: Commuters"));
    }

    #[tokio::test]
    async fn test_unknown_key_leaves_context_untouched() {
        let (_dir, dispatcher, mut session) = harness(DispatchSettings::default()).await;
        let err = dispatcher
            .dispatch(
                &mut session,
                "update_strategic_context",
                &json!({"notes": {"objectives": ["Awareness"], "horoscope": "Leo"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(session.strategic_context().is_none());

        let err = dispatcher
            .dispatch(&mut session, "update_strategic_context", &json!({"notes": {}}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
