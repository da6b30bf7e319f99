//! Impact critique and outcome narrative.
//!
//! Two strictly sequential gateway calls: a skeptical risk assessment of the
//! proposed actions, then a forward narrative conditioned on it. The result
//! is the cycle's canonical "Outcome" message. This stage never fails: any
//! gateway error degrades to a fixed placeholder so the cycle still
//! terminates with a usable narrative.

use sim_core::{Message, MessageRole, OUTCOME_NAME};
use sim_gateway::{
    calls, CallMetadata, CritiqueRequest, InferenceObjective, LanguageModelGateway,
    NarrativeRequest,
};
use tracing::warn;

/// Narrative used when either stage fails.
pub const OUTCOME_FALLBACK: &str =
    "An unexpected issue occurred. The outcome of this cycle could not be fully assessed.";

async fn critique_then_narrative(
    gateway: &dyn LanguageModelGateway,
    situation: &str,
    actions: &[String],
    overview: &str,
    meta: &CallMetadata,
) -> Result<String, sim_gateway::GatewayError> {
    let critique = calls::impact_critique(
        gateway,
        CritiqueRequest {
            situation: situation.to_string(),
            actions: actions.to_vec(),
            overview: overview.to_string(),
        },
        &meta.with_objective(InferenceObjective::ImpactCritique),
    )
    .await?;

    calls::outcome_narrative(
        gateway,
        NarrativeRequest {
            situation: situation.to_string(),
            actions: actions.to_vec(),
            overview: overview.to_string(),
            critique,
        },
        &meta.with_objective(InferenceObjective::OutcomeNarrative),
    )
    .await
}

/// Produce the cycle's outcome message, falling back to [`OUTCOME_FALLBACK`]
/// on any gateway failure.
pub async fn simulate_outcome(
    gateway: &dyn LanguageModelGateway,
    situation: &str,
    actions: &[String],
    overview: &str,
    cycle: u32,
    meta: &CallMetadata,
) -> Message {
    let narrative = match critique_then_narrative(gateway, situation, actions, overview, meta).await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "impact pipeline failed; using placeholder outcome");
            OUTCOME_FALLBACK.to_string()
        }
    };
    Message::named(MessageRole::Simulation, OUTCOME_NAME, narrative, cycle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_gateway::scripted::ScriptedGateway;

    fn meta() -> CallMetadata {
        CallMetadata {
            trace_id: "t".into(),
            session_id: "s".into(),
            user_id: "u".into(),
            cycle: 1,
            inference_objective: InferenceObjective::ImpactCritique,
        }
    }

    #[tokio::test]
    async fn outcome_message_is_tagged_and_named() {
        let gateway = ScriptedGateway::default();
        let actions = vec!["CTO: automate the line".to_string()];
        let msg = simulate_outcome(&gateway, "price war", &actions, "overview", 4, &meta()).await;
        assert_eq!(msg.role, MessageRole::Simulation);
        assert_eq!(msg.name.as_deref(), Some(OUTCOME_NAME));
        assert_eq!(msg.cycle_number, Some(4));
        assert!(!msg.content.is_empty());
    }

    #[tokio::test]
    async fn critique_failure_falls_back() {
        let gateway = ScriptedGateway::default().failing_on(InferenceObjective::ImpactCritique);
        let msg = simulate_outcome(&gateway, "s", &[], "o", 1, &meta()).await;
        assert_eq!(msg.content, OUTCOME_FALLBACK);
    }

    #[tokio::test]
    async fn narrative_failure_falls_back() {
        let gateway = ScriptedGateway::default().failing_on(InferenceObjective::OutcomeNarrative);
        let msg = simulate_outcome(&gateway, "s", &[], "o", 1, &meta()).await;
        assert_eq!(msg.content, OUTCOME_FALLBACK);
    }
}
