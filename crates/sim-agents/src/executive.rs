//! Executive decision workflow.
//!
//! Five steps: the CEO deliberates and delegates, then the four officers act
//! on their assignments. Routing is a pure function over the completed set;
//! each role runs exactly once per cycle, and duplicate emissions are
//! suppressed by identity before anything reaches the stream. The officer
//! steps have no data dependency on each other and run concurrently, but
//! their messages are emitted in the fixed CTO, CFO, CMO, COO order.

use sim_core::{CeoDecision, Message, MessageRole, OfficerRole, CEO_NAME};
use sim_gateway::{
    calls, CallMetadata, CeoRequest, GatewayError, InferenceObjective, LanguageModelGateway,
    OfficerRequest,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// One step of the workflow, used as the completion-set element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentStep {
    Ceo,
    Officer(OfficerRole),
}

/// Pure routing function: CEO first, then each officer not yet completed in
/// stable order, then done.
pub fn route(completed: &BTreeSet<AgentStep>) -> Option<AgentStep> {
    if !completed.contains(&AgentStep::Ceo) {
        return Some(AgentStep::Ceo);
    }
    OfficerRole::ALL
        .into_iter()
        .map(AgentStep::Officer)
        .find(|step| !completed.contains(step))
}

/// Everything the deliberation produced for downstream stages.
#[derive(Clone, Debug)]
pub struct ExecutiveOutcome {
    /// Validated CEO decision.
    pub decision: CeoDecision,
    /// Exactly five messages: CEO first, then CTO, CFO, CMO, COO.
    pub messages: Vec<Message>,
    /// Non-empty officer contributions, formatted as "ROLE: action".
    pub actions: Vec<String>,
}

/// Inputs shared by every step of one workflow run.
#[derive(Clone, Copy, Debug)]
pub struct WorkflowInput<'a> {
    pub situation: &'a str,
    pub advice: &'a str,
    pub overview: &'a str,
    pub transcript: &'a [Message],
    pub cycle: u32,
}

/// Append `message` unless an identical (name, content) pair was already
/// emitted this run.
pub(crate) fn dedup_push(
    messages: &mut Vec<Message>,
    seen: &mut BTreeSet<(String, String)>,
    message: Message,
) -> bool {
    let key = (
        message.name.clone().unwrap_or_default(),
        message.content.clone(),
    );
    if !seen.insert(key) {
        debug!(name = ?message.name, "suppressing duplicate workflow message");
        return false;
    }
    messages.push(message);
    true
}

async fn officer_step(
    gateway: &dyn LanguageModelGateway,
    decision: &CeoDecision,
    input: &WorkflowInput<'_>,
    role: OfficerRole,
    meta: &CallMetadata,
) -> String {
    let assignment = match decision.assignment(role).filter(|a| !a.trim().is_empty()) {
        Some(a) => a.to_string(),
        None => {
            // Missing assignment means "no action", not an error.
            debug!(%role, "no assignment; officer contributes nothing");
            return String::new();
        }
    };
    let request = OfficerRequest {
        role,
        assignment,
        overview: input.overview.to_string(),
        transcript: input.transcript.to_vec(),
    };
    match calls::officer_action(gateway, request, meta).await {
        Ok(action) => action,
        Err(e) => {
            warn!(%role, error = %e, "officer step failed; degrading to no action");
            String::new()
        }
    }
}

/// Run the full workflow. A CEO failure (transport or schema) is fatal for
/// the cycle and surfaces as the error; officer failures degrade to empty
/// contributions.
pub async fn run_executive_workflow(
    gateway: &dyn LanguageModelGateway,
    input: &WorkflowInput<'_>,
    meta: &CallMetadata,
) -> Result<ExecutiveOutcome, GatewayError> {
    let mut completed: BTreeSet<AgentStep> = BTreeSet::new();
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut messages: Vec<Message> = Vec::with_capacity(5);

    debug_assert_eq!(route(&completed), Some(AgentStep::Ceo));
    let decision = calls::ceo_decision(
        gateway,
        CeoRequest {
            situation: input.situation.to_string(),
            advice: input.advice.to_string(),
            overview: input.overview.to_string(),
            transcript: input.transcript.to_vec(),
        },
        &meta.with_objective(InferenceObjective::CeoDecision),
    )
    .await?;
    let decision_json =
        serde_json::to_string(&decision).map_err(|e| GatewayError::Schema(e.to_string()))?;
    dedup_push(
        &mut messages,
        &mut seen,
        Message::named(MessageRole::Assistant, CEO_NAME, decision_json, input.cycle),
    );
    completed.insert(AgentStep::Ceo);

    // Officers fan out concurrently; routing then fixes the emission order.
    let officer_meta = meta.with_objective(InferenceObjective::OfficerAction);
    let (cto, cfo, cmo, coo) = tokio::join!(
        officer_step(gateway, &decision, input, OfficerRole::Cto, &officer_meta),
        officer_step(gateway, &decision, input, OfficerRole::Cfo, &officer_meta),
        officer_step(gateway, &decision, input, OfficerRole::Cmo, &officer_meta),
        officer_step(gateway, &decision, input, OfficerRole::Coo, &officer_meta),
    );
    let contributions = [
        (OfficerRole::Cto, cto),
        (OfficerRole::Cfo, cfo),
        (OfficerRole::Cmo, cmo),
        (OfficerRole::Coo, coo),
    ];

    let mut actions: Vec<String> = Vec::with_capacity(4);
    while let Some(AgentStep::Officer(role)) = route(&completed) {
        let content = contributions
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, c)| c.clone())
            .unwrap_or_default();
        if !content.is_empty() {
            actions.push(format!("{role}: {content}"));
        }
        dedup_push(
            &mut messages,
            &mut seen,
            Message::named(MessageRole::Assistant, role.title(), content, input.cycle),
        );
        completed.insert(AgentStep::Officer(role));
    }

    Ok(ExecutiveOutcome {
        decision,
        messages,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_gateway::scripted::ScriptedGateway;

    fn meta() -> CallMetadata {
        CallMetadata {
            trace_id: "t-1".into(),
            session_id: "s-1".into(),
            user_id: "u-1".into(),
            cycle: 2,
            inference_objective: InferenceObjective::CeoDecision,
        }
    }

    fn input<'a>() -> WorkflowInput<'a> {
        WorkflowInput {
            situation: "a rival slashed prices",
            advice: "hold margins, differentiate",
            overview: "paperclip startup",
            transcript: &[],
            cycle: 2,
        }
    }

    #[test]
    fn routing_runs_ceo_then_officers_in_order() {
        let mut completed = BTreeSet::new();
        assert_eq!(route(&completed), Some(AgentStep::Ceo));
        completed.insert(AgentStep::Ceo);
        for role in OfficerRole::ALL {
            assert_eq!(route(&completed), Some(AgentStep::Officer(role)));
            completed.insert(AgentStep::Officer(role));
        }
        assert_eq!(route(&completed), None);
    }

    #[test]
    fn duplicate_messages_are_suppressed() {
        let mut messages = Vec::new();
        let mut seen = BTreeSet::new();
        let msg = Message::named(MessageRole::Assistant, "CTO", "ship it", 1);
        assert!(dedup_push(&mut messages, &mut seen, msg.clone()));
        assert!(!dedup_push(&mut messages, &mut seen, msg));
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn workflow_emits_five_messages_ceo_first() {
        let gateway = ScriptedGateway::default();
        let out = run_executive_workflow(&gateway, &input(), &meta())
            .await
            .unwrap();
        assert_eq!(out.messages.len(), 5);
        assert_eq!(out.messages[0].name.as_deref(), Some(CEO_NAME));
        let names: Vec<_> = out.messages[1..]
            .iter()
            .map(|m| m.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["CTO", "CFO", "CMO", "COO"]);
        assert_eq!(out.actions.len(), 4);
        assert!(out
            .messages
            .iter()
            .all(|m| m.cycle_number == Some(2) && m.role == MessageRole::Assistant));
    }

    #[tokio::test]
    async fn missing_assignment_degrades_to_no_action() {
        let gateway = ScriptedGateway::default().omitting_assignment(OfficerRole::Cmo);
        // The scripted CEO omits the CMO key entirely, which the schema
        // validator treats as fatal; bypass it by validating officer-side
        // behavior through a decision built here.
        let decision = {
            let mut d = match gateway
                .invoke(
                    sim_gateway::GatewayRequest::CeoDecision(CeoRequest {
                        situation: "s".into(),
                        advice: "a".into(),
                        overview: "o".into(),
                        transcript: vec![],
                    }),
                    &meta(),
                )
                .await
                .unwrap()
            {
                sim_gateway::GatewayResponse::CeoDecision(d) => d,
                _ => unreachable!(),
            };
            d.assignments.remove(&OfficerRole::Cmo);
            d
        };
        let content = officer_step(&gateway, &decision, &input(), OfficerRole::Cmo, &meta()).await;
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn officer_failure_is_not_fatal() {
        let gateway = ScriptedGateway::default().failing_on(InferenceObjective::OfficerAction);
        let out = run_executive_workflow(&gateway, &input(), &meta())
            .await
            .unwrap();
        assert_eq!(out.messages.len(), 5);
        assert!(out.actions.is_empty());
        assert!(out.messages[1..].iter().all(|m| m.content.is_empty()));
    }

    #[tokio::test]
    async fn ceo_failure_is_fatal() {
        let gateway = ScriptedGateway::default().failing_on(InferenceObjective::CeoDecision);
        let err = run_executive_workflow(&gateway, &input(), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
