//! Deterministic offline gateway for tests and the headless CLI.
//!
//! Responses are synthesized from the request payload, so a fixed input
//! always produces the same deliberation. Individual objectives can be made
//! to fail to exercise fallback paths.

use crate::{
    CallMetadata, GatewayError, GatewayRequest, GatewayResponse, InferenceObjective, KpiImpact,
    LanguageModelGateway, ScenarioBundle,
};
use async_trait::async_trait;
use sim_core::{CeoDecision, OfficerRole};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Canned-response gateway. `Default` yields a mildly positive executive
/// team that always completes every objective.
#[derive(Clone, Debug)]
pub struct ScriptedGateway {
    impact_score: i8,
    fail_on: BTreeSet<InferenceObjective>,
    omit_assignment: Option<OfficerRole>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            impact_score: 1,
            fail_on: BTreeSet::new(),
            omit_assignment: None,
        }
    }
}

impl ScriptedGateway {
    /// Score returned for every KPI impact request.
    pub fn with_impact_score(mut self, score: i8) -> Self {
        self.impact_score = score;
        self
    }

    /// Make one objective fail with a transport error.
    pub fn failing_on(mut self, objective: InferenceObjective) -> Self {
        self.fail_on.insert(objective);
        self
    }

    /// Leave one officer without an assignment in the CEO decision.
    pub fn omitting_assignment(mut self, role: OfficerRole) -> Self {
        self.omit_assignment = Some(role);
        self
    }

    fn decision(&self, situation: &str, advice: &str) -> CeoDecision {
        let mut assignments = BTreeMap::new();
        for role in OfficerRole::ALL {
            if Some(role) == self.omit_assignment {
                continue;
            }
            assignments.insert(role, format!("{role}: respond to '{situation}'"));
        }
        CeoDecision {
            deliberation: format!("Considered advisor guidance: {advice}"),
            decision: format!("Act decisively on: {situation}"),
            assignments,
        }
    }
}

#[async_trait]
impl LanguageModelGateway for ScriptedGateway {
    async fn invoke(
        &self,
        request: GatewayRequest,
        meta: &CallMetadata,
    ) -> Result<GatewayResponse, GatewayError> {
        let objective = request.objective();
        debug!(%objective, trace_id = %meta.trace_id, cycle = meta.cycle, "scripted invoke");
        if self.fail_on.contains(&objective) {
            return Err(GatewayError::Transport(format!(
                "scripted failure for {objective}"
            )));
        }
        let response = match request {
            GatewayRequest::CeoDecision(req) => {
                GatewayResponse::CeoDecision(self.decision(&req.situation, &req.advice))
            }
            GatewayRequest::OfficerAction(req) => GatewayResponse::OfficerAction(format!(
                "{} executes: {}",
                req.role, req.assignment
            )),
            GatewayRequest::ImpactCritique(req) => GatewayResponse::ImpactCritique(format!(
                "Strategic, execution, and competitive risks identified across {} actions.",
                req.actions.len()
            )),
            GatewayRequest::OutcomeNarrative(req) => GatewayResponse::OutcomeNarrative(format!(
                "The quarter unfolds: the team's response to '{}' lands unevenly. {}",
                req.situation, req.critique
            )),
            GatewayRequest::KpiImpact(req) => GatewayResponse::KpiImpact(KpiImpact {
                impact_analysis: format!("{} shifts with the executed actions", req.kpi),
                impact_score: self.impact_score,
            }),
            GatewayRequest::OverviewUpdate(req) => GatewayResponse::OverviewUpdate(format!(
                "{} Latest development: {}",
                req.overview, req.outcome
            )),
            GatewayRequest::CycleSummary(req) => GatewayResponse::CycleSummary(format!(
                "Advice '{}' was weighed; the cycle closed with {} recorded steps.",
                req.advice,
                req.transcript.len()
            )),
            GatewayRequest::NextScenario(req) => GatewayResponse::NextScenario(ScenarioBundle {
                scenario: format!(
                    "Cycle {}: with revenue at {:.0}, a new inflection point emerges. How should the company respond?",
                    req.cycle, req.kpis.revenue
                ),
                advice_request: "What do you advise the CEO to do next?".into(),
            }),
        };
        Ok(response)
    }
}
