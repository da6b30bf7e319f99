#![deny(warnings)]

//! Language Model Gateway contract.
//!
//! Every deliberation step in the engine exchanges a structured request for
//! a schema-named response through a single `invoke` capability. Nothing in
//! the engine reaches into the gateway's internals (prompt wording, model
//! selection, authentication live behind this trait). Schema violations are
//! reported as a typed error distinct from transport failures so callers can
//! pattern-match fallback behavior.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_core::{CeoDecision, Kpi, KpiSnapshot, Message, OfficerRole};
use std::fmt;
use thiserror::Error;

pub mod scripted;

/// Gateway failure taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The response arrived but failed structural validation.
    #[error("schema validation failed: {0}")]
    Schema(String),
    /// The gateway was unreachable, timed out, or refused the call.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// What a single gateway call is asked to produce. Carried in the metadata
/// for tracing; mirrors the request variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceObjective {
    CeoDecision,
    OfficerAction,
    ImpactCritique,
    OutcomeNarrative,
    KpiImpact,
    OverviewUpdate,
    CycleSummary,
    NextScenario,
}

impl fmt::Display for InferenceObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InferenceObjective::CeoDecision => "ceo_decision",
            InferenceObjective::OfficerAction => "officer_action",
            InferenceObjective::ImpactCritique => "impact_critique",
            InferenceObjective::OutcomeNarrative => "outcome_narrative",
            InferenceObjective::KpiImpact => "kpi_impact",
            InferenceObjective::OverviewUpdate => "overview_update",
            InferenceObjective::CycleSummary => "cycle_summary",
            InferenceObjective::NextScenario => "next_scenario",
        };
        f.write_str(s)
    }
}

/// Opaque identifiers passed through for tracing. The engine never interprets
/// them beyond attaching the active cycle and objective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub trace_id: String,
    pub session_id: String,
    pub user_id: String,
    pub cycle: u32,
    pub inference_objective: InferenceObjective,
}

impl CallMetadata {
    /// Same trace identifiers, retargeted at another objective.
    pub fn with_objective(&self, objective: InferenceObjective) -> Self {
        Self {
            inference_objective: objective,
            ..self.clone()
        }
    }
}

/// CEO step input: scenario, advice, overview, and the prior transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CeoRequest {
    pub situation: String,
    pub advice: String,
    pub overview: String,
    pub transcript: Vec<Message>,
}

/// Officer step input: the CEO-assigned task for one role.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerRequest {
    pub role: OfficerRole,
    pub assignment: String,
    pub overview: String,
    pub transcript: Vec<Message>,
}

/// Critique stage input: the skeptical risk assessment of proposed actions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueRequest {
    pub situation: String,
    pub actions: Vec<String>,
    pub overview: String,
}

/// Narrative stage input, conditioned on the critique.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeRequest {
    pub situation: String,
    pub actions: Vec<String>,
    pub overview: String,
    pub critique: String,
}

/// Per-KPI scoring input.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiImpactRequest {
    pub kpi: Kpi,
    pub situation: String,
    pub actions: Vec<String>,
    pub outcome: String,
}

/// Directional impact of the cycle on one KPI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiImpact {
    pub impact_analysis: String,
    pub impact_score: i8,
}

impl KpiImpact {
    /// Scores outside [-5, 5] violate the schema.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(-5..=5).contains(&self.impact_score) {
            return Err(GatewayError::Schema(format!(
                "impact score {} outside [-5, 5]",
                self.impact_score
            )));
        }
        Ok(())
    }
}

/// Overview refresh input: prior overview plus the cycle's outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewRequest {
    pub overview: String,
    pub outcome: String,
}

/// Compressed cycle summary input.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub situation: String,
    pub advice: String,
    pub transcript: Vec<Message>,
}

/// Next scenario input: refreshed overview and the latest KPI snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub overview: String,
    pub kpis: KpiSnapshot,
    pub cycle: u32,
}

/// A fresh scenario paired with the prompt asking the advisor for guidance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBundle {
    pub scenario: String,
    pub advice_request: String,
}

/// Structured prompt context, one variant per inference objective.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayRequest {
    CeoDecision(CeoRequest),
    OfficerAction(OfficerRequest),
    ImpactCritique(CritiqueRequest),
    OutcomeNarrative(NarrativeRequest),
    KpiImpact(KpiImpactRequest),
    OverviewUpdate(OverviewRequest),
    CycleSummary(SummaryRequest),
    NextScenario(ScenarioRequest),
}

impl GatewayRequest {
    /// Objective this request corresponds to.
    pub fn objective(&self) -> InferenceObjective {
        match self {
            GatewayRequest::CeoDecision(_) => InferenceObjective::CeoDecision,
            GatewayRequest::OfficerAction(_) => InferenceObjective::OfficerAction,
            GatewayRequest::ImpactCritique(_) => InferenceObjective::ImpactCritique,
            GatewayRequest::OutcomeNarrative(_) => InferenceObjective::OutcomeNarrative,
            GatewayRequest::KpiImpact(_) => InferenceObjective::KpiImpact,
            GatewayRequest::OverviewUpdate(_) => InferenceObjective::OverviewUpdate,
            GatewayRequest::CycleSummary(_) => InferenceObjective::CycleSummary,
            GatewayRequest::NextScenario(_) => InferenceObjective::NextScenario,
        }
    }
}

/// Schema-named result, one variant per inference objective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayResponse {
    CeoDecision(CeoDecision),
    OfficerAction(String),
    ImpactCritique(String),
    OutcomeNarrative(String),
    KpiImpact(KpiImpact),
    OverviewUpdate(String),
    CycleSummary(String),
    NextScenario(ScenarioBundle),
}

/// Abstract language model capability consumed by all deliberation steps.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Exchange a structured request for a schema-named response. The engine
    /// does not retry; each caller defines its own fallback.
    async fn invoke(
        &self,
        request: GatewayRequest,
        meta: &CallMetadata,
    ) -> Result<GatewayResponse, GatewayError>;
}

fn unexpected(expected: InferenceObjective, got: &GatewayResponse) -> GatewayError {
    let got = match got {
        GatewayResponse::CeoDecision(_) => "ceo_decision",
        GatewayResponse::OfficerAction(_) => "officer_action",
        GatewayResponse::ImpactCritique(_) => "impact_critique",
        GatewayResponse::OutcomeNarrative(_) => "outcome_narrative",
        GatewayResponse::KpiImpact(_) => "kpi_impact",
        GatewayResponse::OverviewUpdate(_) => "overview_update",
        GatewayResponse::CycleSummary(_) => "cycle_summary",
        GatewayResponse::NextScenario(_) => "next_scenario",
    };
    GatewayError::Schema(format!("expected {expected} response, got {got}"))
}

/// Typed call wrappers. Each wrapper invokes the gateway and enforces the
/// named schema, so callers never see a mismatched variant.
pub mod calls {
    use super::*;

    pub async fn ceo_decision(
        gateway: &dyn LanguageModelGateway,
        request: CeoRequest,
        meta: &CallMetadata,
    ) -> Result<CeoDecision, GatewayError> {
        match gateway
            .invoke(GatewayRequest::CeoDecision(request), meta)
            .await?
        {
            GatewayResponse::CeoDecision(decision) => {
                decision
                    .validate()
                    .map_err(|e| GatewayError::Schema(e.to_string()))?;
                Ok(decision)
            }
            other => Err(unexpected(InferenceObjective::CeoDecision, &other)),
        }
    }

    pub async fn officer_action(
        gateway: &dyn LanguageModelGateway,
        request: OfficerRequest,
        meta: &CallMetadata,
    ) -> Result<String, GatewayError> {
        match gateway
            .invoke(GatewayRequest::OfficerAction(request), meta)
            .await?
        {
            GatewayResponse::OfficerAction(action) => Ok(action),
            other => Err(unexpected(InferenceObjective::OfficerAction, &other)),
        }
    }

    pub async fn impact_critique(
        gateway: &dyn LanguageModelGateway,
        request: CritiqueRequest,
        meta: &CallMetadata,
    ) -> Result<String, GatewayError> {
        match gateway
            .invoke(GatewayRequest::ImpactCritique(request), meta)
            .await?
        {
            GatewayResponse::ImpactCritique(text) => Ok(text),
            other => Err(unexpected(InferenceObjective::ImpactCritique, &other)),
        }
    }

    pub async fn outcome_narrative(
        gateway: &dyn LanguageModelGateway,
        request: NarrativeRequest,
        meta: &CallMetadata,
    ) -> Result<String, GatewayError> {
        match gateway
            .invoke(GatewayRequest::OutcomeNarrative(request), meta)
            .await?
        {
            GatewayResponse::OutcomeNarrative(text) => Ok(text),
            other => Err(unexpected(InferenceObjective::OutcomeNarrative, &other)),
        }
    }

    pub async fn kpi_impact(
        gateway: &dyn LanguageModelGateway,
        request: KpiImpactRequest,
        meta: &CallMetadata,
    ) -> Result<KpiImpact, GatewayError> {
        match gateway
            .invoke(GatewayRequest::KpiImpact(request), meta)
            .await?
        {
            GatewayResponse::KpiImpact(impact) => {
                impact.validate()?;
                Ok(impact)
            }
            other => Err(unexpected(InferenceObjective::KpiImpact, &other)),
        }
    }

    pub async fn overview_update(
        gateway: &dyn LanguageModelGateway,
        request: OverviewRequest,
        meta: &CallMetadata,
    ) -> Result<String, GatewayError> {
        match gateway
            .invoke(GatewayRequest::OverviewUpdate(request), meta)
            .await?
        {
            GatewayResponse::OverviewUpdate(text) => Ok(text),
            other => Err(unexpected(InferenceObjective::OverviewUpdate, &other)),
        }
    }

    pub async fn cycle_summary(
        gateway: &dyn LanguageModelGateway,
        request: SummaryRequest,
        meta: &CallMetadata,
    ) -> Result<String, GatewayError> {
        match gateway
            .invoke(GatewayRequest::CycleSummary(request), meta)
            .await?
        {
            GatewayResponse::CycleSummary(text) => Ok(text),
            other => Err(unexpected(InferenceObjective::CycleSummary, &other)),
        }
    }

    pub async fn next_scenario(
        gateway: &dyn LanguageModelGateway,
        request: ScenarioRequest,
        meta: &CallMetadata,
    ) -> Result<ScenarioBundle, GatewayError> {
        match gateway
            .invoke(GatewayRequest::NextScenario(request), meta)
            .await?
        {
            GatewayResponse::NextScenario(bundle) => Ok(bundle),
            other => Err(unexpected(InferenceObjective::NextScenario, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedGateway;
    use super::*;

    fn meta(objective: InferenceObjective) -> CallMetadata {
        CallMetadata {
            trace_id: "t-1".into(),
            session_id: "s-1".into(),
            user_id: "u-1".into(),
            cycle: 1,
            inference_objective: objective,
        }
    }

    #[tokio::test]
    async fn wrappers_enforce_named_schemas() {
        let gateway = ScriptedGateway::default();
        let decision = calls::ceo_decision(
            &gateway,
            CeoRequest {
                situation: "price war".into(),
                advice: "hold the line".into(),
                overview: "overview".into(),
                transcript: vec![],
            },
            &meta(InferenceObjective::CeoDecision),
        )
        .await
        .unwrap();
        decision.validate().unwrap();
    }

    #[tokio::test]
    async fn out_of_range_impact_score_is_schema_error() {
        let gateway = ScriptedGateway::default().with_impact_score(7);
        let err = calls::kpi_impact(
            &gateway,
            KpiImpactRequest {
                kpi: Kpi::Revenue,
                situation: "s".into(),
                actions: vec![],
                outcome: "o".into(),
            },
            &meta(InferenceObjective::KpiImpact),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Schema(_)));
    }

    #[tokio::test]
    async fn scripted_failure_is_transport_error() {
        let gateway = ScriptedGateway::default().failing_on(InferenceObjective::CycleSummary);
        let err = calls::cycle_summary(
            &gateway,
            SummaryRequest {
                situation: "s".into(),
                advice: "a".into(),
                transcript: vec![],
            },
            &meta(InferenceObjective::CycleSummary),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
