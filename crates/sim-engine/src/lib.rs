#![deny(warnings)]

//! Business cycle orchestrator.
//!
//! [`BusinessEngine::run_cycle`] sequences one full turn: executive
//! deliberation, impact analysis, KPI recomputation, the synthetic market,
//! the overview/scenario refresh. Intermediate results are pushed into a
//! consumer channel as they are produced; the externally visible
//! [`GameState`] is only replaced by the returned value at the end, so a
//! failed or cancelled cycle leaves no partial mutation behind.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sim_agents::{executive, impact, kpi};
use sim_core::{
    validate_game_state, GameState, KpiSnapshot, Message, MessageRole, ValidationError,
    SUMMARY_NAME,
};
use sim_gateway::{
    calls, CallMetadata, GatewayError, InferenceObjective, LanguageModelGateway, OverviewRequest,
    ScenarioBundle, ScenarioRequest, SummaryRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scenario used when the gateway cannot produce the next inflection point.
pub const SCENARIO_FALLBACK: &str =
    "An unexpected issue occurred. The CEO is working to resolve it.";
/// Advice prompt used alongside [`SCENARIO_FALLBACK`].
pub const ADVICE_REQUEST_FALLBACK: &str = "What do you advise the CEO to do next?";
/// Summary used when the gateway cannot compress the cycle.
pub const SUMMARY_FALLBACK: &str = "The cycle concluded; a detailed summary is unavailable.";

/// Channel capacity comfortably above the events one cycle produces.
const EVENT_BUFFER: usize = 64;

/// Stream items produced while a cycle runs. Serializes to the
/// newline-delimited JSON surface: messages carry `role`, updates carry
/// `type`/`content`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CycleEvent {
    Message(Message),
    Update(Update),
}

/// Non-message stream updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Update {
    /// Freshly computed KPI snapshot (share price included).
    Kpis(KpiSnapshot),
    /// Refreshed compressed company overview.
    BusinessOverview(String),
    /// Final resolved game state, emitted by the stream consumer.
    GameState(Box<GameState>),
}

/// Cycle-fatal failures. Everything else inside a cycle degrades to a
/// documented fallback instead of surfacing here.
#[derive(Debug, Error)]
pub enum CycleError {
    /// No meaningful delegation is possible without a CEO decision.
    #[error("CEO decision failed: {0}")]
    CeoDecision(GatewayError),
    /// The consumer stopped pulling from the stream.
    #[error("event consumer disconnected mid-cycle")]
    Cancelled,
    /// The input or resulting state violates a domain invariant.
    #[error("invalid game state: {0}")]
    InvalidState(#[from] ValidationError),
}

/// Engine tuning knobs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base seed for the per-cycle RNG (KPI noise and the noise trader).
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { rng_seed: 42 }
    }
}

/// Top-level orchestrator. The gateway is an injected collaborator so tests
/// and the headless CLI can run fully deterministic cycles.
pub struct BusinessEngine {
    gateway: Arc<dyn LanguageModelGateway>,
    config: EngineConfig,
}

impl BusinessEngine {
    pub fn new(gateway: Arc<dyn LanguageModelGateway>, config: EngineConfig) -> Self {
        Self { gateway, config }
    }

    fn metadata(&self, state: &GameState, cycle: u32) -> CallMetadata {
        CallMetadata {
            trace_id: format!("{}-c{}", state.game_id, cycle),
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
            cycle,
            inference_objective: InferenceObjective::CeoDecision,
        }
    }

    /// Create a fresh game: cycle 1, the seed KPI snapshot, and an opening
    /// scenario plus advice request (placeholders if the gateway fails).
    pub async fn new_game(
        &self,
        user_id: impl Into<String>,
        game_id: impl Into<String>,
        session_id: impl Into<String>,
        business_overview: impl Into<String>,
    ) -> GameState {
        let mut state = GameState {
            user_id: user_id.into(),
            game_id: game_id.into(),
            session_id: session_id.into(),
            current_cycle: 1,
            current_situation: String::new(),
            business_overview: business_overview.into(),
            kpi_history: vec![KpiSnapshot::seed()],
            messages: vec![],
        };
        let meta = self
            .metadata(&state, 1)
            .with_objective(InferenceObjective::NextScenario);
        let bundle = calls::next_scenario(
            self.gateway.as_ref(),
            ScenarioRequest {
                overview: state.business_overview.clone(),
                kpis: KpiSnapshot::seed(),
                cycle: 1,
            },
            &meta,
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "opening scenario failed; using placeholder");
            ScenarioBundle {
                scenario: SCENARIO_FALLBACK.to_string(),
                advice_request: ADVICE_REQUEST_FALLBACK.to_string(),
            }
        });
        state.current_situation = bundle.scenario.clone();
        state
            .messages
            .push(Message::new(MessageRole::Scenario, bundle.scenario, 1));
        state.messages.push(Message::new(
            MessageRole::AdviceRequest,
            bundle.advice_request,
            1,
        ));
        info!(game_id = %state.game_id, "new game created");
        state
    }

    /// Run one business cycle. Yields events into `events` as they are
    /// produced and resolves to the updated game state; the input state is
    /// never mutated.
    pub async fn run_cycle(
        &self,
        state: &GameState,
        advice: &str,
        events: &mpsc::Sender<CycleEvent>,
    ) -> Result<GameState, CycleError> {
        validate_game_state(state)?;
        let cycle = state.current_cycle;
        let meta = self.metadata(state, cycle);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.rng_seed.wrapping_add(u64::from(cycle)));
        info!(cycle, game_id = %state.game_id, "running business cycle");

        // Messages produced this cycle; appended to the state only on success.
        let mut appended: Vec<Message> = Vec::new();
        appended.push(Message::new(MessageRole::User, advice, cycle));

        emit(
            events,
            &mut appended,
            Message::new(MessageRole::SimulationGroup, cycle.to_string(), cycle),
        )
        .await?;

        let exec = executive::run_executive_workflow(
            self.gateway.as_ref(),
            &executive::WorkflowInput {
                situation: &state.current_situation,
                advice,
                overview: &state.business_overview,
                transcript: &state.messages,
                cycle,
            },
            &meta,
        )
        .await
        .map_err(CycleError::CeoDecision)?;
        for message in &exec.messages {
            emit(events, &mut appended, message.clone()).await?;
        }

        let outcome = impact::simulate_outcome(
            self.gateway.as_ref(),
            &state.current_situation,
            &exec.actions,
            &state.business_overview,
            cycle,
            &meta,
        )
        .await;
        emit(events, &mut appended, outcome.clone()).await?;

        // kpi_history is non-empty by validation above.
        let prior = state
            .kpi_history
            .last()
            .cloned()
            .unwrap_or_else(KpiSnapshot::seed);
        let mut next = kpi::recompute_kpis(
            self.gateway.as_ref(),
            &prior,
            &state.current_situation,
            &exec.actions,
            &outcome.content,
            &meta,
            &mut rng,
        )
        .await;

        let mut full_history = state.kpi_history.clone();
        full_history.push(next.clone());
        let market = sim_market::simulate_market(&full_history, &mut rng);
        debug!(orders = market.orders.len(), price = market.new_share_price, "market closed");
        next.share_price = market.new_share_price;
        send(events, CycleEvent::Update(Update::Kpis(next.clone()))).await?;

        let overview = calls::overview_update(
            self.gateway.as_ref(),
            OverviewRequest {
                overview: state.business_overview.clone(),
                outcome: outcome.content.clone(),
            },
            &meta.with_objective(InferenceObjective::OverviewUpdate),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "overview refresh failed; keeping previous overview");
            state.business_overview.clone()
        });
        send(
            events,
            CycleEvent::Update(Update::BusinessOverview(overview.clone())),
        )
        .await?;

        let summary = calls::cycle_summary(
            self.gateway.as_ref(),
            SummaryRequest {
                situation: state.current_situation.clone(),
                advice: advice.to_string(),
                transcript: appended.clone(),
            },
            &meta.with_objective(InferenceObjective::CycleSummary),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "cycle summary failed; using placeholder");
            SUMMARY_FALLBACK.to_string()
        });
        emit(
            events,
            &mut appended,
            Message::named(MessageRole::Simulation, SUMMARY_NAME, summary, cycle),
        )
        .await?;

        // Boundary and everything after it belong to the new cycle.
        let new_cycle = cycle + 1;
        emit(
            events,
            &mut appended,
            Message::new(MessageRole::BusinessCycle, new_cycle.to_string(), new_cycle),
        )
        .await?;

        let bundle = calls::next_scenario(
            self.gateway.as_ref(),
            ScenarioRequest {
                overview: overview.clone(),
                kpis: next.clone(),
                cycle: new_cycle,
            },
            &meta.with_objective(InferenceObjective::NextScenario),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "scenario generation failed; using placeholder");
            ScenarioBundle {
                scenario: SCENARIO_FALLBACK.to_string(),
                advice_request: ADVICE_REQUEST_FALLBACK.to_string(),
            }
        });
        emit(
            events,
            &mut appended,
            Message::new(MessageRole::Scenario, bundle.scenario.clone(), new_cycle),
        )
        .await?;
        emit(
            events,
            &mut appended,
            Message::new(MessageRole::AdviceRequest, bundle.advice_request, new_cycle),
        )
        .await?;

        let mut updated = state.clone();
        updated.current_cycle = new_cycle;
        updated.current_situation = bundle.scenario;
        updated.business_overview = overview;
        updated.kpi_history.push(next);
        updated.messages.extend(appended);
        validate_game_state(&updated)?;
        info!(cycle = new_cycle, "business cycle complete");
        Ok(updated)
    }

    /// Convenience wrapper: run one cycle with an internal buffer and return
    /// the collected events alongside the resolved state.
    pub async fn run_cycle_buffered(
        &self,
        state: &GameState,
        advice: &str,
    ) -> Result<(Vec<CycleEvent>, GameState), CycleError> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let result = self.run_cycle(state, advice, &tx).await;
        drop(tx);
        let mut collected = Vec::new();
        while let Ok(event) = rx.try_recv() {
            collected.push(event);
        }
        result.map(|updated| (collected, updated))
    }
}

async fn send(events: &mpsc::Sender<CycleEvent>, event: CycleEvent) -> Result<(), CycleError> {
    events.send(event).await.map_err(|_| CycleError::Cancelled)
}

async fn emit(
    events: &mpsc::Sender<CycleEvent>,
    appended: &mut Vec<Message>,
    message: Message,
) -> Result<(), CycleError> {
    send(events, CycleEvent::Message(message.clone())).await?;
    appended.push(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{completed_cycles, CEO_NAME, OUTCOME_NAME};
    use sim_gateway::scripted::ScriptedGateway;

    fn engine(gateway: ScriptedGateway) -> BusinessEngine {
        BusinessEngine::new(Arc::new(gateway), EngineConfig::default())
    }

    fn seeded_state() -> GameState {
        let mut seed = KpiSnapshot::seed();
        seed.share_price = 20.0;
        GameState {
            user_id: "u-1".into(),
            game_id: "g-1".into(),
            session_id: "s-1".into(),
            current_cycle: 1,
            current_situation: "a rival just slashed prices".into(),
            business_overview: "two-year-old paperclip startup".into(),
            kpi_history: vec![seed],
            messages: vec![],
        }
    }

    fn assistant_names(events: &[CycleEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                CycleEvent::Message(m) if m.role == MessageRole::Assistant => m.name.clone(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn full_cycle_advances_state_and_grows_revenue() {
        let engine = engine(ScriptedGateway::default().with_impact_score(3));
        let state = seeded_state();
        let (events, updated) = engine.run_cycle_buffered(&state, "invest in R&D").await.unwrap();

        assert_eq!(updated.current_cycle, 2);
        assert_eq!(updated.kpi_history.len(), 2);
        assert!(updated.kpi_history[1].revenue > state.kpi_history[0].revenue);
        assert_ne!(updated.current_situation, state.current_situation);
        validate_game_state(&updated).unwrap();
        assert_eq!(completed_cycles(&updated.messages), 1);

        // Stream shape: marker, five executives (CEO first), outcome, kpis,
        // overview, summary, boundary, scenario, advice request.
        assert_eq!(events.len(), 13);
        assert!(matches!(
            &events[0],
            CycleEvent::Message(m) if m.role == MessageRole::SimulationGroup
        ));
        assert_eq!(
            assistant_names(&events),
            vec![CEO_NAME, "CTO", "CFO", "CMO", "COO"]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            CycleEvent::Message(m) if m.name.as_deref() == Some(OUTCOME_NAME)
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, CycleEvent::Update(Update::Kpis(_)))));
    }

    #[tokio::test]
    async fn share_price_move_is_bounded() {
        let engine = engine(ScriptedGateway::default().with_impact_score(5));
        let state = seeded_state();
        let (_, updated) = engine.run_cycle_buffered(&state, "go all in").await.unwrap();
        let prev = state.kpi_history[0].share_price;
        let next = updated.kpi_history[1].share_price;
        assert!((next - prev).abs() / prev <= 0.056);
    }

    #[tokio::test]
    async fn ceo_failure_is_fatal_and_leaves_state_untouched() {
        let engine = engine(
            ScriptedGateway::default().failing_on(InferenceObjective::CeoDecision),
        );
        let state = seeded_state();
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let err = engine.run_cycle(&state, "advice", &tx).await.unwrap_err();
        assert!(matches!(err, CycleError::CeoDecision(_)));
        drop(tx);
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        // Only the group marker made it out; no officer ever spoke.
        assert_eq!(events.len(), 1);
        assert!(assistant_names(&events).is_empty());
        validate_game_state(&state).unwrap();
        assert_eq!(state.current_cycle, 1);
    }

    #[tokio::test]
    async fn degraded_cycle_still_completes() {
        let engine = engine(
            ScriptedGateway::default()
                .failing_on(InferenceObjective::ImpactCritique)
                .failing_on(InferenceObjective::KpiImpact)
                .failing_on(InferenceObjective::OverviewUpdate)
                .failing_on(InferenceObjective::CycleSummary)
                .failing_on(InferenceObjective::NextScenario),
        );
        let state = seeded_state();
        let (events, updated) = engine.run_cycle_buffered(&state, "advice").await.unwrap();
        assert_eq!(updated.current_cycle, 2);
        assert_eq!(updated.current_situation, SCENARIO_FALLBACK);
        assert_eq!(updated.business_overview, state.business_overview);
        // KPI fallback keeps values; only the share price may move.
        let prior = &state.kpi_history[0];
        let next = &updated.kpi_history[1];
        assert_eq!(next.revenue, prior.revenue);
        assert!(events.iter().any(|e| matches!(
            e,
            CycleEvent::Message(m) if m.content == impact::OUTCOME_FALLBACK
        )));
    }

    #[tokio::test]
    async fn dropped_consumer_cancels_the_cycle() {
        let engine = engine(ScriptedGateway::default());
        let state = seeded_state();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = engine.run_cycle(&state, "advice", &tx).await.unwrap_err();
        assert!(matches!(err, CycleError::Cancelled));
    }

    #[tokio::test]
    async fn new_game_seeds_cycle_one() {
        let engine = engine(ScriptedGateway::default());
        let state = engine.new_game("u", "g", "s", "a paperclip startup").await;
        assert_eq!(state.current_cycle, 1);
        assert_eq!(state.kpi_history.len(), 1);
        assert!(!state.current_situation.is_empty());
        validate_game_state(&state).unwrap();
    }

    #[test]
    fn events_serialize_to_the_ndjson_surface() {
        let msg = CycleEvent::Message(Message::named(
            MessageRole::Assistant,
            CEO_NAME,
            "decided",
            1,
        ));
        let line = serde_json::to_string(&msg).unwrap();
        assert!(line.contains("\"role\":\"assistant\""));
        assert!(line.contains("\"cycleNumber\":1"));

        let update = CycleEvent::Update(Update::Kpis(KpiSnapshot::seed()));
        let line = serde_json::to_string(&update).unwrap();
        assert!(line.starts_with("{\"type\":\"kpis\",\"content\":{"));

        let back: CycleEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, update);
    }
}
