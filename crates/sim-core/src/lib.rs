#![deny(warnings)]

//! Core domain models and invariants for Boardroom.
//!
//! This crate defines the serializable types shared by the business cycle
//! engine with validation helpers to guarantee basic invariants: the game
//! state, KPI snapshots, chat-style messages, executive decisions, and the
//! ephemeral market orders.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Agent display name for the chief executive.
pub const CEO_NAME: &str = "CEO";
/// Agent display name attached to the outcome narrative message.
pub const OUTCOME_NAME: &str = "Outcome";
/// Agent display name attached to the compressed cycle summary message.
pub const SUMMARY_NAME: &str = "Simulation Summary";

/// One of the four functional officers the CEO delegates to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OfficerRole {
    #[serde(rename = "CTO")]
    Cto,
    #[serde(rename = "CFO")]
    Cfo,
    #[serde(rename = "CMO")]
    Cmo,
    #[serde(rename = "COO")]
    Coo,
}

impl OfficerRole {
    /// Stable emission order for officer steps.
    pub const ALL: [OfficerRole; 4] = [
        OfficerRole::Cto,
        OfficerRole::Cfo,
        OfficerRole::Cmo,
        OfficerRole::Coo,
    ];

    /// Uppercase role title as used in message names and assignment keys.
    pub fn title(self) -> &'static str {
        match self {
            OfficerRole::Cto => "CTO",
            OfficerRole::Cfo => "CFO",
            OfficerRole::Cmo => "CMO",
            OfficerRole::Coo => "COO",
        }
    }
}

impl fmt::Display for OfficerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Tagged message origin within the game transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Advisor free-text input.
    User,
    /// Engine-generated system text.
    System,
    /// A freshly generated business scenario.
    Scenario,
    /// Cycle boundary marker; content is the new cycle number.
    BusinessCycle,
    /// Marker opening a deliberation block.
    SimulationGroup,
    /// Simulated outcome or summary narrative.
    Simulation,
    /// Prompt asking the advisor for the next round of guidance.
    AdviceRequest,
    /// An executive agent's contribution.
    Assistant,
}

/// One transcript entry. Immutable once appended to a `GameState`; owned by
/// the cycle recorded in `cycle_number`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_number: Option<u32>,
    pub content: String,
}

impl Message {
    /// Message with no agent name, tagged with the owning cycle.
    pub fn new(role: MessageRole, content: impl Into<String>, cycle: u32) -> Self {
        Self {
            role,
            name: None,
            cycle_number: Some(cycle),
            content: content.into(),
        }
    }

    /// Named agent message (CEO, officers, Outcome, Simulation Summary).
    pub fn named(
        role: MessageRole,
        name: impl Into<String>,
        content: impl Into<String>,
        cycle: u32,
    ) -> Self {
        Self {
            role,
            name: Some(name.into()),
            cycle_number: Some(cycle),
            content: content.into(),
        }
    }
}

/// The six scored performance indicators. The share price is derived by the
/// market engine and is deliberately not part of this set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kpi {
    Revenue,
    ProfitMargin,
    MarketShare,
    InnovationIndex,
    ClvCacRatio,
    ProductionEfficiencyIndex,
}

impl Kpi {
    /// All scored KPIs in canonical order.
    pub const ALL: [Kpi; 6] = [
        Kpi::Revenue,
        Kpi::ProfitMargin,
        Kpi::MarketShare,
        Kpi::InnovationIndex,
        Kpi::ClvCacRatio,
        Kpi::ProductionEfficiencyIndex,
    ];

    /// Transport-level field name, e.g. "profitMargin".
    pub fn field_name(self) -> &'static str {
        match self {
            Kpi::Revenue => "revenue",
            Kpi::ProfitMargin => "profitMargin",
            Kpi::MarketShare => "marketShare",
            Kpi::InnovationIndex => "innovationIndex",
            Kpi::ClvCacRatio => "clvCacRatio",
            Kpi::ProductionEfficiencyIndex => "productionEfficiencyIndex",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// One KPI snapshot, appended to `GameState::kpi_history` per completed
/// cycle. Values are fractions or currency units; only `share_price` has an
/// enforced bound (> 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub revenue: f64,
    pub profit_margin: f64,
    pub market_share: f64,
    pub innovation_index: f64,
    pub clv_cac_ratio: f64,
    pub production_efficiency_index: f64,
    pub share_price: f64,
}

impl KpiSnapshot {
    /// Default seed snapshot for a new game.
    pub fn seed() -> Self {
        Self {
            revenue: 1_000_000.0,
            profit_margin: 0.1,
            market_share: 0.05,
            innovation_index: 0.6,
            clv_cac_ratio: 2.0,
            production_efficiency_index: 0.7,
            share_price: 100.0,
        }
    }

    /// Read one scored KPI.
    pub fn get(&self, kpi: Kpi) -> f64 {
        match kpi {
            Kpi::Revenue => self.revenue,
            Kpi::ProfitMargin => self.profit_margin,
            Kpi::MarketShare => self.market_share,
            Kpi::InnovationIndex => self.innovation_index,
            Kpi::ClvCacRatio => self.clv_cac_ratio,
            Kpi::ProductionEfficiencyIndex => self.production_efficiency_index,
        }
    }

    /// Write one scored KPI.
    pub fn set(&mut self, kpi: Kpi, value: f64) {
        match kpi {
            Kpi::Revenue => self.revenue = value,
            Kpi::ProfitMargin => self.profit_margin = value,
            Kpi::MarketShare => self.market_share = value,
            Kpi::InnovationIndex => self.innovation_index = value,
            Kpi::ClvCacRatio => self.clv_cac_ratio = value,
            Kpi::ProductionEfficiencyIndex => self.production_efficiency_index = value,
        }
    }

    /// True when the trend-relevant fields match exactly. Used to collapse
    /// zero-change artifacts before market analysis.
    pub fn same_trend_fields(&self, other: &Self) -> bool {
        self.revenue == other.revenue
            && self.profit_margin == other.profit_margin
            && self.market_share == other.market_share
            && self.innovation_index == other.innovation_index
    }
}

/// Schema-validated CEO output: a deliberation, a decision, and one task per
/// officer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeoDecision {
    pub deliberation: String,
    pub decision: String,
    pub assignments: BTreeMap<OfficerRole, String>,
}

impl CeoDecision {
    /// Checks the structural contract: non-empty deliberation and decision,
    /// and an assignment for each of the four officers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deliberation.trim().is_empty() {
            return Err(ValidationError::EmptyField("deliberation"));
        }
        if self.decision.trim().is_empty() {
            return Err(ValidationError::EmptyField("decision"));
        }
        for role in OfficerRole::ALL {
            if !self.assignments.contains_key(&role) {
                return Err(ValidationError::MissingAssignment(role));
            }
        }
        Ok(())
    }

    /// Assignment text for a role; an absent key means "no action".
    pub fn assignment(&self, role: OfficerRole) -> Option<&str> {
        self.assignments.get(&role).map(String::as_str)
    }
}

/// Buy or sell side of a synthetic market order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
}

/// A persona's order within one market evaluation. Ephemeral: produced and
/// consumed inside a single cycle, never stored in `GameState`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub persona: String,
    pub action: OrderAction,
    pub reason: String,
}

/// Full state of one running game. Mutated only by replacement: a completed
/// cycle produces a new value with `current_cycle + 1`, one appended KPI
/// snapshot, and the cycle's messages appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub user_id: String,
    pub game_id: String,
    pub session_id: String,
    pub current_cycle: u32,
    pub current_situation: String,
    pub business_overview: String,
    pub kpi_history: Vec<KpiSnapshot>,
    pub messages: Vec<Message>,
}

/// Number of completed cycles recorded in a transcript, derived from the
/// cycle boundary markers.
pub fn completed_cycles(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::BusinessCycle)
        .count()
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A required text field is empty.
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),
    /// The CEO decision lacks an assignment for an officer.
    #[error("missing assignment for {0}")]
    MissingAssignment(OfficerRole),
    /// Cycles are 1-based.
    #[error("cycle {0} is out of range (must be >= 1)")]
    CycleOutOfRange(u32),
    /// Every game carries at least the seed snapshot.
    #[error("kpi history is empty")]
    EmptyKpiHistory,
    /// Numeric KPI field must be finite.
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
    /// Share price must stay strictly positive.
    #[error("share price must be > 0")]
    NonPositiveSharePrice,
    /// kpi_history must hold the seed plus one snapshot per completed cycle.
    #[error("kpi history length {history} does not match {cycles} completed cycles + 1")]
    HistoryMismatch { history: usize, cycles: usize },
}

/// Validate a KPI snapshot: all fields finite, share price strictly positive.
pub fn validate_snapshot(snapshot: &KpiSnapshot) -> Result<(), ValidationError> {
    for kpi in Kpi::ALL {
        if !snapshot.get(kpi).is_finite() {
            return Err(ValidationError::NonFinite(kpi.field_name()));
        }
    }
    if !snapshot.share_price.is_finite() {
        return Err(ValidationError::NonFinite("sharePrice"));
    }
    if snapshot.share_price <= 0.0 {
        return Err(ValidationError::NonPositiveSharePrice);
    }
    Ok(())
}

/// Validate the full game state, including the history/transcript invariant:
/// `kpi_history.len() == completed_cycles(messages) + 1`.
pub fn validate_game_state(state: &GameState) -> Result<(), ValidationError> {
    if state.current_cycle == 0 {
        return Err(ValidationError::CycleOutOfRange(state.current_cycle));
    }
    if state.kpi_history.is_empty() {
        return Err(ValidationError::EmptyKpiHistory);
    }
    for snapshot in &state.kpi_history {
        validate_snapshot(snapshot)?;
    }
    let cycles = completed_cycles(&state.messages);
    if state.kpi_history.len() != cycles + 1 {
        return Err(ValidationError::HistoryMismatch {
            history: state.kpi_history.len(),
            cycles,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decision() -> CeoDecision {
        let mut assignments = BTreeMap::new();
        for role in OfficerRole::ALL {
            assignments.insert(role, format!("task for {role}"));
        }
        CeoDecision {
            deliberation: "weighed the advisor's input".into(),
            decision: "expand into aerospace clips".into(),
            assignments,
        }
    }

    fn state() -> GameState {
        GameState {
            user_id: "u-1".into(),
            game_id: "g-1".into(),
            session_id: "s-1".into(),
            current_cycle: 1,
            current_situation: "a rival just slashed prices".into(),
            business_overview: "two-year-old paperclip startup".into(),
            kpi_history: vec![KpiSnapshot::seed()],
            messages: vec![],
        }
    }

    #[test]
    fn seed_state_is_valid() {
        validate_game_state(&state()).unwrap();
    }

    #[test]
    fn history_invariant_enforced() {
        let mut s = state();
        s.kpi_history.push(KpiSnapshot::seed());
        assert_eq!(
            validate_game_state(&s),
            Err(ValidationError::HistoryMismatch {
                history: 2,
                cycles: 0
            })
        );
        s.messages
            .push(Message::new(MessageRole::BusinessCycle, "2", 2));
        validate_game_state(&s).unwrap();
    }

    #[test]
    fn share_price_must_be_positive() {
        let mut s = state();
        s.kpi_history[0].share_price = 0.0;
        assert_eq!(
            validate_game_state(&s),
            Err(ValidationError::NonPositiveSharePrice)
        );
    }

    #[test]
    fn decision_validation() {
        let d = decision();
        d.validate().unwrap();

        let mut missing = d.clone();
        missing.assignments.remove(&OfficerRole::Cmo);
        assert_eq!(
            missing.validate(),
            Err(ValidationError::MissingAssignment(OfficerRole::Cmo))
        );

        let mut blank = d;
        blank.decision = "  ".into();
        assert_eq!(blank.validate(), Err(ValidationError::EmptyField("decision")));
    }

    #[test]
    fn decision_serde_uses_role_titles() {
        let json = serde_json::to_value(decision()).unwrap();
        assert!(json["assignments"]["CTO"].is_string());
        assert!(json["assignments"]["COO"].is_string());
    }

    #[test]
    fn message_serde_shape() {
        let m = Message::named(MessageRole::Assistant, "CEO", "decided", 3);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["cycleNumber"], 3);
        assert_eq!(json["name"], "CEO");

        let bare = Message {
            role: MessageRole::User,
            name: None,
            cycle_number: None,
            content: "advice".into(),
        };
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("name").is_none());
        assert!(json.get("cycleNumber").is_none());
    }

    #[test]
    fn completed_cycles_counts_boundaries() {
        let msgs = vec![
            Message::new(MessageRole::User, "go", 1),
            Message::new(MessageRole::BusinessCycle, "2", 2),
            Message::new(MessageRole::Scenario, "next", 2),
            Message::new(MessageRole::BusinessCycle, "3", 3),
        ];
        assert_eq!(completed_cycles(&msgs), 2);
    }

    prop_compose! {
        fn finite_f64()(v in -1.0e9f64..1.0e9f64) -> f64 { v }
    }

    proptest! {
        #[test]
        fn game_state_roundtrips(
            revenue in finite_f64(),
            margin in finite_f64(),
            share in 0.01f64..10_000.0,
            cycle in 1u32..100,
        ) {
            let mut s = state();
            s.current_cycle = cycle;
            s.kpi_history[0].revenue = revenue;
            s.kpi_history[0].profit_margin = margin;
            s.kpi_history[0].share_price = share;
            s.messages.push(Message::named(
                MessageRole::Simulation,
                OUTCOME_NAME,
                "it unfolded",
                cycle,
            ));
            let encoded = serde_json::to_string(&s).unwrap();
            let back: GameState = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(back, s);
        }

        #[test]
        fn snapshot_get_set_agree(v in finite_f64()) {
            let mut snap = KpiSnapshot::seed();
            for kpi in Kpi::ALL {
                snap.set(kpi, v);
                prop_assert_eq!(snap.get(kpi), v);
            }
        }
    }
}
