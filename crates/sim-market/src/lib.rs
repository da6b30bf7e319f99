#![deny(warnings)]

//! Synthetic market engine: persona-driven share price simulation.
//!
//! This module derives buy/sell orders from the KPI history through a set of
//! independent trading personas and aggregates them into a bounded share
//! price move. Everything here is a pure function of the history except the
//! noise trader, which draws from the caller's seeded RNG.

use rand::Rng;
use sim_core::{KpiSnapshot, Order, OrderAction};
use tracing::debug;

/// Fixed KPI weights for the composite per-period change (sum to 1.0).
pub const WEIGHTS: KpiWeights = KpiWeights {
    revenue: 0.25,
    profit_margin: 0.25,
    market_share: 0.2,
    innovation_index: 0.15,
    clv_cac_ratio: 0.1,
    production_efficiency_index: 0.05,
};

/// Share price used before any market evaluation has happened.
pub const DEFAULT_SHARE_PRICE: f64 = 100.0;

/// Hard cap on the per-cycle price move before sentiment scaling.
const PRICE_IMPACT_CAP: f64 = 0.05;

/// Weighting of each KPI in the composite change signal.
#[derive(Clone, Copy, Debug)]
pub struct KpiWeights {
    pub revenue: f64,
    pub profit_margin: f64,
    pub market_share: f64,
    pub innovation_index: f64,
    pub clv_cac_ratio: f64,
    pub production_efficiency_index: f64,
}

/// Per-period change vector between two adjacent snapshots. Ratio-like KPIs
/// carry relative change; profit margin (already a fraction) is absolute.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KpiChange {
    pub revenue: f64,
    pub profit_margin: f64,
    pub market_share: f64,
    pub innovation_index: f64,
    pub clv_cac_ratio: f64,
    pub production_efficiency_index: f64,
}

/// Division that never throws: returns 0 for a zero or non-finite quotient.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let q = numerator / denominator;
    if q.is_finite() {
        q
    } else {
        0.0
    }
}

/// Round to two decimal places, matching the quoted price precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Drop snapshots that exactly repeat their predecessor's trend-relevant
/// fields, so flat periods do not skew the trend heuristics.
pub fn dedupe_history(history: &[KpiSnapshot]) -> Vec<KpiSnapshot> {
    let mut out: Vec<KpiSnapshot> = Vec::with_capacity(history.len());
    for snap in history {
        if let Some(prev) = out.last() {
            if prev.same_trend_fields(snap) {
                continue;
            }
        }
        out.push(snap.clone());
    }
    out
}

fn change_between(prev: &KpiSnapshot, next: &KpiSnapshot) -> KpiChange {
    KpiChange {
        revenue: safe_divide(next.revenue - prev.revenue, prev.revenue),
        profit_margin: next.profit_margin - prev.profit_margin,
        market_share: safe_divide(next.market_share - prev.market_share, prev.market_share),
        innovation_index: safe_divide(
            next.innovation_index - prev.innovation_index,
            prev.innovation_index,
        ),
        clv_cac_ratio: safe_divide(next.clv_cac_ratio - prev.clv_cac_ratio, prev.clv_cac_ratio),
        production_efficiency_index: safe_divide(
            next.production_efficiency_index - prev.production_efficiency_index,
            prev.production_efficiency_index,
        ),
    }
}

/// Composite change: the weighted sum of one period's change vector.
pub fn weighted_change(change: &KpiChange) -> f64 {
    change.revenue * WEIGHTS.revenue
        + change.profit_margin * WEIGHTS.profit_margin
        + change.market_share * WEIGHTS.market_share
        + change.innovation_index * WEIGHTS.innovation_index
        + change.clv_cac_ratio * WEIGHTS.clv_cac_ratio
        + change.production_efficiency_index * WEIGHTS.production_efficiency_index
}

/// Pre-computed view of the deduplicated history that personas evaluate.
#[derive(Clone, Debug)]
pub struct MarketView {
    /// Deduplicated snapshots, oldest first.
    pub snapshots: Vec<KpiSnapshot>,
    /// One change vector per adjacent snapshot pair.
    pub changes: Vec<KpiChange>,
    /// Weighted composite change per period.
    pub weighted: Vec<f64>,
}

impl MarketView {
    pub fn new(history: &[KpiSnapshot]) -> Self {
        let snapshots = dedupe_history(history);
        let changes: Vec<KpiChange> = snapshots
            .windows(2)
            .map(|w| change_between(&w[0], &w[1]))
            .collect();
        let weighted = changes.iter().map(weighted_change).collect();
        Self {
            snapshots,
            changes,
            weighted,
        }
    }

    fn last(&self) -> Option<&KpiChange> {
        self.changes.last()
    }

    fn tail(&self, n: usize) -> &[KpiChange] {
        let start = self.changes.len().saturating_sub(n);
        &self.changes[start..]
    }
}

/// A pure trading heuristic: zero or one order per evaluation.
pub struct Persona {
    pub name: &'static str,
    eval: fn(&MarketView) -> Option<(OrderAction, &'static str)>,
}

fn avg(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn all_sign(changes: &[KpiChange], pick: fn(&KpiChange) -> f64, positive: bool) -> bool {
    !changes.is_empty()
        && changes
            .iter()
            .all(|c| if positive { pick(c) > 0.0 } else { pick(c) < 0.0 })
}

fn trend_follower(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    if last.revenue > 0.05 {
        Some((OrderAction::Buy, "Rising revenue trend"))
    } else if last.revenue < -0.05 {
        Some((OrderAction::Sell, "Declining revenue trend"))
    } else {
        None
    }
}

fn long_term_investor(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    if v.changes.is_empty() {
        return None;
    }
    let mean = avg(v.changes.iter().map(|c| c.profit_margin), v.changes.len());
    if mean > 0.01 {
        Some((OrderAction::Buy, "Consistent profit margin improvement"))
    } else if mean < -0.01 {
        Some((OrderAction::Sell, "Consistent profit margin decline"))
    } else {
        None
    }
}

fn short_seller(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    if last.revenue < 0.0 && last.profit_margin < 0.0 {
        Some((OrderAction::Sell, "Declining revenue and profit margin"))
    } else if last.revenue > 0.0 && last.profit_margin > 0.0 {
        Some((OrderAction::Buy, "Rising revenue and margin (short cover)"))
    } else {
        None
    }
}

fn value_investor(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let first = v.snapshots.first()?;
    let last = v.snapshots.last()?;
    let total = safe_divide(last.revenue - first.revenue, first.revenue);
    if total < -0.3 {
        Some((OrderAction::Buy, "Potential undervaluation after significant drop"))
    } else if total > 0.3 {
        Some((OrderAction::Sell, "Potential overvaluation after significant rise"))
    } else {
        None
    }
}

fn growth_investor(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    let up = last.revenue > 0.0 && last.market_share > 0.0 && last.innovation_index > 0.0;
    let down = last.revenue < 0.0 && last.market_share < 0.0 && last.innovation_index < 0.0;
    if up {
        Some((OrderAction::Buy, "Improvement in growth metrics"))
    } else if down {
        Some((OrderAction::Sell, "Decline in growth metrics"))
    } else {
        None
    }
}

fn momentum_trader(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let window = v.tail(3);
    if all_sign(window, |c| c.revenue, true) {
        Some((OrderAction::Buy, "Consistent positive momentum"))
    } else if all_sign(window, |c| c.revenue, false) {
        Some((OrderAction::Sell, "Consistent negative momentum"))
    } else {
        None
    }
}

fn contrarian_investor(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    if v.changes.len() <= 5 {
        return None;
    }
    if all_sign(&v.changes, |c| c.revenue, false) {
        Some((OrderAction::Buy, "Potential overreaction to consistent decline"))
    } else if all_sign(&v.changes, |c| c.revenue, true) {
        Some((OrderAction::Sell, "Potential overreaction to consistent rise"))
    } else {
        None
    }
}

fn algorithmic_trader(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let signal: f64 = v.changes.iter().map(|c| c.revenue).sum();
    if signal > 0.0 {
        Some((OrderAction::Buy, "Positive cumulative revenue signal"))
    } else if signal < 0.0 {
        Some((OrderAction::Sell, "Negative cumulative revenue signal"))
    } else {
        None
    }
}

fn dividend_investor(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    if last.profit_margin > 0.01 {
        Some((OrderAction::Buy, "Margin improvement supporting dividends"))
    } else if last.profit_margin < -0.01 {
        Some((OrderAction::Sell, "Margin decline threatening dividends"))
    } else {
        None
    }
}

fn technical_analyst(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    // Five-period simple moving average with a fixed divisor; short histories
    // dilute toward zero rather than skipping the signal.
    let ma: f64 = v.tail(5).iter().map(|c| c.revenue).sum::<f64>() / 5.0;
    if last.revenue > ma {
        Some((OrderAction::Buy, "Revenue change above moving average"))
    } else if last.revenue < ma {
        Some((OrderAction::Sell, "Revenue change below moving average"))
    } else {
        None
    }
}

fn fundamental_analyst(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    if last.clv_cac_ratio > 0.0 && last.production_efficiency_index > 0.0 {
        Some((OrderAction::Buy, "Improving operational efficiency"))
    } else if last.clv_cac_ratio < 0.0 && last.production_efficiency_index < 0.0 {
        Some((OrderAction::Sell, "Declining operational efficiency"))
    } else {
        None
    }
}

fn swing_trader(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let swing: f64 = v.tail(3).iter().map(|c| c.revenue).sum();
    if swing > 0.05 {
        Some((OrderAction::Buy, "Short-term upward swing detected"))
    } else if swing < -0.05 {
        Some((OrderAction::Sell, "Short-term downward swing detected"))
    } else {
        None
    }
}

fn event_driven_trader(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let last = v.last()?;
    if last.revenue.abs() > 0.1 || last.profit_margin.abs() > 0.05 {
        let action = if last.revenue > 0.0 {
            OrderAction::Buy
        } else {
            OrderAction::Sell
        };
        Some((action, "Significant metric move suggesting a major event"))
    } else {
        None
    }
}

fn quant_trader(v: &MarketView) -> Option<(OrderAction, &'static str)> {
    let score: f64 = v.weighted.iter().sum();
    if score > 0.1 {
        Some((OrderAction::Buy, "Positive composite score across weighted changes"))
    } else if score < -0.1 {
        Some((OrderAction::Sell, "Negative composite score across weighted changes"))
    } else {
        None
    }
}

/// The thirteen pure personas that evaluate before the order-dependent FOMO
/// trader. Order matters only for the FOMO tally, which sees exactly these.
pub fn pure_personas() -> &'static [Persona] {
    const PERSONAS: &[Persona] = &[
        Persona { name: "Trend Follower", eval: trend_follower },
        Persona { name: "Long-term Investor", eval: long_term_investor },
        Persona { name: "Short Seller", eval: short_seller },
        Persona { name: "Value Investor", eval: value_investor },
        Persona { name: "Growth Investor", eval: growth_investor },
        Persona { name: "Momentum Trader", eval: momentum_trader },
        Persona { name: "Contrarian Investor", eval: contrarian_investor },
        Persona { name: "Algorithmic Trader", eval: algorithmic_trader },
        Persona { name: "Dividend Investor", eval: dividend_investor },
        Persona { name: "Technical Analyst", eval: technical_analyst },
        Persona { name: "Fundamental Analyst", eval: fundamental_analyst },
        Persona { name: "Swing Trader", eval: swing_trader },
        Persona { name: "Event-Driven Trader", eval: event_driven_trader },
    ];
    PERSONAS
}

fn order(persona: &str, action: OrderAction, reason: &str) -> Order {
    Order {
        persona: persona.to_string(),
        action,
        reason: reason.to_string(),
    }
}

/// Run every persona over the view. The FOMO trader reacts to the tally of
/// the pure personas, the noise trader is the single randomized participant,
/// and the quant trader closes the book.
pub fn evaluate_personas<R: Rng>(view: &MarketView, rng: &mut R) -> Vec<Order> {
    let mut orders: Vec<Order> = Vec::new();
    for persona in pure_personas() {
        if let Some((action, reason)) = (persona.eval)(view) {
            orders.push(order(persona.name, action, reason));
        }
    }

    // FOMO trader: must run after the tally it reacts to.
    let buys = orders.iter().filter(|o| o.action == OrderAction::Buy).count();
    let sells = orders.iter().filter(|o| o.action == OrderAction::Sell).count();
    if sells > buys * 2 {
        orders.push(order(
            "FOMO Trader",
            OrderAction::Sell,
            "Following the crowd in a strong sell trend",
        ));
    } else if buys > sells * 2 {
        orders.push(order(
            "FOMO Trader",
            OrderAction::Buy,
            "Following the crowd in a strong buy trend",
        ));
    }

    // Noise trader: the one randomized persona, gated on a real fluctuation.
    if let Some(last) = view.last() {
        if last.revenue.abs() > 0.01 {
            let action = if rng.gen_bool(0.5) {
                OrderAction::Buy
            } else {
                OrderAction::Sell
            };
            orders.push(order(
                "Noise Trader",
                action,
                "Random decision based on minor fluctuations",
            ));
        }
    }

    if let Some((action, reason)) = quant_trader(view) {
        orders.push(order("Quant Trader", action, reason));
    }

    orders
}

/// Result of one market evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketOutcome {
    pub orders: Vec<Order>,
    pub new_share_price: f64,
}

/// Mean market sentiment over the last up-to-3 snapshots, clamped to [0, 1]
/// so the sentiment factor stays within [0.9, 1.1].
fn market_sentiment(snapshots: &[KpiSnapshot]) -> f64 {
    let start = snapshots.len().saturating_sub(3);
    let window = &snapshots[start..];
    if window.is_empty() {
        return 0.5;
    }
    let mean = avg(
        window
            .iter()
            .map(|s| (s.innovation_index + s.market_share + s.profit_margin) / 3.0),
        window.len(),
    );
    mean.clamp(0.0, 1.0)
}

/// Evaluate the full KPI history (newest snapshot last) and produce the order
/// book plus the bounded new share price. The previous price defaults to
/// `DEFAULT_SHARE_PRICE` when the history carries none.
pub fn simulate_market<R: Rng>(history: &[KpiSnapshot], rng: &mut R) -> MarketOutcome {
    let view = MarketView::new(history);
    let previous = history
        .last()
        .map(|s| s.share_price)
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(DEFAULT_SHARE_PRICE);

    if view.changes.is_empty() {
        debug!("market: no usable change history, price unchanged");
        return MarketOutcome {
            orders: vec![],
            new_share_price: round2(previous),
        };
    }

    let orders = evaluate_personas(&view, rng);
    let buys = orders.iter().filter(|o| o.action == OrderAction::Buy).count() as f64;
    let sells = orders.iter().filter(|o| o.action == OrderAction::Sell).count() as f64;
    let net_order_effect = (buys - sells) / (buys + sells).max(1.0);

    let sentiment_factor = 1.0 + (market_sentiment(&view.snapshots) - 0.5) * 0.2;
    let price_change = net_order_effect * sentiment_factor * PRICE_IMPACT_CAP;
    let new_share_price = round2(previous * (1.0 + price_change));
    debug!(
        buys,
        sells, net_order_effect, sentiment_factor, price_change, new_share_price, "market evaluated"
    );

    MarketOutcome {
        orders,
        new_share_price,
    }
}
