#![deny(warnings)]

//! Headless CLI: runs business cycles against the scripted gateway and
//! prints the event stream as newline-delimited JSON.

use anyhow::Result;
use sim_engine::{BusinessEngine, CycleEvent, EngineConfig, Update};
use sim_gateway::scripted::ScriptedGateway;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const BUSINESS_OVERVIEW: &str = "\
Universal Paperclips is a two-year-old startup operating in the paperclip \
industry. It integrates AI technology into production and business processes, \
serves the B2B office supply sector and specialized industries, and runs a \
single California manufacturing facility with 50 employees.";

const ADVICE_SCRIPT: [&str; 4] = [
    "Focus on premium segments and protect margins.",
    "Invest in production automation before expanding.",
    "Double down on the aerospace niche.",
    "Cut customer acquisition costs and nurture existing accounts.",
];

fn parse_args() -> (u32, u64) {
    let mut cycles: u32 = 3;
    let mut seed: u64 = 42;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--cycles" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    cycles = v;
                }
            }
            "--seed" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    seed = v;
                }
            }
            _ => {}
        }
    }
    (cycles, seed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let (cycles, seed) = parse_args();
    info!(cycles, seed, "starting headless simulation");

    let gateway = Arc::new(ScriptedGateway::default().with_impact_score(2));
    let engine = BusinessEngine::new(gateway, EngineConfig { rng_seed: seed });

    let mut state = engine
        .new_game("local-user", "local-game", "local-session", BUSINESS_OVERVIEW)
        .await;
    for message in &state.messages {
        println!("{}", serde_json::to_string(message)?);
    }

    for turn in 0..cycles {
        let advice = ADVICE_SCRIPT[turn as usize % ADVICE_SCRIPT.len()];
        let (tx, mut rx) = mpsc::channel::<CycleEvent>(16);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("failed to encode event: {e}"),
                }
            }
        });
        let result = engine.run_cycle(&state, advice, &tx).await;
        drop(tx);
        printer.await?;
        state = result?;
    }

    let final_event = CycleEvent::Update(Update::GameState(Box::new(state.clone())));
    println!("{}", serde_json::to_string(&final_event)?);

    if let Some(latest) = state.kpi_history.last() {
        info!(
            cycle = state.current_cycle,
            revenue = latest.revenue,
            share_price = latest.share_price,
            "simulation finished"
        );
    }
    Ok(())
}
