//! Grid sweep - runs every sweep dimension the configured algorithm
//! supports and prints a cost/effectiveness table per dimension.
//!
//! Usage: cargo run --release --bin sweep -- [max_int_value]

use std::time::Instant;

use anyhow::Result;
use glancekit::api::HttpBackend;
use glancekit::config::Config;
use glancekit::reshape::{comparative_points, format_cost};
use glancekit::session::Session;
use glancekit::store::ACTION_STRATEGIES;
use glancekit::sweep::{FixedParameters, ParamValue, SweepDimension, SweepRequest};

fn candidates(dimension: SweepDimension, max_int: i64, cf_methods: &[String]) -> Vec<ParamValue> {
    match dimension {
        SweepDimension::Method => cf_methods.iter().map(|m| ParamValue::Text(m.clone())).collect(),
        SweepDimension::Strategy => ACTION_STRATEGIES.iter().map(|&s| ParamValue::from(s)).collect(),
        _ => (1..=max_int).map(ParamValue::Int).collect(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let max_int: i64 = std::env::args()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    let cfg = Config::from_env()?;
    let mut session = Session::new(HttpBackend::new(&cfg)?);

    println!("Loading {} / {} from {}...", cfg.dataset, cfg.model, cfg.api_base);
    session.fetch_initial(&cfg.dataset, &cfg.model).await?;
    let cf_methods = session.state().available_cf_methods.clone();
    let fixed = FixedParameters::from_config(&cfg, Vec::new());

    for &dimension in cfg.algorithm.supported_dimensions() {
        let request = SweepRequest {
            dimension,
            candidates: candidates(dimension, max_int, &cf_methods),
            fixed: fixed.clone(),
        };
        let start = Instant::now();
        let results = match session.run_sweep(&request).await {
            Ok(results) => results,
            Err(e) => {
                eprintln!("{} sweep failed: {:#}", dimension.label(), e);
                continue;
            }
        };
        let view = comparative_points(results);

        println!();
        println!("{} ({}, {} ms)", dimension.label(), cfg.algorithm.display_name(), start.elapsed().as_millis());
        println!("{:<28} {:>10} {:>14}", "Value", "Cost", "Effectiveness");
        println!("{}", "-".repeat(54));
        for p in &view.points {
            println!("{:<28} {:>10} {:>14}", p.display_key, format_cost(p.total_cost), p.effectiveness_display);
        }
        for (key, error) in &view.errors {
            println!("{:<28} error: {}", key, error);
        }
    }

    Ok(())
}
