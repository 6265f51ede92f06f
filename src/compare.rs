//! Side-by-side comparison of generation algorithms at one action count.
//!
//! Unlike a sweep, each algorithm's request is fully specified by its
//! parameters, so the runs are issued concurrently and joined.

use futures_util::future::join_all;
use serde::Serialize;

use crate::api::{Algorithm, ApiError, Backend, EffCost, EffCostMap, GenerationParams};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Fallback message for failures that carry no backend detail.
pub const COMPARISON_ERROR: &str = "An error occurred. Please try again.";

/// Parameters every algorithm is compared under, apart from `gcf_size`.
pub fn comparison_params(gcf_size: i64) -> GenerationParams {
    GenerationParams {
        gcf_size,
        cf_method: "Dice".to_string(),
        action_choice_strategy: "Max Effectiveness".to_string(),
        direction: 1,
        features_to_change: 5,
        selected_features: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComparison {
    pub algorithm: Algorithm,
    pub gcf_size: i64,
    pub eff_cost_plot: EffCostMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonFailure {
    pub algorithm: Algorithm,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub results: Vec<ModelComparison>,
    pub errors: Vec<ComparisonFailure>,
}

/// Run every algorithm concurrently; a failing algorithm does not affect
/// the others. Results keep the order of `algorithms`.
pub async fn compare_algorithms<B: Backend + ?Sized>(
    backend: &B,
    algorithms: &[Algorithm],
    gcf_size: i64,
) -> ComparisonReport {
    let params = comparison_params(gcf_size);
    let runs = algorithms.iter().map(|&algorithm| {
        let params = &params;
        async move { (algorithm, backend.generate(algorithm, params).await) }
    });

    let mut report = ComparisonReport::default();
    for (algorithm, outcome) in join_all(runs).await {
        match outcome {
            Ok(resp) => report.results.push(ModelComparison {
                algorithm,
                gcf_size,
                eff_cost_plot: resp.eff_cost_plot,
            }),
            Err(err) => {
                let error = comparison_error_message(&err);
                log(
                    Level::Warn,
                    Domain::Sweep,
                    "comparison_failed",
                    obj(&[("algorithm", v_str(algorithm.endpoint())), ("detail", v_str(&err.to_string()))]),
                );
                report.errors.push(ComparisonFailure { algorithm, error });
            }
        }
    }
    report
}

fn comparison_error_message(err: &ApiError) -> String {
    err.detail().unwrap_or(COMPARISON_ERROR).to_string()
}

/// One point of the effectiveness/cost-per-step chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPoint {
    pub step: u64,
    pub eff: f64,
    pub cost: f64,
    pub run: &'static str,
}

/// Flatten comparison results into chart points. Each run starts with a
/// zero step and is shifted right by `index * (gcf_size + 1)` so runs sit
/// side by side on one axis.
pub fn comparison_series(results: &[ModelComparison], gcf_size: i64) -> Vec<PlotPoint> {
    let stride = u64::try_from(gcf_size).unwrap_or(0).saturating_add(1);
    let mut points = Vec::new();
    for (index, result) in results.iter().enumerate() {
        let offset = (index as u64).saturating_mul(stride);
        let mut steps = result.eff_cost_plot.clone();
        steps.entry(0).or_insert(EffCost { eff: 0.0, cost: 0.0 });
        for (step, ec) in steps {
            points.push(PlotPoint {
                step: u64::from(step).saturating_add(offset),
                eff: ec.eff,
                cost: ec.cost,
                run: result.algorithm.display_name(),
            });
        }
    }
    points
}
