//! Sweep orchestration tests against a scripted backend.
//!
//! Test categories:
//!   1. Keying             -- one entry per candidate, `{prefix}_{value}`
//!   2. Rejections         -- a 400 becomes that candidate's error entry
//!   3. Downstream         -- apply/umap failure hides partial success data
//!   4. Abort              -- any other generation failure stops the sweep
//!   5. Call ordering      -- generate -> apply -> umap, one candidate at a time
//!   6. Request shaping    -- exactly one parameter varies per call

mod common;

use common::{applied, generation, rejected, FakeBackend};
use serde_json::json;

use glancekit::api::{Algorithm, ApiError};
use glancekit::config::Config;
use glancekit::reshape::comparative_points;
use glancekit::sweep::{
    run_sweep, FixedParameters, ParamValue, SweepDimension, SweepRequest, DOWNSTREAM_ERROR, UNKNOWN_REJECTION,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn request(algorithm: Algorithm, dimension: SweepDimension, candidates: Vec<ParamValue>) -> SweepRequest {
    let cfg = Config { algorithm, ..Config::default() };
    SweepRequest { dimension, candidates, fixed: FixedParameters::from_config(&cfg, vec!["age".into()]) }
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Int).collect()
}

// ---------------------------------------------------------------------------
// 1. Keying
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_entry_per_candidate_in_order() {
    let backend = FakeBackend::new();
    let req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[1, 3, 5]));

    let results = run_sweep(&backend, &req).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["size_1", "size_3", "size_5"]);
    assert_eq!(results.succeeded(), 3);
}

#[tokio::test]
async fn text_candidates_key_by_value() {
    let backend = FakeBackend::new();
    let req = request(
        Algorithm::CGlance,
        SweepDimension::Strategy,
        vec!["Max Effectiveness".into(), "Min Cost".into()],
    );

    let results = run_sweep(&backend, &req).await.unwrap();

    assert_eq!(
        results.keys().collect::<Vec<_>>(),
        vec!["strategy_Max Effectiveness", "strategy_Min Cost"]
    );
}

#[tokio::test]
async fn duplicate_candidates_collapse_to_one_key() {
    let backend = FakeBackend::new();
    backend.script_generate(Ok(generation(0.2, 1.0)));
    backend.script_generate(Ok(generation(0.9, 7.0)));
    let req = request(Algorithm::GroupCfe, SweepDimension::ActionCount, ints(&[2, 2]));

    let results = run_sweep(&backend, &req).await.unwrap();

    assert_eq!(results.len(), 1);
    let entry = results.get("size_2").and_then(|e| e.success()).unwrap();
    assert_eq!(entry.generation.total_cost, 7.0);
}

#[tokio::test]
async fn empty_candidates_make_no_calls() {
    let backend = FakeBackend::new();
    // Not sweepable for GLOBE_CE, but an empty list short-circuits first.
    let req = request(Algorithm::GlobeCe, SweepDimension::Method, vec![]);

    let results = run_sweep(&backend, &req).await.unwrap();

    assert!(results.is_empty());
    assert!(backend.journal().is_empty());
}

// ---------------------------------------------------------------------------
// 2. Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejection_detail_becomes_entry_and_sweep_continues() {
    let backend = FakeBackend::new();
    backend.script_generate(Ok(generation(0.4, 2.0)));
    backend.script_generate(Err(rejected("no cf found")));
    backend.script_generate(Ok(generation(0.6, 4.0)));
    let req = request(
        Algorithm::CGlance,
        SweepDimension::Method,
        vec!["Dice".into(), "NearestNeighbors".into(), "RandomSampling".into()],
    );

    let results = run_sweep(&backend, &req).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.get("method_NearestNeighbors").and_then(|e| e.error()), Some("no cf found"));
    assert!(results.get("method_RandomSampling").and_then(|e| e.success()).is_some());

    let as_json = serde_json::to_value(&results).unwrap();
    assert_eq!(as_json["method_NearestNeighbors"], json!({"error": "no cf found"}));
}

#[tokio::test]
async fn rejection_without_detail_uses_generic_message() {
    let backend = FakeBackend::new();
    backend.script_generate(Err(ApiError::Rejected { detail: None }));
    let req = request(Algorithm::GlobeCe, SweepDimension::Direction, ints(&[1]));

    let results = run_sweep(&backend, &req).await.unwrap();

    assert_eq!(results.get("direction_1").and_then(|e| e.error()), Some(UNKNOWN_REJECTION));
}

#[tokio::test]
async fn rejected_candidate_skips_downstream_calls() {
    let backend = FakeBackend::new();
    backend.script_generate(Err(rejected("no cf found")));
    let req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[4]));

    run_sweep(&backend, &req).await.unwrap();

    assert_eq!(backend.journal(), vec!["generate:run-c_glance"]);
}

// ---------------------------------------------------------------------------
// 3. Downstream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn downstream_failure_hides_partial_success() {
    let backend = FakeBackend::new();
    backend.script_apply(Err(ApiError::Status { status: 500, body: "boom".into() }));
    backend.script_apply(Ok(applied()));
    let req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[1, 2]));

    let results = run_sweep(&backend, &req).await.unwrap();

    let as_json = serde_json::to_value(&results).unwrap();
    assert_eq!(as_json["size_1"], json!({"error": DOWNSTREAM_ERROR}));
    assert!(as_json["size_2"].get("TotalCost").is_some());
    assert!(as_json["size_2"].get("applyAffectedActions").is_some());
    assert!(as_json["size_2"].get("umapOfAppliedAffected").is_some());
}

#[tokio::test]
async fn embedding_failure_is_a_downstream_error_and_sweep_continues() {
    let backend = FakeBackend::new();
    backend.script_umap(Err(ApiError::Transport("connection reset".into())));
    let req = request(Algorithm::GlobeCe, SweepDimension::FeatureCount, ints(&[1, 2]));

    let results = run_sweep(&backend, &req).await.unwrap();

    let as_json = serde_json::to_value(&results).unwrap();
    assert_eq!(as_json["features_to_change_1"], json!({"error": DOWNSTREAM_ERROR}));
    assert!(results.get("features_to_change_2").and_then(|e| e.success()).is_some());
    assert_eq!(backend.journal().iter().filter(|c| c.starts_with("umap")).count(), 2);
}

// ---------------------------------------------------------------------------
// 4. Abort
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_rejection_generation_failure_aborts() {
    let backend = FakeBackend::new();
    backend.script_generate(Ok(generation(0.5, 1.0)));
    backend.script_generate(Err(ApiError::Status { status: 500, body: "internal".into() }));
    let req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[1, 2, 3]));

    let err = run_sweep(&backend, &req).await.unwrap_err();

    assert!(err.to_string().contains("size_2"));
    assert_eq!(err.downcast_ref::<ApiError>().map(ApiError::is_rejection), Some(false));
    let generates = backend.journal().iter().filter(|c| c.starts_with("generate")).count();
    assert_eq!(generates, 2);
}

#[tokio::test]
async fn unsupported_dimension_is_rejected_before_any_call() {
    let backend = FakeBackend::new();
    let req = request(Algorithm::GroupCfe, SweepDimension::Method, vec!["Dice".into()]);

    assert!(run_sweep(&backend, &req).await.is_err());
    assert!(backend.journal().is_empty());
}

#[tokio::test]
async fn wrong_candidate_kind_is_rejected_before_any_call() {
    let backend = FakeBackend::new();
    let req = request(
        Algorithm::CGlance,
        SweepDimension::ActionCount,
        vec![ParamValue::Int(1), "two".into()],
    );

    assert!(run_sweep(&backend, &req).await.is_err());
    assert!(backend.journal().is_empty());
}

// ---------------------------------------------------------------------------
// 5. Call ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn calls_are_strictly_sequential_per_candidate() {
    let backend = FakeBackend::new();
    let req = request(Algorithm::GlobeCe, SweepDimension::FeatureCount, ints(&[1, 2]));

    run_sweep(&backend, &req).await.unwrap();

    assert_eq!(
        backend.journal(),
        vec![
            "generate:run-globece",
            "apply",
            "umap:appliedAffected:2",
            "generate:run-globece",
            "apply",
            "umap:appliedAffected:2",
        ]
    );
}

// ---------------------------------------------------------------------------
// 6. Request shaping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_the_swept_parameter_varies() {
    let backend = FakeBackend::new();
    let req = request(Algorithm::GlobeCe, SweepDimension::Direction, ints(&[1, 2, 3]));

    run_sweep(&backend, &req).await.unwrap();

    let params = backend.generate_params();
    assert_eq!(params.iter().map(|p| p.direction).collect::<Vec<_>>(), vec![1, 2, 3]);
    for p in &params {
        assert_eq!(p.gcf_size, req.fixed.action_count);
        assert_eq!(p.cf_method, req.fixed.method);
        assert_eq!(p.action_choice_strategy, req.fixed.strategy);
        assert_eq!(p.features_to_change, req.fixed.feature_count);
        assert_eq!(p.selected_features, vec!["age".to_string()]);
    }
}

#[tokio::test]
async fn empty_feature_selection_sends_null_body() {
    let backend = FakeBackend::new();
    let mut req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[2]));
    req.fixed.selected_features.clear();

    run_sweep(&backend, &req).await.unwrap();

    assert_eq!(backend.generate_params()[0].body(), serde_json::Value::Null);
}

#[tokio::test]
async fn comparative_view_formats_fraction_as_percent() {
    let backend = FakeBackend::new();
    backend.script_generate(Ok(generation(0.4567, 3.0)));
    backend.script_generate(Err(rejected("no cf found")));
    let req = request(Algorithm::CGlance, SweepDimension::ActionCount, ints(&[3, 4]));

    let results = run_sweep(&backend, &req).await.unwrap();
    let view = comparative_points(&results);

    assert_eq!(view.points.len(), 1);
    assert_eq!(view.points[0].display_key, "3");
    assert_eq!(view.points[0].effectiveness_display, "45.67%");
    assert_eq!(view.errors, vec![("size_4".to_string(), "no cf found".to_string())]);
}
