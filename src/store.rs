//! Session state and its reducer: (State, Action) -> State
//!
//! All session state lives in [`GlanceState`]. It is only mutated through
//! [`reduce`], one action at a time, after each backend call resolves.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::{AvailableResources, Columnar, DataTables, Embedding, GenerationResponse, UploadKind, UploadReceipt};
use crate::compare::{ComparisonFailure, ComparisonReport, ModelComparison};
use crate::sweep::SweepResults;

/// Action-selection strategies the backend understands.
pub const ACTION_STRATEGIES: [&str; 3] = ["Max Effectiveness", "Min Cost", "Mean Action"];

/// Long-running operation tracked by a loading flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Initial,
    Dataset,
    Data,
    Features,
    Target,
    Generation,
    Apply,
    Umap,
    Upload,
    Sweep,
    Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlanceState {
    // view
    pub view_option: String,
    pub selected_tab: u32,
    pub active_step: u32,
    pub show_umap_in_tab1: bool,
    pub show_umap_scatter: bool,
    pub error: Option<String>,

    // resources and selection
    pub available_resources: AvailableResources,
    pub available_cf_methods: Vec<String>,
    pub available_features: Vec<String>,
    pub available_action_strategies: Vec<String>,
    pub selected_features: Vec<String>,
    pub selected_model: Option<String>,
    pub selected_dataset: Option<String>,
    pub target_name: Option<String>,

    // loading
    pub loading: bool,
    pub initial_loading: bool,
    pub dataset_loading: bool,
    pub umap_loader: bool,
    pub comparative_loading: bool,
    pub model_comparative_loading: bool,

    // results
    pub tables: Option<DataTables>,
    pub generation: Option<GenerationResponse>,
    pub applied_actions: Option<Columnar>,
    pub umap_results: BTreeMap<String, Embedding>,
    pub comparative_results: SweepResults,
    pub model_comparisons: Vec<ModelComparison>,
    pub model_comparison_errors: Vec<ComparisonFailure>,
    pub last_upload: Option<(UploadKind, UploadReceipt)>,
}

impl Default for GlanceState {
    fn default() -> Self {
        Self {
            view_option: "affected".to_string(),
            selected_tab: 1,
            active_step: 1,
            show_umap_in_tab1: true,
            show_umap_scatter: false,
            error: None,
            available_resources: AvailableResources::default(),
            available_cf_methods: Vec::new(),
            available_features: Vec::new(),
            available_action_strategies: Vec::new(),
            selected_features: Vec::new(),
            selected_model: Some("XGBoost".to_string()),
            selected_dataset: Some("COMPAS Dataset".to_string()),
            target_name: None,
            loading: false,
            initial_loading: true,
            dataset_loading: false,
            umap_loader: true,
            comparative_loading: false,
            model_comparative_loading: false,
            tables: None,
            generation: None,
            applied_actions: None,
            umap_results: BTreeMap::new(),
            comparative_results: SweepResults::default(),
            model_comparisons: Vec::new(),
            model_comparison_errors: Vec::new(),
            last_upload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // selection and view
    SetSelectedFeatures(Vec<String>),
    SetSelectedModel(String),
    SetSelectedDataset(String),
    SetViewOption(String),
    SetShowUmapScatter(bool),
    SetShowUmapInTab1(bool),
    SetSelectedTab(u32),
    SetActiveStep(u32),

    // request lifecycle
    Pending(Op),
    Rejected(Op, String),

    // fulfilled
    InitialLoaded {
        resources: AvailableResources,
        cf_methods: Vec<String>,
        tables: DataTables,
    },
    DatasetLoaded(DataTables),
    DataLoaded(DataTables),
    FeaturesLoaded(Vec<String>),
    TargetRegistered(String),
    Generated(GenerationResponse),
    ActionsApplied(Columnar),
    Embedded { identifier: String, embedding: Embedding },
    Uploaded(UploadKind, UploadReceipt),
    SweepFinished(SweepResults),
    ComparisonFinished(ComparisonReport),
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn set_loading(state: &mut GlanceState, op: Op, on: bool) {
    match op {
        Op::Initial => state.initial_loading = on,
        Op::Dataset => state.dataset_loading = on,
        Op::Umap => state.umap_loader = on,
        Op::Sweep => state.comparative_loading = on,
        Op::Comparison => state.model_comparative_loading = on,
        Op::Data | Op::Features | Op::Target | Op::Generation | Op::Apply | Op::Upload => state.loading = on,
    }
}

/// Apply one action to the state.
pub fn reduce(state: &mut GlanceState, action: Action) {
    match action {
        Action::SetSelectedFeatures(features) => state.selected_features = features,
        Action::SetSelectedModel(model) => {
            push_unique(&mut state.available_resources.models, &model);
            state.selected_model = Some(model);
        }
        Action::SetSelectedDataset(dataset) => {
            push_unique(&mut state.available_resources.datasets, &dataset);
            state.selected_dataset = Some(dataset);
        }
        Action::SetViewOption(option) => state.view_option = option,
        Action::SetShowUmapScatter(show) => state.show_umap_scatter = show,
        Action::SetShowUmapInTab1(show) => state.show_umap_in_tab1 = show,
        Action::SetSelectedTab(tab) => state.selected_tab = tab,
        Action::SetActiveStep(step) => state.active_step = step,

        Action::Pending(op) => {
            set_loading(state, op, true);
            match op {
                Op::Generation => state.error = None,
                Op::Dataset => state.umap_loader = true,
                Op::Data => state.tables = None,
                _ => {}
            }
        }
        Action::Rejected(op, message) => {
            set_loading(state, op, false);
            state.error = Some(message);
        }

        Action::InitialLoaded { resources, cf_methods, tables } => {
            state.initial_loading = false;
            state.available_resources = resources;
            state.available_cf_methods = cf_methods;
            state.available_action_strategies = ACTION_STRATEGIES.iter().map(|s| s.to_string()).collect();
            state.tables = Some(tables);
            state.error = None;
        }
        Action::DatasetLoaded(tables) => {
            state.dataset_loading = false;
            state.umap_loader = true;
            state.tables = Some(tables);
            state.generation = None;
            state.comparative_results = SweepResults::default();
            state.model_comparisons.clear();
            state.model_comparison_errors.clear();
            state.error = None;
        }
        Action::DataLoaded(tables) => {
            state.loading = false;
            state.tables = Some(tables);
            state.error = None;
        }
        Action::FeaturesLoaded(features) => {
            state.loading = false;
            state.available_features = match state.target_name.as_deref() {
                Some(target) if !target.is_empty() => features.into_iter().filter(|f| f != target).collect(),
                _ => features,
            };
            state.error = None;
        }
        Action::TargetRegistered(name) => {
            state.loading = false;
            state.target_name = Some(name);
            state.error = None;
        }
        Action::Generated(generation) => {
            state.loading = false;
            // A dataset switch in flight makes this result stale.
            state.generation = if state.dataset_loading { None } else { Some(generation) };
            state.error = None;
        }
        Action::ActionsApplied(applied) => {
            state.loading = false;
            state.applied_actions = Some(applied);
            state.error = None;
        }
        Action::Embedded { identifier, embedding } => {
            state.umap_loader = false;
            state.umap_results.insert(identifier, embedding);
            state.error = None;
        }
        Action::Uploaded(kind, receipt) => {
            state.loading = false;
            state.last_upload = Some((kind, receipt));
        }
        Action::SweepFinished(results) => {
            state.comparative_loading = false;
            state.comparative_results = results;
            state.error = None;
        }
        Action::ComparisonFinished(report) => {
            state.model_comparative_loading = false;
            state.error = None;
            for result in report.results {
                let exists = state
                    .model_comparisons
                    .iter()
                    .any(|r| r.algorithm == result.algorithm && r.gcf_size == result.gcf_size);
                if !exists {
                    state.model_comparisons.push(result);
                }
            }
            state.model_comparison_errors = report.errors;
        }
    }
}
