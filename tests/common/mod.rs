//! Scripted in-memory backend shared by the integration tests.
//!
//! Every call is appended to a journal so tests can assert ordering.
//! Generation, apply and umap outcomes are popped from per-call scripts; when a
//! script runs dry the call succeeds with a response derived from its
//! parameters (cost = gcf_size, effectiveness = 0.5).

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map};

use glancekit::api::{
    Algorithm, ApiError, AvailableResources, Backend, Columnar, DataTables, EffCost, EffCostMap, Embedding,
    GenerationParams, GenerationResponse, UploadKind, UploadReceipt,
};

#[derive(Default)]
pub struct FakeBackend {
    journal: Mutex<Vec<String>>,
    generate_params: Mutex<Vec<GenerationParams>>,
    generate_script: Mutex<VecDeque<Result<GenerationResponse, ApiError>>>,
    apply_script: Mutex<VecDeque<Result<Columnar, ApiError>>>,
    umap_script: Mutex<VecDeque<Result<Embedding, ApiError>>>,
    algorithm_failures: Mutex<HashMap<Algorithm, ApiError>>,
    uploads: Mutex<Vec<(UploadKind, String, Vec<u8>)>>,
    fail_resources: Mutex<Option<ApiError>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_generate(&self, outcome: Result<GenerationResponse, ApiError>) -> &Self {
        self.generate_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_apply(&self, outcome: Result<Columnar, ApiError>) -> &Self {
        self.apply_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_umap(&self, outcome: Result<Embedding, ApiError>) -> &Self {
        self.umap_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn fail_algorithm(&self, algorithm: Algorithm, err: ApiError) {
        self.algorithm_failures.lock().unwrap().insert(algorithm, err);
    }

    pub fn fail_resources(&self, err: ApiError) {
        *self.fail_resources.lock().unwrap() = Some(err);
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn generate_params(&self) -> Vec<GenerationParams> {
        self.generate_params.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(UploadKind, String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

pub fn generation(eff: f64, cost: f64) -> GenerationResponse {
    let mut plot = EffCostMap::new();
    plot.insert(1, EffCost { eff, cost });
    GenerationResponse {
        actions: vec![json!({"age": 2.0, "priors_count": -1.0}).as_object().cloned().unwrap_or_default()],
        total_effectiveness: eff,
        total_cost: cost,
        affected_clusters: json!({"Chosen_Action": {"0": 1, "1": 1}}),
        eff_cost_actions: plot.clone(),
        eff_cost_plot: plot,
    }
}

pub fn applied() -> Columnar {
    let mut columns = Map::new();
    columns.insert("age".into(), json!({"0": 30, "1": 41}));
    columns.insert("label".into(), json!({"0": 1, "1": 1}));
    columns
}

pub fn rejected(detail: &str) -> ApiError {
    ApiError::Rejected { detail: Some(detail.to_string()) }
}

fn tables(rows: usize) -> DataTables {
    let row = |i: usize| json!({"age": 20 + i, "label": 0}).as_object().cloned().unwrap_or_default();
    DataTables {
        data: (0..rows).map(row).collect(),
        x_test: (0..rows).map(row).collect(),
        affected: (0..rows / 2).map(row).collect(),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn available_resources(&self) -> Result<AvailableResources, ApiError> {
        self.record("resources".into());
        if let Some(err) = self.fail_resources.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(AvailableResources {
            datasets: vec!["COMPAS Dataset".into(), "Default Credit".into()],
            models: vec!["XGBoost".into(), "DNN".into()],
        })
    }

    async fn available_cf_methods(&self) -> Result<Vec<String>, ApiError> {
        self.record("cf_methods".into());
        Ok(vec!["Dice".into(), "NearestNeighbors".into(), "RandomSampling".into()])
    }

    async fn load_dataset_and_model(&self, dataset: &str, model: &str) -> Result<DataTables, ApiError> {
        self.record(format!("load:{}:{}", dataset, model));
        Ok(tables(4))
    }

    async fn get_data(&self) -> Result<DataTables, ApiError> {
        self.record("get_data".into());
        Ok(tables(2))
    }

    async fn available_features(&self) -> Result<Vec<String>, ApiError> {
        self.record("features".into());
        Ok(vec!["age".into(), "priors_count".into(), "label".into()])
    }

    async fn generate(&self, algorithm: Algorithm, params: &GenerationParams) -> Result<GenerationResponse, ApiError> {
        self.record(format!("generate:{}", algorithm.endpoint()));
        self.generate_params.lock().unwrap().push(params.clone());
        if let Some(err) = self.algorithm_failures.lock().unwrap().get(&algorithm) {
            return Err(err.clone());
        }
        match self.generate_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(generation(0.5, params.gcf_size as f64)),
        }
    }

    async fn apply_affected_actions(&self) -> Result<Columnar, ApiError> {
        self.record("apply".into());
        self.apply_script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(applied()))
    }

    async fn umap_reduce(&self, dataset_identifier: &str, n_components: u32) -> Result<Embedding, ApiError> {
        self.record(format!("umap:{}:{}", dataset_identifier, n_components));
        if let Some(outcome) = self.umap_script.lock().unwrap().pop_front() {
            return outcome;
        }
        let mut reduced = Map::new();
        reduced.insert("0".into(), json!({"0": 0.1, "1": 0.2}));
        reduced.insert("1".into(), json!({"0": 1.5, "1": -0.3}));
        Ok(Embedding { reduced_data: reduced })
    }

    async fn upload(&self, kind: UploadKind, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, ApiError> {
        self.record(format!("upload:{}", kind.path()));
        self.uploads.lock().unwrap().push((kind, file_name.to_string(), bytes));
        Ok(UploadReceipt { message: "File uploaded successfully".into(), columns: vec!["age".into(), "label".into()] })
    }

    async fn register_target_name(&self, target_name: &str) -> Result<String, ApiError> {
        self.record(format!("target:{}", target_name));
        Ok(target_name.to_string())
    }
}
