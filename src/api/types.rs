//! Typed request and response schemas for the backend endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Column-major table: field name -> (row id -> value).
pub type Columnar = Map<String, Value>;

/// One row of a row-oriented table.
pub type Record = Map<String, Value>;

/// Both lists are required: on failure the backend answers 200 with
/// `{"error": ...}`, which must not decode as "no resources".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableResources {
    pub datasets: Vec<String>,
    pub models: Vec<String>,
}

/// Working tables returned by `load-dataset-and-model/` and `get-data/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTables {
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(rename = "X_test", default)]
    pub x_test: Vec<Record>,
    #[serde(default)]
    pub affected: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FeatureList {
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffCost {
    pub eff: f64,
    pub cost: f64,
}

/// Action or step index -> effectiveness/cost, ordered numerically.
pub type EffCostMap = BTreeMap<u32, EffCost>;

/// Response of a counterfactual generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub actions: Vec<Record>,
    #[serde(rename = "TotalEffectiveness")]
    pub total_effectiveness: f64,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    /// Columnar in the fresh path; the cached path sends records.
    #[serde(default)]
    pub affected_clusters: Value,
    #[serde(default)]
    pub eff_cost_actions: EffCostMap,
    #[serde(default)]
    pub eff_cost_plot: EffCostMap,
}

impl GenerationResponse {
    /// Effectiveness is a fraction; anything else means the payload is
    /// already scaled or corrupt.
    pub fn validate(&self) -> Result<(), String> {
        let eff = self.total_effectiveness;
        if !eff.is_finite() || !(0.0..=1.0).contains(&eff) {
            return Err(format!("TotalEffectiveness {} outside [0, 1]", eff));
        }
        if !self.total_cost.is_finite() {
            return Err(format!("TotalCost {} is not finite", self.total_cost));
        }
        Ok(())
    }
}

/// Response of `umap-reduce/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    #[serde(default)]
    pub reduced_data: Columnar,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Parameters of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub gcf_size: i64,
    pub cf_method: String,
    pub action_choice_strategy: String,
    pub direction: i64,
    pub features_to_change: i64,
    pub selected_features: Vec<String>,
}

impl GenerationParams {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gcf_size", self.gcf_size.to_string()),
            ("cf_method", self.cf_method.clone()),
            ("action_choice_strategy", self.action_choice_strategy.clone()),
            ("direction", self.direction.to_string()),
            ("features_to_change", self.features_to_change.to_string()),
        ]
    }

    /// An empty selection is sent as `null`, which the backend reads as
    /// "use all features".
    pub fn body(&self) -> Value {
        if self.selected_features.is_empty() {
            Value::Null
        } else {
            Value::Array(self.selected_features.iter().cloned().map(Value::String).collect())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Dataset,
    TestDataset,
    Model,
}

impl UploadKind {
    pub fn path(&self) -> &'static str {
        match self {
            UploadKind::Dataset => "upload/dataset",
            UploadKind::TestDataset => "upload/test_dataset",
            UploadKind::Model => "upload/model",
        }
    }
}

impl std::str::FromStr for UploadKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dataset" => Ok(UploadKind::Dataset),
            "test_dataset" | "test-dataset" => Ok(UploadKind::TestDataset),
            "model" => Ok(UploadKind::Model),
            other => Err(anyhow::anyhow!("unknown upload kind {:?}", other)),
        }
    }
}

/// `get-target_name` answers with a one-element list; older builds send a
/// bare string.
pub(crate) fn target_name_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}
