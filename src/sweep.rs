//! Comparative parameter sweep.
//!
//! A sweep repeats counterfactual generation once per candidate value of a
//! single parameter and, for each successful run, applies the generated
//! actions to the affected population and embeds the result in 2-D.
//!
//! The backend keeps the "current run" in server-side session state:
//! `apply_affected_actions` and the `appliedAffected` embedding read what the
//! preceding generation call left behind. Every call in a sweep is therefore
//! awaited in order; nothing here may be parallelised.

use anyhow::{anyhow, Result};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::api::{Algorithm, ApiError, Backend, Columnar, Embedding, GenerationParams, GenerationResponse};
use crate::config::Config;
use crate::logging::{log_sweep_candidate, log_sweep_summary, v_str, ProfileScope};

/// Error recorded when generation succeeded but a dependent call failed.
pub const DOWNSTREAM_ERROR: &str = "Error in downstream processing.";
/// Error recorded for a 400 that carried no detail.
pub const UNKNOWN_REJECTION: &str = "Unknown error occurred.";
/// Dataset identifier of the affected population after actions are applied.
pub const APPLIED_AFFECTED: &str = "appliedAffected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SweepDimension {
    ActionCount,
    Method,
    Strategy,
    Direction,
    FeatureCount,
}

impl SweepDimension {
    pub const ALL: [SweepDimension; 5] = [
        SweepDimension::ActionCount,
        SweepDimension::Method,
        SweepDimension::Strategy,
        SweepDimension::Direction,
        SweepDimension::FeatureCount,
    ];

    /// Prefix of result keys, e.g. `size` in `size_3`.
    pub fn prefix(&self) -> &'static str {
        match self {
            SweepDimension::ActionCount => "size",
            SweepDimension::Method => "method",
            SweepDimension::Strategy => "strategy",
            SweepDimension::Direction => "direction",
            SweepDimension::FeatureCount => "features_to_change",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SweepDimension::ActionCount => "Number of Counterfactual Actions",
            SweepDimension::Method => "Local Counterfactual Method",
            SweepDimension::Strategy => "Action Choice Strategy",
            SweepDimension::Direction => "Direction",
            SweepDimension::FeatureCount => "Features to change",
        }
    }

    pub fn takes_text(&self) -> bool {
        matches!(self, SweepDimension::Method | SweepDimension::Strategy)
    }

    pub fn key_for(&self, value: &ParamValue) -> String {
        format!("{}_{}", self.prefix(), value)
    }
}

impl fmt::Display for SweepDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SweepDimension {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        SweepDimension::ALL
            .into_iter()
            .find(|d| d.prefix() == s || d.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("unknown sweep dimension {:?}", s))
    }
}

/// A candidate value for the swept parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Parse a raw CLI token into the kind the dimension expects.
    pub fn parse_for(dimension: SweepDimension, raw: &str) -> Result<Self> {
        if dimension.takes_text() {
            Ok(ParamValue::Text(raw.to_string()))
        } else {
            raw.trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| anyhow!("{} expects integer values, got {:?}", dimension.label(), raw))
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(n) => write!(f, "{}", n),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

/// Parameters held constant across a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedParameters {
    pub action_count: i64,
    pub method: String,
    pub strategy: String,
    pub direction: i64,
    pub feature_count: i64,
    pub selected_features: Vec<String>,
    pub algorithm: Algorithm,
}

impl FixedParameters {
    pub fn from_config(cfg: &Config, selected_features: Vec<String>) -> Self {
        Self {
            action_count: cfg.gcf_size,
            method: cfg.cf_method.clone(),
            strategy: cfg.strategy.clone(),
            direction: cfg.direction,
            feature_count: cfg.features_to_change,
            selected_features,
            algorithm: cfg.algorithm,
        }
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            gcf_size: self.action_count,
            cf_method: self.method.clone(),
            action_choice_strategy: self.strategy.clone(),
            direction: self.direction,
            features_to_change: self.feature_count,
            selected_features: self.selected_features.clone(),
        }
    }

    /// Generation parameters with exactly one field replaced by `value`.
    pub fn with_override(&self, dimension: SweepDimension, value: &ParamValue) -> Result<GenerationParams> {
        let mismatch = || anyhow!("candidate {:?} does not fit {}", value, dimension.label());
        let mut params = self.params();
        match dimension {
            SweepDimension::ActionCount => params.gcf_size = value.as_int().ok_or_else(mismatch)?,
            SweepDimension::Method => params.cf_method = value.as_text().ok_or_else(mismatch)?.to_string(),
            SweepDimension::Strategy => {
                params.action_choice_strategy = value.as_text().ok_or_else(mismatch)?.to_string()
            }
            SweepDimension::Direction => params.direction = value.as_int().ok_or_else(mismatch)?,
            SweepDimension::FeatureCount => params.features_to_change = value.as_int().ok_or_else(mismatch)?,
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRequest {
    pub dimension: SweepDimension,
    pub candidates: Vec<ParamValue>,
    pub fixed: FixedParameters,
}

impl SweepRequest {
    /// Reject requests the backend would misinterpret, before any call.
    pub fn validate(&self) -> Result<()> {
        if !self.fixed.algorithm.supports(self.dimension) {
            return Err(anyhow!(
                "{} cannot be swept for {}",
                self.dimension.label(),
                self.fixed.algorithm.display_name()
            ));
        }
        for candidate in &self.candidates {
            self.fixed.with_override(self.dimension, candidate)?;
        }
        Ok(())
    }
}

/// Merged outcome of one successful candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSuccess {
    #[serde(flatten)]
    pub generation: GenerationResponse,
    #[serde(rename = "applyAffectedActions")]
    pub applied_actions: Columnar,
    #[serde(rename = "umapOfAppliedAffected")]
    pub embedding: Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SweepEntry {
    Success(Box<SweepSuccess>),
    Failure { error: String },
}

impl SweepEntry {
    pub fn error(&self) -> Option<&str> {
        match self {
            SweepEntry::Failure { error } => Some(error),
            SweepEntry::Success(_) => None,
        }
    }

    pub fn success(&self) -> Option<&SweepSuccess> {
        match self {
            SweepEntry::Success(s) => Some(s),
            SweepEntry::Failure { .. } => None,
        }
    }
}

/// Sweep results in candidate order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepResults {
    entries: Vec<(String, SweepEntry)>,
}

impl SweepResults {
    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: String, entry: SweepEntry) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SweepEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SweepEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|(_, e)| e.error().is_some())
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|(_, e)| e.success().is_some()).count()
    }
}

impl Serialize for SweepResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, e)| (k, e)))
    }
}

/// Run one sweep against the backend.
///
/// A 400 rejection becomes an error entry for that candidate and the sweep
/// moves on. Any other generation failure aborts the sweep. A failure in
/// the dependent calls becomes [`DOWNSTREAM_ERROR`].
pub async fn run_sweep<B: Backend + ?Sized>(backend: &B, request: &SweepRequest) -> Result<SweepResults> {
    let mut results = SweepResults::default();
    if request.candidates.is_empty() {
        return Ok(results);
    }
    request.validate()?;

    let dimension = request.dimension;
    let algorithm = request.fixed.algorithm;
    let profile = ProfileScope::with_context(
        "sweep",
        &[("dimension", v_str(dimension.prefix())), ("algorithm", v_str(algorithm.endpoint()))],
    );

    for candidate in &request.candidates {
        let key = dimension.key_for(candidate);
        let params = request.fixed.with_override(dimension, candidate)?;

        let generation = match backend.generate(algorithm, &params).await {
            Ok(generation) => generation,
            Err(ApiError::Rejected { detail }) => {
                let error = detail.unwrap_or_else(|| UNKNOWN_REJECTION.to_string());
                log_sweep_candidate(&key, "rejected", Some(&error));
                results.insert(key, SweepEntry::Failure { error });
                continue;
            }
            Err(err) => {
                log_sweep_candidate(&key, "aborted", Some(&err.to_string()));
                return Err(anyhow::Error::new(err).context(format!("sweep aborted at {}", key)));
            }
        };

        let entry = match downstream(backend).await {
            Ok((applied_actions, embedding)) => {
                log_sweep_candidate(&key, "ok", None);
                SweepEntry::Success(Box::new(SweepSuccess { generation, applied_actions, embedding }))
            }
            Err(err) => {
                log_sweep_candidate(&key, "downstream_failed", Some(&err.to_string()));
                SweepEntry::Failure { error: DOWNSTREAM_ERROR.to_string() }
            }
        };
        results.insert(key, entry);
    }

    log_sweep_summary(dimension.prefix(), results.len(), results.succeeded(), profile.elapsed_ms());
    Ok(results)
}

async fn downstream<B: Backend + ?Sized>(backend: &B) -> Result<(Columnar, Embedding), ApiError> {
    let applied = backend.apply_affected_actions().await?;
    let embedding = backend.umap_reduce(APPLIED_AFFECTED, 2).await?;
    Ok((applied, embedding))
}
