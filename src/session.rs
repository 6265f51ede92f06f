//! Session controller: owns the backend and the state, and wraps every
//! backend call in pending -> call -> fulfilled/rejected transitions.

use anyhow::{Context, Result};
use std::path::Path;

use crate::api::{
    Algorithm, ApiError, Backend, Columnar, DataTables, Embedding, GenerationParams, GenerationResponse,
    UploadKind, UploadReceipt,
};
use crate::compare::{compare_algorithms, ComparisonReport};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::store::{reduce, Action, GlanceState, Op};
use crate::sweep::{run_sweep, SweepRequest, SweepResults};

/// Message shown for a failed call: the backend's detail when it sent one.
fn failure_message(err: &ApiError, fallback: &str) -> String {
    err.detail().unwrap_or(fallback).to_string()
}

pub struct Session<B: Backend> {
    backend: B,
    state: GlanceState,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, state: GlanceState::default() }
    }

    pub fn state(&self) -> &GlanceState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn dispatch(&mut self, action: Action) {
        reduce(&mut self.state, action);
    }

    fn fail(&mut self, op: Op, err: ApiError, fallback: &str) -> anyhow::Error {
        let message = failure_message(&err, fallback);
        log(
            Level::Warn,
            Domain::Session,
            "rejected",
            obj(&[("op", v_str(&format!("{:?}", op))), ("msg", v_str(&message))]),
        );
        self.dispatch(Action::Rejected(op, message));
        anyhow::Error::new(err).context(fallback.to_string())
    }

    /// Resources, counterfactual methods and the default dataset/model,
    /// fetched concurrently.
    pub async fn fetch_initial(&mut self, dataset: &str, model: &str) -> Result<()> {
        self.dispatch(Action::Pending(Op::Initial));
        let joined = tokio::try_join!(
            self.backend.available_resources(),
            self.backend.available_cf_methods(),
            self.backend.load_dataset_and_model(dataset, model),
        );
        match joined {
            Ok((resources, cf_methods, tables)) => {
                self.dispatch(Action::InitialLoaded { resources, cf_methods, tables });
                Ok(())
            }
            Err(err) => Err(self.fail(Op::Initial, err, "Error fetching initial data")),
        }
    }

    pub async fn load_dataset_and_model(&mut self, dataset: &str, model: &str) -> Result<&DataTables> {
        self.dispatch(Action::Pending(Op::Dataset));
        match self.backend.load_dataset_and_model(dataset, model).await {
            Ok(tables) => {
                self.dispatch(Action::DatasetLoaded(tables));
                self.tables()
            }
            Err(err) => Err(self.fail(Op::Dataset, err, "Error loading dataset and model")),
        }
    }

    pub async fn fetch_data(&mut self) -> Result<&DataTables> {
        self.dispatch(Action::Pending(Op::Data));
        match self.backend.get_data().await {
            Ok(tables) => {
                self.dispatch(Action::DataLoaded(tables));
                self.tables()
            }
            Err(err) => Err(self.fail(Op::Data, err, "Error fetching data from get-data")),
        }
    }

    fn tables(&self) -> Result<&DataTables> {
        self.state.tables.as_ref().context("no data tables loaded")
    }

    pub async fn fetch_features(&mut self) -> Result<&[String]> {
        self.dispatch(Action::Pending(Op::Features));
        match self.backend.available_features().await {
            Ok(features) => {
                self.dispatch(Action::FeaturesLoaded(features));
                Ok(&self.state.available_features)
            }
            Err(err) => Err(self.fail(Op::Features, err, "Error fetching available features")),
        }
    }

    pub async fn register_target_name(&mut self, target_name: &str) -> Result<String> {
        self.dispatch(Action::Pending(Op::Target));
        match self.backend.register_target_name(target_name).await {
            Ok(name) => {
                self.dispatch(Action::TargetRegistered(name.clone()));
                Ok(name)
            }
            Err(err) => Err(self.fail(Op::Target, err, "Error fetching target name")),
        }
    }

    pub async fn run_generation(&mut self, algorithm: Algorithm, params: &GenerationParams) -> Result<Option<&GenerationResponse>> {
        self.dispatch(Action::Pending(Op::Generation));
        match self.backend.generate(algorithm, params).await {
            Ok(generation) => {
                self.dispatch(Action::Generated(generation));
                Ok(self.state.generation.as_ref())
            }
            Err(err) => Err(self.fail(Op::Generation, err, "An error occurred while running C-Glance")),
        }
    }

    pub async fn apply_affected_actions(&mut self) -> Result<&Columnar> {
        self.dispatch(Action::Pending(Op::Apply));
        match self.backend.apply_affected_actions().await {
            Ok(applied) => {
                self.dispatch(Action::ActionsApplied(applied));
                self.state.applied_actions.as_ref().context("applied actions missing")
            }
            Err(err) => Err(self.fail(Op::Apply, err, "Error applying affected actions")),
        }
    }

    pub async fn umap_reduce(&mut self, dataset_identifier: &str, n_components: u32) -> Result<&Embedding> {
        self.dispatch(Action::Pending(Op::Umap));
        match self.backend.umap_reduce(dataset_identifier, n_components).await {
            Ok(embedding) => {
                self.dispatch(Action::Embedded { identifier: dataset_identifier.to_string(), embedding });
                self.state
                    .umap_results
                    .get(dataset_identifier)
                    .context("embedding missing")
            }
            Err(err) => Err(self.fail(Op::Umap, err, "Error reducing UMAP")),
        }
    }

    /// Upload a local file. The file's SHA-256 is logged with the upload.
    pub async fn upload(&mut self, kind: UploadKind, path: &Path) -> Result<UploadReceipt> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        log(
            Level::Info,
            Domain::Session,
            "upload",
            obj(&[
                ("kind", v_str(kind.path())),
                ("file_name", v_str(&file_name)),
                ("sha256", v_str(&sha256_hex(&bytes))),
                ("bytes", serde_json::json!(bytes.len())),
            ]),
        );

        self.dispatch(Action::Pending(Op::Upload));
        let fallback = match kind {
            UploadKind::Dataset => "Error uploading dataset",
            UploadKind::TestDataset => "Error uploading test dataset",
            UploadKind::Model => "Error uploading model",
        };
        match self.backend.upload(kind, &file_name, bytes).await {
            Ok(receipt) => {
                self.dispatch(Action::Uploaded(kind, receipt.clone()));
                Ok(receipt)
            }
            Err(err) => Err(self.fail(Op::Upload, err, fallback)),
        }
    }

    /// Run a sweep and replace the stored comparative results with it.
    pub async fn run_sweep(&mut self, request: &SweepRequest) -> Result<&SweepResults> {
        self.dispatch(Action::Pending(Op::Sweep));
        match run_sweep(&self.backend, request).await {
            Ok(results) => {
                self.dispatch(Action::SweepFinished(results));
                Ok(&self.state.comparative_results)
            }
            Err(err) => {
                let message = err
                    .downcast_ref::<ApiError>()
                    .and_then(ApiError::detail)
                    .unwrap_or("Error in comparative analysis")
                    .to_string();
                self.dispatch(Action::Rejected(Op::Sweep, message));
                Err(err)
            }
        }
    }

    pub async fn compare_algorithms(&mut self, algorithms: &[Algorithm], gcf_size: i64) -> ComparisonReport {
        self.dispatch(Action::Pending(Op::Comparison));
        let report = compare_algorithms(&self.backend, algorithms, gcf_size).await;
        self.dispatch(Action::ComparisonFinished(report.clone()));
        report
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_detail() {
        let err = ApiError::Rejected { detail: Some("bad size".into()) };
        assert_eq!(failure_message(&err, "fallback"), "bad size");
        let err = ApiError::Transport("refused".into());
        assert_eq!(failure_message(&err, "fallback"), "fallback");
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
