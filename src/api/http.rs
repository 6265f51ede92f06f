use anyhow::Result;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use url::Url;

use crate::api::types::{target_name_from, FeatureList};
use crate::api::{
    Algorithm, ApiError, AvailableResources, Backend, Columnar, DataTables, Embedding,
    GenerationParams, GenerationResponse, UploadKind, UploadReceipt,
};
use crate::config::Config;
use crate::logging::{log_request, log_response};

const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed client for the counterfactual backend.
pub struct HttpBackend {
    client: Client,
    base: Url,
    data_timeout: Duration,
}

impl HttpBackend {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = cfg.http_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base: cfg.base_url()?,
            data_timeout: Duration::from_secs(cfg.data_timeout_secs),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("bad endpoint {:?}: {}", path, e)))
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, req: RequestBuilder) -> Result<T, ApiError> {
        let started = Instant::now();
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        log_response(endpoint, status, started.elapsed().as_secs_f64() * 1000.0);
        let body = resp.text().await.map_err(transport)?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{}: {}", endpoint, e)))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        log_request("GET", endpoint, &[]);
        let req = self.client.get(self.url(endpoint)?);
        self.send(endpoint, req).await
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Transport(format!("timed out: {}", err))
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// Map a non-success response onto the error taxonomy. Only a 400 counts
/// as a structured rejection; its `detail` is surfaced verbatim.
pub(crate) fn classify_failure(status: u16, body: &str) -> ApiError {
    if status == 400 {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("detail").cloned())
            .and_then(|d| match d {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            });
        return ApiError::Rejected { detail };
    }
    let mut body = body.to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    ApiError::Status { status, body }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn available_resources(&self) -> Result<AvailableResources, ApiError> {
        self.get("available-resources/").await
    }

    async fn available_cf_methods(&self) -> Result<Vec<String>, ApiError> {
        self.get("available-cf-methods/").await
    }

    async fn load_dataset_and_model(&self, dataset: &str, model: &str) -> Result<DataTables, ApiError> {
        let endpoint = "load-dataset-and-model/";
        let query = [("dataset_name", dataset.to_string()), ("model_name", model.to_string())];
        log_request("POST", endpoint, &query);
        let req = self.client.post(self.url(endpoint)?).query(&query);
        self.send(endpoint, req).await
    }

    async fn get_data(&self) -> Result<DataTables, ApiError> {
        let endpoint = "get-data/";
        log_request("GET", endpoint, &[]);
        let req = self.client.get(self.url(endpoint)?).timeout(self.data_timeout);
        self.send(endpoint, req).await
    }

    async fn available_features(&self) -> Result<Vec<String>, ApiError> {
        let list: FeatureList = self.get("available-features").await?;
        Ok(list.features)
    }

    async fn generate(&self, algorithm: Algorithm, params: &GenerationParams) -> Result<GenerationResponse, ApiError> {
        let endpoint = algorithm.endpoint();
        let query = params.query();
        log_request("POST", endpoint, &query);
        let req = self
            .client
            .post(self.url(endpoint)?)
            .query(&query)
            .json(&params.body());
        let resp: GenerationResponse = self.send(endpoint, req).await?;
        resp.validate().map_err(ApiError::Decode)?;
        Ok(resp)
    }

    async fn apply_affected_actions(&self) -> Result<Columnar, ApiError> {
        self.get("apply_affected_actions").await
    }

    async fn umap_reduce(&self, dataset_identifier: &str, n_components: u32) -> Result<Embedding, ApiError> {
        let endpoint = "umap-reduce/";
        let query = [("n_components", n_components.to_string())];
        log_request("POST", endpoint, &query);
        let req = self
            .client
            .post(self.url(endpoint)?)
            .query(&query)
            .json(&json!({ "dataset_identifier": dataset_identifier }));
        self.send(endpoint, req).await
    }

    async fn upload(&self, kind: UploadKind, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, ApiError> {
        let endpoint = kind.path();
        log_request("POST", endpoint, &[("file_name", file_name.to_string())]);
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let req = self.client.post(self.url(endpoint)?).multipart(form);
        self.send(endpoint, req).await
    }

    async fn register_target_name(&self, target_name: &str) -> Result<String, ApiError> {
        let endpoint = "get-target_name";
        let query = [("target_name", target_name.to_string())];
        log_request("POST", endpoint, &query);
        let req = self.client.post(self.url(endpoint)?).query(&query);
        let value: Value = self.send(endpoint, req).await?;
        target_name_from(&value)
            .ok_or_else(|| ApiError::Decode(format!("{}: unexpected body {}", endpoint, value)))
    }
}
