use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sweep::SweepDimension;

mod http;
pub mod types;

pub use http::HttpBackend;
pub use types::{
    AvailableResources, Columnar, DataTables, EffCost, EffCostMap, Embedding, GenerationParams,
    GenerationResponse, Record, UploadKind, UploadReceipt,
};

/// Counterfactual generation algorithm; the value is also the endpoint path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "run-c_glance")]
    CGlance,
    #[serde(rename = "run-groupcfe")]
    GroupCfe,
    #[serde(rename = "run-globece")]
    GlobeCe,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::CGlance, Algorithm::GroupCfe, Algorithm::GlobeCe];

    pub fn endpoint(&self) -> &'static str {
        match self {
            Algorithm::CGlance => "run-c_glance",
            Algorithm::GroupCfe => "run-groupcfe",
            Algorithm::GlobeCe => "run-globece",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Algorithm::CGlance => "GLANCE",
            Algorithm::GroupCfe => "GroupCFE",
            Algorithm::GlobeCe => "GLOBE_CE",
        }
    }

    /// Sweep dimensions the backend honours for this algorithm.
    pub fn supported_dimensions(&self) -> &'static [SweepDimension] {
        match self {
            Algorithm::CGlance => &[
                SweepDimension::ActionCount,
                SweepDimension::Method,
                SweepDimension::Strategy,
            ],
            Algorithm::GroupCfe => &[SweepDimension::ActionCount],
            Algorithm::GlobeCe => &[
                SweepDimension::ActionCount,
                SweepDimension::Direction,
                SweepDimension::FeatureCount,
            ],
        }
    }

    pub fn supports(&self, dimension: SweepDimension) -> bool {
        self.supported_dimensions().contains(&dimension)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        Algorithm::ALL
            .into_iter()
            .find(|a| a.endpoint() == s || a.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown algorithm {:?}", s))
    }
}

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// HTTP 400; `detail` is the backend's explanation when it sent one.
    Rejected { detail: Option<String> },
    /// Any other non-success status.
    Status { status: u16, body: String },
    /// Connection, timeout or request construction failure.
    Transport(String),
    /// The body did not match the endpoint's schema.
    Decode(String),
}

impl ApiError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { detail } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Rejected { detail: Some(d) } => write!(f, "rejected by backend: {}", d),
            ApiError::Rejected { detail: None } => write!(f, "rejected by backend"),
            ApiError::Status { status, body } => write!(f, "backend returned {}: {}", status, body),
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
            ApiError::Decode(msg) => write!(f, "unexpected response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// The counterfactual backend. Calls mutate server-side session state
/// (the "current run"), so implementations must not reorder them.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn available_resources(&self) -> Result<AvailableResources, ApiError>;
    async fn available_cf_methods(&self) -> Result<Vec<String>, ApiError>;
    async fn load_dataset_and_model(&self, dataset: &str, model: &str) -> Result<DataTables, ApiError>;
    async fn get_data(&self) -> Result<DataTables, ApiError>;
    async fn available_features(&self) -> Result<Vec<String>, ApiError>;
    async fn generate(&self, algorithm: Algorithm, params: &GenerationParams) -> Result<GenerationResponse, ApiError>;
    async fn apply_affected_actions(&self) -> Result<Columnar, ApiError>;
    async fn umap_reduce(&self, dataset_identifier: &str, n_components: u32) -> Result<Embedding, ApiError>;
    async fn upload(&self, kind: UploadKind, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, ApiError>;
    async fn register_target_name(&self, target_name: &str) -> Result<String, ApiError>;
}
