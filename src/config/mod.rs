use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the task queue and result cache
    pub redis_url: String,

    /// Detection model inference endpoint
    pub detector_url: String,

    /// Bearer token for the detection endpoint, if it requires one
    #[serde(default)]
    pub detector_api_token: Option<String>,

    /// Directory where uploaded images are stored
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,

    /// Padding fraction applied to each side of a QR detection box
    #[serde(default = "default_qr_padding")]
    pub qr_padding: f64,

    /// Upper bound on concurrently decoding QR regions within one task
    #[serde(default = "default_region_concurrency")]
    pub region_concurrency: usize,

    /// Detections below this confidence are dropped
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// TTL for cached scan results, in seconds
    #[serde(default = "default_result_cache_ttl_secs")]
    pub result_cache_ttl_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_uploads_dir() -> String {
    "./uploads".to_string()
}

fn default_qr_padding() -> f64 {
    0.15
}

fn default_region_concurrency() -> usize {
    4
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_result_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn pipeline(&self) -> crate::vision::consumer::PipelineConfig {
        crate::vision::consumer::PipelineConfig {
            qr_padding: self.qr_padding,
            region_concurrency: self.region_concurrency,
            confidence_threshold: self.confidence_threshold,
        }
    }
}
