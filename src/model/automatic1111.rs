//! Image-generation adapter for a self-hosted AUTOMATIC1111 Stable Diffusion
//! web UI (`--api` mode).

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::ModelAdapter;
use crate::config::HyvConfig;
use crate::error::HyvError;
use crate::http::{json_headers, response_error, shared_client};
use crate::types::{FileContentWithPath, Message};
use crate::util::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7861";
const ENDPOINT_BASE: &str = "sdapi/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// `txt2img` settings. Unset optional fields are left to the server.
///
/// ```
/// use hyv::model::Automatic1111Options;
///
/// let options = Automatic1111Options::builder()
///     .model("v1-5-pruned-emaonly.safetensors")
///     .sampler_name("Euler a")
///     .seed(42)
///     .build();
/// assert_eq!(options.steps, 20);
/// ```
#[derive(Debug, Clone, Serialize, Builder)]
pub struct Automatic1111Options {
    #[builder(default = 20)]
    pub steps: u32,
    #[builder(default = 7.0)]
    pub cfg_scale: f64,
    #[builder(default = 256)]
    pub width: u32,
    #[builder(default = 256)]
    pub height: u32,
    /// Checkpoint to switch to before generating.
    #[serde(skip)]
    #[builder(into)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub sampler_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Applied to every image that does not bring its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_faces: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub hr_upscaler: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub styles: Vec<String>,
    /// Any other `txt2img` field, sent as is.
    #[serde(flatten)]
    #[builder(default)]
    pub extra: Map<String, Value>,
}

impl Default for Automatic1111Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One requested image. `alt` and other descriptive fields are ignored.
#[derive(Debug, Clone, Deserialize)]
struct ImageRequest {
    path: String,
    prompt: String,
    #[serde(default, alias = "negativePrompt")]
    negative_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Turns `{images: [{path, prompt, negative_prompt?}]}` into
/// `{files: [{path, content}]}` with base64-encoded PNG content.
///
/// Images are generated concurrently. When a checkpoint is configured, each
/// request first switches the server to it.
#[derive(Debug, Clone)]
pub struct Automatic1111ModelAdapter {
    options: Automatic1111Options,
    base_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl Automatic1111ModelAdapter {
    pub fn new(options: Automatic1111Options) -> Self {
        Self {
            options,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Use the `automatic1111` base URL from `config` when one is set.
    pub fn from_config(config: &HyvConfig, options: Automatic1111Options) -> Self {
        let adapter = Self::new(options);
        match config.get_base_url("automatic1111") {
            Some(url) => adapter.with_base_url(url),
            None => adapter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn options(&self) -> &Automatic1111Options {
        &self.options
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{ENDPOINT_BASE}/{name}", self.base_url)
    }

    async fn post(&self, name: &str, body: &Value) -> Result<reqwest::Response, HyvError> {
        let resp = shared_client()
            .post(self.endpoint(name))
            .headers(json_headers(None))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        Ok(resp)
    }

    fn txt2img_body(&self, request: &ImageRequest) -> Result<Value, HyvError> {
        let mut body = serde_json::to_value(&self.options)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("prompt".into(), request.prompt.clone().into());
            if let Some(negative) = &request.negative_prompt {
                obj.insert("negative_prompt".into(), negative.clone().into());
            }
        }
        Ok(body)
    }

    async fn generate(&self, request: &ImageRequest) -> Result<FileContentWithPath, HyvError> {
        if let Some(model) = &self.options.model {
            self.post("options", &json!({ "sd_model_checkpoint": model }))
                .await?;
        }
        debug!(path = %request.path, steps = self.options.steps, "txt2img");

        let resp = self.post("txt2img", &self.txt2img_body(request)?).await?;
        let data: Txt2ImgResponse = serde_json::from_slice(&resp.bytes().await?)?;
        let content = data
            .images
            .into_iter()
            .next()
            .ok_or_else(|| HyvError::Provider {
                provider: "automatic1111".to_string(),
                message: format!("No image returned for {}", request.path),
            })?;
        Ok(FileContentWithPath {
            path: request.path.clone(),
            content,
        })
    }
}

#[async_trait]
impl ModelAdapter for Automatic1111ModelAdapter {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        let requests: Vec<ImageRequest> = task.field("images")?.ok_or_else(|| {
            HyvError::InvalidArgument("image task needs an `images` field".to_string())
        })?;

        let files = try_join_all(
            requests
                .iter()
                .map(|request| self.retry_policy.execute(|| self.generate(request))),
        )
        .await?;

        Ok(Message::new().with("files", serde_json::to_value(files)?))
    }
}
