//! Image-generation adapter for the OpenAI images endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::ModelAdapter;
use crate::config::HyvConfig;
use crate::error::HyvError;
use crate::http::{json_headers, response_error, shared_client};
use crate::types::{FileContentWithPath, Message};
use crate::util::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Square output sizes accepted by the images endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "256x256")]
    #[strum(serialize = "256x256")]
    Small,
    #[serde(rename = "512x512")]
    #[strum(serialize = "512x512")]
    Medium,
    #[serde(rename = "1024x1024")]
    #[strum(serialize = "1024x1024")]
    Large,
}

#[derive(Debug, Clone, Builder)]
pub struct DallEOptions {
    #[builder(default)]
    pub size: ImageSize,
    #[builder(default = 1)]
    pub n: u8,
    #[builder(into)]
    pub model: Option<String>,
}

impl Default for DallEOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One requested image, as found in the task's `images` field.
#[derive(Debug, Clone, Deserialize)]
struct ImageRequest {
    path: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// Turns `{images: [{path, prompt}]}` into `{files: [{path, content}]}` with
/// base64-encoded image content. Pair with a base64 file writer to save them.
#[derive(Debug, Clone)]
pub struct DallEModelAdapter {
    options: DallEOptions,
    api_key: String,
    base_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl DallEModelAdapter {
    pub fn new(options: DallEOptions, api_key: impl Into<String>) -> Self {
        Self {
            options,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &HyvConfig, options: DallEOptions) -> Result<Self, HyvError> {
        let api_key = config
            .get_api_key("openai")
            .ok_or_else(|| HyvError::Authentication("Missing OPENAI_API_KEY".into()))?;
        let adapter = Self::new(options, api_key);
        Ok(match config.get_base_url("openai") {
            Some(url) => adapter.with_base_url(url),
            None => adapter,
        })
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

    async fn generate(&self, request: &ImageRequest) -> Result<FileContentWithPath, HyvError> {
        let mut body = serde_json::json!({
            "prompt": request.prompt,
            "size": self.options.size,
            "n": self.options.n,
            "response_format": "b64_json",
        });
        if let (Some(obj), Some(model)) = (body.as_object_mut(), &self.options.model) {
            obj.insert("model".into(), model.clone().into());
        }
        debug!(path = %request.path, size = %self.options.size, "image generation");

        let resp = shared_client()
            .post(format!("{}/images/generations", self.base_url))
            .headers(json_headers(Some(&self.api_key)))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let data: ImagesResponse = serde_json::from_slice(&resp.bytes().await?)?;
        let content = data
            .data
            .into_iter()
            .next()
            .and_then(|image| image.b64_json)
            .ok_or_else(|| HyvError::Provider {
                provider: "openai".to_string(),
                message: format!("No image returned for {}", request.path),
            })?;
        Ok(FileContentWithPath {
            path: request.path.clone(),
            content,
        })
    }
}

#[async_trait]
impl ModelAdapter for DallEModelAdapter {
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
