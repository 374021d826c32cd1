//! Weaviate vector-database store.
//!
//! Unlike the other stores, every call names the class (collection) it works
//! on. [`WeaviateStore::collection`] binds a class name and yields a
//! [`StoreAdapter`] so a class can back an agent directly.
//!
//! All methods return typed errors; failures are additionally logged.

pub mod query;

pub use query::{NearTextOptions, WhereFilter, WhereOperator, WhereValue};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::StoreAdapter;
use crate::config::HyvConfig;
use crate::error::HyvError;
use crate::http::{json_headers, parse_header, response_error, shared_client};
use crate::types::Message;

/// Client for a Weaviate instance's REST and GraphQL endpoints.
#[derive(Debug, Clone)]
pub struct WeaviateStore {
    base_url: String,
    api_key: Option<String>,
    extra_headers: HeaderMap,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StoredObject {
    #[serde(default)]
    properties: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl WeaviateStore {
    /// `base_url` is the instance root, e.g. `https://my-cluster.weaviate.network`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            extra_headers: HeaderMap::new(),
        }
    }

    /// Build from `WEAVIATE_*` configuration.
    pub fn from_config(config: &HyvConfig) -> Result<Self, HyvError> {
        let base_url = config
            .get_base_url("weaviate")
            .ok_or_else(|| HyvError::Configuration("Missing WEAVIATE_URL".into()))?;
        let mut store = Self::new(base_url);
        store.api_key = config.get_api_key("weaviate");
        for (name, value) in config.weaviate_headers() {
            store = store.with_header(&name, &value)?;
        }
        Ok(store)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Send an extra header with every request (e.g. `X-OpenAI-Api-Key` for
    /// server-side vectorizers).
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, HyvError> {
        let (name, value) = parse_header(name, value)?;
        self.extra_headers.insert(name, value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A view of one class that implements [`StoreAdapter`].
    pub fn collection(&self, class_name: impl Into<String>) -> WeaviateCollection {
        WeaviateCollection {
            store: self.clone(),
            class_name: class_name.into(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = json_headers(self.api_key.as_deref());
        headers.extend(self.extra_headers.clone());
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base_url)
    }

    /// Store `message` as the properties of a new object of `class_name`,
    /// returning the server-assigned id.
    pub async fn set(&self, message: &Message, class_name: &str) -> Result<String, HyvError> {
        logged("set", self.create_object(message, class_name).await)
    }

    async fn create_object(&self, message: &Message, class_name: &str) -> Result<String, HyvError> {
        query::validate_class_name(class_name)?;
        debug!(class = class_name, "weaviate create object");

        let resp = shared_client()
            .post(self.url("/objects"))
            .headers(self.headers())
            .json(&json!({ "class": class_name, "properties": message }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        let created: CreatedObject = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(created.id)
    }

    /// Fetch the properties of object `id` in `class_name`.
    pub async fn get(&self, id: &str, class_name: &str) -> Result<Message, HyvError> {
        logged("get", self.fetch_object(id, class_name).await)
    }

    async fn fetch_object(&self, id: &str, class_name: &str) -> Result<Message, HyvError> {
        query::validate_class_name(class_name)?;
        let object_id = parse_object_id(id)?;
        debug!(class = class_name, id, "weaviate get object");

        let resp = shared_client()
            .get(self.url(&format!("/objects/{class_name}/{object_id}")))
            .headers(self.headers())
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            return Err(HyvError::NotFound(id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        let object: StoredObject = serde_json::from_slice(&resp.bytes().await?)
            .map_err(|err| HyvError::retrieval(id, err))?;
        object
            .properties
            .ok_or_else(|| HyvError::retrieval(id, "object has no properties"))
    }

    /// Fetch `fields` of every object in `class_name`, optionally filtered.
    pub async fn search(
        &self,
        class_name: &str,
        fields: &str,
        filter: Option<&WhereFilter>,
    ) -> Result<Vec<Message>, HyvError> {
        let result = match query::where_args(filter)
            .and_then(|args| query::get_query(class_name, fields, &args))
        {
            Ok(q) => self.graphql_get(class_name, &q).await,
            Err(err) => Err(err),
        };
        logged("search", result)
    }

    /// Similarity search by concepts, ranked by vector distance.
    pub async fn search_near_text(
        &self,
        class_name: &str,
        fields: &str,
        concepts: &[String],
        options: NearTextOptions,
    ) -> Result<Vec<Message>, HyvError> {
        let result = if concepts.is_empty() {
            Err(HyvError::InvalidArgument(
                "nearText search needs at least one concept".to_string(),
            ))
        } else {
            match query::near_text_args(concepts, options)
                .and_then(|args| query::get_query(class_name, fields, &args))
            {
                Ok(q) => self.graphql_get(class_name, &q).await,
                Err(err) => Err(err),
            }
        };
        logged("search_near_text", result)
    }

    async fn graphql_get(&self, class_name: &str, query: &str) -> Result<Vec<Message>, HyvError> {
        debug!(query, "weaviate graphql");
        let resp = shared_client()
            .post(self.url("/graphql"))
            .headers(self.headers())
            .json(&json!({ "query": query }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        let body: GraphQlResponse = serde_json::from_slice(&resp.bytes().await?)?;
        if !body.errors.is_empty() {
            let message = body
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(HyvError::Provider {
                provider: "weaviate".to_string(),
                message,
            });
        }

        let rows = body
            .data
            .as_ref()
            .and_then(|d| d.pointer(&format!("/Get/{class_name}")))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        match rows {
            Value::Array(items) => items.into_iter().map(Message::try_from).collect(),
            Value::Null => Ok(Vec::new()),
            _ => Err(HyvError::Provider {
                provider: "weaviate".to_string(),
                message: format!("unexpected result shape for class {class_name}"),
            }),
        }
    }

    /// Create a schema class from its JSON definition.
    ///
    /// With `force`, an existing class of the same name is deleted first.
    /// Without it, a class that already exists counts as success.
    pub async fn create_class(&self, class: &Value, force: bool) -> Result<(), HyvError> {
        logged("create_class", self.create_class_inner(class, force).await)
    }

    async fn create_class_inner(&self, class: &Value, force: bool) -> Result<(), HyvError> {
        let class_name = class
            .get("class")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HyvError::InvalidArgument("class definition needs a `class` name".to_string())
            })?;
        query::validate_class_name(class_name)?;

        if force {
            self.delete_class_inner(class_name).await?;
        }

        let resp = shared_client()
            .post(self.url("/schema"))
            .headers(self.headers())
            .json(class)
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        match response_error(resp).await {
            HyvError::Api { message, .. } if message.contains("already exists") => {
                debug!(class = class_name, "class already exists");
                Ok(())
            }
            err => Err(err),
        }
    }

    /// Delete a schema class and all its objects. Returns `false` when the
    /// class did not exist.
    pub async fn delete_class(&self, class_name: &str) -> Result<bool, HyvError> {
        logged("delete_class", self.delete_class_inner(class_name).await)
    }

    async fn delete_class_inner(&self, class_name: &str) -> Result<bool, HyvError> {
        query::validate_class_name(class_name)?;
        let resp = shared_client()
            .delete(self.url(&format!("/schema/{class_name}")))
            .headers(self.headers())
            .send()
            .await?;
        match resp.status().as_u16() {
            404 => Ok(false),
            s if (200..300).contains(&s) => Ok(true),
            _ => Err(response_error(resp).await),
        }
    }
}

/// Weaviate object ids are UUIDs; only the canonical form goes into URLs.
fn parse_object_id(id: &str) -> Result<uuid::Uuid, HyvError> {
    uuid::Uuid::parse_str(id)
        .map_err(|_| HyvError::InvalidArgument(format!("`{id}` is not a valid object id")))
}

fn logged<T>(operation: &str, result: Result<T, HyvError>) -> Result<T, HyvError> {
    if let Err(err) = &result {
        if !err.is_not_found() {
            error!(operation, error = %err, "weaviate request failed");
        }
    }
    result
}

/// A Weaviate class viewed as a uniform message store.
#[derive(Debug, Clone)]
pub struct WeaviateCollection {
    store: WeaviateStore,
    class_name: String,
}

impl WeaviateCollection {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn store(&self) -> &WeaviateStore {
        &self.store
    }
}

#[async_trait]
impl StoreAdapter for WeaviateCollection {
    fn name(&self) -> &str {
        "weaviate"
    }

    async fn set(&self, message: &Message) -> Result<String, HyvError> {
        self.store.set(message, &self.class_name).await
    }

    async fn get(&self, id: &str) -> Result<Message, HyvError> {
        self.store.get(id, &self.class_name).await
    }
}
