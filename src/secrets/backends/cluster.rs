//! Cluster-native secret store: Kubernetes `Secret` objects in one namespace.
//!
//! Talks to the API server over REST with the pod's service-account token.
//! Each broker key maps to one `Secret`; the key is lower-cased and `_`/`/`
//! become `-` to satisfy object naming rules. A secret whose `data` holds a
//! single `value` entry is a scalar; anything else is a field map. Entries
//! in `data` are base64 as the API requires.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::generator::SecretGenerator;
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretValue};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const ANNOTATION_PREFIX: &str = "secret-broker.io/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub namespace: String,
    /// API server base URL, e.g. `https://kubernetes.default.svc`.
    pub api_server: String,
    /// Bearer token file; re-read on every request so projected tokens can rotate.
    pub token_path: Option<PathBuf>,
    /// PEM bundle used to verify the API server.
    pub ca_cert_path: Option<PathBuf>,
}

impl ClusterConfig {
    pub fn new(namespace: impl Into<String>, api_server: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            api_server: api_server.into(),
            token_path: None,
            ca_cert_path: None,
        }
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    pub fn with_ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClusterSecretStore {
    http: Client,
    base_url: String,
    namespace: String,
    token_path: Option<PathBuf>,
}

impl ClusterSecretStore {
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        if config.namespace.is_empty() {
            return Err(SecretsError::config_error("cluster namespace cannot be empty"));
        }
        let base_url = config.api_server.trim_end_matches('/').to_string();
        if url::Url::parse(&base_url).is_err() {
            return Err(SecretsError::config_error(format!(
                "cluster API server '{}' is not a valid URL",
                config.api_server
            )));
        }

        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                SecretsError::config_error(format!(
                    "invalid cluster CA bundle {}: {e}",
                    ca_path.display()
                ))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| SecretsError::config_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            namespace: config.namespace.clone(),
            token_path: config.token_path.clone(),
        })
    }

    /// Object name for a broker key.
    ///
    /// Keys map one-to-one onto object names, so only keys that already are
    /// valid lower-case object names are accepted.
    pub fn object_name(key: &str) -> Result<&str> {
        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.'));
        let valid_edges = key.starts_with(|c: char| c.is_ascii_alphanumeric())
            && key.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !valid_chars || !valid_edges {
            return Err(SecretsError::invalid_key(
                key,
                "cluster keys must be lower-case alphanumerics, '-' or '.'",
            ));
        }
        Ok(key)
    }

    fn collection_url(&self) -> String {
        format!("{}/api/v1/namespaces/{}/secrets", self.base_url, self.namespace)
    }

    fn object_url(&self, key: &str) -> Result<String> {
        Ok(format!("{}/{}", self.collection_url(), Self::object_name(key)?))
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let mut request = self.http.request(method, url);
        if let Some(path) = &self.token_path {
            let token = tokio::fs::read_to_string(path).await?;
            request = request.bearer_auth(token.trim());
        }
        Ok(request)
    }

    /// Raw `Secret` object, or `None` on 404.
    async fn fetch_object(&self, key: &str) -> Result<Option<Value>> {
        let response = self.request(Method::GET, &self.object_url(key)?).await?.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Value>().await?)),
            status => Err(status_error(key, "read", status, response.text().await.unwrap_or_default())),
        }
    }

    /// Replace the object, creating it when it does not exist yet.
    async fn upsert_object(&self, key: &str, object: &Value) -> Result<()> {
        let response =
            self.request(Method::PUT, &self.object_url(key)?).await?.json(object).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let response = self
                    .request(Method::POST, &self.collection_url())
                    .await?
                    .json(object)
                    .send()
                    .await?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(status_error(key, "create", status, response.text().await.unwrap_or_default()))
                }
            }
            status => Err(status_error(key, "write", status, response.text().await.unwrap_or_default())),
        }
    }

    fn build_object(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<Value> {
        let annotations: Map<String, Value> = metadata
            .map(|m| {
                m.to_tags()
                    .into_iter()
                    .map(|(k, v)| (format!("{ANNOTATION_PREFIX}{k}"), Value::String(v)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": "Opaque",
            "metadata": {
                "name": Self::object_name(key)?,
                "namespace": self.namespace,
                "labels": { "app.kubernetes.io/managed-by": "secret-broker" },
                "annotations": annotations,
            },
            "data": encode_data(value),
        }))
    }
}

fn encode_data(value: &SecretValue) -> Map<String, Value> {
    value
        .clone()
        .into_fields()
        .into_iter()
        .map(|(field, v)| {
            let raw = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (field, Value::String(STANDARD.encode(raw)))
        })
        .collect()
}

fn decode_data(key: &str, object: &Value) -> Result<SecretValue> {
    let mut fields = Map::new();
    if let Some(data) = object.get("data").and_then(Value::as_object) {
        for (field, encoded) in data {
            let encoded = encoded.as_str().unwrap_or_default();
            let bytes = STANDARD.decode(encoded).map_err(|e| {
                SecretsError::backend_error(format!("secret '{key}' field '{field}' is not base64: {e}"))
            })?;
            let text = String::from_utf8(bytes).map_err(|_| {
                SecretsError::invalid_value(format!("secret '{key}' field '{field}' is not UTF-8"))
            })?;
            fields.insert(field.clone(), Value::String(text));
        }
    }

    if fields.len() == 1 {
        if let Some(Value::String(s)) = fields.get("value") {
            return Ok(SecretValue::Text(s.clone()));
        }
    }
    Ok(SecretValue::Fields(fields))
}

fn status_error(key: &str, action: &str, status: StatusCode, body: String) -> SecretsError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SecretsError::authentication_failed(
            format!("cluster API denied {action} on '{key}' ({status})"),
        ),
        StatusCode::NOT_FOUND => SecretsError::not_found(key),
        _ => {
            let body: String = body.chars().take(200).collect();
            SecretsError::backend_error(format!("cluster API {action} on '{key}' failed ({status}): {body}"))
        }
    }
}

#[async_trait]
impl SecretStore for ClusterSecretStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Cluster
    }

    async fn connect(&self) -> Result<()> {
        let status = self.health().await?;
        if status.healthy {
            tracing::info!(namespace = %self.namespace, api = %self.base_url, "Connected to cluster secret store");
            Ok(())
        } else {
            Err(SecretsError::connection_failed(status.detail.unwrap_or_default()))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        match self.fetch_object(key).await? {
            Some(object) => decode_data(key, &object).map(Some),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        let object = self.build_object(key, value, metadata)?;
        self.upsert_object(key, &object).await?;
        tracing::info!(key = %key, namespace = %self.namespace, "Stored secret in cluster");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self.request(Method::DELETE, &self.object_url(key)?).await?.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(key, "delete", status, response.text().await.unwrap_or_default()));
        }
        tracing::info!(key = %key, namespace = %self.namespace, "Deleted secret from cluster");
        Ok(())
    }

    async fn rotate(&self, key: &str) -> Result<()> {
        let mut object = self.fetch_object(key).await?.ok_or_else(|| SecretsError::not_found(key))?;
        let current = decode_data(key, &object)?;
        let rotated = SecretGenerator::new().rotated_value(key, Some(&current));
        if let Some(obj) = object.as_object_mut() {
            obj.insert("data".to_string(), Value::Object(encode_data(&rotated)));
        }
        self.upsert_object(key, &object)
            .await
            .map_err(|e| SecretsError::rotation_failed(key, e.to_string()))?;
        tracing::info!(key = %key, namespace = %self.namespace, "Rotated secret in cluster");
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}?limit=1", self.collection_url());
        let response = self.request(Method::GET, &url).await?.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(HealthStatus::healthy(ProviderKind::Cluster)
                .with_detail(format!("namespace {}", self.namespace)))
        } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            Err(status_error("*", "list", status, String::new()))
        } else {
            Ok(HealthStatus::unhealthy(
                ProviderKind::Cluster,
                format!("cluster API answered {status}"),
            ))
        }
    }
}
