//! Cloud KMS-backed store: AWS Secrets Manager with a customer-managed KMS key.
//!
//! Every secret is encrypted under the configured key id when it is first
//! created; later writes add a new version under the same key. Payloads are
//! stored with [`SecretValue::to_payload`], so field maps round-trip as JSON.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::Region;
use aws_sdk_secretsmanager::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::types::Tag;
use aws_sdk_secretsmanager::Client;
use std::fmt;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::generator::SecretGenerator;
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudKmsConfig {
    pub region: String,
    /// KMS key id or ARN used to encrypt new secrets.
    pub key_id: String,
    /// Override the service endpoint (LocalStack and friends).
    pub endpoint: Option<String>,
}

impl CloudKmsConfig {
    pub fn new(region: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self { region: region.into(), key_id: key_id.into(), endpoint: None }
    }
}

#[derive(Clone)]
pub struct CloudKmsStore {
    client: Client,
    region: String,
    key_id: String,
}

impl CloudKmsStore {
    pub async fn new(config: &CloudKmsConfig) -> Result<Self> {
        if config.region.is_empty() {
            return Err(SecretsError::config_error("cloud-kms region cannot be empty"));
        }
        if config.key_id.is_empty() {
            return Err(SecretsError::config_error("cloud-kms key id cannot be empty"));
        }

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_secretsmanager::config::Builder::from(&shared_config);
        if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region.clone(),
            key_id: config.key_id.clone(),
        })
    }

    async fn put(&self, key: &str, payload: String) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(key)
            .secret_string(payload)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| sdk_error(key, "put_secret_value", err))
    }

    async fn create(
        &self,
        key: &str,
        payload: String,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        let mut request = self
            .client
            .create_secret()
            .name(key)
            .kms_key_id(&self.key_id)
            .secret_string(payload);
        for (tag_key, tag_value) in metadata.map(SecretMetadata::to_tags).unwrap_or_default() {
            request = request.tags(Tag::builder().key(tag_key).value(tag_value).build());
        }
        request.send().await.map(|_| ()).map_err(|err| sdk_error(key, "create_secret", err))
    }
}

impl fmt::Debug for CloudKmsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudKmsStore")
            .field("region", &self.region)
            .field("key_id", &self.key_id)
            .finish()
    }
}

fn is_not_found<E: ProvideErrorMetadata>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::ServiceError(context) => context.err().code() == Some("ResourceNotFoundException"),
        _ => false,
    }
}

fn sdk_error<E>(key: &str, operation: &str, err: SdkError<E>) -> SecretsError
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    match &err {
        SdkError::ServiceError(context) => match context.err().code() {
            Some("ResourceNotFoundException") => SecretsError::not_found(key),
            Some("AccessDeniedException") | Some("UnrecognizedClientException") => {
                SecretsError::authentication_failed(format!("{operation} denied for '{key}'"))
            }
            code => SecretsError::backend_error(format!(
                "{operation} failed for '{key}': {}",
                context.err().message().or(code).unwrap_or("unknown service error")
            )),
        },
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            SecretsError::connection_failed(format!("{operation} could not reach the service"))
        }
        other => SecretsError::backend_error(format!("{operation} failed for '{key}': {other:?}")),
    }
}

#[async_trait]
impl SecretStore for CloudKmsStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::CloudKms
    }

    async fn connect(&self) -> Result<()> {
        self.health().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        match self.client.get_secret_value().secret_id(key).send().await {
            Ok(output) => match output.secret_string() {
                Some(payload) => Ok(Some(SecretValue::from_payload(payload))),
                None => Err(SecretsError::backend_error(format!(
                    "secret '{key}' holds binary data, which is not supported"
                ))),
            },
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(sdk_error(key, "get_secret_value", err)),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        let payload = value.to_payload();
        match self.put(key, payload.clone()).await {
            Err(SecretsError::NotFound { .. }) => self.create(key, payload, metadata).await?,
            other => other?,
        }
        tracing::info!(key = %key, region = %self.region, "Stored secret in cloud-kms");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_secret()
            .secret_id(key)
            .force_delete_without_recovery(true)
            .send()
            .await
            .map_err(|err| sdk_error(key, "delete_secret", err))?;
        tracing::info!(key = %key, region = %self.region, "Deleted secret from cloud-kms");
        Ok(())
    }

    async fn rotate(&self, key: &str) -> Result<()> {
        let current = self.get(key).await?.ok_or_else(|| SecretsError::not_found(key))?;
        let rotated = SecretGenerator::new().rotated_value(key, Some(&current));
        self.put(key, rotated.to_payload())
            .await
            .map_err(|e| SecretsError::rotation_failed(key, e.to_string()))?;
        tracing::info!(key = %key, "Rotated secret in cloud-kms");
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.client
            .list_secrets()
            .max_results(1)
            .send()
            .await
            .map_err(|err| sdk_error("*", "list_secrets", err))?;
        Ok(HealthStatus::healthy(ProviderKind::CloudKms)
            .with_detail(format!("region {}", self.region)))
    }
}
