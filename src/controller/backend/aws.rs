//! # AWS Backend
//!
//! S3 remote state with a DynamoDB lock table.
//!
//! Required backend keys:
//! - `s3` - bucket holding the state files
//! - `dynamoDB` - lock table (hash key `LockID`)
//! - `region` - AWS region for both
//!
//! Credentials come from the default AWS credential chain (IRSA on EKS).

use super::{required_key, BackendError, BackendProvider};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    VersioningConfiguration,
};
use std::collections::BTreeMap;
use tracing::{info, info_span, Instrument};

const PROVIDER_NAME: &str = "aws";
const LOCK_TABLE_HASH_KEY: &str = "LockID";

/// Validated AWS backend settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsBackendConfig {
    pub bucket: String,
    pub lock_table: String,
    pub region: String,
}

impl AwsBackendConfig {
    /// Extract and validate the AWS keys from `spec.backend`
    pub fn from_map(config: &BTreeMap<String, String>) -> Result<Self, BackendError> {
        let bucket = required_key(config, PROVIDER_NAME, "s3")?;
        let lock_table = required_key(config, PROVIDER_NAME, "dynamoDB")?;
        let region = required_key(config, PROVIDER_NAME, "region")?;

        validate_bucket_name(bucket)?;
        validate_table_name(lock_table)?;
        if !region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(BackendError::InvalidValue {
                key: "region".to_string(),
                reason: format!("'{region}' is not a valid AWS region name"),
            });
        }

        Ok(Self {
            bucket: bucket.to_string(),
            lock_table: lock_table.to_string(),
            region: region.to_string(),
        })
    }
}

fn validate_bucket_name(bucket: &str) -> Result<(), BackendError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if (3..=63).contains(&bucket.len()) && valid_chars && valid_edges {
        Ok(())
    } else {
        Err(BackendError::InvalidValue {
            key: "s3".to_string(),
            reason: format!("'{bucket}' is not a valid S3 bucket name"),
        })
    }
}

fn validate_table_name(table: &str) -> Result<(), BackendError> {
    let valid_chars = table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if (3..=255).contains(&table.len()) && valid_chars {
        Ok(())
    } else {
        Err(BackendError::InvalidValue {
            key: "dynamoDB".to_string(),
            reason: format!("'{table}' is not a valid DynamoDB table name"),
        })
    }
}

/// AWS backend provider
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsBackend;

impl AwsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn sdk_config(region: &str) -> SdkConfig {
        aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await
    }

    async fn ensure_bucket(
        client: &aws_sdk_s3::Client,
        config: &AwsBackendConfig,
    ) -> Result<(), BackendError> {
        match client.head_bucket().bucket(&config.bucket).send().await {
            Ok(_) => {
                info!("S3 state bucket {} already exists", config.bucket);
                return Ok(());
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_not_found() {
                    return Err(setup_error(format!(
                        "checking S3 bucket {}: {service_err}",
                        config.bucket
                    )));
                }
            }
        }

        info!("Creating S3 state bucket {}", config.bucket);
        let mut request = client.create_bucket().bucket(&config.bucket);
        // us-east-1 rejects an explicit location constraint
        if config.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(config.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(|e| {
            setup_error(format!(
                "creating S3 bucket {}: {}",
                config.bucket,
                e.into_service_error()
            ))
        })?;

        client
            .put_bucket_versioning()
            .bucket(&config.bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                setup_error(format!(
                    "enabling versioning on S3 bucket {}: {}",
                    config.bucket,
                    e.into_service_error()
                ))
            })?;

        Ok(())
    }

    async fn ensure_lock_table(
        client: &aws_sdk_dynamodb::Client,
        config: &AwsBackendConfig,
    ) -> Result<(), BackendError> {
        match client
            .describe_table()
            .table_name(&config.lock_table)
            .send()
            .await
        {
            Ok(_) => {
                info!("DynamoDB lock table {} already exists", config.lock_table);
                return Ok(());
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_resource_not_found_exception() {
                    return Err(setup_error(format!(
                        "describing DynamoDB table {}: {service_err}",
                        config.lock_table
                    )));
                }
            }
        }

        info!("Creating DynamoDB lock table {}", config.lock_table);
        let attribute = AttributeDefinition::builder()
            .attribute_name(LOCK_TABLE_HASH_KEY)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| setup_error(format!("building lock table attribute: {e}")))?;
        let key = KeySchemaElement::builder()
            .attribute_name(LOCK_TABLE_HASH_KEY)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| setup_error(format!("building lock table key schema: {e}")))?;

        client
            .create_table()
            .table_name(&config.lock_table)
            .attribute_definitions(attribute)
            .key_schema(key)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| {
                setup_error(format!(
                    "creating DynamoDB table {}: {}",
                    config.lock_table,
                    e.into_service_error()
                ))
            })?;

        Ok(())
    }
}

fn setup_error(message: String) -> BackendError {
    BackendError::Setup {
        provider: PROVIDER_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl BackendProvider for AwsBackend {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn setup_backend(&self, config: &BTreeMap<String, String>) -> Result<(), BackendError> {
        let config = AwsBackendConfig::from_map(config)?;
        let span = info_span!(
            "aws.backend.setup",
            bucket = config.bucket.as_str(),
            lock_table = config.lock_table.as_str(),
            region = config.region.as_str()
        );

        async move {
            let sdk_config = Self::sdk_config(&config.region).await;
            let s3 = aws_sdk_s3::Client::new(&sdk_config);
            let dynamodb = aws_sdk_dynamodb::Client::new(&sdk_config);

            Self::ensure_bucket(&s3, &config).await?;
            Self::ensure_lock_table(&dynamodb, &config).await?;
            info!("AWS backend ready");
            Ok(())
        }
        .instrument(span)
        .await
    }

    fn dockerfile_additions(&self) -> String {
        "# AWS remote state\nRUN apk add --no-cache aws-cli\n".to_string()
    }
}
