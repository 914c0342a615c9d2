//! S3 backend for state storage, with an optional DynamoDB lock table

use std::sync::Arc;

use crate::backend::{BackendConfig, BackendError, BackendResult};
use crate::blob::{BlobConfig, BlobStore};
use crate::lock_coordinator::LockCoordinator;
use crate::remote::RemoteState;
use crate::transport::{DynamoDbLockTable, S3Transport};

/// Settings accepted by the "s3" backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Bucket name
    pub bucket: String,
    /// Object key for the state file
    pub key: String,
    /// AWS region
    pub region: String,
    /// Whether to encrypt the state file (default: false)
    pub encrypt: bool,
    /// KMS key used for encryption instead of the S3-managed key
    pub kms_key_id: Option<String>,
    /// Canned ACL applied to the state object
    pub acl: Option<String>,
    /// DynamoDB table used for locking; locking is disabled without one
    pub lock_table: Option<String>,
    /// Custom endpoint, e.g. for S3-compatible stores
    pub endpoint: Option<String>,
    /// Named profile from the shared AWS config
    pub profile: Option<String>,
    /// Address the bucket in the path instead of the host name
    pub force_path_style: bool,
}

impl S3Settings {
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let bucket = config.require_string("bucket")?.to_string();
        let key = config.require_string("key")?.to_string();

        // Convert region from DSL format (aws.Region.ap_northeast_1) to AWS format (ap-northeast-1)
        let region = convert_region_value(config.require_string("region")?);

        let encrypt = config.get_bool_or("encrypt", false);
        let kms_key_id = config.get_non_empty("kms_key_id").map(str::to_string);
        if kms_key_id.is_some() && !encrypt {
            return Err(BackendError::configuration(
                "kms_key_id requires encrypt = true",
            ));
        }

        Ok(Self {
            bucket,
            key,
            region,
            encrypt,
            kms_key_id,
            acl: config.get_non_empty("acl").map(str::to_string),
            lock_table: config.get_non_empty("lock_table").map(str::to_string),
            endpoint: config.get_non_empty("endpoint").map(str::to_string),
            profile: config.get_non_empty("profile").map(str::to_string),
            force_path_style: config.get_bool_or("force_path_style", false),
        })
    }

    fn blob_config(&self) -> BlobConfig {
        BlobConfig {
            encrypt: self.encrypt,
            kms_key_id: self.kms_key_id.clone(),
            acl: self.acl.clone(),
        }
    }
}

/// Build an S3-backed remote state from configuration
pub async fn from_config(config: &BackendConfig) -> BackendResult<RemoteState> {
    let settings = S3Settings::from_config(config)?;

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(settings.region.clone()));
    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(settings.force_path_style)
        .build();
    let s3 = S3Transport::new(aws_sdk_s3::Client::from_conf(s3_config));

    let blob = BlobStore::new(
        Arc::new(s3),
        &settings.bucket,
        &settings.key,
        settings.blob_config(),
    );

    let locks = match &settings.lock_table {
        Some(table) => {
            let dynamodb = DynamoDbLockTable::new(aws_sdk_dynamodb::Client::new(&aws_config));
            LockCoordinator::new(&settings.bucket, &settings.key, Arc::new(dynamodb), table)
        }
        None => LockCoordinator::disabled(&settings.bucket, &settings.key),
    };

    Ok(RemoteState::new(blob, locks))
}

/// Convert region value from DSL format to AWS format
/// e.g., "aws.Region.ap_northeast_1" -> "ap-northeast-1"
fn convert_region_value(value: &str) -> String {
    match value.strip_prefix("aws.Region.") {
        Some(region) => region.replace('_', "-"),
        None => value.to_string(),
    }
}
