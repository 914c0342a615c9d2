//! S3 object transport

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{self, ObjectCannedAcl};
use log::debug;

use super::{ObjectTransport, PutObject, ServerSideEncryption, TransportError};

/// Object transport backed by an S3 bucket
#[derive(Debug, Clone)]
pub struct S3Transport {
    client: Client,
}

impl S3Transport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectTransport for S3Transport {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, TransportError> {
        let result = self.client.get_object().bucket(bucket).key(key).send().await;

        match result {
            Ok(output) => {
                let body = output.body.collect().await.map_err(|e| {
                    TransportError::service(format!("Failed to read remote state: {}", e))
                })?;
                Ok(body.into_bytes().to_vec())
            }
            Err(err) => {
                let no_such_key = err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_key());
                let code = err.as_service_error().and_then(|e| e.code());
                let status = err.raw_response().map(|raw| raw.status().as_u16());
                if no_such_key || is_missing_object(code, status) {
                    Err(TransportError::NotFound)
                } else {
                    Err(service_error(err))
                }
            }
        }
    }

    async fn put(&self, request: PutObject<'_>) -> Result<(), TransportError> {
        let content_length = request.body.len() as i64;

        let mut builder = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .content_type(request.content_type)
            .content_length(content_length)
            .body(ByteStream::from(request.body));

        builder = match request.encryption {
            Some(ServerSideEncryption::Aes256) => {
                builder.server_side_encryption(types::ServerSideEncryption::Aes256)
            }
            Some(ServerSideEncryption::Kms { key_id }) => builder
                .server_side_encryption(types::ServerSideEncryption::AwsKms)
                .ssekms_key_id(key_id),
            None => builder,
        };

        if let Some(acl) = request.acl {
            builder = builder.acl(ObjectCannedAcl::from(acl));
        }

        builder.send().await.map_err(service_error)?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), TransportError> {
        debug!("Deleting s3://{}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }
}

/// Whether a failed read means the object itself is absent
///
/// A bare 404 only counts when the service sent no error code; `NoSuchBucket`
/// and other coded 404s are real errors.
fn is_missing_object(code: Option<&str>, status: Option<u16>) -> bool {
    match code {
        Some(code) => code == "NoSuchKey",
        None => status == Some(404),
    }
}

fn service_error<E>(err: SdkError<E>) -> TransportError
where
    E: std::error::Error + 'static,
{
    TransportError::service(DisplayErrorContext(&err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_reads_as_absent() {
        assert!(is_missing_object(Some("NoSuchKey"), Some(404)));
        assert!(is_missing_object(None, Some(404)));
    }

    #[test]
    fn test_missing_bucket_is_an_error() {
        assert!(!is_missing_object(Some("NoSuchBucket"), Some(404)));
        assert!(!is_missing_object(Some("AccessDenied"), Some(403)));
        assert!(!is_missing_object(None, Some(403)));
        assert!(!is_missing_object(None, None));
    }
}
