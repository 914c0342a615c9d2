//! DynamoDB lock table
//!
//! The table needs a string hash key named `LockID`. Each row also carries an
//! `Info` string attribute with the serialized lock info.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use log::debug;

use super::{LockItem, LockTable, TransportError};

/// Hash key attribute of the lock table
pub const LOCK_ID_ATTRIBUTE: &str = "LockID";

/// Attribute holding the serialized lock info
pub const INFO_ATTRIBUTE: &str = "Info";

/// Lock table backed by DynamoDB conditional writes
#[derive(Debug, Clone)]
pub struct DynamoDbLockTable {
    client: Client,
}

impl DynamoDbLockTable {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LockTable for DynamoDbLockTable {
    async fn put_if_absent(&self, table: &str, item: LockItem) -> Result<(), TransportError> {
        debug!("Inserting lock row {} into {}", item.lock_id, table);

        let result = self
            .client
            .put_item()
            .table_name(table)
            .item(LOCK_ID_ATTRIBUTE, AttributeValue::S(item.lock_id))
            .item(INFO_ATTRIBUTE, AttributeValue::S(item.info))
            .condition_expression(format!("attribute_not_exists({})", LOCK_ID_ATTRIBUTE))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let condition_failed = err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception());
                if condition_failed {
                    Err(TransportError::ConditionFailed)
                } else {
                    Err(service_error(err))
                }
            }
        }
    }

    async fn get(&self, table: &str, lock_id: &str) -> Result<Option<LockItem>, TransportError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(LOCK_ID_ATTRIBUTE, AttributeValue::S(lock_id.to_string()))
            .projection_expression(format!("{}, {}", LOCK_ID_ATTRIBUTE, INFO_ATTRIBUTE))
            .consistent_read(true)
            .send()
            .await
            .map_err(service_error)?;

        let Some(item) = output.item() else {
            return Ok(None);
        };

        // Missing Info reads as "" and fails to parse later; the row still means locked.
        let info = item
            .get(INFO_ATTRIBUTE)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default();

        Ok(Some(LockItem {
            lock_id: lock_id.to_string(),
            info,
        }))
    }

    async fn delete(&self, table: &str, lock_id: &str) -> Result<(), TransportError> {
        debug!("Deleting lock row {} from {}", lock_id, table);

        self.client
            .delete_item()
            .table_name(table)
            .key(LOCK_ID_ATTRIBUTE, AttributeValue::S(lock_id.to_string()))
            .send()
            .await
            .map_err(service_error)?;

        Ok(())
    }
}

fn service_error<E>(err: SdkError<E>) -> TransportError
where
    E: std::error::Error + 'static,
{
    TransportError::service(DisplayErrorContext(&err))
}
