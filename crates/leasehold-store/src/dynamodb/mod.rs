//! DynamoDB lock store
//!
//! Provides `DynamoDbLockStore`, which implements `LockStore` on Amazon
//! DynamoDB using consistent `GetItem` reads and `PutItem`/`DeleteItem`
//! writes guarded by condition expressions.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;
use tracing::debug;

use leasehold_common::StoreError;

use crate::LockStore;
use crate::condition::{Condition, RenderedCondition};
use crate::value::{AttributeValue, Item, ItemKey};

/// DynamoDB client configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack or DynamoDB Local)
    pub endpoint: Option<String>,
}

/// DynamoDB-based lock store
#[derive(Clone)]
pub struct DynamoDbLockStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbLockStore").finish_non_exhaustive()
    }
}

impl DynamoDbLockStore {
    /// Create a store from the default AWS configuration chain
    pub async fn new(config: DynamoDbConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Create from a pre-built client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn key_to_sdk(key: &ItemKey) -> HashMap<String, SdkValue> {
        key.attributes()
            .map(|attr| (attr.name.clone(), to_sdk_value(&attr.value)))
            .collect()
    }

    fn split_condition(
        condition: &Condition,
    ) -> (
        String,
        HashMap<String, String>,
        Option<HashMap<String, SdkValue>>,
    ) {
        let RenderedCondition {
            expression,
            names,
            values,
        } = condition.render();
        let values: HashMap<String, SdkValue> = values
            .iter()
            .map(|(placeholder, value)| (placeholder.clone(), to_sdk_value(value)))
            .collect();
        // DynamoDB rejects an empty ExpressionAttributeValues map
        let values = (!values.is_empty()).then_some(values);
        (expression, names.into_iter().collect(), values)
    }
}

fn to_sdk_value(value: &AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s.clone()),
        AttributeValue::N(n) => SdkValue::N(n.to_string()),
    }
}

fn from_sdk_value(value: &SdkValue) -> Option<AttributeValue> {
    match value {
        SdkValue::S(s) => Some(AttributeValue::S(s.clone())),
        SdkValue::N(n) => n.parse().ok().map(AttributeValue::N),
        _ => None,
    }
}

fn get_error(err: SdkError<GetItemError>) -> StoreError {
    if let SdkError::ServiceError(service_err) = &err
        && matches!(
            service_err.err(),
            GetItemError::ProvisionedThroughputExceededException(_)
                | GetItemError::RequestLimitExceeded(_)
        )
    {
        return StoreError::Throttled(DisplayErrorContext(&err).to_string());
    }
    transport_or_backend("GetItem", &err)
}

fn put_error(err: SdkError<PutItemError>) -> StoreError {
    if let SdkError::ServiceError(service_err) = &err {
        match service_err.err() {
            PutItemError::ConditionalCheckFailedException(_) => {
                return StoreError::ConditionFailed;
            }
            PutItemError::ProvisionedThroughputExceededException(_)
            | PutItemError::RequestLimitExceeded(_) => {
                return StoreError::Throttled(DisplayErrorContext(&err).to_string());
            }
            _ => {}
        }
    }
    transport_or_backend("PutItem", &err)
}

fn delete_error(err: SdkError<DeleteItemError>) -> StoreError {
    if let SdkError::ServiceError(service_err) = &err {
        match service_err.err() {
            DeleteItemError::ConditionalCheckFailedException(_) => {
                return StoreError::ConditionFailed;
            }
            DeleteItemError::ProvisionedThroughputExceededException(_)
            | DeleteItemError::RequestLimitExceeded(_) => {
                return StoreError::Throttled(DisplayErrorContext(&err).to_string());
            }
            _ => {}
        }
    }
    transport_or_backend("DeleteItem", &err)
}

fn transport_or_backend<E>(op: &str, err: &SdkError<E>) -> StoreError
where
    E: std::error::Error + 'static,
{
    let message = format!("DynamoDB {} failed: {}", op, DisplayErrorContext(err));
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Backend(message),
    }
}

#[async_trait]
impl LockStore for DynamoDbLockStore {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(Self::key_to_sdk(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(get_error)?;

        Ok(response.item().map(|item| {
            item.iter()
                .filter_map(|(name, value)| from_sdk_value(value).map(|v| (name.clone(), v)))
                .collect()
        }))
    }

    async fn put(
        &self,
        table: &str,
        key: &ItemKey,
        attributes: Item,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut item: HashMap<String, SdkValue> = attributes
            .iter()
            .map(|(name, value)| (name.clone(), to_sdk_value(value)))
            .collect();
        item.extend(Self::key_to_sdk(key));

        let mut request = self.client.put_item().table_name(table).set_item(Some(item));
        if let Some(condition) = condition {
            let (expression, names, values) = Self::split_condition(condition);
            debug!(table = %table, key = %key, condition = %expression, "Conditional PutItem");
            request = request
                .condition_expression(expression)
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(values);
        }

        request.send().await.map_err(put_error)?;
        Ok(())
    }

    async fn delete(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(Self::key_to_sdk(key)));
        if let Some(condition) = condition {
            let (expression, names, values) = Self::split_condition(condition);
            debug!(table = %table, key = %key, condition = %expression, "Conditional DeleteItem");
            request = request
                .condition_expression(expression)
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(values);
        }

        request.send().await.map_err(delete_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::config::http::HttpResponse;
    use aws_sdk_dynamodb::types::error::{
        ConditionalCheckFailedException, ProvisionedThroughputExceededException,
        ResourceNotFoundException,
    };
    use aws_smithy_types::body::SdkBody;

    fn service_error<E>(err: E) -> SdkError<E, HttpResponse> {
        let raw = HttpResponse::new(400u16.try_into().unwrap(), SdkBody::empty());
        SdkError::service_error(err, raw)
    }

    #[test]
    fn test_failed_precondition_maps_to_condition_failed() {
        let put = service_error(PutItemError::ConditionalCheckFailedException(
            ConditionalCheckFailedException::builder().build(),
        ));
        assert_eq!(put_error(put), StoreError::ConditionFailed);

        let delete = service_error(DeleteItemError::ConditionalCheckFailedException(
            ConditionalCheckFailedException::builder().build(),
        ));
        assert_eq!(delete_error(delete), StoreError::ConditionFailed);
    }

    #[test]
    fn test_throughput_errors_map_to_throttled() {
        let put = service_error(PutItemError::ProvisionedThroughputExceededException(
            ProvisionedThroughputExceededException::builder().build(),
        ));
        assert!(matches!(put_error(put), StoreError::Throttled(_)));

        let get = service_error(GetItemError::ProvisionedThroughputExceededException(
            ProvisionedThroughputExceededException::builder().build(),
        ));
        assert!(matches!(get_error(get), StoreError::Throttled(_)));
    }

    #[test]
    fn test_other_errors_map_by_kind() {
        let missing = service_error(DeleteItemError::ResourceNotFoundException(
            ResourceNotFoundException::builder().build(),
        ));
        assert!(matches!(delete_error(missing), StoreError::Backend(_)));

        let timeout: SdkError<PutItemError, HttpResponse> =
            SdkError::timeout_error("request timed out");
        assert!(matches!(put_error(timeout), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(
            to_sdk_value(&AttributeValue::N(30000)),
            SdkValue::N("30000".to_string())
        );
        assert_eq!(
            from_sdk_value(&SdkValue::S("job".to_string())),
            Some(AttributeValue::from("job"))
        );
        assert_eq!(from_sdk_value(&SdkValue::N("1.5".to_string())), None);
        assert_eq!(from_sdk_value(&SdkValue::Bool(true)), None);
    }

    #[test]
    fn test_split_condition_omits_empty_values() {
        let (expression, names, values) =
            DynamoDbLockStore::split_condition(&Condition::not_exists("id"));
        assert_eq!(expression, "attribute_not_exists(#a0)");
        assert_eq!(names.get("#a0").map(String::as_str), Some("id"));
        assert!(values.is_none());

        let (_, _, values) =
            DynamoDbLockStore::split_condition(&Condition::equals("fencingToken", "A"));
        let values = values.unwrap();
        assert_eq!(values.get(":v0"), Some(&SdkValue::S("A".to_string())));
    }
}
