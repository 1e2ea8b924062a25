//! User-defined document collections.
//!
//! A collection groups documents under a name of the user's choosing. The
//! backend may match new uploads into a collection on its own when
//! `auto_match` is set at creation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCollection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub auto_match: bool,
}

/// Partial update; absent fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCollection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateCollection {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Answer of `GET /collection/{id}/contents`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionContents {
    pub collection: String,
    #[serde(default)]
    pub contents: Vec<CollectionItem>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
}

fn required(value: &str, what: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::InvalidRequest(format!("{} must not be empty", what)));
    }
    Ok(value.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct CollectionsClient {
    api: ApiClient,
}

impl CollectionsClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Collection>, ApiError> {
        self.api.get_json_with_query(&["collection", ""], &[]).await
    }

    /// Finds a collection by id, or failing that by case-insensitive name.
    pub async fn find(&self, id_or_name: &str) -> Result<Collection, ApiError> {
        let wanted = required(id_or_name, "Collection name")?;
        let collections = self.list().await?;
        select(collections, &wanted)
            .ok_or_else(|| ApiError::InvalidRequest(format!("No collection named '{}'", wanted)))
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        auto_match: bool,
    ) -> Result<Collection, ApiError> {
        let request = CreateCollection {
            name: required(name, "Collection name")?,
            description: optional(description),
            auto_match,
        };
        let collection: Collection = self.api.post_json(&["collection", ""], &request).await?;
        info!(id = %collection.id, name = %collection.name, "Collection created");
        Ok(collection)
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Collection, ApiError> {
        let id = required(id, "Collection id")?;
        let update = UpdateCollection {
            name: match name {
                Some(name) => Some(required(name, "Collection name")?),
                None => None,
            },
            description: description.map(|d| d.trim().to_string()),
        };
        if update.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Nothing to update: give a name or a description".to_string(),
            ));
        }

        let collection: Collection = self.api.put_json(&["collection", &id], &update).await?;
        debug!(id = %collection.id, "Collection updated");
        Ok(collection)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let id = required(id, "Collection id")?;
        let response: DeleteResponse = self.api.delete_json(&["collection", &id]).await?;
        if response.status != "success" {
            return Err(ApiError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| format!("status '{}'", response.status)),
            ));
        }
        info!(id = %id, "Collection deleted");
        Ok(())
    }

    pub async fn contents(&self, id: &str) -> Result<CollectionContents, ApiError> {
        let id = required(id, "Collection id")?;
        self.api
            .get_json_with_query(&["collection", &id, "contents"], &[])
            .await
    }
}

/// An exact id match wins over a name match.
fn select(collections: Vec<Collection>, wanted: &str) -> Option<Collection> {
    let by_id = collections.iter().position(|c| c.id == wanted);
    let index = by_id.or_else(|| {
        collections
            .iter()
            .position(|c| c.name.to_lowercase() == wanted.to_lowercase())
    })?;
    collections.into_iter().nth(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(id: &str, name: &str) -> Collection {
        Collection {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            content_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_select_prefers_id() {
        let collections = vec![collection("a1", "Taxes"), collection("Taxes", "Receipts")];
        assert_eq!(select(collections.clone(), "Taxes").unwrap().name, "Receipts");
        assert_eq!(select(collections.clone(), "taxes").unwrap().id, "a1");
        assert!(select(collections, "Travel").is_none());
    }

    #[test]
    fn test_update_serializes_only_given_fields() {
        let update = UpdateCollection {
            name: Some("Receipts".to_string()),
            description: None,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"name": "Receipts"})
        );
        assert!(UpdateCollection::default().is_empty());
    }

    #[test]
    fn test_create_request_body() {
        let request = CreateCollection {
            name: "Taxes".to_string(),
            description: optional(Some("  ")),
            auto_match: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"name": "Taxes", "auto_match": true})
        );
    }

    #[test]
    fn test_collection_with_missing_optional_fields() {
        let collection: Collection =
            serde_json::from_str(r#"{"id": "1", "name": "Taxes", "content_count": 4}"#).unwrap();
        assert_eq!(collection.content_count, 4);
        assert!(collection.description.is_none());
    }

    #[tokio::test]
    async fn test_blank_arguments_rejected_locally() {
        let config = crate::config::ClientConfig {
            api_base_url: "http://127.0.0.1:9/api".to_string(),
            ..Default::default()
        };
        let client = CollectionsClient::new(ApiClient::new(&config).unwrap());

        let err = client.create(" ", None, true).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = client.update("1", None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = client.update("1", Some(""), None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = client.delete("").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
