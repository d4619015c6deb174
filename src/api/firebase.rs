// Firebase Firestore REST API client
// Using service account JWT authentication

use anyhow::{anyhow, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Firebase service account credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
}

/// JWT claims for Google OAuth2
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
    exp: u64,
    scope: String,
}

/// Cached access token
struct CachedToken {
    token: String,
    expires_at: u64,
}

/// Firestore refused a write because of contention or a failed precondition.
/// Callers downcast to this to tell retryable failures from hard ones.
#[derive(Debug, thiserror::Error)]
#[error("Firestore contention: {0}")]
pub struct FirestoreConflict(pub String);

/// Filter for structured queries
#[derive(Debug, Clone)]
pub struct QueryFilter {
    /// Field path, e.g., "employeeId" or "date"
    pub field: String,
    /// Operator: "EQUAL", "LESS_THAN", "LESS_THAN_OR_EQUAL",
    /// "GREATER_THAN", "GREATER_THAN_OR_EQUAL", "NOT_EQUAL"
    pub op: String,
    /// Value in Firestore format (e.g., { "stringValue": "..." })
    pub value: Value,
}

impl QueryFilter {
    /// Create a new filter with a string value
    pub fn string_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: "EQUAL".to_string(),
            value: json!({ "stringValue": value.into() }),
        }
    }

    /// Create a >= filter on a string field; ISO dates compare correctly
    pub fn string_gte(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: "GREATER_THAN_OR_EQUAL".to_string(),
            value: json!({ "stringValue": value.into() }),
        }
    }

    pub fn int_eq(field: impl Into<String>, value: i64) -> Self {
        Self {
            field: field.into(),
            op: "EQUAL".to_string(),
            value: json!({ "integerValue": value.to_string() }),
        }
    }
}

/// Write operation for transactions
#[derive(Debug, Clone)]
pub enum TransactionWrite {
    /// Create a document that must not exist yet
    Create { document_path: String, fields: Value },
    /// Delete a document by path (e.g., "rewards/abc")
    Delete { document_path: String },
    /// Update specific fields in a document
    Update { document_path: String, fields: Value },
}

/// Firebase REST API client
pub struct FirebaseClient {
    client: Client,
    service_account: ServiceAccount,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Last path segment of a document name
fn document_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or("").to_string()
}

/// Turn a failed response into an error, flagging contention separately
async fn response_error(response: Response, operation: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!("Firebase {} error: {}", operation, body);

    let contended = status == StatusCode::CONFLICT
        || body.contains("ABORTED")
        || body.contains("ALREADY_EXISTS")
        || body.contains("FAILED_PRECONDITION");

    if contended {
        anyhow::Error::new(FirestoreConflict(format!("{} returned {}", operation, status)))
    } else {
        anyhow!("Firebase {} error: {}", operation, status)
    }
}

impl FirebaseClient {
    /// Create a new Firebase client from service account JSON file
    pub fn from_file(client: Client, path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read service account {}: {}", path, e))?;
        let service_account: ServiceAccount = serde_json::from_str(&content)?;

        Ok(Self {
            client,
            service_account,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get access token (with caching)
    async fn get_access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                // Return cached token if still valid (with 60s buffer)
                if cached.expires_at > unix_now() + 60 {
                    return Ok(cached.token.clone());
                }
            }
        }

        let token = self.generate_access_token().await?;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: unix_now() + 3600,
            });
        }

        Ok(token)
    }

    /// Generate a new access token using JWT
    async fn generate_access_token(&self) -> Result<String> {
        let now = unix_now();

        let claims = Claims {
            iss: self.service_account.client_email.clone(),
            sub: self.service_account.client_email.clone(),
            aud: "https://oauth2.googleapis.com/token".to_string(),
            iat: now,
            exp: now + 3600,
            scope: "https://www.googleapis.com/auth/datastore".to_string(),
        };

        let key = EncodingKey::from_rsa_pem(self.service_account.private_key.as_bytes())?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        // Exchange JWT for access token
        let response = self
            .client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await?;
            error!("Failed to get access token: {}", body);
            return Err(anyhow!("Failed to get access token"));
        }

        let data: Value = response.json().await?;
        let token = data["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("No access_token in response"))?;

        Ok(token.to_string())
    }

    /// Resource prefix shared by document names
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.service_account.project_id
        )
    }

    /// Base URL for Firestore REST API
    fn base_url(&self) -> String {
        format!("https://firestore.googleapis.com/v1/{}", self.documents_root())
    }

    /// Get a document by path, e.g. "ledgers/42"
    pub async fn get_document(&self, path: &str) -> Result<Option<Value>> {
        let token = self.get_access_token().await?;
        let url = format!("{}/{}", self.base_url(), path);

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(response_error(response, "get").await);
        }

        let doc: Value = response.json().await?;
        Ok(Some(from_firestore_document(&doc)))
    }

    /// List every document of a collection as (id, data) tuples.
    /// Handles pagination to fetch ALL documents.
    pub async fn list_documents(&self, collection_path: &str) -> Result<Vec<(String, Value)>> {
        let token = self.get_access_token().await?;
        let base_url = format!("{}/{}", self.base_url(), collection_path);

        let mut all_docs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}?pageSize=300", base_url);
            if let Some(ref t) = page_token {
                url.push_str(&format!("&pageToken={}", t));
            }

            let response = self.client.get(&url).bearer_auth(&token).send().await?;

            if !response.status().is_success() {
                return Err(response_error(response, "list").await);
            }

            let result: Value = response.json().await?;

            if let Some(arr) = result["documents"].as_array() {
                for doc in arr {
                    if let Some(name) = doc["name"].as_str() {
                        all_docs.push((document_id(name), from_firestore_document(doc)));
                    }
                }
            }

            match result.get("nextPageToken").and_then(Value::as_str) {
                Some(t) => page_token = Some(t.to_string()),
                None => break,
            }
        }

        Ok(all_docs)
    }

    // ============ Structured Queries ============

    /// Run a structured query with server-side filtering.
    /// Returns Vec<(doc_id, data)>.
    ///
    /// # Arguments
    /// * `parent` - Document the collection hangs off, e.g. "ledgers/42"; `None` for top level
    /// * `collection` - e.g., "point_transactions"
    /// * `filters` - Combined with AND
    /// * `order_by` - Optional (field_path, direction) where direction is "ASCENDING" or "DESCENDING"
    /// * `limit` - Max documents to return
    /// * `transaction` - Read inside this transaction when set
    pub async fn run_query(
        &self,
        parent: Option<&str>,
        collection: &str,
        filters: Vec<QueryFilter>,
        order_by: Option<(&str, &str)>,
        limit: Option<usize>,
        transaction: Option<&str>,
    ) -> Result<Vec<(String, Value)>> {
        let token = self.get_access_token().await?;

        let parent = match parent {
            Some(path) => format!("{}/{}", self.documents_root(), path),
            None => self.documents_root(),
        };
        let url = format!("https://firestore.googleapis.com/v1/{}:runQuery", parent);

        let mut query = json!({
            "from": [{ "collectionId": collection }]
        });

        if let Some(limit) = limit {
            query["limit"] = json!(limit);
        }

        let mut filter_clauses: Vec<Value> = filters
            .iter()
            .map(|f| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": &f.field },
                        "op": &f.op,
                        "value": f.value.clone()
                    }
                })
            })
            .collect();

        match filter_clauses.len() {
            0 => {}
            1 => query["where"] = filter_clauses.remove(0),
            _ => {
                query["where"] = json!({
                    "compositeFilter": {
                        "op": "AND",
                        "filters": filter_clauses
                    }
                });
            }
        }

        if let Some((field, direction)) = order_by {
            query["orderBy"] = json!([{
                "field": { "fieldPath": field },
                "direction": direction
            }]);
        }

        let mut body = json!({ "structuredQuery": query });
        if let Some(tx) = transaction {
            body["transaction"] = json!(tx);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response, "query").await);
        }

        // Response is an array of { document: {...} } or { readTime: ... }
        let results: Vec<Value> = response.json().await?;
        let docs = results
            .iter()
            .filter_map(|item| item.get("document"))
            .filter_map(|doc| {
                doc["name"]
                    .as_str()
                    .map(|name| (document_id(name), from_firestore_document(doc)))
            })
            .collect();

        Ok(docs)
    }

    // ============ Transactions ============

    /// Begin a new Firestore transaction. Returns the transaction ID.
    pub async fn begin_transaction(&self) -> Result<String> {
        let token = self.get_access_token().await?;
        let url = format!("{}:beginTransaction", self.base_url());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response, "beginTransaction").await);
        }

        let result: Value = response.json().await?;
        let tx_id = result["transaction"]
            .as_str()
            .ok_or_else(|| anyhow!("No transaction ID in response"))?;

        Ok(tx_id.to_string())
    }

    /// Commit a list of writes, inside `transaction_id` when given.
    /// All writes are applied atomically.
    pub async fn commit_transaction(
        &self,
        transaction_id: Option<&str>,
        writes: Vec<TransactionWrite>,
    ) -> Result<()> {
        let token = self.get_access_token().await?;
        let url = format!("{}:commit", self.base_url());
        let root = self.documents_root();

        let write_objects: Vec<Value> = writes
            .into_iter()
            .map(|w| match w {
                TransactionWrite::Create {
                    document_path,
                    fields,
                } => json!({
                    "update": {
                        "name": format!("{}/{}", root, document_path),
                        "fields": to_firestore_fields(&fields)
                    },
                    "currentDocument": { "exists": false }
                }),
                TransactionWrite::Delete { document_path } => {
                    json!({ "delete": format!("{}/{}", root, document_path) })
                }
                TransactionWrite::Update {
                    document_path,
                    fields,
                } => {
                    let field_paths: Vec<String> = fields
                        .as_object()
                        .map(|obj| obj.keys().cloned().collect())
                        .unwrap_or_default();
                    json!({
                        "update": {
                            "name": format!("{}/{}", root, document_path),
                            "fields": to_firestore_fields(&fields)
                        },
                        "updateMask": {
                            "fieldPaths": field_paths
                        }
                    })
                }
            })
            .collect();

        let mut body = json!({ "writes": write_objects });
        if let Some(tx) = transaction_id {
            body["transaction"] = json!(tx);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response, "commit").await);
        }

        Ok(())
    }

    /// Release a transaction without writing anything
    pub async fn rollback_transaction(&self, transaction_id: &str) -> Result<()> {
        let token = self.get_access_token().await?;
        let url = format!("{}:rollback", self.base_url());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({ "transaction": transaction_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response, "rollback").await);
        }

        Ok(())
    }

    /// Read a document within a transaction context.
    pub async fn get_document_in_transaction(
        &self,
        transaction_id: &str,
        path: &str,
    ) -> Result<Option<Value>> {
        let token = self.get_access_token().await?;
        let url = format!("{}/{}", self.base_url(), path);

        let response = self
            .client
            .get(&url)
            .query(&[("transaction", transaction_id)])
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(response_error(response, "get").await);
        }

        let doc: Value = response.json().await?;
        Ok(Some(from_firestore_document(&doc)))
    }
}

/// Convert Firestore document to regular JSON
fn from_firestore_document(doc: &Value) -> Value {
    if let Some(fields) = doc.get("fields") {
        from_firestore_value(&json!({ "mapValue": { "fields": fields } }))
    } else {
        Value::Null
    }
}

/// Convert Firestore value to regular JSON value
fn from_firestore_value(value: &Value) -> Value {
    if let Some(s) = value.get("stringValue") {
        return s.clone();
    }
    if let Some(n) = value.get("integerValue") {
        if let Some(s) = n.as_str() {
            return s.parse::<i64>().map(Value::from).unwrap_or(Value::Null);
        }
        return n.clone();
    }
    if let Some(n) = value.get("doubleValue") {
        return n.clone();
    }
    if let Some(b) = value.get("booleanValue") {
        return b.clone();
    }
    if let Some(ts) = value.get("timestampValue") {
        return ts.clone();
    }
    if value.get("nullValue").is_some() {
        return Value::Null;
    }
    if let Some(arr) = value
        .get("arrayValue")
        .and_then(|a| a.get("values"))
        .and_then(|v| v.as_array())
    {
        return Value::Array(arr.iter().map(from_firestore_value).collect());
    }
    if let Some(obj) = value
        .get("mapValue")
        .and_then(|m| m.get("fields"))
        .and_then(|f| f.as_object())
    {
        let map: serde_json::Map<String, Value> = obj
            .iter()
            .map(|(k, v)| (k.clone(), from_firestore_value(v)))
            .collect();
        return Value::Object(map);
    }
    Value::Null
}

/// Convert JSON object to Firestore fields
fn to_firestore_fields(data: &Value) -> Value {
    if let Some(obj) = data.as_object() {
        let fields: serde_json::Map<String, Value> = obj
            .iter()
            .map(|(k, v)| (k.clone(), to_firestore_value(v)))
            .collect();
        Value::Object(fields)
    } else {
        json!({})
    }
}

/// Convert JSON value to Firestore value format
fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Number(n) => {
            if n.is_f64() {
                json!({ "doubleValue": n })
            } else {
                json!({ "integerValue": n.to_string() })
            }
        }
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Array(arr) => {
            let values: Vec<Value> = arr.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(obj) => {
            let fields: serde_json::Map<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
        Value::Null => json!({ "nullValue": null }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_fields_survive_conversion() {
        let data = json!({
            "employeeId": 42,
            "points": 150,
            "rank": "Bronze",
            "productivityPercentage": 82.5,
            "reference": null,
            "tags": ["a", "b"]
        });

        let doc = json!({ "fields": to_firestore_fields(&data) });
        assert_eq!(doc["fields"]["employeeId"], json!({ "integerValue": "42" }));
        assert_eq!(doc["fields"]["productivityPercentage"], json!({ "doubleValue": 82.5 }));

        assert_eq!(from_firestore_document(&doc), data);
    }

    #[test]
    fn test_bad_integer_becomes_null() {
        let value = json!({ "integerValue": "not-a-number" });
        assert_eq!(from_firestore_value(&value), Value::Null);
    }

    #[test]
    fn test_document_id() {
        assert_eq!(
            document_id("projects/p/databases/(default)/documents/ledgers/42/achievements/7"),
            "7"
        );
        assert_eq!(document_id("plain"), "plain");
    }

    #[test]
    fn test_conflict_marker_downcasts() {
        let err = anyhow::Error::new(FirestoreConflict("commit returned 409".into()));
        assert!(err.downcast_ref::<FirestoreConflict>().is_some());
        assert!(anyhow!("other").downcast_ref::<FirestoreConflict>().is_none());
    }
}
