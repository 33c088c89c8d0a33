//! Milvus RESTful API (v2) client.
//!
//! Every call is a `POST /v2/vectordb/<resource>/<action>` with a JSON body;
//! the response envelope is `{"code": 0, "data": ...}` on success and
//! `{"code": N, "message": "..."}` otherwise. Body builders and response
//! parsers are plain functions so they can be tested without a server.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use voidx_core::config::MilvusSettings;
use voidx_core::types::Document;
use voidx_core::{Error, Result};

use crate::client::{LoadState, VectorClient};
use crate::index::{IndexSpec, IndexState};
use crate::rows::Row;
use crate::schema::{CollectionInfo, CollectionSchema, ColumnSpec, CreateCollection, DataType};
use crate::search::{AnnSearch, Hit, QueryVector};

/// Codes Milvus uses for "collection does not exist".
const COLLECTION_NOT_FOUND: [i64; 2] = [100, 1100];

/// A non-zero envelope code (or a non-2xx status).
#[derive(Debug, thiserror::Error)]
#[error("milvus code {code}: {message}")]
pub struct MilvusError {
    pub code: i64,
    pub message: String,
}

pub struct MilvusClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
    database: String,
}

impl MilvusClient {
    pub fn new(settings: &MilvusSettings) -> Result<Self> {
        let mut builder = Client::builder().pool_idle_timeout(Duration::from_secs(90));
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| Error::backend("build http client", e))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token: settings.token.clone().filter(|t| !t.is_empty()),
            database: settings.database.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.endpoint, path)
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let Value::Object(obj) = &mut body {
            obj.insert("dbName".to_string(), Value::from(self.database.as_str()));
        }
        tracing::debug!(path, "milvus request");
        let mut req = self.http.post(self.url(path)).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| Error::backend(format!("POST {path}"), e))?;
        let status = resp.status();
        let text =
            resp.text().await.map_err(|e| Error::backend(format!("read {path} response"), e))?;
        if !status.is_success() {
            return Err(Error::backend(
                format!("POST {path}"),
                MilvusError { code: i64::from(status.as_u16()), message: text },
            ));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::backend(format!("decode {path} response"), e))?;
        unwrap_envelope(path, value)
    }
}

/// Returns `data` of a successful envelope, or maps the failure.
pub fn unwrap_envelope(path: &str, value: Value) -> Result<Value> {
    let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code == 0 {
        return Ok(value.get("data").cloned().unwrap_or(Value::Null));
    }
    let message =
        value.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string();
    if COLLECTION_NOT_FOUND.contains(&code) {
        return Err(Error::not_found(message));
    }
    if message.to_ascii_lowercase().contains("already exist") {
        return Err(Error::Conflict(message));
    }
    Err(Error::backend(format!("POST {path}"), MilvusError { code, message }))
}

fn data_type_name(dt: &DataType) -> &'static str {
    match dt {
        DataType::Int64 => "Int64",
        DataType::VarChar { .. } => "VarChar",
        DataType::FloatVector { .. } => "FloatVector",
        DataType::SparseFloatVector => "SparseFloatVector",
    }
}

pub fn create_collection_body(req: &CreateCollection) -> Value {
    let fields: Vec<Value> = req
        .schema
        .columns
        .iter()
        .map(|c| {
            let mut f = json!({
                "fieldName": c.name,
                "dataType": data_type_name(&c.data_type),
                "isPrimary": c.is_primary,
                "nullable": c.nullable,
            });
            match &c.data_type {
                DataType::VarChar { max_length } => {
                    f["elementTypeParams"] = json!({ "max_length": max_length })
                }
                DataType::FloatVector { dim } => f["elementTypeParams"] = json!({ "dim": dim }),
                _ => {}
            }
            if !c.description.is_empty() {
                f["description"] = json!(c.description);
            }
            f
        })
        .collect();
    json!({
        "collectionName": req.name,
        "schema": {
            "autoId": req.schema.auto_id,
            "enableDynamicField": req.schema.enable_dynamic_field,
            "fields": fields,
        },
        "params": { "shardsNum": req.shard_num },
    })
}

pub fn alter_properties_body(collection: &str, properties: &BTreeMap<String, String>) -> Value {
    json!({ "collectionName": collection, "properties": properties })
}

pub fn create_index_body(collection: &str, spec: &IndexSpec) -> Value {
    let mut params = Map::new();
    params.insert("index_type".to_string(), Value::from(spec.config.index_type.as_str()));
    params.extend(spec.config.params.clone());
    json!({
        "collectionName": collection,
        "indexParams": [{
            "fieldName": spec.field_name,
            "indexName": spec.index_name,
            "metricType": spec.metric,
            "params": params,
        }],
    })
}

fn partition_body(collection: &str, partition: &str) -> Value {
    json!({ "collectionName": collection, "partitionName": partition })
}

fn query_vector_json(v: &QueryVector) -> Value {
    match v {
        QueryVector::Dense(d) => json!(d),
        QueryVector::Sparse(s) => {
            let obj: Map<String, Value> =
                s.iter().map(|(i, w)| (i.to_string(), json!(w))).collect();
            Value::Object(obj)
        }
    }
}

pub fn search_body(req: &AnnSearch) -> Value {
    let mut body = json!({
        "collectionName": req.collection,
        "data": [query_vector_json(&req.vector)],
        "annsField": req.anns_field,
        "limit": req.limit,
        "outputFields": req.output_fields,
        "searchParams": { "metricType": req.metric, "params": req.params },
    });
    if let Some(filter) = req.filter.as_deref().filter(|f| !f.is_empty()) {
        body["filter"] = json!(filter);
    }
    if !req.partitions.is_empty() {
        body["partitionNames"] = json!(req.partitions);
    }
    body
}

pub fn insert_body(collection: &str, partition: Option<&str>, rows: &[Row]) -> Value {
    let data: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()))
        .collect();
    let mut body = json!({ "collectionName": collection, "data": data });
    if let Some(p) = partition {
        body["partitionName"] = json!(p);
    }
    body
}

pub fn parse_load_state(data: &Value) -> LoadState {
    match data.get("loadState").and_then(Value::as_str).unwrap_or("") {
        "LoadStateLoaded" => LoadState::Loaded,
        "LoadStateLoading" => LoadState::Loading,
        "LoadStateNotLoad" => LoadState::NotLoad,
        "LoadStateUnloading" => LoadState::Unloading,
        _ => LoadState::NotExist,
    }
}

pub fn parse_index_state(data: &Value) -> IndexState {
    let entry = match data {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    match entry.get("indexState").and_then(Value::as_str).unwrap_or("") {
        "Finished" => IndexState::Finished,
        "Failed" => IndexState::Failed(
            entry.get("failReason").and_then(Value::as_str).unwrap_or("unknown").to_string(),
        ),
        _ => IndexState::InProgress,
    }
}

fn param<'a>(field: &'a Value, key: &str) -> Option<&'a Value> {
    field
        .get("params")?
        .as_array()?
        .iter()
        .find(|p| p.get("key").and_then(Value::as_str) == Some(key))
        .and_then(|p| p.get("value"))
}

fn param_usize(field: &Value, key: &str) -> Option<usize> {
    match param(field, key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|v| v as usize),
        _ => None,
    }
}

pub fn parse_collection_info(data: &Value) -> Result<CollectionInfo> {
    let name = data.get("collectionName").and_then(Value::as_str).unwrap_or_default().to_string();
    let fields = data
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::backend("describe collection", "response has no fields"))?;
    let mut columns = Vec::with_capacity(fields.len());
    for f in fields {
        let col_name = f.get("name").and_then(Value::as_str).unwrap_or_default();
        let data_type = match f.get("type").and_then(Value::as_str).unwrap_or("") {
            "Int64" => DataType::Int64,
            "VarChar" => {
                let max_length = param_usize(f, "max_length").unwrap_or(0) as u32;
                DataType::VarChar { max_length }
            }
            "FloatVector" => DataType::FloatVector { dim: param_usize(f, "dim").unwrap_or(0) },
            "SparseFloatVector" => DataType::SparseFloatVector,
            other => {
                return Err(Error::backend(
                    "describe collection",
                    format!("column '{col_name}' has unsupported type '{other}'"),
                ))
            }
        };
        let mut col = ColumnSpec::new(col_name, data_type)
            .nullable(f.get("nullable").and_then(Value::as_bool).unwrap_or(false))
            .described(f.get("description").and_then(Value::as_str).unwrap_or_default());
        col.is_primary = f.get("primaryKey").and_then(Value::as_bool).unwrap_or(false);
        columns.push(col);
    }
    let properties = data
        .get("properties")
        .and_then(Value::as_array)
        .map(|props| {
            props
                .iter()
                .filter_map(|p| {
                    let key = p.get("key")?.as_str()?;
                    let value = p.get("value")?.as_str()?;
                    Some((key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(CollectionInfo {
        name,
        schema: CollectionSchema {
            columns,
            auto_id: data.get("autoId").and_then(Value::as_bool).unwrap_or(false),
            enable_dynamic_field: data
                .get("enableDynamicField")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        shard_num: data.get("shardsNum").and_then(Value::as_u64).unwrap_or(1) as u32,
        properties,
    })
}

/// Search hits for a single query vector. The score is `distance`; the
/// primary key comes back under its column name.
pub fn parse_hits(data: &Value, primary_key: &str) -> Result<Vec<Hit>> {
    let items = match data {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(Error::backend("search", "unexpected response shape")),
    };
    items
        .iter()
        .map(|item| {
            let obj =
                item.as_object().ok_or_else(|| Error::backend("search", "hit is not an object"))?;
            let id = obj
                .get(primary_key)
                .or_else(|| obj.get("id"))
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::backend("search", format!("hit without '{primary_key}'")))?;
            let score = obj.get("distance").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let fields: Document = obj
                .iter()
                .filter(|(k, _)| k.as_str() != "distance")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(Hit { id, score, fields })
        })
        .collect()
}

#[async_trait]
impl VectorClient for MilvusClient {
    fn kind(&self) -> &'static str {
        "milvus"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let data = self.post("collections/has", json!({ "collectionName": name })).await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_collection(&self, req: &CreateCollection) -> Result<()> {
        self.post("collections/create", create_collection_body(req)).await?;
        if !req.properties.is_empty() {
            let body = alter_properties_body(&req.name, &req.properties);
            self.post("collections/alter_properties", body).await?;
        }
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionInfo> {
        let data = self.post("collections/describe", json!({ "collectionName": name })).await?;
        parse_collection_info(&data)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.post("collections/drop", json!({ "collectionName": name })).await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let data = self.post("indexes/list", json!({ "collectionName": collection })).await?;
        Ok(data
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        self.post("indexes/create", create_index_body(collection, spec)).await?;
        Ok(())
    }

    async fn index_state(&self, collection: &str, index_name: &str) -> Result<IndexState> {
        let body = json!({ "collectionName": collection, "indexName": index_name });
        let data = self.post("indexes/describe", body).await?;
        Ok(parse_index_state(&data))
    }

    async fn load_state(&self, collection: &str) -> Result<LoadState> {
        let body = json!({ "collectionName": collection });
        match self.post("collections/get_load_state", body).await {
            Ok(data) => Ok(parse_load_state(&data)),
            Err(Error::NotFound(_)) => Ok(LoadState::NotExist),
            Err(e) => Err(e),
        }
    }

    async fn load_collection(&self, collection: &str) -> Result<()> {
        self.post("collections/load", json!({ "collectionName": collection })).await?;
        Ok(())
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool> {
        let data = self.post("partitions/has", partition_body(collection, partition)).await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<()> {
        self.post("partitions/create", partition_body(collection, partition)).await?;
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        rows: &[Row],
    ) -> Result<usize> {
        let data = self.post("entities/insert", insert_body(collection, partition, rows)).await?;
        let count = data.get("insertCount").and_then(Value::as_u64).map(|n| n as usize);
        Ok(count.unwrap_or(rows.len()))
    }

    async fn search(&self, req: &AnnSearch) -> Result<Vec<Hit>> {
        let data = self.post("entities/search", search_body(req)).await?;
        parse_hits(&data, &req.primary_key)
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<()> {
        let body = json!({ "collectionName": collection, "filter": filter });
        self.post("entities/delete", body).await?;
        Ok(())
    }
}
