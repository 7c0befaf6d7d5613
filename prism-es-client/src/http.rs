//! Elasticsearch over HTTP

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use prism_es_query::engine::{BulkAction, BulkRequest, SearchEngine};
use prism_es_query::query::{EsQuery, SearchRequest, WriteByQueryRequest};
use prism_es_query::response::{
    CountResponse, GetResponse, SearchResponse, WriteByQueryResponse, WriteResponse,
};
use prism_es_query::EngineError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map};
use url::Url;

/// [`SearchEngine`] backed by the Elasticsearch REST API
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    base: Url,
}

#[derive(Serialize)]
struct CountBody<'a> {
    query: &'a EsQuery,
}

impl HttpEngine {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, &config.url)
    }

    pub fn with_client(client: Client, url: &str) -> Result<Self> {
        let base = Url::parse(url.trim_end_matches('/'))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Config(format!("'{}' cannot be used as a base URL", url)));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `<base>/<segments...>`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("'{}' cannot be used as a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn write_endpoint(&self, index: &str, action: &str, refresh: bool) -> Result<Url> {
        let mut url = self.endpoint(&[index, action])?;
        url.query_pairs_mut()
            .append_pair("conflicts", "proceed")
            .append_pair("refresh", if refresh { "true" } else { "false" });
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn search_inner(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let url = self.endpoint(&[index, "_search"])?;
        tracing::debug!(%url, "POST _search");
        self.send(self.client.post(url).json(request)).await
    }

    async fn count_inner(&self, index: &str, query: &EsQuery) -> Result<u64> {
        let url = self.endpoint(&[index, "_count"])?;
        let response: CountResponse = self
            .send(self.client.post(url).json(&CountBody { query }))
            .await?;
        Ok(response.count)
    }

    async fn bulk_inner(
        &self,
        index: &str,
        request: &BulkRequest,
        refresh: bool,
    ) -> Result<WriteResponse> {
        let mut url = self.endpoint(&[index, "_bulk"])?;
        url.query_pairs_mut()
            .append_pair("refresh", if refresh { "true" } else { "false" });

        let body = bulk_body(request)?;
        tracing::debug!(%url, actions = request.number_of_actions(), "POST _bulk");
        self.send(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )
        .await
    }

    async fn write_by_query(
        &self,
        index: &str,
        action: &str,
        request: &WriteByQueryRequest,
        refresh: bool,
    ) -> Result<WriteByQueryResponse> {
        let url = self.write_endpoint(index, action, refresh)?;
        tracing::debug!(%url, "POST {}", action);
        self.send(self.client.post(url).json(request)).await
    }

    async fn get_inner(&self, index: &str, id: &str) -> Result<GetResponse> {
        let url = self.endpoint(&[index, "_doc", id])?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            // A missing index is an error, a missing document is not
            return match serde_json::from_str::<GetResponse>(&body) {
                Ok(get) => Ok(get),
                Err(_) => Err(ClientError::Status { status: 404, body }),
            };
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// NDJSON body: one action line per action, followed by its source line
pub fn bulk_body(request: &BulkRequest) -> Result<String> {
    let mut body = String::new();
    for action in request.actions() {
        let mut meta = Map::new();
        meta.insert(action.op_type().to_string(), json!({ "_id": action.id() }));
        body.push_str(&serde_json::to_string(&meta)?);
        body.push('\n');
        match action {
            BulkAction::Create { doc, .. } => {
                body.push_str(&serde_json::to_string(doc)?);
                body.push('\n');
            }
            BulkAction::Update { doc, .. } => {
                body.push_str(&serde_json::to_string(&json!({ "doc": doc }))?);
                body.push('\n');
            }
            BulkAction::Delete { .. } => {}
        }
    }
    Ok(body)
}

#[async_trait]
impl SearchEngine for HttpEngine {
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> std::result::Result<SearchResponse, EngineError> {
        Ok(self.search_inner(index, request).await?)
    }

    async fn count(&self, index: &str, query: &EsQuery) -> std::result::Result<u64, EngineError> {
        Ok(self.count_inner(index, query).await?)
    }

    async fn bulk(
        &self,
        index: &str,
        request: &BulkRequest,
        refresh: bool,
    ) -> std::result::Result<WriteResponse, EngineError> {
        Ok(self.bulk_inner(index, request, refresh).await?)
    }

    async fn update_by_query(
        &self,
        index: &str,
        request: &WriteByQueryRequest,
        refresh: bool,
    ) -> std::result::Result<WriteByQueryResponse, EngineError> {
        Ok(self
            .write_by_query(index, "_update_by_query", request, refresh)
            .await?)
    }

    async fn delete_by_query(
        &self,
        index: &str,
        request: &WriteByQueryRequest,
        refresh: bool,
    ) -> std::result::Result<WriteByQueryResponse, EngineError> {
        Ok(self
            .write_by_query(index, "_delete_by_query", request, refresh)
            .await?)
    }

    async fn get(&self, index: &str, id: &str) -> std::result::Result<GetResponse, EngineError> {
        Ok(self.get_inner(index, id).await?)
    }
}
