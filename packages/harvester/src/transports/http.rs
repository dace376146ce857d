//! HTTP transport for the warrant-search portal.
//!
//! One `reqwest` client serves searches, child enumeration and detail
//! lookups. Response bodies are decoded by small pure functions so the wire
//! handling can be tested without a server.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{HarvestError, HarvestResult, TransportError, TransportResult};
use crate::traits::{detail::DetailSource, enumerator::Enumerator, transport::QueryTransport};
use crate::types::{
    partition::{FilterValue, Level, PartitionKey},
    record::{DetailOutcome, SearchItem, SearchPage},
    window::SortDirection,
};

const DEFAULT_BASE_URL: &str = "https://portalbnmp.cnj.jus.br/";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36";

const SEARCH_PATH: &str = "bnmpportal/api/pesquisa-pecas/filter";

/// Settings for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportConfig {
    /// Portal root; endpoint paths are joined onto it
    pub base_url: String,

    /// Session cookie. Expires daily; an expired one shows up as a 401.
    pub cookie: SecretString,

    pub user_agent: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Record type codes offered below an agency
    pub record_types: Vec<i64>,

    /// Name initials offered below a record type
    pub name_initials: Vec<char>,

    /// Request body field carrying the name initial
    pub name_filter_field: String,
}

impl HttpTransportConfig {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie: SecretString::from(cookie.into()),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            record_types: (1..=13).collect(),
            name_initials: ('A'..='Z').collect(),
            name_filter_field: "nomePessoa".to_string(),
        }
    }

    /// Set the portal root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_record_types(mut self, record_types: impl IntoIterator<Item = i64>) -> Self {
        self.record_types = record_types.into_iter().collect();
        self
    }

    pub fn with_name_initials(mut self, initials: impl IntoIterator<Item = char>) -> Self {
        self.name_initials = initials.into_iter().collect();
        self
    }

    pub fn with_name_filter_field(mut self, field: impl Into<String>) -> Self {
        self.name_filter_field = field.into();
        self
    }
}

/// Search-portal client implementing every collaborator trait.
///
/// # Example
///
/// ```rust,ignore
/// use harvester::transports::{HttpTransport, HttpTransportConfig};
///
/// let transport = HttpTransport::new(HttpTransportConfig::new(cookie))?;
/// ```
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    record_types: Vec<i64>,
    name_initials: Vec<char>,
    name_filter_field: String,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> HarvestResult<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| HarvestError::Config(format!("invalid base URL {}: {}", config.base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        let mut cookie = HeaderValue::from_str(config.cookie.expose_secret())
            .map_err(|_| HarvestError::Config("cookie is not a valid header value".into()))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| HarvestError::Config("user agent is not a valid header value".into()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            record_types: config.record_types,
            name_initials: config.name_initials,
            name_filter_field: config.name_filter_field,
        })
    }

    fn endpoint(&self, path: &str) -> TransportResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Decode(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Send a request and return the status and body text.
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> TransportResult<(StatusCode, String)> {
        let response = request.send().await.map_err(|e| request_error(e, context))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| request_error(e, context))?;
        debug!(context = %context, status = status.as_u16(), bytes = body.len(), "HTTP response");
        Ok((status, body))
    }

    async fn list_ids(&self, path: String) -> TransportResult<Vec<FilterValue>> {
        let url = self.endpoint(&path)?;
        let (status, body) = self.send(self.client.get(url), &path).await?;
        decode_ids(status, &body)
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn search(
        &self,
        filter: &PartitionKey,
        page_index: u32,
        page_size: u32,
        direction: SortDirection,
    ) -> TransportResult<SearchPage> {
        let mut url = self.endpoint(SEARCH_PATH)?;
        url.query_pairs_mut()
            .append_pair("page", &page_index.to_string())
            .append_pair("size", &page_size.to_string())
            .append_pair("sort", &format!("numeroPeca,{}", direction.as_query()));

        let context = format!("search {} page {} {}", filter, page_index, direction);
        let body = search_payload(filter, &self.name_filter_field);
        let (status, text) = self.send(self.client.post(url).json(&body), &context).await?;
        decode_search(status, &text)
    }
}

#[async_trait]
impl Enumerator for HttpTransport {
    async fn list_children(
        &self,
        level: Level,
        parent: &PartitionKey,
    ) -> TransportResult<Vec<FilterValue>> {
        let parent_id = |at: Level| {
            parent
                .id(at)
                .ok_or_else(|| TransportError::Decode(format!("{} has no {} to enumerate under", parent, at)))
        };

        match level {
            Level::Region => Ok(Vec::new()),
            Level::SubRegion => {
                let region = parent_id(Level::Region)?;
                self.list_ids(format!("scaservice/api/municipios/por-uf/{}", region))
                    .await
            }
            Level::Agency => {
                let sub_region = parent_id(Level::SubRegion)?;
                self.list_ids(format!(
                    "bnmpportal/api/pesquisa-pecas/orgaos/municipio/{}",
                    sub_region
                ))
                .await
            }
            Level::RecordType => Ok(self.record_types.iter().copied().map(FilterValue::Id).collect()),
            Level::NameInitial => Ok(self
                .name_initials
                .iter()
                .copied()
                .map(FilterValue::Initial)
                .collect()),
        }
    }
}

#[async_trait]
impl DetailSource for HttpTransport {
    async fn get_detail(&self, id: i64, type_code: i32) -> TransportResult<DetailOutcome> {
        let path = format!("bnmpportal/api/certidaos/{}/{}", id, type_code);
        let url = self.endpoint(&path)?;
        let (status, body) = self.send(self.client.get(url), &path).await?;
        decode_detail(status, &body)
    }
}

fn request_error(err: reqwest::Error, context: &str) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            context: context.to_string(),
        }
    } else {
        TransportError::Http(Box::new(err))
    }
}

/// JSON body of a search for `filter`.
///
/// Only the levels present in the key are sent; the agency travels as an
/// object under `orgaoExpeditor`.
pub fn search_payload(filter: &PartitionKey, name_field: &str) -> Value {
    let mut body = Map::new();
    body.insert("buscaOrgaoRecursivo".into(), json!(false));
    body.insert(
        "orgaoExpeditor".into(),
        match filter.id(Level::Agency) {
            Some(agency) => json!({ "id": agency }),
            None => json!({}),
        },
    );
    if let Some(region) = filter.region_id() {
        body.insert("idEstado".into(), json!(region));
    }
    if let Some(sub_region) = filter.id(Level::SubRegion) {
        body.insert("idMunicipio".into(), json!(sub_region));
    }
    if let Some(record_type) = filter.id(Level::RecordType) {
        body.insert("idTipoDocumento".into(), json!(record_type));
    }
    if let Some(initial) = filter.name_initial() {
        body.insert(name_field.into(), json!(initial.to_string()));
    }
    Value::Object(body)
}

/// Structured error payload (carries a `type` field).
#[derive(Debug, Deserialize)]
struct Problem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Problem {
    fn into_error(self, status: StatusCode) -> TransportError {
        let message = self
            .detail
            .or(self.message)
            .or(self.title)
            .unwrap_or_default();
        TransportError::Api {
            status: Some(status.as_u16()),
            kind: self.kind,
            message,
        }
    }
}

/// Error payload carried in the body, whatever the status.
fn problem_payload(status: StatusCode, body: &str) -> Option<TransportError> {
    serde_json::from_str::<Problem>(body)
        .ok()
        .map(|problem| problem.into_error(status))
}

/// Error for a non-success status.
fn status_error(status: StatusCode, body: &str) -> Option<TransportError> {
    if status.is_success() {
        return None;
    }
    let kind = if status == StatusCode::UNAUTHORIZED {
        "unauthorized"
    } else {
        "http_status"
    };
    Some(TransportError::Api {
        status: Some(status.as_u16()),
        kind: kind.into(),
        message: truncate(body),
    })
}

/// Reject error statuses and error payloads.
fn check_response(status: StatusCode, body: &str) -> TransportResult<()> {
    match problem_payload(status, body).or_else(|| status_error(status, body)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    #[serde(default)]
    content: Vec<WireItem>,
    #[serde(default)]
    total_elements: Option<u64>,
    #[serde(default)]
    total_pages: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    id: i64,
    #[serde(rename = "idTipoPeca")]
    type_code: i32,
    #[serde(default)]
    numero_processo: Option<String>,
    #[serde(default)]
    numero_peca: Option<String>,
    #[serde(deserialize_with = "date_prefix")]
    data_expedicao: NaiveDate,
}

impl From<WireItem> for SearchItem {
    fn from(item: WireItem) -> Self {
        SearchItem {
            id: item.id,
            type_code: item.type_code,
            process_number: item.numero_processo.unwrap_or_default(),
            piece_number: item.numero_peca.unwrap_or_default(),
            expedition_date: item.data_expedicao,
        }
    }
}

/// Accepts `2021-03-03` as well as timestamps starting with a date.
fn date_prefix<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let date = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct WireId {
    id: i64,
}

/// Decode a search response.
pub fn decode_search(status: StatusCode, body: &str) -> TransportResult<SearchPage> {
    check_response(status, body)?;
    let page: WirePage = serde_json::from_str(body)
        .map_err(|e| TransportError::Decode(format!("search page: {}", e)))?;

    Ok(SearchPage {
        total_count: page.total_elements.or(page.total_pages).unwrap_or(0),
        items: page.content.into_iter().map(SearchItem::from).collect(),
    })
}

/// Decode an id listing (sub-regions, agencies).
pub fn decode_ids(status: StatusCode, body: &str) -> TransportResult<Vec<FilterValue>> {
    check_response(status, body)?;
    let ids: Vec<WireId> = serde_json::from_str(body)
        .map_err(|e| TransportError::Decode(format!("id listing: {}", e)))?;
    Ok(ids.into_iter().map(|w| FilterValue::Id(w.id)).collect())
}

/// Decode a detail response. A 404 means the record has no detail (yet).
pub fn decode_detail(status: StatusCode, body: &str) -> TransportResult<DetailOutcome> {
    if status == StatusCode::NOT_FOUND {
        return Ok(DetailOutcome::NotFound);
    }
    // Detail documents may carry their own `type` field; only the status counts
    if let Some(err) = status_error(status, body) {
        return Err(problem_payload(status, body).unwrap_or(err));
    }
    serde_json::from_str(body)
        .map(DetailOutcome::Found)
        .map_err(|e| TransportError::Decode(format!("detail document: {}", e)))
}
