use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::Paginated;
use crate::domain::travel_data::TravelDataRecord;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("load task ended unexpectedly: {0}")]
    Task(String),
}

/// Where the session store pulls its rows from.
#[async_trait]
pub trait TravelDataSource: Send + Sync {
    async fn fetch_page(
        &self,
        session_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<TravelDataRecord>, ClientError>;
}

#[derive(Clone, Debug)]
pub struct HttpTravelDataSource {
    client: Client,
    base: Url,
    token: String,
}

impl HttpTravelDataSource {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            client,
            base,
            token: token.into(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("ledgerdesk-client/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response, ClientError> {
        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(text);
        Err(ClientError::Server { status, message })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn create(&self, payload: &Value) -> Result<TravelDataRecord, ClientError> {
        let url = self.url(&["api", "travel-data"], &[])?;
        Self::decode(self.send(Method::POST, url, Some(payload)).await?).await
    }

    pub async fn update(&self, id: Uuid, payload: &Value) -> Result<TravelDataRecord, ClientError> {
        let id = id.to_string();
        let url = self.url(&["api", "travel-data", id.as_str()], &[])?;
        Self::decode(self.send(Method::PATCH, url, Some(payload)).await?).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        let url = self.url(&["api", "travel-data", id.as_str()], &[])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }
}

#[async_trait]
impl TravelDataSource for HttpTravelDataSource {
    async fn fetch_page(
        &self,
        session_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<TravelDataRecord>, ClientError> {
        let url = self.url(
            &["api", "travel-data", session_id],
            &[("page", page.to_string()), ("pageSize", page_size.to_string())],
        )?;
        Self::decode(self.send(Method::GET, url, None).await?).await
    }
}
