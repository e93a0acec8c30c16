//! Dining GraphQL API client
//!
//! Fetches daily menus and nutrition documents from the dining GraphQL endpoint
//! and parses them into our data structures. Only the v3 schema
//! (`diningCourtByName { dailyMenu }`, `itemByItemId`) is supported.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::{DailyMenu, Nutrition};

/// Default GraphQL endpoint
pub const MENU_API_URL: &str = "https://api.hfs.purdue.edu/menus/v3/GraphQL";

/// HTTP request timeout applied by the underlying client
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const MENU_OPERATION: &str = "getLocationMenu";

const MENU_QUERY: &str = "query getLocationMenu($name: String!, $date: Date!) {
  diningCourtByName(name: $name) {
    dailyMenu(date: $date) {
      meals {
        name
        stations {
          name
          items {
            item {
              itemId
              name
            }
          }
        }
      }
    }
  }
}";

const NUTRITION_QUERY: &str = "query ($id: Guid!) {
  itemByItemId(itemId: $id) {
    itemId
    name
    isNutritionReady
    nutritionFacts {
      name
      value
      label
    }
  }
}";

/// Errors that can occur when fetching from the upstream API
///
/// Cloneable so that every caller waiting on a shared fetch receives the error.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The upstream answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the JSON shape we expect
    #[error("Failed to parse upstream response: {0}")]
    ParseError(String),

    /// The upstream reported GraphQL errors and returned no data
    #[error("Upstream reported errors: {0}")]
    GraphQl(String),

    /// The fetch did not finish within its time limit
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        } else {
            FetchError::RequestFailed(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::ParseError(e.to_string())
    }
}

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        FetchError::Status {
            status,
            body: Self::truncate_body(body),
        }
    }
}

/// Source of menu and nutrition documents
///
/// `Ok(None)` means the upstream answered but has no document for the request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_menu(&self, court: &str, date: NaiveDate) -> Result<Option<DailyMenu>, FetchError>;

    async fn fetch_nutrition(&self, item_id: &str) -> Result<Option<Nutrition>, FetchError>;
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuData {
    dining_court_by_name: Option<CourtData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourtData {
    daily_menu: Option<DailyMenu>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NutritionData {
    item_by_item_id: Option<Nutrition>,
}

/// Client for the dining GraphQL API
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct MenuClient {
    client: Client,
    api_url: String,
}

impl MenuClient {
    /// Create a new MenuClient against the default endpoint
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a new MenuClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            api_url: MENU_API_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// POST one GraphQL query and return the raw response body
    async fn query(
        &self,
        query: &str,
        variables: serde_json::Value,
        operation_name: Option<&str>,
    ) -> Result<String, FetchError> {
        let body = GraphQlRequest {
            query,
            variables,
            operation_name,
        };

        let response = self.client.post(&self.api_url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "GraphQL query failed");
            return Err(FetchError::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }
}

/// Decode a GraphQL envelope, treating errors without data as a failure
fn parse_envelope<D: DeserializeOwned>(text: &str) -> Result<Option<D>, FetchError> {
    let envelope: GraphQlResponse<D> = serde_json::from_str(text)?;
    match (envelope.data, envelope.errors) {
        (Some(data), errors) => {
            if let Some(errors) = errors.filter(|e| !e.is_empty()) {
                debug!(count = errors.len(), "GraphQL response carried partial errors");
            }
            Ok(Some(data))
        }
        (None, Some(errors)) if !errors.is_empty() => {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            Err(FetchError::GraphQl(messages.join("; ")))
        }
        (None, _) => Ok(None),
    }
}

/// Extract a court's daily menu from a `getLocationMenu` response
pub fn parse_menu_response(text: &str) -> Result<Option<DailyMenu>, FetchError> {
    Ok(parse_envelope::<MenuData>(text)?
        .and_then(|data| data.dining_court_by_name)
        .and_then(|court| court.daily_menu))
}

/// Extract a nutrition document, filling in the serving size from the first fact
pub fn parse_nutrition_response(text: &str) -> Result<Option<Nutrition>, FetchError> {
    let item = parse_envelope::<NutritionData>(text)?.and_then(|data| data.item_by_item_id);
    Ok(item.map(|mut item| {
        if let Some(first) = item.nutrition_facts.first() {
            item.serving_size = first.label.clone();
        }
        item
    }))
}

#[async_trait]
impl Fetcher for MenuClient {
    async fn fetch_menu(&self, court: &str, date: NaiveDate) -> Result<Option<DailyMenu>, FetchError> {
        let variables = json!({
            "name": court,
            "date": date.format("%Y-%m-%d").to_string(),
        });
        let text = self.query(MENU_QUERY, variables, Some(MENU_OPERATION)).await?;
        parse_menu_response(&text)
    }

    async fn fetch_nutrition(&self, item_id: &str) -> Result<Option<Nutrition>, FetchError> {
        let variables = json!({ "id": item_id });
        let text = self.query(NUTRITION_QUERY, variables, None).await?;
        parse_nutrition_response(&text)
    }
}
