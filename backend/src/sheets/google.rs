//! Google Sheets v4 REST client.
//!
//! Calls are authenticated with the account's access token. When Google answers 401 the
//! refresh token is exchanged for a new access token and the call is retried once; the
//! fresh token is remembered for later calls of the same account.

use super::{CreatedSpreadsheet, OAuthTokens, SheetRequest, SheetService, SheetTab};
use crate::config::Config;
use crate::error::SyncError;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct GoogleSheets {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// Refresh token -> most recently issued access token.
    refreshed: Arc<RwLock<HashMap<String, String>>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetResponse {
    spreadsheet_id: String,
    spreadsheet_url: String,
}

#[derive(Deserialize)]
struct TabsResponse {
    #[serde(default)]
    sheets: Vec<TabEntry>,
}

#[derive(Deserialize)]
struct TabEntry {
    properties: TabProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheets {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.sheets_api.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            refreshed: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.api_base,
            spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn access_token(&self, auth: &OAuthTokens) -> String {
        self.refreshed
            .read()
            .await
            .get(&auth.refresh_token)
            .cloned()
            .unwrap_or_else(|| auth.access_token.clone())
    }

    async fn refresh(&self, auth: &OAuthTokens) -> Result<String, SyncError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", auth.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenResponse = check(response).await?.json().await.map_err(transport_error)?;
        info!("refreshed sheet service access token");
        self.refreshed
            .write()
            .await
            .insert(auth.refresh_token.clone(), token.access_token.clone());
        Ok(token.access_token)
    }

    /// Sends the request built by `build`, retrying once with a refreshed token on 401.
    async fn send<F>(&self, auth: &OAuthTokens, build: F) -> Result<Response, SyncError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.access_token(auth).await;
        let response = build(&token).send().await.map_err(transport_error)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }

        debug!("sheet service rejected access token, refreshing");
        let token = self.refresh(auth).await?;
        let response = build(&token).send().await.map_err(transport_error)?;
        check(response).await
    }
}

fn transport_error(error: reqwest::Error) -> SyncError {
    SyncError::RemoteService {
        status: error.status().map(|s| s.as_u16()).unwrap_or_default(),
        code: "TRANSPORT".to_string(),
        message: error.to_string(),
    }
}

/// Turns a non-success response into `RemoteService`, keeping Google's error payload.
async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => (
            parsed
                .error
                .status
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("UNKNOWN").to_string()),
            parsed.error.message,
        ),
        Err(_) => (
            status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
            body,
        ),
    };
    Err(SyncError::RemoteService {
        status: status.as_u16(),
        code,
        message,
    })
}

fn request_json(request: &SheetRequest) -> Value {
    match request {
        SheetRequest::AddSheet { title } => json!({
            "addSheet": { "properties": { "title": title } }
        }),
        SheetRequest::HideSheet { sheet_id } => json!({
            "updateSheetProperties": {
                "properties": { "sheetId": sheet_id, "hidden": true },
                "fields": "hidden"
            }
        }),
        SheetRequest::ProtectSheet {
            sheet_id,
            description,
        } => json!({
            "addProtectedRange": {
                "protectedRange": {
                    "range": { "sheetId": sheet_id },
                    "description": description,
                    "warningOnly": false
                }
            }
        }),
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetService for GoogleSheets {
    async fn create_spreadsheet(
        &self,
        auth: &OAuthTokens,
        title: &str,
    ) -> Result<CreatedSpreadsheet, SyncError> {
        let body = json!({ "properties": { "title": title } });
        let response = self
            .send(auth, |token| {
                self.http.post(&self.api_base).bearer_auth(token).json(&body)
            })
            .await?;
        let created: SpreadsheetResponse = response.json().await.map_err(transport_error)?;
        Ok(CreatedSpreadsheet {
            spreadsheet_id: created.spreadsheet_id,
            url: created.spreadsheet_url,
        })
    }

    async fn list_tabs(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
    ) -> Result<Vec<SheetTab>, SyncError> {
        let url = format!("{}/{}", self.api_base, spreadsheet_id);
        let response = self
            .send(auth, |token| {
                self.http
                    .get(&url)
                    .query(&[("fields", "sheets.properties(sheetId,title)")])
                    .bearer_auth(token)
            })
            .await?;
        let tabs: TabsResponse = response.json().await.map_err(transport_error)?;
        Ok(tabs
            .sheets
            .into_iter()
            .map(|entry| SheetTab {
                sheet_id: entry.properties.sheet_id,
                title: entry.properties.title,
            })
            .collect())
    }

    async fn batch_update(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        requests: &[SheetRequest],
    ) -> Result<(), SyncError> {
        let url = format!("{}/{}:batchUpdate", self.api_base, spreadsheet_id);
        let body = json!({ "requests": requests.iter().map(request_json).collect::<Vec<_>>() });
        self.send(auth, |token| self.http.post(&url).bearer_auth(token).json(&body))
            .await?;
        Ok(())
    }

    async fn append_values(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SyncError> {
        let url = format!("{}:append", self.values_url(spreadsheet_id, range));
        let body = json!({ "values": rows });
        self.send(auth, |token| {
            self.http
                .post(&url)
                .query(&[
                    ("valueInputOption", "RAW"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .bearer_auth(token)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn get_values(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SyncError> {
        let url = self.values_url(spreadsheet_id, range);
        let response = self
            .send(auth, |token| self.http.get(&url).bearer_auth(token))
            .await?;
        let values: ValuesResponse = response.json().await.map_err(transport_error)?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_value(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        value: &str,
    ) -> Result<(), SyncError> {
        let url = self.values_url(spreadsheet_id, range);
        let body = json!({ "range": range, "values": [[value]] });
        self.send(auth, |token| {
            self.http
                .put(&url)
                .query(&[("valueInputOption", "RAW")])
                .bearer_auth(token)
                .json(&body)
        })
        .await?;
        Ok(())
    }
}
