// Google Sheets v4 implementation of `ExpenseSheet`.
//
// Values are written with `valueInputOption=RAW` so dates stay the literal
// `YYYY-MM-DD` strings the filter compares, and read back with
// `UNFORMATTED_VALUE` so amounts come back as numbers.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::google_api::{send_discarding_body, send_json};
use crate::core::accounting::{ExpenseSheet, SheetRange, SheetRow};
use crate::core::credentials::CredentialProvider;
use crate::core::errors::{RemoteOrigin, RemoteServiceError};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const ORIGIN: RemoteOrigin = RemoteOrigin::Spreadsheet;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<SheetRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_cells: u64,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: u32,
    title: String,
}

pub struct GoogleSheetsClient {
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
    spreadsheet_id: String,
    /// Configured sheet id; wins over title resolution.
    sheet_id: Option<u32>,
    /// Sheet title → numeric id, filled on first delete.
    resolved_ids: DashMap<String, u32>,
}

impl GoogleSheetsClient {
    pub fn new(
        client: Client,
        credentials: Arc<dyn CredentialProvider>,
        spreadsheet_id: impl Into<String>,
        sheet_id: Option<u32>,
    ) -> Self {
        Self {
            client,
            credentials,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_id,
            resolved_ids: DashMap::new(),
        }
    }

    /// `{base}/{spreadsheet_id}/{segments...}` with each segment escaped.
    fn url(&self, segments: &[&str]) -> Result<Url, RemoteServiceError> {
        spreadsheet_url(&self.spreadsheet_id, segments)
    }

    async fn sheet_id_for(&self, range: &SheetRange) -> Result<u32, RemoteServiceError> {
        if let Some(id) = self.sheet_id {
            return Ok(id);
        }

        let title = range.sheet.clone().unwrap_or_default();
        if let Some(id) = self.resolved_ids.get(&title) {
            return Ok(*id);
        }

        let token = self.credentials.ensure_valid_credentials().await?;
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties(sheetId,title)");

        let metadata: SpreadsheetMetadata = send_json(ORIGIN, self.client.get(url).bearer_auth(token)).await?;
        let id = pick_sheet_id(&metadata.sheets, range.sheet.as_deref()).ok_or_else(|| {
            RemoteServiceError::new(ORIGIN, None, format!("no sheet named '{}' in the spreadsheet", title))
        })?;

        tracing::debug!(sheet = %title, sheet_id = id, "Resolved sheet id");
        self.resolved_ids.insert(title, id);
        Ok(id)
    }
}

fn spreadsheet_url(spreadsheet_id: &str, segments: &[&str]) -> Result<Url, RemoteServiceError> {
    let mut url = Url::parse(SHEETS_BASE_URL).map_err(|err| RemoteServiceError::transport(ORIGIN, err))?;
    url.path_segments_mut()
        .map_err(|_| RemoteServiceError::transport(ORIGIN, "base URL cannot hold a path"))?
        .push(spreadsheet_id)
        .extend(segments);
    Ok(url)
}

/// The sheet with the given title, or the first sheet when no title is given.
fn pick_sheet_id(sheets: &[SheetEntry], title: Option<&str>) -> Option<u32> {
    match title {
        Some(title) => sheets
            .iter()
            .find(|sheet| sheet.properties.title == title)
            .map(|sheet| sheet.properties.sheet_id),
        None => sheets.first().map(|sheet| sheet.properties.sheet_id),
    }
}

#[async_trait]
impl ExpenseSheet for GoogleSheetsClient {
    async fn list_rows(&self, range: &SheetRange) -> Result<Vec<SheetRow>, RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let mut url = self.url(&["values", &range.a1()])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("dateTimeRenderOption", "FORMATTED_STRING");

        tracing::debug!(range = %range, "Reading sheet range");
        let body: ValueRange = send_json(ORIGIN, self.client.get(url).bearer_auth(token)).await?;
        Ok(body.values)
    }

    async fn append_row(&self, range: &SheetRange, row: SheetRow) -> Result<u64, RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let mut url = self.url(&["values", &format!("{}:append", range.a1())])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let request = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [row] }));
        let body: AppendResponse = send_json(ORIGIN, request).await?;

        Ok(body.updates.map(|u| u.updated_cells).unwrap_or(0))
    }

    async fn overwrite_rows(&self, range: &SheetRange, rows: Vec<SheetRow>) -> Result<(), RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let a1 = range.a1();
        let mut url = self.url(&["values", &a1])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        tracing::debug!(range = %a1, rows = rows.len(), "Overwriting sheet range");
        let request = self.client.put(url).bearer_auth(token).json(&json!({
            "range": a1,
            "majorDimension": "ROWS",
            "values": rows,
        }));

        send_discarding_body(ORIGIN, request).await
    }

    async fn delete_row(&self, range: &SheetRange, sheet_row_index: u32) -> Result<(), RemoteServiceError> {
        let sheet_id = self.sheet_id_for(range).await?;
        let token = self.credentials.ensure_valid_credentials().await?;
        let url = spreadsheet_url(&format!("{}:batchUpdate", self.spreadsheet_id), &[])?;

        let request = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&delete_row_request(sheet_id, sheet_row_index));

        send_discarding_body(ORIGIN, request).await
    }
}

/// A `deleteDimension` request removing exactly one row.
fn delete_row_request(sheet_id: u32, sheet_row_index: u32) -> Value {
    json!({
        "requests": [{
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": sheet_row_index,
                    "endIndex": sheet_row_index + 1
                }
            }
        }]
    })
}
