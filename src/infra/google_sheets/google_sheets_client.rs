// =============================================================================
// GOOGLE SHEETS CLIENT
// =============================================================================
//
// One spreadsheet, found by name through the Drive API (or created and shared
// when it does not exist yet). Every worksheet in it is a table whose first
// row is the header.
//
// Endpoints used:
// - Drive v3:  files.list (search by name), permissions.create (sharing)
// - Sheets v4: spreadsheets.create, spreadsheets.get, spreadsheets.batchUpdate,
//              values.get, values.append, values.clear, values.update

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::service_account::TokenSource;
use crate::core::parsing::{cell_text, Record};
use crate::core::sheets::{row_from_record, SheetsError, TableSnapshot, TabularStore};

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Base URLs of the two Google APIs.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub sheets: String,
    pub drive: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            sheets: "https://sheets.googleapis.com/v4".to_string(),
            drive: "https://www.googleapis.com/drive/v3".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Both APIs served from one host, laid out like the real ones.
    #[cfg(test)]
    pub fn at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            sheets: format!("{base}/v4"),
            drive: format!("{base}/drive/v3"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetInfo>,
}

#[derive(Debug, Deserialize)]
struct SheetInfo {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct GoogleSheetsClient<T: TokenSource> {
    client: Client,
    auth: T,
    endpoints: GoogleEndpoints,
    spreadsheet_id: String,
}

impl<T: TokenSource> GoogleSheetsClient<T> {
    /// Client for an already known spreadsheet id.
    pub fn with_spreadsheet(
        client: Client,
        auth: T,
        endpoints: GoogleEndpoints,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth,
            endpoints,
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    /// Opens the spreadsheet called `name`, creating it when the service
    /// account cannot see one. A freshly created spreadsheet is shared with
    /// `share_emails` as writers; a failed share is logged and skipped.
    pub async fn open_or_create(
        client: Client,
        auth: T,
        endpoints: GoogleEndpoints,
        name: &str,
        share_emails: &[String],
    ) -> Result<Self, SheetsError> {
        let mut sheets = Self::with_spreadsheet(client, auth, endpoints, String::new());

        if let Some(id) = sheets.find_spreadsheet(name).await? {
            tracing::info!(spreadsheet = %name, id = %id, "Opened spreadsheet");
            sheets.spreadsheet_id = id;
            return Ok(sheets);
        }

        sheets.spreadsheet_id = sheets.create_spreadsheet(name).await?;
        tracing::info!(spreadsheet = %name, id = %sheets.spreadsheet_id, "Created spreadsheet");

        for email in share_emails {
            match sheets.share(email).await {
                Ok(()) => tracing::info!(%email, "Shared spreadsheet"),
                Err(e) => tracing::warn!(%email, error = %e, "Could not share spreadsheet"),
            }
        }
        Ok(sheets)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    async fn find_spreadsheet(&self, name: &str) -> Result<Option<String>, SheetsError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let url = endpoint(&self.endpoints.drive, &["files"])?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")]);

        let list: DriveFileList = read_json(send(request, None, false).await?).await?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    async fn create_spreadsheet(&self, name: &str) -> Result<String, SheetsError> {
        let url = endpoint(&self.endpoints.sheets, &["spreadsheets"])?;
        let request = self
            .request(Method::POST, url)
            .await?
            .json(&json!({ "properties": { "title": name } }));

        let created: CreatedSpreadsheet = read_json(send(request, None, false).await?)
            .await
            .map_err(|_| SheetsError::SpreadsheetNotFound(name.to_string()))?;
        Ok(created.spreadsheet_id)
    }

    async fn share(&self, email: &str) -> Result<(), SheetsError> {
        let url = endpoint(
            &self.endpoints.drive,
            &["files", &self.spreadsheet_id, "permissions"],
        )?;
        let request = self
            .request(Method::POST, url)
            .await?
            .query(&[("sendNotificationEmail", "false")])
            .json(&json!({ "type": "user", "role": "writer", "emailAddress": email }));
        send(request, None, false).await?;
        Ok(())
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, SheetsError> {
        let token = self.auth.access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetsError> {
        endpoint(
            &self.endpoints.sheets,
            &["spreadsheets", &self.spreadsheet_id, "values", range],
        )
    }

    async fn read_values(&self, table: &str, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let request = self.request(Method::GET, self.values_url(range)?).await?;
        let values: ValueRange = read_json(send(request, Some(table), false).await?).await?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn add_sheet(&self, table: &str) -> Result<(), SheetsError> {
        let url = endpoint(
            &self.endpoints.sheets,
            &[
                "spreadsheets",
                &format!("{}:batchUpdate", self.spreadsheet_id),
            ],
        )?;
        let request = self.request(Method::POST, url).await?.json(&json!({
            "requests": [{ "addSheet": { "properties": { "title": table } } }]
        }));
        send(request, Some(table), true).await?;
        tracing::info!(%table, "Added worksheet");
        Ok(())
    }
}

#[async_trait]
impl<T: TokenSource> TabularStore for GoogleSheetsClient<T> {
    async fn list_tables(&self) -> Result<Vec<String>, SheetsError> {
        let url = endpoint(
            &self.endpoints.sheets,
            &["spreadsheets", &self.spreadsheet_id],
        )?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("fields", "sheets.properties.title")]);

        let info: SpreadsheetInfo = read_json(send(request, None, false).await?).await?;
        Ok(info
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn get_header(&self, table: &str) -> Result<Vec<String>, SheetsError> {
        let rows = self.read_values(table, &a1_range(table, Some("1:1"))).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn append_row(
        &self,
        table: &str,
        header: &[String],
        record: &Record,
    ) -> Result<(), SheetsError> {
        let range = format!("{}:append", a1_range(table, Some("A1")));
        let request = self
            .request(Method::POST, self.values_url(&range)?)
            .await?
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": [row_from_record(header, record)] }));

        send(request, Some(table), true).await?;
        tracing::debug!(%table, "Row appended");
        Ok(())
    }

    async fn bulk_import(
        &self,
        table: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), SheetsError> {
        if !self.list_tables().await?.iter().any(|t| t == table) {
            self.add_sheet(table).await?;
        }

        let whole = a1_range(table, None);
        let clear = self
            .request(Method::POST, self.values_url(&format!("{whole}:clear"))?)
            .await?
            .json(&json!({}));
        send(clear, Some(table), true).await?;

        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(header.to_vec());
        values.extend(rows.iter().cloned());

        let start = a1_range(table, Some("A1"));
        let update = self
            .request(Method::PUT, self.values_url(&start)?)
            .await?
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": start, "majorDimension": "ROWS", "values": values }));
        send(update, Some(table), true).await?;

        tracing::info!(%table, rows = rows.len(), "Table replaced");
        Ok(())
    }

    async fn export_table(&self, table: &str) -> Result<TableSnapshot, SheetsError> {
        let rows = self.read_values(table, &a1_range(table, None)).await?;
        Ok(TableSnapshot::from_rows(rows))
    }
}

/// `'Sheet name'!cells`, with quotes in the name doubled.
fn a1_range(table: &str, cells: Option<&str>) -> String {
    let quoted = format!("'{}'", table.replace('\'', "''"));
    match cells {
        Some(cells) => format!("{quoted}!{cells}"),
        None => quoted,
    }
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, SheetsError> {
    let invalid = || SheetsError::Transport(format!("invalid endpoint `{base}`"));
    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends `request` and maps failure statuses. `table` names the worksheet the
/// call is about; `write` marks calls whose 429/5xx answers are worth retrying
/// later.
async fn send(
    request: RequestBuilder,
    table: Option<&str>,
    write: bool,
) -> Result<Response, SheetsError> {
    let response = request
        .send()
        .await
        .map_err(|e| SheetsError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify(status, body, table, write))
}

fn classify(status: StatusCode, body: String, table: Option<&str>, write: bool) -> SheetsError {
    let code = status.as_u16();
    match (status, table) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            SheetsError::Auth(format!("{code}: {body}"))
        }
        (StatusCode::NOT_FOUND, Some(table)) => SheetsError::TableNotFound(table.to_string()),
        (StatusCode::BAD_REQUEST, Some(table)) if body.contains("Unable to parse range") => {
            SheetsError::TableNotFound(table.to_string())
        }
        (_, Some(table))
            if write && (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()) =>
        {
            SheetsError::TransientWrite {
                table: table.to_string(),
                status: code,
                body,
            }
        }
        _ => SheetsError::Api { status: code, body },
    }
}

async fn read_json<D: serde::de::DeserializeOwned>(response: Response) -> Result<D, SheetsError> {
    let status = response.status().as_u16();
    response.json().await.map_err(|e| SheetsError::Api {
        status,
        body: format!("unexpected response body: {e}"),
    })
}
