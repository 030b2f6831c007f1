//! Spreadsheet mirror — best-effort lead visibility for the sales team.
//!
//! Google Sheets REST v4 client behind the `SheetMirror` trait. Every call
//! site treats failures as log-and-continue; nothing here may propagate to
//! the user-facing flow.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::config::SheetConfig;
use crate::error::SheetError;
use crate::leads::Lead;

/// Header row the worksheet is expected to carry. `upsert_row_by_key`
/// matches field names against it to locate cells.
pub const HEADER: [&str; 11] = [
    "chat_id",
    "username",
    "first_name",
    "created_at",
    "subscribed",
    "language",
    "last_message",
    "last_interaction",
    "document_sent",
    "followup_attempts",
    "manager_contacted",
];

/// One mirrored lead row, in `HEADER` order.
#[derive(Debug, Clone)]
pub struct LeadRow(Vec<String>);

impl LeadRow {
    pub fn from_lead(lead: &Lead) -> Self {
        let fmt_time = |t: Option<chrono::DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339()).unwrap_or_default()
        };
        Self(vec![
            lead.id.to_string(),
            lead.username.clone().unwrap_or_default(),
            lead.first_name.clone().unwrap_or_default(),
            Utc::now().to_rfc3339(),
            lead.subscribed.to_string(),
            lead.language.map(|l| l.as_str().to_string()).unwrap_or_default(),
            lead.last_message.clone().unwrap_or_default(),
            fmt_time(lead.last_interaction_at),
            fmt_time(lead.document_sent_at),
            lead.followup_attempts.to_string(),
            lead.manager_contacted.to_string(),
        ])
    }

    fn values(&self) -> &[String] {
        &self.0
    }
}

/// Spreadsheet mirror capability.
#[async_trait]
pub trait SheetMirror: Send + Sync {
    /// Append a full lead row.
    async fn append_row(&self, row: &LeadRow) -> Result<(), SheetError>;

    /// Update named fields on the row whose first column equals `key`.
    /// Appends a sparse row when the key is not present yet.
    async fn upsert_row_by_key(
        &self,
        key: &str,
        fields: &[(&str, String)],
    ) -> Result<(), SheetError>;
}

/// Mirror used when no sheet is configured. Every call is a no-op.
pub struct NullMirror;

#[async_trait]
impl SheetMirror for NullMirror {
    async fn append_row(&self, _row: &LeadRow) -> Result<(), SheetError> {
        Ok(())
    }

    async fn upsert_row_by_key(
        &self,
        _key: &str,
        _fields: &[(&str, String)],
    ) -> Result<(), SheetError> {
        Ok(())
    }
}

/// Google Sheets REST v4 client.
pub struct SheetsClient {
    sheet_id: String,
    worksheet: String,
    token: SecretString,
    client: reqwest::Client,
}

impl SheetsClient {
    pub fn new(config: &SheetConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            sheet_id: config.sheet_id.clone(),
            worksheet: config.worksheet.clone(),
            token: config.token.clone(),
            client,
        }
    }

    fn base_url(&self) -> String {
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}",
            self.sheet_id
        )
    }

    async fn get_values(&self, range: &str) -> Result<Value, SheetError> {
        let url = format!("{}/values/{}!{}", self.base_url(), self.worksheet, range);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| SheetError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SheetError::Request(format!(
                "values:get {range} returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| SheetError::InvalidResponse(e.to_string()))
    }

    async fn append_values(&self, values: Vec<Vec<String>>) -> Result<(), SheetError> {
        let url = format!(
            "{}/values/{}:append?valueInputOption=USER_ENTERED",
            self.base_url(),
            self.worksheet
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "values": values }))
            .send()
            .await
            .map_err(|e| SheetError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SheetError::Request(format!(
                "values:append returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SheetMirror for SheetsClient {
    async fn append_row(&self, row: &LeadRow) -> Result<(), SheetError> {
        self.append_values(vec![row.values().to_vec()]).await
    }

    async fn upsert_row_by_key(
        &self,
        key: &str,
        fields: &[(&str, String)],
    ) -> Result<(), SheetError> {
        // Locate the key in column A.
        let col_a = self.get_values("A:A").await?;
        let Some(row_number) = find_row_by_key(&col_a, key) else {
            // Not mirrored yet — append a sparse row carrying the key and
            // whatever fields we have.
            let mut sparse = vec![String::new(); HEADER.len()];
            sparse[0] = key.to_string();
            for (name, value) in fields {
                if let Some(idx) = HEADER.iter().position(|h| h == name) {
                    sparse[idx] = value.clone();
                }
            }
            return self.append_values(vec![sparse]).await;
        };

        // Match field names against the live header row, not our constant,
        // so operator-reordered columns keep working.
        let header = self.get_values("1:1").await?;
        let header_names = first_row_strings(&header);

        let mut data = Vec::new();
        for (name, value) in fields {
            let Some(idx) = header_names.iter().position(|h| h == name) else {
                continue;
            };
            data.push(json!({
                "range": format!("{}!{}{}", self.worksheet, column_letter(idx), row_number),
                "values": [[value]],
            }));
        }
        if data.is_empty() {
            return Ok(());
        }

        let url = format!("{}/values:batchUpdate", self.base_url());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "valueInputOption": "USER_ENTERED", "data": data }))
            .send()
            .await
            .map_err(|e| SheetError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SheetError::Request(format!(
                "values:batchUpdate returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Find the 1-based row number whose first cell equals `key`.
fn find_row_by_key(values_response: &Value, key: &str) -> Option<usize> {
    let rows = values_response.get("values")?.as_array()?;
    rows.iter().position(|row| {
        row.get(0)
            .and_then(Value::as_str)
            .is_some_and(|cell| cell == key)
    })
    .map(|idx| idx + 1)
}

/// Strings of the first returned row (the header).
fn first_row_strings(values_response: &Value) -> Vec<String> {
    values_response
        .get("values")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_array)
        .map(|row| {
            row.iter()
                .map(|v| v.as_str().unwrap_or_default().trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// 0-based column index to its A1 letter(s).
fn column_letter(mut idx: usize) -> String {
    let mut letters = String::new();
    loop {
        letters.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(10), "K");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn row_lookup_by_key() {
        let resp = json!({ "values": [["chat_id"], ["111"], ["222"]] });
        assert_eq!(find_row_by_key(&resp, "222"), Some(3));
        assert_eq!(find_row_by_key(&resp, "999"), None);
        assert_eq!(find_row_by_key(&json!({}), "1"), None);
    }

    #[test]
    fn header_row_extraction() {
        let resp = json!({ "values": [[" chat_id", "username "]] });
        assert_eq!(first_row_strings(&resp), vec!["chat_id", "username"]);
        assert!(first_row_strings(&json!({})).is_empty());
    }

    #[test]
    fn lead_row_matches_header_width() {
        let row = LeadRow::from_lead(&Lead::new(42));
        assert_eq!(row.values().len(), HEADER.len());
        assert_eq!(row.values()[0], "42");
    }

    #[tokio::test]
    async fn null_mirror_is_silent() {
        let mirror = NullMirror;
        mirror.append_row(&LeadRow::from_lead(&Lead::new(1))).await.unwrap();
        mirror
            .upsert_row_by_key("1", &[("subscribed", "true".into())])
            .await
            .unwrap();
    }
}
