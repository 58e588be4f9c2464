//! Tabular mirror of the loaded data.
//!
//! Every write replaces the whole target. The CSV mirror rewrites
//! `<dir>/<target>.csv`; the Sheets mirror clears a worksheet and writes the
//! table back from `A1`, creating the worksheet first if it does not exist.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::MirrorConfig;
use crate::models::{CanonicalAttempt, DailyReport};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

pub type Table = Vec<Vec<String>>;

pub fn attempts_table(attempts: &[CanonicalAttempt]) -> Table {
    if attempts.is_empty() {
        return vec![vec!["No data".to_string()]];
    }

    let mut rows = Vec::with_capacity(attempts.len() + 1);
    rows.push(
        CanonicalAttempt::COLUMNS
            .iter()
            .map(|column| column.to_string())
            .collect(),
    );
    for attempt in attempts {
        let cell = |value: &Option<String>| value.clone().unwrap_or_default();
        rows.push(vec![
            attempt.user_id.clone(),
            cell(&attempt.oauth_consumer_key),
            cell(&attempt.lis_result_sourcedid),
            cell(&attempt.lis_outcome_service_url),
            match attempt.is_correct {
                Some(true) => "TRUE".to_string(),
                Some(false) => "FALSE".to_string(),
                None => String::new(),
            },
            cell(&attempt.attempt_type),
            attempt.event_timestamp.clone(),
        ]);
    }
    rows
}

pub fn report_table(report: &DailyReport) -> Table {
    let mut rows = vec![vec!["Metric".to_string(), "Value".to_string()]];
    rows.extend(
        report
            .metrics()
            .into_iter()
            .map(|(label, value)| vec![label.to_string(), value]),
    );
    rows
}

pub enum Mirror {
    Csv(CsvMirror),
    Sheets(SheetsMirror),
}

impl Mirror {
    pub fn from_config(config: &MirrorConfig) -> anyhow::Result<Self> {
        match config.sheets() {
            Some((spreadsheet_id, token)) => Ok(Mirror::Sheets(SheetsMirror::new(
                spreadsheet_id,
                token,
            )?)),
            None => Ok(Mirror::Csv(CsvMirror::new(&config.mirror_dir))),
        }
    }

    pub async fn overwrite(&self, target: &str, table: &Table) -> anyhow::Result<()> {
        match self {
            Mirror::Csv(csv) => csv.overwrite(target, table),
            Mirror::Sheets(sheets) => sheets.overwrite(target, table).await,
        }?;
        info!(target_name = target, rows = table.len(), "mirror updated");
        Ok(())
    }
}

pub struct CsvMirror {
    dir: PathBuf,
}

impl CsvMirror {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, target: &str) -> PathBuf {
        let file_name: String = target
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.csv"))
    }

    fn overwrite(&self, target: &str, table: &Table) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(target);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for row in table {
            writer.write_record(row)?;
        }
        writer.flush()?;
        debug!(path = %path.display(), "csv mirror written");
        Ok(())
    }
}

pub struct SheetsMirror {
    http: reqwest::Client,
    spreadsheet_id: String,
    token: String,
}

impl SheetsMirror {
    pub fn new(spreadsheet_id: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, tail: &[&str]) -> anyhow::Result<Url> {
        let mut url = Url::parse(SHEETS_API)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets API url cannot be a base"))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .extend(tail);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("sheets API answered {status}: {body}");
        }
        Ok(response.json().await?)
    }

    async fn ensure_worksheet(&self, title: &str) -> anyhow::Result<()> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let meta = self.send(self.http.get(url)).await?;
        if worksheet_titles(&meta).iter().any(|existing| existing == title) {
            return Ok(());
        }

        let url = self.url(&[])?;
        let url = Url::parse(&format!("{url}:batchUpdate"))?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        self.send(self.http.post(url).json(&body)).await?;
        info!(worksheet = title, "worksheet created");
        Ok(())
    }

    async fn overwrite(&self, worksheet: &str, table: &Table) -> anyhow::Result<()> {
        self.ensure_worksheet(worksheet).await?;

        let clear = self.url(&["values", &format!("{}:clear", quoted(worksheet))])?;
        self.send(self.http.post(clear).json(&json!({})))
            .await
            .with_context(|| format!("failed to clear worksheet {worksheet}"))?;

        let range = format!("{}!A1", quoted(worksheet));
        let mut update = self.url(&["values", &range])?;
        update
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": table });
        self.send(self.http.put(update).json(&body))
            .await
            .with_context(|| format!("failed to write worksheet {worksheet}"))?;
        Ok(())
    }
}

fn quoted(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

fn worksheet_titles(meta: &Value) -> Vec<String> {
    meta["sheets"]
        .as_array()
        .map(|sheets| {
            sheets
                .iter()
                .filter_map(|sheet| sheet["properties"]["title"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn attempt() -> CanonicalAttempt {
        CanonicalAttempt {
            user_id: "u1".to_string(),
            oauth_consumer_key: Some("k1".to_string()),
            lis_result_sourcedid: None,
            lis_outcome_service_url: None,
            is_correct: Some(true),
            attempt_type: Some("run".to_string()),
            event_timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn attempts_table_has_header_and_one_row_per_record() {
        let mut second = attempt();
        second.is_correct = None;
        let table = attempts_table(&[attempt(), second]);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0][0], "user_id");
        assert_eq!(table[0].len(), 7);
        assert_eq!(
            table[1],
            vec!["u1", "k1", "", "", "TRUE", "run", "2024-01-01T00:00:00Z"]
        );
        assert_eq!(table[2][4], "");
    }

    #[test]
    fn empty_batch_renders_placeholder() {
        assert_eq!(attempts_table(&[]), vec![vec!["No data".to_string()]]);
    }

    #[test]
    fn report_table_is_metric_value_pairs() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let table = report_table(&DailyReport::empty(date));
        assert_eq!(table.len(), 8);
        assert_eq!(table[0], vec!["Metric", "Value"]);
        assert_eq!(table[1], vec!["Report date", "2024-01-01"]);
        assert_eq!(table[4], vec!["Success percentage", "0.00%"]);
        assert!(table.iter().all(|row| row.len() == 2));
    }

    #[tokio::test]
    async fn csv_mirror_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::Csv(CsvMirror::new(dir.path()));

        mirror
            .overwrite("Raw Data", &attempts_table(&[attempt(), attempt()]))
            .await
            .unwrap();
        mirror
            .overwrite("Raw Data", &attempts_table(&[attempt()]))
            .await
            .unwrap();

        let path = dir.path().join("raw_data.csv");
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.starts_with("user_id,oauth_consumer_key"));
    }

    #[test]
    fn worksheet_names_are_quoted_for_ranges() {
        assert_eq!(quoted("Raw Data"), "'Raw Data'");
        assert_eq!(quoted("Bob's"), "'Bob''s'");
    }

    #[test]
    fn reads_worksheet_titles_from_metadata() {
        let meta = json!({"sheets": [
            {"properties": {"title": "Raw Data"}},
            {"properties": {"title": "Daily Report"}}
        ]});
        assert_eq!(worksheet_titles(&meta), vec!["Raw Data", "Daily Report"]);
        assert!(worksheet_titles(&json!({})).is_empty());
    }
}
