//! Per-title CSV and JSON reports

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::record::{fmt_days, fmt_duration, RecordStore, TitleNames};

const CSV_FILE: &str = "export.csv";
const JSON_FILE: &str = "export.json";

const CSV_HEADER: &str = "title_id,name,playtime_secs,playtime,launches,sessions,\
avg_session_length_secs,avg_session_length,first_played,last_played";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One exported title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleReport {
    /// 16 uppercase hex digits.
    pub title_id: String,
    pub name: String,
    pub playtime_secs: u32,
    pub playtime: String,
    pub launches: u16,
    pub sessions: usize,
    pub avg_session_length_secs: u32,
    pub avg_session_length: String,
    pub first_played: String,
    pub last_played: String,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    titles: &'a [TitleReport],
}

/// Reports for every live summary, in slot order.
pub fn title_reports(store: &RecordStore, names: &TitleNames) -> Vec<TitleReport> {
    store
        .summaries
        .iter()
        .map(|s| {
            let avg = if s.launch_count > 0 {
                s.total_secs / u32::from(s.launch_count)
            } else {
                0
            };
            TitleReport {
                title_id: format!("{:016X}", s.title_id),
                name: names.lookup(s.title_id).unwrap_or("Unknown").to_string(),
                playtime_secs: s.total_secs,
                playtime: fmt_duration(s.total_secs),
                launches: s.launch_count,
                sessions: store.sessions.count_for(s.title_id),
                avg_session_length_secs: avg,
                avg_session_length: fmt_duration(avg),
                first_played: fmt_days(s.first_played_days),
                last_played: fmt_days(s.last_played_days),
            }
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(reports: &[TitleReport]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in reports {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            r.title_id,
            csv_field(&r.name),
            r.playtime_secs,
            r.playtime,
            r.launches,
            r.sessions,
            r.avg_session_length_secs,
            r.avg_session_length,
            r.first_played,
            r.last_played
        ));
    }
    out
}

pub fn to_json(reports: &[TitleReport]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&JsonExport { titles: reports })?)
}

/// Write `export.csv` and `export.json` into `dir`.
pub async fn export_to(
    dir: &Path,
    store: &RecordStore,
    names: &TitleNames,
) -> Result<(PathBuf, PathBuf), ExportError> {
    let reports = title_reports(store, names);
    tokio::fs::create_dir_all(dir).await?;

    let csv_path = dir.join(CSV_FILE);
    let json_path = dir.join(JSON_FILE);
    tokio::fs::write(&csv_path, to_csv(&reports)).await?;
    tokio::fs::write(&json_path, to_json(&reports)?).await?;
    log::info!("Exported {} titles to {}", reports.len(), dir.display());
    Ok((csv_path, json_path))
}
