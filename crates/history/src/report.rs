// Period Report Export
//
// One CSV file per completed class period, rows in roster order.

use crate::error::ReportError;
use crate::models::AttendanceRow;
use chrono::NaiveDateTime;
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "id,name,label,status,location";

#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the report and return its path. The file name embeds the label
    /// and generation time; a numeric suffix is added if that name is taken.
    pub fn write(
        &self,
        label: &str,
        generated_at: NaiveDateTime,
        rows: &[AttendanceRow],
    ) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.dir)?;

        let stem = format!(
            "{}_{}",
            sanitize_label(label),
            generated_at.format("%Y%m%d_%H%M%S")
        );
        let (path, mut file) = self.create_unique(&stem)?;

        let mut out = String::with_capacity(64 * (rows.len() + 1));
        out.push_str(HEADER);
        out.push('\n');
        for row in rows {
            let fields = [
                row.entity_id.to_string(),
                escape_field(&row.name),
                escape_field(&row.label),
                row.status.as_str().to_string(),
                escape_field(&row.location),
            ];
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        file.write_all(out.as_bytes())?;
        file.sync_all()?;

        tracing::info!("Report written to {}", path.display());
        Ok(path)
    }

    fn create_unique(&self, stem: &str) -> Result<(PathBuf, std::fs::File), ReportError> {
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}.csv", stem)
            } else {
                format!("{}_{}.csv", stem, attempt)
            };
            let path = self.dir.join(name);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Keep labels filesystem-safe: anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "period".to_string()
    } else {
        cleaned
    }
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
