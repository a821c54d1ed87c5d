//! CSV export of stored members.
//!
//! The artifact is a UTF-8 CSV with a fixed column order, `Yes`/`No`
//! booleans, `@`-prefixed handles, and empty strings for missing optionals.
//! The same writer serves both full-channel exports and the partial buffer
//! of a cancelled job.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::AppError;
use crate::models::{Channel, Member};
use crate::traits::MemberStore;

/// Fixed header row.
pub const CSV_HEADER: &str = "ID,Username,First Name,Last Name,Phone,Bot,Deleted,Premium,\
Verified,Restricted,Lang Code,Status,Bio,Scam,Fake,Join Date";

/// Escapes a field for CSV output.
///
/// Fields containing commas, quotes, or newlines are wrapped in quotes with
/// internal quotes doubled.
pub fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn opt(value: Option<&str>) -> String {
    escape_csv(value.unwrap_or(""))
}

/// Renders one member as a CSV row (no trailing newline).
pub fn member_row(member: &Member) -> String {
    let username = member
        .username
        .as_deref()
        .map(|u| format!("@{}", u))
        .unwrap_or_default();
    let joined = member
        .joined_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    [
        member.id.to_string(),
        escape_csv(&username),
        opt(member.first_name.as_deref()),
        opt(member.last_name.as_deref()),
        opt(member.phone.as_deref()),
        yes_no(member.is_bot).to_string(),
        yes_no(member.is_deleted).to_string(),
        yes_no(member.is_premium).to_string(),
        yes_no(member.is_verified).to_string(),
        yes_no(member.is_restricted).to_string(),
        opt(member.lang_code.as_deref()),
        member.status.as_str().to_string(),
        opt(member.bio.as_deref()),
        yes_no(member.is_scam).to_string(),
        yes_no(member.is_fake).to_string(),
        escape_csv(&joined),
    ]
    .join(",")
}

/// Writes header plus one row per member to `writer`.
pub fn write_members_csv<W: Write>(writer: &mut W, members: &[Member]) -> Result<(), AppError> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for member in members {
        writeln!(writer, "{}", member_row(member))?;
    }
    writer.flush()?;
    Ok(())
}

/// Reduces a channel title to `[a-z0-9_-]` for use in a filename.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "channel".to_string()
    } else {
        sanitized
    }
}

/// Builds the export filename: `members_<title>_<count>_<timestamp>.csv`.
///
/// The timestamp is RFC3339 with `:` and `.` replaced so the name is safe on
/// every filesystem.
pub fn export_filename(title: &str, count: usize, at: DateTime<Utc>) -> String {
    let timestamp = at.to_rfc3339().replace([':', '.'], "-");
    format!(
        "members_{}_{}_{}.csv",
        sanitize_title(title),
        count,
        timestamp
    )
}

/// Exports stored members to CSV files.
#[derive(Debug, Clone)]
pub struct ExportService<S: MemberStore> {
    store: S,
}

impl<S: MemberStore> ExportService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Exports every stored member of `channel` into `dir`.
    ///
    /// Returns the written path and the number of exported members.
    pub async fn export_channel(
        &self,
        channel: &Channel,
        dir: &Path,
    ) -> Result<(PathBuf, usize), AppError> {
        let members = self.store.all_members(channel.id).await?;
        let path = dir.join(export_filename(&channel.title, members.len(), Utc::now()));
        write_to_path(&path, &members)?;
        info!(
            channel_id = channel.id,
            count = members.len(),
            path = %path.display(),
            "Channel exported"
        );
        Ok((path, members.len()))
    }

    /// Writes an already-materialized member list (e.g. a cancelled job's
    /// partial buffer) into `dir`.
    pub fn export_partial(
        &self,
        channel: &Channel,
        members: &[Member],
        dir: &Path,
    ) -> Result<PathBuf, AppError> {
        let path = dir.join(export_filename(&channel.title, members.len(), Utc::now()));
        write_to_path(&path, members)?;
        info!(
            channel_id = channel.id,
            count = members.len(),
            path = %path.display(),
            "Partial result exported"
        );
        Ok(path)
    }
}

fn write_to_path(path: &Path, members: &[Member]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    write_members_csv(&mut file, members)
}
