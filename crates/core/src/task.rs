// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task record and its invariants.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ManagerConfig;

/// Result payloads are capped at 100 KiB; anything longer is truncated to
/// `raw[0 .. cap - marker.len()] + marker`.
pub const RESULT_CAP_BYTES: usize = 100 * 1024;
const TRUNCATION_MARKER: &str = "\n...[truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Pending,
    Sending,
    Sent,
    Failed,
}

/// A background task. See the data model invariants: terminal fields are
/// immutable except at eviction, `state_version` is strictly monotonic, and
/// `result` never exceeds [`RESULT_CAP_BYTES`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: Option<String>,
    pub parent_session_id: String,
    pub agent: String,
    pub description: String,
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub state_version: u64,
    #[serde(default = "default_notification_state")]
    pub notification_state: NotificationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_result_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip)]
    pub config: Option<Arc<ManagerConfig>>,
}

fn default_model() -> String {
    "default".to_owned()
}

fn default_notification_state() -> NotificationState {
    NotificationState::Pending
}

impl Task {
    pub fn new(
        parent_session_id: impl Into<String>,
        agent: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
        model: Option<String>,
        config: Arc<ManagerConfig>,
    ) -> Self {
        Self {
            id: generate_task_id(),
            session_id: None,
            parent_session_id: parent_session_id.into(),
            agent: agent.into(),
            description: description.into(),
            prompt: prompt.into(),
            model: model.unwrap_or_else(default_model),
            status: TaskStatus::Pending,
            state_version: 0,
            notification_state: NotificationState::Pending,
            result: None,
            error: None,
            is_result_truncated: false,
            started_at: None,
            completed_at: None,
            config: Some(config),
        }
    }
}

/// Generate an `id` of the form `bg_` followed by 8 lowercase-hex characters,
/// sourced from the process's cryptographic random generator.
pub fn generate_task_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 4] = rng.random();
    format!("bg_{}", hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `^bg_[a-f0-9]{8}$`, checked without pulling in `regex` for a fixed-shape
/// string.
pub fn is_valid_task_id(id: &str) -> bool {
    let Some(hex) = id.strip_prefix("bg_") else { return false };
    hex.len() == 8 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Truncate `raw` to the 100 KiB cap, appending the fixed marker, mirroring
/// the invariant `len(S) <= RESULT_CAP_BYTES`.
pub fn truncate_result(raw: &str) -> (String, bool) {
    if raw.len() <= RESULT_CAP_BYTES {
        return (raw.to_owned(), false);
    }
    let keep = RESULT_CAP_BYTES.saturating_sub(TRUNCATION_MARKER.len());
    let mut boundary = keep.min(raw.len());
    while boundary > 0 && !raw.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut truncated = String::with_capacity(RESULT_CAP_BYTES);
    truncated.push_str(&raw[..boundary]);
    truncated.push_str(TRUNCATION_MARKER);
    (truncated, true)
}

pub fn now_iso8601() -> String {
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    format_iso8601(secs, millis)
}

/// Minimal UTC ISO-8601 formatter (no external time crate in the teacher's
/// dependency stack), enough precision for persisted timestamps.
fn format_iso8601(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (hour, min, sec) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);
    let (year, month, day) = civil_from_days(days as i64);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}.{millis:03}Z")
}

pub fn now_epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Parse the fixed `now_iso8601` shape back to milliseconds since the epoch.
/// Returns `None` on anything that doesn't match exactly.
pub fn parse_iso8601_ms(s: &str) -> Option<u64> {
    let bytes = s.as_bytes();
    if bytes.len() != 24 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' || bytes[13] != b':' || bytes[16] != b':' || bytes[19] != b'.' || bytes[23] != b'Z' {
        return None;
    }
    let year: i64 = s[0..4].parse().ok()?;
    let month: u32 = s[5..7].parse().ok()?;
    let day: u32 = s[8..10].parse().ok()?;
    let hour: u64 = s[11..13].parse().ok()?;
    let minute: u64 = s[14..16].parse().ok()?;
    let second: u64 = s[17..19].parse().ok()?;
    let millis: u64 = s[20..23].parse().ok()?;

    let days = days_from_civil(year, month, day);
    if days < 0 {
        return None;
    }
    let secs = days as u64 * 86_400 + hour * 3600 + minute * 60 + second;
    Some(secs * 1000 + millis)
}

/// Inverse of [`civil_from_days`]: a Gregorian date to days-since-epoch.
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) as u64 + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// Howard Hinnant's `civil_from_days`: days-since-epoch to a Gregorian date.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
