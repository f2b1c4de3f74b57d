use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::models::{signal, signal_update};

/// Lifecycle state of a signal. The vocabulary is open: unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalStatus {
    Open,
    Closed,
    Cancelled,
    Other(String),
}

impl SignalStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SignalStatus::Open => "open",
            SignalStatus::Closed => "closed",
            SignalStatus::Cancelled => "cancelled",
            SignalStatus::Other(s) => s,
        }
    }
}

impl From<&str> for SignalStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "open" => SignalStatus::Open,
            "closed" => SignalStatus::Closed,
            "cancelled" | "canceled" => SignalStatus::Cancelled,
            _ => SignalStatus::Other(raw.trim().to_string()),
        }
    }
}

impl From<String> for SignalStatus {
    fn from(raw: String) -> Self {
        SignalStatus::from(raw.as_str())
    }
}

impl From<SignalStatus> for String {
    fn from(status: SignalStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether updates may reference signals that are not stored (yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialMode {
    /// Accept updates before their signal arrives.
    #[default]
    Permissive,
    /// Reject updates whose signal is unknown.
    Enforced,
}

impl FromStr for ReferentialMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(ReferentialMode::Permissive),
            "enforced" | "enforce" | "strict" => Ok(ReferentialMode::Enforced),
            other => Err(format!("unknown referential mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertAction {
    Inserted,
    Updated,
    Unchanged,
}

/// A signal as observed by an ingestion collaborator. `text_sha1` is derived by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub signal_id: String,
    pub channel_id: i64,
    pub call_message_id: i64,
    pub message_link: String,
    pub pair: String,
    pub entry: f64,
    pub target1: Option<f64>,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub target4: Option<f64>,
    pub stop1: Option<f64>,
    pub stop2: Option<f64>,
    pub risk_level: String,
    pub volume_rank_num: i32,
    pub volume_rank_den: i32,
    pub created_at: String,
    pub status: SignalStatus,
    pub raw_text: String,
    pub edit_date: Option<String>,
}

impl NewSignal {
    pub fn new(
        signal_id: impl Into<String>,
        channel_id: i64,
        call_message_id: i64,
        pair: impl Into<String>,
        entry: f64,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            channel_id,
            call_message_id,
            message_link: String::new(),
            pair: pair.into(),
            entry,
            target1: None,
            target2: None,
            target3: None,
            target4: None,
            stop1: None,
            stop2: None,
            risk_level: String::new(),
            volume_rank_num: 0,
            volume_rank_den: 0,
            created_at: created_at.into(),
            status: SignalStatus::Open,
            raw_text: String::new(),
            edit_date: None,
        }
    }

    pub fn with_targets(mut self, targets: [Option<f64>; 4]) -> Self {
        [self.target1, self.target2, self.target3, self.target4] = targets;
        self
    }

    pub fn with_stops(mut self, stops: [Option<f64>; 2]) -> Self {
        [self.stop1, self.stop2] = stops;
        self
    }

    /// Known statuses (`open`, `closed`, `cancelled`/`canceled`) are matched case-insensitively
    /// and stored in their lower-case form. Any other value is stored verbatim, trimmed.
    pub fn with_status(mut self, status: impl Into<SignalStatus>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    pub fn with_message_link(mut self, link: impl Into<String>) -> Self {
        self.message_link = link.into();
        self
    }

    pub fn with_risk(mut self, risk_level: impl Into<String>, rank_num: i32, rank_den: i32) -> Self {
        self.risk_level = risk_level.into();
        self.volume_rank_num = rank_num;
        self.volume_rank_den = rank_den;
        self
    }

    pub fn with_edit_date(mut self, edit_date: impl Into<String>) -> Self {
        self.edit_date = Some(edit_date.into());
        self
    }

    /// True when the stored row already carries exactly this signal's data.
    pub(crate) fn matches(&self, row: &signal::Model, text_sha1: &str) -> bool {
        self.same_identity(row) && !self.mutable_fields_differ(row, text_sha1)
    }

    pub(crate) fn same_identity(&self, row: &signal::Model) -> bool {
        row.signal_id == self.signal_id
            && row.channel_id == self.channel_id
            && row.call_message_id == self.call_message_id
            && row.message_link == self.message_link
            && row.pair == self.pair
            && row.entry == self.entry
            && row.risk_level == self.risk_level
            && row.volume_rank_num == self.volume_rank_num
            && row.volume_rank_den == self.volume_rank_den
            && row.created_at == self.created_at
    }

    pub(crate) fn mutable_fields_differ(&self, row: &signal::Model, text_sha1: &str) -> bool {
        row.status != self.status.as_str()
            || row.targets() != [self.target1, self.target2, self.target3, self.target4]
            || row.stops() != [self.stop1, self.stop2]
            || row.edit_date != self.edit_date
            || row.raw_text != self.raw_text
            || row.text_sha1 != text_sha1
    }
}

/// An update event as observed by an ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignalUpdate {
    pub signal_id: String,
    pub channel_id: i64,
    pub update_message_id: i64,
    pub message_link: String,
    /// Free text, e.g. `target1_hit`, `stop_hit`, `status_change`.
    pub update_type: String,
    pub price: Option<f64>,
    pub update_at: String,
    pub raw_text: String,
    pub reply_to_msg_id: Option<i64>,
    pub linked_msg_id: Option<i64>,
}

impl NewSignalUpdate {
    pub fn new(
        signal_id: impl Into<String>,
        channel_id: i64,
        update_message_id: i64,
        update_type: impl Into<String>,
        update_at: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            channel_id,
            update_message_id,
            message_link: String::new(),
            update_type: update_type.into(),
            price: None,
            update_at: update_at.into(),
            raw_text: String::new(),
            reply_to_msg_id: None,
            linked_msg_id: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    pub fn with_message_link(mut self, link: impl Into<String>) -> Self {
        self.message_link = link.into();
        self
    }

    pub fn with_links(mut self, reply_to_msg_id: Option<i64>, linked_msg_id: Option<i64>) -> Self {
        self.reply_to_msg_id = reply_to_msg_id;
        self.linked_msg_id = linked_msg_id;
        self
    }

    pub fn key(&self) -> UpdateKey {
        UpdateKey {
            channel_id: self.channel_id,
            update_message_id: self.update_message_id,
            update_type: self.update_type.clone(),
        }
    }

    pub(crate) fn payload_differs(&self, row: &signal_update::Model) -> bool {
        row.price != self.price
            || row.update_at != self.update_at
            || row.raw_text != self.raw_text
            || row.message_link != self.message_link
            || row.reply_to_msg_id != self.reply_to_msg_id
            || row.linked_msg_id != self.linked_msg_id
    }
}

/// Composite primary key of `signal_updates`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateKey {
    pub channel_id: i64,
    pub update_message_id: i64,
    pub update_type: String,
}

impl fmt::Display for UpdateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.channel_id, self.update_message_id, self.update_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_values_case_insensitively() {
        assert_eq!(SignalStatus::from("OPEN"), SignalStatus::Open);
        assert_eq!(SignalStatus::from(" closed "), SignalStatus::Closed);
        assert_eq!(SignalStatus::from("canceled"), SignalStatus::Cancelled);
    }

    #[test]
    fn status_keeps_unknown_values() {
        let status = SignalStatus::from("tp2_running");
        assert_eq!(status, SignalStatus::Other("tp2_running".into()));
        assert_eq!(status.as_str(), "tp2_running");
        assert_eq!(status.to_string(), "tp2_running");
    }

    #[test]
    fn status_serializes_as_text() {
        let json = serde_json::to_string(&SignalStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let back: SignalStatus = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(back, SignalStatus::Other("partial".into()));
    }

    #[test]
    fn referential_mode_parses() {
        assert_eq!("permissive".parse(), Ok(ReferentialMode::Permissive));
        assert_eq!("STRICT".parse(), Ok(ReferentialMode::Enforced));
        assert!("sometimes".parse::<ReferentialMode>().is_err());
    }

    #[test]
    fn builder_fills_levels() {
        let signal = NewSignal::new("S1", 7, 1001, "BTCUSDT", 50_000.0, "2024-01-01T00:00:00Z")
            .with_targets([Some(51_000.0), Some(52_000.0), None, None])
            .with_stops([Some(49_000.0), None]);
        assert_eq!(signal.target2, Some(52_000.0));
        assert_eq!(signal.target3, None);
        assert_eq!(signal.stop1, Some(49_000.0));
        assert_eq!(signal.status, SignalStatus::Open);
    }
}
