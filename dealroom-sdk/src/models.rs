//! Server-owned entities cached by the domain stores, and the partial
//! shapes carried by push events.
//!
//! Every entity has a reducer pair: `merged(patch)` builds a new value from
//! an existing one, `from_patch(patch)` builds one from scratch when the
//! patch is self-sufficient. Both destructure the patch exhaustively, so
//! adding a field without handling it is a compile error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Transactions ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub address: String,
    /// Pipeline column (e.g. `active`, `pending`, `closed`).
    pub status: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
}

impl Transaction {
    pub fn merged(&self, patch: TransactionPatch, now: DateTime<Utc>) -> Self {
        let TransactionPatch {
            id: _,
            address,
            status,
            price,
            closing_date,
            assigned_agent_id,
        } = patch;
        Self {
            id: self.id.clone(),
            address: address.unwrap_or_else(|| self.address.clone()),
            status: status.unwrap_or_else(|| self.status.clone()),
            price: price.or(self.price),
            closing_date: closing_date.or(self.closing_date),
            assigned_agent_id: assigned_agent_id.or_else(|| self.assigned_agent_id.clone()),
            updated_at: Some(now),
        }
    }

    /// Needs `address` and `status`; the id comes from the event.
    pub fn from_patch(id: &str, patch: TransactionPatch, now: DateTime<Utc>) -> Option<Self> {
        let TransactionPatch {
            id: _,
            address,
            status,
            price,
            closing_date,
            assigned_agent_id,
        } = patch;
        Some(Self {
            id: id.to_string(),
            address: address?,
            status: status?,
            price,
            closing_date,
            assigned_agent_id,
            updated_at: Some(now),
        })
    }
}

// ── Documents ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub transaction_id: String,
    pub name: String,
    /// Review status (`uploaded`, `processing`, `needs_review`, `approved`, ...).
    pub status: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Document {
    pub fn merged(&self, patch: DocumentPatch, now: DateTime<Utc>) -> Self {
        let DocumentPatch {
            transaction_id,
            name,
            status,
            document_type,
            page_count,
            error,
        } = patch;
        Self {
            id: self.id.clone(),
            transaction_id: transaction_id.unwrap_or_else(|| self.transaction_id.clone()),
            name: name.unwrap_or_else(|| self.name.clone()),
            status: status.unwrap_or_else(|| self.status.clone()),
            document_type: document_type.or_else(|| self.document_type.clone()),
            page_count: page_count.or(self.page_count),
            error: error.or_else(|| self.error.clone()),
            updated_at: Some(now),
        }
    }

    /// Needs `transaction_id`, `name` and `status`.
    pub fn from_patch(id: &str, patch: DocumentPatch, now: DateTime<Utc>) -> Option<Self> {
        let DocumentPatch {
            transaction_id,
            name,
            status,
            document_type,
            page_count,
            error,
        } = patch;
        Some(Self {
            id: id.to_string(),
            transaction_id: transaction_id?,
            name: name?,
            status: status?,
            document_type,
            page_count,
            error,
            updated_at: Some(now),
        })
    }
}

/// OCR/extraction pipeline progress for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProgress {
    pub document_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub stage: String,
    /// 0..=100.
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
}

impl DocumentProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage.as_str(), "completed" | "failed")
    }
}

// ── Notifications ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ── Transaction reports ──

/// Extracted report for a transaction. `data` holds the extracted fields
/// as returned by the OCR backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    pub id: String,
    pub transaction_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl TransactionReport {
    /// `data` keys in the patch replace keys in the existing report; other
    /// keys are kept.
    pub fn merged(&self, patch: ReportPatch, now: DateTime<Utc>) -> Self {
        let ReportPatch {
            id,
            data,
            status,
            generated_at,
        } = patch;
        let mut merged_data = self.data.clone();
        if let Some(data) = data {
            merged_data.extend(data);
        }
        Self {
            id: id.unwrap_or_else(|| self.id.clone()),
            transaction_id: self.transaction_id.clone(),
            data: merged_data,
            status: status.or_else(|| self.status.clone()),
            generated_at: generated_at.or(self.generated_at),
            updated_at: Some(now),
        }
    }

    /// Needs `id` and `data`.
    pub fn from_patch(transaction_id: &str, patch: ReportPatch, now: DateTime<Utc>) -> Option<Self> {
        let ReportPatch {
            id,
            data,
            status,
            generated_at,
        } = patch;
        Some(Self {
            id: id?,
            transaction_id: transaction_id.to_string(),
            data: data?,
            status,
            generated_at,
            updated_at: Some(now),
        })
    }

    pub fn with_field(&self, field: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.data.insert(field.to_string(), value);
        next
    }
}

// ── Chat ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Sent locally, not yet acknowledged by the server.
    #[serde(default, skip_serializing)]
    pub pending: bool,
}

// ── Settings ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub profile: ProfileSettings,
    pub notification_preferences: NotificationPreferences,
    pub display: DisplayPreferences,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub brokerage: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brokerage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
}

impl ProfileSettings {
    pub fn merged(&self, patch: &ProfilePatch) -> Self {
        let ProfilePatch {
            display_name,
            phone,
            brokerage,
            license_number,
        } = patch;
        Self {
            display_name: display_name.clone().unwrap_or_else(|| self.display_name.clone()),
            phone: phone.clone().or_else(|| self.phone.clone()),
            brokerage: brokerage.clone().or_else(|| self.brokerage.clone()),
            license_number: license_number.clone().or_else(|| self.license_number.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub sms_enabled: bool,
    /// Days before a deadline to send a reminder.
    #[serde(default)]
    pub deadline_reminder_days: u32,
    #[serde(default)]
    pub digest_frequency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferencesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_reminder_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_frequency: Option<String>,
}

impl NotificationPreferences {
    pub fn merged(&self, patch: &NotificationPreferencesPatch) -> Self {
        let NotificationPreferencesPatch {
            email_enabled,
            push_enabled,
            sms_enabled,
            deadline_reminder_days,
            digest_frequency,
        } = patch;
        Self {
            email_enabled: email_enabled.unwrap_or(self.email_enabled),
            push_enabled: push_enabled.unwrap_or(self.push_enabled),
            sms_enabled: sms_enabled.unwrap_or(self.sms_enabled),
            deadline_reminder_days: deadline_reminder_days.unwrap_or(self.deadline_reminder_days),
            digest_frequency: digest_frequency.clone().or_else(|| self.digest_frequency.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferences {
    pub theme: String,
    /// `kanban` or `list`.
    pub pipeline_view: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub compact: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferencesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_view: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact: Option<bool>,
}

impl DisplayPreferences {
    pub fn merged(&self, patch: &DisplayPreferencesPatch) -> Self {
        let DisplayPreferencesPatch {
            theme,
            pipeline_view,
            timezone,
            compact,
        } = patch;
        Self {
            theme: theme.clone().unwrap_or_else(|| self.theme.clone()),
            pipeline_view: pipeline_view.clone().unwrap_or_else(|| self.pipeline_view.clone()),
            timezone: timezone.clone().or_else(|| self.timezone.clone()),
            compact: compact.unwrap_or(self.compact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> TransactionReport {
        TransactionReport {
            id: "r1".into(),
            transaction_id: "txn-1".into(),
            data: json!({"price": "$500,000", "buyer": "Ada"})
                .as_object()
                .cloned()
                .unwrap(),
            status: Some("draft".into()),
            generated_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn report_merge_keeps_untouched_keys() {
        let now = Utc::now();
        let patch = ReportPatch {
            data: json!({"price": "$510,000"}).as_object().cloned(),
            ..Default::default()
        };
        let merged = report().merged(patch, now);
        assert_eq!(merged.data["price"], "$510,000");
        assert_eq!(merged.data["buyer"], "Ada");
        assert_eq!(merged.status.as_deref(), Some("draft"));
        assert_eq!(merged.updated_at, Some(now));
    }

    #[test]
    fn report_from_patch_requires_id_and_data() {
        let now = Utc::now();
        let partial = ReportPatch {
            status: Some("final".into()),
            ..Default::default()
        };
        assert!(TransactionReport::from_patch("txn-2", partial, now).is_none());

        let full = ReportPatch {
            id: Some("r2".into()),
            data: Some(Map::new()),
            ..Default::default()
        };
        let built = TransactionReport::from_patch("txn-2", full, now).unwrap();
        assert_eq!(built.transaction_id, "txn-2");
        assert_eq!(built.id, "r2");
    }

    #[test]
    fn transaction_patch_decodes_camel_case() {
        let patch: TransactionPatch =
            serde_json::from_value(json!({"status": "closed", "assignedAgentId": "a7"})).unwrap();
        assert_eq!(patch.status.as_deref(), Some("closed"));
        assert_eq!(patch.assigned_agent_id.as_deref(), Some("a7"));
        assert!(patch.address.is_none());
    }

    #[test]
    fn preference_patch_serializes_only_set_fields() {
        let patch = NotificationPreferencesPatch {
            push_enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"pushEnabled": true}));
    }
}
