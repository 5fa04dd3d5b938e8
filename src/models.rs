use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Yes" => Some(Self::Yes),
            "No" => Some(Self::No),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    pub employee_number: i64,
    pub age: i64,
    pub department: String,
    pub job_role: String,
    pub monthly_income: f64,
    pub performance_rating: i64,
    pub attrition: YesNo,
    pub over_time: YesNo,
}

/// Raw insert form input. Every field arrives as text and is coerced during validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEmployeePayload {
    pub employee_number: String,
    pub age: String,
    pub department: String,
    pub job_role: String,
    pub monthly_income: String,
    pub performance_rating: String,
    pub over_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIncomePayload {
    pub employee_number: String,
    pub monthly_income: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    Insert,
    UpdateIncome,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::UpdateIncome => "update-income",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationPhase {
    Idle,
    Validating,
    Submitting,
    Committed,
    Rejected,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Submitting => "submitting",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub operation_id: String,
    pub kind: MutationKind,
    pub employee_number: Option<i64>,
    pub phase: MutationPhase,
    pub rows_affected: usize,
    pub reloaded: bool,
    pub notification: Notification,
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        self.phase == MutationPhase::Committed
    }
}

/// A scalar metric that may be undefined for an empty subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum MetricValue {
    Value(f64),
    NotApplicable,
}

impl MetricValue {
    pub fn display(self, precision: usize) -> String {
        match self {
            Self::Value(value) => format!("{:.*}", precision, value),
            Self::NotApplicable => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetrics {
    pub total_employees: usize,
    pub average_monthly_income: MetricValue,
    pub average_monthly_income_display: String,
    pub attrition_rate: MetricValue,
    pub attrition_rate_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformerRow {
    pub employee_number: i64,
    pub job_role: String,
    pub performance_rating: i64,
    pub monthly_income: f64,
}

impl From<&EmployeeRecord> for TopPerformerRow {
    fn from(record: &EmployeeRecord) -> Self {
        Self {
            employee_number: record.employee_number,
            job_role: record.job_role.clone(),
            performance_rating: record.performance_rating,
            monthly_income: record.monthly_income,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub department: String,
    pub department_options: Vec<String>,
    pub metrics: KeyMetrics,
    pub department_counts: Vec<GroupCount>,
    pub attrition_counts: Vec<GroupCount>,
    pub top_performers: Vec<TopPerformerRow>,
    pub dataset_generation: u64,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub generation: u64,
    pub record_count: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub top_n: usize,
    pub min_age: i64,
    pub max_age: i64,
    pub restrict_department_to_known: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_age: 18,
            max_age: 90,
            restrict_department_to_known: true,
        }
    }
}
