use crate::models::{EmployeeRecord, GroupCount, MetricValue, YesNo};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupField {
    Department,
    JobRole,
    Attrition,
    OverTime,
    PerformanceRating,
}

impl GroupField {
    fn value_of(self, record: &EmployeeRecord) -> String {
        match self {
            Self::Department => record.department.clone(),
            Self::JobRole => record.job_role.clone(),
            Self::Attrition => record.attrition.as_str().to_string(),
            Self::OverTime => record.over_time.as_str().to_string(),
            Self::PerformanceRating => record.performance_rating.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    PerformanceRating,
    MonthlyIncome,
    Age,
    EmployeeNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub const fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    pub const fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    fn compare(&self, left: &EmployeeRecord, right: &EmployeeRecord) -> Ordering {
        let ordering = match self.field {
            SortField::PerformanceRating => left.performance_rating.cmp(&right.performance_rating),
            SortField::MonthlyIncome => left.monthly_income.total_cmp(&right.monthly_income),
            SortField::Age => left.age.cmp(&right.age),
            SortField::EmployeeNumber => left.employee_number.cmp(&right.employee_number),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Ranking used by the top performers table.
pub const TOP_PERFORMER_ORDER: [SortKey; 2] = [
    SortKey::descending(SortField::PerformanceRating),
    SortKey::descending(SortField::MonthlyIncome),
];

pub fn count(records: &[EmployeeRecord]) -> usize {
    records.len()
}

pub fn mean_income(records: &[EmployeeRecord]) -> MetricValue {
    if records.is_empty() {
        return MetricValue::NotApplicable;
    }
    let total: f64 = records.iter().map(|record| record.monthly_income).sum();
    MetricValue::Value(total / records.len() as f64)
}

/// Percentage of records with `Attrition = Yes`.
pub fn attrition_rate(records: &[EmployeeRecord]) -> MetricValue {
    if records.is_empty() {
        return MetricValue::NotApplicable;
    }
    let leavers = records
        .iter()
        .filter(|record| record.attrition == YesNo::Yes)
        .count();
    MetricValue::Value(100.0 * leavers as f64 / records.len() as f64)
}

/// Counts occurrences of each distinct `field` value. Empty values (NULL in the
/// store) are left out, as they are from the department selector.
///
/// Entries come back largest count first; equal counts keep the order in which
/// the value first appeared in `records`.
pub fn group_count(records: &[EmployeeRecord], field: GroupField) -> Vec<GroupCount> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupCount> = Vec::new();

    for record in records {
        let value = field.value_of(record);
        if value.is_empty() {
            continue;
        }
        match positions.get(&value) {
            Some(&idx) => groups[idx].count += 1,
            None => {
                positions.insert(value.clone(), groups.len());
                groups.push(GroupCount { value, count: 1 });
            }
        }
    }

    groups.sort_by(|left, right| right.count.cmp(&left.count));
    groups
}

/// Stable sort by the composite `keys`, truncated to `n`.
pub fn top_n(records: &[EmployeeRecord], n: usize, keys: &[SortKey]) -> Vec<EmployeeRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|left, right| {
        keys.iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}
