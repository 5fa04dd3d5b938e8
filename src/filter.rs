use crate::models::EmployeeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const ALL_DEPARTMENTS: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepartmentFilter {
    All,
    Department(String),
}

impl DepartmentFilter {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == ALL_DEPARTMENTS {
            Self::All
        } else {
            Self::Department(trimmed.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::All => ALL_DEPARTMENTS,
            Self::Department(name) => name.as_str(),
        }
    }

    pub fn matches(&self, record: &EmployeeRecord) -> bool {
        match self {
            Self::All => true,
            Self::Department(name) => record.department == *name,
        }
    }
}

/// Returns the working subset for `filter`, preserving input order.
pub fn apply(records: &[EmployeeRecord], filter: &DepartmentFilter) -> Vec<EmployeeRecord> {
    match filter {
        DepartmentFilter::All => records.to_vec(),
        DepartmentFilter::Department(_) => records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect(),
    }
}

/// Selector options: the `All` sentinel followed by the sorted observed departments.
pub fn department_options(records: &[EmployeeRecord]) -> Vec<String> {
    let observed = records
        .iter()
        .map(|record| record.department.as_str())
        .filter(|department| !department.is_empty())
        .collect::<BTreeSet<_>>();

    std::iter::once(ALL_DEPARTMENTS.to_string())
        .chain(observed.into_iter().map(ToString::to_string))
        .collect()
}
