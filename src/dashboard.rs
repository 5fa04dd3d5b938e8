use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::filter::{self, DepartmentFilter, ALL_DEPARTMENTS};
use crate::metrics::{self, GroupField, TOP_PERFORMER_ORDER};
use crate::models::{
    AddEmployeePayload, AppSettings, DashboardView, EmployeeRecord, KeyMetrics, MutationKind,
    MutationOutcome, MutationPhase, Notification, ReloadResponse, TopPerformerRow, UpdateIncomePayload,
    YesNo,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-memory copy of the employees table, replaced wholesale on reload.
#[derive(Debug, Clone)]
struct DatasetCache {
    records: Vec<EmployeeRecord>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

/// Tracks one insert or update through `Idle -> Validating -> Submitting -> {Committed, Rejected}`.
#[derive(Debug)]
struct MutationFlow {
    operation_id: String,
    kind: MutationKind,
    phase: MutationPhase,
}

impl MutationFlow {
    fn start(kind: MutationKind) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            kind,
            phase: MutationPhase::Idle,
        }
    }

    fn advance(&mut self, next: MutationPhase) -> AppResult<()> {
        let legal = matches!(
            (self.phase, next),
            (MutationPhase::Idle, MutationPhase::Validating)
                | (MutationPhase::Validating, MutationPhase::Submitting)
                | (MutationPhase::Validating, MutationPhase::Rejected)
                | (MutationPhase::Submitting, MutationPhase::Committed)
                | (MutationPhase::Submitting, MutationPhase::Rejected)
        );
        if !legal {
            return Err(AppError::Internal(format!(
                "illegal {} transition {} -> {}",
                self.kind.as_str(),
                self.phase.as_str(),
                next.as_str()
            )));
        }
        tracing::debug!(
            operation_id = %self.operation_id,
            kind = self.kind.as_str(),
            from = self.phase.as_str(),
            to = next.as_str(),
            "mutation phase changed"
        );
        self.phase = next;
        Ok(())
    }

    fn reject(&mut self) {
        if !self.phase.is_terminal() {
            if let Err(error) = self.advance(MutationPhase::Rejected) {
                tracing::error!(operation_id = %self.operation_id, error = %error, "failed to reject mutation");
                self.phase = MutationPhase::Rejected;
            }
        }
    }
}

pub struct DashboardCore {
    db: Arc<Database>,
    cache: Mutex<DatasetCache>,
}

impl DashboardCore {
    pub fn new(db: Arc<Database>) -> AppResult<Self> {
        let records = db.read_all()?;
        tracing::info!(count = records.len(), "loaded employee dataset");
        Ok(Self {
            db,
            cache: Mutex::new(DatasetCache {
                records,
                generation: 1,
                loaded_at: Utc::now(),
            }),
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Drops the cached dataset and re-reads every row from the store.
    pub fn invalidate_and_reload(&self) -> AppResult<ReloadResponse> {
        let records = self.db.read_all()?;
        let mut cache = self.cache()?;
        cache.records = records;
        cache.generation += 1;
        cache.loaded_at = Utc::now();
        tracing::debug!(
            generation = cache.generation,
            count = cache.records.len(),
            "reloaded employee dataset"
        );
        Ok(ReloadResponse {
            generation: cache.generation,
            record_count: cache.records.len(),
            loaded_at: cache.loaded_at,
        })
    }

    pub fn records(&self) -> AppResult<Vec<EmployeeRecord>> {
        Ok(self.cache()?.records.clone())
    }

    pub fn generation(&self) -> AppResult<u64> {
        Ok(self.cache()?.generation)
    }

    pub fn department_options(&self) -> AppResult<Vec<String>> {
        Ok(filter::department_options(&self.cache()?.records))
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        self.db.update_settings(update)
    }

    pub fn view(&self, selection: &DepartmentFilter) -> AppResult<DashboardView> {
        let settings = self.db.get_settings()?;
        let cache = self.cache()?;
        let subset = filter::apply(&cache.records, selection);

        let average_monthly_income = metrics::mean_income(&subset);
        let attrition_rate = metrics::attrition_rate(&subset);

        Ok(DashboardView {
            department: selection.label().to_string(),
            department_options: filter::department_options(&cache.records),
            metrics: KeyMetrics {
                total_employees: metrics::count(&subset),
                average_monthly_income,
                average_monthly_income_display: average_monthly_income.display(0),
                attrition_rate,
                attrition_rate_display: attrition_rate.display(2),
            },
            department_counts: metrics::group_count(&subset, GroupField::Department),
            attrition_counts: metrics::group_count(&subset, GroupField::Attrition),
            top_performers: metrics::top_n(&subset, settings.top_n, &TOP_PERFORMER_ORDER)
                .iter()
                .map(TopPerformerRow::from)
                .collect(),
            dataset_generation: cache.generation,
            loaded_at: cache.loaded_at,
        })
    }

    pub fn insert_employee(&self, payload: &AddEmployeePayload) -> MutationOutcome {
        let mut flow = MutationFlow::start(MutationKind::Insert);
        let employee_number = coerce_integer("Employee Number", &payload.employee_number).ok();

        match self.submit_insert(&mut flow, payload) {
            Ok(record) => {
                tracing::info!(
                    operation_id = %flow.operation_id,
                    employee_number = record.employee_number,
                    department = %record.department,
                    "employee inserted"
                );
                let success = format!("New Employee #{} is successfully added.", record.employee_number);
                self.committed(flow, Some(record.employee_number), 1, success)
            }
            Err(error) => {
                flow.reject();
                tracing::warn!(operation_id = %flow.operation_id, error = %error, "employee insert rejected");
                rejected(flow, employee_number, Notification::error(format!("Insert failed: {}", error)))
            }
        }
    }

    pub fn update_income(&self, payload: &UpdateIncomePayload) -> MutationOutcome {
        let mut flow = MutationFlow::start(MutationKind::UpdateIncome);
        let employee_number = coerce_integer("Employee Number", &payload.employee_number).ok();

        match self.submit_income_update(&mut flow, payload) {
            Ok((employee_number, rows_affected)) => {
                tracing::info!(
                    operation_id = %flow.operation_id,
                    employee_number,
                    "employee monthly income updated"
                );
                let success = format!("Updated Monthly Income for Employee #{}.", employee_number);
                self.committed(flow, Some(employee_number), rows_affected, success)
            }
            Err(AppError::NotFound(message)) => {
                flow.reject();
                tracing::warn!(
                    operation_id = %flow.operation_id,
                    employee_number = ?employee_number,
                    "no employee matched income update"
                );
                rejected(flow, employee_number, Notification::warning(message))
            }
            Err(error) => {
                flow.reject();
                tracing::warn!(operation_id = %flow.operation_id, error = %error, "income update rejected");
                rejected(flow, employee_number, Notification::error(format!("Update failed: {}", error)))
            }
        }
    }

    fn submit_insert(&self, flow: &mut MutationFlow, payload: &AddEmployeePayload) -> AppResult<EmployeeRecord> {
        flow.advance(MutationPhase::Validating)?;
        let settings = self.db.get_settings()?;
        let known_departments = self.department_options()?;
        let record = validate_new_employee(payload, &settings, &known_departments)?;

        flow.advance(MutationPhase::Submitting)?;
        self.db.insert_employee(&record)?;
        flow.advance(MutationPhase::Committed)?;
        Ok(record)
    }

    fn submit_income_update(
        &self,
        flow: &mut MutationFlow,
        payload: &UpdateIncomePayload,
    ) -> AppResult<(i64, usize)> {
        flow.advance(MutationPhase::Validating)?;
        let (employee_number, monthly_income) = validate_income_update(payload)?;

        flow.advance(MutationPhase::Submitting)?;
        let rows_affected = self.db.update_income(employee_number, monthly_income)?;
        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "No employee found with Employee Number #{}.",
                employee_number
            )));
        }
        flow.advance(MutationPhase::Committed)?;
        Ok((employee_number, rows_affected))
    }

    fn committed(
        &self,
        flow: MutationFlow,
        employee_number: Option<i64>,
        rows_affected: usize,
        success: String,
    ) -> MutationOutcome {
        let (reloaded, notification) = match self.invalidate_and_reload() {
            Ok(_) => (true, Notification::success(success)),
            Err(error) => {
                tracing::error!(operation_id = %flow.operation_id, error = %error, "dataset reload after commit failed");
                (
                    false,
                    Notification::warning(format!("{} Dataset reload failed: {}", success, error)),
                )
            }
        };

        MutationOutcome {
            operation_id: flow.operation_id,
            kind: flow.kind,
            employee_number,
            phase: flow.phase,
            rows_affected,
            reloaded,
            notification,
        }
    }

    fn cache(&self) -> AppResult<MutexGuard<'_, DatasetCache>> {
        self.cache
            .lock()
            .map_err(|_| AppError::Internal("dataset cache mutex poisoned".to_string()))
    }
}

fn rejected(flow: MutationFlow, employee_number: Option<i64>, notification: Notification) -> MutationOutcome {
    MutationOutcome {
        operation_id: flow.operation_id,
        kind: flow.kind,
        employee_number,
        phase: flow.phase,
        rows_affected: 0,
        reloaded: false,
        notification,
    }
}

/// Coerces raw insert form input into a record. Attrition is always `No` for new hires.
pub fn validate_new_employee(
    payload: &AddEmployeePayload,
    settings: &AppSettings,
    department_options: &[String],
) -> AppResult<EmployeeRecord> {
    let employee_number = coerce_integer("Employee Number", &payload.employee_number)?;
    if employee_number < 1 {
        return Err(AppError::Validation(format!(
            "Employee Number must be at least 1, got {}",
            employee_number
        )));
    }

    let age = coerce_integer("Age", &payload.age)?;
    if age < settings.min_age || age > settings.max_age {
        return Err(AppError::Validation(format!(
            "Age must be between {} and {}, got {}",
            settings.min_age, settings.max_age, age
        )));
    }

    let department = payload.department.trim();
    if department.is_empty() || department == ALL_DEPARTMENTS {
        return Err(AppError::Validation("Department is required".to_string()));
    }
    let known = department_options
        .iter()
        .filter(|option| option.as_str() != ALL_DEPARTMENTS)
        .collect::<Vec<_>>();
    if settings.restrict_department_to_known
        && !known.is_empty()
        && !known.iter().any(|option| option.as_str() == department)
    {
        return Err(AppError::Validation(format!("Unknown Department {:?}", department)));
    }

    let monthly_income = coerce_income(&payload.monthly_income)?;

    let performance_rating = coerce_integer("Performance Rating", &payload.performance_rating)?;
    if !(1..=5).contains(&performance_rating) {
        return Err(AppError::Validation(format!(
            "Performance Rating must be between 1 and 5, got {}",
            performance_rating
        )));
    }

    let over_time = YesNo::parse(&payload.over_time).ok_or_else(|| {
        AppError::Validation(format!("OverTime must be Yes or No, got {:?}", payload.over_time))
    })?;

    Ok(EmployeeRecord {
        employee_number,
        age,
        department: department.to_string(),
        job_role: payload.job_role.trim().to_string(),
        monthly_income,
        performance_rating,
        attrition: YesNo::No,
        over_time,
    })
}

pub fn validate_income_update(payload: &UpdateIncomePayload) -> AppResult<(i64, f64)> {
    let employee_number = coerce_integer("Employee Number", &payload.employee_number)?;
    if employee_number < 1 {
        return Err(AppError::Validation(format!(
            "Employee Number must be at least 1, got {}",
            employee_number
        )));
    }
    let monthly_income = coerce_income(&payload.monthly_income)?;
    Ok((employee_number, monthly_income))
}

/// Accepts `"42"` as well as whole-valued numerics such as `"42.0"`.
fn coerce_integer(field: &str, raw: &str) -> AppResult<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Ok(value as i64)
        }
        _ => Err(AppError::Validation(format!("{} must be an integer, got {:?}", field, raw))),
    }
}

fn coerce_income(raw: &str) -> AppResult<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::Validation(format!("Monthly Income must be a number, got {:?}", raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "Monthly Income must be a non-negative number, got {:?}",
            raw
        )));
    }
    Ok(value)
}
