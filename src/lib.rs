pub mod dashboard;
pub mod db;
pub mod errors;
pub mod filter;
pub mod metrics;
pub mod models;

use crate::dashboard::DashboardCore;
use crate::db::Database;
use crate::filter::DepartmentFilter;
use crate::models::{
    AddEmployeePayload, AppSettings, DashboardView, EmployeeRecord, MutationOutcome, ReloadResponse,
    UpdateIncomePayload,
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const DATA_DIR_ENV: &str = "HR_DASHBOARD_DATA_DIR";
const DB_PATH_ENV: &str = "HR_DASHBOARD_DB_PATH";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DB_FILE: &str = "employees.db";

#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<DashboardCore>,
}

impl AppState {
    pub fn open(db_path: &Path) -> errors::AppResult<Self> {
        let db = Arc::new(Database::new(db_path)?);
        tracing::info!(path = %db.path().display(), "opened employee store");
        let dashboard = DashboardCore::new(db)?;
        Ok(Self {
            dashboard: Arc::new(dashboard),
        })
    }

    pub fn dashboard(&self) -> &DashboardCore {
        &self.dashboard
    }
}

pub fn get_dashboard(state: &AppState, department: String) -> Result<DashboardView, String> {
    state
        .dashboard
        .view(&DepartmentFilter::parse(&department))
        .map_err(to_client_error)
}

pub fn list_departments(state: &AppState) -> Result<Vec<String>, String> {
    state.dashboard.department_options().map_err(to_client_error)
}

pub fn get_employee(state: &AppState, employee_number: i64) -> Result<Option<EmployeeRecord>, String> {
    state
        .dashboard
        .database()
        .get_employee(employee_number)
        .map_err(to_client_error)
}

pub fn add_employee(state: &AppState, payload: AddEmployeePayload) -> MutationOutcome {
    state.dashboard.insert_employee(&payload)
}

pub fn update_employee_income(state: &AppState, payload: UpdateIncomePayload) -> MutationOutcome {
    state.dashboard.update_income(&payload)
}

pub fn reload_dataset(state: &AppState) -> Result<ReloadResponse, String> {
    state.dashboard.invalidate_and_reload().map_err(to_client_error)
}

pub fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    state.dashboard.settings().map_err(to_client_error)
}

pub fn update_settings(state: &AppState, update: serde_json::Value) -> Result<AppSettings, String> {
    state.dashboard.update_settings(update).map_err(to_client_error)
}

/// Opens the store named by the environment and prints the unfiltered view as JSON.
pub fn run() {
    if let Err(error) = bootstrap() {
        eprintln!("hr-dashboard: {:#}", error);
        std::process::exit(1);
    }
}

fn bootstrap() -> anyhow::Result<()> {
    let data_dir = std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    init_tracing(&data_dir).map_err(anyhow::Error::msg)?;

    let db_path = std::env::var_os(DB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE));
    let state = AppState::open(&db_path)
        .with_context(|| format!("failed to open employee store at {}", db_path.display()))?;

    let view = get_dashboard(&state, filter::ALL_DEPARTMENTS.to_string()).map_err(anyhow::Error::msg)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
