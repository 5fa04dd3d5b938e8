use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EmployeeRecord, YesNo};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const EMPLOYEE_COLUMNS: &str =
    "EmployeeNumber, Age, Department, JobRole, MonthlyIncome, PerformanceRating, Attrition, OverTime";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_all(&self) -> AppResult<Vec<EmployeeRecord>> {
        let conn = self.connection()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM employees ORDER BY rowid ASC",
            EMPLOYEE_COLUMNS
        ))?;
        let records = statement
            .query_map([], parse_employee_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_employee(&self, employee_number: i64) -> AppResult<Option<EmployeeRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM employees WHERE EmployeeNumber = ?1 LIMIT 1",
                EMPLOYEE_COLUMNS
            ),
            [employee_number],
            parse_employee_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn count_employees(&self) -> AppResult<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM employees", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| AppError::Store(format!("invalid employee count {}", count)))
    }

    /// Sorted distinct departments, trimmed the same way rows are on read.
    pub fn departments(&self) -> AppResult<Vec<String>> {
        let conn = self.connection()?;
        let mut statement = conn.prepare(
            "SELECT DISTINCT TRIM(Department) FROM employees
             WHERE Department IS NOT NULL AND TRIM(Department) <> ''
             ORDER BY 1 ASC",
        )?;
        let departments = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(departments)
    }

    /// Inserts a new employee in a single transaction.
    ///
    /// The existence check runs inside the transaction because tables created by
    /// other tools may not declare `EmployeeNumber` as a key.
    pub fn insert_employee(&self, record: &EmployeeRecord) -> AppResult<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(1) FROM employees WHERE EmployeeNumber = ?1",
            [record.employee_number],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(duplicate_key(record.employee_number));
        }

        tx.execute(
            "INSERT INTO employees (
               EmployeeNumber, Age, Department, JobRole, MonthlyIncome, PerformanceRating, Attrition, OverTime
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.employee_number,
                record.age,
                record.department,
                record.job_role,
                record.monthly_income,
                record.performance_rating,
                record.attrition.as_str(),
                record.over_time.as_str(),
            ],
        )
        .map_err(|error| map_insert_error(error, record.employee_number))?;

        tx.commit()?;
        Ok(())
    }

    /// Returns the number of rows touched, 0 when no employee matches.
    ///
    /// A key shared by several rows (possible on tables without a primary key)
    /// rolls the update back.
    pub fn update_income(&self, employee_number: i64, monthly_income: f64) -> AppResult<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(
            "UPDATE employees SET MonthlyIncome = ?1 WHERE EmployeeNumber = ?2",
            params![monthly_income, employee_number],
        )?;
        if affected > 1 {
            return Err(AppError::Store(format!(
                "Employee Number #{} matches {} rows",
                employee_number, affected
            )));
        }
        tx.commit()?;
        Ok(affected)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.connection()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("invalid settings: {}", error)))?;
        if settings.top_n == 0 {
            return Err(AppError::Validation("topN must be at least 1".to_string()));
        }
        if settings.min_age > settings.max_age {
            return Err(AppError::Validation(format!(
                "minAge {} exceeds maxAge {}",
                settings.min_age, settings.max_age
            )));
        }

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    fn connection(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

fn parse_employee_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmployeeRecord> {
    let employee_number: i64 = row.get(0)?;

    let monthly_income: f64 = row.get(4)?;
    if !monthly_income.is_finite() || monthly_income < 0.0 {
        return Err(invalid_column(
            4,
            Type::Real,
            format!("employee {} has invalid MonthlyIncome {}", employee_number, monthly_income),
        ));
    }

    let performance_rating: i64 = row.get(5)?;
    if !(1..=5).contains(&performance_rating) {
        return Err(invalid_column(
            5,
            Type::Integer,
            format!(
                "employee {} has PerformanceRating {} outside 1-5",
                employee_number, performance_rating
            ),
        ));
    }

    Ok(EmployeeRecord {
        employee_number,
        age: row.get(1)?,
        department: row
            .get::<_, Option<String>>(2)?
            .map(|department| department.trim().to_string())
            .unwrap_or_default(),
        job_role: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        monthly_income,
        performance_rating,
        attrition: parse_yes_no(6, &row.get::<_, String>(6)?)?,
        over_time: parse_yes_no(7, &row.get::<_, String>(7)?)?,
    })
}

fn parse_yes_no(idx: usize, raw: &str) -> rusqlite::Result<YesNo> {
    YesNo::parse(raw)
        .ok_or_else(|| invalid_column(idx, Type::Text, format!("expected Yes or No, found {:?}", raw)))
}

fn invalid_column(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn duplicate_key(employee_number: i64) -> AppError {
    AppError::DuplicateKey(format!(
        "Employee Number #{} already exists",
        employee_number
    ))
}

fn map_insert_error(error: rusqlite::Error, employee_number: i64) -> AppError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error {
        let key_violation = failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
        if failure.code == rusqlite::ErrorCode::ConstraintViolation && key_violation {
            return duplicate_key(employee_number);
        }
    }
    AppError::from(error)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::errors::AppError;
    use crate::models::{EmployeeRecord, YesNo};

    fn employee(employee_number: i64, department: &str, income: f64, rating: i64) -> EmployeeRecord {
        EmployeeRecord {
            employee_number,
            age: 35,
            department: department.to_string(),
            job_role: "Analyst".to_string(),
            monthly_income: income,
            performance_rating: rating,
            attrition: YesNo::No,
            over_time: YesNo::Yes,
        }
    }

    #[test]
    fn database_can_insert_and_read_employee() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("employees.db")).expect("db");

        db.insert_employee(&employee(1, "Sales", 4200.0, 3)).expect("insert");

        let records = db.read_all().expect("read all");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], employee(1, "Sales", 4200.0, 3));
        assert_eq!(db.read_all().expect("read all").len(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected_and_leaves_table_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("employees.db")).expect("db");

        db.insert_employee(&employee(9001, "Sales", 5000.0, 4)).expect("first insert");
        let error = db
            .insert_employee(&employee(9001, "Research & Development", 100.0, 1))
            .expect_err("duplicate");
        assert!(matches!(error, AppError::DuplicateKey(_)));

        let stored = db.get_employee(9001).expect("get").expect("exists");
        assert_eq!(stored.department, "Sales");
        assert_eq!(db.read_all().expect("read all").len(), 1);
    }

    #[test]
    fn duplicate_detected_on_table_without_primary_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        {
            let conn = rusqlite::Connection::open(&path).expect("open");
            conn.execute_batch(
                "CREATE TABLE employees (
                   Age INTEGER, Attrition TEXT, Department TEXT, EmployeeNumber INTEGER,
                   JobRole TEXT, MonthlyIncome INTEGER, OverTime TEXT, PerformanceRating INTEGER,
                   YearsAtCompany INTEGER
                 );
                 INSERT INTO employees VALUES (41, 'Yes', 'Sales', 1, 'Sales Executive', 5993, 'Yes', 3, 6);",
            )
            .expect("legacy schema");
        }

        let db = Database::new(&path).expect("db");
        let records = db.read_all().expect("read all");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].monthly_income, 5993.0);
        assert_eq!(records[0].attrition, YesNo::Yes);

        let error = db.insert_employee(&employee(1, "Sales", 1.0, 2)).expect_err("duplicate");
        assert!(matches!(error, AppError::DuplicateKey(_)));
        assert_eq!(db.read_all().expect("read all").len(), 1);
    }

    #[test]
    fn update_income_reports_rows_affected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("employees.db")).expect("db");
        db.insert_employee(&employee(7, "Sales", 3000.0, 2)).expect("insert");

        assert_eq!(db.update_income(7, 3500.0).expect("update"), 1);
        assert_eq!(db.update_income(99999, 3500.0).expect("update missing"), 0);

        let stored = db.get_employee(7).expect("get").expect("exists");
        assert_eq!(stored.monthly_income, 3500.0);
    }

    #[test]
    fn invalid_persisted_rating_is_a_store_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.db");
        {
            let conn = rusqlite::Connection::open(&path).expect("open");
            conn.execute_batch(
                "CREATE TABLE employees (
                   EmployeeNumber INTEGER, Age INTEGER, Department TEXT, JobRole TEXT,
                   MonthlyIncome REAL, PerformanceRating INTEGER, Attrition TEXT, OverTime TEXT
                 );
                 INSERT INTO employees VALUES (3, 30, 'Sales', 'Manager', 100.0, 9, 'No', 'No');",
            )
            .expect("schema");
        }

        let db = Database::new(&path).expect("db");
        let error = db.read_all().expect_err("rating out of range");
        assert!(matches!(error, AppError::Store(_)));
    }

    #[test]
    fn settings_are_seeded_and_merged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("employees.db")).expect("db");

        let defaults = db.get_settings().expect("settings");
        assert_eq!(defaults.top_n, 5);

        let updated = db
            .update_settings(serde_json::json!({ "topN": 3 }))
            .expect("update settings");
        assert_eq!(updated.top_n, 3);
        assert_eq!(updated.min_age, 18);
        assert_eq!(db.get_settings().expect("reload").top_n, 3);

        let error = db
            .update_settings(serde_json::json!({ "minAge": 95 }))
            .expect_err("min above max");
        assert!(matches!(error, AppError::Validation(_)));

        for bad in [
            serde_json::json!({ "topN": -1 }),
            serde_json::json!({ "topN": "five" }),
            serde_json::json!({ "topN": 0 }),
        ] {
            let error = db.update_settings(bad.clone()).expect_err("bad topN");
            assert!(matches!(error, AppError::Validation(_)), "{bad}");
        }
        assert_eq!(db.get_settings().expect("reload").top_n, 3);
    }

    #[test]
    fn count_and_departments_follow_stored_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("employees.db")).expect("db");
        assert_eq!(db.count_employees().expect("count"), 0);
        assert!(db.departments().expect("departments").is_empty());

        db.insert_employee(&employee(1, "Sales", 1.0, 1)).expect("insert");
        db.insert_employee(&employee(2, "Human Resources", 1.0, 1)).expect("insert");
        db.insert_employee(&employee(3, "Sales", 1.0, 1)).expect("insert");
        db.insert_employee(&employee(4, "", 1.0, 1)).expect("insert");

        assert_eq!(db.count_employees().expect("count"), 4);
        assert_eq!(
            db.departments().expect("departments"),
            vec!["Human Resources".to_string(), "Sales".to_string()]
        );
    }

    #[test]
    fn padded_legacy_departments_are_trimmed_on_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("padded.db");
        {
            let conn = rusqlite::Connection::open(&path).expect("open");
            conn.execute_batch(
                "CREATE TABLE employees (
                   EmployeeNumber INTEGER, Age INTEGER, Department TEXT, JobRole TEXT,
                   MonthlyIncome REAL, PerformanceRating INTEGER, Attrition TEXT, OverTime TEXT
                 );
                 INSERT INTO employees VALUES (1, 30, 'Sales ', 'Manager', 100.0, 3, 'No', 'No');
                 INSERT INTO employees VALUES (2, 31, 'Sales', 'Manager', 200.0, 3, 'No', 'No');
                 INSERT INTO employees VALUES (3, 32, NULL, 'Manager', 300.0, 3, 'No', 'No');",
            )
            .expect("schema");
        }

        let db = Database::new(&path).expect("db");
        let departments = db
            .read_all()
            .expect("read all")
            .into_iter()
            .map(|record| record.department)
            .collect::<Vec<_>>();
        assert_eq!(departments, vec!["Sales".to_string(), "Sales".to_string(), String::new()]);
        assert_eq!(db.departments().expect("departments"), vec!["Sales".to_string()]);
    }

    #[test]
    fn update_matching_several_rows_is_rolled_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dupes.db");
        {
            let conn = rusqlite::Connection::open(&path).expect("open");
            conn.execute_batch(
                "CREATE TABLE employees (
                   EmployeeNumber INTEGER, Age INTEGER, Department TEXT, JobRole TEXT,
                   MonthlyIncome REAL, PerformanceRating INTEGER, Attrition TEXT, OverTime TEXT
                 );
                 INSERT INTO employees VALUES (8, 30, 'Sales', 'Manager', 100.0, 3, 'No', 'No');
                 INSERT INTO employees VALUES (8, 40, 'Sales', 'Director', 200.0, 4, 'No', 'No');",
            )
            .expect("schema");
        }

        let db = Database::new(&path).expect("db");
        let error = db.update_income(8, 999.0).expect_err("ambiguous key");
        assert!(matches!(error, AppError::Store(_)));

        let incomes = db
            .read_all()
            .expect("read all")
            .into_iter()
            .map(|record| record.monthly_income)
            .collect::<Vec<_>>();
        assert_eq!(incomes, vec![100.0, 200.0]);
    }
}
