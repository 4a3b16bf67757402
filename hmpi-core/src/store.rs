//! Sample repository - the storage boundary of the engine
//!
//! Repositories hand out raw `SampleRecord`s; validation happens in
//! `ingest`. The engine never holds a collection across calls, callers
//! fetch what they need per operation.
//!
//! Global invariants enforced:
//! - Listing order is insertion order
//! - An alert id is stored at most once (re-inserting is a no-op)
//! - A sample id is stored at most once per project

use crate::ingest::{Dataset, SampleRecord};
use crate::model::{Alert, AlertSeverity, Authority, Policy, Project, StandardTable, Standards};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional sample filters; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFilter {
    pub project_id: Option<String>,
    pub metal: Option<String>,
    pub district: Option<String>,
}

impl SampleFilter {
    pub fn matches(&self, record: &SampleRecord) -> bool {
        field_matches(&self.project_id, Some(&record.project_id))
            && field_matches(&self.metal, Some(&record.metal))
            && field_matches(&self.district, record.district.as_deref())
    }
}

fn field_matches(expected: &Option<String>, actual: Option<&str>) -> bool {
    match expected {
        Some(value) => actual == Some(value.as_str()),
        None => true,
    }
}

/// Storage operations the engine and CLI depend on
pub trait SampleRepository {
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<SampleRecord>>;
    fn list_policies(&self) -> Result<Vec<Policy>>;
    fn list_alerts(&self) -> Result<Vec<Alert>>;
    /// Standard overrides stored alongside the data, if any
    fn standard_overrides(&self) -> Result<Option<Standards>>;
    /// Store an alert; `false` if the id already exists
    fn insert_alert(&mut self, alert: &Alert) -> Result<bool>;
    /// Mark an alert acknowledged; `false` if the id is unknown
    fn acknowledge_alert(&mut self, id: &str) -> Result<bool>;
}

/// Repository over an in-memory `Dataset`
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    dataset: Dataset,
}

impl MemoryRepository {
    pub fn new(dataset: Dataset) -> Self {
        MemoryRepository { dataset }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Dataset::load(path)?))
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }
}

impl SampleRepository for MemoryRepository {
    fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.dataset.projects.clone())
    }

    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<SampleRecord>> {
        Ok(self
            .dataset
            .samples
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn list_policies(&self) -> Result<Vec<Policy>> {
        Ok(self.dataset.policies.clone())
    }

    fn list_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.dataset.alerts.clone())
    }

    fn standard_overrides(&self) -> Result<Option<Standards>> {
        Ok(self.dataset.standards.clone())
    }

    fn insert_alert(&mut self, alert: &Alert) -> Result<bool> {
        if self.dataset.alerts.iter().any(|a| a.id == alert.id) {
            return Ok(false);
        }
        self.dataset.alerts.push(alert.clone());
        Ok(true)
    }

    fn acknowledge_alert(&mut self, id: &str) -> Result<bool> {
        match self.dataset.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        project_id            TEXT PRIMARY KEY,
        name                  TEXT NOT NULL,
        description           TEXT NOT NULL DEFAULT '',
        district              TEXT NOT NULL,
        city                  TEXT NOT NULL,
        policy_threshold_hmpi REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS samples (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        sample_id  TEXT NOT NULL,
        project_id TEXT NOT NULL,
        metal      TEXT NOT NULL,
        si         REAL,
        ii         REAL,
        mi         REAL,
        latitude   REAL,
        longitude  REAL,
        district   TEXT,
        city       TEXT,
        date       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_samples_project ON samples(project_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_samples_identity ON samples(project_id, sample_id);
    CREATE TABLE IF NOT EXISTS policies (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        metal      TEXT NOT NULL,
        threshold  REAL NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS alerts (
        id           TEXT PRIMARY KEY,
        project_id   TEXT NOT NULL,
        sample_id    TEXT NOT NULL,
        message      TEXT NOT NULL,
        severity     TEXT NOT NULL,
        acknowledged INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS standards (
        authority   TEXT NOT NULL,
        metal       TEXT NOT NULL,
        limit_value REAL NOT NULL,
        PRIMARY KEY (authority, metal)
    );
";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Row counts written by `import_dataset`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub projects: usize,
    pub samples: usize,
    pub policies: usize,
    pub alerts: usize,
    pub standards: usize,
}

/// Repository backed by a SQLite database
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;
        Self::initialize(conn)
    }

    /// Open a database file that must already exist
    ///
    /// Fails instead of creating an empty database when the path is missing.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("database not found or not writable: {}", path.display()))?;
        Self::initialize(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;
        Ok(SqliteRepository { conn })
    }

    /// Write a dataset in one transaction
    ///
    /// Projects and policies are upserted by id, samples by
    /// `(project_id, sample_id)`, alerts already present are left untouched.
    /// An upserted sample keeps its original listing position.
    pub fn import_dataset(&mut self, dataset: &Dataset) -> Result<ImportSummary> {
        let tx = self.conn.transaction().context("failed to begin import")?;
        let mut summary = ImportSummary::default();

        for project in &dataset.projects {
            tx.execute(
                "INSERT INTO projects (project_id, name, description, district, city, policy_threshold_hmpi)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    district = excluded.district,
                    city = excluded.city,
                    policy_threshold_hmpi = excluded.policy_threshold_hmpi",
                params![
                    project.project_id,
                    project.name,
                    project.description,
                    project.district,
                    project.city,
                    project.policy_threshold_hmpi
                ],
            )
            .with_context(|| format!("failed to import project {}", project.project_id))?;
            summary.projects += 1;
        }

        for record in &dataset.samples {
            tx.execute(
                "INSERT INTO samples (sample_id, project_id, metal, si, ii, mi, latitude, longitude, district, city, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(project_id, sample_id) DO UPDATE SET
                    metal = excluded.metal,
                    si = excluded.si,
                    ii = excluded.ii,
                    mi = excluded.mi,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    district = excluded.district,
                    city = excluded.city,
                    date = excluded.date",
                params![
                    record.sample_id,
                    record.project_id,
                    record.metal,
                    record.si,
                    record.ii,
                    record.mi,
                    record.latitude,
                    record.longitude,
                    record.district,
                    record.city,
                    record.date
                ],
            )
            .with_context(|| format!("failed to import sample {}", record.sample_id))?;
            summary.samples += 1;
        }

        for policy in &dataset.policies {
            tx.execute(
                "INSERT INTO policies (id, name, metal, threshold, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    metal = excluded.metal,
                    threshold = excluded.threshold,
                    created_by = excluded.created_by,
                    created_at = excluded.created_at",
                params![
                    policy.id,
                    policy.name,
                    policy.metal,
                    policy.threshold,
                    policy.created_by,
                    policy.created_at.format(DATE_FORMAT).to_string()
                ],
            )
            .with_context(|| format!("failed to import policy {}", policy.id))?;
            summary.policies += 1;
        }

        for alert in &dataset.alerts {
            summary.alerts += insert_alert_row(&tx, alert)?;
        }

        if let Some(ref standards) = dataset.standards {
            for authority in [Authority::Who, Authority::Bbi] {
                for (metal, limit) in standards.table(authority).iter() {
                    tx.execute(
                        "INSERT INTO standards (authority, metal, limit_value) VALUES (?1, ?2, ?3)
                         ON CONFLICT(authority, metal) DO UPDATE SET limit_value = excluded.limit_value",
                        params![authority.as_str(), metal, limit],
                    )
                    .with_context(|| format!("failed to import {} limit for {}", authority, metal))?;
                    summary.standards += 1;
                }
            }
        }

        tx.commit().context("failed to commit import")?;
        tracing::info!(
            projects = summary.projects,
            samples = summary.samples,
            policies = summary.policies,
            alerts = summary.alerts,
            "imported dataset"
        );
        Ok(summary)
    }
}

fn insert_alert_row(conn: &Connection, alert: &Alert) -> Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO alerts (id, project_id, sample_id, message, severity, acknowledged, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            alert.id,
            alert.project_id,
            alert.sample_id,
            alert.message,
            alert.severity.as_str(),
            alert.acknowledged,
            alert.created_at.to_rfc3339()
        ],
    )
    .with_context(|| format!("failed to insert alert {}", alert.id))
}

struct AlertRow {
    id: String,
    project_id: String,
    sample_id: String,
    message: String,
    severity: String,
    acknowledged: bool,
    created_at: String,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        let severity = AlertSeverity::parse(&self.severity).with_context(|| {
            format!("alert {} has unknown severity '{}'", self.id, self.severity)
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("alert {} has invalid created_at", self.id))?
            .with_timezone(&Utc);
        Ok(Alert {
            id: self.id,
            project_id: self.project_id,
            sample_id: self.sample_id,
            message: self.message,
            severity,
            acknowledged: self.acknowledged,
            created_at,
        })
    }
}

impl SampleRepository for SqliteRepository {
    fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, name, description, district, city, policy_threshold_hmpi
             FROM projects ORDER BY rowid",
        )?;
        let projects = stmt
            .query_map([], |row| {
                Ok(Project {
                    project_id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    district: row.get(3)?,
                    city: row.get(4)?,
                    policy_threshold_hmpi: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list projects")?;
        Ok(projects)
    }

    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<SampleRecord>> {
        let mut clauses = Vec::new();
        let mut values: Vec<&str> = Vec::new();
        for (column, value) in [
            ("project_id", &filter.project_id),
            ("metal", &filter.metal),
            ("district", &filter.district),
        ] {
            if let Some(v) = value {
                values.push(v.as_str());
                clauses.push(format!("{} = ?{}", column, values.len()));
            }
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT sample_id, project_id, metal, si, ii, mi, latitude, longitude, district, city, date
             FROM samples{} ORDER BY id",
            where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(SampleRecord {
                    sample_id: row.get(0)?,
                    project_id: row.get(1)?,
                    metal: row.get(2)?,
                    si: row.get(3)?,
                    ii: row.get(4)?,
                    mi: row.get(5)?,
                    latitude: row.get(6)?,
                    longitude: row.get(7)?,
                    district: row.get(8)?,
                    city: row.get(9)?,
                    date: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list samples")?;
        Ok(records)
    }

    fn list_policies(&self) -> Result<Vec<Policy>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, metal, threshold, created_by, created_at FROM policies ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list policies")?;

        rows.into_iter()
            .map(|(id, name, metal, threshold, created_by, created_at)| {
                let created_at = NaiveDate::parse_from_str(&created_at, DATE_FORMAT)
                    .with_context(|| format!("policy {} has invalid created_at", id))?;
                Ok(Policy {
                    id,
                    name,
                    metal,
                    threshold,
                    created_by,
                    created_at,
                })
            })
            .collect()
    }

    fn list_alerts(&self) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, sample_id, message, severity, acknowledged, created_at
             FROM alerts ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AlertRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    sample_id: row.get(2)?,
                    message: row.get(3)?,
                    severity: row.get(4)?,
                    acknowledged: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list alerts")?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    fn standard_overrides(&self) -> Result<Option<Standards>> {
        let mut stmt = self
            .conn
            .prepare("SELECT authority, metal, limit_value FROM standards ORDER BY authority, metal")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list standards")?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut who = StandardTable::new();
        let mut bbi = StandardTable::new();
        for (authority, metal, limit) in rows {
            match authority.as_str() {
                "WHO" => who = who.with_limit(&metal, limit),
                "BBI" => bbi = bbi.with_limit(&metal, limit),
                other => {
                    tracing::warn!(authority = %other, metal = %metal, "ignoring limit for unknown authority");
                }
            }
        }
        Ok(Some(Standards { who, bbi }))
    }

    fn insert_alert(&mut self, alert: &Alert) -> Result<bool> {
        Ok(insert_alert_row(&self.conn, alert)? == 1)
    }

    fn acknowledge_alert(&mut self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE alerts SET acknowledged = 1 WHERE id = ?1", params![id])
            .with_context(|| format!("failed to acknowledge alert {}", id))?;
        Ok(changed > 0)
    }
}
