//! SQL schema for the damwatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Reference data, registered out-of-band.
CREATE TABLE IF NOT EXISTS dams (
    dam_id    TEXT PRIMARY KEY,
    dam_name  TEXT NOT NULL
);

-- Every record ever seen. Upserted on the natural key.
CREATE TABLE IF NOT EXISTS dam_resources (
    dam_id           TEXT NOT NULL,
    date             TEXT NOT NULL,   -- YYYY-MM-DD
    storage_volume   REAL,
    percentage_full  REAL,
    storage_inflow   REAL,
    storage_release  REAL,
    UNIQUE (dam_id, date)
);

-- The most recently loaded batch only. Replaced wholesale on every load.
CREATE TABLE IF NOT EXISTS latest_data (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    dam_id           TEXT NOT NULL,
    dam_name         TEXT NOT NULL,
    date             TEXT NOT NULL,
    storage_volume   REAL,
    percentage_full  REAL,
    storage_inflow   REAL,
    storage_release  REAL
);

CREATE TABLE IF NOT EXISTS specific_dam_analysis (
    dam_id                         TEXT NOT NULL,
    analysis_date                  TEXT NOT NULL,
    avg_storage_volume_12_months   REAL,
    avg_storage_volume_5_years     REAL,
    avg_storage_volume_20_years    REAL,
    avg_percentage_full_12_months  REAL,
    avg_percentage_full_5_years    REAL,
    avg_percentage_full_20_years   REAL,
    avg_storage_inflow_12_months   REAL,
    avg_storage_inflow_5_years     REAL,
    avg_storage_inflow_20_years    REAL,
    avg_storage_release_12_months  REAL,
    avg_storage_release_5_years    REAL,
    avg_storage_release_20_years   REAL,
    UNIQUE (dam_id, analysis_date)
);

CREATE TABLE IF NOT EXISTS overall_dam_analysis (
    analysis_date                  TEXT NOT NULL,
    avg_storage_volume_12_months   REAL,
    avg_storage_volume_5_years     REAL,
    avg_storage_volume_20_years    REAL,
    avg_percentage_full_12_months  REAL,
    avg_percentage_full_5_years    REAL,
    avg_percentage_full_20_years   REAL,
    avg_storage_inflow_12_months   REAL,
    avg_storage_inflow_5_years     REAL,
    avg_storage_inflow_20_years    REAL,
    avg_storage_release_12_months  REAL,
    avg_storage_release_5_years    REAL,
    avg_storage_release_20_years   REAL,
    UNIQUE (analysis_date)
);

CREATE INDEX IF NOT EXISTS dam_resources_date_idx ON dam_resources(date);
CREATE INDEX IF NOT EXISTS latest_data_date_idx   ON latest_data(date);

PRAGMA user_version = 1;
";

pub const SPECIFIC_ANALYSIS_TABLE: &str = "specific_dam_analysis";
pub const OVERALL_ANALYSIS_TABLE: &str = "overall_dam_analysis";
