/// # Test Utilities Module
///
/// Fixtures for pipeline tests: temp-file SQLite databases holding the
/// dashboards' source tables, plus the per-dashboard credential files that
/// point at them.

use crate::core::{DashError, Result};
use crate::dashboards::ALL;
use crate::settings::Settings;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

const SOURCE_SCHEMA: &str = "
    CREATE TABLE ColdWaveDetails (
        RecordDate TEXT,
        District TEXT,
        AffectedPeople INTEGER,
        DeadPeople INTEGER
    );

    CREATE TABLE mstDistricts (
        DistrictCode INTEGER PRIMARY KEY,
        DistrictName TEXT NOT NULL
    );

    CREATE TABLE FloodMain (
        ID INTEGER PRIMARY KEY,
        DistrictCode INTEGER NOT NULL,
        RecordDate TEXT
    );

    CREATE TABLE FloodDetailsCum (
        ID INTEGER PRIMARY KEY,
        pdHumanAffected REAL, pdMigratedPopulation REAL, pdDeadPeoples REAL,
        pdAffectedAnimals REAL, pdAffectedKutchaHouses REAL, pdAffectedPakkaHouses REAL,
        pdAffectedHuts REAL, pdAffectedAgriLand REAL, pdDamagedCropArea REAL,
        pdFoodPackets REAL, pdReliefCentreOpened REAL, pdPeopleRegistered REAL,
        pdHealthCampToday REAL, pdPeopleTreated REAL, pdMotorBoatToday REAL
    );
";

const SAMPLE_DATA: &str = "
    INSERT INTO ColdWaveDetails VALUES ('2024-01-02', 'Patna', 1200, 3);
    INSERT INTO ColdWaveDetails VALUES ('2024-01-03', 'Gaya', 500, 1);
    INSERT INTO ColdWaveDetails VALUES ('2024-01-02', 'Patna', 1200, 3);

    INSERT INTO mstDistricts VALUES (1, ' darbhanga '), (2, 'SUPAUL');
    INSERT INTO FloodMain VALUES (1, 1, '2024-08-10 00:00:00'), (2, 2, 'pending');
    INSERT INTO FloodDetailsCum VALUES
        (1, 25000, 1200, 2, 300, 40, 5, 12, 80.5, 60.25, 1500, 4, 900, 2, 150, 6),
        (2, '1800', NULL, 'n/a', 0, 0, 0, 0, 0, 0, 250, 1, 0, 0, 0, 1);
";

/// An isolated on-disk database with its own config directory
pub struct DatabaseFixture {
    pub name: String,
    pub path: PathBuf,
    pub connection: Connection,
    dir: TempDir,
}

impl DatabaseFixture {
    /// Create an empty database file
    pub fn new(name: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(format!("{}_{}.db", name, Uuid::new_v4()));
        let connection = Connection::open(&path).map_err(DashError::Database)?;
        Ok(DatabaseFixture {
            name: name.to_string(),
            path,
            connection,
            dir,
        })
    }

    /// Create a database from arbitrary setup SQL
    pub fn with_schema(name: &str, sql: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.connection.execute_batch(sql)?;
        Ok(fixture)
    }

    /// Create the dashboards' source tables filled with sample rows
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::with_schema(name, SOURCE_SCHEMA)?;
        fixture.connection.execute_batch(SAMPLE_DATA)?;
        Ok(fixture)
    }

    pub fn target(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    /// Writes every dashboard's credential file pointing at this database
    /// and returns settings that read them
    pub fn write_configs(&self) -> Result<Settings> {
        let config_dir = self.dir.path().join("config");
        fs::create_dir_all(&config_dir)?;
        for def in ALL {
            fs::write(
                config_dir.join(def.config_file),
                format!("# fixture {}\nurl = \"{}\"\n", self.name, self.target()),
            )?;
        }
        Ok(dashboard_settings(&config_dir))
    }
}

/// Default settings reading credential files from `config_dir`
pub fn dashboard_settings(config_dir: &Path) -> Settings {
    Settings {
        config_dir: config_dir.to_path_buf(),
        ..Settings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();
        let count: i64 = fixture
            .connection
            .query_row("SELECT COUNT(*) FROM ColdWaveDetails", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_fixture_files_are_unique() {
        let first = DatabaseFixture::new("test_unique").unwrap();
        let second = DatabaseFixture::new("test_unique").unwrap();
        assert_ne!(first.path.file_name(), second.path.file_name());
        assert!(first
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("test_unique_") && n.ends_with(".db")));
    }

    #[test]
    fn test_write_configs() {
        let fixture = DatabaseFixture::new("test_configs").unwrap();
        let settings = fixture.write_configs().unwrap();
        for def in ALL {
            let config = crate::config::load_config(settings.config_dir.join(def.config_file))
                .unwrap()
                .unwrap();
            assert_eq!(config.url(), Some(fixture.target().as_str()));
        }
    }
}
