//! The three dashboards and the load pipeline they share:
//! config → connection → cached query → normalized table → KPIs.
use crate::core::db::{ConnectionProvider, Connector, QueryDef};
use crate::core::{DashError, Result};
use crate::fetch::DataFetcher;
use crate::normalize::{normalize, ColumnKind, ColumnRule, NormalizedTable};
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use ColumnKind::{Date, Float, Integer, TitleText};

/// Where a KPI value comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KpiSource {
    RowCount,
    Sum(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiDef {
    pub label: &'static str,
    pub source: KpiSource,
}

/// A computed headline number
#[derive(Debug, Clone, PartialEq)]
pub struct Kpi {
    pub label: &'static str,
    pub value: i64,
}

/// Static description of one dashboard
#[derive(Debug)]
pub struct DashboardDef {
    /// Query identity and command-line name
    pub name: &'static str,
    pub title: &'static str,
    /// Credentials file name inside the settings' `config_dir`
    pub config_file: &'static str,
    pub sql: &'static str,
    /// How long fetched rows are reused
    pub ttl: Duration,
    pub rules: &'static [ColumnRule],
    pub kpis: &'static [KpiDef],
    /// Shown when no data could be loaded
    pub failure_message: &'static str,
}

pub static COLD_WAVE: DashboardDef = DashboardDef {
    name: "cold-wave",
    title: "ColdWave Disaster Management Dashboard",
    config_file: "Dashboard1.toml",
    sql: "SELECT * FROM dbo.ColdWaveDetails",
    ttl: Duration::from_secs(600),
    rules: &[
        ColumnRule::derived("RecordDate", "date", Date),
        ColumnRule::new("AffectedPeople", Integer),
        ColumnRule::new("DeadPeople", Integer),
    ],
    kpis: &[
        KpiDef {
            label: "Total Affected Population",
            source: KpiSource::Sum("AffectedPeople"),
        },
        KpiDef {
            label: "Total Deaths Reported",
            source: KpiSource::Sum("DeadPeople"),
        },
    ],
    failure_message: "Could not load cold wave data, please check connection.",
};

pub static INCIDENTS: DashboardDef = DashboardDef {
    name: "incidents",
    title: "Bihar Disaster Incident Dashboard",
    config_file: "Dashboard2.toml",
    sql: r#"SELECT CAST(HR.IncidentDate AS DATE) AS date,
    TRIM(MD.DistrictName) AS district,
    TRIM(MB.BlockName) AS block,
    H.Name AS incident_type,
    SUM(CASE WHEN HLR.HLCode = 2 THEN 1 ELSE 0 END) AS deaths,
    SUM(CASE WHEN HLR.HLCode = 1 THEN 1 ELSE 0 END) AS injured,
    CASE WHEN HR.IsFinal = 1 THEN 'Final'
         WHEN HR.IsFinal = 2 THEN 'Verified'
         ELSE 'Unknown' END AS entry_type
FROM dbo.HazardReport AS HR
LEFT JOIN dbo.Hazards AS H ON HR.HazardCode = H.ID
LEFT JOIN dbo.mstDistricts AS MD ON HR.DistrictCode = MD.DistrictCode
LEFT JOIN dbo.mstBlocks AS MB ON HR.BlockCode = MB.BlockCode AND HR.DistrictCode = MB.DistrictCode
LEFT JOIN dbo.HumanLossReport AS HLR ON HR.ID = HLR.HzdReptID
WHERE HR.IncidentDate >= DATEADD(YEAR, -5, GETDATE())
GROUP BY CAST(HR.IncidentDate AS DATE), MD.DistrictName, MB.BlockName, H.Name, HR.IsFinal
ORDER BY date"#,
    ttl: Duration::from_secs(1800),
    rules: &[
        ColumnRule::new("date", Date),
        ColumnRule::new("district", TitleText),
        ColumnRule::new("block", TitleText),
        ColumnRule::new("incident_type", TitleText),
        ColumnRule::new("entry_type", TitleText),
        ColumnRule::new("deaths", Integer),
        ColumnRule::new("injured", Integer),
    ],
    kpis: &[
        KpiDef {
            label: "Total Incidents",
            source: KpiSource::RowCount,
        },
        KpiDef {
            label: "Total Deaths",
            source: KpiSource::Sum("deaths"),
        },
        KpiDef {
            label: "Total Injured",
            source: KpiSource::Sum("injured"),
        },
    ],
    failure_message: "No incident data loaded. Check DB connection or filters.",
};

pub static FLOOD: DashboardDef = DashboardDef {
    name: "flood",
    title: "Bihar Flood Disaster Dashboard",
    config_file: "Dashboard3.toml",
    sql: r#"SELECT
    dm.DistrictName AS District,
    m.RecordDate AS Date,
    d.pdHumanAffected AS TotalPopulationAffected,
    d.pdMigratedPopulation AS TotalPopulationEvacuated,
    d.pdDeadPeoples AS NumberOfDeaths,
    d.pdAffectedAnimals AS TotalAnimalsAffected,
    d.pdAffectedKutchaHouses AS PartlyAffectedKutchaHouses,
    d.pdAffectedPakkaHouses AS PartlyAffectedPakkaHouses,
    d.pdAffectedHuts AS TotalHouseDamage,
    d.pdAffectedAgriLand AS AgricultureArea,
    d.pdDamagedCropArea AS CropDamageArea,
    d.pdFoodPackets AS FoodPacketsDistributed,
    d.pdReliefCentreOpened AS TotalReliefCentres,
    d.pdPeopleRegistered AS TotalPersonsInRelief,
    d.pdHealthCampToday AS TotalHealthCentres,
    d.pdPeopleTreated AS TotalPersonsTreated,
    d.pdMotorBoatToday AS TotalBoatsDeployed
FROM dbo.FloodMain AS m
JOIN dbo.FloodDetailsCum AS d ON m.ID = d.ID
JOIN dbo.mstDistricts AS dm ON m.DistrictCode = dm.DistrictCode
ORDER BY m.RecordDate DESC"#,
    ttl: Duration::from_secs(900),
    rules: &[
        ColumnRule::new("Date", Date),
        ColumnRule::new("District", TitleText),
        ColumnRule::new("TotalPopulationAffected", Float),
        ColumnRule::new("TotalPopulationEvacuated", Float),
        ColumnRule::new("NumberOfDeaths", Float),
        ColumnRule::new("TotalAnimalsAffected", Float),
        ColumnRule::new("PartlyAffectedKutchaHouses", Float),
        ColumnRule::new("PartlyAffectedPakkaHouses", Float),
        ColumnRule::new("TotalHouseDamage", Float),
        ColumnRule::new("AgricultureArea", Float),
        ColumnRule::new("CropDamageArea", Float),
        ColumnRule::new("FoodPacketsDistributed", Float),
        ColumnRule::new("TotalReliefCentres", Float),
        ColumnRule::new("TotalPersonsInRelief", Float),
        ColumnRule::new("TotalHealthCentres", Float),
        ColumnRule::new("TotalPersonsTreated", Float),
        ColumnRule::new("TotalBoatsDeployed", Float),
    ],
    kpis: &[
        KpiDef {
            label: "Total Population Affected",
            source: KpiSource::Sum("TotalPopulationAffected"),
        },
        KpiDef {
            label: "Total Deaths",
            source: KpiSource::Sum("NumberOfDeaths"),
        },
        KpiDef {
            label: "Food Packets Distributed",
            source: KpiSource::Sum("FoodPacketsDistributed"),
        },
    ],
    failure_message: "Unable to load flood disaster data. Please check your DB connection or try again later.",
};

pub static ALL: [&DashboardDef; 3] = [&COLD_WAVE, &INCIDENTS, &FLOOD];

/// Looks up a dashboard by its command-line name
pub fn find(name: &str) -> Option<&'static DashboardDef> {
    ALL.iter().copied().find(|def| def.name == name)
}

impl DashboardDef {
    /// Computes this dashboard's KPIs; an empty table gives all zeros
    pub fn kpis(&self, table: &NormalizedTable) -> Vec<Kpi> {
        self.kpis
            .iter()
            .map(|kpi| Kpi {
                label: kpi.label,
                value: match kpi.source {
                    KpiSource::RowCount => table.len() as i64,
                    KpiSource::Sum(column) => table.sum(column) as i64,
                },
            })
            .collect()
    }
}

/// Result of one load: a table, plus the error that emptied it if any
#[derive(Debug)]
pub struct LoadOutcome {
    pub table: NormalizedTable,
    pub error: Option<DashError>,
}

impl LoadOutcome {
    fn failed(error: DashError) -> Self {
        LoadOutcome {
            table: NormalizedTable::empty(),
            error: Some(error),
        }
    }
}

/// A dashboard wired to its own connection provider and result cache
pub struct Dashboard {
    def: &'static DashboardDef,
    query: QueryDef,
    fetcher: DataFetcher,
}

impl Dashboard {
    pub fn new(
        def: &'static DashboardDef,
        connector: Arc<dyn Connector>,
        settings: &Settings,
    ) -> Result<Self> {
        settings.validate()?;
        let query = QueryDef::new(def.name, def.sql)?;
        let mut provider = ConnectionProvider::new(connector, settings.config_dir.join(def.config_file));
        if let Some(ttl) = settings.connection_ttl() {
            provider = provider.with_ttl(ttl);
        }
        let fetcher = DataFetcher::new(
            Arc::new(provider),
            settings.query_ttl(def.name, def.ttl),
            settings.cache_capacity,
        );
        Ok(Dashboard {
            def,
            query,
            fetcher,
        })
    }

    pub fn def(&self) -> &'static DashboardDef {
        self.def
    }

    /// Fetches and normalizes the dashboard's data.
    ///
    /// Never fails: any error yields an empty table with the error attached
    /// for display.
    pub fn load(&self) -> LoadOutcome {
        let raw = match self.fetcher.fetch(&self.query) {
            Ok(raw) => raw,
            Err(e) => {
                error!(dashboard = self.def.name, error = %e, "failed to load data");
                return LoadOutcome::failed(e);
            }
        };
        match normalize(&raw, self.def.rules) {
            Ok(table) => {
                info!(dashboard = self.def.name, rows = table.len(), "data loaded");
                LoadOutcome { table, error: None }
            }
            Err(e) => {
                error!(dashboard = self.def.name, error = %e, "failed to normalize data");
                LoadOutcome::failed(e)
            }
        }
    }

    pub fn kpis(&self, table: &NormalizedTable) -> Vec<Kpi> {
        self.def.kpis(table)
    }

    /// Forces the next `load` to query the database again
    pub fn invalidate(&self) {
        self.fetcher.invalidate(&self.query);
    }

    pub fn close(&self) -> Result<()> {
        self.fetcher.provider().close()
    }
}
