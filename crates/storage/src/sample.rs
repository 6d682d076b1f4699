//! Sample Types and Column Enumerations
//!
//! Every column name that ends up in SQL text comes from one of the closed
//! enums in this module. Parsing user input into them is the allow-list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the three independent timestamped sample streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Series {
    Environment,
    Traffic,
    Noise,
}

impl Series {
    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            Series::Environment => "environment",
            Series::Traffic => "traffic",
            Series::Noise => "noise",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Air quality and weather reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvironmentSample {
    pub timestamp: i64,
    pub location: String,
    pub pm2_5: Option<f64>,
    pub temperature: Option<f64>,
    pub weather: Option<String>,
    pub wind_speed: Option<f64>,
    pub rain: Option<f64>,
}

/// Traffic flow reading, one value per road segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrafficSample {
    pub timestamp: i64,
    pub ongar_distributor_road: Option<f64>,
    pub littleplace_castleheaney_distributor_road_south: Option<f64>,
    pub main_street: Option<f64>,
    pub the_mall: Option<f64>,
    pub station_road: Option<f64>,
    pub ongar_distributor_road_east: Option<f64>,
    pub ongar_barnhill_distributor_road: Option<f64>,
    pub littleplace_castleheaney_distributor_road_north: Option<f64>,
    pub the_avenue: Option<f64>,
}

impl TrafficSample {
    /// Sample with every road set to the same value
    pub fn uniform(timestamp: i64, value: f64) -> Self {
        let mut sample = Self {
            timestamp,
            ..Default::default()
        };
        for road in Road::ALL {
            sample.set_road(road, Some(value));
        }
        sample
    }

    /// Value recorded for a road
    pub fn road(&self, road: Road) -> Option<f64> {
        match road {
            Road::OngarDistributorRoad => self.ongar_distributor_road,
            Road::LittleplaceCastleheaneyDistributorRoadSouth => {
                self.littleplace_castleheaney_distributor_road_south
            }
            Road::MainStreet => self.main_street,
            Road::TheMall => self.the_mall,
            Road::StationRoad => self.station_road,
            Road::OngarDistributorRoadEast => self.ongar_distributor_road_east,
            Road::OngarBarnhillDistributorRoad => self.ongar_barnhill_distributor_road,
            Road::LittleplaceCastleheaneyDistributorRoadNorth => {
                self.littleplace_castleheaney_distributor_road_north
            }
            Road::TheAvenue => self.the_avenue,
        }
    }

    /// Overwrite the value for a road
    pub fn set_road(&mut self, road: Road, value: Option<f64>) {
        let slot = match road {
            Road::OngarDistributorRoad => &mut self.ongar_distributor_road,
            Road::LittleplaceCastleheaneyDistributorRoadSouth => {
                &mut self.littleplace_castleheaney_distributor_road_south
            }
            Road::MainStreet => &mut self.main_street,
            Road::TheMall => &mut self.the_mall,
            Road::StationRoad => &mut self.station_road,
            Road::OngarDistributorRoadEast => &mut self.ongar_distributor_road_east,
            Road::OngarBarnhillDistributorRoad => &mut self.ongar_barnhill_distributor_road,
            Road::LittleplaceCastleheaneyDistributorRoadNorth => {
                &mut self.littleplace_castleheaney_distributor_road_north
            }
            Road::TheAvenue => &mut self.the_avenue,
        };
        *slot = value;
    }

    /// Unweighted mean across all nine roads.
    ///
    /// A single missing road makes the whole row missing, which matches
    /// how SQL arithmetic treats NULL.
    pub fn road_mean(&self) -> Option<f64> {
        let mut total = 0.0;
        for road in Road::ALL {
            total += self.road(road)?;
        }
        Some(total / Road::ALL.len() as f64)
    }
}

/// Sound level meter reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NoiseSample {
    pub timestamp: i64,
    pub datetime: String,
    pub laeq: f64,
    pub lafmax: f64,
    pub la10: f64,
    pub la90: f64,
    pub lceq: f64,
    pub lcfmax: f64,
    pub lc10: f64,
    pub lc90: f64,
}

impl NoiseSample {
    pub fn field(&self, field: NoiseField) -> f64 {
        match field {
            NoiseField::Laeq => self.laeq,
            NoiseField::Lafmax => self.lafmax,
            NoiseField::La10 => self.la10,
            NoiseField::La90 => self.la90,
            NoiseField::Lceq => self.lceq,
            NoiseField::Lcfmax => self.lcfmax,
            NoiseField::Lc10 => self.lc10,
            NoiseField::Lc90 => self.lc90,
        }
    }
}

/// A row from any of the three series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesRow {
    Environment(EnvironmentSample),
    Traffic(TrafficSample),
    Noise(NoiseSample),
}

impl SeriesRow {
    pub fn timestamp(&self) -> i64 {
        match self {
            SeriesRow::Environment(s) => s.timestamp,
            SeriesRow::Traffic(s) => s.timestamp,
            SeriesRow::Noise(s) => s.timestamp,
        }
    }

    pub fn series(&self) -> Series {
        match self {
            SeriesRow::Environment(_) => Series::Environment,
            SeriesRow::Traffic(_) => Series::Traffic,
            SeriesRow::Noise(_) => Series::Noise,
        }
    }
}

/// Rejected column or road identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownColumn {
    #[error("Unknown road: {0}")]
    Road(String),
    #[error("Unknown environment field: {0}")]
    EnvironmentField(String),
    #[error("Unknown noise field: {0}")]
    NoiseField(String),
}

/// The nine monitored road segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Road {
    OngarDistributorRoad,
    LittleplaceCastleheaneyDistributorRoadSouth,
    MainStreet,
    TheMall,
    StationRoad,
    OngarDistributorRoadEast,
    OngarBarnhillDistributorRoad,
    LittleplaceCastleheaneyDistributorRoadNorth,
    TheAvenue,
}

impl Road {
    pub const ALL: [Road; 9] = [
        Road::OngarDistributorRoad,
        Road::LittleplaceCastleheaneyDistributorRoadSouth,
        Road::MainStreet,
        Road::TheMall,
        Road::StationRoad,
        Road::OngarDistributorRoadEast,
        Road::OngarBarnhillDistributorRoad,
        Road::LittleplaceCastleheaneyDistributorRoadNorth,
        Road::TheAvenue,
    ];

    /// Column name in the traffic table
    pub fn column(&self) -> &'static str {
        match self {
            Road::OngarDistributorRoad => "ongar_distributor_road",
            Road::LittleplaceCastleheaneyDistributorRoadSouth => {
                "littleplace_castleheaney_distributor_road_south"
            }
            Road::MainStreet => "main_street",
            Road::TheMall => "the_mall",
            Road::StationRoad => "station_road",
            Road::OngarDistributorRoadEast => "ongar_distributor_road_east",
            Road::OngarBarnhillDistributorRoad => "ongar_barnhill_distributor_road",
            Road::LittleplaceCastleheaneyDistributorRoadNorth => {
                "littleplace_castleheaney_distributor_road_north"
            }
            Road::TheAvenue => "the_avenue",
        }
    }
}

impl FromStr for Road {
    type Err = UnknownColumn;

    /// Exact match against the allow-list, nothing else gets through
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Road::ALL
            .into_iter()
            .find(|road| road.column() == s)
            .ok_or_else(|| UnknownColumn::Road(s.to_string()))
    }
}

/// Numeric environment columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentField {
    #[serde(rename = "pm2_5")]
    Pm25,
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "wind_speed")]
    WindSpeed,
    #[serde(rename = "rain")]
    Rain,
}

impl EnvironmentField {
    pub const ALL: [EnvironmentField; 4] = [
        EnvironmentField::Pm25,
        EnvironmentField::Temperature,
        EnvironmentField::WindSpeed,
        EnvironmentField::Rain,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            EnvironmentField::Pm25 => "pm2_5",
            EnvironmentField::Temperature => "temperature",
            EnvironmentField::WindSpeed => "wind_speed",
            EnvironmentField::Rain => "rain",
        }
    }

    pub fn value_of(&self, sample: &EnvironmentSample) -> Option<f64> {
        match self {
            EnvironmentField::Pm25 => sample.pm2_5,
            EnvironmentField::Temperature => sample.temperature,
            EnvironmentField::WindSpeed => sample.wind_speed,
            EnvironmentField::Rain => sample.rain,
        }
    }
}

impl FromStr for EnvironmentField {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvironmentField::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| UnknownColumn::EnvironmentField(s.to_string()))
    }
}

/// Noise level columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseField {
    Laeq,
    Lafmax,
    La10,
    La90,
    Lceq,
    Lcfmax,
    Lc10,
    Lc90,
}

impl NoiseField {
    pub const ALL: [NoiseField; 8] = [
        NoiseField::Laeq,
        NoiseField::Lafmax,
        NoiseField::La10,
        NoiseField::La90,
        NoiseField::Lceq,
        NoiseField::Lcfmax,
        NoiseField::Lc10,
        NoiseField::Lc90,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            NoiseField::Laeq => "laeq",
            NoiseField::Lafmax => "lafmax",
            NoiseField::La10 => "la10",
            NoiseField::La90 => "la90",
            NoiseField::Lceq => "lceq",
            NoiseField::Lcfmax => "lcfmax",
            NoiseField::Lc10 => "lc10",
            NoiseField::Lc90 => "lc90",
        }
    }
}

impl FromStr for NoiseField {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoiseField::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| UnknownColumn::NoiseField(s.to_string()))
    }
}

/// A numeric expression evaluated per row of a single series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Environment(EnvironmentField),
    Noise(NoiseField),
    Road(Road),
    /// Unweighted mean of the nine roads within a row
    TrafficMean,
}

impl Metric {
    pub fn series(&self) -> Series {
        match self {
            Metric::Environment(_) => Series::Environment,
            Metric::Noise(_) => Series::Noise,
            Metric::Road(_) | Metric::TrafficMean => Series::Traffic,
        }
    }

    /// SQL expression for this metric.
    ///
    /// Built only from enum column names, never from caller text.
    pub fn sql_expr(&self) -> String {
        match self {
            Metric::Environment(field) => field.column().to_string(),
            Metric::Noise(field) => field.column().to_string(),
            Metric::Road(road) => road.column().to_string(),
            Metric::TrafficMean => {
                let sum = Road::ALL
                    .iter()
                    .map(|road| road.column())
                    .collect::<Vec<_>>()
                    .join(" + ");
                format!("(({}) / {}.0)", sum, Road::ALL.len())
            }
        }
    }

    /// Evaluate the metric against a row; `None` for nulls or a foreign series
    pub fn value_of(&self, row: &SeriesRow) -> Option<f64> {
        match (self, row) {
            (Metric::Environment(field), SeriesRow::Environment(s)) => field.value_of(s),
            (Metric::Noise(field), SeriesRow::Noise(s)) => Some(s.field(*field)),
            (Metric::Road(road), SeriesRow::Traffic(s)) => s.road(*road),
            (Metric::TrafficMean, SeriesRow::Traffic(s)) => s.road_mean(),
            _ => None,
        }
    }

    /// Short name used in logs and response keys
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Environment(field) => field.column(),
            Metric::Noise(field) => field.column(),
            Metric::Road(road) => road.column(),
            Metric::TrafficMean => "traffic",
        }
    }
}
