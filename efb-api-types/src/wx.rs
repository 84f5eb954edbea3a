use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetarTafQuery {
    /// ICAO codes separated by commas or whitespace.
    pub stations: Option<String>,
}

/// Missing reports are `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationReport {
    pub metar: Option<String>,
    pub metar_time: Option<String>,
    pub taf: Option<String>,
    pub taf_time: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetarTafResponse {
    pub ok: bool,
    pub data: BTreeMap<String, StationReport>,
}
