use serde::{
    Deserialize,
    Serialize,
};
use serde_with::skip_serializing_none;

/// Either `cid` or `callsign` must be given. A numeric `cid` wins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PilotQuery {
    pub cid: Option<String>,
    pub callsign: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotResponse {
    pub ok: bool,
    pub online: bool,
    pub pilot: Option<Pilot>,
    pub last_update: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pilot {
    pub cid: u64,
    pub callsign: String,
    pub altitude: i64,
    pub groundspeed: i64,
    pub lat: f64,
    pub lon: f64,
    pub dep: Option<String>,
    pub arr: Option<String>,
    pub route: Option<String>,
}
