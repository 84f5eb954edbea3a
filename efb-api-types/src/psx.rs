use psx_link::{
    pushback::{
        Direction,
        PushbackState,
    },
    registers::{
        DoorMap,
        ExtPower,
        ShoreBreaker,
    },
    shadow::ShadowSnapshot,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PingQuery {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SendRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub ok: bool,
    pub response: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub status: ShadowSnapshot,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DoorsAction {
    #[default]
    Set,
    TakeControl,
}

/// Door maps are complete: doors missing from a map are written closed (or
/// armed).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DoorsRequest {
    #[serde(default)]
    pub action: DoorsAction,
    pub open: Option<DoorMap>,
    pub manual: Option<DoorMap>,
    #[serde(default)]
    pub verify: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RegisterWritten {
    pub ok: bool,
    pub bits: u32,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoorsResponse {
    pub ok: bool,
    pub open: Option<RegisterWritten>,
    pub manual: Option<RegisterWritten>,
    pub verified: Option<bool>,
}

/// Without a `base` the power register is read before it's written.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PowerRequest {
    pub base: Option<u32>,
    pub ext1: Option<ExtPower>,
    pub ext2: Option<ExtPower>,
    pub ssb: Option<ShoreBreaker>,
    #[serde(default)]
    pub verify: bool,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PowerResponse {
    pub ok: bool,
    pub base: u32,
    pub next: u32,
    pub verified: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AirRequest {
    #[serde(default)]
    pub bleed: bool,
    #[serde(default)]
    pub aircon: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AirResponse {
    pub ok: bool,
    pub bits: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelAction {
    Prefuel,
    Tanks,
    Preselect,
    Total,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelRequest {
    pub action: FuelAction,
    /// Prefuel entry
    pub entry: Option<String>,
    /// Raw tanks or preselect payload
    pub payload: Option<String>,
    pub total_kg: Option<f64>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelResponse {
    pub ok: bool,
    pub total_kg: Option<f64>,
    pub total_lbs: Option<f64>,
    #[serde(rename = "payload438")]
    pub tanks_payload: Option<String>,
    #[serde(rename = "payload439")]
    pub preselect_payload: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightAndBalanceRequest {
    pub zfw_kg: Option<f64>,
    pub zfw_lbs: Option<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightAndBalanceResponse {
    pub ok: bool,
    pub zfw_lbs: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushbackAction {
    Start,
    Turn,
    Stop,
    Release,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushbackRequest {
    pub action: PushbackAction,
    pub direction: Option<Direction>,
    /// Degrees, required for every action.
    pub heading: Option<f64>,
    #[serde(default)]
    pub hold: bool,
    pub key: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
pub struct PushbackResponse {
    pub ok: bool,
    pub key: String,
    pub hold: Option<bool>,
    pub released: Option<bool>,
    pub session: PushbackState,
}
