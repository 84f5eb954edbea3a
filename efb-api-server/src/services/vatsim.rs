use efb_api_types::vatsim::Pilot;
use serde::Deserialize;

use crate::{
    Error,
    util::http_client,
};

pub const VATSIM_DATA_URL: &str = "https://data.vatsim.net/v3/vatsim-data.json";

#[derive(Debug, Deserialize)]
pub struct VatsimData {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub pilots: Vec<VatsimPilot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct General {
    pub update_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VatsimPilot {
    pub cid: u64,
    pub callsign: String,
    #[serde(default)]
    pub altitude: i64,
    #[serde(default)]
    pub groundspeed: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub flight_plan: Option<FlightPlan>,
}

#[derive(Debug, Deserialize)]
pub struct FlightPlan {
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub route: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PilotLookup {
    Cid(u64),
    Callsign(String),
}

impl PilotLookup {
    /// A numeric `cid` wins over `callsign`. Returns `None` if neither is
    /// usable.
    pub fn from_query(cid: Option<&str>, callsign: Option<&str>) -> Option<Self> {
        let cid = cid
            .map(str::trim)
            .filter(|cid| !cid.is_empty() && cid.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|cid| cid.parse().ok());
        if let Some(cid) = cid {
            return Some(Self::Cid(cid));
        }

        callsign
            .map(str::trim)
            .filter(|callsign| !callsign.is_empty())
            .map(|callsign| Self::Callsign(callsign.to_ascii_uppercase()))
    }

    fn matches(&self, pilot: &VatsimPilot) -> bool {
        match self {
            Self::Cid(cid) => pilot.cid == *cid,
            Self::Callsign(callsign) => pilot.callsign.eq_ignore_ascii_case(callsign),
        }
    }
}

pub async fn fetch_data() -> Result<VatsimData, Error> {
    tracing::debug!(url = VATSIM_DATA_URL, "fetching vatsim data");

    Ok(http_client()
        .get(VATSIM_DATA_URL)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

pub fn find_pilot(data: &VatsimData, lookup: &PilotLookup) -> Option<Pilot> {
    let pilot = data.pilots.iter().find(|pilot| lookup.matches(pilot))?;
    let flight_plan = pilot.flight_plan.as_ref();

    Some(Pilot {
        cid: pilot.cid,
        callsign: pilot.callsign.clone(),
        altitude: pilot.altitude,
        groundspeed: pilot.groundspeed,
        lat: pilot.latitude,
        lon: pilot.longitude,
        dep: flight_plan.and_then(|plan| plan.departure.clone()),
        arr: flight_plan.and_then(|plan| plan.arrival.clone()),
        route: flight_plan.and_then(|plan| plan.route.clone()),
    })
}
