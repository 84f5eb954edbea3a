//! METAR and TAF from the NOAA text files.

use std::collections::BTreeMap;

use efb_api_types::wx::StationReport;
use futures_util::future::join_all;

use crate::util::http_client;

const METAR_URL: &str = "https://tgftp.nws.noaa.gov/data/observations/metar/stations";
const TAF_URL: &str = "https://tgftp.nws.noaa.gov/data/forecasts/taf/stations";

pub const MAX_STATIONS: usize = 5;

/// Splits a station list on commas and whitespace. Only 4-letter ICAO codes
/// are kept, upper-cased and without duplicates, at most [`MAX_STATIONS`].
pub fn parse_stations(input: &str) -> Vec<String> {
    let mut stations: Vec<String> = Vec::new();

    for station in input.split(|c: char| c == ',' || c.is_whitespace()) {
        let station = station.trim().to_ascii_uppercase();
        if station.len() == 4
            && station.bytes().all(|b| b.is_ascii_uppercase())
            && !stations.contains(&station)
        {
            stations.push(station);
        }
    }

    stations.truncate(MAX_STATIONS);
    stations
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub time: Option<String>,
    pub body: Option<String>,
}

/// NOAA files start with an issue time line when there's more than one line.
/// A TAF continues over several lines, they are kept.
pub fn parse_report(text: &str) -> Report {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match lines.as_slice() {
        [] => Report::default(),
        [body] => {
            Report {
                time: None,
                body: Some(body.to_string()),
            }
        }
        [time, body @ ..] => {
            Report {
                time: Some(time.to_string()),
                body: Some(body.join("\n")),
            }
        }
    }
}

/// Any failure is a missing report.
async fn fetch_text(url: &str) -> Option<String> {
    let result = async {
        http_client()
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
    .await;

    match result {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(error) => {
            tracing::debug!(url, %error, "weather fetch failed");
            None
        }
    }
}

pub async fn fetch_station(icao: &str) -> StationReport {
    let metar_url = format!("{METAR_URL}/{icao}.TXT");
    let taf_url = format!("{TAF_URL}/{icao}.TXT");
    let (metar, taf) = tokio::join!(fetch_text(&metar_url), fetch_text(&taf_url));

    let metar = metar.as_deref().map(parse_report).unwrap_or_default();
    let taf = taf.as_deref().map(parse_report).unwrap_or_default();

    StationReport {
        metar: metar.body,
        metar_time: metar.time,
        taf: taf.body,
        taf_time: taf.time,
    }
}

pub async fn fetch_stations(stations: &[String]) -> BTreeMap<String, StationReport> {
    let reports = join_all(stations.iter().map(|icao| fetch_station(icao))).await;
    stations.iter().cloned().zip(reports).collect()
}
