use axum::{
    Json,
    extract::{
        Query,
        State,
        rejection::{
            JsonRejection,
            QueryRejection,
        },
    },
};
use efb_api_types::psx::{
    AirRequest,
    AirResponse,
    DoorsAction,
    DoorsRequest,
    DoorsResponse,
    FuelAction,
    FuelRequest,
    FuelResponse,
    PingQuery,
    PingResponse,
    PowerRequest,
    PowerResponse,
    PushbackAction,
    PushbackRequest,
    PushbackResponse,
    RegisterWritten,
    SendRequest,
    SendResponse,
    StatusResponse,
    WeightAndBalanceRequest,
    WeightAndBalanceResponse,
};
use psx_link::{
    Endpoint,
    Transport,
    WireLine,
    composer::{
        PowerUpdate,
        Weight,
    },
    pushback::{
        DEFAULT_SESSION_KEY,
        Direction,
        Heading,
    },
    registers::AirState,
};

use crate::{
    api::{
        Api,
        ApiError,
    },
    config::MAX_FUEL_KG,
};

impl Api {
    /// The configured transport, pointed at another PSX if asked to.
    fn transport_for(&self, host: Option<String>, port: Option<u16>) -> Result<Transport, ApiError> {
        let default = &self.config().psx;
        let host = match host {
            Some(host) => host.trim().to_owned(),
            None => default.host.clone(),
        };
        if host.is_empty() {
            return Err(ApiError::validation("Invalid host/port"));
        }
        let port = port.unwrap_or(default.port);

        Ok(self.psx.sink().with_endpoint(Endpoint::new(host, port)))
    }
}

pub async fn get_ping(
    State(api): State<Api>,
    query: Result<Query<PingQuery>, QueryRejection>,
) -> Result<Json<PingResponse>, ApiError> {
    let Query(query) = query?;
    let transport = api.transport_for(query.host, query.port)?;

    transport.ping().await?;

    let endpoint = transport.endpoint();
    Ok(Json(PingResponse {
        ok: true,
        host: endpoint.host.clone(),
        port: endpoint.port,
    }))
}

pub async fn post_send(
    State(api): State<Api>,
    request: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(request) = request?;
    let transport = api.transport_for(request.host, request.port)?;

    let lines: Vec<WireLine> = request
        .lines
        .iter()
        .filter_map(|line| WireLine::from_raw(line))
        .collect();
    if lines.is_empty() {
        return Err(ApiError::validation("No lines"));
    }

    let response = transport.send_lines(&lines).await?;

    Ok(Json(SendResponse { ok: true, response }))
}

pub async fn get_status(State(api): State<Api>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ok: true,
        status: api.psx.shadow().snapshot(),
    })
}

pub async fn post_doors(
    State(api): State<Api>,
    request: Result<Json<DoorsRequest>, JsonRejection>,
) -> Result<Json<DoorsResponse>, ApiError> {
    let Json(request) = request?;

    let response = match request.action {
        DoorsAction::Set => {
            let outcome = api
                .psx
                .set_doors(request.open.as_ref(), request.manual.as_ref(), request.verify)
                .await?;
            let written = |bits: u32| RegisterWritten { ok: true, bits };

            DoorsResponse {
                ok: true,
                open: outcome.written.open.map(written),
                manual: outcome.written.manual.map(written),
                verified: outcome.verified,
            }
        }
        DoorsAction::TakeControl => {
            api.psx.take_door_control().await?;
            DoorsResponse {
                ok: true,
                open: None,
                manual: None,
                verified: None,
            }
        }
    };

    Ok(Json(response))
}

pub async fn post_power(
    State(api): State<Api>,
    request: Result<Json<PowerRequest>, JsonRejection>,
) -> Result<Json<PowerResponse>, ApiError> {
    let Json(request) = request?;

    let update = PowerUpdate {
        ext1: request.ext1,
        ext2: request.ext2,
        ssb: request.ssb,
    };
    let write = api
        .psx
        .set_power(request.base, &update, request.verify)
        .await?;

    Ok(Json(PowerResponse {
        ok: true,
        base: write.base,
        next: write.next,
        verified: write.verified,
    }))
}

pub async fn post_air(
    State(api): State<Api>,
    request: Result<Json<AirRequest>, JsonRejection>,
) -> Result<Json<AirResponse>, ApiError> {
    let Json(request) = request?;

    let bits = api
        .psx
        .set_air(AirState {
            bleed: request.bleed,
            aircon: request.aircon,
        })
        .await?;

    Ok(Json(AirResponse { ok: true, bits }))
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::validation(message))
}

pub async fn post_fuel(
    State(api): State<Api>,
    request: Result<Json<FuelRequest>, JsonRejection>,
) -> Result<Json<FuelResponse>, ApiError> {
    let Json(request) = request?;

    let response = match request.action {
        FuelAction::Prefuel => {
            let entry = required(request.entry, "entry required")?;
            api.psx.prefuel(&entry).await?;
            FuelResponse {
                ok: true,
                ..Default::default()
            }
        }
        FuelAction::Tanks => {
            let payload = required(request.payload, "payload required")?;
            api.psx.set_fuel_tanks(&payload).await?;
            FuelResponse {
                ok: true,
                ..Default::default()
            }
        }
        FuelAction::Preselect => {
            let payload = required(request.payload, "payload required")?;
            api.psx.set_fuel_preselect(&payload).await?;
            FuelResponse {
                ok: true,
                ..Default::default()
            }
        }
        FuelAction::Total => {
            let total_kg = request
                .total_kg
                .ok_or_else(|| ApiError::validation("totalKg must be > 0"))?;
            if total_kg > MAX_FUEL_KG {
                return Err(ApiError::validation(format!(
                    "totalKg must be at most {MAX_FUEL_KG}"
                )));
            }

            let payload = api.psx.set_fuel_total(total_kg).await?;
            FuelResponse {
                ok: true,
                total_kg: Some(total_kg.round()),
                total_lbs: Some(payload.total_lbs),
                tanks_payload: Some(payload.tanks),
                preselect_payload: Some(payload.preselect),
            }
        }
    };

    Ok(Json(response))
}

pub async fn post_weight_and_balance(
    State(api): State<Api>,
    request: Result<Json<WeightAndBalanceRequest>, JsonRejection>,
) -> Result<Json<WeightAndBalanceResponse>, ApiError> {
    let Json(request) = request?;

    // pounds win if both are given
    let weight = request
        .zfw_lbs
        .map(Weight::Pounds)
        .or(request.zfw_kg.map(Weight::Kilograms))
        .ok_or_else(|| ApiError::validation("Provide zfwLbs or zfwKg as a number"))?;

    let zfw_lbs = api.psx.set_zero_fuel_weight(weight).await?;

    Ok(Json(WeightAndBalanceResponse { ok: true, zfw_lbs }))
}

pub async fn post_pushback(
    State(api): State<Api>,
    request: Result<Json<PushbackRequest>, JsonRejection>,
) -> Result<Json<PushbackResponse>, ApiError> {
    let Json(request) = request?;

    let key = request
        .key
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_owned());
    let heading = request
        .heading
        .ok_or_else(|| ApiError::validation("heading must be a number (degrees)"))
        .and_then(|heading| Ok(Heading::from_degrees(heading)?))?;
    let direction = || -> Result<Direction, ApiError> {
        request
            .direction
            .ok_or_else(|| ApiError::validation("direction must be 'forward' or 'back'"))
    };

    let mut hold = None;
    let mut released = None;

    match request.action {
        PushbackAction::Start => {
            api.pushback.start(&key, direction()?, heading).await?;
        }
        PushbackAction::Turn => {
            api.pushback
                .turn(&key, direction()?, heading, request.hold)
                .await?;
            hold = Some(request.hold);
        }
        PushbackAction::Stop => {
            api.pushback.stop(&key, heading).await?;
        }
        PushbackAction::Release => {
            released = Some(api.pushback.release(&key));
        }
    }

    Ok(Json(PushbackResponse {
        ok: true,
        session: api.pushback.state(&key),
        key,
        hold,
        released,
    }))
}
