use axum::{
    Json,
    extract::{
        Query,
        rejection::QueryRejection,
    },
};
use efb_api_types::vatsim::{
    PilotQuery,
    PilotResponse,
};

use crate::{
    api::ApiError,
    services::vatsim::{
        PilotLookup,
        fetch_data,
        find_pilot,
    },
};

pub async fn get_pilot(
    query: Result<Query<PilotQuery>, QueryRejection>,
) -> Result<Json<PilotResponse>, ApiError> {
    let Query(query) = query?;
    let lookup = PilotLookup::from_query(query.cid.as_deref(), query.callsign.as_deref())
        .ok_or_else(|| ApiError::validation("Missing ?cid or ?callsign"))?;

    let data = fetch_data().await?;
    let pilot = find_pilot(&data, &lookup);

    Ok(Json(PilotResponse {
        ok: true,
        online: pilot.is_some(),
        pilot,
        last_update: data.general.update_timestamp,
    }))
}
