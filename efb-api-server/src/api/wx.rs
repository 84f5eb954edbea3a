use axum::{
    Json,
    extract::{
        Query,
        rejection::QueryRejection,
    },
    http::header,
    response::IntoResponse,
};
use efb_api_types::wx::{
    MetarTafQuery,
    MetarTafResponse,
};

use crate::{
    api::ApiError,
    services::weather::{
        fetch_stations,
        parse_stations,
    },
};

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

pub async fn get_metar_taf(
    query: Result<Query<MetarTafQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let stations = parse_stations(query.stations.as_deref().unwrap_or_default());
    if stations.is_empty() {
        return Err(ApiError::validation("Provide ?stations=AAAA,BBBB"));
    }

    let data = fetch_stations(&stations).await;

    Ok((
        [(header::CACHE_CONTROL, NO_STORE)],
        Json(MetarTafResponse { ok: true, data }),
    ))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::tests::TestServer,
        config::Config,
    };

    #[tokio::test]
    async fn stations_are_required() {
        let server = TestServer::spawn(Config::default()).await;

        let (status, body) = server.get("/wx/metar-taf?stations=JFK,12AB").await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Provide ?stations=AAAA,BBBB");
    }
}
