pub mod psx;
pub mod vatsim;
pub mod wx;

use std::sync::Arc;

use axum::{
    Json,
    Router,
    extract::rejection::{
        JsonRejection,
        QueryRejection,
    },
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
    routing,
};
use chrono::Utc;
use efb_api_types::{
    ErrorResponse,
    HealthResponse,
};
use psx_link::{
    DecodeError,
    PsxClient,
    RegisterShadow,
    Sequencer,
    StatusPoller,
    Transport,
    TransportError,
    ValidationError,
};
use tokio::net::{
    TcpListener,
    ToSocketAddrs,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct Api {
    pub psx: PsxClient<Transport>,
    pub pushback: Sequencer<Transport>,
    pub shutdown: CancellationToken,
    config: Arc<Config>,
}

impl Api {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        let transport = config.transport(&shutdown);

        let pushback = Sequencer::new(transport.clone())
            .with_hold_interval(config.hold_interval)
            .with_shutdown(shutdown.clone());

        Self {
            psx: PsxClient::new(transport, RegisterShadow::default()),
            pushback,
            shutdown,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Router<()> {
        Router::new()
            .route("/health", routing::get(get_health))
            .nest(
                "/psx",
                Router::new()
                    .route("/ping", routing::get(psx::get_ping))
                    .route("/send", routing::post(psx::post_send))
                    .route("/status", routing::get(psx::get_status))
                    .route("/doors", routing::post(psx::post_doors))
                    .route("/power", routing::post(psx::post_power))
                    .route("/air", routing::post(psx::post_air))
                    .route("/fuel", routing::post(psx::post_fuel))
                    .route("/wb", routing::post(psx::post_weight_and_balance))
                    .route("/pushback", routing::post(psx::post_pushback)),
            )
            .route("/vatsim/pilot", routing::get(vatsim::get_pilot))
            .route("/wx/metar-taf", routing::get(wx::get_metar_taf))
            .fallback(not_found)
            .with_state(self.clone())
    }

    /// Serves the API and polls the PSX status until [`Api::shutdown`] is
    /// cancelled. Hold loops are cancelled on the way out.
    pub async fn serve(&self, listen_addresses: impl ToSocketAddrs) -> Result<(), crate::Error> {
        let tcp_listener = TcpListener::bind(listen_addresses).await?;
        tracing::info!(address = %tcp_listener.local_addr()?, psx = %self.config.psx, "listening");

        let poller = StatusPoller::spawn(
            self.psx.sink().clone(),
            self.psx.shadow().clone(),
            self.config.poll_interval,
            &self.shutdown,
        );

        let shutdown = self.shutdown.clone();
        let result = axum::serve(tcp_listener, self.router().into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await;

        self.pushback.shutdown();
        poller.stop().await;
        tracing::info!("shut down");

        result?;
        Ok(())
    }
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        ts: Utc::now().timestamp_millis(),
    })
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Errors as seen by the UI.
///
/// The UI shows the message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn validation(message: impl ToString) -> Self {
        Self::Validation(message.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Transport(_) | Self::Decode(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<psx_link::Error> for ApiError {
    fn from(value: psx_link::Error) -> Self {
        match value {
            psx_link::Error::Transport(error) => error.into(),
            psx_link::Error::Decode(error) => error.into(),
            psx_link::Error::Validation(error) => error.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        Self::validation(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<crate::Error> for ApiError {
    fn from(value: crate::Error) -> Self {
        match value {
            crate::Error::Http(error) => Self::Upstream(error.to_string()),
            crate::Error::Psx(error) => error.into(),
            crate::Error::Io(error) => Self::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::warn!(error = %self, %status_code, "request failed");
        }
        else {
            tracing::debug!(error = %self, %status_code, "request rejected");
        }
        (status_code, Json(ErrorResponse::new(self))).into_response()
    }
}
