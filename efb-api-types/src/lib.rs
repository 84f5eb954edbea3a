pub mod psx;
pub mod vatsim;
pub mod wx;

use serde::{
    Deserialize,
    Serialize,
};

/// Body of every failed request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: error.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    /// Unix timestamp in milliseconds.
    pub ts: i64,
}
