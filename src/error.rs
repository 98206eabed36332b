use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::nutrition::dto::ErrorBody;
use crate::sources::SourceError;

#[derive(Error, Debug)]
pub enum NutritionError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("The search term doesn't appear to be a food item")]
    NotFood,

    #[error("No food products found")]
    NotFound,

    #[error("Failed to fetch nutrition data: {0}")]
    Upstream(SourceError),

    #[error("{0}")]
    Unsupported(SourceError),
}

impl From<SourceError> for NutritionError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unsupported { .. } => Self::Unsupported(e),
            other => Self::Upstream(other),
        }
    }
}

impl NutritionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::NotFood => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl IntoResponse for NutritionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Upstream(e) = &self {
            error!(error = %e, "upstream nutrition source failed");
        }

        let body = ErrorBody {
            // Upstream details stay in the logs.
            error: match &self {
                Self::Upstream(_) => "Failed to fetch nutrition data".to_string(),
                other => other.to_string(),
            },
            is_food: matches!(self, Self::NotFood).then_some(false),
            not_found: matches!(self, Self::NotFound).then_some(true),
        };

        (status, Json(body)).into_response()
    }
}
