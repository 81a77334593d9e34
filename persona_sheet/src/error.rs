//! Errors raised while reading persona cards.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("persona card is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persona card is missing required field '{0}'")]
    MissingField(&'static str),
}
