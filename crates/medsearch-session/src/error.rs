use medsearch_api::ApiError;
use medsearch_common::MedsearchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("A search is already running on this thread")]
    Busy,

    #[error("Session store error: {0}")]
    Store(#[from] MedsearchError),

    #[error("No paper selected for chat")]
    NoPaper,

    #[error("Cannot send message: source text URL is missing")]
    MissingPaperText,
}
