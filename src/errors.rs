use crate::retrieval::RetrievalError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}
