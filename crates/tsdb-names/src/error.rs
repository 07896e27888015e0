#[derive(Debug, Clone, thiserror::Error)]
pub enum NamesError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("no series with id {0}")]
    NotFound(u64),
}

impl From<&NamesError> for tsdb_proto::Status {
    fn from(e: &NamesError) -> Self {
        match e {
            NamesError::BadInput(_) => tsdb_proto::Status::BadInput,
            NamesError::NotFound(_) => tsdb_proto::Status::NotFound,
        }
    }
}
