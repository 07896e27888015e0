use tsdb_proto::Status;

/// Rust-native error type carrying context; converted to the coarser
/// [`Status`] at the public API boundary (SPEC_FULL §6), the way the
/// teacher keeps `ConnectError` internal to `journal-client` while callers
/// only ever see a `tonic::Status`-equivalent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage is closed")]
    Closed,

    #[error("engine is in a degraded state after a background failure")]
    Degraded,

    #[error(transparent)]
    Names(#[from] tsdb_names::NamesError),

    #[error(transparent)]
    Wal(#[from] tsdb_wal::WalError),

    #[error(transparent)]
    Query(#[from] tsdb_query::QueryParserError),

    #[error("no series with id {0}")]
    NotFound(u64),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Metadata(String),
}

impl From<&Error> for Status {
    fn from(e: &Error) -> Self {
        match e {
            Error::Closed => Status::Closed,
            Error::Degraded => Status::IoError,
            Error::Names(e) => e.into(),
            Error::Wal(e) => e.into(),
            Error::Query(_) => Status::QueryParseError,
            Error::NotFound(_) => Status::NotFound,
            Error::Io(_) => Status::IoError,
            Error::Metadata(_) => Status::IoError,
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        Status::from(&e)
    }
}
