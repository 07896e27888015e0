#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("shard buffers are full")]
    WouldStall,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shard index {0} out of range")]
    BadShard(usize),
}

impl From<&WalError> for tsdb_proto::Status {
    fn from(e: &WalError) -> Self {
        match e {
            WalError::WouldStall => tsdb_proto::Status::Overflow,
            WalError::Io(_) => tsdb_proto::Status::IoError,
            WalError::BadShard(_) => tsdb_proto::Status::Internal,
        }
    }
}
