#[derive(Debug, thiserror::Error)]
pub enum QueryParserError {
    #[error("malformed query json at line {line}, column {column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown order-by '{0}', expected 'time' or 'series'")]
    UnknownOrderBy(String),

    #[error("aggregate operator requires a preceding group-by")]
    MissingGroupBy,

    #[error("group-by-time step must be positive, got {0}")]
    InvalidStep(u64),
}

impl From<serde_json::Error> for QueryParserError {
    fn from(e: serde_json::Error) -> Self {
        QueryParserError::Malformed {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}

impl From<&QueryParserError> for tsdb_proto::Status {
    fn from(_: &QueryParserError) -> Self {
        tsdb_proto::Status::QueryParseError
    }
}
