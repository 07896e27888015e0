/// Wire-level result code returned from the public Session/Storage API.
/// Internal crates raise richer `thiserror` enums and convert down to this
/// at the boundary (see `tsdb-storage::Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    BadInput,
    Overflow,
    IoError,
    Closed,
    NotPermitted,
    Access,
    QueryParseError,
    Internal,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
