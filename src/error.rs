use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy for one summarization session. Every variant maps 1:1
/// onto a `Failed` session state; nothing is folded together so the front
/// end can branch on the kind without string matching.
#[derive(Debug, Error)]
pub enum CatchupError {
    #[error("no chat matches `{0}`; try the exact group name")]
    NotFound(String),
    #[error("multiple chats match `{0}` equally well; use a more specific name")]
    Ambiguous(String),
    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("no messages to summarize")]
    EmptyInput,
    #[error("generation service rejected the credential: {0}")]
    Auth(String),
    #[error("generation service rate limit hit: {0}")]
    RateLimited(String),
    #[error("generation request timed out after {0}s")]
    Timeout(u64),
    #[error("generation service error: {0}")]
    Service(String),
    #[error("model reply contained no bullet summary")]
    UnparseableResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    StoreUnavailable,
    EmptyInput,
    Auth,
    RateLimited,
    Timeout,
    Service,
    UnparseableResponse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Ambiguous => "ambiguous",
            Self::StoreUnavailable => "store_unavailable",
            Self::EmptyInput => "empty_input",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Service => "service",
            Self::UnparseableResponse => "unparseable_response",
        }
    }
}

impl CatchupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Ambiguous(_) => ErrorKind::Ambiguous,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Service(_) => ErrorKind::Service,
            Self::UnparseableResponse => ErrorKind::UnparseableResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_stable_code() {
        let kinds = [
            CatchupError::NotFound("x".into()).kind(),
            CatchupError::Ambiguous("x".into()).kind(),
            CatchupError::StoreUnavailable("x".into()).kind(),
            CatchupError::EmptyInput.kind(),
            CatchupError::Auth("x".into()).kind(),
            CatchupError::RateLimited("x".into()).kind(),
            CatchupError::Timeout(45).kind(),
            CatchupError::Service("x".into()).kind(),
            CatchupError::UnparseableResponse.kind(),
        ];
        let mut codes: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
