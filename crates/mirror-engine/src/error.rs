use mirror_common::EntityId;
use mirror_store::StoreError;

/// Standard RPC status a terminal condition maps to. The transport layer
/// translates these onto its own wire statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    Internal,
    Unavailable,
    ResourceExhausted,
    Cancelled,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::NotFound => "not_found",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::Cancelled => "cancelled",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SubscribeError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("topic {0} does not exist")]
    TopicNotFound(EntityId),
    // A live gap that storage could not reconcile.
    #[error("missing messages between sequence {last} and {current}")]
    MissingMessages { last: u64, current: u64 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage failure: {0}")]
    Internal(String),
    // The subscriber fell behind the live channel capacity.
    #[error("subscriber lagged {0} messages behind the live stream")]
    Overflow(u64),
    #[error("subscription cancelled")]
    Cancelled,
}

impl SubscribeError {
    pub fn code(&self) -> StatusCode {
        match self {
            SubscribeError::InvalidArgument(_) => StatusCode::InvalidArgument,
            SubscribeError::TopicNotFound(_) => StatusCode::NotFound,
            SubscribeError::MissingMessages { .. } => StatusCode::Internal,
            SubscribeError::Unavailable(_) => StatusCode::Unavailable,
            SubscribeError::Internal(_) => StatusCode::Internal,
            SubscribeError::Overflow(_) => StatusCode::ResourceExhausted,
            SubscribeError::Cancelled => StatusCode::Cancelled,
        }
    }
}

impl From<StoreError> for SubscribeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => SubscribeError::Unavailable(reason),
            StoreError::Internal(reason) => SubscribeError::Internal(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_expected_status_codes() {
        let cases = [
            (
                SubscribeError::InvalidArgument("bad".into()),
                StatusCode::InvalidArgument,
            ),
            (
                SubscribeError::TopicNotFound(EntityId::new(999)),
                StatusCode::NotFound,
            ),
            (
                SubscribeError::MissingMessages { last: 4, current: 8 },
                StatusCode::Internal,
            ),
            (
                SubscribeError::Unavailable("down".into()),
                StatusCode::Unavailable,
            ),
            (SubscribeError::Internal("bug".into()), StatusCode::Internal),
            (SubscribeError::Overflow(12), StatusCode::ResourceExhausted),
            (SubscribeError::Cancelled, StatusCode::Cancelled),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn store_errors_convert_by_class() {
        let err: SubscribeError = StoreError::Unavailable("pool timeout".into()).into();
        assert_eq!(err.code(), StatusCode::Unavailable);
        let err: SubscribeError = StoreError::Internal("bad schema".into()).into();
        assert_eq!(err.code(), StatusCode::Internal);
    }

    #[test]
    fn missing_messages_names_the_gap() {
        let err = SubscribeError::MissingMessages { last: 4, current: 8 };
        assert_eq!(err.to_string(), "missing messages between sequence 4 and 8");
    }
}
