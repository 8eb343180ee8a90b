use std::fmt;

/// Internal exchange properties.
///
/// These are looked up on every routing step, so they live in a fixed array on
/// the exchange instead of the user property map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ExchangePropertyKey {
    AggregatedCompletedBy,
    AggregatedCorrelationKey,
    AggregatedSize,
    BatchComplete,
    BatchIndex,
    BatchSize,
    CharsetName,
    CorrelationId,
    DuplicateMessage,
    ErrorHandlerBridge,
    ExceptionCaught,
    FailureEndpoint,
    FailureRouteId,
    FilterMatched,
    LoopIndex,
    LoopSize,
    MulticastComplete,
    MulticastIndex,
    RecipientListEndpoint,
    RedeliveryCounter,
    SplitComplete,
    SplitIndex,
    SplitSize,
    ToEndpoint,
    UnitOfWorkExhausted,
}

impl ExchangePropertyKey {
    /// Number of keys, the size of the backing array
    pub const COUNT: usize = 25;

    pub const ALL: [ExchangePropertyKey; Self::COUNT] = [
        Self::AggregatedCompletedBy,
        Self::AggregatedCorrelationKey,
        Self::AggregatedSize,
        Self::BatchComplete,
        Self::BatchIndex,
        Self::BatchSize,
        Self::CharsetName,
        Self::CorrelationId,
        Self::DuplicateMessage,
        Self::ErrorHandlerBridge,
        Self::ExceptionCaught,
        Self::FailureEndpoint,
        Self::FailureRouteId,
        Self::FilterMatched,
        Self::LoopIndex,
        Self::LoopSize,
        Self::MulticastComplete,
        Self::MulticastIndex,
        Self::RecipientListEndpoint,
        Self::RedeliveryCounter,
        Self::SplitComplete,
        Self::SplitIndex,
        Self::SplitSize,
        Self::ToEndpoint,
        Self::UnitOfWorkExhausted,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The property name as seen by users
    pub fn as_key(self) -> &'static str {
        match self {
            Self::AggregatedCompletedBy => "ConduitAggregatedCompletedBy",
            Self::AggregatedCorrelationKey => "ConduitAggregatedCorrelationKey",
            Self::AggregatedSize => "ConduitAggregatedSize",
            Self::BatchComplete => "ConduitBatchComplete",
            Self::BatchIndex => "ConduitBatchIndex",
            Self::BatchSize => "ConduitBatchSize",
            Self::CharsetName => "ConduitCharsetName",
            Self::CorrelationId => "ConduitCorrelationId",
            Self::DuplicateMessage => "ConduitDuplicateMessage",
            Self::ErrorHandlerBridge => "ConduitErrorHandlerBridge",
            Self::ExceptionCaught => "ConduitExceptionCaught",
            Self::FailureEndpoint => "ConduitFailureEndpoint",
            Self::FailureRouteId => "ConduitFailureRouteId",
            Self::FilterMatched => "ConduitFilterMatched",
            Self::LoopIndex => "ConduitLoopIndex",
            Self::LoopSize => "ConduitLoopSize",
            Self::MulticastComplete => "ConduitMulticastComplete",
            Self::MulticastIndex => "ConduitMulticastIndex",
            Self::RecipientListEndpoint => "ConduitRecipientListEndpoint",
            Self::RedeliveryCounter => "ConduitRedeliveryCounter",
            Self::SplitComplete => "ConduitSplitComplete",
            Self::SplitIndex => "ConduitSplitIndex",
            Self::SplitSize => "ConduitSplitSize",
            Self::ToEndpoint => "ConduitToEndpoint",
            Self::UnitOfWorkExhausted => "ConduitUnitOfWorkExhausted",
        }
    }

    /// Resolve a property name to an internal key
    pub fn from_key(name: &str) -> Option<Self> {
        if !name.starts_with("Conduit") {
            return None;
        }
        Self::ALL.iter().copied().find(|key| key.as_key() == name)
    }
}

impl fmt::Display for ExchangePropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_table_order() {
        for (i, key) in ExchangePropertyKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_key_round_trip() {
        for key in ExchangePropertyKey::ALL {
            assert_eq!(ExchangePropertyKey::from_key(key.as_key()), Some(key));
        }
        assert_eq!(ExchangePropertyKey::from_key("CorrelationId"), None);
        assert_eq!(ExchangePropertyKey::from_key("ConduitUnknown"), None);
    }
}
