use std::fmt::{Display, Formatter};

use fundex_core::{EnvelopeMeta, ProviderId, ValidationError};
use uuid::Uuid;

/// Request identifier (UUID v4), one per CLI invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Command metadata collected before the envelope is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub request_id: RequestId,
    pub source_chain: Vec<ProviderId>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(source_chain: Vec<ProviderId>, latency_ms: u64, cache_hit: bool) -> Self {
        Self {
            request_id: RequestId::new_v4(),
            source_chain,
            latency_ms,
            cache_hit,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn into_envelope_meta(self) -> Result<EnvelopeMeta, ValidationError> {
        let mut envelope_meta = EnvelopeMeta::new(
            self.request_id.to_string(),
            self.source_chain,
            self.latency_ms,
            self.cache_hit,
        )?;

        for warning in self.warnings {
            envelope_meta.push_warning(warning);
        }

        Ok(envelope_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_uuid_v4() {
        let request_id = RequestId::new_v4();
        assert_eq!(request_id.0.get_version_num(), 4);
        assert_eq!(request_id.to_string().len(), 36);
    }

    #[test]
    fn envelope_meta_keeps_chain_and_warnings() {
        let mut metadata = Metadata::new(vec![ProviderId::Yahoo, ProviderId::Eastmoney], 42, false);
        metadata.push_warning("resolved by 'eastmoney' after 1 failed attempt(s)");
        let request_id = metadata.request_id.to_string();

        let meta = metadata.into_envelope_meta().expect("valid metadata");
        assert_eq!(meta.request_id, request_id);
        assert_eq!(meta.source_chain, vec![ProviderId::Yahoo, ProviderId::Eastmoney]);
        assert_eq!(meta.latency_ms, 42);
        assert_eq!(meta.warnings.len(), 1);
    }

    #[test]
    fn empty_chain_is_allowed() {
        let meta = Metadata::new(Vec::new(), 0, false)
            .into_envelope_meta()
            .expect("commands without providers still get an envelope");
        assert!(meta.source_chain.is_empty());
    }
}
