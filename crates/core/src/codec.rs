//! Codec boundary between resource state and stored records.

use crate::error::{Error, Result};
use crate::resource::{ResourceRecord, ResourceState};
use crate::scope::ScopeChain;
use serde_json::Value;

/// Converts resource state to and from its stored record form.
///
/// Implementations must be pure: the store calls them outside any
/// transaction and relies on them having no side effects.
pub trait ResourceCodec: Send + Sync + 'static {
    /// Encode `state` for storage within `scope`.
    fn encode(&self, scope: &ScopeChain, state: &ResourceState) -> Result<ResourceRecord>;

    /// Decode a stored record read from `scope`.
    fn decode(&self, scope: &ScopeChain, record: ResourceRecord) -> Result<ResourceState>;
}

/// Codec that stores payload columns as compact JSON text.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn encode_value(field: &str, value: &Value) -> Result<String> {
        serde_json::to_string(value)
            .map_err(|e| Error::Serialization(format!("failed to encode {field}: {e}")))
    }

    fn decode_value(field: &str, text: &str) -> Result<Value> {
        serde_json::from_str(text)
            .map_err(|e| Error::Serialization(format!("failed to decode {field}: {e}")))
    }
}

impl ResourceCodec for JsonCodec {
    fn encode(&self, _scope: &ScopeChain, state: &ResourceState) -> Result<ResourceRecord> {
        Ok(ResourceRecord {
            id: state.id.clone(),
            status: state.status,
            kind: state.kind.clone(),
            fqn: state.fqn.clone(),
            seq: state.seq,
            data: Self::encode_value("data", &state.data)?,
            props: Self::encode_value("props", &state.props)?,
            old_props: state
                .old_props
                .as_ref()
                .map(|v| Self::encode_value("oldProps", v))
                .transpose()?,
            output: Self::encode_value("output", &state.output)?,
        })
    }

    fn decode(&self, _scope: &ScopeChain, record: ResourceRecord) -> Result<ResourceState> {
        Ok(ResourceState {
            data: Self::decode_value("data", &record.data)?,
            props: Self::decode_value("props", &record.props)?,
            old_props: record
                .old_props
                .as_deref()
                .map(|v| Self::decode_value("oldProps", v))
                .transpose()?,
            output: Self::decode_value("output", &record.output)?,
            id: record.id,
            status: record.status,
            kind: record.kind,
            fqn: record.fqn,
            seq: record.seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceStatus;
    use serde_json::json;

    fn scope() -> ScopeChain {
        ScopeChain::new(["app", "dev"]).unwrap()
    }

    #[test]
    fn test_encode_writes_compact_json() {
        let state = ResourceState {
            id: "queue".to_string(),
            status: ResourceStatus::Creating,
            kind: "queue::Queue".to_string(),
            fqn: "app/dev/queue".to_string(),
            seq: 3,
            data: json!({"retries": 2}),
            props: json!({"name": "jobs"}),
            old_props: Some(json!({"name": "old-jobs"})),
            output: json!(null),
        };

        let record = JsonCodec.encode(&scope(), &state).unwrap();
        assert_eq!(record.data, r#"{"retries":2}"#);
        assert_eq!(record.old_props.as_deref(), Some(r#"{"name":"old-jobs"}"#));
        assert_eq!(record.output, "null");
    }

    #[test]
    fn test_decode_rejects_corrupt_payload() {
        let record = ResourceRecord {
            id: "queue".to_string(),
            status: ResourceStatus::Created,
            kind: "queue::Queue".to_string(),
            fqn: "app/dev/queue".to_string(),
            seq: 1,
            data: "{".to_string(),
            props: "{}".to_string(),
            old_props: None,
            output: "{}".to_string(),
        };

        let err = JsonCodec.decode(&scope(), record).unwrap_err();
        assert!(err.to_string().contains("failed to decode data"));
    }
}
