// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Normalization of submitted evidence into an [`EvidenceEnvelope`]

mod repair;

pub use repair::quote_bare_object_keys;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Envelope normalization error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The payload is not parseable, even after key repair
    #[error("unparseable evidence: {0}")]
    Parse(String),
    /// Required fields are missing, empty or of the wrong type
    #[error("missing or invalid field(s): {}", .fields.join(", "))]
    Validation {
        /// dotted paths of every offending field
        fields: Vec<String>,
    },
}

impl EnvelopeError {
    fn validation<I: IntoIterator<Item = &'static str>>(fields: I) -> Self {
        Self::Validation {
            fields: fields.into_iter().map(String::from).collect(),
        }
    }
}

/// Submitted evidence after validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEnvelope {
    /// origin of the attestation
    pub source: String,
    /// attestation protocol and version
    pub protocol: String,
    /// the attestation itself
    pub attestation: Attestation,
}

/// The `attestation` member of an envelope.
///
/// Only `report` is interpreted. The optional members are kept as submitted and
/// echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// base64 encoded evidence, exactly as submitted
    pub report: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub product: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub runtime: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub event_log: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub quote: Option<Value>,
}

/// Parse raw submitted bytes into a validated [`EvidenceEnvelope`].
///
/// Bare object keys are quoted first (see [`quote_bare_object_keys`]). All
/// missing or invalid required fields are reported together.
pub fn normalize(raw: &[u8]) -> Result<EvidenceEnvelope, EnvelopeError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| EnvelopeError::Parse(format!("evidence is not UTF-8: {e}")))?;
    let repaired = quote_bare_object_keys(text);

    let value: Value =
        serde_json::from_str(&repaired).map_err(|e| EnvelopeError::Parse(e.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(EnvelopeError::Parse(
            "evidence is not a JSON object".to_string(),
        ));
    };

    let source = take_non_empty_string(&mut root, "source");
    let protocol = take_non_empty_string(&mut root, "protocol");
    let attestation = match root.remove("attestation") {
        Some(Value::Object(attestation)) => Ok(attestation),
        _ => Err("attestation"),
    };
    let report = match &attestation {
        Ok(attestation) => match attestation.get("report") {
            Some(Value::String(report)) if !report.is_empty() => Ok(report.clone()),
            _ => Err("attestation.report"),
        },
        Err(_) => Err("attestation.report"),
    };

    match (source, protocol, attestation, report) {
        (Some(source), Some(protocol), Ok(mut attestation), Ok(report)) => Ok(EvidenceEnvelope {
            source,
            protocol,
            attestation: Attestation {
                report,
                product: attestation.remove("product"),
                data: attestation.remove("data"),
                runtime: attestation.remove("runtime"),
                event_log: attestation.remove("eventLog"),
                quote: attestation.remove("quote"),
            },
        }),
        (source, protocol, attestation, report) => {
            let mut missing = Vec::new();
            if source.is_none() {
                missing.push("source");
            }
            if protocol.is_none() {
                missing.push("protocol");
            }
            match (attestation, report) {
                (Err(field), _) | (Ok(_), Err(field)) => missing.push(field),
                _ => {}
            }
            Err(EnvelopeError::validation(missing))
        }
    }
}

fn take_non_empty_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(err: EnvelopeError) -> Vec<String> {
        match err {
            EnvelopeError::Validation { fields } => fields,
            e => panic!("expected validation error, got {e:?}"),
        }
    }

    #[test]
    fn parses_complete_envelope() {
        let raw = br#"{
            "source": "vm1",
            "protocol": "snp",
            "attestation": {
                "report": "AQID",
                "product": "Genoa",
                "eventLog": [{"pcr": 0}],
                "unknown": true
            }
        }"#;
        let envelope = normalize(raw).unwrap();
        assert_eq!(envelope.source, "vm1");
        assert_eq!(envelope.protocol, "snp");
        assert_eq!(envelope.attestation.report, "AQID");
        assert_eq!(envelope.attestation.product, Some(json!("Genoa")));
        assert_eq!(envelope.attestation.event_log, Some(json!([{"pcr": 0}])));
        assert_eq!(envelope.attestation.runtime, None);
        assert_eq!(envelope.attestation.quote, None);
    }

    #[test]
    fn repairs_bare_attestation_key() {
        let raw = br#"{"source":"vm1","protocol":"snp",attestation:{"report":"AQID"}}"#;
        let envelope = normalize(raw).unwrap();
        assert_eq!(envelope.attestation.report, "AQID");
    }

    #[test]
    fn report_is_kept_verbatim() {
        let raw = br#"{"source":"vm1","protocol":"snp","attestation":{"report":"a,b:{c}"}}"#;
        let envelope = normalize(raw).unwrap();
        assert_eq!(envelope.attestation.report, "a,b:{c}");
    }

    #[test]
    fn optional_null_is_preserved() {
        let raw = br#"{"source":"vm1","protocol":"snp","attestation":{"report":"AQID","data":null}}"#;
        let envelope = normalize(raw).unwrap();
        assert_eq!(envelope.attestation.data, Some(Value::Null));
        let echoed = serde_json::to_value(&envelope.attestation).unwrap();
        assert_eq!(echoed, json!({"report": "AQID", "data": null}));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            normalize(b"not json at all"),
            Err(EnvelopeError::Parse(_))
        ));
        assert!(matches!(normalize(b"[1, 2]"), Err(EnvelopeError::Parse(_))));
        assert!(matches!(
            normalize(&[0xff, 0xfe, b'{']),
            Err(EnvelopeError::Parse(_))
        ));
        // bare key with a scalar value is not repaired
        assert!(matches!(
            normalize(br#"{source:"vm1"}"#),
            Err(EnvelopeError::Parse(_))
        ));
    }

    #[test]
    fn collects_all_missing_fields() {
        assert_eq!(
            fields(normalize(b"{}").unwrap_err()),
            vec!["source", "protocol", "attestation"]
        );
        assert_eq!(
            fields(normalize(br#"{"source":"vm1","attestation":{}}"#).unwrap_err()),
            vec!["protocol", "attestation.report"]
        );
    }

    #[test]
    fn rejects_empty_or_mistyped_fields() {
        assert_eq!(
            fields(
                normalize(br#"{"source":"","protocol":"snp","attestation":{"report":"AQID"}}"#)
                    .unwrap_err()
            ),
            vec!["source"]
        );
        assert_eq!(
            fields(
                normalize(br#"{"source":"vm1","protocol":7,"attestation":{"report":"AQID"}}"#)
                    .unwrap_err()
            ),
            vec!["protocol"]
        );
        assert_eq!(
            fields(
                normalize(br#"{"source":"vm1","protocol":"snp","attestation":{"report":""}}"#)
                    .unwrap_err()
            ),
            vec!["attestation.report"]
        );
        assert_eq!(
            fields(
                normalize(br#"{"source":"vm1","protocol":"snp","attestation":{"report":42}}"#)
                    .unwrap_err()
            ),
            vec!["attestation.report"]
        );
        assert_eq!(
            fields(normalize(br#"{"source":"vm1","protocol":"snp","attestation":"x"}"#).unwrap_err()),
            vec!["attestation"]
        );
    }

    #[test]
    fn validation_message_names_fields() {
        let err = normalize(br#"{"protocol":"snp"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing or invalid field(s): source, attestation"
        );
    }
}
