//! Parsing of client→server frames: `["EVENT", event]`, `["REQ", subId,
//! filter, …]`, `["CLOSE", subId]`, `["COUNT", subId, filter, …]`,
//! `["AUTH", event]`.

use relay_events::{Event, Filter};
use serde_json::Value;

use crate::{CodecError, CodecResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEnvelope {
    Event(Event),
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
    Count { sub_id: String, filters: Vec<Filter> },
    Auth(Event),
}

impl ClientEnvelope {
    /// Parse a single text frame, a JSON array whose first element names
    /// the envelope tag.
    pub fn parse(raw: &str) -> CodecResult<Self> {
        let mut values: Vec<Value> = serde_json::from_str(raw)?;
        if values.is_empty() {
            return Err(CodecError::Empty);
        }
        let tag = values
            .remove(0)
            .as_str()
            .ok_or(CodecError::MissingField("tag"))?
            .to_string();

        match tag.as_str() {
            "EVENT" => {
                let event_value = values.into_iter().next().ok_or(CodecError::MissingField("event"))?;
                let event: Event = serde_json::from_value(event_value)?;
                Ok(Self::Event(event))
            }
            "AUTH" => {
                let event_value = values.into_iter().next().ok_or(CodecError::MissingField("event"))?;
                let event: Event = serde_json::from_value(event_value)?;
                Ok(Self::Auth(event))
            }
            "REQ" => {
                let (sub_id, filters) = parse_sub_and_filters(values)?;
                Ok(Self::Req { sub_id, filters })
            }
            "COUNT" => {
                let (sub_id, filters) = parse_sub_and_filters(values)?;
                Ok(Self::Count { sub_id, filters })
            }
            "CLOSE" => {
                let sub_id = values
                    .into_iter()
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or(CodecError::MissingField("subId"))?;
                Ok(Self::Close { sub_id })
            }
            other => Err(CodecError::UnknownTag(other.to_string())),
        }
    }
}

fn parse_sub_and_filters(mut values: Vec<Value>) -> CodecResult<(String, Vec<Filter>)> {
    if values.is_empty() {
        return Err(CodecError::MissingField("subId"));
    }
    let sub_id = values.remove(0).as_str().ok_or(CodecError::MissingField("subId"))?.to_string();
    let filters = values
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Filter>, _>>()?;
    Ok((sub_id, filters))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event_json() -> Value {
        serde_json::json!({
            "id": "a1", "pubkey": "pk1", "created_at": 1_700_000_000,
            "kind": 1, "tags": [], "content": "hello", "sig": "deadbeef"
        })
    }

    #[test]
    fn parses_an_event_envelope() {
        let raw = serde_json::json!(["EVENT", sample_event_json()]).to_string();
        let parsed = ClientEnvelope::parse(&raw).unwrap();
        assert!(matches!(parsed, ClientEnvelope::Event(e) if e.id == "a1"));
    }

    #[test]
    fn parses_a_req_with_multiple_filters() {
        let raw = serde_json::json!(["REQ", "sub1", {"kinds": [1]}, {"kinds": [2]}]).to_string();
        let parsed = ClientEnvelope::parse(&raw).unwrap();
        match parsed {
            ClientEnvelope::Req { sub_id, filters } => {
                assert_eq!(sub_id, "sub1");
                assert_eq!(filters.len(), 2);
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn parses_a_close() {
        let raw = serde_json::json!(["CLOSE", "sub1"]).to_string();
        let parsed = ClientEnvelope::parse(&raw).unwrap();
        assert_eq!(parsed, ClientEnvelope::Close { sub_id: "sub1".to_string() });
    }

    #[test]
    fn rejects_an_unknown_tag() {
        let raw = serde_json::json!(["WAT", "sub1"]).to_string();
        assert!(matches!(ClientEnvelope::parse(&raw), Err(CodecError::UnknownTag(t)) if t == "WAT"));
    }

    #[test]
    fn rejects_an_empty_array() {
        assert!(matches!(ClientEnvelope::parse("[]"), Err(CodecError::Empty)));
    }
}
