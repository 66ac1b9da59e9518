//! Server→client frames: `["OK", id, ok, msg]`, `["EVENT", subId, event]`,
//! `["EOSE", subId]`, `["CLOSED", subId, reason]`, `["NOTICE", msg]`,
//! `["AUTH", challenge]`, `["COUNT", subId, {"count": n}]`.

use relay_events::Event;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEnvelope {
    Ok { event_id: String, accepted: bool, message: String },
    Event { sub_id: String, event: Event },
    Eose { sub_id: String },
    Closed { sub_id: String, reason: String },
    Notice { message: String },
    Auth { challenge: String },
    Count { sub_id: String, count: usize },
}

impl ServerEnvelope {
    /// Render as the JSON array text frame clients expect.
    #[must_use]
    pub fn to_text(&self) -> String {
        let array: Vec<Value> = match self {
            Self::Ok { event_id, accepted, message } => {
                vec![Value::from("OK"), Value::from(event_id.clone()), Value::from(*accepted), Value::from(message.clone())]
            }
            Self::Event { sub_id, event } => {
                vec![
                    Value::from("EVENT"),
                    Value::from(sub_id.clone()),
                    serde_json::to_value(event).expect("Event always serializes"),
                ]
            }
            Self::Eose { sub_id } => vec![Value::from("EOSE"), Value::from(sub_id.clone())],
            Self::Closed { sub_id, reason } => {
                vec![Value::from("CLOSED"), Value::from(sub_id.clone()), Value::from(reason.clone())]
            }
            Self::Notice { message } => vec![Value::from("NOTICE"), Value::from(message.clone())],
            Self::Auth { challenge } => vec![Value::from("AUTH"), Value::from(challenge.clone())],
            Self::Count { sub_id, count } => {
                vec![Value::from("COUNT"), Value::from(sub_id.clone()), serde_json::json!({ "count": count })]
            }
        };
        Value::Array(array).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_frame_renders_as_a_four_element_array() {
        let env = ServerEnvelope::Ok { event_id: "id1".into(), accepted: true, message: String::new() };
        let text = env.to_text();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!(["OK", "id1", true, ""]));
    }

    #[test]
    fn eose_frame_renders_as_a_two_element_array() {
        let env = ServerEnvelope::Eose { sub_id: "sub1".into() };
        assert_eq!(env.to_text(), serde_json::json!(["EOSE", "sub1"]).to_string());
    }

    #[test]
    fn count_frame_wraps_the_count_in_an_object() {
        let env = ServerEnvelope::Count { sub_id: "sub1".into(), count: 3 };
        let parsed: Value = serde_json::from_str(&env.to_text()).unwrap();
        assert_eq!(parsed, serde_json::json!(["COUNT", "sub1", {"count": 3}]));
    }
}
