//! Filter objects: `ids`, `authors`, `kinds`, `since`, `until`, `limit`, plus
//! arbitrary `"#<letter>"` tag filters. The tag filters need a custom
//! `Deserialize` since serde has no built-in notion of "every remaining key
//! that looks like `#x`".

use std::collections::HashMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{tags_contain_any, Event};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub limit: usize,
    /// Keyed by the tag letter (e.g. `'e'`, `'p'`), values are the set of
    /// acceptable values for that tag.
    #[serde(flatten, serialize_with = "serialize_tag_filters")]
    pub tags: HashMap<char, Vec<String>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn serialize_tag_filters<S>(tags: &HashMap<char, Vec<String>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(tags.len()))?;
    for (letter, values) in tags {
        map.serialize_entry(&format!("#{letter}"), values)?;
    }
    map.end()
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut obj = match Value::deserialize(deserializer)? {
            Value::Object(map) => map,
            _ => return Err(de::Error::custom("filter must be a JSON object")),
        };

        let take_string_vec = |obj: &mut serde_json::Map<String, Value>, key: &str| -> Result<Vec<String>, D::Error> {
            match obj.remove(key) {
                Some(value) => serde_json::from_value(value).map_err(de::Error::custom),
                None => Ok(Vec::new()),
            }
        };

        let ids = take_string_vec(&mut obj, "ids")?;
        let authors = take_string_vec(&mut obj, "authors")?;
        let kinds: Vec<u64> = match obj.remove("kinds") {
            Some(value) => serde_json::from_value(value).map_err(de::Error::custom)?,
            None => Vec::new(),
        };
        let since: Option<i64> = match obj.remove("since") {
            Some(value) => serde_json::from_value(value).map_err(de::Error::custom)?,
            None => None,
        };
        let until: Option<i64> = match obj.remove("until") {
            Some(value) => serde_json::from_value(value).map_err(de::Error::custom)?,
            None => None,
        };
        let limit: usize = match obj.remove("limit") {
            Some(value) => serde_json::from_value(value).map_err(de::Error::custom)?,
            None => 0,
        };

        let mut tags = HashMap::new();
        for (key, value) in obj {
            let Some(letter) = key.strip_prefix('#').and_then(|rest| {
                let mut chars = rest.chars();
                let first = chars.next()?;
                chars.next().is_none().then_some(first)
            }) else {
                continue;
            };
            let values: Vec<String> = serde_json::from_value(value).map_err(de::Error::custom)?;
            tags.insert(letter, values);
        }

        Ok(Filter { ids, authors, kinds, since, until, limit, tags })
    }
}

impl Filter {
    /// Whether `event` satisfies every clause of this filter. An empty
    /// clause (e.g. no `authors` given) is always satisfied.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id == &event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.iter().any(|a| a == &event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        for (letter, values) in &self.tags {
            let wanted: std::collections::HashSet<String> = values.iter().cloned().collect();
            if !tags_contain_any(&event.tags, *letter, &wanted) {
                return false;
            }
        }
        true
    }
}
