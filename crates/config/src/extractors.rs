//! Turns the `query_cache` TOML table (`bucket_name -> field_name`) into a
//! [`relay_dag::CacheExtractors`] registry at startup, by looking each
//! field name up in `relay_dag`'s fixed table of extractor functions.
//! Unknown field names are dropped with a warning rather than failing
//! config load — a typo in `query_cache` should not take the whole relay
//! down.

use relay_dag::CacheExtractors;

use crate::ConfigFile;

#[must_use]
pub fn build_extractors(config: &ConfigFile) -> CacheExtractors {
    let mut extractors = CacheExtractors::new();
    for (bucket, field) in &config.query_cache {
        match relay_dag::named_extractor(field) {
            Some(extractor) => {
                extractors.register(bucket.clone(), extractor);
            }
            None => {
                tracing::warn!(bucket, field, "query_cache names an unknown extractor field, ignoring");
            }
        }
    }
    extractors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_registered_extractor_for_a_known_field() {
        let mut config = ConfigFile::default();
        config.query_cache.insert("md".to_string(), "item_name".to_string());
        let extractors = build_extractors(&config);
        assert!(extractors.get("md").is_some());
    }

    #[test]
    fn silently_drops_unknown_fields() {
        let mut config = ConfigFile::default();
        config.query_cache.insert("md".to_string(), "nonsense".to_string());
        let extractors = build_extractors(&config);
        assert!(extractors.get("md").is_none());
    }
}
