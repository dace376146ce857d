//! Harvested records and the result pages they arrive in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One result item as returned by a search page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: i64,
    pub type_code: i32,
    pub process_number: String,
    pub piece_number: String,
    pub expedition_date: NaiveDate,
}

/// A page of search results plus the declared total for the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    pub items: Vec<SearchItem>,
}

/// A harvested record as kept by the record store.
///
/// Everything except `last_seen_date` and `detail` describes the originating
/// document and is immutable after the first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub type_code: i32,
    pub process_number: String,
    pub piece_number: String,
    pub expedition_date: NaiveDate,
    pub first_seen_date: NaiveDate,
    pub last_seen_date: NaiveDate,
    pub detail: Option<serde_json::Value>,
}

impl Record {
    /// A record first observed on `seen`.
    pub fn observed(item: SearchItem, seen: NaiveDate) -> Self {
        Self {
            id: item.id,
            type_code: item.type_code,
            process_number: item.process_number,
            piece_number: item.piece_number,
            expedition_date: item.expedition_date,
            first_seen_date: seen,
            last_seen_date: seen,
            detail: None,
        }
    }
}

/// How the store treated an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the id
    Inserted,
    /// Row existed; only `last_seen_date` was updated
    Touched,
}

/// A stored record still waiting for its detail document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissingDetail {
    pub id: i64,
    pub type_code: i32,
}

/// Answer of the detail endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Found(serde_json::Value),
    NotFound,
}

/// Whether `marker` occurs anywhere in a detail document.
///
/// Object keys and string values are searched at every depth, so the
/// check matches a case-sensitive search of the response body.
pub fn has_marker(document: &serde_json::Value, marker: &str) -> bool {
    use serde_json::Value;

    match document {
        Value::String(s) => s.contains(marker),
        Value::Array(values) => values.iter().any(|v| has_marker(v, marker)),
        Value::Object(obj) => obj
            .iter()
            .any(|(key, value)| key.contains(marker) || has_marker(value, marker)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observed_sets_both_dates() {
        let seen = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
        let item = SearchItem {
            id: 176449921,
            type_code: 1,
            process_number: "00022746620198010001".into(),
            piece_number: "0002274662019801000101000403".into(),
            expedition_date: NaiveDate::from_ymd_opt(2021, 3, 3).unwrap(),
        };

        let record = Record::observed(item, seen);

        assert_eq!(record.first_seen_date, seen);
        assert_eq!(record.last_seen_date, seen);
        assert!(record.detail.is_none());
    }

    #[test]
    fn test_has_marker() {
        assert!(has_marker(&json!({"mandado": {}, "id": 1}), "mandado"));
        assert!(!has_marker(&json!({"id": 1}), "mandado"));
        assert!(!has_marker(&json!(null), "mandado"));
    }

    #[test]
    fn test_has_marker_searches_nested_keys_and_values() {
        assert!(has_marker(&json!({"id": 1, "peca": {"mandado": {"numero": "x"}}}), "mandado"));
        assert!(has_marker(&json!({"id": 1, "dados_mandado": {}}), "mandado"));
        assert!(has_marker(&json!({"itens": [{"descricao": "mandado de prisao"}]}), "mandado"));
        assert!(has_marker(&json!("mandado"), "mandado"));
        // Same case sensitivity as a search of the raw body
        assert!(!has_marker(&json!({"tipoPeca": "MANDADO_DE_PRISAO"}), "mandado"));
    }
}
