use std::collections::HashMap;
use std::sync::RwLock;

use super::executor::BindValue;

/// Base of the sentinel literals planted where the row id, limit, or offset
/// will be substituted at execution time.
pub const PLACEHOLDER_BASE: &str = "__gq_param__";

/// The sentinel literal for parameter slot `index`, as it appears inside
/// the rendered SQL text (a quoted string literal).
pub fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_BASE}{index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Read,
    List,
    Count,
}

/// Scope of one cached statement. The model version is part of the key, so
/// a structural metadata change leaves stale entries behind instead of
/// replaying them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryCacheKey {
    pub model_id: String,
    pub view_id: Option<String>,
    pub model_version: u32,
    pub op: CacheOp,
}

/// Process-wide cache of compiled SQL text. Read-then-write, not
/// transactional: concurrent compilations for the same key may race and
/// overwrite each other, which is harmless because the value is pure text
/// derived deterministically from immutable metadata.
#[derive(Debug, Default)]
pub struct CompiledQueryCache {
    inner: RwLock<HashMap<QueryCacheKey, String>>,
}

impl CompiledQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryCacheKey) -> Option<String> {
        self.inner.read().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: QueryCacheKey, sql: String) {
        if let Ok(mut inner) = self.inner.write() {
            inner.insert(key, sql);
        }
    }
}

/// Rewrite rendered SQL so only the truly variable values need be supplied
/// on replay: each quoted sentinel literal becomes a `$n` parameter marker.
///
/// Returns `None` when the text cannot be safely parameterized — a sentinel
/// occurring more or less often than planted (user data collided with it),
/// or pre-existing `$` markers. Callers fall back to the uncached path.
pub fn parameterize(sql: &str, count: usize) -> Option<String> {
    if sql.contains('$') {
        return None;
    }
    let mut out = sql.to_owned();
    for index in 0..count {
        let literal = format!("'{}'", placeholder(index));
        if out.matches(&literal).count() != 1 {
            return None;
        }
        out = out.replace(&literal, &format!("${}", index + 1));
    }
    if out.contains(PLACEHOLDER_BASE) {
        return None;
    }
    Some(out)
}

/// Splice runtime values into a parameterized statement, replacing each
/// `$n` marker with an escaped literal. Markers are replaced highest-index
/// first so `$1` never clobbers part of `$10`.
pub fn bind(sql: &str, values: &[BindValue]) -> String {
    let mut out = sql.to_owned();
    for (index, value) in values.iter().enumerate().rev() {
        out = out.replace(&format!("${}", index + 1), &value.to_literal());
    }
    out
}

/// Splice runtime values over the sentinel literals directly; used when a
/// statement could not be parameterized and is executed uncached.
pub fn bind_sentinels(sql: &str, values: &[BindValue]) -> String {
    let mut out = sql.to_owned();
    for (index, value) in values.iter().enumerate() {
        out = out.replace(&format!("'{}'", placeholder(index)), &value.to_literal());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameterize_then_bind_round_trips() {
        let sql = format!(
            "SELECT * FROM \"t\" LIMIT '{}' OFFSET '{}'",
            placeholder(0),
            placeholder(1)
        );
        let parameterized = parameterize(&sql, 2).unwrap();
        assert_eq!(parameterized, "SELECT * FROM \"t\" LIMIT $1 OFFSET $2");

        let bound = bind(&parameterized, &[BindValue::Int(25), BindValue::Int(50)]);
        assert_eq!(bound, "SELECT * FROM \"t\" LIMIT 25 OFFSET 50");
    }

    #[test]
    fn binding_escapes_text_values() {
        let bound = bind(
            "SELECT * FROM \"t\" WHERE \"id\" = $1",
            &[BindValue::Text("it's".to_owned())],
        );
        assert_eq!(bound, "SELECT * FROM \"t\" WHERE \"id\" = 'it''s'");
    }

    #[test]
    fn collision_with_user_data_refuses_to_parameterize() {
        // the sentinel shows up once as planted and once inside user data
        let sql = format!(
            "SELECT * FROM \"t\" WHERE \"a\" = '{}' AND \"b\" = '{}'",
            placeholder(0),
            placeholder(0)
        );
        assert!(parameterize(&sql, 1).is_none());
    }

    #[test]
    fn cache_is_keyed_by_version() {
        let cache = CompiledQueryCache::new();
        let key = QueryCacheKey {
            model_id: "m1".to_owned(),
            view_id: None,
            model_version: 1,
            op: CacheOp::List,
        };
        cache.set(key.clone(), "SELECT 1".to_owned());
        assert_eq!(cache.get(&key).as_deref(), Some("SELECT 1"));

        let bumped = QueryCacheKey {
            model_version: 2,
            ..key
        };
        assert!(cache.get(&bumped).is_none());
    }
}
