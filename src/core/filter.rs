//! Filter message bodies by size, regular expressions and structured query.
//!
//! [`MessageFilter`] compiles a [`FilterSettings`] snapshot once and then
//! decides pass/reject for raw bodies.
//!
//! # Evaluation Order
//!
//! Checks short-circuit; the first failing check rejects the message.
//!
//! | Step | Setting | Rejects when |
//! |------|---------|--------------|
//! | 1 | `max_message_size` | limit is not `-1` and the body is longer |
//! | 2 | `regex_filter` | the regex does not match |
//! | 3 | `include_patterns` | the set is non-empty and no pattern matches |
//! | 4 | `exclude_patterns` | any pattern matches |
//! | 5 | `json_filter` | the body is not JSON, or the query has no truthy result |
//!
//! # Example
//!
//! ```
//! use rmqdump::config::FilterSettings;
//! use rmqdump::core::filter::MessageFilter;
//!
//! # fn main() -> rmqdump::Result<()> {
//! let settings = FilterSettings::new()
//!     .with_include("order")
//!     .with_exclude("test")
//!     .with_json_filter(".amount > 100");
//!
//! let filter = MessageFilter::compile(&settings)?;
//! assert!(filter.matches(br#"{"kind":"order","amount":250}"#));
//! assert!(!filter.matches(br#"{"kind":"order-test","amount":250}"#));
//! # Ok(())
//! # }
//! ```
//!
//! # Behavior Notes
//!
//! - Patterns are matched against the body decoded as lossy UTF-8
//! - A query that errors at runtime rejects the message
//! - Compilation errors are collected, never thrown, by [`MessageFilter::new`]

use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use crate::config::{FilterSettings, UNLIMITED_MESSAGE_SIZE};
use crate::core::query::Query;
use crate::error::{FilterCompileError, PatternKind, Result, RmqDumpError};

#[derive(Debug, Default)]
struct CompiledFilters {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    regex: Option<Regex>,
    query: Option<Query>,
    max_size: Option<usize>,
}

impl CompiledFilters {
    fn compile(settings: &FilterSettings) -> (Self, Vec<FilterCompileError>) {
        let mut errors = Vec::new();

        let mut compile_regex = |kind: PatternKind, pattern: &str| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                errors.push(FilterCompileError::new(kind, pattern, e.to_string()));
                None
            }
        };

        let include = settings
            .include_patterns
            .iter()
            .filter_map(|p| compile_regex(PatternKind::Include, p))
            .collect();
        let exclude = settings
            .exclude_patterns
            .iter()
            .filter_map(|p| compile_regex(PatternKind::Exclude, p))
            .collect();
        let regex = settings
            .regex_filter
            .as_deref()
            .and_then(|p| compile_regex(PatternKind::Regex, p));

        let query = settings
            .json_filter
            .as_deref()
            .and_then(|source| match Query::parse(source) {
                Ok(query) => Some(query),
                Err(e) => {
                    errors.push(FilterCompileError::new(
                        PatternKind::Query,
                        source,
                        e.to_string(),
                    ));
                    None
                }
            });

        let max_size = if settings.max_message_size == UNLIMITED_MESSAGE_SIZE {
            None
        } else {
            usize::try_from(settings.max_message_size).ok()
        };

        let compiled = Self {
            include,
            exclude,
            regex,
            query,
            max_size,
        };
        (compiled, errors)
    }

    fn matches(&self, body: &[u8]) -> bool {
        if self.max_size.is_some_and(|max| body.len() > max) {
            return false;
        }

        let needs_text = self.regex.is_some() || !self.include.is_empty() || !self.exclude.is_empty();
        if needs_text {
            let text = String::from_utf8_lossy(body);

            if let Some(regex) = &self.regex {
                if !regex.is_match(&text) {
                    return false;
                }
            }
            if !self.include.is_empty() && !self.include.iter().any(|r| r.is_match(&text)) {
                return false;
            }
            if self.exclude.iter().any(|r| r.is_match(&text)) {
                return false;
            }
        }

        match &self.query {
            Some(query) => query_accepts(query, body),
            None => true,
        }
    }
}

/// Runs `query` over the parsed body and applies the truthiness rules.
fn query_accepts(query: &Query, body: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return false;
    };

    let decision = query.find_map(&value, |output| match output {
        Err(_) => Some(false),
        Ok(Value::Bool(decision)) => Some(decision),
        Ok(Value::Null) => None,
        Ok(other) => {
            let rendered = serde_json::to_string_pretty(&other).unwrap_or_default();
            Some(!rendered.trim().is_empty())
        }
    });
    matches!(decision, Ok(Some(true)))
}

/// A compiled, thread-safe message filter.
///
/// The compiled state sits behind a read-write lock: any number of
/// [`matches`](Self::matches) calls may run concurrently, while
/// [`recompile`](Self::recompile) takes exclusive access.
#[derive(Debug)]
pub struct MessageFilter {
    state: RwLock<CompiledFilters>,
    errors: RwLock<Vec<FilterCompileError>>,
}

impl MessageFilter {
    /// Compiles `settings`, collecting any errors instead of failing.
    ///
    /// Invalid patterns are left out of the compiled state. Callers must
    /// check [`compilation_errors`](Self::compilation_errors) before trusting
    /// [`matches`](Self::matches); [`compile`](Self::compile) does that for you.
    pub fn new(settings: &FilterSettings) -> Self {
        let (state, errors) = CompiledFilters::compile(settings);
        Self {
            state: RwLock::new(state),
            errors: RwLock::new(errors),
        }
    }

    /// Compiles `settings` and fails with every invalid pattern at once.
    ///
    /// # Errors
    ///
    /// Returns [`RmqDumpError::FilterCompilation`] if any include, exclude,
    /// regex or query pattern does not compile.
    pub fn compile(settings: &FilterSettings) -> Result<Self> {
        let filter = Self::new(settings);
        let errors = filter.compilation_errors();
        if errors.is_empty() {
            Ok(filter)
        } else {
            Err(RmqDumpError::filter_compilation(errors))
        }
    }

    /// A filter that passes everything.
    pub fn pass_all() -> Self {
        Self::new(&FilterSettings::default())
    }

    /// Errors collected by the last compilation.
    pub fn compilation_errors(&self) -> Vec<FilterCompileError> {
        self.errors.read().clone()
    }

    /// Returns `true` if compilation produced no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.read().is_empty()
    }

    /// Decides whether `body` passes every configured check.
    pub fn matches(&self, body: &[u8]) -> bool {
        self.state.read().matches(body)
    }

    /// Replaces the compiled state with a fresh compilation of `settings`.
    ///
    /// On failure the previous state stays in place and the errors are
    /// returned.
    pub fn recompile(
        &self,
        settings: &FilterSettings,
    ) -> std::result::Result<(), Vec<FilterCompileError>> {
        let (state, errors) = CompiledFilters::compile(settings);
        if !errors.is_empty() {
            return Err(errors);
        }
        *self.state.write() = state;
        self.errors.write().clear();
        Ok(())
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::pass_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(settings: FilterSettings) -> MessageFilter {
        MessageFilter::compile(&settings).unwrap()
    }

    #[test]
    fn test_no_filters_pass_everything() {
        let f = MessageFilter::pass_all();
        assert!(f.matches(b""));
        assert!(f.matches(b"anything at all"));
        assert!(f.matches(&[0xff, 0xfe]));
    }

    #[test]
    fn test_size_limit() {
        let f = filter(FilterSettings::new().with_max_message_size(5));
        assert!(f.matches(b"12345"));
        assert!(!f.matches(b"123456"));
    }

    #[test]
    fn test_size_limit_wins_over_include() {
        let f = filter(
            FilterSettings::new()
                .with_max_message_size(3)
                .with_include("long"),
        );
        assert!(!f.matches(b"long body"));
    }

    #[test]
    fn test_regex_filter() {
        let f = filter(FilterSettings::new().with_regex(r"^\{"));
        assert!(f.matches(b"{}"));
        assert!(!f.matches(b"[]"));
    }

    #[test]
    fn test_include_needs_one_match() {
        let f = filter(FilterSettings::new().with_include("alpha").with_include("beta"));
        assert!(f.matches(b"only beta here"));
        assert!(!f.matches(b"gamma"));
    }

    #[test]
    fn test_exclude_beats_include() {
        let f = filter(FilterSettings::new().with_include("order").with_exclude("test"));
        assert!(f.matches(b"order 1"));
        assert!(!f.matches(b"test order"));
    }

    #[test]
    fn test_query_role() {
        let f = filter(FilterSettings::new().with_json_filter(".user.role == \"admin\""));
        assert!(f.matches(br#"{"user":{"role":"admin"}}"#));
        assert!(!f.matches(br#"{"user":{"role":"user"}}"#));
        assert!(!f.matches(b"not json"));
    }

    #[test]
    fn test_query_truthiness() {
        let f = filter(FilterSettings::new().with_json_filter(".value"));
        assert!(f.matches(br#"{"value":"x"}"#));
        assert!(f.matches(br#"{"value":0}"#));
        assert!(!f.matches(br#"{"value":null}"#));
        assert!(!f.matches(br#"{"value":false}"#));
        assert!(!f.matches(br#"{"other":1}"#));
    }

    #[test]
    fn test_query_skips_nulls_until_a_boolean() {
        let f = filter(FilterSettings::new().with_json_filter(".a, .b"));
        assert!(f.matches(br#"{"a":null,"b":true}"#));
        assert!(!f.matches(br#"{"a":null,"b":false}"#));
    }

    #[test]
    fn test_query_empty_output_rejects() {
        let f = filter(FilterSettings::new().with_json_filter("select(.keep)"));
        assert!(!f.matches(br#"{"keep":false}"#));
        assert!(f.matches(br#"{"keep":true}"#));
    }

    #[test]
    fn test_query_runtime_error_rejects() {
        let f = filter(FilterSettings::new().with_json_filter(".a.b"));
        assert!(!f.matches(br#"{"a":5}"#));
    }

    #[test]
    fn test_query_overflow_rejects_without_panicking() {
        let f = filter(FilterSettings::new().with_json_filter(".a % -1 == 0"));
        let _ = f.matches(br#"{"a":-9223372036854775808}"#);

        let f = filter(FilterSettings::new().with_json_filter(".s * .n | length > 0"));
        let _ = f.matches(br#"{"s":"x","n":1e19}"#);
        assert!(f.matches(br#"{"s":"x","n":2}"#));
    }

    #[test]
    fn test_query_standard_library() {
        let f = filter(FilterSettings::new().with_json_filter(".payload | fromjson | .ok"));
        assert!(f.matches(br#"{"payload":"{\"ok\":true}"}"#));
        assert!(!f.matches(br#"{"payload":"{\"ok\":false}"}"#));

        let f = filter(FilterSettings::new().with_json_filter(".items | any(.n > 3)"));
        assert!(f.matches(br#"{"items":[{"n":1},{"n":5}]}"#));
        assert!(!f.matches(br#"{"items":[{"n":1}]}"#));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let settings = FilterSettings::new()
            .with_include("(")
            .with_exclude("[")
            .with_json_filter(".a ==");
        let f = MessageFilter::new(&settings);
        assert!(!f.is_valid());
        assert_eq!(f.compilation_errors().len(), 3);

        let err = MessageFilter::compile(&settings).unwrap_err();
        match err {
            RmqDumpError::FilterCompilation { errors } => {
                assert_eq!(errors[0].kind, PatternKind::Include);
                assert_eq!(errors[1].kind, PatternKind::Exclude);
                assert_eq!(errors[2].kind, PatternKind::Query);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recompile_replaces_state() {
        let f = filter(FilterSettings::new().with_include("a"));
        assert!(!f.matches(b"b"));

        f.recompile(&FilterSettings::new().with_include("b")).unwrap();
        assert!(f.matches(b"b"));
    }

    #[test]
    fn test_recompile_failure_keeps_previous_state() {
        let f = filter(FilterSettings::new().with_include("a"));
        let errors = f
            .recompile(&FilterSettings::new().with_include("("))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(f.matches(b"a"));
        assert!(f.is_valid());
    }

    #[test]
    fn test_filter_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MessageFilter>();
    }
}
