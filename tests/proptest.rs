//! Property-based tests for rmqdump.
//!
//! These tests generate random bodies and filter settings to check the
//! filter engine's invariants.

use proptest::prelude::*;

use rmqdump::core::{Envelope, FilterSettings, MessageFilter};

/// Bodies drawn from a fixed pool (fast, no regex strategies)
fn arb_body() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::sample::select(vec![
            r#"{"user":{"role":"admin"}}"#.to_string(),
            r#"{"user":{"role":"user"}}"#.to_string(),
            r#"{"order":42,"status":"paid"}"#.to_string(),
            "plain text order".to_string(),
            "test message".to_string(),
            String::new(),
            "   ".to_string(),
            "Привет мир".to_string(),
            "🎉🔥 emoji".to_string(),
        ])
        .prop_map(String::into_bytes),
        prop::collection::vec(any::<u8>(), 0..64),
    ]
}

fn arb_pattern() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "order".to_string(),
        "test".to_string(),
        "^\\{".to_string(),
        "admin".to_string(),
        "[0-9]+".to_string(),
        "мир".to_string(),
    ])
}

fn arb_settings() -> impl Strategy<Value = FilterSettings> {
    (
        prop::collection::vec(arb_pattern(), 0..3),
        prop::collection::vec(arb_pattern(), 0..3),
        prop::option::of(prop::sample::select(vec![
            ".user.role == \"admin\"".to_string(),
            ".order > 10".to_string(),
            "has(\"status\")".to_string(),
            ".missing".to_string(),
        ])),
        prop::option::of(arb_pattern()),
        prop_oneof![Just(-1i64), 1i64..128],
    )
        .prop_map(|(include, exclude, json_filter, regex_filter, max)| FilterSettings {
            include_patterns: include,
            exclude_patterns: exclude,
            json_filter,
            regex_filter,
            max_message_size: max,
        })
}

/// Numbers at the edges of integer and float arithmetic
fn arb_number() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        prop::sample::select(vec![i64::MIN, i64::MAX, -1, 0, 1, 2])
            .prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        prop::sample::select(vec![1e19, -1e19, 1e308, 0.5, -0.0])
            .prop_map(serde_json::Value::from),
        Just(serde_json::Value::Null),
        Just(serde_json::json!("x")),
        Just(serde_json::json!([1, 2])),
        Just(serde_json::json!({"k": 1})),
    ]
}

/// JSON bodies with `a` and `b` operands and a short string `s`
fn arb_arith_body() -> impl Strategy<Value = Vec<u8>> {
    (arb_number(), arb_number(), "[a-z]{0,4}")
        .prop_map(|(a, b, s)| serde_json::json!({"a": a, "b": b, "s": s}).to_string().into_bytes())
}

const ARITHMETIC_FILTERS: &[&str] = &[
    ".a % .b == 0",
    ".b % .a == 0",
    ".a / .b > 1",
    ".a * .b > 0",
    ".a - .b < 0",
    ".a + .b == .b + .a",
    "-.a < 0",
    ".a | floor == .a",
    ".s * 3 | length > 0",
    ".s * (.b | if type == \"number\" and . < 64 then . else 2 end) | length >= 0",
    "[.a, .b] | add > 0",
    "[.a, .b] | max == .a",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Arithmetic filters decide every body without panicking
    #[test]
    fn arithmetic_filters_never_panic(body in arb_arith_body(), index in 0..ARITHMETIC_FILTERS.len()) {
        let settings = FilterSettings::new().with_json_filter(ARITHMETIC_FILTERS[index]);
        let filter = MessageFilter::compile(&settings).unwrap();
        let _ = filter.matches(&body);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // ============================================
    // FILTER PROPERTIES
    // ============================================

    /// With nothing configured every body passes
    #[test]
    fn empty_settings_pass_everything(body in arb_body()) {
        let filter = MessageFilter::compile(&FilterSettings::new()).unwrap();
        prop_assert!(filter.matches(&body));
    }

    /// Oversized bodies are rejected regardless of other filters
    #[test]
    fn oversized_bodies_are_rejected(body in arb_body(), settings in arb_settings()) {
        let limit = body.len() as i64 - 1;
        prop_assume!(limit >= 1);
        let filter = MessageFilter::compile(&settings.with_max_message_size(limit)).unwrap();
        prop_assert!(!filter.matches(&body));
    }

    /// A body matching an exclude pattern never passes
    #[test]
    fn exclude_always_wins(body in arb_body(), pattern in arb_pattern()) {
        let settings = FilterSettings::new()
            .with_include(pattern.clone())
            .with_exclude(pattern.clone());
        let filter = MessageFilter::compile(&settings).unwrap();
        prop_assert!(!filter.matches(&body));
    }

    /// A body matching none of the include patterns never passes
    #[test]
    fn include_must_match(body in arb_body(), pattern in arb_pattern()) {
        let regex = regex::Regex::new(&pattern).unwrap();
        let text = String::from_utf8_lossy(&body);
        prop_assume!(!regex.is_match(&text));

        let filter = MessageFilter::compile(&FilterSettings::new().with_include(pattern)).unwrap();
        prop_assert!(!filter.matches(&body));
    }

    /// Compiling the same settings twice yields the same decisions
    #[test]
    fn compilation_is_deterministic(settings in arb_settings(), bodies in prop::collection::vec(arb_body(), 0..10)) {
        let first = MessageFilter::compile(&settings).unwrap();
        let second = MessageFilter::compile(&settings).unwrap();
        for body in &bodies {
            prop_assert_eq!(first.matches(body), second.matches(body));
        }
    }

    // ============================================
    // ENVELOPE PROPERTIES
    // ============================================

    /// Exported lines are single-line JSON objects
    #[test]
    fn exported_line_is_one_json_object(body in arb_body()) {
        let line = Envelope::new("events", "a.b", body).to_json_line(false).unwrap();
        prop_assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        prop_assert!(parsed.is_object());
        prop_assert_eq!(&parsed["exchange"], "events");
    }
}
