//! Property-based tests for message formatting and schema growth
//!
//! Uses proptest to check invariants over arbitrary argument lists and
//! metadata key sequences.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Value};
use sqlogs_core::{format_message, LogEntry, LogOptions, Persist, RecordWriter, SqliteStorage};

// ============================================================================
// Strategy Generators
// ============================================================================

/// Valid metadata keys drawn from a small pool so repeats are common
fn meta_key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "alpha", "beta", "gamma", "delta", "requestId", "userId", "_x", "k9",
    ])
    .prop_map(str::to_string)
}

/// Metadata for one call: up to four keys
fn meta_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(meta_key_strategy(), 0..4)
}

/// Argument values without surrounding whitespace
fn arg_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9]{1,12}".prop_map(Value::String),
        any::<i32>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(Value::Bool),
        prop::collection::vec("[a-z]{0,5}", 0..3).prop_map(|v| json!(v)),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The final column set is the union of every key ever logged
    #[test]
    fn schema_is_union_of_all_keys(calls in prop::collection::vec(meta_strategy(), 1..12)) {
        let mut writer = RecordWriter::new(SqliteStorage::new(":memory:"));
        let mut seen = BTreeSet::new();

        for (i, keys) in calls.iter().enumerate() {
            let mut options = LogOptions::new();
            for key in keys {
                options = options.meta(key.clone(), i.to_string());
                seen.insert(key.clone());
            }
            writer.persist(&LogEntry::new(format!("call {i}"), options)).unwrap();

            // Columns never disappear between calls
            let columns = writer.columns().unwrap();
            for key in &seen {
                prop_assert!(columns.contains(key));
            }
        }

        let dynamic: BTreeSet<String> = writer.columns().unwrap().into_iter().skip(5).collect();
        prop_assert_eq!(dynamic, seen);
    }

    /// A key gets a new column at most once over the writer's lifetime
    #[test]
    fn each_key_added_once(calls in prop::collection::vec(meta_strategy(), 1..12)) {
        let mut writer = RecordWriter::new(SqliteStorage::new(":memory:"));
        let mut added = Vec::new();

        for keys in &calls {
            let mut options = LogOptions::new();
            for key in keys {
                options = options.meta(key.clone(), "v");
            }
            let outcome = writer.persist(&LogEntry::new("m", options)).unwrap();
            added.extend(outcome.added_columns);
        }

        let unique: BTreeSet<_> = added.iter().cloned().collect();
        prop_assert_eq!(unique.len(), added.len());
    }

    /// Formatting joins parts with single spaces, in argument order
    #[test]
    fn message_is_space_joined(args in prop::collection::vec(arg_strategy(), 0..6)) {
        let expected: Vec<String> = args
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();

        prop_assert_eq!(format_message(&args), expected.join(" "));
    }

    /// Appending an options envelope never changes the message
    #[test]
    fn envelope_does_not_leak_into_message(
        args in prop::collection::vec(arg_strategy(), 0..6),
        group in "[A-Z]{1,8}",
    ) {
        let plain = LogEntry::parse(args.clone());

        let mut with_options = args;
        with_options.push(LogOptions::new().group(group.clone()).into_envelope());
        let parsed = LogEntry::parse(with_options);

        prop_assert_eq!(parsed.message, plain.message);
        prop_assert_eq!(parsed.group, group);
    }
}
