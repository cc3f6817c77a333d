//! Native index ordering.
//!
//! Values sort first by type class, in the order
//!
//! ```text
//! ARRAY < BOOL < NULL < NUMBER < OBJECT < PTYPE<BINARY> < PTYPE<TIME> < STRING
//! ```
//!
//! and then within the class. This must match the database's own index
//! ordering exactly: the merge-diff walks two server-ordered cursors and
//! relies on this function agreeing with the server about which key comes
//! first.

use crate::value::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Result of comparing two values.
///
/// Unlike [`Ordering`] this has a fourth outcome: some values have no
/// defined position relative to each other. Callers must handle it instead
/// of assuming the order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Left sorts first.
    Less,
    /// Same position.
    Equal,
    /// Right sorts first.
    Greater,
    /// No defined order between the two.
    Incomparable,
}

impl Comparison {
    /// Converts to a standard ordering, `None` when incomparable.
    pub fn ordering(self) -> Option<Ordering> {
        match self {
            Comparison::Less => Some(Ordering::Less),
            Comparison::Equal => Some(Ordering::Equal),
            Comparison::Greater => Some(Ordering::Greater),
            Comparison::Incomparable => None,
        }
    }

    /// The same comparison seen from the other side.
    pub fn reverse(self) -> Self {
        match self {
            Comparison::Less => Comparison::Greater,
            Comparison::Greater => Comparison::Less,
            other => other,
        }
    }

    /// `-1`, `0` or `1`, `None` when incomparable.
    pub fn as_sign(self) -> Option<i8> {
        self.ordering().map(|o| o as i8)
    }

    /// Returns true for [`Comparison::Incomparable`].
    pub fn is_incomparable(self) -> bool {
        self == Comparison::Incomparable
    }
}

impl From<Ordering> for Comparison {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Comparison::Less,
            Ordering::Equal => Comparison::Equal,
            Ordering::Greater => Comparison::Greater,
        }
    }
}

/// Rank given to indeterminate numbers: after every class.
const INDETERMINATE_RANK: u8 = 8;

fn rank(v: &Value) -> Option<u8> {
    if v.is_indeterminate() {
        return Some(INDETERMINATE_RANK);
    }
    v.class().map(|c| c.rank())
}

/// Compares two values in native index order.
pub fn compare(a: &Value, b: &Value) -> Comparison {
    let (Some(rank_a), Some(rank_b)) = (rank(a), rank(b)) else {
        return Comparison::Incomparable;
    };

    if rank_a != rank_b {
        return rank_a.cmp(&rank_b).into();
    }
    if rank_a == INDETERMINATE_RANK {
        // Not even equal to itself.
        return Comparison::Incomparable;
    }

    match (a, b) {
        (Value::Array(a), Value::Array(b)) => compare_sequences(a, b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b).into(),
        (Value::Null, Value::Null) => Comparison::Equal,
        (Value::Number(a), Value::Number(b)) => a
            .partial_cmp(b)
            .map_or(Comparison::Incomparable, Comparison::from),
        (Value::Object(a), Value::Object(b)) => compare_objects(a, b),
        (Value::Binary(a), Value::Binary(b)) => a.cmp(b).into(),
        (Value::Time(a), Value::Time(b)) => a.cmp(b).into(),
        (Value::String(a), Value::String(b)) => a.cmp(b).into(),
        _ => Comparison::Incomparable,
    }
}

fn compare_sequences(a: &[Value], b: &[Value]) -> Comparison {
    for (ea, eb) in a.iter().zip(b.iter()) {
        match compare(ea, eb) {
            Comparison::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len()).into()
}

fn compare_objects(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Comparison {
    // BTreeMap iterates in field-name order, which is code point order.
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        match ka.cmp(kb) {
            Ordering::Equal => {}
            other => return other.into(),
        }
        match compare(va, vb) {
            Comparison::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len()).into()
}

/// Rank of opaque pseudo-types in [`total_order`]: after the sentinels.
const OPAQUE_RANK: u8 = 9;

fn total_rank(v: &Value) -> u8 {
    rank(v).unwrap_or(OPAQUE_RANK)
}

/// A total order over every value, for laying out stored rows.
///
/// Agrees with [`compare`] wherever it returns `Less`, `Equal` or
/// `Greater`, and breaks the rest deterministically: indeterminate numbers
/// by [`f64::total_cmp`], opaque values after them by type tag and then by
/// their fields. Suitable for `sort_by`, which [`compare`] is not.
pub fn total_order(a: &Value, b: &Value) -> Ordering {
    let (rank_a, rank_b) = (total_rank(a), total_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (a, b) {
        (Value::Array(a), Value::Array(b)) => total_sequences(a.iter(), b.iter()),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(a), Value::Number(b)) if rank_a == INDETERMINATE_RANK => a.total_cmp(b),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Object(a), Value::Object(b)) => total_fields(a, b),
        (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
        (Value::Time(a), Value::Time(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (
            Value::Opaque {
                reql_type: ta,
                fields: fa,
            },
            Value::Opaque {
                reql_type: tb,
                fields: fb,
            },
        ) => ta.cmp(tb).then_with(|| total_fields(fa, fb)),
        _ => Ordering::Equal,
    }
}

fn total_sequences<'a>(
    a: impl ExactSizeIterator<Item = &'a Value>,
    b: impl ExactSizeIterator<Item = &'a Value>,
) -> Ordering {
    let (len_a, len_b) = (a.len(), b.len());
    for (ea, eb) in a.zip(b) {
        match total_order(ea, eb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    len_a.cmp(&len_b)
}

fn total_fields(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        match ka.cmp(kb).then_with(|| total_order(va, vb)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn time(s: &str) -> Value {
        Value::Time(DateTime::parse_from_rfc3339(s).unwrap())
    }

    fn opaque() -> Value {
        Value::Opaque {
            reql_type: "GEOMETRY".into(),
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn class_ranking() {
        let one_per_class = vec![
            Value::from(vec![1]),
            Value::Bool(false),
            Value::Null,
            Value::from(1),
            Value::object([("a", 1)]),
            Value::binary(b"a".to_vec()),
            time("2017-01-01T00:00:00Z"),
            Value::from("a"),
        ];
        for i in 0..one_per_class.len() {
            for j in 0..one_per_class.len() {
                let expected = Comparison::from(i.cmp(&j));
                assert_eq!(
                    compare(&one_per_class[i], &one_per_class[j]),
                    expected,
                    "{} vs {}",
                    one_per_class[i],
                    one_per_class[j]
                );
            }
        }
    }

    #[test]
    fn arrays_are_lexicographic() {
        assert_eq!(compare(&Value::from(Vec::<i32>::new()), &Value::from(vec![1])), Comparison::Less);
        assert_eq!(compare(&Value::from(vec![1, 2, 3]), &Value::from(vec![3, 2, 1])), Comparison::Less);
        assert_eq!(compare(&Value::from(vec![1]), &Value::from(vec![1, 0])), Comparison::Less);
        assert_eq!(compare(&Value::from(vec![3]), &Value::from(vec!["foo"])), Comparison::Less);
    }

    #[test]
    fn objects_compare_keys_then_values() {
        let empty = Value::object(Vec::<(String, Value)>::new());
        let a1 = Value::object([("a", 1)]);
        let a2 = Value::object([("a", 2)]);
        let b1 = Value::object([("b", 1)]);
        let a1b1 = Value::object([("a", 1), ("b", 1)]);
        assert_eq!(compare(&empty, &a1), Comparison::Less);
        assert_eq!(compare(&a1, &a2), Comparison::Less);
        assert_eq!(compare(&a2, &b1), Comparison::Less);
        assert_eq!(compare(&a1, &a1b1), Comparison::Less);
        assert_eq!(compare(&a1b1, &a1b1.clone()), Comparison::Equal);
    }

    #[test]
    fn time_ignores_offset() {
        let utc = time("2017-01-01T00:00:00+00:00");
        let same_instant = time("2017-01-01T03:00:00+03:00");
        let plus3 = time("2017-01-01T00:00:00+03:00");
        let minus7 = time("2017-01-01T00:00:00-07:00");
        assert_eq!(compare(&utc, &same_instant), Comparison::Equal);
        assert_eq!(compare(&plus3, &utc), Comparison::Less);
        assert_eq!(compare(&utc, &minus7), Comparison::Less);
    }

    #[test]
    fn strings_by_code_point() {
        assert_eq!(compare(&Value::from("bar"), &Value::from("bar1")), Comparison::Less);
        assert_eq!(compare(&Value::from("Z"), &Value::from("a")), Comparison::Less);
        assert_eq!(compare(&Value::from("\u{e9}"), &Value::from("\u{1F600}")), Comparison::Less);
    }

    #[test]
    fn binary_is_bytewise() {
        assert_eq!(compare(&Value::binary(vec![1, 2]), &Value::binary(vec![1, 3])), Comparison::Less);
        assert_eq!(compare(&Value::binary(vec![1]), &Value::binary(vec![1, 0])), Comparison::Less);
        assert_eq!(compare(&Value::binary(vec![9]), &Value::binary(vec![9])), Comparison::Equal);
    }

    #[test]
    fn indeterminate_numbers() {
        let inf = Value::Number(f64::INFINITY);
        assert_eq!(compare(&inf, &inf), Comparison::Incomparable);
        assert_eq!(compare(&inf, &Value::Number(f64::NAN)), Comparison::Incomparable);
        assert_eq!(compare(&Value::from("z"), &inf), Comparison::Less);
        assert_eq!(compare(&inf, &Value::from(1000)), Comparison::Greater);
    }

    #[test]
    fn opaque_is_never_ordered() {
        assert_eq!(compare(&opaque(), &opaque()), Comparison::Incomparable);
        assert_eq!(compare(&opaque(), &Value::Null), Comparison::Incomparable);
        assert_eq!(compare(&Value::from("a"), &opaque()), Comparison::Incomparable);
    }

    #[test]
    fn incomparable_element_poisons_container() {
        let a = Value::from(vec![Value::from(1), opaque()]);
        let b = Value::from(vec![Value::from(1), Value::Null]);
        assert_eq!(compare(&a, &b), Comparison::Incomparable);
        // Decided before the bad element is reached.
        let c = Value::from(vec![Value::from(0), opaque()]);
        assert_eq!(compare(&c, &b), Comparison::Less);
    }

    #[test]
    fn total_order_agrees_with_compare() {
        let values = vec![
            Value::from(vec![Value::from(1), opaque()]),
            Value::from(vec![1, 2]),
            Value::Bool(true),
            Value::Null,
            Value::from(-0.0),
            Value::from(0.0),
            Value::from(7),
            Value::object([("a", Value::Number(f64::NAN))]),
            Value::binary(vec![1]),
            time("2017-01-01T00:00:00Z"),
            Value::from("a"),
            Value::Number(f64::INFINITY),
            Value::Number(f64::NEG_INFINITY),
            Value::Number(f64::NAN),
            opaque(),
        ];
        for a in &values {
            for b in &values {
                if let Some(ordering) = compare(a, b).ordering() {
                    assert_eq!(total_order(a, b), ordering, "{a} vs {b}");
                }
                assert_eq!(total_order(a, b), total_order(b, a).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn total_order_places_unordered_values_last() {
        let geometry = |n: i32| Value::Opaque {
            reql_type: "GEOMETRY".into(),
            fields: BTreeMap::from([("n".to_string(), Value::from(n))]),
        };
        let mut keys: Vec<Value> = (0..50).rev().map(Value::from).collect();
        keys.extend((0..10).map(geometry));
        keys.push(Value::Number(f64::INFINITY));
        keys.push(Value::Number(f64::NEG_INFINITY));
        keys.sort_by(total_order);

        let numbers: Vec<Value> = (0..50).map(Value::from).collect();
        assert_eq!(keys[..50], numbers[..]);
        assert_eq!(keys[50], Value::Number(f64::NEG_INFINITY));
        assert_eq!(keys[51], Value::Number(f64::INFINITY));
        assert_eq!(keys[52..].iter().filter(|k| k.class().is_none()).count(), 10);
        assert_eq!(total_order(&geometry(1), &geometry(1)), Ordering::Equal);
        assert_eq!(total_order(&geometry(1), &geometry(2)), Ordering::Less);
    }

    #[test]
    fn comparison_helpers() {
        assert_eq!(Comparison::Less.reverse(), Comparison::Greater);
        assert_eq!(Comparison::Incomparable.reverse(), Comparison::Incomparable);
        assert_eq!(Comparison::Greater.as_sign(), Some(1));
        assert_eq!(Comparison::Less.as_sign(), Some(-1));
        assert_eq!(Comparison::Incomparable.as_sign(), None);
    }
}
