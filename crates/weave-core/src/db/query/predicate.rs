use crate::{
    db::record::Record,
    value::Value,
};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// Predicate AST
///
/// Schema-agnostic row filter. The engine only ever builds conjunctions and
/// key-membership tests; callers may hand storage anything this tree can
/// express, and connections are free to translate it to native queries.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, PartialEq)]
pub struct ComparePredicate {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

impl ComparePredicate {
    #[must_use]
    pub fn new(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
    IsNull { field: String },
    IsMissing { field: String },
}

impl Predicate {
    #[must_use]
    pub const fn and(preds: Vec<Self>) -> Self {
        Self::And(preds)
    }

    #[must_use]
    pub const fn or(preds: Vec<Self>) -> Self {
        Self::Or(preds)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(pred: Self) -> Self {
        Self::Not(Box::new(pred))
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Eq, value))
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Ne, value))
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Lt, value))
    }

    #[must_use]
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Lte, value))
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Gt, value))
    }

    #[must_use]
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::Gte, value))
    }

    #[must_use]
    pub fn in_(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Compare(ComparePredicate::new(field, CompareOp::In, Value::List(values)))
    }

    #[must_use]
    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Compare(ComparePredicate::new(
            field,
            CompareOp::NotIn,
            Value::List(values),
        ))
    }

    #[must_use]
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }
}

///
/// FieldPresence
///
/// Result of reading a field during evaluation. Distinguishes a missing
/// field from a present field whose value is `Null`.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldPresence<'a> {
    Present(&'a Value),
    Missing,
}

///
/// Row
///
/// Anything that can expose field values by name.
///

pub trait Row {
    fn field(&self, name: &str) -> FieldPresence<'_>;
}

impl Row for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> FieldPresence<'_> {
        self.get(name)
            .map_or(FieldPresence::Missing, FieldPresence::Present)
    }
}

impl Row for Record {
    fn field(&self, name: &str) -> FieldPresence<'_> {
        self.get(name)
            .map_or(FieldPresence::Missing, FieldPresence::Present)
    }
}

///
/// Evaluate a predicate against a single row.
///
/// Pure runtime evaluation: comparisons that are undefined for the two
/// values (different families, missing fields) evaluate to `false`.
///
#[must_use]
pub fn eval<R: Row + ?Sized>(row: &R, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,

        Predicate::And(children) => children.iter().all(|child| eval(row, child)),
        Predicate::Or(children) => children.iter().any(|child| eval(row, child)),
        Predicate::Not(inner) => !eval(row, inner),

        Predicate::Compare(cmp) => eval_compare(row, cmp),

        Predicate::IsNull { field } => {
            matches!(row.field(field), FieldPresence::Present(Value::Null))
        }
        Predicate::IsMissing { field } => matches!(row.field(field), FieldPresence::Missing),
    }
}

fn eval_compare<R: Row + ?Sized>(row: &R, cmp: &ComparePredicate) -> bool {
    let ComparePredicate { field, op, value } = cmp;

    let FieldPresence::Present(actual) = row.field(field) else {
        return false;
    };

    match op {
        CompareOp::Eq => actual.loose_eq(value),
        CompareOp::Ne => actual.compare(value).is_some_and(Ordering::is_ne),

        CompareOp::Lt => actual.compare(value).is_some_and(Ordering::is_lt),
        CompareOp::Lte => actual.compare(value).is_some_and(Ordering::is_le),
        CompareOp::Gt => actual.compare(value).is_some_and(Ordering::is_gt),
        CompareOp::Gte => actual.compare(value).is_some_and(Ordering::is_ge),

        CompareOp::In => in_list(actual, value).unwrap_or(false),
        CompareOp::NotIn => in_list(actual, value).is_some_and(|matched| !matched),
    }
}

// Whether a value equals any element of a list; `None` when `list` is not one.
fn in_list(actual: &Value, list: &Value) -> Option<bool> {
    let Value::List(items) = list else {
        return None;
    };

    Some(items.iter().any(|item| actual.loose_eq(item)))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn membership_matches_across_integer_signedness() {
        let image = row(&[("gallery_id", Value::Uint(2))]);

        assert!(eval(
            &image,
            &Predicate::in_("gallery_id", vec![Value::Int(1), Value::Int(2)])
        ));
        assert!(!eval(
            &image,
            &Predicate::not_in("gallery_id", vec![Value::Int(2)])
        ));
    }

    #[test]
    fn missing_and_null_are_distinct() {
        let image = row(&[("title", Value::Null)]);

        assert!(eval(&image, &Predicate::is_null("title")));
        assert!(!eval(&image, &Predicate::is_null("caption")));
        assert!(eval(
            &image,
            &Predicate::IsMissing {
                field: "caption".into()
            }
        ));
        assert!(
            !eval(&image, &Predicate::eq("caption", Value::Null)),
            "comparisons on missing fields should not match"
        );
    }

    #[test]
    fn incomparable_values_never_match() {
        let tag = row(&[("name", Value::from("sky"))]);

        assert!(!eval(&tag, &Predicate::gt("name", 3)));
        assert!(!eval(&tag, &Predicate::ne("name", 3)));
        assert!(eval(
            &tag,
            &Predicate::and(vec![
                Predicate::eq("name", "sky"),
                Predicate::not(Predicate::eq("name", "sea")),
            ])
        ));
    }
}
