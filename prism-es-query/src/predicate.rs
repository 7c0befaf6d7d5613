//! Predicate value objects
//!
//! A predicate is a field/operator/value constraint tagged with the
//! context it will be compiled into. The context decides which operators
//! are legal, and which of them may be used with plain (non-date) text:
//!
//! | context        | operators                 | plain text operators |
//! |----------------|---------------------------|----------------------|
//! | where          | `= <> > < >= <=`          | `= <>`               |
//! | filter         | `= > < >= <=`             | `=`                  |
//! | match / phrase | `= <>`                    | `= <>`               |
//!
//! Set predicates (`in` / `not in` lists) accept numeric and text values only.

use crate::error::ValidationError;
use crate::scalar::Scalar;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Operator {
    /// Parse the textual operator (`=`, `<>`, `>`, `<`, `>=`, `<=`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "=" => Some(Operator::Eq),
            "<>" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::Gte),
            "<=" => Some(Operator::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile-time description of a predicate context
pub trait ClauseContext: fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    const NAME: &'static str;
    const OPERATORS: &'static [Operator];
    const TEXT_OPERATORS: &'static [Operator];
}

/// Scored term/range context (`must` / `must_not`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhereContext;

/// Non-scoring term/range context (`filter`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterContext;

/// Full-text match context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchContext;

/// Full-text phrase match context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseContext;

const ALL_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::Gt,
    Operator::Lt,
    Operator::Gte,
    Operator::Lte,
];

const EQUALITY_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ne];

impl ClauseContext for WhereContext {
    const NAME: &'static str = "where";
    const OPERATORS: &'static [Operator] = ALL_OPERATORS;
    const TEXT_OPERATORS: &'static [Operator] = EQUALITY_OPERATORS;
}

impl ClauseContext for FilterContext {
    const NAME: &'static str = "filter";
    const OPERATORS: &'static [Operator] = &[
        Operator::Eq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
    ];
    const TEXT_OPERATORS: &'static [Operator] = &[Operator::Eq];
}

impl ClauseContext for MatchContext {
    const NAME: &'static str = "match";
    const OPERATORS: &'static [Operator] = EQUALITY_OPERATORS;
    const TEXT_OPERATORS: &'static [Operator] = EQUALITY_OPERATORS;
}

impl ClauseContext for PhraseContext {
    const NAME: &'static str = "match phrase";
    const OPERATORS: &'static [Operator] = EQUALITY_OPERATORS;
    const TEXT_OPERATORS: &'static [Operator] = EQUALITY_OPERATORS;
}

/// A single field/operator/value constraint.
///
/// The operator is kept as written so that any builder state can be
/// represented; it is only interpreted by [`Predicate::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate<C: ClauseContext> {
    field: String,
    operator: String,
    value: Scalar,
    context: PhantomData<C>,
}

impl<C: ClauseContext> Predicate<C> {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
            context: PhantomData,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn raw_operator(&self) -> &str {
        &self.operator
    }

    pub fn operator(&self) -> Option<Operator> {
        Operator::parse(&self.operator)
    }

    pub fn value(&self) -> &Scalar {
        &self.value
    }

    /// Check operator membership and operator/value compatibility
    pub fn validate(&self) -> Result<(), ValidationError> {
        let operator = self
            .operator()
            .filter(|op| C::OPERATORS.contains(op))
            .ok_or_else(|| ValidationError::InvalidOperator {
                context: C::NAME,
                field: self.field.clone(),
                operator: self.operator.clone(),
            })?;

        if self.value.is_rangeable() {
            return Ok(());
        }

        match &self.value {
            Scalar::Text(_) if C::TEXT_OPERATORS.contains(&operator) => Ok(()),
            Scalar::Text(text) => Err(ValidationError::IncompatibleValue {
                field: self.field.clone(),
                operator: operator.to_string(),
                value: text.clone(),
            }),
            _ => Err(ValidationError::UnsupportedValue {
                field: self.field.clone(),
            }),
        }
    }
}

/// An inclusion or exclusion list on a single field
#[derive(Debug, Clone, PartialEq)]
pub struct SetPredicate<C: ClauseContext> {
    field: String,
    values: Vec<Scalar>,
    context: PhantomData<C>,
}

impl<C: ClauseContext> SetPredicate<C> {
    pub fn new(field: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            field: field.into(),
            values,
            context: PhantomData,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn json_values(&self) -> Vec<Value> {
        self.values.iter().map(Scalar::to_json).collect()
    }

    /// Every element must be numeric or text
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self
            .values
            .iter()
            .all(|v| v.is_numeric() || matches!(v, Scalar::Text(_)))
        {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedValue {
                field: self.field.clone(),
            })
        }
    }
}

pub type Where = Predicate<WhereContext>;
pub type Filter = Predicate<FilterContext>;
pub type Match = Predicate<MatchContext>;
pub type MatchPhrase = Predicate<PhraseContext>;

pub type WhereIn = SetPredicate<WhereContext>;
pub type FilterIn = SetPredicate<FilterContext>;
pub type MatchIn = SetPredicate<MatchContext>;
pub type MatchPhraseIn = SetPredicate<PhraseContext>;

/// Sort directive, replayed in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
    /// Owning nested path for sorting on a nested field
    pub nested_path: Option<String>,
}

impl Sort {
    pub fn new(field: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
            nested_path: None,
        }
    }

    pub fn nested(field: impl Into<String>, path: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
            nested_path: Some(path.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.nested_path {
            Some(path) if path.trim().is_empty() || self.field.trim().is_empty() => {
                Err(ValidationError::IncompleteNestedSort {
                    field: self.field.clone(),
                })
            }
            None if self.field.trim().is_empty() => Err(ValidationError::EmptySortField),
            _ => Ok(()),
        }
    }
}

/// Ordered group-by field list; the first field is the outermost bucket level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    pub fields: Vec<String>,
}

/// Prefix of a nested field before its last `.`
pub fn nested_path(field: &str) -> Option<&str> {
    field
        .rfind('.')
        .map(|idx| &field[..idx])
        .filter(|path| !path.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===================================================================
    // Operator parsing
    // ===================================================================

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("="), Some(Operator::Eq));
        assert_eq!(Operator::parse("<>"), Some(Operator::Ne));
        assert_eq!(Operator::parse(">="), Some(Operator::Gte));
        assert_eq!(Operator::parse("!="), None);
        assert_eq!(Operator::parse("=="), None);
        assert!(Operator::Lt.is_range());
        assert!(!Operator::Ne.is_range());
    }

    // ===================================================================
    // Where
    // ===================================================================

    #[test]
    fn test_where_accepts_all_operators_on_numbers() {
        for op in ["=", "<>", ">", "<", ">=", "<="] {
            assert!(Where::new("subject_id", op, 1).validate().is_ok(), "{}", op);
        }
    }

    #[test]
    fn test_where_text_only_equality() {
        assert!(Where::new("description", "=", "value1").validate().is_ok());
        assert!(Where::new("description", "<>", "value2").validate().is_ok());
        for op in [">", "<", ">=", "<="] {
            let err = Where::new("subject_id", op, "value1").validate().unwrap_err();
            assert!(matches!(err, ValidationError::IncompatibleValue { .. }));
        }
    }

    #[test]
    fn test_where_text_date_allows_ranges() {
        assert!(Where::new("created_at", ">", "2020-01-01").validate().is_ok());
        assert!(Where::new("created_at", "<=", "2020-01-01T10:00:00Z")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_where_rejects_unknown_operator_and_bool() {
        let err = Where::new("subject_id", "!=", 0).validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperator { context: "where", .. }));

        let err = Where::new("active", "=", true).validate().unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Where::new("price", ">", value).validate().unwrap_err();
            assert!(matches!(err, ValidationError::UnsupportedValue { .. }));
            assert!(Filter::new("price", "=", value).validate().is_err());
        }
        let bad = WhereIn::new("price", vec![Scalar::from(1.5), Scalar::from(f64::NAN)]);
        assert!(bad.validate().is_err());
    }

    // ===================================================================
    // Filter
    // ===================================================================

    #[test]
    fn test_filter_operators() {
        assert!(Filter::new("description", "=", "value1").validate().is_ok());
        for op in [">", "<", ">=", "<="] {
            assert!(Filter::new("subject_id", op, 1).validate().is_ok());
            assert!(Filter::new("subject_id", op, "value1").validate().is_err());
        }
        let err = Filter::new("subject_id", "<>", 0).validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperator { context: "filter", .. }));
    }

    // ===================================================================
    // Match / phrase
    // ===================================================================

    #[test]
    fn test_match_only_equality() {
        assert!(Match::new("description", "=", "value1").validate().is_ok());
        assert!(Match::new("description", "<>", "value2").validate().is_ok());
        assert!(Match::new("subject_id", "<", 1).validate().is_err());
        assert!(Match::new("subject_id", "!=", 0).validate().is_err());
        assert!(MatchPhrase::new("title", ">", 3).validate().is_err());
        assert!(MatchPhrase::new("title", "=", "quick brown").validate().is_ok());
    }

    // ===================================================================
    // Set predicates
    // ===================================================================

    #[test]
    fn test_set_values_numeric_or_text() {
        let ok = WhereIn::new("id", vec![Scalar::from(1), Scalar::from("two"), Scalar::from(3.5)]);
        assert!(ok.validate().is_ok());

        let bad = WhereIn::new("id", vec![Scalar::from(1), Scalar::from(false)]);
        assert!(bad.validate().is_err());

        let date = chrono::Utc::now();
        let bad = MatchIn::new("created", vec![Scalar::from(date)]);
        assert!(bad.validate().is_err());
    }

    // ===================================================================
    // Sort and nested paths
    // ===================================================================

    #[test]
    fn test_nested_sort_requires_field_and_path() {
        assert!(Sort::nested("attributes.size", "attributes", true).validate().is_ok());
        assert!(Sort::nested("attributes.size", "", true).validate().is_err());
        assert!(Sort::nested("", "attributes", true).validate().is_err());
        assert!(Sort::new("", true).validate().is_err());
    }

    #[test]
    fn test_nested_path() {
        assert_eq!(nested_path("attributes.color"), Some("attributes"));
        assert_eq!(nested_path("a.b.c"), Some("a.b"));
        assert_eq!(nested_path("color"), None);
        assert_eq!(nested_path(".color"), None);
    }
}
