//! Fluent query accumulator
//!
//! [`QueryBuilder`] collects predicates and directives through chaining
//! mutators. Nothing is checked while building; see
//! [`QueryBuilder::validate_must_clauses`] and the paging validators.
//!
//! ```ignore
//! let mut query = QueryBuilder::new();
//! query
//!     .where_in("description", ["Description 2", "Description 4"])
//!     .where_("subject_id", "<>", 3)
//!     .match_nested("attributes.color", "=", "red")
//!     .order_by("id", false)
//!     .limit(2);
//! ```

use crate::predicate::{
    nested_path, Filter, FilterIn, GroupBy, Match, MatchIn, MatchPhrase, MatchPhraseIn, Sort,
    Where, WhereIn,
};
use crate::scalar::Scalar;
use crate::schema::FieldSchema;

/// Predicates of one query scope, in call order per category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    pub wheres: Vec<Where>,
    pub where_ins: Vec<WhereIn>,
    pub where_not_ins: Vec<WhereIn>,
    pub filters: Vec<Filter>,
    pub filter_ins: Vec<FilterIn>,
    pub matches: Vec<Match>,
    pub match_ins: Vec<MatchIn>,
    pub match_not_ins: Vec<MatchIn>,
    pub phrases: Vec<MatchPhrase>,
    pub phrase_ins: Vec<MatchPhraseIn>,
    pub phrase_not_ins: Vec<MatchPhraseIn>,
}

impl ClauseSet {
    pub fn is_empty(&self) -> bool {
        self.wheres.is_empty()
            && self.where_ins.is_empty()
            && self.where_not_ins.is_empty()
            && self.filters.is_empty()
            && self.filter_ins.is_empty()
            && self.matches.is_empty()
            && self.match_ins.is_empty()
            && self.match_not_ins.is_empty()
            && self.phrases.is_empty()
            && self.phrase_ins.is_empty()
            && self.phrase_not_ins.is_empty()
    }

    /// Every field referenced by this scope
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.wheres
            .iter()
            .map(|p| p.field())
            .chain(self.where_ins.iter().map(|p| p.field()))
            .chain(self.where_not_ins.iter().map(|p| p.field()))
            .chain(self.filters.iter().map(|p| p.field()))
            .chain(self.filter_ins.iter().map(|p| p.field()))
            .chain(self.matches.iter().map(|p| p.field()))
            .chain(self.match_ins.iter().map(|p| p.field()))
            .chain(self.match_not_ins.iter().map(|p| p.field()))
            .chain(self.phrases.iter().map(|p| p.field()))
            .chain(self.phrase_ins.iter().map(|p| p.field()))
            .chain(self.phrase_not_ins.iter().map(|p| p.field()))
    }
}

/// Predicates scoped under one nested object path
#[derive(Debug, Clone, PartialEq)]
pub struct NestedGroup {
    pub path: String,
    pub clauses: ClauseSet,
}

fn scalars<I, V>(values: I) -> Vec<Scalar>
where
    I: IntoIterator<Item = V>,
    V: Into<Scalar>,
{
    values.into_iter().map(Into::into).collect()
}

/// Mutable accumulator of predicates and directives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub(crate) clauses: ClauseSet,
    pub(crate) nested: Vec<NestedGroup>,
    pub(crate) sorts: Vec<Sort>,
    pub(crate) limit: Option<i64>,
    pub(crate) from: Option<i64>,
    pub(crate) group_by: Option<GroupBy>,
    pub(crate) stats: Vec<String>,
    pub(crate) schema: Option<FieldSchema>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict every referenced field to `schema`
    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    // ========================================================================
    // Scored clauses
    // ========================================================================

    pub fn where_(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        self.clauses.wheres.push(Where::new(field, operator, value));
        self
    }

    pub fn where_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses.where_ins.push(WhereIn::new(field, scalars(values)));
        self
    }

    pub fn where_not_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses
            .where_not_ins
            .push(WhereIn::new(field, scalars(values)));
        self
    }

    // ========================================================================
    // Filter clauses
    // ========================================================================

    pub fn filter(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        self.clauses.filters.push(Filter::new(field, operator, value));
        self
    }

    pub fn filter_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses.filter_ins.push(FilterIn::new(field, scalars(values)));
        self
    }

    // ========================================================================
    // Full-text clauses
    // ========================================================================

    pub fn match_(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        self.clauses.matches.push(Match::new(field, operator, value));
        self
    }

    pub fn match_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses.match_ins.push(MatchIn::new(field, scalars(values)));
        self
    }

    pub fn match_not_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses
            .match_not_ins
            .push(MatchIn::new(field, scalars(values)));
        self
    }

    pub fn match_phrase(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        self.clauses
            .phrases
            .push(MatchPhrase::new(field, operator, value));
        self
    }

    pub fn match_phrase_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses
            .phrase_ins
            .push(MatchPhraseIn::new(field, scalars(values)));
        self
    }

    pub fn match_phrase_not_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.clauses
            .phrase_not_ins
            .push(MatchPhraseIn::new(field, scalars(values)));
        self
    }

    // ========================================================================
    // Nested clauses
    // ========================================================================

    /// Group for the path owning `field`, created on first use.
    /// A field without a path lands in the group with an empty path.
    fn nested_group(&mut self, field: &str) -> &mut ClauseSet {
        let path = nested_path(field).unwrap_or_default();
        let idx = match self.nested.iter().position(|g| g.path == path) {
            Some(idx) => idx,
            None => {
                self.nested.push(NestedGroup {
                    path: path.to_string(),
                    clauses: ClauseSet::default(),
                });
                self.nested.len() - 1
            }
        };
        &mut self.nested[idx].clauses
    }

    pub fn where_nested(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        let field = field.into();
        let predicate = Where::new(field.as_str(), operator, value);
        self.nested_group(&field).wheres.push(predicate);
        self
    }

    pub fn where_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = WhereIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).where_ins.push(predicate);
        self
    }

    pub fn where_not_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = WhereIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).where_not_ins.push(predicate);
        self
    }

    pub fn filter_nested(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        let field = field.into();
        let predicate = Filter::new(field.as_str(), operator, value);
        self.nested_group(&field).filters.push(predicate);
        self
    }

    pub fn filter_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = FilterIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).filter_ins.push(predicate);
        self
    }

    pub fn match_nested(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        let field = field.into();
        let predicate = Match::new(field.as_str(), operator, value);
        self.nested_group(&field).matches.push(predicate);
        self
    }

    pub fn match_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = MatchIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).match_ins.push(predicate);
        self
    }

    pub fn match_not_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = MatchIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).match_not_ins.push(predicate);
        self
    }

    pub fn match_phrase_nested(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Scalar>,
    ) -> &mut Self {
        let field = field.into();
        let predicate = MatchPhrase::new(field.as_str(), operator, value);
        self.nested_group(&field).phrases.push(predicate);
        self
    }

    pub fn match_phrase_in_nested<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = MatchPhraseIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).phrase_ins.push(predicate);
        self
    }

    pub fn match_phrase_not_in_nested<I, V>(
        &mut self,
        field: impl Into<String>,
        values: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let field = field.into();
        let predicate = MatchPhraseIn::new(field.as_str(), scalars(values));
        self.nested_group(&field).phrase_not_ins.push(predicate);
        self
    }

    // ========================================================================
    // Directives
    // ========================================================================

    pub fn order_by(&mut self, field: impl Into<String>, ascending: bool) -> &mut Self {
        self.sorts.push(Sort::new(field, ascending));
        self
    }

    pub fn nested_order_by(
        &mut self,
        field: impl Into<String>,
        path: impl Into<String>,
        ascending: bool,
    ) -> &mut Self {
        self.sorts.push(Sort::nested(field, path, ascending));
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn from(&mut self, from: i64) -> &mut Self {
        self.from = Some(from);
        self
    }

    pub fn group_by<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(GroupBy {
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn stats<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stats.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Reset every clause and directive. An attached schema is kept.
    pub fn clear(&mut self) -> &mut Self {
        let schema = self.schema.take();
        *self = Self {
            schema,
            ..Self::default()
        };
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    pub fn nested_groups(&self) -> &[NestedGroup] {
        &self.nested
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn from_value(&self) -> Option<i64> {
        self.from
    }

    pub fn group_by_fields(&self) -> Option<&[String]> {
        self.group_by.as_ref().map(|g| g.fields.as_slice())
    }

    pub fn stats_fields(&self) -> &[String] {
        &self.stats
    }

    pub fn schema(&self) -> Option<&FieldSchema> {
        self.schema.as_ref()
    }

    /// True when a group-by or stats directive is present
    pub fn has_aggregations(&self) -> bool {
        self.group_by.is_some() || !self.stats.is_empty()
    }
}
