//! Accumulated predicates -> Elasticsearch boolean query
//!
//! Each clause family (wheres, filters, matches, phrases, nested groups)
//! is a pure function of an immutable snapshot of the accumulator. The
//! families are built on the blocking pool in parallel and joined before
//! the root `bool` query is composed, so clause order within a family is
//! always call order.

use super::types::{
    BoolQuery, CompiledQuery, EsAggregation, EsQuery, RangeParams, SearchRequest, SortClause,
};
use crate::builder::{ClauseSet, NestedGroup, QueryBuilder};
use crate::error::{Result, ValidationError};
use crate::predicate::{ClauseContext, FilterContext, Operator, Predicate, SetPredicate};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the extended stats aggregation emitted for `field`
pub fn stats_agg_name(field: &str) -> String {
    format!("{}_stats", field)
}

/// Clauses contributed by one family, per boolean context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseFamily {
    pub must: Vec<EsQuery>,
    pub must_not: Vec<EsQuery>,
    pub filter: Vec<EsQuery>,
}

impl ClauseFamily {
    fn absorb_into(self, root: &mut BoolQuery) {
        root.must.extend(self.must);
        root.must_not.extend(self.must_not);
        root.filter.extend(self.filter);
    }
}

fn range_clause<C: ClauseContext>(predicate: &Predicate<C>, operator: Operator) -> Result<EsQuery> {
    let value = predicate.value();
    if !value.is_rangeable() {
        return Err(ValidationError::UnrangeableValue {
            field: predicate.field().to_string(),
            operator: operator.to_string(),
        }
        .into());
    }

    let json = Some(value.to_json());
    let params = match operator {
        Operator::Gt => RangeParams {
            gt: json,
            ..Default::default()
        },
        Operator::Gte => RangeParams {
            gte: json,
            ..Default::default()
        },
        Operator::Lt => RangeParams {
            lt: json,
            ..Default::default()
        },
        Operator::Lte => RangeParams {
            lte: json,
            ..Default::default()
        },
        Operator::Eq | Operator::Ne => {
            return Err(ValidationError::InvalidOperator {
                context: C::NAME,
                field: predicate.field().to_string(),
                operator: operator.to_string(),
            }
            .into())
        }
    };
    Ok(EsQuery::range(predicate.field(), params))
}

fn parsed_operator<C: ClauseContext>(predicate: &Predicate<C>) -> Result<Operator> {
    predicate
        .operator()
        .filter(|op| C::OPERATORS.contains(op))
        .ok_or_else(|| {
            ValidationError::InvalidOperator {
                context: C::NAME,
                field: predicate.field().to_string(),
                operator: predicate.raw_operator().to_string(),
            }
            .into()
        })
}

/// where / where_in / where_not_in -> must and must_not
pub fn where_family(clauses: &ClauseSet) -> Result<ClauseFamily> {
    let mut family = ClauseFamily::default();

    for set in &clauses.where_ins {
        family.must.push(EsQuery::terms(set.field(), set.json_values()));
    }
    for set in &clauses.where_not_ins {
        family
            .must_not
            .push(EsQuery::terms(set.field(), set.json_values()));
    }

    for predicate in &clauses.wheres {
        match parsed_operator(predicate)? {
            Operator::Eq => family
                .must
                .push(EsQuery::term(predicate.field(), predicate.value().to_json())),
            Operator::Ne => family
                .must_not
                .push(EsQuery::term(predicate.field(), predicate.value().to_json())),
            op => family.must.push(range_clause(predicate, op)?),
        }
    }
    Ok(family)
}

/// filter / filter_in -> filter
pub fn filter_family(clauses: &ClauseSet) -> Result<ClauseFamily> {
    let mut family = ClauseFamily::default();

    for set in &clauses.filter_ins {
        family
            .filter
            .push(EsQuery::terms(set.field(), set.json_values()));
    }

    for predicate in &clauses.filters {
        let clause = match parsed_operator::<FilterContext>(predicate)? {
            Operator::Eq => EsQuery::term(predicate.field(), predicate.value().to_json()),
            op => range_clause(predicate, op)?,
        };
        family.filter.push(clause);
    }
    Ok(family)
}

type TextClause = fn(String, Value) -> EsQuery;

fn text_family<C: ClauseContext>(
    ins: &[SetPredicate<C>],
    not_ins: &[SetPredicate<C>],
    scalars: &[Predicate<C>],
    clause: TextClause,
) -> Result<ClauseFamily> {
    let mut family = ClauseFamily::default();

    for set in ins {
        let mut alternatives: Vec<EsQuery> = set
            .values()
            .iter()
            .map(|v| clause(set.field().to_string(), v.to_json()))
            .collect();
        let query = if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            EsQuery::Bool(BoolQuery::any_of(alternatives))
        };
        family.must.push(query);
    }

    for set in not_ins {
        for value in set.values() {
            family
                .must_not
                .push(clause(set.field().to_string(), value.to_json()));
        }
    }

    for predicate in scalars {
        let query = clause(predicate.field().to_string(), predicate.value().to_json());
        match parsed_operator(predicate)? {
            Operator::Ne => family.must_not.push(query),
            _ => family.must.push(query),
        }
    }
    Ok(family)
}

/// match / match_in / match_not_in -> must and must_not
pub fn match_family(clauses: &ClauseSet) -> Result<ClauseFamily> {
    text_family(
        &clauses.match_ins,
        &clauses.match_not_ins,
        &clauses.matches,
        |field, value| EsQuery::match_query(field, value),
    )
}

/// match_phrase / match_phrase_in / match_phrase_not_in -> must and must_not
pub fn phrase_family(clauses: &ClauseSet) -> Result<ClauseFamily> {
    text_family(
        &clauses.phrase_ins,
        &clauses.phrase_not_ins,
        &clauses.phrases,
        |field, value| EsQuery::match_phrase(field, value),
    )
}

/// Root bool query of a single scope
fn compose(families: Vec<ClauseFamily>) -> BoolQuery {
    let mut root = BoolQuery::default();
    for family in families {
        family.absorb_into(&mut root);
    }
    root
}

fn scope_query(clauses: &ClauseSet) -> Result<BoolQuery> {
    Ok(compose(vec![
        where_family(clauses)?,
        filter_family(clauses)?,
        match_family(clauses)?,
        phrase_family(clauses)?,
    ]))
}

/// One `nested` clause per group, in the parent's must
pub fn nested_family(groups: &[NestedGroup]) -> Result<ClauseFamily> {
    let mut family = ClauseFamily::default();
    for group in groups {
        if group.path.is_empty() {
            let field = group.clauses.fields().next().unwrap_or_default().to_string();
            return Err(ValidationError::MalformedNestedPath { field }.into());
        }
        let inner = scope_query(&group.clauses)?;
        family
            .must
            .push(EsQuery::nested(group.path.clone(), EsQuery::Bool(inner)));
    }
    Ok(family)
}

async fn spawn_family<T, F>(input: Arc<T>, family: F) -> Result<ClauseFamily>
where
    T: Send + Sync + ?Sized + 'static,
    F: FnOnce(&T) -> Result<ClauseFamily> + Send + 'static,
{
    tokio::task::spawn_blocking(move || family(&*input)).await?
}

/// Boolean query compiler
pub struct QueryCompiler;

impl QueryCompiler {
    /// Validate the clauses and compile them into a boolean query
    pub async fn compile(builder: &QueryBuilder) -> Result<CompiledQuery> {
        builder.validate_must_clauses()?;
        Self::compile_unchecked(builder).await
    }

    /// Compile without running the validation pass first.
    ///
    /// Predicates that cannot be expressed still fail here; nothing is
    /// dropped silently.
    pub async fn compile_unchecked(builder: &QueryBuilder) -> Result<CompiledQuery> {
        let clauses = Arc::new(builder.clauses.clone());
        let nested: Arc<[NestedGroup]> = Arc::from(builder.nested.clone());

        let (wheres, filters, matches, phrases, nested) = tokio::try_join!(
            spawn_family(clauses.clone(), where_family),
            spawn_family(clauses.clone(), filter_family),
            spawn_family(clauses.clone(), match_family),
            spawn_family(clauses, phrase_family),
            spawn_family(nested, nested_family),
        )?;

        let compiled = CompiledQuery::new(compose(vec![wheres, filters, matches, phrases, nested]));
        tracing::debug!(query = %compiled.to_json(), "Compiled query");
        Ok(compiled)
    }

    /// Sort clauses in call order
    pub fn sort_clauses(builder: &QueryBuilder) -> Vec<SortClause> {
        builder
            .sorts
            .iter()
            .map(|s| SortClause::new(s.field.clone(), s.ascending, s.nested_path.clone()))
            .collect()
    }

    /// Group-by chain with stats at the innermost level
    pub fn aggregations(builder: &QueryBuilder) -> BTreeMap<String, EsAggregation> {
        let mut level: BTreeMap<String, EsAggregation> = builder
            .stats
            .iter()
            .map(|field| (stats_agg_name(field), EsAggregation::extended_stats(field.clone())))
            .collect();

        if let Some(group_by) = &builder.group_by {
            for field in group_by.fields.iter().rev() {
                let mut terms = EsAggregation::terms(field.clone());
                terms.aggs = level;
                level = BTreeMap::new();
                level.insert(field.clone(), terms);
            }
        }
        level
    }

    /// Full search body for a fetch or aggregate call
    pub async fn search_request(builder: &QueryBuilder) -> Result<SearchRequest> {
        builder.validate_search()?;
        let compiled = Self::compile_unchecked(builder).await?;

        let mut request = SearchRequest::new(compiled.into_query());
        request.sort = Self::sort_clauses(builder);
        request.size = builder.limit;
        request.from = builder.from;
        request.aggs = Self::aggregations(builder);
        Ok(request)
    }
}
