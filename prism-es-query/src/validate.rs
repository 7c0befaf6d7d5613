//! Validation pass over an accumulated query
//!
//! Runs before any compilation or engine round-trip and stops at the
//! first failure.

use crate::builder::{ClauseSet, QueryBuilder};
use crate::error::ValidationError;
use crate::predicate::{ClauseContext, Predicate, SetPredicate};
use crate::schema::FieldSchema;

/// A predicate that can check itself
trait Checked {
    fn field(&self) -> &str;
    fn check(&self) -> Result<(), ValidationError>;
}

impl<C: ClauseContext> Checked for Predicate<C> {
    fn field(&self) -> &str {
        Predicate::field(self)
    }

    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl<C: ClauseContext> Checked for SetPredicate<C> {
    fn field(&self) -> &str {
        SetPredicate::field(self)
    }

    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

fn check_field(schema: Option<&FieldSchema>, field: &str) -> Result<(), ValidationError> {
    match schema {
        Some(schema) if !schema.contains(field) => {
            Err(ValidationError::UnknownField(field.to_string()))
        }
        _ => Ok(()),
    }
}

fn check_all<T: Checked>(
    predicates: &[T],
    schema: Option<&FieldSchema>,
    nested: bool,
) -> Result<(), ValidationError> {
    for predicate in predicates {
        if nested && !predicate.field().contains('.') {
            return Err(ValidationError::MalformedNestedPath {
                field: predicate.field().to_string(),
            });
        }
        predicate.check()?;
        check_field(schema, predicate.field())?;
    }
    Ok(())
}

/// Sets before scalars within each family; families in compilation order
fn check_clause_set(
    clauses: &ClauseSet,
    schema: Option<&FieldSchema>,
    nested: bool,
) -> Result<(), ValidationError> {
    check_all(&clauses.where_ins, schema, nested)?;
    check_all(&clauses.where_not_ins, schema, nested)?;
    check_all(&clauses.wheres, schema, nested)?;

    check_all(&clauses.filter_ins, schema, nested)?;
    check_all(&clauses.filters, schema, nested)?;

    check_all(&clauses.match_ins, schema, nested)?;
    check_all(&clauses.match_not_ins, schema, nested)?;
    check_all(&clauses.matches, schema, nested)?;

    check_all(&clauses.phrase_ins, schema, nested)?;
    check_all(&clauses.phrase_not_ins, schema, nested)?;
    check_all(&clauses.phrases, schema, nested)
}

impl QueryBuilder {
    /// Validate every predicate, top level first, then each nested group
    pub fn validate_must_clauses(&self) -> Result<(), ValidationError> {
        let schema = self.schema.as_ref();
        check_clause_set(&self.clauses, schema, false)?;

        for group in &self.nested {
            if group.path.is_empty() {
                let field = group
                    .clauses
                    .fields()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                return Err(ValidationError::MalformedNestedPath { field });
            }
            check_clause_set(&group.clauses, schema, true)?;
        }
        Ok(())
    }

    /// Sort, group-by and stats directives
    pub fn validate_directives(&self) -> Result<(), ValidationError> {
        let schema = self.schema.as_ref();

        for sort in &self.sorts {
            sort.validate()?;
            check_field(schema, &sort.field)?;
        }

        if let Some(group_by) = &self.group_by {
            if group_by.fields.is_empty() || group_by.fields.iter().any(|f| f.trim().is_empty()) {
                return Err(ValidationError::EmptyGroupBy);
            }
            for field in &group_by.fields {
                check_field(schema, field)?;
            }
        }

        for field in &self.stats {
            check_field(schema, field)?;
        }
        Ok(())
    }

    pub fn validate_limit(&self) -> Result<(), ValidationError> {
        match self.limit {
            Some(limit) if limit <= 0 => Err(ValidationError::InvalidLimit(limit)),
            _ => Ok(()),
        }
    }

    pub fn validate_from(&self) -> Result<(), ValidationError> {
        match self.from {
            Some(from) if from < 0 => Err(ValidationError::InvalidOffset(from)),
            _ => Ok(()),
        }
    }

    /// Everything a paged search needs: clauses, directives, limit and offset
    pub fn validate_search(&self) -> Result<(), ValidationError> {
        self.validate_must_clauses()?;
        self.validate_directives()?;
        self.validate_limit()?;
        self.validate_from()
    }
}
