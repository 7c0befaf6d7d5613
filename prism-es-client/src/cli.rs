//! Command line predicate parsing

use crate::error::{ClientError, Result};
use clap::Args;
use prism_es_query::{QueryBuilder, Scalar};
use regex::Regex;

const FIELD: &str = r"[A-Za-z_@][\w.@-]*";

/// Predicates and directives shared by the query subcommands
#[derive(Args, Debug, Default, Clone)]
pub struct QueryArgs {
    /// Scored predicate, e.g. "subject_id>=2"
    #[arg(long = "where", value_name = "FIELD<OP>VALUE")]
    pub wheres: Vec<String>,

    /// Scored set membership, e.g. "id=1,2,3"
    #[arg(long = "where-in", value_name = "FIELD=V1,V2")]
    pub where_ins: Vec<String>,

    #[arg(long = "where-not-in", value_name = "FIELD=V1,V2")]
    pub where_not_ins: Vec<String>,

    /// Non-scoring predicate
    #[arg(long = "filter", value_name = "FIELD<OP>VALUE")]
    pub filters: Vec<String>,

    #[arg(long = "filter-in", value_name = "FIELD=V1,V2")]
    pub filter_ins: Vec<String>,

    /// Full-text predicate, "=" or "<>"
    #[arg(long = "match", value_name = "FIELD<OP>VALUE")]
    pub matches: Vec<String>,

    #[arg(long = "match-in", value_name = "FIELD=V1,V2")]
    pub match_ins: Vec<String>,

    #[arg(long = "match-phrase", value_name = "FIELD<OP>VALUE")]
    pub phrases: Vec<String>,

    /// Sort key, ascending unless suffixed with ":desc"
    #[arg(long = "sort", value_name = "FIELD[:asc|desc]")]
    pub sorts: Vec<String>,

    #[arg(long)]
    pub limit: Option<i64>,

    #[arg(long)]
    pub from: Option<i64>,

    #[arg(long = "group-by", value_delimiter = ',')]
    pub group_by: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub stats: Vec<String>,
}

impl QueryArgs {
    pub fn to_builder(&self) -> Result<QueryBuilder> {
        let mut query = QueryBuilder::new();

        for raw in &self.wheres {
            let (field, op, value) = parse_clause(raw)?;
            query.where_(field, &op, value);
        }
        for raw in &self.where_ins {
            let (field, values) = parse_set(raw)?;
            query.where_in(field, values);
        }
        for raw in &self.where_not_ins {
            let (field, values) = parse_set(raw)?;
            query.where_not_in(field, values);
        }
        for raw in &self.filters {
            let (field, op, value) = parse_clause(raw)?;
            query.filter(field, &op, value);
        }
        for raw in &self.filter_ins {
            let (field, values) = parse_set(raw)?;
            query.filter_in(field, values);
        }
        for raw in &self.matches {
            let (field, op, value) = parse_clause(raw)?;
            query.match_(field, &op, value);
        }
        for raw in &self.match_ins {
            let (field, values) = parse_set(raw)?;
            query.match_in(field, values);
        }
        for raw in &self.phrases {
            let (field, op, value) = parse_clause(raw)?;
            query.match_phrase(field, &op, value);
        }
        for raw in &self.sorts {
            let (field, ascending) = parse_sort(raw)?;
            query.order_by(field, ascending);
        }

        if let Some(limit) = self.limit {
            query.limit(limit);
        }
        if let Some(from) = self.from {
            query.from(from);
        }
        if !self.group_by.is_empty() {
            query.group_by(self.group_by.iter().cloned());
        }
        if !self.stats.is_empty() {
            query.stats(self.stats.iter().cloned());
        }
        Ok(query)
    }
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| ClientError::InvalidArgument(e.to_string()))
}

/// Integers, then floats, otherwise text with optional surrounding quotes
pub fn parse_value(raw: &str) -> Scalar {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Scalar::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Scalar::Float(f);
        }
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    Scalar::Text(unquoted.to_string())
}

/// `field<op>value`, op one of `= <> > < >= <=`
pub fn parse_clause(raw: &str) -> Result<(String, String, Scalar)> {
    let re = pattern(&format!(r"^\s*({FIELD})\s*(<>|>=|<=|=|>|<)\s*(.*?)\s*$"))?;
    let caps = re
        .captures(raw)
        .ok_or_else(|| ClientError::InvalidArgument(format!("expected FIELD<OP>VALUE, got '{}'", raw)))?;
    Ok((
        caps[1].to_string(),
        caps[2].to_string(),
        parse_value(&caps[3]),
    ))
}

/// `field=v1,v2,...`
pub fn parse_set(raw: &str) -> Result<(String, Vec<Scalar>)> {
    let re = pattern(&format!(r"^\s*({FIELD})\s*=\s*(.+)$"))?;
    let caps = re
        .captures(raw)
        .ok_or_else(|| ClientError::InvalidArgument(format!("expected FIELD=V1,V2, got '{}'", raw)))?;
    let values = caps[2]
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_value)
        .collect();
    Ok((caps[1].to_string(), values))
}

/// `field`, `field:asc` or `field:desc`
pub fn parse_sort(raw: &str) -> Result<(String, bool)> {
    let (field, direction) = match raw.rsplit_once(':') {
        Some((field, direction)) => (field.trim(), direction.trim()),
        None => (raw.trim(), "asc"),
    };
    if field.is_empty() {
        return Err(ClientError::InvalidArgument(format!("empty sort field in '{}'", raw)));
    }
    match direction.to_ascii_lowercase().as_str() {
        "asc" => Ok((field.to_string(), true)),
        "desc" => Ok((field.to_string(), false)),
        other => Err(ClientError::InvalidArgument(format!(
            "unknown sort direction '{}'",
            other
        ))),
    }
}
