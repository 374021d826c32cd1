//! GraphQL `Get` query construction for Weaviate searches.

use strum::{Display, EnumString};

use crate::error::HyvError;

/// Comparison and boolean operators accepted in `where` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum WhereOperator {
    And,
    Or,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Like,
    IsNull,
    ContainsAny,
    ContainsAll,
}

/// A typed filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    Text(String),
    Int(i64),
    Number(f64),
    Boolean(bool),
    Date(String),
}

impl WhereValue {
    /// A `valueNumber` operand. GraphQL has no literal for NaN or infinity,
    /// so those are rejected.
    pub fn number(n: f64) -> Result<Self, HyvError> {
        finite("valueNumber", n)?;
        Ok(Self::Number(n))
    }

    fn check(&self) -> Result<(), HyvError> {
        match self {
            Self::Number(n) => finite("valueNumber", *n),
            _ => Ok(()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Text(s) => format!("valueText: {}", quote(s)),
            Self::Int(i) => format!("valueInt: {i}"),
            Self::Number(n) => format!("valueNumber: {n}"),
            Self::Boolean(b) => format!("valueBoolean: {b}"),
            Self::Date(d) => format!("valueDate: {}", quote(d)),
        }
    }
}

/// A `where` filter, either a leaf comparison or an `And`/`Or` of operands.
///
/// ```
/// use hyv::store::weaviate::{WhereFilter, WhereOperator, WhereValue};
///
/// let filter = WhereFilter::and(vec![
///     WhereFilter::leaf(["text"], WhereOperator::Equal, WhereValue::Text("hi".into())),
///     WhereFilter::leaf(["score"], WhereOperator::GreaterThan, WhereValue::Number(0.5)),
/// ]);
/// assert!(filter.render().starts_with("{operator: And"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WhereFilter {
    pub path: Vec<String>,
    pub operator: WhereOperator,
    pub value: Option<WhereValue>,
    pub operands: Vec<WhereFilter>,
}

impl WhereFilter {
    pub fn leaf<I, S>(path: I, operator: WhereOperator, value: WhereValue) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            operator,
            value: Some(value),
            operands: Vec::new(),
        }
    }

    pub fn and(operands: Vec<WhereFilter>) -> Self {
        Self::group(WhereOperator::And, operands)
    }

    pub fn or(operands: Vec<WhereFilter>) -> Self {
        Self::group(WhereOperator::Or, operands)
    }

    fn group(operator: WhereOperator, operands: Vec<WhereFilter>) -> Self {
        Self {
            path: Vec::new(),
            operator,
            value: None,
            operands,
        }
    }

    /// Check every operand in the tree for values GraphQL cannot express.
    pub fn validate(&self) -> Result<(), HyvError> {
        if let Some(value) = &self.value {
            value.check()?;
        }
        self.operands.iter().try_for_each(WhereFilter::validate)
    }

    /// Render as a GraphQL input object.
    pub fn render(&self) -> String {
        let mut parts = vec![format!("operator: {}", self.operator)];
        if !self.path.is_empty() {
            let path: Vec<String> = self.path.iter().map(|p| quote(p)).collect();
            parts.push(format!("path: [{}]", path.join(", ")));
        }
        if let Some(value) = &self.value {
            parts.push(value.render());
        }
        if !self.operands.is_empty() {
            let operands: Vec<String> = self.operands.iter().map(WhereFilter::render).collect();
            parts.push(format!("operands: [{}]", operands.join(", ")));
        }
        format!("{{{}}}", parts.join(", "))
    }
}

/// Similarity options for `nearText` searches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NearTextOptions {
    /// Maximum vector distance for a result to count as a match.
    pub distance: Option<f64>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Build `{ Get { Class(args) { fields } } }`.
pub(crate) fn get_query(class_name: &str, fields: &str, args: &[String]) -> Result<String, HyvError> {
    validate_class_name(class_name)?;
    if fields.trim().is_empty() {
        return Err(HyvError::InvalidArgument(
            "search needs at least one field".to_string(),
        ));
    }
    let args = if args.is_empty() {
        String::new()
    } else {
        format!("({})", args.join(", "))
    };
    Ok(format!(
        "{{ Get {{ {class_name}{args} {{ {} }} }} }}",
        fields.trim()
    ))
}

pub(crate) fn where_args(filter: Option<&WhereFilter>) -> Result<Vec<String>, HyvError> {
    let Some(filter) = filter else {
        return Ok(Vec::new());
    };
    filter.validate()?;
    Ok(vec![format!("where: {}", filter.render())])
}

pub(crate) fn near_text_args(
    concepts: &[String],
    options: NearTextOptions,
) -> Result<Vec<String>, HyvError> {
    let concepts: Vec<String> = concepts.iter().map(|c| quote(c)).collect();
    let mut near = format!("concepts: [{}]", concepts.join(", "));
    if let Some(distance) = options.distance {
        finite("distance", distance)?;
        near.push_str(&format!(", distance: {distance}"));
    }
    let mut args = vec![format!("nearText: {{{near}}}")];
    if let Some(limit) = options.limit {
        args.push(format!("limit: {limit}"));
    }
    Ok(args)
}

pub(crate) fn validate_class_name(class_name: &str) -> Result<(), HyvError> {
    let mut chars = class_name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(HyvError::InvalidArgument(format!(
            "`{class_name}` is not a valid class name"
        )))
    }
}

fn finite(what: &str, n: f64) -> Result<(), HyvError> {
    if n.is_finite() {
        Ok(())
    } else {
        Err(HyvError::InvalidArgument(format!(
            "{what} must be a finite number, got {n}"
        )))
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
