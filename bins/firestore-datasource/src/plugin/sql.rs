//! SQL-subset front end.
//!
//! Supported:
//! - SELECT: `*`, columns or dotted field paths with optional aliases,
//!   `__name__` for the document id, or a lone `COUNT(*)` (aliasable)
//! - FROM: one collection (quote paths that contain `/`)
//! - WHERE: comparisons with literals joined by AND, `IN`, `NOT IN`,
//!   `IS [NOT] NULL`
//! - ORDER BY: columns with ASC/DESC
//! - LIMIT / OFFSET: non-negative integers; `LIMIT 0` returns no rows

use sqlparser::ast::{
    BinaryOperator, Expr, Function, GroupByExpr, Ident, OrderByExpr, Query, Select, SelectItem,
    SetExpr, Statement, TableFactor, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::error::PluginError;
use super::query::{COUNT_COLUMN, FieldRef, Output, Plan, ProjectedColumn};
use super::wire::{CollectionRef, Direction, FieldReference, Filter, Literal, Operator, Order, StructuredQuery};

pub(crate) fn translate(sql: &str) -> Result<Plan, PluginError> {
    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| PluginError::validation(format!("parse SQL: {e}")))?;
    if statements.len() != 1 {
        return Err(PluginError::validation("expected exactly one SELECT statement"));
    }
    let Statement::Query(query) = statements.remove(0) else {
        return Err(PluginError::validation("only SELECT statements are supported"));
    };
    translate_query(*query)
}

fn translate_query(query: Query) -> Result<Plan, PluginError> {
    let Query { with, body, order_by, limit, limit_by, offset, fetch, locks, for_clause, .. } = query;
    if with.is_some() {
        return Err(PluginError::validation("WITH is not supported"));
    }
    if !limit_by.is_empty() || fetch.is_some() {
        return Err(PluginError::validation("only LIMIT and OFFSET can bound the result"));
    }
    if !locks.is_empty() || for_clause.is_some() {
        return Err(PluginError::validation("FOR clauses are not supported"));
    }
    let SetExpr::Select(select) = *body else {
        return Err(PluginError::validation("only plain SELECT ... FROM queries are supported"));
    };
    let select: Select = *select;
    unsupported_clauses(&select)?;

    let target = collection(&select)?;
    let mut structured = StructuredQuery::over(&target);

    let output = projection(&select.projection)?;
    if let Output::Documents(Some(columns)) = &output {
        structured.select(columns.iter().map(|c| match &c.field {
            FieldRef::DocumentId => super::query::DOCUMENT_ID.to_string(),
            FieldRef::Path(segments) => segments.join("."),
        }));
    }

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        predicates(selection, &mut filters)?;
    }
    structured.filter_all(filters);

    for item in &order_by {
        structured.order_by.push(order(item)?);
    }

    // LIMIT 0 stays Some(0): the source answers it with no rows.
    if let Some(limit) = &limit {
        structured.limit = Some(bound(limit).map_err(|e| e.with_context("LIMIT"))?);
    }
    if let Some(offset) = &offset {
        let n = bound(&offset.value).map_err(|e| e.with_context("OFFSET"))?;
        structured.offset = (n > 0).then_some(n);
    }

    Ok(Plan { target, query: structured, output })
}

// ═══════════════════════════════════════════════════════════════
//  Clauses
// ═══════════════════════════════════════════════════════════════

/// Clauses the parser accepts that have no Firestore counterpart.
fn unsupported_clauses(select: &Select) -> Result<(), PluginError> {
    let grouped = match &select.group_by {
        GroupByExpr::Expressions(exprs) => !exprs.is_empty(),
        GroupByExpr::All => true,
    };
    let clause = if select.distinct.is_some() {
        "DISTINCT"
    } else if select.top.is_some() {
        "TOP"
    } else if select.into.is_some() {
        "INTO"
    } else if !select.lateral_views.is_empty() {
        "LATERAL VIEW"
    } else if grouped {
        "GROUP BY"
    } else if select.having.is_some() {
        "HAVING"
    } else if !select.cluster_by.is_empty() {
        "CLUSTER BY"
    } else if !select.distribute_by.is_empty() {
        "DISTRIBUTE BY"
    } else if !select.sort_by.is_empty() {
        "SORT BY"
    } else if !select.named_window.is_empty() {
        "WINDOW"
    } else if select.qualify.is_some() {
        "QUALIFY"
    } else {
        return Ok(());
    };
    Err(PluginError::validation(format!("{clause} is not supported")))
}

fn collection(select: &Select) -> Result<CollectionRef, PluginError> {
    let [from] = select.from.as_slice() else {
        return Err(PluginError::validation("FROM must name exactly one collection"));
    };
    if !from.joins.is_empty() {
        return Err(PluginError::validation("JOIN is not supported"));
    }
    let TableFactor::Table { name, .. } = &from.relation else {
        return Err(PluginError::validation("FROM must name a collection"));
    };
    let path = name.0.iter().map(|i| i.value.as_str()).collect::<Vec<_>>().join("/");
    CollectionRef::parse(&path)
}

fn projection(items: &[SelectItem]) -> Result<Output, PluginError> {
    if let [SelectItem::Wildcard(_)] = items {
        return Ok(Output::Documents(None));
    }
    if let [item] = items {
        let (expr, alias) = match item {
            SelectItem::UnnamedExpr(expr) => (Some(expr), None),
            SelectItem::ExprWithAlias { expr, alias } => (Some(expr), Some(alias.value.clone())),
            _ => (None, None),
        };
        if let Some(Expr::Function(function)) = expr {
            if function.name.to_string().eq_ignore_ascii_case("count") {
                if !is_count_star(function) {
                    return Err(PluginError::validation(format!(
                        "only COUNT(*) is supported, got '{function}'"
                    )));
                }
                return Ok(Output::Count(alias.unwrap_or_else(|| COUNT_COLUMN.to_string())));
            }
        }
    }

    let mut columns: Vec<ProjectedColumn> = Vec::with_capacity(items.len());
    for item in items {
        let (expr, alias) = match item {
            SelectItem::UnnamedExpr(expr) => (expr, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                return Err(PluginError::validation("* cannot be combined with other columns"));
            }
        };
        let path = field_path(expr).ok_or_else(|| {
            PluginError::validation(format!("unsupported select expression '{expr}'"))
        })?;
        let name = alias.unwrap_or_else(|| path.clone());
        if columns.iter().any(|c| c.name == name) {
            return Err(PluginError::validation(format!("duplicate column name '{name}'")));
        }
        columns.push(ProjectedColumn { name, field: FieldRef::parse(&path) });
    }
    Ok(Output::Documents(Some(columns)))
}

/// `COUNT(*)` with no DISTINCT, FILTER or OVER attached.
fn is_count_star(function: &Function) -> bool {
    let text: String = function.to_string().split_whitespace().collect();
    text.eq_ignore_ascii_case("count(*)")
}

fn order(item: &OrderByExpr) -> Result<Order, PluginError> {
    let path = field_path(&item.expr)
        .ok_or_else(|| PluginError::validation(format!("unsupported ORDER BY expression '{}'", item.expr)))?;
    Ok(Order {
        field: FieldReference::new(&path),
        direction: match item.asc {
            Some(false) => Direction::Descending,
            _ => Direction::Ascending,
        },
    })
}

/// Flatten an AND tree into Firestore filters.
fn predicates(expr: &Expr, out: &mut Vec<Filter>) -> Result<(), PluginError> {
    match expr {
        Expr::Nested(inner) => predicates(inner, out),
        Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
            predicates(left, out)?;
            predicates(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let op = comparison(op)
                .ok_or_else(|| PluginError::validation(format!("unsupported operator '{op}'")))?;
            let filter = match (field_path(left), field_path(right)) {
                (Some(path), None) => Filter::compare(&path, op, literal(right)?)?,
                (None, Some(path)) => {
                    let flipped = op.flipped().ok_or_else(|| {
                        PluginError::validation(format!("operator '{}' needs the field on the left", op.symbol()))
                    })?;
                    Filter::compare(&path, flipped, literal(left)?)?
                }
                _ => {
                    return Err(PluginError::validation(format!(
                        "'{expr}' must compare one field with one literal",
                    )));
                }
            };
            out.push(filter);
            Ok(())
        }
        Expr::InList { expr: field, list, negated } => {
            let path = field_path(field)
                .ok_or_else(|| PluginError::validation(format!("IN needs a field, got '{field}'")))?;
            let values = list.iter().map(literal).collect::<Result<Vec<_>, _>>()?;
            let op = if *negated { Operator::NotIn } else { Operator::In };
            out.push(Filter::compare(&path, op, Literal::Array(values))?);
            Ok(())
        }
        Expr::IsNull(field) | Expr::IsNotNull(field) => {
            let path = field_path(field)
                .ok_or_else(|| PluginError::validation(format!("IS NULL needs a field, got '{field}'")))?;
            let op = if matches!(expr, Expr::IsNull(_)) { Operator::Equal } else { Operator::NotEqual };
            out.push(Filter::compare(&path, op, Literal::Null)?);
            Ok(())
        }
        other => Err(PluginError::validation(format!("unsupported WHERE predicate '{other}'"))),
    }
}

fn comparison(op: &BinaryOperator) -> Option<Operator> {
    Some(match op {
        BinaryOperator::Eq => Operator::Equal,
        BinaryOperator::NotEq => Operator::NotEqual,
        BinaryOperator::Lt => Operator::LessThan,
        BinaryOperator::LtEq => Operator::LessThanOrEqual,
        BinaryOperator::Gt => Operator::GreaterThan,
        BinaryOperator::GtEq => Operator::GreaterThanOrEqual,
        _ => return None,
    })
}

// ═══════════════════════════════════════════════════════════════
//  Leaves
// ═══════════════════════════════════════════════════════════════

/// `a`, `a.b` or a quoted `` `a.b` ``, as a dotted field path.
fn field_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => Some(
            idents.iter().map(|i: &Ident| i.value.as_str()).collect::<Vec<_>>().join("."),
        ),
        Expr::Nested(inner) => field_path(inner),
        _ => None,
    }
}

fn literal(expr: &Expr) -> Result<Literal, PluginError> {
    match expr {
        Expr::Value(value) => match value {
            SqlValue::Number(text, _) => number(text),
            SqlValue::SingleQuotedString(s) => Ok(Literal::String(s.clone())),
            SqlValue::Boolean(b) => Ok(Literal::Bool(*b)),
            SqlValue::Null => Ok(Literal::Null),
            other => Err(PluginError::validation(format!("unsupported literal {other}"))),
        },
        Expr::UnaryOp { op: UnaryOperator::Minus, expr } => match literal(expr)? {
            Literal::Integer(i) => Ok(Literal::Integer(-i)),
            Literal::Double(f) => Ok(Literal::Double(-f)),
            _ => Err(PluginError::validation(format!("cannot negate '{expr}'"))),
        },
        Expr::Nested(inner) => literal(inner),
        other => Err(PluginError::validation(format!("expected a literal, got '{other}'"))),
    }
}

fn number(text: &str) -> Result<Literal, PluginError> {
    text.parse::<i64>()
        .map(Literal::Integer)
        .or_else(|_| text.parse::<f64>().map(Literal::Double))
        .map_err(|_| PluginError::validation(format!("invalid number {text}")))
}

/// A non-negative LIMIT or OFFSET.
fn bound(expr: &Expr) -> Result<i32, PluginError> {
    let n = integer(expr)?;
    if n < 0 {
        return Err(PluginError::validation(format!("{n} must not be negative")));
    }
    Ok(n)
}

fn integer(expr: &Expr) -> Result<i32, PluginError> {
    match literal(expr)? {
        Literal::Integer(i) => {
            i32::try_from(i).map_err(|_| PluginError::validation(format!("{i} is out of range")))
        }
        other => Err(PluginError::validation(format!("expected an integer, got {other:?}"))),
    }
}
