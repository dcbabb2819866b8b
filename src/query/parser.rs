//! Query Parser
//!
//! Parses the SQL subset into a `ParsedQuery`.
//!
//! # Supported Syntax
//!
//! ```text
//! SELECT item [AS alias] [, ...]
//! FROM source
//! [WHERE cond [AND|OR cond ...]]
//! [GROUP BY expr [, ...]]
//! [ORDER BY expr [ASC|DESC] [, ...]]
//! [LIMIT n [OFFSET m]]
//! ```
//!
//! Items are `*`, a column, `DATE|HOUR|WEEK|MONTH(timestamp)` or
//! `SUM|AVG|MIN|MAX|COUNT(column)`. Columns with spaces or punctuation go
//! in backticks. Conditions are `col op literal`, `col LIKE 'pat'`,
//! `col IN (a, b)`, `col IS [NOT] NULL`.
//!
//! # Examples
//!
//! ```text
//! SELECT * FROM health_data WHERE `Step Count (steps)` >= 5000
//! SELECT WEEK(timestamp) AS week, AVG(`Resting Heart Rate (bpm)`) FROM health_data GROUP BY WEEK(timestamp)
//! SELECT `Workout Type` FROM health_data WHERE `Workout Type` LIKE '%walk%' ORDER BY timestamp DESC LIMIT 10
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{map, map_res, not, opt, recognize, value, verify},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryOutcome};
use crate::storage::types::parse_number;
use crate::storage::{parse_timestamp, Value, Zone, TIMESTAMP_COLUMN};

/// Words that cannot be used as bare identifiers
const RESERVED: [&str; 18] = [
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "BY", "LIMIT", "OFFSET", "AND", "OR", "AS",
    "ASC", "DESC", "IS", "NOT", "NULL", "LIKE", "IN",
];

/// Characters shown around a syntax error
const EXCERPT_LEN: usize = 32;

/// Parse a query string, resolving naive date literals in local time
pub fn parse_query(input: &str) -> QueryOutcome<ParsedQuery> {
    parse_query_in(input, &Zone::Local)
}

/// Parse a query string, resolving naive date literals in `zone`
pub fn parse_query_in(input: &str, zone: &Zone) -> QueryOutcome<ParsedQuery> {
    let input = input.trim();
    let input = input.strip_suffix(';').unwrap_or(input).trim_end();

    if keyword("SELECT")(input).is_err() {
        return Err(QueryError::invalid("Missing SELECT clause"));
    }
    let (rest, select) = select_clause(input).map_err(|_| malformed("SELECT", input))?;

    let rest = rest.trim_start();
    if keyword("FROM")(rest).is_err() {
        return Err(QueryError::invalid("Missing FROM clause"));
    }
    let (rest, from) = from_clause(rest).map_err(|_| malformed("FROM", rest))?;

    let (rest, conditions) = optional_clause(rest, "WHERE", "WHERE", where_clause)?;
    let (rest, group_by) = optional_clause(rest, "GROUP", "GROUP BY", group_by_clause)?;
    let (rest, order_by) = optional_clause(rest, "ORDER", "ORDER BY", order_by_clause)?;
    let (rest, limit) = optional_clause(rest, "LIMIT", "LIMIT", limit_clause)?;

    let rest = rest.trim();
    if !rest.is_empty() {
        return Err(QueryError::invalid(format!(
            "Unexpected input after query: '{}'",
            excerpt(rest)
        )));
    }

    let (conditions, used_or) = conditions.unwrap_or_default();
    if used_or {
        tracing::warn!("OR in WHERE clause is not supported, evaluating all conditions with AND");
    }
    let filters = conditions
        .into_iter()
        .map(|c| c.into_filter(zone))
        .collect();

    let (limit, offset) = match limit {
        Some((n, offset)) => (Some(n), Some(offset.unwrap_or(0))),
        None => (None, None),
    };

    Ok(ParsedQuery {
        select,
        from,
        filters,
        group_by: group_by.unwrap_or_default(),
        order_by: order_by.unwrap_or_default(),
        limit,
        offset,
    })
}

/// Type a literal the way it reads
///
/// Numeric text becomes a number, date-looking text that parses as a
/// timestamp becomes an instant, anything else stays text.
pub fn coerce_literal(raw: &str, zone: &Zone) -> Value {
    if let Some(n) = parse_number(raw) {
        return Value::Number(n);
    }
    if looks_like_date(raw) {
        if let Ok(ts) = parse_timestamp(raw, zone) {
            return Value::Time(ts);
        }
    }
    Value::Text(raw.to_string())
}

fn looks_like_date(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit()) && s.contains(&['-', '/', '.'][..])
}

fn malformed(clause: &str, input: &str) -> QueryError {
    QueryError::invalid(format!(
        "Malformed {} clause near '{}'",
        clause,
        excerpt(input)
    ))
}

fn excerpt(s: &str) -> String {
    s.chars().take(EXCERPT_LEN).collect()
}

/// Run `parser` if the input starts with `kw`, naming the clause on failure
fn optional_clause<'a, O, P>(
    input: &'a str,
    kw: &'static str,
    clause: &str,
    mut parser: P,
) -> QueryOutcome<(&'a str, Option<O>)>
where
    P: FnMut(&'a str) -> IResult<&'a str, O>,
{
    let trimmed = input.trim_start();
    if keyword(kw)(trimmed).is_err() {
        return Ok((input, None));
    }

    parser(trimmed)
        .map(|(rest, out)| (rest, Some(out)))
        .map_err(|_| malformed(clause, trimmed))
}

// ---------------------------------------------------------------------------
// Lexical pieces
// ---------------------------------------------------------------------------

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Case-insensitive keyword not followed by an identifier character
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(kw), not(satisfy(is_ident_char)))
}

fn quoted_identifier(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('`'), take_while1(|c: char| c != '`'), char('`')),
        String::from,
    )(input)
}

fn bare_identifier(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |s: &str| !RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(s)),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, String> {
    alt((quoted_identifier, map(bare_identifier, String::from)))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('\''),
            map(take_while(|c: char| c != '\''), String::from),
            char('\''),
        ),
        delimited(
            char('"'),
            map(take_while(|c: char| c != '"'), String::from),
            char('"'),
        ),
    ))(input)
}

fn bare_literal(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| {
            !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | ';' | '\'' | '"')
        }),
        String::from,
    )(input)
}

fn literal(input: &str) -> IResult<&str, String> {
    alt((string_literal, bare_literal))(input)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn aggregate_func(input: &str) -> IResult<&str, AggregateFunc> {
    alt((
        value(AggregateFunc::Sum, tag_no_case("SUM")),
        value(AggregateFunc::Avg, tag_no_case("AVG")),
        value(AggregateFunc::Min, tag_no_case("MIN")),
        value(AggregateFunc::Max, tag_no_case("MAX")),
        value(AggregateFunc::Count, tag_no_case("COUNT")),
    ))(input)
}

/// Parenthesised argument: `( arg )`
fn call_args<'a, O, P>(arg: P) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    P: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(
        pair(multispace0, char('(')),
        delimited(multispace0, arg, multispace0),
        char(')'),
    )
}

fn aggregate_expr(input: &str) -> IResult<&str, ColumnExpr> {
    let (rest, func) = aggregate_func(input)?;
    let (rest, column) = call_args(alt((map(tag("*"), String::from), identifier)))(rest)?;

    if column == "*" && func != AggregateFunc::Count {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, ColumnExpr::Aggregate(func, column)))
}

fn time_bucket(input: &str) -> IResult<&str, TimeBucket> {
    alt((
        value(TimeBucket::Date, tag_no_case("DATE")),
        value(TimeBucket::Hour, tag_no_case("HOUR")),
        value(TimeBucket::Week, tag_no_case("WEEK")),
        value(TimeBucket::Month, tag_no_case("MONTH")),
    ))(input)
}

fn bucket_expr(input: &str) -> IResult<&str, ColumnExpr> {
    let (rest, bucket) = time_bucket(input)?;
    let (rest, _) = call_args(verify(identifier, |s: &str| {
        s.eq_ignore_ascii_case(TIMESTAMP_COLUMN)
    }))(rest)?;
    Ok((rest, ColumnExpr::Bucket(bucket)))
}

/// A plain column; a name followed by `(` is an unknown function
fn field_expr(input: &str) -> IResult<&str, ColumnExpr> {
    map(
        terminated(identifier, not(pair(multispace0, char('(')))),
        ColumnExpr::Field,
    )(input)
}

fn column_expr(input: &str) -> IResult<&str, ColumnExpr> {
    alt((
        value(ColumnExpr::Star, char('*')),
        aggregate_expr,
        bucket_expr,
        field_expr,
    ))(input)
}

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    let (input, expr) = column_expr(input)?;
    let (input, alias) = opt(preceded(
        tuple((multispace1, keyword("AS"), multispace1)),
        identifier,
    ))(input)?;
    Ok((input, SelectItem { expr, alias }))
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

fn select_clause(input: &str) -> IResult<&str, Vec<SelectItem>> {
    preceded(
        pair(keyword("SELECT"), multispace0),
        separated_list1(comma, select_item),
    )(input)
}

fn from_clause(input: &str) -> IResult<&str, String> {
    preceded(pair(keyword("FROM"), multispace1), identifier)(input)
}

/// Right-hand side of a condition before typing
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    None,
    Literal(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
struct RawCondition {
    column: String,
    op: FilterOp,
    operand: Operand,
}

impl RawCondition {
    fn into_filter(self, zone: &Zone) -> QueryFilter {
        let value = match (self.op, self.operand) {
            (_, Operand::None) => FilterValue::None,
            // LIKE matches on text, the pattern is never retyped
            (FilterOp::Like, Operand::Literal(raw)) => FilterValue::Scalar(Value::Text(raw)),
            (_, Operand::Literal(raw)) => FilterValue::Scalar(coerce_literal(&raw, zone)),
            (_, Operand::List(items)) => FilterValue::List(
                items.iter().map(|item| coerce_literal(item, zone)).collect(),
            ),
        };
        QueryFilter::new(self.column, self.op, value)
    }
}

fn comparison_op(input: &str) -> IResult<&str, FilterOp> {
    map_res(
        alt((
            tag(">="),
            tag("<="),
            tag("!="),
            tag("<>"),
            tag("="),
            tag(">"),
            tag("<"),
        )),
        |s: &str| FilterOp::from_symbol(s).ok_or(()),
    )(input)
}

fn condition(input: &str) -> IResult<&str, RawCondition> {
    let (input, column) = identifier(input)?;
    let (input, (op, operand)) = alt((
        map(
            tuple((
                multispace1,
                keyword("IS"),
                multispace1,
                keyword("NOT"),
                multispace1,
                keyword("NULL"),
            )),
            |_| (FilterOp::IsNotNull, Operand::None),
        ),
        map(
            tuple((multispace1, keyword("IS"), multispace1, keyword("NULL"))),
            |_| (FilterOp::IsNull, Operand::None),
        ),
        map(
            preceded(tuple((multispace1, keyword("LIKE"), multispace0)), literal),
            |pattern| (FilterOp::Like, Operand::Literal(pattern)),
        ),
        map(
            preceded(
                tuple((multispace1, keyword("IN"), multispace0)),
                delimited(
                    pair(char('('), multispace0),
                    separated_list0(comma, literal),
                    pair(multispace0, char(')')),
                ),
            ),
            |items| (FilterOp::In, Operand::List(items)),
        ),
        map(
            pair(
                preceded(multispace0, comparison_op),
                preceded(multispace0, literal),
            ),
            |(op, raw)| (op, Operand::Literal(raw)),
        ),
    ))(input)?;

    Ok((input, RawCondition { column, op, operand }))
}

/// `AND` or `OR`; true for `OR`
fn connector(input: &str) -> IResult<&str, bool> {
    delimited(
        multispace1,
        alt((value(false, keyword("AND")), value(true, keyword("OR")))),
        multispace1,
    )(input)
}

fn where_clause(input: &str) -> IResult<&str, (Vec<RawCondition>, bool)> {
    let (input, _) = pair(keyword("WHERE"), multispace1)(input)?;
    let (input, first) = condition(input)?;
    let (input, rest) = many0(pair(connector, condition))(input)?;

    let used_or = rest.iter().any(|(is_or, _)| *is_or);
    let mut conditions = vec![first];
    conditions.extend(rest.into_iter().map(|(_, c)| c));
    Ok((input, (conditions, used_or)))
}

fn group_by_clause(input: &str) -> IResult<&str, Vec<ColumnExpr>> {
    preceded(
        tuple((keyword("GROUP"), multispace1, keyword("BY"), multispace1)),
        separated_list1(comma, alt((bucket_expr, field_expr))),
    )(input)
}

fn sort_direction(input: &str) -> IResult<&str, SortDirection> {
    alt((
        value(SortDirection::Asc, keyword("ASC")),
        value(SortDirection::Desc, keyword("DESC")),
    ))(input)
}

fn order_item(input: &str) -> IResult<&str, OrderBy> {
    let (input, expr) = alt((aggregate_expr, bucket_expr, field_expr))(input)?;
    let (input, direction) = opt(preceded(multispace1, sort_direction))(input)?;
    Ok((
        input,
        OrderBy {
            expr,
            direction: direction.unwrap_or_default(),
        },
    ))
}

fn order_by_clause(input: &str) -> IResult<&str, Vec<OrderBy>> {
    preceded(
        tuple((keyword("ORDER"), multispace1, keyword("BY"), multispace1)),
        separated_list1(comma, order_item),
    )(input)
}

fn count(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn limit_clause(input: &str) -> IResult<&str, (usize, Option<usize>)> {
    let (input, limit) = preceded(pair(keyword("LIMIT"), multispace1), count)(input)?;
    let (input, offset) = opt(preceded(
        tuple((multispace1, keyword("OFFSET"), multispace1)),
        count,
    ))(input)?;
    Ok((input, (limit, offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn parse(q: &str) -> ParsedQuery {
        parse_query_in(q, &Zone::utc()).unwrap()
    }

    fn parse_err(q: &str) -> String {
        match parse_query_in(q, &Zone::utc()) {
            Err(QueryError::InvalidQuery(msg)) => msg,
            other => panic!("expected InvalidQuery, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_select_star() {
        let query = parse("SELECT * FROM health_data");

        assert_eq!(query.select, vec![SelectItem::new(ColumnExpr::Star)]);
        assert_eq!(query.from, "health_data");
        assert!(query.filters.is_empty());
        assert!(query.group_by.is_empty());
        assert_eq!(query.limit, None);
        assert_eq!(query.offset, None);
    }

    #[test]
    fn test_parse_quoted_columns_and_aliases() {
        let query = parse(
            "SELECT `Heart Rate [Avg] (bpm)` AS hr, SUM(`Step Count (steps)`) AS total FROM health_data",
        );

        assert_eq!(
            query.select,
            vec![
                SelectItem::new(ColumnExpr::Field("Heart Rate [Avg] (bpm)".into())).with_alias("hr"),
                SelectItem::new(ColumnExpr::Aggregate(
                    AggregateFunc::Sum,
                    "Step Count (steps)".into()
                ))
                .with_alias("total"),
            ]
        );
    }

    #[test]
    fn test_parse_case_insensitive_and_semicolon() {
        let query = parse("select avg(steps) from health_data group by date(timestamp) limit 3;");

        assert_eq!(
            query.select[0].expr,
            ColumnExpr::Aggregate(AggregateFunc::Avg, "steps".into())
        );
        assert_eq!(query.group_by, vec![ColumnExpr::Bucket(TimeBucket::Date)]);
        assert_eq!(query.limit, Some(3));
        assert_eq!(query.offset, Some(0));
    }

    #[test]
    fn test_parse_group_by_buckets() {
        let query = parse(
            "SELECT WEEK(timestamp), MONTH(timestamp), COUNT(*) FROM health_data \
             GROUP BY WEEK(timestamp), MONTH(timestamp)",
        );

        assert_eq!(
            query.group_by,
            vec![
                ColumnExpr::Bucket(TimeBucket::Week),
                ColumnExpr::Bucket(TimeBucket::Month)
            ]
        );
        assert_eq!(
            query.select[2].expr,
            ColumnExpr::Aggregate(AggregateFunc::Count, "*".into())
        );
    }

    #[test]
    fn test_parse_where_operators() {
        let query = parse(
            "SELECT * FROM health_data WHERE a = 1 AND b != 'x' AND c <> 2 AND d > 3 \
             AND e < 4 AND f >= 5 AND g <= 6",
        );

        let ops: Vec<FilterOp> = query.filters.iter().map(|f| f.op).collect();
        assert_eq!(
            ops,
            vec![
                FilterOp::Eq,
                FilterOp::Ne,
                FilterOp::Ne,
                FilterOp::Gt,
                FilterOp::Lt,
                FilterOp::Gte,
                FilterOp::Lte
            ]
        );
        assert_eq!(query.filters[0].value, FilterValue::Scalar(Value::Number(1.0)));
        assert_eq!(query.filters[1].value, FilterValue::Scalar(Value::Text("x".into())));
    }

    #[test]
    fn test_parse_like_in_null() {
        let query = parse(
            "SELECT * FROM health_data WHERE `Workout Type` LIKE '%Walk%' \
             AND steps IN (100, 'abc', 300) AND hr IS NULL AND hrv IS NOT NULL",
        );

        assert_eq!(
            query.filters[0],
            QueryFilter::new(
                "Workout Type",
                FilterOp::Like,
                FilterValue::Scalar(Value::Text("%Walk%".into()))
            )
        );
        assert_eq!(
            query.filters[1].value,
            FilterValue::List(vec![
                Value::Number(100.0),
                Value::Text("abc".into()),
                Value::Number(300.0)
            ])
        );
        assert_eq!(query.filters[2].op, FilterOp::IsNull);
        assert_eq!(query.filters[2].value, FilterValue::None);
        assert_eq!(query.filters[3].op, FilterOp::IsNotNull);
    }

    #[test]
    fn test_parse_date_literal_becomes_instant() {
        let query = parse("SELECT * FROM health_data WHERE timestamp >= '2025-01-15 08:30:00'");

        assert_eq!(
            query.filters[0].value,
            FilterValue::Scalar(Value::Time(
                Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 0).unwrap()
            ))
        );
    }

    #[test]
    fn test_coerce_literal() {
        let zone = Zone::utc();

        assert_eq!(coerce_literal("42", &zone), Value::Number(42.0));
        assert_eq!(coerce_literal("-1.5", &zone), Value::Number(-1.5));
        assert_eq!(
            coerce_literal("2025-01-15", &zone),
            Value::Time(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(coerce_literal("2025-13-45", &zone), Value::Text("2025-13-45".into()));
        assert_eq!(coerce_literal("walk", &zone), Value::Text("walk".into()));
    }

    #[test]
    fn test_parse_or_is_treated_as_and() {
        let query = parse("SELECT * FROM health_data WHERE a > 1 OR b < 2");
        assert_eq!(query.filters.len(), 2);
    }

    #[test]
    fn test_parse_quoted_and_inside_string() {
        let query = parse("SELECT * FROM health_data WHERE note = 'salt AND pepper'");

        assert_eq!(query.filters.len(), 1);
        assert_eq!(
            query.filters[0].value,
            FilterValue::Scalar(Value::Text("salt AND pepper".into()))
        );
    }

    #[test]
    fn test_parse_order_by_and_pagination() {
        let query = parse(
            "SELECT * FROM health_data ORDER BY steps DESC, timestamp LIMIT 2 OFFSET 1",
        );

        assert_eq!(
            query.order_by,
            vec![
                OrderBy::desc(ColumnExpr::Field("steps".into())),
                OrderBy::asc(ColumnExpr::Field("timestamp".into()))
            ]
        );
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.offset, Some(1));
    }

    #[test]
    fn test_identifier_may_start_with_keyword() {
        let query = parse("SELECT orders, description FROM health_data ORDER BY orders ASC");

        assert_eq!(query.select[0].expr, ColumnExpr::Field("orders".into()));
        assert_eq!(query.order_by[0].direction, SortDirection::Asc);
    }

    #[test]
    fn test_missing_select() {
        assert_eq!(parse_err("FROM health_data"), "Missing SELECT clause");
        assert_eq!(parse_err(""), "Missing SELECT clause");
    }

    #[test]
    fn test_missing_from() {
        assert_eq!(parse_err("SELECT steps"), "Missing FROM clause");
        assert_eq!(parse_err("SELECT steps WHERE steps > 1"), "Missing FROM clause");
    }

    #[test]
    fn test_malformed_clauses() {
        assert!(parse_err("SELECT FROM health_data").starts_with("Malformed SELECT clause"));
        assert!(parse_err("SELECT * FROM health_data WHERE").starts_with("Malformed WHERE clause"));
        assert!(parse_err("SELECT * FROM health_data WHERE steps ~ 3")
            .starts_with("Malformed WHERE clause"));
        assert!(parse_err("SELECT * FROM health_data GROUP steps")
            .starts_with("Malformed GROUP BY clause"));
        assert!(parse_err("SELECT * FROM health_data LIMIT ten")
            .starts_with("Malformed LIMIT clause"));
        assert!(parse_err("SELECT SUM(*) FROM health_data").starts_with("Malformed SELECT clause"));
    }

    #[test]
    fn test_trailing_garbage() {
        let msg = parse_err("SELECT * FROM health_data LIMIT 5 banana");
        assert!(msg.starts_with("Unexpected input after query"));
    }
}
