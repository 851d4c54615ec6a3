//! DQL text to [`DqlQuery`].
//!
//! The parser only cuts the query into clauses and FROM elements; clause
//! expressions stay as text segments until the planner resolves them against
//! the schema.

use std::collections::HashSet;

pub mod ast;
pub mod common;
pub mod errors;
pub mod tokenizer;

use ast::{ClauseKind, ConditionKind, DqlQuery, FromElement, JoinConditionText, JoinKind, Segment};
use common::{is_identifier, keyword_eq, parse_path, parse_unsigned};
use tokenizer::{Scanner, Span};

use crate::query_planner::errors::QueryError;

struct ClauseMark {
    kind: ClauseKind,
    keyword_start: usize,
    content_start: usize,
}

fn clause_keyword(word: &str, next: Option<&str>) -> Option<(ClauseKind, usize)> {
    let followed_by_by = next.is_some_and(|n| keyword_eq(n, "BY"));
    match word.to_ascii_uppercase().as_str() {
        "SELECT" => Some((ClauseKind::Select, 1)),
        "FROM" => Some((ClauseKind::From, 1)),
        "WHERE" => Some((ClauseKind::Where, 1)),
        "HAVING" => Some((ClauseKind::Having, 1)),
        "LIMIT" => Some((ClauseKind::Limit, 1)),
        "OFFSET" => Some((ClauseKind::Offset, 1)),
        "GROUP" if followed_by_by => Some((ClauseKind::GroupBy, 2)),
        "ORDER" if followed_by_by => Some((ClauseKind::OrderBy, 2)),
        _ => None,
    }
}

/// Parses `text`, reading string literals the standard SQL way.
pub fn parse_query(text: &str) -> Result<DqlQuery, QueryError> {
    parse_query_with(text, Scanner::default())
}

pub fn parse_query_with(text: &str, scanner: Scanner) -> Result<DqlQuery, QueryError> {
    let tok = |e| QueryError::tokenize(ClauseKind::Query, e);
    let words = scanner.top_level_words(text).map_err(tok)?;
    if words.is_empty() {
        return Err(QueryError::syntax(ClauseKind::Query, "query is empty"));
    }

    let mut marks: Vec<ClauseMark> = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i].slice(text);
        let next = words.get(i + 1).map(|span| span.slice(text));
        match clause_keyword(word, next) {
            Some((kind, len)) => {
                marks.push(ClauseMark {
                    kind,
                    keyword_start: words[i].start,
                    content_start: words[i + len - 1].end,
                });
                i += len;
            }
            None if marks.is_empty() => {
                return Err(QueryError::syntax(
                    ClauseKind::Query,
                    format!("expected SELECT or FROM, found `{}`", word),
                ));
            }
            None => i += 1,
        }
    }

    let mut query = DqlQuery::default();
    let mut seen = HashSet::new();
    for (index, mark) in marks.iter().enumerate() {
        let end = marks
            .get(index + 1)
            .map(|m| m.keyword_start)
            .unwrap_or(text.len());
        let span = Span {
            start: mark.content_start,
            end,
        }
        .trimmed(text);
        let clause = mark.kind;
        if !seen.insert(clause) {
            return Err(QueryError::syntax(clause, "clause appears more than once"));
        }
        if span.is_empty() {
            return Err(QueryError::syntax(clause, "clause is empty"));
        }
        let content = span.slice(text);
        let segment = Segment {
            text: content.to_string(),
            first_param: scanner.count_placeholders(&text[..span.start]).map_err(tok)?,
        };

        match clause {
            ClauseKind::Select => {
                let select_words = scanner.top_level_words(content).map_err(tok)?;
                match select_words.first() {
                    Some(first) if keyword_eq(first.slice(content), "DISTINCT") => {
                        let rest = content[first.end..].trim();
                        if rest.is_empty() {
                            return Err(QueryError::syntax(clause, "nothing selected after DISTINCT"));
                        }
                        query.distinct = true;
                        query.select = Some(Segment {
                            text: rest.to_string(),
                            first_param: segment.first_param,
                        });
                    }
                    _ => query.select = Some(segment),
                }
            }
            ClauseKind::From => query.from = parse_from(&segment, scanner)?,
            ClauseKind::Where => query.where_clause = Some(segment),
            ClauseKind::GroupBy => query.group_by = Some(segment),
            ClauseKind::Having => query.having = Some(segment),
            ClauseKind::OrderBy => query.order_by = Some(segment),
            ClauseKind::Limit => query.limit = Some(parse_count(clause, content)?),
            ClauseKind::Offset => query.offset = Some(parse_count(clause, content)?),
            _ => {}
        }
    }

    if query.from.is_empty() {
        return Err(QueryError::syntax(ClauseKind::From, "query has no FROM clause"));
    }
    query.placeholders = scanner.count_placeholders(text).map_err(tok)?;
    Ok(query)
}

fn parse_count(clause: ClauseKind, text: &str) -> Result<u64, QueryError> {
    parse_unsigned(text).ok_or_else(|| {
        QueryError::syntax(
            clause,
            format!("expected a non-negative integer, found `{}`", text),
        )
    })
}

/// Splits the FROM clause into its root element and joins. Top-level commas
/// start a new element that is left-joined like `JOIN`.
fn parse_from(segment: &Segment, scanner: Scanner) -> Result<Vec<FromElement>, QueryError> {
    let text = segment.text.as_str();
    let tok = |e| QueryError::tokenize(ClauseKind::From, e);
    let mut elements = Vec::new();

    for (part_index, part_span) in scanner.split_top_level_spans(text, ",").map_err(tok)?.into_iter().enumerate() {
        let part_span = part_span.trimmed(text);
        if part_span.is_empty() {
            return Err(QueryError::syntax(ClauseKind::From, "empty component reference"));
        }
        let part = part_span.slice(text);
        let words = scanner.top_level_words(part).map_err(tok)?;

        // (join kind, first word of the element)
        let mut starts: Vec<(Option<JoinKind>, usize)> = Vec::new();
        let first_kind = if part_index == 0 { None } else { Some(JoinKind::Left) };
        starts.push((first_kind, 0));
        let mut boundaries: Vec<usize> = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let word = words[i].slice(part);
            let next = words.get(i + 1).map(|span| span.slice(part));
            let join = if keyword_eq(word, "JOIN") {
                Some((JoinKind::Left, 1))
            } else if keyword_eq(word, "LEFT") && next.is_some_and(|n| keyword_eq(n, "JOIN")) {
                Some((JoinKind::Left, 2))
            } else if keyword_eq(word, "INNER") && next.is_some_and(|n| keyword_eq(n, "JOIN")) {
                Some((JoinKind::Inner, 2))
            } else {
                None
            };
            match join {
                Some((kind, len)) => {
                    boundaries.push(i);
                    starts.push((Some(kind), i + len));
                    i += len;
                }
                None => i += 1,
            }
        }
        boundaries.push(words.len());

        for ((kind, begin), end) in starts.into_iter().zip(boundaries) {
            let element = parse_element(part, &words[begin..end], kind, segment, part_span.start, scanner)?;
            elements.push(element);
        }
    }

    if elements.first().is_some_and(|root| root.join.is_some()) {
        return Err(QueryError::syntax(ClauseKind::From, "FROM clause starts with a JOIN"));
    }
    Ok(elements)
}

/// Parses `path [[AS] alias] [ON|WITH condition] [INDEXBY column]`.
fn parse_element(
    part: &str,
    words: &[Span],
    join: Option<JoinKind>,
    segment: &Segment,
    part_offset: usize,
    scanner: Scanner,
) -> Result<FromElement, QueryError> {
    let clause = if join.is_some() {
        ClauseKind::Join
    } else {
        ClauseKind::From
    };
    let word = |i: usize| words.get(i).map(|span| span.slice(part));
    let is_reserved = |w: &str| ["ON", "WITH", "INDEXBY", "AS"].iter().any(|kw| keyword_eq(w, kw));

    let Some(path_text) = word(0) else {
        return Err(QueryError::syntax(clause, "missing component path"));
    };
    let path: Vec<String> = parse_path(path_text)
        .ok_or_else(|| QueryError::syntax(clause, format!("invalid component path `{}`", path_text)))?
        .into_iter()
        .map(str::to_string)
        .collect();
    match join {
        None if path.len() != 1 => {
            return Err(QueryError::syntax(
                clause,
                format!("`{}` is not a component name", path_text),
            ))
        }
        Some(_) if path.len() < 2 => {
            return Err(QueryError::syntax(
                clause,
                format!("join `{}` must be a relation path like `alias.Relation`", path_text),
            ))
        }
        _ => {}
    }

    let mut k = 1;
    let mut alias = None;
    if word(k).is_some_and(|w| keyword_eq(w, "AS")) {
        let name = word(k + 1).filter(|w| is_identifier(w)).ok_or_else(|| {
            QueryError::syntax(clause, format!("AS after `{}` must be followed by an alias", path_text))
        })?;
        alias = Some(name.to_string());
        k += 2;
    } else if let Some(w) = word(k).filter(|w| is_identifier(w) && !is_reserved(w)) {
        alias = Some(w.to_string());
        k += 1;
    }

    let mut condition = None;
    if let Some(kind) = word(k).and_then(|w| {
        if keyword_eq(w, "ON") {
            Some(ConditionKind::On)
        } else if keyword_eq(w, "WITH") {
            Some(ConditionKind::With)
        } else {
            None
        }
    }) {
        if join.is_none() {
            return Err(QueryError::syntax(clause, "the root component cannot carry a join condition"));
        }
        let cond_end = (k + 1..words.len())
            .find(|&i| keyword_eq(words[i].slice(part), "INDEXBY"))
            .unwrap_or(words.len());
        if cond_end == k + 1 {
            return Err(QueryError::syntax(clause, "empty join condition"));
        }
        let start = words[k + 1].start;
        let end = words[cond_end - 1].end;
        let absolute = part_offset + start;
        let before = scanner
            .count_placeholders(&segment.text[..absolute])
            .map_err(|e| QueryError::tokenize(clause, e))?;
        condition = Some(JoinConditionText {
            kind,
            segment: Segment {
                text: part[start..end].to_string(),
                first_param: segment.first_param + before,
            },
        });
        k = cond_end;
    }

    let mut index_by = None;
    if word(k).is_some_and(|w| keyword_eq(w, "INDEXBY")) {
        let column = word(k + 1)
            .ok_or_else(|| QueryError::syntax(ClauseKind::IndexBy, "INDEXBY without a column"))?;
        index_by = Some(column.to_string());
        k += 2;
    }

    if let Some(extra) = word(k) {
        return Err(QueryError::syntax(clause, format!("unexpected `{}`", extra)));
    }

    Ok(FromElement {
        path,
        alias,
        join,
        condition,
        index_by,
    })
}
