//! `IN (...)` list expansion.
//!
//! A list parameter `ids = [1, 2, 3]` referenced as `@ids` is rewritten to
//! `@ids0,@ids1,@ids2` and three scalar parameters are added. Placeholders are
//! matched on identifier boundaries, so `@p` never rewrites part of `@p2`, and
//! text inside quotes and comments is left alone.

use crate::query::Query;
use crate::types::RowValues;

/// Expand every non-empty `in_parameters` entry whose placeholder occurs in
/// the descriptor's current SQL.
///
/// Returns the number of list parameters that were expanded.
pub fn expand_in_parameters(query: &mut Query, prefix: char) -> usize {
    let lists: Vec<(String, Vec<RowValues>)> = query
        .in_parameters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.to_string(), values.clone()))
        .collect();

    let mut expanded = 0;
    for (name, values) in lists {
        let replacement = expanded_placeholders(prefix, &name, values.len());
        let Some(rewritten) = replace_placeholder(&query.modified_sql, prefix, &name, &replacement)
        else {
            continue;
        };
        query.modified_sql = rewritten;
        for (idx, value) in values.into_iter().enumerate() {
            let synthetic = format!("{name}{idx}");
            query.parameters.insert(synthetic.clone(), value);
            query.expanded_names.push(synthetic);
        }
        expanded += 1;
    }
    expanded
}

/// `@p0,@p1,...,@p(k-1)`
#[must_use]
pub fn expanded_placeholders(prefix: char, name: &str, count: usize) -> String {
    (0..count)
        .map(|idx| format!("{prefix}{name}{idx}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Replace each standalone `{prefix}{name}` in `sql` with `replacement`.
///
/// Returns `None` when the placeholder does not occur outside quotes and
/// comments.
#[must_use]
pub fn replace_placeholder(
    sql: &str,
    prefix: char,
    name: &str,
    replacement: &str,
) -> Option<String> {
    if name.is_empty() || !prefix.is_ascii() {
        return None;
    }
    let prefix = prefix as u8;
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                _ if b == prefix && starts_placeholder(bytes, idx, prefix) => {
                    let end = scan_identifier(bytes, idx + 1);
                    if &sql[idx + 1..end] == name {
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied..idx]);
                        buf.push_str(replacement);
                        copied = end;
                    }
                    idx = end;
                    continue;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.map(|mut buf| {
        buf.push_str(&sql[copied..]);
        buf
    })
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// `@@IDENTITY`, `x::int` and `a@b` are not placeholders.
fn starts_placeholder(bytes: &[u8], idx: usize, prefix: u8) -> bool {
    let preceded_ok = idx == 0 || {
        let prev = bytes[idx - 1];
        prev != prefix && !is_identifier_byte(prev)
    };
    preceded_ok && bytes.get(idx + 1).is_some_and(|&b| is_identifier_byte(b))
}

fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && is_identifier_byte(bytes[idx]) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(n: i64) -> Vec<RowValues> {
        (1..=n).map(RowValues::Int).collect()
    }

    #[test]
    fn expands_list_into_positional_placeholders() {
        let mut query =
            Query::row_set("select someColumn from someTable where someColumn in (@inParam);")
                .with_in_parameter("inParam", list(4));
        assert_eq!(expand_in_parameters(&mut query, '@'), 1);
        assert_eq!(
            query.modified_sql(),
            "select someColumn from someTable where someColumn in (@inParam0,@inParam1,@inParam2,@inParam3);"
        );
        assert_eq!(query.parameters.len(), 4);
        assert_eq!(query.parameters.get("inParam3"), Some(&RowValues::Int(4)));
        // original text is untouched
        assert!(query.sql().ends_with("(@inParam);"));
    }

    #[test]
    fn shorter_list_on_rerun_drops_stale_parameters() {
        let mut query = Query::row_set("select * from t where id in (@ids)")
            .with_parameter("flag", 1_i64)
            .with_in_parameter("ids", list(4));
        expand_in_parameters(&mut query, '@');
        assert_eq!(query.parameters.len(), 5);

        query.reset_for_execution();
        query.in_parameters.insert("ids", list(2));
        expand_in_parameters(&mut query, '@');
        assert_eq!(query.modified_sql(), "select * from t where id in (@ids0,@ids1)");
        let names: Vec<&str> = query.parameters.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["flag", "ids0", "ids1"]);
    }

    #[test]
    fn does_not_match_longer_placeholder_with_same_prefix() {
        let mut query = Query::row_set("select * from t where a in (@p) and b = @p2")
            .with_in_parameter("p", list(2));
        expand_in_parameters(&mut query, '@');
        assert_eq!(
            query.modified_sql(),
            "select * from t where a in (@p0,@p1) and b = @p2"
        );
    }

    #[test]
    fn only_longer_placeholder_present_is_noop() {
        let mut query =
            Query::row_set("select * from t where b in (@p2)").with_in_parameter("p", list(3));
        assert_eq!(expand_in_parameters(&mut query, '@'), 0);
        assert_eq!(query.modified_sql(), "select * from t where b in (@p2)");
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn empty_list_and_absent_placeholder_are_noops() {
        let mut query = Query::row_set("select * from t where a in (@ids)")
            .with_in_parameter("ids", Vec::new())
            .with_in_parameter("other", list(2));
        assert_eq!(expand_in_parameters(&mut query, '@'), 0);
        assert_eq!(query.modified_sql(), "select * from t where a in (@ids)");
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn skips_literals_and_comments() {
        let sql = "select '@ids', \"@ids\" -- @ids\n/* @ids */ from t where a in (@ids)";
        let res = replace_placeholder(sql, '@', "ids", "@ids0,@ids1");
        assert_eq!(
            res.as_deref(),
            Some("select '@ids', \"@ids\" -- @ids\n/* @ids */ from t where a in (@ids0,@ids1)")
        );
    }

    #[test]
    fn ignores_double_prefix_system_variables() {
        assert_eq!(
            replace_placeholder("SELECT @@IDENTITY", '@', "IDENTITY", "x"),
            None
        );
    }

    #[test]
    fn supports_other_prefixes_and_multiple_occurrences() {
        let res = replace_placeholder(
            "select * from t where a in (:ids) or b in (:ids)",
            ':',
            "ids",
            ":ids0,:ids1",
        );
        assert_eq!(
            res.as_deref(),
            Some("select * from t where a in (:ids0,:ids1) or b in (:ids0,:ids1)")
        );
    }

    #[test]
    fn expanded_placeholders_are_comma_joined() {
        assert_eq!(expanded_placeholders('@', "p", 3), "@p0,@p1,@p2");
        assert_eq!(expanded_placeholders('@', "p", 1), "@p0");
    }
}
