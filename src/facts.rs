//! Reader for line-oriented fact files.
//!
//! Graph files, lifted models and solver answers all share one syntax:
//!
//! ```text
//! % comment
//! node(1,0). node(1,1).
//! fval(1,(at,(a,)),0,1).
//! ```
//!
//! Records are whitespace separated and may share a line. A `%` at the start
//! of a line or of a record comments out the rest of the line. Fields are
//! separated by commas at parenthesis depth zero.

use std::str::FromStr;

use crate::error::{Error, Result};

/// One whitespace-delimited record together with its 1-based line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub line: usize,
    pub text: &'a str,
}

/// Iterates over the records of a fact file, skipping comments.
pub fn records(content: &str) -> impl Iterator<Item = Record<'_>> {
    content.lines().enumerate().flat_map(|(i, line)| {
        let trimmed = line.trim_start();
        let tokens: Vec<&str> = if trimmed.starts_with('%') {
            Vec::new()
        } else {
            trimmed.split_whitespace().take_while(|t| !t.starts_with('%')).collect()
        };
        tokens.into_iter().map(move |text| Record { line: i + 1, text })
    })
}

/// Splits `s` at commas that are not nested inside parentheses.
///
/// A trailing empty field is dropped, so `a,` yields `["a"]`, which is how
/// one-element tuples `(a,)` are written.
pub fn split_fields(s: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() {
        fields.push(&s[start..]);
    }
    fields
}

/// Returns the argument text of a `name(...).` record, or `None` if the
/// record is of a different kind.
pub fn fact_body<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(").")
}

/// Strips one pair of enclosing parentheses.
pub fn unwrap_parens(s: &str) -> Option<&str> {
    s.strip_prefix('(')?.strip_suffix(')')
}

/// Strips enclosing double quotes.
pub fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// An atom term `(pred,(arg1,arg2,...))` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomTerm<'a> {
    pub predicate: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> AtomTerm<'a> {
    pub fn parse(s: &'a str) -> Option<Self> {
        let fields = split_fields(unwrap_parens(s)?);
        if fields.len() != 2 {
            return None;
        }
        let args = split_fields(unwrap_parens(fields[1])?);
        Some(AtomTerm {
            predicate: fields[0],
            args,
        })
    }

    /// True for the 0-arity sentinels `(null,)` and `(0,)`.
    pub fn is_nullary(&self) -> bool {
        matches!(self.args.as_slice(), ["null"] | ["0"])
    }
}

/// Context used to attach file and line information to format errors.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub file: &'a str,
}

impl<'a> Source<'a> {
    pub fn new(file: &'a str) -> Self {
        Self { file }
    }

    pub fn error(&self, record: Record<'_>, reason: impl Into<String>) -> Error {
        Error::Format {
            file: self.file.to_string(),
            line: record.line,
            record: record.text.to_string(),
            reason: reason.into(),
        }
    }

    /// Parses a number field of a record.
    pub fn number<T: FromStr>(&self, record: Record<'_>, field: &str) -> Result<T> {
        field
            .trim()
            .parse()
            .map_err(|_| self.error(record, format!("invalid integer `{}`", field)))
    }

    /// Splits the body of a record and checks the field count.
    pub fn fields<'r>(&self, record: Record<'_>, body: &'r str, expected: &[usize]) -> Result<Vec<&'r str>> {
        let fields = split_fields(body);
        if expected.contains(&fields.len()) {
            Ok(fields)
        } else {
            Err(self.error(
                record,
                format!("expected {:?} fields, found {}", expected, fields.len()),
            ))
        }
    }

    pub fn atom<'r>(&self, record: Record<'_>, field: &'r str) -> Result<AtomTerm<'r>> {
        AtomTerm::parse(field).ok_or_else(|| self.error(record, format!("invalid atom term `{}`", field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_records_skip_comments() {
        let content = "% header\nnode(1,0).  node(1,1). % trailing\n\n   % indented comment\ntlabel(1,(0,1),a).\n";
        let recs: Vec<_> = records(content).collect();
        assert_eq!(
            recs,
            vec![
                Record { line: 2, text: "node(1,0)." },
                Record { line: 2, text: "node(1,1)." },
                Record { line: 5, text: "tlabel(1,(0,1),a)." },
            ]
        );
    }

    #[test]
    fn test_split_fields_nested() {
        assert_eq!(split_fields("1,(at,(a,b)),0,1"), vec!["1", "(at,(a,b))", "0", "1"]);
        assert_eq!(split_fields("a,"), vec!["a"]);
        assert_eq!(split_fields(""), Vec::<&str>::new());
    }

    #[test]
    fn test_fact_body() {
        assert_eq!(fact_body("pred(at).", "pred"), Some("at"));
        assert_eq!(fact_body("prec(a,(p,(1,)),1).", "prec"), Some("a,(p,(1,)),1"));
        assert_eq!(fact_body("pred(at)", "pred"), None);
        assert_eq!(fact_body("predicate(at).", "pred"), None);
    }

    #[test]
    fn test_atom_term() {
        let t = AtomTerm::parse("(at,(a,b))").unwrap();
        assert_eq!(t.predicate, "at");
        assert_eq!(t.args, vec!["a", "b"]);
        assert!(!t.is_nullary());

        let t = AtomTerm::parse("(handempty,(null,))").unwrap();
        assert!(t.is_nullary());

        let t = AtomTerm::parse("(clear,(x,))").unwrap();
        assert_eq!(t.args, vec!["x"]);

        assert!(AtomTerm::parse("at").is_none());
    }

    #[test]
    fn test_source_number_error() {
        let src = Source::new("g.lp");
        let rec = Record { line: 9, text: "node(1,x)." };
        let err = src.number::<usize>(rec, "x").unwrap_err();
        assert!(err.to_string().starts_with("g.lp:9:"));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a.lp\""), "a.lp");
        assert_eq!(unquote("a.lp"), "a.lp");
    }
}
