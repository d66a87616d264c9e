//! Parameter-sniffing rewrite.
//!
//! The server compiles a plan for the first parameter values it sees and
//! reuses it. Copying each parameter into a local variable hides the values
//! from the optimizer, which then plans for the average case:
//!
//! ```sql
//! DECLARE @__status NVARCHAR(MAX) = @status;
//! SELECT * FROM orders WHERE status = @__status
//! ```
//!
//! Parameter references are found with a small scanner that skips string
//! literals, quoted identifiers, comments and `@@` system functions.

use std::collections::HashSet;

use crate::param::{Direction, Parameter};

/// A parameter reference in SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    /// Byte offset of the `@`.
    start: usize,
    /// Byte offset past the name.
    end: usize,
    /// Name without `@`, lowercased.
    name: String,
}

/// Scans SQL text for `@name` references.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn is_name_char(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '_' | '#' | '$')
    }

    /// Skips a delimited run where a doubled closing delimiter is an escape.
    fn skip_quoted(&mut self, close: char) {
        while let Some(c) = self.advance() {
            if c == close {
                if self.peek() == Some(close) {
                    self.advance();
                } else {
                    return;
                }
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }
    }

    /// Skips a block comment. Block comments nest.
    fn skip_block_comment(&mut self) {
        let mut depth = 1_usize;
        while depth > 0 {
            match self.advance() {
                Some('/') if self.peek() == Some('*') => {
                    self.advance();
                    depth += 1;
                }
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    depth -= 1;
                }
                Some(_) => {}
                None => return,
            }
        }
    }

    fn skip_name(&mut self) {
        while self.peek().is_some_and(Self::is_name_char) {
            self.advance();
        }
    }

    fn references(mut self) -> Vec<Reference> {
        let mut references = Vec::new();

        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                '\'' | '"' => {
                    self.advance();
                    self.skip_quoted(c);
                }
                '[' => {
                    self.advance();
                    self.skip_quoted(']');
                }
                '-' if self.peek_next() == Some('-') => self.skip_line_comment(),
                '/' if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    self.skip_block_comment();
                }
                '@' if self.peek_next() == Some('@') => {
                    self.advance();
                    self.advance();
                    self.skip_name();
                }
                '@' => {
                    self.advance();
                    self.skip_name();
                    if self.pos > start + 1 {
                        references.push(Reference {
                            start,
                            end: self.pos,
                            name: self.input[start + 1..self.pos].to_lowercase(),
                        });
                    }
                }
                _ if Self::is_name_char(c) => self.skip_name(),
                _ => {
                    self.advance();
                }
            }
        }

        references
    }
}

/// Prefix of the local variable that shadows a parameter.
pub const SHADOW_PREFIX: &str = "__";

/// Input parameters referenced by the text, in binding order.
fn shadowed<'p>(references: &[Reference], params: &'p [Parameter]) -> Vec<&'p Parameter> {
    let referenced: HashSet<&str> = references.iter().map(|r| r.name.as_str()).collect();
    params
        .iter()
        .filter(|p| p.direction() == Direction::Input && !p.is_table())
        .filter(|p| referenced.contains(p.name().to_lowercase().as_str()))
        .collect()
}

/// Finds a parameter that `shadow_parameters` would shadow with a variable
/// whose name another bound parameter already uses.
///
/// Returns the shadowed parameter and the one it collides with.
#[must_use]
pub fn shadow_collision<'p>(
    sql: &str,
    params: &'p [Parameter],
) -> Option<(&'p Parameter, &'p Parameter)> {
    let references = Scanner::new(sql).references();
    shadowed(&references, params).into_iter().find_map(|param| {
        let shadow = format!("{SHADOW_PREFIX}{}", param.name());
        params
            .iter()
            .find(|other| other.name().eq_ignore_ascii_case(&shadow))
            .map(|other| (param, other))
    })
}

/// Rewrites `sql` so every referenced input parameter is read through a
/// local variable declared at the top of the batch.
///
/// Output and table-valued parameters are left alone, as are parameters the
/// text never mentions. Returns `sql` unchanged when nothing is shadowed.
pub fn shadow_parameters(sql: &str, params: &[Parameter]) -> String {
    let references = Scanner::new(sql).references();
    let shadowed = shadowed(&references, params);
    if shadowed.is_empty() {
        return String::from(sql);
    }

    let mut out = String::with_capacity(sql.len() + shadowed.len() * 48);
    for param in &shadowed {
        out.push_str(&format!(
            "DECLARE @{}{} {} = {};\n",
            SHADOW_PREFIX,
            param.name(),
            param.declared_type().declaration(),
            param.placeholder()
        ));
    }

    let mut last = 0;
    for reference in &references {
        let Some(param) = shadowed
            .iter()
            .find(|p| p.name().to_lowercase() == reference.name)
        else {
            continue;
        };
        out.push_str(&sql[last..reference.start]);
        out.push('@');
        out.push_str(SHADOW_PREFIX);
        out.push_str(param.name());
        last = reference.end;
    }
    out.push_str(&sql[last..]);

    out
}
