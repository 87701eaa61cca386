//! sed-style substitution instructions.
//!
//! Grammar (one or more commands separated by `;` or newlines):
//!
//! ```text
//! s<d>pattern<d>replacement<d>[flags]
//! ```
//!
//! `<d>` is any character other than a letter, digit, backslash or newline.
//! Patterns are extended regular expressions. Only the substitute verb is
//! supported.

use regex::{Captures, Regex, RegexBuilder};
use thiserror::Error;

/// Errors from parsing substitution instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("no instructions given")]
    Empty,

    #[error("unsupported command '{0}': only s/find/replace/ is supported")]
    UnsupportedCommand(String),

    #[error("unterminated command '{0}'")]
    Unterminated(String),

    #[error("empty pattern in '{0}'")]
    EmptyPattern(String),

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("unknown flag '{flag}' in '{command}'")]
    UnknownFlag { flag: char, command: String },

    #[error("invalid reference \\{group} in '{command}'")]
    InvalidReference { group: usize, command: String },

    #[error("no literal text to search for in '{0}'")]
    NoSearchTerm(String),
}

/// Result type for instruction parsing.
pub type InstructionResult<T> = std::result::Result<T, InstructionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Whole,
    Group(usize),
}

/// One parsed `s` command.
#[derive(Debug, Clone)]
pub struct Instruction {
    source: String,
    pattern: String,
    find: Regex,
    replacement: Vec<Piece>,
    global: bool,
    ignore_case: bool,
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Instruction {
    /// The command as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The regular expression, with delimiter escapes resolved.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.ignore_case
    }

    /// Apply the substitution to every line of `content`.
    ///
    /// Line terminators are preserved; without `g` only the first match on
    /// each line is replaced.
    pub fn apply(&self, content: &str) -> String {
        let limit = if self.global { 0 } else { 1 };
        let mut out = String::with_capacity(content.len());

        for line in content.split_inclusive('\n') {
            let (body, terminator) = split_terminator(line);
            let replaced = self
                .find
                .replacen(body, limit, |caps: &Captures<'_>| self.expand(caps));
            out.push_str(&replaced);
            out.push_str(terminator);
        }
        out
    }

    fn expand(&self, caps: &Captures<'_>) -> String {
        let mut out = String::new();
        for piece in &self.replacement {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Whole => out.push_str(&caps[0]),
                Piece::Group(n) => {
                    if let Some(m) = caps.get(*n) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        out
    }

    /// Literal text to hand to code search for this instruction.
    ///
    /// For each top-level alternative, the longest literal run that every
    /// match of that alternative contains; several alternatives are joined
    /// with `OR`. Terms with whitespace are quoted. Fails when some
    /// alternative can match without any literal text.
    pub fn search_term(&self) -> InstructionResult<String> {
        let terms = required_literals(&self.pattern)
            .ok_or_else(|| InstructionError::NoSearchTerm(self.source.clone()))?;
        let mut quoted: Vec<String> = Vec::new();
        for term in terms {
            let term = if term.chars().any(char::is_whitespace) {
                format!("\"{}\"", term.replace('"', ""))
            } else {
                term
            };
            if !quoted.contains(&term) {
                quoted.push(term);
            }
        }
        Ok(quoted.join(" OR "))
    }
}

/// Apply every instruction in order; later instructions see earlier output.
pub fn apply_all(instructions: &[Instruction], content: &str) -> String {
    instructions
        .iter()
        .fold(content.to_string(), |acc, instruction| instruction.apply(&acc))
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, &line[body.len()..])
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, &line[body.len()..])
    } else {
        (line, "")
    }
}

/// One required literal per top-level alternative, or `None` if any
/// alternative has none.
fn required_literals(pattern: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = pattern.chars().collect();
    split_alternatives(&chars)
        .into_iter()
        .map(|alternative| {
            let run = longest_required(alternative);
            let run = run.trim();
            (!run.is_empty()).then(|| run.to_string())
        })
        .collect()
}

/// Index just past the `]` closing the class that opens at `start`.
fn class_end(chars: &[char], start: usize) -> usize {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += if chars[j] == '\\' { 2 } else { 1 };
    }
    (j + 1).min(chars.len())
}

/// Index of the `)` closing the group that opens at `start` (or `len`).
fn group_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0;
    let mut j = start;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => {
                j = class_end(chars, j);
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return j;
                }
            }
            _ => {}
        }
        j += 1;
    }
    chars.len()
}

/// Split at `|` outside groups and classes.
fn split_alternatives(chars: &[char]) -> Vec<&[char]> {
    let mut parts = Vec::new();
    let mut last = 0;
    let mut j = 0;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '[' => j = class_end(chars, j),
            '(' => j = group_end(chars, j) + 1,
            '|' => {
                parts.push(&chars[last..j]);
                j += 1;
                last = j;
            }
            _ => j += 1,
        }
    }
    parts.push(&chars[last.min(chars.len())..]);
    parts
}

/// Whether the quantifier at `at` (if any) allows zero repetitions.
fn may_repeat_zero(chars: &[char], at: usize) -> bool {
    match chars.get(at) {
        Some('?' | '*') => true,
        Some('{') => chars.get(at + 1) == Some(&'0'),
        _ => false,
    }
}

/// Body of a group without its `?:`, `?P<name>` or `?flags:` prefix.
/// `None` for a bare flag group such as `(?i)`.
fn group_body(inner: &[char]) -> Option<&[char]> {
    if inner.first() != Some(&'?') {
        return Some(inner);
    }
    if matches!(inner.get(1), Some('P' | '<')) {
        let close = inner.iter().position(|c| *c == '>')?;
        return Some(&inner[close + 1..]);
    }
    let colon = inner.iter().position(|c| *c == ':')?;
    Some(&inner[colon + 1..])
}

/// Longest literal run of a single alternative that every match contains.
fn longest_required(chars: &[char]) -> String {
    let mut best = String::new();
    let mut current = String::new();
    let mut i = 0;

    let keep_longer = |candidate: &str, best: &mut String| {
        if candidate.trim().chars().count() > best.trim().chars().count() {
            *best = candidate.to_string();
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let (literal, width) = match c {
            '\\' => match chars.get(i + 1) {
                Some(next) if next.is_ascii_alphanumeric() => (None, 2),
                Some(next) => (Some(*next), 2),
                None => (None, 1),
            },
            '[' => (None, class_end(chars, i) - i),
            '{' => {
                let close = chars[i..].iter().position(|c| *c == '}').unwrap_or(chars.len() - i);
                (None, close + 1)
            }
            '(' => {
                keep_longer(&current, &mut best);
                current.clear();
                let end = group_end(chars, i);
                if !may_repeat_zero(chars, end + 1) {
                    let body = group_body(&chars[i + 1..end]);
                    if let Some(body) = body.filter(|b| split_alternatives(b).len() == 1) {
                        keep_longer(&longest_required(body), &mut best);
                    }
                }
                i = end + 1;
                continue;
            }
            '.' | '^' | '$' | '|' | ')' | '*' | '+' | '?' | '}' | ']' => (None, 1),
            other => (Some(other), 1),
        };

        match literal {
            Some(ch) if !may_repeat_zero(chars, i + width) => current.push(ch),
            _ => {
                keep_longer(&current, &mut best);
                current.clear();
            }
        }
        i += width;
    }
    keep_longer(&current, &mut best);
    best
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect::<String>().trim().to_string()
    }

    /// Rest of the current command, for error messages.
    fn rest_of_command(&self, start: usize) -> String {
        self.chars[start..]
            .iter()
            .take_while(|c| **c != '\n')
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Parse a script of one or more `s` commands.
pub fn parse_instructions(text: &str) -> InstructionResult<Vec<Instruction>> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = Cursor {
        chars: &chars,
        pos: 0,
    };
    let mut instructions = Vec::new();

    loop {
        while matches!(cursor.peek(), Some(c) if c.is_whitespace() || c == ';') {
            cursor.bump();
        }
        if cursor.peek().is_none() {
            break;
        }
        instructions.push(parse_one(&mut cursor)?);
    }

    if instructions.is_empty() {
        return Err(InstructionError::Empty);
    }
    Ok(instructions)
}

/// Parse several scripts (one per `-e`) into a single ordered list.
pub fn parse_expressions(expressions: &[String]) -> InstructionResult<Vec<Instruction>> {
    let mut instructions = Vec::new();
    for expression in expressions {
        instructions.extend(parse_instructions(expression)?);
    }
    if instructions.is_empty() {
        return Err(InstructionError::Empty);
    }
    Ok(instructions)
}

fn parse_one(cursor: &mut Cursor<'_>) -> InstructionResult<Instruction> {
    let start = cursor.pos;

    if cursor.bump() != Some('s') {
        return Err(InstructionError::UnsupportedCommand(
            cursor.rest_of_command(start),
        ));
    }

    let delimiter = match cursor.bump() {
        Some(d) if d != '\\' && d != '\n' && !d.is_alphanumeric() => d,
        Some(_) => {
            return Err(InstructionError::UnsupportedCommand(
                cursor.rest_of_command(start),
            ))
        }
        None => {
            return Err(InstructionError::Unterminated(
                cursor.rest_of_command(start),
            ))
        }
    };

    let pattern = read_pattern(cursor, delimiter)
        .ok_or_else(|| InstructionError::Unterminated(cursor.rest_of_command(start)))?;
    let replacement = read_replacement(cursor, delimiter)
        .ok_or_else(|| InstructionError::Unterminated(cursor.rest_of_command(start)))?;

    let mut global = false;
    let mut ignore_case = false;
    while let Some(c) = cursor.peek() {
        if c == ';' || c == '\n' {
            break;
        }
        cursor.bump();
        match c {
            'g' => global = true,
            'i' | 'I' => ignore_case = true,
            c if c.is_whitespace() => {}
            flag => {
                return Err(InstructionError::UnknownFlag {
                    flag,
                    command: cursor.rest_of_command(start),
                })
            }
        }
    }
    let source = cursor.slice(start);

    if pattern.is_empty() {
        return Err(InstructionError::EmptyPattern(source));
    }

    let find = RegexBuilder::new(&pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| InstructionError::InvalidRegex {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

    for piece in &replacement {
        if let Piece::Group(group) = piece {
            if *group >= find.captures_len() {
                return Err(InstructionError::InvalidReference {
                    group: *group,
                    command: source,
                });
            }
        }
    }

    Ok(Instruction {
        source,
        pattern,
        find,
        replacement,
        global,
        ignore_case,
    })
}

fn read_pattern(cursor: &mut Cursor<'_>, delimiter: char) -> Option<String> {
    let mut pattern = String::new();
    loop {
        match cursor.bump()? {
            '\n' => return None,
            '\\' => match cursor.bump()? {
                c if c == delimiter => pattern.push_str(&regex::escape(&c.to_string())),
                c => {
                    pattern.push('\\');
                    pattern.push(c);
                }
            },
            c if c == delimiter => return Some(pattern),
            c => pattern.push(c),
        }
    }
}

fn read_replacement(cursor: &mut Cursor<'_>, delimiter: char) -> Option<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();

    let flush = |literal: &mut String, pieces: &mut Vec<Piece>| {
        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(literal)));
        }
    };

    loop {
        match cursor.bump()? {
            '\n' => return None,
            '&' => {
                flush(&mut literal, &mut pieces);
                pieces.push(Piece::Whole);
            }
            '\\' => match cursor.bump()? {
                '0' => {
                    flush(&mut literal, &mut pieces);
                    pieces.push(Piece::Whole);
                }
                d @ '1'..='9' => {
                    flush(&mut literal, &mut pieces);
                    pieces.push(Piece::Group(d as usize - '0' as usize));
                }
                'n' => literal.push('\n'),
                't' => literal.push('\t'),
                other => literal.push(other),
            },
            c if c == delimiter => {
                flush(&mut literal, &mut pieces);
                return Some(pieces);
            }
            c => literal.push(c),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> Instruction {
        let mut parsed = parse_instructions(text).unwrap();
        assert_eq!(parsed.len(), 1);
        parsed.remove(0)
    }

    #[test]
    fn test_basic_substitution_first_match_per_line() {
        let i = one("s/foo/bar/");
        assert_eq!(i.apply("foo foo\nfoo\n"), "bar foo\nbar\n");
    }

    #[test]
    fn test_global_flag_replaces_all() {
        let i = one("s/foo/bar/g");
        assert_eq!(i.apply("foo foo\nxfoo"), "bar bar\nxbar");
        assert!(i.is_global());
    }

    #[test]
    fn test_case_insensitive_flag() {
        let i = one("s/foo/bar/Ig");
        assert_eq!(i.apply("Foo FOO"), "bar bar");
        assert!(i.is_case_insensitive());
    }

    #[test]
    fn test_crlf_terminators_are_preserved() {
        let i = one("s/a$/b/");
        assert_eq!(i.apply("a\r\na\r\n"), "b\r\nb\r\n");
    }

    #[test]
    fn test_groups_and_whole_match() {
        let i = one(r"s/(\w+)@(\w+)/\2 at \1 [&]/");
        assert_eq!(i.apply("me@home"), "home at me [me@home]");
    }

    #[test]
    fn test_escaped_ampersand_and_delimiter() {
        let i = one(r"s|a\|b|x\&y\|z|");
        assert_eq!(i.pattern(), r"a\|b");
        assert_eq!(i.apply("a|b"), "x&y|z");
    }

    #[test]
    fn test_escaped_slash_with_default_delimiter() {
        let i = one(r"s/\/usr\/bin/\/opt/");
        assert_eq!(i.apply("/usr/bin/env"), "/opt/env");
    }

    #[test]
    fn test_multiple_commands_split_on_semicolon_and_newline() {
        let parsed = parse_instructions("s/a/b/; s/b/c/g\ns/c/d/").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].source(), "s/b/c/g");
    }

    #[test]
    fn test_semicolon_inside_pattern_does_not_split() {
        let parsed = parse_instructions("s/a;b/c;d/;s/x/y/").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].apply("a;b"), "c;d");
    }

    #[test]
    fn test_apply_all_is_left_fold() {
        let parsed = parse_instructions("s/foo/bar/;s/bar/baz/").unwrap();
        let content = "foo bar\n";
        let folded = parsed[1].apply(&parsed[0].apply(content));
        assert_eq!(apply_all(&parsed, content), folded);
        assert_eq!(folded, "baz bar\n");
    }

    #[test]
    fn test_parse_expressions_keeps_order() {
        let parsed =
            parse_expressions(&["s/a/b/".to_string(), "s/b/c/;s/c/d/".to_string()]).unwrap();
        let sources: Vec<_> = parsed.iter().map(Instruction::source).collect();
        assert_eq!(sources, vec!["s/a/b/", "s/b/c/", "s/c/d/"]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_instructions("  ;\n"), Err(InstructionError::Empty));
        assert!(matches!(
            parse_instructions("y/abc/xyz/"),
            Err(InstructionError::UnsupportedCommand(_))
        ));
        assert!(matches!(
            parse_instructions("5!s/a/b/"),
            Err(InstructionError::UnsupportedCommand(_))
        ));
        assert!(matches!(
            parse_instructions("s/a/b"),
            Err(InstructionError::Unterminated(_))
        ));
        assert!(matches!(
            parse_instructions("s//b/"),
            Err(InstructionError::EmptyPattern(_))
        ));
        assert!(matches!(
            parse_instructions("s/(a/b/"),
            Err(InstructionError::InvalidRegex { .. })
        ));
        assert!(matches!(
            parse_instructions("s/a/b/q"),
            Err(InstructionError::UnknownFlag { flag: 'q', .. })
        ));
        assert!(matches!(
            parse_instructions(r"s/a/\1/"),
            Err(InstructionError::InvalidReference { group: 1, .. })
        ));
    }

    #[test]
    fn test_search_term_covers_every_alternative() {
        assert_eq!(one("s/foo|barbaz/x/").search_term().unwrap(), "foo OR barbaz");
        assert_eq!(one("s/foo|foo/x/").search_term().unwrap(), "foo");
        assert_eq!(
            one("s/old name|legacy_(id|key)/x/").search_term().unwrap(),
            "\"old name\" OR legacy_"
        );
        assert!(matches!(
            one("s/foo|.*/x/").search_term(),
            Err(InstructionError::NoSearchTerm(_))
        ));
    }

    #[test]
    fn test_search_term_skips_optional_groups_and_quantifiers() {
        assert_eq!(one("s/(abc)?xyz/x/").search_term().unwrap(), "xyz");
        assert_eq!(one("s/(abcdef)*xy/x/").search_term().unwrap(), "xy");
        assert_eq!(one("s/(abcdef){0,2}xy/x/").search_term().unwrap(), "xy");
        assert_eq!(one("s/(widget)s/x/").search_term().unwrap(), "widget");
        assert_eq!(one("s/(?:config)+_v2/x/").search_term().unwrap(), "config");
        assert_eq!(one("s/ab{2}cd/x/").search_term().unwrap(), "ab");
        assert_eq!(one("s/x{12}yz/x/").search_term().unwrap(), "yz");
        assert!(matches!(
            one("s/(?i)(abc)?/x/").search_term(),
            Err(InstructionError::NoSearchTerm(_))
        ));
    }

    #[test]
    fn test_search_term_picks_longest_literal() {
        assert_eq!(one("s/foo/bar/").search_term().unwrap(), "foo");
        assert_eq!(one(r"s/\d+ widgets?/x/").search_term().unwrap(), "widget");
        assert_eq!(one("s/colou?r/x/").search_term().unwrap(), "colo");
        assert_eq!(one("s/hello world/x/").search_term().unwrap(), "\"hello world\"");
        assert_eq!(one(r"s/[abc]+lodash\./x/").search_term().unwrap(), "lodash.");
        assert!(matches!(
            one("s/.*/x/").search_term(),
            Err(InstructionError::NoSearchTerm(_))
        ));
    }
}
