//! Document query language used by lookup fields and query bindings.
//!
//! ```text
//! *                     every document
//! #media/anime          documents tagged media/anime (or a nested tag below it)
//! "people/staff"        documents under a folder
//! [[Taki]]              documents linking to Taki
//! status                documents with a non-empty `status` field
//! status = done         field equals (any item of a list field)
//! status != done        field missing or different
//! title ~ name          field contains, case-insensitive
//! a and b, a or b, not a, -a, (a)
//! ```
//!
//! `and` binds tighter than `or`. Keywords are case-insensitive.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeSet, fmt, mem, str::FromStr};

use crate::{
    error::BuildonomyError,
    fields::render::display_value,
    formula::as_number,
    paths::{link_target, VaultPath},
    vault::DocumentMeta,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldOp {
    Eq,
    NotEq,
    Contains,
}

/// A predicate over a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocPred {
    Any,
    Tag(String),
    Folder(String),
    LinksTo(String),
    HasField(String),
    Field {
        name: String,
        op: FieldOp,
        value: String,
    },
}

/// Query expression over the document corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    StateIn(DocPred),
    StateNotIn(DocPred),
    Dyad(Box<Expression>, SetOp, Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOp {
    Union,
    Intersection,
    Difference,
}

/// Whether `tag` is `query` or nested below it. Case-insensitive, leading `#` ignored.
pub fn tag_matches(tag: &str, query: &str) -> bool {
    let tag = tag.trim_start_matches('#').to_lowercase();
    let query = query.trim_start_matches('#').to_lowercase();
    !query.is_empty()
        && (tag == query || (tag.starts_with(&query) && tag[query.len()..].starts_with('/')))
}

/// Two note references designate the same note when they agree with or without the markdown
/// extension, or when one of them is a bare name equal to the other's file stem.
fn same_note(a: &str, b: &str) -> bool {
    let a = a.trim().trim_end_matches(".md");
    let b = b.trim().trim_end_matches(".md");
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    let bare = |s: &str| !s.contains('/');
    (bare(a) && VaultPath::new(b).is_link_target(a)) || (bare(b) && VaultPath::new(a).is_link_target(b))
}

fn items(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(values) => values.iter().flat_map(items).collect(),
        serde_json::Value::Null => vec![],
        other => vec![display_value(other)],
    }
}

fn item_equals(item: &str, expected: &str) -> bool {
    if let (Some(l), Some(r)) = (
        as_number(&serde_json::Value::String(item.to_string())),
        as_number(&serde_json::Value::String(expected.to_string())),
    ) {
        return l == r;
    }
    if item.contains("[[") || expected.contains("[[") {
        return same_note(link_target(item), link_target(expected));
    }
    item.trim() == expected.trim()
}

impl DocPred {
    pub fn matches(&self, doc: &DocumentMeta) -> bool {
        match self {
            DocPred::Any => true,
            DocPred::Tag(tag) => doc.tags.iter().any(|t| tag_matches(t, tag)),
            DocPred::Folder(folder) => VaultPath::new(&doc.path).is_under(folder),
            DocPred::LinksTo(note) => doc
                .links
                .iter()
                .any(|link| same_note(link_target(link), note)),
            DocPred::HasField(name) => doc
                .field(name)
                .is_some_and(|v| !items(v).iter().all(|i| i.trim().is_empty())),
            DocPred::Field { name, op, value } => {
                let found = doc.field(name).map(items).unwrap_or_default();
                match op {
                    FieldOp::Eq => found.iter().any(|item| item_equals(item, value)),
                    FieldOp::NotEq => !found.iter().any(|item| item_equals(item, value)),
                    FieldOp::Contains => {
                        let needle = value.to_lowercase();
                        found.iter().any(|item| item.to_lowercase().contains(&needle))
                    }
                }
            }
        }
    }
}

impl Expression {
    pub fn matches(&self, doc: &DocumentMeta) -> bool {
        match self {
            Expression::StateIn(pred) => pred.matches(doc),
            Expression::StateNotIn(pred) => !pred.matches(doc),
            Expression::Dyad(lhs, SetOp::Union, rhs) => lhs.matches(doc) || rhs.matches(doc),
            Expression::Dyad(lhs, SetOp::Intersection, rhs) => lhs.matches(doc) && rhs.matches(doc),
            Expression::Dyad(lhs, SetOp::Difference, rhs) => lhs.matches(doc) && !rhs.matches(doc),
        }
    }

    /// Paths of the documents in `corpus` matching the expression.
    pub fn eval<'a, I>(&self, corpus: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a DocumentMeta>,
    {
        corpus
            .into_iter()
            .filter(|doc| self.matches(doc))
            .map(|doc| doc.path.clone())
            .collect()
    }

    fn negate(self) -> Expression {
        match self {
            Expression::StateIn(pred) => Expression::StateNotIn(pred),
            Expression::StateNotIn(pred) => Expression::StateIn(pred),
            dyad => Expression::Dyad(
                Box::new(Expression::StateIn(DocPred::Any)),
                SetOp::Difference,
                Box::new(dyad),
            ),
        }
    }
}

impl fmt::Display for DocPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocPred::Any => write!(f, "*"),
            DocPred::Tag(tag) => write!(f, "#{tag}"),
            DocPred::Folder(folder) => write!(f, "{folder:?}"),
            DocPred::LinksTo(note) => write!(f, "[[{note}]]"),
            DocPred::HasField(name) => write!(f, "{name}"),
            DocPred::Field { name, op, value } => {
                let op = match op {
                    FieldOp::Eq => "=",
                    FieldOp::NotEq => "!=",
                    FieldOp::Contains => "~",
                };
                write!(f, "{name} {op} {value:?}")
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::StateIn(pred) => write!(f, "{pred}"),
            Expression::StateNotIn(pred) => write!(f, "not {pred}"),
            Expression::Dyad(lhs, op, rhs) => {
                let op = match op {
                    SetOp::Union => "or",
                    SetOp::Intersection => "and",
                    SetOp::Difference => "and not",
                };
                write!(f, "({lhs} {op} {rhs})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Star,
    Tag(String),
    Str(String),
    Link(String),
    Word(String),
    Eq,
    NotEq,
    Tilde,
    And,
    Or,
    Not,
    Eof,
}

struct Lexer {
    input: Vec<char>,
    position: usize,
}

fn query_error<T>(msg: String) -> Result<T, BuildonomyError> {
    Err(BuildonomyError::Query(msg))
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn is_word_char(ch: char) -> bool {
        ch.is_alphanumeric() || matches!(ch, '_' | '-' | '/' | '.')
    }

    fn read_word(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char().filter(|c| Lexer::is_word_char(*c)) {
            result.push(ch);
            self.advance();
        }
        result
    }

    fn read_string(&mut self) -> Result<String, BuildonomyError> {
        self.advance();
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(result),
                '\\' => {
                    if let Some(escaped) = self.current_char() {
                        result.push(escaped);
                        self.advance();
                    }
                }
                other => result.push(other),
            }
        }
        query_error("Unterminated string".to_string())
    }

    fn read_link(&mut self) -> Result<String, BuildonomyError> {
        self.position += 2;
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch == ']' && self.peek_char() == Some(']') {
                self.position += 2;
                return Ok(link_target(&result).to_string());
            }
            result.push(ch);
            self.advance();
        }
        query_error("Unterminated link".to_string())
    }

    fn next_token(&mut self) -> Result<Token, BuildonomyError> {
        self.skip_whitespace();
        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };
        let token = match ch {
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            '*' => {
                self.advance();
                Token::Star
            }
            '-' => {
                self.advance();
                Token::Not
            }
            '=' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                }
                Token::Eq
            }
            '!' if self.peek_char() == Some('=') => {
                self.position += 2;
                Token::NotEq
            }
            '!' => {
                self.advance();
                Token::Not
            }
            '~' => {
                self.advance();
                Token::Tilde
            }
            '#' => {
                self.advance();
                let tag = self.read_word();
                if tag.is_empty() {
                    return query_error("Empty tag".to_string());
                }
                Token::Tag(tag)
            }
            '"' => Token::Str(self.read_string()?),
            '[' if self.peek_char() == Some('[') => Token::Link(self.read_link()?),
            c if Lexer::is_word_char(c) => {
                let word = self.read_word();
                match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word(word),
                }
            }
            other => return query_error(format!("Unexpected character '{other}'")),
        };
        Ok(token)
    }
}

struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    fn new(mut lexer: Lexer) -> Result<Self, BuildonomyError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<Token, BuildonomyError> {
        let next = self.lexer.next_token()?;
        Ok(mem::replace(&mut self.current_token, next))
    }

    fn parse_or(&mut self) -> Result<Expression, BuildonomyError> {
        let mut expr = self.parse_and()?;
        while self.current_token == Token::Or {
            self.advance()?;
            let rhs = self.parse_and()?;
            expr = Expression::Dyad(Box::new(expr), SetOp::Union, Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression, BuildonomyError> {
        let mut expr = self.parse_unary()?;
        while self.current_token == Token::And {
            self.advance()?;
            let rhs = self.parse_unary()?;
            expr = Expression::Dyad(Box::new(expr), SetOp::Intersection, Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, BuildonomyError> {
        if self.current_token == Token::Not {
            self.advance()?;
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_value(&mut self) -> Result<String, BuildonomyError> {
        match self.advance()? {
            Token::Str(s) | Token::Word(s) => Ok(s),
            Token::Link(target) => Ok(format!("[[{target}]]")),
            Token::Tag(tag) => Ok(format!("#{tag}")),
            other => query_error(format!("Expected a value, got {other:?}")),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, BuildonomyError> {
        let pred = match self.advance()? {
            Token::LParen => {
                let inner = self.parse_or()?;
                if self.advance()? != Token::RParen {
                    return query_error("Expected ')'".to_string());
                }
                return Ok(inner);
            }
            Token::Star => DocPred::Any,
            Token::Tag(tag) => DocPred::Tag(tag),
            Token::Str(folder) => DocPred::Folder(folder),
            Token::Link(note) => DocPred::LinksTo(note),
            Token::Word(name) => {
                let op = match self.current_token {
                    Token::Eq => Some(FieldOp::Eq),
                    Token::NotEq => Some(FieldOp::NotEq),
                    Token::Tilde => Some(FieldOp::Contains),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        self.advance()?;
                        let value = self.parse_value()?;
                        DocPred::Field { name, op, value }
                    }
                    None => DocPred::HasField(name),
                }
            }
            other => return query_error(format!("Unexpected token {other:?}")),
        };
        Ok(Expression::StateIn(pred))
    }
}

/// Identity of a query: SHA-256 (hex) of its whitespace-normalized text.
pub fn query_id(source: &str) -> String {
    let normalized = source.split_whitespace().collect::<Vec<&str>>().join(" ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// A parsed query with its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub source: String,
    pub id: String,
    pub expr: Expression,
}

impl Query {
    pub fn parse(source: &str) -> Result<Query, BuildonomyError> {
        if source.trim().is_empty() {
            return query_error("Empty query".to_string());
        }
        let mut parser = Parser::new(Lexer::new(source))?;
        let expr = parser.parse_or()?;
        if parser.current_token != Token::Eof {
            return query_error(format!(
                "Unexpected trailing {:?} in '{source}'",
                parser.current_token
            ));
        }
        Ok(Query {
            source: source.to_string(),
            id: query_id(source),
            expr,
        })
    }

    pub fn eval<'a, I>(&self, corpus: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a DocumentMeta>,
    {
        self.expr.eval(corpus)
    }

    pub fn matches(&self, doc: &DocumentMeta) -> bool {
        self.expr.matches(doc)
    }
}

impl FromStr for Query {
    type Err = BuildonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Query::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<DocumentMeta> {
        vec![
            DocumentMeta::from_text(
                "people/Taki.md",
                "---\ntags: [person]\nmanager: \"[[Mitsuha]]\"\nrole: Architect\n---\n",
            ),
            DocumentMeta::from_text(
                "people/Tessie.md",
                "---\ntags: [person/friend]\nmanager: \"[[Taki]]\"\n---\nrole:: Engineer\n",
            ),
            DocumentMeta::from_text(
                "movies/Your Name.md",
                "---\ntags: [media/anime]\nrating: 9\n---\nStars [[Taki]].\n",
            ),
            DocumentMeta::from_text("inbox/Note.md", "nothing here"),
        ]
    }

    fn run(src: &str) -> Vec<String> {
        Query::parse(src)
            .unwrap()
            .eval(&corpus())
            .into_iter()
            .collect()
    }

    #[test]
    fn test_predicates() {
        assert_eq!(run("*").len(), 4);
        assert_eq!(run("#person"), vec!["people/Taki.md", "people/Tessie.md"]);
        assert_eq!(run("#person/friend"), vec!["people/Tessie.md"]);
        assert_eq!(run("\"movies\""), vec!["movies/Your Name.md"]);
        assert_eq!(run("[[Taki]]"), vec!["movies/Your Name.md", "people/Tessie.md"]);
        assert_eq!(run("manager = [[Taki]]"), vec!["people/Tessie.md"]);
        assert_eq!(run("manager = \"[[people/Taki]]\""), vec!["people/Tessie.md"]);
        assert_eq!(run("rating = 9.0"), vec!["movies/Your Name.md"]);
        assert_eq!(run("role ~ ENGIN"), vec!["people/Tessie.md"]);
        assert_eq!(run("role"), vec!["people/Taki.md", "people/Tessie.md"]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(run("#person and not #person/friend"), vec!["people/Taki.md"]);
        assert_eq!(run("\"inbox\" OR \"movies\""), vec!["inbox/Note.md", "movies/Your Name.md"]);
        assert_eq!(run("-#person and -\"inbox\""), vec!["movies/Your Name.md"]);
        assert_eq!(
            run("not (#person or #media)"),
            vec!["inbox/Note.md"]
        );
        assert_eq!(
            run("#person and (role = Architect or role = Engineer)"),
            vec!["people/Taki.md", "people/Tessie.md"]
        );
        assert_eq!(run("manager != [[Taki]] and #person"), vec!["people/Taki.md"]);
    }

    #[test]
    fn test_query_identity_and_errors() {
        let a = Query::parse("#person   and  role").unwrap();
        let b = Query::parse(" #person and role ").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
        assert_ne!(a.id, Query::parse("#person").unwrap().id);

        assert!(Query::parse("").is_err());
        assert!(Query::parse("(#person").is_err());
        assert!(Query::parse("#person #movie").is_err());
        assert!(Query::parse("role =").is_err());
        assert!(Query::parse("\"open").is_err());
        assert!(Query::parse("a $ b").is_err());
    }

    #[test]
    fn test_tag_matches() {
        assert!(tag_matches("media/anime", "media"));
        assert!(tag_matches("Media", "#media"));
        assert!(!tag_matches("mediathek", "media"));
        assert!(!tag_matches("media", ""));
    }
}
