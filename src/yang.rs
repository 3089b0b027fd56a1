//! YANG source tokenizer and generic statement tree
//!
//! YANG is parsed in two passes: this module turns module text into a tree of
//! `keyword [argument] (";" | "{" ... "}")` statements without interpreting
//! them, and [`crate::schema`] compiles the statements it understands into
//! schema nodes.

use thiserror::Error;

/// Syntax error in YANG module text
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

/// A single YANG statement with its substatements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub keyword: String,
    pub argument: Option<String>,
    pub substatements: Vec<Statement>,
}

impl Statement {
    /// Argument as a string slice, empty when absent
    pub fn arg(&self) -> &str {
        self.argument.as_deref().unwrap_or("")
    }

    /// First substatement with the given keyword
    pub fn find(&self, keyword: &str) -> Option<&Statement> {
        self.substatements.iter().find(|s| s.keyword == keyword)
    }

    /// Argument of the first substatement with the given keyword
    pub fn find_arg(&self, keyword: &str) -> Option<&str> {
        self.find(keyword).map(Statement::arg)
    }

    /// All substatements with the given keyword
    pub fn all<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Statement> + 'a {
        self.substatements.iter().filter(move |s| s.keyword == keyword)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Quoted(String),
    Open,
    Close,
    Semicolon,
    Plus,
}

/// Parse YANG module text into its single top-level statement
pub fn parse(source: &str) -> Result<Statement, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmt = parser.statement()?;
    if let Some((line, _)) = parser.tokens.get(parser.pos) {
        return Err(SyntaxError {
            line: *line,
            message: "unexpected content after top-level statement".into(),
        });
    }
    Ok(stmt)
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, SyntaxError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = line;
                i += 2;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(SyntaxError {
                                line: start,
                                message: "unterminated comment".into(),
                            });
                        }
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            '{' => {
                tokens.push((line, Token::Open));
                i += 1;
            }
            '}' => {
                tokens.push((line, Token::Close));
                i += 1;
            }
            ';' => {
                tokens.push((line, Token::Semicolon));
                i += 1;
            }
            '+' if matches!(tokens.last(), Some((_, Token::Quoted(_)))) => {
                tokens.push((line, Token::Plus));
                i += 1;
            }
            '"' | '\'' => {
                let start = line;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(SyntaxError {
                                line: start,
                                message: "unterminated string".into(),
                            });
                        }
                        Some(&q) if q == c => {
                            i += 1;
                            break;
                        }
                        Some('\\') if c == '"' => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some(&other) => other,
                                None => '\\',
                            };
                            text.push(escaped);
                            i += 2;
                        }
                        Some(&ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((start, Token::Quoted(text)));
            }
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && !matches!(chars[i], '{' | '}' | ';')
                {
                    i += 1;
                }
                tokens.push((line, Token::Text(chars[start..i].iter().collect())));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(line, _)| *line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = match self.next() {
            Some(Token::Text(word)) => word,
            Some(other) => return Err(self.error(format!("expected keyword, found {:?}", other))),
            None => return Err(self.error("unexpected end of input")),
        };

        let argument = match self.peek() {
            Some(Token::Text(_)) | Some(Token::Quoted(_)) => Some(self.argument()?),
            _ => None,
        };

        let substatements = match self.next() {
            Some(Token::Semicolon) => Vec::new(),
            Some(Token::Open) => {
                let mut children = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::Close) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => children.push(self.statement()?),
                        None => return Err(self.error(format!("unclosed block for {}", keyword))),
                    }
                }
                children
            }
            _ => {
                return Err(self.error(format!("expected ';' or '{{' after {}", keyword)));
            }
        };

        Ok(Statement {
            keyword,
            argument,
            substatements,
        })
    }

    fn argument(&mut self) -> Result<String, SyntaxError> {
        match self.next() {
            Some(Token::Text(text)) => Ok(text),
            Some(Token::Quoted(first)) => {
                let mut value = first;
                while self.peek() == Some(&Token::Plus) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Quoted(more)) => value.push_str(&more),
                        _ => return Err(self.error("expected string after '+'")),
                    }
                }
                Ok(value)
            }
            _ => Err(self.error("expected argument")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_statements() {
        let stmt = parse(
            r#"module m {
                namespace "urn:m";
                prefix m;
                container c { leaf x { type string; } }
            }"#,
        )
        .unwrap();

        assert_eq!(stmt.keyword, "module");
        assert_eq!(stmt.arg(), "m");
        assert_eq!(stmt.find_arg("namespace"), Some("urn:m"));
        let container = stmt.find("container").unwrap();
        let leaf = container.find("leaf").unwrap();
        assert_eq!(leaf.find_arg("type"), Some("string"));
    }

    #[test]
    fn test_comments_and_concatenation() {
        let stmt = parse(
            "module m { // trailing\n /* block\n comment */ description \"a\" + 'b\"c'; }",
        )
        .unwrap();
        assert_eq!(stmt.find_arg("description"), Some("ab\"c"));
    }

    #[test]
    fn test_unquoted_path_argument() {
        let stmt = parse("module m { augment /if:interfaces/if:interface { leaf y; } }").unwrap();
        assert_eq!(
            stmt.find_arg("augment"),
            Some("/if:interfaces/if:interface")
        );
    }

    #[test]
    fn test_unclosed_block_reports_line() {
        let err = parse("module m {\n container c {\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_trailing_content_rejected() {
        assert!(parse("module m; module n;").is_err());
    }
}
