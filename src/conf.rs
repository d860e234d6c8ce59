use std::fmt;

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A parsed nginx configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conf {
    pub root: Context,
}

/// An ordered block of items: the main context or the body of a block
/// directive such as `http { ... }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Directive(Directive),
    /// Text after `#`, up to the end of the line.
    Comment(String),
}

/// `name value;` or `name value { ... }`.
///
/// The value is the directive's arguments joined by a single space; it is
/// empty for directives without arguments (e.g. `server { ... }`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub value: String,
    pub block: Option<Context>,
}

impl Directive {
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            block: None,
        }
    }

    pub fn block(name: impl Into<String>, value: impl Into<String>, block: Context) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            block: Some(block),
        }
    }

    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.items.iter().filter_map(|item| match item {
            Item::Directive(d) => Some(d),
            Item::Comment(_) => None,
        })
    }

    pub fn push(&mut self, directive: Directive) {
        self.items.push(Item::Directive(directive));
    }

    /// Removes every directive named `name`; returns how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.items.len();
        self.items
            .retain(|item| !matches!(item, Item::Directive(d) if d.name == name));
        before - self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: unexpected '}}'")]
    UnexpectedClose { line: usize },
    #[error("line {line}: unexpected '{token}' without a directive name")]
    MissingName { line: usize, token: char },
    #[error("line {line}: block is never closed")]
    UnclosedBlock { line: usize },
    #[error("line {line}: unterminated quoted string")]
    UnterminatedQuote { line: usize },
    #[error("line {line}: unterminated variable, missing '}}'")]
    UnterminatedVariable { line: usize },
    #[error("line {line}: directive '{name}' is not terminated by ';'")]
    MissingSemicolon { line: usize, name: String },
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Semicolon,
    Open,
    Close,
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    line: usize,
}

/// Ends a word. `#` only starts a comment at the beginning of a token.
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '{' | '}')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' | '{' | '}' => {
                chars.next();
                let kind = match c {
                    ';' => TokenKind::Semicolon,
                    '{' => TokenKind::Open,
                    _ => TokenKind::Close,
                };
                tokens.push(Token { kind, line });
            }
            '#' => {
                chars.next();
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Comment(text),
                    line,
                });
            }
            _ => {
                let start_line = line;
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    match c {
                        '"' | '\'' => {
                            chars.next();
                            word.push(c);
                            read_quoted(&mut chars, &mut word, c, &mut line)
                                .ok_or(ParseError::UnterminatedQuote { line: start_line })?;
                        }
                        '$' => {
                            chars.next();
                            word.push(c);
                            // `${var}` is part of the word, not a block opener.
                            if chars.peek() == Some(&'{') {
                                read_braced_variable(&mut chars, &mut word)
                                    .ok_or(ParseError::UnterminatedVariable { line: start_line })?;
                            }
                        }
                        c if is_delimiter(c) => break,
                        c => {
                            chars.next();
                            word.push(c);
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Word(word),
                    line: start_line,
                });
            }
        }
    }
    Ok(tokens)
}

/// Consumes `{name}` after a `$`. Returns `None` when the input ends or the
/// line breaks before the closing brace.
fn read_braced_variable(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    word: &mut String,
) -> Option<()> {
    for c in chars.by_ref() {
        if c == '\n' {
            return None;
        }
        word.push(c);
        if c == '}' {
            return Some(());
        }
    }
    None
}

/// Consumes a quoted string up to and including the closing `quote`, keeping
/// it verbatim. Returns `None` on end of input.
fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    word: &mut String,
    quote: char,
    line: &mut usize,
) -> Option<()> {
    let mut escaped = false;
    for c in chars.by_ref() {
        word.push(c);
        if c == '\n' {
            *line += 1;
        }
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parses nginx configuration text into a directive tree.
pub fn parse(input: &str) -> Result<Conf, ParseError> {
    let tokens = tokenize(input)?;
    let mut iter = tokens.into_iter().peekable();
    let root = parse_context(&mut iter, None)?;
    Ok(Conf { root })
}

fn parse_context(
    tokens: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    opened_at: Option<usize>,
) -> Result<Context, ParseError> {
    let mut context = Context::new();

    loop {
        let Some(token) = tokens.next() else {
            return match opened_at {
                Some(line) => Err(ParseError::UnclosedBlock { line }),
                None => Ok(context),
            };
        };

        match token.kind {
            TokenKind::Comment(text) => context.items.push(Item::Comment(text)),
            TokenKind::Close => {
                return match opened_at {
                    Some(_) => Ok(context),
                    None => Err(ParseError::UnexpectedClose { line: token.line }),
                };
            }
            TokenKind::Semicolon => {
                return Err(ParseError::MissingName {
                    line: token.line,
                    token: ';',
                });
            }
            TokenKind::Open => {
                return Err(ParseError::MissingName {
                    line: token.line,
                    token: '{',
                });
            }
            TokenKind::Word(name) => {
                let mut args: Vec<String> = Vec::new();
                let mut comments = Vec::new();
                loop {
                    let Some(next) = tokens.next() else {
                        return Err(ParseError::MissingSemicolon {
                            line: token.line,
                            name,
                        });
                    };
                    match next.kind {
                        TokenKind::Word(arg) => args.push(arg),
                        TokenKind::Comment(text) => comments.push(Item::Comment(text)),
                        TokenKind::Semicolon => {
                            context.push(Directive::scalar(name, args.join(" ")));
                            break;
                        }
                        TokenKind::Open => {
                            let block = parse_context(tokens, Some(next.line))?;
                            context.push(Directive::block(name, args.join(" "), block));
                            break;
                        }
                        TokenKind::Close => {
                            return Err(ParseError::MissingSemicolon {
                                line: token.line,
                                name,
                            });
                        }
                    }
                }
                context.items.extend(comments);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Printer
// ---------------------------------------------------------------------------

const INDENT: &str = "  ";

fn write_context(f: &mut fmt::Formatter<'_>, context: &Context, depth: usize) -> fmt::Result {
    let indent = INDENT.repeat(depth);
    for item in &context.items {
        match item {
            Item::Comment(text) => writeln!(f, "{indent}#{text}")?,
            Item::Directive(d) => {
                write!(f, "{indent}{}", d.name)?;
                if !d.value.is_empty() {
                    write!(f, " {}", d.value)?;
                }
                match &d.block {
                    None => writeln!(f, ";")?,
                    Some(block) => {
                        writeln!(f, " {{")?;
                        write_context(f, block, depth + 1)?;
                        writeln!(f, "{indent}}}")?;
                    }
                }
            }
        }
    }
    Ok(())
}

impl fmt::Display for Conf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_context(f, &self.root, 0)
    }
}

impl std::str::FromStr for Conf {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
