//! Callable re-synthesis from source text.
//!
//! [`declaration_source`] turns the text a function renders as into a
//! standalone function expression, and [`FunctionShape::parse`] checks that the
//! result is one: delimiters balance (string, template, regex and comment
//! aware) and the head reads as a function, generator, async function, arrow
//! or class.  [`synthesize_function`] allocates a fresh function object for
//! text that passes.
//!
//! Only the definition is reproduced.  Bindings captured from the original's
//! defining scope are not.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey,
};

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Why a source text could not be turned back into a callable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SynthesisError {
    #[error("source text is empty")]
    Empty,
    #[error("`{0}` is a native function with no re-parseable source")]
    NativeCode(String),
    #[error("unterminated {0}")]
    Unterminated(String),
    #[error("unexpected `{found}`, expected `{expected}`")]
    UnbalancedDelimiter { expected: String, found: String },
    #[error("unexpected end of source, expected `{expected}`")]
    UnexpectedEnd { expected: String },
    #[error("unexpected `{0}`")]
    UnexpectedToken(String),
    #[error("source does not read as a function, arrow or class")]
    NotAFunction,
    #[error("`{0}` is a reserved word and cannot name a binding")]
    ReservedName(String),
    #[error("malformed parameter list")]
    MalformedParameters,
    #[error("unexpected `{0}` after the function")]
    TrailingInput(String),
    #[error("host rejected source: {0}")]
    Rejected(String),
    #[error("heap refused synthesized function: {0}")]
    Heap(#[from] ObjectError),
}

impl SynthesisError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "FE-CLONE-0101",
            Self::NativeCode(_) => "FE-CLONE-0102",
            Self::Unterminated(_) => "FE-CLONE-0103",
            Self::UnbalancedDelimiter { .. } => "FE-CLONE-0104",
            Self::UnexpectedEnd { .. } => "FE-CLONE-0105",
            Self::UnexpectedToken(_) => "FE-CLONE-0106",
            Self::NotAFunction => "FE-CLONE-0107",
            Self::ReservedName(_) => "FE-CLONE-0108",
            Self::MalformedParameters => "FE-CLONE-0109",
            Self::TrailingInput(_) => "FE-CLONE-0110",
            Self::Rejected(_) => "FE-CLONE-0111",
            Self::Heap(_) => "FE-CLONE-0112",
        }
    }
}

// ---------------------------------------------------------------------------
// Declaration wrapper
// ---------------------------------------------------------------------------

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '#'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword)
        .is_some_and(|rest| !rest.starts_with(is_ident_char))
}

fn reads_as_arrow(text: &str) -> bool {
    match (text.find("=>"), text.find('{')) {
        (Some(arrow), Some(brace)) => arrow < brace,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Source text as a standalone function expression.
///
/// Method shorthand (`name(a) { .. }`, `*gen() { .. }`) renders without the
/// `function` keyword, so it is prefixed; `async name() { .. }` becomes
/// `async function name() { .. }`.  Text that already reads as a function,
/// class or arrow, or has nothing before its first `(`, is returned as-is.
pub fn declaration_source(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim_start();
    if starts_with_keyword(trimmed, "function")
        || starts_with_keyword(trimmed, "class")
        || reads_as_arrow(trimmed)
    {
        return Cow::Borrowed(text);
    }
    if starts_with_keyword(trimmed, "async") {
        let rest = trimmed["async".len()..].trim_start();
        if starts_with_keyword(rest, "function") {
            return Cow::Borrowed(text);
        }
        if rest.find('(').is_some_and(|paren| paren > 0) {
            return Cow::Owned(format!("async function {rest}"));
        }
    }
    match trimmed.find('(') {
        Some(paren) if !trimmed[..paren].trim().is_empty() => {
            Cow::Owned(format!("function {trimmed}"))
        }
        _ => Cow::Borrowed(text),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Punct(&'static str),
    Literal,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(word) => f.write_str(word),
            Self::Punct(p) => f.write_str(p),
            Self::Literal => f.write_str("literal"),
        }
    }
}

const MULTI_PUNCT: &[&str] = &[
    "===", "!==", "...", "=>", "==", "!=", "<=", ">=", "++", "--",
];

const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

const RESERVED_WORDS: &[&str] = &[
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "new",
    "null",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
];

fn single_punct(c: char) -> Option<&'static str> {
    Some(match c {
        '(' => "(",
        ')' => ")",
        '[' => "[",
        ']' => "]",
        '{' => "{",
        '}' => "}",
        ',' => ",",
        ';' => ";",
        ':' => ":",
        '.' => ".",
        '=' => "=",
        '*' => "*",
        '+' => "+",
        '-' => "-",
        '/' => "/",
        '%' => "%",
        '<' => "<",
        '>' => ">",
        '!' => "!",
        '?' => "?",
        '&' => "&",
        '|' => "|",
        '^' => "^",
        '~' => "~",
        '@' => "@",
        _ => return None,
    })
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    brace_depth: u32,
    /// Brace depth at each open `${` substitution.
    template_resume: Vec<u32>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn run(text: &str) -> Result<Vec<Token>, SynthesisError> {
        let mut lexer = Self {
            chars: text.chars().collect(),
            pos: 0,
            brace_depth: 0,
            template_resume: Vec::new(),
            tokens: Vec::new(),
        };
        while let Some(c) = lexer.peek(0) {
            lexer.step(c)?;
        }
        if !lexer.template_resume.is_empty() {
            return Err(SynthesisError::Unterminated("template literal".into()));
        }
        Ok(lexer.tokens)
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(k, ch)| self.peek(k) == Some(ch))
    }

    fn step(&mut self, c: char) -> Result<(), SynthesisError> {
        if c.is_whitespace() {
            self.pos += 1;
            return Ok(());
        }
        match (c, self.peek(1)) {
            ('/', Some('/')) => {
                while self.peek(0).is_some_and(|ch| ch != '\n') {
                    self.pos += 1;
                }
                return Ok(());
            }
            ('/', Some('*')) => return self.block_comment(),
            _ => {}
        }
        if c == '"' || c == '\'' {
            return self.string(c);
        }
        if c == '`' {
            self.pos += 1;
            return self.template();
        }
        if c == '/' && self.regex_allowed() {
            return self.regex();
        }
        if is_ident_start(c) {
            let start = self.pos;
            self.pos += 1;
            while self.peek(0).is_some_and(is_ident_char) {
                self.pos += 1;
            }
            let word: String = self.chars[start..self.pos].iter().collect();
            self.tokens.push(Token::Ident(word));
            return Ok(());
        }
        if c.is_ascii_digit() {
            while self
                .peek(0)
                .is_some_and(|ch| ch.is_alphanumeric() || ch == '.' || ch == '_')
            {
                self.pos += 1;
            }
            self.tokens.push(Token::Literal);
            return Ok(());
        }
        if c == '}' && self.template_resume.last() == Some(&self.brace_depth) {
            self.template_resume.pop();
            self.pos += 1;
            return self.template();
        }
        self.punct(c)
    }

    fn block_comment(&mut self) -> Result<(), SynthesisError> {
        self.pos += 2;
        loop {
            if self.peek(0).is_none() {
                return Err(SynthesisError::Unterminated("block comment".into()));
            }
            if self.starts_with("*/") {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
    }

    fn string(&mut self, quote: char) -> Result<(), SynthesisError> {
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(SynthesisError::Unterminated("string literal".into()));
                }
                Some('\\') => self.pos += 2,
                Some(ch) if ch == quote => {
                    self.pos += 1;
                    self.tokens.push(Token::Literal);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Scan template text up to the closing backtick or the next `${`.
    fn template(&mut self) -> Result<(), SynthesisError> {
        loop {
            match self.peek(0) {
                None => return Err(SynthesisError::Unterminated("template literal".into())),
                Some('\\') => self.pos += 2,
                Some('`') => {
                    self.pos += 1;
                    self.tokens.push(Token::Literal);
                    return Ok(());
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.pos += 2;
                    self.tokens.push(Token::Literal);
                    self.template_resume.push(self.brace_depth);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        let mut recent = self.tokens.iter().rev();
        match recent.next() {
            None => true,
            // `++` and `--` before a slash are postfix, so the slash divides.
            Some(Token::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            // A member name such as `o.in` is an operand, never a keyword.
            Some(Token::Ident(_)) if matches!(recent.next(), Some(Token::Punct("."))) => false,
            Some(Token::Ident(word)) => KEYWORDS_BEFORE_EXPRESSION.contains(&word.as_str()),
            Some(Token::Literal) => false,
        }
    }

    fn regex(&mut self) -> Result<(), SynthesisError> {
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(SynthesisError::Unterminated(
                        "regular expression literal".into(),
                    ));
                }
                Some('\\') => self.pos += 2,
                Some('[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.tokens.push(Token::Literal);
        Ok(())
    }

    fn punct(&mut self, c: char) -> Result<(), SynthesisError> {
        if let Some(multi) = MULTI_PUNCT.iter().copied().find(|m| self.starts_with(m)) {
            self.pos += multi.len();
            self.tokens.push(Token::Punct(multi));
            return Ok(());
        }
        let p = single_punct(c).ok_or_else(|| SynthesisError::UnexpectedToken(c.to_string()))?;
        match p {
            "{" => self.brace_depth += 1,
            "}" => self.brace_depth = self.brace_depth.saturating_sub(1),
            _ => {}
        }
        self.pos += 1;
        self.tokens.push(Token::Punct(p));
        Ok(())
    }
}

fn closing(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

fn check_balanced(tokens: &[Token]) -> Result<(), SynthesisError> {
    let mut open: Vec<&'static str> = Vec::new();
    for token in tokens {
        let Token::Punct(p) = token else { continue };
        match *p {
            "(" | "[" | "{" => open.push(closing(p)),
            ")" | "]" | "}" => match open.pop() {
                Some(expected) if expected == *p => {}
                Some(expected) => {
                    return Err(SynthesisError::UnbalancedDelimiter {
                        expected: expected.into(),
                        found: (*p).into(),
                    });
                }
                None => {
                    return Err(SynthesisError::UnbalancedDelimiter {
                        expected: "end of source".into(),
                        found: (*p).into(),
                    });
                }
            },
            _ => {}
        }
    }
    match open.pop() {
        Some(expected) => Err(SynthesisError::UnexpectedEnd {
            expected: expected.into(),
        }),
        None => Ok(()),
    }
}

/// Split at `sep` outside any bracket pair.
fn split_top_level<'t>(tokens: &'t [Token], sep: &str) -> Vec<&'t [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        if let Token::Punct(p) = token {
            match *p {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                p if p == sep && depth == 0 => {
                    parts.push(&tokens[start..idx]);
                    start = idx + 1;
                }
                _ => {}
            }
        }
    }
    parts.push(&tokens[start..]);
    parts
}

fn has_top_level(tokens: &[Token], punct: &str) -> bool {
    split_top_level(tokens, punct).len() > 1
}

// ---------------------------------------------------------------------------
// FunctionShape
// ---------------------------------------------------------------------------

/// Syntactic flavor of a function expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionFlavor {
    Ordinary,
    Generator,
    Async,
    AsyncGenerator,
    Arrow,
    AsyncArrow,
    Class,
}

impl FunctionFlavor {
    /// Can the function be used with `new`?
    pub fn is_constructible(self) -> bool {
        matches!(self, Self::Ordinary | Self::Class)
    }
}

/// What a parsed source text declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionShape {
    pub name: Option<String>,
    pub flavor: FunctionFlavor,
    /// Parameters before the first default or rest parameter.
    pub length: u32,
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn punct_at(&self, ahead: usize, punct: &str) -> bool {
        matches!(self.tokens.get(self.pos + ahead), Some(Token::Punct(p)) if *p == punct)
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn is_punct(&self, punct: &str) -> bool {
        self.punct_at(0, punct)
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        let hit = self.is_ident(word);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        let hit = self.is_punct(punct);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn ident(&mut self) -> Option<&'t str> {
        match self.peek() {
            Some(Token::Ident(word)) => {
                self.pos += 1;
                Some(word)
            }
            _ => None,
        }
    }

    /// Consume a bracketed group and return the tokens between the brackets.
    fn group(&mut self, open: &str) -> Result<&'t [Token], SynthesisError> {
        if !self.is_punct(open) {
            return Err(self.unexpected(open));
        }
        let start = self.pos + 1;
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.pos..].iter().enumerate() {
            let Token::Punct(p) = token else { continue };
            match *p {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos + offset;
                        self.pos = end + 1;
                        return Ok(&self.tokens[start..end]);
                    }
                }
                _ => {}
            }
        }
        Err(SynthesisError::UnexpectedEnd {
            expected: closing(open).into(),
        })
    }

    fn rest(&mut self) -> &'t [Token] {
        let rest = &self.tokens[self.pos..];
        self.pos = self.tokens.len();
        rest
    }

    fn unexpected(&self, expected: &str) -> SynthesisError {
        match self.peek() {
            Some(token) => SynthesisError::UnexpectedToken(token.to_string()),
            None => SynthesisError::UnexpectedEnd {
                expected: expected.into(),
            },
        }
    }

    fn finish(&self) -> Result<(), SynthesisError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(SynthesisError::TrailingInput(token.to_string())),
        }
    }
}

fn binding_name(name: &str) -> Result<String, SynthesisError> {
    if RESERVED_WORDS.contains(&name) {
        return Err(SynthesisError::ReservedName(name.to_string()));
    }
    Ok(name.to_string())
}

fn count_parameters(params: &[Token]) -> Result<u32, SynthesisError> {
    if params.is_empty() {
        return Ok(0);
    }
    let segments = split_top_level(params, ",");
    let last = segments.len() - 1;
    let mut length = 0;
    let mut counting = true;
    for (idx, segment) in segments.iter().enumerate() {
        match segment.first() {
            None if idx == last && idx > 0 => {}
            None => return Err(SynthesisError::MalformedParameters),
            Some(Token::Punct("...")) => {
                if idx != last {
                    return Err(SynthesisError::MalformedParameters);
                }
                counting = false;
            }
            Some(_) => {
                if has_top_level(segment, "=") {
                    counting = false;
                }
                if counting {
                    length += 1;
                }
            }
        }
    }
    Ok(length)
}

fn reject_native(body: &[Token], name: Option<&str>) -> Result<(), SynthesisError> {
    let native = matches!(
        body,
        [Token::Punct("["), Token::Ident(a), Token::Ident(b), Token::Punct("]")]
            if a == "native" && b == "code"
    );
    if native {
        return Err(SynthesisError::NativeCode(
            name.unwrap_or("anonymous").to_string(),
        ));
    }
    Ok(())
}

impl FunctionShape {
    /// Parse `text` as a single function, arrow or class expression.
    pub fn parse(text: &str) -> Result<Self, SynthesisError> {
        let tokens = Lexer::run(text)?;
        if tokens.is_empty() {
            return Err(SynthesisError::Empty);
        }
        check_balanced(&tokens)?;
        let mut cur = Cursor {
            tokens: &tokens,
            pos: 0,
        };

        // `async => ..` is an arrow whose parameter is named `async`.
        let is_async = cur.is_ident("async") && tokens.len() > 1 && !cur.punct_at(1, "=>");
        if is_async {
            cur.pos += 1;
        }
        if cur.eat_ident("function") {
            return Self::function(cur, is_async);
        }
        if !is_async && cur.eat_ident("class") {
            return Self::class(cur);
        }
        Self::arrow(cur, is_async)
    }

    fn function(mut cur: Cursor<'_>, is_async: bool) -> Result<Self, SynthesisError> {
        let generator = cur.eat_punct("*");
        let name = cur.ident().map(binding_name).transpose()?;
        let length = count_parameters(cur.group("(")?)?;
        let body = cur.group("{")?;
        cur.finish()?;
        reject_native(body, name.as_deref())?;

        let flavor = match (is_async, generator) {
            (false, false) => FunctionFlavor::Ordinary,
            (false, true) => FunctionFlavor::Generator,
            (true, false) => FunctionFlavor::Async,
            (true, true) => FunctionFlavor::AsyncGenerator,
        };
        Ok(Self {
            name,
            flavor,
            length,
        })
    }

    fn arrow(mut cur: Cursor<'_>, is_async: bool) -> Result<Self, SynthesisError> {
        let length = if cur.is_punct("(") {
            count_parameters(cur.group("(")?)?
        } else if let Some(param) = cur.ident() {
            binding_name(param)?;
            1
        } else {
            return Err(SynthesisError::NotAFunction);
        };
        if !cur.eat_punct("=>") {
            return Err(SynthesisError::NotAFunction);
        }

        if cur.is_punct("{") {
            cur.group("{")?;
            cur.finish()?;
        } else {
            let body = cur.rest();
            if body.is_empty() {
                return Err(SynthesisError::UnexpectedEnd {
                    expected: "arrow body".into(),
                });
            }
            if has_top_level(body, ";") {
                return Err(SynthesisError::TrailingInput(";".into()));
            }
        }

        Ok(Self {
            name: None,
            flavor: if is_async {
                FunctionFlavor::AsyncArrow
            } else {
                FunctionFlavor::Arrow
            },
            length,
        })
    }

    fn class(mut cur: Cursor<'_>) -> Result<Self, SynthesisError> {
        let name = if cur.is_ident("extends") {
            None
        } else {
            cur.ident().map(binding_name).transpose()?
        };
        if cur.eat_ident("extends") {
            let mut heritage = 0;
            while !cur.is_punct("{") {
                match cur.peek() {
                    None => {
                        return Err(SynthesisError::UnexpectedEnd {
                            expected: "class body".into(),
                        });
                    }
                    Some(Token::Punct("(")) => {
                        cur.group("(")?;
                    }
                    Some(Token::Punct("[")) => {
                        cur.group("[")?;
                    }
                    Some(_) => cur.pos += 1,
                }
                heritage += 1;
            }
            if heritage == 0 {
                return Err(SynthesisError::UnexpectedToken("{".into()));
            }
        }
        let body = cur.group("{")?;
        cur.finish()?;

        let mut length = 0;
        let mut depth = 0usize;
        for (idx, token) in body.iter().enumerate() {
            match token {
                Token::Punct("(" | "[" | "{") => depth += 1,
                Token::Punct(")" | "]" | "}") => depth = depth.saturating_sub(1),
                Token::Ident(word) if depth == 0 && word == "constructor" => {
                    let mut ctor = Cursor {
                        tokens: body,
                        pos: idx + 1,
                    };
                    if ctor.is_punct("(") {
                        length = count_parameters(ctor.group("(")?)?;
                        break;
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            name,
            flavor: FunctionFlavor::Class,
            length,
        })
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Allocate a new function object for `text`.
///
/// The function gets the realm's Function prototype, own `length` and `name`
/// (non-writable, non-enumerable, configurable), and for constructible
/// flavors a fresh `prototype` object whose `constructor` points back.
pub fn synthesize_function(
    heap: &mut ObjectHeap,
    text: &str,
) -> Result<ObjectHandle, SynthesisError> {
    let shape = FunctionShape::parse(text)?;
    let function = heap.alloc_function(text);

    heap.define_property(
        function,
        PropertyKey::from("length"),
        PropertyDescriptor::Data {
            value: JsValue::Int(i64::from(shape.length)),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    )?;
    heap.define_property(
        function,
        PropertyKey::from("name"),
        PropertyDescriptor::Data {
            value: JsValue::Str(shape.name.unwrap_or_default()),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    )?;

    if shape.flavor.is_constructible() {
        let prototype = heap.alloc_object();
        heap.define_property(
            prototype,
            PropertyKey::from("constructor"),
            PropertyDescriptor::data_hidden(JsValue::Object(function)),
        )?;
        heap.define_property(
            function,
            PropertyKey::from("prototype"),
            PropertyDescriptor::Data {
                value: JsValue::Object(prototype),
                writable: shape.flavor != FunctionFlavor::Class,
                enumerable: false,
                configurable: false,
            },
        )?;
    }
    Ok(function)
}
