//! Template lexer.
//!
//! Splits template text into items: plain text outside `{{ }}` and action
//! tokens inside. Lexing stops at the first error, which is emitted as a
//! final [`Kind::Error`] item so the parser reports it in stream order.

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";
const TRIM_MARKER_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Keyword {
    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Range,
    Template,
    With,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Kind {
    Text,
    LeftDelim,
    RightDelim,
    Space,
    /// `=`
    Assign,
    /// `:=`
    Declare,
    Pipe,
    /// Any other printable ASCII character, e.g. `,`.
    Char,
    CharConstant,
    Bool,
    Dot,
    Nil,
    Field,
    Variable,
    Identifier,
    Number,
    Str,
    RawStr,
    LeftParen,
    RightParen,
    Keyword(Keyword),
    Eof,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Item {
    pub kind: Kind,
    /// Source text, or the message for [`Kind::Error`].
    pub val: String,
    /// 1-based line where the item starts.
    pub line: usize,
}

impl Item {
    /// Rendering used in "unexpected X in Y" messages.
    pub fn describe(&self) -> String {
        match self.kind {
            Kind::Eof => "EOF".to_string(),
            Kind::Error => self.val.clone(),
            Kind::Keyword(_) | Kind::Dot | Kind::Nil => format!("<{}>", self.val),
            _ if self.val.chars().count() > 10 => {
                let head: String = self.val.chars().take(10).collect();
                format!("{head:?}...")
            }
            _ => format!("{:?}", self.val),
        }
    }
}

fn keyword(word: &str) -> Option<Kind> {
    let kw = match word {
        "block" => Keyword::Block,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "define" => Keyword::Define,
        "else" => Keyword::Else,
        "end" => Keyword::End,
        "if" => Keyword::If,
        "range" => Keyword::Range,
        "template" => Keyword::Template,
        "with" => Keyword::With,
        "nil" => return Some(Kind::Nil),
        _ => return None,
    };
    Some(Kind::Keyword(kw))
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphabetic() || c.is_numeric()
}

/// `U+0023 '#'`
pub(super) fn fmt_rune(c: char) -> String {
    if c.is_control() {
        format!("U+{:04X}", c as u32)
    } else {
        format!("U+{:04X} '{c}'", c as u32)
    }
}

fn has_left_trim_marker(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0] == b'-' && is_space(b[1] as char)
}

fn has_right_trim_marker(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && is_space(b[0] as char) && b[1] == b'-'
}

enum State {
    Text,
    LeftDelim,
    Comment,
    InsideAction,
    RightDelim,
    Done,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Base {
    Decimal,
    Hex,
    Octal,
    Binary,
}

impl Base {
    fn digits(self) -> &'static str {
        match self {
            Base::Decimal => "0123456789_",
            Base::Hex => "0123456789abcdefABCDEF_",
            Base::Octal => "01234567_",
            Base::Binary => "01_",
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
    line: usize,
    start_line: usize,
    /// Width of the last char returned by `next_char`; 0 after a backup.
    width: usize,
    paren_depth: usize,
    items: Vec<Item>,
}

/// Lex `input` completely. The result always ends with an `Eof` or `Error`
/// item.
pub(super) fn lex(input: &str) -> Vec<Item> {
    let mut lx = Lexer {
        input,
        pos: 0,
        start: 0,
        line: 1,
        start_line: 1,
        width: 0,
        paren_depth: 0,
        items: Vec::new(),
    };
    let mut state = State::Text;
    loop {
        state = match state {
            State::Text => lx.lex_text(),
            State::LeftDelim => lx.lex_left_delim(),
            State::Comment => lx.lex_comment(),
            State::InsideAction => lx.lex_inside_action(),
            State::RightDelim => lx.lex_right_delim(),
            State::Done => break,
        };
    }
    lx.items
}

impl Lexer<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.rest().chars().next();
        match c {
            Some(c) => {
                self.width = c.len_utf8();
                self.pos += self.width;
                if c == '\n' {
                    self.line += 1;
                }
            }
            None => self.width = 0,
        }
        c
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Step back over the last char. Only valid once per `next_char`.
    fn backup(&mut self) {
        if self.width == 0 {
            return;
        }
        self.pos -= self.width;
        self.width = 0;
        if self.rest().starts_with('\n') {
            self.line -= 1;
        }
    }

    /// Jump forward by `n` bytes, keeping the line count in step.
    fn advance(&mut self, n: usize) {
        let end = (self.pos + n).min(self.input.len());
        self.line += self.input[self.pos..end].matches('\n').count();
        self.pos = end;
        self.width = 0;
    }

    fn accept(&mut self, valid: &str) -> bool {
        match self.peek_char() {
            Some(c) if valid.contains(c) => {
                self.next_char();
                true
            }
            _ => false,
        }
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn emit(&mut self, kind: Kind) {
        self.items.push(Item {
            kind,
            val: self.input[self.start..self.pos].to_string(),
            line: self.start_line,
        });
        self.ignore();
    }

    fn ignore(&mut self) {
        self.start = self.pos;
        self.start_line = self.line;
    }

    fn error(&mut self, message: String) -> State {
        self.items.push(Item {
            kind: Kind::Error,
            val: message,
            line: self.start_line,
        });
        State::Done
    }

    /// Whether a right delimiter starts here, and whether it carries a trim
    /// marker.
    fn at_right_delim(&self) -> (bool, bool) {
        let rest = self.rest();
        if has_right_trim_marker(rest) && rest[TRIM_MARKER_LEN..].starts_with(RIGHT_DELIM) {
            return (true, true);
        }
        (rest.starts_with(RIGHT_DELIM), false)
    }

    fn at_terminator(&self) -> bool {
        match self.peek_char() {
            None => true,
            Some(c) if is_space(c) => true,
            Some('.' | ',' | '|' | ':' | ')' | '(') => true,
            Some(_) => self.rest().starts_with(RIGHT_DELIM),
        }
    }

    // -- states ----------------------------------------------------------

    fn lex_text(&mut self) -> State {
        match self.rest().find(LEFT_DELIM) {
            Some(offset) => {
                self.advance(offset);
                if self.pos > self.start {
                    self.emit(Kind::Text);
                }
                State::LeftDelim
            }
            None => {
                self.advance(self.input.len() - self.pos);
                if self.pos > self.start {
                    self.emit(Kind::Text);
                }
                self.emit(Kind::Eof);
                State::Done
            }
        }
    }

    fn lex_left_delim(&mut self) -> State {
        self.advance(LEFT_DELIM.len());
        let trim = has_left_trim_marker(self.rest());
        let after = if trim { TRIM_MARKER_LEN } else { 0 };
        if self.rest()[after..].starts_with(LEFT_COMMENT) {
            self.advance(after);
            self.ignore();
            return State::Comment;
        }
        self.emit(Kind::LeftDelim);
        self.advance(after);
        self.ignore();
        self.paren_depth = 0;
        State::InsideAction
    }

    fn lex_comment(&mut self) -> State {
        self.advance(LEFT_COMMENT.len());
        let Some(end) = self.rest().find(RIGHT_COMMENT) else {
            return self.error("unclosed comment".to_string());
        };
        self.advance(end + RIGHT_COMMENT.len());
        let (delim, trim) = self.at_right_delim();
        if !delim {
            return self.error("comment ends before closing delimiter".to_string());
        }
        if trim {
            self.advance(TRIM_MARKER_LEN);
        }
        self.advance(RIGHT_DELIM.len());
        self.ignore();
        State::Text
    }

    fn lex_right_delim(&mut self) -> State {
        let (_, trim) = self.at_right_delim();
        if trim {
            self.advance(TRIM_MARKER_LEN);
            self.ignore();
        }
        self.advance(RIGHT_DELIM.len());
        self.emit(Kind::RightDelim);
        State::Text
    }

    fn lex_inside_action(&mut self) -> State {
        let (delim, _) = self.at_right_delim();
        if delim {
            if self.paren_depth == 0 {
                return State::RightDelim;
            }
            return self.error("unclosed left paren".to_string());
        }
        let Some(c) = self.next_char() else {
            return self.error("unclosed action".to_string());
        };
        match c {
            c if is_space(c) => {
                self.backup();
                return self.lex_space();
            }
            '=' => self.emit(Kind::Assign),
            ':' => {
                if self.next_char() != Some('=') {
                    return self.error("expected :=".to_string());
                }
                self.emit(Kind::Declare);
            }
            '|' => self.emit(Kind::Pipe),
            '"' => return self.lex_quote(),
            '`' => return self.lex_raw_quote(),
            '\'' => return self.lex_char(),
            '$' => return self.lex_variable(),
            '.' => match self.peek_char() {
                Some(n) if !n.is_ascii_digit() => return self.lex_field_or_variable(Kind::Field),
                _ => {
                    self.backup();
                    return self.lex_number();
                }
            },
            '+' | '-' | '0'..='9' => {
                self.backup();
                return self.lex_number();
            }
            c if is_alphanumeric(c) => {
                self.backup();
                return self.lex_identifier();
            }
            '(' => {
                self.emit(Kind::LeftParen);
                self.paren_depth += 1;
            }
            ')' => {
                if self.paren_depth == 0 {
                    return self.error("unexpected right paren".to_string());
                }
                self.paren_depth -= 1;
                self.emit(Kind::RightParen);
            }
            c if c.is_ascii() && !c.is_ascii_control() => self.emit(Kind::Char),
            c => return self.error(format!("unrecognized character in action: {}", fmt_rune(c))),
        }
        State::InsideAction
    }

    fn lex_space(&mut self) -> State {
        let mut spaces = 0;
        while let Some(c) = self.peek_char() {
            if !is_space(c) {
                break;
            }
            self.next_char();
            spaces += 1;
        }
        // A trim-marked right delimiter owns the last space.
        let last = self.pos - 1;
        if has_right_trim_marker(&self.input[last..])
            && self.input[last + TRIM_MARKER_LEN..].starts_with(RIGHT_DELIM)
        {
            self.backup();
            if spaces == 1 {
                return State::InsideAction;
            }
        }
        self.emit(Kind::Space);
        State::InsideAction
    }

    fn lex_identifier(&mut self) -> State {
        while matches!(self.peek_char(), Some(c) if is_alphanumeric(c)) {
            self.next_char();
        }
        if !self.at_terminator() {
            return self.bad_character();
        }
        let word = &self.input[self.start..self.pos];
        let kind = match keyword(word) {
            Some(kind) => kind,
            None if word == "true" || word == "false" => Kind::Bool,
            None => Kind::Identifier,
        };
        self.emit(kind);
        State::InsideAction
    }

    fn lex_variable(&mut self) -> State {
        if self.at_terminator() {
            self.emit(Kind::Variable);
            return State::InsideAction;
        }
        self.lex_field_or_variable(Kind::Variable)
    }

    /// After the leading `.` or `$`.
    fn lex_field_or_variable(&mut self, kind: Kind) -> State {
        if self.at_terminator() {
            self.emit(if kind == Kind::Variable { Kind::Variable } else { Kind::Dot });
            return State::InsideAction;
        }
        while matches!(self.peek_char(), Some(c) if is_alphanumeric(c)) {
            self.next_char();
        }
        if !self.at_terminator() {
            return self.bad_character();
        }
        self.emit(kind);
        State::InsideAction
    }

    fn bad_character(&mut self) -> State {
        let c = self.peek_char().unwrap_or('\u{fffd}');
        self.error(format!("bad character {}", fmt_rune(c)))
    }

    fn lex_quote(&mut self) -> State {
        self.lex_quoted('"', Kind::Str, "unterminated quoted string")
    }

    fn lex_char(&mut self) -> State {
        self.lex_quoted('\'', Kind::CharConstant, "unterminated character constant")
    }

    fn lex_quoted(&mut self, quote: char, kind: Kind, unterminated: &str) -> State {
        loop {
            match self.next_char() {
                Some('\\') => match self.next_char() {
                    Some(c) if c != '\n' => {}
                    _ => return self.error(unterminated.to_string()),
                },
                None | Some('\n') => return self.error(unterminated.to_string()),
                Some(c) if c == quote => break,
                Some(_) => {}
            }
        }
        self.emit(kind);
        State::InsideAction
    }

    fn lex_raw_quote(&mut self) -> State {
        match self.rest().find('`') {
            Some(end) => {
                self.advance(end + 1);
                self.emit(Kind::RawStr);
                State::InsideAction
            }
            None => self.error("unterminated raw quoted string".to_string()),
        }
    }

    fn lex_number(&mut self) -> State {
        if !self.scan_number() {
            let text = self.input[self.start..self.pos].to_string();
            return self.error(format!("bad number syntax: {text:?}"));
        }
        if matches!(self.peek_char(), Some('+' | '-')) {
            // Complex: 1+2i, no spaces, must end in 'i'.
            if !self.scan_number() || !self.input[..self.pos].ends_with('i') {
                let text = self.input[self.start..self.pos].to_string();
                return self.error(format!("bad number syntax: {text:?}"));
            }
        }
        self.emit(Kind::Number);
        State::InsideAction
    }

    fn scan_number(&mut self) -> bool {
        self.accept("+-");
        let mut base = Base::Decimal;
        if self.accept("0") {
            if self.accept("xX") {
                base = Base::Hex;
            } else if self.accept("oO") {
                base = Base::Octal;
            } else if self.accept("bB") {
                base = Base::Binary;
            }
        }
        self.accept_run(base.digits());
        if self.accept(".") {
            self.accept_run(base.digits());
        }
        if base == Base::Decimal && self.accept("eE") {
            self.accept("+-");
            self.accept_run(Base::Decimal.digits());
        }
        if base == Base::Hex && self.accept("pP") {
            self.accept("+-");
            self.accept_run(Base::Decimal.digits());
        }
        self.accept("i");
        if matches!(self.peek_char(), Some(c) if is_alphanumeric(c)) {
            self.next_char();
            return false;
        }
        true
    }
}
