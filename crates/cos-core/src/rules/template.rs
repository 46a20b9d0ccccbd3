//! Syntax checker for alert label and annotation templates.
//!
//! Accepts the Go `text/template` language: actions, trim markers,
//! comments, pipelines, variables, control structures and nested
//! definitions. Nothing is executed. A template passes when it would parse
//! with the alerting function set installed.

mod lex;

use lex::{Item, Keyword, Kind, lex};

/// Declarations prepended to every alert template so that `$labels`,
/// `$externalLabels` and `$value` resolve.
const ALERT_DEFS: &str =
    "{{$labels := .Labels}}{{$externalLabels := .ExternalLabels}}{{$value := .Value}}";

const BUILTIN_FUNCS: &[&str] = &[
    "and", "call", "eq", "ge", "gt", "html", "index", "js", "le", "len", "lt", "ne", "not", "or",
    "print", "printf", "println", "slice", "urlquery",
];

const ALERT_FUNCS: &[&str] = &[
    "args",
    "externalURL",
    "first",
    "graphLink",
    "humanize",
    "humanize1024",
    "humanizeDuration",
    "humanizePercentage",
    "humanizeTimestamp",
    "label",
    "match",
    "now",
    "parseDuration",
    "pathPrefix",
    "query",
    "reReplaceAll",
    "safeHtml",
    "sortByLabel",
    "strvalue",
    "stripDomain",
    "stripPort",
    "tableLink",
    "title",
    "toDuration",
    "toLower",
    "toTime",
    "toUpper",
    "value",
];

fn is_known_function(name: &str) -> bool {
    BUILTIN_FUNCS.contains(&name) || ALERT_FUNCS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template: {name}:{line}: {message}")]
pub struct TemplateError {
    pub name: String,
    pub line: usize,
    pub message: String,
}

/// Check one label or annotation value of alert `alert`.
pub fn check_alert_template(alert: &str, text: &str) -> Result<(), TemplateError> {
    let full = format!("{ALERT_DEFS}{text}");
    parse_check(&format!("__alert_{alert}"), &full)
}

/// Parse `text` as a template named `name`, discarding the result.
pub fn parse_check(name: &str, text: &str) -> Result<(), TemplateError> {
    let items = lex(text);
    Parser {
        name,
        items,
        pos: 0,
        seen: 0,
        vars: vec!["$".to_string()],
        range_depth: 0,
        action_line: 0,
    }
    .parse()
}

/// What `text_or_action` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Node,
    End,
    Else,
}

impl Flow {
    fn describe(self) -> &'static str {
        match self {
            Flow::Node => "node",
            Flow::End => "{{end}}",
            Flow::Else => "{{else}}",
        }
    }
}

/// Leading argument kind of a pipeline command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Bool,
    Chain,
    Dot,
    Field,
    Identifier,
    Nil,
    Number,
    Pipe,
    Str,
    Variable,
}

impl Operand {
    /// Literals cannot start a later pipeline stage.
    fn is_executable(self) -> bool {
        !matches!(
            self,
            Operand::Bool | Operand::Dot | Operand::Nil | Operand::Number | Operand::Str
        )
    }
}

type PResult<T> = Result<T, TemplateError>;

struct Parser<'a> {
    name: &'a str,
    items: Vec<Item>,
    pos: usize,
    /// Furthest item examined; its line is the one errors report.
    seen: usize,
    vars: Vec<String>,
    range_depth: usize,
    action_line: usize,
}

impl Parser<'_> {
    // -- token stream ------------------------------------------------------

    fn item(&self, idx: usize) -> Item {
        // `lex` always ends the stream with Eof or Error; reading past the
        // end repeats that item.
        let last = self.items.len().saturating_sub(1);
        self.items.get(idx.min(last)).cloned().unwrap_or(Item {
            kind: Kind::Eof,
            val: String::new(),
            line: 1,
        })
    }

    fn next(&mut self) -> Item {
        let item = self.item(self.pos);
        self.seen = self.seen.max(self.pos);
        self.pos += 1;
        item
    }

    fn backup(&mut self) {
        self.pos -= 1;
    }

    fn peek(&mut self) -> Item {
        let item = self.next();
        self.backup();
        item
    }

    fn next_non_space(&mut self) -> Item {
        loop {
            let item = self.next();
            if item.kind != Kind::Space {
                return item;
            }
        }
    }

    fn peek_non_space(&mut self) -> Item {
        let item = self.next_non_space();
        self.backup();
        item
    }

    fn expect(&mut self, kind: Kind, context: &str) -> PResult<Item> {
        let item = self.next_non_space();
        if item.kind != kind {
            return Err(self.unexpected(&item, context));
        }
        Ok(item)
    }

    // -- errors ------------------------------------------------------------

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError {
            name: self.name.to_string(),
            line: self.item(self.seen).line,
            message: message.into(),
        }
    }

    fn unexpected(&self, item: &Item, context: &str) -> TemplateError {
        if item.kind == Kind::Error {
            let mut extra = String::new();
            if self.action_line != 0 && self.action_line != item.line {
                extra = format!(" in action started at {}:{}", self.name, self.action_line);
                if item.val.ends_with(" action") {
                    extra = extra[" in action".len()..].to_string();
                }
            }
            return self.error(format!("{}{extra}", item.val));
        }
        self.error(format!("unexpected {} in {context}", item.describe()))
    }

    // -- structure ---------------------------------------------------------

    fn parse(mut self) -> PResult<()> {
        loop {
            let item = self.peek();
            match item.kind {
                Kind::Eof => return Ok(()),
                Kind::LeftDelim => {
                    let mark = self.pos;
                    self.next();
                    if self.next_non_space().kind == Kind::Keyword(Keyword::Define) {
                        self.parse_definition()?;
                        continue;
                    }
                    self.pos = mark;
                }
                _ => {}
            }
            match self.text_or_action()? {
                Flow::Node => {}
                flow => return Err(self.error(format!("unexpected {}", flow.describe()))),
            }
        }
    }

    /// `{{define "name"}} ... {{end}}`, after the `define` keyword.
    fn parse_definition(&mut self) -> PResult<()> {
        const CONTEXT: &str = "define clause";
        let name = self.next_non_space();
        if !matches!(name.kind, Kind::Str | Kind::RawStr) {
            return Err(self.unexpected(&name, CONTEXT));
        }
        self.check_string(&name)?;
        self.expect(Kind::RightDelim, CONTEXT)?;
        self.nested_body(CONTEXT)
    }

    /// Body of a define or block: fresh variable scope, must end in `{{end}}`.
    fn nested_body(&mut self, context: &str) -> PResult<()> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let depth = std::mem::replace(&mut self.range_depth, 0);
        let end = self.item_list();
        self.vars = vars;
        self.range_depth = depth;
        match end? {
            Flow::End => Ok(()),
            flow => Err(self.error(format!("unexpected {} in {context}", flow.describe()))),
        }
    }

    /// Nodes up to the next `{{end}}` or `{{else}}`.
    fn item_list(&mut self) -> PResult<Flow> {
        while self.peek_non_space().kind != Kind::Eof {
            match self.text_or_action()? {
                Flow::Node => {}
                flow => return Ok(flow),
            }
        }
        Err(self.error("unexpected EOF"))
    }

    fn text_or_action(&mut self) -> PResult<Flow> {
        let item = self.next_non_space();
        match item.kind {
            Kind::Text => Ok(Flow::Node),
            Kind::LeftDelim => {
                self.action_line = item.line;
                let flow = self.action();
                self.action_line = 0;
                flow
            }
            _ => Err(self.unexpected(&item, "input")),
        }
    }

    /// Everything after `{{`.
    fn action(&mut self) -> PResult<Flow> {
        let item = self.next_non_space();
        match item.kind {
            Kind::Keyword(Keyword::Block) => self.block_control(),
            Kind::Keyword(Keyword::Break) => self.loop_control("{{break}}"),
            Kind::Keyword(Keyword::Continue) => self.loop_control("{{continue}}"),
            Kind::Keyword(Keyword::Else) => self.else_control(),
            Kind::Keyword(Keyword::End) => {
                self.expect(Kind::RightDelim, "end")?;
                Ok(Flow::End)
            }
            Kind::Keyword(Keyword::If) => self.control("if"),
            Kind::Keyword(Keyword::Range) => self.control("range"),
            Kind::Keyword(Keyword::Template) => self.template_control(),
            Kind::Keyword(Keyword::With) => self.control("with"),
            _ => {
                self.backup();
                self.pipeline("command", Kind::RightDelim)?;
                Ok(Flow::Node)
            }
        }
    }

    fn loop_control(&mut self, keyword: &str) -> PResult<Flow> {
        let item = self.next_non_space();
        if item.kind != Kind::RightDelim {
            return Err(self.unexpected(&item, keyword));
        }
        if self.range_depth == 0 {
            return Err(self.error(format!("{keyword} outside {{{{range}}}}")));
        }
        Ok(Flow::Node)
    }

    /// `{{else}}`, or the `else` of `{{else if ...}}` / `{{else with ...}}`
    /// whose keyword is left for the enclosing control to consume.
    fn else_control(&mut self) -> PResult<Flow> {
        let peek = self.peek_non_space();
        if matches!(peek.kind, Kind::Keyword(Keyword::If | Keyword::With)) {
            return Ok(Flow::Else);
        }
        self.expect(Kind::RightDelim, "else")?;
        Ok(Flow::Else)
    }

    /// `if`, `range` or `with`, after the keyword.
    fn control(&mut self, context: &'static str) -> PResult<Flow> {
        let mark = self.vars.len();
        let result = self.control_body(context);
        self.vars.truncate(mark);
        result.map(|_| Flow::Node)
    }

    fn control_body(&mut self, context: &'static str) -> PResult<()> {
        self.pipeline(context, Kind::RightDelim)?;
        let in_range = context == "range";
        if in_range {
            self.range_depth += 1;
        }
        let next = self.item_list();
        if in_range {
            self.range_depth -= 1;
        }
        if next? != Flow::Else {
            return Ok(());
        }

        let chained = match self.peek().kind {
            Kind::Keyword(Keyword::If) if context == "if" => Some("if"),
            Kind::Keyword(Keyword::With) if context == "with" => Some("with"),
            _ => None,
        };
        if let Some(chained) = chained {
            // `{{else if}}` nests a control that owns the single `{{end}}`.
            self.next();
            self.control(chained)?;
            return Ok(());
        }
        match self.item_list()? {
            Flow::End => Ok(()),
            flow => Err(self.error(format!("expected end; found {}", flow.describe()))),
        }
    }

    /// `{{template "name" [pipeline]}}`
    fn template_control(&mut self) -> PResult<Flow> {
        const CONTEXT: &str = "template clause";
        let name = self.next_non_space();
        if !matches!(name.kind, Kind::Str | Kind::RawStr) {
            return Err(self.unexpected(&name, CONTEXT));
        }
        self.check_string(&name)?;
        if self.next_non_space().kind != Kind::RightDelim {
            self.backup();
            self.pipeline(CONTEXT, Kind::RightDelim)?;
        }
        Ok(Flow::Node)
    }

    /// `{{block "name" pipeline}} ... {{end}}`
    fn block_control(&mut self) -> PResult<Flow> {
        const CONTEXT: &str = "block clause";
        let name = self.next_non_space();
        if !matches!(name.kind, Kind::Str | Kind::RawStr) {
            return Err(self.unexpected(&name, CONTEXT));
        }
        self.check_string(&name)?;
        self.pipeline(CONTEXT, Kind::RightDelim)?;
        self.nested_body(CONTEXT)?;
        Ok(Flow::Node)
    }

    // -- pipelines ---------------------------------------------------------

    fn pipeline(&mut self, context: &str, end: Kind) -> PResult<()> {
        self.declarations(context)?;

        let mut commands = Vec::new();
        loop {
            let item = self.next_non_space();
            match item.kind {
                k if k == end => return self.check_pipeline(&commands, context),
                Kind::Bool
                | Kind::CharConstant
                | Kind::Dot
                | Kind::Field
                | Kind::Identifier
                | Kind::Number
                | Kind::Nil
                | Kind::RawStr
                | Kind::Str
                | Kind::Variable
                | Kind::LeftParen => {
                    self.backup();
                    commands.push(self.command()?);
                }
                _ => return Err(self.unexpected(&item, context)),
            }
        }
    }

    /// `$x :=`, `$x =`, or `$i, $e :=` in a range.
    fn declarations(&mut self, context: &str) -> PResult<()> {
        let mut declared = 0;
        loop {
            if self.peek_non_space().kind != Kind::Variable {
                return Ok(());
            }
            let mark = self.pos;
            let var = self.next();
            let next = self.peek_non_space();
            match next.kind {
                Kind::Assign | Kind::Declare => {
                    self.next_non_space();
                    self.vars.push(var.val);
                    return Ok(());
                }
                Kind::Char if next.val == "," => {
                    self.next_non_space();
                    self.vars.push(var.val);
                    declared += 1;
                    if context == "range" && declared < 2 {
                        match self.peek_non_space().kind {
                            Kind::Variable | Kind::RightDelim | Kind::RightParen => continue,
                            _ => return Err(self.error("range can only initialize variables")),
                        }
                    }
                    return Err(self.error(format!("too many declarations in {context}")));
                }
                _ => {
                    self.pos = mark;
                    return Ok(());
                }
            }
        }
    }

    fn check_pipeline(&self, commands: &[Operand], context: &str) -> PResult<()> {
        if commands.is_empty() {
            return Err(self.error(format!("missing value for {context}")));
        }
        for (i, first) in commands.iter().enumerate().skip(1) {
            if !first.is_executable() {
                return Err(self.error(format!(
                    "non executable command in pipeline stage {}",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// One command: operands up to `|` or the pipeline end. Returns the kind
    /// of its first operand.
    fn command(&mut self) -> PResult<Operand> {
        let mut first = None;
        loop {
            self.peek_non_space();
            if let Some(operand) = self.operand()? {
                first.get_or_insert(operand);
            }
            let item = self.next();
            match item.kind {
                Kind::Space => continue,
                Kind::RightDelim | Kind::RightParen => self.backup(),
                Kind::Pipe => {}
                _ => return Err(self.unexpected(&item, "operand")),
            }
            break;
        }
        first.ok_or_else(|| self.error("empty command"))
    }

    /// A term with an optional `.Field.Chain` suffix.
    fn operand(&mut self) -> PResult<Option<Operand>> {
        let start = self.pos;
        let Some(term) = self.term()? else {
            return Ok(None);
        };
        if self.peek().kind != Kind::Field {
            return Ok(Some(term));
        }
        match term {
            Operand::Bool | Operand::Str | Operand::Number | Operand::Nil | Operand::Dot => {
                let text = self.item(self.first_non_space(start)).val;
                return Err(self.error(format!("unexpected . after term {text:?}")));
            }
            _ => {}
        }
        while self.peek().kind == Kind::Field {
            self.next();
        }
        Ok(Some(match term {
            Operand::Field | Operand::Variable => term,
            _ => Operand::Chain,
        }))
    }

    fn first_non_space(&self, mut idx: usize) -> usize {
        while self.item(idx).kind == Kind::Space {
            idx += 1;
        }
        idx
    }

    fn term(&mut self) -> PResult<Option<Operand>> {
        let item = self.next_non_space();
        let operand = match item.kind {
            Kind::Identifier => {
                if !is_known_function(&item.val) {
                    return Err(self.error(format!("function {:?} not defined", item.val)));
                }
                Operand::Identifier
            }
            Kind::Dot => Operand::Dot,
            Kind::Nil => Operand::Nil,
            Kind::Variable => {
                if !self.vars.iter().any(|v| *v == item.val) {
                    return Err(self.error(format!("undefined variable {:?}", item.val)));
                }
                Operand::Variable
            }
            Kind::Field => Operand::Field,
            Kind::Bool => Operand::Bool,
            Kind::CharConstant => {
                self.check_char_constant(&item)?;
                Operand::Number
            }
            Kind::Number => {
                if !is_valid_number(&item.val) {
                    return Err(self.error(format!("illegal number syntax: {:?}", item.val)));
                }
                Operand::Number
            }
            Kind::LeftParen => {
                self.pipeline("parenthesized pipeline", Kind::RightParen)?;
                Operand::Pipe
            }
            Kind::Str | Kind::RawStr => {
                self.check_string(&item)?;
                Operand::Str
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(operand))
    }

    // -- literals ----------------------------------------------------------

    fn check_string(&self, item: &Item) -> PResult<()> {
        if item.kind == Kind::RawStr {
            return Ok(());
        }
        let body = &item.val[1..item.val.len() - 1];
        let mut rest = body;
        while !rest.is_empty() {
            match unquote_char(rest, '"') {
                Some(n) => rest = &rest[n..],
                None => return Err(self.error("invalid syntax")),
            }
        }
        Ok(())
    }

    fn check_char_constant(&self, item: &Item) -> PResult<()> {
        let body = &item.val[1..];
        let Some(n) = unquote_char(body, '\'') else {
            return Err(self.error("invalid syntax"));
        };
        if &body[n..] != "'" {
            return Err(self.error(format!("malformed character constant: {}", item.val)));
        }
        Ok(())
    }
}

/// Bytes taken by the first (possibly escaped) character of `s` inside a
/// literal delimited by `quote`, or `None` when it is malformed.
fn unquote_char(s: &str, quote: char) -> Option<usize> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if c == quote {
        return None;
    }
    if c != '\\' {
        return Some(c.len_utf8());
    }
    let esc = chars.next()?;
    let hex = |n: usize| -> Option<usize> {
        let digits = s.get(2..2 + n)?;
        digits
            .chars()
            .all(|d| d.is_ascii_hexdigit())
            .then_some(2 + n)
    };
    match esc {
        'a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' | '\\' => Some(2),
        c if c == quote => Some(2),
        'x' => hex(2),
        'u' => {
            let n = hex(4)?;
            u32::from_str_radix(&s[2..n], 16).ok().and_then(char::from_u32)?;
            Some(n)
        }
        'U' => {
            let n = hex(8)?;
            u32::from_str_radix(&s[2..n], 16).ok().and_then(char::from_u32)?;
            Some(n)
        }
        '0'..='7' => {
            let digits = s.get(1..4)?;
            if !digits.chars().all(|d| ('0'..='7').contains(&d)) {
                return None;
            }
            let v = u32::from_str_radix(digits, 8).ok()?;
            (v <= 255).then_some(4)
        }
        _ => None,
    }
}

fn is_valid_number(text: &str) -> bool {
    let body = text.replace('_', "");
    match body.strip_suffix('i') {
        // `2i` or `1+2i`
        Some(complex) => match split_complex(complex) {
            Some((re, im)) => is_real(re) && is_real(im),
            None => is_real(complex),
        },
        None => is_real(&body),
    }
}

/// Split `1+2` at the sign that is not part of an exponent.
fn split_complex(s: &str) -> Option<(&str, &str)> {
    let b = s.as_bytes();
    (1..b.len())
        .rev()
        .find(|&i| matches!(b[i], b'+' | b'-') && !matches!(b[i - 1], b'e' | b'E' | b'p' | b'P'))
        .map(|i| (&s[..i], &s[i..]))
}

fn is_real(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let lower = unsigned.to_ascii_lowercase();
    for prefix in ["0x", "0o", "0b"] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return digits.chars().any(|c| c.is_ascii_hexdigit());
        }
    }
    unsigned.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests;
