//! Line classification for fragment sources.
//!
//! Every physical line of a fragment is run through a small state machine
//! that tracks whether the scanner is inside a raw string literal (`R"( ... )"`)
//! or a block comment (`/* ... */`). When a terminator or opener is found in
//! the middle of a line, the text after it is classified again as a fresh
//! segment of the same line, so a single physical line can produce several
//! [`Segment`]s.
//!
//! Declarations whose opening brace sits alone on the following line are
//! recognized by joining the two lines. A brace on a third line is never
//! recognized.

use once_cell::sync::Lazy;
use regex::Regex;
use smol_str::SmolStr;
use tracing::warn;

use crate::error::{AmalgamError, Result, UnterminatedContext};
use crate::fragment::{is_fragment_target, Fragment};

const RAW_STRING_OPEN: &str = "R\"(";
const RAW_STRING_CLOSE: &str = ")\"";
const BLOCK_COMMENT_OPEN: &str = "/*";
const BLOCK_COMMENT_CLOSE: &str = "*/";

static LINE_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*//").expect("line comment pattern"));
static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^#include\s*(<[^>]*>|"[^"]*")"#).expect("include pattern")
});
static STRUCT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(struct|class|union)\s+([^\s{]+)\s*\{").expect("struct pattern")
});
static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:\S+\s+)+?)([^\s(]+)\((.*?)\)\s*\{").expect("function pattern")
});
static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^template\s*<(.*?)>").expect("template pattern"));

/// Per-fragment scanner state. Created fresh for every fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub in_string: bool,
    pub in_block_comment: bool,
    /// Parameters of a `template <...>` line waiting for the next function.
    pub pending_template: Option<String>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context left open, if any.
    pub fn unterminated(&self) -> Option<UnterminatedContext> {
        if self.in_string {
            Some(UnterminatedContext::RawString)
        } else if self.in_block_comment {
            Some(UnterminatedContext::BlockComment)
        } else {
            None
        }
    }
}

/// What to do when a fragment ends inside a raw string or block comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Log a warning and keep going.
    #[default]
    Warn,
    /// Abort the amalgamation.
    Deny,
}

impl ScanPolicy {
    /// Check the state left after the last line of `fragment`.
    pub fn check(self, fragment: &Fragment, state: &ScanState) -> Result<()> {
        let Some(context) = state.unterminated() else {
            return Ok(());
        };

        match self {
            ScanPolicy::Warn => {
                warn!(
                    fragment = %fragment.display_path(),
                    %context,
                    "fragment ends inside an unterminated context"
                );
                Ok(())
            }
            ScanPolicy::Deny => Err(AmalgamError::MalformedScanState {
                fragment: fragment.display_path(),
                context,
            }),
        }
    }
}

/// An `#include` directive as written, e.g. `<vector>` or `"util.zpp"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeDirective {
    /// Target including its delimiters.
    pub target: String,
}

impl IncludeDirective {
    /// Target without the surrounding `<>` or quotes.
    pub fn inner(&self) -> &str {
        &self.target[1..self.target.len() - 1]
    }

    pub fn is_fragment_include(&self) -> bool {
        is_fragment_target(self.inner())
    }
}

/// `struct Name {`, `class Name {` or `union Name {`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructOpener {
    pub keyword: SmolStr,
    pub name: SmolStr,
}

/// `<return type> name(<params>) {`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionOpener {
    /// Parameters of the `template <...>` line directly before, if any.
    pub template: Option<String>,
    /// Return type tokens, including the whitespace before the name.
    pub return_type: String,
    pub name: SmolStr,
    pub params: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Code,
    /// Line starting with `//`.
    Comment,
    StringContinuation,
    CommentContinuation,
    Include(IncludeDirective),
    Struct(StructOpener),
    Function(FunctionOpener),
    /// `template <...>`, holding the parameter list.
    Template(String),
}

/// A classified piece of a logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: LineKind,
    /// The text the classification was made on.
    pub text: String,
}

/// Result of classifying one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<'a> {
    pub segment: Segment,
    /// Text left on the same line that must be classified next.
    pub rest: Option<&'a str>,
    /// Whether the lookahead line was joined into this one.
    pub consumed_lookahead: bool,
}

impl<'a> Step<'a> {
    fn done(kind: LineKind, text: &str) -> Self {
        Self {
            segment: Segment {
                kind,
                text: text.to_string(),
            },
            rest: None,
            consumed_lookahead: false,
        }
    }

    fn reenter(kind: LineKind, consumed: &str, rest: &'a str) -> Self {
        Self {
            segment: Segment {
                kind,
                text: consumed.to_string(),
            },
            rest: (!rest.is_empty()).then_some(rest),
            consumed_lookahead: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    RawString,
    BlockComment,
}

impl Opener {
    fn token(self) -> &'static str {
        match self {
            Opener::RawString => RAW_STRING_OPEN,
            Opener::BlockComment => BLOCK_COMMENT_OPEN,
        }
    }
}

/// Classify `text` given the current state and the next physical line.
///
/// Rules apply in priority order: an open raw string, an open block comment,
/// a `//` line comment, a raw string or block comment opener, the two-line
/// brace join, and finally the declaration patterns.
pub fn classify<'a>(state: &mut ScanState, text: &'a str, lookahead: Option<&'a str>) -> Step<'a> {
    let step = classify_inner(state, text, lookahead);
    let Step {
        segment,
        rest,
        consumed_lookahead,
    } = step;
    let kind = track_template(state, segment.kind);
    Step {
        segment: Segment {
            kind,
            text: segment.text,
        },
        rest,
        consumed_lookahead,
    }
}

fn classify_inner<'a>(
    state: &mut ScanState,
    text: &'a str,
    lookahead: Option<&'a str>,
) -> Step<'a> {
    if state.in_string {
        return match split_after(text, RAW_STRING_CLOSE) {
            Some((consumed, rest)) => {
                state.in_string = false;
                Step::reenter(LineKind::StringContinuation, consumed, rest)
            }
            None => Step::done(LineKind::StringContinuation, text),
        };
    }

    if state.in_block_comment {
        return match split_after(text, BLOCK_COMMENT_CLOSE) {
            Some((consumed, rest)) => {
                state.in_block_comment = false;
                Step::reenter(LineKind::CommentContinuation, consumed, rest)
            }
            None => Step::done(LineKind::CommentContinuation, text),
        };
    }

    if LINE_COMMENT_RE.is_match(text) {
        return Step::done(LineKind::Comment, text);
    }

    let code_end = trailing_comment_start(text).unwrap_or(text.len());
    if let Some((at, opener)) = find_opener(&text[..code_end]) {
        match opener {
            Opener::RawString => state.in_string = true,
            Opener::BlockComment => state.in_block_comment = true,
        }
        let (consumed, rest) = text.split_at(at + opener.token().len());
        return Step::reenter(LineKind::Code, consumed, rest);
    }

    // Code followed by a `//` comment; the comment is its own segment.
    if code_end < text.len() {
        let (code, comment) = text.split_at(code_end);
        return Step::reenter(classify_clean(code), code, comment);
    }

    if !text.contains('{') {
        if let Some(next) = lookahead {
            let next_trimmed = next.trim_start();
            if next_trimmed.starts_with('{') {
                let joined = format!("{}{}", text.trim(), next.trim());
                if let Some(kind) = match_opener(&joined) {
                    let rest = &next_trimmed[1..];
                    return Step {
                        segment: Segment { kind, text: joined },
                        rest: (!rest.is_empty()).then_some(rest),
                        consumed_lookahead: true,
                    };
                }
            }
        }
    }

    Step::done(classify_clean(text), text)
}

/// Patterns for text known to be outside strings and comments.
fn classify_clean(text: &str) -> LineKind {
    if let Some(caps) = INCLUDE_RE.captures(text) {
        return LineKind::Include(IncludeDirective {
            target: caps[1].to_string(),
        });
    }
    if let Some(kind) = match_opener(text) {
        return kind;
    }
    if let Some(caps) = TEMPLATE_RE.captures(text) {
        return LineKind::Template(caps[1].to_string());
    }
    LineKind::Code
}

fn match_opener(text: &str) -> Option<LineKind> {
    if let Some(caps) = STRUCT_RE.captures(text) {
        return Some(LineKind::Struct(StructOpener {
            keyword: SmolStr::new(&caps[1]),
            name: SmolStr::new(&caps[2]),
        }));
    }
    FUNCTION_RE.captures(text).map(|caps| {
        LineKind::Function(FunctionOpener {
            template: None,
            return_type: caps[1].to_string(),
            name: SmolStr::new(&caps[2]),
            params: caps[3].to_string(),
        })
    })
}

fn track_template(state: &mut ScanState, kind: LineKind) -> LineKind {
    match kind {
        LineKind::Template(params) => {
            state.pending_template = Some(params.clone());
            LineKind::Template(params)
        }
        LineKind::Function(mut opener) => {
            opener.template = state.pending_template.take();
            LineKind::Function(opener)
        }
        kept @ (LineKind::Comment
        | LineKind::StringContinuation
        | LineKind::CommentContinuation) => kept,
        other => {
            state.pending_template = None;
            other
        }
    }
}

fn find_opener(text: &str) -> Option<(usize, Opener)> {
    let string = text.find(RAW_STRING_OPEN).map(|at| (at, Opener::RawString));
    let comment = text
        .find(BLOCK_COMMENT_OPEN)
        .map(|at| (at, Opener::BlockComment));
    match (string, comment) {
        (Some(s), Some(c)) => Some(if s.0 < c.0 { s } else { c }),
        (s, c) => s.or(c),
    }
}

/// Byte offset of the first `//` outside a quoted literal.
///
/// A `"` or `'` that is never closed runs to the end of the line.
fn trailing_comment_start(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'/' && bytes.get(i + 1) == Some(&b'/') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn split_after<'a>(text: &'a str, pattern: &str) -> Option<(&'a str, &'a str)> {
    text.find(pattern)
        .map(|at| text.split_at(at + pattern.len()))
}

/// One physical line, or two after a brace join, with its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Zero-based index of the first physical line.
    pub line: usize,
    /// Whether the following physical line was joined in.
    pub joined: bool,
    pub segments: Vec<Segment>,
}

impl LogicalLine {
    /// The include directive this line starts with, if any.
    pub fn leading_include(&self) -> Option<&IncludeDirective> {
        match self.segments.first().map(|s| &s.kind) {
            Some(LineKind::Include(include)) => Some(include),
            _ => None,
        }
    }
}

/// Iterator over the logical lines of one fragment.
pub struct Scanner<'a> {
    lines: &'a [String],
    next: usize,
    state: ScanState,
}

impl<'a> Scanner<'a> {
    pub fn new(fragment: &'a Fragment) -> Self {
        Self::from_lines(fragment.lines())
    }

    pub fn from_lines(lines: &'a [String]) -> Self {
        Self {
            lines,
            next: 0,
            state: ScanState::new(),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Consume the scanner, returning the state after the last line read.
    pub fn finish(self) -> ScanState {
        self.state
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<LogicalLine> {
        let lines = self.lines;
        let line = self.next;
        let mut cursor: &str = lines.get(line)?;
        self.next += 1;

        let mut joined = false;
        let mut segments = Vec::new();
        loop {
            let lookahead = if joined {
                None
            } else {
                lines.get(self.next).map(String::as_str)
            };
            let step = classify(&mut self.state, cursor, lookahead);
            segments.push(step.segment);
            if step.consumed_lookahead {
                joined = true;
                self.next += 1;
            }
            match step.rest {
                Some(rest) => cursor = rest,
                None => break,
            }
        }

        Some(LogicalLine {
            line,
            joined,
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> (Vec<LogicalLine>, ScanState) {
        let fragment = Fragment::from_source("test.zpp", source);
        let mut scanner = Scanner::new(&fragment);
        let lines = scanner.by_ref().collect();
        (lines, scanner.finish())
    }

    fn kinds(lines: &[LogicalLine]) -> Vec<LineKind> {
        lines
            .iter()
            .flat_map(|l| l.segments.iter().map(|s| s.kind.clone()))
            .collect()
    }

    fn function_names(lines: &[LogicalLine]) -> Vec<String> {
        kinds(lines)
            .into_iter()
            .filter_map(|k| match k {
                LineKind::Function(f) => Some(f.name.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_plain_code_and_comment() {
        let (lines, state) = scan("int x = 1;\n   // int f() {\n");
        assert_eq!(kinds(&lines), vec![LineKind::Code, LineKind::Comment]);
        assert_eq!(state, ScanState::new());
    }

    #[test]
    fn test_include_directive() {
        let (lines, _) = scan("#include <vector>\n#include \"util.zpp\"\n");
        let include = lines[0].leading_include().unwrap();
        assert_eq!(include.target, "<vector>");
        assert!(!include.is_fragment_include());
        let include = lines[1].leading_include().unwrap();
        assert_eq!(include.inner(), "util.zpp");
        assert!(include.is_fragment_include());
    }

    #[test]
    fn test_struct_and_function_openers() {
        let (lines, _) = scan("struct Point {\nint add(int a, int b) {\n");
        match &lines[0].segments[0].kind {
            LineKind::Struct(s) => {
                assert_eq!(s.keyword, "struct");
                assert_eq!(s.name, "Point");
            }
            other => panic!("expected struct, got {:?}", other),
        }
        match &lines[1].segments[0].kind {
            LineKind::Function(f) => {
                assert_eq!(f.return_type, "int ");
                assert_eq!(f.name, "add");
                assert_eq!(f.params, "int a, int b");
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_indented_lines_are_not_openers() {
        let (lines, _) = scan("    if (x) {\n    int local(int y) {\n");
        assert_eq!(kinds(&lines), vec![LineKind::Code, LineKind::Code]);
    }

    #[test]
    fn test_raw_string_spanning_lines() {
        let source = "auto s = R\"(\nint hidden() {\n)\";\nint visible() {\n";
        let (lines, state) = scan(source);
        assert_eq!(function_names(&lines), vec!["visible"]);
        assert_eq!(
            lines[1].segments[0].kind,
            LineKind::StringContinuation
        );
        assert!(!state.in_string);
    }

    #[test]
    fn test_raw_string_closed_on_same_line() {
        let (lines, state) = scan("auto s = R\"(text)\"; int x;\n");
        let k = kinds(&lines);
        assert_eq!(
            k,
            vec![LineKind::Code, LineKind::StringContinuation, LineKind::Code]
        );
        assert_eq!(lines[0].segments[2].text, "; int x;");
        assert!(!state.in_string);
    }

    #[test]
    fn test_block_comment_reentry() {
        let source = "/* start\nint hidden() {\nend */int shown() {\n";
        let (lines, state) = scan(source);
        assert_eq!(function_names(&lines), vec!["shown"]);
        assert_eq!(lines[2].segments[0].kind, LineKind::CommentContinuation);
        assert_eq!(lines[2].segments[0].text, "end */");
        assert!(!state.in_block_comment);
    }

    #[test]
    fn test_string_opener_wins_when_first() {
        let (_, state) = scan("auto s = R\"( /* not a comment\n");
        assert!(state.in_string);
        assert!(!state.in_block_comment);
    }

    #[test]
    fn test_comment_opener_wins_when_first() {
        let (_, state) = scan("int x; /* R\"( inside a comment\n");
        assert!(state.in_block_comment);
        assert!(!state.in_string);
    }

    #[test]
    fn test_reentry_matches_fresh_line() {
        let mut state = ScanState {
            in_string: true,
            ..ScanState::default()
        };
        let first = classify(&mut state, "tail)\"int f() { /* open", None);
        assert_eq!(first.segment.kind, LineKind::StringContinuation);
        let rest = first.rest.unwrap();
        assert_eq!(rest, "int f() { /* open");

        let mut resumed = state.clone();
        let continued = classify(&mut resumed, rest, None);

        let mut fresh_state = ScanState::new();
        let fresh = classify(&mut fresh_state, rest, None);

        assert_eq!(continued, fresh);
        assert_eq!(resumed, fresh_state);
        assert!(resumed.in_block_comment);
    }

    #[test]
    fn test_two_line_brace_join() {
        let source = "int add(int a, int b)\n{\n    return a + b;\n}\n";
        let (lines, _) = scan(source);
        assert!(lines[0].joined);
        assert_eq!(lines[0].segments[0].text, "int add(int a, int b){");
        assert_eq!(function_names(&lines), vec!["add"]);
        // The brace line is not reprocessed on its own.
        assert_eq!(lines[1].line, 2);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_join_keeps_tracking_state_after_brace() {
        let source = "struct Foo\n{ /* fields\nint x; */\n};\n";
        let (lines, state) = scan(source);
        assert!(lines[0].joined);
        assert!(matches!(lines[0].segments[0].kind, LineKind::Struct(_)));
        assert_eq!(lines[0].segments[1].kind, LineKind::Code);
        assert_eq!(lines[1].segments[0].kind, LineKind::CommentContinuation);
        assert!(!state.in_block_comment);
    }

    #[test]
    fn test_brace_on_third_line_is_not_recognized() {
        let source = "int add(int a, int b)\n\n{\n}\n";
        let (lines, _) = scan(source);
        assert!(function_names(&lines).is_empty());
        assert!(!lines[0].joined);
    }

    #[test]
    fn test_join_requires_an_opener() {
        let source = "int values[] =\n{ 1, 2, 3 };\n";
        let (lines, _) = scan(source);
        assert!(!lines[0].joined);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_template_prefix_is_one_shot() {
        let source = "template <typename T>\nT twice(T x) {\nreturn x + x;\n}\nint plain(int y) {\n";
        let (lines, _) = scan(source);
        let functions: Vec<_> = kinds(&lines)
            .into_iter()
            .filter_map(|k| match k {
                LineKind::Function(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(functions[0].template.as_deref(), Some("typename T"));
        assert_eq!(functions[1].template, None);
    }

    #[test]
    fn test_template_survives_comment_lines() {
        let (lines, _) = scan("template <class T>\n// identity\nT id(T x) {\n");
        match &lines[2].segments[0].kind {
            LineKind::Function(f) => assert_eq!(f.template.as_deref(), Some("class T")),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_template_cleared_by_code() {
        let (lines, _) = scan("template <class T>\nusing Alias = T;\nT id(T x) {\n");
        match &lines[2].segments[0].kind {
            LineKind::Function(f) => assert_eq!(f.template, None),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_context_policy() {
        let fragment = Fragment::from_source("bad.zpp", "/* never closed\nint x;\n");
        let mut scanner = Scanner::new(&fragment);
        scanner.by_ref().for_each(drop);
        let state = scanner.finish();
        assert_eq!(state.unterminated(), Some(UnterminatedContext::BlockComment));

        assert!(ScanPolicy::Warn.check(&fragment, &state).is_ok());
        let err = ScanPolicy::Deny.check(&fragment, &state).unwrap_err();
        assert!(matches!(
            err,
            AmalgamError::MalformedScanState {
                context: UnterminatedContext::BlockComment,
                ..
            }
        ));
    }

    #[test]
    fn test_opener_inside_trailing_comment_is_ignored() {
        let source = "int limit = 3; // matches src/*.zpp\nint helper() {\n";
        let (lines, state) = scan(source);
        assert_eq!(
            kinds(&lines[..1]),
            vec![LineKind::Code, LineKind::Comment]
        );
        assert_eq!(lines[0].segments[0].text, "int limit = 3; ");
        assert_eq!(function_names(&lines), vec!["helper"]);
        assert_eq!(state, ScanState::new());

        let (lines, state) = scan("int x; // see R\"(docs)\nint after() {\n");
        assert_eq!(function_names(&lines), vec!["after"]);
        assert!(!state.in_string);
    }

    #[test]
    fn test_comment_marker_inside_literal_is_code() {
        let (lines, state) = scan("const char* url = \"http://x\"; /* note\n*/\n");
        assert_eq!(lines[0].segments.len(), 2);
        assert_eq!(lines[0].segments[0].kind, LineKind::Code);
        assert!(!state.in_block_comment);
        assert_eq!(lines[1].segments[0].kind, LineKind::CommentContinuation);
    }

    #[test]
    fn test_opener_before_trailing_comment_still_opens() {
        let (_, state) = scan("int x; /* see http://example.com\n");
        assert!(state.in_block_comment);
    }

    #[test]
    fn test_function_opener_with_trailing_comment() {
        let (lines, _) = scan("int area(int w, int h) { // pixels\n");
        assert_eq!(function_names(&lines), vec!["area"]);
        assert_eq!(lines[0].segments[1].kind, LineKind::Comment);
    }

    #[test]
    fn test_state_is_per_scanner() {
        let open = Fragment::from_source("a.zpp", "auto s = R\"(\n");
        let next = Fragment::from_source("b.zpp", "int f() {\n");

        let mut scanner = Scanner::new(&open);
        scanner.by_ref().for_each(drop);
        assert!(scanner.state().in_string);

        let lines: Vec<_> = Scanner::new(&next).collect();
        assert_eq!(function_names(&lines), vec!["f"]);
    }
}
