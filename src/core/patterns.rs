//! Pattern-based chunk extraction
//!
//! Used when no grammar handles the language, or the grammar found nothing.
//! Regex headers locate a definition and brace matching finds its end;
//! markup uses tag balancing and Python uses indentation.

use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::{ChunkKind, Language};

/// Byte range of a candidate chunk
#[derive(Debug, Clone)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
}

struct Header {
    re: Regex,
    kind: ChunkKind,
}

fn header(pattern: &str, kind: ChunkKind) -> Header {
    Header {
        re: Regex::new(pattern).expect("valid regex"),
        kind,
    }
}

static JS_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s*(?P<name>\w*)\s*\([^)]*\)\s*\{",
            ChunkKind::Function,
        ),
        header(
            r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?class\s+(?P<name>\w+)[^{]*\{",
            ChunkKind::Class,
        ),
        header(
            r"(?m)^[ \t]*(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s*)?(?:function\b[^{]*|\([^)]*\)\s*=>\s*|\w+\s*=>\s*)\{",
            ChunkKind::Function,
        ),
    ]
});

static TS_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:export\s+)?interface\s+(?P<name>\w+)[^{]*\{",
            ChunkKind::Interface,
        ),
        header(
            r"(?m)^[ \t]*(?:export\s+)?(?:const\s+)?enum\s+(?P<name>\w+)\s*\{",
            ChunkKind::Enum,
        ),
    ]
});

static TS_TYPE_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:export\s+)?type\s+(?P<name>\w+)[^=\n]*=[^;]+;").expect("valid regex"));

static RUST_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(?P<name>\w+)[^{;]*\{",
            ChunkKind::Function,
        ),
        header(
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?struct\s+(?P<name>\w+)[^{;]*\{",
            ChunkKind::Struct,
        ),
        header(
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?enum\s+(?P<name>\w+)[^{;]*\{",
            ChunkKind::Enum,
        ),
        header(
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+(?P<name>\w+)[^{;]*\{",
            ChunkKind::Trait,
        ),
        header(r"(?m)^[ \t]*(?:unsafe\s+)?impl\b(?P<name>[^{;]*)\{", ChunkKind::Impl),
        header(
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>\w+)\s*\{",
            ChunkKind::Module,
        ),
    ]
});

static JAVA_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:(?:public|private|protected|abstract|final|static|sealed)\s+)*(?:class|record)\s+(?P<name>\w+)[^{]*\{",
            ChunkKind::Class,
        ),
        header(
            r"(?m)^[ \t]*(?:(?:public|private|protected|abstract|static)\s+)*interface\s+(?P<name>\w+)[^{]*\{",
            ChunkKind::Interface,
        ),
        header(
            r"(?m)^[ \t]*(?:(?:public|private|protected|static)\s+)*enum\s+(?P<name>\w+)[^{]*\{",
            ChunkKind::Enum,
        ),
        header(
            r"(?m)^[ \t]*(?:(?:public|private|protected|static|final|synchronized|abstract)\s+)+[\w<>\[\],.? ]+\s+(?P<name>\w+)\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+)?\{",
            ChunkKind::Function,
        ),
    ]
});

static C_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:typedef\s+)?(?:struct|enum|union)\s*(?P<name>\w*)\s*\{",
            ChunkKind::Struct,
        ),
        header(
            r"(?m)^[A-Za-z_][\w \t\*]*?\b(?P<name>\w+)\s*\([^;{)]*\)\s*\{",
            ChunkKind::Function,
        ),
    ]
});

static CPP_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(
            r"(?m)^[ \t]*(?:template\s*<[^>]*>\s*)?(?:class|struct)\s+(?P<name>\w+)[^{;]*\{",
            ChunkKind::Class,
        ),
        header(r"(?m)^[ \t]*namespace\s+(?P<name>\w*)\s*\{", ChunkKind::Module),
        header(
            r"(?m)^[A-Za-z_][\w \t\*&:<>,]*?\b(?P<name>[\w:~]+)\s*\([^;{)]*\)\s*(?:const\s*)?(?:noexcept\s*)?\{",
            ChunkKind::Function,
        ),
    ]
});

static CSS_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![
        header(r"(?m)^[ \t]*@(?:media|supports|keyframes|font-face)(?P<name>[^{]*)\{", ChunkKind::Rule),
        header(r"(?m)^[ \t]*(?P<name>[^{}@\s/][^{};]*)\{", ChunkKind::Rule),
    ]
});

static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*@import[^;]*;").expect("valid regex"));

static GENERIC_HEADERS: Lazy<Vec<Header>> = Lazy::new(|| {
    vec![header(
        r"(?m)^[ \t]*(?:function|def|class|fn|func|sub|proc)\s+(?P<name>\w+)[^{\n]*\{",
        ChunkKind::Block,
    )]
});

static PY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<kw>async\s+def|def|class)\s+(?P<name>\w+)").expect("valid regex")
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<(?P<close>/?)(?P<tag>script|style|template|div|header|footer|main|section|nav|article|aside|form|table)\b[^>]*>",
    )
    .expect("valid regex")
});

/// Candidate spans for `language`, outermost first in source order.
pub(crate) fn extract_spans(content: &str, language: Language) -> Vec<Span> {
    let mut spans = match language {
        Language::Rust => braced_spans(content, &RUST_HEADERS),
        Language::Python => indented_spans(content),
        Language::JavaScript => braced_spans(content, &JS_HEADERS),
        Language::TypeScript => {
            let mut spans = braced_spans(content, &JS_HEADERS);
            spans.extend(braced_spans(content, &TS_HEADERS));
            spans.extend(statement_spans(content, &TS_TYPE_ALIAS, ChunkKind::TypeAlias));
            spans
        }
        Language::Java => braced_spans(content, &JAVA_HEADERS),
        Language::C => braced_spans(content, &C_HEADERS),
        Language::Cpp => {
            let mut spans = braced_spans(content, &CPP_HEADERS);
            spans.extend(braced_spans(content, &C_HEADERS));
            spans
        }
        Language::Css => {
            let mut spans = statement_spans(content, &CSS_IMPORT, ChunkKind::Rule);
            spans.extend(braced_spans(content, &CSS_HEADERS));
            spans
        }
        Language::Html => tag_spans(content),
        Language::Text => Vec::new(),
        Language::Unknown => braced_spans(content, &GENERIC_HEADERS),
    };

    outermost(&mut spans)
}

/// Blank-line separated paragraphs
pub(crate) fn paragraph_spans(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                spans.push(block_span(s, end, ChunkKind::Lines));
            }
        } else {
            start.get_or_insert(offset);
            end = offset + line.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        spans.push(block_span(s, end, ChunkKind::Lines));
    }

    spans
}

fn block_span(start: usize, end: usize, kind: ChunkKind) -> Span {
    Span {
        start,
        end,
        kind,
        name: None,
    }
}

fn braced_spans(content: &str, headers: &[Header]) -> Vec<Span> {
    let mut spans = Vec::new();
    for header in headers {
        for caps in header.re.captures_iter(content) {
            let Some(whole) = caps.get(0) else { continue };
            // headers end on the opening brace
            let open = whole.end() - 1;
            let end = matching_brace(content, open).map(|close| close + 1).unwrap_or(content.len());
            let name = caps
                .name("name")
                .map(|m| m.as_str().trim().to_string())
                .filter(|n| !n.is_empty());

            spans.push(Span {
                start: whole.start(),
                end,
                kind: header.kind,
                name,
            });
        }
    }
    spans
}

fn statement_spans(content: &str, re: &Regex, kind: ChunkKind) -> Vec<Span> {
    re.captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Span {
                start: whole.start(),
                end: whole.end(),
                kind,
                name: caps.name("name").map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

/// Byte index of the brace closing the one at `open`
fn matching_brace(content: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in content.as_bytes().iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Python `def`/`class` blocks, delimited by indentation. Decorators directly
/// above a definition belong to it.
fn indented_spans(content: &str) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        lines.push((offset, line));
        offset += line.len();
    }

    let mut spans = Vec::new();
    for (i, (line_start, line)) in lines.iter().enumerate() {
        let Some(caps) = PY_HEADER.captures(line) else { continue };
        let indent = caps.name("indent").map_or(0, |m| m.as_str().len());

        let mut start = *line_start;
        let mut k = i;
        while k > 0 {
            let (prev_start, prev) = lines[k - 1];
            if prev.trim_start().starts_with('@') && indent_width(prev) == indent {
                start = prev_start;
                k -= 1;
            } else {
                break;
            }
        }

        let mut end = line_start + line.len();
        for (next_start, next) in lines.iter().skip(i + 1) {
            if next.trim().is_empty() {
                continue;
            }
            if indent_width(next) <= indent {
                break;
            }
            end = next_start + next.len();
        }

        let kind = if caps["kw"].starts_with("class") {
            ChunkKind::Class
        } else {
            ChunkKind::Function
        };
        spans.push(Span {
            start,
            end,
            kind,
            name: Some(caps["name"].to_string()),
        });
    }
    spans
}

/// Top-level markup elements, balancing nested tags of the same family.
fn tag_spans(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut stack: Vec<(String, usize)> = Vec::new();

    for caps in HTML_TAG.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        let tag = caps["tag"].to_lowercase();
        let closing = !caps["close"].is_empty();

        if !closing {
            if whole.as_str().ends_with("/>") {
                if stack.is_empty() {
                    spans.push(tag_span(whole.start(), whole.end(), tag));
                }
                continue;
            }
            stack.push((tag, whole.start()));
            continue;
        }

        let Some(pos) = stack.iter().rposition(|(open, _)| *open == tag) else {
            continue;
        };
        let (_, start) = stack[pos].clone();
        stack.truncate(pos);
        if stack.is_empty() {
            spans.push(tag_span(start, whole.end(), tag));
        }
    }
    spans
}

fn tag_span(start: usize, end: usize, tag: String) -> Span {
    Span {
        start,
        end,
        kind: ChunkKind::Tag,
        name: Some(tag),
    }
}

/// Sort by position and drop spans nested inside an earlier one.
fn outermost(spans: &mut [Span]) -> Vec<Span> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut kept: Vec<Span> = Vec::new();
    for span in spans.iter() {
        if kept.last().is_some_and(|last| span.start < last.end) {
            continue;
        }
        kept.push(span.clone());
    }
    kept
}
