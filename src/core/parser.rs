//! Chunk extraction
//!
//! Splits a source file into semantically coherent chunks (functions,
//! classes, tags, rules). Strategies are tried in priority order: binary
//! detection, tree-sitter, regex patterns, paragraph grouping, and finally
//! the raw content as one chunk.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use goblin::Object;
use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use super::patterns::{self, Span};

/// How many leading bytes are sniffed for NUL when detecting binaries
const BINARY_SNIFF_LEN: usize = 8000;

/// Imports listed per library in a binary summary
const IMPORTS_PER_LIBRARY: usize = 10;

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Html,
    Css,
    Java,
    C,
    Cpp,
    Text,
    Unknown,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "html" | "htm" | "xhtml" | "vue" => Language::Html,
            "css" | "scss" | "less" => Language::Css,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "txt" | "md" | "markdown" | "rst" => Language::Text,
            _ => Language::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Html => "HTML",
            Language::Css => "CSS",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Text => "Text",
            Language::Unknown => "Unknown",
        }
    }

    pub fn has_grammar(&self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
        )
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a chunk represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkKind {
    Function,
    Struct,
    Class,
    Enum,
    Trait,
    Interface,
    Module,
    Constant,
    Impl,
    TypeAlias,
    Tag,
    Rule,
    Block,
    Lines,
    Raw,
}

impl ChunkKind {
    pub fn icon(&self) -> &'static str {
        match self {
            ChunkKind::Function => "󰊕",
            ChunkKind::Struct => "󰆧",
            ChunkKind::Class => "󰠱",
            ChunkKind::Enum => "󰕘",
            ChunkKind::Trait | ChunkKind::Interface => "󰜰",
            ChunkKind::Module => "󰏗",
            ChunkKind::Constant => "󰏿",
            ChunkKind::Impl => "󰡱",
            ChunkKind::TypeAlias => "󰊄",
            ChunkKind::Tag => "󰅴",
            ChunkKind::Rule => "󰌜",
            ChunkKind::Block | ChunkKind::Lines | ChunkKind::Raw => "󰈙",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Struct => "struct",
            ChunkKind::Class => "class",
            ChunkKind::Enum => "enum",
            ChunkKind::Trait => "trait",
            ChunkKind::Interface => "interface",
            ChunkKind::Module => "module",
            ChunkKind::Constant => "constant",
            ChunkKind::Impl => "impl",
            ChunkKind::TypeAlias => "type",
            ChunkKind::Tag => "tag",
            ChunkKind::Rule => "rule",
            ChunkKind::Block => "block",
            ChunkKind::Lines => "lines",
            ChunkKind::Raw => "raw",
        }
    }
}

/// Which strategy produced an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionStrategy {
    TreeSitter,
    Pattern,
    Lines,
    Binary,
    Raw,
    Empty,
}

impl ExtractionStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            ExtractionStrategy::TreeSitter => "Tree-sitter",
            ExtractionStrategy::Pattern => "Pattern matching",
            ExtractionStrategy::Lines => "Line groups",
            ExtractionStrategy::Binary => "Binary analysis",
            ExtractionStrategy::Raw => "Raw content",
            ExtractionStrategy::Empty => "Empty",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One extracted unit of a source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
}

/// Chunks of one file plus how they were found
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub language: Language,
    pub strategy: ExtractionStrategy,
    pub chunks: Vec<Chunk>,
}

impl Extraction {
    pub fn empty(language: Language) -> Self {
        Self {
            language,
            strategy: ExtractionStrategy::Empty,
            chunks: Vec::new(),
        }
    }

    /// The whole trimmed content as a single chunk
    pub fn raw(content: &str, language: Language) -> Self {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::empty(language);
        }
        Self {
            language,
            strategy: ExtractionStrategy::Raw,
            chunks: vec![Chunk {
                text: trimmed.to_string(),
                kind: ChunkKind::Raw,
                name: None,
                line_start: 1,
                line_end: trimmed.lines().count().max(1),
            }],
        }
    }

    /// Chunk texts in extraction order
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }
}

/// Errors reading a file for extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}

/// Anything that can turn file content into chunks.
///
/// Implementations must return at least one chunk for non-empty content.
pub trait ChunkExtractor {
    fn extract(&mut self, content: &str, language: Language) -> Extraction;
}

/// Code parser: tree-sitter grammars with pattern fallbacks
pub struct CodeParser {
    parsers: HashMap<Language, Parser>,
    max_file_size: Option<u64>,
}

impl CodeParser {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
            max_file_size: None,
        }
    }

    /// Refuse files larger than `bytes`
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Read and extract a file. Non-UTF-8 bytes are replaced.
    pub fn extract_file(&mut self, path: &Path) -> Result<Extraction, ExtractError> {
        let io_err = |source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(limit) = self.max_file_size {
            let size = fs::metadata(path).map_err(io_err)?.len();
            if size > limit {
                return Err(ExtractError::TooLarge {
                    path: path.to_path_buf(),
                    size,
                    limit,
                });
            }
        }

        let bytes = fs::read(path).map_err(io_err)?;
        let language = Language::from_path(path);

        if looks_binary(&bytes) {
            debug!("{} looks binary", path.display());
            return Ok(binary_extraction(path, &bytes, language));
        }

        let content = String::from_utf8_lossy(&bytes);
        Ok(self.extract(&content, language))
    }

    fn parse_content(&mut self, content: &str, language: Language) -> Option<Tree> {
        let parser = match self.parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let parser = grammar_parser(language)?;
                entry.insert(parser)
            }
        };

        parser.parse(content, None)
    }

    fn tree_sitter_chunks(&mut self, content: &str, language: Language) -> Vec<Chunk> {
        let Some(tree) = self.parse_content(content, language) else {
            debug!("Tree-sitter produced no tree for {}", language);
            return Vec::new();
        };

        let mut spans = Vec::new();
        collect_definitions(tree.root_node(), content, language, &mut spans);
        spans_to_chunks(content, spans)
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkExtractor for CodeParser {
    fn extract(&mut self, content: &str, language: Language) -> Extraction {
        if content.trim().is_empty() {
            return Extraction::empty(language);
        }

        if content.contains('\0') {
            return Extraction {
                language,
                strategy: ExtractionStrategy::Binary,
                chunks: vec![binary_chunk("Binary file - cannot extract meaningful text")],
            };
        }

        let strategies = [
            ExtractionStrategy::TreeSitter,
            ExtractionStrategy::Pattern,
            ExtractionStrategy::Lines,
        ];

        for strategy in strategies {
            let chunks = match strategy {
                ExtractionStrategy::TreeSitter if language.has_grammar() => {
                    self.tree_sitter_chunks(content, language)
                }
                ExtractionStrategy::Pattern => {
                    spans_to_chunks(content, patterns::extract_spans(content, language))
                }
                ExtractionStrategy::Lines if language == Language::Text => {
                    spans_to_chunks(content, patterns::paragraph_spans(content))
                }
                _ => continue,
            };

            if !chunks.is_empty() {
                debug!("{} extracted {} chunks from {}", strategy, chunks.len(), language);
                return Extraction {
                    language,
                    strategy,
                    chunks,
                };
            }
        }

        Extraction::raw(content, language)
    }
}

fn grammar_parser(language: Language) -> Option<Parser> {
    let grammar = match language {
        Language::Rust => tree_sitter_rust::language(),
        Language::Python => tree_sitter_python::language(),
        Language::JavaScript => tree_sitter_javascript::language(),
        Language::TypeScript => tree_sitter_typescript::language_typescript(),
        _ => return None,
    };

    let mut parser = Parser::new();
    match parser.set_language(grammar) {
        Ok(()) => Some(parser),
        Err(e) => {
            warn!("Failed to load {} grammar, using patterns: {}", language, e);
            None
        }
    }
}

/// Collect top-level definitions. Nested definitions stay inside their parent.
fn collect_definitions(node: Node, content: &str, language: Language, spans: &mut Vec<Span>) {
    if let Some(kind) = definition_kind(node, language) {
        spans.push(Span {
            start: node.start_byte(),
            end: node.end_byte(),
            kind,
            name: definition_name(node, content),
        });
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definitions(child, content, language, spans);
    }
}

fn definition_kind(node: Node, language: Language) -> Option<ChunkKind> {
    let kind = node.kind();
    match language {
        Language::Rust => match kind {
            "function_item" => Some(ChunkKind::Function),
            "struct_item" | "union_item" => Some(ChunkKind::Struct),
            "enum_item" => Some(ChunkKind::Enum),
            "impl_item" => Some(ChunkKind::Impl),
            "trait_item" => Some(ChunkKind::Trait),
            "mod_item" => node.child_by_field_name("body").map(|_| ChunkKind::Module),
            "const_item" | "static_item" => Some(ChunkKind::Constant),
            "type_item" => Some(ChunkKind::TypeAlias),
            "macro_definition" => Some(ChunkKind::Block),
            _ => None,
        },
        Language::Python => match kind {
            "function_definition" => Some(ChunkKind::Function),
            "class_definition" => Some(ChunkKind::Class),
            "decorated_definition" => node
                .child_by_field_name("definition")
                .and_then(|inner| definition_kind(inner, language)),
            _ => None,
        },
        Language::JavaScript | Language::TypeScript => match kind {
            "function_declaration" | "generator_function_declaration" => Some(ChunkKind::Function),
            "class_declaration" | "abstract_class_declaration" => Some(ChunkKind::Class),
            "interface_declaration" => Some(ChunkKind::Interface),
            "type_alias_declaration" => Some(ChunkKind::TypeAlias),
            "enum_declaration" => Some(ChunkKind::Enum),
            "lexical_declaration" | "variable_declaration" if declares_function(node) => {
                Some(ChunkKind::Function)
            }
            "export_statement" => node
                .child_by_field_name("declaration")
                .and_then(|inner| definition_kind(inner, language)),
            _ => None,
        },
        _ => None,
    }
}

/// `const f = () => {}` and `var f = function () {}`
fn declares_function(node: Node) -> bool {
    let mut cursor = node.walk();
    let declares = node.children(&mut cursor).any(|declarator| {
        declarator.kind() == "variable_declarator"
            && declarator
                .child_by_field_name("value")
                .is_some_and(|value| matches!(value.kind(), "arrow_function" | "function" | "function_expression"))
    });
    declares
}

fn definition_name(node: Node, content: &str) -> Option<String> {
    let text = |n: Node| content[n.byte_range()].to_string();

    match node.kind() {
        "impl_item" => node.child_by_field_name("type").map(|t| format!("impl {}", text(t))),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .and_then(|inner| definition_name(inner, content)),
        "export_statement" => node
            .child_by_field_name("declaration")
            .and_then(|inner| definition_name(inner, content)),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let first = node
                .children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| d.child_by_field_name("name"))
                .map(text);
            first
        }
        _ => node.child_by_field_name("name").map(text),
    }
}

fn spans_to_chunks(content: &str, spans: Vec<Span>) -> Vec<Chunk> {
    let lines = LineIndex::new(content);
    let mut seen: HashSet<&str> = HashSet::with_capacity(spans.len());
    let mut chunks: Vec<Chunk> = Vec::with_capacity(spans.len());

    for span in spans {
        let text = content[span.start..span.end].trim();
        if text.is_empty() || !seen.insert(text) {
            continue;
        }
        chunks.push(Chunk {
            text: text.to_string(),
            kind: span.kind,
            name: span.name,
            line_start: lines.line_of(span.start),
            line_end: lines.line_of(span.end.saturating_sub(1).max(span.start)),
        });
    }
    chunks
}

/// Byte offsets of every newline, for 1-based line lookups
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let newlines = content
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self { newlines }
    }

    fn line_of(&self, byte: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < byte) + 1
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

fn binary_chunk(text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        kind: ChunkKind::Raw,
        name: None,
        line_start: 1,
        line_end: 1,
    }
}

fn binary_extraction(path: &Path, bytes: &[u8], language: Language) -> Extraction {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let text = match summarize_binary(&name, bytes) {
        Some(summary) => summary,
        None => match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("Binary file ({}) - cannot extract meaningful text", ext.to_uppercase()),
            None => "Binary file - cannot extract meaningful text".to_string(),
        },
    };

    Extraction {
        language,
        strategy: ExtractionStrategy::Binary,
        chunks: vec![binary_chunk(&text)],
    }
}

/// Header summary for PE and ELF executables
fn summarize_binary(name: &str, bytes: &[u8]) -> Option<String> {
    let object = match Object::parse(bytes) {
        Ok(object) => object,
        Err(e) => {
            debug!("{} has no readable executable header: {}", name, e);
            return None;
        }
    };

    let mut lines = Vec::new();
    match object {
        Object::PE(pe) => {
            let coff = &pe.header.coff_header;
            lines.push(format!("PE File: {}", name));
            lines.push(format!("Machine: 0x{:x}", coff.machine));
            lines.push(format!("Number of sections: {}", coff.number_of_sections));
            lines.push("Imports:".to_string());
            for library in &pe.libraries {
                lines.push(format!("  {}", library));
                let imports = pe.imports.iter().filter(|import| import.dll == *library);
                for import in imports.take(IMPORTS_PER_LIBRARY) {
                    lines.push(format!("    {}", import.name));
                }
            }
        }
        Object::Elf(elf) => {
            lines.push(format!("ELF File: {}", name));
            lines.push(format!("Machine: 0x{:x}", elf.header.e_machine));
            lines.push(format!("Number of sections: {}", elf.section_headers.len()));
            lines.push("Libraries:".to_string());
            for library in &elf.libraries {
                lines.push(format!("  {}", library));
            }
        }
        _ => return None,
    }

    Some(lines.join("\n"))
}
