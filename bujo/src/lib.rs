//! Bullet-journal outline library.
//!
//! The core is pure: every entry point takes text and returns plain values, so an
//! editor can re-run it on each keystroke and swap the result in. File access lives
//! behind `storage::JournalParser` and in the binary.

pub mod core {
    use serde::{Deserialize, Serialize};
    use std::ops::Range;

    /* ------------------------------ Symbols ------------------------------ */

    /// Entry kind, written as a single leading character.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Symbol {
        Task,
        Note,
        Event,
        Done,
        Cancelled,
        Question,
        Migrated,
    }

    impl Symbol {
        pub const ALL: [Symbol; 7] = [
            Symbol::Task,
            Symbol::Note,
            Symbol::Event,
            Symbol::Done,
            Symbol::Cancelled,
            Symbol::Question,
            Symbol::Migrated,
        ];

        pub fn from_char(c: char) -> Option<Self> {
            match c {
                '.' => Some(Symbol::Task),
                '-' => Some(Symbol::Note),
                'o' => Some(Symbol::Event),
                'x' => Some(Symbol::Done),
                '~' => Some(Symbol::Cancelled),
                '?' => Some(Symbol::Question),
                '>' => Some(Symbol::Migrated),
                _ => None,
            }
        }

        pub fn as_char(self) -> char {
            match self {
                Symbol::Task => '.',
                Symbol::Note => '-',
                Symbol::Event => 'o',
                Symbol::Done => 'x',
                Symbol::Cancelled => '~',
                Symbol::Question => '?',
                Symbol::Migrated => '>',
            }
        }
    }

    /* ------------------------------ Priority ------------------------------ */

    /// Urgency marker. Serialized as its level: 0 none, 1 `!!!`, 2 `!!`, 3 `!`.
    #[derive(
        Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(into = "u8", try_from = "u8")]
    pub enum Priority {
        #[default]
        None,
        High,
        Medium,
        Low,
    }

    impl Priority {
        /// Maps a run of `!` to its priority; only runs of one to three count.
        pub fn from_marker_len(len: usize) -> Self {
            match len {
                3 => Priority::High,
                2 => Priority::Medium,
                1 => Priority::Low,
                _ => Priority::None,
            }
        }

        pub fn level(self) -> u8 {
            match self {
                Priority::None => 0,
                Priority::High => 1,
                Priority::Medium => 2,
                Priority::Low => 3,
            }
        }

        pub fn marker(self) -> &'static str {
            match self {
                Priority::None => "",
                Priority::High => "!!!",
                Priority::Medium => "!!",
                Priority::Low => "!",
            }
        }
    }

    impl From<Priority> for u8 {
        fn from(p: Priority) -> u8 {
            p.level()
        }
    }

    impl TryFrom<u8> for Priority {
        type Error = DomainError;

        fn try_from(level: u8) -> Result<Self, Self::Error> {
            match level {
                0 => Ok(Priority::None),
                1 => Ok(Priority::High),
                2 => Ok(Priority::Medium),
                3 => Ok(Priority::Low),
                other => Err(DomainError::InvalidPriority(other)),
            }
        }
    }

    /* ------------------------------- Errors ------------------------------- */

    /// Line-scoped classification failure. The `Display` text is the stable message
    /// shown next to the offending line, and is also its serialized form.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
    #[serde(into = "String", try_from = "String")]
    pub enum EntryError {
        #[error("Unknown entry type")]
        UnknownEntryType,
        #[error("Entry content required")]
        ContentRequired,
    }

    impl From<EntryError> for String {
        fn from(e: EntryError) -> String {
            e.to_string()
        }
    }

    impl TryFrom<String> for EntryError {
        type Error = DomainError;

        fn try_from(message: String) -> Result<Self, Self::Error> {
            [EntryError::UnknownEntryType, EntryError::ContentRequired]
                .into_iter()
                .find(|e| e.to_string() == message)
                .ok_or(DomainError::UnknownErrorMessage(message))
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum DomainError {
        #[error("priority level {0} is out of bounds (0..=3)")]
        InvalidPriority(u8),
        #[error("unrecognized entry error message {0:?}")]
        UnknownErrorMessage(String),
    }

    /* ------------------------------ Lines ------------------------------ */

    /// Classification of one source line.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ParsedLine {
        /// 1-based position in the document.
        pub line_number: usize,
        /// Original text, tabs included.
        pub raw: String,
        pub depth: usize,
        pub symbol: Option<Symbol>,
        #[serde(default)]
        pub priority: Priority,
        #[serde(default)]
        pub content: String,
        /// Raw text of a `>[...]` annotation; never interpreted as a date here.
        pub migration_target: Option<String>,
        pub is_valid: bool,
        pub is_empty: bool,
        pub is_header: bool,
        #[serde(rename = "error_message")]
        pub error: Option<EntryError>,
    }

    impl ParsedLine {
        /// A valid line with nothing classified yet.
        pub fn new(line_number: usize, raw: &str) -> Self {
            Self {
                line_number,
                raw: raw.to_string(),
                depth: 0,
                symbol: None,
                priority: Priority::None,
                content: String::new(),
                migration_target: None,
                is_valid: true,
                is_empty: false,
                is_header: false,
                error: None,
            }
        }

        pub fn error_message(&self) -> Option<String> {
            self.error.map(|e| e.to_string())
        }

        /// True for a valid line carrying a symbol.
        pub fn is_entry(&self) -> bool {
            self.is_valid && self.symbol.is_some()
        }

        pub(crate) fn reject(&mut self, error: EntryError) {
            self.is_valid = false;
            self.error = Some(error);
            self.content.clear();
        }
    }

    /* ----------------------------- Documents ----------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DocumentError {
        pub line_number: usize,
        pub kind: EntryError,
        pub message: String,
    }

    impl DocumentError {
        pub fn new(line_number: usize, kind: EntryError) -> Self {
            Self {
                line_number,
                kind,
                message: kind.to_string(),
            }
        }
    }

    /// Whole-document result; recomputed from scratch on every parse.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ParsedDocument {
        pub lines: Vec<ParsedLine>,
        pub is_valid: bool,
        pub errors: Vec<DocumentError>,
    }

    impl Default for ParsedDocument {
        fn default() -> Self {
            Self {
                lines: vec![],
                is_valid: true,
                errors: vec![],
            }
        }
    }

    impl ParsedDocument {
        pub fn entries(&self) -> impl Iterator<Item = &ParsedLine> {
            self.lines.iter().filter(|l| l.is_entry())
        }

        pub fn entries_with(&self, symbol: Symbol) -> impl Iterator<Item = &ParsedLine> {
            self.entries().filter(move |l| l.symbol == Some(symbol))
        }
    }

    /* ----------------------------- Structure ----------------------------- */

    /// Inclusive 0-based range of an anchor line and its descendants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FoldRange {
        pub from: usize,
        pub to: usize,
    }

    impl FoldRange {
        /// Number of descendant lines hidden when folded.
        pub fn hidden(&self) -> usize {
            self.to.saturating_sub(self.from)
        }

        pub fn contains(&self, index: usize) -> bool {
            (self.from..=self.to).contains(&index)
        }
    }

    /// Located entry: 1-based `line`, `from..to` character offsets of that line in
    /// the document (newline excluded).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LineMatch {
        pub line: usize,
        pub from: usize,
        pub to: usize,
    }

    impl LineMatch {
        /// Byte range of the match in `source`; `None` if the offsets do not fit it.
        pub fn byte_range(&self, source: &str) -> Option<Range<usize>> {
            let mut bounds = source
                .char_indices()
                .map(|(idx, _)| idx)
                .chain(std::iter::once(source.len()));
            let start = bounds.nth(self.from)?;
            let end = match self.to.checked_sub(self.from)? {
                0 => start,
                n => bounds.nth(n - 1)?,
            };
            Some(start..end)
        }

        pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
            self.byte_range(source).and_then(|range| source.get(range))
        }
    }
}

pub mod storage {
    use super::core::ParsedDocument;
    use anyhow::Result;
    use std::path::Path;

    /// Reading is kept apart from classification so the core stays I/O free.
    pub trait JournalParser {
        fn parse_file(&self, abs_path: &Path) -> Result<ParsedDocument>;
    }
}

pub mod parser {
    //! Line classifier and document parser.
    //!
    //! Each line goes through a fixed sequence: blank, header, indentation, symbol,
    //! migration annotation, priority marker, content. The symbol/annotation/marker
    //! pieces are small `nom` combinators; their failures never escape, they either
    //! fall through to the next step or become an `EntryError` on the line.

    use crate::core::*;
    use crate::storage::JournalParser;
    use anyhow::{Context, Result};
    use nom::{
        IResult,
        bytes::complete::{take_until, take_while_m_n},
        character::complete::{anychar, char, multispace0, space1},
        combinator::{map, map_opt, opt},
        error::VerboseError,
        sequence::{delimited, terminated},
    };
    use std::{fs, path::Path};
    use tracing::{debug, trace};

    /// Two-character rule run marking a day header, e.g. `── Monday, Jan 27 ──`.
    pub const HEADER_RULE: &str = "──";

    pub(crate) type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a whole document. The empty string has no lines; otherwise every
    /// `\n`-separated segment (including a trailing empty one) gets a line.
    pub fn parse_document(document: &str) -> ParsedDocument {
        if document.is_empty() {
            return ParsedDocument::default();
        }

        let lines: Vec<ParsedLine> = document
            .split('\n')
            .enumerate()
            .map(|(idx, line)| classify_line(line, idx + 1))
            .collect();
        let errors: Vec<DocumentError> = lines
            .iter()
            .filter_map(|l| l.error.map(|kind| DocumentError::new(l.line_number, kind)))
            .collect();
        debug!(
            lines = lines.len(),
            errors = errors.len(),
            "parsed journal document"
        );

        ParsedDocument {
            is_valid: errors.is_empty(),
            lines,
            errors,
        }
    }

    /// Classify one line. Total: malformed input is reported on the result.
    pub fn classify_line(line: &str, line_number: usize) -> ParsedLine {
        let mut parsed = ParsedLine::new(line_number, line);

        if is_blank(line) {
            parsed.is_empty = true;
            return parsed;
        }
        if line.contains(HEADER_RULE) {
            parsed.is_header = true;
            return parsed;
        }

        parsed.depth = indent_depth(line);
        let body = line.trim_start();

        let Ok((rest, symbol)) = entry_symbol(body) else {
            trace!(line_number, "unknown entry symbol");
            parsed.reject(EntryError::UnknownEntryType);
            return parsed;
        };
        parsed.symbol = Some(symbol);

        let (rest, target) = if symbol == Symbol::Migrated {
            opt(migration_annotation)(rest).unwrap_or((rest, None))
        } else {
            (rest, None)
        };
        parsed.migration_target = target.map(str::to_string);

        let (rest, priority) = opt(priority_marker)(rest).unwrap_or((rest, None));
        parsed.priority = priority.unwrap_or_default();

        if rest.trim().is_empty() {
            trace!(line_number, "entry without content");
            parsed.reject(EntryError::ContentRequired);
            return parsed;
        }
        parsed.content = rest.to_string();
        parsed
    }

    /// Nesting level from leading whitespace. A tab counts as two spaces; an odd
    /// leftover space rounds toward the shallower level (1 space is depth 0, 3 is 1).
    pub fn indent_depth(line: &str) -> usize {
        let spaces: usize = line
            .chars()
            .map_while(|c| match c {
                ' ' => Some(1),
                '\t' => Some(2),
                _ => None,
            })
            .sum();
        spaces / 2
    }

    pub fn is_blank(line: &str) -> bool {
        line.trim().is_empty()
    }

    /// Concrete parser implementing the `storage::JournalParser` trait.
    pub struct TextJournalParser;

    impl JournalParser for TextJournalParser {
        fn parse_file(&self, abs_path: &Path) -> Result<ParsedDocument> {
            let text =
                fs::read_to_string(abs_path).with_context(|| format!("reading {:?}", abs_path))?;
            Ok(parse_document(&text))
        }
    }

    /* ---------------------------- Combinators ---------------------------- */

    /// Symbol character plus any whitespace separating it from the rest.
    fn entry_symbol(i: &str) -> PResult<'_, Symbol> {
        terminated(map_opt(anychar, Symbol::from_char), multispace0)(i)
    }

    /// `[target]` up to the first closing bracket; unclosed brackets do not match.
    fn migration_annotation(i: &str) -> PResult<'_, &str> {
        terminated(delimited(char('['), take_until("]"), char(']')), multispace0)(i)
    }

    /// One to three `!` followed by whitespace.
    fn priority_marker(i: &str) -> PResult<'_, Priority> {
        map(
            terminated(take_while_m_n(1, 3, |c: char| c == '!'), space1),
            |bangs: &str| Priority::from_marker_len(bangs.len()),
        )(i)
    }

}

pub mod outline {
    //! Indentation hierarchy. There is no tree: a subtree is whatever contiguous run
    //! of lines sits deeper than its anchor, found by scanning forward.

    use crate::core::FoldRange;
    use crate::parser::{indent_depth, is_blank};

    /// Descendant range of the line at `index`, or `None` for blank anchors, the
    /// last line, leaves and out-of-range indices. Blank lines never end a subtree.
    pub fn fold_range<S: AsRef<str>>(lines: &[S], index: usize) -> Option<FoldRange> {
        let anchor = lines.get(index)?.as_ref();
        if is_blank(anchor) || index + 1 >= lines.len() {
            return None;
        }

        let depth = indent_depth(anchor);
        let mut last_descendant = None;
        for (offset, line) in lines[index + 1..].iter().enumerate() {
            let line = line.as_ref();
            if is_blank(line) {
                continue;
            }
            if indent_depth(line) <= depth {
                break;
            }
            last_descendant = Some(index + 1 + offset);
        }

        last_descendant.map(|to| FoldRange { from: index, to })
    }

    /// Every foldable range in the document, in line order.
    pub fn fold_ranges<S: AsRef<str>>(lines: &[S]) -> Vec<FoldRange> {
        (0..lines.len())
            .filter_map(|idx| fold_range(lines, idx))
            .collect()
    }

    /// Split text the same way the document parser does.
    pub fn document_lines(document: &str) -> Vec<&str> {
        if document.is_empty() {
            return vec![];
        }
        document.split('\n').collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parent_folds_over_children() {
            let lines = [". Parent", "  . Child", "    . Grandchild", ". Next root"];
            assert_eq!(fold_range(&lines, 0), Some(FoldRange { from: 0, to: 2 }));
            assert_eq!(fold_range(&lines, 1), Some(FoldRange { from: 1, to: 2 }));
            assert_eq!(fold_range(&lines, 2), None);
            assert_eq!(fold_range(&lines, 3), None);
        }

        #[test]
        fn blank_lines_inside_subtree_do_not_end_it() {
            let lines = [". Parent", "", "  . Child", "", ". Sibling"];
            assert_eq!(fold_range(&lines, 0), Some(FoldRange { from: 0, to: 2 }));
        }

        #[test]
        fn trailing_blank_lines_are_not_included() {
            let lines = [". Parent", "  . Child", "", "   "];
            assert_eq!(fold_range(&lines, 0), Some(FoldRange { from: 0, to: 1 }));
        }

        #[test]
        fn leaf_and_blank_anchors_do_not_fold() {
            let lines = [". a", ". b", "", "  . c"];
            assert_eq!(fold_range(&lines, 0), None);
            assert_eq!(fold_range(&lines, 2), None);
            assert_eq!(fold_range(&lines, 10), None);
        }

        #[test]
        fn invalid_lines_still_fold() {
            let lines = ["^ not an entry", "  .", "    whatever", "-"];
            assert_eq!(fold_range(&lines, 0), Some(FoldRange { from: 0, to: 2 }));
        }

        #[test]
        fn tabs_count_as_indentation() {
            let lines = [". a", "\t. b", "\t\t. c", "  . d"];
            assert_eq!(fold_range(&lines, 0), Some(FoldRange { from: 0, to: 3 }));
            assert_eq!(fold_range(&lines, 1), Some(FoldRange { from: 1, to: 2 }));
        }

        #[test]
        fn all_ranges_in_order() {
            let lines = document_lines(". a\n  . b\n    . c\n. d\n  . e");
            let ranges = fold_ranges(&lines);
            assert_eq!(
                ranges,
                vec![
                    FoldRange { from: 0, to: 2 },
                    FoldRange { from: 1, to: 2 },
                    FoldRange { from: 3, to: 4 },
                ]
            );
            assert_eq!(ranges[0].hidden(), 2);
            assert!(ranges[2].contains(4));
        }

        #[test]
        fn hand_built_reversed_range_hides_nothing() {
            let range = FoldRange { from: 5, to: 2 };
            assert_eq!(range.hidden(), 0);
            assert!(!range.contains(3));
        }
    }
}

pub mod locate {
    use crate::core::{LineMatch, Symbol};
    use crate::parser::PResult;
    use nom::{
        character::complete::{anychar, multispace0, one_of},
        combinator::{map_opt, opt, rest},
        sequence::{preceded, tuple},
    };

    /// First outline line whose trimmed content equals or contains `search`.
    pub fn find_entry_line(document: &str, search: &str) -> Option<LineMatch> {
        if document.is_empty() || search.is_empty() {
            return None;
        }

        let mut offset = 0;
        for (idx, line) in document.split('\n').enumerate() {
            let width = line.chars().count();
            if let Some(content) = outline_content(line) {
                let content = content.trim();
                if content == search || content.contains(search) {
                    return Some(LineMatch {
                        line: idx + 1,
                        from: offset,
                        to: offset + width,
                    });
                }
            }
            offset += width + 1;
        }
        None
    }

    /// Whitespace, a symbol, an optional `!`/`*`/`^` modifier, then content.
    fn outline_content(line: &str) -> Option<&str> {
        let parsed: PResult<'_, &str> = preceded(
            tuple((
                multispace0,
                map_opt(anychar, Symbol::from_char),
                opt(one_of("!*^")),
            )),
            rest,
        )(line);
        parsed.ok().map(|(_, content)| content)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn exact_match_reports_offsets() {
            let doc = "── Mon ──\n. Buy groceries\n  - milk";
            let m = find_entry_line(doc, "Buy groceries").expect("match");
            assert_eq!(m.line, 2);
            assert_eq!(m.slice(doc), Some(". Buy groceries"));
            assert_eq!(m.from, 10);
            assert_eq!(m.to, 25);
        }

        #[test]
        fn offsets_count_characters_not_bytes() {
            let doc = "── Monday, Jan 27 ──\n. Buy groceries";
            let m = find_entry_line(doc, "Buy").expect("match");
            assert_eq!(m.line, 2);
            assert_eq!(m.from, 21);
            assert_eq!(m.to, 36);
            assert_eq!(m.byte_range(doc), Some(29..44));
            assert_eq!(m.slice(doc), Some(". Buy groceries"));
        }

        #[test]
        fn offsets_outside_the_document_do_not_slice() {
            let doc = ". a";
            let past_end = LineMatch { line: 1, from: 2, to: 9 };
            assert_eq!(past_end.slice(doc), None);
            let reversed = LineMatch { line: 1, from: 2, to: 1 };
            assert_eq!(reversed.byte_range(doc), None);
            let whole = LineMatch { line: 1, from: 0, to: 3 };
            assert_eq!(whole.slice(doc), Some(". a"));
        }

        #[test]
        fn substring_match_on_nested_line() {
            let doc = ". Buy groceries\n  - milk and eggs";
            let m = find_entry_line(doc, "milk").expect("match");
            assert_eq!(m.line, 2);
            assert_eq!(m.slice(doc), Some("  - milk and eggs"));
        }

        #[test]
        fn first_match_wins() {
            let doc = ". call Ann\n. call Bob";
            assert_eq!(find_entry_line(doc, "call").map(|m| m.line), Some(1));
        }

        #[test]
        fn modifier_after_symbol_is_skipped() {
            let doc = ".! urgent thing\n.* starred";
            assert_eq!(find_entry_line(doc, "starred").map(|m| m.line), Some(2));
            assert_eq!(find_entry_line(doc, "urgent thing").map(|m| m.line), Some(1));
        }

        #[test]
        fn non_outline_lines_are_ignored() {
            let doc = "plain milk\n^ milk\n- milk";
            assert_eq!(find_entry_line(doc, "milk").map(|m| m.line), Some(3));
        }

        #[test]
        fn empty_inputs_and_misses() {
            assert_eq!(find_entry_line("", "x"), None);
            assert_eq!(find_entry_line(". x", ""), None);
            assert_eq!(find_entry_line(". x\n. y", "z"), None);
        }
    }
}

pub mod format {
    //! Canonical rendering of entries: two spaces per depth, symbol, one space,
    //! `[target] ` for migrations, priority marker, content.

    use crate::core::ParsedLine;
    use crate::parser::parse_document;

    pub const INDENT: &str = "  ";

    /// Render a valid entry line; `None` for blank, header and invalid lines.
    pub fn format_entry(line: &ParsedLine) -> Option<String> {
        if !line.is_valid {
            return None;
        }
        let symbol = line.symbol?;

        let mut out = INDENT.repeat(line.depth);
        out.push(symbol.as_char());
        out.push(' ');
        if let Some(target) = &line.migration_target {
            out.push('[');
            out.push_str(target);
            out.push_str("] ");
        }
        let marker = line.priority.marker();
        if !marker.is_empty() {
            out.push_str(marker);
            out.push(' ');
        }
        out.push_str(&line.content);
        Some(out)
    }

    /// Canonicalize every valid entry; everything else is kept byte for byte.
    pub fn format_document(document: &str) -> String {
        parse_document(document)
            .lines
            .iter()
            .map(|line| format_entry(line).unwrap_or_else(|| line.raw.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::parser::classify_line;

        #[test]
        fn canonical_spacing() {
            let input = ".Buy\n\t-  !!note\n   >[fri]!!! ship it\n^ junk\n── Tue ──\n";
            let expected = ". Buy\n  - !!note\n  > [fri] !!! ship it\n^ junk\n── Tue ──\n";
            assert_eq!(format_document(input), expected);
        }

        #[test]
        fn formatting_is_stable() {
            let input = ". a\n  x !! b\n> [later] c";
            let once = format_document(input);
            assert_eq!(format_document(&once), once);
            assert_eq!(once, input);
        }

        #[test]
        fn invalid_lines_have_no_canonical_form() {
            assert_eq!(format_entry(&classify_line(".", 1)), None);
            assert_eq!(format_entry(&classify_line("", 1)), None);
        }
    }
}

pub mod projectors {
    pub mod carry_forward {
        //! Carry open tasks into a new day, bullet-journal style: each open task and
        //! its subtree is copied forward, and the original is rewritten as migrated.

        use crate::core::{FoldRange, ParsedLine, Symbol};
        use crate::format::{INDENT, format_entry};
        use crate::outline::fold_range;
        use crate::parser::{HEADER_RULE, parse_document};
        use chrono::NaiveDate;
        use std::collections::BTreeMap;
        use tracing::debug;

        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct CarryForward {
            /// Carried entries, re-based so each task starts at depth 0.
            pub next: String,
            /// Source document with every carried task marked `>[target]`.
            pub previous: String,
            pub carried: usize,
        }

        /// Header line for a day, e.g. `── Monday, Jan 27 ──`.
        pub fn day_header(date: NaiveDate) -> String {
            format!("{HEADER_RULE} {} {HEADER_RULE}", date.format("%A, %b %-d"))
        }

        /// Build the next day's page: header for `date`, then every carried entry.
        /// Carried tasks in the previous page point at the ISO date.
        pub fn next_day(document: &str, date: NaiveDate) -> CarryForward {
            let mut result = carry_forward(document, &date.to_string());
            let header = day_header(date);
            result.next = if result.next.is_empty() {
                header
            } else {
                format!("{header}\n{}", result.next)
            };
            result
        }

        /// Carry every valid open task not already inside a carried subtree.
        /// Tasks are deduplicated by content: a duplicate's subtree is appended under
        /// the first copy, and the duplicate is still marked migrated.
        /// `target` must not contain `]`.
        pub fn carry_forward(document: &str, target: &str) -> CarryForward {
            let parsed = parse_document(document);
            let raw: Vec<&str> = parsed.lines.iter().map(|l| l.raw.as_str()).collect();

            let mut previous: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
            // one block of rebased lines per distinct task content
            let mut blocks: Vec<Vec<String>> = Vec::new();
            let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
            let mut covered: Option<FoldRange> = None;

            for line in parsed.entries_with(Symbol::Task) {
                let idx = line.line_number - 1;
                if covered.is_some_and(|range| range.contains(idx)) {
                    continue;
                }

                let range = fold_range(&raw, idx).unwrap_or(FoldRange { from: idx, to: idx });
                covered = Some(range);
                if let Some(migrated) = format_entry(&as_migrated(line, target)) {
                    previous[idx] = migrated;
                }

                match seen.get(line.content.as_str()) {
                    Some(&block) => {
                        debug!(
                            line = line.line_number,
                            "merging duplicate open task into its first copy"
                        );
                        blocks[block].extend(
                            parsed.lines[idx + 1..=range.to]
                                .iter()
                                .map(|sub| rebase(sub, line.depth)),
                        );
                    }
                    None => {
                        seen.insert(line.content.as_str(), blocks.len());
                        blocks.push(
                            parsed.lines[idx..=range.to]
                                .iter()
                                .map(|sub| rebase(sub, line.depth))
                                .collect(),
                        );
                    }
                }
            }

            let carried = blocks.len();
            debug!(carried, "carried open tasks forward");
            CarryForward {
                next: blocks.concat().join("\n"),
                previous: previous.join("\n"),
                carried,
            }
        }

        fn as_migrated(line: &ParsedLine, target: &str) -> ParsedLine {
            let mut out = line.clone();
            out.symbol = Some(Symbol::Migrated);
            out.migration_target = Some(target.to_string());
            out
        }

        fn rebase(line: &ParsedLine, base: usize) -> String {
            if line.is_empty {
                return String::new();
            }
            let depth = line.depth.saturating_sub(base);
            if line.is_entry() {
                let mut shifted = line.clone();
                shifted.depth = depth;
                if let Some(text) = format_entry(&shifted) {
                    return text;
                }
            }
            format!("{}{}", INDENT.repeat(depth), line.raw.trim_start())
        }

        #[cfg(test)]
        mod tests {
            use super::*;

            #[test]
            fn open_tasks_move_with_their_subtrees() {
                let doc = "── Mon ──\n. Write report\n  - outline first\n  . ask Sam\nx Done thing\n  . Nested open\n- a note";
                let out = carry_forward(doc, "2025-01-28");
                assert_eq!(out.carried, 2);
                assert_eq!(
                    out.next,
                    ". Write report\n  - outline first\n  . ask Sam\n. Nested open"
                );
                assert_eq!(
                    out.previous,
                    "── Mon ──\n> [2025-01-28] Write report\n  - outline first\n  . ask Sam\nx Done thing\n  > [2025-01-28] Nested open\n- a note"
                );
            }

            #[test]
            fn priority_survives_migration() {
                let out = carry_forward(". !!! urgent", "fri");
                assert_eq!(out.next, ". !!! urgent");
                assert_eq!(out.previous, "> [fri] !!! urgent");
                let migrated = parse_document(&out.previous);
                assert_eq!(migrated.lines[0].migration_target.as_deref(), Some("fri"));
            }

            #[test]
            fn duplicates_are_carried_once() {
                let out = carry_forward(". same\n. same", "t");
                assert_eq!(out.carried, 1);
                assert_eq!(out.next, ". same");
                assert_eq!(out.previous, "> [t] same\n> [t] same");
            }

            #[test]
            fn duplicate_subtrees_join_the_first_copy() {
                let out = carry_forward(". same\n  - detail A\n. same\n  - detail B", "t");
                assert_eq!(out.carried, 1);
                assert_eq!(out.next, ". same\n  - detail A\n  - detail B");
                assert_eq!(
                    out.previous,
                    "> [t] same\n  - detail A\n> [t] same\n  - detail B"
                );
            }

            #[test]
            fn nested_duplicate_keeps_relative_depth() {
                let doc = ". plan\n  - a\nx done\n  . plan\n    - b\n      - c";
                let out = carry_forward(doc, "t");
                assert_eq!(out.next, ". plan\n  - a\n  - b\n    - c");
            }

            #[test]
            fn invalid_tasks_stay_put() {
                let doc = ".\n^ odd\n- note";
                let out = carry_forward(doc, "t");
                assert_eq!(out.carried, 0);
                assert_eq!(out.previous, doc);
                assert!(out.next.is_empty());
            }

            #[test]
            fn next_day_starts_with_a_header() {
                let date = NaiveDate::from_ymd_opt(2025, 1, 27).expect("date");
                assert_eq!(day_header(date), "── Monday, Jan 27 ──");

                let out = next_day(". pay rent", date);
                assert_eq!(out.next, "── Monday, Jan 27 ──\n. pay rent");
                assert_eq!(out.previous, "> [2025-01-27] pay rent");
                assert!(parse_document(&out.next).lines[0].is_header);

                let empty = next_day("x nothing open", date);
                assert_eq!(empty.next, "── Monday, Jan 27 ──");
            }
        }
    }
}

pub use format::{format_document, format_entry};
pub use locate::find_entry_line;
pub use outline::{fold_range, fold_ranges};
pub use parser::{TextJournalParser, classify_line, parse_document};
