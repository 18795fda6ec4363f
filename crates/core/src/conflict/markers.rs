//! Git-style conflict marker parsing.
//!
//! Recognises the standard two-way blocks
//!
//! ```text
//! <<<<<<< HEAD
//! ours
//! =======
//! theirs
//! >>>>>>> branch
//! ```
//!
//! as well as diff3 blocks carrying a `||||||| base` section. Line endings
//! are preserved so a document can be rebuilt byte-for-byte.
//!
//! Outside a block, `=======` and `|||||||` lines are ordinary text (a
//! Markdown setext underline, for one).

use tracing::debug;

use crate::errors::ConflictError;

const OURS_MARKER: &str = "<<<<<<<";
const BASE_MARKER: &str = "|||||||";
const SPLIT_MARKER: &str = "=======";
const THEIRS_MARKER: &str = ">>>>>>>";

/// Which side of a hunk to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ours,
    Theirs,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// One conflicted region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictHunk {
    /// Label after `<<<<<<<` (usually `HEAD`).
    pub ours_label: String,
    /// Label after `>>>>>>>` (usually the merged branch).
    pub theirs_label: String,
    pub ours: String,
    /// Common ancestor, present only for diff3-style blocks.
    pub base: Option<String>,
    pub theirs: String,
    /// Line of the `<<<<<<<` marker (1-indexed).
    pub start_line: usize,
    /// Line of the `>>>>>>>` marker (1-indexed, inclusive).
    pub end_line: usize,
}

impl ConflictHunk {
    pub fn side(&self, side: Side) -> &str {
        match side {
            Side::Ours => &self.ours,
            Side::Theirs => &self.theirs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Hunk(ConflictHunk),
}

/// A file split into clean text and conflict hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDocument {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Ours,
    Base,
    Split,
    Theirs,
}

/// Classify a line, returning the marker kind and its trailing label.
fn classify(line: &str) -> Option<(Marker, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let (marker, rest) = if let Some(rest) = line.strip_prefix(OURS_MARKER) {
        (Marker::Ours, rest)
    } else if let Some(rest) = line.strip_prefix(BASE_MARKER) {
        (Marker::Base, rest)
    } else if let Some(rest) = line.strip_prefix(THEIRS_MARKER) {
        (Marker::Theirs, rest)
    } else if line == SPLIT_MARKER {
        return Some((Marker::Split, ""));
    } else {
        return None;
    };
    // `<<<<<<<<` is not a marker; the label must be separated by whitespace.
    if rest.is_empty() || rest.starts_with([' ', '\t']) {
        Some((marker, rest.trim()))
    } else {
        None
    }
}

enum State {
    Outside,
    Ours(ConflictHunk),
    Base(ConflictHunk),
    Theirs(ConflictHunk),
}

fn malformed(line: usize, detail: &str) -> ConflictError {
    ConflictError::MalformedMarkers {
        line,
        detail: detail.to_string(),
    }
}

impl ConflictDocument {
    /// Parse `content` into text and hunks.
    pub fn parse(content: &str) -> Result<Self, ConflictError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut state = State::Outside;
        let mut last_line = 0;

        for (idx, line) in content.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            last_line = line_no;
            state = match (state, classify(line)) {
                (State::Outside, None | Some((Marker::Split | Marker::Base, _))) => {
                    text.push_str(line);
                    State::Outside
                }
                (State::Outside, Some((Marker::Ours, label))) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    State::Ours(ConflictHunk {
                        ours_label: label.to_string(),
                        theirs_label: String::new(),
                        ours: String::new(),
                        base: None,
                        theirs: String::new(),
                        start_line: line_no,
                        end_line: line_no,
                    })
                }
                (State::Outside, Some((Marker::Theirs, _))) => {
                    return Err(malformed(line_no, "'>>>>>>>' outside of a conflict block"));
                }
                (State::Ours(mut hunk), None) => {
                    hunk.ours.push_str(line);
                    State::Ours(hunk)
                }
                (State::Ours(mut hunk), Some((Marker::Base, _))) => {
                    hunk.base = Some(String::new());
                    State::Base(hunk)
                }
                (State::Ours(hunk) | State::Base(hunk), Some((Marker::Split, _))) => {
                    State::Theirs(hunk)
                }
                (State::Base(mut hunk), None) => {
                    if let Some(ref mut base) = hunk.base {
                        base.push_str(line);
                    }
                    State::Base(hunk)
                }
                (State::Theirs(mut hunk), None) => {
                    hunk.theirs.push_str(line);
                    State::Theirs(hunk)
                }
                (State::Theirs(mut hunk), Some((Marker::Theirs, label))) => {
                    hunk.theirs_label = label.to_string();
                    hunk.end_line = line_no;
                    segments.push(Segment::Hunk(hunk));
                    State::Outside
                }
                (State::Ours(_) | State::Base(_) | State::Theirs(_), Some((Marker::Ours, _))) => {
                    return Err(malformed(line_no, "nested '<<<<<<<' inside a conflict block"));
                }
                (State::Ours(_) | State::Base(_), Some((Marker::Theirs, _))) => {
                    return Err(malformed(line_no, "'>>>>>>>' before '======='"));
                }
                (State::Base(_), Some((Marker::Base, _))) => {
                    return Err(malformed(line_no, "duplicate '|||||||' section"));
                }
                (State::Theirs(_), Some((marker, _))) => {
                    return Err(malformed(
                        line_no,
                        &format!("unexpected {:?} marker after '======='", marker),
                    ));
                }
            };
        }

        match state {
            State::Outside => {
                if !text.is_empty() {
                    segments.push(Segment::Text(text));
                }
            }
            State::Ours(hunk) | State::Base(hunk) | State::Theirs(hunk) => {
                return Err(malformed(
                    last_line.max(hunk.start_line),
                    "conflict block is never closed with '>>>>>>>'",
                ));
            }
        }

        let doc = Self { segments };
        debug!(hunks = doc.hunk_count(), "parsed conflict markers");
        Ok(doc)
    }

    /// Iterate the conflict hunks in file order.
    pub fn hunks(&self) -> impl Iterator<Item = &ConflictHunk> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Hunk(h) => Some(h),
            Segment::Text(_) => None,
        })
    }

    pub fn hunk_count(&self) -> usize {
        self.hunks().count()
    }

    pub fn is_clean(&self) -> bool {
        self.hunk_count() == 0
    }

    /// Rebuild the file keeping `side` of every hunk.
    pub fn resolve_with(&self, side: Side) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.as_str(),
                Segment::Hunk(h) => h.side(side),
            })
            .collect()
    }
}

/// Parse and return just the hunks.
pub fn parse_hunks(content: &str) -> Result<Vec<ConflictHunk>, ConflictError> {
    Ok(ConflictDocument::parse(content)?.hunks().cloned().collect())
}

/// Whether any conflict marker line is left in `content`.
///
/// A bare `=======` does not count on its own.
pub fn has_conflict_markers(content: &str) -> bool {
    content
        .split_inclusive('\n')
        .any(|line| matches!(classify(line), Some((marker, _)) if marker != Marker::Split))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_HUNKS: &str = "package main\n\
<<<<<<< HEAD\n\
func a() {}\n\
=======\n\
func b() {}\n\
>>>>>>> feature/b\n\
\n\
<<<<<<< HEAD\n\
const x = 1\n\
=======\n\
const x = 2\n\
const y = 3\n\
>>>>>>> feature/c\n";

    #[test]
    fn test_parses_every_hunk_with_positions() {
        let hunks = parse_hunks(TWO_HUNKS).unwrap();
        assert_eq!(hunks.len(), 2);

        assert_eq!(hunks[0].ours_label, "HEAD");
        assert_eq!(hunks[0].theirs_label, "feature/b");
        assert_eq!(hunks[0].ours, "func a() {}\n");
        assert_eq!(hunks[0].theirs, "func b() {}\n");
        assert_eq!((hunks[0].start_line, hunks[0].end_line), (2, 6));

        assert_eq!(hunks[1].theirs, "const x = 2\nconst y = 3\n");
        assert_eq!((hunks[1].start_line, hunks[1].end_line), (8, 13));
        assert!(hunks[1].base.is_none());
    }

    #[test]
    fn test_resolve_with_side() {
        let doc = ConflictDocument::parse(TWO_HUNKS).unwrap();
        assert_eq!(
            doc.resolve_with(Side::Ours),
            "package main\nfunc a() {}\n\nconst x = 1\n"
        );
        assert_eq!(
            doc.resolve_with(Side::Theirs),
            "package main\nfunc b() {}\n\nconst x = 2\nconst y = 3\n"
        );
    }

    #[test]
    fn test_diff3_base_section() {
        let content = "<<<<<<< ours\r\nA\r\n||||||| base\r\nO\r\n=======\r\nB\r\n>>>>>>> theirs\r\n";
        let hunks = parse_hunks(content).unwrap();
        assert_eq!(hunks[0].base.as_deref(), Some("O\r\n"));
        assert_eq!(hunks[0].ours, "A\r\n");
        assert_eq!(hunks[0].theirs, "B\r\n");
    }

    #[test]
    fn test_clean_file_round_trips() {
        let content = "no conflicts here\n======== not a marker\n";
        let doc = ConflictDocument::parse(content).unwrap();
        assert!(doc.is_clean());
        assert_eq!(doc.resolve_with(Side::Ours), content);
        assert!(!has_conflict_markers(content));
    }

    #[test]
    fn test_unterminated_block_is_rejected() {
        let err = ConflictDocument::parse("<<<<<<< HEAD\na\n=======\nb\n").unwrap_err();
        assert!(matches!(err, ConflictError::MalformedMarkers { line: 4, .. }));
    }

    #[test]
    fn test_out_of_order_markers_are_rejected() {
        let err = ConflictDocument::parse("<<<<<<< HEAD\na\n>>>>>>> b\n").unwrap_err();
        assert!(matches!(err, ConflictError::MalformedMarkers { line: 3, .. }));

        let err = ConflictDocument::parse("x\n>>>>>>> b\n").unwrap_err();
        assert!(matches!(err, ConflictError::MalformedMarkers { line: 2, .. }));
    }

    #[test]
    fn test_setext_heading_is_plain_text() {
        let content = "Title\n=======\n\nBody\n";
        let doc = ConflictDocument::parse(content).unwrap();
        assert!(doc.is_clean());
        assert_eq!(doc.resolve_with(Side::Theirs), content);
        assert!(!has_conflict_markers(content));

        let mixed = format!("{}<<<<<<< HEAD\na\n=======\nb\n>>>>>>> topic\n", content);
        let hunks = parse_hunks(&mixed).unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].start_line, 5);
        assert_eq!(
            ConflictDocument::parse(&mixed).unwrap().resolve_with(Side::Ours),
            "Title\n=======\n\nBody\na\n"
        );
    }

    #[test]
    fn test_detects_leftover_markers() {
        assert!(has_conflict_markers("ok\n>>>>>>> branch"));
        assert!(!has_conflict_markers("func main() {}\n"));
    }
}
