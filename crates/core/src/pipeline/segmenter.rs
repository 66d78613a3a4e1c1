//! # Section Segmenter
//!
//! Splits the accumulated outline into sections on delimiter lines.
//!
//! Only whole lines are ever classified as delimiters, so text appended to
//! the buffer can change the last section but never an earlier one. That is
//! what lets the coordinator re-segment the full buffer after every delta
//! without invalidating sections it already dispatched.

/// Default delimiter token
pub const DEFAULT_DELIMITER: &str = "---";

/// Splits outline text into ordered sections
#[derive(Debug, Clone)]
pub struct Segmenter {
    delimiter: String,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl Segmenter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into().trim().to_string(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Whether `line` consists only of the delimiter token.
    ///
    /// A token made of one repeated character (like `---`) also matches
    /// longer runs of that character (`-----`).
    pub fn is_delimiter(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || self.delimiter.is_empty() {
            return false;
        }
        if line == self.delimiter {
            return true;
        }
        let mut chars = self.delimiter.chars();
        match chars.next() {
            Some(c) if chars.all(|d| d == c) => {
                line.chars().count() >= self.delimiter.chars().count()
                    && line.chars().all(|d| d == c)
            }
            _ => false,
        }
    }

    /// Ordered, trimmed, non-empty section texts
    pub fn segment(&self, buffer: &str) -> Vec<String> {
        let mut sections = Vec::new();
        let mut current = String::new();

        for line in buffer.split('\n') {
            if self.is_delimiter(line) {
                push_trimmed(&mut sections, &current);
                current.clear();
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        push_trimmed(&mut sections, &current);

        sections
    }

    /// Number of delimiter lines in `buffer`
    pub fn count_delimiters(&self, buffer: &str) -> usize {
        buffer.split('\n').filter(|l| self.is_delimiter(l)).count()
    }
}

fn push_trimmed(sections: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sections.push(piece.to_string());
    }
}

/// Segment with the default delimiter
pub fn segment(buffer: &str) -> Vec<String> {
    Segmenter::default().segment(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_delimiters_give_k_plus_one_sections() {
        let buffer = "# A\n- one\n---\n# B\n- two\n---\n# C\n";
        let sections = segment(buffer);
        assert_eq!(sections, vec!["# A\n- one", "# B\n- two", "# C"]);
    }

    #[test]
    fn test_no_delimiter_is_one_section() {
        assert_eq!(segment("  # Only\n- point  \n"), vec!["# Only\n- point"]);
        assert!(segment("").is_empty());
        assert!(segment(" \n\n ").is_empty());
    }

    #[test]
    fn test_blank_lines_around_delimiter_and_empty_pieces() {
        let buffer = "A\n\n  ---  \n\nB\n---\n\n---\nC\r\n---\r\n";
        assert_eq!(segment(buffer), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_delimiter_must_be_whole_line() {
        assert_eq!(segment("A --- B\n- a -\n"), vec!["A --- B\n- a -"]);
        assert_eq!(segment("A\n-----\nB"), vec!["A", "B"]);
        assert_eq!(segment("A\n--\nB"), vec!["A\n--\nB"]);
    }

    #[test]
    fn test_idempotent() {
        let buffer = "# A\n---\n# B\n---\n# C";
        assert_eq!(segment(buffer), segment(buffer));
    }

    #[test]
    fn test_prefix_stability_while_growing() {
        let full = "# A\n- one\n---\n# B\n- two\n---\n# C\n- three\n";
        let mut stable: Vec<String> = Vec::new();
        for end in 0..=full.len() {
            let sections = segment(&full[..end]);
            // every section except the last one is closed by a delimiter
            let closed = sections.len().saturating_sub(1);
            for (i, s) in stable.iter().enumerate().take(closed) {
                assert_eq!(&sections[i], s, "section {} changed at prefix {}", i, end);
            }
            if closed > stable.len() {
                stable = sections[..closed].to_vec();
            }
        }
        assert_eq!(stable.len(), 2);
    }

    #[test]
    fn test_custom_delimiter() {
        let segmenter = Segmenter::new("<<<slide>>>");
        assert_eq!(segmenter.segment("A\n<<<slide>>>\nB"), vec!["A", "B"]);
        assert_eq!(segmenter.count_delimiters("A\n<<<slide>>>\nB"), 1);
        assert!(!segmenter.is_delimiter("<<<slide>>>>"));
    }

    #[test]
    fn test_count_delimiters() {
        assert_eq!(Segmenter::default().count_delimiters("a\n---\nb\n----\nc"), 2);
    }
}
