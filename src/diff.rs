//! Index-aligned line diff for short code files.
//!
//! Line `i` of the old text is only ever compared with line `i` of the new
//! text. An insertion near the top therefore shows every following line as
//! changed; callers rely on that exact output, so this must not grow into an
//! LCS diff.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Context,
}

impl DiffKind {
    pub fn marker(&self) -> char {
        match self {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Context => ' ',
        }
    }
}

/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub content: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

pub fn diff(old: &str, new: &str) -> Vec<DiffLine> {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let len = old_lines.len().max(new_lines.len());

    let mut lines = Vec::with_capacity(len);
    for i in 0..len {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(o), Some(n)) if o == n => lines.push(DiffLine {
                kind: DiffKind::Context,
                content: o.to_string(),
                old_line: Some(i + 1),
                new_line: Some(i + 1),
            }),
            (o, n) => {
                if let Some(o) = o {
                    lines.push(DiffLine {
                        kind: DiffKind::Removed,
                        content: o.to_string(),
                        old_line: Some(i + 1),
                        new_line: None,
                    });
                }
                if let Some(n) = n {
                    lines.push(DiffLine {
                        kind: DiffKind::Added,
                        content: n.to_string(),
                        old_line: None,
                        new_line: Some(i + 1),
                    });
                }
            }
        }
    }
    lines
}

/// Side-by-side columns: the old side drops added rows, the new side drops
/// removed rows.
pub fn split(lines: &[DiffLine]) -> (Vec<&DiffLine>, Vec<&DiffLine>) {
    let old = lines.iter().filter(|l| l.kind != DiffKind::Added).collect();
    let new = lines.iter().filter(|l| l.kind != DiffKind::Removed).collect();
    (old, new)
}

pub fn unified(lines: &[DiffLine]) -> Vec<String> {
    lines
        .iter()
        .map(|l| format!("{}{}", l.kind.marker(), l.content))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(kind: DiffKind) -> DiffKind {
        match kind {
            DiffKind::Added => DiffKind::Removed,
            DiffKind::Removed => DiffKind::Added,
            DiffKind::Context => DiffKind::Context,
        }
    }

    #[test]
    fn test_identical_text_is_all_context() {
        let text = "<ul>\n  <li>one</li>\n</ul>";
        let lines = diff(text, text);

        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.kind == DiffKind::Context));
        assert_eq!(lines[1].old_line, Some(2));
        assert_eq!(lines[1].new_line, Some(2));
    }

    #[test]
    fn test_changed_line_is_removed_then_added() {
        let lines = diff("<h1>Hi</h1>", "<h1>Hi!</h1>");
        assert_eq!(
            lines,
            vec![
                DiffLine {
                    kind: DiffKind::Removed,
                    content: "<h1>Hi</h1>".to_string(),
                    old_line: Some(1),
                    new_line: None,
                },
                DiffLine {
                    kind: DiffKind::Added,
                    content: "<h1>Hi!</h1>".to_string(),
                    old_line: None,
                    new_line: Some(1),
                },
            ]
        );
    }

    #[test]
    fn test_insertion_shifts_every_following_line() {
        let lines = diff("a\nb\nc", "x\na\nb\nc");
        let kinds: Vec<DiffKind> = lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiffKind::Removed,
                DiffKind::Added,
                DiffKind::Removed,
                DiffKind::Added,
                DiffKind::Removed,
                DiffKind::Added,
                DiffKind::Added,
            ]
        );
        assert_eq!(lines.last().map(|l| l.new_line), Some(Some(4)));
    }

    #[test]
    fn test_reversed_inputs_mirror() {
        let x = "body {\n  color: red;\n}\nh1 {}";
        let y = "body {\n  color: blue;\n}";

        let forward = diff(x, y);
        let backward = diff(y, x);

        let mut forward_sorted: Vec<(DiffKind, String)> =
            forward.iter().map(|l| (mirror(l.kind), l.content.clone())).collect();
        let mut backward_sorted: Vec<(DiffKind, String)> =
            backward.iter().map(|l| (l.kind, l.content.clone())).collect();
        forward_sorted.sort_by(|a, b| a.1.cmp(&b.1));
        backward_sorted.sort_by(|a, b| a.1.cmp(&b.1));

        assert_eq!(forward.len(), backward.len());
        assert_eq!(forward_sorted, backward_sorted);
    }

    #[test]
    fn test_split_and_unified_renderings() {
        let lines = diff("a\nb", "a\nc");

        let (old, new) = split(&lines);
        assert!(old.iter().all(|l| l.kind != DiffKind::Added));
        assert!(new.iter().all(|l| l.kind != DiffKind::Removed));
        assert_eq!(old.len(), 2);
        assert_eq!(new.len(), 2);

        assert_eq!(unified(&lines), vec![" a", "-b", "+c"]);
    }
}
