use std::fmt::Write as _;

use crate::context::Label;

/// One rendered line. `pc` anchors it to the instruction it came from;
/// block keywords and lines spliced in from nested functions have none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub pc: Option<usize>,
    pub depth: usize,
    pub text: String,
}

/// The rendered lines of one prototype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    lines: Vec<Line>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`, one line per `\n`-separated part.
    pub fn push(&mut self, pc: Option<usize>, depth: usize, text: &str) {
        for part in text.split('\n') {
            self.lines.push(Line {
                pc,
                depth,
                text: part.to_string(),
            });
        }
    }

    /// Append a nested function body `depth` levels deeper. Its instruction
    /// anchors belong to another prototype and are dropped.
    pub fn splice(&mut self, child: Fragment, depth: usize) {
        self.lines.extend(child.lines.into_iter().map(|l| Line {
            pc: None,
            depth: l.depth + depth,
            text: l.text,
        }));
    }

    /// Insert `::label::` lines before the first instruction line at or after
    /// each label's target, in allocation order. Labels past the last line go
    /// at the end.
    pub fn place_labels(&mut self, labels: &[Label]) {
        for label in labels {
            let at = self
                .lines
                .iter()
                .position(|l| matches!(l.pc, Some(pc) if pc >= label.target));
            let line = |depth| Line {
                pc: None,
                depth,
                text: format!("::{}::", label.name),
            };
            // Same-target labels stay in allocation order.
            match at {
                Some(i) => {
                    let depth = self.lines[i].depth;
                    self.lines.insert(i, line(depth));
                }
                None => self.lines.push(line(0)),
            }
        }
    }

    #[inline]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Join the lines with `indent` repeated once per depth level.
    pub fn to_source(&self, indent: &str) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "{}{}", indent.repeat(line.depth), line.text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn label(name: &str, target: usize) -> Label {
        Label { name: name.into(), target }
    }

    #[test]
    fn multi_line_push_shares_anchor() {
        let mut f = Fragment::new();
        f.push(Some(3), 1, "a = 1\nb = 2");
        assert_eq!(f.lines().len(), 2);
        assert!(f.lines().iter().all(|l| l.pc == Some(3) && l.depth == 1));
    }

    #[test]
    fn labels_land_before_target_line() {
        let mut f = Fragment::new();
        f.push(Some(0), 0, "x = 1");
        f.push(None, 0, "end");
        f.push(Some(4), 0, "y = 2");
        f.place_labels(&[label("label_1", 2), label("label_2", 4), label("label_3", 9)]);
        assert_eq!(
            f.to_source("  "),
            "x = 1\nend\n::label_1::\n::label_2::\ny = 2\n::label_3::\n"
        );
    }

    #[test]
    fn splice_indents_child() {
        let mut child = Fragment::new();
        child.push(Some(0), 0, "return");
        let mut parent = Fragment::new();
        parent.push(Some(0), 1, "local f = function()");
        parent.splice(child, 2);
        parent.push(None, 1, "end");
        assert_eq!(parent.to_source("  "), "  local f = function()\n    return\n  end\n");
        assert_eq!(parent.lines()[1].pc, None);
    }
}
