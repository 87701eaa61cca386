//! Line diff rendering with character-level highlighting.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

#[derive(Clone, Copy)]
enum LineKind {
    Removed,
    Added,
    Context,
}

fn paint(text: &str, kind: LineKind, emphasized: bool, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    let painted = match kind {
        LineKind::Removed => text.red(),
        LineKind::Added => text.green(),
        LineKind::Context => text.dimmed(),
    };
    if emphasized {
        painted.bold().underline().to_string()
    } else {
        painted.to_string()
    }
}

/// Render the changes between `original` and `transformed` as hunks.
///
/// Each hunk keeps `context_lines` unchanged lines around the edits. Removed
/// lines start with `-`, added lines with `+`. With `color`, removals are red,
/// additions green, context dimmed and the changed characters bold.
pub fn render_diff(original: &str, transformed: &str, context_lines: usize, color: bool) -> String {
    let diff = TextDiff::from_lines(original, transformed);
    let mut out = String::new();

    for (idx, group) in diff.grouped_ops(context_lines).iter().enumerate() {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        if idx > 0 {
            out.push_str(&paint("···", LineKind::Context, false, color));
            out.push('\n');
        }

        let old = first.old_range().start..last.old_range().end;
        let new = first.new_range().start..last.new_range().end;
        let header = format!(
            "@@ -{},{} +{},{} @@",
            old.start + 1,
            old.len(),
            new.start + 1,
            new.len()
        );
        if color {
            out.push_str(&header.cyan().to_string());
        } else {
            out.push_str(&header);
        }
        out.push('\n');

        for op in group {
            for change in diff.iter_inline_changes(op) {
                let (sign, kind) = match change.tag() {
                    ChangeTag::Delete => ("-", LineKind::Removed),
                    ChangeTag::Insert => ("+", LineKind::Added),
                    ChangeTag::Equal => (" ", LineKind::Context),
                };
                out.push_str(&paint(sign, kind, false, color));
                for (emphasized, value) in change.iter_strings_lossy() {
                    let value = value.trim_end_matches(['\n', '\r']);
                    out.push_str(&paint(value, kind, emphasized, color));
                }
                out.push('\n');
                if change.missing_newline() {
                    out.push_str("\\ No newline at end of file\n");
                }
            }
        }
    }

    out
}
