//! Entry-point location.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::extract::ENTRY_POINT;
use crate::fragment::{FragmentId, FragmentSet};
use crate::scan::{LineKind, Scanner, Segment};

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:.*\s)?main\s*\(.*\)\s*\{").expect("entry point pattern")
});

/// Where the program entry point was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub fragment: FragmentId,
    /// Index of the fragment in discovery order.
    pub position: usize,
    /// Zero-based line of the `main` opener.
    pub line: usize,
}

/// Order fragments for the search: those named `main` first, the rest in
/// insertion order.
pub fn discovery_order(fragments: &FragmentSet, ids: &[FragmentId]) -> Vec<FragmentId> {
    let (mut ordered, rest): (Vec<_>, Vec<_>) = ids
        .iter()
        .copied()
        .partition(|&id| fragments[id].stem() == ENTRY_POINT);
    ordered.extend(rest);
    ordered
}

/// Whether a classified segment opens `main`.
pub fn is_entry_point(segment: &Segment) -> bool {
    match &segment.kind {
        LineKind::Function(opener) => opener.name == ENTRY_POINT,
        LineKind::Code => ENTRY_RE.is_match(&segment.text),
        _ => false,
    }
}

/// Find the first fragment, in discovery order, that opens `main`.
pub fn locate(fragments: &FragmentSet, ids: &[FragmentId]) -> Option<EntryPoint> {
    for (position, id) in discovery_order(fragments, ids).into_iter().enumerate() {
        let fragment = &fragments[id];
        let found = Scanner::new(fragment)
            .find(|line| line.segments.iter().any(is_entry_point))
            .map(|line| line.line);

        if let Some(line) = found {
            debug!(
                fragment = %fragment.display_path(),
                line = line + 1,
                "found entry point"
            );
            return Some(EntryPoint {
                fragment: id,
                position,
                line,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;

    fn fragment_set(sources: &[(&str, &str)]) -> (FragmentSet, Vec<FragmentId>) {
        let mut set = FragmentSet::new();
        let ids = sources
            .iter()
            .map(|(path, source)| set.push(Fragment::from_source(*path, source)))
            .collect();
        (set, ids)
    }

    #[test]
    fn test_main_named_fragment_is_searched_first() {
        let (set, ids) = fragment_set(&[
            ("src/a.z", "int helper() {\n}\n"),
            ("src/main.z", "int main() {\n    return 0;\n}\n"),
            ("src/b.z", "int other() {\n}\n"),
        ]);
        let order = discovery_order(&set, &ids);
        assert_eq!(order, vec![ids[1], ids[0], ids[2]]);

        let entry = locate(&set, &ids).unwrap();
        assert_eq!(entry.position, 0);
        assert_eq!(entry.fragment, ids[1]);
        assert_eq!(entry.line, 0);
    }

    #[test]
    fn test_first_match_wins() {
        let (set, ids) = fragment_set(&[
            ("src/a.z", "\nint main(int argc, char** argv) {\n}\n"),
            ("src/b.z", "int main() {\n}\n"),
        ]);
        let entry = locate(&set, &ids).unwrap();
        assert_eq!(entry.fragment, ids[0]);
        assert_eq!(entry.line, 1);
    }

    #[test]
    fn test_main_in_comment_or_string_is_ignored() {
        let (set, ids) = fragment_set(&[(
            "src/a.z",
            "/*\nint main() {\n*/\nauto s = R\"(\nint main() {\n)\";\n",
        )]);
        assert_eq!(locate(&set, &ids), None);
    }

    #[test]
    fn test_main_with_brace_on_next_line() {
        let (set, ids) = fragment_set(&[("src/app.zpp", "int main()\n{\n}\n")]);
        assert_eq!(locate(&set, &ids).map(|e| e.line), Some(0));
    }

    #[test]
    fn test_loose_main_signatures() {
        let (set, ids) = fragment_set(&[("src/app.zpp", "main() {\n}\n")]);
        assert!(locate(&set, &ids).is_some());

        let (set, ids) = fragment_set(&[("src/app.zpp", "    int main () {\n}\n")]);
        assert!(locate(&set, &ids).is_some());

        let (set, ids) = fragment_set(&[("src/app.zpp", "int domain() {\n}\n")]);
        assert!(locate(&set, &ids).is_none());
    }
}
