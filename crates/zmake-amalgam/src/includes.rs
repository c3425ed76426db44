//! Include deduplication with provenance.
//!
//! Includes are keyed by their normalized directive text. The first fragment
//! to request a target creates the record; later requests only add the
//! requesting fragment to its origins. Fragment includes (`"name.zpp"`) are
//! resolved against the known fragment set and emitted commented out, since
//! the fragment's body is pulled into the unit directly.

use indexmap::{IndexMap, IndexSet};

use crate::error::{AmalgamError, Result};
use crate::fragment::{FragmentId, FragmentSet};
use crate::scan::IncludeDirective;

/// One unique include of the generated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRecord {
    /// Directive as emitted, e.g. `#include <vector>` or `//#include "util.zpp"`.
    pub directive: String,
    pub is_fragment_include: bool,
    pub resolved_fragment: Option<FragmentId>,
    origins: IndexSet<FragmentId>,
}

impl IncludeRecord {
    /// Fragments that requested this include, in first-request order.
    pub fn origins(&self) -> impl Iterator<Item = FragmentId> + '_ {
        self.origins.iter().copied()
    }

    /// The directive padded to the next tab stop, followed by its provenance.
    pub fn annotated(&self, fragments: &FragmentSet) -> String {
        let padding = 4 - self.directive.len() % 4;
        let origins = self
            .origins()
            .map(|id| fragments[id].display_path())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}{}// From {}", self.directive, " ".repeat(padding), origins)
    }
}

/// Insertion-ordered set of includes seen across all fragments.
#[derive(Debug, Default, Clone)]
pub struct IncludeResolver {
    records: IndexMap<String, IncludeRecord>,
}

impl IncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `include` as requested by `origin`.
    ///
    /// Returns the fragment a fragment include resolved to. Fails when a
    /// fragment include names no known fragment.
    pub fn record(
        &mut self,
        include: &IncludeDirective,
        origin: FragmentId,
        fragments: &FragmentSet,
    ) -> Result<Option<FragmentId>> {
        let (directive, resolved) = if include.is_fragment_include() {
            let target = include.inner();
            let resolved = fragments.find_by_name(target).ok_or_else(|| {
                AmalgamError::UnresolvedFragmentInclude {
                    target: target.to_string(),
                    fragment: fragments[origin].display_path(),
                }
            })?;
            (format!("//#include \"{}\"", target), Some(resolved))
        } else {
            (format!("#include {}", include.target), None)
        };

        self.records
            .entry(directive.clone())
            .or_insert_with(|| IncludeRecord {
                directive,
                is_fragment_include: resolved.is_some(),
                resolved_fragment: resolved,
                origins: IndexSet::new(),
            })
            .origins
            .insert(origin);

        Ok(resolved)
    }

    pub fn get(&self, directive: &str) -> Option<&IncludeRecord> {
        self.records.get(directive)
    }

    pub fn records(&self) -> impl Iterator<Item = &IncludeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;

    fn include(target: &str) -> IncludeDirective {
        IncludeDirective {
            target: target.to_string(),
        }
    }

    fn fragments() -> (FragmentSet, FragmentId, FragmentId) {
        let mut set = FragmentSet::new();
        let a = set.push(Fragment::from_source("src/a.zpp", ""));
        let b = set.push(Fragment::from_source("src/b.zpp", ""));
        (set, a, b)
    }

    #[test]
    fn test_repeat_include_adds_origin() {
        let (set, a, b) = fragments();
        let mut resolver = IncludeResolver::new();
        resolver.record(&include("<vector>"), a, &set).unwrap();
        resolver.record(&include("<string>"), a, &set).unwrap();
        resolver.record(&include("<vector>"), b, &set).unwrap();
        resolver.record(&include("<vector>"), b, &set).unwrap();

        assert_eq!(resolver.len(), 2);
        let vector = resolver.get("#include <vector>").unwrap();
        assert_eq!(vector.origins().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(
            vector.annotated(&set),
            "#include <vector>   // From src/a.zpp, src/b.zpp"
        );
    }

    #[test]
    fn test_padding_always_adds_at_least_one_space() {
        let (set, a, _) = fragments();
        let mut resolver = IncludeResolver::new();
        // "#include <map>" is 14 characters: padded to 16.
        resolver.record(&include("<map>"), a, &set).unwrap();
        // "#include <list>" is 15 characters: padded to 16.
        resolver.record(&include("<list>"), a, &set).unwrap();
        // "#include <array>" is 16 characters: padded to 20.
        resolver.record(&include("<array>"), a, &set).unwrap();

        let lines: Vec<_> = resolver.records().map(|r| r.annotated(&set)).collect();
        assert_eq!(lines[0], "#include <map>  // From src/a.zpp");
        assert_eq!(lines[1], "#include <list> // From src/a.zpp");
        assert_eq!(lines[2], "#include <array>    // From src/a.zpp");
    }

    #[test]
    fn test_fragment_include_is_resolved_and_disabled() {
        let (set, a, b) = fragments();
        let mut resolver = IncludeResolver::new();
        let resolved = resolver.record(&include("\"b.zpp\""), a, &set).unwrap();
        assert_eq!(resolved, Some(b));

        let record = resolver.records().next().unwrap();
        assert_eq!(record.directive, "//#include \"b.zpp\"");
        assert!(record.is_fragment_include);
        assert_eq!(record.resolved_fragment, Some(b));
    }

    #[test]
    fn test_unresolved_fragment_include() {
        let (set, a, _) = fragments();
        let mut resolver = IncludeResolver::new();
        let err = resolver
            .record(&include("\"missing.zpp\""), a, &set)
            .unwrap_err();
        match err {
            AmalgamError::UnresolvedFragmentInclude { target, fragment } => {
                assert_eq!(target, "missing.zpp");
                assert_eq!(fragment, "src/a.zpp");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_library_include_is_passthrough() {
        let (set, a, _) = fragments();
        let mut resolver = IncludeResolver::new();
        let resolved = resolver.record(&include("\"local.hpp\""), a, &set).unwrap();
        assert_eq!(resolved, None);
        assert_eq!(
            resolver.records().next().unwrap().directive,
            "#include \"local.hpp\""
        );
    }
}
