//! Translation-unit assembly.
//!
//! The generated unit is laid out in a fixed order:
//!
//! 1. banner with tool identity and generation time
//! 2. merged includes, each annotated with the fragments that requested it
//! 3. the bootstrap fragment's body, when there is one
//! 4. struct, class and union forward declarations
//! 5. function forward declarations
//! 6. the fragment bodies with their include directives removed
//!
//! Declaration groups are emitted with the last discovered fragment first.

use chrono::{Local, NaiveDateTime};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;

use crate::error::{AmalgamError, Result};
use crate::extract::{DeclarationRecord, FragmentDeclarations};
use crate::fragment::{Fragment, FragmentId, FragmentSet};
use crate::includes::IncludeResolver;
use crate::scan::{LineKind, Scanner};

/// Tool identity written into the banner.
pub const TOOL_VERSION: &str = concat!("ZMAKE VERSION ", env!("CARGO_PKG_VERSION"));

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Settings for the banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub tool: String,
    pub generated_at: NaiveDateTime,
}

impl AssemblyOptions {
    /// Options stamped with the current local time.
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    /// Options with a fixed timestamp, for reproducible output.
    pub fn at(generated_at: NaiveDateTime) -> Self {
        Self {
            tool: TOOL_VERSION.to_string(),
            generated_at,
        }
    }
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self::now()
    }
}

/// Everything collected by the extraction pass.
#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub bootstrap: Option<FragmentId>,
    /// Body fragments in emission order, bootstrap excluded.
    pub bodies: Vec<FragmentId>,
    pub includes: IncludeResolver,
    /// Extraction results in discovery order.
    pub declarations: Vec<FragmentDeclarations>,
}

/// The generated translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledUnit {
    text: String,
    bodies: Vec<FragmentId>,
    include_count: usize,
    declaration_count: usize,
}

impl AssembledUnit {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Fragments whose bodies the unit contains, bootstrap included.
    pub fn bodies(&self) -> &[FragmentId] {
        &self.bodies
    }

    pub fn include_count(&self) -> usize {
        self.include_count
    }

    pub fn declaration_count(&self) -> usize {
        self.declaration_count
    }
}

/// Lays out a [`UnitPlan`] as source text.
pub struct Assembler<'a> {
    fragments: &'a FragmentSet,
    options: &'a AssemblyOptions,
}

impl<'a> Assembler<'a> {
    pub fn new(fragments: &'a FragmentSet, options: &'a AssemblyOptions) -> Self {
        Self { fragments, options }
    }

    pub fn assemble(&self, plan: &UnitPlan) -> Result<AssembledUnit> {
        self.check_fragment_includes(plan)?;

        let mut text = String::new();
        let _ = writeln!(text, "//// This file was automatically generated by");
        let _ = writeln!(
            text,
            "//// {}, at {}.",
            self.options.tool,
            self.options.generated_at.format(TIMESTAMP_FORMAT)
        );
        text.push('\n');

        text.push_str("//// Includes\n");
        for record in plan.includes.records() {
            text.push_str(&record.annotated(self.fragments));
            text.push('\n');
        }
        text.push('\n');

        if let Some(bootstrap) = plan.bootstrap {
            text.push_str("//// Default include");
            text.push_str(&self.body(&self.fragments[bootstrap]));
            text.push('\n');
        }

        text.push_str("//// Structs, classes and unions\n");
        self.declaration_section(&mut text, plan, |d| &d.structs);

        text.push_str("//// Functions\n");
        self.declaration_section(&mut text, plan, |d| &d.functions);

        text.push_str("//// Code");
        for &id in &plan.bodies {
            text.push_str(&self.body(&self.fragments[id]));
        }

        let bodies = plan.bootstrap.into_iter().chain(plan.bodies.iter().copied()).collect();
        let declaration_count = plan
            .declarations
            .iter()
            .map(|d| d.structs.len() + d.functions.len())
            .sum();

        Ok(AssembledUnit {
            text,
            bodies,
            include_count: plan.includes.len(),
            declaration_count,
        })
    }

    /// Every fragment include must point at a fragment whose body is emitted.
    fn check_fragment_includes(&self, plan: &UnitPlan) -> Result<()> {
        for record in plan.includes.records().filter(|r| r.is_fragment_include) {
            let present = record
                .resolved_fragment
                .is_some_and(|id| plan.bodies.contains(&id) || plan.bootstrap == Some(id));
            if !present {
                let requester = record
                    .origins()
                    .next()
                    .map(|id| self.fragments[id].display_path())
                    .unwrap_or_default();
                return Err(AmalgamError::UnresolvedFragmentInclude {
                    target: record
                        .directive
                        .trim_start_matches("//#include ")
                        .trim_matches('"')
                        .to_string(),
                    fragment: requester,
                });
            }
        }
        Ok(())
    }

    fn declaration_section<F>(&self, text: &mut String, plan: &UnitPlan, records: F)
    where
        F: Fn(&FragmentDeclarations) -> &Vec<DeclarationRecord>,
    {
        for declarations in plan.declarations.iter().rev() {
            let records = records(declarations);
            if records.is_empty() {
                continue;
            }
            let _ = writeln!(
                text,
                "// From {}",
                self.fragments[declarations.fragment].display_path()
            );
            for record in records {
                text.push_str(&record.signature());
                text.push('\n');
            }
            text.push('\n');
        }
    }

    /// A fragment's body: provenance header, include directives removed,
    /// leading blank lines dropped.
    fn body(&self, fragment: &Fragment) -> String {
        let rewrites = include_rewrites(fragment);

        let mut out = format!("\n// From {}\n", fragment.display_path());
        let mut leading = true;
        for (index, line) in fragment.lines().iter().enumerate() {
            let line = match rewrites.get(&index) {
                Some(Some(kept)) => kept.as_str(),
                Some(None) => continue,
                None => line.as_str(),
            };
            if leading && line.trim().is_empty() {
                continue;
            }
            leading = false;
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Physical lines that carry an include directive, mapped to the text left
/// once the directive is cut, or `None` when nothing is left.
///
/// Everything from the directive to the end of the line is cut.
fn include_rewrites(fragment: &Fragment) -> FxHashMap<usize, Option<String>> {
    let mut rewrites = FxHashMap::default();
    for line in Scanner::new(fragment) {
        let Some(at) = line
            .segments
            .iter()
            .position(|s| matches!(s.kind, LineKind::Include(_)))
        else {
            continue;
        };
        let kept: String = line.segments[..at].iter().map(|s| s.text.as_str()).collect();
        let kept = kept.trim_end();
        rewrites.insert(
            line.line,
            (!kept.trim().is_empty()).then(|| kept.to_string()),
        );
        if line.joined {
            rewrites.insert(line.line + 1, None);
        }
    }
    rewrites
}
