//! The amalgamation pipeline: locate, extract, resolve, assemble.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::assemble::{AssembledUnit, Assembler, AssemblyOptions, UnitPlan};
use crate::entry::{self, EntryPoint};
use crate::error::{AmalgamError, Result};
use crate::extract::extract;
use crate::fragment::{Fragment, FragmentId, FragmentSet};
use crate::includes::IncludeResolver;
use crate::scan::ScanPolicy;

/// Everything the pipeline reads.
#[derive(Debug, Default, Clone)]
pub struct AmalgamInput {
    fragments: FragmentSet,
    project: Vec<FragmentId>,
    libraries: Vec<FragmentId>,
    bootstrap: Option<FragmentId>,
    plain_files: Vec<PathBuf>,
}

impl AmalgamInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project fragment. Project fragments are searched for the entry
    /// point in the order they were added.
    pub fn add_fragment(&mut self, fragment: Fragment) -> FragmentId {
        let id = self.fragments.push(fragment);
        self.project.push(id);
        id
    }

    /// Add a fragment that can be included but is never searched for `main`.
    pub fn add_library_fragment(&mut self, fragment: Fragment) -> FragmentId {
        let id = self.fragments.push(fragment);
        self.libraries.push(id);
        id
    }

    pub fn set_bootstrap(&mut self, fragment: Fragment) -> FragmentId {
        let id = self.fragments.push(fragment);
        self.bootstrap = Some(id);
        id
    }

    /// Add a plain `.c/.cpp/.cc` source compiled alongside the unit.
    pub fn add_plain_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.plain_files.contains(&path) {
            self.plain_files.push(path);
        }
    }

    pub fn fragments(&self) -> &FragmentSet {
        &self.fragments
    }

    pub fn project_fragments(&self) -> &[FragmentId] {
        &self.project
    }

    pub fn library_fragments(&self) -> &[FragmentId] {
        &self.libraries
    }

    pub fn bootstrap(&self) -> Option<FragmentId> {
        self.bootstrap
    }

    pub fn plain_files(&self) -> &[PathBuf] {
        &self.plain_files
    }
}

#[derive(Debug, Clone, Default)]
pub struct AmalgamOptions {
    pub scan_policy: ScanPolicy,
    pub assembly: AssemblyOptions,
}

/// Outcome of [`amalgamate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amalgamation {
    /// A unit was generated, rooted at the fragment holding `main`.
    Unit {
        unit: AssembledUnit,
        entry: EntryPoint,
    },
    /// No fragment defines `main`; the plain files are compiled as they are.
    Passthrough { plain_files: Vec<PathBuf> },
}

impl Amalgamation {
    pub fn unit(&self) -> Option<&AssembledUnit> {
        match self {
            Amalgamation::Unit { unit, .. } => Some(unit),
            Amalgamation::Passthrough { .. } => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Amalgamation::Passthrough { .. })
    }
}

/// Run the whole pipeline over `input`.
pub fn amalgamate(input: &AmalgamInput, options: &AmalgamOptions) -> Result<Amalgamation> {
    let start = Instant::now();
    let fragments = &input.fragments;

    let Some(entry) = entry::locate(fragments, &input.project) else {
        if input.plain_files.is_empty() {
            return Err(AmalgamError::NoEntryPointFound);
        }
        info!(
            plain_files = input.plain_files.len(),
            "no entry point in fragments, compiling plain sources directly"
        );
        return Ok(Amalgamation::Passthrough {
            plain_files: input.plain_files.clone(),
        });
    };
    info!(
        fragment = %fragments[entry.fragment].display_path(),
        "amalgamating"
    );

    let plan = plan_unit(input, entry.fragment, options.scan_policy)?;
    let unit = Assembler::new(fragments, &options.assembly).assemble(&plan)?;

    info!(
        fragments = unit.bodies().len(),
        includes = unit.include_count(),
        declarations = unit.declaration_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "amalgamation complete"
    );
    Ok(Amalgamation::Unit { unit, entry })
}

/// Extraction pass: walk the bootstrap and the root fragment, then every
/// fragment reached through a fragment include, once each.
fn plan_unit(input: &AmalgamInput, root: FragmentId, policy: ScanPolicy) -> Result<UnitPlan> {
    let fragments = &input.fragments;
    let mut includes = IncludeResolver::new();
    let mut declarations = Vec::new();
    let mut bodies = Vec::new();

    let mut seen: FxHashSet<FragmentId> = FxHashSet::default();
    let mut queue: VecDeque<FragmentId> = input.bootstrap.into_iter().collect();
    queue.push_back(root);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let is_bootstrap = input.bootstrap == Some(id);
        let found = extract(id, &fragments[id], is_bootstrap, policy)?;

        for include in &found.includes {
            if let Some(target) = includes.record(include, id, fragments)? {
                if !seen.contains(&target) {
                    debug!(
                        from = %fragments[id].display_path(),
                        to = %fragments[target].display_path(),
                        "following fragment include"
                    );
                    queue.push_back(target);
                }
            }
        }

        if !is_bootstrap {
            bodies.push(id);
        }
        declarations.push(found);
    }

    Ok(UnitPlan {
        bootstrap: input.bootstrap,
        bodies,
        includes,
        declarations,
    })
}
