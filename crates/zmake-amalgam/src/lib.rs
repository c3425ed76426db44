//! Fragment amalgamation for zmake.
//!
//! A zmake project is a set of C++ fragments (`.z` / `.zpp` files) written
//! without headers. This crate merges them into a single translation unit:
//!
//! - every fragment is classified line by line ([`Scanner`]), tracking raw
//!   string literals and block comments across lines
//! - struct, class, union and function openers become forward declarations
//! - includes are merged into one list that records which fragments asked
//!   for each of them
//! - `#include "other.zpp"` pulls the other fragment's body into the unit
//!   and is emitted commented out
//!
//! # Example
//!
//! ```
//! use zmake_amalgam::{amalgamate, AmalgamInput, AmalgamOptions, Fragment};
//!
//! let mut input = AmalgamInput::new();
//! input.add_fragment(Fragment::from_source(
//!     "src/main.zpp",
//!     "#include \"hello.zpp\"\nint main() {\n    hello();\n}\n",
//! ));
//! input.add_fragment(Fragment::from_source(
//!     "src/hello.zpp",
//!     "#include <cstdio>\nvoid hello() {\n    std::puts(\"hi\");\n}\n",
//! ));
//!
//! let result = amalgamate(&input, &AmalgamOptions::default()).unwrap();
//! let text = result.unit().unwrap().text();
//! assert!(text.contains("//#include \"hello.zpp\""));
//! assert!(text.contains("void hello();"));
//! ```

mod assemble;
mod entry;
mod error;
mod extract;
mod fragment;
mod includes;
mod pipeline;
mod scan;

pub use assemble::{AssembledUnit, Assembler, AssemblyOptions, UnitPlan, TOOL_VERSION};
pub use entry::{discovery_order, is_entry_point, locate, EntryPoint};
pub use error::{AmalgamError, Result, UnterminatedContext};
pub use extract::{
    extract, strip_default_arguments, DeclarationRecord, FragmentDeclarations, ENTRY_POINT,
};
pub use fragment::{is_fragment_target, Fragment, FragmentId, FragmentSet, SourceKind};
pub use includes::{IncludeRecord, IncludeResolver};
pub use pipeline::{amalgamate, AmalgamInput, AmalgamOptions, Amalgamation};
pub use scan::{
    classify, FunctionOpener, IncludeDirective, LineKind, LogicalLine, ScanPolicy, ScanState,
    Scanner, Segment, Step, StructOpener,
};
