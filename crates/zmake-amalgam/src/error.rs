//! Error types for zmake-amalgam.

use miette::Diagnostic;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for amalgamation operations.
pub type Result<T> = std::result::Result<T, AmalgamError>;

/// Scanner context still open when a fragment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnterminatedContext {
    RawString,
    BlockComment,
}

impl fmt::Display for UnterminatedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnterminatedContext::RawString => f.write_str("a raw string literal"),
            UnterminatedContext::BlockComment => f.write_str("a block comment"),
        }
    }
}

/// Errors that abort an amalgamation. None of them leave output behind.
#[derive(Error, Debug, Diagnostic)]
pub enum AmalgamError {
    /// A fragment could not be read.
    #[error("Couldn't open fragment \"{}\"", .path.display())]
    #[diagnostic(code(zmake::fragment_unreadable))]
    FragmentUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `.z` / `.zpp` include target is not among the known fragments.
    #[error("Couldn't find file \"{target}\" included from {fragment}")]
    #[diagnostic(
        code(zmake::unresolved_include),
        help("fragment includes are resolved by file name against src/ and the configured include paths")
    )]
    UnresolvedFragmentInclude { target: String, fragment: String },

    /// No fragment defines `main` and there is no plain source to fall back to.
    #[error("Couldn't find main function")]
    #[diagnostic(
        code(zmake::no_entry_point),
        help("define `int main()` in a .zpp fragment, or add a plain .c/.cpp file")
    )]
    NoEntryPointFound,

    /// A fragment ended inside a raw string or block comment.
    #[error("Fragment {fragment} ends inside {context}")]
    #[diagnostic(code(zmake::malformed_fragment))]
    MalformedScanState {
        fragment: String,
        context: UnterminatedContext,
    },
}
