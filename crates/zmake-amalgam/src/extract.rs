//! Forward declaration and include extraction.

use smol_str::SmolStr;
use tracing::debug;

use crate::error::Result;
use crate::fragment::{Fragment, FragmentId};
use crate::scan::{IncludeDirective, LineKind, ScanPolicy, Scanner};

/// Name of the program entry point, never forward declared.
pub const ENTRY_POINT: &str = "main";

/// Words that are a complete type on their own, so a trailing one is not a
/// parameter name.
const TYPE_WORDS: &[&str] = &[
    "auto", "bool", "char", "char8_t", "char16_t", "char32_t", "double", "float", "int", "long",
    "short", "signed", "size_t", "unsigned", "wchar_t",
];

/// Words that qualify a type but never complete one.
const QUALIFIER_WORDS: &[&str] = &[
    "const", "volatile", "struct", "class", "union", "enum", "typename",
];

/// A declaration that gets a forward declaration in the generated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationRecord {
    Struct {
        keyword: SmolStr,
        name: SmolStr,
        source: FragmentId,
    },
    Function {
        /// Parameters of the preceding `template <...>` line.
        template: Option<String>,
        return_type: String,
        name: SmolStr,
        /// Parameter list with default arguments removed.
        params: String,
        source: FragmentId,
    },
}

impl DeclarationRecord {
    pub fn name(&self) -> &str {
        match self {
            DeclarationRecord::Struct { name, .. } | DeclarationRecord::Function { name, .. } => name,
        }
    }

    pub fn source(&self) -> FragmentId {
        match self {
            DeclarationRecord::Struct { source, .. }
            | DeclarationRecord::Function { source, .. } => *source,
        }
    }

    /// The forward declaration as emitted.
    pub fn signature(&self) -> String {
        match self {
            DeclarationRecord::Struct { keyword, name, .. } => format!("{} {};", keyword, name),
            DeclarationRecord::Function {
                template,
                return_type,
                name,
                params,
                ..
            } => {
                let prefix = template
                    .as_ref()
                    .map(|t| format!("template <{}>\n", t))
                    .unwrap_or_default();
                format!("{}{}{}({});", prefix, return_type, name, params)
            }
        }
    }
}

/// Everything one fragment contributes to the generated unit's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDeclarations {
    pub fragment: FragmentId,
    /// Includes in source order, duplicates kept.
    pub includes: Vec<IncludeDirective>,
    pub structs: Vec<DeclarationRecord>,
    pub functions: Vec<DeclarationRecord>,
}

impl FragmentDeclarations {
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.structs.is_empty() && self.functions.is_empty()
    }
}

/// Pull includes and forward declarations out of one fragment.
///
/// For the bootstrap fragment only includes are collected; its code is
/// inlined once and never forward declared.
pub fn extract(
    id: FragmentId,
    fragment: &Fragment,
    bootstrap: bool,
    policy: ScanPolicy,
) -> Result<FragmentDeclarations> {
    let mut out = FragmentDeclarations {
        fragment: id,
        includes: Vec::new(),
        structs: Vec::new(),
        functions: Vec::new(),
    };

    let mut scanner = Scanner::new(fragment);
    for line in scanner.by_ref() {
        for segment in line.segments {
            match segment.kind {
                LineKind::Include(include) => out.includes.push(include),
                LineKind::Struct(opener) if !bootstrap => {
                    out.structs.push(DeclarationRecord::Struct {
                        keyword: opener.keyword,
                        name: opener.name,
                        source: id,
                    });
                }
                LineKind::Function(opener) if !bootstrap && opener.name != ENTRY_POINT => {
                    out.functions.push(DeclarationRecord::Function {
                        template: opener.template,
                        return_type: opener.return_type,
                        params: strip_default_arguments(&opener.params),
                        name: opener.name,
                        source: id,
                    });
                }
                _ => {}
            }
        }
    }
    policy.check(fragment, &scanner.finish())?;

    debug!(
        fragment = %fragment.display_path(),
        includes = out.includes.len(),
        structs = out.structs.len(),
        functions = out.functions.len(),
        "extracted declarations"
    );
    Ok(out)
}

/// Reduce every parameter that has a default value to its type.
///
/// `int x = 1, int y = 2` becomes `int, int`. Parameters without a default
/// are kept as written.
pub fn strip_default_arguments(params: &str) -> String {
    if !params.contains('=') {
        return params.to_string();
    }

    split_parameters(params)
        .into_iter()
        .map(|param| match param.split_once('=') {
            Some((declarator, _default)) => parameter_type(declarator),
            None => param.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a parameter list on top-level commas.
///
/// Angle brackets only nest before a parameter's `=`; after it they are
/// comparison operators of the default expression.
fn split_parameters(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut angle = 0usize;
    let mut in_default = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in params.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '<' if !in_default => angle += 1,
            '>' if !in_default => angle = angle.saturating_sub(1),
            '=' if depth == 0 && angle == 0 => in_default = true,
            ',' if depth == 0 && angle == 0 => {
                parts.push(&params[start..i]);
                start = i + 1;
                in_default = false;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

/// Drop the parameter name from a declarator such as `const Foo& foo`.
fn parameter_type(declarator: &str) -> String {
    let declarator = declarator.trim();
    let type_end = declarator
        .trim_end_matches(|c: char| c.is_ascii_alphanumeric() || c == '_')
        .len();
    let (ty, name) = declarator.split_at(type_end);
    let ty = ty.trim_end();

    let unnamed = name.is_empty()
        || ty.is_empty()
        || ty.ends_with("::")
        || ty.split_whitespace().all(|w| QUALIFIER_WORDS.contains(&w))
        || name.starts_with(|c: char| c.is_ascii_digit())
        || TYPE_WORDS.contains(&name);
    if unnamed {
        declarator.to_string()
    } else {
        ty.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentSet;

    fn extract_source(source: &str, bootstrap: bool) -> FragmentDeclarations {
        let mut set = FragmentSet::new();
        let id = set.push(Fragment::from_source("src/test.zpp", source));
        extract(id, &set[id], bootstrap, ScanPolicy::Deny).unwrap()
    }

    fn signatures(records: &[DeclarationRecord]) -> Vec<String> {
        records.iter().map(DeclarationRecord::signature).collect()
    }

    #[test]
    fn test_default_arguments_are_stripped() {
        let decls = extract_source("void f(int x = 1, int y = 2) {\n}\n", false);
        assert_eq!(signatures(&decls.functions), vec!["void f(int, int);"]);
    }

    #[test]
    fn test_parameters_without_defaults_are_kept() {
        assert_eq!(strip_default_arguments("int a, int b"), "int a, int b");
        assert_eq!(strip_default_arguments(""), "");
        assert_eq!(
            strip_default_arguments("int a, const std::string& s = \"a,b\""),
            "int a, const std::string&"
        );
    }

    #[test]
    fn test_default_arguments_with_nested_commas() {
        assert_eq!(
            strip_default_arguments("std::map<int, int> m = {}, int n = max(1, 2)"),
            "std::map<int, int>, int"
        );
        assert_eq!(
            strip_default_arguments("bool b = a < c, int* p = nullptr"),
            "bool, int*"
        );
    }

    #[test]
    fn test_unnamed_defaulted_parameter_keeps_type() {
        assert_eq!(strip_default_arguments("unsigned int = 5"), "unsigned int");
        assert_eq!(strip_default_arguments("std::size_t = 0"), "std::size_t");
        assert_eq!(strip_default_arguments("const Foo = Foo()"), "const Foo");
        assert_eq!(
            strip_default_arguments("struct Options = {}, const volatile Flags = {}"),
            "struct Options, const volatile Flags"
        );
        assert_eq!(strip_default_arguments("const Foo foo = Foo()"), "const Foo");
        assert_eq!(strip_default_arguments("unsigned count = 5"), "unsigned");
    }

    #[test]
    fn test_struct_and_function_records() {
        let source = "struct Point {\n    int x;\n};\n\nunion Bits {\n};\n\nint add(int a, int b) {\n    return a + b;\n}\n";
        let decls = extract_source(source, false);
        assert_eq!(
            signatures(&decls.structs),
            vec!["struct Point;", "union Bits;"]
        );
        assert_eq!(signatures(&decls.functions), vec!["int add(int a, int b);"]);
    }

    #[test]
    fn test_main_is_never_forward_declared() {
        let decls = extract_source("int main() {\n    return 0;\n}\n", false);
        assert!(decls.functions.is_empty());
    }

    #[test]
    fn test_template_function_signature() {
        let decls = extract_source("template <typename T>\nT twice(T x) {\n    return x + x;\n}\n", false);
        assert_eq!(
            signatures(&decls.functions),
            vec!["template <typename T>\nT twice(T x);"]
        );
    }

    #[test]
    fn test_bootstrap_only_contributes_includes() {
        let source = "#include <string>\nstruct Hidden {\n};\nstatic int helper() {\n    return 1;\n}\n";
        let decls = extract_source(source, true);
        assert_eq!(decls.includes.len(), 1);
        assert!(decls.structs.is_empty());
        assert!(decls.functions.is_empty());
    }

    #[test]
    fn test_include_after_closed_comment_is_collected() {
        let decls = extract_source("/* helpers */#include \"b.zpp\"\n#include <vector>\n", false);
        let targets: Vec<_> = decls.includes.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["\"b.zpp\"", "<vector>"]);
    }

    #[test]
    fn test_includes_keep_source_order() {
        let decls = extract_source("#include <vector>\n#include \"util.zpp\"\n#include <vector>\n", false);
        let targets: Vec<_> = decls.includes.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["<vector>", "\"util.zpp\"", "<vector>"]);
    }
}
