// contextual-autoescape — contextual autoescaping for HTML templates using
// AST-to-AST rewriting.
//
// Architecture:
//   parsed template set → sanity pre-pass → context inference → annotated set
//
// Inference threads a lexical context (HTML, attribute, URI, CSS, JS
// sub-grammars) through every template body, inserts the escaping directives
// each interpolation needs to be safe against cross-site scripting, and
// specializes callees per calling context by cloning them into derivative
// templates (`foo__C14`).
//
// Reference implementation: the Closure Templates contextual autoescaper.

pub mod ast;
pub mod catalogue;
pub mod context;
mod error;
mod escaping;
mod infer;
mod raw_text;
mod sanity;

pub use catalogue::{DirectiveCatalogue, DirectiveInfo};
pub use context::{
    AttrKind, ContentKind, Context, Delim, ElementKind, JsSlash, State, UriPart,
};
pub use error::{ErrorKind, RewriteError};
pub use escaping::EscapingMode;

/// Rewrite a template set with the standard directive catalogue.
///
/// Every strict and contextual template is inferred; print and call nodes
/// gain their escaping directives, call targets are retargeted to derivative
/// templates where the calling context demands it, and the derivatives are
/// appended to the set.
///
/// On failure the set retains annotations for the templates that inferred
/// cleanly and every accumulated error is returned.
pub fn rewrite(file_set: &mut ast::FileSet) -> Result<(), Vec<RewriteError>> {
    rewrite_with(file_set, &DirectiveCatalogue::standard())
}

/// Rewrite a template set against a caller-supplied directive catalogue.
pub fn rewrite_with(
    file_set: &mut ast::FileSet,
    catalogue: &DirectiveCatalogue,
) -> Result<(), Vec<RewriteError>> {
    infer::run(file_set, catalogue)
}
