// Error values for the rewriter.
//
// Context operations (advance, join, escaper lookup) know nothing about
// source files; they raise a bare `ContextError`. The inference visitor is
// the reporter adapter: it attaches file, line, column, template name, and a
// snippet of the offending command before the error leaves the session.

use std::fmt;

use crate::ast::SourceLocation;

/// Stable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Branches of `{if}`/`{switch}` end in incompatible contexts.
    AmbiguousBranches,
    /// A loop body does not round-trip its context.
    LoopChangesContext,
    /// A literal `/` follows branches with different slash dispositions.
    AmbiguousJsSlash,
    /// A print in a URI whose part cannot be determined.
    AmbiguousUriPart,
    /// Literal text may complete a scheme begun by a dynamic value.
    DangerousUriScheme,
    /// User directives cannot be satisfied in the current context.
    IncompatibleEscapingMode,
    /// Interpolation inside an HTML/CSS/JS comment.
    DirectiveInComment,
    /// A strict block's end context does not match its kind.
    StrictBlockBadEnd,
    /// An autoescape-cancelling directive inside a strict scope.
    StrictForbidsCancellingDirective,
    /// A strict template calling a non-strict one outside `Text`.
    StrictForbidsNonStrictCall,
    /// Caller and callee escaping regimes cannot be combined.
    IncompatibleCallKind,
    /// `{msg}` in a context where translators cannot produce text.
    MessageForbiddenInContext,
    /// An untyped block beginning or ending outside HTML.
    BlockBadEnd,
    /// A block `{let}`/`{param}` without `kind` under strict autoescaping.
    MissingKindInStrict,
    /// `|text` written by a user; it is reserved for the compiler.
    ReservedDirective,
    /// Typed blocks inside a `deprecated-noautoescape` template.
    TypedBlockInNoAutoescape,
}

impl ErrorKind {
    /// The stable code string.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::AmbiguousBranches => "AmbiguousBranches",
            ErrorKind::LoopChangesContext => "LoopChangesContext",
            ErrorKind::AmbiguousJsSlash => "AmbiguousJsSlash",
            ErrorKind::AmbiguousUriPart => "AmbiguousUriPart",
            ErrorKind::DangerousUriScheme => "DangerousUriScheme",
            ErrorKind::IncompatibleEscapingMode => "IncompatibleEscapingMode",
            ErrorKind::DirectiveInComment => "DirectiveInComment",
            ErrorKind::StrictBlockBadEnd => "StrictBlockBadEnd",
            ErrorKind::StrictForbidsCancellingDirective => "StrictForbidsCancellingDirective",
            ErrorKind::StrictForbidsNonStrictCall => "StrictForbidsNonStrictCall",
            ErrorKind::IncompatibleCallKind => "IncompatibleCallKind",
            ErrorKind::MessageForbiddenInContext => "MessageForbiddenInContext",
            ErrorKind::BlockBadEnd => "BlockBadEnd",
            ErrorKind::MissingKindInStrict => "MissingKindInStrict",
            ErrorKind::ReservedDirective => "ReservedDirective",
            ErrorKind::TypedBlockInNoAutoescape => "TypedBlockInNoAutoescape",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure raised by a context operation, before source attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ContextError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> ContextError {
        ContextError {
            kind,
            message: message.into(),
        }
    }
}

/// A fully attributed rewrite failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}:{line}:{col}: in template {template}: {kind}: {message}, near '{snippet}'")]
pub struct RewriteError {
    pub kind: ErrorKind,
    pub template: String,
    pub path: String,
    pub line: u32,
    pub col: u32,
    /// Rendering of the offending command.
    pub snippet: String,
    pub message: String,
}

impl RewriteError {
    /// Attribute a bare context error to a source position.
    pub fn attribute(
        err: ContextError,
        template: &str,
        path: &str,
        loc: SourceLocation,
        snippet: String,
    ) -> RewriteError {
        RewriteError {
            kind: err.kind,
            template: template.to_string(),
            path: path.to_string(),
            line: loc.line,
            col: loc.col,
            snippet,
            message: err.message,
        }
    }

    /// Rethrow an error raised inside a derivative's body at the call site
    /// that forced the derivation. The kind and message survive; the
    /// location becomes the caller's.
    pub fn at_call_site(
        self,
        callee: &str,
        template: &str,
        path: &str,
        loc: SourceLocation,
        snippet: String,
    ) -> RewriteError {
        RewriteError {
            kind: self.kind,
            template: template.to_string(),
            path: path.to_string(),
            line: loc.line,
            col: loc.col,
            snippet,
            message: format!("in callee {}: {}", callee, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_all_fields() {
        let err = RewriteError {
            kind: ErrorKind::StrictBlockBadEnd,
            template: "ns.main".to_string(),
            path: "main.soy".to_string(),
            line: 3,
            col: 14,
            snippet: "{$x}".to_string(),
            message: "ends in (Context JS_SQ_STRING)".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("main.soy:3:14"));
        assert!(text.contains("ns.main"));
        assert!(text.contains("StrictBlockBadEnd"));
        assert!(text.contains("JS_SQ_STRING"));
        assert!(text.contains("{$x}"));
    }

    #[test]
    fn test_call_site_rethrow_keeps_kind() {
        let inner = RewriteError {
            kind: ErrorKind::AmbiguousJsSlash,
            template: "ns.callee__C14".to_string(),
            path: "lib.soy".to_string(),
            line: 9,
            col: 2,
            snippet: "/".to_string(),
            message: "slash is ambiguous".to_string(),
        };
        let outer = inner.at_call_site(
            "ns.callee__C14",
            "ns.caller",
            "main.soy",
            SourceLocation::new(1, 5),
            "{call ns.callee}".to_string(),
        );
        assert_eq!(outer.kind, ErrorKind::AmbiguousJsSlash);
        assert_eq!(outer.template, "ns.caller");
        assert_eq!(outer.line, 1);
        assert!(outer.message.contains("ns.callee__C14"));
    }
}
