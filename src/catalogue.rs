// Print-directive catalogue — the rewriter's view of the directive plugins.
//
// Only three traits of a directive are consumed: its name, whether it cancels
// autoescaping, and the content kind of its output (if it declares one).
// Everything else about directives (argument handling, runtime behavior) is
// downstream of rewriting and invisible here.

use indexmap::IndexMap;

use crate::context::ContentKind;

/// The traits of one registered print directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveInfo {
    pub name: String,
    /// Opts the print out of the insertion pipeline (`|noAutoescape` and
    /// custom escaping directives). Forbidden under strict autoescaping.
    pub cancels_autoescape: bool,
    /// Declared kind of the directive's output, for directives that wrap
    /// their input in known-safe content (`|bidiSpanWrap` produces HTML).
    pub output_kind: Option<ContentKind>,
}

/// The set of directives known to a rewrite session.
#[derive(Debug, Clone, Default)]
pub struct DirectiveCatalogue {
    directives: IndexMap<String, DirectiveInfo>,
}

impl DirectiveCatalogue {
    /// An empty catalogue. Unregistered directives are treated as plain:
    /// non-cancelling, no declared output kind.
    pub fn new() -> DirectiveCatalogue {
        DirectiveCatalogue::default()
    }

    /// A catalogue preloaded with the standard directive set.
    pub fn standard() -> DirectiveCatalogue {
        let mut cat = DirectiveCatalogue::new();
        // The escaping directives the rewriter itself inserts. Registered so
        // user-written copies reconcile instead of doubling up.
        for name in [
            "escapeHtml",
            "escapeHtmlRcdata",
            "escapeHtmlAttribute",
            "escapeHtmlAttributeNospace",
            "filterHtmlAttributes",
            "filterHtmlElementName",
            "escapeJsString",
            "escapeJsValue",
            "escapeJsRegex",
            "escapeCssString",
            "filterCssValue",
            "escapeUri",
            "normalizeUri",
            "filterNormalizeUri",
        ] {
            cat.register(name, false, None);
        }
        // escapeHtml output is safe HTML; printing it in an HTML context
        // needs no further escaping.
        cat.directives.get_mut("escapeHtml").unwrap().output_kind = Some(ContentKind::Html);
        // Reserved for compiler-synthesized positions; the sanity pass
        // rejects user-written occurrences.
        cat.register("text", false, Some(ContentKind::Text));
        // Cancelling directives.
        cat.register("noAutoescape", true, None);
        // Bidi/text-shaping directives that wrap already-safe HTML.
        cat.register("bidiSpanWrap", false, Some(ContentKind::Html));
        cat.register("changeNewlineToBr", false, Some(ContentKind::Html));
        // Plain value-shaping directives.
        cat.register("bidiUnicodeWrap", false, None);
        cat.register("insertWordBreaks", false, None);
        cat.register("truncate", false, None);
        cat.register("id", false, None);
        cat
    }

    /// Register or replace a directive.
    pub fn register(&mut self, name: &str, cancels_autoescape: bool, output_kind: Option<ContentKind>) {
        self.directives.insert(
            name.to_string(),
            DirectiveInfo {
                name: name.to_string(),
                cancels_autoescape,
                output_kind,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&DirectiveInfo> {
        self.directives.get(name)
    }

    /// Whether a directive opts out of autoescaping. Unknown directives do
    /// not.
    pub fn cancels_autoescape(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.cancels_autoescape)
    }

    /// The declared output kind of a directive, if any.
    pub fn output_kind(&self, name: &str) -> Option<ContentKind> {
        self.get(name).and_then(|d| d.output_kind)
    }
}
