// Lexical context values — the state of the output stream at a point in a
// template.
//
// A context is a tuple of independent enum fields; two contexts are equal iff
// every field matches. Contexts advance over literal text (raw_text.rs) and
// join across control-flow branches. The packed integer form names derivative
// templates (`foo__C14`), so field layout and discriminants are part of the
// crate's observable output and must stay stable.

use std::fmt;

/// Lexer state. The low 5 bits of the packed context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum State {
    /// Normal HTML character data.
    HtmlPcdata = 0,
    /// Raw text element body (`<textarea>`, `<title>`, …); element kind says
    /// which end tag leaves it.
    HtmlRcdata = 1,
    /// Immediately after `<` or `</`, before any tag name character.
    HtmlBeforeTagName = 2,
    /// Inside a tag name.
    HtmlTagName = 3,
    /// Inside a tag, between attributes.
    HtmlTag = 4,
    /// Inside an attribute name.
    HtmlAttrName = 5,
    /// After `=`, before the first attribute value character.
    HtmlBeforeAttrValue = 6,
    /// Inside an HTML comment.
    HtmlComment = 7,
    /// Inside a non-embedded-language attribute value.
    HtmlNormalAttrValue = 8,
    /// CSS content outside strings, URIs, and comments.
    Css = 9,
    CssComment = 10,
    CssDqString = 11,
    CssSqString = 12,
    /// Unquoted `url(...)` content.
    CssUri = 13,
    CssDqUri = 14,
    CssSqUri = 15,
    /// JS content outside strings, regexes, and comments.
    Js = 16,
    JsLineComment = 17,
    JsBlockComment = 18,
    JsDqString = 19,
    JsSqString = 20,
    /// Inside a JS regular expression literal.
    JsRegex = 21,
    /// Inside a URI (attribute value or `kind="uri"` body).
    Uri = 22,
    /// Plain text output, no escaping grammar at all.
    Text = 23,
}

impl State {
    /// Whether this state is an HTML/CSS/JS comment. Prints and calls are
    /// forbidden inside comments.
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            State::HtmlComment | State::CssComment | State::JsLineComment | State::JsBlockComment
        )
    }

    /// Whether this state lexes JS source.
    pub fn is_js(self) -> bool {
        matches!(
            self,
            State::Js
                | State::JsLineComment
                | State::JsBlockComment
                | State::JsDqString
                | State::JsSqString
                | State::JsRegex
        )
    }

    /// Whether this state lexes CSS source.
    pub fn is_css(self) -> bool {
        matches!(
            self,
            State::Css
                | State::CssComment
                | State::CssDqString
                | State::CssSqString
                | State::CssUri
                | State::CssDqUri
                | State::CssSqUri
        )
    }

    /// Whether this state tracks a `UriPart`.
    pub fn is_uri(self) -> bool {
        matches!(
            self,
            State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri
        )
    }

    /// Whether this state is inside an attribute value (the delimiter field
    /// says how the value ends).
    pub fn is_attr_value(self) -> bool {
        self == State::HtmlNormalAttrValue || self.is_js() || self.is_css() || self == State::Uri
    }

    fn name(self) -> &'static str {
        match self {
            State::HtmlPcdata => "HTML_PCDATA",
            State::HtmlRcdata => "HTML_RCDATA",
            State::HtmlBeforeTagName => "HTML_BEFORE_TAG_NAME",
            State::HtmlTagName => "HTML_TAG_NAME",
            State::HtmlTag => "HTML_TAG",
            State::HtmlAttrName => "HTML_ATTRIBUTE_NAME",
            State::HtmlBeforeAttrValue => "HTML_BEFORE_ATTRIBUTE_VALUE",
            State::HtmlComment => "HTML_COMMENT",
            State::HtmlNormalAttrValue => "HTML_NORMAL_ATTR_VALUE",
            State::Css => "CSS",
            State::CssComment => "CSS_COMMENT",
            State::CssDqString => "CSS_DQ_STRING",
            State::CssSqString => "CSS_SQ_STRING",
            State::CssUri => "CSS_URI",
            State::CssDqUri => "CSS_DQ_URI",
            State::CssSqUri => "CSS_SQ_URI",
            State::Js => "JS",
            State::JsLineComment => "JS_LINE_COMMENT",
            State::JsBlockComment => "JS_BLOCK_COMMENT",
            State::JsDqString => "JS_DQ_STRING",
            State::JsSqString => "JS_SQ_STRING",
            State::JsRegex => "JS_REGEX",
            State::Uri => "URI",
            State::Text => "TEXT",
        }
    }
}

/// Kind of the innermost open element, when it matters for lexing.
///
/// `Normal` doubles as "no element" — raw-text element bodies that do not
/// need the element to find their end tag (script → JS, style → CSS) drop
/// back to `Normal` on entry, which keeps packed values small and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ElementKind {
    #[default]
    Normal = 0,
    Script = 1,
    Style = 2,
    Textarea = 3,
    Title = 4,
    Listing = 5,
    Xmp = 6,
    /// Void elements (`<br>`, `<img>`, …) have no body.
    Void = 7,
}

impl ElementKind {
    /// Classify a tag name. Unknown names are `Normal`.
    pub fn for_tag_name(name: &str) -> ElementKind {
        // Tag names are case-insensitive in HTML.
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "script" => ElementKind::Script,
            "style" => ElementKind::Style,
            "textarea" => ElementKind::Textarea,
            "title" => ElementKind::Title,
            "listing" => ElementKind::Listing,
            "xmp" => ElementKind::Xmp,
            "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link"
            | "meta" | "param" | "source" | "track" | "wbr" => ElementKind::Void,
            _ => ElementKind::Normal,
        }
    }

    /// The end tag that leaves this element's raw-text body, if any.
    pub fn end_tag(self) -> Option<&'static str> {
        match self {
            ElementKind::Textarea => Some("textarea"),
            ElementKind::Title => Some("title"),
            ElementKind::Listing => Some("listing"),
            ElementKind::Xmp => Some("xmp"),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ElementKind::Normal => "NORMAL",
            ElementKind::Script => "SCRIPT",
            ElementKind::Style => "STYLE",
            ElementKind::Textarea => "TEXTAREA",
            ElementKind::Title => "TITLE",
            ElementKind::Listing => "LISTING",
            ElementKind::Xmp => "XMP",
            ElementKind::Void => "VOID",
        }
    }
}

/// Kind of the attribute whose name or value the context is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum AttrKind {
    /// Not in an attribute.
    #[default]
    None = 0,
    /// Event handlers (`on*`) — value is JS.
    Script = 1,
    /// `style` — value is CSS.
    Style = 2,
    /// URL-valued attributes (`href`, `src`, …).
    Uri = 3,
    /// Everything else — value is plain text.
    Plaintext = 4,
    /// `http-equiv` — value can redefine document semantics.
    Meta = 5,
}

impl AttrKind {
    /// Classify an attribute name.
    pub fn for_attr_name(name: &str) -> AttrKind {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("on") && lower.len() > 2 {
            return AttrKind::Script;
        }
        match lower.as_str() {
            "style" => AttrKind::Style,
            "http-equiv" => AttrKind::Meta,
            "action" | "archive" | "background" | "cite" | "classid" | "codebase" | "data"
            | "formaction" | "href" | "icon" | "longdesc" | "manifest" | "poster" | "src"
            | "srcset" | "usemap" | "xml:base" => AttrKind::Uri,
            // data-foo-url, data-src and friends still carry URLs.
            _ if lower.ends_with("src") || lower.ends_with("href") || lower.ends_with("url") => {
                AttrKind::Uri
            }
            _ => AttrKind::Plaintext,
        }
    }

    fn name(self) -> &'static str {
        match self {
            AttrKind::None => "NONE",
            AttrKind::Script => "SCRIPT",
            AttrKind::Style => "STYLE",
            AttrKind::Uri => "URI",
            AttrKind::Plaintext => "PLAIN_TEXT",
            AttrKind::Meta => "META",
        }
    }
}

/// How the current attribute value ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Delim {
    /// Not in an attribute value.
    #[default]
    None = 0,
    DoubleQuote = 1,
    SingleQuote = 2,
    /// Unquoted value — ends at whitespace or `>`.
    SpaceOrTagEnd = 3,
}

impl Delim {
    fn name(self) -> &'static str {
        match self {
            Delim::None => "NONE",
            Delim::DoubleQuote => "DOUBLE_QUOTE",
            Delim::SingleQuote => "SINGLE_QUOTE",
            Delim::SpaceOrTagEnd => "SPACE_OR_TAG_END",
        }
    }
}

/// What the next `/` in JS source would mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum JsSlash {
    /// Not in JS.
    #[default]
    None = 0,
    /// A `/` starts a RegExp literal.
    Regex = 1,
    /// A `/` is the division operator.
    DivOp = 2,
    /// Branches disagreed; a bare `/` is an error until re-narrowed.
    Unknown = 3,
}

impl JsSlash {
    fn name(self) -> &'static str {
        match self {
            JsSlash::None => "NONE",
            JsSlash::Regex => "REGEX",
            JsSlash::DivOp => "DIV_OP",
            JsSlash::Unknown => "UNKNOWN",
        }
    }
}

/// Which part of a URI the context is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum UriPart {
    /// Not in a URI.
    #[default]
    None = 0,
    /// Nothing emitted yet.
    Start = 1,
    /// Scheme/authority/path — before any `?` or `#`.
    PreQuery = 2,
    Query = 3,
    Fragment = 4,
    /// Somewhere before the fragment, exact part unknown (join widening).
    UnknownPreFragment = 5,
    /// Could be anywhere, including past `#` (join widening).
    Unknown = 6,
    /// A dynamic value started the URI; it may have begun a scheme.
    MaybeVariableScheme = 7,
    /// Literal scheme characters followed a dynamic start.
    MaybeSchemePart = 8,
}

impl UriPart {
    /// Whether the part is known to be before any `#`.
    fn is_pre_fragment(self) -> bool {
        matches!(
            self,
            UriPart::Start
                | UriPart::PreQuery
                | UriPart::Query
                | UriPart::UnknownPreFragment
                | UriPart::MaybeVariableScheme
                | UriPart::MaybeSchemePart
        )
    }

    fn name(self) -> &'static str {
        match self {
            UriPart::None => "NONE",
            UriPart::Start => "START",
            UriPart::PreQuery => "PRE_QUERY",
            UriPart::Query => "QUERY",
            UriPart::Fragment => "FRAGMENT",
            UriPart::UnknownPreFragment => "UNKNOWN_PRE_FRAGMENT",
            UriPart::Unknown => "UNKNOWN",
            UriPart::MaybeVariableScheme => "MAYBE_VARIABLE_SCHEME",
            UriPart::MaybeSchemePart => "MAYBE_SCHEME_PART",
        }
    }
}

/// Content kind of a strict template or typed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Js,
    Uri,
    Attributes,
    Css,
    Text,
}

impl ContentKind {
    /// Parse a `kind="…"` attribute value.
    pub fn parse(s: &str) -> Option<ContentKind> {
        match s {
            "html" => Some(ContentKind::Html),
            "js" => Some(ContentKind::Js),
            "uri" => Some(ContentKind::Uri),
            "attributes" => Some(ContentKind::Attributes),
            "css" => Some(ContentKind::Css),
            "text" => Some(ContentKind::Text),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Js => "js",
            ContentKind::Uri => "uri",
            ContentKind::Attributes => "attributes",
            ContentKind::Css => "css",
            ContentKind::Text => "text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A point in the output stream's lexical grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context {
    pub state: State,
    pub element: ElementKind,
    pub attr: AttrKind,
    pub delim: Delim,
    pub slash: JsSlash,
    pub uri_part: UriPart,
}

impl Default for Context {
    fn default() -> Self {
        Context::pcdata()
    }
}

impl Context {
    /// The default HTML PCDATA context.
    pub const fn pcdata() -> Context {
        Context {
            state: State::HtmlPcdata,
            element: ElementKind::Normal,
            attr: AttrKind::None,
            delim: Delim::None,
            slash: JsSlash::None,
            uri_part: UriPart::None,
        }
    }

    /// Replace the state, keeping every other field.
    pub fn with_state(self, state: State) -> Context {
        Context { state, ..self }
    }

    /// The canonical start context for a content kind (§6 table).
    pub fn start_for(kind: ContentKind) -> Context {
        let base = Context::pcdata();
        match kind {
            ContentKind::Html => base,
            ContentKind::Js => Context {
                state: State::Js,
                slash: JsSlash::Regex,
                ..base
            },
            ContentKind::Uri => Context {
                state: State::Uri,
                uri_part: UriPart::Start,
                ..base
            },
            ContentKind::Attributes => Context {
                state: State::HtmlTag,
                ..base
            },
            ContentKind::Css => Context {
                state: State::Css,
                ..base
            },
            ContentKind::Text => Context {
                state: State::Text,
                ..base
            },
        }
    }

    /// Loose compatibility check for a strict callee's kind at a call site.
    /// A `kind="uri"` callee is acceptable in any URI state regardless of the
    /// current `UriPart`; other kinds only have to match on state family.
    pub fn is_valid_start_for(self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Html => self.state == State::HtmlPcdata,
            ContentKind::Js => self.state == State::Js,
            ContentKind::Uri => self.state.is_uri(),
            ContentKind::Attributes => self.state == State::HtmlTag,
            ContentKind::Css => self.state == State::Css,
            ContentKind::Text => self.state == State::Text,
        }
    }

    /// Exact terminal check for a strict template or typed block (§6 table).
    pub fn is_valid_end_for(self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Html => self == Context::pcdata(),
            // Any slash disposition is a safe place to stop emitting JS.
            ContentKind::Js => {
                self.state == State::Js && self.delim == Delim::None && self.attr == AttrKind::None
            }
            // A URI block must have emitted something (START would allow an
            // empty href, which a caller could complete into anything).
            ContentKind::Uri => {
                self.state == State::Uri
                    && self.delim == Delim::None
                    && !matches!(self.uri_part, UriPart::None | UriPart::Start)
            }
            // Must not stop mid-attribute, and the last attribute must not be
            // unquoted (those end in HtmlNormalAttrValue, not HtmlTag).
            ContentKind::Attributes => {
                self.state == State::HtmlTag && self.element == ElementKind::Normal
            }
            ContentKind::Css => self.state == State::Css && self.delim == Delim::None,
            ContentKind::Text => self.state == State::Text,
        }
    }

    /// Pack the context into its canonical integer form. Stable across runs;
    /// the hex rendering names derivative templates.
    pub fn packed(self) -> u32 {
        let mut bits = self.uri_part as u32;
        bits = (bits << 2) | self.slash as u32;
        bits = (bits << 2) | self.delim as u32;
        bits = (bits << 3) | self.attr as u32;
        bits = (bits << 3) | self.element as u32;
        bits = (bits << 5) | self.state as u32;
        bits
    }

    /// The `__C<hex>` suffix for a derivative inferred at this start context.
    pub fn derived_suffix(self) -> String {
        format!("__C{:x}", self.packed())
    }

    /// Join the contexts of two control-flow branches. Fields either match or
    /// have a defined widening; anything else is unjoinable.
    pub fn join(a: Context, b: Context) -> Option<Context> {
        if a == b {
            return Some(a);
        }
        if a.state != b.state || a.element != b.element || a.attr != b.attr || a.delim != b.delim {
            return None;
        }
        let slash = if a.slash == b.slash {
            a.slash
        } else {
            JsSlash::Unknown
        };
        let uri_part = if a.uri_part == b.uri_part {
            a.uri_part
        } else if a.uri_part.is_pre_fragment() && b.uri_part.is_pre_fragment() {
            UriPart::UnknownPreFragment
        } else {
            UriPart::Unknown
        };
        Some(Context {
            slash,
            uri_part,
            ..a
        })
    }
}

impl fmt::Display for Context {
    /// Renders like `(Context JS_SQ_STRING)` with non-default fields appended,
    /// e.g. `(Context URI START)`. Error messages embed this form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Context {}", self.state.name())?;
        if self.element != ElementKind::Normal {
            write!(f, " {}", self.element.name())?;
        }
        if self.attr != AttrKind::None {
            write!(f, " {}", self.attr.name())?;
        }
        if self.delim != Delim::None {
            write!(f, " {}", self.delim.name())?;
        }
        if self.slash != JsSlash::None {
            write!(f, " {}", self.slash.name())?;
        }
        if self.uri_part != UriPart::None {
            write!(f, " {}", self.uri_part.name())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcdata_packs_to_zero() {
        assert_eq!(Context::pcdata().packed(), 0);
    }

    #[test]
    fn test_js_sq_string_packs_to_0x14() {
        let ctx = Context::pcdata().with_state(State::JsSqString);
        assert_eq!(ctx.packed(), 0x14);
        assert_eq!(ctx.derived_suffix(), "__C14");
    }

    #[test]
    fn test_packing_is_injective_on_fields() {
        let a = Context {
            state: State::Uri,
            attr: AttrKind::Uri,
            delim: Delim::DoubleQuote,
            uri_part: UriPart::Start,
            ..Context::pcdata()
        };
        let b = Context {
            uri_part: UriPart::PreQuery,
            ..a
        };
        assert_ne!(a.packed(), b.packed());
    }

    #[test]
    fn test_join_equal_contexts() {
        let ctx = Context::start_for(ContentKind::Js);
        assert_eq!(Context::join(ctx, ctx), Some(ctx));
    }

    #[test]
    fn test_join_widens_slash() {
        let a = Context {
            slash: JsSlash::Regex,
            ..Context::pcdata().with_state(State::Js)
        };
        let b = Context {
            slash: JsSlash::DivOp,
            ..a
        };
        let joined = Context::join(a, b).unwrap();
        assert_eq!(joined.slash, JsSlash::Unknown);
    }

    #[test]
    fn test_join_widens_uri_part_pre_fragment() {
        let base = Context {
            state: State::Uri,
            attr: AttrKind::Uri,
            delim: Delim::SingleQuote,
            ..Context::pcdata()
        };
        let a = Context {
            uri_part: UriPart::PreQuery,
            ..base
        };
        let b = Context {
            uri_part: UriPart::Query,
            ..base
        };
        let joined = Context::join(a, b).unwrap();
        assert_eq!(joined.uri_part, UriPart::UnknownPreFragment);

        let c = Context {
            uri_part: UriPart::Fragment,
            ..base
        };
        assert_eq!(Context::join(a, c).unwrap().uri_part, UriPart::Unknown);
    }

    #[test]
    fn test_join_rejects_different_states() {
        let a = Context::pcdata();
        let b = Context::pcdata().with_state(State::HtmlComment);
        assert_eq!(Context::join(a, b), None);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ContentKind::Html,
            ContentKind::Js,
            ContentKind::Uri,
            ContentKind::Attributes,
            ContentKind::Css,
            ContentKind::Text,
        ] {
            let start = Context::start_for(kind);
            assert!(start.is_valid_start_for(kind), "{kind}");
        }
        // URI is the one kind whose start is not a valid end.
        assert!(!Context::start_for(ContentKind::Uri).is_valid_end_for(ContentKind::Uri));
        assert!(Context::start_for(ContentKind::Html).is_valid_end_for(ContentKind::Html));
    }

    #[test]
    fn test_attr_classification() {
        assert_eq!(AttrKind::for_attr_name("href"), AttrKind::Uri);
        assert_eq!(AttrKind::for_attr_name("SRC"), AttrKind::Uri);
        assert_eq!(AttrKind::for_attr_name("data-frame-src"), AttrKind::Uri);
        assert_eq!(AttrKind::for_attr_name("onclick"), AttrKind::Script);
        assert_eq!(AttrKind::for_attr_name("style"), AttrKind::Style);
        assert_eq!(AttrKind::for_attr_name("http-equiv"), AttrKind::Meta);
        assert_eq!(AttrKind::for_attr_name("title"), AttrKind::Plaintext);
    }

    #[test]
    fn test_element_classification() {
        assert_eq!(ElementKind::for_tag_name("script"), ElementKind::Script);
        assert_eq!(ElementKind::for_tag_name("SCRIPT"), ElementKind::Script);
        assert_eq!(ElementKind::for_tag_name("br"), ElementKind::Void);
        assert_eq!(ElementKind::for_tag_name("div"), ElementKind::Normal);
    }

    #[test]
    fn test_display_names_match_error_format() {
        let ctx = Context::pcdata().with_state(State::JsSqString);
        assert_eq!(ctx.to_string(), "(Context JS_SQ_STRING)");
        let uri = Context {
            state: State::Uri,
            uri_part: UriPart::Start,
            ..Context::pcdata()
        };
        assert_eq!(uri.to_string(), "(Context URI START)");
    }
}
