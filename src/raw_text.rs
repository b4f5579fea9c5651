// Raw-text context transitions.
//
// Advances a context across a literal chunk of template text. Each state has
// an ordered list of (pattern, action) transitions; the engine repeatedly
// picks the earliest match (ties broken by list order), treats the text
// before it as plain in-state content, and applies the action.
//
// Two delimiters outrank embedded-language lexing, exactly as browsers treat
// them: an open attribute-value delimiter ends the value no matter what the
// embedded JS/CSS/URI grammar is doing, and `</script`/`</style` end those
// element bodies even from inside strings and comments (guarded on no open
// attribute delimiter).
//
// This is deliberately not a spec-complete HTML parse. It is the
// approximation needed to pick escapers: entities are not decoded, doctypes
// and CDATA are plain text, and malformed markup degrades to wider states
// rather than erroring.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::context::{AttrKind, Context, Delim, ElementKind, JsSlash, State, UriPart};
use crate::error::{ContextError, ErrorKind};

type Apply = fn(Context, &Captures) -> Result<Context, ContextError>;

struct Transition {
    pattern: Regex,
    /// Context precondition, checked before searching.
    guard: Option<fn(&Context) -> bool>,
    /// Match postcondition; a failing filter re-searches later in the text.
    /// Only safe on unanchored patterns.
    filter: Option<fn(&Context, &Captures) -> bool>,
    apply: Apply,
}

fn t(pattern: &str, apply: Apply) -> Transition {
    Transition {
        pattern: Regex::new(pattern).unwrap(),
        guard: None,
        filter: None,
        apply,
    }
}

fn tg(pattern: &str, guard: fn(&Context) -> bool, apply: Apply) -> Transition {
    Transition {
        guard: Some(guard),
        ..t(pattern, apply)
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn no_delim(ctx: &Context) -> bool {
    ctx.delim == Delim::None
}

fn part_is_start(ctx: &Context) -> bool {
    ctx.uri_part == UriPart::Start
}

fn part_maybe_scheme(ctx: &Context) -> bool {
    matches!(
        ctx.uri_part,
        UriPart::MaybeVariableScheme | UriPart::MaybeSchemePart
    )
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

fn keep(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx)
}

fn html_comment_open(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context::pcdata().with_state(State::HtmlComment))
}

fn html_comment_close(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context::pcdata())
}

/// `<name` or `</name` seen in PCDATA. Close tags always lex as `Normal`
/// elements so a later `>` returns to PCDATA instead of re-entering a
/// raw-text body.
fn open_tag(_: Context, caps: &Captures) -> Result<Context, ContextError> {
    let element = if &caps[1] == "/" {
        ElementKind::Normal
    } else {
        ElementKind::for_tag_name(&caps[2])
    };
    Ok(Context {
        state: State::HtmlTagName,
        element,
        ..Context::pcdata()
    })
}

/// The chunk ended right after `<` or `</`; a print or the next chunk
/// supplies the name.
fn before_tag_name(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context::pcdata().with_state(State::HtmlBeforeTagName))
}

fn tag_name_start(_: Context, caps: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::HtmlTagName,
        element: ElementKind::for_tag_name(&caps[0]),
        ..Context::pcdata()
    })
}

/// `<` followed by something that cannot start a tag: plain text after all.
fn abandon_tag(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context::pcdata())
}

fn tag_body_space(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::HtmlTag))
}

fn self_close(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context::pcdata())
}

/// `>` ends the tag; where we land depends on the element kind.
fn tag_close(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    let base = Context::pcdata();
    Ok(match ctx.element {
        ElementKind::Script => Context {
            state: State::Js,
            slash: JsSlash::Regex,
            ..base
        },
        ElementKind::Style => Context {
            state: State::Css,
            ..base
        },
        ElementKind::Textarea
        | ElementKind::Title
        | ElementKind::Listing
        | ElementKind::Xmp => Context {
            state: State::HtmlRcdata,
            element: ctx.element,
            ..base
        },
        ElementKind::Normal | ElementKind::Void => base,
    })
}

fn attr_then_tag_close(ctx: Context, caps: &Captures) -> Result<Context, ContextError> {
    tag_close(
        Context {
            attr: AttrKind::None,
            ..ctx
        },
        caps,
    )
}

fn attr_name_start(ctx: Context, caps: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::HtmlAttrName,
        attr: AttrKind::for_attr_name(&caps[0]),
        ..ctx
    })
}

fn attr_eq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::HtmlBeforeAttrValue))
}

fn attr_no_value(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::HtmlTag,
        attr: AttrKind::None,
        ..ctx
    })
}

/// The state an attribute value starts in, given the attribute kind.
pub(crate) fn attr_value_start(ctx: Context, delim: Delim) -> Context {
    let base = Context {
        delim,
        slash: JsSlash::None,
        uri_part: UriPart::None,
        ..ctx
    };
    match ctx.attr {
        AttrKind::Uri => Context {
            state: State::Uri,
            uri_part: UriPart::Start,
            ..base
        },
        AttrKind::Script => Context {
            state: State::Js,
            slash: JsSlash::Regex,
            ..base
        },
        AttrKind::Style => Context {
            state: State::Css,
            ..base
        },
        AttrKind::Plaintext | AttrKind::Meta | AttrKind::None => Context {
            state: State::HtmlNormalAttrValue,
            ..base
        },
    }
}

fn value_dq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(attr_value_start(ctx, Delim::DoubleQuote))
}

fn value_sq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(attr_value_start(ctx, Delim::SingleQuote))
}

/// A bare value character right after `=`: an unquoted value begins and the
/// matched character is already part of it.
fn value_unquoted(ctx: Context, caps: &Captures) -> Result<Context, ContextError> {
    let entered = attr_value_start(ctx, Delim::SpaceOrTagEnd);
    advance(entered, &caps[0])
}

/// End tag of the current raw-text element (`</textarea` etc.).
fn rcdata_close(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::HtmlTagName,
        ..Context::pcdata()
    })
}

fn rcdata_end_matches(ctx: &Context, caps: &Captures) -> bool {
    ctx.element
        .end_tag()
        .is_some_and(|tag| caps[1].eq_ignore_ascii_case(tag))
}

/// `</script` or `</style`: the element body ends regardless of the
/// embedded-language state.
fn raw_element_close(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::HtmlTagName,
        ..Context::pcdata()
    })
}

// JS ------------------------------------------------------------------------

fn js_block_comment(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    // Comments are whitespace to the slash disposition; preserve it.
    Ok(ctx.with_state(State::JsBlockComment))
}

fn js_line_comment(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::JsLineComment))
}

fn js_comment_end(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::Js))
}

fn js_dq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::JsDqString,
        slash: JsSlash::None,
        ..ctx
    })
}

fn js_sq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::JsSqString,
        slash: JsSlash::None,
        ..ctx
    })
}

/// A string or regex literal just closed; it is an operand, so a following
/// `/` divides.
fn js_literal_end(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::Js,
        slash: JsSlash::DivOp,
        ..ctx
    })
}

/// A bare `/`: RegExp literal or division, depending on what preceded it.
fn js_slash(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    match ctx.slash {
        JsSlash::Regex => Ok(Context {
            state: State::JsRegex,
            slash: JsSlash::None,
            ..ctx
        }),
        JsSlash::DivOp => Ok(Context {
            slash: JsSlash::Regex,
            ..ctx
        }),
        JsSlash::Unknown | JsSlash::None => Err(ContextError::new(
            ErrorKind::AmbiguousJsSlash,
            "slash (/) cannot be contextually interpreted: \
             preceding branches end in irreconcilable JS contexts",
        )),
    }
}

fn js_regex_preceder(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        slash: JsSlash::Regex,
        ..ctx
    })
}

fn js_div_preceder(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        slash: JsSlash::DivOp,
        ..ctx
    })
}

// CSS -----------------------------------------------------------------------

fn css_comment_open(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::CssComment))
}

fn css_comment_close(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::Css))
}

fn css_dq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::CssDqString))
}

fn css_sq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::CssSqString))
}

fn css_string_end(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(ctx.with_state(State::Css))
}

fn css_uri_dq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::CssDqUri,
        uri_part: UriPart::Start,
        ..ctx
    })
}

fn css_uri_sq(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::CssSqUri,
        uri_part: UriPart::Start,
        ..ctx
    })
}

fn css_uri_unquoted(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::CssUri,
        uri_part: UriPart::Start,
        ..ctx
    })
}

fn css_uri_end(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        state: State::Css,
        uri_part: UriPart::None,
        ..ctx
    })
}

// URI -----------------------------------------------------------------------

fn uri_query(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    let uri_part = match ctx.uri_part {
        UriPart::Start
        | UriPart::PreQuery
        | UriPart::MaybeVariableScheme
        | UriPart::MaybeSchemePart
        | UriPart::UnknownPreFragment
        | UriPart::Query => UriPart::Query,
        // Past (or possibly past) the fragment, `?` is just data.
        other => other,
    };
    Ok(Context { uri_part, ..ctx })
}

fn uri_fragment(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        uri_part: UriPart::Fragment,
        ..ctx
    })
}

/// A `:` while a dynamic value may have begun the scheme: the value plus this
/// literal could form `javascript:`. Filtering at the interpolation cannot
/// see the completion, so this must fail loudly.
fn uri_colon_danger(_: Context, _: &Captures) -> Result<Context, ContextError> {
    Err(ContextError::new(
        ErrorKind::DangerousUriScheme,
        "literal ':' may complete a URI scheme begun by a dynamic value",
    ))
}

fn uri_scheme_chars(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        uri_part: UriPart::MaybeSchemePart,
        ..ctx
    })
}

fn uri_past_scheme(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        uri_part: UriPart::PreQuery,
        ..ctx
    })
}

fn uri_start_char(ctx: Context, _: &Captures) -> Result<Context, ContextError> {
    Ok(Context {
        uri_part: UriPart::PreQuery,
        ..ctx
    })
}

// ---------------------------------------------------------------------------
// Transition tables
// ---------------------------------------------------------------------------

/// URI-part bookkeeping shared by `Uri` and the three CSS `url(…)` states.
fn uri_part_transitions() -> Vec<Transition> {
    vec![
        tg(r":", part_maybe_scheme, uri_colon_danger),
        t(r"\?", uri_query),
        t(r"#", uri_fragment),
        tg(r"[A-Za-z0-9+.\-]+", part_maybe_scheme, uri_scheme_chars),
        tg(r"[^A-Za-z0-9+.\-?#:]", part_maybe_scheme, uri_past_scheme),
        tg(r"[^?#]", part_is_start, uri_start_char),
    ]
}

fn js_source_transitions() -> Vec<Transition> {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"/\*", js_block_comment),
        t(r"//", js_line_comment),
        t(r#"""#, js_dq),
        t(r"'", js_sq),
        t(r"/", js_slash),
        // Keywords after which a `/` starts a RegExp, not a division.
        t(
            r"\b(?:break|case|continue|delete|do|else|finally|in|instanceof|new|return|throw|try|typeof|void)\b",
            js_regex_preceder,
        ),
        // Identifiers, numbers, and property accesses leave an operand.
        t(r"[\w$.]+", js_div_preceder),
        t(r"[)\]]", js_div_preceder),
        t(r"[{}(\[;,=:?!&|+\-*%^~<>]", js_regex_preceder),
    ]
}

static PCDATA: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"<!--", html_comment_open),
        t(r"<(/?)([a-zA-Z][a-zA-Z0-9:_-]*)", open_tag),
        t(r"</?\z", before_tag_name),
    ]
});

static HTML_COMMENT: LazyLock<Vec<Transition>> =
    LazyLock::new(|| vec![t(r"-->", html_comment_close)]);

static BEFORE_TAG_NAME: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"\A[a-zA-Z][a-zA-Z0-9:_-]*", tag_name_start),
        t(r"\A[^a-zA-Z]", abandon_tag),
    ]
});

static TAG_NAME: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"\A[a-zA-Z0-9:_-]+", keep),
        t(r"\s+", tag_body_space),
        t(r"/>", self_close),
        t(r">", tag_close),
    ]
});

static TAG: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"/>", self_close),
        t(r">", tag_close),
        t(r"[a-zA-Z][a-zA-Z0-9:_-]*", attr_name_start),
    ]
});

static ATTR_NAME: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"\A[a-zA-Z0-9:_-]+", keep),
        t(r"\A\s*=\s*", attr_eq),
        t(r"\A\s+", attr_no_value),
        t(r"/>", self_close),
        t(r">", attr_then_tag_close),
    ]
});

static BEFORE_ATTR_VALUE: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        t(r"\A\s+", keep),
        t(r#"\A""#, value_dq),
        t(r"\A'", value_sq),
        t(r"\A>", attr_then_tag_close),
        t(r#"\A[^\s>'"]"#, value_unquoted),
    ]
});

static RCDATA: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![Transition {
        filter: Some(rcdata_end_matches),
        ..t(r"(?i)</([a-zA-Z]+)", rcdata_close)
    }]
});

static NORMAL_ATTR_VALUE: LazyLock<Vec<Transition>> = LazyLock::new(Vec::new);

static JS: LazyLock<Vec<Transition>> = LazyLock::new(js_source_transitions);

static JS_LINE_COMMENT: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"[\r\n\u{2028}\u{2029}]", js_comment_end),
    ]
});

static JS_BLOCK_COMMENT: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"\*/", js_comment_end),
    ]
});

static JS_DQ_STRING: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r#"""#, js_literal_end),
    ]
});

static JS_SQ_STRING: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r"'", js_literal_end),
    ]
});

static JS_REGEX: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</script", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        // A character class swallows `/` without ending the literal.
        t(r"\[(?:[^\]\\]|\\[\s\S])*\]", keep),
        t(r"/", js_literal_end),
    ]
});

static CSS: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"/\*", css_comment_open),
        t(r#"(?i)\burl\(\s*""#, css_uri_dq),
        t(r"(?i)\burl\(\s*'", css_uri_sq),
        t(r"(?i)\burl\(\s*", css_uri_unquoted),
        t(r#"""#, css_dq),
        t(r"'", css_sq),
    ]
});

static CSS_COMMENT: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"\*/", css_comment_close),
    ]
});

static CSS_DQ_STRING: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r#"""#, css_string_end),
    ]
});

static CSS_SQ_STRING: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r"'", css_string_end),
    ]
});

static CSS_URI: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    let mut list = vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"[)\s]", css_uri_end),
    ];
    list.extend(uri_part_transitions());
    list
});

static CSS_DQ_URI: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    let mut list = vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r#"""#, css_uri_end),
    ];
    list.extend(uri_part_transitions());
    list
});

static CSS_SQ_URI: LazyLock<Vec<Transition>> = LazyLock::new(|| {
    let mut list = vec![
        tg(r"(?i)</style", no_delim, raw_element_close),
        t(r"\\[\s\S]", keep),
        t(r"'", css_uri_end),
    ];
    list.extend(uri_part_transitions());
    list
});

static URI: LazyLock<Vec<Transition>> = LazyLock::new(uri_part_transitions);

static NONE: LazyLock<Vec<Transition>> = LazyLock::new(Vec::new);

fn transitions(state: State) -> &'static [Transition] {
    match state {
        State::HtmlPcdata => &PCDATA,
        State::HtmlComment => &HTML_COMMENT,
        State::HtmlBeforeTagName => &BEFORE_TAG_NAME,
        State::HtmlTagName => &TAG_NAME,
        State::HtmlTag => &TAG,
        State::HtmlAttrName => &ATTR_NAME,
        State::HtmlBeforeAttrValue => &BEFORE_ATTR_VALUE,
        State::HtmlRcdata => &RCDATA,
        State::HtmlNormalAttrValue => &NORMAL_ATTR_VALUE,
        State::Js => &JS,
        State::JsLineComment => &JS_LINE_COMMENT,
        State::JsBlockComment => &JS_BLOCK_COMMENT,
        State::JsDqString => &JS_DQ_STRING,
        State::JsSqString => &JS_SQ_STRING,
        State::JsRegex => &JS_REGEX,
        State::Css => &CSS,
        State::CssComment => &CSS_COMMENT,
        State::CssDqString => &CSS_DQ_STRING,
        State::CssSqString => &CSS_SQ_STRING,
        State::CssUri => &CSS_URI,
        State::CssDqUri => &CSS_DQ_URI,
        State::CssSqUri => &CSS_SQ_URI,
        State::Uri => &URI,
        State::Text => &NONE,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Find the open attribute value's end in `text`: returns the byte length of
/// the value content plus how many delimiter bytes to consume. For unquoted
/// values a closing `>` is left unconsumed so the tag state can process it.
fn find_value_end(text: &str, delim: Delim) -> Option<(usize, usize)> {
    match delim {
        Delim::DoubleQuote => text.find('"').map(|i| (i, 1)),
        Delim::SingleQuote => text.find('\'').map(|i| (i, 1)),
        Delim::SpaceOrTagEnd => text
            .find(|c: char| c.is_ascii_whitespace() || c == '>')
            .map(|i| if text[i..].starts_with('>') { (i, 0) } else { (i, 1) }),
        Delim::None => None,
    }
}

/// Back to the attribute list after a value's delimiter closed it.
pub(crate) fn exit_attr_value(ctx: Context) -> Context {
    Context {
        state: State::HtmlTag,
        element: ctx.element,
        ..Context::pcdata()
    }
}

/// Apply the earliest applicable transition; `None` means the whole text is
/// plain in-state content.
fn find_earliest(ctx: Context, text: &str) -> Result<Option<(Context, usize)>, ContextError> {
    struct Best<'t> {
        start: usize,
        end: usize,
        apply: Apply,
        caps: Captures<'t>,
    }
    let mut best: Option<Best<'_>> = None;

    for transition in transitions(ctx.state) {
        if let Some(guard) = transition.guard {
            if !guard(&ctx) {
                continue;
            }
        }
        let mut from = 0;
        while from <= text.len() {
            let Some(caps) = transition.pattern.captures(&text[from..]) else {
                break;
            };
            let whole = caps.get(0).unwrap();
            let (start, end) = (whole.start() + from, whole.end() + from);
            if let Some(filter) = transition.filter {
                if !filter(&ctx, &caps) {
                    from = start + 1;
                    continue;
                }
            }
            // Strictly-earlier keeps list order as the tie-break.
            if best.as_ref().map_or(true, |b| start < b.start) {
                best = Some(Best {
                    start,
                    end,
                    apply: transition.apply,
                    caps,
                });
            }
            break;
        }
    }

    match best {
        None => Ok(None),
        Some(b) => Ok(Some(((b.apply)(ctx, &b.caps)?, b.end))),
    }
}

/// Run transitions over `text` without delimiter scoping (the caller already
/// bounded it to a single attribute value, or no delimiter is open).
fn run_embedded(mut ctx: Context, mut rest: &str) -> Result<Context, ContextError> {
    while !rest.is_empty() {
        match find_earliest(ctx, rest)? {
            None => break,
            Some((next, end)) => {
                ctx = next;
                rest = &rest[end..];
            }
        }
    }
    Ok(ctx)
}

/// Advance a context across one literal chunk of template text.
///
/// Ending inside a string, comment, or tag is not an error here; the chunk
/// boundary simply becomes the new context. Terminal validity is the
/// caller's concern (strict blocks, template ends).
pub(crate) fn advance(mut ctx: Context, text: &str) -> Result<Context, ContextError> {
    let mut rest = text;
    loop {
        if rest.is_empty() {
            return Ok(ctx);
        }
        if ctx.delim != Delim::None && ctx.state.is_attr_value() {
            match find_value_end(rest, ctx.delim) {
                None => return run_embedded(ctx, rest),
                Some((value_len, consumed)) => {
                    ctx = run_embedded(ctx, &rest[..value_len])?;
                    ctx = exit_attr_value(ctx);
                    rest = &rest[value_len + consumed..];
                }
            }
        } else {
            match find_earliest(ctx, rest)? {
                None => return Ok(ctx),
                Some((next, end)) => {
                    ctx = next;
                    rest = &rest[end..];
                }
            }
        }
    }
}
