// Escaping-mode catalogue — which escapers a context requires.
//
// `escapers_for` maps a context to the ordered directive list a bare print
// needs there. `escapers_for_kind` is the strict-call variant: modes whose
// content kind the callee already guarantees are pruned, so an HTML→HTML
// call inserts nothing. `reconcile_directives` merges user-written
// directives with the required list without ever doubling up, which is what
// makes rewriting idempotent.

use crate::ast::Directive;
use crate::catalogue::DirectiveCatalogue;
use crate::context::{AttrKind, ContentKind, Context, Delim, ElementKind, JsSlash, State, UriPart};
use crate::error::{ContextError, ErrorKind};
use crate::raw_text::attr_value_start;

/// One escaping transformation the rewriter can insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapingMode {
    EscapeHtml,
    EscapeHtmlRcdata,
    EscapeHtmlAttribute,
    EscapeHtmlAttributeNospace,
    FilterHtmlAttributes,
    FilterHtmlElementName,
    EscapeJsString,
    EscapeJsValue,
    EscapeJsRegex,
    EscapeCssString,
    FilterCssValue,
    EscapeUri,
    NormalizeUri,
    FilterNormalizeUri,
    /// The reserved `|text` mode for `kind="text"` positions.
    TextMode,
}

impl EscapingMode {
    /// The directive name written into the template.
    pub fn directive_name(self) -> &'static str {
        match self {
            EscapingMode::EscapeHtml => "escapeHtml",
            EscapingMode::EscapeHtmlRcdata => "escapeHtmlRcdata",
            EscapingMode::EscapeHtmlAttribute => "escapeHtmlAttribute",
            EscapingMode::EscapeHtmlAttributeNospace => "escapeHtmlAttributeNospace",
            EscapingMode::FilterHtmlAttributes => "filterHtmlAttributes",
            EscapingMode::FilterHtmlElementName => "filterHtmlElementName",
            EscapingMode::EscapeJsString => "escapeJsString",
            EscapingMode::EscapeJsValue => "escapeJsValue",
            EscapingMode::EscapeJsRegex => "escapeJsRegex",
            EscapingMode::EscapeCssString => "escapeCssString",
            EscapingMode::FilterCssValue => "filterCssValue",
            EscapingMode::EscapeUri => "escapeUri",
            EscapingMode::NormalizeUri => "normalizeUri",
            EscapingMode::FilterNormalizeUri => "filterNormalizeUri",
            EscapingMode::TextMode => "text",
        }
    }

    /// The content kind this mode is the identity for: printing a value
    /// already of that kind through this mode would only re-assert what the
    /// producer guaranteed, so strict calls prune it.
    pub fn content_kind(self) -> Option<ContentKind> {
        match self {
            EscapingMode::EscapeHtml => Some(ContentKind::Html),
            EscapingMode::EscapeJsValue => Some(ContentKind::Js),
            EscapingMode::FilterCssValue => Some(ContentKind::Css),
            EscapingMode::FilterHtmlAttributes => Some(ContentKind::Attributes),
            EscapingMode::NormalizeUri | EscapingMode::FilterNormalizeUri => Some(ContentKind::Uri),
            EscapingMode::TextMode => Some(ContentKind::Text),
            _ => None,
        }
    }

    /// Whether output of this mode can sit inside an attribute value with
    /// the given delimiter without a further attribute escape.
    fn is_safe_in(self, delim: Delim) -> bool {
        match delim {
            Delim::SpaceOrTagEnd => matches!(
                self,
                EscapingMode::EscapeHtmlAttributeNospace | EscapingMode::EscapeUri
            ),
            Delim::DoubleQuote | Delim::SingleQuote => matches!(
                self,
                EscapingMode::EscapeHtmlAttribute
                    | EscapingMode::EscapeHtmlAttributeNospace
                    | EscapingMode::EscapeUri
                    | EscapingMode::FilterCssValue
                    | EscapingMode::EscapeCssString
                    | EscapingMode::FilterHtmlAttributes
                    | EscapingMode::FilterHtmlElementName
            ),
            Delim::None => true,
        }
    }

    fn is_escaping_name(name: &str) -> bool {
        ALL_MODES.iter().any(|m| m.directive_name() == name)
    }
}

const ALL_MODES: [EscapingMode; 15] = [
    EscapingMode::EscapeHtml,
    EscapingMode::EscapeHtmlRcdata,
    EscapingMode::EscapeHtmlAttribute,
    EscapingMode::EscapeHtmlAttributeNospace,
    EscapingMode::FilterHtmlAttributes,
    EscapingMode::FilterHtmlElementName,
    EscapingMode::EscapeJsString,
    EscapingMode::EscapeJsValue,
    EscapingMode::EscapeJsRegex,
    EscapingMode::EscapeCssString,
    EscapingMode::FilterCssValue,
    EscapingMode::EscapeUri,
    EscapingMode::NormalizeUri,
    EscapingMode::FilterNormalizeUri,
    EscapingMode::TextMode,
];

/// The ordered escapers a bare print needs in `ctx`.
pub(crate) fn escapers_for(ctx: Context) -> Result<Vec<EscapingMode>, ContextError> {
    if ctx.state.is_comment() {
        return Err(ContextError::new(
            ErrorKind::DirectiveInComment,
            "don't put {print} or {call} inside comments",
        ));
    }

    let mut modes = match ctx.state {
        State::HtmlPcdata => vec![EscapingMode::EscapeHtml],
        State::HtmlRcdata => vec![EscapingMode::EscapeHtmlRcdata],
        // The attribute append below supplies the (possibly Nospace) escape.
        State::HtmlNormalAttrValue => vec![],
        State::HtmlBeforeTagName | State::HtmlTagName => {
            vec![EscapingMode::FilterHtmlElementName]
        }
        State::HtmlTag | State::HtmlAttrName => vec![EscapingMode::FilterHtmlAttributes],
        // A print right after `=` starts an unquoted value; escape for the
        // value-start context of the attribute kind.
        State::HtmlBeforeAttrValue => match ctx.attr {
            AttrKind::Uri => vec![EscapingMode::FilterNormalizeUri],
            AttrKind::Script => vec![EscapingMode::EscapeJsValue],
            AttrKind::Style => vec![EscapingMode::FilterCssValue],
            _ => vec![],
        },
        State::Css => vec![EscapingMode::FilterCssValue],
        State::CssDqString | State::CssSqString => vec![EscapingMode::EscapeCssString],
        State::Js => vec![EscapingMode::EscapeJsValue],
        State::JsDqString | State::JsSqString => vec![EscapingMode::EscapeJsString],
        State::JsRegex => vec![EscapingMode::EscapeJsRegex],
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => match ctx.uri_part {
            UriPart::Start | UriPart::None => vec![EscapingMode::FilterNormalizeUri],
            UriPart::PreQuery | UriPart::MaybeVariableScheme | UriPart::MaybeSchemePart => {
                vec![EscapingMode::NormalizeUri]
            }
            UriPart::Query => vec![EscapingMode::EscapeUri],
            // Breaking out of a fragment is harmless; in an attribute the
            // delimiter escape below is all that is needed.
            UriPart::Fragment => {
                if ctx.delim != Delim::None {
                    vec![]
                } else {
                    vec![EscapingMode::NormalizeUri]
                }
            }
            UriPart::Unknown | UriPart::UnknownPreFragment => {
                return Err(ContextError::new(
                    ErrorKind::AmbiguousUriPart,
                    "cannot determine which part of the URL this dynamic value is in",
                ));
            }
        },
        State::Text => vec![EscapingMode::TextMode],
        State::HtmlComment
        | State::CssComment
        | State::JsLineComment
        | State::JsBlockComment => unreachable!("comment states rejected above"),
    };

    // Anything landing inside an attribute value still has to survive the
    // HTML attribute parser.
    let delim = if ctx.state == State::HtmlBeforeAttrValue {
        Delim::SpaceOrTagEnd
    } else {
        ctx.delim
    };
    if delim != Delim::None {
        let already_safe = modes.last().map_or(false, |m| m.is_safe_in(delim));
        if !already_safe {
            modes.push(if delim == Delim::SpaceOrTagEnd {
                EscapingMode::EscapeHtmlAttributeNospace
            } else {
                EscapingMode::EscapeHtmlAttribute
            });
        }
    }
    Ok(modes)
}

/// Escapers for the result of a strict call: the callee guarantees content
/// of `kind`, so modes that kind is the identity for are pruned. The
/// identity case (HTML callee in HTML context) produces no directives.
pub(crate) fn escapers_for_kind(
    ctx: Context,
    kind: ContentKind,
) -> Result<Vec<EscapingMode>, ContextError> {
    let modes = escapers_for(ctx)?;
    Ok(modes
        .into_iter()
        .filter(|m| m.content_kind() != Some(kind))
        .collect())
}

/// The context after a dynamic value (print or call result) is emitted.
pub(crate) fn context_after_print(ctx: Context) -> Context {
    match ctx.state {
        // The printed value is an operand; a following `/` divides.
        State::Js => Context {
            slash: JsSlash::DivOp,
            ..ctx
        },
        // A dynamic tag name: kind unknowable, lex the rest as a normal tag.
        State::HtmlBeforeTagName | State::HtmlTagName => Context {
            state: State::HtmlTagName,
            element: ElementKind::Normal,
            ..ctx
        },
        // A print right after `=` began an unquoted attribute value.
        State::HtmlBeforeAttrValue => {
            let entered = attr_value_start(ctx, Delim::SpaceOrTagEnd);
            match entered.state {
                // The value may already contain a query or fragment.
                State::Uri => Context {
                    state: State::HtmlNormalAttrValue,
                    uri_part: UriPart::Unknown,
                    ..entered
                },
                State::Js => Context {
                    slash: JsSlash::DivOp,
                    ..entered
                },
                _ => entered,
            }
        }
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => {
            let uri_part = match ctx.uri_part {
                // The value may be (the start of) a scheme.
                UriPart::Start => UriPart::MaybeVariableScheme,
                part => part,
            };
            Context { uri_part, ..ctx }
        }
        _ => ctx,
    }
}

/// Merge user-written directives with the required escapers.
///
/// User directives run first. If the list already ends with the required
/// sequence nothing is added. A final directive whose declared output kind
/// is what the context expects (`|bidiSpanWrap` producing HTML in PCDATA)
/// gets the input escape moved before it so it receives already-safe
/// content and stays last. Explicit escaping directives that contradict the
/// context are an error rather than silently stacked.
pub(crate) fn reconcile_directives(
    user: &[Directive],
    required: &[EscapingMode],
    catalogue: &DirectiveCatalogue,
    ctx: Context,
) -> Result<Vec<Directive>, ContextError> {
    let required_names: Vec<&str> = required.iter().map(|m| m.directive_name()).collect();
    if ends_with_names(user, &required_names) {
        return Ok(user.to_vec());
    }

    if let Some((last, init)) = user.split_last() {
        if let Some(out_kind) = catalogue.output_kind(&last.name) {
            let matched: Vec<EscapingMode> = required
                .iter()
                .copied()
                .filter(|m| m.content_kind() == Some(out_kind))
                .collect();
            if !matched.is_empty() {
                let matched_names: Vec<&str> =
                    matched.iter().map(|m| m.directive_name()).collect();
                if ends_with_names(init, &matched_names) {
                    // Already rewritten on a previous run.
                    return Ok(user.to_vec());
                }
                let rest: Vec<EscapingMode> = required
                    .iter()
                    .copied()
                    .filter(|m| m.content_kind() != Some(out_kind))
                    .collect();
                let mut result = init.to_vec();
                result.extend(matched.iter().map(|m| Directive::new(m.directive_name())));
                result.push(last.clone());
                result.extend(rest.iter().map(|m| Directive::new(m.directive_name())));
                return Ok(result);
            }
        }
    }

    // A trailing run of explicit escaping directives that is not the
    // required sequence cannot be satisfied by appending more escaping.
    let trailing_escaping: Vec<&str> = user
        .iter()
        .rev()
        .take_while(|d| EscapingMode::is_escaping_name(&d.name))
        .map(|d| d.name.as_str())
        .collect();
    if !trailing_escaping.is_empty() {
        return Err(ContextError::new(
            ErrorKind::IncompatibleEscapingMode,
            format!(
                "escaping directives [{}] are not compatible with {}",
                trailing_escaping
                    .iter()
                    .rev()
                    .map(|n| format!("|{n}"))
                    .collect::<Vec<_>>()
                    .join(", "),
                ctx
            ),
        ));
    }

    let mut result = user.to_vec();
    result.extend(required.iter().map(|m| Directive::new(m.directive_name())));
    Ok(result)
}

fn ends_with_names(directives: &[Directive], names: &[&str]) -> bool {
    if names.is_empty() {
        return true;
    }
    if directives.len() < names.len() {
        return false;
    }
    directives[directives.len() - names.len()..]
        .iter()
        .zip(names)
        .all(|(d, n)| d.name == *n)
}
