// Per-node inference handlers.
//
// One handler per command kind. Each takes the context before the node and
// returns the context after it, recording planned directive insertions and
// call retargets in the session along the way. Handlers only plan — the
// session's apply pass performs the actual tree mutation.

use super::{Session, TplCtx};
use crate::ast::{
    AutoescapeMode, Call, CallParam, Foreach, If, Let, Msg, Node, Print, SourceLocation, Switch,
};
use crate::context::{ContentKind, Context, State};
use crate::error::{ContextError, ErrorKind, RewriteError};
use crate::escaping::{
    context_after_print, escapers_for, escapers_for_kind, reconcile_directives, EscapingMode,
};
use crate::raw_text;

/// Thread a context through a sequence of body nodes.
pub(super) fn infer_body(
    s: &mut Session,
    t: &TplCtx,
    nodes: &[Node],
    mut ctx: Context,
    strict: bool,
) -> Result<Context, RewriteError> {
    for node in nodes {
        ctx = infer_node(s, t, node, ctx, strict)?;
    }
    Ok(ctx)
}

fn infer_node(
    s: &mut Session,
    t: &TplCtx,
    node: &Node,
    ctx: Context,
    strict: bool,
) -> Result<Context, RewriteError> {
    let snippet = node.command_text();
    match node {
        Node::RawText(n) => {
            raw_text::advance(ctx, &n.value).map_err(|e| attribute(t, e, n.loc, snippet))
        }
        Node::Print(n) => infer_print(s, t, n, ctx, strict, &snippet),
        Node::If(n) => infer_if(s, t, n, ctx, strict, &snippet),
        Node::Switch(n) => infer_switch(s, t, n, ctx, strict, &snippet),
        Node::For(n) => infer_loop(s, t, &n.body, ctx, strict, n.loc, &snippet),
        Node::Foreach(n) => infer_foreach(s, t, n, ctx, strict, &snippet),
        Node::Let(n) => infer_let(s, t, n, ctx, strict, &snippet),
        Node::Call(n) => infer_call(s, t, n, ctx, strict, &snippet),
        Node::Msg(n) => infer_msg(s, t, n, ctx, strict),
        // {css} and {xid} emit identifier-safe output; the context is
        // untouched.
        Node::Css(_) | Node::Xid(_) => Ok(ctx),
    }
}

// ---------------------------------------------------------------------------
// Print
// ---------------------------------------------------------------------------

fn infer_print(
    s: &mut Session,
    t: &TplCtx,
    node: &Print,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    let cancelling = node
        .directives
        .iter()
        .find(|d| s.catalogue.cancels_autoescape(&d.name));
    if let Some(cancelling) = cancelling {
        if strict {
            return Err(report(
                t,
                ErrorKind::StrictForbidsCancellingDirective,
                node.loc,
                snippet,
                format!(
                    "autoescape-cancelling directive |{} is not allowed under strict \
                     autoescaping; move the value into a {{let $x kind=\"{}\"}}...{{/let}} \
                     block and print $x instead",
                    cancelling.name,
                    kind_suggestion(ctx)
                ),
            ));
        }
        // Contextual mode honors the opt-out: nothing inserted, but the
        // value still advances the context like any dynamic value.
        return Ok(context_after_print(ctx));
    }

    let required = escapers_for(ctx).map_err(|e| attribute(t, e, node.loc, snippet.into()))?;
    let merged = reconcile_directives(&node.directives, &required, s.catalogue, ctx)
        .map_err(|e| attribute(t, e, node.loc, snippet.into()))?;
    s.inferences.print_directives.insert(node.id, merged);
    Ok(context_after_print(ctx))
}

/// The `kind="…"` a cancelled print's context calls for, used in the strict
/// error hint.
fn kind_suggestion(ctx: Context) -> &'static str {
    if ctx.state.is_js() {
        "js"
    } else if ctx.state.is_css() {
        "css"
    } else if ctx.state == State::Uri {
        "uri"
    } else if matches!(
        ctx.state,
        State::HtmlTag | State::HtmlAttrName | State::HtmlBeforeAttrValue
    ) {
        "attributes"
    } else if ctx.state == State::Text {
        "text"
    } else {
        "html"
    }
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

fn infer_if(
    s: &mut Session,
    t: &TplCtx,
    node: &If,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    let mut ends = Vec::with_capacity(node.arms.len() + 1);
    for arm in &node.arms {
        ends.push(infer_body(s, t, &arm.body, ctx, strict)?);
    }
    match &node.else_body {
        Some(body) => ends.push(infer_body(s, t, body, ctx, strict)?),
        // No {else}: zero arms may run, so the incoming context is a branch.
        None => ends.push(ctx),
    }
    join_branches(t, &ends, node.loc, snippet, "{if}")
}

fn infer_switch(
    s: &mut Session,
    t: &TplCtx,
    node: &Switch,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    let mut ends = Vec::with_capacity(node.cases.len() + 1);
    for case in &node.cases {
        ends.push(infer_body(s, t, &case.body, ctx, strict)?);
    }
    match &node.default {
        Some(body) => ends.push(infer_body(s, t, body, ctx, strict)?),
        None => ends.push(ctx),
    }
    join_branches(t, &ends, node.loc, snippet, "{switch}")
}

fn join_branches(
    t: &TplCtx,
    ends: &[Context],
    loc: SourceLocation,
    snippet: &str,
    command: &str,
) -> Result<Context, RewriteError> {
    let mut joined = ends[0];
    for end in &ends[1..] {
        joined = Context::join(joined, *end).ok_or_else(|| {
            report(
                t,
                ErrorKind::AmbiguousBranches,
                loc,
                snippet,
                format!(
                    "branches of {} end in incompatible contexts: {} vs {}",
                    command, joined, end
                ),
            )
        })?;
    }
    Ok(joined)
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// A loop body may run zero or many times, so it must map its entry context
/// back to itself. One widening retry is allowed: a body that ends in a
/// joinable-but-wider context (say an unknown slash disposition) is
/// re-inferred from the widened context, which must then be the fixed point.
fn infer_loop(
    s: &mut Session,
    t: &TplCtx,
    body: &[Node],
    ctx: Context,
    strict: bool,
    loc: SourceLocation,
    snippet: &str,
) -> Result<Context, RewriteError> {
    let end = infer_body(s, t, body, ctx, strict)?;
    if end == ctx {
        return Ok(ctx);
    }
    let loop_error = |a: Context, b: Context| {
        report(
            t,
            ErrorKind::LoopChangesContext,
            loc,
            snippet,
            format!(
                "loop body does not round-trip the context: starts in {}, ends in {}",
                a, b
            ),
        )
    };
    let widened = Context::join(ctx, end).ok_or_else(|| loop_error(ctx, end))?;
    let end = infer_body(s, t, body, widened, strict)?;
    if end == widened {
        Ok(widened)
    } else {
        Err(loop_error(widened, end))
    }
}

fn infer_foreach(
    s: &mut Session,
    t: &TplCtx,
    node: &Foreach,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    let looped = infer_loop(s, t, &node.body, ctx, strict, node.loc, snippet)?;
    match &node.ifempty {
        None => Ok(looped),
        Some(body) => {
            let empty_end = infer_body(s, t, body, ctx, strict)?;
            join_branches(t, &[looped, empty_end], node.loc, snippet, "{ifempty}")
        }
    }
}

// ---------------------------------------------------------------------------
// Typed and untyped blocks
// ---------------------------------------------------------------------------

fn infer_let(
    s: &mut Session,
    t: &TplCtx,
    node: &Let,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    if let Some(body) = &node.body {
        infer_block(s, t, node.kind, body, ctx, strict, node.loc, snippet)?;
    }
    // Expression lets, and the bound value itself, leave the stream alone.
    Ok(ctx)
}

/// A `{let}`/`{param}` block. Typed blocks are strict scopes of their kind
/// no matter what surrounds them; untyped blocks are only legal where HTML
/// PCDATA escaping can be applied in place.
fn infer_block(
    s: &mut Session,
    t: &TplCtx,
    kind: Option<ContentKind>,
    body: &[Node],
    ctx: Context,
    strict: bool,
    loc: SourceLocation,
    snippet: &str,
) -> Result<(), RewriteError> {
    match kind {
        Some(kind) => {
            let end = infer_body(s, t, body, Context::start_for(kind), true)?;
            if end.is_valid_end_for(kind) {
                Ok(())
            } else {
                Err(report(
                    t,
                    ErrorKind::StrictBlockBadEnd,
                    loc,
                    snippet,
                    format!(
                        "a strict block of kind=\"{}\" cannot end in context {}",
                        kind, end
                    ),
                ))
            }
        }
        None => {
            if strict {
                return Err(report(
                    t,
                    ErrorKind::MissingKindInStrict,
                    loc,
                    snippet,
                    "block form {let}/{param} in a strict scope must declare a kind=\"...\""
                        .to_string(),
                ));
            }
            if ctx != Context::pcdata() {
                return Err(report(
                    t,
                    ErrorKind::BlockBadEnd,
                    loc,
                    snippet,
                    format!(
                        "blocks should start and end in HTML context, but this one starts in {}",
                        ctx
                    ),
                ));
            }
            let end = infer_body(s, t, body, Context::pcdata(), false)?;
            if end == Context::pcdata() {
                Ok(())
            } else {
                Err(report(
                    t,
                    ErrorKind::BlockBadEnd,
                    loc,
                    snippet,
                    format!(
                        "blocks should start and end in HTML context, but this one ends in {}",
                        end
                    ),
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

fn infer_call(
    s: &mut Session,
    t: &TplCtx,
    node: &Call,
    ctx: Context,
    strict: bool,
    snippet: &str,
) -> Result<Context, RewriteError> {
    for param in &node.params {
        infer_call_param(s, t, param, ctx, strict)?;
    }

    let callee = s
        .templates
        .get(&node.callee)
        .map(|c| (c.autoescape, c.declared_kind()));
    match callee {
        // Strict callee: never cloned. The call site converts the callee's
        // declared kind into whatever the context needs; matching kinds
        // convert to nothing.
        Some((AutoescapeMode::Strict, kind)) => {
            let modes = escapers_for_kind(ctx, kind)
                .map_err(|e| attribute(t, e, node.loc, snippet.into()))?;
            s.inferences.call_escaping.insert(
                node.id,
                modes.iter().map(|m| m.directive_name().to_string()).collect(),
            );
            Ok(context_after_print(ctx))
        }
        // Contextual callee: specialize a clone per start context and let
        // its body continue the caller's stream.
        Some((AutoescapeMode::Contextual, _)) => {
            if strict && ctx.state != State::Text {
                return Err(report(
                    t,
                    ErrorKind::StrictForbidsNonStrictCall,
                    node.loc,
                    snippet,
                    format!(
                        "strict templates may only call strict templates, but {} is contextual",
                        node.callee
                    ),
                ));
            }
            let target = s.derive(&node.callee, ctx);
            let end = s.infer_template_at(&target, ctx).map_err(|e| {
                if target != node.callee {
                    e.at_call_site(&target, &t.name, &t.path, node.loc, snippet.into())
                } else {
                    e
                }
            })?;
            if target != node.callee {
                s.inferences.call_targets.insert(node.id, target);
            }
            Ok(end)
        }
        // Legacy callees render unescaped; only the default HTML context
        // (or strict Text, where nothing needs escaping) can absorb that.
        Some((AutoescapeMode::NonContextual | AutoescapeMode::NoAutoescape, _)) => {
            if strict {
                if ctx.state == State::Text {
                    Ok(ctx)
                } else {
                    Err(report(
                        t,
                        ErrorKind::StrictForbidsNonStrictCall,
                        node.loc,
                        snippet,
                        format!(
                            "strict templates may only call strict templates, but {} is not \
                             autoescaped",
                            node.callee
                        ),
                    ))
                }
            } else if ctx == Context::pcdata() {
                Ok(ctx)
            } else {
                Err(report(
                    t,
                    ErrorKind::IncompatibleCallKind,
                    node.loc,
                    snippet,
                    format!(
                        "non-contextually autoescaped template {} may only be called in the \
                         default HTML context, not {}",
                        node.callee, ctx
                    ),
                ))
            }
        }
        // Extern callee. Strict callers guard the result with the context's
        // full escaping; contextual callers must be in the one context where
        // an unknown template is safe by convention.
        None => {
            if strict {
                let modes: Vec<EscapingMode> = escapers_for(ctx)
                    .map_err(|e| attribute(t, e, node.loc, snippet.into()))?;
                s.inferences.call_escaping.insert(
                    node.id,
                    modes.iter().map(|m| m.directive_name().to_string()).collect(),
                );
                Ok(context_after_print(ctx))
            } else if ctx == Context::pcdata() {
                Ok(ctx)
            } else {
                Err(report(
                    t,
                    ErrorKind::IncompatibleCallKind,
                    node.loc,
                    snippet,
                    format!(
                        "template {} is not in the file set and may only be called in the \
                         default HTML context, not {}",
                        node.callee, ctx
                    ),
                ))
            }
        }
    }
}

fn infer_call_param(
    s: &mut Session,
    t: &TplCtx,
    param: &CallParam,
    ctx: Context,
    strict: bool,
) -> Result<(), RewriteError> {
    let Some(body) = &param.body else {
        return Ok(());
    };
    let snippet = format!("{{param {}}}", param.name);
    infer_block(s, t, param.kind, body, ctx, strict, param.loc, &snippet)
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// `{msg}` content must land where a translator's text renders as text:
/// PCDATA, RCDATA, attribute values, and plain text.
fn infer_msg(
    s: &mut Session,
    t: &TplCtx,
    node: &Msg,
    ctx: Context,
    strict: bool,
) -> Result<Context, RewriteError> {
    let allowed = matches!(
        ctx.state,
        State::HtmlPcdata | State::HtmlRcdata | State::HtmlNormalAttrValue | State::Text
    );
    if !allowed {
        return Err(report(
            t,
            ErrorKind::MessageForbiddenInContext,
            node.loc,
            "{msg}",
            format!("{{msg}} is not allowed in context {}", ctx),
        ));
    }
    infer_body(s, t, &node.body, ctx, strict)
}

// ---------------------------------------------------------------------------
// Error attribution
// ---------------------------------------------------------------------------

fn attribute(t: &TplCtx, e: ContextError, loc: SourceLocation, snippet: String) -> RewriteError {
    RewriteError::attribute(e, &t.name, &t.path, loc, snippet)
}

fn report(
    t: &TplCtx,
    kind: ErrorKind,
    loc: SourceLocation,
    snippet: impl Into<String>,
    message: String,
) -> RewriteError {
    RewriteError {
        kind,
        template: t.name.clone(),
        path: t.path.clone(),
        line: loc.line,
        col: loc.col,
        snippet: snippet.into(),
        message,
    }
}
