// Error-reporting scenarios — one test per failure kind, plus the
// attribution metadata (file, line, column, template, snippet) and the
// call-site rethrow for failures inside derivative templates.

mod common;

use autoescape::ast::Node;
use autoescape::ErrorKind;
use common::{parse, rewrite_errors};
use pretty_assertions::assert_eq;

#[test]
fn branches_ending_in_different_contexts() {
    // The typo'd close tag leaves the second arm stuck in JS.
    let errors = rewrite_errors(concat!(
        "{template ns.foo}",
        "{if $x == 1}{$y}",
        "{elseif $x == 2}<script>foo({$z})</scrpit>",
        "{else}World!{/if}",
        "{/template}"
    ));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::AmbiguousBranches);
}

#[test]
fn branches_with_different_attr_delimiters() {
    let errors = rewrite_errors(
        "{template ns.foo}{if $c}<a href=\"{else}<a href='{/if}{$u}\">{/template}",
    );
    assert_eq!(errors[0].kind, ErrorKind::AmbiguousBranches);
}

#[test]
fn loop_body_must_round_trip_context() {
    let errors =
        rewrite_errors("{template ns.foo}{foreach $x in $xs}<a href=\"{/foreach}{/template}");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::LoopChangesContext);
}

/// Joining an operand-position arm with an operator-position arm widens the
/// slash disposition to unknown; the literal `/` after the join is then
/// uninterpretable.
#[test]
fn ambiguous_js_slash_after_join() {
    let errors = rewrite_errors(concat!(
        "{template ns.foo}",
        "<script>{if $c}var x = foo(){else}return{/if}/x/;</script>",
        "{/template}"
    ));
    assert_eq!(errors[0].kind, ErrorKind::AmbiguousJsSlash);
}

#[test]
fn ambiguous_uri_part_after_join() {
    let errors = rewrite_errors(concat!(
        "{template ns.foo}",
        "<a href=\"{if $c}/a?x=1{else}/a{/if}{$more}\">x</a>",
        "{/template}"
    ));
    assert_eq!(errors[0].kind, ErrorKind::AmbiguousUriPart);
}

/// `href="{$x}:…"` — the literal colon could turn the printed value into a
/// scheme like `javascript:`.
#[test]
fn literal_colon_after_dynamic_uri_start() {
    let errors =
        rewrite_errors("{template ns.foo}<a href=\"{$x}:8080/\">x</a>{/template}");
    assert_eq!(errors[0].kind, ErrorKind::DangerousUriScheme);
}

#[test]
fn print_inside_html_comment() {
    let errors = rewrite_errors("{template ns.foo}<!-- {$x} -->{/template}");
    assert_eq!(errors[0].kind, ErrorKind::DirectiveInComment);
}

#[test]
fn print_inside_js_line_comment() {
    let errors =
        rewrite_errors("{template ns.foo}<script>// {$x}\n</script>{/template}");
    assert_eq!(errors[0].kind, ErrorKind::DirectiveInComment);
}

#[test]
fn msg_forbidden_in_js() {
    let errors = rewrite_errors(
        "{template ns.foo}<script>{msg desc=\"d\"}hi{/msg}</script>{/template}",
    );
    assert_eq!(errors[0].kind, ErrorKind::MessageForbiddenInContext);
}

#[test]
fn untyped_block_outside_html_rejected() {
    let errors = rewrite_errors(
        "{template ns.foo}<script>{let $b}x{/let}var y;</script>{/template}",
    );
    assert_eq!(errors[0].kind, ErrorKind::BlockBadEnd);
}

#[test]
fn untyped_block_must_end_in_html() {
    let errors = rewrite_errors("{template ns.foo}{let $b}<b{/let}{/template}");
    assert_eq!(errors[0].kind, ErrorKind::BlockBadEnd);
    assert!(errors[0].message.contains("start and end in HTML"));
}

#[test]
fn contradicting_user_escaping_rejected() {
    let errors = rewrite_errors("{template ns.foo}{$x |escapeJsValue}{/template}");
    assert_eq!(errors[0].kind, ErrorKind::IncompatibleEscapingMode);
}

#[test]
fn extern_call_outside_pcdata_rejected() {
    let errors = rewrite_errors(
        "{template ns.foo}<script>s('{call ns.unknown /}')</script>{/template}",
    );
    assert_eq!(errors[0].kind, ErrorKind::IncompatibleCallKind);
}

#[test]
fn noncontextual_callee_outside_pcdata_rejected() {
    let errors = rewrite_errors(concat!(
        "{template ns.legacy autoescape=\"deprecated-noncontextual\"}x{/template}",
        "{template ns.foo}<script>s('{call ns.legacy /}')</script>{/template}"
    ));
    assert_eq!(errors[0].kind, ErrorKind::IncompatibleCallKind);
}

#[test]
fn reserved_text_directive_rejected() {
    let errors = rewrite_errors("{template ns.foo}{$x |text}{/template}");
    assert_eq!(errors[0].kind, ErrorKind::ReservedDirective);
}

#[test]
fn typed_block_in_noautoescape_rejected() {
    let errors = rewrite_errors(concat!(
        "{template ns.foo autoescape=\"deprecated-noautoescape\"}",
        "{let $b kind=\"html\"}x{/let}",
        "{/template}"
    ));
    assert_eq!(errors[0].kind, ErrorKind::TypedBlockInNoAutoescape);
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

#[test]
fn errors_carry_location_template_and_snippet() {
    let errors = rewrite_errors("{template ns.foo}\n<!-- {$x} -->\n{/template}");
    let err = &errors[0];
    assert_eq!(err.template, "ns.foo");
    assert_eq!(err.path, "test.soy");
    assert_eq!(err.line, 2);
    assert_eq!(err.col, 6);
    assert!(err.snippet.contains("$x"), "snippet: {}", err.snippet);

    let rendered = err.to_string();
    assert!(rendered.contains("test.soy:2:6"));
    assert!(rendered.contains("ns.foo"));
    assert!(rendered.contains("DirectiveInComment"));
}

/// A failure inside a derivative surfaces at the call site that forced the
/// derivation, naming the derivative in the message.
#[test]
fn derivative_failure_rethrown_at_call_site() {
    let errors = rewrite_errors(concat!(
        "{template ns.main}<script>var x = '{call ns.frag /}';</script>{/template}",
        "{template ns.frag}{msg desc=\"d\"}hi{/msg}{/template}"
    ));
    assert_eq!(errors.len(), 1);
    let err = &errors[0];
    assert_eq!(err.kind, ErrorKind::MessageForbiddenInContext);
    assert_eq!(err.template, "ns.main");
    assert!(err.snippet.contains("call ns.frag"), "snippet: {}", err.snippet);
    assert!(
        err.message.contains("ns.frag__C14"),
        "message should name the derivative: {}",
        err.message
    );
}

/// Failures are fatal per template; healthy templates in the same set are
/// still rewritten.
#[test]
fn errors_accumulate_across_templates() {
    let mut set = parse(concat!(
        "{template ns.one}<!-- {$a} -->{/template}",
        "{template ns.two}{$b}{/template}",
        "{template ns.three}<script>// {$c}\n</script>{/template}"
    ));
    let errors = autoescape::rewrite(&mut set).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.kind == ErrorKind::DirectiveInComment));

    // ns.two still got its annotation.
    let body = &set.get("ns.two").unwrap().body;
    let Node::Print(p) = &body[0] else {
        panic!("expected print")
    };
    assert_eq!(p.directives.len(), 1);
    assert_eq!(p.directives[0].name, "escapeHtml");
}
