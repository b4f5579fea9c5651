// Context-independent pre-pass.
//
// Catches misuse that needs no context inference: the reserved `|text`
// directive, kind requirements on block forms, and calls whose escaping
// regimes can never combine. Runs before inference so context errors never
// mask these.

use crate::ast::{AutoescapeMode, FileSet, Node, SourceLocation, Template};
use crate::catalogue::DirectiveCatalogue;
use crate::context::ContentKind;
use crate::error::{ErrorKind, RewriteError};

/// Check the whole file set; returns every violation found.
pub(crate) fn check(file_set: &FileSet, _catalogue: &DirectiveCatalogue) -> Vec<RewriteError> {
    let mut errors = Vec::new();
    for template in file_set.templates.values() {
        check_template(file_set, template, &mut errors);
    }
    errors
}

fn check_template(file_set: &FileSet, template: &Template, errors: &mut Vec<RewriteError>) {
    template.walk(&mut |node| {
        match node {
            Node::Print(p) => {
                if p.directives.iter().any(|d| d.name == "text") {
                    errors.push(report(
                        template,
                        ErrorKind::ReservedDirective,
                        p.loc,
                        node.command_text(),
                        "|text is only for internal use".to_string(),
                    ));
                }
            }
            Node::Let(l) => {
                if l.body.is_some() {
                    check_block_kind(template, l.kind, l.loc, node.command_text(), errors);
                }
            }
            Node::Call(c) => {
                for param in &c.params {
                    if param.body.is_some() {
                        check_block_kind(
                            template,
                            param.kind,
                            param.loc,
                            format!("{{param {}}}", param.name),
                            errors,
                        );
                    }
                }
                // A non-contextual caller renders a text-kind callee's output
                // with blanket HTML escaping, destroying the text contract.
                if template.autoescape == AutoescapeMode::NonContextual {
                    if let Some(callee) = file_set.get(&c.callee) {
                        if callee.autoescape == AutoescapeMode::Strict
                            && callee.declared_kind() == ContentKind::Text
                        {
                            errors.push(report(
                                template,
                                ErrorKind::IncompatibleCallKind,
                                c.loc,
                                node.command_text(),
                                format!(
                                    "non-contextual template cannot call strict template {} of kind=\"text\"",
                                    c.callee
                                ),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    });
}

fn check_block_kind(
    template: &Template,
    kind: Option<ContentKind>,
    loc: SourceLocation,
    snippet: String,
    errors: &mut Vec<RewriteError>,
) {
    match template.autoescape {
        AutoescapeMode::Strict if kind.is_none() => {
            errors.push(report(
                template,
                ErrorKind::MissingKindInStrict,
                loc,
                snippet,
                "block form {let}/{param} in a strict template must declare a kind=\"...\""
                    .to_string(),
            ));
        }
        AutoescapeMode::NoAutoescape if kind.is_some() => {
            errors.push(report(
                template,
                ErrorKind::TypedBlockInNoAutoescape,
                loc,
                snippet,
                "kind=\"...\" blocks are not allowed in deprecated-noautoescape templates"
                    .to_string(),
            ));
        }
        _ => {}
    }
}

fn report(
    template: &Template,
    kind: ErrorKind,
    loc: SourceLocation,
    snippet: String,
    message: String,
) -> RewriteError {
    RewriteError {
        kind,
        template: template.name.clone(),
        path: template.path.clone(),
        line: loc.line,
        col: loc.col,
        snippet,
        message,
    }
}
