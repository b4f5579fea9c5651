// Context inference session.
//
// Owns everything one rewrite needs: the working template set (originals
// plus derivatives), the derivation map, the end-context cache, and the
// planned annotations. Inference never mutates the AST directly — it records
// node annotations against node ids, and an apply pass writes them back once
// the whole session has settled. Externally visible mutation therefore only
// happens after inference completes.

mod handlers;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::{AutoescapeMode, Directive, FileSet, Node, NodeId, Template};
use crate::catalogue::DirectiveCatalogue;
use crate::context::Context;
use crate::error::{ErrorKind, RewriteError};
use crate::sanity;

/// Derivations and caches key on (template name, packed start context).
type Key = (String, u32);

/// A template's end context for a given start context.
enum EndState {
    /// Inference is underway; recursive callers take the assumption.
    Computing(Context),
    Done(Context),
}

/// Annotations planned during inference, applied afterwards.
#[derive(Default)]
struct Inferences {
    print_directives: HashMap<NodeId, Vec<Directive>>,
    call_targets: HashMap<NodeId, String>,
    call_escaping: HashMap<NodeId, Vec<String>>,
}

/// Per-template attribution for error reporting.
struct TplCtx {
    name: String,
    path: String,
}

pub(crate) struct Session<'c> {
    catalogue: &'c DirectiveCatalogue,
    /// Working set: originals plus derivatives, insertion-ordered.
    templates: IndexMap<String, Template>,
    /// (callee, start context) → derivative name. Entries are inserted
    /// before the derivative is inferred, which is what makes recursive
    /// derivation well-founded.
    derivations: IndexMap<Key, String>,
    end_contexts: HashMap<Key, EndState>,
    /// Failed inferences, memoized so a template errors once.
    failures: HashMap<Key, RewriteError>,
    /// Keys whose in-progress assumption was consulted by a recursive call;
    /// those need the fixed-point retry.
    assumption_used: HashSet<Key>,
    /// Templates whose inference finished cleanly.
    completed: HashSet<String>,
    inferences: Inferences,
    next_id: NodeId,
}

/// How many times a recursive template's end context may be refined before
/// giving up. Each retry strictly changes the assumed context, and the
/// context set is finite and small.
const MAX_FIXED_POINT_PASSES: usize = 8;

/// Run the full rewrite: sanity pre-pass, inference over every strict and
/// contextual template, then in-place application of the inferred
/// annotations and derivative templates.
pub(crate) fn run(
    file_set: &mut FileSet,
    catalogue: &DirectiveCatalogue,
) -> Result<(), Vec<RewriteError>> {
    let sanity_errors = sanity::check(file_set, catalogue);
    if !sanity_errors.is_empty() {
        return Err(sanity_errors);
    }

    let mut session = Session::new(catalogue, file_set);
    let originals: Vec<String> = session.templates.keys().cloned().collect();
    let mut errors: Vec<RewriteError> = Vec::new();

    for name in &originals {
        let template = &session.templates[name];
        if !template.autoescape.is_contextual() {
            continue;
        }
        let start = match template.autoescape {
            AutoescapeMode::Strict => Context::start_for(template.declared_kind()),
            _ => Context::pcdata(),
        };
        if let Err(e) = session.infer_template_at(name, start) {
            // A callee's failure surfaces once per distinct report.
            if !errors.contains(&e) {
                errors.push(e);
            }
        }
    }

    session.apply_to(file_set);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

impl<'c> Session<'c> {
    fn new(catalogue: &'c DirectiveCatalogue, file_set: &FileSet) -> Session<'c> {
        let mut session = Session {
            catalogue,
            templates: file_set.templates.clone(),
            derivations: IndexMap::new(),
            end_contexts: HashMap::new(),
            failures: HashMap::new(),
            assumption_used: HashSet::new(),
            completed: HashSet::new(),
            inferences: Inferences::default(),
            next_id: 1,
        };
        let names: Vec<String> = session.templates.keys().cloned().collect();
        for name in names {
            let mut template = session.templates[&name].clone();
            session.assign_node_ids(&mut template);
            session.templates[&name] = template;
        }
        session
    }

    /// Give every print and call node a session-unique id.
    fn assign_node_ids(&mut self, template: &mut Template) {
        for node in &mut template.body {
            node.walk_mut(&mut |n| {
                match n {
                    Node::Print(p) => {
                        p.id = self.next_id;
                        self.next_id += 1;
                    }
                    Node::Call(c) => {
                        c.id = self.next_id;
                        self.next_id += 1;
                    }
                    _ => {}
                }
            });
        }
    }

    /// Infer a template's body from `start`, returning its end context.
    /// Results are cached per (template, start). Recursive self-requests get
    /// the current assumption; if that assumption turns out wrong the body
    /// is re-inferred until the end context stabilizes.
    fn infer_template_at(&mut self, name: &str, start: Context) -> Result<Context, RewriteError> {
        let key: Key = (name.to_string(), start.packed());
        if let Some(err) = self.failures.get(&key) {
            return Err(err.clone());
        }
        match self.end_contexts.get(&key) {
            Some(EndState::Done(end)) => return Ok(*end),
            Some(EndState::Computing(assumed)) => {
                let assumed = *assumed;
                self.assumption_used.insert(key);
                return Ok(assumed);
            }
            None => {}
        }

        let template = self
            .templates
            .get(name)
            .cloned()
            .expect("callee resolved before inference");
        let tpl = TplCtx {
            name: template.name.clone(),
            path: template.path.clone(),
        };
        let strict = template.autoescape == AutoescapeMode::Strict;
        #[cfg(feature = "tracing")]
        tracing::trace!(template = name, start = %start, "inferring template");

        let mut assumed = start;
        let mut settled = None;
        for _ in 0..MAX_FIXED_POINT_PASSES {
            self.end_contexts.insert(key.clone(), EndState::Computing(assumed));
            let end = match handlers::infer_body(self, &tpl, &template.body, start, strict) {
                Ok(end) => end,
                Err(e) => return Err(self.record_failure(key, e)),
            };
            let recursed = self.assumption_used.remove(&key);
            if !recursed || end == assumed {
                settled = Some(end);
                break;
            }
            // Annotations from the discarded pass are overwritten node-by-
            // node on the retry.
            assumed = end;
        }
        let Some(end) = settled else {
            let e = RewriteError {
                kind: ErrorKind::LoopChangesContext,
                template: tpl.name.clone(),
                path: tpl.path.clone(),
                line: template.loc.line,
                col: template.loc.col,
                snippet: format!("{{template {}}}", name),
                message: "recursive calls never settle on an end context".to_string(),
            };
            return Err(self.record_failure(key, e));
        };

        if strict {
            let kind = template.declared_kind();
            if !end.is_valid_end_for(kind) {
                let e = RewriteError {
                    kind: ErrorKind::StrictBlockBadEnd,
                    template: tpl.name.clone(),
                    path: tpl.path.clone(),
                    line: template.loc.line,
                    col: template.loc.col,
                    snippet: format!("{{template {}}}", name),
                    message: format!(
                        "a strict block of kind=\"{}\" cannot end in context {}",
                        kind, end
                    ),
                };
                return Err(self.record_failure(key, e));
            }
        }

        self.end_contexts.insert(key, EndState::Done(end));
        self.completed.insert(name.to_string());
        Ok(end)
    }

    fn record_failure(&mut self, key: Key, e: RewriteError) -> RewriteError {
        self.end_contexts.remove(&key);
        self.failures.insert(key, e.clone());
        e
    }

    /// Resolve the template a contextual call in `ctx` should target. The
    /// original body serves the default HTML context; any other start
    /// context gets a derivative clone, created (and registered, so
    /// recursion terminates) before it is inferred.
    fn derive(&mut self, callee: &str, ctx: Context) -> String {
        if ctx == Context::pcdata() {
            return callee.to_string();
        }
        let key: Key = (callee.to_string(), ctx.packed());
        if let Some(existing) = self.derivations.get(&key) {
            return existing.clone();
        }
        let derived = format!("{}{}", callee, ctx.derived_suffix());
        self.derivations.insert(key, derived.clone());
        #[cfg(feature = "tracing")]
        tracing::trace!(callee, derivative = %derived, "cloning template for start context");

        let mut clone = self
            .templates
            .get(callee)
            .cloned()
            .expect("derivation target resolved before cloning");
        clone.name = derived.clone();
        clone.derived_from = Some(callee.to_string());
        self.assign_node_ids(&mut clone);
        self.templates.insert(derived.clone(), clone);
        derived
    }

    /// Write the planned annotations back into the file set and append the
    /// derivative templates. Templates whose inference failed keep their
    /// original bodies.
    fn apply_to(&self, file_set: &mut FileSet) {
        let mut out: IndexMap<String, Template> = IndexMap::new();
        for (name, template) in &self.templates {
            let is_derivative = template.derived_from.is_some();
            if is_derivative && !self.completed.contains(name) {
                continue;
            }
            let mut template = template.clone();
            if self.completed.contains(name) {
                self.annotate(&mut template);
            }
            out.insert(name.clone(), template);
        }
        file_set.templates = out;
    }

    fn annotate(&self, template: &mut Template) {
        for node in &mut template.body {
            node.walk_mut(&mut |n| match n {
                Node::Print(p) => {
                    if let Some(directives) = self.inferences.print_directives.get(&p.id) {
                        p.directives = directives.clone();
                    }
                }
                Node::Call(c) => {
                    if let Some(target) = self.inferences.call_targets.get(&c.id) {
                        c.callee = target.clone();
                    }
                    if let Some(escaping) = self.inferences.call_escaping.get(&c.id) {
                        c.escaping_directives = escaping.clone();
                    }
                }
                _ => {}
            });
        }
    }

}
