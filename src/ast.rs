// Template AST node types.
//
// ~12 node kinds representing the body of a parsed template. Each kind is a
// variant of the `Node` enum. Parent nodes own their children. The rewriter
// mutates this tree in place: print and call nodes gain escaping directives,
// call targets may be retargeted to derivative templates.
//
// Parsing template source into this tree is the caller's job; the rewriter
// only consumes and annotates it.

use std::fmt;

use indexmap::IndexMap;

use crate::context::ContentKind;

/// Per-template escaping regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoescapeMode {
    /// Kind-typed, safety-enforced.
    Strict,
    /// Context is inferred, cancelling directives permitted.
    Contextual,
    /// Legacy blanket escaping, no inference.
    NonContextual,
    /// No escaping at all.
    NoAutoescape,
}

impl AutoescapeMode {
    /// Parse an `autoescape="…"` attribute value.
    pub fn parse(s: &str) -> Option<AutoescapeMode> {
        match s {
            "strict" => Some(AutoescapeMode::Strict),
            "contextual" | "deprecated-contextual" => Some(AutoescapeMode::Contextual),
            "deprecated-noncontextual" | "true" => Some(AutoescapeMode::NonContextual),
            "deprecated-noautoescape" | "false" => Some(AutoescapeMode::NoAutoescape),
            _ => None,
        }
    }

    /// Whether bodies in this mode get context inference at all.
    pub fn is_contextual(self) -> bool {
        matches!(self, AutoescapeMode::Strict | AutoescapeMode::Contextual)
    }
}

/// Line/column of a node in its source file. 1-based, like compilers report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub col: u32,
}

impl SourceLocation {
    pub fn new(line: u32, col: u32) -> SourceLocation {
        SourceLocation { line, col }
    }
}

/// Identity of an annotatable node (print or call) within one rewrite
/// session. Assigned by the session before inference; inference records
/// planned annotations against it, the apply pass writes them back.
pub type NodeId = u32;

/// A `|directive` on a print node. Arguments are carried verbatim and never
/// inspected by inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Option<String>,
}

impl Directive {
    pub fn new(name: &str) -> Directive {
        Directive {
            name: name.to_string(),
            args: None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "|{}:{}", self.name, args),
            None => write!(f, "|{}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Node structs
// ---------------------------------------------------------------------------

/// Literal template text. `{literal}` blocks and the special-character
/// commands (`{sp}`, `{lb}`, `{rb}`, `{nil}`, `{\n}`) desugar to this.
#[derive(Debug, Clone, PartialEq)]
pub struct RawText {
    pub value: String,
    pub loc: SourceLocation,
}

/// `{$expr|d1|d2…}` — an interpolation point.
#[derive(Debug, Clone, PartialEq)]
pub struct Print {
    pub id: NodeId,
    pub expr: String,
    pub directives: Vec<Directive>,
    pub loc: SourceLocation,
}

/// One `{if}`/`{elseif}` arm: condition expression and body.
#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub cond: String,
    pub body: Vec<Node>,
}

/// `{if}…{elseif}…{else}…{/if}`.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub arms: Vec<IfArm>,
    pub else_body: Option<Vec<Node>>,
    pub loc: SourceLocation,
}

/// One `{case}` arm of a switch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub exprs: String,
    pub body: Vec<Node>,
}

/// `{switch}…{case}…{default}…{/switch}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub expr: String,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Vec<Node>>,
    pub loc: SourceLocation,
}

/// `{for $i in range(…)}…{/for}`.
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub var: String,
    pub range: String,
    pub body: Vec<Node>,
    pub loc: SourceLocation,
}

/// `{foreach $x in $xs}…{ifempty}…{/foreach}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    pub var: String,
    pub expr: String,
    pub body: Vec<Node>,
    pub ifempty: Option<Vec<Node>>,
    pub loc: SourceLocation,
}

/// `{let $x: expr /}` (expression form, `body` is `None`) or
/// `{let $x kind="…"}…{/let}` (block form).
#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub var: String,
    pub kind: Option<ContentKind>,
    pub expr: Option<String>,
    pub body: Option<Vec<Node>>,
    pub loc: SourceLocation,
}

/// A `{param}` inside a call: expression form or (optionally typed) block.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParam {
    pub name: String,
    pub kind: Option<ContentKind>,
    pub expr: Option<String>,
    pub body: Option<Vec<Node>>,
    pub loc: SourceLocation,
}

/// `{call name}` / `{delcall name}` with params. After rewriting, `callee`
/// may point at a derivative template and `escaping_directives` carries the
/// escaping applied to the call's result.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: NodeId,
    pub callee: String,
    pub is_delcall: bool,
    pub data: Option<String>,
    pub params: Vec<CallParam>,
    pub escaping_directives: Vec<String>,
    pub loc: SourceLocation,
}

/// `{msg desc="…"}…{/msg}` — translatable content.
#[derive(Debug, Clone, PartialEq)]
pub struct Msg {
    pub desc: String,
    pub body: Vec<Node>,
    pub loc: SourceLocation,
}

/// `{css expr}` — emits a CSS class name safely.
#[derive(Debug, Clone, PartialEq)]
pub struct CssCommand {
    pub expr: String,
    pub loc: SourceLocation,
}

/// `{xid name}` — emits a renamable identifier safely.
#[derive(Debug, Clone, PartialEq)]
pub struct XidCommand {
    pub name: String,
    pub loc: SourceLocation,
}

// ---------------------------------------------------------------------------
// Node enum
// ---------------------------------------------------------------------------

/// A node in a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    RawText(RawText),
    Print(Print),
    If(If),
    Switch(Switch),
    For(For),
    Foreach(Foreach),
    Let(Let),
    Call(Call),
    Msg(Msg),
    Css(CssCommand),
    Xid(XidCommand),
}

impl Node {
    /// Source location of the node.
    pub fn loc(&self) -> SourceLocation {
        match self {
            Node::RawText(n) => n.loc,
            Node::Print(n) => n.loc,
            Node::If(n) => n.loc,
            Node::Switch(n) => n.loc,
            Node::For(n) => n.loc,
            Node::Foreach(n) => n.loc,
            Node::Let(n) => n.loc,
            Node::Call(n) => n.loc,
            Node::Msg(n) => n.loc,
            Node::Css(n) => n.loc,
            Node::Xid(n) => n.loc,
        }
    }

    /// A short rendering of the command for error snippets, e.g.
    /// `{$x |escapeHtml}` or `{call .bar}`.
    pub fn command_text(&self) -> String {
        match self {
            Node::RawText(n) => {
                let mut v = n.value.clone();
                if v.len() > 32 {
                    v.truncate(32);
                    v.push('…');
                }
                v
            }
            Node::Print(n) => {
                let mut s = format!("{{{}", n.expr);
                for d in &n.directives {
                    s.push(' ');
                    s.push_str(&d.to_string());
                }
                s.push('}');
                s
            }
            Node::If(n) => format!("{{if {}}}", n.arms.first().map(|a| a.cond.as_str()).unwrap_or("")),
            Node::Switch(n) => format!("{{switch {}}}", n.expr),
            Node::For(n) => format!("{{for {} in {}}}", n.var, n.range),
            Node::Foreach(n) => format!("{{foreach {} in {}}}", n.var, n.expr),
            Node::Let(n) => match n.kind {
                Some(kind) => format!("{{let {} kind=\"{}\"}}", n.var, kind),
                None => format!("{{let {}}}", n.var),
            },
            Node::Call(n) => {
                let cmd = if n.is_delcall { "delcall" } else { "call" };
                format!("{{{} {}}}", cmd, n.callee)
            }
            Node::Msg(_) => "{msg}".to_string(),
            Node::Css(n) => format!("{{css {}}}", n.expr),
            Node::Xid(n) => format!("{{xid {}}}", n.name),
        }
    }

    /// Visit this node and every descendant, outside-in.
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match self {
            Node::If(n) => {
                for arm in &n.arms {
                    for child in &arm.body {
                        child.walk(f);
                    }
                }
                if let Some(e) = &n.else_body {
                    for child in e {
                        child.walk(f);
                    }
                }
            }
            Node::Switch(n) => {
                for case in &n.cases {
                    for child in &case.body {
                        child.walk(f);
                    }
                }
                if let Some(d) = &n.default {
                    for child in d {
                        child.walk(f);
                    }
                }
            }
            Node::For(n) => {
                for child in &n.body {
                    child.walk(f);
                }
            }
            Node::Foreach(n) => {
                for child in &n.body {
                    child.walk(f);
                }
                if let Some(e) = &n.ifempty {
                    for child in e {
                        child.walk(f);
                    }
                }
            }
            Node::Let(n) => {
                if let Some(b) = &n.body {
                    for child in b {
                        child.walk(f);
                    }
                }
            }
            Node::Call(n) => {
                for param in &n.params {
                    if let Some(b) = &param.body {
                        for child in b {
                            child.walk(f);
                        }
                    }
                }
            }
            Node::Msg(n) => {
                for child in &n.body {
                    child.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Visit this node and every descendant mutably, outside-in.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        match self {
            Node::If(n) => {
                for arm in &mut n.arms {
                    for child in &mut arm.body {
                        child.walk_mut(f);
                    }
                }
                if let Some(e) = &mut n.else_body {
                    for child in e {
                        child.walk_mut(f);
                    }
                }
            }
            Node::Switch(n) => {
                for case in &mut n.cases {
                    for child in &mut case.body {
                        child.walk_mut(f);
                    }
                }
                if let Some(d) = &mut n.default {
                    for child in d {
                        child.walk_mut(f);
                    }
                }
            }
            Node::For(n) => {
                for child in &mut n.body {
                    child.walk_mut(f);
                }
            }
            Node::Foreach(n) => {
                for child in &mut n.body {
                    child.walk_mut(f);
                }
                if let Some(e) = &mut n.ifempty {
                    for child in e {
                        child.walk_mut(f);
                    }
                }
            }
            Node::Let(n) => {
                if let Some(b) = &mut n.body {
                    for child in b {
                        child.walk_mut(f);
                    }
                }
            }
            Node::Call(n) => {
                for param in &mut n.params {
                    if let Some(b) = &mut param.body {
                        for child in b {
                            child.walk_mut(f);
                        }
                    }
                }
            }
            Node::Msg(n) => {
                for child in &mut n.body {
                    child.walk_mut(f);
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Templates and file sets
// ---------------------------------------------------------------------------

/// One template definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Full dotted name, e.g. `ns.foo`.
    pub name: String,
    /// Delegate package, for `{deltemplate}` definitions.
    pub del_package: Option<String>,
    pub autoescape: AutoescapeMode,
    /// Declared content kind. Strict templates default to `Html`.
    pub kind: Option<ContentKind>,
    pub body: Vec<Node>,
    /// Source file the template came from.
    pub path: String,
    pub loc: SourceLocation,
    /// For derivatives: the template this one was cloned from.
    pub derived_from: Option<String>,
}

impl Template {
    /// The content kind governing a strict template's body.
    pub fn declared_kind(&self) -> ContentKind {
        self.kind.unwrap_or(ContentKind::Html)
    }

    /// Visit every node of the body, outside-in.
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        for node in &self.body {
            node.walk(f);
        }
    }
}

/// The set of templates a rewrite session operates on. Insertion-ordered so
/// derivative creation and output are deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSet {
    pub templates: IndexMap<String, Template>,
}

impl FileSet {
    pub fn new() -> FileSet {
        FileSet::default()
    }

    /// Add a template. Replaces any previous definition of the same name.
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }
}
