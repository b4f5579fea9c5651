// Shared test helpers.
//
// The crate consumes an already-parsed template set; these helpers build one
// from the compact command syntax the scenarios are written in, so tests
// read like template source instead of AST literals. The parser is
// deliberately minimal: it handles exactly the command forms the tests use
// and panics on anything else.

#![allow(dead_code)]

use std::collections::HashMap;

use autoescape::ast::{
    AutoescapeMode, Call, CallParam, Directive, FileSet, For, Foreach, If, IfArm, Let, Msg, Node,
    Print, RawText, SourceLocation, Switch, SwitchCase, Template, XidCommand,
};
use autoescape::ast::CssCommand;
use autoescape::context::ContentKind;
use autoescape::RewriteError;

/// Parse template source into a file set.
pub fn parse(src: &str) -> FileSet {
    Parser::new(src).parse_file()
}

/// Parse and rewrite with the standard catalogue; panics on errors.
pub fn rewrite_set(src: &str) -> FileSet {
    let mut set = parse(src);
    autoescape::rewrite(&mut set).unwrap_or_else(|errors| {
        panic!(
            "rewrite failed:\n{}",
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        )
    });
    set
}

/// Parse and rewrite, expecting failure; returns the accumulated errors.
pub fn rewrite_errors(src: &str) -> Vec<RewriteError> {
    let mut set = parse(src);
    autoescape::rewrite(&mut set).expect_err("rewrite unexpectedly succeeded")
}

/// Directive-name lists for every print in the template, in document order.
pub fn print_directives(set: &FileSet, template: &str) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    set.get(template)
        .unwrap_or_else(|| panic!("no template {template}"))
        .walk(&mut |node| {
            if let Node::Print(p) = node {
                out.push(p.directives.iter().map(|d| d.name.clone()).collect());
            }
        });
    out
}

/// (callee, escaping directives) for every call in the template, in order.
pub fn calls(set: &FileSet, template: &str) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    set.get(template)
        .unwrap_or_else(|| panic!("no template {template}"))
        .walk(&mut |node| {
            if let Node::Call(c) = node {
                out.push((c.callee.clone(), c.escaping_directives.clone()));
            }
        });
    out
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'s> {
    src: &'s str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Parser<'s> {
        Parser {
            src,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.col)
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn bump(&mut self, len: usize) {
        for ch in self.src[self.pos..self.pos + len].chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += len;
    }

    /// Consume text up to the next `{` (or EOF).
    fn eat_text(&mut self) -> (String, SourceLocation) {
        let loc = self.loc();
        let rest = self.rest();
        let end = rest.find('{').unwrap_or(rest.len());
        let text = rest[..end].to_string();
        self.bump(end);
        (text, loc)
    }

    /// Consume `{…}`, returning the trimmed command text. Braces inside
    /// quoted attribute values do not terminate the command.
    fn read_command(&mut self) -> (String, SourceLocation) {
        let loc = self.loc();
        let rest = self.rest();
        assert!(rest.starts_with('{'), "expected command at {loc:?}");
        let mut in_quote: Option<char> = None;
        let mut end = None;
        for (i, ch) in rest.char_indices().skip(1) {
            match in_quote {
                Some(q) if ch == q => in_quote = None,
                Some(_) => {}
                None if ch == '"' || ch == '\'' => in_quote = Some(ch),
                None if ch == '}' => {
                    end = Some(i);
                    break;
                }
                None => {}
            }
        }
        let end = end.unwrap_or_else(|| panic!("unterminated command at {loc:?}"));
        let cmd = rest[1..end].trim().to_string();
        self.bump(end + 1);
        (cmd, loc)
    }

    fn parse_file(mut self) -> FileSet {
        let mut set = FileSet::new();
        loop {
            self.eat_text();
            if self.pos >= self.src.len() {
                return set;
            }
            let (cmd, loc) = self.read_command();
            let (word, rest) = split_first_word(&cmd);
            match word {
                "namespace" => {}
                "template" | "deltemplate" => {
                    let (name, attrs) = name_and_attrs(rest);
                    let autoescape = attrs
                        .get("autoescape")
                        .map(|v| AutoescapeMode::parse(v).expect("bad autoescape"))
                        .unwrap_or(AutoescapeMode::Contextual);
                    let kind = attrs
                        .get("kind")
                        .map(|v| ContentKind::parse(v).expect("bad kind"));
                    let (body, _) = self.parse_body(&["/template", "/deltemplate"]);
                    set.insert(Template {
                        name,
                        del_package: attrs.get("delpackage").cloned(),
                        autoescape,
                        kind,
                        body,
                        path: "test.soy".to_string(),
                        loc,
                        derived_from: None,
                    });
                }
                _ => panic!("unexpected top-level command {{{cmd}}}"),
            }
        }
    }

    /// Parse body nodes until a command whose first word is in `stops`;
    /// returns the nodes and the stop command's full text.
    fn parse_body(&mut self, stops: &[&str]) -> (Vec<Node>, String) {
        let mut nodes = Vec::new();
        loop {
            let (text, tloc) = self.eat_text();
            if !text.is_empty() {
                nodes.push(Node::RawText(RawText {
                    value: text,
                    loc: tloc,
                }));
            }
            assert!(self.pos < self.src.len(), "unterminated body, expected one of {stops:?}");
            let (cmd, loc) = self.read_command();
            let (word, _) = split_first_word(&cmd);
            if stops.contains(&word) {
                return (nodes, cmd);
            }
            nodes.push(self.parse_command(&cmd, loc));
        }
    }

    fn parse_command(&mut self, cmd: &str, loc: SourceLocation) -> Node {
        let (word, rest) = split_first_word(cmd);
        match word {
            w if w.starts_with('$') => parse_print(cmd, loc),
            "print" => parse_print(rest, loc),
            "if" => {
                let mut arms = Vec::new();
                let mut else_body = None;
                let mut cond = rest.to_string();
                loop {
                    let (body, stop) = self.parse_body(&["elseif", "else", "/if"]);
                    let (stop_word, stop_rest) = split_first_word(&stop);
                    arms.push(IfArm { cond: cond.clone(), body });
                    match stop_word {
                        "elseif" => cond = stop_rest.to_string(),
                        "else" => {
                            let (body, _) = self.parse_body(&["/if"]);
                            else_body = Some(body);
                            break;
                        }
                        _ => break,
                    }
                }
                Node::If(If {
                    arms,
                    else_body,
                    loc,
                })
            }
            "switch" => {
                let expr = rest.to_string();
                let (_, mut stop) = self.parse_body(&["case", "default", "/switch"]);
                let mut cases = Vec::new();
                let mut default = None;
                loop {
                    let (stop_word, stop_rest) = split_first_word(&stop);
                    match stop_word {
                        "case" => {
                            let exprs = stop_rest.to_string();
                            let (body, next) = self.parse_body(&["case", "default", "/switch"]);
                            cases.push(SwitchCase { exprs, body });
                            stop = next;
                        }
                        "default" => {
                            let (body, next) = self.parse_body(&["/switch"]);
                            default = Some(body);
                            stop = next;
                        }
                        _ => break,
                    }
                }
                Node::Switch(Switch {
                    expr,
                    cases,
                    default,
                    loc,
                })
            }
            "for" => {
                let (var, range) = rest
                    .split_once(" in ")
                    .expect("for syntax: {for $i in range(...)}");
                let (body, _) = self.parse_body(&["/for"]);
                Node::For(For {
                    var: var.trim().to_string(),
                    range: range.trim().to_string(),
                    body,
                    loc,
                })
            }
            "foreach" => {
                let (var, expr) = rest
                    .split_once(" in ")
                    .expect("foreach syntax: {foreach $x in $xs}");
                let (body, stop) = self.parse_body(&["ifempty", "/foreach"]);
                let ifempty = if stop.starts_with("ifempty") {
                    let (body, _) = self.parse_body(&["/foreach"]);
                    Some(body)
                } else {
                    None
                };
                Node::Foreach(Foreach {
                    var: var.trim().to_string(),
                    expr: expr.trim().to_string(),
                    body,
                    ifempty,
                    loc,
                })
            }
            "let" => {
                if let Some(inner) = cmd.strip_suffix('/') {
                    // {let $x: expr /}
                    let inner = inner.trim().strip_prefix("let").unwrap().trim();
                    let (var, expr) = inner.split_once(':').expect("let syntax: {let $x: e /}");
                    Node::Let(Let {
                        var: var.trim().to_string(),
                        kind: None,
                        expr: Some(expr.trim().to_string()),
                        body: None,
                        loc,
                    })
                } else {
                    let (var, attrs) = name_and_attrs(rest);
                    let kind = attrs
                        .get("kind")
                        .map(|v| ContentKind::parse(v).expect("bad kind"));
                    let (body, _) = self.parse_body(&["/let"]);
                    Node::Let(Let {
                        var,
                        kind,
                        expr: None,
                        body: Some(body),
                        loc,
                    })
                }
            }
            "call" | "delcall" => {
                let is_delcall = word == "delcall";
                let self_closing = cmd.ends_with('/');
                let rest = rest.trim_end_matches('/').trim();
                let (callee, attrs) = name_and_attrs(rest);
                let params = if self_closing {
                    Vec::new()
                } else {
                    self.parse_call_params()
                };
                Node::Call(Call {
                    id: 0,
                    callee,
                    is_delcall,
                    data: attrs.get("data").cloned(),
                    params,
                    escaping_directives: Vec::new(),
                    loc,
                })
            }
            "msg" => {
                let attrs = parse_attrs(rest);
                let (body, _) = self.parse_body(&["/msg"]);
                Node::Msg(Msg {
                    desc: attrs.get("desc").cloned().unwrap_or_default(),
                    body,
                    loc,
                })
            }
            "css" => Node::Css(CssCommand {
                expr: rest.to_string(),
                loc,
            }),
            "xid" => Node::Xid(XidCommand {
                name: rest.to_string(),
                loc,
            }),
            "literal" => {
                let rest_src = self.rest();
                let end = rest_src
                    .find("{/literal}")
                    .expect("unterminated {literal}");
                let value = rest_src[..end].to_string();
                self.bump(end + "{/literal}".len());
                Node::RawText(RawText { value, loc })
            }
            "sp" => raw(" ", loc),
            "nil" => raw("", loc),
            "lb" => raw("{", loc),
            "rb" => raw("}", loc),
            "\\n" => raw("\n", loc),
            "\\r" => raw("\r", loc),
            "\\t" => raw("\t", loc),
            _ => panic!("unsupported command {{{cmd}}}"),
        }
    }

    fn parse_call_params(&mut self) -> Vec<CallParam> {
        let mut params = Vec::new();
        loop {
            let (text, _) = self.eat_text();
            assert!(
                text.trim().is_empty(),
                "only {{param}} allowed inside a call block, found {text:?}"
            );
            let (cmd, loc) = self.read_command();
            let (word, rest) = split_first_word(&cmd);
            match word {
                "/call" | "/delcall" => return params,
                "param" => {
                    if let Some(inner) = cmd.strip_suffix('/') {
                        // {param name: expr /}
                        let inner = inner.trim().strip_prefix("param").unwrap().trim();
                        let (name, expr) =
                            inner.split_once(':').expect("param syntax: {param n: e /}");
                        params.push(CallParam {
                            name: name.trim().to_string(),
                            kind: None,
                            expr: Some(expr.trim().to_string()),
                            body: None,
                            loc,
                        });
                    } else {
                        let (name, attrs) = name_and_attrs(rest);
                        let kind = attrs
                            .get("kind")
                            .map(|v| ContentKind::parse(v).expect("bad kind"));
                        let (body, _) = self.parse_body(&["/param"]);
                        params.push(CallParam {
                            name,
                            kind,
                            expr: None,
                            body: Some(body),
                            loc,
                        });
                    }
                }
                _ => panic!("unexpected command {{{cmd}}} inside call"),
            }
        }
    }
}

fn raw(value: &str, loc: SourceLocation) -> Node {
    Node::RawText(RawText {
        value: value.to_string(),
        loc,
    })
}

/// `{$expr |d1 |d2:arg}` → a print node.
fn parse_print(src: &str, loc: SourceLocation) -> Node {
    let parts = split_pipes(src);
    let expr = parts[0].trim().to_string();
    let directives = parts[1..]
        .iter()
        .map(|p| {
            let p = p.trim();
            match p.split_once(':') {
                Some((name, args)) => Directive {
                    name: name.trim().to_string(),
                    args: Some(args.trim().to_string()),
                },
                None => Directive::new(p),
            }
        })
        .collect();
    Node::Print(Print {
        id: 0,
        expr,
        directives,
        loc,
    })
}

/// Split on `|` outside quotes.
fn split_pipes(src: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut in_quote: Option<char> = None;
    for ch in src.chars() {
        match in_quote {
            Some(q) if ch == q => {
                in_quote = None;
                parts.last_mut().unwrap().push(ch);
            }
            Some(_) => parts.last_mut().unwrap().push(ch),
            None if ch == '"' || ch == '\'' => {
                in_quote = Some(ch);
                parts.last_mut().unwrap().push(ch);
            }
            None if ch == '|' => parts.push(String::new()),
            None => parts.last_mut().unwrap().push(ch),
        }
    }
    parts
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// `name attr="v" attr2="v2"` → (name, attrs).
fn name_and_attrs(s: &str) -> (String, HashMap<String, String>) {
    let (name, rest) = split_first_word(s);
    (name.to_string(), parse_attrs(rest))
}

/// `attr="v" attr2='v2'` → attrs. Values may contain spaces.
fn parse_attrs(s: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 1..];
        let quote = after.chars().next().expect("attribute value");
        assert!(quote == '"' || quote == '\'', "attributes must be quoted");
        let close = after[1..].find(quote).expect("unterminated attribute") + 1;
        attrs.insert(key, after[1..close].to_string());
        rest = after[close + 1..].trim_start();
    }
    attrs
}
