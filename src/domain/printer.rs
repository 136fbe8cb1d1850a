// Deterministic source printer. One statement per line, braces on the
// statement line, four-space indent. Produces the text plus a printed-line
// table so downstream line reconciliation can see where every node landed.

use std::collections::HashMap;

use crate::domain::tree::{LineSpan, NodeId, NodeKind, Tree};

/// Result of printing a unit: the text and the 1-based line span each node
/// occupies in it.
#[derive(Debug, Clone)]
pub struct Printed {
    pub text: String,
    pub lines: HashMap<NodeId, LineSpan>,
}

impl Printed {
    pub fn span(&self, id: NodeId) -> LineSpan {
        self.lines.get(&id).copied().unwrap_or(LineSpan::NONE)
    }
}

pub fn print_unit(tree: &Tree, root: NodeId) -> Printed {
    let mut p = Printer { tree, out: String::new(), line: 1, indent: 0, lines: HashMap::new() };
    p.stmt(root);
    Printed { text: p.out, lines: p.lines }
}

/// Single-line rendering of one expression, used for reports and messages.
pub fn expr_text(tree: &Tree, id: NodeId) -> String {
    let mut p = Printer { tree, out: String::new(), line: 1, indent: 0, lines: HashMap::new() };
    p.expr(id)
}

/// Lay out original spans for a unit built without them: print it and stamp
/// each node with its printed span.
pub fn assign_spans(tree: &mut Tree, root: NodeId) {
    let printed = print_unit(tree, root);
    for (id, span) in printed.lines {
        tree.set_span(id, span);
    }
}

struct Printer<'a> {
    tree: &'a Tree,
    out: String,
    line: u32,
    indent: usize,
    lines: HashMap<NodeId, LineSpan>,
}

impl<'a> Printer<'a> {
    fn emit(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1;
    }

    fn record(&mut self, id: NodeId, start: u32, end: u32) {
        self.lines.insert(id, LineSpan { start, end });
    }

    fn stmt(&mut self, id: NodeId) {
        let start = self.line;
        match self.tree.kind(id).clone() {
            NodeKind::Unit { types } => {
                for t in types {
                    self.stmt(t);
                }
            }
            NodeKind::TypeDecl { name, members } => {
                self.emit(&format!("class {} {{", name));
                self.indent += 1;
                for m in members {
                    self.stmt(m);
                }
                self.indent -= 1;
                self.emit("}");
            }
            NodeKind::MethodDecl { name, ret_ty, params, body } => {
                let params: Vec<String> =
                    params.iter().map(|p| format!("{} {}", p.ty.render(), p.name)).collect();
                let head = match ret_ty {
                    Some(ty) => format!("{} {}({})", ty.render(), name, params.join(", ")),
                    None => format!("{}({})", name, params.join(", ")),
                };
                match body {
                    Some(b) => {
                        self.emit(&format!("{} {{", head));
                        self.indent += 1;
                        self.stmts_of(b);
                        self.indent -= 1;
                        self.emit("}");
                        self.record(b, start, self.line - 1);
                    }
                    None => self.emit(&format!("{};", head)),
                }
            }
            NodeKind::FieldDecl { modifiers, ty, frags } => {
                let frags: Vec<String> = frags.iter().map(|f| self.frag(*f)).collect();
                let mut head = modifiers.join(" ");
                if !head.is_empty() {
                    head.push(' ');
                }
                self.emit(&format!("{}{} {};", head, ty.render(), frags.join(", ")));
            }
            NodeKind::Block { stmts } => {
                self.emit("{");
                self.indent += 1;
                for s in stmts {
                    self.stmt(s);
                }
                self.indent -= 1;
                self.emit("}");
            }
            NodeKind::ExprStmt { expr } => {
                let e = self.expr(expr);
                self.emit(&format!("{};", e));
            }
            NodeKind::VarDeclStmt { is_final, ty, frags } => {
                let frags: Vec<String> = frags.iter().map(|f| self.frag(*f)).collect();
                let fin = if is_final { "final " } else { "" };
                self.emit(&format!("{}{} {};", fin, ty.render(), frags.join(", ")));
            }
            NodeKind::If { cond, then_stmt, else_stmt } => {
                let c = self.expr(cond);
                self.open_body(&format!("if ({})", c), then_stmt);
                if let Some(e) = else_stmt {
                    if matches!(self.tree.kind(e), NodeKind::If { .. }) {
                        // keep `else if` chains readable but still one stmt per line
                        self.emit("else");
                        self.indent += 1;
                        self.stmt(e);
                        self.indent -= 1;
                    } else {
                        self.open_body("else", e);
                    }
                }
            }
            NodeKind::While { cond, body } => {
                let c = self.expr(cond);
                self.open_body(&format!("while ({})", c), body);
            }
            NodeKind::DoWhile { body, cond } => {
                self.emit("do {");
                self.indent += 1;
                self.stmts_of(body);
                self.indent -= 1;
                let body_end = self.line;
                let c = self.expr(cond);
                self.emit(&format!("}} while ({});", c));
                self.record(body, start + 1, body_end - 1);
            }
            NodeKind::For { inits, cond, updates, body } => {
                let inits: Vec<String> = inits.iter().map(|i| self.for_init(*i)).collect();
                let c = cond.map(|c| self.expr(c)).unwrap_or_default();
                let updates: Vec<String> = updates.iter().map(|u| self.expr(*u)).collect();
                let head = format!("for ({}; {}; {})", inits.join(", "), c, updates.join(", "));
                self.open_body(&head, body);
            }
            NodeKind::ForEach { param, expr, body } => {
                let e = self.expr(expr);
                let head = format!("for ({} {} : {})", param.ty.render(), param.name, e);
                self.open_body(&head, body);
            }
            NodeKind::Return { expr } => match expr {
                Some(e) => {
                    let e = self.expr(e);
                    self.emit(&format!("return {};", e));
                }
                None => self.emit("return;"),
            },
            NodeKind::Break => self.emit("break;"),
            NodeKind::Continue => self.emit("continue;"),
            NodeKind::Throw { expr } => {
                let e = self.expr(expr);
                self.emit(&format!("throw {};", e));
            }
            NodeKind::Try { resources, body, catches, finally } => {
                if resources.is_empty() {
                    self.emit("try {");
                } else {
                    let res: Vec<String> = resources.iter().map(|r| self.for_init(*r)).collect();
                    self.emit(&format!("try ({}) {{", res.join("; ")));
                }
                self.indent += 1;
                self.stmts_of(body);
                self.indent -= 1;
                self.emit("}");
                for c in catches {
                    self.stmt(c);
                }
                if let Some(f) = finally {
                    self.emit("finally {");
                    self.indent += 1;
                    self.stmts_of(f);
                    self.indent -= 1;
                    self.emit("}");
                }
            }
            NodeKind::Catch { param, body } => {
                self.emit(&format!("catch ({} {}) {{", param.ty.render(), param.name));
                self.indent += 1;
                self.stmts_of(body);
                self.indent -= 1;
                self.emit("}");
            }
            NodeKind::Switch { expr, stmts } => {
                let e = self.expr(expr);
                self.emit(&format!("switch ({}) {{", e));
                self.indent += 1;
                for s in stmts {
                    self.stmt(s);
                }
                self.indent -= 1;
                self.emit("}");
            }
            NodeKind::SwitchCase { exprs } => {
                if exprs.is_empty() {
                    self.emit("default:");
                } else {
                    let es: Vec<String> = exprs.iter().map(|e| self.expr(*e)).collect();
                    self.emit(&format!("case {}:", es.join(", ")));
                }
            }
            NodeKind::ConstructorCall { args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                self.emit(&format!("this({});", args.join(", ")));
            }
            NodeKind::SuperConstructorCall { args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                self.emit(&format!("super({});", args.join(", ")));
            }
            other => {
                // an expression in statement position; print it like a statement
                if other.is_expression() {
                    let e = self.expr(id);
                    self.emit(&format!("{};", e));
                }
            }
        }
        self.record(id, start, self.line - 1);
    }

    /// `head {` + body + `}`; non-block bodies print indented on their own
    /// line.
    fn open_body(&mut self, head: &str, body: NodeId) {
        if matches!(self.tree.kind(body), NodeKind::Block { .. }) {
            let start = self.line;
            self.emit(&format!("{} {{", head));
            self.indent += 1;
            self.stmts_of(body);
            self.indent -= 1;
            self.emit("}");
            self.record(body, start, self.line - 1);
        } else {
            self.emit(head);
            self.indent += 1;
            self.stmt(body);
            self.indent -= 1;
        }
    }

    /// Print the statements of a block whose braces the caller already owns.
    fn stmts_of(&mut self, block: NodeId) {
        if let NodeKind::Block { stmts } = self.tree.kind(block).clone() {
            for s in stmts {
                self.stmt(s);
            }
        } else {
            self.stmt(block);
        }
    }

    fn frag(&mut self, id: NodeId) -> String {
        let line = self.line;
        let s = match self.tree.kind(id).clone() {
            NodeKind::VarDeclFrag { name, init } => match init {
                Some(i) => {
                    let e = self.expr(i);
                    format!("{} = {}", name, e)
                }
                None => name,
            },
            _ => self.expr(id),
        };
        self.record(id, line, line);
        s
    }

    fn for_init(&mut self, id: NodeId) -> String {
        let line = self.line;
        let s = match self.tree.kind(id).clone() {
            NodeKind::VarDeclExpr { ty, frags } => {
                let frags: Vec<String> = frags.iter().map(|f| self.frag(*f)).collect();
                format!("{} {}", ty.render(), frags.join(", "))
            }
            _ => self.expr(id),
        };
        self.record(id, line, line);
        s
    }

    fn expr(&mut self, id: NodeId) -> String {
        let line = self.line;
        let s = match self.tree.kind(id).clone() {
            NodeKind::Name { id: name } => name,
            NodeKind::QualifiedName { qualifier, field } => {
                let q = self.expr(qualifier);
                format!("{}.{}", q, field)
            }
            NodeKind::FieldAccess { object, field } => {
                let o = self.expr(object);
                format!("{}.{}", o, field)
            }
            NodeKind::SuperFieldAccess { field } => format!("super.{}", field),
            NodeKind::NumberLit { token } => token,
            NodeKind::BoolLit { value } => value.to_string(),
            NodeKind::CharLit { value } => format!("'{}'", value),
            NodeKind::StringLit { value } => format!("\"{}\"", value),
            NodeKind::NullLit => "null".to_string(),
            NodeKind::This => "this".to_string(),
            NodeKind::TypeLit { ty } => format!("{}.class", ty.render()),
            NodeKind::Infix { op, left, right, extended } => {
                let mut s = format!("{} {} {}", self.expr(left), op.token(), self.expr(right));
                for e in extended {
                    let e = self.expr(e);
                    s.push_str(&format!(" {} {}", op.token(), e));
                }
                s
            }
            NodeKind::Prefix { op, operand } => format!("{}{}", op.token(), self.expr(operand)),
            NodeKind::Postfix { op, operand } => format!("{}{}", self.expr(operand), op.token()),
            NodeKind::Assign { lhs, rhs } => {
                format!("{} = {}", self.expr(lhs), self.expr(rhs))
            }
            NodeKind::Conditional { cond, then_expr, else_expr } => format!(
                "{} ? {} : {}",
                self.expr(cond),
                self.expr(then_expr),
                self.expr(else_expr)
            ),
            NodeKind::Paren { expr } => format!("({})", self.expr(expr)),
            NodeKind::MethodCall { receiver, name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                match receiver {
                    Some(r) => format!("{}.{}({})", self.expr(r), name, args.join(", ")),
                    None => format!("{}({})", name, args.join(", ")),
                }
            }
            NodeKind::SuperMethodCall { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                format!("super.{}({})", name, args.join(", "))
            }
            NodeKind::ArrayAccess { array, index } => {
                format!("{}[{}]", self.expr(array), self.expr(index))
            }
            NodeKind::Cast { ty, expr } => format!("({}) {}", ty.render(), self.expr(expr)),
            NodeKind::ClassCreation { ty, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                format!("new {}({})", ty.render(), args.join(", "))
            }
            NodeKind::ArrayCreation { ty, dims } => {
                let dims: Vec<String> =
                    dims.iter().map(|d| format!("[{}]", self.expr(*d))).collect();
                format!("new {}{}", ty.render(), dims.join(""))
            }
            NodeKind::ArrayInit { elements } => {
                let es: Vec<String> = elements.iter().map(|e| self.expr(*e)).collect();
                format!("{{ {} }}", es.join(", "))
            }
            NodeKind::Lambda { params, body } => {
                let head = if params.len() == 1 {
                    params[0].clone()
                } else {
                    format!("({})", params.join(", "))
                };
                let b = self.inline_stmt(body);
                format!("{} -> {}", head, b)
            }
            NodeKind::VarDeclExpr { .. } => self.for_init(id),
            other => {
                debug_assert!(!other.is_statement(), "statement printed in expression position");
                String::new()
            }
        };
        self.record(id, line, line);
        s
    }

    /// Compact single-line form used for lambda bodies.
    fn inline_stmt(&mut self, id: NodeId) -> String {
        let line = self.line;
        let s = match self.tree.kind(id).clone() {
            NodeKind::Block { stmts } => {
                let inner: Vec<String> = stmts.iter().map(|s| self.inline_stmt(*s)).collect();
                format!("{{ {} }}", inner.join(" "))
            }
            NodeKind::Return { expr } => match expr {
                Some(e) => format!("return {};", self.expr(e)),
                None => "return;".to_string(),
            },
            NodeKind::ExprStmt { expr } => format!("{};", self.expr(expr)),
            NodeKind::VarDeclStmt { is_final, ty, frags } => {
                let frags: Vec<String> = frags.iter().map(|f| self.frag(*f)).collect();
                let fin = if is_final { "final " } else { "" };
                format!("{}{} {};", fin, ty.render(), frags.join(", "))
            }
            _ => self.expr(id),
        };
        self.record(id, line, line);
        s
    }
}
