// Arena-based syntax tree for Probecraft.
// Nodes are identified by handles; parent/child relations are index lookups,
// so structural rewrites never chase live pointers.

use serde::{Deserialize, Serialize};

/// Handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Original 1-based line span of a node. `NONE` marks synthesized nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub const NONE: LineSpan = LineSpan { start: 0, end: 0 };

    pub fn line(start: u32) -> Self {
        LineSpan { start, end: start }
    }

    pub fn is_none(&self) -> bool {
        self.start == 0
    }
}

/// Primitive types of the instrumented language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prim {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Prim {
    pub fn keyword(&self) -> &'static str {
        match self {
            Prim::Boolean => "boolean",
            Prim::Char => "char",
            Prim::Byte => "byte",
            Prim::Short => "short",
            Prim::Int => "int",
            Prim::Long => "long",
            Prim::Float => "float",
            Prim::Double => "double",
        }
    }
}

/// Static type attached to declarations and (optionally) expressions.
/// Types are plain data, not tree nodes; rewrites never traverse them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Primitive(Prim),
    Named(String),
    Array(Box<Type>, u32),
}

impl Type {
    pub fn object() -> Self {
        Type::Named("Object".to_string())
    }

    pub fn render(&self) -> String {
        match self {
            Type::Primitive(p) => p.keyword().to_string(),
            Type::Named(n) => n.clone(),
            Type::Array(inner, dims) => {
                let mut s = inner.render();
                for _ in 0..*dims {
                    s.push_str("[]");
                }
                s
            }
        }
    }
}

/// A method/catch parameter (kept as plain data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub ty: Type,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfixOp {
    CondAnd,
    CondOr,
    Plus,
    Minus,
    Times,
    Divide,
    Remainder,
    Less,
    Greater,
    LessEquals,
    GreaterEquals,
    Equals,
    NotEquals,
    Xor,
    BitAnd,
    BitOr,
    LeftShift,
    RightShift,
}

impl InfixOp {
    pub fn token(&self) -> &'static str {
        match self {
            InfixOp::CondAnd => "&&",
            InfixOp::CondOr => "||",
            InfixOp::Plus => "+",
            InfixOp::Minus => "-",
            InfixOp::Times => "*",
            InfixOp::Divide => "/",
            InfixOp::Remainder => "%",
            InfixOp::Less => "<",
            InfixOp::Greater => ">",
            InfixOp::LessEquals => "<=",
            InfixOp::GreaterEquals => ">=",
            InfixOp::Equals => "==",
            InfixOp::NotEquals => "!=",
            InfixOp::Xor => "^",
            InfixOp::BitAnd => "&",
            InfixOp::BitOr => "|",
            InfixOp::LeftShift => "<<",
            InfixOp::RightShift => ">>",
        }
    }

    /// Lazy boolean operators short-circuit their right operands.
    pub fn is_lazy(&self) -> bool {
        matches!(self, InfixOp::CondAnd | InfixOp::CondOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOp {
    Not,
    Minus,
    Plus,
    Complement,
    Increment,
    Decrement,
}

impl PrefixOp {
    pub fn token(&self) -> &'static str {
        match self {
            PrefixOp::Not => "!",
            PrefixOp::Minus => "-",
            PrefixOp::Plus => "+",
            PrefixOp::Complement => "~",
            PrefixOp::Increment => "++",
            PrefixOp::Decrement => "--",
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self, PrefixOp::Increment | PrefixOp::Decrement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

impl PostfixOp {
    pub fn token(&self) -> &'static str {
        match self {
            PostfixOp::Increment => "++",
            PostfixOp::Decrement => "--",
        }
    }
}

/// Edge descriptor: names the slot a child occupies in its parent.
/// Whether a slot is a single child or an ordered list depends on the
/// parent kind; list steps carry an index alongside the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    // single-child slots
    Qualifier,
    Object,
    Expression,
    Condition,
    ThenStmt,
    ElseStmt,
    ThenExpr,
    ElseExpr,
    Left,
    Right,
    Operand,
    Lhs,
    Rhs,
    Array,
    Index,
    Receiver,
    Body,
    Init,
    Finally,
    // list slots
    Types,
    Members,
    Statements,
    Frags,
    Args,
    Extended,
    Inits,
    Updates,
    Dims,
    Elements,
    Resources,
    Catches,
    CaseExprs,
}

/// Tagged union over every construct the engine rewrites. The injector
/// dispatches on this exhaustively, so each construct-specific rule is
/// enforced by the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    // expressions
    Name { id: String },
    QualifiedName { qualifier: NodeId, field: String },
    FieldAccess { object: NodeId, field: String },
    SuperFieldAccess { field: String },
    NumberLit { token: String },
    BoolLit { value: bool },
    CharLit { value: char },
    StringLit { value: String },
    NullLit,
    This,
    TypeLit { ty: Type },
    Infix { op: InfixOp, left: NodeId, right: NodeId, extended: Vec<NodeId> },
    Prefix { op: PrefixOp, operand: NodeId },
    Postfix { op: PostfixOp, operand: NodeId },
    Assign { lhs: NodeId, rhs: NodeId },
    Conditional { cond: NodeId, then_expr: NodeId, else_expr: NodeId },
    Paren { expr: NodeId },
    MethodCall { receiver: Option<NodeId>, name: String, args: Vec<NodeId> },
    SuperMethodCall { name: String, args: Vec<NodeId> },
    ArrayAccess { array: NodeId, index: NodeId },
    Cast { ty: Type, expr: NodeId },
    ClassCreation { ty: Type, args: Vec<NodeId> },
    ArrayCreation { ty: Type, dims: Vec<NodeId> },
    ArrayInit { elements: Vec<NodeId> },
    Lambda { params: Vec<String>, body: NodeId },
    // declarations and statements
    Unit { types: Vec<NodeId> },
    TypeDecl { name: String, members: Vec<NodeId> },
    MethodDecl { name: String, ret_ty: Option<Type>, params: Vec<Param>, body: Option<NodeId> },
    FieldDecl { modifiers: Vec<String>, ty: Type, frags: Vec<NodeId> },
    Block { stmts: Vec<NodeId> },
    ExprStmt { expr: NodeId },
    VarDeclStmt { is_final: bool, ty: Type, frags: Vec<NodeId> },
    VarDeclExpr { ty: Type, frags: Vec<NodeId> },
    VarDeclFrag { name: String, init: Option<NodeId> },
    If { cond: NodeId, then_stmt: NodeId, else_stmt: Option<NodeId> },
    While { cond: NodeId, body: NodeId },
    DoWhile { body: NodeId, cond: NodeId },
    For { inits: Vec<NodeId>, cond: Option<NodeId>, updates: Vec<NodeId>, body: NodeId },
    ForEach { param: Param, expr: NodeId, body: NodeId },
    Return { expr: Option<NodeId> },
    Break,
    Continue,
    Throw { expr: NodeId },
    Try { resources: Vec<NodeId>, body: NodeId, catches: Vec<NodeId>, finally: Option<NodeId> },
    Catch { param: Param, body: NodeId },
    Switch { expr: NodeId, stmts: Vec<NodeId> },
    SwitchCase { exprs: Vec<NodeId> },
    ConstructorCall { args: Vec<NodeId> },
    SuperConstructorCall { args: Vec<NodeId> },
}

impl NodeKind {
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Block { .. }
                | NodeKind::ExprStmt { .. }
                | NodeKind::VarDeclStmt { .. }
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::ForEach { .. }
                | NodeKind::Return { .. }
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Throw { .. }
                | NodeKind::Try { .. }
                | NodeKind::Switch { .. }
                | NodeKind::SwitchCase { .. }
                | NodeKind::ConstructorCall { .. }
                | NodeKind::SuperConstructorCall { .. }
        )
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::Name { .. }
                | NodeKind::QualifiedName { .. }
                | NodeKind::FieldAccess { .. }
                | NodeKind::SuperFieldAccess { .. }
                | NodeKind::NumberLit { .. }
                | NodeKind::BoolLit { .. }
                | NodeKind::CharLit { .. }
                | NodeKind::StringLit { .. }
                | NodeKind::NullLit
                | NodeKind::This
                | NodeKind::TypeLit { .. }
                | NodeKind::Infix { .. }
                | NodeKind::Prefix { .. }
                | NodeKind::Postfix { .. }
                | NodeKind::Assign { .. }
                | NodeKind::Conditional { .. }
                | NodeKind::Paren { .. }
                | NodeKind::MethodCall { .. }
                | NodeKind::SuperMethodCall { .. }
                | NodeKind::ArrayAccess { .. }
                | NodeKind::Cast { .. }
                | NodeKind::ClassCreation { .. }
                | NodeKind::ArrayCreation { .. }
                | NodeKind::ArrayInit { .. }
                | NodeKind::Lambda { .. }
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            NodeKind::While { .. } | NodeKind::DoWhile { .. } | NodeKind::For { .. } | NodeKind::ForEach { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub span: LineSpan,
    /// Static type resolved by the parser collaborator, when known.
    pub ty: Option<Type>,
}

/// The arena. Detached nodes stay in the arena; well-formedness means every
/// reachable non-root node has exactly one parent and list indices are dense.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node; parent links of its direct children are fixed up here so
    /// bottom-up construction keeps the tree consistent.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, parent: None, span: LineSpan::NONE, ty: None });
        for (_, _, child) in self.edges(id) {
            self.nodes[child.0 as usize].parent = Some(id);
        }
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0 as usize].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn span(&self, id: NodeId) -> LineSpan {
        self.nodes[id.0 as usize].span
    }

    pub fn set_span(&mut self, id: NodeId, span: LineSpan) {
        self.nodes[id.0 as usize].span = span;
    }

    pub fn ty(&self, id: NodeId) -> Option<&Type> {
        self.nodes[id.0 as usize].ty.as_ref()
    }

    pub fn set_ty(&mut self, id: NodeId, ty: Type) {
        self.nodes[id.0 as usize].ty = Some(ty);
    }

    /// True when at least one node carries an original span.
    pub fn has_spans(&self) -> bool {
        self.nodes.iter().any(|n| !n.span.is_none())
    }

    /// All child edges of a node in syntactic order.
    pub fn edges(&self, id: NodeId) -> Vec<(Slot, Option<usize>, NodeId)> {
        let mut out = Vec::new();
        let single = |out: &mut Vec<(Slot, Option<usize>, NodeId)>, slot: Slot, n: NodeId| {
            out.push((slot, None, n));
        };
        let list = |out: &mut Vec<(Slot, Option<usize>, NodeId)>, slot: Slot, ns: &[NodeId]| {
            for (i, n) in ns.iter().enumerate() {
                out.push((slot, Some(i), *n));
            }
        };
        match self.kind(id) {
            NodeKind::Name { .. }
            | NodeKind::SuperFieldAccess { .. }
            | NodeKind::NumberLit { .. }
            | NodeKind::BoolLit { .. }
            | NodeKind::CharLit { .. }
            | NodeKind::StringLit { .. }
            | NodeKind::NullLit
            | NodeKind::This
            | NodeKind::TypeLit { .. }
            | NodeKind::Break
            | NodeKind::Continue => {}
            NodeKind::QualifiedName { qualifier, .. } => single(&mut out, Slot::Qualifier, *qualifier),
            NodeKind::FieldAccess { object, .. } => single(&mut out, Slot::Object, *object),
            NodeKind::Infix { left, right, extended, .. } => {
                single(&mut out, Slot::Left, *left);
                single(&mut out, Slot::Right, *right);
                list(&mut out, Slot::Extended, extended);
            }
            NodeKind::Prefix { operand, .. } | NodeKind::Postfix { operand, .. } => {
                single(&mut out, Slot::Operand, *operand)
            }
            NodeKind::Assign { lhs, rhs } => {
                single(&mut out, Slot::Lhs, *lhs);
                single(&mut out, Slot::Rhs, *rhs);
            }
            NodeKind::Conditional { cond, then_expr, else_expr } => {
                single(&mut out, Slot::Condition, *cond);
                single(&mut out, Slot::ThenExpr, *then_expr);
                single(&mut out, Slot::ElseExpr, *else_expr);
            }
            NodeKind::Paren { expr } => single(&mut out, Slot::Expression, *expr),
            NodeKind::MethodCall { receiver, args, .. } => {
                if let Some(r) = receiver {
                    single(&mut out, Slot::Receiver, *r);
                }
                list(&mut out, Slot::Args, args);
            }
            NodeKind::SuperMethodCall { args, .. }
            | NodeKind::ConstructorCall { args }
            | NodeKind::SuperConstructorCall { args } => list(&mut out, Slot::Args, args),
            NodeKind::ArrayAccess { array, index } => {
                single(&mut out, Slot::Array, *array);
                single(&mut out, Slot::Index, *index);
            }
            NodeKind::Cast { expr, .. } => single(&mut out, Slot::Expression, *expr),
            NodeKind::ClassCreation { args, .. } => list(&mut out, Slot::Args, args),
            NodeKind::ArrayCreation { dims, .. } => list(&mut out, Slot::Dims, dims),
            NodeKind::ArrayInit { elements } => list(&mut out, Slot::Elements, elements),
            NodeKind::Lambda { body, .. } => single(&mut out, Slot::Body, *body),
            NodeKind::Unit { types } => list(&mut out, Slot::Types, types),
            NodeKind::TypeDecl { members, .. } => list(&mut out, Slot::Members, members),
            NodeKind::MethodDecl { body, .. } => {
                if let Some(b) = body {
                    single(&mut out, Slot::Body, *b);
                }
            }
            NodeKind::FieldDecl { frags, .. } => list(&mut out, Slot::Frags, frags),
            NodeKind::Block { stmts } => list(&mut out, Slot::Statements, stmts),
            NodeKind::ExprStmt { expr } => single(&mut out, Slot::Expression, *expr),
            NodeKind::VarDeclStmt { frags, .. } | NodeKind::VarDeclExpr { frags, .. } => {
                list(&mut out, Slot::Frags, frags)
            }
            NodeKind::VarDeclFrag { init, .. } => {
                if let Some(i) = init {
                    single(&mut out, Slot::Init, *i);
                }
            }
            NodeKind::If { cond, then_stmt, else_stmt } => {
                single(&mut out, Slot::Condition, *cond);
                single(&mut out, Slot::ThenStmt, *then_stmt);
                if let Some(e) = else_stmt {
                    single(&mut out, Slot::ElseStmt, *e);
                }
            }
            NodeKind::While { cond, body } => {
                single(&mut out, Slot::Condition, *cond);
                single(&mut out, Slot::Body, *body);
            }
            NodeKind::DoWhile { body, cond } => {
                single(&mut out, Slot::Body, *body);
                single(&mut out, Slot::Condition, *cond);
            }
            NodeKind::For { inits, cond, updates, body } => {
                list(&mut out, Slot::Inits, inits);
                if let Some(c) = cond {
                    single(&mut out, Slot::Condition, *c);
                }
                list(&mut out, Slot::Updates, updates);
                single(&mut out, Slot::Body, *body);
            }
            NodeKind::ForEach { expr, body, .. } => {
                single(&mut out, Slot::Expression, *expr);
                single(&mut out, Slot::Body, *body);
            }
            NodeKind::Return { expr } => {
                if let Some(e) = expr {
                    single(&mut out, Slot::Expression, *e);
                }
            }
            NodeKind::Throw { expr } => single(&mut out, Slot::Expression, *expr),
            NodeKind::Try { resources, body, catches, finally } => {
                list(&mut out, Slot::Resources, resources);
                single(&mut out, Slot::Body, *body);
                list(&mut out, Slot::Catches, catches);
                if let Some(f) = finally {
                    single(&mut out, Slot::Finally, *f);
                }
            }
            NodeKind::Catch { body, .. } => single(&mut out, Slot::Body, *body),
            NodeKind::Switch { expr, stmts } => {
                single(&mut out, Slot::Expression, *expr);
                list(&mut out, Slot::Statements, stmts);
            }
            NodeKind::SwitchCase { exprs } => list(&mut out, Slot::CaseExprs, exprs),
        }
        out
    }

    /// The (slot, index) a node occupies in its parent, or `None` for roots
    /// and detached nodes.
    pub fn location_in_parent(&self, id: NodeId) -> Option<(Slot, Option<usize>)> {
        let parent = self.parent(id)?;
        self.edges(parent)
            .into_iter()
            .find(|(_, _, c)| *c == id)
            .map(|(slot, idx, _)| (slot, idx))
    }

    /// Resolve a (slot, index) edge on a node.
    pub fn edge_get(&self, id: NodeId, slot: Slot, index: Option<usize>) -> Option<NodeId> {
        match index {
            None => self
                .edges(id)
                .into_iter()
                .find(|(s, i, _)| *s == slot && i.is_none())
                .map(|(_, _, c)| c),
            Some(i) => self.list(id, slot).and_then(|l| l.get(i).copied()),
        }
    }

    /// Borrow a list slot, if the node has one under that name.
    pub fn list(&self, id: NodeId, slot: Slot) -> Option<&Vec<NodeId>> {
        match (&self.nodes[id.0 as usize].kind, slot) {
            (NodeKind::Infix { extended, .. }, Slot::Extended) => Some(extended),
            (NodeKind::MethodCall { args, .. }, Slot::Args)
            | (NodeKind::SuperMethodCall { args, .. }, Slot::Args)
            | (NodeKind::ConstructorCall { args }, Slot::Args)
            | (NodeKind::SuperConstructorCall { args }, Slot::Args)
            | (NodeKind::ClassCreation { args, .. }, Slot::Args) => Some(args),
            (NodeKind::ArrayCreation { dims, .. }, Slot::Dims) => Some(dims),
            (NodeKind::ArrayInit { elements }, Slot::Elements) => Some(elements),
            (NodeKind::Unit { types }, Slot::Types) => Some(types),
            (NodeKind::TypeDecl { members, .. }, Slot::Members) => Some(members),
            (NodeKind::FieldDecl { frags, .. }, Slot::Frags)
            | (NodeKind::VarDeclStmt { frags, .. }, Slot::Frags)
            | (NodeKind::VarDeclExpr { frags, .. }, Slot::Frags) => Some(frags),
            (NodeKind::Block { stmts }, Slot::Statements)
            | (NodeKind::Switch { stmts, .. }, Slot::Statements) => Some(stmts),
            (NodeKind::For { inits, .. }, Slot::Inits) => Some(inits),
            (NodeKind::For { updates, .. }, Slot::Updates) => Some(updates),
            (NodeKind::Try { resources, .. }, Slot::Resources) => Some(resources),
            (NodeKind::Try { catches, .. }, Slot::Catches) => Some(catches),
            (NodeKind::SwitchCase { exprs }, Slot::CaseExprs) => Some(exprs),
            _ => None,
        }
    }

    fn list_mut(&mut self, id: NodeId, slot: Slot) -> Option<&mut Vec<NodeId>> {
        match (&mut self.nodes[id.0 as usize].kind, slot) {
            (NodeKind::Infix { extended, .. }, Slot::Extended) => Some(extended),
            (NodeKind::MethodCall { args, .. }, Slot::Args)
            | (NodeKind::SuperMethodCall { args, .. }, Slot::Args)
            | (NodeKind::ConstructorCall { args }, Slot::Args)
            | (NodeKind::SuperConstructorCall { args }, Slot::Args)
            | (NodeKind::ClassCreation { args, .. }, Slot::Args) => Some(args),
            (NodeKind::ArrayCreation { dims, .. }, Slot::Dims) => Some(dims),
            (NodeKind::ArrayInit { elements }, Slot::Elements) => Some(elements),
            (NodeKind::Unit { types }, Slot::Types) => Some(types),
            (NodeKind::TypeDecl { members, .. }, Slot::Members) => Some(members),
            (NodeKind::FieldDecl { frags, .. }, Slot::Frags)
            | (NodeKind::VarDeclStmt { frags, .. }, Slot::Frags)
            | (NodeKind::VarDeclExpr { frags, .. }, Slot::Frags) => Some(frags),
            (NodeKind::Block { stmts }, Slot::Statements)
            | (NodeKind::Switch { stmts, .. }, Slot::Statements) => Some(stmts),
            (NodeKind::For { inits, .. }, Slot::Inits) => Some(inits),
            (NodeKind::For { updates, .. }, Slot::Updates) => Some(updates),
            (NodeKind::Try { resources, .. }, Slot::Resources) => Some(resources),
            (NodeKind::Try { catches, .. }, Slot::Catches) => Some(catches),
            (NodeKind::SwitchCase { exprs }, Slot::CaseExprs) => Some(exprs),
            _ => None,
        }
    }

    /// Overwrite a single-child slot. Returns false when the parent kind has
    /// no such slot.
    pub fn set_child(&mut self, id: NodeId, slot: Slot, child: NodeId) -> bool {
        let ok = match (&mut self.nodes[id.0 as usize].kind, slot) {
            (NodeKind::QualifiedName { qualifier, .. }, Slot::Qualifier) => {
                *qualifier = child;
                true
            }
            (NodeKind::FieldAccess { object, .. }, Slot::Object) => {
                *object = child;
                true
            }
            (NodeKind::Infix { left, .. }, Slot::Left) => {
                *left = child;
                true
            }
            (NodeKind::Infix { right, .. }, Slot::Right) => {
                *right = child;
                true
            }
            (NodeKind::Prefix { operand, .. }, Slot::Operand)
            | (NodeKind::Postfix { operand, .. }, Slot::Operand) => {
                *operand = child;
                true
            }
            (NodeKind::Assign { lhs, .. }, Slot::Lhs) => {
                *lhs = child;
                true
            }
            (NodeKind::Assign { rhs, .. }, Slot::Rhs) => {
                *rhs = child;
                true
            }
            (NodeKind::Conditional { cond, .. }, Slot::Condition) => {
                *cond = child;
                true
            }
            (NodeKind::Conditional { then_expr, .. }, Slot::ThenExpr) => {
                *then_expr = child;
                true
            }
            (NodeKind::Conditional { else_expr, .. }, Slot::ElseExpr) => {
                *else_expr = child;
                true
            }
            (NodeKind::Paren { expr }, Slot::Expression)
            | (NodeKind::Cast { expr, .. }, Slot::Expression)
            | (NodeKind::ExprStmt { expr }, Slot::Expression)
            | (NodeKind::Throw { expr }, Slot::Expression)
            | (NodeKind::ForEach { expr, .. }, Slot::Expression)
            | (NodeKind::Switch { expr, .. }, Slot::Expression) => {
                *expr = child;
                true
            }
            (NodeKind::Return { expr }, Slot::Expression) => {
                *expr = Some(child);
                true
            }
            (NodeKind::MethodCall { receiver, .. }, Slot::Receiver) => {
                *receiver = Some(child);
                true
            }
            (NodeKind::ArrayAccess { array, .. }, Slot::Array) => {
                *array = child;
                true
            }
            (NodeKind::ArrayAccess { index, .. }, Slot::Index) => {
                *index = child;
                true
            }
            (NodeKind::Lambda { body, .. }, Slot::Body)
            | (NodeKind::While { body, .. }, Slot::Body)
            | (NodeKind::DoWhile { body, .. }, Slot::Body)
            | (NodeKind::For { body, .. }, Slot::Body)
            | (NodeKind::ForEach { body, .. }, Slot::Body)
            | (NodeKind::Catch { body, .. }, Slot::Body)
            | (NodeKind::Try { body, .. }, Slot::Body) => {
                *body = child;
                true
            }
            (NodeKind::MethodDecl { body, .. }, Slot::Body) => {
                *body = Some(child);
                true
            }
            (NodeKind::VarDeclFrag { init, .. }, Slot::Init) => {
                *init = Some(child);
                true
            }
            (NodeKind::If { cond, .. }, Slot::Condition)
            | (NodeKind::While { cond, .. }, Slot::Condition)
            | (NodeKind::DoWhile { cond, .. }, Slot::Condition) => {
                *cond = child;
                true
            }
            (NodeKind::For { cond, .. }, Slot::Condition) => {
                *cond = Some(child);
                true
            }
            (NodeKind::If { then_stmt, .. }, Slot::ThenStmt) => {
                *then_stmt = child;
                true
            }
            (NodeKind::If { else_stmt, .. }, Slot::ElseStmt) => {
                *else_stmt = Some(child);
                true
            }
            (NodeKind::Try { finally, .. }, Slot::Finally) => {
                *finally = Some(child);
                true
            }
            _ => false,
        };
        if ok {
            self.nodes[child.0 as usize].parent = Some(id);
        }
        ok
    }

    /// Set the edge addressed by (slot, index) to a new child.
    pub fn set_edge(&mut self, id: NodeId, slot: Slot, index: Option<usize>, child: NodeId) -> bool {
        match index {
            None => self.set_child(id, slot, child),
            Some(i) => {
                let ok = match self.list_mut(id, slot) {
                    Some(l) if i < l.len() => {
                        l[i] = child;
                        true
                    }
                    _ => false,
                };
                if ok {
                    self.nodes[child.0 as usize].parent = Some(id);
                }
                ok
            }
        }
    }

    /// Replace a node with another in its parent's slot. The old node is
    /// detached but stays in the arena.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some(parent) = self.parent(old) else { return false };
        let Some((slot, idx)) = self.location_in_parent(old) else { return false };
        self.set_edge(parent, slot, idx, new)
    }

    /// Insert into a list slot relative to an anchor already in that list.
    pub fn insert_before(&mut self, owner: NodeId, slot: Slot, anchor: NodeId, node: NodeId) -> bool {
        self.insert_relative(owner, slot, anchor, node, 0)
    }

    pub fn insert_after(&mut self, owner: NodeId, slot: Slot, anchor: NodeId, node: NodeId) -> bool {
        self.insert_relative(owner, slot, anchor, node, 1)
    }

    fn insert_relative(&mut self, owner: NodeId, slot: Slot, anchor: NodeId, node: NodeId, delta: usize) -> bool {
        let ok = match self.list_mut(owner, slot) {
            Some(l) => match l.iter().position(|n| *n == anchor) {
                Some(i) => {
                    l.insert(i + delta, node);
                    true
                }
                None => false,
            },
            None => false,
        };
        if ok {
            self.nodes[node.0 as usize].parent = Some(owner);
        }
        ok
    }

    pub fn insert_first(&mut self, owner: NodeId, slot: Slot, node: NodeId) -> bool {
        let ok = match self.list_mut(owner, slot) {
            Some(l) => {
                l.insert(0, node);
                true
            }
            None => false,
        };
        if ok {
            self.nodes[node.0 as usize].parent = Some(owner);
        }
        ok
    }

    pub fn insert_last(&mut self, owner: NodeId, slot: Slot, node: NodeId) -> bool {
        let ok = match self.list_mut(owner, slot) {
            Some(l) => {
                l.push(node);
                true
            }
            None => false,
        };
        if ok {
            self.nodes[node.0 as usize].parent = Some(owner);
        }
        ok
    }

    /// Empty a list slot, returning the former children (their parent links
    /// are left for the caller to reuse).
    pub fn take_list(&mut self, id: NodeId, slot: Slot) -> Vec<NodeId> {
        match self.list_mut(id, slot) {
            Some(l) => std::mem::take(l),
            None => Vec::new(),
        }
    }

    /// Remove a node from the list slot it occupies.
    pub fn list_remove(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.parent(node) else { return false };
        let Some((slot, Some(i))) = self.location_in_parent(node) else { return false };
        match self.list_mut(parent, slot) {
            Some(l) if i < l.len() && l[i] == node => {
                l.remove(i);
                self.nodes[node.0 as usize].parent = None;
                true
            }
            _ => false,
        }
    }

    /// Deep-copy a subtree; the copy is detached (no parent) and keeps the
    /// original spans and types.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let node = self.nodes[id.0 as usize].clone();
        let new = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind: node.kind, parent: None, span: node.span, ty: node.ty });
        for (slot, idx, child) in self.edges(id) {
            let copied = self.copy_subtree(child);
            self.set_edge(new, slot, idx, copied);
        }
        new
    }

    /// Preorder traversal (node before its children, children in syntactic
    /// order).
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.preorder_into(root, &mut out);
        out
    }

    fn preorder_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for (_, _, child) in self.edges(id) {
            self.preorder_into(child, out);
        }
    }

    /// Nearest ancestor (inclusive of the starting node's parent) that is a
    /// statement.
    pub fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        let mut curr = Some(id);
        while let Some(c) = curr {
            if self.kind(c).is_statement() {
                return Some(c);
            }
            curr = self.parent(c);
        }
        None
    }

    /// Nearest `Block` ancestor, if any.
    pub fn block_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut curr = self.parent(id);
        while let Some(c) = curr {
            if matches!(self.kind(c), NodeKind::Block { .. }) {
                return Some(c);
            }
            curr = self.parent(c);
        }
        None
    }

    // Convenience constructors used by the injector and by tests; each sets
    // parent links via `add`.

    pub fn name(&mut self, id: &str) -> NodeId {
        self.add(NodeKind::Name { id: id.to_string() })
    }

    pub fn number(&mut self, token: &str) -> NodeId {
        self.add(NodeKind::NumberLit { token: token.to_string() })
    }

    pub fn bool_lit(&mut self, value: bool) -> NodeId {
        self.add(NodeKind::BoolLit { value })
    }

    pub fn char_lit(&mut self, value: char) -> NodeId {
        self.add(NodeKind::CharLit { value })
    }

    pub fn null_lit(&mut self) -> NodeId {
        self.add(NodeKind::NullLit)
    }

    pub fn paren(&mut self, expr: NodeId) -> NodeId {
        self.add(NodeKind::Paren { expr })
    }

    pub fn not(&mut self, operand: NodeId) -> NodeId {
        self.add(NodeKind::Prefix { op: PrefixOp::Not, operand })
    }

    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.add(NodeKind::Assign { lhs, rhs })
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.add(NodeKind::ExprStmt { expr })
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::Block { stmts })
    }

    pub fn frag(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        self.add(NodeKind::VarDeclFrag { name: name.to_string(), init })
    }

    pub fn var_decl(&mut self, ty: Type, name: &str, init: Option<NodeId>) -> NodeId {
        let f = self.frag(name, init);
        self.add(NodeKind::VarDeclStmt { is_final: false, ty, frags: vec![f] })
    }

    pub fn if_stmt(&mut self, cond: NodeId, then_stmt: NodeId, else_stmt: Option<NodeId>) -> NodeId {
        self.add(NodeKind::If { cond, then_stmt, else_stmt })
    }
}
