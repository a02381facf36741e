use std::fmt;

/// Binary operators, weakest first by precedence group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum InfixOp {
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    NumberLiteral(f64),
    StringLiteral(String),
    FieldAccess(Box<Expr>, String),    // $user.name
    Index(Box<Expr>, Box<Expr>),       // $ids[0]
    Infix(Box<Expr>, InfixOp, Box<Expr>),
    Pipe(Box<Expr>, String),           // $name|upper
}

/// An ordered run of nodes. The program root and every block are lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListNode {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expr,
    pub block: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Expr,
    pub consequence: ListNode,
    pub else_ifs: Vec<ElseIf>,
    pub alternative: Option<ListNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeachNode {
    pub source: Expr,
    pub item: String,
    pub key: Option<String>,
    /// Label for the `smarty.foreach.<name>` loop state.
    pub name: Option<String>,
    pub body: ListNode,
    pub alternative: Option<ListNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Expr),
    If(IfNode),
    Foreach(ForeachNode),
}

/// A parsed template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub root: ListNode,
}

// The Display impls below are debug renderings. They are lossy and are not
// meant to be parsed again.

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(name) => write!(f, "${name}"),
            Expr::NumberLiteral(n) => write!(f, "{n}"),
            Expr::StringLiteral(s) => write!(f, "\"{s}\""),
            Expr::FieldAccess(left, prop) => write!(f, "({left}.{prop})"),
            Expr::Index(left, index) => write!(f, "({left}[{index}])"),
            Expr::Infix(left, op, right) => write!(f, "({left} {op} {right})"),
            Expr::Pipe(left, name) => write!(f, "({left} | {name})"),
        }
    }
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.nodes.iter().try_for_each(|node| write!(f, "{node}"))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.write_str(text),
            Node::Action(expr) => write!(f, "{{{expr}}}"),
            Node::If(node) => {
                write!(f, "{{if {}}}{}", node.condition, node.consequence)?;
                for branch in &node.else_ifs {
                    write!(f, "{{elseif {}}}{}", branch.condition, branch.block)?;
                }
                if let Some(alternative) = &node.alternative {
                    write!(f, "{{else}}{alternative}")?;
                }
                f.write_str("{/if}")
            }
            Node::Foreach(node) => {
                write!(f, "{{foreach from={} item={}", node.source, node.item)?;
                if let Some(key) = &node.key {
                    write!(f, " key={key}")?;
                }
                if let Some(name) = &node.name {
                    write!(f, " name={name}")?;
                }
                write!(f, "}}{}", node.body)?;
                if let Some(alternative) = &node.alternative {
                    write!(f, "{{foreachelse}}{alternative}")?;
                }
                f.write_str("{/foreach}")
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
