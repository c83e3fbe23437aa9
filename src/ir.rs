//! the instruction view the walker hands to the query core.
//!
//! the walker owns parsing and control flow. what reaches the core is one
//! instruction at a time, with conditionals already resolved to the direction
//! the explored path takes.

use serde::{Serialize, Deserialize};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u32);

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// ssa value number, local to one method
pub type Local = u32;


#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Named {
        class:  String,
        name:   String,
    },
    /// index insensitive contents of an array, used by heap edges
    ArrayContents,
    /// one read of an array element, keyed by the fresh index name it was read through
    ArrayElement(u64),
    ArrayLength,
}

impl Field {
    pub fn named(class: &str, name: &str) -> Self {
        Field::Named {
            class:  class.to_string(),
            name:   name.to_string(),
        }
    }

    /// pseudo fields only exist in path constraints and never become heap edges
    pub fn is_pseudo(&self) -> bool {
        match self {
            Field::Named{..} | Field::ArrayContents => false,
            Field::ArrayElement(_) | Field::ArrayLength => true,
        }
    }

    pub fn declaring_class(&self) -> Option<&str> {
        match self {
            Field::Named{class, ..} => Some(class),
            _ => None,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Named{class, name}   => write!(f, "{}::{}", class, name),
            Field::ArrayContents        => write!(f, "@contents"),
            Field::ArrayElement(n)      => write!(f, "@[idx{}]", n),
            Field::ArrayLength          => write!(f, "@length"),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocSite {
    pub id:     u32,
    pub class:  String,
    pub method: MethodId,
}

impl std::fmt::Display for AllocSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "new {}#{}", self.class, self.id)
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    #[serde(rename = "local")]
    Local(Local),
    #[serde(rename = "const")]
    Const(i64),
    #[serde(rename = "null")]
    Null,
}

impl Operand {
    pub fn as_local(&self) -> Option<Local> {
        match self {
            Operand::Local(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Operand::Local(_)   => None,
            Operand::Const(v)   => Some(*v),
            Operand::Null       => Some(0),
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CmpOp {
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs <  rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs >  rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }

    pub fn smt(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "distinct",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "&")]
    And,
    #[serde(rename = "|")]
    Or,
    #[serde(rename = "^")]
    Xor,
    #[serde(rename = "<<")]
    Shl,
    #[serde(rename = ">>")]
    Shr,
    #[serde(rename = ">>>")]
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "neg")]
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
}

impl Default for NumType {
    fn default() -> Self {
        NumType::Int
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchLabel {
    /// the explored edge is taken for any of these values
    #[serde(rename = "cases")]
    Cases(Vec<i64>),
    #[serde(rename = "default")]
    Default,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "constructor")]
    Constructor,
    #[serde(rename = "class_init")]
    ClassInit,
}

impl Default for MethodKind {
    fn default() -> Self {
        MethodKind::Normal
    }
}

/// call target as resolved by the walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id:         MethodId,
    pub class:      String,
    pub name:       String,
    /// formals in order. for instance methods the receiver comes first
    #[serde(default)]
    pub params:     Vec<Local>,
    #[serde(default)]
    pub kind:       MethodKind,
    /// fields the callee may write, used when the call is skipped
    #[serde(default)]
    pub modifies:   Vec<Field>,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    Assign {
        def:    Local,
        value:  Operand,
    },
    CheckCast {
        def:    Local,
        value:  Operand,
    },
    New {
        def:    Local,
        site:   AllocSite,
    },
    NewArray {
        def:    Local,
        site:   AllocSite,
        length: Operand,
    },
    Load {
        def:    Local,
        base:   Local,
        field:  Field,
    },
    StaticLoad {
        def:    Local,
        field:  Field,
    },
    Store {
        base:   Local,
        field:  Field,
        value:  Operand,
    },
    StaticStore {
        field:  Field,
        value:  Operand,
    },
    ArrayLoad {
        def:    Local,
        array:  Local,
        index:  Operand,
    },
    ArrayStore {
        array:  Local,
        index:  Operand,
        value:  Operand,
    },
    ArrayLength {
        def:    Local,
        array:  Local,
    },
    Binary {
        def:    Local,
        op:     BinaryOp,
        lhs:    Operand,
        rhs:    Operand,
        #[serde(default)]
        ty:     NumType,
    },
    Unary {
        def:    Local,
        op:     UnaryOp,
        value:  Operand,
        #[serde(default)]
        ty:     NumType,
    },
    /// three way comparison (lcmp, fcmpl, ...), result is -1, 0 or 1
    Compare {
        def:    Local,
        lhs:    Operand,
        rhs:    Operand,
        ty:     NumType,
    },
    Conversion {
        def:    Local,
        value:  Operand,
        from:   NumType,
        to:     NumType,
    },
    InstanceOf {
        def:    Local,
        value:  Operand,
    },
    /// class literal or other runtime metadata
    Metadata {
        def:    Local,
    },
    Branch {
        op:     CmpOp,
        lhs:    Operand,
        rhs:    Operand,
        /// direction of the explored path
        taken:  bool,
    },
    Switch {
        scrutinee:  Operand,
        /// every non default label of the switch
        cases:      Vec<i64>,
        label:      SwitchLabel,
    },
    Invoke {
        def:    Option<Local>,
        callee: Method,
        args:   Vec<Operand>,
    },
    Return {
        value:  Option<Operand>,
    },
    /// anything without an effect on scalar or heap state: goto, monitors, throw, ...
    Nop,
}

impl Instruction {
    /// the local this instruction defines, if any
    pub fn def(&self) -> Option<Local> {
        match self {
            Instruction::Assign{def, ..}
            | Instruction::CheckCast{def, ..}
            | Instruction::New{def, ..}
            | Instruction::NewArray{def, ..}
            | Instruction::Load{def, ..}
            | Instruction::StaticLoad{def, ..}
            | Instruction::ArrayLoad{def, ..}
            | Instruction::ArrayLength{def, ..}
            | Instruction::Binary{def, ..}
            | Instruction::Unary{def, ..}
            | Instruction::Compare{def, ..}
            | Instruction::Conversion{def, ..}
            | Instruction::InstanceOf{def, ..}
            | Instruction::Metadata{def} => Some(*def),
            Instruction::Invoke{def, ..} => *def,
            Instruction::Store{..}
            | Instruction::StaticStore{..}
            | Instruction::ArrayStore{..}
            | Instruction::Branch{..}
            | Instruction::Switch{..}
            | Instruction::Return{..}
            | Instruction::Nop => None,
        }
    }
}


/// where the walker currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub method:     MethodId,
    /// inside a loop body. discharged edges are not logged there
    #[serde(default)]
    pub in_loop:    bool,
}

impl Site {
    pub fn new(method: MethodId) -> Self {
        Self {
            method,
            in_loop: false,
        }
    }
}
