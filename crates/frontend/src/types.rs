//! Semantic types for the narrow C core.
//!
//! A type is a base name plus an ordered stack of declarator operators,
//! outermost first: `int*[3]` reads as "array of 3 pointers to int" and is
//! stored as `[Array(3), Ptr]`.

use std::fmt;

/// One declarator operator applied to a base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    Ptr,
    Array(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub name: String,
    pub declarator_ops: Vec<TypeOp>,
}

impl Type {
    pub fn new(name: impl Into<String>) -> Self {
        Type {
            name: name.into(),
            declarator_ops: Vec::new(),
        }
    }

    pub fn with_ops(name: impl Into<String>, declarator_ops: Vec<TypeOp>) -> Self {
        Type {
            name: name.into(),
            declarator_ops,
        }
    }

    pub fn int() -> Self {
        Type::new("int")
    }

    pub fn void() -> Self {
        Type::new("void")
    }

    pub fn is_void(&self) -> bool {
        self.name == "void" && self.declarator_ops.is_empty()
    }

    pub fn pointer_depth(&self) -> usize {
        self.declarator_ops
            .iter()
            .filter(|op| matches!(op, TypeOp::Ptr))
            .count()
    }

    pub fn pointer_to(&self) -> Type {
        let mut ops = Vec::with_capacity(self.declarator_ops.len() + 1);
        ops.push(TypeOp::Ptr);
        ops.extend_from_slice(&self.declarator_ops);
        Type::with_ops(self.name.clone(), ops)
    }

    pub fn pointee(&self) -> Option<Type> {
        match self.declarator_ops.first() {
            Some(TypeOp::Ptr) => Some(Type::with_ops(
                self.name.clone(),
                self.declarator_ops[1..].to_vec(),
            )),
            _ => None,
        }
    }

    pub fn array_of(&self, length: usize) -> Type {
        let mut ops = Vec::with_capacity(self.declarator_ops.len() + 1);
        ops.push(TypeOp::Array(length));
        ops.extend_from_slice(&self.declarator_ops);
        Type::with_ops(self.name.clone(), ops)
    }

    pub fn element_type(&self) -> Option<Type> {
        match self.declarator_ops.first() {
            Some(TypeOp::Array(_)) => Some(Type::with_ops(
                self.name.clone(),
                self.declarator_ops[1..].to_vec(),
            )),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.declarator_ops.first(), Some(TypeOp::Array(_)))
    }

    /// A parameter of type "array of T" decays to "pointer to T".
    pub fn decay_parameter_array(&self) -> Type {
        match self.declarator_ops.first() {
            Some(TypeOp::Array(_)) => {
                let mut ops = Vec::with_capacity(self.declarator_ops.len());
                ops.push(TypeOp::Ptr);
                ops.extend_from_slice(&self.declarator_ops[1..]);
                Type::with_ops(self.name.clone(), ops)
            }
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for op in self.declarator_ops.iter().rev() {
            match op {
                TypeOp::Ptr => write!(f, "*")?,
                TypeOp::Array(length) => write!(f, "[{}]", length)?,
            }
        }
        Ok(())
    }
}
