use std::fmt;

/// Operand stack driven by the CPU. Owned by the host and lent to a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    items: Vec<i32>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackError {
    /// An operation needed `needed` values but only `available` were present.
    Underflow { needed: usize, available: usize },
}

impl std::error::Error for StackError {}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow { needed, available } => write!(
                f,
                "stack underflow: needed {needed} value(s), found {available}"
            ),
        }
    }
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Stack {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: i32) {
        self.items.push(value)
    }

    pub fn pop(&mut self) -> Result<i32, StackError> {
        self.items.pop().ok_or(StackError::Underflow {
            needed: 1,
            available: 0,
        })
    }

    pub fn peek(&self) -> Result<i32, StackError> {
        self.items.last().copied().ok_or(StackError::Underflow {
            needed: 1,
            available: 0,
        })
    }

    /// Pop the two topmost values as `(below, top)`. Leaves the stack untouched on underflow.
    pub fn pop_pair(&mut self) -> Result<(i32, i32), StackError> {
        self.require(2)?;
        let top = self.pop()?;
        let below = self.pop()?;
        Ok((below, top))
    }

    fn require(&self, needed: usize) -> Result<(), StackError> {
        if self.items.len() < needed {
            return Err(StackError::Underflow {
                needed,
                available: self.items.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values from bottom to top.
    pub fn as_slice(&self) -> &[i32] {
        &self.items
    }
}
