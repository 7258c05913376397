use std::fmt;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::map::Entry;
use indexmap::IndexMap;

// Symbol table of label -> instruction pointer (payload byte offset)
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    Rax = 0,
    Rbx,
    Rcx,
    Rdx,
}

impl Register {
    pub const ALL: [Register; 4] = [Register::Rax, Register::Rbx, Register::Rcx, Register::Rdx];

    /// Id written to the binary image for register operands.
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Register> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "rax",
            Register::Rbx => "rbx",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
        }
    }
}

impl FromStr for Register {
    type Err = ();

    /// Register names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a label was defined.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LabelDef {
    /// Byte offset into the payload.
    pub ip: u32,
    /// Zero-based source line of the definition.
    pub line: usize,
}

/// Label bindings for a single compilation run.
///
/// The first definition of a name wins; a later definition is refused and handed back to the
/// caller so it can be reported.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: FxMap<String, LabelDef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Bind `name` to `ip`. Returns the existing binding if the name was already defined.
    pub fn insert(&mut self, name: &str, ip: u32, line: usize) -> Result<(), LabelDef> {
        match self.table.entry(name.to_string()) {
            Entry::Occupied(existing) => Err(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(LabelDef { ip, line });
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.table.get(name).map(|def| def.ip)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Labels in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, LabelDef)> + '_ {
        self.table.iter().map(|(name, def)| (name.as_str(), *def))
    }
}
