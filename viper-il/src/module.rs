//! Module containers: globals, externs and the function table.

use crate::{Function, Type};

/// A named constant string global. The module owns the init bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Symbol name, without the `@` sigil.
    pub name: String,
    /// Global type (`str` for string data).
    pub ty: Type,
    /// True for `global const` declarations.
    pub is_const: bool,
    /// Initializer bytes.
    pub init: Vec<u8>,
}

/// Declaration of a runtime helper resolved by the VM bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDecl {
    /// Symbol name, without the `@` sigil.
    pub name: String,
    /// Return type.
    pub ret: Type,
    /// Parameter types.
    pub params: Vec<Type>,
}

/// Top-level container owning every function, global and extern by value.
///
/// Passes mutate modules in place; there is no garbage collection of IR
/// nodes and pointer stability is only promised within a single pass.
#[derive(Debug, Default, Clone)]
pub struct Module {
    /// IL version string from the module header, e.g. `0.1.2`.
    pub version: String,
    /// Source file table backing `.loc` file ids, as `(id, path)` pairs.
    pub files: Vec<(u32, String)>,
    /// Extern declarations, unique by name.
    pub externs: Vec<ExternDecl>,
    /// Globals, unique by name.
    pub globals: Vec<Global>,
    /// Function definitions, unique by name.
    pub functions: Vec<Function>,
}

impl Module {
    /// Current IL version emitted by the serializer.
    pub const IL_VERSION: &'static str = "0.1.2";

    /// Create an empty module at the current IL version.
    pub fn new() -> Self {
        Module {
            version: Self::IL_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up an extern by name.
    pub fn extern_decl(&self, name: &str) -> Option<&ExternDecl> {
        self.externs.iter().find(|e| e.name == name)
    }

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Register a source file path and return its id. An already-registered
    /// path keeps its original id.
    pub fn add_file(&mut self, path: impl Into<String>) -> u32 {
        let path = path.into();
        if let Some((id, _)) = self.files.iter().find(|(_, p)| *p == path) {
            return *id;
        }
        let id = self.files.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        self.files.push((id, path));
        id
    }

    /// Resolve a file id to its registered path.
    pub fn file_path(&self, id: u32) -> Option<&str> {
        self.files
            .iter()
            .find(|(fid, _)| *fid == id)
            .map(|(_, p)| p.as_str())
    }
}
