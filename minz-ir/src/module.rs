//! A MIR `Module` (spec §3.2).

use crate::entities::{FuncId, GlobalId, StringId};
use crate::function::Function;
use crate::types::Type;
use cranelift_entity::PrimaryMap;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: Option<i64>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct InternedString {
    pub value: String,
    pub label: String,
}

/// Owns every global, string, and function in a compilation unit (spec
/// §3.2, §3.7: "Modules own their functions, globals, and strings").
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    globals: PrimaryMap<GlobalId, Global>,
    strings: PrimaryMap<StringId, InternedString>,
    functions: PrimaryMap<FuncId, Function>,
    func_index: HashMap<String, FuncId>,
    global_index: HashMap<String, GlobalId>,
    next_string_label: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module { name: name.into(), ..Default::default() }
    }

    pub fn declare_global(&mut self, global: Global) -> GlobalId {
        let name = global.name.clone();
        let id = self.globals.push(global);
        self.global_index.insert(name, id);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id]
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals.iter()
    }

    /// Intern a string literal, returning its stable label. Interning the
    /// same text twice returns two distinct `StringId`s with distinct
    /// labels, matching a straightforward one-literal-per-use-site model;
    /// callers that want deduplication do it themselves before calling this.
    pub fn intern_string(&mut self, value: impl Into<String>) -> StringId {
        let label = format!("str_{}", self.next_string_label);
        self.next_string_label += 1;
        self.strings.push(InternedString { value: value.into(), label })
    }

    pub fn string(&self, id: StringId) -> &InternedString {
        &self.strings[id]
    }

    pub fn strings(&self) -> impl Iterator<Item = (StringId, &InternedString)> {
        self.strings.iter()
    }

    pub fn declare_function(&mut self, func: Function) -> FuncId {
        let name = func.name.clone();
        let id = self.functions.push(func);
        self.func_index.insert(name, id);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.func_index.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = (FuncId, &mut Function)> {
        self.functions.iter_mut()
    }

    pub fn function_ids(&self) -> Vec<FuncId> {
        self.functions.keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_text_twice_yields_distinct_labels() {
        let mut m = Module::new("prog");
        let a = m.intern_string("Hi");
        let b = m.intern_string("Hi");
        assert_ne!(a, b);
        assert_eq!(m.string(a).label, "str_0");
        assert_eq!(m.string(b).label, "str_1");
    }

    #[test]
    fn function_lookup_by_name() {
        let mut m = Module::new("prog");
        let f = Function::new("m_main", Type::Void);
        let id = m.declare_function(f);
        assert_eq!(m.function_by_name("m_main"), Some(id));
        assert_eq!(m.function_by_name("nope"), None);
    }
}
