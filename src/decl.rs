//! Declaration tables for the analyzed program.
//!
//! The host engine resolves calls and storage to declarations; the checker
//! keeps its own lightweight view of those declarations with the
//! annotation sets already resolved (see [`crate::annot`]), so hot-path
//! queries are bit tests rather than string comparisons.

use string_interner::{DefaultStringInterner, DefaultSymbol};

use crate::annot::{Annotation, AnnotationSet};
use crate::config::CheckerConfig;
use crate::types::TypeId;

/// Identifier for a function declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

impl FunctionId {
    /// The index of this function.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionId({})", self.0)
    }
}

/// Identifier for a global variable declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(u32);

impl GlobalId {
    /// The index of this global.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GlobalId({})", self.0)
    }
}

/// A function parameter.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    /// Parameter type.
    pub ty: TypeId,
    /// Resolved annotations.
    pub annotations: AnnotationSet,
}

impl ParamDecl {
    /// A parameter with no annotations.
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            annotations: AnnotationSet::EMPTY,
        }
    }
}

/// A function declaration as seen by the checker.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    name: DefaultSymbol,
    /// Enclosing namespace, if the source language has one.
    pub namespace: Option<String>,
    /// File the declaration resides in, for path-based trust rules.
    pub source_file: Option<String>,
    /// Parameters, in declaration order.
    pub params: Vec<ParamDecl>,
    /// Resolved annotations.
    pub annotations: AnnotationSet,
    /// Compiler builtin / intrinsic.
    pub is_builtin: bool,
    /// Trivial (no observable body, e.g. defaulted special members).
    pub is_trivial: bool,
    /// Declared never to return.
    pub is_no_return: bool,
}

impl FunctionDecl {
    fn new(name: DefaultSymbol) -> Self {
        Self {
            name,
            namespace: None,
            source_file: None,
            params: Vec::new(),
            annotations: AnnotationSet::EMPTY,
            is_builtin: false,
            is_trivial: false,
            is_no_return: false,
        }
    }

    /// Append a parameter, returning its index.
    pub fn add_param(&mut self, param: ParamDecl) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    /// Add an annotation to the function itself.
    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.insert(annotation);
    }

    /// Add an annotation to a parameter.
    pub fn annotate_param(&mut self, index: usize, annotation: Annotation) {
        self.params[index].annotations.insert(annotation);
    }

    /// Whether a parameter at `index` carries `annotation`.
    pub fn param_has(&self, index: usize, annotation: Annotation) -> bool {
        self.params
            .get(index)
            .map(|p| p.annotations.contains(annotation))
            .unwrap_or(false)
    }

    /// The first parameter index carrying `annotation`, if any.
    pub fn find_param(&self, annotation: Annotation) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p.annotations.contains(annotation))
    }
}

/// A global variable declaration.
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    name: DefaultSymbol,
    /// Declared type.
    pub ty: TypeId,
    /// Resolved annotations.
    pub annotations: AnnotationSet,
}

/// The declaration table.
#[derive(Debug, Default)]
pub struct DeclTable {
    names: DefaultStringInterner,
    functions: Vec<FunctionDecl>,
    globals: Vec<GlobalDecl>,
}

impl DeclTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function with no parameters or annotations yet.
    pub fn define_function(&mut self, name: &str) -> FunctionId {
        let sym = self.names.get_or_intern(name);
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionDecl::new(sym));
        id
    }

    /// Register a global variable.
    pub fn define_global(&mut self, name: &str, ty: TypeId) -> GlobalId {
        let sym = self.names.get_or_intern(name);
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalDecl {
            name: sym,
            ty,
            annotations: AnnotationSet::EMPTY,
        });
        id
    }

    /// Look up a function declaration.
    pub fn function(&self, id: FunctionId) -> &FunctionDecl {
        &self.functions[id.0 as usize]
    }

    /// Mutable access for registration.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionDecl {
        &mut self.functions[id.0 as usize]
    }

    /// Look up a global declaration.
    pub fn global(&self, id: GlobalId) -> &GlobalDecl {
        &self.globals[id.0 as usize]
    }

    /// Mutable access for registration.
    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalDecl {
        &mut self.globals[id.0 as usize]
    }

    /// The name of a function.
    pub fn function_name(&self, id: FunctionId) -> &str {
        self.names
            .resolve(self.function(id).name)
            .unwrap_or("<unnamed>")
    }

    /// The name of a global.
    pub fn global_name(&self, id: GlobalId) -> &str {
        self.names
            .resolve(self.global(id).name)
            .unwrap_or("<unnamed>")
    }

    /// Whether the function must be treated as "not a safepoint": either
    /// annotated so, or declared in a trusted low-level source path.
    pub fn is_not_safepoint(&self, id: FunctionId, config: &CheckerConfig) -> bool {
        let decl = self.function(id);
        if decl.annotations.contains(Annotation::NotSafepoint) {
            return true;
        }
        let Some(file) = decl.source_file.as_deref() else {
            return false;
        };
        // Match on the file name, not the full path.
        let file_name = file.rsplit(['/', '\\']).next().unwrap_or(file);
        config
            .not_safepoint_path_prefixes
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    #[test]
    fn test_function_registration() {
        let mut types = TypeTable::new();
        let value_ptr = {
            let v = types.named("vm_value_t");
            types.pointer_to(v)
        };
        let mut decls = DeclTable::new();
        let f = decls.define_function("vm_eval");
        let idx = decls.function_mut(f).add_param(ParamDecl::new(value_ptr));
        decls
            .function_mut(f)
            .annotate_param(idx, Annotation::MaybeUnrooted);

        assert_eq!(decls.function_name(f), "vm_eval");
        assert!(decls.function(f).param_has(idx, Annotation::MaybeUnrooted));
        assert_eq!(
            decls.function(f).find_param(Annotation::MaybeUnrooted),
            Some(idx)
        );
    }

    #[test]
    fn test_not_safepoint_by_path() {
        let config = CheckerConfig::default();
        let mut decls = DeclTable::new();
        let f = decls.define_function("helper");
        decls.function_mut(f).source_file = Some("src/lowlevel-intrinsics.c".to_string());
        assert!(decls.is_not_safepoint(f, &config));

        let g = decls.define_function("other");
        decls.function_mut(g).source_file = Some("src/interp.c".to_string());
        assert!(!decls.is_not_safepoint(g, &config));
    }
}
