//! Type model and tracked-type registry.
//!
//! The checker only needs a shallow view of the analyzed program's types:
//! enough to peel pointer/array indirection and classify the underlying
//! named type as collector-tracked, permanently rooted, or neither. The
//! classification itself is data, not law: the suffix lists live in
//! [`TypeRegistry`] and can be swapped per target runtime.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Identifier for a type in the [`TypeTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// The index of this type.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// The shape of a type, as far as the checker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A named struct/typedef from the checked codebase.
    Named(DefaultSymbol),
    /// Pointer to another type.
    Pointer(TypeId),
    /// Array of another type.
    Array(TypeId),
    /// A function-pointer type; carries whether its declaration was
    /// annotated as not a safepoint.
    FnPointer {
        /// `gc_not_safepoint` on the pointer typedef.
        not_safepoint: bool,
    },
    /// `void`.
    Void,
    /// Any scalar (integers, floats, booleans).
    Scalar,
}

/// Interning table for the types seen by the checker.
#[derive(Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    names: DefaultStringInterner,
    by_name: HashMap<DefaultSymbol, TypeId>,
}

impl TypeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    /// Intern a named type. Repeated calls with the same name return the
    /// same id.
    pub fn named(&mut self, name: &str) -> TypeId {
        let sym = self.names.get_or_intern(name);
        if let Some(&id) = self.by_name.get(&sym) {
            return id;
        }
        let id = self.push(TypeKind::Named(sym));
        self.by_name.insert(sym, id);
        id
    }

    /// A pointer to `inner`.
    pub fn pointer_to(&mut self, inner: TypeId) -> TypeId {
        self.push(TypeKind::Pointer(inner))
    }

    /// An array of `inner`.
    pub fn array_of(&mut self, inner: TypeId) -> TypeId {
        self.push(TypeKind::Array(inner))
    }

    /// A function-pointer type.
    pub fn fn_pointer(&mut self, not_safepoint: bool) -> TypeId {
        self.push(TypeKind::FnPointer { not_safepoint })
    }

    /// The `void` type.
    pub fn void(&mut self) -> TypeId {
        self.push(TypeKind::Void)
    }

    /// An anonymous scalar type.
    pub fn scalar(&mut self) -> TypeId {
        self.push(TypeKind::Scalar)
    }

    /// The kind of a type.
    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.kinds[id.0 as usize]
    }

    /// Peel pointer and array layers down to the element type.
    pub fn strip_indirection(&self, mut id: TypeId) -> TypeId {
        loop {
            match self.kind(id) {
                TypeKind::Pointer(inner) | TypeKind::Array(inner) => id = inner,
                _ => return id,
            }
        }
    }

    /// Whether a type is a pointer.
    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Pointer(_))
    }

    /// The underlying name after stripping indirection, if any.
    pub fn underlying_name(&self, id: TypeId) -> Option<&str> {
        match self.kind(self.strip_indirection(id)) {
            TypeKind::Named(sym) => self.names.resolve(sym),
            _ => None,
        }
    }
}

/// Classification data for the checked runtime's type names.
///
/// Tracked/permanent classification is done by case-insensitive suffix
/// matching against the underlying type name, mirroring how typedef chains
/// in the checked codebase end in the canonical runtime names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    /// Suffixes of type names holding collector-managed data.
    pub tracked_suffixes: Vec<String>,
    /// Suffixes of tracked types that are permanently reachable
    /// (interned, never collected).
    pub permanent_suffixes: Vec<String>,
    /// `(container, backing)` pairs: extracting the backing buffer type
    /// from the container type stays tracked even though the backing type
    /// is not itself in the tracked list.
    pub container_carveouts: Vec<(String, String)>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            tracked_suffixes: [
                "vm_value_t",
                "vm_array_t",
                "vm_sym_t",
                "vm_module_t",
                "vm_datatype_t",
                "vm_method_t",
                "vm_code_t",
                "vm_task_t",
                "vm_binding_t",
                "vm_tuple_t",
                "vm_vec_t",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            permanent_suffixes: vec!["vm_sym_t".to_string()],
            container_carveouts: vec![("vm_module_t".to_string(), "raw_buf_t".to_string())],
        }
    }
}

fn suffix_matches(name: &str, suffix: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(&suffix.to_ascii_lowercase())
}

impl TypeRegistry {
    /// Whether the type (after stripping indirection) holds
    /// collector-managed data.
    pub fn is_tracked(&self, types: &TypeTable, ty: TypeId) -> bool {
        match types.underlying_name(ty) {
            Some(name) => self.tracked_suffixes.iter().any(|s| suffix_matches(name, s)),
            None => false,
        }
    }

    /// Whether the type is permanently rooted (never collected).
    pub fn is_permanently_rooted(&self, types: &TypeTable, ty: TypeId) -> bool {
        match types.underlying_name(ty) {
            Some(name) => self
                .permanent_suffixes
                .iter()
                .any(|s| suffix_matches(name, s)),
            None => false,
        }
    }

    /// Whether deriving `result` from `parent` is the registered
    /// container-to-backing extraction, which stays tracked.
    pub fn is_backing_extraction(
        &self,
        types: &TypeTable,
        parent: TypeId,
        result: TypeId,
    ) -> bool {
        let (Some(parent_name), Some(result_name)) =
            (types.underlying_name(parent), types.underlying_name(result))
        else {
            return false;
        };
        self.container_carveouts.iter().any(|(container, backing)| {
            suffix_matches(parent_name, container) && suffix_matches(result_name, backing)
        })
    }

    /// Whether a parameter type is an out-parameter for a tracked value,
    /// i.e. pointer to pointer to a tracked type.
    pub fn is_tracked_out_param(&self, types: &TypeTable, ty: TypeId) -> bool {
        let TypeKind::Pointer(inner) = types.kind(ty) else {
            return false;
        };
        types.is_pointer(inner) && self.is_tracked(types, inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_through_indirection() {
        let mut types = TypeTable::new();
        let value = types.named("vm_value_t");
        let ptr = types.pointer_to(value);
        let ptr_ptr = types.pointer_to(ptr);
        let registry = TypeRegistry::default();
        assert!(registry.is_tracked(&types, value));
        assert!(registry.is_tracked(&types, ptr));
        assert!(registry.is_tracked(&types, ptr_ptr));
    }

    #[test]
    fn test_suffix_match_is_case_insensitive() {
        let mut types = TypeTable::new();
        let ty = types.named("My_VM_Value_T");
        let registry = TypeRegistry::default();
        assert!(registry.is_tracked(&types, ty));
    }

    #[test]
    fn test_permanent_is_narrower_than_tracked() {
        let mut types = TypeTable::new();
        let sym = types.named("vm_sym_t");
        let value = types.named("vm_value_t");
        let registry = TypeRegistry::default();
        assert!(registry.is_permanently_rooted(&types, sym));
        assert!(!registry.is_permanently_rooted(&types, value));
    }

    #[test]
    fn test_backing_extraction() {
        let mut types = TypeTable::new();
        let module = types.named("vm_module_t");
        let module_ptr = types.pointer_to(module);
        let buf = types.named("raw_buf_t");
        let scalar = types.scalar();
        let registry = TypeRegistry::default();
        assert!(registry.is_backing_extraction(&types, module_ptr, buf));
        assert!(!registry.is_backing_extraction(&types, module_ptr, scalar));
    }

    #[test]
    fn test_out_param_shape() {
        let mut types = TypeTable::new();
        let value = types.named("vm_value_t");
        let ptr = types.pointer_to(value);
        let ptr_ptr = types.pointer_to(ptr);
        let registry = TypeRegistry::default();
        assert!(registry.is_tracked_out_param(&types, ptr_ptr));
        assert!(!registry.is_tracked_out_param(&types, ptr));
    }
}
