//! Symbolic value and memory-region model.
//!
//! The host engine vends stable identities for pointer-like values
//! ([`SymbolId`]) and for storage locations ([`RegionId`]). Derivation
//! chains (a symbol standing for "the value of region R", a region
//! standing for "the storage pointed to by symbol S") are stored as tagged
//! entries in a table, indexed rather than back-referenced, so the walk
//! routines terminate structurally.

use std::collections::HashMap;

use crate::decl::GlobalId;
use crate::types::TypeId;

/// Stable identity for a pointer-like symbolic value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The index of this symbol.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// Stable identity for a memory region.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

impl RegionId {
    /// The index of this region.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "reg{}", self.0)
    }
}

/// How a symbol came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Conjured out of nothing for an expression the host could not
    /// evaluate (fresh identity).
    Conjured {
        /// The type the symbol stands for.
        ty: TypeId,
    },
    /// The initial value of a region.
    RegionValue {
        /// The region whose value this is.
        region: RegionId,
    },
    /// A value derived from the contents of a region (field read, element
    /// read) of a symbolic parent.
    Derived {
        /// The symbol the derivation started from.
        parent: SymbolId,
        /// The region that was read.
        region: RegionId,
    },
}

/// What a region is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKind {
    /// A declared variable's storage.
    Var {
        /// Whether the variable has global storage.
        global: bool,
        /// The global declaration, when known.
        decl: Option<GlobalId>,
        /// Set when the variable is a function parameter:
        /// (function, parameter index).
        param: Option<(crate::decl::FunctionId, usize)>,
        /// Declared type.
        ty: TypeId,
    },
    /// The region a symbolic pointer points at.
    Symbolic {
        /// The pointer symbol.
        symbol: SymbolId,
    },
    /// An element of an array-like super region.
    Element {
        /// The super region.
        parent: RegionId,
    },
    /// A named field of a super region.
    Field {
        /// The super region.
        parent: RegionId,
        /// Field name.
        name: String,
    },
}

/// The symbol/region derivation table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolKind>,
    regions: Vec<RegionKind>,
    region_values: HashMap<RegionId, SymbolId>,
    symbolic_regions: HashMap<SymbolId, RegionId>,
    field_regions: HashMap<(RegionId, String), RegionId>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_symbol(&mut self, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(kind);
        id
    }

    fn push_region(&mut self, kind: RegionKind) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(kind);
        id
    }

    /// Synthesize a fresh symbol with no provenance.
    pub fn conjure(&mut self, ty: TypeId) -> SymbolId {
        self.push_symbol(SymbolKind::Conjured { ty })
    }

    /// The symbol standing for the initial value of `region`. Stable:
    /// repeated calls return the same identity.
    pub fn region_value(&mut self, region: RegionId) -> SymbolId {
        if let Some(&sym) = self.region_values.get(&region) {
            return sym;
        }
        let sym = self.push_symbol(SymbolKind::RegionValue { region });
        self.region_values.insert(region, sym);
        sym
    }

    /// A symbol derived from reading `region` starting at `parent`.
    pub fn derived(&mut self, parent: SymbolId, region: RegionId) -> SymbolId {
        self.push_symbol(SymbolKind::Derived { parent, region })
    }

    /// A local variable's storage.
    pub fn local_region(&mut self, ty: TypeId) -> RegionId {
        self.push_region(RegionKind::Var {
            global: false,
            decl: None,
            param: None,
            ty,
        })
    }

    /// A function parameter's storage.
    pub fn param_region(
        &mut self,
        function: crate::decl::FunctionId,
        index: usize,
        ty: TypeId,
    ) -> RegionId {
        self.push_region(RegionKind::Var {
            global: false,
            decl: None,
            param: Some((function, index)),
            ty,
        })
    }

    /// A global variable's storage.
    pub fn global_region(&mut self, decl: GlobalId, ty: TypeId) -> RegionId {
        self.push_region(RegionKind::Var {
            global: true,
            decl: Some(decl),
            param: None,
            ty,
        })
    }

    /// The region a symbolic pointer points at. Stable per symbol.
    pub fn symbolic_region(&mut self, symbol: SymbolId) -> RegionId {
        if let Some(&region) = self.symbolic_regions.get(&symbol) {
            return region;
        }
        let region = self.push_region(RegionKind::Symbolic { symbol });
        self.symbolic_regions.insert(symbol, region);
        region
    }

    /// An element region of `parent`.
    pub fn element_region(&mut self, parent: RegionId) -> RegionId {
        self.push_region(RegionKind::Element { parent })
    }

    /// The named field region of `parent`. Stable per (parent, name).
    pub fn field_region(&mut self, parent: RegionId, name: &str) -> RegionId {
        let key = (parent, name.to_string());
        if let Some(&region) = self.field_regions.get(&key) {
            return region;
        }
        let region = self.push_region(RegionKind::Field {
            parent,
            name: name.to_string(),
        });
        self.field_regions.insert(key, region);
        region
    }

    /// The kind of a symbol.
    pub fn symbol_kind(&self, id: SymbolId) -> &SymbolKind {
        &self.symbols[id.0 as usize]
    }

    /// The kind of a region.
    pub fn region_kind(&self, id: RegionId) -> &RegionKind {
        &self.regions[id.0 as usize]
    }

    /// The region a symbol originates from, if it has one.
    pub fn origin_region(&self, id: SymbolId) -> Option<RegionId> {
        match self.symbol_kind(id) {
            SymbolKind::RegionValue { region } => Some(*region),
            SymbolKind::Derived { region, .. } => Some(*region),
            SymbolKind::Conjured { .. } => None,
        }
    }

    /// The symbol of the nearest symbolic region at or above `region`,
    /// walking element/field super regions.
    pub fn symbolic_base(&self, mut region: RegionId) -> Option<SymbolId> {
        loop {
            match self.region_kind(region) {
                RegionKind::Symbolic { symbol } => return Some(*symbol),
                RegionKind::Element { parent } | RegionKind::Field { parent, .. } => {
                    region = *parent;
                }
                RegionKind::Var { .. } => return None,
            }
        }
    }

    /// The symbol of `region` itself, without walking super regions.
    pub fn direct_symbol(&self, region: RegionId) -> Option<SymbolId> {
        match self.region_kind(region) {
            RegionKind::Symbolic { symbol } => Some(*symbol),
            _ => None,
        }
    }

    /// The outermost ancestor of `region` (its base region).
    pub fn base_region(&self, mut region: RegionId) -> RegionId {
        loop {
            match self.region_kind(region) {
                RegionKind::Element { parent } | RegionKind::Field { parent, .. } => {
                    region = *parent;
                }
                _ => return region,
            }
        }
    }

    /// The immediate super region of an element/field region.
    pub fn super_region(&self, region: RegionId) -> Option<RegionId> {
        match self.region_kind(region) {
            RegionKind::Element { parent } | RegionKind::Field { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// Whether the region is an element of an array-like super region.
    pub fn is_element(&self, region: RegionId) -> bool {
        matches!(self.region_kind(region), RegionKind::Element { .. })
    }

    /// Walk back through the derivation chain to a variable region with
    /// global storage, if the value was ultimately derived from one.
    pub fn walk_back_to_global(&self, start: RegionId) -> Option<RegionId> {
        let mut region = start;
        loop {
            match self.region_kind(region) {
                RegionKind::Var { global: true, .. } => return Some(region),
                RegionKind::Var { global: false, .. } => return None,
                RegionKind::Symbolic { symbol } => match self.symbol_kind(*symbol) {
                    SymbolKind::RegionValue { region: r } => region = *r,
                    SymbolKind::Derived { region: r, .. } => region = *r,
                    SymbolKind::Conjured { .. } => return None,
                },
                RegionKind::Element { parent } | RegionKind::Field { parent, .. } => {
                    region = *parent;
                }
            }
        }
    }

    /// The declared global behind a region, if any.
    pub fn global_decl(&self, region: RegionId) -> Option<GlobalId> {
        match self.region_kind(region) {
            RegionKind::Var {
                global: true, decl, ..
            } => *decl,
            _ => None,
        }
    }

    /// The declared type of a variable region.
    pub fn var_type(&self, region: RegionId) -> Option<TypeId> {
        match self.region_kind(region) {
            RegionKind::Var { ty, .. } => Some(*ty),
            _ => None,
        }
    }
}
