//! The `IndexSet` tagged union from spec.md §9 Design Notes: "model as a
//! tagged variant `Dirty = All | Some(set)` with union semantics. Never
//! model as a bare set where 'empty' is ambiguous with 'unchanged'."

use rustc_hash::FxHashSet;
use std::hash::Hash;

/// Either "every index of this kind is dirty" or an explicit set of dirty
/// indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDirty<K> {
    All,
    Some(FxHashSet<K>),
}

impl<K> Default for IndexDirty<K> {
    fn default() -> Self {
        IndexDirty::Some(FxHashSet::default())
    }
}

impl<K: Eq + Hash + Clone> IndexDirty<K> {
    pub fn all() -> Self {
        IndexDirty::All
    }

    pub fn clean() -> Self {
        IndexDirty::Some(FxHashSet::default())
    }

    pub fn mark(&mut self, key: K) {
        if let IndexDirty::Some(set) = self {
            set.insert(key);
        }
    }

    pub fn is_dirty(&self, key: &K) -> bool {
        match self {
            IndexDirty::All => true,
            IndexDirty::Some(set) => set.contains(key),
        }
    }

    pub fn union(&mut self, other: &Self) {
        match (&mut *self, other) {
            (IndexDirty::All, _) => {}
            (_, IndexDirty::All) => *self = IndexDirty::All,
            (IndexDirty::Some(a), IndexDirty::Some(b)) => a.extend(b.iter().cloned()),
        }
    }
}

/// Which half of a [`super::Dirty`] record to act on: the likelihood's
/// dirty-set or the prior's. The oracle evaluates and clears them
/// independently (`log_likelihood` clears `lh`, `log_prior` clears
/// `prior`), even though every mutation marks both (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalKind {
    Likelihood,
    Prior,
}

/// One mutated field, as passed to [`super::Sample::mark`]. Area/feature/
/// family indices are data, not separate operator variants, matching
/// spec.md §9's "target-selection is a data field of the variant".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyField {
    Weights,
    Zone(usize),
    PGlobal(usize),
    PArea(usize, usize),
    PFamily(usize, usize),
}

/// `D.lh` or `D.prior`: `{ weights: bool, zones: set<z>, p_global: set<f>,
/// p_area: set<(z,f)>, p_family: set<(m,f)> }` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyFields {
    pub weights: bool,
    pub zones: IndexDirty<usize>,
    pub p_global: IndexDirty<usize>,
    pub p_area: IndexDirty<(usize, usize)>,
    pub p_family: IndexDirty<(usize, usize)>,
}

impl DirtyFields {
    pub fn all_dirty() -> Self {
        DirtyFields {
            weights: true,
            zones: IndexDirty::all(),
            p_global: IndexDirty::all(),
            p_area: IndexDirty::all(),
            p_family: IndexDirty::all(),
        }
    }

    pub fn clean() -> Self {
        DirtyFields {
            weights: false,
            zones: IndexDirty::clean(),
            p_global: IndexDirty::clean(),
            p_area: IndexDirty::clean(),
            p_family: IndexDirty::clean(),
        }
    }

    fn mark(&mut self, field: DirtyField) {
        match field {
            DirtyField::Weights => self.weights = true,
            DirtyField::Zone(z) => self.zones.mark(z),
            DirtyField::PGlobal(f) => self.p_global.mark(f),
            DirtyField::PArea(z, f) => self.p_area.mark((z, f)),
            DirtyField::PFamily(m, f) => self.p_family.mark((m, f)),
        }
    }
}

/// The chain-level dirty-set `D` (spec.md §3): parallel likelihood and
/// prior records, each set to all-dirty on construction and after deep
/// modification, cleared independently once the oracle has evaluated that
/// half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirty {
    pub lh: DirtyFields,
    pub prior: DirtyFields,
}

impl Dirty {
    pub fn all_dirty() -> Self {
        Dirty {
            lh: DirtyFields::all_dirty(),
            prior: DirtyFields::all_dirty(),
        }
    }

    /// Records a mutation for both `lh` and `prior` simultaneously
    /// (spec.md §4.2: "records a dirty entry for lh and prior
    /// simultaneously").
    pub fn mark(&mut self, field: DirtyField) {
        self.lh.mark(field);
        self.prior.mark(field);
    }

    pub fn clear(&mut self, kind: EvalKind) {
        match kind {
            EvalKind::Likelihood => self.lh = DirtyFields::clean(),
            EvalKind::Prior => self.prior = DirtyFields::clean(),
        }
    }
}
