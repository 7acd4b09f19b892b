//! Block-distributed arrays with arena-backed, alias-capable storage.
//!
//! A `DistArray<T>` is a logical array over a `BoxArray`: each box holds a
//! flat patch of `T`, owned by the rank the `RankMap` assigns. The engines
//! use iota rank maps, so a rank owns at most one patch.
//!
//! Patches live inside a shared `Arena`. Two arrays whose live ranges do not
//! overlap within one transform traversal may view the same arena (the
//! r-phase/c-phase alias pairs); the `RefCell` borrow enforces that contract
//! at runtime instead of a debug assertion.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use num_complex::Complex64;

use crate::domain::{BoxArray, IndexBox, RankMap};
use crate::error::{FftError, Result};

/// Element types storable in a `DistArray`. `UNITS` is the width in f64
/// words, the arena's allocation unit.
pub trait Element: bytemuck::Pod {
    const UNITS: usize;
}

impl Element for f64 {
    const UNITS: usize = 1;
}

impl Element for Complex64 {
    const UNITS: usize = 2;
}

/// A shared flat buffer of f64 words backing one or two array patches.
#[derive(Debug)]
pub struct Arena {
    words: RefCell<Vec<f64>>,
}

impl Arena {
    /// Allocate `words` f64 words, zero-initialized.
    pub fn alloc(words: usize, component: &'static str) -> Result<Rc<Arena>> {
        let mut v = Vec::new();
        v.try_reserve_exact(words)
            .map_err(|_| FftError::OutOfMemory {
                component,
                bytes: words * std::mem::size_of::<f64>(),
            })?;
        v.resize(words, 0.0);
        Ok(Rc::new(Arena {
            words: RefCell::new(v),
        }))
    }
}

/// The local patch of a distributed array: which box this rank owns and a
/// typed view into the arena.
struct Patch {
    box_id: usize,
    arena: Rc<Arena>,
}

/// A distributed array over a box array. `T` is `f64` for real arrays or
/// `Complex64` for spectral arrays.
pub struct DistArray<T: Element> {
    boxes: BoxArray,
    rank_map: RankMap,
    patch: Option<Patch>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Element> Default for DistArray<T> {
    fn default() -> Self {
        Self {
            boxes: BoxArray::default(),
            rank_map: RankMap::default(),
            patch: None,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Element> DistArray<T> {
    /// Define the layout without attaching storage (the `no_alloc` define of
    /// the underlying collaborator). Storage arrives via `attach`.
    pub fn define(boxes: BoxArray, rank_map: RankMap) -> Self {
        debug_assert_eq!(boxes.len(), rank_map.ranks.len());
        Self {
            boxes,
            rank_map,
            patch: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// An empty array: no boxes, no storage. Phases that a configuration
    /// does not use stay empty.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &BoxArray {
        &self.boxes
    }

    pub fn rank_map(&self) -> &RankMap {
        &self.rank_map
    }

    pub fn num_boxes(&self) -> usize {
        self.boxes.len()
    }

    /// Words of arena storage the patch of `rank` requires.
    pub fn local_words(&self, rank: usize) -> usize {
        self.rank_map
            .box_of_rank(rank)
            .map_or(0, |id| self.boxes.get(id).num_pts() * T::UNITS)
    }

    /// Bind this rank's patch to `arena`. The patch occupies the front of
    /// the arena; alias partners share the same span in time-disjoint
    /// phases, not side by side.
    pub fn attach(&mut self, rank: usize, arena: &Rc<Arena>) {
        if let Some(box_id) = self.rank_map.box_of_rank(rank) {
            debug_assert!(arena.words.borrow().len() >= self.boxes.get(box_id).num_pts() * T::UNITS);
            self.patch = Some(Patch {
                box_id,
                arena: Rc::clone(arena),
            });
        }
    }

    /// The box owned by this rank, if any.
    pub fn local_box(&self) -> Option<&IndexBox> {
        self.patch.as_ref().map(|p| self.boxes.get(p.box_id))
    }

    pub fn local_box_id(&self) -> Option<usize> {
        self.patch.as_ref().map(|p| p.box_id)
    }

    /// Immutable typed view of the local patch.
    ///
    /// Panics if the alias partner currently holds a mutable borrow; that
    /// is a phase-ordering bug in the caller.
    pub fn local(&self) -> Option<Ref<'_, [T]>> {
        self.patch.as_ref().map(|p| {
            let n = self.boxes.get(p.box_id).num_pts() * T::UNITS;
            Ref::map(p.arena.words.borrow(), |w| {
                bytemuck::cast_slice(&w[..n])
            })
        })
    }

    /// Mutable typed view of the local patch. Same aliasing contract as
    /// `local`.
    pub fn local_mut(&self) -> Option<RefMut<'_, [T]>> {
        self.patch.as_ref().map(|p| {
            let n = self.boxes.get(p.box_id).num_pts() * T::UNITS;
            RefMut::map(p.arena.words.borrow_mut(), |w| {
                bytemuck::cast_slice_mut(&mut w[..n])
            })
        })
    }
}

/// Allocate one arena sized for the larger of two alias partners and attach
/// both. Either array may be empty.
pub fn alias_pair<A: Element, B: Element>(
    a: &mut DistArray<A>,
    b: &mut DistArray<B>,
    rank: usize,
    component: &'static str,
) -> Result<Rc<Arena>> {
    let words = a.local_words(rank).max(b.local_words(rank)).max(1);
    let arena = Arena::alloc(words, component)?;
    a.attach(rank, &arena);
    b.attach(rank, &arena);
    Ok(arena)
}
