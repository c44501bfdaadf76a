//! External identifier mapping.
//!
//! [`IdMap`] wraps any [`BinaryIndex`] and lets callers choose the label of
//! every vector. The inner index keeps its sequential internal labels; the
//! wrapper translates them on the way out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BinaryIndexError, Result};
use crate::resources::DeviceResources;
use crate::results::SearchResults;
use crate::types::{BinaryCodes, Label, NO_LABEL};

use super::cagra::BinaryCagraIndex;
use super::cpu_graph::CpuGraphIndex;
use super::traits::{check_codes, BinaryIndex};

/// Index wrapper that maps internal labels to caller-supplied ids.
///
/// # Example
///
/// ```
/// use manifoldb_binary::index::{BinaryFlatIndex, BinaryIndex, IdMap};
/// use manifoldb_binary::types::BinaryCodes;
///
/// let mut index = IdMap::new(BinaryFlatIndex::new(8).unwrap()).unwrap();
/// let codes = BinaryCodes::new(vec![0x00, 0xFF], 8).unwrap();
/// index.add_with_ids(&codes, &[1_000_000, 1_000_001]).unwrap();
///
/// let results = index.search(&BinaryCodes::new(vec![0xFE], 8).unwrap(), 1).unwrap();
/// assert_eq!(results.labels_row(0), &[1_000_001]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap<I> {
    inner: I,
    ids: Vec<Label>,
    #[serde(skip)]
    reverse: HashMap<Label, usize>,
}

impl<I: BinaryIndex> IdMap<I> {
    /// Wrap an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::InvalidIds`] if `inner` already holds vectors.
    pub fn new(inner: I) -> Result<Self> {
        if !inner.is_empty() {
            return Err(BinaryIndexError::InvalidIds(format!(
                "wrapped index must be empty, holds {} vectors",
                inner.ntotal()
            )));
        }
        Ok(Self { inner, ids: Vec::new(), reverse: HashMap::new() })
    }

    /// External id of every vector, indexed by internal label.
    #[must_use]
    pub fn id_map(&self) -> &[Label] {
        &self.ids
    }

    /// The wrapped index.
    #[must_use]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut I {
        &mut self.inner
    }

    /// Unwrap, discarding the id mapping.
    #[must_use]
    pub fn into_inner(self) -> I {
        self.inner
    }

    /// Rebuild the reverse map and check it against the inner index.
    pub(crate) fn restore(&mut self) -> Result<()> {
        if self.ids.len() != self.inner.ntotal() {
            return Err(BinaryIndexError::Encoding(format!(
                "{} ids for {} vectors",
                self.ids.len(),
                self.inner.ntotal()
            )));
        }
        self.reverse.clear();
        for (internal, &id) in self.ids.iter().enumerate() {
            if id < 0 {
                return Err(BinaryIndexError::Encoding(format!("negative id {id}")));
            }
            if self.reverse.insert(id, internal).is_some() {
                return Err(BinaryIndexError::DuplicateId(id));
            }
        }
        Ok(())
    }

    fn check_ids(&self, codes: &BinaryCodes, ids: &[Label]) -> Result<()> {
        if ids.len() != codes.len() {
            return Err(BinaryIndexError::InvalidIds(format!(
                "{} ids for {} vectors",
                ids.len(),
                codes.len()
            )));
        }

        let mut batch = HashSet::with_capacity(ids.len());
        for &id in ids {
            if id < 0 {
                return Err(BinaryIndexError::InvalidIds(format!("negative id {id}")));
            }
            if self.reverse.contains_key(&id) || !batch.insert(id) {
                return Err(BinaryIndexError::DuplicateId(id));
            }
        }
        Ok(())
    }
}

impl<I> IdMap<I> {
    /// Replace the wrapped index, keeping the id mapping.
    pub(crate) fn map_inner<J>(self, f: impl FnOnce(I) -> J) -> IdMap<J> {
        IdMap { inner: f(self.inner), ids: self.ids, reverse: self.reverse }
    }
}

impl IdMap<BinaryCagraIndex> {
    /// Copy the wrapped device index into host memory, keeping the ids.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::NotTrained`] if the graph has not been built.
    pub fn to_cpu(&self) -> Result<IdMap<CpuGraphIndex>> {
        Ok(IdMap {
            inner: self.inner.to_cpu()?,
            ids: self.ids.clone(),
            reverse: self.reverse.clone(),
        })
    }
}

impl IdMap<CpuGraphIndex> {
    /// Copy the wrapped CPU graph index onto `device`, keeping the ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable, the index has no
    /// graph, or the device cannot hold it.
    pub fn to_device(
        &self,
        resources: &Arc<DeviceResources>,
        device: usize,
    ) -> Result<IdMap<BinaryCagraIndex>> {
        Ok(IdMap {
            inner: BinaryCagraIndex::from_cpu(resources, device, &self.inner)?,
            ids: self.ids.clone(),
            reverse: self.reverse.clone(),
        })
    }
}

impl<I: BinaryIndex> BinaryIndex for IdMap<I> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn ntotal(&self) -> usize {
        self.inner.ntotal()
    }

    fn is_trained(&self) -> bool {
        self.inner.is_trained()
    }

    fn train(&mut self, codes: &BinaryCodes) -> Result<()> {
        // Vectors stored by training would have no external id.
        if self.inner.train_stores_vectors() {
            return Err(BinaryIndexError::Unsupported(
                "training an index that stores its training vectors; use add_with_ids",
            ));
        }
        self.inner.train(codes)
    }

    fn add(&mut self, _codes: &BinaryCodes) -> Result<()> {
        Err(BinaryIndexError::Unsupported("add without ids; use add_with_ids"))
    }

    fn add_with_ids(&mut self, codes: &BinaryCodes, ids: &[Label]) -> Result<()> {
        check_codes(self.dimension(), codes)?;
        self.check_ids(codes, ids)?;

        let first = self.inner.ntotal();
        self.inner.add(codes)?;

        self.ids.extend_from_slice(ids);
        self.reverse.extend(ids.iter().enumerate().map(|(i, &id)| (id, first + i)));
        Ok(())
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        let mut results = self.inner.search(queries, k)?;
        results.map_labels(|internal| {
            usize::try_from(internal).ok().and_then(|i| self.ids.get(i)).copied().unwrap_or(NO_LABEL)
        });
        Ok(results)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()?;
        self.ids.clear();
        self.reverse.clear();
        Ok(())
    }

    fn reconstruct(&self, label: Label) -> Result<Vec<u8>> {
        let internal = self.reverse.get(&label).ok_or(BinaryIndexError::UnknownId(label))?;
        self.inner.reconstruct(*internal as Label)
    }
}
