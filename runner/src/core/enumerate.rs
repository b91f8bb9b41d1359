//! Work unit enumeration.
//!
//! Units are numbered `1..=count` and map to `{keypair_dir}/id{N}.json`. The bare
//! `id.json` in the same directory belongs to the fee payer and is never enumerated.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::core::unit::{UnitId, WorkUnit};

/// File name of the fee payer's keypair inside the keypair directory.
pub const FEE_PAYER_FILE: &str = "id.json";

/// Maps unit identifiers to credential paths under one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLayout {
    base_dir: PathBuf,
}

impl UnitLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resource_path(&self, id: UnitId) -> PathBuf {
        self.base_dir.join(format!("id{}.json", id.0))
    }

    /// Fee payer keypair used when none is configured explicitly.
    pub fn fee_payer_default(&self) -> PathBuf {
        self.base_dir.join(FEE_PAYER_FILE)
    }

    /// Units `1..=count` in ascending order, all `Pending`.
    pub fn enumerate(&self, count: u32) -> Enumeration {
        Enumeration {
            layout: self.clone(),
            ids: 1..=count,
        }
    }
}

/// Lazy, finite sequence of pending work units. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Enumeration {
    layout: UnitLayout,
    ids: RangeInclusive<u32>,
}

impl Iterator for Enumeration {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        let id = UnitId(self.ids.next()?);
        Some(WorkUnit::new(id, self.layout.resource_path(id)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Enumeration {}
