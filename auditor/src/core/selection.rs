//! Bookkeeping for which enumerated paths are runnable.

use anyhow::{Result, bail};
use rand::Rng;
use rand::seq::index::sample;

/// Runnable marks over a fixed-size path list, addressed by path index.
///
/// Also remembers the order in which paths were marked, which is the order
/// an audit runs them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelection {
    marks: Vec<bool>,
    order: Vec<usize>,
}

impl PathSelection {
    /// Every path selected (the initial state after enumeration).
    pub fn all(total: usize) -> Self {
        Self {
            marks: vec![true; total],
            order: (0..total).collect(),
        }
    }

    pub fn none(total: usize) -> Self {
        Self {
            marks: vec![false; total],
            order: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.marks.len()
    }

    pub fn select_all(&mut self) {
        self.marks.fill(true);
        self.order = (0..self.marks.len()).collect();
    }

    pub fn clear(&mut self) {
        self.marks.fill(false);
        self.order.clear();
    }

    pub fn set(&mut self, index: usize, selected: bool) -> Result<()> {
        let total = self.marks.len();
        match self.marks.get_mut(index) {
            Some(mark) => {
                let was = std::mem::replace(mark, selected);
                if selected && !was {
                    self.order.push(index);
                } else if !selected && was {
                    self.order.retain(|marked| *marked != index);
                }
                Ok(())
            }
            None => bail!("path index {index} out of range (0..{total})"),
        }
    }

    pub fn toggle(&mut self, index: usize) -> Result<()> {
        let current = self.is_selected(index);
        self.set(index, !current)
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.marks.get(index).copied().unwrap_or(false)
    }

    /// Replace the selection with `k` indices drawn uniformly without replacement.
    ///
    /// `k` is clamped to the number of paths.
    pub fn sample<R: Rng + ?Sized>(&mut self, k: usize, rng: &mut R) {
        self.clear();
        let amount = k.min(self.marks.len());
        let mut picked = sample(rng, self.marks.len(), amount).into_vec();
        picked.sort_unstable();
        for &index in &picked {
            self.marks[index] = true;
        }
        self.order = picked;
    }

    /// Selected indices in ascending order.
    pub fn selected(&self) -> Vec<usize> {
        self.marks
            .iter()
            .enumerate()
            .filter_map(|(index, selected)| selected.then_some(index))
            .collect()
    }

    /// Selected indices in the order they were marked.
    pub fn run_order(&self) -> &[usize] {
        &self.order
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }
}
