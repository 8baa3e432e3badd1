//! Layer Arena & Depth Ping-Pong
//!
//! [`LayerStack`] is a fixed-capacity arena of [`MAX_LAYERS`] slots with an
//! explicit active length. It lives as long as the orchestrator so a change of
//! `layer_count` only moves the length, never reallocates, and indexing past
//! the active length is reported instead of touching a stale slot.

use slotmap::Key;

use crate::errors::{PeelError, Result};
use crate::renderer::settings::MAX_LAYERS;
use crate::renderer::target::TargetHandle;

const CAPACITY: usize = MAX_LAYERS as usize;

/// Algorithmic role of a captured layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRole {
    /// Front-to-back capture; index 0 is the nearest surface.
    Peeled,
    /// Dual peeling, surfaces accumulated from the front.
    FrontAccumulator,
    /// Dual peeling, surfaces accumulated from the back.
    BackAccumulator,
}

/// A captured layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    pub index: u32,
    pub target: TargetHandle,
    pub role: LayerRole,
}

/// Fixed-capacity layer arena.
pub struct LayerStack {
    slots: [Option<Layer>; CAPACITY],
    len: u32,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [None; CAPACITY],
            len: 0,
        }
    }

    /// Active length.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the active length, emptying every slot.
    pub fn resize(&mut self, len: u32) -> Result<()> {
        if len == 0 || len > MAX_LAYERS {
            return Err(PeelError::ConfigurationInvalid(format!(
                "layer count {len} outside 1..={MAX_LAYERS}"
            )));
        }
        self.len = len;
        self.clear();
        Ok(())
    }

    /// Empty every slot, keeping the active length.
    pub fn clear(&mut self) {
        self.slots = [None; CAPACITY];
    }

    /// Store a layer at `index`, which must be below the active length.
    pub fn set(&mut self, index: u32, target: TargetHandle, role: LayerRole) -> Result<()> {
        self.check(index)?;
        self.slots[index as usize] = Some(Layer {
            index,
            target,
            role,
        });
        Ok(())
    }

    /// Layer at `index`. Empty slots and indices past the active length are
    /// configuration errors.
    pub fn get(&self, index: u32) -> Result<Layer> {
        self.check(index)?;
        self.slots[index as usize].ok_or_else(|| {
            PeelError::ConfigurationInvalid(format!("layer {index} was never captured"))
        })
    }

    /// Layers in the active range, nearest first. Empty slots are skipped.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Layer> {
        self.slots[..self.len as usize].iter().flatten()
    }

    /// Handles held by the active slots.
    pub fn handles(&self) -> impl Iterator<Item = TargetHandle> + '_ {
        self.iter().map(|layer| layer.target).filter(|h| !h.is_null())
    }

    fn check(&self, index: u32) -> Result<()> {
        if index >= self.len {
            return Err(PeelError::ConfigurationInvalid(format!(
                "layer index {index} beyond active length {}",
                self.len
            )));
        }
        Ok(())
    }
}

/// Pair of depth targets alternating between write target and read source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPingPong {
    buffers: [TargetHandle; 2],
}

impl DepthPingPong {
    #[must_use]
    pub fn new(first: TargetHandle, second: TargetHandle) -> Self {
        Self {
            buffers: [first, second],
        }
    }

    /// Buffer written at iteration `i`.
    #[inline]
    #[must_use]
    pub const fn write_index(iteration: u32) -> usize {
        (iteration % 2) as usize
    }

    /// Buffer holding the surface captured at iteration `i - 1`.
    #[inline]
    #[must_use]
    pub const fn read_index(iteration: u32) -> usize {
        1 - Self::write_index(iteration)
    }

    #[inline]
    #[must_use]
    pub fn write(&self, iteration: u32) -> TargetHandle {
        self.buffers[Self::write_index(iteration)]
    }

    #[inline]
    #[must_use]
    pub fn read(&self, iteration: u32) -> TargetHandle {
        self.buffers[Self::read_index(iteration)]
    }

    #[must_use]
    pub fn buffers(&self) -> [TargetHandle; 2] {
        self.buffers
    }
}
