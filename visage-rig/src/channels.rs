//! Channel table - the per-avatar intensity slots the renderer reads

use std::collections::HashMap;

/// One bound morph-target channel.
#[derive(Debug, Clone)]
struct Channel {
    /// Channel name as exposed by the mesh
    name: String,
    /// The mesh's own index for this channel (stable for the binding's life)
    mesh_index: usize,
    /// Current intensity (0.0 = inactive, 1.0 = fully applied)
    intensity: f32,
}

/// Intensity slots for the viseme-relevant channels of one bound avatar.
///
/// Built once at bind time and never restructured afterwards: slot indices
/// stay valid for the lifetime of the binding. The blend engine writes
/// intensities by slot; the render step reads them back each frame and
/// applies them to the mesh via the stored mesh indices.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: Vec<Channel>,
    by_name: HashMap<String, usize>,
}

impl ChannelTable {
    /// Build a table from (name, mesh index) pairs. Duplicate names keep
    /// the first occurrence.
    pub fn new(entries: impl IntoIterator<Item = (String, usize)>) -> Self {
        let mut table = Self::default();
        for (name, mesh_index) in entries {
            if table.by_name.contains_key(&name) {
                continue;
            }
            table.by_name.insert(name.clone(), table.channels.len());
            table.channels.push(Channel {
                name,
                mesh_index,
                intensity: 0.0,
            });
        }
        table
    }

    /// Number of bound channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if no channels are bound.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Slot for a channel name, if bound.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Channel name for a slot.
    pub fn name(&self, slot: usize) -> Option<&str> {
        self.channels.get(slot).map(|c| c.name.as_str())
    }

    /// The mesh's own channel index for a slot.
    pub fn mesh_index(&self, slot: usize) -> Option<usize> {
        self.channels.get(slot).map(|c| c.mesh_index)
    }

    /// Current intensity for a slot (0.0 for unknown slots).
    pub fn intensity(&self, slot: usize) -> f32 {
        self.channels.get(slot).map_or(0.0, |c| c.intensity)
    }

    /// Write an intensity. Values clamp to [0, 1]; unknown slots are ignored.
    pub fn set_intensity(&mut self, slot: usize, intensity: f32) {
        if let Some(channel) = self.channels.get_mut(slot) {
            channel.intensity = intensity.clamp(0.0, 1.0);
        }
    }

    /// Zero every intensity.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.intensity = 0.0;
        }
    }

    /// Iterate (mesh index, intensity) pairs for applying to the mesh.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.channels.iter().map(|c| (c.mesh_index, c.intensity))
    }
}
