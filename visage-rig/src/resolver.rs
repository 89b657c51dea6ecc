//! Channel discovery - finds the viseme-bearing channel group on a mesh
//!
//! Avatar meshes expose dozens of morph targets across several nodes
//! (body, outfit, hair, face). Only one node carries the mouth shapes we
//! can drive, and different rigs name those shapes differently. The
//! resolver scores every channel-bearing node against the known naming
//! conventions and binds the winner.

use thiserror::Error;
use tracing::debug;

use crate::channels::ChannelTable;
use crate::viseme::{NamingConvention, VisemeClass, VisemeMap};

/// Score contribution of one canonical viseme channel name.
const CANONICAL_WEIGHT: i32 = 10;
/// Score contribution of one alternate-convention channel name.
const ALTERNATE_WEIGHT: i32 = 8;
/// Score contribution of one generic mouth-vocabulary hit.
const FALLBACK_WEIGHT: i32 = 1;
/// Bonus when the node's own name suggests a head or face mesh.
const NODE_NAME_BONUS: i32 = 5;

/// Generic mouth vocabulary, consulted only when convention coverage is
/// weak. These names cannot be driven directly but mark a face node.
const FALLBACK_VOCABULARY: [&str; 7] =
    ["mouth", "jaw", "lip", "tongue", "teeth", "smile", "cheek"];

/// Node-name fragments that suggest the head mesh.
const HEAD_HINTS: [&str; 4] = ["head", "face", "skull", "avatarhead"];

/// Channel inventory of a single mesh node, as handed over by the loader.
#[derive(Debug, Clone)]
pub struct ChannelInventory {
    /// Name of the owning mesh/node (may be empty when the loader has none).
    pub node_name: String,
    /// (channel name, mesh channel index) pairs.
    pub channels: Vec<(String, usize)>,
}

/// Structured scoring rationale for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeScore {
    /// Channel names matching the canonical `viseme_*` set.
    pub canonical_hits: usize,
    /// Channel names matching the alternate expression set.
    pub alternate_hits: usize,
    /// Generic mouth-vocabulary hits (counted only when coverage is weak).
    pub fallback_hits: usize,
    /// Whether the node name earned the head/face bonus.
    pub name_bonus: bool,
    /// Weighted total.
    pub total: i32,
}

/// Errors that can occur while binding an avatar.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("channel inventory is empty")]
    EmptyInventory,
    #[error("no viseme-capable channels found on any node")]
    NoVisemeChannels,
}

/// A successful binding: the viseme channel table plus the convention and
/// class lookup the engine drives it with.
#[derive(Debug, Clone)]
pub struct RigBinding {
    /// Intensity slots for the viseme-relevant channels only.
    pub table: ChannelTable,
    /// Naming convention the winning node uses.
    pub convention: NamingConvention,
    /// Slot for each viseme class, None where the convention has no channel.
    pub class_slots: [Option<usize>; VisemeClass::COUNT],
    /// Scoring rationale for the winning node.
    pub score: NodeScore,
}

impl RigBinding {
    /// Slot driven by a viseme class, if the rig can express it.
    pub fn slot_for(&self, class: VisemeClass) -> Option<usize> {
        self.class_slots[class as usize]
    }

    /// Slot of the silence/rest channel, if the rig has one.
    pub fn silence_slot(&self) -> Option<usize> {
        self.slot_for(VisemeClass::Sil)
    }
}

/// Score a single node. Pure: same inventory, same score.
pub fn score_node(inventory: &ChannelInventory) -> NodeScore {
    let mut score = NodeScore::default();

    for (name, _) in &inventory.channels {
        if VisemeMap::class_for(name, NamingConvention::Canonical).is_some() {
            score.canonical_hits += 1;
        } else if VisemeMap::class_for(name, NamingConvention::Alternate).is_some() {
            score.alternate_hits += 1;
        } else {
            let lower = name.to_lowercase();
            if FALLBACK_VOCABULARY.iter().any(|v| lower.contains(v)) {
                score.fallback_hits += 1;
            }
        }
    }

    let node_lower = inventory.node_name.to_lowercase();
    score.name_bonus = HEAD_HINTS.iter().any(|h| node_lower.contains(h));

    // Weak convention coverage lets the generic vocabulary speak; a node
    // with solid canonical coverage doesn't need it.
    let weak = score.canonical_hits < score.alternate_hits.max(3);
    score.total = CANONICAL_WEIGHT * score.canonical_hits as i32
        + ALTERNATE_WEIGHT * score.alternate_hits as i32
        + if weak {
            FALLBACK_WEIGHT * score.fallback_hits as i32
        } else {
            0
        }
        + if score.name_bonus { NODE_NAME_BONUS } else { 0 };

    score
}

/// Scan the inventories and bind the best viseme-bearing node.
///
/// Returns an error when nothing is bindable; the caller should disable
/// facial animation and carry on rather than treat this as fatal.
pub fn bind(inventories: &[ChannelInventory]) -> Result<RigBinding, BindError> {
    if inventories.is_empty() {
        return Err(BindError::EmptyInventory);
    }

    let mut best: Option<(usize, NodeScore)> = None;
    for (idx, inventory) in inventories.iter().enumerate() {
        let score = score_node(inventory);
        debug!(
            node = %inventory.node_name,
            canonical = score.canonical_hits,
            alternate = score.alternate_hits,
            fallback = score.fallback_hits,
            total = score.total,
            "scored channel node"
        );

        let better = match &best {
            None => true,
            // Ties break toward the node with more canonical coverage.
            Some((_, b)) => {
                score.total > b.total
                    || (score.total == b.total && score.canonical_hits > b.canonical_hits)
            }
        };
        if better {
            best = Some((idx, score));
        }
    }

    let (winner_idx, score) = best.ok_or(BindError::NoVisemeChannels)?;
    if score.canonical_hits == 0 && score.alternate_hits == 0 {
        // Generic vocabulary alone picks a face node but gives the viseme
        // tables nothing to drive.
        return Err(BindError::NoVisemeChannels);
    }

    // The canonical tables win unless the node covers more classes under
    // the alternate naming.
    let convention = if score.canonical_hits >= score.alternate_hits {
        NamingConvention::Canonical
    } else {
        NamingConvention::Alternate
    };

    let winner = &inventories[winner_idx];
    let mut entries: Vec<(String, usize)> = Vec::new();
    for class in VisemeClass::ALL {
        for t in VisemeMap::resolve(class, convention) {
            if let Some((name, mesh_index)) =
                winner.channels.iter().find(|(n, _)| n.as_str() == t.channel)
            {
                entries.push((name.clone(), *mesh_index));
            }
        }
    }
    let table = ChannelTable::new(entries);

    let mut class_slots = [None; VisemeClass::COUNT];
    for class in VisemeClass::ALL {
        class_slots[class as usize] = VisemeMap::resolve(class, convention)
            .iter()
            .find_map(|t| table.slot(t.channel));
    }

    debug!(
        node = %winner.node_name,
        ?convention,
        channels = table.len(),
        "bound viseme channels"
    );

    Ok(RigBinding {
        table,
        convention,
        class_slots,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A node exposing the full canonical viseme set plus some noise.
    fn canonical_face() -> ChannelInventory {
        let mut channels: Vec<(String, usize)> = VisemeClass::ALL
            .iter()
            .enumerate()
            .map(|(i, &class)| {
                let t = &VisemeMap::resolve(class, NamingConvention::Canonical)[0];
                (t.channel.to_string(), i)
            })
            .collect();
        channels.push(("browInnerUp".to_string(), 40));
        channels.push(("eyeBlinkLeft".to_string(), 41));
        ChannelInventory {
            node_name: "Wolf3D_Head".to_string(),
            channels,
        }
    }

    fn vrm_face() -> ChannelInventory {
        ChannelInventory {
            node_name: "Face".to_string(),
            channels: ["neutral", "aa", "ih", "ou", "ee", "oh", "blink"]
                .iter()
                .enumerate()
                .map(|(i, n)| (n.to_string(), i))
                .collect(),
        }
    }

    fn body_node() -> ChannelInventory {
        ChannelInventory {
            node_name: "Body".to_string(),
            channels: vec![
                ("spine_twist".to_string(), 0),
                ("shoulder_up".to_string(), 1),
            ],
        }
    }

    #[test]
    fn test_canonical_rig_binds_canonical() {
        let binding = bind(&[body_node(), canonical_face()]).unwrap();
        assert_eq!(binding.convention, NamingConvention::Canonical);
        assert_eq!(binding.score.canonical_hits, VisemeClass::COUNT);
        assert!(binding.score.name_bonus);

        // Every class resolves to its own distinct slot.
        let mut slots: Vec<usize> = VisemeClass::ALL
            .iter()
            .map(|&c| binding.slot_for(c).expect("mapped class"))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), VisemeClass::COUNT);
    }

    #[test]
    fn test_vrm_rig_selects_alternate() {
        let binding = bind(&[vrm_face(), body_node()]).unwrap();
        assert_eq!(binding.convention, NamingConvention::Alternate);
        assert_eq!(binding.score.alternate_hits, 6);
        assert_eq!(binding.slot_for(VisemeClass::AA), binding.table.slot("aa"));
        // Consonants have no channel on this rig; that's not an error.
        assert_eq!(binding.slot_for(VisemeClass::PP), None);
        assert!(binding.silence_slot().is_some());
    }

    #[test]
    fn test_face_node_beats_noise_node() {
        let decoy = ChannelInventory {
            node_name: "Outfit".to_string(),
            channels: vec![
                ("mouth_pocket_flap".to_string(), 0),
                ("zipper".to_string(), 1),
            ],
        };
        let binding = bind(&[decoy, canonical_face()]).unwrap();
        assert_eq!(binding.score.canonical_hits, VisemeClass::COUNT);
    }

    #[test]
    fn test_no_viseme_channels_is_explicit() {
        let result = bind(&[body_node()]);
        assert!(matches!(result, Err(BindError::NoVisemeChannels)));
    }

    #[test]
    fn test_fallback_only_node_is_not_bindable() {
        let generic = ChannelInventory {
            node_name: "Head".to_string(),
            channels: vec![
                ("MouthOpen".to_string(), 0),
                ("JawDrop".to_string(), 1),
                ("LipPucker".to_string(), 2),
            ],
        };
        assert!(matches!(
            bind(&[generic]),
            Err(BindError::NoVisemeChannels)
        ));
    }

    #[test]
    fn test_empty_inventory() {
        assert!(matches!(bind(&[]), Err(BindError::EmptyInventory)));
    }

    #[test]
    fn test_score_rationale_is_pure() {
        let node = vrm_face();
        let a = score_node(&node);
        let b = score_node(&node);
        assert_eq!(a, b);
        assert_eq!(a.alternate_hits, 6);
        assert_eq!(a.canonical_hits, 0);
    }

    #[test]
    fn test_fallback_counts_only_when_coverage_weak() {
        // Full canonical coverage: the generic vocabulary is ignored.
        let mut strong = canonical_face();
        strong.channels.push(("mouthFrown".to_string(), 50));
        let score = score_node(&strong);
        assert_eq!(score.fallback_hits, 1);
        assert_eq!(
            score.total,
            CANONICAL_WEIGHT * VisemeClass::COUNT as i32 + NODE_NAME_BONUS
        );
    }
}
