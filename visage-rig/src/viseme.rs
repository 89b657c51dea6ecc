//! Viseme classes and the viseme-to-channel tables
//!
//! A viseme is a visual mouth shape corresponding to one or more phonemes.
//! The upstream speech service tags every event with a small integer class
//! id; this module turns those ids into morph-target channel names for the
//! two rig naming conventions we know how to drive.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Phoneme-class identifiers as delivered by the speech service.
///
/// Ids follow the common fifteen-class viseme set: 0 is silence, the rest
/// cover the consonant articulation groups and the five mouth vowels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VisemeClass {
    /// Silence (mouth closed / resting)
    Sil = 0,
    /// /p/, /b/, /m/ (lips pressed together)
    PP = 1,
    /// /f/, /v/ (teeth on lip)
    FF = 2,
    /// /θ/, /ð/ (tongue between teeth)
    TH = 3,
    /// /t/, /d/ (tongue at roof)
    DD = 4,
    /// /k/, /g/ (back of tongue raised)
    KK = 5,
    /// /tʃ/, /dʒ/, /ʃ/ (tongue curved)
    CH = 6,
    /// /s/, /z/ (teeth together)
    SS = 7,
    /// /n/, /l/ (tongue at roof, relaxed lips)
    NN = 8,
    /// /r/ (tongue curled)
    RR = 9,
    /// /a/ (mouth open wide)
    AA = 10,
    /// /e/ (mouth half open)
    E = 11,
    /// /i/ (mouth wide, teeth apart)
    I = 12,
    /// /o/ (rounded, medium)
    O = 13,
    /// /u/ (rounded, small)
    U = 14,
}

impl VisemeClass {
    /// Number of viseme classes, including silence.
    pub const COUNT: usize = 15;

    /// All classes in id order.
    pub const ALL: [VisemeClass; Self::COUNT] = [
        VisemeClass::Sil,
        VisemeClass::PP,
        VisemeClass::FF,
        VisemeClass::TH,
        VisemeClass::DD,
        VisemeClass::KK,
        VisemeClass::CH,
        VisemeClass::SS,
        VisemeClass::NN,
        VisemeClass::RR,
        VisemeClass::AA,
        VisemeClass::E,
        VisemeClass::I,
        VisemeClass::O,
        VisemeClass::U,
    ];

    /// Decode an untrusted wire id. Out-of-range ids return None.
    pub fn from_id(id: i64) -> Option<Self> {
        if (0..Self::COUNT as i64).contains(&id) {
            Some(Self::ALL[id as usize])
        } else {
            None
        }
    }

    /// The wire id of this class.
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Which channel naming convention a bound rig uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingConvention {
    /// The `viseme_*` morph-target names (one channel per class).
    #[default]
    Canonical,
    /// Vowel-only expression names (`aa`, `ih`, `ou`, `ee`, `oh`, `neutral`)
    /// found on rigs that expose mouth shapes as expressions.
    Alternate,
}

/// One channel a viseme class drives, with its blend weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeTarget {
    /// Morph-target channel name on the mesh.
    pub channel: &'static str,
    /// Weight applied when this class is at full intensity.
    pub weight: f32,
}

const fn target(channel: &'static str) -> VisemeTarget {
    VisemeTarget {
        channel,
        weight: 1.0,
    }
}

/// Canonical table: one channel per class, in class-id order.
const CANONICAL: [&[VisemeTarget]; VisemeClass::COUNT] = [
    &[target("viseme_sil")],
    &[target("viseme_PP")],
    &[target("viseme_FF")],
    &[target("viseme_TH")],
    &[target("viseme_DD")],
    &[target("viseme_kk")],
    &[target("viseme_CH")],
    &[target("viseme_SS")],
    &[target("viseme_nn")],
    &[target("viseme_RR")],
    &[target("viseme_aa")],
    &[target("viseme_E")],
    &[target("viseme_I")],
    &[target("viseme_O")],
    &[target("viseme_U")],
];

/// Alternate table: expression-style rigs only expose the vowels and a
/// neutral pose. Consonant classes map to no channel, which simply means
/// they have no facial effect on such rigs.
const ALTERNATE: [&[VisemeTarget]; VisemeClass::COUNT] = [
    &[target("neutral")], // Sil
    &[],                  // PP
    &[],                  // FF
    &[],                  // TH
    &[],                  // DD
    &[],                  // KK
    &[],                  // CH
    &[],                  // SS
    &[],                  // NN
    &[],                  // RR
    &[target("aa")],      // AA
    &[target("ee")],      // E
    &[target("ih")],      // I
    &[target("oh")],      // O
    &[target("ou")],      // U
];

/// Precomputed channel-name → class inverse for the canonical table.
static CANONICAL_INVERSE: Lazy<HashMap<&'static str, VisemeClass>> = Lazy::new(|| build_inverse(&CANONICAL));

/// Precomputed channel-name → class inverse for the alternate table.
static ALTERNATE_INVERSE: Lazy<HashMap<&'static str, VisemeClass>> = Lazy::new(|| build_inverse(&ALTERNATE));

fn build_inverse(
    table: &[&'static [VisemeTarget]; VisemeClass::COUNT],
) -> HashMap<&'static str, VisemeClass> {
    let mut inverse = HashMap::new();
    for class in VisemeClass::ALL {
        for t in table[class as usize] {
            inverse.insert(t.channel, class);
        }
    }
    inverse
}

/// Static lookup from viseme class to mesh channel names.
pub struct VisemeMap;

impl VisemeMap {
    /// Channels driven by `class` under `convention`.
    ///
    /// Always returns: a non-empty slice for mapped classes, an empty slice
    /// for classes the convention does not cover (not an error — such
    /// events have no facial effect).
    pub fn resolve(class: VisemeClass, convention: NamingConvention) -> &'static [VisemeTarget] {
        match convention {
            NamingConvention::Canonical => CANONICAL[class as usize],
            NamingConvention::Alternate => ALTERNATE[class as usize],
        }
    }

    /// Reverse lookup: which class drives a channel name, if any.
    pub fn class_for(name: &str, convention: NamingConvention) -> Option<VisemeClass> {
        match convention {
            NamingConvention::Canonical => CANONICAL_INVERSE.get(name).copied(),
            NamingConvention::Alternate => ALTERNATE_INVERSE.get(name).copied(),
        }
    }

    /// How many classes `convention` can express on a rig.
    pub fn coverage(convention: NamingConvention) -> usize {
        match convention {
            NamingConvention::Canonical => CANONICAL.iter().filter(|t| !t.is_empty()).count(),
            NamingConvention::Alternate => ALTERNATE.iter().filter(|t| !t.is_empty()).count(),
        }
    }
}
