//! Signal-level types: the closed identity vocabularies and the Signal record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a classifier label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} label: {:?}", self.kind, self.label)
    }
}

impl std::error::Error for UnknownLabel {}

fn normalize_label(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .replace(['_', ' '], "-")
}

/// Declares a closed label enum with stable kebab-case names.
macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Every label, in declaration order (used to build classifier prompts).
            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = normalize_label(s);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == normalized)
                    .ok_or_else(|| UnknownLabel { kind: $kind, label: s.to_string() })
            }
        }
    };
}

label_enum! {
    /// One of the seven fixed top-level identity categories.
    SoulDimension, "dimension" {
        IdentityCore => "identity-core",
        CharacterTraits => "character-traits",
        VoicePresence => "voice-presence",
        HonestyFramework => "honesty-framework",
        BoundariesEthics => "boundaries-ethics",
        RelationshipDynamics => "relationship-dynamics",
        ContinuityGrowth => "continuity-growth",
    }
}

impl SoulDimension {
    /// Short code used in the notated canonical form.
    pub fn code(self) -> &'static str {
        match self {
            SoulDimension::IdentityCore => "ID",
            SoulDimension::CharacterTraits => "CHR",
            SoulDimension::VoicePresence => "VOX",
            SoulDimension::HonestyFramework => "HON",
            SoulDimension::BoundariesEthics => "BND",
            SoulDimension::RelationshipDynamics => "REL",
            SoulDimension::ContinuityGrowth => "GRW",
        }
    }
}

label_enum! {
    /// Weighting tier of a signal's contribution.
    SignalImportance, "importance" {
        Core => "core",
        Supporting => "supporting",
        Peripheral => "peripheral",
    }
}

impl SignalImportance {
    /// Multiplier applied to the strength increment on reinforcement.
    pub fn weight(self) -> f64 {
        match self {
            SignalImportance::Core => 1.5,
            SignalImportance::Supporting => 1.0,
            SignalImportance::Peripheral => 0.5,
        }
    }
}

label_enum! {
    /// Rhetorical posture of a signal.
    SignalStance, "stance" {
        Assert => "assert",
        Deny => "deny",
        Question => "question",
        Qualify => "qualify",
        Tensioning => "tensioning",
    }
}

impl SignalStance {
    /// Stances that count as questioning evidence for the promotion gate.
    pub fn is_questioning(self) -> bool {
        matches!(self, SignalStance::Question | SignalStance::Deny)
    }
}

label_enum! {
    /// Origin category of the artifact a signal was extracted from.
    ArtifactProvenance, "provenance" {
        /// Written by the subject about themselves.
        SelfAuthored => "self",
        Curated => "curated",
        External => "external",
    }
}

/// Where a signal came from. Optional parts are present only when ingestion knew them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceLocator {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl SourceLocator {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            context: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => f.write_str(&self.file),
        }
    }
}

/// An atomic observed statement. Immutable once classified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub text: String,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    pub dimension: SoulDimension,
    pub importance: SignalImportance,
    pub stance: SignalStance,
    pub provenance: ArtifactProvenance,
    pub source: SourceLocator,
}

impl Signal {
    /// Fully classified signal with default `supporting/assert/self` attributes.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        dimension: SoulDimension,
        source: SourceLocator,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            confidence: 1.0,
            dimension,
            importance: SignalImportance::Supporting,
            stance: SignalStance::Assert,
            provenance: ArtifactProvenance::SelfAuthored,
            source,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_importance(mut self, importance: SignalImportance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_stance(mut self, stance: SignalStance) -> Self {
        self.stance = stance;
        self
    }

    pub fn with_provenance(mut self, provenance: ArtifactProvenance) -> Self {
        self.provenance = provenance;
        self
    }
}

/// A signal as ingestion hands it over: attributes may still need classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalInput {
    pub id: String,
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<SoulDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<SignalImportance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance: Option<SignalStance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ArtifactProvenance>,
    pub source: SourceLocator,
}

fn default_confidence() -> f64 {
    1.0
}

impl SignalInput {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: SourceLocator) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            confidence: 1.0,
            dimension: None,
            importance: None,
            stance: None,
            provenance: None,
            source,
        }
    }

    /// Returns the signal directly when every classified attribute is present.
    /// Missing provenance defaults to `self`.
    pub fn as_classified(&self) -> Option<Signal> {
        Some(Signal {
            id: self.id.clone(),
            text: self.text.clone(),
            confidence: self.confidence.clamp(0.0, 1.0),
            dimension: self.dimension?,
            importance: self.importance?,
            stance: self.stance?,
            provenance: self.provenance.unwrap_or(ArtifactProvenance::SelfAuthored),
            source: self.source.clone(),
        })
    }
}

impl From<Signal> for SignalInput {
    fn from(signal: Signal) -> Self {
        Self {
            id: signal.id,
            text: signal.text,
            confidence: signal.confidence,
            dimension: Some(signal.dimension),
            importance: Some(signal.importance),
            stance: Some(signal.stance),
            provenance: Some(signal.provenance),
            source: signal.source,
        }
    }
}

/// A signal that seeded a new principle because its best match fell below threshold.
/// Retained for observability only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrphanedSignal {
    pub signal: Signal,
    pub best_similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_principle_id: Option<String>,
    pub seeded_principle_id: String,
}
