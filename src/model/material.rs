//! Print material definitions

use std::collections::BTreeMap;

/// Identifier of a material within a [`crate::model::Model`]
///
/// Zero is reserved for "no material assigned".
pub type MaterialId = u32;

/// The reserved "no material" identifier
pub const MATERIAL_NONE: MaterialId = 0;

/// A print material shared by volumes across model objects
///
/// Attributes carry descriptive properties read from input files (name,
/// vendor, color) while `config` carries print-settings overrides keyed by
/// option name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMaterial {
    /// Free-form attributes parsed from the source file
    pub attributes: BTreeMap<String, String>,
    /// Print configuration overrides for this material
    pub config: BTreeMap<String, String>,
}

impl ModelMaterial {
    /// Create an empty material
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a set of attributes into this material, overwriting duplicates
    pub fn apply(&mut self, attributes: &BTreeMap<String, String>) {
        for (k, v) in attributes {
            self.attributes.insert(k.clone(), v.clone());
        }
    }

    /// The display name from the `name` attribute, when present
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }
}
