//! Data structures representing print-preparation models

// Declare all submodules
mod core;
mod material;

// Re-export all public types from core module
pub use core::{
    ExtruderIdAllocator, LayerHeightRange, Model, ModelInstance, ModelObject, ModelVolume,
    PrintVolumeState,
};

// Re-export all public types from material module
pub use material::{MaterialId, ModelMaterial, MATERIAL_NONE};
