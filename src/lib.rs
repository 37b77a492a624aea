//! Receta — declarative machine recipes.
//!
//! A recipe is a flat list of typed resource declarations (packages, files,
//! templates). The engine expands recipes, evaluates them per machine, plans
//! against a BLAKE3 lock file and converges targets through generated shell.

pub mod cli;
pub mod core;
pub mod resources;
pub mod transport;
pub mod tripwire;
