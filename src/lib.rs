//! infraforge: natural-language requests to deployed infrastructure.
//!
//! A capability plans a deployment deterministically (decision engine,
//! composable terraform generation, dry-run preview) and executes it only
//! after approval. Two registries keep automated planners from invoking
//! tools or capabilities that do not exist.

pub mod capability;
pub mod cli;
pub mod core;
pub mod error;
pub mod registry;
pub mod resources;
pub mod tools;
pub mod transport;
pub mod tripwire;
