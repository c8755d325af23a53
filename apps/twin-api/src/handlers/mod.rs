//! Handlers 模块

pub mod assets;
pub mod field_mappings;
pub mod mappings;
pub mod metrics;
pub mod rollups;
pub mod state;

pub use assets::*;
pub use field_mappings::*;
pub use mappings::*;
pub use metrics::*;
pub use rollups::*;
pub use state::*;
