// keylight - shared library
// Configuration, effect library, backends and scene setup around keylight-core

pub mod backend;
pub mod config;
pub mod effect;
pub mod layout;
pub mod scene;

pub use config::{GroupConfig, KeylightConfig, LayoutConfig};
pub use effect::{EffectLibrary, KeyframeEffect};
pub use scene::Scene;
