//! Conversion of World of Warcraft 3.3.5a models, buildings and terrain into
//! glTF binary containers and auxiliary JSON / heightmap files.

pub mod archive;
pub mod binary;
pub mod blp;
pub mod chunk;
pub mod error;
pub mod gltf_export;
pub mod logging;
pub mod m2;
pub mod pipeline;
pub mod scene;
pub mod settings;
pub mod terrain;
pub mod texture;
pub mod wmo;
