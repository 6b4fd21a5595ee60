mod backend;
mod backends;
pub mod decode;
mod labels;
mod loader;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{LabelTable, DEFAULT_CLASS_NAMES};
pub use loader::load_detector;
pub use result::{BoundingBox, Detection};
