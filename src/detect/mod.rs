mod backend;
pub mod backends;
mod lazy;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, SyntheticBackend};
pub use lazy::{DetectorLoader, LazyDetector};
pub use registry::{BackendFactory, BackendRegistry};
pub use result::{NormalizedRect, RawDetection};
