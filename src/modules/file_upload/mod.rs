pub mod model;
pub mod probe;
pub mod service;

pub use model::{MediaFile, UploadConfig, UploadedMedia};
pub use probe::{ContainerDurationProbe, DurationProbe};
pub use service::MediaService;
