pub mod controller;
pub mod source;
pub mod still;
pub mod types;
#[cfg(feature = "native-capture")]
pub mod xcap_source;

pub use controller::CaptureController;
pub use types::ScreenCapture;
