pub mod annotate;
pub mod coords;
pub mod locks;
pub mod mark;
pub mod service;

pub use coords::{MarkPlacement, PageSize, ViewerPoint};
pub use mark::SignatureMark;
pub use service::{FinalizeOutcome, FinalizeRequest, SignatureRequest, SigningService};
