//! Editor-export serialization (§6): pure formatting over clip/video
//! records the core already produces, for the FCPXML and CMX 3600 EDL
//! formats an NLE imports. No model inference or DB access happens
//! here — callers assemble the clip list from whatever scope they want
//! exported and hand it to one `render` call.

pub mod edl;
pub mod fcpxml;

pub use edl::{EdlClip, EdlExport, ReelNamingPolicy};
pub use fcpxml::{FcpxmlExport, SourceClip};
