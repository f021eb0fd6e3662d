//! Stream source layer
//!
//! Defines the opaque stream handle, the segment data type, and the
//! contracts the core requires from its device collaborators.

pub mod traits;

pub use traits::{
    MediaSource, RecorderFactory, Segment, SegmentRecorder, Side, Stream, StreamConstraints,
    StreamOrigin,
};

/// Default encoding priority list, probed in order until one is supported.
pub fn default_codec_priority() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9".to_string(),
        "video/webm;codecs=vp8".to_string(),
        "video/webm".to_string(),
    ]
}
