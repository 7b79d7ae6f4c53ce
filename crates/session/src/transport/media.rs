//! Inbound media bookkeeping
//!
//! The first inbound track decides the render source. A track that arrives
//! inside a stream establishes that stream; a bare track (no stream id) gets a
//! synthetic single-track stream built around it.

use serde::{Deserialize, Serialize};

/// Media kind of an inbound track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Description of one inbound track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
    /// MIME type of the negotiated codec (e.g. "video/VP8")
    pub codec: String,
}

/// Media stream the presentation layer should render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSource {
    pub stream_id: String,
    /// True when the stream was synthesized around a bare track
    pub synthetic: bool,
    pub tracks: Vec<TrackInfo>,
}

impl RenderSource {
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }
}

/// Outcome of offering a track to the render slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First track; a new render source was set
    Established(RenderSource),
    /// Track added to the active render source
    Joined(RenderSource),
    /// Track belongs to another stream or was already known
    Ignored,
}

/// Holds the current render source of a transport
#[derive(Debug, Default)]
pub struct RenderSlot {
    source: Option<RenderSource>,
}

impl RenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&RenderSource> {
        self.source.as_ref()
    }

    /// Offer an inbound track
    ///
    /// `stream_id` is the id of the stream the track arrived in, empty for a
    /// bare track.
    pub fn admit(&mut self, stream_id: &str, track: TrackInfo) -> Admission {
        match self.source.as_mut() {
            None => {
                let source = if stream_id.is_empty() {
                    RenderSource {
                        stream_id: format!("synthetic-{}", uuid::Uuid::new_v4()),
                        synthetic: true,
                        tracks: vec![track],
                    }
                } else {
                    RenderSource {
                        stream_id: stream_id.to_string(),
                        synthetic: false,
                        tracks: vec![track],
                    }
                };
                self.source = Some(source.clone());
                Admission::Established(source)
            }
            Some(source) => {
                let same_stream = if source.synthetic {
                    stream_id.is_empty()
                } else {
                    source.stream_id == stream_id
                };

                if !same_stream || source.tracks.iter().any(|t| t.id == track.id) {
                    return Admission::Ignored;
                }

                source.tracks.push(track);
                Admission::Joined(source.clone())
            }
        }
    }

    /// Drop the render source; returns whether one was set
    pub fn clear(&mut self) -> bool {
        self.source.take().is_some()
    }
}
