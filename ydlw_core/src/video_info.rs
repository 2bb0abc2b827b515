use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::InfoDict;

/// One playable rendition of a resolved video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// URL ready for the player, headers appended where the player needs them.
    pub playable_url: String,
    /// Plain resolved URL.
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub format_id: String,
    /// Position in the owning `VideoInfo`'s stream list.
    pub idx: usize,
}

/// A resolved site video: display metadata, the raw engine info and the
/// streams it can be played from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub webpage: String,
    pub source_name: String,
    /// The engine's info mapping as returned by resolution.
    pub info: Option<InfoDict>,
    pub download_id: String,
    streams: Vec<StreamInfo>,
    selection: Option<usize>,
}

impl VideoInfo {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            thumbnail: String::new(),
            webpage: String::new(),
            source_name: String::new(),
            info: None,
            download_id: Uuid::new_v4().to_string(),
            streams: Vec::new(),
            selection: None,
        }
    }

    /// Replaces the stream list, renumbering `idx` and resetting the selection.
    pub fn set_streams(&mut self, streams: Vec<StreamInfo>) {
        self.streams = streams
            .into_iter()
            .enumerate()
            .map(|(idx, mut s)| {
                s.idx = idx;
                s
            })
            .collect();
        self.selection = None;
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn has_multiple_streams(&self) -> bool {
        self.streams.len() > 1
    }

    /// Selects the active stream by index. Out-of-range indices are ignored.
    pub fn select_stream(&mut self, idx: usize) -> bool {
        if idx >= self.streams.len() {
            log::warn!("[VideoInfo] stream index {} out of range ({} streams)", idx, self.streams.len());
            return false;
        }
        self.selection = Some(idx);
        true
    }

    pub fn select_stream_info(&mut self, stream: &StreamInfo) -> bool {
        self.select_stream(stream.idx)
    }

    /// The selected stream, or the first one when nothing was selected.
    pub fn selected_stream(&self) -> Option<&StreamInfo> {
        self.streams.get(self.selection.unwrap_or(0))
    }

    /// Player-ready URL of the selected stream.
    pub fn stream_url(&self) -> Option<&str> {
        self.selected_stream().map(|s| s.playable_url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(title: &str) -> StreamInfo {
        StreamInfo {
            playable_url: format!("https://cdn.example/{}.mp4|User-Agent=x", title),
            url: format!("https://cdn.example/{}.mp4", title),
            title: title.to_string(),
            thumbnail: String::new(),
            format_id: "22".to_string(),
            idx: 99,
        }
    }

    #[test]
    fn test_selection_defaults_to_first_stream() {
        let mut video = VideoInfo::new(Some("abc".to_string()));
        assert!(video.selected_stream().is_none());
        assert!(!video.has_multiple_streams());

        video.set_streams(vec![stream("a"), stream("b")]);
        assert_eq!(video.len(), 2);
        assert!(video.has_multiple_streams());
        assert_eq!(video.selected_stream().unwrap().title, "a");
        assert_eq!(video.streams()[1].idx, 1);
    }

    #[test]
    fn test_select_stream_by_index_and_by_info() {
        let mut video = VideoInfo::new(None);
        video.set_streams(vec![stream("a"), stream("b"), stream("c")]);

        assert!(video.select_stream(2));
        assert_eq!(video.stream_url(), Some("https://cdn.example/c.mp4|User-Agent=x"));

        let second = video.streams()[1].clone();
        assert!(video.select_stream_info(&second));
        assert_eq!(video.selected_stream().unwrap().title, "b");

        assert!(!video.select_stream(7));
        assert_eq!(video.selected_stream().unwrap().title, "b");
    }

    #[test]
    fn test_download_ids_are_unique() {
        assert_ne!(VideoInfo::new(None).download_id, VideoInfo::new(None).download_id);
    }
}
