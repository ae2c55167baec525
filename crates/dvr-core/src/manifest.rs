//! Segment manifest parsing.
//!
//! Manifests are newline-delimited playlists: lines starting with `#` are
//! comments/directives, blank lines are noise, every other line is one
//! segment location in playback order. Order is the contract: it becomes
//! the byte order of the reassembled stream.

use url::Url;

/// One ordered fetch target. `index` is the 1-based manifest position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub index: usize,
    pub location: String,
}

/// Ordered segment locations parsed from one manifest document.
#[derive(Debug, Clone, Default)]
pub struct SegmentManifest {
    segments: Vec<SegmentRef>,
}

impl SegmentManifest {
    /// Parses a manifest document. Indices are assigned 1..N in order of
    /// appearance; nothing is ever reordered. Pure parsing, no network.
    pub fn parse(text: &str) -> Self {
        let segments = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(i, line)| SegmentRef {
                index: i + 1,
                location: line.to_string(),
            })
            .collect();
        Self { segments }
    }

    /// Rewrites relative locations against the manifest's own URL.
    /// Absolute locations are left untouched.
    pub fn resolve_relative(&mut self, base: &Url) {
        for seg in &mut self.segments {
            if Url::parse(&seg.location).is_err() {
                if let Ok(joined) = base.join(&seg.location) {
                    seg.location = joined.into();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[SegmentRef] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<SegmentRef> {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_are_skipped() {
        let m = SegmentManifest::parse("http://h/1.bin\n#comment\nhttp://h/2.bin\n");
        assert_eq!(m.len(), 2);
        assert_eq!(m.segments()[0].location, "http://h/1.bin");
        assert_eq!(m.segments()[1].location, "http://h/2.bin");
    }

    #[test]
    fn indices_are_one_based_and_contiguous() {
        let m = SegmentManifest::parse("a\nb\nc\n");
        let idx: Vec<usize> = m.segments().iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![1, 2, 3]);
    }

    #[test]
    fn hls_style_directives_are_ignored() {
        let text = "#EXTM3U\r\n#EXT-X-VERSION:3\r\n#EXTINF:4.0,\r\nhttps://cdn.example/seg_00001.png\r\n#EXTINF:4.0,\r\nhttps://cdn.example/seg_00002.png\r\n#EXT-X-ENDLIST\r\n";
        let m = SegmentManifest::parse(text);
        assert_eq!(m.len(), 2);
        assert_eq!(m.segments()[0].index, 1);
        assert_eq!(m.segments()[1].location, "https://cdn.example/seg_00002.png");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let m = SegmentManifest::parse("  http://h/a  \n\t\n   \nhttp://h/b\n");
        assert_eq!(m.len(), 2);
        assert_eq!(m.segments()[0].location, "http://h/a");
    }

    #[test]
    fn empty_manifest_is_empty() {
        assert!(SegmentManifest::parse("").is_empty());
        assert!(SegmentManifest::parse("#only\n#comments\n").is_empty());
    }

    #[test]
    fn relative_locations_join_against_base() {
        let base = Url::parse("https://cdn.example/videos/clip/playlist.txt").unwrap();
        let mut m = SegmentManifest::parse("seg_00001.png\n/abs/seg_00002.png\nhttps://other.example/seg_00003.png\n");
        m.resolve_relative(&base);
        assert_eq!(
            m.segments()[0].location,
            "https://cdn.example/videos/clip/seg_00001.png"
        );
        assert_eq!(m.segments()[1].location, "https://cdn.example/abs/seg_00002.png");
        assert_eq!(m.segments()[2].location, "https://other.example/seg_00003.png");
    }
}
