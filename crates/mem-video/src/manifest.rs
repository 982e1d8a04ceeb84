//! The consolidated segment's manifest: `content_hash -> frame range`, plus
//! the one shared frame geometry every frame in the segment is padded to
//! (`spec.md` §4.8, glossary "Manifest"). Persisted as `manifest.json`
//! alongside `consolidated.mp4`/`consolidated.mvi`, swapped in with the same
//! temp+rename discipline as the rest of the segment.

use std::collections::BTreeMap;
use std::path::Path;

use mem_model::VideoSegmentManifestEntry;
use serde::{Deserialize, Serialize};

use crate::error::VideoError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoManifest {
    pub entries: Vec<VideoSegmentManifestEntry>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl VideoManifest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn by_content_hash(&self) -> BTreeMap<&str, &VideoSegmentManifestEntry> {
        self.entries.iter().map(|e| (e.content_hash.as_str(), e)).collect()
    }

    pub fn get(&self, content_hash: &str) -> Option<&VideoSegmentManifestEntry> {
        self.entries.iter().find(|e| e.content_hash == content_hash)
    }

    pub fn load(path: &Path) -> Result<Self, VideoError> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let bytes = std::fs::read(path).map_err(|e| VideoError::io("manifest.load", e))?;
        if bytes.is_empty() {
            return Ok(Self::empty());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), VideoError> {
        let bytes = serde_json::to_vec(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|e| VideoError::io("manifest.write.tmp", e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| VideoError::io("manifest.write.rename", e))?;
        Ok(())
    }
}
