use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clip::ClipBounds;
use crate::logging::debug_log;

/// Every response short is exactly this long.
pub const RESPONSE_DURATION_SECS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortKind {
    Main,
    Response { parent_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Short {
    pub id: String,
    pub creator: Creator,
    pub title: String,
    pub description: Option<String>,
    pub media: String,
    pub thumbnail: Option<String>,
    pub duration_secs: u32,
    pub like_count: u64,
    pub comment_count: u64,
    pub reply_count: u64,
    pub music_label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub response_ids: Vec<String>,
    pub clip: ClipBounds,
    pub kind: ShortKind,
}

impl Short {
    pub fn is_response(&self) -> bool {
        matches!(self.kind, ShortKind::Response { .. })
    }

    pub fn parent_id(&self) -> Option<&str> {
        match &self.kind {
            ShortKind::Response { parent_id } => Some(parent_id),
            ShortKind::Main => None,
        }
    }

    /// Resolves the media reference to something a player can open. Absolute
    /// URLs pass through; anything else is taken relative to `media_root`,
    /// which may itself be a base URL or a directory.
    pub fn media_location(&self, media_root: &str) -> String {
        if Url::parse(&self.media).is_ok() {
            return self.media.clone();
        }
        let relative = self.media.trim_start_matches('/');
        if let Ok(mut base) = Url::parse(media_root) {
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            if let Ok(joined) = base.join(relative) {
                return joined.to_string();
            }
        }
        Path::new(media_root)
            .join(relative)
            .to_string_lossy()
            .to_string()
    }

    fn from_entry(entry: CatalogEntry) -> Self {
        let kind = match entry.parent_id {
            Some(parent_id) => ShortKind::Response { parent_id },
            None => ShortKind::Main,
        };
        let duration_secs = match kind {
            ShortKind::Response { .. } => {
                if entry.duration_secs != RESPONSE_DURATION_SECS {
                    debug_log(format!(
                        "catalog: response {} declared {}s, using {}s",
                        entry.id, entry.duration_secs, RESPONSE_DURATION_SECS
                    ));
                }
                RESPONSE_DURATION_SECS
            }
            ShortKind::Main => entry.duration_secs,
        };
        Self {
            id: entry.id,
            creator: entry.creator,
            title: entry.title,
            description: non_empty(entry.description),
            media: entry.media,
            thumbnail: non_empty(entry.thumbnail),
            duration_secs,
            like_count: entry.like_count,
            comment_count: entry.comment_count,
            reply_count: entry.reply_count,
            music_label: non_empty(entry.music_label),
            created_at: entry.created_at.unwrap_or_else(Utc::now),
            response_ids: entry.response_ids,
            clip: ClipBounds {
                start: entry.clip_start_secs,
                end: entry.clip_end_secs,
            },
            kind,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// On-disk shape of a catalog item.
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    id: String,
    creator: Creator,
    title: String,
    #[serde(default)]
    description: Option<String>,
    media: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration_secs: u32,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    comment_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    music_label: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    response_ids: Vec<String>,
    #[serde(default)]
    clip_start_secs: Option<f64>,
    #[serde(default)]
    clip_end_secs: Option<f64>,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    shorts: Vec<CatalogEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate short id {0:?}")]
    DuplicateId(String),
}

/// Read-only lookup over the session's shorts, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<Short>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<Short>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
        }
        let catalog = Self { items, index };
        catalog.log_dangling_links();
        Ok(catalog)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(raw).context("parse catalog")?;
        let items = file.shorts.into_iter().map(Short::from_entry).collect();
        Ok(Self::new(items)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog at {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Failed to load catalog at {}", path.display()))
    }

    pub fn demo() -> Self {
        Self::from_yaml_str(DEMO_CATALOG).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Short> {
        self.index.get(id).and_then(|&pos| self.items.get(pos))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn feed_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| !item.is_response())
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn responses_for(&self, id: &str) -> Vec<&Short> {
        let Some(short) = self.get(id) else {
            return Vec::new();
        };
        short
            .response_ids
            .iter()
            .filter_map(|rid| self.get(rid))
            .collect()
    }

    fn log_dangling_links(&self) {
        for item in &self.items {
            if let Some(parent) = item.parent_id() {
                if self.get(parent).map_or(true, Short::is_response) {
                    debug_log(format!(
                        "catalog: response {} points at missing parent {}",
                        item.id, parent
                    ));
                }
            }
            for rid in &item.response_ids {
                if self.get(rid).is_none() {
                    debug_log(format!(
                        "catalog: {} links unknown response {}",
                        item.id, rid
                    ));
                }
            }
        }
    }
}

const DEMO_CATALOG: &str = r#"
shorts:
  - id: s1
    creator:
      id: u1
      handle: "@quicktakes"
      display_name: Quick Takes
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=qt
    title: MD2 Video StoryBox Audio
    description: First 60 sec
    media: /videos/video1.mp4
    duration_secs: 60
    like_count: 12400
    comment_count: 342
    reply_count: 12
    music_label: Upbeat — Original
    response_ids: [s1r1, s1r2]
    clip_start_secs: 0
    clip_end_secs: 60
  - id: s1r1
    parent_id: s1
    creator:
      id: u2
      handle: "@replyguy"
      display_name: Reply Guy
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=r1
    title: My version of that routine 😂
    media: /videos/mtv.mp4
    duration_secs: 7
    like_count: 2100
    comment_count: 89
    music_label: Same sound
  - id: s1r2
    parent_id: s1
    creator:
      id: u3
      handle: "@fitness_short"
      display_name: Fitness Short
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=r2
    title: Tried this — game changer
    media: /videos/mtv.mp4
    duration_secs: 7
    like_count: 890
    comment_count: 23
    music_label: Original
  - id: s2
    creator:
      id: u4
      handle: "@cooking_shorts"
      display_name: Cooking Shorts
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=cook
    title: MD2 MTV Video
    media: /videos/mtv.mp4
    duration_secs: 60
    like_count: 56000
    comment_count: 1200
    reply_count: 45
    music_label: First 60 sec
    response_ids: [s2r1]
    clip_start_secs: 0
    clip_end_secs: 60
  - id: s2r1
    parent_id: s2
    creator:
      id: u5
      handle: "@homechef"
      display_name: Home Chef
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=chef
    title: I added garlic bread to this
    media: /videos/mtv.mp4
    duration_secs: 7
    like_count: 3400
    comment_count: 156
    music_label: Same
  - id: s3
    creator:
      id: u6
      handle: "@tech_tips"
      display_name: Tech Tips
      avatar_url: https://api.dicebear.com/7.x/avataaars/svg?seed=tech
    title: MD2 MTV Video (last 60 sec)
    media: /videos/mtv.mp4
    duration_secs: 60
    like_count: 89000
    comment_count: 2100
    reply_count: 78
    music_label: Final 60 sec
    clip_start_secs: -60
    clip_end_secs: 0
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn demo_catalog_loads_all_items() {
        let catalog = Catalog::demo();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.feed_ids(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn responses_follow_link_order() {
        let catalog = Catalog::demo();
        let ids: Vec<&str> = catalog
            .responses_for("s1")
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1r1", "s1r2"]);
        assert!(catalog.responses_for("s3").is_empty());
        assert!(catalog.responses_for("missing").is_empty());
    }

    #[test]
    fn response_kind_and_duration() {
        let catalog = Catalog::demo();
        let reply = catalog.get("s2r1").unwrap();
        assert!(reply.is_response());
        assert_eq!(reply.parent_id(), Some("s2"));
        assert_eq!(reply.duration_secs, RESPONSE_DURATION_SECS);
        assert_eq!(reply.description, None);
        assert_eq!(reply.clip, ClipBounds::default());
    }

    #[test]
    fn last_minute_clip_is_negative_start() {
        let catalog = Catalog::demo();
        let clip = catalog.get("s3").unwrap().clip;
        assert_eq!(clip.start, Some(-60.0));
        assert_eq!(clip.end, Some(0.0));
    }

    #[test]
    fn unresolved_links_are_dropped() {
        let raw = r#"
shorts:
  - id: a
    creator: { id: u, handle: "@u", display_name: U }
    title: A
    media: a.mp4
    duration_secs: 30
    response_ids: [ghost, b]
  - id: b
    parent_id: a
    creator: { id: v, handle: "@v", display_name: V }
    title: B
    media: b.mp4
    duration_secs: 12
"#;
        let catalog = Catalog::from_yaml_str(raw).unwrap();
        let ids: Vec<&str> = catalog
            .responses_for("a")
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(catalog.get("b").unwrap().duration_secs, RESPONSE_DURATION_SECS);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"
shorts:
  - { id: a, creator: { id: u, handle: "@u", display_name: U }, title: A, media: a.mp4 }
  - { id: a, creator: { id: u, handle: "@u", display_name: U }, title: B, media: b.mp4 }
"#;
        assert!(Catalog::from_yaml_str(raw).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "shorts:\n  - {{ id: x, creator: {{ id: u, handle: \"@u\", display_name: U }}, title: X, media: x.mp4, music_label: \"\" }}\n"
        )
        .unwrap();
        let catalog = Catalog::from_yaml_file(file.path()).unwrap();
        let short = catalog.get("x").unwrap();
        assert_eq!(short.music_label, None);
        assert_eq!(catalog.feed_ids(), vec!["x"]);
    }

    #[test]
    fn media_location_resolution() {
        let catalog = Catalog::demo();
        let short = catalog.get("s1").unwrap();
        assert_eq!(
            short.media_location("http://localhost:5173"),
            "http://localhost:5173/videos/video1.mp4"
        );
        assert_eq!(
            short.media_location("/srv/public"),
            "/srv/public/videos/video1.mp4"
        );

        let mut remote = short.clone();
        remote.media = "https://cdn.test/v.mp4".into();
        assert_eq!(remote.media_location("/srv/public"), "https://cdn.test/v.mp4");
    }
}
