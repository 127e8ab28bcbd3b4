//! Typed schema for the per-photo metadata files (`meta/photo_<id>.json`)
//! in a Flickr export, plus the required-field validation that decides
//! whether a photo can be exported at all.

use std::path::Path;

use anyhow::Context as _;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

/// One photo's metadata, as Flickr wrote it.
///
/// Everything is optional at parse time; [`PhotoMeta::required`] is the
/// single place that decides whether the record is complete enough to
/// export. Count fields arrive as strings in most exports but as bare
/// numbers in some, so they go through a lenient deserializer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoMeta {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub date_taken: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub original: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub privacy: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub photopage: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub count_views: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub count_faves: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub date_imported: Option<String>,
    #[serde(default)]
    pub tags: Vec<PhotoTag>,
    #[serde(default)]
    pub albums: Vec<PhotoAlbum>,
    #[serde(default)]
    pub comments: Vec<PhotoComment>,
    #[serde(default)]
    pub exif: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoTag {
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoAlbum {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoComment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub date: Option<String>,
    #[serde(default)]
    pub comment: String,
}

/// The fields a photo cannot be exported without.
#[derive(Debug, Clone)]
pub struct RequiredMeta {
    pub taken: NaiveDateTime,
    pub original_url: String,
}

impl PhotoMeta {
    /// Validates presence and shape of the required fields. An `Err`
    /// here means the whole photo becomes a per-item skip, before any
    /// identifier is allocated for it.
    pub fn required(&self) -> anyhow::Result<RequiredMeta> {
        let date_taken = self
            .date_taken
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("missing date_taken"))?;
        let taken = parse_timestamp(date_taken)
            .with_context(|| format!("parse date_taken {date_taken:?}"))?;
        let original_url = self
            .original
            .clone()
            .ok_or_else(|| anyhow::anyhow!("missing original image url"))?;

        Ok(RequiredMeta {
            taken,
            original_url,
        })
    }

    /// The archival fields copied onto the post as `_flickr_*` post-meta,
    /// in their fixed emission order.
    pub fn archive_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("count_views", &self.count_views),
            ("count_faves", &self.count_faves),
            ("photopage", &self.photopage),
            ("original", &self.original),
            ("date_imported", &self.date_imported),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect()
    }
}

pub fn load(path: &Path) -> anyhow::Result<PhotoMeta> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read meta file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse meta file: {}", path.display()))
}

/// Flickr exports write timestamps as `2019-01-29 10:35:00`; a few
/// records (notably comment dates) carry epoch seconds instead.
pub fn parse_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(parsed);
    }
    if let Ok(seconds) = raw.trim().parse::<i64>()
        && let Some(parsed) = chrono::DateTime::from_timestamp(seconds, 0)
    {
        return Ok(parsed.naive_utc());
    }
    anyhow::bail!("unrecognized timestamp: {raw:?}")
}

/// Optional string that also treats JSON `null`, the literal string
/// `"null"`, and bare numbers uniformly. Flickr's own export tooling is
/// inconsistent about all three.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_string).filter(|s| s != "null"))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
