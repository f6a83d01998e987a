//! Tag values returned by every registry backend

use serde::{Deserialize, Deserializer, Serialize};

/// A single image tag. Backends that know more than the name return a richer variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Tag {
    Static(StaticTag),
    Quay(QuayTag),
}

impl Tag {
    pub fn name(&self) -> &str {
        match self {
            Tag::Static(tag) => &tag.name,
            Tag::Quay(tag) => &tag.name,
        }
    }

    pub fn as_quay(&self) -> Option<&QuayTag> {
        match self {
            Tag::Quay(tag) => Some(tag),
            Tag::Static(_) => None,
        }
    }
}

impl From<StaticTag> for Tag {
    fn from(tag: StaticTag) -> Self {
        Tag::Static(tag)
    }
}

impl From<QuayTag> for Tag {
    fn from(tag: QuayTag) -> Self {
        Tag::Quay(tag)
    }
}

/// Tag known only by name, as returned by the registry v2 tags/list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticTag {
    name: String,
}

impl StaticTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Tag metadata reported by Quay's tag API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuayTag {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reversion: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_ts: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modified: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub manifest_digest: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub docker_image_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_manifest_list: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
}

/// Registries send `null` for fields they do not track; treat it like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
