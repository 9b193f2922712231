//! Data exchanged with the remote host.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Visibility of an uploaded item or collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
            Privacy::Private => "private",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata sent when opening an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Host category label (YouTube: numeric category id, "20" = Gaming).
    pub category_id: String,
    pub privacy: Privacy,
}

/// Opaque handle of an open resumable upload (YouTube: the session URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadHandle(pub String);

impl UploadHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of one chunk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Upload still open; the host holds the first `committed` bytes.
    Progress { committed: u64 },
    /// Upload finished; the item is known remotely as `remote_id`.
    Complete { remote_id: String },
}

/// A remote collection (YouTube: a playlist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub title: String,
}

/// One page of [`Collection`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionPage {
    pub items: Vec<Collection>,
    pub next_page_token: Option<String>,
}

/// Parameters for creating a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollection {
    pub title: String,
    pub description: String,
    pub privacy: Privacy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Privacy::Unlisted).unwrap(), "\"unlisted\"");
        let p: Privacy = serde_json::from_str("\"private\"").unwrap();
        assert_eq!(p, Privacy::Private);
        assert_eq!(Privacy::Public.to_string(), "public");
    }
}
