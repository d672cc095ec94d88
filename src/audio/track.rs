use serde::{Deserialize, Serialize};
use std::fmt;

/// One playlist entry: a stable identity, the locator the fetch pipeline
/// turns into audio, and a display title.
///
/// Entries are immutable. The queue only ever appends or removes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRef {
    id: String,
    locator: String,
    title: String,
}

impl TrackRef {
    pub fn new(
        id: impl Into<String>,
        locator: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            title: title.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}
