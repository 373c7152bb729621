//! Upload categories and the directories/collections they map to.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Document category accepted by the upload and process routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rag,
    Cag,
    /// Stored only, never embedded.
    Mapping,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Rag => "rag",
            Category::Cag => "cag",
            Category::Mapping => "mapping",
        }
    }

    /// Directory under the data root holding the uploaded files.
    pub fn docs_dir(self) -> String {
        format!("{}_docs", self.as_str())
    }

    /// Vector collection fed from this category, if any.
    pub fn collection(self) -> Option<String> {
        match self {
            Category::Rag | Category::Cag => Some(self.docs_dir()),
            Category::Mapping => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rag" => Ok(Category::Rag),
            "cag" => Ok(Category::Cag),
            "mapping" => Ok(Category::Mapping),
            other => Err(format!(
                "invalid document category `{other}` (expected rag, cag or mapping)"
            )),
        }
    }
}
