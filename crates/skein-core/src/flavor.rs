//! Service flavor shared by settings and the HTTP client.

use serde::{Deserialize, Serialize};

/// URL and key-header scheme the completion service speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// `{endpoint}/{operation}` with an `Authorization: Bearer` key.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version=`
    /// with an `api-key` header.
    Azure,
}

impl ApiFlavor {
    /// Parse the config spelling (`openai` / `azure`), case-insensitively.
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "azure" => Some(Self::Azure),
            _ => None,
        }
    }

    /// Config spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
        }
    }
}

impl std::fmt::Display for ApiFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
