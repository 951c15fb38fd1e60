use serde::{Deserialize, Serialize};

/// Sub-command carried by a `transfer` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferCommand {
    Begin,
    Commit,
    Rollback,
}

impl TransferCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferCommand::Begin => "begin",
            TransferCommand::Commit => "commit",
            TransferCommand::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a returned row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUnit {
    pub key: String,
    /// Raw column bytes, absent for SQL NULL
    #[serde(default, with = "serde_bytes")]
    pub value: Option<Vec<u8>>,
}

/// One returned row, columns in projection order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    #[serde(default)]
    pub units: Vec<StoreUnit>,
}

impl StoreRecord {
    pub fn new<V: AsRef<[u8]>>(units: Vec<(&str, Option<V>)>) -> Self {
        Self {
            units: units
                .into_iter()
                .map(|(key, value)| StoreUnit {
                    key: key.to_string(),
                    value: value.map(|v| v.as_ref().to_vec()),
                })
                .collect(),
        }
    }
}
