use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(StLineId);
id_newtype!(StatementId);
id_newtype!(JournalId);
id_newtype!(MoveId);
id_newtype!(AmlId);
id_newtype!(RecoModelId);
id_newtype!(AccountId);
id_newtype!(PartnerId);
id_newtype!(TaxId);

/// Server-issued index of a proposed line. Opaque to the client; it is only
/// echoed back inside todo commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineIndex(pub String);

impl LineIndex {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineIndex {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StLineStatus {
    Unreconciled,
    ToCheck,
    Reconciled,
}

/// State of the proposed journal entry built for a statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Invalid,
    Valid,
    Reconciled,
}

impl RecordState {
    pub fn is_reconciled(self) -> bool {
        self == RecordState::Reconciled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFlag {
    Liquidity,
    Manual,
    #[serde(alias = "new_aml", alias = "aml")]
    Matched,
    /// Technical lines computed server-side (taxes, exchange difference,
    /// early payment discount, auto-balance).
    #[serde(other)]
    Other,
}
