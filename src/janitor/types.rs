//! Types used by the janitor.

use serde::Deserialize;

/// One row of `scw instance server list -o json`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ScwServer {
    pub(super) id: String,
    pub(super) zone: String,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) tags: Vec<String>,
}
