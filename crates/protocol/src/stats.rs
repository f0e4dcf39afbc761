//! Status report payload carried by `stats` frames.
//!
//! Field names follow the dashboard's expectations (`PascalCase`, with the
//! historical `OSPlatform`/`OS` spellings). Every field defaults when absent so
//! older reporters that omit fields still decode.

use serde::{Deserialize, Serialize};

/// Static description of the reporting node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeInfo {
    /// Login identity of the node.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Operator contact.
    pub contact: String,
    /// Coinbase account address.
    pub coinbase: String,
    /// Node client identifier.
    pub node: String,
    /// Network name.
    pub net: String,
    /// Protocol version.
    pub protocol: String,
    /// API version.
    pub api: String,
    /// P2P port of the chain client.
    pub chain_port: String,
    /// CPU architecture.
    #[serde(rename = "OSPlatform")]
    pub os_platform: String,
    /// Operating system.
    #[serde(rename = "OS")]
    pub os: String,
    /// Reporter version.
    pub client: String,
}

/// Head of the chain as seen by the node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Block {
    /// Block height.
    pub number: u64,
    /// Block hash, `0x`-prefixed.
    pub hash: String,
    /// Block difficulty.
    pub difficulty: u64,
    /// Block timestamp, seconds since the epoch.
    pub time: u64,
}

/// One status report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Stats {
    /// Whether the node has any peers.
    pub active: bool,
    /// Connected peer count.
    pub peer_count: u64,
    /// Pending transaction count.
    pub pending: u64,
    /// Suggested gas price in wei.
    pub gas_price: u64,
    /// Whether the node is still catching up.
    pub syncing: bool,
    /// Static node description.
    pub node_info: NodeInfo,
    /// Latest block.
    pub block: Block,
}
