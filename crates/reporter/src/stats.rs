use ethstats_protocol::{Block, NodeInfo, Stats};
use tracing::warn;

use crate::chain::ChainClient;

/// Gather one status report from `chain`.
///
/// Every query that fails is logged and reported as zero (not syncing, or a
/// zeroed block), so a report always goes out.
pub async fn collect_stats<C>(chain: &C, node_info: &NodeInfo) -> Stats
where
    C: ChainClient + ?Sized,
{
    let block = chain.latest_block().await.unwrap_or_else(|e| {
        warn!("latest block query failed: {}", e);
        Block::default()
    });

    let peer_count = chain.peer_count().await.unwrap_or_else(|e| {
        warn!("peer count query failed: {}", e);
        0
    });
    let gas_price = chain.gas_price().await.unwrap_or_else(|e| {
        warn!("gas price query failed: {}", e);
        0
    });
    let syncing = chain.syncing().await.unwrap_or_else(|e| {
        warn!("sync status query failed: {}", e);
        false
    });
    let pending = chain.pending_transaction_count().await.unwrap_or_else(|e| {
        warn!("pending count query failed: {}", e);
        0
    });

    Stats {
        active: peer_count > 0,
        peer_count,
        pending,
        gas_price,
        syncing,
        node_info: node_info.clone(),
        block,
    }
}
