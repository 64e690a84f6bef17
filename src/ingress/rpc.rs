//! Minimal Starknet JSON-RPC client for backfill: resolving blocks by hash
//! or number and fetching paged event chunks. Live blocks come from the
//! host callbacks; this client only fills gaps.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::IndexerError;
use crate::models::{BlockStatus, StarknetBlock};

const EVENT_CHUNK_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BlockId {
    Hash { block_hash: String },
    Number { block_number: i64 },
}

impl BlockId {
    pub fn hash(hash: &str) -> Self {
        BlockId::Hash {
            block_hash: hash.to_string(),
        }
    }

    pub fn number(number: i64) -> Self {
        BlockId::Number {
            block_number: number,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    block_hash: String,
    parent_hash: String,
    block_number: i64,
    timestamp: i64,
}

/// One event as returned by `starknet_getEvents`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmittedEvent {
    pub from_address: String,
    pub keys: Vec<String>,
    pub data: Vec<String>,
    pub block_hash: String,
    pub block_number: i64,
    pub transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    events: Vec<EmittedEvent>,
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

pub struct StarknetRpc {
    client: reqwest::Client,
    url: String,
}

impl StarknetRpc {
    pub fn new(url: &str) -> Result<Self, IndexerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, IndexerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(IndexerError::Rpc(format!(
                "{method} failed with code {}: {}",
                err.code, err.message
            )));
        }
        response
            .result
            .ok_or_else(|| IndexerError::Rpc(format!("{method} returned neither result nor error")))
    }

    pub async fn get_block(&self, id: BlockId) -> Result<StarknetBlock, IndexerError> {
        let header: RpcBlockHeader = self
            .call("starknet_getBlockWithTxHashes", json!([id]))
            .await?;
        Ok(StarknetBlock {
            block_number: header.block_number,
            block_hash: header.block_hash,
            parent_hash: header.parent_hash,
            timestamp: header.timestamp,
            status: BlockStatus::Mined,
        })
    }

    /// Fetch an inclusive range of block headers, one call per block.
    pub async fn get_blocks(
        &self,
        from_number: i64,
        to_number: i64,
    ) -> Result<Vec<StarknetBlock>, IndexerError> {
        let mut blocks = Vec::new();
        for number in from_number..=to_number {
            blocks.push(self.get_block(BlockId::number(number)).await?);
        }
        Ok(blocks)
    }

    /// Fetch every event in `[from, to]`, optionally filtered by emitting
    /// address, following continuation tokens until the range is drained.
    pub async fn get_events(
        &self,
        from: BlockId,
        to: BlockId,
        address: Option<&str>,
    ) -> Result<Vec<EmittedEvent>, IndexerError> {
        let mut events = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut filter = json!({
                "from_block": from,
                "to_block": to,
                "chunk_size": EVENT_CHUNK_SIZE,
            });
            if let Some(address) = address {
                filter["address"] = json!(address);
            }
            if let Some(token) = &continuation_token {
                filter["continuation_token"] = json!(token);
            }

            let page: EventsPage = self
                .call("starknet_getEvents", json!({ "filter": filter }))
                .await?;
            events.extend(page.events);

            match page.continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }
        Ok(events)
    }
}
