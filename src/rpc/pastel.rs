use serde_json::{Value, json};
use tracing::debug;

use super::{RpcClient, RpcError};

const PASTELID_ALGORITHM: &str = "ed448";

/// Hashes and transaction ids of the blocks at the chain tip.
#[derive(Debug, Clone, Default)]
pub struct RecentBlocks {
    pub hashes: Vec<String>,
    pub txids: Vec<String>,
}

fn field<'a>(value: &'a Value, name: &'static str) -> Result<&'a Value, RpcError> {
    value.get(name).ok_or(RpcError::MissingField(name))
}

fn str_field(value: &Value, name: &'static str) -> Result<String, RpcError> {
    field(value, name)?
        .as_str()
        .map(str::to_string)
        .ok_or(RpcError::MissingField(name))
}

fn as_string(value: Value) -> Result<String, RpcError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(RpcError::MissingResult),
    }
}

impl RpcClient {
    pub async fn new_pastelid(&self, passphrase: &str) -> Result<String, RpcError> {
        let reply = self
            .call("pastelid", &[json!("newkey"), json!(passphrase)])
            .await?;
        str_field(&reply, "pastelid")
    }

    pub async fn sign_message(
        &self,
        pastelid: &str,
        message: &str,
        passphrase: &str,
    ) -> Result<String, RpcError> {
        let reply = self
            .call(
                "pastelid",
                &[
                    json!("sign"),
                    json!(message),
                    json!(pastelid),
                    json!(passphrase),
                    json!(PASTELID_ALGORITHM),
                ],
            )
            .await?;
        str_field(&reply, "signature")
    }

    /// Returns the node's verdict string (`"OK"` for a valid signature).
    pub async fn verify_message(
        &self,
        pastelid: &str,
        message: &str,
        signature: &str,
    ) -> Result<String, RpcError> {
        let reply = self
            .call(
                "pastelid",
                &[
                    json!("verify"),
                    json!(message),
                    json!(signature),
                    json!(pastelid),
                    json!(PASTELID_ALGORITHM),
                ],
            )
            .await?;
        match field(&reply, "verification")? {
            Value::String(verdict) => Ok(verdict.clone()),
            other => Ok(other.to_string()),
        }
    }

    pub async fn best_block_hash(&self) -> Result<String, RpcError> {
        as_string(self.call("getbestblockhash", &[]).await?)
    }

    pub async fn block_hash(&self, height: u64) -> Result<String, RpcError> {
        as_string(self.call("getblockhash", &[json!(height)]).await?)
    }

    pub async fn block(&self, hash: &str) -> Result<Value, RpcError> {
        self.call("getblock", &[json!(hash)]).await
    }

    pub async fn raw_transaction(&self, txid: &str) -> Result<Value, RpcError> {
        self.call("getrawtransaction", &[json!(txid)]).await
    }

    pub async fn masternode_top(&self) -> Result<Value, RpcError> {
        self.call("masternode", &[json!("top")]).await
    }

    pub async fn current_block_height(&self) -> Result<u64, RpcError> {
        let best = self.best_block_hash().await?;
        let block = self.block(&best).await?;
        field(&block, "height")?
            .as_u64()
            .ok_or(RpcError::MissingField("height"))
    }

    /// Walks the last `count` blocks up to the tip, one call at a time.
    pub async fn recent_blocks(&self, count: u64) -> Result<RecentBlocks, RpcError> {
        let tip = self.current_block_height().await?;
        let first = (tip + 1).saturating_sub(count);

        let mut recent = RecentBlocks::default();
        for height in first..=tip {
            let hash = self.block_hash(height).await?;
            let block = self.block(&hash).await?;
            let txs = field(&block, "tx")?
                .as_array()
                .ok_or(RpcError::MissingField("tx"))?;
            recent
                .txids
                .extend(txs.iter().filter_map(Value::as_str).map(str::to_string));
            recent.hashes.push(hash);
        }
        debug!(
            "Collected {} blocks and {} transactions below height {}",
            recent.hashes.len(),
            recent.txids.len(),
            tip
        );
        Ok(recent)
    }
}
