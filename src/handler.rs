use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::types::RedisMessage;

/// A single-method capability invoked once per message. Returning
/// normally means "ack this record"; returning an error means "do not
/// ack and terminate my processor" — failures are never retried locally
/// (spec §4.4.5, §4.4.6).
#[async_trait]
pub trait MessageHandler {
    async fn handle(&self, message: &RedisMessage) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

impl Debug for dyn MessageHandler + Send + Sync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MessageHandler")
    }
}
