use tracing::instrument;

use crate::{errors::ConsumerError, keys::assignment_key, redis_conn::RedisConnection, types::Assignment};

/// Reads and writes a consumer's assignment document under a TTL'd key.
/// Every operation is idempotent at the Redis level (spec §4.2).
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    connection: RedisConnection,
    assignment_ttl_ms: u64,
}

impl AssignmentStore {
    pub fn new(connection: RedisConnection, assignment_ttl_ms: u64) -> Self {
        Self {
            connection,
            assignment_ttl_ms,
        }
    }

    /// Writes the serialized assignment to the assignment key with TTL
    /// `assignment_ttl_ms`. Identical semantics to `save` — both exist as
    /// separate methods only to mirror the distinct call sites spec §4.2
    /// names, not because the underlying Redis operation differs.
    #[instrument(skip(self, assignment))]
    pub async fn initialize(
        &mut self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), ConsumerError> {
        self.write(group_id, member_id, assignment).await
    }

    /// Overwrites the assignment and resets its TTL.
    #[instrument(skip(self, assignment))]
    pub async fn save(
        &mut self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), ConsumerError> {
        self.write(group_id, member_id, assignment).await
    }

    async fn write(
        &mut self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), ConsumerError> {
        let key = assignment_key(group_id, member_id);
        let serialized = serde_json::to_string(assignment)?;
        self.connection
            .set_px(&key, &serialized, self.assignment_ttl_ms)
            .await?;
        Ok(())
    }

    /// Returns the decoded assignment, or `None` if the key is absent or
    /// expired. A decode error on a *present* key is fatal corrupt state
    /// and is propagated rather than silently mapped to `None` (spec
    /// §4.2).
    #[instrument(skip(self))]
    pub async fn read(
        &mut self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Option<Assignment>, ConsumerError> {
        let key = assignment_key(group_id, member_id);
        match self.connection.get(&key).await? {
            None => Ok(None),
            Some(raw) => {
                let assignment: Assignment = serde_json::from_str(&raw)?;
                Ok(Some(assignment))
            }
        }
    }
}
