//! An assignment-driven consumer runtime for Redis Streams consumer
//! groups: members poll a shared assignment document for the channels
//! they own and run one [`channel_processor::ChannelProcessor`] per
//! assigned channel, acknowledging records only once a caller-supplied
//! [`handler::MessageHandler`] returns successfully.
//!
//! [`coordinator::SubscriptionCoordinator`] is the primary entry point:
//! it owns the [`listener::AssignmentListener`] and reconciles the
//! running processor set against each assignment change.

pub mod assignment_store;
pub mod channel_processor;
pub mod config;
pub mod coordinator;
pub mod env;
pub mod errors;
pub mod handler;
pub mod keys;
pub mod listener;
pub mod redis_conn;
pub mod types;

pub use assignment_store::AssignmentStore;
pub use channel_processor::{ChannelProcessor, ChannelProcessorConfig};
pub use config::RuntimeConfig;
pub use coordinator::{HandlerFactory, SubscriptionCoordinator};
pub use errors::ConsumerError;
pub use handler::MessageHandler;
pub use listener::{AssignmentListener, AssignmentListenerConfig};
pub use redis_conn::{connect, ConnectionConfig, RedisConnection};
pub use types::{Assignment, RedisMessage};
