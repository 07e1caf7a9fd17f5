//! Broker plumbing shared by the server and the worker.
//!
//! Everything rides on [`broccoli_queue`] over Redis: the server publishes
//! enrich and index jobs, the worker publishes job results and dead
//! letters back. Queue names live in each binary's config; this crate only
//! owns connection setup and the handle type both sides share.

mod broker;
mod error;

pub use broccoli_queue::brokers::broker::BrokerMessage;
pub use broccoli_queue::error::BroccoliError;
pub use broker::{Mq, MqConfig, init_mq};
pub use error::MqError;
