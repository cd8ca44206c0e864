//! WordTree Node
//!
//! This crate provides everything a single WordTree node runs: the
//! membership/port model, the job splitter, the generic processing pipeline,
//! the local word counter and the coordination protocol that ties them
//! together.
//!
//! A node is started with [`Node::start`]. A node without a coordinator is
//! the root of the tree; jobs injected with [`Node::submit_job`] are split
//! across its idle subordinates and the remainder is counted locally.

pub mod config;
pub mod coordination;
pub mod links;
pub mod network_model;
pub mod node;
pub mod pipeline;
pub mod resolver;
pub mod splitter;
pub mod word_counter;

pub use config::NodeConfig;
pub use network_model::{Admission, MembershipEvent, NetworkModel, PortLayout};
pub use node::Node;
pub use resolver::{HostResolver, StaticHost, UdpProbeResolver};
pub use splitter::{split_job, IdleWorker, JobSplit};
pub use word_counter::{count_words, WordCount, WordCounter};
