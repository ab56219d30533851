//! # Mutara
//!
//! Mutara coordinates writes ("mutations") against a normalized, shared
//! client-side object cache:
//!
//! - **Optimistic effects** are applied to the cache the moment a transaction
//!   is created, and are transparently revocable until the server responds.
//! - **Collision keys** serialize writes that declare a common identity, so a
//!   later write never races the server's acknowledgment of an earlier one.
//! - **Minimal re-fetch**: after a write is acknowledged, only the fields the
//!   mutation kind declares it might affect *and* the cache has previously
//!   observed are re-synchronized.
//!
//! ## Core concepts
//!
//! - **Mutation**: a caller-implemented trait describing one kind of write
//!   (operation, variables, declared-superset ("fat") field tree, apply
//!   configs, collision key, optimistic response)
//! - **TransactionQueue**: owns every pending write and drives the transport
//! - **TransactionHandle**: validated facade for commit / recommit / rollback
//! - **RefetchBuilder**: computes the minimal re-fetch tree per apply config
//!
//! The cache itself, the tracked-field index, the tree-intersection rules,
//! and the network transport are collaborators supplied by the application
//! via the traits in [`mutara_core::traits`].
//!
//! ## Example: shaping a refetch fragment
//!
//! ```
//! use mutara::proto::{FieldNode, QueryFragment};
//! use mutara::{RangeBehavior, RangeBehaviors};
//!
//! // The declared-superset tree for a "like story" mutation.
//! let fat = QueryFragment {
//!     type_name: "LikeStoryPayload".to_string(),
//!     fields: vec![FieldNode::new(
//!         "story",
//!         vec![FieldNode::leaf("likeCount"), FieldNode::new("likers", vec![FieldNode::leaf("count")])],
//!     )],
//! };
//! assert!(fat.field("story").is_some());
//!
//! // Range behaviors are keyed by a connection's sorted call signature.
//! let behaviors = RangeBehaviors::new().with("orderby(name)", RangeBehavior::Append);
//! assert!(behaviors.get("orderby(name)").is_some());
//! ```

pub use mutara_core::{
    config::SchemaConfig,
    error::{UsageError, WriteError},
    handle::TransactionHandle,
    mutation::{ApplyConfig, FieldIds, Mutation, RangeBehavior, RangeBehaviors},
    queue::TransactionQueue,
    refetch::RefetchBuilder,
    traits::{CacheStore, Transport, TrackedFields, TreeIntersector},
    transaction::{Callbacks, FailureCallback, PreventRollback, SuccessCallback, TransactionStatus},
};

pub use mutara_proto as proto;
