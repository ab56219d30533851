pub mod config;
pub mod error;
pub mod handle;
pub mod mutation;
pub mod queue;
pub mod refetch;
pub mod traits;
pub mod transaction;
pub mod util;

pub use config::SchemaConfig;
pub use error::{UsageError, WriteError};
pub use handle::TransactionHandle;
pub use mutation::{ApplyConfig, FieldIds, Mutation, RangeBehavior, RangeBehaviors};
pub use queue::TransactionQueue;
pub use refetch::RefetchBuilder;
pub use traits::{CacheStore, Transport, TrackedFields, TreeIntersector};
pub use transaction::{Callbacks, FailureCallback, PreventRollback, SuccessCallback, TransactionStatus};

pub use mutara_proto as proto;
