//! The lease protocol state machine.
//!
//! Everything here is implemented as methods on the worker loop, split by
//! concern:
//!
//! - `dispatch`: inbound routing, staleness and the message handlers.
//! - `lists`: relationship list changes carried by requests and responses.
//! - `lease`: establishing and renewing the subject lease, probing peers.
//! - `expiry`: the per-peer timers.
//! - `arbitration`: suspected partitions and arbitration verdicts.
//! - `terminate`: graceful and failure-driven termination.
//! - `indirect`: renewing through neighbours.
//! - `failure`: agent failure, shutdown and application TTLs.
//! - `maintenance`: periodic reclamation.

mod arbitration;
mod dispatch;
mod expiry;
mod failure;
mod indirect;
mod lease;
mod lists;
mod maintenance;
mod terminate;
