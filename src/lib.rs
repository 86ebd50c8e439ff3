#![forbid(unsafe_code)]
//! tripod: the storage core of a partitioned RDF graph store.
//!
//! A directed labeled multigraph is hashed across N servers; each server
//! runs one [`GraphStore`] replica that is authoritative for its vertices.
//! The replica lays its keys and adjacency lists out in a single contiguous
//! memory region so that the same bytes serve in-process lookups and
//! one-sided remote reads issued by peer replicas through a
//! [`transport::RemoteReader`].
//!
//! A build ingests pre-sorted triples in two phases (normal data, then the
//! synthesized predicate/type indexes) and is read-only afterwards.

pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod transport;

pub use config::{Geometry, StoreOptions};
pub use error::{Result, StoreError};
pub use model::{
    is_type_id, owner_of, Dir, Pid, Triple, Vid, PREDICATE_ID, TPID_MAX, TYPE_ID,
};
pub use store::{Edges, GraphStore, Key, Region, StoreStats, VerifyLevel, VerifyReport};
pub use transport::{Loopback, RemoteReader};
