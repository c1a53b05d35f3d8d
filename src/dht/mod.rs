//! The ring protocol proper: identifier arithmetic, per-vnode state
//! and the stabilization machinery, based on Chord,
//! ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>.
//! With high probability, the number of nodes contacted to find a
//! successor in an N-node overlay is O(log N).

pub mod finger;
pub mod id;
pub mod iter;
pub mod local;
pub(crate) mod stabilization;
pub mod successor;
pub mod vnode;

pub use finger::FingerTable;
pub use iter::ClosestPreceding;
pub use local::LocalVnode;
pub use successor::SuccessorList;
pub use vnode::Vnode;
