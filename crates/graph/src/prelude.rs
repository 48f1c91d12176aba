pub use crate::csr::{Csr, Target};
pub use crate::input::shard::{read_shard, Shard};
pub use crate::marshal::MarshalGraph;
pub use crate::pgraph::PGraph;

pub use crate::Error;
pub use crate::{Gid, HostId, Lid, Weight};
