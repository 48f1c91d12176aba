pub mod shard;

pub use shard::{read_shard, Shard};
