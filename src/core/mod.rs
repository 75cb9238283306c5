// Core chain data structures

mod types;
mod transaction;
mod block;
mod serialize;
mod hash;
pub mod signature;

pub use types::*;
pub use transaction::*;
pub use block::*;
pub use serialize::{Encodable, hex_bytes, hex_bytes_opt, write_var_bytes, write_varint};
pub use hash::*;
