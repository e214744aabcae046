//! Map data model: node ids, tiles, leaves and signed roots

pub mod leaf;
pub mod map_root;
pub mod node_id;
pub mod tile;

pub use leaf::MapLeaf;
pub use map_root::{MapRootV1, SignedMapRoot};
pub use node_id::NodeId;
pub use tile::{Tile, TileNode};
