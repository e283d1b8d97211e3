pub mod inventory;
pub mod lock;
pub mod memory;

pub use inventory::{merge_snapshot, SeatInventory};
pub use lock::LockCoordinator;
pub use memory::InMemoryBackend;
