pub mod crash;
pub mod payout;
pub mod rng;
pub mod settlement;
pub mod types;

pub use crash::CrashHandle;
pub use rng::OutcomeGenerator;
pub use settlement::SettlementCoordinator;
pub use types::*;
