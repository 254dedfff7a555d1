//! Cross-cutting services: the bus, balances cache, duplicate filter.

mod balances;
mod bus;
mod recent;

pub use balances::BalancesRegistry;
pub use bus::{Bus, BusConsumers, ExecutorCommand};
pub use recent::RecentArbitragersFilter;
