//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod dispose_bag;
pub(crate) mod in_flight;

pub(crate) use circular::ResolutionStack;
pub(crate) use dispose_bag::{BoxFutureUnit, DisposeBag};
pub(crate) use in_flight::{CellId, InFlight};
