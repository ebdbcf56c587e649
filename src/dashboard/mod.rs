mod orchestrator;
mod selection;
mod status;
mod style;
mod units;

pub use orchestrator::{Orchestrator, Prepared, Ticket};
pub use selection::{ModelSelector, Route, Selection, resolve_route};
pub use status::{Outcome, Stats, Status, StatusPanel};
pub use units::UnitAggregate;
