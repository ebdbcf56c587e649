mod filter;
mod point;

pub use filter::{ALL_CATEGORIES, category_aliases, filter_by_category, filter_observations};
pub use point::ObservationPoint;
