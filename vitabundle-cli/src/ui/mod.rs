//! Terminal presentation: status rendering and the bundle menu.

mod progress;
mod select;

pub use progress::{headline, StatusView};
pub use select::{menu_label, select_bundles};
