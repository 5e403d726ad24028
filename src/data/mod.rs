pub mod csv;
pub mod dataset;
pub mod loader;
pub mod synthetic;

pub use csv::load_csv;
pub use dataset::Dataset;
pub use loader::{Batch, DataLoader};
