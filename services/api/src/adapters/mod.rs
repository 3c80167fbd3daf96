pub mod db;
pub mod measure;

pub use db::DbAdapter;
pub use measure::EstimatingMeasurer;
