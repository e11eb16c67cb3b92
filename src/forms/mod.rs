// Form state: the passenger and truck application forms plus reference data

pub mod payload;
pub mod store;

pub use payload::{FormError, FormPayload, MergeReport, VehicleClass, REQUIRED_FIELDS};
pub use store::{DefaultReferenceData, FormStore};
