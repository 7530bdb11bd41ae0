pub mod customization;
pub mod owner;

pub use customization::{CustomizationRequest, ValidationError};
pub use owner::OwnerId;
