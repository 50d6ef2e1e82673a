mod health;
mod vaa;

pub use health::health;
pub use vaa::{VaaService, VaaServiceError};
