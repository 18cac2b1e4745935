pub mod artifact;
pub mod error;
pub mod features;
pub mod matches;
pub mod profiles;

pub use artifact::*;
pub use error::*;
pub use features::*;
pub use matches::*;
pub use profiles::*;
