pub mod clustering;
pub mod features;
pub mod profiles;
pub mod scaler;
pub mod selection;

pub use clustering::*;
pub use features::*;
pub use profiles::*;
pub use scaler::*;
pub use selection::*;
