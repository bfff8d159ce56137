pub mod enums;
pub mod period;
pub mod practice;
pub mod snapshot;
pub mod sync_run;

pub use enums::*;
pub use period::*;
pub use practice::*;
pub use snapshot::*;
pub use sync_run::*;
