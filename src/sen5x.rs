mod measurement;
mod model;
mod port;
mod replay;

pub use measurement::*;
pub use model::*;
pub use port::*;
pub use replay::*;
