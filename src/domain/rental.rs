mod booking;
mod checker;
mod period;
mod reservation;
mod vehicle;

pub use self::booking::*;
pub use self::checker::*;
pub use self::period::*;
pub use self::reservation::*;
pub use self::vehicle::*;
