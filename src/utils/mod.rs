pub mod clock;
pub mod fanout;
pub mod logging;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fanout::{at_least_one, Member};
