mod user;
mod training_standard;
mod training_session;
mod session_instructor;
mod session_participant;
mod assessment;
mod certificate;

pub use user::*;
pub use training_standard::*;
pub use training_session::*;
pub use session_instructor::*;
pub use session_participant::*;
pub use assessment::*;
pub use certificate::*;
