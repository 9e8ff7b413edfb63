mod activation;
mod composer;
mod controller;
mod learner;
mod scheduler;

pub use activation::{ActivationError, ExchangeOutcome, PendingExchange, TabActivationController};
pub use composer::compose;
pub use controller::{ControlError, ControlEvent, ControlResponse, ConversationController};
pub use learner::{PlatformTimeoutProfile, TimeoutProfileLearner};
pub use scheduler::{first_turn, next_turn, TurnOutcome};
