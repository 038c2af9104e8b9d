mod channel;
mod events;

pub use channel::{Channel, Delivery, Envelope, Receiver, Sender};
pub use events::{EventHub, SessionEvent};
