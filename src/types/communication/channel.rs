use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Wrapper carried over a notification channel
#[derive(Debug)]
pub enum Envelope<T> {
    /// An event of type T
    Event(T),
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Envelope::Event(data)
    }

    pub fn into_inner(self) -> T {
        match self {
            Envelope::Event(data) => data,
        }
    }
}

/// A bounded channel for outbound notifications
pub struct Channel<T> {
    tx: mpsc::Sender<Envelope<T>>,
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> Channel<T> {
    /// Create a new channel with the specified buffer size
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        Self { tx, rx }
    }

    /// Split the channel into sender and receiver
    pub fn split(self) -> (Sender<T>, Receiver<T>) {
        (Sender { tx: self.tx }, Receiver { rx: self.rx })
    }
}

/// Result of a fire-and-forget send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The subscriber's buffer is full, the event was dropped
    Dropped,
    /// The subscriber went away
    Closed,
}

/// Sending half of a notification channel
#[derive(Clone)]
pub struct Sender<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Sender<T> {
    /// Queue an event without waiting for buffer space
    pub fn notify(&self, data: T) -> Delivery {
        match self.tx.try_send(Envelope::new(data)) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Receiving half of a notification channel
pub struct Receiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> Receiver<T> {
    /// Wait for the next event
    pub async fn receive(&mut self) -> Option<T> {
        self.rx.recv().await.map(Envelope::into_inner)
    }

    /// Take an event if one is already queued
    pub fn try_receive(&mut self) -> Option<T> {
        self.rx.try_recv().ok().map(Envelope::into_inner)
    }
}
