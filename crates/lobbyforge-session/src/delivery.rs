//! How bytes (or lines) reach a connected client.
//!
//! Every session is attached to exactly one transport, and the transports
//! disagree on what a "message" is: the polling transport wants raw frames
//! batched until the next request, the push socket wants frames immediately,
//! and the chat bridge wants text lines. [`Delivery`] is the closed set of
//! those capabilities. Callers never check what a session can do; the
//! session's event methods match on the variant.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Delivery capability of one session.
#[derive(Debug)]
pub enum Delivery {
    /// Frames accumulate here until the polling transport drains them with
    /// its next response.
    PolledQueue(Mutex<Vec<u8>>),

    /// Frames are pushed to the socket task as they are produced.
    PushSocket(mpsc::UnboundedSender<Vec<u8>>),

    /// Text lines for the chat bridge. Binary-only events are dropped.
    LineStream(mpsc::UnboundedSender<String>),
}

impl Delivery {
    /// An empty polled queue.
    pub fn polled() -> Self {
        Self::PolledQueue(Mutex::new(Vec::new()))
    }

    pub fn push(sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self::PushSocket(sender)
    }

    pub fn lines(sender: mpsc::UnboundedSender<String>) -> Self {
        Self::LineStream(sender)
    }

    /// Short label for logs and snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PolledQueue(_) => "polled",
            Self::PushSocket(_) => "push",
            Self::LineStream(_) => "line",
        }
    }

    pub fn is_line_stream(&self) -> bool {
        matches!(self, Self::LineStream(_))
    }

    /// Appends one or more complete frames.
    ///
    /// A closed push socket is not an error here: the connection task is
    /// going away and the activity sweep will log the session out.
    pub fn enqueue(&self, frames: &[u8]) {
        match self {
            Self::PolledQueue(queue) => queue.lock().extend_from_slice(frames),
            Self::PushSocket(tx) => {
                if tx.send(frames.to_vec()).is_err() {
                    tracing::debug!("push socket closed, frames dropped");
                }
            }
            Self::LineStream(_) => {}
        }
    }

    /// Sends one text line to a chat-bridge client. Other transports have
    /// no line representation, so this is a no-op for them.
    pub fn send_line(&self, line: String) {
        if let Self::LineStream(tx) = self {
            if tx.send(line).is_err() {
                tracing::debug!("line stream closed, line dropped");
            }
        }
    }

    /// Takes everything queued so far. Only the polled queue buffers; the
    /// other variants always return an empty vector.
    pub fn drain(&self) -> Vec<u8> {
        match self {
            Self::PolledQueue(queue) => std::mem::take(&mut *queue.lock()),
            Self::PushSocket(_) | Self::LineStream(_) => Vec::new(),
        }
    }

    /// `true` when nothing is waiting to be drained.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::PolledQueue(queue) => queue.lock().is_empty(),
            Self::PushSocket(_) | Self::LineStream(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polled_queue_accumulates_until_drained() {
        let delivery = Delivery::polled();
        delivery.enqueue(&[1, 2]);
        delivery.enqueue(&[3]);
        assert!(!delivery.is_empty());
        assert_eq!(delivery.drain(), vec![1, 2, 3]);
        assert!(delivery.is_empty());
        assert!(delivery.drain().is_empty());
    }

    #[test]
    fn test_push_socket_forwards_each_enqueue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delivery = Delivery::push(tx);
        delivery.enqueue(&[9, 9]);
        assert_eq!(rx.try_recv().unwrap(), vec![9, 9]);
        assert!(delivery.drain().is_empty());
    }

    #[test]
    fn test_push_socket_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Delivery::push(tx).enqueue(&[1]);
    }

    #[test]
    fn test_line_stream_drops_binary_and_keeps_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delivery = Delivery::lines(tx);
        delivery.enqueue(&[1, 2, 3]);
        delivery.send_line(":alice JOIN :#osu".into());
        assert_eq!(rx.try_recv().unwrap(), ":alice JOIN :#osu");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_line_on_polled_queue_is_noop() {
        let delivery = Delivery::polled();
        delivery.send_line("ignored".into());
        assert!(delivery.is_empty());
    }
}
